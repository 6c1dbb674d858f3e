//! Keyed store behaviour over the in-memory backend

use std::sync::Arc;
use std::time::Duration;

use keyed_store::{KeyedStore, LoadState, MemoryBackend, StoreConfig, Update};
use serde_json::{Value, json};

const SAVE_DELAY: Duration = Duration::from_millis(300);

fn config() -> StoreConfig {
    StoreConfig::default()
        .with_save_delay(SAVE_DELAY)
        .with_retries(2, Duration::from_millis(50))
}

fn store_over(backend: &Arc<MemoryBackend>) -> KeyedStore {
    KeyedStore::with_backend(backend.clone(), config()).unwrap()
}

fn increment() -> Update {
    Update::with(|prev| json!(prev.and_then(Value::as_i64).unwrap_or(0) + 1))
}

async fn settle() {
    tokio::time::sleep(SAVE_DELAY * 3).await;
}

mod load_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_missing_namespace_is_created_durably() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_over(&backend);

        let handle = store.open("footersSeen").unwrap();
        let document = handle.ready().await;

        assert!(document.is_empty());
        assert_eq!(handle.load_state(), LoadState::Ready);
        assert_eq!(backend.stored("footersSeen"), Some(json!({})));
        assert_eq!(backend.write_count("footersSeen"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_document_is_adopted_without_write() {
        let backend = Arc::new(MemoryBackend::new().with_value("prefs", json!({ "theme": "dark" })));
        let store = store_over(&backend);

        let handle = store.open("prefs").unwrap();
        handle.ready().await;

        assert_eq!(handle.get("theme", None), Some(json!("dark")));
        assert_eq!(backend.write_count("prefs"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_array_document_is_reset() {
        let backend = Arc::new(MemoryBackend::new().with_value("list", json!([1, 2, 3])));
        let store = store_over(&backend);

        let handle = store.open("list").unwrap();
        let document = handle.ready().await;

        assert!(document.is_empty());
        assert_eq!(backend.stored("list"), Some(json!({})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_load_degrades_to_defaults() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_next_reads(1);
        let store = store_over(&backend);

        let handle = store.open("broken").unwrap();
        settle().await;

        assert!(handle.is_degraded());
        assert_eq!(handle.load_state(), LoadState::Loading);
        assert_eq!(handle.get("k", Some(json!(7))), Some(json!(7)));

        handle.set("k", json!(8));
        settle().await;
        assert_eq!(handle.get("k", Some(json!(7))), Some(json!(7)));
        assert_eq!(backend.write_count("broken"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_twice_loads_once() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_over(&backend);

        let first = store.open("once").unwrap();
        let second = store.open("once").unwrap();
        first.ready().await;
        second.ready().await;
        settle().await;

        // Only the write-through of the initial `{}`
        assert_eq!(backend.write_count("once"), 1);

        first.set("a", json!(1));
        assert_eq!(second.get("a", None), Some(json!(1)));
    }
}

mod read_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_get_before_ready_returns_default_without_seeding() {
        let backend = Arc::new(
            MemoryBackend::new()
                .with_value("slow", json!({}))
                .with_read_delay(Duration::from_secs(1)),
        );
        let store = store_over(&backend);

        let handle = store.open("slow").unwrap();
        assert_eq!(handle.load_state(), LoadState::Loading);
        assert_eq!(handle.get("theme", Some(json!("light"))), Some(json!("light")));
        assert!(handle.document().is_none());

        let document = handle.ready().await;
        assert!(!document.contains_key("theme"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_seeding_is_idempotent() {
        let backend = Arc::new(MemoryBackend::new().with_value("prefs", json!({})));
        let store = store_over(&backend);
        let handle = store.open("prefs").unwrap();
        handle.ready().await;

        assert_eq!(handle.get("theme", Some(json!("dark"))), Some(json!("dark")));
        assert_eq!(
            handle.document().unwrap().get("theme"),
            Some(&json!("dark"))
        );
        assert_eq!(handle.get("theme", Some(json!("dark"))), Some(json!("dark")));

        // Seeding alone never schedules a write
        assert!(!handle.flush_pending());
        assert!(!handle.is_dirty());
        settle().await;
        assert_eq!(backend.write_count("prefs"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_without_default_does_not_mutate() {
        let backend = Arc::new(MemoryBackend::new().with_value("prefs", json!({})));
        let store = store_over(&backend);
        let handle = store.open("prefs").unwrap();
        let before = handle.ready().await;

        assert_eq!(handle.get("missing", None), None);
        assert!(Arc::ptr_eq(&before, &handle.document().unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_seeded_default_rides_along_with_next_flush() {
        let backend = Arc::new(MemoryBackend::new().with_value("prefs", json!({})));
        let store = store_over(&backend);
        let handle = store.open("prefs").unwrap();
        handle.ready().await;

        handle.get("theme", Some(json!("dark")));
        handle.set("lang", json!("en"));
        settle().await;

        assert_eq!(
            backend.stored("prefs"),
            Some(json!({ "theme": "dark", "lang": "en" }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_as_deserializes() {
        let backend =
            Arc::new(MemoryBackend::new().with_value("prefs", json!({ "size": [800, 600] })));
        let store = store_over(&backend);
        let handle = store.open("prefs").unwrap();
        handle.ready().await;

        let size: Option<(u32, u32)> = handle.get_as("size");
        assert_eq!(size, Some((800, 600)));
        let wrong: Option<String> = handle.get_as("size");
        assert_eq!(wrong, None);
    }
}

mod write_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_updater_applied_sequentially() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_over(&backend);
        let handle = store.open("counter").unwrap();
        handle.ready().await;

        for _ in 0..5 {
            handle.set("n", increment());
        }

        assert_eq!(handle.get("n", None), Some(json!(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_previous_snapshot_is_unaffected() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_over(&backend);
        let handle = store.open("cow").unwrap();
        handle.ready().await;

        let before = handle.document().unwrap();
        handle.set("a", json!(1));

        assert!(!before.contains_key("a"));
        assert_eq!(handle.document().unwrap().get("a"), Some(&json!(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_updater_may_read_the_store() {
        let backend = Arc::new(MemoryBackend::new().with_value("cart", json!({ "a": 2 })));
        let store = store_over(&backend);
        let handle = store.open("cart").unwrap();
        handle.ready().await;

        let reader = handle.clone();
        handle.set(
            "total",
            Update::with(move |_| {
                let a = reader.get_or("a", json!(0));
                let b = reader.get_or("b", json!(5));
                json!(a.as_i64().unwrap_or(0) + b.as_i64().unwrap_or(0))
            }),
        );

        assert_eq!(handle.get("total", None), Some(json!(7)));
        // The default seeded from inside the updater survives the merge
        assert_eq!(handle.get("b", None), Some(json!(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_updater_may_set_other_keys() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_over(&backend);
        let handle = store.open("form").unwrap();
        handle.ready().await;

        let (_, set_touched) = handle.use_item("touched", Some(json!(false)));
        handle.set(
            "name",
            Update::with(move |_| {
                set_touched.set(json!(true));
                json!("ada")
            }),
        );
        settle().await;

        assert_eq!(
            backend.stored("form"),
            Some(json!({ "touched": true, "name": "ada" }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_flush() {
        let backend = Arc::new(MemoryBackend::new().with_value("burst", json!({})));
        let store = store_over(&backend);
        let handle = store.open("burst").unwrap();
        handle.ready().await;

        handle.set("x", json!(1));
        tokio::time::sleep(SAVE_DELAY / 3).await;
        handle.set("x", json!(2));
        tokio::time::sleep(SAVE_DELAY / 3).await;
        handle.set("x", json!(3));
        assert!(handle.flush_pending());
        assert_eq!(backend.write_count("burst"), 0);

        settle().await;

        let writes = backend.writes("burst");
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].get("x"), Some(&json!(3)));
        assert!(!handle.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_before_ready_is_dropped() {
        let backend = Arc::new(
            MemoryBackend::new()
                .with_value("early", json!({ "x": 5 }))
                .with_read_delay(Duration::from_secs(1)),
        );
        let store = store_over(&backend);
        let handle = store.open("early").unwrap();

        handle.set("x", json!(1));
        handle.ready().await;
        settle().await;

        assert_eq!(handle.get("x", None), Some(json!(5)));
        assert_eq!(backend.write_count("early"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_value_does_not_flush() {
        let backend = Arc::new(MemoryBackend::new().with_value("same", json!({ "x": 1 })));
        let store = store_over(&backend);
        let handle = store.open("same").unwrap();
        handle.ready().await;

        handle.set("x", json!(1));
        assert!(!handle.flush_pending());
        settle().await;
        assert_eq!(backend.write_count("same"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_flush_is_retried() {
        let backend = Arc::new(MemoryBackend::new().with_value("flaky", json!({})));
        let store = store_over(&backend);
        let handle = store.open("flaky").unwrap();
        handle.ready().await;

        backend.fail_next_writes(2);
        handle.set("x", json!(1));
        settle().await;

        assert_eq!(backend.stored("flaky"), Some(json!({ "x": 1 })));
        assert!(!handle.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_keep_changes_in_memory() {
        let backend = Arc::new(MemoryBackend::new().with_value("down", json!({})));
        let store = store_over(&backend);
        let handle = store.open("down").unwrap();
        handle.ready().await;

        backend.fail_next_writes(3);
        handle.set("x", json!(1));
        settle().await;

        assert_eq!(backend.stored("down"), Some(json!({})));
        assert!(handle.is_dirty());
        assert_eq!(handle.get("x", None), Some(json!(1)));

        // Next graceful flush delivers it
        store.shutdown().await.unwrap();
        assert_eq!(backend.stored("down"), Some(json!({ "x": 1 })));
        assert!(!handle.is_dirty());
    }
}

mod surface_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_use_item_pairs_value_and_setter() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_over(&backend);
        let handle = store.open("view").unwrap();
        handle.ready().await;

        let (value, setter) = handle.use_item("exampleData", Some(json!("")));
        assert_eq!(value, Some(json!("")));
        assert_eq!(setter.key(), "exampleData");

        setter.set(json!("typed"));
        let (value, _) = handle.use_item("exampleData", Some(json!("")));
        assert_eq!(value, Some(json!("typed")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_new_snapshots() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_over(&backend);
        let handle = store.open("watched").unwrap();
        handle.ready().await;

        let mut rx = handle.subscribe();
        let seen = rx.borrow_and_update().clone().unwrap();

        handle.set("a", json!(1));
        rx.changed().await.unwrap();
        let next = rx.borrow_and_update().clone().unwrap();

        assert!(!Arc::ptr_eq(&seen, &next));
        assert_eq!(next.get("a"), Some(&json!(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_pending_writes() {
        let backend = Arc::new(MemoryBackend::new().with_value("exit", json!({})));
        let store = store_over(&backend);
        let handle = store.open("exit").unwrap();
        handle.ready().await;

        handle.set("x", json!(1));
        assert!(handle.flush_pending());

        store.shutdown().await.unwrap();
        assert!(!handle.flush_pending());
        assert_eq!(backend.stored("exit"), Some(json!({ "x": 1 })));

        // The cancelled timer must not write again
        settle().await;
        assert_eq!(backend.write_count("exit"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_namespaces_are_independent() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_over(&backend);
        let a = store.open("a").unwrap();
        let b = store.open("b").unwrap();
        a.ready().await;
        b.ready().await;

        a.set("k", json!("a"));
        b.set("k", json!("b"));
        settle().await;

        assert_eq!(backend.stored("a"), Some(json!({ "k": "a" })));
        assert_eq!(backend.stored("b"), Some(json!({ "k": "b" })));
    }
}
