//! Single-slot debouncer
//!
//! Holds at most one armed timer. Scheduling again before the timer fires
//! cancels it and arms a new one, so a burst of triggers runs the action
//! once, `delay` after the last trigger. Once the timer has fired the action
//! runs as its own task and is no longer cancellable.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

pub struct Debouncer {
    delay: Duration,
    runtime: Handle,
    slot: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration, runtime: Handle) -> Self {
        Self {
            delay,
            runtime,
            slot: Mutex::new(None),
        }
    }

    /// Arm the timer for `action`, replacing any timer still pending
    pub fn schedule<F>(&self, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let runtime = self.runtime.clone();
        let timer = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            runtime.spawn(action);
        });

        if let Some(previous) = self.lock().replace(timer) {
            previous.abort();
        }
    }

    /// Disarm a pending timer; returns whether one was pending
    pub fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(timer) if !timer.is_finished() => {
                timer.abort();
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.lock().as_ref().is_some_and(|timer| !timer.is_finished())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
