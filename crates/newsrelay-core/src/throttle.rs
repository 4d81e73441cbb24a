//! Request spacing for politeness and rate limits.
//!
//! Both throttles use tokio's clock so paused-time tests can observe the
//! exact spacing. Waiters are serialized: the slot lock is held across the
//! sleep, so two concurrent callers never pass within `min_interval`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

type Slot = Arc<tokio::sync::Mutex<Option<Instant>>>;

async fn wait_slot(slot: &Slot, min_interval: Duration) {
    let mut last = slot.lock().await;
    if let Some(previous) = *last {
        let ready_at = previous + min_interval;
        if ready_at > Instant::now() {
            tokio::time::sleep_until(ready_at).await;
        }
    }
    *last = Some(Instant::now());
}

/// Enforces a fixed minimum spacing between consecutive calls
pub struct Throttle {
    min_interval: Duration,
    last: Slot,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    /// Wait until the next call is allowed, then record it
    pub async fn wait(&self) {
        wait_slot(&self.last, self.min_interval).await;
    }
}

/// Per-host spacing. The delay is supplied by the caller because each
/// source configures its own.
#[derive(Default)]
pub struct HostThrottle {
    hosts: Mutex<HashMap<String, Slot>>,
}

impl HostThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn wait(&self, host: &str, min_interval: Duration) {
        if min_interval.is_zero() {
            return;
        }
        let slot = {
            let mut hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
            hosts
                .entry(host.to_ascii_lowercase())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None)))
                .clone()
        };
        wait_slot(&slot, min_interval).await;
    }
}
