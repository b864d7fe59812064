use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, Datelike};

/// Wall clock in Unix milliseconds.
///
/// `Clock::fixed` pins the time for tests; clones share the pinned value, so
/// advancing one handle moves every store holding a clone.
#[derive(Clone, Debug, Default)]
pub struct Clock {
    pinned: Option<Arc<AtomicU64>>,
}

impl Clock {
    pub fn system() -> Self {
        Self { pinned: None }
    }

    pub fn fixed(now_ms: u64) -> Self {
        Self {
            pinned: Some(Arc::new(AtomicU64::new(now_ms))),
        }
    }

    pub fn now_ms(&self) -> u64 {
        match &self.pinned {
            Some(now) => now.load(Ordering::SeqCst),
            None => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        }
    }

    /// Moves a fixed clock forward. No effect on the system clock.
    pub fn advance(&self, ms: u64) {
        if let Some(now) = &self.pinned {
            now.fetch_add(ms, Ordering::SeqCst);
        }
    }

    pub fn set(&self, now_ms: u64) {
        if let Some(now) = &self.pinned {
            now.store(now_ms, Ordering::SeqCst);
        }
    }

    /// Calendar year (UTC) of the current instant.
    pub fn current_year(&self) -> i32 {
        DateTime::from_timestamp_millis(self.now_ms() as i64)
            .map(|now| now.year())
            .unwrap_or(1970)
    }
}
