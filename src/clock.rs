//! Injected wall-clock source.
//!
//! Attribute expiry compares against this instead of calling
//! [`SystemTime::now`] directly, so tests can pin and advance time.

use std::time::SystemTime;

/// A source of "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// The real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}
