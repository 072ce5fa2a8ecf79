use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Ledger time: whole seconds since the UNIX epoch.
///
/// Rental accounting is done at one-second resolution, so the ledger never
/// needs anything finer. Arithmetic helpers saturate rather than wrap.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self(secs)
    }

    /// `self + secs`, or `None` on overflow.
    pub fn checked_add_secs(&self, secs: u64) -> Option<Self> {
        self.0.checked_add(secs).map(Self)
    }

    /// Seconds from `earlier` to `self`, floored at zero.
    pub fn saturating_secs_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}s)", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of ledger time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time source.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Explicitly advanced clock for tests and deterministic simulation.
///
/// Clones share the same underlying counter, so a harness can hold one
/// handle while the ledger holds another.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    secs: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            secs: Arc::new(AtomicU64::new(start.as_secs())),
        }
    }

    /// Move time forward by `secs` and return the new time.
    pub fn advance(&self, secs: u64) -> Timestamp {
        let previous = self.secs.fetch_add(secs, Ordering::SeqCst);
        Timestamp::from_secs(previous.saturating_add(secs))
    }

    pub fn set(&self, at: Timestamp) {
        self.secs.store(at.as_secs(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_secs(self.secs.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_produces_reasonable_timestamp() {
        // After 2020-01-01.
        assert!(Timestamp::now().as_secs() > 1_577_836_800);
        assert!(SystemClock.now().as_secs() > 1_577_836_800);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::starting_at(Timestamp::from_secs(1_000));
        let handle = clock.clone();
        assert_eq!(handle.advance(5), Timestamp::from_secs(1_005));
        assert_eq!(clock.now(), Timestamp::from_secs(1_005));

        clock.set(Timestamp::from_secs(42));
        assert_eq!(handle.now().as_secs(), 42);
    }

    #[test]
    fn saturating_difference() {
        let a = Timestamp::from_secs(10);
        let b = Timestamp::from_secs(25);
        assert_eq!(b.saturating_secs_since(a), 15);
        assert_eq!(a.saturating_secs_since(b), 0);
        assert!(Timestamp::from_secs(u64::MAX).checked_add_secs(1).is_none());
    }

    #[test]
    fn serializes_as_plain_seconds() {
        let json = serde_json::to_string(&Timestamp::from_secs(77)).unwrap();
        assert_eq!(json, "77");
    }
}
