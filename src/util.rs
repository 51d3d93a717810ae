use std::time;

/// Get the current system time in epoch format.
///
/// # Returns
///
/// Current system time in milliseconds from epoch, or zero if the system
/// time is before epoch.
#[must_use]
pub fn millis_from_epoch() -> u64 {
    time::SystemTime::now()
        .duration_since(time::UNIX_EPOCH)
        .map_or(0, |elapsed| {
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
        })
}

/// Source of wall-clock time for lease timestamps.
///
/// Leases are compared across browsing contexts, so this must be a clock
/// that all contexts of an origin share: epoch milliseconds.
pub trait Clock {
    fn now_millis(&self) -> u64;
}

/// The system wall clock.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        millis_from_epoch()
    }
}

impl<C: Clock> Clock for std::rc::Rc<C> {
    fn now_millis(&self) -> u64 {
        (**self).now_millis()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock(std::cell::Cell<u64>);

impl ManualClock {
    #[must_use]
    pub fn new(millis: u64) -> Self {
        Self(std::cell::Cell::new(millis))
    }

    pub fn advance(&self, by: time::Duration) {
        let by = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.0.set(self.0.get().saturating_add(by));
    }

    pub fn set(&self, millis: u64) {
        self.0.set(millis);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.0.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn system_clock_is_past_2020() {
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn manual_clock_advances_through_shared_handle() {
        let clock = Rc::new(ManualClock::new(1_000));
        let handle = Rc::clone(&clock);
        clock.advance(time::Duration::from_secs(15));
        assert_eq!(handle.now_millis(), 16_000);
    }
}
