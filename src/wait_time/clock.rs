//! Time source for the estimator

use chrono::{DateTime, Local, Timelike, Utc};

/// Wall clock seen by the estimator
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Hour of day (0-23) in the player's local time zone
    fn local_hour(&self) -> u32;
}

/// Machine clock in the process's local time zone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_hour(&self) -> u32 {
        Local::now().hour()
    }
}

/// Clock pinned to a fixed instant and hour
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub now: DateTime<Utc>,
    pub local_hour: u32,
}

impl FixedClock {
    /// Current instant, pinned to `local_hour`
    pub fn at_hour(local_hour: u32) -> Self {
        Self {
            now: Utc::now(),
            local_hour: local_hour % 24,
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn local_hour(&self) -> u32 {
        self.local_hour
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_hour_in_range() {
        assert!(SystemClock.local_hour() < 24);
    }

    #[test]
    fn test_fixed_clock_wraps_hour() {
        assert_eq!(FixedClock::at_hour(27).local_hour(), 3);
    }
}
