/// Outcome of advancing a countdown by one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Still counting down.
    Running { remaining: u32 },
    /// The counter just reached zero. Reported at most once per countdown.
    Expired,
    /// The countdown already expired; further ticks are ignored.
    Exhausted,
}

/// Strictly decrementing second counter for a timed phase.
///
/// The counter never goes negative and the expiry is reported exactly once,
/// on the tick that first reaches zero. A page reload restarts the full
/// phase duration; elapsed wall-clock time is not resumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    remaining: u32,
    fired: bool,
}

impl Countdown {
    #[must_use]
    pub fn new(secs: u32) -> Self {
        Self {
            remaining: secs,
            fired: false,
        }
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        self.remaining
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.fired
    }

    /// Advance by one second.
    pub fn tick(&mut self) -> Tick {
        if self.fired {
            return Tick::Exhausted;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.fired = true;
            Tick::Expired
        } else {
            Tick::Running {
                remaining: self.remaining,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_down_to_zero() {
        let mut countdown = Countdown::new(3);
        assert_eq!(countdown.tick(), Tick::Running { remaining: 2 });
        assert_eq!(countdown.tick(), Tick::Running { remaining: 1 });
        assert_eq!(countdown.tick(), Tick::Expired);
        assert_eq!(countdown.remaining_secs(), 0);
    }

    #[test]
    fn expiry_fires_exactly_once() {
        let mut countdown = Countdown::new(1);
        assert_eq!(countdown.tick(), Tick::Expired);
        assert_eq!(countdown.tick(), Tick::Exhausted);
        assert_eq!(countdown.tick(), Tick::Exhausted);
        assert_eq!(countdown.remaining_secs(), 0);
    }

    #[test]
    fn never_goes_negative() {
        let mut countdown = Countdown::new(2);
        for _ in 0..10 {
            countdown.tick();
        }
        assert_eq!(countdown.remaining_secs(), 0);
        assert!(countdown.is_expired());
    }

    #[test]
    fn remaining_is_initial_minus_ticks() {
        let mut countdown = Countdown::new(100);
        for _ in 0..40 {
            countdown.tick();
        }
        assert_eq!(countdown.remaining_secs(), 60);
    }
}
