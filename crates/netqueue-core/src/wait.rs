//! Bounded waits.
//!
//! Every blocking operation in a node follows the same loop: check whether
//! the goal is met, otherwise poll again with whatever time is left. [`Budget`]
//! owns the "whatever time is left" half of that loop.
//!
//! ```ignore
//! let mut budget = Budget::new(wait);
//! loop {
//!     if let Some(item) = self.inbound.pop_front() {
//!         return Ok(Some(item));
//!     }
//!     match budget.next_wait() {
//!         Some(slice) => self.poll(slice)?,
//!         None => return Ok(None),
//!     };
//! }
//! ```

use std::{
    fmt,
    time::{Duration, Instant},
};

/// How long an operation may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Do not wait; act on what is already available.
    Immediate,
    /// Wait at most this long.
    Timeout(Duration),
    /// Wait until the goal is met.
    Forever,
}

impl Wait {
    /// Map a `(block, timeout)` pair: non-blocking ignores the timeout and a
    /// blocking call without one waits forever.
    pub fn from_parts(block: bool, timeout: Option<Duration>) -> Self {
        match (block, timeout) {
            (false, _) => Self::Immediate,
            (true, Some(timeout)) => Self::Timeout(timeout),
            (true, None) => Self::Forever,
        }
    }

    /// Timeout to hand to the OS multiplexer.
    pub fn as_poll_timeout(self) -> Option<Duration> {
        match self {
            Self::Immediate => Some(Duration::ZERO),
            Self::Timeout(timeout) => Some(timeout),
            Self::Forever => None,
        }
    }
}

impl fmt::Display for Wait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => f.write_str("immediate"),
            Self::Timeout(timeout) => write!(f, "{timeout:?}"),
            Self::Forever => f.write_str("forever"),
        }
    }
}

/// Remaining time for a bounded-wait loop.
#[derive(Debug, Clone)]
pub struct Budget {
    wait: Wait,
    deadline: Option<Instant>,
    spent: bool,
}

impl Budget {
    /// Start the clock.
    ///
    /// A zero timeout is treated as [`Wait::Immediate`], so it still gets its
    /// one non-blocking poll.
    pub fn new(wait: Wait) -> Self {
        let wait = match wait {
            Wait::Timeout(timeout) if timeout.is_zero() => Wait::Immediate,
            other => other,
        };
        let deadline = match wait {
            Wait::Timeout(timeout) => Instant::now().checked_add(timeout),
            Wait::Immediate | Wait::Forever => None,
        };
        Self { wait, deadline, spent: false }
    }

    /// The wait for the next poll, or `None` once the budget is exhausted.
    ///
    /// `Immediate` grants exactly one zero-length poll. `Timeout` grants the
    /// time left until the deadline. `Forever` never runs out.
    pub fn next_wait(&mut self) -> Option<Wait> {
        match self.wait {
            Wait::Immediate => {
                if self.spent {
                    return None;
                }
                self.spent = true;
                Some(Wait::Immediate)
            },
            Wait::Forever => Some(Wait::Forever),
            Wait::Timeout(_) => match self.deadline {
                Some(deadline) => deadline
                    .checked_duration_since(Instant::now())
                    .filter(|left| !left.is_zero())
                    .map(Wait::Timeout),
                // Deadline overflowed Instant, effectively unbounded
                None => Some(Wait::Forever),
            },
        }
    }

    /// True when no further poll will be granted.
    pub fn is_exhausted(&self) -> bool {
        match self.wait {
            Wait::Immediate => self.spent,
            Wait::Forever => false,
            Wait::Timeout(_) => self.deadline.is_some_and(|deadline| Instant::now() >= deadline),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn from_parts_mapping() {
        assert_eq!(Wait::from_parts(false, Some(Duration::from_secs(1))), Wait::Immediate);
        assert_eq!(
            Wait::from_parts(true, Some(Duration::from_secs(1))),
            Wait::Timeout(Duration::from_secs(1))
        );
        assert_eq!(Wait::from_parts(true, None), Wait::Forever);
    }

    #[test]
    fn immediate_grants_one_poll() {
        let mut budget = Budget::new(Wait::Immediate);
        assert_eq!(budget.next_wait(), Some(Wait::Immediate));
        assert_eq!(budget.next_wait(), None);
        assert!(budget.is_exhausted());
    }

    #[test]
    fn forever_never_exhausts() {
        let mut budget = Budget::new(Wait::Forever);
        for _ in 0..3 {
            assert_eq!(budget.next_wait(), Some(Wait::Forever));
        }
        assert!(!budget.is_exhausted());
    }

    #[test]
    fn timeout_shrinks_then_exhausts() {
        let total = Duration::from_millis(50);
        let mut budget = Budget::new(Wait::Timeout(total));

        match budget.next_wait() {
            Some(Wait::Timeout(left)) => assert!(left <= total),
            other => panic!("expected timeout slice, got {other:?}"),
        }

        thread::sleep(total);
        assert_eq!(budget.next_wait(), None);
        assert!(budget.is_exhausted());
    }

    #[test]
    fn zero_timeout_grants_one_immediate_poll() {
        let mut budget = Budget::new(Wait::Timeout(Duration::ZERO));
        assert_eq!(budget.next_wait(), Some(Wait::Immediate));
        assert_eq!(budget.next_wait(), None);
        assert!(budget.is_exhausted());
    }

    #[test]
    fn poll_timeouts() {
        assert_eq!(Wait::Immediate.as_poll_timeout(), Some(Duration::ZERO));
        assert_eq!(Wait::Forever.as_poll_timeout(), None);
    }
}
