use std::time::SystemTime;

use tokio::time::Instant;

/// Source of "now" as whole seconds since the Unix epoch.
pub trait Clock {
    fn now(&self) -> u64;
}

/// The host's wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        // A clock set before 1970 reads as the epoch itself.
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default()
    }
}

/// Epoch seconds anchored at a fixed instant and advanced by tokio's clock.
///
/// Under `tokio::time::pause` this moves only when the runtime's time moves,
/// which keeps timer-driven tests deterministic.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor: u64,
    origin: Instant,
}

impl TokioClock {
    pub fn starting_at(anchor: u64) -> Self {
        Self {
            anchor,
            origin: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> u64 {
        self.anchor + self.origin.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::{Clock, SystemClock, TokioClock};

    #[test]
    fn system_clock_is_past_the_epoch() {
        assert!(SystemClock.now() > 1_600_000_000);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_follows_paused_time() {
        let clock = TokioClock::starting_at(1_700_000_000);
        assert_eq!(1_700_000_000, clock.now());

        tokio::time::advance(Duration::from_millis(2_500)).await;
        assert_eq!(1_700_000_002, clock.now());
    }
}
