use std::time::Duration;

use tokio::time::Instant;

/// Outcome of feeding an observation to a [`RewardClock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunChange {
    /// A new uninterrupted run began.
    Started,
    /// The current run was broken; accumulation is back at zero.
    Interrupted,
    Unchanged,
}

/// Continuous-exposure accounting for rewards.
///
/// Only the start of the current uninterrupted run is kept: a reward needs a single unbroken
/// interval, so nothing accumulated before an interruption ever counts again.
#[derive(Debug, Default)]
pub(crate) struct RewardClock {
    run_start: Option<Instant>,
}

impl RewardClock {
    /// Record whether exposure counts towards the reward as of `at`.
    pub(crate) fn observe(&mut self, accumulating: bool, at: Instant) -> RunChange {
        match (self.run_start, accumulating) {
            (None, true) => {
                self.run_start = Some(at);
                RunChange::Started
            }
            (Some(_), false) => {
                self.run_start = None;
                RunChange::Interrupted
            }
            _ => RunChange::Unchanged,
        }
    }

    /// When the current run will have lasted `required`, if a run is in progress.
    pub(crate) fn deadline(&self, required: Duration) -> Option<Instant> {
        self.run_start.map(|start| start + required)
    }

    pub(crate) fn accumulated(&self, now: Instant) -> Duration {
        self.run_start
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn interruption_resets_accumulation() {
        let t0 = Instant::now();
        let mut clock = RewardClock::default();

        assert_eq!(clock.observe(true, t0), RunChange::Started);
        assert_eq!(clock.observe(true, t0 + secs(1.0)), RunChange::Unchanged);
        assert_eq!(clock.accumulated(t0 + secs(3.0)), secs(3.0));

        assert_eq!(clock.observe(false, t0 + secs(3.0)), RunChange::Interrupted);
        assert_eq!(clock.accumulated(t0 + secs(4.0)), Duration::ZERO);
        assert_eq!(clock.deadline(secs(5.0)), None);

        assert_eq!(clock.observe(true, t0 + secs(3.2)), RunChange::Started);
        assert_eq!(clock.deadline(secs(5.0)), Some(t0 + secs(8.2)));
    }

    #[test]
    fn staying_hidden_is_unchanged() {
        let t0 = Instant::now();
        let mut clock = RewardClock::default();

        assert_eq!(clock.observe(false, t0), RunChange::Unchanged);
        assert_eq!(clock.accumulated(t0 + secs(10.0)), Duration::ZERO);
    }
}
