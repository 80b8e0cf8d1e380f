//! Adaptive callback polling
//!
//! Passive mode pairs one injection batch with a polling loop over the
//! store. Polling starts eager and backs off geometrically once a streak of
//! empty polls passes the quiet threshold; any new callback snaps the
//! interval back to base. A wall-time budget bounds the whole session.

use crate::config::PollConfig;
use crate::error::Result;
use crate::listener::ShutdownRx;
use crate::models::{unix_now, Finding, Severity};
use crate::store::Store;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::debug;

/// Interval schedule with quiet-streak backoff.
pub struct Backoff {
    config: PollConfig,
    current: f64,
    quiet_polls: u32,
}

impl Backoff {
    pub fn new(config: PollConfig) -> Self {
        let current = config.base_interval;
        Self {
            config,
            current,
            quiet_polls: 0,
        }
    }

    /// The interval that would be slept right now.
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Feeds one poll outcome and returns the next interval. New callbacks
    /// reset to base; a quiet streak past the threshold multiplies the
    /// interval, capped at the maximum.
    pub fn next_interval(&mut self, received_callback: bool) -> f64 {
        if received_callback {
            self.current = self.config.base_interval;
            self.quiet_polls = 0;
        } else {
            self.quiet_polls += 1;
            if self.quiet_polls > self.config.quiet_threshold {
                self.current = (self.current * self.config.factor).min(self.config.max_interval);
            }
        }
        self.current
    }

    pub fn quiet_polls(&self) -> u32 {
        self.quiet_polls
    }
}

/// Polls the store for new findings until the time budget runs out or the
/// shutdown signal fires. The window opens at `since` (pass the batch start
/// so pre-existing findings stay out); `on_findings` is invoked with each
/// non-empty batch. Returns the total number of findings observed.
pub async fn poll_for_callbacks<F>(
    store: &Store,
    config: &PollConfig,
    min_severity: Option<Severity>,
    since: Option<f64>,
    mut shutdown: ShutdownRx,
    mut on_findings: F,
) -> Result<u64>
where
    F: FnMut(&[Finding]),
{
    let mut backoff = Backoff::new(config.clone());
    let started = Instant::now();
    let mut last_poll: Option<f64> = since;
    let mut total: u64 = 0;

    loop {
        let elapsed = started.elapsed().as_secs_f64();
        if elapsed >= config.timeout {
            debug!("polling budget of {:.0}s exhausted", config.timeout);
            break;
        }

        let findings = store.get_findings(last_poll, min_severity).await?;
        last_poll = Some(unix_now());

        let received = !findings.is_empty();
        if received {
            total += findings.len() as u64;
            on_findings(&findings);
        }

        let interval = backoff.next_interval(received);
        // Never sleep past the session deadline.
        let remaining = (config.timeout - started.elapsed().as_secs_f64()).max(0.0);
        let nap = interval.min(remaining);

        tokio::select! {
            _ = sleep(Duration::from_secs_f64(nap)) => {}
            _ = shutdown.changed() => {
                debug!("polling interrupted by shutdown");
                break;
            }
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: f64, max: f64, factor: f64, quiet: u32) -> PollConfig {
        PollConfig {
            base_interval: base,
            max_interval: max,
            factor,
            quiet_threshold: quiet,
            timeout: 3600.0,
        }
    }

    #[test]
    fn test_backoff_sequence_quiet_growth() {
        // base=1 max=4 factor=2 quiet=2: observed intervals 1,1,1,2,4,4,...
        let mut backoff = Backoff::new(config(1.0, 4.0, 2.0, 2));
        assert_eq!(backoff.current(), 1.0);
        let observed: Vec<f64> = (0..5).map(|_| backoff.next_interval(false)).collect();
        assert_eq!(observed, vec![1.0, 1.0, 2.0, 4.0, 4.0]);
    }

    #[test]
    fn test_backoff_resets_on_callback() {
        let mut backoff = Backoff::new(config(5.0, 60.0, 1.5, 1));
        backoff.next_interval(false);
        backoff.next_interval(false);
        assert!(backoff.current() > 5.0);
        assert_eq!(backoff.next_interval(true), 5.0);
        assert_eq!(backoff.quiet_polls(), 0);
    }

    #[test]
    fn test_backoff_capped_at_max() {
        let mut backoff = Backoff::new(config(5.0, 12.0, 3.0, 0));
        for _ in 0..10 {
            backoff.next_interval(false);
        }
        assert_eq!(backoff.current(), 12.0);
    }

    #[test]
    fn test_backoff_defaults_match_documented_schedule() {
        // With the 5s/60s/1.5/5 defaults the sixth quiet poll is the first
        // to grow the interval.
        let mut backoff = Backoff::new(PollConfig::default());
        for _ in 0..5 {
            assert_eq!(backoff.next_interval(false), 5.0);
        }
        assert_eq!(backoff.next_interval(false), 7.5);
    }
}
