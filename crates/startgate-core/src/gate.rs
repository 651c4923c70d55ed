use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::descriptor::ConnectionDescriptor;
use crate::probe::Probe;

/// How often and how many times the gate probes before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    interval: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

    /// At least one attempt is always made.
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_INTERVAL)
    }
}

/// How the gate resolved. Every variant lets startup continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// No descriptor was configured; nothing was probed.
    Skipped,
    Ready { attempts: u32 },
    /// The attempt budget ran out without a successful probe.
    TimedOut { attempts: u32 },
}

impl GateOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, GateOutcome::Ready { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            GateOutcome::Skipped => 0,
            GateOutcome::Ready { attempts } | GateOutcome::TimedOut { attempts } => *attempts,
        }
    }
}

/// Progress emitted while the gate is waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent<'a> {
    Waiting {
        target: &'a ConnectionDescriptor,
        attempt: u32,
        max_attempts: u32,
    },
    Ready {
        target: &'a ConnectionDescriptor,
        attempt: u32,
    },
    TimedOut {
        target: &'a ConnectionDescriptor,
        attempts: u32,
    },
}

/// Receives human-facing gate progress.
pub trait Reporter {
    fn report(&self, event: &GateEvent<'_>);
}

impl<T: Reporter + ?Sized> Reporter for &T {
    fn report(&self, event: &GateEvent<'_>) {
        (**self).report(event);
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&self, _event: &GateEvent<'_>) {}
}

/// Suspends the gate between failed attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Blocks startup until a dependency accepts connections or the attempt
/// budget is spent. It never fails: exhaustion is reported and then ignored.
pub struct ReadinessGate<P, S, R> {
    probe: P,
    sleeper: S,
    reporter: R,
    policy: RetryPolicy,
}

impl<P, S, R> ReadinessGate<P, S, R>
where
    P: Probe,
    S: Sleeper,
    R: Reporter,
{
    pub fn new(probe: P, sleeper: S, reporter: R, policy: RetryPolicy) -> Self {
        Self {
            probe,
            sleeper,
            reporter,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn wait(&self, descriptor: Option<&ConnectionDescriptor>) -> GateOutcome {
        let Some(target) = descriptor else {
            return GateOutcome::Skipped;
        };
        if target.host().is_none() {
            warn!(%target, "connection descriptor has no host; readiness probes will fail");
        }

        let max_attempts = self.policy.max_attempts;
        for attempt in 1..=max_attempts {
            match self.probe.check(target).await {
                Ok(()) => {
                    info!(%target, attempt, "dependency is accepting connections");
                    self.reporter.report(&GateEvent::Ready { target, attempt });
                    return GateOutcome::Ready { attempts: attempt };
                }
                Err(err) => debug!(%target, attempt, error = %err, "dependency not ready"),
            }
            self.reporter.report(&GateEvent::Waiting {
                target,
                attempt,
                max_attempts,
            });
            self.sleeper.sleep(self.policy.interval).await;
        }

        warn!(%target, attempts = max_attempts, "dependency never became ready; continuing");
        self.reporter.report(&GateEvent::TimedOut {
            target,
            attempts: max_attempts,
        });
        GateOutcome::TimedOut {
            attempts: max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// Reports ready on attempt `ready_on`, or never when `None`.
    #[derive(Clone)]
    struct ScriptedProbe {
        ready_on: Option<u32>,
        calls: Arc<AtomicU32>,
    }

    impl ScriptedProbe {
        fn new(ready_on: Option<u32>) -> Self {
            Self {
                ready_on,
                calls: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait]
    impl Probe for ScriptedProbe {
        async fn check(&self, _target: &ConnectionDescriptor) -> Result<(), ProbeError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.ready_on {
                Some(k) if call >= k => Ok(()),
                _ => Err(ProbeError::MissingHost),
            }
        }
    }

    #[derive(Clone, Default)]
    struct CountingSleeper {
        slept: Arc<Mutex<Vec<Duration>>>,
    }

    #[async_trait]
    impl Sleeper for CountingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    #[derive(Default)]
    struct RecordingReporter {
        lines: Mutex<Vec<String>>,
    }

    impl Reporter for RecordingReporter {
        fn report(&self, event: &GateEvent<'_>) {
            let line = match event {
                GateEvent::Waiting {
                    attempt,
                    max_attempts,
                    ..
                } => format!("waiting {attempt}/{max_attempts}"),
                GateEvent::Ready { attempt, .. } => format!("ready {attempt}"),
                GateEvent::TimedOut { attempts, .. } => format!("timed out {attempts}"),
            };
            self.lines.lock().unwrap().push(line);
        }
    }

    fn target() -> ConnectionDescriptor {
        ConnectionDescriptor::parse("postgres://u:p@db:5432/app")
    }

    #[tokio::test]
    async fn skipped_without_descriptor() {
        let probe = ScriptedProbe::new(Some(1));
        let sleeper = CountingSleeper::default();
        let reporter = RecordingReporter::default();
        let gate = ReadinessGate::new(
            probe.clone(),
            sleeper.clone(),
            &reporter,
            RetryPolicy::default(),
        );

        assert_eq!(gate.wait(None).await, GateOutcome::Skipped);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
        assert!(sleeper.slept.lock().unwrap().is_empty());
        assert!(reporter.lines.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ready_on_attempt_k_probes_k_times_and_sleeps_k_minus_one() {
        for k in [1, 2, 7, 30] {
            let probe = ScriptedProbe::new(Some(k));
            let sleeper = CountingSleeper::default();
            let gate = ReadinessGate::new(
                probe.clone(),
                sleeper.clone(),
                NullReporter,
                RetryPolicy::default(),
            );

            let outcome = gate.wait(Some(&target())).await;
            assert_eq!(outcome, GateOutcome::Ready { attempts: k });
            assert_eq!(probe.calls.load(Ordering::SeqCst), k);
            assert_eq!(sleeper.slept.lock().unwrap().len() as u32, k - 1);
        }
    }

    #[tokio::test]
    async fn never_ready_exhausts_thirty_attempts_and_proceeds() {
        let probe = ScriptedProbe::new(None);
        let sleeper = CountingSleeper::default();
        let gate = ReadinessGate::new(
            probe.clone(),
            sleeper.clone(),
            NullReporter,
            RetryPolicy::default(),
        );

        let outcome = gate.wait(Some(&target())).await;
        assert_eq!(outcome, GateOutcome::TimedOut { attempts: 30 });
        assert!(!outcome.is_ready());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 30);
        let slept = sleeper.slept.lock().unwrap();
        assert_eq!(slept.len(), 30);
        assert!(slept.iter().all(|d| *d == Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn reports_progress_with_attempt_and_bound() {
        let reporter = RecordingReporter::default();
        let gate = ReadinessGate::new(
            ScriptedProbe::new(Some(3)),
            CountingSleeper::default(),
            &reporter,
            RetryPolicy::new(5, Duration::ZERO),
        );

        gate.wait(Some(&target())).await;
        assert_eq!(
            *reporter.lines.lock().unwrap(),
            vec!["waiting 1/5", "waiting 2/5", "ready 3"]
        );
    }

    #[tokio::test]
    async fn timeout_is_reported_after_last_wait() {
        let reporter = RecordingReporter::default();
        let gate = ReadinessGate::new(
            ScriptedProbe::new(None),
            CountingSleeper::default(),
            &reporter,
            RetryPolicy::new(2, Duration::ZERO),
        );

        assert_eq!(
            gate.wait(Some(&target())).await,
            GateOutcome::TimedOut { attempts: 2 }
        );
        assert_eq!(
            *reporter.lines.lock().unwrap(),
            vec!["waiting 1/2", "waiting 2/2", "timed out 2"]
        );
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.interval(), Duration::from_millis(10));
        assert_eq!(RetryPolicy::default().max_attempts(), 30);
    }

    #[test]
    fn outcome_attempt_counts() {
        assert_eq!(GateOutcome::Skipped.attempts(), 0);
        assert_eq!(GateOutcome::Ready { attempts: 4 }.attempts(), 4);
        assert_eq!(GateOutcome::TimedOut { attempts: 30 }.attempts(), 30);
    }
}
