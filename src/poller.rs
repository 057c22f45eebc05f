use crate::backoff::Backoff;
use crate::policy::{Classification, ConvergencePolicy, Label};
use crate::probe::StatusProbe;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Deadline used when the timeout does not fit into an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// One probe invocation which observed a pending state.
#[derive(Clone, Debug)]
pub struct PollAttempt<T> {
    /// 1-based number of the probe call.
    pub attempt: u32,
    pub at: Instant,
    pub label: Label,
    pub snapshot: Option<T>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Probe,
    UnexpectedState,
    Timeout,
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum WaitError<T, E> {
    #[error("error waiting for {activity}: probe failed on attempt {attempt}")]
    Probe {
        activity: String,
        attempt: u32,
        source: E,
    },
    #[error("error waiting for {activity}: unexpected state '{label}'")]
    UnexpectedState {
        activity: String,
        label: Label,
        snapshot: Option<T>,
    },
    #[error(
        "error waiting for {activity}: timeout after {} (last state: {})",
        humanize(.elapsed),
        last_state(.last)
    )]
    Timeout {
        activity: String,
        elapsed: Duration,
        last: Option<PollAttempt<T>>,
    },
    #[error("error waiting for {activity}: cancelled (last state: {})", last_state(.last))]
    Cancelled {
        activity: String,
        last: Option<PollAttempt<T>>,
    },
}

fn humanize(elapsed: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*elapsed)
}

fn last_state<T>(last: &Option<PollAttempt<T>>) -> String {
    match last {
        Some(attempt) => attempt.label.to_string(),
        None => "none".to_string(),
    }
}

impl<T, E> WaitError<T, E> {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Probe { .. } => FailureKind::Probe,
            Self::UnexpectedState { .. } => FailureKind::UnexpectedState,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Cancelled { .. } => FailureKind::Cancelled,
        }
    }

    /// The last label observed before the wait failed, if any.
    pub fn last_label(&self) -> Option<&Label> {
        match self {
            Self::Probe { .. } => None,
            Self::UnexpectedState { label, .. } => Some(label),
            Self::Timeout { last, .. } | Self::Cancelled { last, .. } => {
                last.as_ref().map(|attempt| &attempt.label)
            }
        }
    }
}

pub type WaitResult<P> = Result<
    Option<<P as StatusProbe>::Snapshot>,
    WaitError<<P as StatusProbe>::Snapshot, <P as StatusProbe>::Error>,
>;

/// Blocking wait for a remote resource to reach its target state.
///
/// Created for one wait operation. Sleeps for the policy's initial delay, then
/// alternates between a single probe call and a backoff sleep until the probe
/// reports the target state, the deadline passes, the probe fails, an
/// unrecognized state shows up, or the wait is cancelled.
pub struct Poller<P>
where
    P: StatusProbe,
{
    policy: ConvergencePolicy,
    probe: P,
    activity: String,
    cancel: CancellationToken,
}

impl<P> Poller<P>
where
    P: StatusProbe,
{
    pub fn new(policy: ConvergencePolicy, probe: P) -> Self {
        let activity = format!("state '{}'", policy.target());
        Self {
            policy,
            probe,
            activity,
            cancel: CancellationToken::new(),
        }
    }

    /// Describe what is being waited for, e.g. "DB instance to be available".
    pub fn activity<S: Into<String>>(mut self, activity: S) -> Self {
        self.activity = activity.into();
        self
    }

    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the wait to completion.
    ///
    /// Returns the snapshot of the final probe call, which is `None` when the
    /// target is the absent label and the resource is gone.
    pub async fn wait(self) -> WaitResult<P> {
        let Self {
            policy,
            mut probe,
            activity,
            cancel,
        } = self;

        let started = Instant::now();

        let initial_delay = policy.initial_delay();
        if !initial_delay.is_zero() {
            log::debug!(
                "Waiting {} before checking for {activity}",
                humantime::format_duration(initial_delay)
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(WaitError::Cancelled { activity, last: None });
                }
                _ = sleep(initial_delay) => {}
            }
        }

        let now = Instant::now();
        let deadline = now
            .checked_add(policy.timeout())
            .unwrap_or_else(|| now + FAR_FUTURE);
        let mut backoff = Backoff::new(policy.min_interval(), policy.backoff_factor());
        let mut last: Option<PollAttempt<P::Snapshot>> = None;
        let mut attempt = 0u32;
        let mut not_found = 0u32;

        loop {
            // cancellation wins over the deadline only when observed first
            if cancel.is_cancelled() {
                log::info!("Cancelled waiting for {activity}");
                return Err(WaitError::Cancelled { activity, last });
            }
            let now = Instant::now();
            if now >= deadline {
                let elapsed = now - started;
                log::warn!(
                    "Timeout waiting for {activity} after {}, last state: {}",
                    humantime::format_duration(elapsed),
                    last_state(&last)
                );
                return Err(WaitError::Timeout {
                    activity,
                    elapsed,
                    last,
                });
            }

            attempt += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::info!("Cancelled waiting for {activity}");
                    return Err(WaitError::Cancelled { activity, last });
                }
                result = probe.probe() => result,
            };
            let at = Instant::now();

            let observation = match result {
                Ok(observation) => observation,
                Err(source) => {
                    log::warn!("Failed to check state for {activity}: {source}");
                    return Err(WaitError::Probe {
                        activity,
                        attempt,
                        source,
                    });
                }
            };

            let label = observation.label();
            let mut classification = policy.classify(&label);
            if label.is_absent() {
                if classification == Classification::Unexpected
                    && not_found < policy.not_found_checks()
                {
                    not_found += 1;
                    log::debug!(
                        "Resource for {activity} not found yet ({not_found}/{})",
                        policy.not_found_checks()
                    );
                    classification = Classification::Pending;
                }
            } else {
                not_found = 0;
            }

            match classification {
                Classification::Target => {
                    log::info!(
                        "Done waiting for {activity}: reached {label} after {attempt} attempt(s) in {}",
                        humantime::format_duration(at - started)
                    );
                    return Ok(observation.into_snapshot());
                }
                Classification::Unexpected => {
                    log::warn!("Unexpected state while waiting for {activity}: {label}");
                    return Err(WaitError::UnexpectedState {
                        activity,
                        label,
                        snapshot: observation.into_snapshot(),
                    });
                }
                Classification::Pending => {
                    let remaining = deadline.saturating_duration_since(at);
                    let delay = backoff.next(remaining);
                    log::debug!(
                        "Still waiting for {activity}: {label} (attempt {attempt}), next check in {}",
                        humantime::format_duration(delay)
                    );
                    last = Some(PollAttempt {
                        attempt,
                        at,
                        label,
                        snapshot: observation.into_snapshot(),
                    });

                    // no point sleeping past the deadline
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            log::info!("Cancelled waiting for {activity}");
                            return Err(WaitError::Cancelled { activity, last });
                        }
                        _ = sleep(delay.min(remaining)) => {}
                    }
                }
            }
        }
    }
}

/// Wait for `probe` to converge according to `policy`.
pub async fn wait<P>(policy: ConvergencePolicy, probe: P) -> WaitResult<P>
where
    P: StatusProbe,
{
    Poller::new(policy, probe).wait().await
}
