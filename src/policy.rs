use indexmap::IndexSet;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Symbolic state of a remote resource, compared only for equality.
///
/// The empty label is reserved for "the resource does not exist".
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    pub fn new<S: Into<String>>(label: S) -> Self {
        Self(label.into())
    }

    pub const fn absent() -> Self {
        Self(String::new())
    }

    pub fn is_absent(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_absent() {
            f.write_str("<absent>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PolicyError {
    #[error("target state '{0}' is also declared as pending")]
    Overlap(Label),
    #[error("minimum poll interval must not be zero")]
    ZeroInterval,
    #[error("timeout must not be zero")]
    ZeroTimeout,
    #[error("backoff factor must be a finite value of at least 1.0, got {0}")]
    InvalidFactor(f64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    Target,
    Pending,
    Unexpected,
}

pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.5;

/// Which states mean "in progress" and which one means "done", plus timing.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvergencePolicy {
    pending: IndexSet<Label>,
    target: Label,
    initial_delay: Duration,
    min_interval: Duration,
    timeout: Duration,
    backoff_factor: f64,
    not_found_checks: u32,
}

impl ConvergencePolicy {
    pub fn builder<L: Into<Label>>(target: L) -> ConvergencePolicyBuilder {
        ConvergencePolicyBuilder::new(target.into())
    }

    pub fn pending(&self) -> &IndexSet<Label> {
        &self.pending
    }

    pub fn target(&self) -> &Label {
        &self.target
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    /// Number of consecutive "absent" observations tolerated as pending while
    /// waiting for a non-absent target.
    pub fn not_found_checks(&self) -> u32 {
        self.not_found_checks
    }

    pub fn classify(&self, label: &Label) -> Classification {
        if *label == self.target {
            Classification::Target
        } else if self.pending.contains(label) {
            Classification::Pending
        } else {
            Classification::Unexpected
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConvergencePolicyBuilder {
    pending: IndexSet<Label>,
    target: Label,
    initial_delay: Duration,
    min_interval: Duration,
    timeout: Duration,
    backoff_factor: f64,
    not_found_checks: u32,
}

impl ConvergencePolicyBuilder {
    fn new(target: Label) -> Self {
        Self {
            pending: IndexSet::new(),
            target,
            initial_delay: Duration::ZERO,
            min_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            not_found_checks: 0,
        }
    }

    pub fn pending<I, L>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Label>,
    {
        self.pending.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub fn min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    pub fn not_found_checks(mut self, not_found_checks: u32) -> Self {
        self.not_found_checks = not_found_checks;
        self
    }

    pub fn build(self) -> Result<ConvergencePolicy, PolicyError> {
        if self.pending.contains(&self.target) {
            return Err(PolicyError::Overlap(self.target));
        }
        if self.min_interval.is_zero() {
            return Err(PolicyError::ZeroInterval);
        }
        if self.timeout.is_zero() {
            return Err(PolicyError::ZeroTimeout);
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(PolicyError::InvalidFactor(self.backoff_factor));
        }

        Ok(ConvergencePolicy {
            pending: self.pending,
            target: self.target,
            initial_delay: self.initial_delay,
            min_interval: self.min_interval,
            timeout: self.timeout,
            backoff_factor: self.backoff_factor,
            not_found_checks: self.not_found_checks,
        })
    }
}

/// Serialized form of a policy, validated through the builder.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    #[serde(default)]
    pub pending: Vec<Label>,
    #[serde(default)]
    pub target: Label,
    #[serde(default, with = "humantime_serde")]
    pub initial_delay: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub min_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default)]
    pub backoff_factor: Option<f64>,
    #[serde(default)]
    pub not_found_checks: u32,
}

impl TryFrom<PolicySpec> for ConvergencePolicy {
    type Error = PolicyError;

    fn try_from(spec: PolicySpec) -> Result<Self, Self::Error> {
        ConvergencePolicy::builder(spec.target)
            .pending(spec.pending)
            .initial_delay(spec.initial_delay.unwrap_or_default())
            .min_interval(spec.min_interval)
            .timeout(spec.timeout)
            .backoff_factor(spec.backoff_factor.unwrap_or(DEFAULT_BACKOFF_FACTOR))
            .not_found_checks(spec.not_found_checks)
            .build()
    }
}

impl<'de> serde::Deserialize<'de> for ConvergencePolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let spec = <PolicySpec as serde::Deserialize>::deserialize(deserializer)?;
        ConvergencePolicy::try_from(spec).map_err(serde::de::Error::custom)
    }
}

/// Policies for the resource lifecycles this crate is commonly used with.
pub mod presets {
    use super::{ConvergencePolicy, Label};
    use std::time::Duration;

    const MINUTE: Duration = Duration::from_secs(60);

    /// A freshly created database instance becoming available.
    pub fn db_instance_available() -> ConvergencePolicy {
        ConvergencePolicy {
            pending: ["creating", "backing-up", "modifying"]
                .into_iter()
                .map(Label::from)
                .collect(),
            target: Label::from("available"),
            initial_delay: Duration::from_secs(30),
            min_interval: Duration::from_secs(10),
            timeout: 20 * MINUTE,
            backoff_factor: super::DEFAULT_BACKOFF_FACTOR,
            not_found_checks: 0,
        }
    }

    /// A database instance disappearing after deletion.
    pub fn db_instance_deleted() -> ConvergencePolicy {
        ConvergencePolicy {
            pending: ["creating", "backing-up", "modifying", "deleting", "available"]
                .into_iter()
                .map(Label::from)
                .collect(),
            target: Label::absent(),
            ..db_instance_available()
        }
    }

    /// A zonal compute operation reaching `DONE`.
    pub fn zone_operation_done() -> ConvergencePolicy {
        ConvergencePolicy {
            pending: ["PENDING", "RUNNING"].into_iter().map(Label::from).collect(),
            target: Label::from("DONE"),
            initial_delay: Duration::from_secs(10),
            min_interval: Duration::from_secs(2),
            timeout: 10 * MINUTE,
            backoff_factor: super::DEFAULT_BACKOFF_FACTOR,
            not_found_checks: 0,
        }
    }
}
