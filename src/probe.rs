use crate::policy::Label;
use async_trait::async_trait;
use std::future::Future;

/// Result of a single successful status check.
#[derive(Clone, Debug, PartialEq)]
pub enum Observation<T> {
    /// The resource exists and is in state `label`.
    Present { snapshot: T, label: Label },
    /// The resource does not exist.
    Absent,
}

impl<T> Observation<T> {
    pub fn present<L: Into<Label>>(snapshot: T, label: L) -> Self {
        Self::Present {
            snapshot,
            label: label.into(),
        }
    }

    pub fn label(&self) -> Label {
        match self {
            Self::Present { label, .. } => label.clone(),
            Self::Absent => Label::absent(),
        }
    }

    pub fn into_snapshot(self) -> Option<T> {
        match self {
            Self::Present { snapshot, .. } => Some(snapshot),
            Self::Absent => None,
        }
    }
}

/// One remote status check per invocation.
///
/// Implementations must be free of side effects beyond the remote read, and
/// bound their own call duration.
#[async_trait]
pub trait StatusProbe: Send {
    type Snapshot: Send;
    type Error: std::error::Error + Send + Sync + 'static;

    async fn probe(&mut self) -> Result<Observation<Self::Snapshot>, Self::Error>;
}

pub struct FnProbe<F>(F);

/// Use a closure returning a future as a probe.
pub fn probe_fn<F, Fut, T, E>(f: F) -> FnProbe<F>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<Observation<T>, E>> + Send + 'static,
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    FnProbe(f)
}

#[async_trait]
impl<F, Fut, T, E> StatusProbe for FnProbe<F>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<Observation<T>, E>> + Send + 'static,
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Snapshot = T;
    type Error = E;

    async fn probe(&mut self) -> Result<Observation<T>, E> {
        (self.0)().await
    }
}
