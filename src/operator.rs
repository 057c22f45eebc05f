use crate::client::{ResourceClient, ResourceProbe};
use crate::config::Watch;
use crate::poller::{FailureKind, Poller};
use futures::future::join_all;
use indexmap::IndexMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub enum Outcome {
    Converged(Option<Value>),
    Failed { kind: FailureKind, message: String },
}

impl Outcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged(_))
    }
}

/// Waits for a set of independent resources.
pub struct Operator {
    client: ResourceClient,
    watches: IndexMap<String, Watch>,
    cancel: CancellationToken,
}

impl Operator {
    pub fn new(
        client: ResourceClient,
        watches: IndexMap<String, Watch>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            watches,
            cancel,
        }
    }

    async fn watch(&self, name: &str, watch: &Watch) -> Outcome {
        let url = match self.client.url(&watch.path) {
            Ok(url) => url,
            Err(err) => {
                return Outcome::Failed {
                    kind: FailureKind::Probe,
                    message: err.to_string(),
                }
            }
        };

        log::info!("Waiting for {name} ({url}) to reach '{}'", watch.policy.target());

        let probe = ResourceProbe::new(self.client.clone(), url, watch.label.clone());
        let result = Poller::new(watch.policy.clone(), probe)
            .activity(name)
            .cancellation(self.cancel.clone())
            .wait()
            .await;

        match result {
            Ok(snapshot) => Outcome::Converged(snapshot),
            Err(err) => Outcome::Failed {
                kind: err.kind(),
                message: err.to_string(),
            },
        }
    }

    /// Wait for all watches concurrently, each with its own deadline.
    pub async fn run(&self) -> IndexMap<String, Outcome> {
        let outcomes = join_all(
            self.watches
                .iter()
                .map(|(name, watch)| self.watch(name, watch)),
        )
        .await;

        self.watches.keys().cloned().zip(outcomes).collect()
    }
}

/// Turn a set of outcomes into an overall result.
pub fn summarize(outcomes: &IndexMap<String, Outcome>) -> anyhow::Result<()> {
    let mut failed = Vec::new();
    for (name, outcome) in outcomes {
        match outcome {
            Outcome::Converged(_) => log::info!("{name}: converged"),
            Outcome::Failed { kind, message } => {
                log::warn!("{name}: {kind:?}: {message}");
                failed.push(name.as_str());
            }
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("Failed waiting for: {}", failed.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary() {
        let mut outcomes = IndexMap::new();
        outcomes.insert("a".to_string(), Outcome::Converged(None));
        assert!(summarize(&outcomes).is_ok());

        outcomes.insert(
            "b".to_string(),
            Outcome::Failed {
                kind: FailureKind::Timeout,
                message: "timeout".to_string(),
            },
        );
        let err = summarize(&outcomes).unwrap_err();
        assert_eq!(err.to_string(), "Failed waiting for: b");
    }
}
