mod backoff;
mod client;
pub mod config;
mod operator;
pub mod policy;
mod poller;
mod probe;

pub use backoff::Backoff;
pub use client::{extract_label, ProbeError, ResourceClient, ResourceClientBuilder, ResourceProbe};
pub use operator::*;
pub use policy::{presets, Classification, ConvergencePolicy, Label, PolicyError};
pub use poller::{wait, FailureKind, PollAttempt, Poller, WaitError, WaitResult};
pub use probe::{probe_fn, FnProbe, Observation, StatusProbe};

use anyhow::Context;
use drogue_bazaar::app::{Startup, StartupExt};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Clone, Debug, serde::Deserialize)]
pub struct Config {
    operator: OperatorConfig,
    client: ClientConfig,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct OperatorConfig {
    /// Path to the watch file (YAML)
    watches: PathBuf,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct ClientConfig {
    /// API URL
    url: Url,

    /// User for authenticating to the API
    #[serde(default)]
    user: Option<String>,

    /// Token for authenticating to the API
    #[serde(default)]
    token: Option<String>,

    #[serde(flatten)]
    tls: drogue_bazaar::core::tls::ClientConfig,
}

pub async fn run(config: Config, startup: &mut dyn Startup) -> anyhow::Result<()> {
    log::info!("Config: {config:#?}");

    let watches = crate::config::load(&config.operator.watches).with_context(|| {
        format!(
            "Failed to load watches from {}",
            config.operator.watches.display()
        )
    })?;

    let client = config.client;
    let mut builder = ResourceClientBuilder::from_url(client.url).client(client.tls);
    if let (Some(user), Some(token)) = (client.user, client.token) {
        builder = builder.access_token(user, token);
    }
    let client = builder.build()?;

    let cancel = CancellationToken::new();
    let operator = Operator::new(client, watches.watches, cancel.clone());

    log::info!("Starting to wait");

    startup.spawn(async move {
        let run = operator.run();
        tokio::pin!(run);
        let outcomes = tokio::select! {
            outcomes = &mut run => Some(outcomes),
            _ = tokio::signal::ctrl_c() => None,
        };
        let outcomes = match outcomes {
            Some(outcomes) => outcomes,
            None => {
                log::info!("Shutting down");
                cancel.cancel();
                run.await
            }
        };
        summarize(&outcomes)
    });

    Ok(())
}
