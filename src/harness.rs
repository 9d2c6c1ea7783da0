//! Library entry point for embedding scenario steps in test suites
//!
//! External test code can drive the control plane with raw step strings
//! without loading a scenario file. Clients are constructed from the
//! `NP_MASTER` / `NP_KCONFIG_PATH` environment variables.

use crate::client::{self, KubeInfo};
use crate::config::{NodeConfig, PodConfig};
use crate::dynamic::DynamicClient;
use crate::runner::ScenarioRunner;
use crate::scenario::parser;
use crate::Result;

use tracing::info;

/// A scenario runner wired up from the environment
pub struct Harness {
    runner: ScenarioRunner,
}

impl Harness {
    /// Construct all clients from the environment and build a runner.
    ///
    /// Steps that reference node or pod classes need the matching config
    /// to be passed here.
    pub async fn new(
        namespace: impl Into<String>,
        node_config: Option<NodeConfig>,
        pod_config: Option<PodConfig>,
    ) -> Result<Self> {
        let info = KubeInfo::from_env()?;
        let namespace = namespace.into();

        let general = client::general_client(&info).await?;
        let heartbeat = client::heartbeat_client(&info).await?;
        let events = client::event_client(&info).await?;
        let dynamic = DynamicClient::new(general.clone(), namespace.clone());

        Ok(Self {
            runner: ScenarioRunner::new(
                general,
                heartbeat,
                events,
                namespace,
                node_config,
                pod_config,
                dynamic,
            ),
        })
    }

    /// Parse and execute one raw step line.
    pub async fn run(&mut self, step: &str) -> Result<()> {
        info!(text = %step, "run step");
        let step = parser::parse_step(step)?;
        self.runner.run_step(&step).await
    }

    /// Best-effort cleanup of everything the harness created.
    pub async fn shutdown(&mut self) {
        self.runner.shutdown().await;
    }
}
