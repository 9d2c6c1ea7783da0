//! Fleet of fake nodes
//!
//! Expands a node config into FakeNodes named `{class}-{i}` and starts and
//! stops them in bulk. Start is sequential and aborts at the first failure;
//! nodes started before the failure stay running until Stop.

use kube::Client;
use tracing::{debug, warn};

use crate::config::NodeConfig;
use crate::node::FakeNode;
use crate::Result;

/// The set of FakeNodes started from one node config
pub struct Fleet {
    nodes: Vec<FakeNode>,
}

impl Fleet {
    /// Expand each node class into `count` FakeNodes.
    pub fn new(config: &NodeConfig) -> Self {
        let mut nodes = Vec::new();
        for class in &config.node_classes {
            debug!(class = %class.name, count = class.count, "making node class");
            for i in 0..class.count {
                let name = format!("{}-{}", class.name, i);
                nodes.push(FakeNode::new(
                    name,
                    &class.name,
                    class.labels.clone(),
                    class.resources.clone(),
                ));
            }
        }
        Self { nodes }
    }

    /// Number of nodes in the fleet.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the fleet is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.nodes.iter().map(FakeNode::name).collect()
    }

    /// Start every node sequentially, aborting on the first failure.
    pub async fn start(&mut self, client: &Client, heartbeat: &Client, events: &Client) -> Result<()> {
        for node in &mut self.nodes {
            node.start(client.clone(), heartbeat.clone(), events.clone())
                .await?;
            debug!(node = %node.name(), "started node");
        }
        Ok(())
    }

    /// Stop every node, regardless of individual failures.
    pub async fn stop(&mut self) {
        for node in &mut self.nodes {
            debug!(node = %node.name(), "stopping node");
            if let Err(e) = node.stop().await {
                warn!(node = %node.name(), error = %e, "failed to stop node");
            }
        }
    }
}
