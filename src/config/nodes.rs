//! Node class configuration
//!
//! A node config declares the classes of simulated nodes a fleet consists
//! of: how many replicas of each, which labels they carry, and the capacity
//! and allocatable they advertise at registration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::node::NODE_CLASS_LABEL;
use crate::{Error, Result, FLEET_LABEL};

use super::ec2;

/// Declarative description of a fleet of simulated nodes
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeConfig {
    /// The node classes making up the fleet
    pub node_classes: Vec<NodeClass>,
}

/// One class of identical simulated nodes
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeClass {
    /// Class name, unique within the config after lowercasing
    pub name: String,
    /// Number of replicas a fleet start expands this class into
    pub count: u32,
    /// Labels applied to every node of this class
    pub labels: BTreeMap<String, String>,
    /// Capacity and allocatable advertised at registration
    pub resources: NodeResources,
}

/// Capacity and allocatable quantity strings, keyed by resource name
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeResources {
    /// Total resources the node claims to have
    pub capacity: BTreeMap<String, String>,
    /// Resources the node claims are schedulable
    pub allocatable: BTreeMap<String, String>,
}

impl NodeConfig {
    /// Load and validate a node config from a YAML file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&data)
    }

    /// Parse and validate a node config from YAML text.
    ///
    /// Class names are lowercased. Duplicate names are rejected. Classes
    /// named after an EC2 instance type that declare no capacity are filled
    /// in from the instance-type table and stamped with the fleet labels.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let mut config: NodeConfig = serde_yaml::from_str(data)
            .map_err(|e| Error::parse(data.trim(), format!("invalid node config: {e}")))?;

        let mut seen = std::collections::HashSet::new();
        for class in &mut config.node_classes {
            class.name = class.name.to_lowercase();
            if !seen.insert(class.name.clone()) {
                return Err(Error::config(format!(
                    "node class name `{}` is not unique",
                    class.name
                )));
            }
            if class.resources.capacity.is_empty() {
                if let Some(resources) = ec2::lookup(&class.name) {
                    class.resources = resources;
                    class.labels = BTreeMap::from([
                        (FLEET_LABEL.to_string(), "true".to_string()),
                        (NODE_CLASS_LABEL.to_string(), class.name.clone()),
                    ]);
                }
            }
        }

        Ok(config)
    }

    /// Find a class by its (lowercased) name.
    pub fn class(&self, name: &str) -> Option<&NodeClass> {
        self.node_classes.iter().find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
nodeClasses:
  - name: small
    count: 2
    labels:
      tier: dev
    resources:
      capacity:
        cpu: "4"
        memory: 8Gi
      allocatable:
        cpu: "4"
        memory: 8Gi
  - name: large
    count: 1
    resources:
      capacity:
        cpu: "64"
        memory: 512Gi
"#;

    #[test]
    fn test_parses_classes() {
        let config = NodeConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.node_classes.len(), 2);

        let small = config.class("small").unwrap();
        assert_eq!(small.count, 2);
        assert_eq!(small.labels.get("tier").unwrap(), "dev");
        assert_eq!(small.resources.capacity.get("cpu").unwrap(), "4");
        assert_eq!(small.resources.allocatable.get("memory").unwrap(), "8Gi");

        let large = config.class("large").unwrap();
        assert!(large.resources.allocatable.is_empty());
    }

    #[test]
    fn test_names_are_lowercased() {
        let config = NodeConfig::from_yaml("nodeClasses:\n  - name: Small\n    count: 1\n").unwrap();
        assert!(config.class("small").is_some());
        assert!(config.class("Small").is_none());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let doc = "nodeClasses:\n  - name: small\n  - name: SMALL\n";
        let err = NodeConfig::from_yaml(doc).unwrap_err();
        assert!(err.to_string().contains("not unique"));
    }

    #[test]
    fn test_ec2_backfill_fills_resources_and_labels() {
        let config = NodeConfig::from_yaml("nodeClasses:\n  - name: m5.xlarge\n    count: 3\n").unwrap();
        let class = config.class("m5.xlarge").unwrap();
        assert_eq!(class.resources.capacity.get("cpu").unwrap(), "4");
        assert_eq!(class.resources.allocatable.get("memory").unwrap(), "16Gi");
        assert_eq!(class.labels.get(FLEET_LABEL).unwrap(), "true");
        assert_eq!(class.labels.get(NODE_CLASS_LABEL).unwrap(), "m5.xlarge");
    }

    #[test]
    fn test_ec2_backfill_skipped_when_capacity_declared() {
        let doc = "nodeClasses:\n  - name: m5.xlarge\n    resources:\n      capacity:\n        cpu: \"1\"\n";
        let config = NodeConfig::from_yaml(doc).unwrap();
        let class = config.class("m5.xlarge").unwrap();
        assert_eq!(class.resources.capacity.get("cpu").unwrap(), "1");
        assert!(class.labels.is_empty());
    }

    #[test]
    fn test_malformed_yaml_is_a_parse_error() {
        let err = NodeConfig::from_yaml("nodeClasses: {not a list}").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
