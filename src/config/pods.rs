//! Pod class configuration
//!
//! Pod classes give scenario steps named, reusable pod templates. The
//! workload spec is opaque to the simulator and forwarded to the control
//! plane unchanged.

use std::collections::BTreeMap;
use std::path::Path;

use k8s_openapi::api::core::v1::PodSpec;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Declarative set of pod templates available to scenario steps
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PodConfig {
    /// The pod classes scenario steps can instantiate
    pub pod_classes: Vec<PodClass>,
}

/// One named pod template
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PodClass {
    /// Class name, unique within the config after lowercasing
    pub name: String,
    /// Default instance count, informational for callers
    pub count: u32,
    /// Labels applied to every pod of this class
    pub labels: BTreeMap<String, String>,
    /// Pod spec submitted to the control plane as-is
    pub spec: PodSpec,
}

impl PodConfig {
    /// Load and validate a pod config from a YAML file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&data)
    }

    /// Parse and validate a pod config from YAML text.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let mut config: PodConfig = serde_yaml::from_str(data)
            .map_err(|e| Error::parse(data.trim(), format!("invalid pod config: {e}")))?;

        let mut seen = std::collections::HashSet::new();
        for class in &mut config.pod_classes {
            class.name = class.name.to_lowercase();
            if !seen.insert(class.name.clone()) {
                return Err(Error::config(format!(
                    "pod class name `{}` is not unique",
                    class.name
                )));
            }
        }

        Ok(config)
    }

    /// Find a class by its (lowercased) name.
    pub fn class(&self, name: &str) -> Option<&PodClass> {
        self.pod_classes.iter().find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
podClasses:
  - name: 4-cpu
    count: 1
    labels:
      np.class: 4-cpu
      np.runDuration: 3s
    spec:
      containers:
        - name: main
          image: busybox
          resources:
            requests:
              cpu: "4"
"#;

    #[test]
    fn test_parses_classes_and_spec() {
        let config = PodConfig::from_yaml(SAMPLE).unwrap();
        let class = config.class("4-cpu").unwrap();
        assert_eq!(class.labels.get("np.runDuration").unwrap(), "3s");
        assert_eq!(class.spec.containers.len(), 1);
        assert_eq!(class.spec.containers[0].image.as_deref(), Some("busybox"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let doc = "podClasses:\n  - name: worker\n  - name: Worker\n";
        let err = PodConfig::from_yaml(doc).unwrap_err();
        assert!(err.to_string().contains("not unique"));
    }

    #[test]
    fn test_missing_class() {
        let config = PodConfig::from_yaml(SAMPLE).unwrap();
        assert!(config.class("8-cpu").is_none());
    }
}
