//! Job class configuration
//!
//! Mirrors [`super::pods`] for batch jobs: named, reusable job templates
//! for embedding test suites. The job spec is forwarded unchanged.

use std::collections::BTreeMap;
use std::path::Path;

use k8s_openapi::api::batch::v1::JobSpec;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Declarative set of job templates
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobConfig {
    /// The job classes available to callers
    pub job_classes: Vec<JobClass>,
}

/// One named job template
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobClass {
    /// Class name, unique within the config after lowercasing
    pub name: String,
    /// Default instance count, informational for callers
    pub count: u32,
    /// Labels applied to every job of this class
    pub labels: BTreeMap<String, String>,
    /// Annotations applied to every job of this class
    pub annotations: BTreeMap<String, String>,
    /// Job spec submitted to the control plane as-is
    pub spec: JobSpec,
}

impl JobConfig {
    /// Load and validate a job config from a YAML file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&data)
    }

    /// Parse and validate a job config from YAML text.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let mut config: JobConfig = serde_yaml::from_str(data)
            .map_err(|e| Error::parse(data.trim(), format!("invalid job config: {e}")))?;

        let mut seen = std::collections::HashSet::new();
        for class in &mut config.job_classes {
            class.name = class.name.to_lowercase();
            if !seen.insert(class.name.clone()) {
                return Err(Error::config(format!(
                    "job class name `{}` is not unique",
                    class.name
                )));
            }
        }

        Ok(config)
    }

    /// Find a class by its (lowercased) name.
    pub fn class(&self, name: &str) -> Option<&JobClass> {
        self.job_classes.iter().find(|c| c.name == name)
    }
}
