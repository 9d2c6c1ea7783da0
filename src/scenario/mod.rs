//! Scenario files
//!
//! A scenario is a YAML document naming an ordered list of raw step lines.
//! Loading parses every line eagerly so malformed scenarios fail before
//! any control-plane interaction.

pub mod parser;
pub mod step;

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

pub use step::{AssertStep, ChangeStep, CreateStep, DeleteStep, Gvk, ObjectKind, Step};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScenarioDoc {
    name: String,
    version: u64,
    steps: Vec<String>,
}

/// A parsed scenario: metadata, the raw step lines, and their typed forms
#[derive(Debug)]
pub struct Scenario {
    /// Scenario name, for logging
    pub name: String,
    /// Schema version declared by the file
    pub version: u64,
    /// The step lines exactly as written
    pub raw_steps: Vec<String>,
    /// One typed step per raw line, in order
    pub steps: Vec<Step>,
    /// Directory that relative file paths in steps resolve against
    pub working_dir: PathBuf,
}

impl Scenario {
    /// Load a scenario from a YAML file.
    ///
    /// The scenario's working directory becomes the file's directory.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read_to_string(path).await?;
        let mut scenario = Self::from_yaml(&data)?;
        scenario.working_dir = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
        Ok(scenario)
    }

    /// Parse a scenario from YAML text.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let doc: ScenarioDoc = serde_yaml::from_str(data)
            .map_err(|e| Error::parse(data.trim(), format!("invalid scenario: {e}")))?;

        let steps = parser::parse_steps(&doc.steps)?;
        // One typed step per input line, always; anything else is a parser bug.
        if steps.len() != doc.steps.len() {
            return Err(Error::parse(
                doc.name.clone(),
                format!(
                    "number of parsed steps ({}) does not equal raw input steps ({})",
                    steps.len(),
                    doc.steps.len()
                ),
            ));
        }

        Ok(Self {
            name: doc.name,
            version: doc.version,
            raw_steps: doc.steps,
            steps,
            working_dir: PathBuf::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
name: pod-lifecycle
version: 1
steps:
  - create 1 large node
  - assert 1 large node
  - create 1 4-cpu pod
  - assert 1 4-cpu pod is Running within 4s
  - delete 1 4-cpu pod
  - assert 0 4-cpu pods within 4s
"#;

    #[test]
    fn test_parses_all_steps_in_order() {
        let scenario = Scenario::from_yaml(SAMPLE).unwrap();
        assert_eq!(scenario.name, "pod-lifecycle");
        assert_eq!(scenario.version, 1);
        assert_eq!(scenario.steps.len(), scenario.raw_steps.len());
        assert!(matches!(scenario.steps[0], Step::Create(_)));
        assert!(matches!(scenario.steps[5], Step::Assert(_)));
    }

    #[test]
    fn test_malformed_step_names_line() {
        let doc = "name: bad\nsteps:\n  - assert 1 pod\n  - frobnicate 1 pod\n";
        let err = Scenario::from_yaml(doc).unwrap_err();
        assert!(err.to_string().contains("step [1]"));
    }

    #[test]
    fn test_empty_scenario() {
        let scenario = Scenario::from_yaml("name: empty\n").unwrap();
        assert!(scenario.steps.is_empty());
    }

    #[tokio::test]
    async fn test_from_file_sets_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.yml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let scenario = Scenario::from_file(&path).await.unwrap();
        assert_eq!(scenario.working_dir, dir.path());
    }
}
