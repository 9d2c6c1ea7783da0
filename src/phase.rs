//! Pod lifecycle phases

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// The lifecycle label of a pod, mirroring the control plane's phase field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PodPhase {
    /// Accepted but not yet running on a node
    Pending,
    /// Bound to a node and executing
    Running,
    /// All containers terminated successfully
    Succeeded,
    /// At least one container terminated in failure
    Failed,
    /// The node stopped reporting
    Unknown,
}

impl PodPhase {
    /// The phase string as the control plane spells it
    pub fn as_str(&self) -> &'static str {
        match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        }
    }

    /// Whether this phase ends the pod's lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, PodPhase::Succeeded | PodPhase::Failed)
    }

    /// Whether a pod in this phase matches the given status string
    pub fn matches(&self, status_phase: Option<&str>) -> bool {
        status_phase == Some(self.as_str())
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PodPhase {
    type Err = Error;

    /// Parses a phase, title-casing the input first so that `running`,
    /// `Running` and `RUNNING` all resolve to [`PodPhase::Running`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match title_case(s.trim()).as_str() {
            "Pending" => Ok(PodPhase::Pending),
            "Running" => Ok(PodPhase::Running),
            "Succeeded" => Ok(PodPhase::Succeeded),
            "Failed" => Ok(PodPhase::Failed),
            "Unknown" => Ok(PodPhase::Unknown),
            other => Err(Error::parse(
                s,
                format!(
                    "phase must be one of Pending, Running, Succeeded, Failed or Unknown (found `{other}`)"
                ),
            )),
        }
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
