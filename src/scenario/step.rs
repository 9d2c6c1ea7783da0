//! Typed scenario steps
//!
//! One step per scenario line, produced by [`super::parser`] and executed
//! by the runner in declared order.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::phase::PodPhase;
use crate::{Error, Result};

/// The kind of object a step targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// A cluster node
    Node,
    /// A namespaced pod
    Pod,
}

impl ObjectKind {
    /// Singular lowercase spelling, as used in the DSL
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Node => "node",
            ObjectKind::Pod => "pod",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A group/version/kind triple for api-probe assertions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Gvk {
    /// API group; empty for the core group
    pub group: String,
    /// API version, e.g. `v1`
    pub version: String,
    /// Resource kind with its original casing, e.g. `Job`
    pub kind: String,
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.kind)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.kind)
        }
    }
}

/// One atomic instruction in a scenario
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Count objects (or probe an API kind), optionally retrying
    Assert(AssertStep),
    /// Create nodes, pods, or an arbitrary resource from a file
    Create(CreateStep),
    /// Move pods from one phase to another
    Change(ChangeStep),
    /// Delete nodes, pods, or an arbitrary resource from a file
    Delete(DeleteStep),
}

/// Expectation over the control plane's current state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssertStep {
    /// Exact number of objects expected; 0 for api probes
    pub count: u64,
    /// Restrict to objects labeled `np.class=<class>`
    pub class: Option<String>,
    /// The object kind counted; `None` for api probes
    pub object: Option<ObjectKind>,
    /// Restrict pods to this status phase
    pub phase: Option<PodPhase>,
    /// Retry window; absent means a single evaluation
    pub within: Option<Duration>,
    /// API kind probed for existence instead of counting objects
    pub gvk: Option<Gvk>,
}

/// Instantiation of a class or a resource file
#[derive(Debug, Clone, PartialEq)]
pub struct CreateStep {
    /// Number of instances to create
    pub count: u64,
    /// Class to instantiate; `None` in the file form
    pub class: Option<String>,
    /// Kind instantiated from the class; `None` in the file form
    pub object: Option<ObjectKind>,
    /// Resource descriptor path, relative to the scenario's directory
    pub path: Option<PathBuf>,
}

/// Forced phase transition over pods of one class
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeStep {
    /// Number of pods to transition
    pub count: u64,
    /// Class selecting the candidate pods
    pub class: String,
    /// Kind being changed; only pods are supported
    pub object: ObjectKind,
    /// Phase the candidates must currently be in
    pub from: PodPhase,
    /// Phase to move them to; must differ from `from`
    pub to: PodPhase,
}

impl ChangeStep {
    /// Reject a transition from a phase to itself.
    pub fn validate(&self) -> Result<()> {
        if self.from == self.to {
            return Err(Error::transition(format!(
                "cannot change pods from phase {} to itself",
                self.from
            )));
        }
        Ok(())
    }
}

/// Removal of class instances or a resource file
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStep {
    /// Number of instances to delete
    pub count: u64,
    /// Class selecting the candidates; `None` in the file form
    pub class: Option<String>,
    /// Kind being deleted; `None` in the file form
    pub object: Option<ObjectKind>,
    /// Resource descriptor path, relative to the scenario's directory
    pub path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_to_same_phase_is_rejected() {
        let step = ChangeStep {
            count: 1,
            class: "1-cpu".to_string(),
            object: ObjectKind::Pod,
            from: PodPhase::Running,
            to: PodPhase::Running,
        };
        let err = step.validate().unwrap_err();
        assert!(matches!(err, Error::Transition(_)));
        assert!(err.to_string().contains("Running"));
    }

    #[test]
    fn test_change_between_phases_is_valid() {
        let step = ChangeStep {
            count: 1,
            class: "1-cpu".to_string(),
            object: ObjectKind::Pod,
            from: PodPhase::Pending,
            to: PodPhase::Running,
        };
        assert!(step.validate().is_ok());
    }

    #[test]
    fn test_gvk_display() {
        let core = Gvk {
            group: String::new(),
            version: "v1".to_string(),
            kind: "Pod".to_string(),
        };
        assert_eq!(core.to_string(), "v1/Pod");

        let grouped = Gvk {
            group: "batch".to_string(),
            version: "v1".to_string(),
            kind: "Job".to_string(),
        };
        assert_eq!(grouped.to_string(), "batch/v1/Job");
    }
}
