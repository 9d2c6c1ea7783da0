//! Per-node cache of bound pods
//!
//! The watch consumer is the only writer; the phase driver reads snapshots
//! and writes back through the control plane, so the set holds no lock
//! across any suspension point.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

use crate::phase::PodPhase;

use super::podutil;

/// Thread-safe name-keyed collection of the pods bound to one node
#[derive(Debug, Default)]
pub struct PodSet {
    pods: RwLock<HashMap<String, Pod>>,
}

impl PodSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pod, replacing any record with the same name.
    pub fn add(&self, pod: Pod) {
        let mut pods = self.pods.write().expect("podset lock poisoned");
        pods.insert(pod.name_any(), pod);
    }

    /// Drop the record with the pod's name; no-op if absent.
    pub fn remove(&self, pod: &Pod) {
        let mut pods = self.pods.write().expect("podset lock poisoned");
        pods.remove(&pod.name_any());
    }

    /// Replace the record with the pod's name, inserting if absent.
    pub fn update(&self, pod: Pod) {
        self.add(pod);
    }

    /// Snapshot of all pods currently in any of the given phases.
    ///
    /// An empty phase list yields an empty result.
    pub fn of_phase(&self, phases: &[PodPhase]) -> Vec<Pod> {
        let pods = self.pods.read().expect("podset lock poisoned");
        pods.values()
            .filter(|pod| {
                let current = pod.status.as_ref().and_then(|s| s.phase.as_deref());
                phases.iter().any(|phase| phase.matches(current))
            })
            .cloned()
            .collect()
    }

    /// Snapshot of the Running pods whose declared run duration has elapsed
    /// since their most recent Ready transition.
    pub fn expired(&self) -> Vec<Pod> {
        let now = Utc::now();
        self.of_phase(&[PodPhase::Running])
            .into_iter()
            .filter(|pod| podutil::is_expired(pod, now))
            .collect()
    }

    /// Number of pods currently tracked.
    pub fn len(&self) -> usize {
        self.pods.read().expect("podset lock poisoned").len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{PodCondition, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn pod(name: &str, phase: PodPhase) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.status = Some(PodStatus {
            phase: Some(phase.as_str().to_string()),
            ..Default::default()
        });
        pod
    }

    #[test]
    fn test_at_most_one_record_per_name() {
        let set = PodSet::new();
        set.add(pod("a", PodPhase::Pending));
        set.add(pod("a", PodPhase::Running));
        assert_eq!(set.len(), 1);
        assert_eq!(set.of_phase(&[PodPhase::Running]).len(), 1);
        assert!(set.of_phase(&[PodPhase::Pending]).is_empty());
    }

    #[test]
    fn test_remove_is_total() {
        let set = PodSet::new();
        set.remove(&pod("ghost", PodPhase::Running));
        assert!(set.is_empty());

        set.add(pod("a", PodPhase::Running));
        set.remove(&pod("a", PodPhase::Running));
        assert!(set.is_empty());
    }

    #[test]
    fn test_update_replaces_by_name() {
        let set = PodSet::new();
        set.add(pod("a", PodPhase::Pending));
        set.update(pod("a", PodPhase::Running));
        assert_eq!(set.len(), 1);
        assert_eq!(set.of_phase(&[PodPhase::Running]).len(), 1);

        // Update of an untracked pod inserts it.
        set.update(pod("b", PodPhase::Pending));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_of_phase_variadic() {
        let set = PodSet::new();
        set.add(pod("a", PodPhase::Pending));
        set.add(pod("b", PodPhase::Running));
        set.add(pod("c", PodPhase::Succeeded));

        assert_eq!(
            set.of_phase(&[PodPhase::Pending, PodPhase::Running]).len(),
            2
        );
        assert!(set.of_phase(&[]).is_empty());
    }

    #[test]
    fn test_expired_restricted_to_running() {
        let set = PodSet::new();
        let past = Time(Utc::now() - chrono::Duration::seconds(30));

        let mut done = pod("done", PodPhase::Succeeded);
        done.status.as_mut().unwrap().conditions = Some(vec![PodCondition {
            type_: "Ready".to_string(),
            status: "True".to_string(),
            last_transition_time: Some(past.clone()),
            ..Default::default()
        }]);
        set.add(done);

        let mut overdue = pod("overdue", PodPhase::Running);
        overdue.status.as_mut().unwrap().conditions = Some(vec![PodCondition {
            type_: "Ready".to_string(),
            status: "True".to_string(),
            last_transition_time: Some(past),
            ..Default::default()
        }]);
        set.add(overdue);

        let fresh = pod("fresh", PodPhase::Running);
        set.add(fresh);

        let expired = set.expired();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].name_any(), "overdue");
    }
}
