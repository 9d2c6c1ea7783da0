//! Pure helpers over pod objects
//!
//! Pods declare their simulated behavior through well-known labels; these
//! functions read them with defaults, so they are total.

use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;

use crate::duration;
use crate::phase::PodPhase;

/// Label declaring the phase a pod finishes in
pub const POD_PHASE_LABEL: &str = "np.terminalPhase";
/// Label declaring how long a pod stays Running
pub const POD_DURATION_LABEL: &str = "np.runDuration";

const DEFAULT_RUN_DURATION: Duration = Duration::from_secs(1);

fn label<'a>(pod: &'a Pod, key: &str) -> Option<&'a str> {
    pod.metadata.labels.as_ref()?.get(key).map(String::as_str)
}

/// The terminal phase declared in the pod's labels.
///
/// Unset or unrecognized values default to Succeeded.
pub fn terminal_phase(pod: &Pod) -> PodPhase {
    match label(pod, POD_PHASE_LABEL) {
        Some("Failed") => PodPhase::Failed,
        _ => PodPhase::Succeeded,
    }
}

/// The run duration declared in the pod's labels.
///
/// Unset or unparseable values default to 1 second.
pub fn run_duration(pod: &Pod) -> Duration {
    label(pod, POD_DURATION_LABEL)
        .and_then(|raw| duration::parse(raw).ok())
        .unwrap_or(DEFAULT_RUN_DURATION)
}

/// The most recent Ready condition transition time, if any.
pub fn ready_since(pod: &Pod) -> Option<DateTime<Utc>> {
    pod.status
        .as_ref()?
        .conditions
        .as_ref()?
        .iter()
        .filter(|c| c.type_ == "Ready")
        .filter_map(|c| c.last_transition_time.as_ref())
        .map(|t| t.0)
        .max()
}

/// The instant the pod's simulated compute time runs out: the most recent
/// Ready transition plus the declared run duration.
pub fn expiry_deadline(pod: &Pod) -> Option<DateTime<Utc>> {
    let ready = ready_since(pod)?;
    let run = chrono::Duration::from_std(run_duration(pod)).ok()?;
    Some(ready + run)
}

/// Whether the pod's expiry deadline has passed.
pub fn is_expired(pod: &Pod, now: DateTime<Utc>) -> bool {
    expiry_deadline(pod).is_some_and(|deadline| deadline < now)
}
