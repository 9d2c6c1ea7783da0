//! FakeNode lifecycle engine
//!
//! A FakeNode registers a node object with the control plane, watches the
//! pods the scheduler binds to it, drives their phases through a plausible
//! lifecycle, and heartbeats its conditions so the node keeps looking
//! alive. It owns three long-lived tasks (watch consumer, phase driver,
//! heartbeat) tied to one cancellation token.
//!
//! The phase driver never touches the pod cache directly: it reads a
//! snapshot, writes the new phase through the control plane, and relies on
//! the watch stream echoing the change back into the cache.

pub mod podset;
pub mod podutil;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::TryStreamExt;
use k8s_openapi::api::core::v1::{
    Event, EventSource, Node, NodeCondition, NodeStatus, ObjectReference, Pod, PodCondition,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams, WatchEvent, WatchParams};
use kube::{Client, ResourceExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::NodeResources;
use crate::phase::PodPhase;
use crate::{Error, Result};

use self::podset::PodSet;

/// Label identifying the class of a node or pod
pub const NODE_CLASS_LABEL: &str = "np.class";

const PHASE_DRIVER_INTERVAL: Duration = Duration::from_secs(2);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const WATCH_RETRY_DELAY: Duration = Duration::from_secs(1);
const EVENT_NAMESPACE: &str = "default";

/// An in-process simulator of one cluster worker node
pub struct FakeNode {
    name: String,
    class: String,
    labels: BTreeMap<String, String>,
    resources: NodeResources,
    pods: Arc<PodSet>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    client: Option<Client>,
    node: Option<Node>,
}

impl FakeNode {
    /// Create a node that is not yet registered anywhere.
    ///
    /// The class label is merged into the given labels.
    pub fn new(
        name: impl Into<String>,
        class: impl Into<String>,
        mut labels: BTreeMap<String, String>,
        resources: NodeResources,
    ) -> Self {
        let class = class.into();
        labels.insert(NODE_CLASS_LABEL.to_string(), class.clone());
        Self {
            name: name.into(),
            class,
            labels,
            resources,
            pods: Arc::new(PodSet::new()),
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
            client: None,
            node: None,
        }
    }

    /// The node's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The node's class.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Register with the control plane and start the background tasks.
    ///
    /// The watch subscription is established before registration so no pod
    /// binding is missed; the phase driver and heartbeat start once the
    /// node object exists. Registration failures propagate.
    pub async fn start(&mut self, client: Client, heartbeat: Client, events: Client) -> Result<()> {
        self.client = Some(client.clone());
        self.spawn_watch(client.clone());
        self.register(&client, &events).await?;
        self.spawn_phase_driver(client);
        self.spawn_heartbeat(heartbeat);
        Ok(())
    }

    /// Stop the background tasks, fail any non-terminal pods, and delete
    /// the node object with no grace period.
    pub async fn stop(&mut self) -> Result<()> {
        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }

        let Some(client) = self.client.take() else {
            return Ok(());
        };

        let nonterminal = self.pods.of_phase(&[
            PodPhase::Pending,
            PodPhase::Unknown,
            PodPhase::Running,
        ]);
        try_update_pod_phase(&client, &self.name, PodPhase::Failed, &nonterminal).await;

        let api: Api<Node> = Api::all(client);
        match api
            .delete(&self.name, &DeleteParams::default().grace_period(0))
            .await
        {
            Ok(_) => {}
            // Already gone, e.g. a delete step beat us to it.
            Err(kube::Error::Api(ae)) if ae.code == 404 => {}
            Err(e) => return Err(Error::control_plane("delete node", &self.name, e)),
        }
        info!(node = %self.name, "unregistered node");
        self.node = None;
        Ok(())
    }

    async fn register(&mut self, client: &Client, events: &Client) -> Result<()> {
        let node = self.node_object();
        let api: Api<Node> = Api::all(client.clone());
        let created = api
            .create(&PostParams::default(), &node)
            .await
            .map_err(|e| Error::control_plane("create node", &self.name, e))?;
        info!(node = %self.name, class = %self.class, "registered node");

        if let Err(e) = record_registration(events, &self.name).await {
            warn!(node = %self.name, error = %e, "unable to record registration event");
        }

        self.node = Some(created);
        Ok(())
    }

    /// The node object submitted at registration: declared capacity and
    /// allocatable over built-in defaults, phase Running, and Ready plus
    /// three pressure conditions stamped now.
    fn node_object(&self) -> Node {
        let now = Time(Utc::now());
        let conditions = vec![
            node_condition("Ready", "True", &now),
            node_condition("MemoryPressure", "False", &now),
            node_condition("PIDPressure", "False", &now),
            node_condition("DiskPressure", "False", &now),
        ];

        Node {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                labels: Some(self.labels.clone()),
                ..Default::default()
            },
            spec: None,
            status: Some(NodeStatus {
                capacity: Some(quantities(&self.resources.capacity)),
                allocatable: Some(quantities(&self.resources.allocatable)),
                phase: Some("Running".to_string()),
                addresses: Some(Vec::new()),
                conditions: Some(conditions),
                ..Default::default()
            }),
        }
    }

    fn spawn_watch(&mut self, client: Client) {
        let name = self.name.clone();
        let pods = self.pods.clone();
        let token = self.shutdown.clone();
        self.tasks
            .push(tokio::spawn(watch_pods(client, name, pods, token)));
    }

    fn spawn_phase_driver(&mut self, client: Client) {
        let name = self.name.clone();
        let pods = self.pods.clone();
        let token = self.shutdown.clone();
        self.tasks
            .push(tokio::spawn(drive_pod_phases(client, name, pods, token)));
    }

    fn spawn_heartbeat(&mut self, client: Client) {
        let name = self.name.clone();
        let conditions = self
            .node
            .as_ref()
            .and_then(|n| n.status.as_ref())
            .and_then(|s| s.conditions.clone())
            .unwrap_or_default();
        let token = self.shutdown.clone();
        self.tasks.push(tokio::spawn(heartbeat_conditions(
            client, name, conditions, token,
        )));
    }
}

fn node_condition(type_: &str, status: &str, now: &Time) -> NodeCondition {
    NodeCondition {
        type_: type_.to_string(),
        status: status.to_string(),
        last_heartbeat_time: Some(now.clone()),
        last_transition_time: Some(now.clone()),
        ..Default::default()
    }
}

/// Capacity or allocatable map: built-in defaults overridden by the
/// configured quantity strings.
fn quantities(overrides: &BTreeMap<String, String>) -> BTreeMap<String, Quantity> {
    let mut resources: BTreeMap<String, Quantity> = BTreeMap::from([
        ("pods".to_string(), Quantity("110".to_string())),
        ("cpu".to_string(), Quantity("16".to_string())),
        ("memory".to_string(), Quantity("128Gi".to_string())),
        ("storage".to_string(), Quantity("2Ti".to_string())),
    ]);
    for (name, value) in overrides {
        resources.insert(name.clone(), Quantity(value.clone()));
    }
    resources
}

/// Whether a modified pod is waiting on kubelet-side finalization: marked
/// for deletion with a present, non-zero grace period. A missing grace
/// period means "do not finalize".
fn needs_finalize(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_some()
        && pod
            .metadata
            .deletion_grace_period_seconds
            .is_some_and(|grace| grace > 0)
}

/// Consume the watch stream of pods bound to this node, applying events to
/// the local cache in delivery order. The subscription is re-established
/// whenever the server ends it; the loop exits on cancellation.
async fn watch_pods(client: Client, node_name: String, pods: Arc<PodSet>, token: CancellationToken) {
    let api: Api<Pod> = Api::all(client.clone());
    let params = WatchParams::default().fields(&format!("spec.nodeName={node_name}"));

    while !token.is_cancelled() {
        let stream = match api.watch(&params, "0").await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(node = %node_name, error = %e, "pod watch failed, retrying");
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(WATCH_RETRY_DELAY) => continue,
                }
            }
        };
        tokio::pin!(stream);

        loop {
            let event = tokio::select! {
                _ = token.cancelled() => return,
                event = stream.try_next() => event,
            };
            match event {
                Ok(Some(WatchEvent::Added(pod))) => {
                    debug!(node = %node_name, pod = %pod.name_any(), "pod added");
                    pods.add(pod);
                }
                Ok(Some(WatchEvent::Deleted(pod))) => {
                    debug!(node = %node_name, pod = %pod.name_any(), "pod deleted");
                    pods.remove(&pod);
                }
                Ok(Some(WatchEvent::Modified(pod))) => {
                    debug!(node = %node_name, pod = %pod.name_any(), "pod modified");
                    if needs_finalize(&pod) {
                        finalize_deleted_pod(&client, &node_name, &pod).await;
                    }
                    pods.update(pod);
                }
                Ok(Some(WatchEvent::Bookmark(_))) => {}
                Ok(Some(WatchEvent::Error(status))) => {
                    warn!(node = %node_name, status = %status.message, "pod watch event error");
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(node = %node_name, error = %e, "pod watch stream error");
                    break;
                }
            }
        }
    }
}

/// Complete a pod deletion by deleting again with no grace period,
/// mimicking the real kubelet after pre-stop hooks and signal escalation.
async fn finalize_deleted_pod(client: &Client, node_name: &str, pod: &Pod) {
    debug!(node = %node_name, pod = %pod.name_any(), "finalizing pod");
    let namespace = pod.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<Pod> = Api::namespaced(client.clone(), &namespace);
    if let Err(e) = api
        .delete(&pod.name_any(), &DeleteParams::default().grace_period(0))
        .await
    {
        warn!(node = %node_name, pod = %pod.name_any(), error = %e, "unable to finalize pod");
    }
}

/// Periodically promote Pending pods to Running and move expired Running
/// pods to their declared terminal phase. Runs until cancellation.
async fn drive_pod_phases(
    client: Client,
    node_name: String,
    pods: Arc<PodSet>,
    token: CancellationToken,
) {
    let start = tokio::time::Instant::now() + PHASE_DRIVER_INTERVAL;
    let mut ticks = tokio::time::interval_at(start, PHASE_DRIVER_INTERVAL);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticks.tick() => {
                let pending = pods.of_phase(&[PodPhase::Pending]);
                try_update_pod_phase(&client, &node_name, PodPhase::Running, &pending).await;

                for pod in pods.expired() {
                    let terminal = podutil::terminal_phase(&pod);
                    try_update_pod_phase(&client, &node_name, terminal, std::slice::from_ref(&pod))
                        .await;
                }
            }
        }
    }
}

/// Write the desired phase for each pod through the status subresource,
/// best-effort. The local cache is not touched here; the watch applies the
/// echoed modification. Failures are logged and retried naturally on the
/// next tick.
async fn try_update_pod_phase(client: &Client, node_name: &str, phase: PodPhase, pods: &[Pod]) {
    for pod in pods {
        let namespace = pod.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<Pod> = Api::namespaced(client.clone(), &namespace);

        let original = pod
            .status
            .as_ref()
            .and_then(|s| s.phase.clone())
            .unwrap_or_default();
        let mut conditions = pod
            .status
            .as_ref()
            .and_then(|s| s.conditions.clone())
            .unwrap_or_default();

        if original == PodPhase::Pending.as_str() && phase == PodPhase::Running {
            conditions.extend(ready_conditions("True"));
        }
        if phase.is_terminal() {
            conditions.extend(ready_conditions("False"));
        }

        let patch = serde_json::json!({
            "status": {
                "phase": phase.as_str(),
                "conditions": conditions,
            }
        });
        match api
            .patch_status(&pod.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => {
                debug!(
                    node = %node_name,
                    pod = %pod.name_any(),
                    from = %original,
                    to = %phase,
                    "updated pod phase"
                );
            }
            Err(e) => {
                warn!(
                    node = %node_name,
                    pod = %pod.name_any(),
                    desired = %phase,
                    error = %e,
                    "unable to update pod phase"
                );
            }
        }
    }
}

/// Fresh Initialized and Ready conditions stamped now.
fn ready_conditions(status: &str) -> Vec<PodCondition> {
    let now = Time(Utc::now());
    ["Initialized", "Ready"]
        .into_iter()
        .map(|type_| PodCondition {
            type_: type_.to_string(),
            status: status.to_string(),
            last_transition_time: Some(now.clone()),
            ..Default::default()
        })
        .collect()
}

/// Refresh every registered condition against the node object so the
/// control plane observes a fresh heartbeat. Uses the dedicated heartbeat
/// client so this traffic is never starved by general requests.
async fn heartbeat_conditions(
    client: Client,
    node_name: String,
    conditions: Vec<NodeCondition>,
    token: CancellationToken,
) {
    let api: Api<Node> = Api::all(client);
    let start = tokio::time::Instant::now() + HEARTBEAT_INTERVAL;
    let mut ticks = tokio::time::interval_at(start, HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticks.tick() => {
                for condition in &conditions {
                    let mut refreshed = condition.clone();
                    refreshed.last_heartbeat_time = Some(Time(Utc::now()));
                    let patch = serde_json::json!({
                        "status": { "conditions": [refreshed] }
                    });
                    match api
                        .patch_status(&node_name, &PatchParams::default(), &Patch::Strategic(&patch))
                        .await
                    {
                        Ok(_) => debug!(node = %node_name, condition = %condition.type_, "heartbeat"),
                        Err(e) => {
                            warn!(
                                node = %node_name,
                                condition = %condition.type_,
                                error = %e,
                                "heartbeat failed"
                            );
                        }
                    }
                }
            }
        }
    }
}

/// Record a registration event for the node, best-effort.
async fn record_registration(events: &Client, node_name: &str) -> Result<()> {
    let api: Api<Event> = Api::namespaced(events.clone(), EVENT_NAMESPACE);
    let now = Time(Utc::now());
    let event = Event {
        metadata: ObjectMeta {
            name: Some(format!(
                "{node_name}.{:x}",
                Utc::now().timestamp_nanos_opt().unwrap_or_default()
            )),
            namespace: Some(EVENT_NAMESPACE.to_string()),
            ..Default::default()
        },
        involved_object: ObjectReference {
            kind: Some("Node".to_string()),
            name: Some(node_name.to_string()),
            ..Default::default()
        },
        reason: Some("NodeRegistered".to_string()),
        message: Some(format!("Simulated node {node_name} registered")),
        type_: Some("Normal".to_string()),
        count: Some(1),
        first_timestamp: Some(now.clone()),
        last_timestamp: Some(now),
        source: Some(EventSource {
            component: Some("nodus".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };
    api.create(&PostParams::default(), &event).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_node() -> FakeNode {
        let mut resources = NodeResources::default();
        resources
            .capacity
            .insert("cpu".to_string(), "4".to_string());
        resources
            .allocatable
            .insert("cpu".to_string(), "3".to_string());
        FakeNode::new(
            "small-0",
            "small",
            BTreeMap::from([("tier".to_string(), "dev".to_string())]),
            resources,
        )
    }

    #[test]
    fn test_class_label_merged_into_labels() {
        let node = sample_node();
        assert_eq!(node.labels.get(NODE_CLASS_LABEL).unwrap(), "small");
        assert_eq!(node.labels.get("tier").unwrap(), "dev");
        assert_eq!(node.name(), "small-0");
        assert_eq!(node.class(), "small");
    }

    #[test]
    fn test_node_object_defaults_and_overrides() {
        let node = sample_node().node_object();
        let status = node.status.unwrap();

        let capacity = status.capacity.unwrap();
        assert_eq!(capacity.get("cpu").unwrap().0, "4");
        assert_eq!(capacity.get("pods").unwrap().0, "110");
        assert_eq!(capacity.get("memory").unwrap().0, "128Gi");
        assert_eq!(capacity.get("storage").unwrap().0, "2Ti");

        let allocatable = status.allocatable.unwrap();
        assert_eq!(allocatable.get("cpu").unwrap().0, "3");
        assert_eq!(allocatable.get("memory").unwrap().0, "128Gi");

        assert_eq!(status.phase.as_deref(), Some("Running"));
    }

    #[test]
    fn test_node_object_initial_conditions() {
        let node = sample_node().node_object();
        let conditions = node.status.unwrap().conditions.unwrap();
        let by_type: Vec<(&str, &str)> = conditions
            .iter()
            .map(|c| (c.type_.as_str(), c.status.as_str()))
            .collect();
        assert_eq!(
            by_type,
            vec![
                ("Ready", "True"),
                ("MemoryPressure", "False"),
                ("PIDPressure", "False"),
                ("DiskPressure", "False"),
            ]
        );
        for condition in &conditions {
            assert!(condition.last_heartbeat_time.is_some());
            assert!(condition.last_transition_time.is_some());
        }
    }

    #[test]
    fn test_ready_conditions_pair() {
        let conditions = ready_conditions("True");
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].type_, "Initialized");
        assert_eq!(conditions[1].type_, "Ready");
        assert!(conditions.iter().all(|c| c.status == "True"));
    }

    #[test]
    fn test_needs_finalize() {
        let mut pod = Pod::default();
        assert!(!needs_finalize(&pod));

        pod.metadata.deletion_timestamp = Some(Time(Utc::now()));
        // Missing grace period means "do not finalize".
        assert!(!needs_finalize(&pod));

        pod.metadata.deletion_grace_period_seconds = Some(0);
        assert!(!needs_finalize(&pod));

        pod.metadata.deletion_grace_period_seconds = Some(30);
        assert!(needs_finalize(&pod));
    }
}
