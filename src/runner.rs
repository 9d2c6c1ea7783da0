//! Scenario runner
//!
//! Executes parsed steps against the control plane in declared order. The
//! runner owns garbage-collection sets of everything it created; shutdown
//! best-effort deletes every entry and always runs, even when a step
//! failed.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::core::v1::{Node, Pod, PodCondition};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::{error, info, warn};

use crate::config::{NodeConfig, PodConfig};
use crate::dynamic::DynamicClient;
use crate::node::{FakeNode, NODE_CLASS_LABEL};
use crate::phase::PodPhase;
use crate::scenario::{
    AssertStep, ChangeStep, CreateStep, DeleteStep, ObjectKind, Scenario, Step,
};
use crate::{Error, Result};

const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Number of 1-second retries an assertion's `within` window grants.
///
/// Sub-second windows grant none: the assertion is evaluated exactly once.
fn retry_budget(within: Option<Duration>) -> u64 {
    within.map(|d| d.as_secs()).unwrap_or(0)
}

/// The status value of the condition appended by a change step.
///
/// `True` for Pending to Running, `False` for any transition into a
/// terminal phase, unset otherwise.
fn change_condition_status(from: PodPhase, to: PodPhase) -> &'static str {
    if from == PodPhase::Pending && to == PodPhase::Running {
        "True"
    } else if to.is_terminal() {
        "False"
    } else {
        ""
    }
}

/// Executes scenarios against one control plane and namespace
pub struct ScenarioRunner {
    client: Client,
    heartbeat: Client,
    events: Client,
    dynamic: DynamicClient,
    namespace: String,
    node_config: Option<NodeConfig>,
    pod_config: Option<PodConfig>,
    working_dir: PathBuf,
    fake_nodes: HashMap<String, FakeNode>,
    gc_pods: HashSet<String>,
    gc_nodes: HashSet<String>,
    gc_files: HashSet<PathBuf>,
}

impl ScenarioRunner {
    /// Create a runner over the given clients and configs.
    ///
    /// Node and pod configs are optional; steps that need an absent config
    /// fail with a config error.
    pub fn new(
        client: Client,
        heartbeat: Client,
        events: Client,
        namespace: impl Into<String>,
        node_config: Option<NodeConfig>,
        pod_config: Option<PodConfig>,
        dynamic: DynamicClient,
    ) -> Self {
        Self {
            client,
            heartbeat,
            events,
            dynamic,
            namespace: namespace.into(),
            node_config,
            pod_config,
            working_dir: PathBuf::new(),
            fake_nodes: HashMap::new(),
            gc_pods: HashSet::new(),
            gc_nodes: HashSet::new(),
            gc_files: HashSet::new(),
        }
    }

    /// Run every step in order, stopping at the first failure.
    ///
    /// Shutdown always runs, whether or not a step failed.
    pub async fn run_scenario(&mut self, scenario: &Scenario) -> Result<()> {
        info!(name = %scenario.name, "run scenario");
        self.working_dir = scenario.working_dir.clone();
        let result = self.run_steps(scenario).await;
        self.shutdown().await;
        result
    }

    async fn run_steps(&mut self, scenario: &Scenario) -> Result<()> {
        let total = scenario.steps.len();
        for (i, step) in scenario.steps.iter().enumerate() {
            let raw = &scenario.raw_steps[i];
            info!(step = i + 1, total, text = %raw, "run step");
            if let Err(e) = self.run_step(step).await {
                error!(step = i + 1, text = %raw, error = %e, "step failed");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Execute a single step.
    pub async fn run_step(&mut self, step: &Step) -> Result<()> {
        match step {
            Step::Assert(assert) => self.run_assert(assert).await,
            Step::Create(create) => self.run_create(create).await,
            Step::Change(change) => self.run_change(change).await,
            Step::Delete(delete) => self.run_delete(delete).await,
        }
    }

    // ------------------------------------------------------------------
    // assert
    // ------------------------------------------------------------------

    /// Evaluate the assertion, retrying on a 1-second cadence until the
    /// `within` window is exhausted.
    pub async fn run_assert(&self, assert: &AssertStep) -> Result<()> {
        let mut budget = retry_budget(assert.within);
        let mut result = self.eval_assert(assert).await;
        while budget > 0 && result.is_err() {
            tokio::time::sleep(RETRY_INTERVAL).await;
            result = self.eval_assert(assert).await;
            budget -= 1;
        }
        result
    }

    async fn eval_assert(&self, assert: &AssertStep) -> Result<()> {
        if let Some(gvk) = &assert.gvk {
            return self.dynamic.probe(gvk).await;
        }
        match assert.object {
            Some(ObjectKind::Node) => self.assert_nodes(assert).await,
            Some(ObjectKind::Pod) => self.assert_pods(assert).await,
            None => Err(Error::assertion("assert step has no object or api kind")),
        }
    }

    async fn assert_nodes(&self, assert: &AssertStep) -> Result<()> {
        let mut params = ListParams::default();
        if let Some(class) = &assert.class {
            params = params.labels(&format!("{NODE_CLASS_LABEL}={class}"));
        }
        let api: Api<Node> = Api::all(self.client.clone());
        let nodes = api
            .list(&params)
            .await
            .map_err(|e| Error::control_plane("list nodes", selector_of(&assert.class), e))?;

        let found = nodes.items.len() as u64;
        if found != assert.count {
            return Err(Error::assertion(match &assert.class {
                Some(class) => format!(
                    "found {found} nodes of class {class}, but {} expected",
                    assert.count
                ),
                None => format!("found {found} nodes but {} expected", assert.count),
            }));
        }
        Ok(())
    }

    async fn assert_pods(&self, assert: &AssertStep) -> Result<()> {
        let mut params = ListParams::default();
        if let Some(class) = &assert.class {
            params = params.labels(&format!("{NODE_CLASS_LABEL}={class}"));
        }
        if let Some(phase) = assert.phase {
            params = params.fields(&format!("status.phase={phase}"));
        }
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        let pods = api
            .list(&params)
            .await
            .map_err(|e| Error::control_plane("list pods", selector_of(&assert.class), e))?;

        let found = pods.items.len() as u64;
        if found != assert.count {
            return Err(Error::assertion(format!(
                "found {found} pods of class {} and phase {}, but {} expected",
                assert.class.as_deref().unwrap_or("<any>"),
                assert.phase.map(|p| p.as_str()).unwrap_or("<any>"),
                assert.count
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // create
    // ------------------------------------------------------------------

    /// Create class instances, or a resource from a file.
    pub async fn run_create(&mut self, create: &CreateStep) -> Result<()> {
        if let Some(path) = &create.path {
            let full = self.working_dir.join(path);
            self.dynamic.create_from_file(&full).await?;
            self.gc_files.insert(full);
            return Ok(());
        }
        match create.object {
            Some(ObjectKind::Node) => self.create_nodes(create).await,
            Some(ObjectKind::Pod) => self.create_pods(create).await,
            None => Err(Error::config("create step has no object or file path")),
        }
    }

    async fn create_nodes(&mut self, create: &CreateStep) -> Result<()> {
        let class_name = create.class.as_deref().unwrap_or_default();
        let config = self.node_config.as_ref().ok_or_else(|| {
            Error::config(format!(
                "no node class `{class_name}`: specify a nodes config file"
            ))
        })?;
        let class = config
            .class(class_name)
            .ok_or_else(|| {
                Error::config(format!("class `{class_name}` not found in the node config"))
            })?
            .clone();

        for i in 0..create.count {
            let name = format!("{}-{}", class.name, i);
            let mut node = FakeNode::new(
                name.clone(),
                &class.name,
                class.labels.clone(),
                class.resources.clone(),
            );
            node.start(
                self.client.clone(),
                self.heartbeat.clone(),
                self.events.clone(),
            )
            .await?;
            self.gc_nodes.insert(name.clone());
            self.fake_nodes.insert(name, node);
        }
        Ok(())
    }

    async fn create_pods(&mut self, create: &CreateStep) -> Result<()> {
        let class_name = create.class.as_deref().unwrap_or_default();
        let config = self.pod_config.as_ref().ok_or_else(|| {
            Error::config(format!(
                "no pod class `{class_name}`: specify a pods config file"
            ))
        })?;
        let class = config
            .class(class_name)
            .ok_or_else(|| {
                Error::config(format!("class `{class_name}` not found in the pod config"))
            })?
            .clone();

        let api: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        for i in 0..create.count {
            let name = format!("{}-{}", class.name, i);
            let pod = Pod {
                metadata: ObjectMeta {
                    name: Some(name.clone()),
                    labels: Some(class.labels.clone()),
                    ..Default::default()
                },
                spec: Some(class.spec.clone()),
                status: None,
            };
            api.create(&PostParams::default(), &pod)
                .await
                .map_err(|e| Error::control_plane("create pod", &name, e))?;
            self.gc_pods.insert(name);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // change
    // ------------------------------------------------------------------

    /// Move `count` pods of a class from one phase to another.
    pub async fn run_change(&self, change: &ChangeStep) -> Result<()> {
        if change.object != ObjectKind::Pod {
            return Err(Error::transition(format!(
                "change is only supported for pods (found `{}`)",
                change.object
            )));
        }
        change.validate()?;

        let params = ListParams::default()
            .labels(&format!("{NODE_CLASS_LABEL}={}", change.class))
            .fields(&format!("status.phase={}", change.from));
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        let pods = api
            .list(&params)
            .await
            .map_err(|e| Error::control_plane("list pods", &change.class, e))?;

        if (pods.items.len() as u64) < change.count {
            return Err(Error::transition(format!(
                "expected at least {} pods of class `{}` in phase {}, but found {}",
                change.count,
                change.class,
                change.from,
                pods.items.len()
            )));
        }

        for pod in pods.items.iter().take(change.count as usize) {
            let mut conditions = pod
                .status
                .as_ref()
                .and_then(|s| s.conditions.clone())
                .unwrap_or_default();
            conditions.push(PodCondition {
                type_: change.to.to_string(),
                status: change_condition_status(change.from, change.to).to_string(),
                last_transition_time: Some(Time(Utc::now())),
                ..Default::default()
            });

            let patch = serde_json::json!({
                "status": {
                    "phase": change.to.as_str(),
                    "conditions": conditions,
                }
            });
            api.patch_status(&pod.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
                .await
                .map_err(|e| Error::control_plane("update pod status", pod.name_any(), e))?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // delete
    // ------------------------------------------------------------------

    /// Delete class instances, or a resource from a file.
    pub async fn run_delete(&mut self, delete: &DeleteStep) -> Result<()> {
        if let Some(path) = &delete.path {
            let full = self.working_dir.join(path);
            self.dynamic.delete_from_file(&full).await?;
            self.gc_files.remove(&full);
            return Ok(());
        }
        match delete.object {
            Some(ObjectKind::Node) => self.delete_nodes(delete).await,
            Some(ObjectKind::Pod) => self.delete_pods(delete).await,
            None => Err(Error::config("delete step has no object or file path")),
        }
    }

    async fn delete_nodes(&mut self, delete: &DeleteStep) -> Result<()> {
        let class = delete.class.as_deref().unwrap_or_default();
        let params = ListParams::default().labels(&format!("{NODE_CLASS_LABEL}={class}"));
        let api: Api<Node> = Api::all(self.client.clone());
        let nodes = api
            .list(&params)
            .await
            .map_err(|e| Error::control_plane("list nodes", class, e))?;

        if (nodes.items.len() as u64) < delete.count {
            return Err(Error::transition(format!(
                "found {} nodes of class `{class}`, but expected at least {}",
                nodes.items.len(),
                delete.count
            )));
        }

        for node in nodes.items.iter().take(delete.count as usize) {
            let name = node.name_any();
            if let Some(mut fake) = self.fake_nodes.remove(&name) {
                // Stopping also deletes the node object with no grace period.
                fake.stop().await?;
            } else {
                api.delete(&name, &DeleteParams::default())
                    .await
                    .map_err(|e| Error::control_plane("delete node", &name, e))?;
            }
            self.gc_nodes.remove(&name);
        }
        Ok(())
    }

    async fn delete_pods(&mut self, delete: &DeleteStep) -> Result<()> {
        let class = delete.class.as_deref().unwrap_or_default();
        let params = ListParams::default().labels(&format!("{NODE_CLASS_LABEL}={class}"));
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        let pods = api
            .list(&params)
            .await
            .map_err(|e| Error::control_plane("list pods", class, e))?;

        if (pods.items.len() as u64) < delete.count {
            return Err(Error::transition(format!(
                "found {} pods of class `{class}`, but expected at least {}",
                pods.items.len(),
                delete.count
            )));
        }

        for pod in pods.items.iter().take(delete.count as usize) {
            let name = pod.name_any();
            api.delete(&name, &DeleteParams::default())
                .await
                .map_err(|e| Error::control_plane("delete pod", &name, e))?;
            self.gc_pods.remove(&name);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // shutdown
    // ------------------------------------------------------------------

    /// Best-effort deletion of everything the runner created. Failures are
    /// logged and ignored.
    pub async fn shutdown(&mut self) {
        info!("cleaning up scenario resources");

        let pod_api: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        for name in std::mem::take(&mut self.gc_pods) {
            if let Err(e) = pod_api.delete(&name, &DeleteParams::default()).await {
                warn!(pod = %name, error = %e, "failed to clean up pod");
            }
        }

        for (name, mut node) in std::mem::take(&mut self.fake_nodes) {
            if let Err(e) = node.stop().await {
                warn!(node = %name, error = %e, "failed to clean up node");
            }
            self.gc_nodes.remove(&name);
        }

        let node_api: Api<Node> = Api::all(self.client.clone());
        for name in std::mem::take(&mut self.gc_nodes) {
            if let Err(e) = node_api.delete(&name, &DeleteParams::default()).await {
                warn!(node = %name, error = %e, "failed to clean up node object");
            }
        }

        for path in std::mem::take(&mut self.gc_files) {
            if let Err(e) = self.dynamic.delete_from_file(&path).await {
                warn!(path = %path.display(), error = %e, "failed to clean up resource file");
            }
        }
    }
}

fn selector_of(class: &Option<String>) -> String {
    match class {
        Some(class) => format!("{NODE_CLASS_LABEL}={class}"),
        None => "<all>".to_string(),
    }
}
