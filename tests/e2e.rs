//! End-to-end tests against a real control plane
//!
//! These tests need a reachable cluster and are ignored by default. Point
//! `NP_MASTER` or `NP_KCONFIG_PATH` at a disposable cluster and run:
//!
//! ```bash
//! cargo test --test e2e -- --ignored --test-threads=1
//! ```
//!
//! The tests create and delete nodes and pods in the configured cluster;
//! never point them at anything you care about.

use std::time::Duration;

use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};

use nodus::client::{self, KubeInfo};
use nodus::config::{NodeConfig, PodConfig};
use nodus::fleet::Fleet;
use nodus::harness::Harness;

const NAMESPACE: &str = "default";

async fn clients() -> (Client, Client, Client) {
    let info = KubeInfo::from_env().expect("NP_MASTER or NP_KCONFIG_PATH must be set");
    let general = client::general_client(&info).await.expect("general client");
    let heartbeat = client::heartbeat_client(&info)
        .await
        .expect("heartbeat client");
    let events = client::event_client(&info).await.expect("event client");
    (general, heartbeat, events)
}

/// Poll a list until the predicate holds or the timeout elapses.
async fn wait_for_pods<F>(api: &Api<Pod>, params: &ListParams, timeout: Duration, predicate: F)
where
    F: Fn(&[Pod]) -> bool,
{
    let deadline = std::time::Instant::now() + timeout;
    loop {
        let pods = api.list(params).await.expect("list pods");
        if predicate(&pods.items) {
            return;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "condition not met within {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

fn small_fleet_config() -> NodeConfig {
    NodeConfig::from_yaml(
        r#"
nodeClasses:
  - name: small
    count: 2
    resources:
      capacity:
        cpu: "4"
        memory: 8Gi
"#,
    )
    .unwrap()
}

#[tokio::test]
#[ignore = "requires a cluster"]
async fn fleet_registers_ready_nodes() {
    let (general, heartbeat, events) = clients().await;
    let config = small_fleet_config();

    let mut fleet = Fleet::new(&config);
    fleet
        .start(&general, &heartbeat, &events)
        .await
        .expect("fleet start");

    let api: Api<Node> = Api::all(general.clone());
    let nodes = api
        .list(&ListParams::default().labels("np.class=small"))
        .await
        .expect("list nodes");
    let mut names: Vec<String> = nodes.items.iter().map(|n| n.name_any()).collect();
    names.sort();
    assert_eq!(names, vec!["small-0", "small-1"]);

    for node in &nodes.items {
        let conditions = node
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .expect("node conditions");
        assert!(conditions
            .iter()
            .any(|c| c.type_ == "Ready" && c.status == "True"));
    }

    fleet.stop().await;
    let nodes = api
        .list(&ListParams::default().labels("np.class=small"))
        .await
        .expect("list nodes");
    assert!(nodes.items.is_empty(), "stop deletes the node objects");
}

#[tokio::test]
#[ignore = "requires a cluster"]
async fn bound_pods_run_and_expire() {
    let (general, heartbeat, events) = clients().await;
    let config = small_fleet_config();

    let mut fleet = Fleet::new(&config);
    fleet
        .start(&general, &heartbeat, &events)
        .await
        .expect("fleet start");

    // Two pods bound to a fleet node, declared to succeed after 3 seconds.
    let api: Api<Pod> = Api::namespaced(general.clone(), NAMESPACE);
    for i in 0..2 {
        let pod: Pod = serde_yaml::from_str(&format!(
            r#"
apiVersion: v1
kind: Pod
metadata:
  name: demo-{i}
  labels:
    np.class: demo
    np.runDuration: 3s
    np.terminalPhase: Succeeded
spec:
  nodeName: small-0
  containers:
    - name: main
      image: busybox
"#
        ))
        .unwrap();
        api.create(&PostParams::default(), &pod).await.expect("create pod");
    }

    let by_class = ListParams::default().labels("np.class=demo");
    wait_for_pods(&api, &by_class, Duration::from_secs(6), |pods| {
        pods.len() == 2
            && pods.iter().all(|p| {
                p.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Running")
            })
    })
    .await;

    wait_for_pods(&api, &by_class, Duration::from_secs(8), |pods| {
        pods.iter().all(|p| {
            p.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Succeeded")
        })
    })
    .await;

    for i in 0..2 {
        let _ = api
            .delete(&format!("demo-{i}"), &DeleteParams::default())
            .await;
    }
    fleet.stop().await;
}

#[tokio::test]
#[ignore = "requires a cluster"]
async fn scenario_lifecycle_via_harness() {
    let node_config = NodeConfig::from_yaml(
        r#"
nodeClasses:
  - name: large
    count: 1
    resources:
      capacity:
        cpu: "64"
        memory: 512Gi
"#,
    )
    .unwrap();
    let pod_config = PodConfig::from_yaml(
        r#"
podClasses:
  - name: 4-cpu
    labels:
      np.class: 4-cpu
      np.runDuration: 30s
    spec:
      containers:
        - name: main
          image: busybox
          resources:
            requests:
              cpu: "4"
"#,
    )
    .unwrap();

    let mut harness = Harness::new(NAMESPACE, Some(node_config), Some(pod_config))
        .await
        .expect("harness");

    let steps = [
        "create 1 large node",
        "assert 1 large node",
        "create 1 4-cpu pod",
        "assert 1 4-cpu pod is Running within 10s",
        "delete 1 4-cpu pod",
        "assert 0 4-cpu pods within 10s",
    ];
    for step in steps {
        if let Err(e) = harness.run(step).await {
            harness.shutdown().await;
            panic!("step `{step}` failed: {e}");
        }
    }

    harness.shutdown().await;
}
