//! Control-plane client construction
//!
//! Three clients with distinct roles are built from the same connection
//! parameters: the general client for ordinary requests, a heartbeat
//! client with a fixed per-call timeout and no client-side throttling so
//! node heartbeats are never starved under busy scenarios, and an event
//! client keeping event traffic off the general connection pool.

use std::path::PathBuf;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::{Error, Result};

/// Environment variable naming the API server URL
pub const NP_MASTER: &str = "NP_MASTER";
/// Environment variable naming the kubeconfig path
pub const NP_KCONFIG_PATH: &str = "NP_KCONFIG_PATH";

const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where to find the control plane: an API server URL or a kubeconfig.
///
/// A master URL takes precedence over a kubeconfig path.
#[derive(Debug, Clone, Default)]
pub struct KubeInfo {
    /// API server URL, e.g. `http://127.0.0.1:8080`
    pub master: Option<String>,
    /// Path to a kubeconfig file
    pub kubeconfig_path: Option<PathBuf>,
}

impl KubeInfo {
    /// Build from explicit flags; a master URL discards the kubeconfig.
    pub fn new(master: Option<String>, kubeconfig_path: Option<PathBuf>) -> Self {
        let kubeconfig_path = if master.is_some() {
            None
        } else {
            kubeconfig_path
        };
        Self {
            master,
            kubeconfig_path,
        }
    }

    /// Read `NP_MASTER` and `NP_KCONFIG_PATH`; at least one must be set.
    pub fn from_env() -> Result<Self> {
        let master = std::env::var(NP_MASTER).ok().filter(|v| !v.is_empty());
        let kubeconfig_path = std::env::var(NP_KCONFIG_PATH)
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        if master.is_none() && kubeconfig_path.is_none() {
            return Err(Error::config(format!(
                "must supply one of {NP_MASTER} or {NP_KCONFIG_PATH} as environment variables"
            )));
        }
        Ok(Self::new(master, kubeconfig_path))
    }
}

async fn base_config(info: &KubeInfo) -> Result<Config> {
    if let Some(master) = &info.master {
        let url: http::Uri = master
            .parse()
            .map_err(|e| Error::config(format!("invalid master url `{master}`: {e}")))?;
        Ok(Config::new(url))
    } else if let Some(path) = &info.kubeconfig_path {
        let kubeconfig = Kubeconfig::read_from(path)
            .map_err(|e| Error::config(format!("failed to read kubeconfig: {e}")))?;
        Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| Error::config(format!("failed to load kubeconfig: {e}")))
    } else {
        Err(Error::config(
            "no master url or kubeconfig path configured",
        ))
    }
}

/// The general-purpose client for registration, lists and watches.
pub async fn general_client(info: &KubeInfo) -> Result<Client> {
    let config = base_config(info).await?;
    Client::try_from(config).map_err(Error::from)
}

/// The heartbeat client: same endpoint, fixed 30 s per-call timeout,
/// its own connection pool.
pub async fn heartbeat_client(info: &KubeInfo) -> Result<Client> {
    let mut config = base_config(info).await?;
    config.connect_timeout = Some(HEARTBEAT_TIMEOUT);
    config.read_timeout = Some(HEARTBEAT_TIMEOUT);
    config.write_timeout = Some(HEARTBEAT_TIMEOUT);
    Client::try_from(config).map_err(Error::from)
}

/// The event client, isolated from general request traffic.
pub async fn event_client(info: &KubeInfo) -> Result<Client> {
    let config = base_config(info).await?;
    Client::try_from(config).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_discards_kubeconfig() {
        let info = KubeInfo::new(
            Some("http://127.0.0.1:8080".to_string()),
            Some(PathBuf::from("/tmp/kconfig")),
        );
        assert!(info.master.is_some());
        assert!(info.kubeconfig_path.is_none());
    }

    #[test]
    fn test_kubeconfig_kept_without_master() {
        let info = KubeInfo::new(None, Some(PathBuf::from("/tmp/kconfig")));
        assert_eq!(info.kubeconfig_path, Some(PathBuf::from("/tmp/kconfig")));
    }

    #[tokio::test]
    async fn test_empty_info_is_a_config_error() {
        let err = base_config(&KubeInfo::default()).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_invalid_master_url_rejected() {
        let info = KubeInfo::new(Some("not a url".to_string()), None);
        let err = base_config(&info).await.unwrap_err();
        assert!(err.to_string().contains("invalid master url"));
    }

    #[tokio::test]
    async fn test_master_url_builds_config() {
        let info = KubeInfo::new(Some("http://127.0.0.1:8080".to_string()), None);
        let config = base_config(&info).await.unwrap();
        assert_eq!(config.cluster_url.to_string(), "http://127.0.0.1:8080/");
    }
}
