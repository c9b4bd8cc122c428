//! Solo deployment facade
//!
//! `SoloDeployment::builder()` collects the engine, endpoint override, config
//! tree and explicit overrides; `build()` runs the whole pipeline:
//!
//! 1. resolve and classify the daemon endpoint
//! 2. resolve the profile and layer overrides on top
//! 3. build the container spec
//! 4. create and start the container
//! 5. read back the published port mappings
//! 6. optionally probe the primary mapping
//!
//! Any failure after the container exists tears it down before the error is
//! returned.

use crate::config::{ConfigTree, ProvisionerSettings};
use crate::docker::DockerEngine;
use crate::endpoint::{DaemonEndpoint, HostResolver};
use crate::engine::ContainerEngine;
use crate::error::{DeploymentError, Result};
use crate::lifecycle::{teardown, ExitStatus, LifecycleWaiter};
use crate::network::{NetworkInspector, PortMapping};
use crate::probe::ReachabilityProbe;
use crate::profile::{apply_overrides, resolve_profile, ProfileOverrides};
use crate::provisioner::ContainerProvisioner;
use crate::spec::{build_container_spec, generate_namespace};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Serializable view of a live deployment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSummary {
    pub container_id: String,
    pub namespace: String,
    pub image: String,
    pub daemon_address: String,
    pub is_local: bool,
    pub port_mappings: Vec<PortMapping>,
    pub started_at: DateTime<Utc>,
    pub exit_status: Option<ExitStatus>,
}

/// Builder for [`SoloDeployment`]
#[derive(Default)]
pub struct SoloDeploymentBuilder {
    engine: Option<Arc<dyn ContainerEngine>>,
    docker_host: Option<String>,
    cert_path: Option<PathBuf>,
    config: Option<ConfigTree>,
    profile: Option<String>,
    overrides: ProfileOverrides,
    probe: Option<bool>,
}

impl SoloDeploymentBuilder {
    /// Use this engine instead of connecting to the resolved endpoint
    pub fn engine(mut self, engine: Arc<dyn ContainerEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn docker_host(mut self, uri: impl Into<String>) -> Self {
        self.docker_host = Some(uri.into());
        self
    }

    pub fn cert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cert_path = Some(path.into());
        self
    }

    pub fn config(mut self, config: ConfigTree) -> Self {
        self.config = Some(config);
        self
    }

    /// Select a profile by name, overriding `solo.profile`
    pub fn profile(mut self, name: impl Into<String>) -> Self {
        self.profile = Some(name.into());
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.overrides.image = Some(image.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.overrides.namespace = Some(namespace.into());
        self
    }

    /// Add or replace one environment variable of the solo container
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.overrides.env.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.overrides.env.push((key, value)),
        }
        self
    }

    /// Force the reachability probe on or off, overriding `solo.provisioner.probe`
    pub fn probe(mut self, probe: bool) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Provision the solo container
    pub async fn build(self) -> Result<SoloDeployment> {
        let config = self.config.unwrap_or_else(ConfigTree::empty);
        let mut settings = ProvisionerSettings::from_tree(&config)?;
        if let Some(probe) = self.probe {
            settings.probe = probe;
        }

        let address = HostResolver::new(self.docker_host, self.cert_path).resolve_address()?;
        let engine: Arc<dyn ContainerEngine> = match self.engine {
            Some(engine) => engine,
            None => Arc::new(DockerEngine::connect(&address).map_err(|source| {
                DeploymentError::DaemonUnreachable {
                    uri: address.uri().to_string(),
                    source,
                }
            })?),
        };
        let endpoint = HostResolver::classify(address, engine.as_ref()).await?;

        let profile = resolve_profile(
            &config,
            self.profile.as_deref(),
            Some(settings.default_image.as_str()),
        )?;
        let profile = apply_overrides(profile, &self.overrides)?;
        let namespace = profile
            .namespace
            .clone()
            .unwrap_or_else(generate_namespace);

        let spec = build_container_spec(&profile, &endpoint, &settings, &namespace)?;

        let container_id = ContainerProvisioner::new(engine.as_ref(), settings.pull_image)
            .provision(&spec)
            .await?;

        let port_mappings = match NetworkInspector::new(engine.as_ref(), &endpoint)
            .inspect(&container_id, &spec.exposed_ports)
            .await
        {
            Ok(mappings) => mappings,
            Err(e) => {
                abandon(engine.as_ref(), &container_id, settings.stop_timeout).await;
                return Err(e);
            }
        };

        if settings.probe {
            if let Some(primary) = port_mappings.first() {
                let probe = ReachabilityProbe::new(
                    engine.as_ref(),
                    settings.probe_image.clone(),
                    settings.probe_timeout,
                )
                .pull_image(settings.pull_image);
                if let Err(e) = probe.check(primary, &namespace).await {
                    abandon(engine.as_ref(), &container_id, settings.stop_timeout).await;
                    return Err(e);
                }
            }
        }

        info!(
            container_id = %container_id,
            namespace = %namespace,
            image = %spec.image,
            ports = port_mappings.len(),
            "Solo deployment ready"
        );

        Ok(SoloDeployment {
            engine,
            endpoint,
            container_id,
            namespace,
            image: spec.image,
            port_mappings,
            exit_status: None,
            started_at: Utc::now(),
            stop_timeout: settings.stop_timeout,
        })
    }
}

/// Tear down a container on a failure branch; the original error wins.
async fn abandon(engine: &dyn ContainerEngine, container_id: &str, stop_timeout: Duration) {
    if let Err(e) = teardown(engine, container_id, stop_timeout).await {
        warn!(container_id = %container_id, error = %e, "Failed to tear down after error");
    }
}

/// A provisioned solo container
pub struct SoloDeployment {
    engine: Arc<dyn ContainerEngine>,
    endpoint: DaemonEndpoint,
    container_id: String,
    namespace: String,
    image: String,
    port_mappings: Vec<PortMapping>,
    exit_status: Option<ExitStatus>,
    started_at: DateTime<Utc>,
    stop_timeout: Duration,
}

impl std::fmt::Debug for SoloDeployment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoloDeployment")
            .field("container_id", &self.container_id)
            .field("endpoint", &self.endpoint)
            .field("namespace", &self.namespace)
            .field("port_mappings", &self.port_mappings)
            .field("exit_status", &self.exit_status)
            .finish_non_exhaustive()
    }
}

impl SoloDeployment {
    pub fn builder() -> SoloDeploymentBuilder {
        SoloDeploymentBuilder::default()
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// URI of the daemon the container runs on
    pub fn daemon_address(&self) -> &str {
        self.endpoint.uri()
    }

    pub fn endpoint(&self) -> &DaemonEndpoint {
        &self.endpoint
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Mapping of the first declared port
    pub fn address(&self) -> Option<&PortMapping> {
        self.port_mappings.first()
    }

    pub fn port_mappings(&self) -> &[PortMapping] {
        &self.port_mappings
    }

    /// Mapping for a `port/proto` key; a bare port number means tcp
    pub fn mapping(&self, port: &str) -> Option<&PortMapping> {
        let key = if port.contains('/') {
            port.to_string()
        } else {
            format!("{port}/tcp")
        };
        self.port_mappings.iter().find(|m| m.key() == key)
    }

    /// Exit status, once observed by `wait_for_exit`
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Block until the container exits.
    ///
    /// A nonzero exit is recorded and returned as `ContainerExitFailure`.
    pub async fn wait_for_exit(&mut self, timeout: Option<Duration>) -> Result<ExitStatus> {
        let status = LifecycleWaiter::new(self.engine.as_ref())
            .wait(&self.container_id, timeout)
            .await?;
        self.exit_status = Some(status);
        status.check(&self.container_id)?;
        Ok(status)
    }

    pub async fn logs(&self, tail: usize) -> Result<String> {
        self.engine
            .logs(&self.container_id, tail)
            .await
            .map_err(|source| DeploymentError::LogsFailed {
                container_id: self.container_id.clone(),
                source,
            })
    }

    /// Stop and remove the container. Safe to call more than once.
    pub async fn teardown(&self) -> Result<()> {
        teardown(self.engine.as_ref(), &self.container_id, self.stop_timeout).await
    }

    pub fn summary(&self) -> DeploymentSummary {
        DeploymentSummary {
            container_id: self.container_id.clone(),
            namespace: self.namespace.clone(),
            image: self.image.clone(),
            daemon_address: self.endpoint.uri().to_string(),
            is_local: self.endpoint.is_local(),
            port_mappings: self.port_mappings.clone(),
            started_at: self.started_at,
            exit_status: self.exit_status,
        }
    }
}
