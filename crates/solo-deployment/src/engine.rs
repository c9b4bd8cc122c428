//! Container engine abstraction
//!
//! The provisioner talks to the daemon only through `ContainerEngine`, so each
//! provisioning call carries its own client handle and tests can swap in an
//! in-memory engine. `DockerEngine` in `crate::docker` is the production
//! implementation.

use crate::error::EngineError;
use crate::spec::ContainerSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Daemon self-report, as returned by `docker info`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonInfo {
    pub operating_system: Option<String>,
    pub os_type: Option<String>,
    pub name: Option<String>,
    pub server_version: Option<String>,
}

/// One host-side binding of a published container port
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostBinding {
    pub host_ip: Option<String>,
    pub host_port: Option<String>,
}

impl HostBinding {
    pub fn new(host_ip: impl Into<String>, host_port: u16) -> Self {
        Self {
            host_ip: Some(host_ip.into()),
            host_port: Some(host_port.to_string()),
        }
    }
}

/// Published network settings of a container
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDetails {
    pub gateway: Option<String>,
    /// `port/proto` -> bindings, in the order the daemon reported them
    pub ports: HashMap<String, Vec<HostBinding>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDetails {
    pub id: String,
    pub running: bool,
    pub network: NetworkDetails,
}

/// Operations the provisioner needs from a container daemon
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Daemon self-report
    async fn info(&self) -> Result<DaemonInfo, EngineError>;

    /// Whether the image is present on the daemon
    async fn image_exists(&self, image: &str) -> Result<bool, EngineError>;

    /// Pull an image
    async fn pull_image(&self, image: &str) -> Result<(), EngineError>;

    /// Create a container, returning its id
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError>;

    /// Start a created container
    async fn start_container(&self, container_id: &str) -> Result<(), EngineError>;

    /// Inspect a container
    async fn inspect_container(&self, container_id: &str)
        -> Result<ContainerDetails, EngineError>;

    /// Block until the container exits, returning its status code
    async fn wait_container(&self, container_id: &str) -> Result<i64, EngineError>;

    /// Stop a container
    async fn stop_container(&self, container_id: &str, timeout: Duration)
        -> Result<(), EngineError>;

    /// Remove a container
    async fn remove_container(&self, container_id: &str) -> Result<(), EngineError>;

    /// Get container logs
    async fn logs(&self, container_id: &str, tail: usize) -> Result<String, EngineError>;
}
