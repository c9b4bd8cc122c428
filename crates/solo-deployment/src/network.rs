//! Port mapping discovery for a started container

use crate::endpoint::DaemonEndpoint;
use crate::engine::{ContainerEngine, NetworkDetails};
use crate::error::{DeploymentError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// One reachable host address for one container port
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub container_port: u16,
    pub protocol: String,
    pub host_address: String,
    pub host_port: u16,
}

impl PortMapping {
    /// `port/proto` key of the container side
    pub fn key(&self) -> String {
        format!("{}/{}", self.container_port, self.protocol)
    }

    /// `host:port` string, IPv6 hosts bracketed
    pub fn socket_address(&self) -> String {
        if self.host_address.contains(':') {
            format!("[{}]:{}", self.host_address, self.host_port)
        } else {
            format!("{}:{}", self.host_address, self.host_port)
        }
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.key(), self.socket_address())
    }
}

fn is_unspecified(host: &str) -> bool {
    matches!(host, "" | "0.0.0.0" | "::" | "[::]")
}

/// Reads host bindings for the declared ports of a running container.
pub struct NetworkInspector<'a> {
    engine: &'a dyn ContainerEngine,
    endpoint: &'a DaemonEndpoint,
}

impl<'a> NetworkInspector<'a> {
    pub fn new(engine: &'a dyn ContainerEngine, endpoint: &'a DaemonEndpoint) -> Self {
        Self { engine, endpoint }
    }

    /// Inspect `container_id` and map every declared `port/proto`.
    pub async fn inspect(
        &self,
        container_id: &str,
        declared_ports: &[String],
    ) -> Result<Vec<PortMapping>> {
        let details = self
            .engine
            .inspect_container(container_id)
            .await
            .map_err(|source| DeploymentError::InspectFailed {
                container_id: container_id.to_string(),
                source,
            })?;

        if !details.running {
            warn!(container_id = %container_id, "Container is not running, ports may be unbound");
        }
        self.map_ports(container_id, &details.network, declared_ports)
    }

    /// Map declared ports against already fetched network details
    pub fn map_ports(
        &self,
        container_id: &str,
        network: &NetworkDetails,
        declared_ports: &[String],
    ) -> Result<Vec<PortMapping>> {
        let fallback_host = network
            .gateway
            .as_deref()
            .filter(|g| !is_unspecified(g))
            .unwrap_or_else(|| self.endpoint.address().reachable_host());

        declared_ports
            .iter()
            .map(|declared| {
                let not_bound = || DeploymentError::PortNotBound {
                    container_id: container_id.to_string(),
                    port: declared.clone(),
                };

                let (port, protocol) = declared
                    .split_once('/')
                    .unwrap_or((declared.as_str(), "tcp"));
                let container_port = port.parse::<u16>().map_err(|_| not_bound())?;

                let binding = network
                    .ports
                    .get(declared)
                    .and_then(|bindings| bindings.first())
                    .ok_or_else(not_bound)?;

                let host_port = binding
                    .host_port
                    .as_deref()
                    .and_then(|p| p.parse::<u16>().ok())
                    .filter(|p| *p > 0)
                    .ok_or_else(not_bound)?;

                let host_address = match binding.host_ip.as_deref() {
                    Some(ip) if !is_unspecified(ip) => ip.to_string(),
                    _ => fallback_host.to_string(),
                };

                let mapping = PortMapping {
                    container_port,
                    protocol: protocol.to_string(),
                    host_address,
                    host_port,
                };
                debug!(container_id = %container_id, mapping = %mapping, "Port mapped");
                Ok(mapping)
            })
            .collect()
    }
}
