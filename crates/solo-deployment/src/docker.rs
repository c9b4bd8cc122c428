//! Docker engine backed by bollard

use crate::endpoint::{EndpointAddress, EndpointScheme};
use crate::engine::{ContainerDetails, ContainerEngine, DaemonInfo, HostBinding, NetworkDetails};
use crate::error::EngineError;
use crate::spec::ContainerSpec;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogsOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::{StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Request timeout for daemon calls, in seconds. `wait` is a long poll and is
/// not bounded by this.
const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Docker engine for one daemon endpoint
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl std::fmt::Debug for DockerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerEngine").finish_non_exhaustive()
    }
}

impl DockerEngine {
    /// Connect to the daemon at `address`. No request is made until first use.
    pub fn connect(address: &EndpointAddress) -> Result<Self, EngineError> {
        let docker = match address.scheme() {
            EndpointScheme::Unix => {
                let socket = address
                    .socket_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| address.uri().to_string());
                Docker::connect_with_socket(&socket, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)?
            }
            _ if address.uses_tls() => {
                let certs = address.cert_path().ok_or_else(|| {
                    EngineError::Transport(format!(
                        "TLS endpoint {} needs a certificate directory (DOCKER_CERT_PATH)",
                        address.uri()
                    ))
                })?;
                Docker::connect_with_ssl(
                    &network_addr(address),
                    &certs.join("key.pem"),
                    &certs.join("cert.pem"),
                    &certs.join("ca.pem"),
                    CONNECT_TIMEOUT_SECS,
                    API_DEFAULT_VERSION,
                )?
            }
            _ => Docker::connect_with_http(
                &network_addr(address),
                CONNECT_TIMEOUT_SECS,
                API_DEFAULT_VERSION,
            )?,
        };

        debug!(uri = %address.uri(), "Docker client configured");
        Ok(Self { docker })
    }

    /// Wrap a pre-configured bollard client
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }
}

fn network_addr(address: &EndpointAddress) -> String {
    let host = address.host();
    let port = address.port().unwrap_or_default();
    if host.contains(':') {
        format!("tcp://[{host}]:{port}")
    } else {
        format!("tcp://{host}:{port}")
    }
}

/// Whole seconds for the stop API, saturating at `i64::MAX`
fn stop_timeout_secs(timeout: Duration) -> i64 {
    i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX)
}

fn to_bollard_config(spec: &ContainerSpec) -> Config<String> {
    let exposed_ports = spec
        .exposed_ports
        .iter()
        .map(|port| (port.clone(), HashMap::new()))
        .collect();

    let host_config = HostConfig {
        binds: (!spec.binds.is_empty()).then(|| spec.binds.clone()),
        publish_all_ports: Some(spec.publish_all_ports),
        ..Default::default()
    };

    Config {
        image: Some(spec.image.clone()),
        cmd: spec.cmd.clone(),
        env: Some(spec.env.clone()),
        labels: Some(spec.labels.clone()),
        exposed_ports: Some(exposed_ports),
        host_config: Some(host_config),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn info(&self) -> Result<DaemonInfo, EngineError> {
        let info = self.docker.info().await?;
        Ok(DaemonInfo {
            operating_system: info.operating_system,
            os_type: info.os_type,
            name: info.name,
            server_version: info.server_version,
        })
    }

    async fn image_exists(&self, image: &str) -> Result<bool, EngineError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<(), EngineError> {
        info!(image = %image, "Pulling Docker image");

        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            let progress = result?;
            if let Some(status) = progress.status {
                debug!(image = %image, status = %status, "Pull progress");
            }
        }

        info!(image = %image, "Image pulled successfully");
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let options = (!spec.name.is_empty()).then(|| CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        });

        let response = self
            .docker
            .create_container(options, to_bollard_config(spec))
            .await?;

        for warning in &response.warnings {
            warn!(container_id = %response.id, warning = %warning, "Docker create warning");
        }

        Ok(response.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn inspect_container(
        &self,
        container_id: &str,
    ) -> Result<ContainerDetails, EngineError> {
        let inspect = self.docker.inspect_container(container_id, None).await?;

        let running = inspect
            .state
            .as_ref()
            .and_then(|s| s.running)
            .unwrap_or(false);

        let mut network = NetworkDetails::default();
        if let Some(settings) = inspect.network_settings {
            // Newer daemons only report the gateway per attached network.
            network.gateway = settings
                .gateway
                .filter(|g| !g.is_empty())
                .or_else(|| {
                    settings.networks.as_ref().and_then(|networks| {
                        networks
                            .values()
                            .find_map(|n| n.gateway.clone().filter(|g| !g.is_empty()))
                    })
                });

            for (port, bindings) in settings.ports.unwrap_or_default() {
                let bindings = bindings
                    .unwrap_or_default()
                    .into_iter()
                    .map(|b| HostBinding {
                        host_ip: b.host_ip,
                        host_port: b.host_port,
                    })
                    .collect();
                network.ports.insert(port, bindings);
            }
        }

        Ok(ContainerDetails {
            id: inspect.id.unwrap_or_else(|| container_id.to_string()),
            running,
            network,
        })
    }

    async fn wait_container(&self, container_id: &str) -> Result<i64, EngineError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(container_id, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a nonzero exit as an error carrying the code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e.into()),
            None => Err(EngineError::Transport(format!(
                "wait stream for {container_id} closed without a status"
            ))),
        }
    }

    async fn stop_container(
        &self,
        container_id: &str,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        let options = StopContainerOptions {
            t: stop_timeout_secs(timeout),
        };
        self.docker
            .stop_container(container_id, Some(options))
            .await?;
        debug!(container_id = %container_id, "Container stopped");
        Ok(())
    }

    async fn remove_container(&self, container_id: &str) -> Result<(), EngineError> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        self.docker
            .remove_container(container_id, Some(options))
            .await?;
        debug!(container_id = %container_id, "Container removed");
        Ok(())
    }

    async fn logs(&self, container_id: &str, tail: usize) -> Result<String, EngineError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            ..Default::default()
        };

        let logs: Vec<_> = self
            .docker
            .logs(container_id, Some(options))
            .try_collect()
            .await?;

        Ok(logs
            .into_iter()
            .map(|log| log.to_string())
            .collect::<Vec<_>>()
            .join(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_translation() {
        let spec = ContainerSpec {
            name: "helios-solo-container-ns".into(),
            image: "spotify/helios-solo:latest".into(),
            env: vec!["HELIOS_NAME=ns.solo.local".into()],
            binds: vec!["/var/run/docker.sock:/var/run/docker.sock".into()],
            exposed_ports: vec!["5801/tcp".into()],
            publish_all_ports: true,
            ..Default::default()
        };

        let config = to_bollard_config(&spec);
        assert_eq!(config.image.as_deref(), Some("spotify/helios-solo:latest"));
        assert!(config.exposed_ports.unwrap().contains_key("5801/tcp"));
        let host_config = config.host_config.unwrap();
        assert_eq!(host_config.publish_all_ports, Some(true));
        assert_eq!(host_config.binds.unwrap().len(), 1);
    }

    #[test]
    fn test_config_omits_empty_binds() {
        let spec = ContainerSpec {
            image: "img".into(),
            ..Default::default()
        };
        let config = to_bollard_config(&spec);
        assert!(config.host_config.unwrap().binds.is_none());
    }

    #[test]
    fn test_network_addr_brackets_ipv6() {
        let v4 = EndpointAddress::parse("tcp://10.0.0.5:2375").unwrap();
        assert_eq!(network_addr(&v4), "tcp://10.0.0.5:2375");
        let v6 = EndpointAddress::parse("tcp://[::1]:2375").unwrap();
        assert_eq!(network_addr(&v6), "tcp://[::1]:2375");
    }

    #[test]
    fn test_stop_timeout_saturates() {
        assert_eq!(stop_timeout_secs(Duration::from_secs(30)), 30);
        assert_eq!(stop_timeout_secs(Duration::from_millis(1500)), 1);
        assert_eq!(stop_timeout_secs(Duration::from_secs(u64::MAX)), i64::MAX);
    }

    #[tokio::test]
    async fn test_connect_is_lazy() {
        let address = EndpointAddress::parse("tcp://127.0.0.1:2375").unwrap();
        assert!(DockerEngine::connect(&address).is_ok());
    }

    #[test]
    fn test_tls_without_certs_is_rejected() {
        let address = EndpointAddress::parse("https://docker.example.com:2376").unwrap();
        assert!(matches!(
            DockerEngine::connect(&address),
            Err(EngineError::Transport(_))
        ));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_docker_info() {
        let address = EndpointAddress::parse(crate::endpoint::DEFAULT_DOCKER_URI).unwrap();
        let engine = DockerEngine::connect(&address).unwrap();
        assert!(engine.info().await.is_ok());
    }
}
