//! Reachability probe for published ports
//!
//! Runs `nc -z` from a throwaway container on the same daemon to check that a
//! mapped address actually accepts connections.

use crate::engine::ContainerEngine;
use crate::error::{DeploymentError, Result};
use crate::lifecycle::{teardown, ExitStatus, LifecycleWaiter};
use crate::network::PortMapping;
use crate::provisioner::ContainerProvisioner;
use crate::spec::{generate_namespace, labels, ContainerSpec};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

pub const PROBE_NAME_PREFIX: &str = "helios-solo-probe-";

/// Seconds `nc` waits for the connection
const NC_TIMEOUT_SECS: u64 = 10;

/// Probe containers never outlive the check, so stop immediately.
const PROBE_STOP_TIMEOUT: Duration = Duration::from_secs(1);

pub struct ReachabilityProbe<'a> {
    engine: &'a dyn ContainerEngine,
    image: String,
    timeout: Duration,
    pull_image: bool,
}

impl<'a> ReachabilityProbe<'a> {
    pub fn new(
        engine: &'a dyn ContainerEngine,
        image: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            engine,
            image: image.into(),
            timeout,
            pull_image: true,
        }
    }

    pub fn pull_image(mut self, pull_image: bool) -> Self {
        self.pull_image = pull_image;
        self
    }

    fn probe_spec(&self, mapping: &PortMapping, namespace: &str) -> ContainerSpec {
        ContainerSpec {
            name: format!("{PROBE_NAME_PREFIX}{}", generate_namespace()),
            image: self.image.clone(),
            cmd: Some(vec![
                "nc".to_string(),
                "-z".to_string(),
                "-w".to_string(),
                NC_TIMEOUT_SECS.to_string(),
                mapping.host_address.clone(),
                mapping.host_port.to_string(),
            ]),
            labels: HashMap::from([
                (labels::MANAGED.to_string(), "true".to_string()),
                (labels::NAMESPACE.to_string(), namespace.to_string()),
            ]),
            ..Default::default()
        }
    }

    /// Check that `mapping` accepts TCP connections
    pub async fn check(&self, mapping: &PortMapping, namespace: &str) -> Result<()> {
        let target = mapping.socket_address();
        let failed = |reason: String| DeploymentError::ProbeFailed {
            target: target.clone(),
            reason,
        };

        let spec = self.probe_spec(mapping, namespace);
        let probe_id = ContainerProvisioner::new(self.engine, self.pull_image)
            .provision(&spec)
            .await
            .map_err(|e| failed(e.to_string()))?;

        let outcome = LifecycleWaiter::new(self.engine)
            .wait(&probe_id, Some(self.timeout))
            .await;

        if let Err(e) = teardown(self.engine, &probe_id, PROBE_STOP_TIMEOUT).await {
            warn!(container_id = %probe_id, error = %e, "Failed to remove probe container");
        }

        match outcome.map_err(|e| failed(e.to_string()))? {
            ExitStatus::Success => {
                info!(target = %target, "Reachability probe succeeded");
                Ok(())
            }
            ExitStatus::Failure(code) => Err(failed(format!("nc exited with status {code}"))),
        }
    }
}
