//! Create-and-start sequence for the solo container

use crate::engine::ContainerEngine;
use crate::error::{DeploymentError, Result};
use crate::spec::ContainerSpec;
use tracing::{debug, info, warn};

/// Issues create then start against the engine. Never retries.
pub struct ContainerProvisioner<'a> {
    engine: &'a dyn ContainerEngine,
    pull_image: bool,
}

impl<'a> ContainerProvisioner<'a> {
    pub fn new(engine: &'a dyn ContainerEngine, pull_image: bool) -> Self {
        Self { engine, pull_image }
    }

    /// Pull `image` unless the daemon already has it
    pub async fn ensure_image(&self, image: &str) -> Result<()> {
        let pull_failed = |source| DeploymentError::ImagePullFailed {
            image: image.to_string(),
            source,
        };

        if self.engine.image_exists(image).await.map_err(pull_failed)? {
            debug!(image = %image, "Image already present");
            return Ok(());
        }

        info!(image = %image, "Image not found locally, pulling");
        self.engine.pull_image(image).await.map_err(pull_failed)
    }

    /// Create and start a container from `spec`, returning its id.
    ///
    /// If start fails the created container is removed before the error is
    /// returned.
    pub async fn provision(&self, spec: &ContainerSpec) -> Result<String> {
        if self.pull_image {
            self.ensure_image(&spec.image).await?;
        }

        let container_id = self
            .engine
            .create_container(spec)
            .await
            .map_err(|source| DeploymentError::Provisioning {
                image: spec.image.clone(),
                source,
            })?;

        info!(
            container_id = %container_id,
            name = %spec.name,
            image = %spec.image,
            "Container created"
        );

        if let Err(source) = self.engine.start_container(&container_id).await {
            warn!(
                container_id = %container_id,
                error = %source,
                "Start failed, removing created container"
            );
            if let Err(e) = self.engine.remove_container(&container_id).await {
                warn!(container_id = %container_id, error = %e, "Cleanup remove failed");
            }
            return Err(DeploymentError::StartFailed {
                container_id,
                source,
            });
        }

        info!(container_id = %container_id, "Container started");
        Ok(container_id)
    }
}
