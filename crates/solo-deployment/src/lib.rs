//! Solo Deployment
//!
//! Provisions a single "solo" container of the Helios backend on a Docker
//! daemon so tests can talk to a real master and agent. Provides:
//! - Profile resolution from a dotted config tree
//! - Daemon endpoint resolution and locality detection
//! - Container spec building, create/start with cleanup on failure
//! - Port mapping discovery with gateway fallback
//! - Waiting for exit, teardown and an optional reachability probe
//!
//! ```no_run
//! # async fn run() -> solo_deployment::Result<()> {
//! use solo_deployment::{ConfigTree, SoloDeployment};
//!
//! let config = ConfigTree::from_file("solo.json")?;
//! let mut solo = SoloDeployment::builder().config(config).build().await?;
//! println!("master at {:?}", solo.address());
//! solo.wait_for_exit(None).await?;
//! solo.teardown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod deployment;
pub mod docker;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod network;
pub mod probe;
pub mod profile;
pub mod provisioner;
pub mod spec;

pub use config::{ConfigTree, ProvisionerSettings};
pub use deployment::{DeploymentSummary, SoloDeployment, SoloDeploymentBuilder};
pub use docker::DockerEngine;
pub use endpoint::{
    is_local_daemon, is_virtualized, DaemonEndpoint, EndpointAddress, EndpointScheme,
    HostResolver,
};
pub use engine::{ContainerDetails, ContainerEngine, DaemonInfo, HostBinding, NetworkDetails};
pub use error::{DeploymentError, EngineError, Result};
pub use lifecycle::{teardown, ExitStatus, LifecycleWaiter};
pub use network::{NetworkInspector, PortMapping};
pub use probe::ReachabilityProbe;
pub use profile::{apply_overrides, resolve_profile, Profile, ProfileOverrides};
pub use provisioner::ContainerProvisioner;
pub use spec::{build_container_spec, generate_namespace, ContainerSpec};
