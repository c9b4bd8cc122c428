//! Error types for solo deployments

use std::time::Duration;
use thiserror::Error;

/// Result type for provisioning operations
pub type Result<T> = std::result::Result<T, DeploymentError>;

/// Transport-level failure reported by a container engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not modified")]
    NotModified,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Daemon returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}

impl From<bollard::errors::Error> for EngineError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => EngineError::NotFound(message),
            bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            } => EngineError::NotModified,
            bollard::errors::Error::DockerResponseServerError {
                status_code: status @ (401 | 403),
                message,
            } => EngineError::Unauthorized(format!("{status}: {message}")),
            bollard::errors::Error::DockerResponseServerError {
                status_code,
                message,
            } => EngineError::Server {
                status: status_code,
                message,
            },
            other => EngineError::Transport(other.to_string()),
        }
    }
}

/// Provisioning errors, one per pipeline stage
#[derive(Error, Debug)]
pub enum DeploymentError {
    // ========== Configuration ==========
    #[error("Profile '{profile}' does not define an image")]
    MissingProfileImage { profile: String },

    #[error("Duplicate environment variable: {key}")]
    DuplicateEnvKey { key: String },

    #[error("Invalid configuration at '{key}': {reason}")]
    InvalidConfig { key: String, reason: String },

    #[error("Invalid daemon endpoint '{uri}': {reason}")]
    InvalidEndpoint { uri: String, reason: String },

    #[error("Invalid container spec: {0}")]
    InvalidSpec(String),

    // ========== Daemon ==========
    #[error("Docker daemon at {uri} is unreachable: {source}")]
    DaemonUnreachable {
        uri: String,
        #[source]
        source: EngineError,
    },

    #[error("Failed to pull image {image}: {source}")]
    ImagePullFailed {
        image: String,
        #[source]
        source: EngineError,
    },

    // ========== Container lifecycle ==========
    #[error("Failed to create container from {image}: {source}")]
    Provisioning {
        image: String,
        #[source]
        source: EngineError,
    },

    #[error("Failed to start container {container_id}: {source}")]
    StartFailed {
        container_id: String,
        #[source]
        source: EngineError,
    },

    #[error("Failed to inspect container {container_id}: {source}")]
    InspectFailed {
        container_id: String,
        #[source]
        source: EngineError,
    },

    #[error("Port {port} of container {container_id} is not bound to the host")]
    PortNotBound { container_id: String, port: String },

    #[error("Lost connection while waiting on container {container_id}: {source}")]
    WaitTransport {
        container_id: String,
        #[source]
        source: EngineError,
    },

    #[error("Timed out after {timeout:?} waiting on container {container_id}")]
    WaitTimeout {
        container_id: String,
        timeout: Duration,
    },

    #[error("Container {container_id} exited with status {code}")]
    ContainerExitFailure { container_id: String, code: i64 },

    #[error("Failed to read logs of container {container_id}: {source}")]
    LogsFailed {
        container_id: String,
        #[source]
        source: EngineError,
    },

    #[error("Reachability probe for {target} failed: {reason}")]
    ProbeFailed { target: String, reason: String },

    #[error("Failed to tear down container {container_id}: {source}")]
    TeardownFailed {
        container_id: String,
        #[source]
        source: EngineError,
    },
}

impl DeploymentError {
    /// Exit code for `ContainerExitFailure`, `None` for every other kind
    pub fn exit_code(&self) -> Option<i64> {
        match self {
            DeploymentError::ContainerExitFailure { code, .. } => Some(*code),
            _ => None,
        }
    }
}
