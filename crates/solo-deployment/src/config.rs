//! Configuration for solo deployments
//!
//! `ConfigTree` is the resolved key/value tree handed to the provisioner. Keys are
//! addressed with dots (`solo.profiles.test.image`). `ProvisionerSettings` holds the
//! typed knobs read from the `solo.provisioner` subtree; durations serialize as plain
//! seconds so a JSON config file stays readable.

use crate::error::{DeploymentError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;

/// Image used when no profile selects one
pub const DEFAULT_SOLO_IMAGE: &str = "spotify/helios-solo:latest";

/// Port the solo master listens on inside the container
pub const DEFAULT_SOLO_PORT: &str = "5801/tcp";

/// Image used for the reachability probe container
pub const DEFAULT_PROBE_IMAGE: &str = "alpine:3.19";

const SETTINGS_KEY: &str = "solo.provisioner";

/// Dotted-key view over a JSON document.
///
/// Object key order is preserved, which is what gives profile env entries a stable
/// iteration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigTree {
    root: Value,
}

impl ConfigTree {
    pub fn empty() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let root = serde_json::from_str(json).map_err(|e| DeploymentError::InvalidConfig {
            key: "<root>".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { root })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| DeploymentError::InvalidConfig {
                key: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Self::from_json_str(&contents)
    }

    /// Return a copy of the tree with `key` set, creating intermediate objects.
    pub fn with_value(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let mut node = &mut self.root;
        for segment in key.split('.') {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            let Value::Object(map) = node else {
                unreachable!("node was just made an object")
            };
            node = map.entry(segment.to_string()).or_insert(Value::Null);
        }
        *node = value.into();
    }

    /// Apply a `key=value` assignment.
    ///
    /// `true`/`false` become booleans and `{...}`/`[...]` are parsed as JSON; anything
    /// else, numbers included, is kept verbatim as a string.
    pub fn apply_assignment(&mut self, assignment: &str) -> Result<()> {
        let (key, raw) = assignment
            .split_once('=')
            .ok_or_else(|| DeploymentError::InvalidConfig {
                key: assignment.to_string(),
                reason: "expected key=value".to_string(),
            })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(DeploymentError::InvalidConfig {
                key: assignment.to_string(),
                reason: "empty key".to_string(),
            });
        }
        self.set(key, assignment_value(raw));
        Ok(())
    }

    /// Look up a dotted key. `null` is treated as absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        key.split('.')
            .try_fold(&self.root, |node, segment| node.get(segment))
            .filter(|value| !value.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Look up a string value; any other present type is a configuration error.
    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(DeploymentError::InvalidConfig {
                key: key.to_string(),
                reason: format!("expected a string, found {}", json_type(other)),
            }),
        }
    }
}

fn assignment_value(raw: &str) -> Value {
    match raw.trim() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        structured if structured.starts_with('{') || structured.starts_with('[') => {
            serde_json::from_str(structured).unwrap_or_else(|_| Value::String(raw.to_string()))
        }
        _ => Value::String(raw.to_string()),
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Provisioner settings, read from `solo.provisioner`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerSettings {
    /// Image used when no profile or override selects one
    pub default_image: String,
    /// Container ports to publish and resolve, as `port/proto`
    pub ports: Vec<String>,
    /// Pull the image when the daemon does not have it
    pub pull_image: bool,
    /// Grace period given to the container on teardown
    #[serde(with = "humantime_serde")]
    pub stop_timeout: Duration,
    /// Run the reachability probe after the container starts
    pub probe: bool,
    pub probe_image: String,
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
}

impl Default for ProvisionerSettings {
    fn default() -> Self {
        Self {
            default_image: DEFAULT_SOLO_IMAGE.to_string(),
            ports: vec![DEFAULT_SOLO_PORT.to_string()],
            pull_image: true,
            stop_timeout: Duration::from_secs(30),
            probe: false,
            probe_image: DEFAULT_PROBE_IMAGE.to_string(),
            probe_timeout: Duration::from_secs(60),
        }
    }
}

impl ProvisionerSettings {
    /// Read settings from the tree, falling back to defaults for absent fields.
    pub fn from_tree(tree: &ConfigTree) -> Result<Self> {
        match tree.get(SETTINGS_KEY) {
            None => Ok(Self::default()),
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                DeploymentError::InvalidConfig {
                    key: SETTINGS_KEY.to_string(),
                    reason: e.to_string(),
                }
            }),
        }
    }
}

/// Humantime serde helper
mod humantime_serde {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    /// Seconds as a number, or as a numeric string from `--set`
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = match Seconds::deserialize(deserializer)? {
            Seconds::Number(secs) => secs,
            Seconds::Text(text) => text.trim().parse().map_err(|_| {
                D::Error::custom(format!("invalid duration in seconds: '{text}'"))
            })?,
        };
        Ok(Duration::from_secs(secs))
    }
}
