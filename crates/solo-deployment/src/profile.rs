//! Profile resolution
//!
//! A profile is a named bundle of image, namespace and extra environment under
//! `solo.profiles.<name>`. The active profile is chosen explicitly or by `solo.profile`.

use crate::config::{json_type, ConfigTree};
use crate::error::{DeploymentError, Result};
use serde_json::Value;
use std::collections::HashSet;

pub const PROFILE_KEY: &str = "solo.profile";
pub const PROFILES_KEY: &str = "solo.profiles";

/// A resolved configuration bundle
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Profile {
    /// Name of the profile this came from, `None` for defaults
    pub name: Option<String>,
    pub image: Option<String>,
    pub namespace: Option<String>,
    /// Extra environment, in config order, keys unique
    pub env: Vec<(String, String)>,
}

/// Values supplied directly to the builder; they win over the profile.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileOverrides {
    pub image: Option<String>,
    pub namespace: Option<String>,
    pub env: Vec<(String, String)>,
}

/// Resolve the active profile from `tree`.
///
/// `name` wins over `solo.profile`. Without either, the profile carries only
/// `fallback_image`.
pub fn resolve_profile(
    tree: &ConfigTree,
    name: Option<&str>,
    fallback_image: Option<&str>,
) -> Result<Profile> {
    let selected = match name {
        Some(name) => Some(name.to_string()),
        None => tree.get_str(PROFILE_KEY)?.map(str::to_string),
    };

    let Some(name) = selected.filter(|n| !n.is_empty()) else {
        return Ok(Profile {
            image: fallback_image.map(str::to_string),
            ..Default::default()
        });
    };

    let base = format!("{PROFILES_KEY}.{name}");

    let image = tree
        .get_str(&format!("{base}.image"))?
        .ok_or_else(|| DeploymentError::MissingProfileImage {
            profile: name.clone(),
        })?
        .to_string();

    let namespace_key = format!("{base}.namespace");
    let namespace = match tree.get_str(&namespace_key)? {
        Some("") => {
            return Err(DeploymentError::InvalidConfig {
                key: namespace_key,
                reason: "namespace must not be empty".to_string(),
            })
        }
        other => other.map(str::to_string),
    };

    let env_key = format!("{base}.env");
    let env = match tree.get(&env_key) {
        None => Vec::new(),
        Some(value) => collect_env(&env_key, value)?,
    };

    Ok(Profile {
        name: Some(name),
        image: Some(image),
        namespace,
        env,
    })
}

/// Layer builder overrides on top of a resolved profile.
pub fn apply_overrides(mut profile: Profile, overrides: &ProfileOverrides) -> Result<Profile> {
    if let Some(image) = &overrides.image {
        profile.image = Some(image.clone());
    }
    if let Some(namespace) = &overrides.namespace {
        if namespace.is_empty() {
            return Err(DeploymentError::InvalidConfig {
                key: "namespace".to_string(),
                reason: "namespace must not be empty".to_string(),
            });
        }
        profile.namespace = Some(namespace.clone());
    }
    for (key, value) in &overrides.env {
        match profile.env.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.clone(),
            None => profile.env.push((key.clone(), value.clone())),
        }
    }
    Ok(profile)
}

/// Flatten a profile's `env` into ordered pairs.
///
/// Only the `["KEY=VALUE", ...]` form can repeat a key. In the object form the
/// JSON parser has already kept the last value of a repeated key, so no
/// duplicate reaches this point.
fn collect_env(env_key: &str, value: &Value) -> Result<Vec<(String, String)>> {
    let mut seen = HashSet::new();
    let mut env = Vec::new();

    let mut push = |key: String, value: String| -> Result<()> {
        if !seen.insert(key.clone()) {
            return Err(DeploymentError::DuplicateEnvKey { key });
        }
        env.push((key, value));
        Ok(())
    };

    match value {
        Value::Object(map) => {
            for (key, value) in map {
                let rendered = render_scalar(&format!("{env_key}.{key}"), value)?;
                push(key.clone(), rendered)?;
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                let entry_key = format!("{env_key}[{index}]");
                let Value::String(entry) = item else {
                    return Err(DeploymentError::InvalidConfig {
                        key: entry_key,
                        reason: format!("expected \"KEY=VALUE\", found {}", json_type(item)),
                    });
                };
                let Some((key, value)) = entry.split_once('=').filter(|(k, _)| !k.is_empty())
                else {
                    return Err(DeploymentError::InvalidConfig {
                        key: entry_key,
                        reason: format!("expected \"KEY=VALUE\", found \"{entry}\""),
                    });
                };
                push(key.to_string(), value.to_string())?;
            }
        }
        other => {
            return Err(DeploymentError::InvalidConfig {
                key: env_key.to_string(),
                reason: format!("expected an object or array, found {}", json_type(other)),
            })
        }
    }

    Ok(env)
}

fn render_scalar(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(DeploymentError::InvalidConfig {
            key: key.to_string(),
            reason: format!("expected a scalar, found {}", json_type(other)),
        }),
    }
}
