//! Container spec building
//!
//! Turns a resolved `Profile` and a classified `DaemonEndpoint` into the full
//! creation request for the solo container.

use crate::config::ProvisionerSettings;
use crate::endpoint::DaemonEndpoint;
use crate::error::{DeploymentError, Result};
use crate::profile::Profile;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identity variable the solo image reads its name from
pub const HELIOS_NAME_ENV: &str = "HELIOS_NAME";
pub const HELIOS_NAME_SUFFIX: &str = ".solo.local";

pub const CONTAINER_NAME_PREFIX: &str = "helios-solo-container-";

/// Where TLS material is mounted inside the solo container
pub const CONTAINER_CERT_PATH: &str = "/certs";

/// Standard labels applied to every solo container
pub mod labels {
    pub const MANAGED: &str = "helios.solo.managed";
    pub const NAMESPACE: &str = "helios.solo.namespace";
}

/// A fully built container creation request
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Command override, `None` keeps the image default
    pub cmd: Option<Vec<String>>,
    /// `KEY=VALUE` entries
    pub env: Vec<String>,
    /// `host:container[:mode]` entries
    pub binds: Vec<String>,
    /// `port/proto` entries
    pub exposed_ports: Vec<String>,
    pub labels: HashMap<String, String>,
    /// Let the daemon pick host ports for every exposed port
    pub publish_all_ports: bool,
}

impl ContainerSpec {
    /// Value of an env entry, if set
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env.iter().find_map(|entry| {
            entry
                .split_once('=')
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v)
        })
    }
}

/// Generate a namespace for deployments that do not name one
pub fn generate_namespace() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Build the solo container spec.
///
/// `namespace` is the namespace to use when the profile carries none; callers pass
/// a generated one so the container name and `HELIOS_NAME` agree.
pub fn build_container_spec(
    profile: &Profile,
    endpoint: &DaemonEndpoint,
    settings: &ProvisionerSettings,
    fallback_namespace: &str,
) -> Result<ContainerSpec> {
    let image = profile
        .image
        .clone()
        .unwrap_or_else(|| settings.default_image.clone());
    if image.trim().is_empty() {
        return Err(DeploymentError::InvalidSpec(
            "image reference is empty".to_string(),
        ));
    }

    let namespace = profile
        .namespace
        .clone()
        .unwrap_or_else(|| fallback_namespace.to_string());
    if namespace.is_empty() {
        return Err(DeploymentError::InvalidSpec(
            "namespace is empty".to_string(),
        ));
    }

    let exposed_ports = validate_ports(&settings.ports)?;

    let mut env = vec![format!("{HELIOS_NAME_ENV}={namespace}{HELIOS_NAME_SUFFIX}")];
    for (key, value) in &profile.env {
        if key == HELIOS_NAME_ENV {
            return Err(DeploymentError::DuplicateEnvKey { key: key.clone() });
        }
        env.push(format!("{key}={value}"));
    }

    let mut binds = Vec::new();
    let has_env = |env: &[String], key: &str| {
        env.iter()
            .any(|e| e.split_once('=').map(|(k, _)| k) == Some(key))
    };

    if let Some(socket) = endpoint.local_socket_path() {
        let socket = socket.display();
        binds.push(format!("{socket}:{socket}"));
        if !has_env(&env, "DOCKER_HOST") {
            env.push(format!("DOCKER_HOST=unix://{socket}"));
        }
        if let Some(cert_path) = endpoint.address().cert_path() {
            binds.push(format!(
                "{}:{CONTAINER_CERT_PATH}:ro",
                cert_path.display()
            ));
            if !has_env(&env, "DOCKER_CERT_PATH") {
                env.push(format!("DOCKER_CERT_PATH={CONTAINER_CERT_PATH}"));
            }
        }
    } else if !has_env(&env, "DOCKER_HOST") {
        env.push(format!("DOCKER_HOST={}", endpoint.uri()));
    }

    let labels = HashMap::from([
        (labels::MANAGED.to_string(), "true".to_string()),
        (labels::NAMESPACE.to_string(), namespace.clone()),
    ]);

    Ok(ContainerSpec {
        name: format!("{CONTAINER_NAME_PREFIX}{namespace}"),
        image,
        cmd: None,
        env,
        binds,
        exposed_ports,
        labels,
        publish_all_ports: true,
    })
}

fn validate_ports(ports: &[String]) -> Result<Vec<String>> {
    if ports.is_empty() {
        return Err(DeploymentError::InvalidSpec(
            "no container ports declared".to_string(),
        ));
    }
    ports
        .iter()
        .map(|port| {
            let (number, proto) = port.split_once('/').unwrap_or((port.as_str(), "tcp"));
            let valid_number = number.parse::<u16>().map(|n| n > 0).unwrap_or(false);
            if !valid_number || !matches!(proto, "tcp" | "udp" | "sctp") {
                return Err(DeploymentError::InvalidSpec(format!(
                    "malformed container port '{port}'"
                )));
            }
            Ok(format!("{number}/{proto}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointAddress;

    fn endpoint(uri: &str, is_local: bool) -> DaemonEndpoint {
        DaemonEndpoint::classified(EndpointAddress::parse(uri).unwrap(), is_local)
    }

    fn test_profile() -> Profile {
        Profile {
            name: Some("test".to_string()),
            image: Some("helios-test".to_string()),
            namespace: Some("namespace".to_string()),
            env: vec![("TEST".to_string(), "stuff".to_string())],
        }
    }

    fn build(profile: &Profile, endpoint: &DaemonEndpoint) -> Result<ContainerSpec> {
        build_container_spec(profile, endpoint, &ProvisionerSettings::default(), "generated")
    }

    #[test]
    fn test_profile_env_and_identity() {
        let spec = build(&test_profile(), &endpoint("tcp://localhost:2375", true)).unwrap();
        assert_eq!(spec.image, "helios-test");
        assert!(spec.env.contains(&"TEST=stuff".to_string()));
        assert!(spec
            .env
            .contains(&"HELIOS_NAME=namespace.solo.local".to_string()));
        assert_eq!(
            spec.env
                .iter()
                .filter(|e| e.starts_with("HELIOS_NAME="))
                .count(),
            1
        );
        assert_eq!(spec.name, "helios-solo-container-namespace");
        assert_eq!(spec.labels[labels::NAMESPACE], "namespace");
    }

    #[test]
    fn test_local_daemon_gets_socket_bind() {
        let spec = build(&Profile::default(), &endpoint("tcp://localhost:2375", true)).unwrap();
        assert!(spec
            .binds
            .contains(&"/var/run/docker.sock:/var/run/docker.sock".to_string()));
        assert_eq!(
            spec.env_value("DOCKER_HOST"),
            Some("unix:///var/run/docker.sock")
        );
        assert_eq!(spec.image, crate::config::DEFAULT_SOLO_IMAGE);
        assert_eq!(
            spec.env_value(HELIOS_NAME_ENV),
            Some("generated.solo.local")
        );
    }

    #[test]
    fn test_custom_socket_is_bound_at_same_path() {
        let spec = build(
            &Profile::default(),
            &endpoint("unix:///run/user/1000/docker.sock", true),
        )
        .unwrap();
        assert_eq!(
            spec.binds,
            vec!["/run/user/1000/docker.sock:/run/user/1000/docker.sock".to_string()]
        );
    }

    #[test]
    fn test_remote_daemon_gets_no_binds() {
        let spec = build(&test_profile(), &endpoint("tcp://192.168.99.100:2376", false)).unwrap();
        assert!(spec.binds.is_empty());
        assert_eq!(
            spec.env_value("DOCKER_HOST"),
            Some("tcp://192.168.99.100:2376")
        );
    }

    #[test]
    fn test_local_tls_material_is_mounted() {
        let address = EndpointAddress::parse("tcp://127.0.0.1:2376")
            .unwrap()
            .with_cert_path("/home/me/.docker");
        let endpoint = DaemonEndpoint::classified(address, true);
        let spec = build(&Profile::default(), &endpoint).unwrap();
        assert!(spec.binds.contains(&"/home/me/.docker:/certs:ro".to_string()));
        assert_eq!(spec.env_value("DOCKER_CERT_PATH"), Some("/certs"));
    }

    #[test]
    fn test_profile_docker_host_is_kept() {
        let mut profile = test_profile();
        profile
            .env
            .push(("DOCKER_HOST".to_string(), "tcp://custom:2375".to_string()));
        let spec = build(&profile, &endpoint("tcp://localhost:2375", true)).unwrap();
        assert_eq!(spec.env_value("DOCKER_HOST"), Some("tcp://custom:2375"));
        assert_eq!(
            spec.env
                .iter()
                .filter(|e| e.starts_with("DOCKER_HOST="))
                .count(),
            1
        );
    }

    #[test]
    fn test_helios_name_in_profile_env_rejected() {
        let mut profile = test_profile();
        profile
            .env
            .push((HELIOS_NAME_ENV.to_string(), "other".to_string()));
        let err = build(&profile, &endpoint("tcp://localhost:2375", true)).unwrap_err();
        assert!(matches!(err, DeploymentError::DuplicateEnvKey { key } if key == HELIOS_NAME_ENV));
    }

    #[test]
    fn test_empty_image_rejected() {
        let profile = Profile {
            image: Some("  ".to_string()),
            ..Default::default()
        };
        let err = build(&profile, &endpoint("tcp://localhost:2375", true)).unwrap_err();
        assert!(matches!(err, DeploymentError::InvalidSpec(_)));
    }

    #[test]
    fn test_ports_are_validated() {
        let settings = ProvisionerSettings {
            ports: vec!["5801".to_string(), "53/udp".to_string()],
            ..Default::default()
        };
        let spec = build_container_spec(
            &Profile::default(),
            &endpoint("tcp://localhost:2375", true),
            &settings,
            "ns",
        )
        .unwrap();
        assert_eq!(spec.exposed_ports, vec!["5801/tcp", "53/udp"]);

        for bad in [vec![], vec!["http/tcp".to_string()], vec!["80/icmp".to_string()]] {
            let settings = ProvisionerSettings {
                ports: bad,
                ..Default::default()
            };
            assert!(build_container_spec(
                &Profile::default(),
                &endpoint("tcp://localhost:2375", true),
                &settings,
                "ns",
            )
            .is_err());
        }
    }

    #[test]
    fn test_generated_namespace_shape() {
        let ns = generate_namespace();
        assert_eq!(ns.len(), 8);
        assert!(ns.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(ns, generate_namespace());
    }
}
