//! Configuration for the leader service.
//!
//! Settings come from the `services.leader.config` map of the shared YAML
//! config file, then from `LEADER_*` environment variables. Command-line
//! flags are applied last, in `main`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{Ipv6Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

const CONFIG_PREFIX: &str = "services.leader.";
const ENV_PREFIX: &str = "LEADER_";

/// Leader service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderConfig {
    /// UDP address requests arrive on
    pub listen_addr: SocketAddr,
    /// Whether this node starts as leader
    pub is_leader: bool,
    /// Commissioner session lifetime without keep-alives
    #[serde(with = "humantime_serde_compat")]
    pub petition_timeout: Duration,
    /// Mesh-local prefix; when set, only RLOCs inside it are recognized
    pub mesh_local_prefix: Option<Ipv6Addr>,
}

impl Default for LeaderConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv6Addr::UNSPECIFIED, 19789)),
            is_leader: true,
            petition_timeout: netdata_leader::PETITION_TIMEOUT,
            mesh_local_prefix: None,
        }
    }
}

/// Root configuration structure (matches the YAML structure)
#[derive(Debug, Deserialize)]
struct RootConfig {
    services: Option<ServicesConfig>,
}

#[derive(Debug, Deserialize)]
struct ServicesConfig {
    leader: Option<ServiceConfig>,
}

#[derive(Debug, Deserialize)]
struct ServiceConfig {
    config: Option<HashMap<String, String>>,
}

impl LeaderConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let mut config = Self::default();

        match std::fs::read_to_string(path) {
            Ok(content) => {
                let root: RootConfig = serde_yaml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file {:?}", path))?;
                config.apply_root_config(root);
                info!("Loaded configuration from {:?}", path);
            }
            Err(_) => warn!("Config file {:?} not found, using defaults", path),
        }

        config.apply_environment_overrides(std::env::vars());

        info!(
            "Leader configuration: listen={} leader={} petition_timeout={}",
            config.listen_addr,
            config.is_leader,
            humantime::format_duration(config.petition_timeout)
        );
        Ok(config)
    }

    /// Mesh-local /64 as raw bytes
    pub fn mesh_local_prefix_bytes(&self) -> Option<[u8; 8]> {
        self.mesh_local_prefix.map(|addr| {
            let octets = addr.octets();
            let mut prefix = [0u8; 8];
            prefix.copy_from_slice(&octets[..8]);
            prefix
        })
    }

    fn apply_root_config(&mut self, root: RootConfig) {
        let entries = root
            .services
            .and_then(|services| services.leader)
            .and_then(|leader| leader.config)
            .unwrap_or_default();

        for (key, value) in entries {
            match key.strip_prefix(CONFIG_PREFIX) {
                Some(name) => self.apply_setting(name, &value, "config file"),
                None => warn!("Ignoring config key {}", key),
            }
        }
    }

    fn apply_environment_overrides(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in vars {
            if let Some(name) = key.strip_prefix(ENV_PREFIX) {
                self.apply_setting(&name.to_lowercase(), &value, "environment");
            }
        }
    }

    fn apply_setting(&mut self, name: &str, value: &str, source: &str) {
        let applied = match name {
            "listen_addr" => value.parse().map(|v| self.listen_addr = v).is_ok(),
            "is_leader" => value.parse().map(|v| self.is_leader = v).is_ok(),
            "petition_timeout" => humantime::parse_duration(value)
                .map(|v| self.petition_timeout = v)
                .is_ok(),
            "mesh_local_prefix" => value
                .parse()
                .map(|v| self.mesh_local_prefix = Some(v))
                .is_ok(),
            _ => return,
        };

        if applied {
            info!("{} set from {}: {}", name, source, value);
        } else {
            warn!("Invalid {} from {}: {:?}", name, source, value);
        }
    }
}

/// Durations in the config are written the way humantime prints them
mod humantime_serde_compat {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = LeaderConfig::default();
        assert_eq!(config.listen_addr.port(), 19789);
        assert!(config.is_leader);
        assert_eq!(config.petition_timeout, Duration::from_secs(50));
        assert_eq!(config.mesh_local_prefix_bytes(), None);
    }

    #[test]
    fn test_load_from_file() {
        let yaml_content = r#"
services:
  leader:
    enabled: true
    config:
      services.leader.listen_addr: "[::1]:20000"
      services.leader.is_leader: "false"
      services.leader.petition_timeout: "1m 30s"
      services.leader.mesh_local_prefix: "fd00:db8::"
      services.leader.unknown: "ignored"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = LeaderConfig::load_from_file(temp_file.path()).unwrap();

        assert_eq!(config.listen_addr, "[::1]:20000".parse().unwrap());
        assert!(!config.is_leader);
        assert_eq!(config.petition_timeout, Duration::from_secs(90));
        assert_eq!(
            config.mesh_local_prefix_bytes(),
            Some([0xFD, 0x00, 0x0D, 0xB8, 0, 0, 0, 0])
        );
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LeaderConfig::load_from_file(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.petition_timeout, Duration::from_secs(50));
    }

    #[test]
    fn test_unparseable_file_is_an_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"services: [unclosed").unwrap();
        assert!(LeaderConfig::load_from_file(temp_file.path()).is_err());
    }

    #[test]
    fn test_environment_overrides() {
        let mut config = LeaderConfig::default();
        config.apply_environment_overrides(vec![
            ("LEADER_LISTEN_ADDR".to_string(), "[::1]:2048".to_string()),
            ("LEADER_PETITION_TIMEOUT".to_string(), "10s".to_string()),
            ("LEADER_IS_LEADER".to_string(), "maybe".to_string()),
            ("OTHER_IS_LEADER".to_string(), "false".to_string()),
        ]);

        assert_eq!(config.listen_addr.port(), 2048);
        assert_eq!(config.petition_timeout, Duration::from_secs(10));
        assert!(config.is_leader);
    }

    #[test]
    fn test_serialized_timeout_is_human_readable() {
        let yaml = serde_yaml::to_string(&LeaderConfig::default()).unwrap();
        assert!(yaml.contains("petition_timeout: 50s"));
        let back: LeaderConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, LeaderConfig::default());
    }
}
