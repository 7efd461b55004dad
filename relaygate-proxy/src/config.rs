use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ProxyError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProxyConfig {
    pub listen: ListenConfig,
    pub tls: TlsMitmConfig,
    pub sites: SitesConfig,
    pub resolver: ResolverConfig,
    pub relay: RelayConfig,
    pub timeouts: TimeoutsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TlsMitmConfig {
    pub ca_common_name: String,
    pub ca_cert_dir: String,
    pub leaf_validity_days: u32,
    pub intercept_by_default: bool,
}

/// Host pattern lists, one per policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SitesConfig {
    pub force_secure: Vec<String>,
    pub no_force_secure: Vec<String>,
    pub intercept: Vec<String>,
    pub no_intercept: Vec<String>,
    pub strip: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NetworkConfig {
    #[default]
    Tcp,
    Tcp4,
    Tcp6,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResolverConfig {
    pub network: NetworkConfig,
    pub hosts: BTreeMap<String, Vec<String>>,
    pub cnames: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RelayScheme {
    #[default]
    Secure,
    Insecure,
}

impl RelayScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayScheme::Secure => "https",
            RelayScheme::Insecure => "http",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    pub app_ids: Vec<String>,
    pub scheme: RelayScheme,
    pub endpoint: String,
    pub sites: Vec<String>,
    pub direct_sites: Vec<String>,
    pub password: Option<String>,
    pub retryable_methods: Vec<String>,
    pub max_replay_body_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub connect: u64,
    pub handshake: u64,
    pub response_header: u64,
    pub read_write: u64,
    pub keepalive: u64,
    pub relay_attempt: u64,
}

/// Timeouts resolved to durations. A zero keepalive disables TCP keepalive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub handshake: Duration,
    pub response_header: Duration,
    pub read_write: Duration,
    pub keepalive: Option<Duration>,
    pub relay_attempt: Duration,
}

impl TimeoutsConfig {
    pub fn resolve(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(self.connect),
            handshake: Duration::from_secs(self.handshake),
            response_header: Duration::from_secs(self.response_header),
            read_write: Duration::from_secs(self.read_write),
            keepalive: (self.keepalive > 0).then(|| Duration::from_secs(self.keepalive)),
            relay_attempt: Duration::from_secs(self.relay_attempt),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        TimeoutsConfig::default().resolve()
    }
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8087,
        }
    }
}

impl Default for TlsMitmConfig {
    fn default() -> Self {
        Self {
            ca_common_name: "Relaygate Root CA".to_string(),
            ca_cert_dir: "certs".to_string(),
            leaf_validity_days: 365,
            intercept_by_default: false,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            app_ids: Vec::new(),
            scheme: RelayScheme::Secure,
            endpoint: "{scheme}://{id}.appspot.com/_gh/".to_string(),
            sites: Vec::new(),
            direct_sites: Vec::new(),
            password: None,
            retryable_methods: Vec::new(),
            max_replay_body_bytes: 4 * 1024 * 1024,
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            connect: 10,
            handshake: 10,
            response_header: 30,
            read_write: 60,
            keepalive: 60,
            relay_attempt: 30,
        }
    }
}

impl ProxyConfig {
    pub fn load(path: &Path) -> Result<Self, ProxyError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| ProxyError::Config(format!("{}: {err}", path.display())))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ProxyError> {
        toml::from_str(raw).map_err(|err| ProxyError::Config(err.to_string()))
    }

    pub fn load_or_create(path: &Path) -> Result<Self, ProxyError> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ProxyError> {
        let contents =
            toml::to_string_pretty(self).map_err(|err| ProxyError::Config(err.to_string()))?;
        std::fs::write(path, contents)
            .map_err(|err| ProxyError::Config(format!("{}: {err}", path.display())))
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen.host, self.listen.port)
    }

    pub fn leaf_validity(&self) -> Duration {
        Duration::from_secs(u64::from(self.tls.leaf_validity_days) * 24 * 60 * 60)
    }
}
