use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Top-level provider configuration, loaded from lbs.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LbsConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub arbiter: ArbiterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Well-known service name the provider is published under
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Object path of the provider's manager interface
    #[serde(default = "default_service_path")]
    pub service_path: String,
    /// Provider name returned by GetProviderInfo
    pub name: Option<String>,
    /// Provider description returned by GetProviderInfo
    pub description: Option<String>,
    /// Socket to listen on (None = platform default)
    pub socket_path: Option<String>,
    /// Maximum concurrently connected clients
    #[serde(default = "default_max_clients")]
    pub max_clients: u32,
    /// Seconds of silence before a connection is closed. Unset or 0 keeps
    /// idle connections open; closing one counts as a departure and
    /// reclaims its references.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
}

/// Identifiers the bus daemon stamps on its own lifecycle notifications.
/// Peer-departure notifications are only trusted when all three match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_bus_path")]
    pub object_path: String,
    #[serde(default = "default_bus_name")]
    pub interface_name: String,
    #[serde(default = "default_bus_name")]
    pub sender_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbiterConfig {
    /// Track per-client sampling intervals and renegotiate on change
    #[serde(default = "default_true")]
    pub interval_arbitration: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            service_path: default_service_path(),
            name: None,
            description: None,
            socket_path: None,
            max_clients: default_max_clients(),
            idle_timeout_secs: None,
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            object_path: default_bus_path(),
            interface_name: default_bus_name(),
            sender_name: default_bus_name(),
        }
    }
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            interval_arbitration: true,
        }
    }
}

impl LbsConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, CoreError> {
        toml::from_str(content).map_err(|e| CoreError::ConfigError(e.to_string()))
    }

    /// Load configuration from file if it exists, otherwise return defaults.
    pub fn load_or_default(path: &str) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(CoreError::Io(_)) => Self::default(),
            Err(e) => {
                tracing::warn!("ignoring {}: {}", path, e);
                Self::default()
            }
        }
    }
}

/// Returns the default config file path.
/// Search order:
/// 1. System-wide config: `/etc/lbs/lbs.toml`
/// 2. Local fallback: `./lbs.toml`
pub fn default_config_path() -> String {
    let system_path = "/etc/lbs/lbs.toml";
    if std::path::Path::new(system_path).exists() {
        return system_path.to_string();
    }
    "lbs.toml".to_string()
}

fn default_service_name() -> String {
    "org.tizen.lbs.Providers.LbsServer".to_string()
}

fn default_service_path() -> String {
    "/org/tizen/lbs/Providers/LbsServer".to_string()
}

fn default_bus_path() -> String {
    "/org/freedesktop/DBus".to_string()
}

fn default_bus_name() -> String {
    "org.freedesktop.DBus".to_string()
}

fn default_max_clients() -> u32 {
    64
}

fn default_true() -> bool {
    true
}
