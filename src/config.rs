use crate::frame::DEFAULT_MAX_FRAME_LEN;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Global configuration for the gateway
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Listener and backend settings
    pub server: ServerConfig,

    /// Backend reachability probing
    #[serde(default)]
    pub health: HealthConfig,

    /// Panel API used to start the backend
    pub wake: WakeConfig,

    /// What clients see while the backend is asleep
    #[serde(default)]
    pub offline: OfflineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Bind address (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Listen port (default: 25565)
    #[serde(default = "default_listen_port")]
    pub port: u16,

    /// Backend game server address, e.g. "127.0.0.1:25566"
    pub backend: String,

    /// Max time to wait for the first packet from an offline client (default: 10)
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Largest frame accepted from a client while offline
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,

    /// Backend dial timeout for relayed connections in milliseconds (default: 1000)
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_ms: u64,
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HealthConfig {
    /// Time between probes in milliseconds (default: 1000)
    #[serde(default = "default_health_interval")]
    pub interval_ms: u64,

    /// Dial timeout for each probe in milliseconds (default: 1000)
    #[serde(default = "default_health_timeout")]
    pub timeout_ms: u64,
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_health_interval(),
            timeout_ms: default_health_timeout(),
        }
    }
}

/// Pterodactyl panel settings
#[derive(Clone, Deserialize)]
pub struct WakeConfig {
    /// Panel base URL, e.g. "https://panel.example.com"
    pub url: String,

    /// Client API key
    #[serde(alias = "apikey")]
    pub api_key: String,

    /// Server identifier as shown in the panel
    pub server: String,

    /// Request timeout in seconds (default: 10)
    #[serde(default = "default_wake_timeout")]
    pub timeout_secs: u64,
}

// Keeps the API key out of logs
impl std::fmt::Debug for WakeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("server", &self.server)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OfflineConfig {
    /// Version name shown in the server list
    #[serde(default = "default_version_name")]
    pub version_name: String,

    /// Protocol number reported in status responses
    #[serde(default = "default_protocol")]
    pub protocol: i32,

    #[serde(default = "default_max_players")]
    pub max_players: u32,

    #[serde(default)]
    pub online_players: u32,

    /// Server list description while asleep
    #[serde(default = "default_motd")]
    pub motd: String,

    /// Disconnect text for the join that triggered the boot request
    #[serde(default = "default_boot_requested_message")]
    pub boot_requested_message: String,

    /// Disconnect text for joins after the boot request was sent
    #[serde(default = "default_booting_message")]
    pub booting_message: String,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            version_name: default_version_name(),
            protocol: default_protocol(),
            max_players: default_max_players(),
            online_players: 0,
            motd: default_motd(),
            boot_requested_message: default_boot_requested_message(),
            booting_message: default_booting_message(),
        }
    }
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    25565
}

fn default_read_timeout() -> u64 {
    10
}

fn default_max_frame_len() -> usize {
    DEFAULT_MAX_FRAME_LEN
}

fn default_dial_timeout() -> u64 {
    1000
}

fn default_health_interval() -> u64 {
    1000 // 1 second
}

fn default_health_timeout() -> u64 {
    1000
}

fn default_wake_timeout() -> u64 {
    10
}

fn default_version_name() -> String {
    "1.20.4".to_string()
}

fn default_protocol() -> i32 {
    765
}

fn default_max_players() -> u32 {
    100
}

fn default_motd() -> String {
    "Join to start Server".to_string()
}

fn default_boot_requested_message() -> String {
    "A request to turn on the server has been sent, please rejoin in a min".to_string()
}

fn default_booting_message() -> String {
    "The server is booting, please rejoin in a min".to_string()
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut errors = Vec::new();

        if self.server.backend.trim().is_empty() {
            errors.push("server.backend must not be empty".to_string());
        }
        if self.server.port == 0 {
            errors.push("server.port must be greater than 0".to_string());
        }
        if self.server.max_frame_len == 0 {
            errors.push("server.max_frame_len must be greater than 0".to_string());
        }
        if self.server.dial_timeout_ms == 0 {
            errors.push("server.dial_timeout_ms must be greater than 0".to_string());
        }
        if self.health.interval_ms == 0 {
            errors.push("health.interval_ms must be greater than 0".to_string());
        }
        if self.health.timeout_ms == 0 {
            errors.push("health.timeout_ms must be greater than 0".to_string());
        }
        if !(self.wake.url.starts_with("http://") || self.wake.url.starts_with("https://")) {
            errors.push(format!(
                "wake.url '{}' must start with http:// or https://",
                self.wake.url
            ));
        }
        if self.wake.api_key.is_empty() {
            errors.push("wake.api_key must not be empty".to_string());
        }
        if self.wake.server.is_empty() {
            errors.push("wake.server must not be empty".to_string());
        }

        if !errors.is_empty() {
            anyhow::bail!("Configuration errors:\n  - {}", errors.join("\n  - "));
        }

        Ok(())
    }
}
