use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which surface the process serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Line-framed JSON-RPC over stdin/stdout
    #[default]
    Stdio,
    /// HTTP gateway (JSON-RPC endpoint plus REST aliases)
    Http,
}

impl TransportMode {
    /// `http` (case-insensitive) selects the HTTP gateway, anything else stdio.
    pub fn from_env_value(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("http") {
            Self::Http
        } else {
            Self::Stdio
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub auth: AuthSection,

    #[serde(default)]
    pub cors: CorsSection,

    #[serde(default)]
    pub airbnb: AirbnbSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default)]
    pub mode: TransportMode,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            mode: TransportMode::default(),
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSection {
    /// Plaintext shared-secret tokens. Digested into the token store at startup.
    #[serde(default)]
    pub access_tokens: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsSection {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirbnbSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub ignore_robots_txt: bool,
}

fn default_base_url() -> String {
    "https://www.airbnb.com".to_string()
}

fn default_user_agent() -> String {
    "ModelContextProtocol/1.0 (Autonomous; +https://github.com/modelcontextprotocol/servers)"
        .to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for AirbnbSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
            ignore_robots_txt: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub format: LogFormat,
}

impl GatewayConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist, then apply environment overrides.
    pub fn load(config_path: &Path) -> Result<Self> {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    /// [`GatewayConfig::load`] with an explicit environment lookup
    pub fn load_with_env<F>(config_path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context("Failed to read configuration file")?;
            toml::from_str(&content).context("Failed to parse configuration file")?
        } else {
            tracing::debug!(path = %config_path.display(), "Configuration file not found, using defaults");
            Self::default()
        };

        config.apply_env(lookup)?;

        Ok(config)
    }

    /// Overlay environment variables. `lookup` abstracts the environment so
    /// tests can feed a fixed map.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("MCP_MODE") {
            self.server.mode = TransportMode::from_env_value(&mode);
        }

        if let Some(host) = lookup("HOST").filter(|h| !h.trim().is_empty()) {
            self.server.host = host.trim().to_string();
        }

        if let Some(port) = lookup("PORT").filter(|p| !p.trim().is_empty()) {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value: {port}"))?;
        }

        if let Some(tokens) = lookup("MCP_ACCESS_TOKENS") {
            self.auth.access_tokens = split_list(&tokens);
        }

        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            self.cors.allowed_origins = split_list(&origins);
        }

        if let Some(flag) = lookup("IGNORE_ROBOTS_TXT") {
            self.airbnb.ignore_robots_txt = parse_flag(&flag);
        }

        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = if format.trim().eq_ignore_ascii_case("json") {
                LogFormat::Json
            } else {
                LogFormat::Text
            };
        }

        Ok(())
    }

    /// Socket address string for the HTTP listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
