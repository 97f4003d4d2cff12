use directories::BaseDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 4096;

/// Where the agent server listens and the optional shared secret it expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            password: None,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("server configuration invalid: {0}")]
    Invalid(String),
    #[error("OPENCODE_PORT is not a valid port: {0}")]
    InvalidPort(String),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Invalid(detail) => format!("Relay is misconfigured: {detail}. Update relay.yaml."),
            Self::InvalidPort(value) => {
                format!("OPENCODE_PORT must be a number between 1 and 65535, got `{value}`.")
            }
        }
    }
}

impl ServerSettings {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = normalize_secret(Some(password.into()));
        self
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Loads `.env`, then the first `relay.yaml` found, then the `OPENCODE_*`
    /// environment overrides. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut settings = match locate_config_file() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            ConfigError::Invalid(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: RelayConfig = serde_yaml::from_str(contents)
            .map_err(|err| ConfigError::Invalid(format!("invalid relay.yaml: {err}")))?;
        let section = config.server.unwrap_or_default();
        let host = section
            .host
            .map(|host| host.trim().to_string())
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match section.port {
            Some(0) => return Err(ConfigError::Invalid("port cannot be 0".to_string())),
            Some(port) => port,
            None => DEFAULT_PORT,
        };
        Ok(Self {
            host,
            port,
            password: normalize_secret(section.password),
        })
    }

    /// Applies `OPENCODE_HOST`, `OPENCODE_PORT` and `OPENCODE_SERVER_PASSWORD`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("OPENCODE_HOST").filter(|host| !host.trim().is_empty()) {
            self.host = host.trim().to_string();
        }
        if let Some(port) = lookup("OPENCODE_PORT") {
            self.port = match port.trim().parse::<u16>() {
                Ok(parsed) if parsed != 0 => parsed,
                _ => return Err(ConfigError::InvalidPort(port)),
            };
        }
        if let Some(password) = lookup("OPENCODE_SERVER_PASSWORD") {
            self.password = normalize_secret(Some(password));
        }
        Ok(())
    }
}

fn normalize_secret(secret: Option<String>) -> Option<String> {
    secret.filter(|secret| !secret.trim().is_empty())
}

fn locate_config_file() -> Option<PathBuf> {
    relay_yaml_candidates()
        .into_iter()
        .find(|path| path.exists())
}

fn relay_yaml_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(base) = BaseDirs::new() {
        let config_dir = base.config_dir().join("relay");
        paths.push(config_dir.join("relay.yaml"));
        paths.push(config_dir.join("relay.yml"));
        paths.push(base.home_dir().join(".relay").join("relay.yaml"));
    } else {
        paths.push(PathBuf::from("relay.yaml"));
    }
    paths
}

#[derive(Debug, Deserialize)]
struct RelayConfig {
    server: Option<ServerSection>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSection {
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    password: Option<String>,
}
