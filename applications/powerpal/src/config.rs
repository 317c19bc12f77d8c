use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Longest session lifetime accepted in `auth.jwt_expiry_hours` (one year).
pub const MAX_JWT_EXPIRY_HOURS: u64 = 24 * 365;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiry_hours")]
    pub jwt_expiry_hours: u64,
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_store_max_connections")]
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: None,
            max_connections: default_store_max_connections(),
        }
    }
}

/// Device push endpoint. Disabled when no key is configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub measurement_id: Option<String>,
}

fn default_jwt_expiry_hours() -> u64 {
    24
}

fn default_min_password_length() -> usize {
    6
}

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn default_store_max_connections() -> u32 {
    5
}

impl Config {
    /// Load configuration from a YAML file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // Expand environment variables in the format $(VAR_NAME)
        let expanded = expand_env_vars(content)?;

        let mut config: Config = serde_yaml::from_str(&expanded)?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.store.url = Some(url);
        }
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(AppError::Config("Server port cannot be 0".to_string()));
        }

        if self.auth.jwt_secret.trim().is_empty() {
            return Err(AppError::Config("jwt_secret cannot be empty".to_string()));
        }

        if self.auth.jwt_expiry_hours == 0 || self.auth.jwt_expiry_hours > MAX_JWT_EXPIRY_HOURS {
            return Err(AppError::Config(format!(
                "jwt_expiry_hours must be between 1 and {}",
                MAX_JWT_EXPIRY_HOURS
            )));
        }

        if self.auth.min_password_length == 0 {
            return Err(AppError::Config(
                "min_password_length must be at least 1".to_string(),
            ));
        }

        if self.store.backend == StoreBackend::Postgres
            && self.store.url.as_deref().map_or(true, str::is_empty)
        {
            return Err(AppError::Config(
                "store.url (or DATABASE_URL) is required for the postgres backend".to_string(),
            ));
        }

        let secrets = [
            ("auth.jwt_secret", Some(self.auth.jwt_secret.as_str())),
            ("ingest.api_key", self.ingest.api_key.as_deref()),
            ("store.url", self.store.url.as_deref()),
        ];
        for (key, value) in secrets {
            if let Some(var) = value.and_then(unexpanded_placeholder) {
                return Err(AppError::Config(format!(
                    "{} references $({}) but that environment variable is not set",
                    key, var
                )));
            }
        }

        Ok(())
    }
}

fn placeholder_pattern() -> Result<regex::Regex> {
    regex::Regex::new(r"\$\(([A-Z_][A-Z0-9_]*)\)")
        .map_err(|e| AppError::Config(format!("Invalid placeholder pattern: {}", e)))
}

/// Name of the first `$(VAR)` placeholder left in `value`, if any.
fn unexpanded_placeholder(value: &str) -> Option<String> {
    let re = placeholder_pattern().ok()?;
    re.captures(value).map(|cap| cap[1].to_string())
}

/// Expand environment variables in the format $(VAR_NAME)
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = content.to_string();

    let re = placeholder_pattern()?;

    for cap in re.captures_iter(content) {
        let full_match = &cap[0];
        let var_name = &cap[1];

        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(full_match, &value);
        }
    }

    Ok(result)
}
