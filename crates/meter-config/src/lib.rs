use meter_shared::{SessionId, SessionState};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Configuration error
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    LoadError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Common application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(length(min = 1))]
    pub service_name: String,
    #[validate(length(min = 1))]
    pub log_level: String,
    /// JSON log lines when true, human-readable otherwise
    #[serde(default = "default_log_json")]
    pub log_json: bool,
    #[validate(range(min = 1, max = 65535))]
    pub metrics_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "meter-alarmd".to_string(),
            log_level: "info".to_string(),
            log_json: true,
            metrics_port: 9090,
        }
    }
}

fn default_log_json() -> bool {
    true
}

/// Alarm scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AlarmConfig {
    /// Longest a session may go without its alarm being recomputed
    #[validate(range(min = 1, max = 86_400_000))]
    pub upper_bound_ms: u64,
    #[validate(range(min = 1))]
    pub channel_capacity: usize,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            upper_bound_ms: 60_000,
            channel_capacity: 1024,
        }
    }
}

/// Session provisioned at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    #[serde(default)]
    pub state: SessionState,
}

/// Daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct DaemonConfig {
    #[serde(default)]
    #[validate(nested)]
    pub app: AppConfig,
    #[serde(default)]
    #[validate(nested)]
    pub alarm: AlarmConfig,
    #[serde(default)]
    #[validate(custom(function = "validate_unique_ids"))]
    pub sessions: Vec<SessionSnapshot>,
}

#[allow(clippy::ptr_arg)]
fn validate_unique_ids(sessions: &Vec<SessionSnapshot>) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    if sessions.iter().all(|s| seen.insert(s.id)) {
        Ok(())
    } else {
        Err(ValidationError::new("duplicate_session_id"))
    }
}

/// Load configuration from file
pub fn load_config<T>(path: &str) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de> + Validate,
{
    let config: T = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(config::Environment::with_prefix("METER").separator("__"))
        .build()
        .map_err(|e| ConfigError::LoadError(e.to_string()))?
        .try_deserialize()
        .map_err(|e| ConfigError::LoadError(e.to_string()))?;

    config
        .validate()
        .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
    Ok(config)
}

/// Load configuration from YAML string (for testing)
pub fn load_from_yaml<T>(yaml: &str) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de> + Validate,
{
    let config: T =
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::LoadError(e.to_string()))?;
    config
        .validate()
        .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
    Ok(config)
}
