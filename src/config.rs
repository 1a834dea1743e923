use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub checkin: CheckInConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInConfig {
    /// Hours before the event start at which check-in opens.
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
}

impl Default for CheckInConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_window_hours() -> i64 {
    2
}

impl Config {
    pub fn from_toml() -> AppResult<Self> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // Read the config file if present; fall back to environment variables.
        let mut config: Config = match std::fs::read_to_string(&config_path) {
            Ok(config_str) => toml::from_str(&config_str)
                .map_err(|e| AppError::ConfigError(format!("failed to parse {config_path}: {e}")))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let database_url = env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(format!(
                        "DATABASE_URL is not set and {config_path} was not found"
                    ))
                })?;

                Config {
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: default_max_connections(),
                    },
                    checkin: CheckInConfig::default(),
                }
            }
            Err(e) => {
                return Err(AppError::ConfigError(format!(
                    "failed to read {config_path}: {e}"
                )));
            }
        };

        // Environment variables override the file even when it exists.
        if let Ok(v) = env::var("DATABASE_URL") {
            config.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            config.database.max_connections = mc;
        }
        if let Ok(v) = env::var("CHECKIN_WINDOW_HOURS")
            && let Ok(h) = v.parse()
        {
            config.checkin.window_hours = h;
        }

        Ok(config)
    }
}
