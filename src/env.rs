use std::path::{Path, PathBuf};

use thiserror::Error;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://tutor_center.db?mode=rwc";
pub const DEFAULT_STORAGE_ROOT: &str = "storage";
pub const DEFAULT_SESSION_HOURS: i64 = 24;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read environment file {path}: {source}")]
    EnvFile {
        path: String,
        source: dotenvy::Error,
    },

    #[error("{name} must be a positive integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("OTEL_EXPORTER_OTLP_HEADERS entry {0:?} is not in key=value form")]
    InvalidHeader(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub storage_root: PathBuf,
    pub session_hours: i64,
    pub otlp_endpoint: Option<String>,
    pub otlp_headers: Vec<(String, String)>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            dotenvy::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let storage_root = PathBuf::from(
            dotenvy::var("STORAGE_ROOT").unwrap_or_else(|_| DEFAULT_STORAGE_ROOT.to_string()),
        );

        let session_hours = match dotenvy::var("SESSION_HOURS") {
            Ok(value) => match value.trim().parse::<i64>() {
                Ok(hours) if hours > 0 => hours,
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        name: "SESSION_HOURS",
                        value,
                    });
                }
            },
            Err(_) => DEFAULT_SESSION_HOURS,
        };

        let otlp_endpoint = dotenvy::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .ok()
            .filter(|endpoint| !endpoint.trim().is_empty());

        let otlp_headers = match dotenvy::var("OTEL_EXPORTER_OTLP_HEADERS") {
            Ok(raw) => parse_headers(&raw)?,
            Err(_) => Vec::new(),
        };

        Ok(Self {
            database_url,
            storage_root,
            session_hours,
            otlp_endpoint,
            otlp_headers,
        })
    }
}

fn parse_headers(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(ConfigError::InvalidHeader(entry.to_string())),
        })
        .collect()
}

/// Loads the layered env files and returns the ones that were found, so they
/// can be logged once tracing is up.
pub fn load_environment() -> Result<Vec<String>, ConfigError> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    let mut loaded = Vec::new();
    for env_file in env_files {
        if load_env_file(env_file)? {
            loaded.push(env_file.to_string());
        }
    }

    Ok(loaded)
}

fn load_env_file(path: &str) -> Result<bool, ConfigError> {
    if !Path::new(path).exists() {
        return Ok(false);
    }

    dotenvy::from_filename_override(path).map_err(|source| ConfigError::EnvFile {
        path: path.to_string(),
        source,
    })?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 5] = [
        "DATABASE_URL",
        "STORAGE_ROOT",
        "SESSION_HOURS",
        "OTEL_EXPORTER_OTLP_ENDPOINT",
        "OTEL_EXPORTER_OTLP_HEADERS",
    ];

    #[test]
    #[serial]
    fn test_defaults_when_nothing_is_set() {
        temp_env::with_vars_unset(VARS, || {
            let config = AppConfig::from_env().unwrap();
            assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
            assert_eq!(config.storage_root, PathBuf::from(DEFAULT_STORAGE_ROOT));
            assert_eq!(config.session_hours, DEFAULT_SESSION_HOURS);
            assert!(config.otlp_endpoint.is_none());
            assert!(config.otlp_headers.is_empty());
        });
    }

    #[test]
    #[serial]
    fn test_reads_overrides() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("sqlite::memory:")),
                ("STORAGE_ROOT", Some("/tmp/uploads")),
                ("SESSION_HOURS", Some("8")),
                ("OTEL_EXPORTER_OTLP_ENDPOINT", Some("https://collector:4317")),
                (
                    "OTEL_EXPORTER_OTLP_HEADERS",
                    Some("x-team=abc, x-env = prod"),
                ),
            ],
            || {
                let config = AppConfig::from_env().unwrap();
                assert_eq!(config.database_url, "sqlite::memory:");
                assert_eq!(config.storage_root, PathBuf::from("/tmp/uploads"));
                assert_eq!(config.session_hours, 8);
                assert_eq!(
                    config.otlp_endpoint.as_deref(),
                    Some("https://collector:4317")
                );
                assert_eq!(
                    config.otlp_headers,
                    vec![
                        ("x-team".to_string(), "abc".to_string()),
                        ("x-env".to_string(), "prod".to_string()),
                    ]
                );
            },
        );
    }

    #[test]
    #[serial]
    fn test_rejects_bad_session_hours() {
        temp_env::with_var("SESSION_HOURS", Some("forever"), || {
            assert!(matches!(
                AppConfig::from_env(),
                Err(ConfigError::InvalidNumber {
                    name: "SESSION_HOURS",
                    ..
                })
            ));
        });

        temp_env::with_var("SESSION_HOURS", Some("0"), || {
            assert!(AppConfig::from_env().is_err());
        });
    }

    #[test]
    #[serial]
    fn test_rejects_malformed_headers() {
        temp_env::with_var("OTEL_EXPORTER_OTLP_HEADERS", Some("no-equals-sign"), || {
            assert!(matches!(
                AppConfig::from_env(),
                Err(ConfigError::InvalidHeader(_))
            ));
        });
    }
}
