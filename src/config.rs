//! Runtime configuration read from the process environment.
//! Variable names match the ones the function host deployment already sets.

use std::time::Duration;
use std::{fs, path::Path};
use thiserror::Error;

pub const DEFAULT_API_VERSION: &str = "2023-10-31";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LOG_LEVEL: i32 = 100;
pub const DEFAULT_TOKEN_FILE: &str = "adt_token.txt";

/// Verbosity threshold at which the decoded body, resolved updates and the raw mapping document are logged.
pub const LOG_BODIES: i32 = 300;
/// Verbosity threshold at which each patch document is logged.
pub const LOG_PATCHES: i32 = 200;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("application setting \"{0}\" not set")]
    Missing(&'static str),
    #[error("application setting \"{name}\" is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Twin store base URL, e.g. `https://<instance>.api.weu.digitaltwins.azure.net`.
    pub twin_store_url: String,
    pub mapping_url: String,
    /// Gates payload and patch logging; see [`LOG_BODIES`] and [`LOG_PATCHES`].
    pub log_verbosity: i32,
    pub access_token: Option<String>,
    pub api_version: String,
    pub request_timeout: Duration,
    pub treat_check_failure_as_absent: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok(), Path::new(DEFAULT_TOKEN_FILE))
    }

    pub fn from_lookup<F>(lookup: F, token_file: &Path) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let twin_store_url = non_empty("ADT_SERVICE_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .ok_or(ConfigError::Missing("ADT_SERVICE_URL"))?;
        if !(twin_store_url.starts_with("https://") || twin_store_url.starts_with("http://")) {
            return Err(ConfigError::Invalid {
                name: "ADT_SERVICE_URL",
                reason: format!("'{}' is not an http(s) URL", twin_store_url),
            });
        }

        let mapping_url = non_empty("JSON_MAPPINGFILE_URL")
            .map(|v| v.trim().to_string())
            .ok_or(ConfigError::Missing("JSON_MAPPINGFILE_URL"))?;

        // Non-numeric values fall back silently, matching the host's historical behaviour.
        let log_verbosity = lookup("LOG_LEVEL")
            .and_then(|s| s.trim().parse::<i32>().ok())
            .unwrap_or(DEFAULT_LOG_LEVEL);

        // Prefer env var; fallback to a token file in the working directory
        let access_token = match non_empty("ADT_ACCESS_TOKEN") {
            Some(v) => Some(v.trim().to_string()),
            None => match fs::read_to_string(token_file) {
                Ok(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            },
        };

        let api_version = non_empty("ADT_API_VERSION")
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

        let timeout_secs = match non_empty("ADT_REQUEST_TIMEOUT_SECS") {
            Some(s) => s
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    name: "ADT_REQUEST_TIMEOUT_SECS",
                    reason: "must be a positive integer".to_string(),
                })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let treat_check_failure_as_absent = non_empty("TREAT_CHECK_FAILURE_AS_ABSENT")
            .map(|s| !matches!(s.trim(), "0" | "false" | "FALSE" | "False"))
            .unwrap_or(true);

        Ok(Config {
            twin_store_url,
            mapping_url,
            log_verbosity,
            access_token,
            api_version,
            request_timeout: Duration::from_secs(timeout_secs),
            treat_check_failure_as_absent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const NO_TOKEN_FILE: &str = "/nonexistent/adt_token.txt";

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|name| map.get(name).cloned(), Path::new(NO_TOKEN_FILE))
    }

    #[test]
    fn missing_twin_store_url_is_an_error() {
        let err = load(&[("JSON_MAPPINGFILE_URL", "https://example.com/map.json")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("ADT_SERVICE_URL")));
        assert_eq!(err.to_string(), "application setting \"ADT_SERVICE_URL\" not set");
    }

    #[test]
    fn defaults_apply() {
        let cfg = load(&[
            ("ADT_SERVICE_URL", "https://twins.example.net/"),
            ("JSON_MAPPINGFILE_URL", "https://example.com/map.json"),
        ])
        .unwrap();
        assert_eq!(cfg.twin_store_url, "https://twins.example.net");
        assert_eq!(cfg.log_verbosity, DEFAULT_LOG_LEVEL);
        assert_eq!(cfg.api_version, DEFAULT_API_VERSION);
        assert_eq!(cfg.request_timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert!(cfg.treat_check_failure_as_absent);
        assert!(cfg.access_token.is_none());
    }

    #[test]
    fn non_numeric_log_level_falls_back() {
        let cfg = load(&[
            ("ADT_SERVICE_URL", "https://twins.example.net"),
            ("JSON_MAPPINGFILE_URL", "map.json"),
            ("LOG_LEVEL", "verbose"),
        ])
        .unwrap();
        assert_eq!(cfg.log_verbosity, DEFAULT_LOG_LEVEL);

        let cfg = load(&[
            ("ADT_SERVICE_URL", "https://twins.example.net"),
            ("JSON_MAPPINGFILE_URL", "map.json"),
            ("LOG_LEVEL", "300"),
        ])
        .unwrap();
        assert_eq!(cfg.log_verbosity, 300);
    }

    #[test]
    fn rejects_bad_timeout_and_scheme() {
        let err = load(&[
            ("ADT_SERVICE_URL", "https://twins.example.net"),
            ("JSON_MAPPINGFILE_URL", "map.json"),
            ("ADT_REQUEST_TIMEOUT_SECS", "0"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "ADT_REQUEST_TIMEOUT_SECS", .. }));

        let err = load(&[
            ("ADT_SERVICE_URL", "twins.example.net"),
            ("JSON_MAPPINGFILE_URL", "map.json"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "ADT_SERVICE_URL", .. }));
    }

    #[test]
    fn existence_policy_can_be_tightened() {
        let cfg = load(&[
            ("ADT_SERVICE_URL", "https://twins.example.net"),
            ("JSON_MAPPINGFILE_URL", "map.json"),
            ("TREAT_CHECK_FAILURE_AS_ABSENT", "false"),
            ("ADT_ACCESS_TOKEN", " abc "),
        ])
        .unwrap();
        assert!(!cfg.treat_check_failure_as_absent);
        assert_eq!(cfg.access_token.as_deref(), Some("abc"));
    }
}
