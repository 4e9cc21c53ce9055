// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::collector::client::TransportOptions;
use crate::collector::compress::DEFAULT_POOL_SIZE;
use crate::collector::{
    ConnectPayload, EventHarvestConfig, HandshakeConfig, Label, SupportedPolicies,
};
use crate::harvest::agent::DEFAULT_SHUTDOWN_TIMEOUT;
use crate::harvest::connection::DEFAULT_MAX_CONSECUTIVE_RESTARTS;
use crate::harvest::{ConnectBackoff, HarvestConfig};

const ENV_LICENSE_KEY: &str = "APM_LICENSE_KEY";
const ENV_APP_NAME: &str = "APM_APP_NAME";
const ENV_HOST: &str = "APM_HOST";
const ENV_LABELS: &str = "APM_LABELS";
const ENV_HIGH_SECURITY: &str = "APM_HIGH_SECURITY";
const ENV_SECURITY_POLICIES_TOKEN: &str = "APM_SECURITY_POLICIES_TOKEN";
const ENV_PROXY_HTTPS: &str = "APM_PROXY_HTTPS";
const ENV_HTTPS_PROXY: &str = "HTTPS_PROXY";
const ENV_LOG_LEVEL: &str = "APM_LOG_LEVEL";
const ENV_REQUEST_TIMEOUT_SECS: &str = "APM_REQUEST_TIMEOUT_SECS";
const ENV_SHUTDOWN_TIMEOUT_SECS: &str = "APM_SHUTDOWN_TIMEOUT_SECS";
const ENV_MAX_CONSECUTIVE_RESTARTS: &str = "APM_MAX_CONSECUTIVE_RESTARTS";
const ENV_COMPRESSOR_POOL_SIZE: &str = "APM_COMPRESSOR_POOL_SIZE";
const ENV_HOSTNAME: &str = "APM_HOSTNAME";
const ENV_SYSTEM_HOSTNAME: &str = "HOSTNAME";
const ENV_DISPLAY_NAME: &str = "APM_PROCESS_HOST_DISPLAY_NAME";
const ENV_METADATA_PREFIX: &str = "APM_METADATA_";

/// Collector used when the license key carries no region.
pub const DEFAULT_COLLECTOR_HOST: &str = "collector.newrelic.com";
const MAX_APP_NAMES: usize = 3;
const MAX_LABEL_LENGTH: usize = 255;
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{ENV_LICENSE_KEY} is required")]
    MissingLicenseKey,
    #[error("{ENV_APP_NAME} is required")]
    MissingAppName,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Agent configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub license_key: String,
    /// Up to three application names; the first one is primary.
    pub app_names: Vec<String>,
    /// Host preconnect is sent to.
    pub collector_host: String,
    pub labels: Vec<Label>,
    pub high_security: bool,
    pub security_policies_token: Option<String>,
    pub https_proxy: Option<String>,
    pub log_level: String,
    pub request_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub max_consecutive_restarts: u32,
    pub compressor_pool_size: usize,
    pub hostname: String,
    pub display_host: Option<String>,
    /// `APM_METADATA_*` variables, forwarded verbatim on connect.
    pub metadata: BTreeMap<String, String>,
    /// Plaintext collector connections. Not settable from the environment.
    pub allow_plaintext: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            license_key: String::new(),
            app_names: Vec::new(),
            collector_host: DEFAULT_COLLECTOR_HOST.to_string(),
            labels: Vec::new(),
            high_security: false,
            security_policies_token: None,
            https_proxy: None,
            log_level: "info".to_string(),
            request_timeout: TransportOptions::default().timeout,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            max_consecutive_restarts: DEFAULT_MAX_CONSECUTIVE_RESTARTS,
            compressor_pool_size: DEFAULT_POOL_SIZE,
            hostname: "unknown".to_string(),
            display_host: None,
            metadata: BTreeMap::new(),
            allow_plaintext: false,
        }
    }
}

impl Config {
    /// Builds and validates the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_iter(env::vars())
    }

    /// Builds and validates the configuration from key/value pairs.
    pub fn from_env_iter<I, K, V>(iter: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let get = |key: &str| map.get(key).and_then(|value| sanitize_non_empty(value));
        let defaults = Config::default();

        let license_key = get(ENV_LICENSE_KEY).unwrap_or_default();
        let app_names = get(ENV_APP_NAME)
            .map(|names| parse_app_names(&names))
            .unwrap_or_default();
        let collector_host = get(ENV_HOST).unwrap_or_else(|| collector_host_for(&license_key));
        let labels = get(ENV_LABELS)
            .map(|labels| parse_labels(&labels))
            .unwrap_or_default();
        let high_security = parse_bool(get(ENV_HIGH_SECURITY).as_deref(), false);
        let https_proxy = get(ENV_PROXY_HTTPS).or_else(|| get(ENV_HTTPS_PROXY));
        let log_level = get(ENV_LOG_LEVEL)
            .map(|level| level.to_lowercase())
            .unwrap_or(defaults.log_level);
        let request_timeout = get(ENV_REQUEST_TIMEOUT_SECS)
            .and_then(|secs| secs.parse::<u64>().ok())
            .map_or(defaults.request_timeout, Duration::from_secs);
        let shutdown_timeout = get(ENV_SHUTDOWN_TIMEOUT_SECS)
            .and_then(|secs| secs.parse::<u64>().ok())
            .map_or(defaults.shutdown_timeout, Duration::from_secs);
        let max_consecutive_restarts = get(ENV_MAX_CONSECUTIVE_RESTARTS)
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(defaults.max_consecutive_restarts);
        let compressor_pool_size = get(ENV_COMPRESSOR_POOL_SIZE)
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(defaults.compressor_pool_size);
        let hostname = get(ENV_HOSTNAME)
            .or_else(|| get(ENV_SYSTEM_HOSTNAME))
            .unwrap_or_else(system_hostname);
        let metadata = map
            .iter()
            .filter(|(key, _)| key.starts_with(ENV_METADATA_PREFIX))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let config = Self {
            license_key,
            app_names,
            collector_host,
            labels,
            high_security,
            security_policies_token: get(ENV_SECURITY_POLICIES_TOKEN),
            https_proxy,
            log_level,
            request_timeout,
            shutdown_timeout,
            max_consecutive_restarts,
            compressor_pool_size,
            hostname,
            display_host: get(ENV_DISPLAY_NAME),
            metadata,
            allow_plaintext: false,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.license_key.trim().is_empty() {
            return Err(ConfigError::MissingLicenseKey);
        }
        if self.app_names.is_empty() {
            return Err(ConfigError::MissingAppName);
        }
        if self.app_names.len() > MAX_APP_NAMES {
            return Err(ConfigError::InvalidConfig(format!(
                "at most {MAX_APP_NAMES} application names are allowed, got {}",
                self.app_names.len()
            )));
        }
        if self.high_security && self.security_policies_token.is_some() {
            return Err(ConfigError::InvalidConfig(
                "high security mode and a security policies token cannot both be set".to_string(),
            ));
        }
        if self.collector_host.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "collector host cannot be empty".to_string(),
            ));
        }
        if self.compressor_pool_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "compressor pool size must be greater than 0".to_string(),
            ));
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            allow_plaintext: self.allow_plaintext,
            timeout: self.request_timeout,
            https_proxy: self.https_proxy.clone(),
            compressor_pool_size: self.compressor_pool_size,
        }
    }

    #[must_use]
    pub fn harvest_config(&self) -> HarvestConfig {
        HarvestConfig {
            connect_backoff: ConnectBackoff::default(),
            max_consecutive_restarts: self.max_consecutive_restarts,
            shutdown_timeout: self.shutdown_timeout,
        }
    }

    #[must_use]
    pub fn handshake_config(&self) -> HandshakeConfig {
        HandshakeConfig {
            collector_host: self.collector_host.clone(),
            security_policies_token: self.security_policies_token.clone(),
            high_security: self.high_security,
            supported_policies: SupportedPolicies::default(),
            connect_payload: self.connect_payload(),
        }
    }

    fn connect_payload(&self) -> ConnectPayload {
        ConnectPayload {
            pid: std::process::id(),
            language: crate::AGENT_LANGUAGE.to_string(),
            agent_version: crate::AGENT_VERSION.to_string(),
            host: self.hostname.clone(),
            display_host: self
                .display_host
                .clone()
                .unwrap_or_else(|| self.hostname.clone()),
            app_name: self.app_names.clone(),
            identifier: self.app_names.join(";"),
            high_security: self.high_security,
            labels: self.labels.clone(),
            metadata: self.metadata.clone(),
            security_policies: None,
            event_harvest_config: EventHarvestConfig::default(),
        }
    }
}

/// Derives the collector host from the region prefix of a license key,
/// e.g. `eu01xx...` selects `collector.eu01.nr-data.net`.
#[must_use]
pub fn collector_host_for(license_key: &str) -> String {
    match region(license_key) {
        Some(region) => format!("collector.{region}.nr-data.net"),
        None => DEFAULT_COLLECTOR_HOST.to_string(),
    }
}

fn region(license_key: &str) -> Option<String> {
    let pattern = Regex::new(r"^([a-z]{2,3}[0-9]{2})x{1,2}").ok()?;
    pattern
        .captures(license_key)
        .and_then(|captures| captures.get(1))
        .map(|region| region.as_str().to_string())
}

fn parse_app_names(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Parses `key:value;key:value`. Malformed pairs are skipped; keys and
/// values are trimmed and truncated to 255 characters.
fn parse_labels(value: &str) -> Vec<Label> {
    value
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let parsed = pair.split_once(':').and_then(|(key, value)| {
                let (key, value) = (key.trim(), value.trim());
                (!key.is_empty() && !value.is_empty()).then(|| Label {
                    label_type: truncate(key, MAX_LABEL_LENGTH),
                    label_value: truncate(value, MAX_LABEL_LENGTH),
                })
            });
            if parsed.is_none() {
                warn!(label = pair, "ignoring malformed label");
            }
            parsed
        })
        .collect()
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(str::to_ascii_lowercase).as_deref() {
        Some("true" | "1" | "yes" | "on") => true,
        Some("false" | "0" | "no" | "off") => false,
        _ => default,
    }
}

fn sanitize_non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn system_hostname() -> String {
    match nix::unistd::gethostname() {
        Ok(hostname) => {
            if let Some(hostname) = hostname.to_str().filter(|name| !name.is_empty()) {
                return hostname.to_string();
            }
        }
        Err(e) => warn!("Failed to get system hostname: {}", e),
    }
    warn!("Could not determine hostname, using 'unknown'");
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            (ENV_LICENSE_KEY, "0123456789abcdef"),
            (ENV_APP_NAME, "checkout"),
            (ENV_HOSTNAME, "host-a"),
        ]
    }

    fn with(extra: &[(&'static str, &'static str)]) -> Result<Config, ConfigError> {
        let mut vars = base();
        vars.extend_from_slice(extra);
        Config::from_env_iter(vars)
    }

    #[test]
    fn minimal_environment_uses_defaults() {
        let config = with(&[]).unwrap();
        assert_eq!(config.license_key, "0123456789abcdef");
        assert_eq!(config.app_names, vec!["checkout"]);
        assert_eq!(config.collector_host, DEFAULT_COLLECTOR_HOST);
        assert_eq!(config.hostname, "host-a");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.request_timeout, Duration::from_secs(20));
        assert_eq!(config.max_consecutive_restarts, 5);
        assert!(!config.high_security);
        assert!(config.labels.is_empty());
        assert!(!config.allow_plaintext);
    }

    #[test]
    fn missing_required_values() {
        assert_eq!(
            Config::from_env_iter([(ENV_APP_NAME, "a")]).unwrap_err(),
            ConfigError::MissingLicenseKey
        );
        assert_eq!(
            Config::from_env_iter([(ENV_LICENSE_KEY, "k"), (ENV_APP_NAME, " ; ")]).unwrap_err(),
            ConfigError::MissingAppName
        );
    }

    #[test]
    fn app_names_are_split_and_limited() {
        let config = with(&[(ENV_APP_NAME, " a ; b;;c ")]).unwrap();
        assert_eq!(config.app_names, vec!["a", "b", "c"]);
        assert_eq!(config.handshake_config().connect_payload.identifier, "a;b;c");

        assert!(matches!(
            with(&[(ENV_APP_NAME, "a;b;c;d")]),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn high_security_conflicts_with_policies_token() {
        let err = with(&[
            (ENV_HIGH_SECURITY, "true"),
            (ENV_SECURITY_POLICIES_TOKEN, "ffff"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfig(_)));

        let config = with(&[(ENV_SECURITY_POLICIES_TOKEN, "ffff")]).unwrap();
        assert_eq!(config.security_policies_token.as_deref(), Some("ffff"));
    }

    #[test]
    fn region_is_derived_from_license_key() {
        assert_eq!(
            collector_host_for("eu01xx66c637a29c3982469a3fe8d1982d002c4a"),
            "collector.eu01.nr-data.net"
        );
        assert_eq!(
            collector_host_for("gov01x69c637a29c3982469a3fe8d1982d002c4"),
            "collector.gov01.nr-data.net"
        );
        assert_eq!(
            collector_host_for("08a2ad66c637a29c3982469a3fe8d1982d002c4a"),
            DEFAULT_COLLECTOR_HOST
        );
    }

    #[test]
    fn explicit_host_overrides_region() {
        let config = with(&[
            (ENV_LICENSE_KEY, "eu01xx66c637a29c3982469a3fe8d1982d002c4a"),
            (ENV_HOST, "staging-collector.example.com"),
        ])
        .unwrap();
        assert_eq!(config.collector_host, "staging-collector.example.com");
    }

    #[test]
    fn labels_are_parsed() {
        let config = with(&[(ENV_LABELS, "Server:One; Data Center : Primary;broken;:x")]).unwrap();
        assert_eq!(
            config.labels,
            vec![
                Label {
                    label_type: "Server".to_string(),
                    label_value: "One".to_string(),
                },
                Label {
                    label_type: "Data Center".to_string(),
                    label_value: "Primary".to_string(),
                },
            ]
        );
    }

    #[test]
    fn long_labels_are_truncated() {
        let long = "k".repeat(300);
        let labels = parse_labels(&format!("{long}:v"));
        assert_eq!(labels[0].label_type.len(), MAX_LABEL_LENGTH);
    }

    #[test]
    fn metadata_variables_are_collected() {
        let config = with(&[
            ("APM_METADATA_KUBERNETES_POD_NAME", "pod-1"),
            ("APM_METADATA_SERVICE_VERSION", "1.2.3"),
            ("UNRELATED", "x"),
        ])
        .unwrap();
        assert_eq!(config.metadata.len(), 2);
        assert_eq!(config.metadata["APM_METADATA_KUBERNETES_POD_NAME"], "pod-1");
    }

    #[test]
    fn numeric_settings_fall_back_on_garbage() {
        let config = with(&[
            (ENV_REQUEST_TIMEOUT_SECS, "5"),
            (ENV_MAX_CONSECUTIVE_RESTARTS, "not-a-number"),
            (ENV_COMPRESSOR_POOL_SIZE, "8"),
        ])
        .unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.max_consecutive_restarts, 5);
        assert_eq!(config.transport_options().compressor_pool_size, 8);
        assert_eq!(config.transport_options().timeout, Duration::from_secs(5));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(with(&[(ENV_COMPRESSOR_POOL_SIZE, "0")]).is_err());
        assert!(with(&[(ENV_LOG_LEVEL, "verbose")]).is_err());
        assert_eq!(with(&[(ENV_LOG_LEVEL, "DEBUG")]).unwrap().log_level, "debug");
    }

    #[test]
    fn proxy_prefers_agent_variable() {
        let config = with(&[
            (ENV_HTTPS_PROXY, "http://generic:3128"),
            (ENV_PROXY_HTTPS, "http://agent:3128"),
        ])
        .unwrap();
        assert_eq!(config.https_proxy.as_deref(), Some("http://agent:3128"));
    }

    #[test]
    fn connect_payload_reflects_config() {
        let config = with(&[
            (ENV_DISPLAY_NAME, "pretty-host"),
            (ENV_HIGH_SECURITY, "yes"),
        ])
        .unwrap();
        let payload = config.handshake_config().connect_payload;
        assert_eq!(payload.host, "host-a");
        assert_eq!(payload.display_host, "pretty-host");
        assert!(payload.high_security);
        assert_eq!(payload.language, "rust");
        assert_eq!(payload.pid, std::process::id());
    }

    #[test]
    fn parse_bool_permits_common_variants() {
        assert!(parse_bool(Some("TRUE"), false));
        assert!(parse_bool(Some("1"), false));
        assert!(!parse_bool(Some("off"), true));
        assert!(parse_bool(Some("maybe"), true));
        assert!(!parse_bool(None, false));
    }

    #[test]
    #[serial]
    fn from_env_reads_process_environment() {
        env::set_var(ENV_LICENSE_KEY, "process-key");
        env::set_var(ENV_APP_NAME, "from-process");
        let config = Config::from_env();
        env::remove_var(ENV_LICENSE_KEY);
        env::remove_var(ENV_APP_NAME);

        let config = config.unwrap();
        assert_eq!(config.license_key, "process-key");
        assert_eq!(config.app_names, vec!["from-process"]);
    }
}
