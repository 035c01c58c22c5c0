//! Check loop and plugin configuration.
//!
//! Plugins are configured with one typed struct per kind. The same
//! structs can be written in a config file (`kind = "tcp"` plus fields)
//! or on the command line as `kind:key=value,...`:
//!
//! ```text
//! tcp:port=10250,timeout=5,retries=3,weight=0.5
//! http:port=10248,path=/healthz,weight=0.5
//! https-auth:port=10250,token_file=/var/run/secrets/kubernetes.io/serviceaccount/token,weight=1
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default bearer token location for the `https-auth` plugin.
pub const DEFAULT_TOKEN_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Tolerance used when checking that weights sum to 1.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// TCP connect plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    pub port: u16,
    pub timeout_secs: u64,
    /// Maximum number of attempts per probe.
    pub retries: u32,
    pub weight: f64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            port: 10250,
            timeout_secs: 5,
            retries: 3,
            weight: 1.0,
        }
    }
}

/// Plain HTTP health endpoint plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub path: String,
    pub timeout_secs: u64,
    pub retries: u32,
    pub weight: f64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 10248,
            path: "/healthz".to_string(),
            timeout_secs: 5,
            retries: 3,
            weight: 1.0,
        }
    }
}

/// Bearer-token HTTPS health endpoint plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpsAuthConfig {
    pub port: u16,
    pub path: String,
    pub timeout_secs: u64,
    pub retries: u32,
    pub weight: f64,
    pub token_file: PathBuf,
}

impl Default for HttpsAuthConfig {
    fn default() -> Self {
        Self {
            port: 10250,
            path: "/healthz".to_string(),
            timeout_secs: 5,
            retries: 3,
            weight: 1.0,
            token_file: PathBuf::from(DEFAULT_TOKEN_FILE),
        }
    }
}

/// One configured plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PluginConfig {
    Tcp(TcpConfig),
    Http(HttpConfig),
    HttpsAuth(HttpsAuthConfig),
}

impl PluginConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            PluginConfig::Tcp(_) => "tcp",
            PluginConfig::Http(_) => "http",
            PluginConfig::HttpsAuth(_) => "https-auth",
        }
    }

    /// Stable plugin name: `kind:port`.
    pub fn name(&self) -> String {
        format!("{}:{}", self.kind(), self.port())
    }

    pub fn port(&self) -> u16 {
        match self {
            PluginConfig::Tcp(c) => c.port,
            PluginConfig::Http(c) => c.port,
            PluginConfig::HttpsAuth(c) => c.port,
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            PluginConfig::Tcp(c) => c.weight,
            PluginConfig::Http(c) => c.weight,
            PluginConfig::HttpsAuth(c) => c.weight,
        }
    }

    pub fn timeout(&self) -> Duration {
        let secs = match self {
            PluginConfig::Tcp(c) => c.timeout_secs,
            PluginConfig::Http(c) => c.timeout_secs,
            PluginConfig::HttpsAuth(c) => c.timeout_secs,
        };
        Duration::from_secs(secs)
    }

    pub fn retries(&self) -> u32 {
        match self {
            PluginConfig::Tcp(c) => c.retries,
            PluginConfig::Http(c) => c.retries,
            PluginConfig::HttpsAuth(c) => c.retries,
        }
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        PluginConfig::HttpsAuth(HttpsAuthConfig::default())
    }
}

impl FromStr for PluginConfig {
    type Err = ConfigError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        let (kind, params) = input.split_once(':').unwrap_or((input, ""));
        let parse_err = |reason: String| ConfigError::Parse {
            input: input.to_string(),
            reason,
        };

        let mut config = match kind.trim() {
            "tcp" => PluginConfig::Tcp(TcpConfig::default()),
            "http" => PluginConfig::Http(HttpConfig::default()),
            "https-auth" | "https" => PluginConfig::HttpsAuth(HttpsAuthConfig::default()),
            other => return Err(ConfigError::UnknownKind(other.to_string())),
        };

        for pair in params.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| parse_err(format!("expected key=value, got {pair:?}")))?;
            config
                .set(key.trim(), value.trim())
                .map_err(parse_err)?;
        }

        Ok(config)
    }
}

impl PluginConfig {
    fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        fn num<T: FromStr>(key: &str, value: &str) -> Result<T, String> {
            value
                .parse()
                .map_err(|_| format!("invalid value {value:?} for {key}"))
        }

        match (self, key) {
            (PluginConfig::Tcp(c), "port") => c.port = num(key, value)?,
            (PluginConfig::Tcp(c), "timeout") => c.timeout_secs = num(key, value)?,
            (PluginConfig::Tcp(c), "retries" | "retrytime") => c.retries = num(key, value)?,
            (PluginConfig::Tcp(c), "weight") => c.weight = num(key, value)?,

            (PluginConfig::Http(c), "port") => c.port = num(key, value)?,
            (PluginConfig::Http(c), "path") => c.path = value.to_string(),
            (PluginConfig::Http(c), "timeout") => c.timeout_secs = num(key, value)?,
            (PluginConfig::Http(c), "retries" | "retrytime") => c.retries = num(key, value)?,
            (PluginConfig::Http(c), "weight") => c.weight = num(key, value)?,

            (PluginConfig::HttpsAuth(c), "port") => c.port = num(key, value)?,
            (PluginConfig::HttpsAuth(c), "path") => c.path = value.to_string(),
            (PluginConfig::HttpsAuth(c), "timeout") => c.timeout_secs = num(key, value)?,
            (PluginConfig::HttpsAuth(c), "retries" | "retrytime") => {
                c.retries = num(key, value)?
            }
            (PluginConfig::HttpsAuth(c), "weight") => c.weight = num(key, value)?,
            (PluginConfig::HttpsAuth(c), "token_file") => c.token_file = PathBuf::from(value),

            (config, key) => return Err(format!("unknown key {key:?} for {}", config.kind())),
        }
        Ok(())
    }
}

/// Settings of the local check loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    pub period_secs: u64,
    /// Weighted score a peer must reach to be judged normal.
    pub score_line: f64,
    /// Maximum probes in flight at once.
    pub concurrency: usize,
    pub plugins: Vec<PluginConfig>,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            period_secs: 10,
            score_line: 100.0,
            concurrency: 16,
            plugins: vec![PluginConfig::default()],
        }
    }
}

impl CheckConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    /// Collect every problem with this configuration.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();
        if self.period_secs == 0 {
            errors.push(ConfigError::NonPositive("check period".to_string()));
        }
        if !(self.score_line > 0.0 && self.score_line <= 100.0) {
            errors.push(ConfigError::ScoreLine(self.score_line));
        }
        if self.concurrency == 0 {
            errors.push(ConfigError::NonPositive("check concurrency".to_string()));
        }
        errors.extend(validate_plugins(&self.plugins));

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Validate a plugin set: non-empty, unique names, positive settings,
/// each weight in (0, 1], and weights summing to 1.
pub fn validate_plugins(plugins: &[PluginConfig]) -> Vec<ConfigError> {
    if plugins.is_empty() {
        return vec![ConfigError::EmptyPluginSet];
    }

    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for plugin in plugins {
        let name = plugin.name();
        if !seen.insert(name.clone()) {
            errors.push(ConfigError::DuplicatePlugin(name.clone()));
        }
        let weight = plugin.weight();
        if !(weight > 0.0 && weight <= 1.0) {
            errors.push(ConfigError::WeightOutOfRange {
                plugin: name.clone(),
                weight,
            });
        }
        if plugin.port() == 0 {
            errors.push(ConfigError::NonPositive(format!("{name} port")));
        }
        if plugin.timeout().is_zero() {
            errors.push(ConfigError::NonPositive(format!("{name} timeout")));
        }
        if plugin.retries() == 0 {
            errors.push(ConfigError::NonPositive(format!("{name} retries")));
        }
    }

    let sum: f64 = plugins.iter().map(PluginConfig::weight).sum();
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        errors.push(ConfigError::WeightSum(sum));
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp(port: u16, weight: f64) -> PluginConfig {
        PluginConfig::Tcp(TcpConfig {
            port,
            weight,
            ..Default::default()
        })
    }

    #[test]
    fn parse_tcp_spec() {
        let config: PluginConfig = "tcp:port=22,timeout=2,retries=1,weight=0.5".parse().unwrap();
        assert_eq!(
            config,
            PluginConfig::Tcp(TcpConfig {
                port: 22,
                timeout_secs: 2,
                retries: 1,
                weight: 0.5,
            })
        );
        assert_eq!(config.name(), "tcp:22");
    }

    #[test]
    fn parse_https_auth_spec_with_token_file() {
        let config: PluginConfig =
            "https-auth:port=10250,path=/readyz,token_file=/tmp/token,retrytime=2"
                .parse()
                .unwrap();
        match config {
            PluginConfig::HttpsAuth(c) => {
                assert_eq!(c.path, "/readyz");
                assert_eq!(c.token_file, PathBuf::from("/tmp/token"));
                assert_eq!(c.retries, 2);
                assert_eq!(c.weight, 1.0);
            }
            other => panic!("unexpected plugin {other:?}"),
        }
    }

    #[test]
    fn parse_kind_without_params_uses_defaults() {
        let config: PluginConfig = "http".parse().unwrap();
        assert_eq!(config, PluginConfig::Http(HttpConfig::default()));
    }

    #[test]
    fn parse_rejects_unknown_kind_and_keys() {
        assert_eq!(
            "icmp:weight=1".parse::<PluginConfig>().unwrap_err(),
            ConfigError::UnknownKind("icmp".to_string())
        );
        assert!(matches!(
            "tcp:path=/healthz".parse::<PluginConfig>(),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            "tcp:port".parse::<PluginConfig>(),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            "tcp:port=http".parse::<PluginConfig>(),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn weights_summing_to_one_pass() {
        assert!(validate_plugins(&[tcp(1, 0.5), tcp(2, 0.5)]).is_empty());
        assert!(validate_plugins(&[tcp(1, 0.1), tcp(2, 0.2), tcp(3, 0.7)]).is_empty());
    }

    #[test]
    fn weights_not_summing_to_one_fail() {
        let errors = validate_plugins(&[tcp(1, 0.5), tcp(2, 0.4)]);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ConfigError::WeightSum(_)));

        let errors = validate_plugins(&[tcp(1, 0.6), tcp(2, 0.6)]);
        assert!(matches!(errors[0], ConfigError::WeightSum(_)));
    }

    #[test]
    fn weight_out_of_range_fails() {
        let errors = validate_plugins(&[tcp(1, 1.5), tcp(2, -0.5)]);
        assert_eq!(
            errors
                .iter()
                .filter(|e| matches!(e, ConfigError::WeightOutOfRange { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn empty_and_duplicate_plugins_fail() {
        assert_eq!(validate_plugins(&[]), vec![ConfigError::EmptyPluginSet]);

        let errors = validate_plugins(&[tcp(1, 0.5), tcp(1, 0.5)]);
        assert_eq!(errors, vec![ConfigError::DuplicatePlugin("tcp:1".to_string())]);
    }

    #[test]
    fn zero_timeout_and_retries_fail() {
        let plugin = PluginConfig::Tcp(TcpConfig {
            timeout_secs: 0,
            retries: 0,
            ..Default::default()
        });
        assert_eq!(validate_plugins(&[plugin]).len(), 2);
    }

    #[test]
    fn check_config_validation_collects_all_errors() {
        let config = CheckConfig {
            period_secs: 0,
            score_line: 0.0,
            concurrency: 0,
            plugins: vec![],
        };
        assert_eq!(config.validate().unwrap_err().len(), 4);
        assert!(CheckConfig::default().validate().is_ok());
    }

    #[test]
    fn plugin_configs_load_from_toml() {
        #[derive(Deserialize)]
        struct Doc {
            plugins: Vec<PluginConfig>,
        }
        let doc: Doc = toml::from_str(
            r#"
            [[plugins]]
            kind = "tcp"
            port = 10250
            weight = 0.5

            [[plugins]]
            kind = "https-auth"
            weight = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(doc.plugins.len(), 2);
        assert_eq!(doc.plugins[0].name(), "tcp:10250");
        assert_eq!(doc.plugins[1].kind(), "https-auth");
        assert!(validate_plugins(&doc.plugins).is_empty());
    }
}
