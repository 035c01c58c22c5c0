//! Daemon configuration: TOML file, then command-line overrides.
//!
//! ```toml
//! [node]
//! name = "edge-1"
//!
//! [check]
//! period_secs = 10
//! score_line = 100.0
//!
//! [[check.plugins]]
//! kind = "tcp"
//! port = 10250
//! weight = 0.5
//!
//! [[check.plugins]]
//! kind = "https-auth"
//! port = 10250
//! weight = 0.5
//!
//! [gossip]
//! port = 51005
//!
//! [vote]
//! timeout_secs = 60
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Args, ValueEnum};
use edgeguard_cluster::KubeConfig;
use edgeguard_gossip::GossipConfig;
use edgeguard_health::{CheckConfig, PluginConfig};
use edgeguard_vote::VoteConfig;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOG_FILTER: &str = "info,edgeguard=debug";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub node: NodeSection,
    pub check: CheckConfig,
    pub gossip: GossipConfig,
    pub vote: VoteConfig,
    pub registry: RegistrySection,
    pub log: LogSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Name of this node's object in the registry.
    pub name: String,
    /// Local address the gossip server binds to; all interfaces when
    /// unset. Peers always know this node by its registry address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<IpAddr>,
}

impl NodeSection {
    /// Socket the gossip server listens on.
    pub fn bind_addr(&self, port: u16) -> SocketAddr {
        let ip = self.address.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::new(ip, port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    pub apiserver: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for RegistrySection {
    fn default() -> Self {
        let in_cluster = KubeConfig::in_cluster();
        Self {
            apiserver: in_cluster.server,
            token_file: in_cluster.token_file,
            ca_file: in_cluster.ca_file,
            timeout_secs: in_cluster.timeout.as_secs(),
        }
    }
}

impl RegistrySection {
    pub fn kube_config(&self) -> KubeConfig {
        KubeConfig {
            server: self.apiserver.clone(),
            token_file: self.token_file.clone(),
            ca_file: self.ca_file.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub format: LogFormat,
    /// Used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Command-line settings. Anything given here wins over the file.
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// TOML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// This node's name in the registry.
    #[arg(long, env = "NODE_NAME")]
    pub node_name: Option<String>,

    /// Local address for the gossip server to bind to.
    #[arg(long, env = "NODE_IP")]
    pub node_address: Option<IpAddr>,

    /// Seconds between check cycles.
    #[arg(long)]
    pub check_period: Option<u64>,

    /// Weighted score a peer needs to be judged normal.
    #[arg(long)]
    pub score_line: Option<f64>,

    /// Health check plugin as `kind:key=value,...`; repeat for several.
    /// Replaces the configured plugin list.
    #[arg(long = "plugin", value_name = "SPEC")]
    pub plugins: Vec<PluginConfig>,

    #[arg(long)]
    pub gossip_port: Option<u16>,

    #[arg(long)]
    pub gossip_period: Option<u64>,

    #[arg(long)]
    pub gossip_timeout: Option<u64>,

    #[arg(long)]
    pub gossip_retries: Option<u32>,

    #[arg(long)]
    pub gossip_concurrency: Option<usize>,

    #[arg(long)]
    pub vote_period: Option<u64>,

    /// Maximum age in seconds of a remote verdict that still counts.
    #[arg(long)]
    pub vote_timeout: Option<u64>,

    /// Kubernetes API server URL.
    #[arg(long)]
    pub apiserver: Option<String>,

    /// Bearer token file for the API server.
    #[arg(long)]
    pub token_file: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
}

impl DaemonConfig {
    /// Read a TOML file; `None` yields the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Load the configured file and apply `overrides` on top.
    pub fn resolve(overrides: &Overrides) -> anyhow::Result<Self> {
        let mut config = Self::load(overrides.config.as_deref())?;
        config.apply(overrides);
        Ok(config)
    }

    pub fn apply(&mut self, o: &Overrides) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }

        set(&mut self.node.name, &o.node_name);
        if o.node_address.is_some() {
            self.node.address = o.node_address;
        }
        set(&mut self.check.period_secs, &o.check_period);
        set(&mut self.check.score_line, &o.score_line);
        if !o.plugins.is_empty() {
            self.check.plugins = o.plugins.clone();
        }
        set(&mut self.gossip.port, &o.gossip_port);
        set(&mut self.gossip.period_secs, &o.gossip_period);
        set(&mut self.gossip.timeout_secs, &o.gossip_timeout);
        set(&mut self.gossip.retries, &o.gossip_retries);
        set(&mut self.gossip.concurrency, &o.gossip_concurrency);
        set(&mut self.vote.period_secs, &o.vote_period);
        set(&mut self.vote.timeout_secs, &o.vote_timeout);
        set(&mut self.registry.apiserver, &o.apiserver);
        if o.token_file.is_some() {
            self.registry.token_file = o.token_file.clone();
        }
        set(&mut self.log.format, &o.log_format);
    }

    /// Every problem with the configuration, as readable messages.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.node.name.trim().is_empty() {
            errors.push("node name is empty (set --node-name or NODE_NAME)".to_string());
        }
        if let Err(check) = self.check.validate() {
            errors.extend(check.iter().map(ToString::to_string));
        }
        errors.extend(self.gossip.validate().iter().map(ToString::to_string));
        errors.extend(
            self.vote
                .validate(self.gossip.period_secs)
                .iter()
                .map(ToString::to_string),
        );
        if self.registry.apiserver.trim().is_empty() {
            errors.push("registry apiserver is empty".to_string());
        }
        if self.registry.timeout_secs == 0 {
            errors.push("registry timeout must be positive".to_string());
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::Parser;
    use edgeguard_health::TcpConfig;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        overrides: Overrides,
    }

    fn parse(args: &[&str]) -> Overrides {
        let mut argv = vec!["edgeguardd"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().overrides
    }

    fn named(name: &str) -> DaemonConfig {
        let mut config = DaemonConfig::default();
        config.node.name = name.to_string();
        config
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = DaemonConfig::default();
        assert_eq!(config.check.period_secs, 10);
        assert_eq!(config.check.score_line, 100.0);
        assert_eq!(config.gossip.port, 51005);
        assert_eq!(config.gossip.timeout_secs, 3);
        assert_eq!(config.gossip.retries, 1);
        assert_eq!(config.gossip.concurrency, 16);
        assert_eq!(config.vote.period_secs, 10);
        assert_eq!(config.vote.timeout_secs, 60);
        assert_eq!(config.check.plugins, vec![PluginConfig::default()]);
        assert_eq!(config.check.plugins[0].name(), "https-auth:10250");
        assert_eq!(config.log.filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn named_defaults_validate() {
        named("edge-1").validate().unwrap();
    }

    #[test]
    fn loads_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[node]
name = "edge-7"

[check]
score_line = 50.0

[[check.plugins]]
kind = "tcp"
port = 22
weight = 0.5

[[check.plugins]]
kind = "http"
port = 8080
path = "/ready"
weight = 0.5

[gossip]
port = 6000

[vote]
timeout_secs = 90

[log]
format = "json"
"#
        )
        .unwrap();

        let config = DaemonConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.node.name, "edge-7");
        assert_eq!(config.check.score_line, 50.0);
        assert_eq!(config.check.plugins.len(), 2);
        assert_eq!(config.check.plugins[1].name(), "http:8080");
        assert_eq!(config.gossip.port, 6000);
        assert_eq!(config.gossip.period_secs, 10);
        assert_eq!(config.vote.timeout_secs, 90);
        assert_eq!(config.log.format, LogFormat::Json);
        config.validate().unwrap();
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = DaemonConfig::load(Some(Path::new("/nonexistent/edgeguard.toml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/edgeguard.toml"));
    }

    #[test]
    fn flags_override_file_values() {
        let overrides = parse(&[
            "--node-name",
            "edge-2",
            "--node-address",
            "172.16.0.2",
            "--plugin",
            "tcp:port=22,weight=0.4",
            "--plugin",
            "http:port=8080,weight=0.6",
            "--gossip-port",
            "6001",
            "--vote-timeout",
            "120",
            "--log-format",
            "json",
        ]);

        let mut config = named("from-file");
        config.apply(&overrides);

        assert_eq!(config.node.name, "edge-2");
        assert_eq!(config.node.address, Some("172.16.0.2".parse().unwrap()));
        assert_eq!(config.node.bind_addr(6001).to_string(), "172.16.0.2:6001");
        assert_eq!(
            config.check.plugins[0],
            PluginConfig::Tcp(TcpConfig {
                port: 22,
                weight: 0.4,
                ..Default::default()
            })
        );
        assert_eq!(config.check.plugins.len(), 2);
        assert_eq!(config.gossip.port, 6001);
        assert_eq!(config.vote.timeout_secs, 120);
        assert_eq!(config.log.format, LogFormat::Json);
        config.validate().unwrap();
    }

    #[test]
    fn absent_flags_keep_file_values() {
        let mut config = named("edge-1");
        config.gossip.port = 7000;
        config.apply(&Overrides::default());
        assert_eq!(config.gossip.port, 7000);
        assert_eq!(config.node.name, "edge-1");
    }

    #[test]
    fn gossip_binds_all_interfaces_by_default() {
        let config = named("edge-1");
        assert_eq!(config.node.bind_addr(51005).to_string(), "0.0.0.0:51005");
    }

    #[test]
    fn node_address_must_be_an_ip() {
        assert!(TestCli::try_parse_from(["edgeguardd", "--node-address", "edge-1.local"]).is_err());

        let toml = "[node]\nname = \"edge-1\"\naddress = \"not-an-ip\"\n";
        assert!(toml::from_str::<DaemonConfig>(toml).is_err());
    }

    #[test]
    fn bad_plugin_flag_is_rejected_by_parser() {
        let argv = ["edgeguardd", "--plugin", "udp:port=1"];
        assert!(TestCli::try_parse_from(argv).is_err());
    }

    #[test]
    fn validation_collects_every_error() {
        let mut config = DaemonConfig::default();
        config.check.plugins = vec![
            PluginConfig::Tcp(TcpConfig {
                port: 1,
                weight: 0.5,
                ..Default::default()
            }),
            PluginConfig::Tcp(TcpConfig {
                port: 2,
                weight: 0.3,
                ..Default::default()
            }),
        ];
        config.check.score_line = 0.0;
        config.vote.timeout_secs = 5;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("node name")));
        assert!(errors.iter().any(|e| e.contains("sum to")));
        assert!(errors.iter().any(|e| e.contains("score line")));
        assert!(errors.iter().any(|e| e.contains("vote timeout")));
    }

    #[test]
    fn effective_config_serializes_to_toml() {
        let config = named("edge-1");
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("[[check.plugins]]"));
        assert!(text.contains("kind = \"https-auth\""));
        let back: DaemonConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
