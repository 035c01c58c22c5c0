//! Probe plugins.
//!
//! Each plugin scores one peer as 0 or 100. A probe is retried up to the
//! configured number of attempts, each attempt bounded by the plugin
//! timeout; any error simply yields 0.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use edgeguard_cluster::host_port;
use reqwest::header::AUTHORIZATION;
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::{PluginConfig, validate_plugins};
use crate::error::{ConfigError, ProbeError};

/// Score awarded by a successful probe.
pub const MAX_SCORE: f64 = 100.0;

/// TCP connect probe.
#[derive(Debug)]
pub struct TcpProbe {
    port: u16,
}

/// Plain HTTP probe.
#[derive(Debug)]
pub struct HttpProbe {
    port: u16,
    path: String,
}

/// HTTPS probe authenticated with a bearer token. The server certificate
/// is not verified; the token is what establishes trust.
#[derive(Debug)]
pub struct HttpsAuthProbe {
    port: u16,
    path: String,
    token_file: PathBuf,
    client: reqwest::Client,
}

/// The closed set of probe kinds.
#[derive(Debug)]
pub enum Probe {
    Tcp(TcpProbe),
    Http(HttpProbe),
    HttpsAuth(HttpsAuthProbe),
}

/// A configured, weighted plugin.
#[derive(Debug)]
pub struct Plugin {
    name: String,
    weight: f64,
    timeout: Duration,
    retries: u32,
    probe: Probe,
}

impl Plugin {
    pub fn from_config(config: &PluginConfig) -> Result<Self, ConfigError> {
        let probe = match config {
            PluginConfig::Tcp(c) => Probe::Tcp(TcpProbe { port: c.port }),
            PluginConfig::Http(c) => Probe::Http(HttpProbe {
                port: c.port,
                path: c.path.clone(),
            }),
            PluginConfig::HttpsAuth(c) => {
                let client = reqwest::Client::builder()
                    .danger_accept_invalid_certs(true)
                    .timeout(Duration::from_secs(c.timeout_secs))
                    .build()
                    .map_err(|e| ConfigError::Client {
                        plugin: config.name(),
                        reason: e.to_string(),
                    })?;
                Probe::HttpsAuth(HttpsAuthProbe {
                    port: c.port,
                    path: c.path.clone(),
                    token_file: c.token_file.clone(),
                    client,
                })
            }
        };

        Ok(Self {
            name: config.name(),
            weight: config.weight(),
            timeout: config.timeout(),
            retries: config.retries().max(1),
            probe,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Probe `peer` and return its unweighted score: 100 on the first
    /// successful attempt, 0 once all attempts failed.
    pub async fn execute(&self, peer: &str) -> f64 {
        for attempt in 1..=self.retries {
            let result = match tokio::time::timeout(self.timeout, self.probe_once(peer)).await {
                Ok(result) => result,
                Err(_) => Err(ProbeError::Timeout),
            };
            match result {
                Ok(()) => return MAX_SCORE,
                Err(e) => {
                    debug!(plugin = %self.name, %peer, attempt, error = %e, "probe attempt failed");
                }
            }
        }
        0.0
    }

    async fn probe_once(&self, peer: &str) -> Result<(), ProbeError> {
        match &self.probe {
            Probe::Tcp(p) => tcp_probe(&host_port(peer, p.port)).await,
            Probe::Http(p) => http_probe(&host_port(peer, p.port), &p.path).await,
            Probe::HttpsAuth(p) => https_auth_probe(p, peer).await,
        }
    }
}

/// A validated set of plugins whose weights sum to 1.
#[derive(Debug, Clone)]
pub struct PluginSet {
    plugins: Vec<Arc<Plugin>>,
}

impl PluginSet {
    pub fn from_configs(configs: &[PluginConfig]) -> Result<Self, Vec<ConfigError>> {
        let errors = validate_plugins(configs);
        if !errors.is_empty() {
            return Err(errors);
        }
        let plugins = configs
            .iter()
            .map(|c| Plugin::from_config(c).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| vec![e])?;
        Ok(Self { plugins })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Plugin>> {
        self.plugins.iter()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

async fn tcp_probe(address: &str) -> Result<(), ProbeError> {
    TcpStream::connect(address)
        .await
        .map(|_| ())
        .map_err(|e| ProbeError::Connect(e.to_string()))
}

/// `GET http://{address}{path}` over a fresh HTTP/1 connection; 2xx passes.
async fn http_probe(address: &str, path: &str) -> Result<(), ProbeError> {
    let uri = format!("http://{address}{path}");

    let stream = TcpStream::connect(address)
        .await
        .map_err(|e| ProbeError::Connect(e.to_string()))?;

    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| ProbeError::Request(format!("handshake: {e}")))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let req = http::Request::builder()
        .method("GET")
        .uri(&uri)
        .header("host", address)
        .header("user-agent", "edgeguard-health/0.1")
        .body(http_body_util::Empty::<bytes::Bytes>::new())
        .map_err(|e| ProbeError::Request(e.to_string()))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| ProbeError::Request(e.to_string()))?;
    if resp.status().is_success() {
        Ok(())
    } else {
        Err(ProbeError::Status(resp.status().as_u16()))
    }
}

async fn https_auth_probe(probe: &HttpsAuthProbe, peer: &str) -> Result<(), ProbeError> {
    let token = read_token(&probe.token_file).await?;
    let url = format!("https://{}{}", host_port(peer, probe.port), probe.path);

    let resp = probe
        .client
        .get(&url)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .send()
        .await
        .map_err(|e| {
            if e.is_connect() {
                ProbeError::Connect(e.to_string())
            } else {
                ProbeError::Request(e.to_string())
            }
        })?;

    if resp.status().is_success() {
        Ok(())
    } else {
        Err(ProbeError::Status(resp.status().as_u16()))
    }
}

/// Read the bearer token fresh on every probe; service account tokens rotate.
async fn read_token(path: &Path) -> Result<String, ProbeError> {
    let token = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ProbeError::Credentials(format!("{}: {e}", path.display())))?;
    let token = token.trim();
    if token.is_empty() {
        return Err(ProbeError::Credentials(format!("{} is empty", path.display())));
    }
    Ok(token.to_string())
}
