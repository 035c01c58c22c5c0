//! Kubernetes API registry.
//!
//! Talks to the API server's REST endpoints directly with `reqwest`.
//! Only the handful of calls EdgeGuard needs are implemented: node
//! list/get, config map and secret reads, and merge-patches for
//! annotations and taints.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::node::{NodeInfo, Taint};
use crate::registry::NodeRegistry;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";
const MERGE_PATCH: &str = "application/merge-patch+json";

/// Connection settings for [`KubeRegistry`].
#[derive(Debug, Clone)]
pub struct KubeConfig {
    /// API server base URL.
    pub server: String,
    /// Bearer token file; re-read on every request so rotated tokens are picked up.
    pub token_file: Option<PathBuf>,
    /// PEM bundle used to verify the API server.
    pub ca_file: Option<PathBuf>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl KubeConfig {
    /// Settings for a pod running inside the cluster.
    pub fn in_cluster() -> Self {
        let server = match (
            std::env::var("KUBERNETES_SERVICE_HOST"),
            std::env::var("KUBERNETES_SERVICE_PORT"),
        ) {
            (Ok(host), Ok(port)) => {
                let port = port.parse().unwrap_or(443);
                format!("https://{}", crate::node::host_port(&host, port))
            }
            _ => "https://kubernetes.default.svc".to_string(),
        };
        let dir = PathBuf::from(SERVICE_ACCOUNT_DIR);
        Self {
            server,
            token_file: Some(dir.join("token")),
            ca_file: Some(dir.join("ca.crt")),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Node registry backed by the Kubernetes API server.
pub struct KubeRegistry {
    client: Client,
    server: String,
    token_file: Option<PathBuf>,
}

impl KubeRegistry {
    pub fn new(config: KubeConfig) -> RegistryResult<Self> {
        let mut builder = Client::builder().timeout(config.timeout);
        if let Some(ca_file) = &config.ca_file {
            if ca_file.exists() {
                let pem = std::fs::read(ca_file)
                    .map_err(|e| RegistryError::Credentials(format!("{}: {e}", ca_file.display())))?;
                let cert = reqwest::Certificate::from_pem(&pem)
                    .map_err(|e| RegistryError::Credentials(format!("{}: {e}", ca_file.display())))?;
                builder = builder.add_root_certificate(cert);
            }
        }
        let client = builder.build()?;

        debug!(server = %config.server, "kubernetes registry configured");
        Ok(Self {
            client,
            server: config.server.trim_end_matches('/').to_string(),
            token_file: config.token_file,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server, path)
    }

    async fn authorize(&self, request: RequestBuilder) -> RegistryResult<RequestBuilder> {
        match &self.token_file {
            Some(path) => {
                let token = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| RegistryError::Credentials(format!("{}: {e}", path.display())))?;
                Ok(request.header(AUTHORIZATION, format!("Bearer {}", token.trim())))
            }
            None => Ok(request),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> RegistryResult<T> {
        let request = self.authorize(self.client.get(self.url(path))).await?;
        let response = check_status(request.send().await?, path).await?;
        Ok(response.json::<T>().await?)
    }

    async fn merge_patch(&self, path: &str, body: serde_json::Value) -> RegistryResult<()> {
        let request = self
            .client
            .patch(self.url(path))
            .header(CONTENT_TYPE, MERGE_PATCH)
            .body(body.to_string());
        let request = self.authorize(request).await?;
        check_status(request.send().await?, path).await?;
        Ok(())
    }
}

#[async_trait]
impl NodeRegistry for KubeRegistry {
    async fn list_nodes(&self) -> RegistryResult<Vec<NodeInfo>> {
        let list: NodeList = self.get_json("/api/v1/nodes").await?;
        Ok(list.items.into_iter().map(NodeObject::into_info).collect())
    }

    async fn get_node(&self, name: &str) -> RegistryResult<NodeInfo> {
        let node: NodeObject = self.get_json(&node_path(name)).await?;
        Ok(node.into_info())
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> RegistryResult<BTreeMap<String, String>> {
        let path = format!("/api/v1/namespaces/{namespace}/configmaps/{name}");
        let config_map: DataObject = self.get_json(&path).await?;
        Ok(config_map.data)
    }

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> RegistryResult<BTreeMap<String, Vec<u8>>> {
        let path = format!("/api/v1/namespaces/{namespace}/secrets/{name}");
        let secret: DataObject = self.get_json(&path).await?;
        decode_secret_data(secret.data)
    }

    async fn set_annotation(&self, node: &str, key: &str, value: &str) -> RegistryResult<()> {
        let body = json!({ "metadata": { "annotations": { key: value } } });
        self.merge_patch(&node_path(node), body).await
    }

    async fn remove_annotation(&self, node: &str, key: &str) -> RegistryResult<()> {
        let body = json!({ "metadata": { "annotations": { key: null } } });
        self.merge_patch(&node_path(node), body).await
    }

    async fn remove_taint(&self, node: &str, key: &str, effect: &str) -> RegistryResult<bool> {
        let path = node_path(node);
        let current: NodeObject = self.get_json(&path).await?;

        let before = current.spec.taints.len();
        let remaining: Vec<Taint> = current
            .spec
            .taints
            .into_iter()
            .filter(|t| !t.matches(key, effect))
            .collect();
        if remaining.len() == before {
            return Ok(false);
        }

        // Merge-patches replace lists wholesale; the resourceVersion turns
        // a concurrent update into a 409 instead of a lost write.
        let body = json!({
            "metadata": { "resourceVersion": current.metadata.resource_version },
            "spec": { "taints": remaining },
        });
        self.merge_patch(&path, body).await?;
        Ok(true)
    }
}

fn node_path(name: &str) -> String {
    format!("/api/v1/nodes/{name}")
}

async fn check_status(response: Response, what: &str) -> RegistryResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        404 => RegistryError::NotFound(what.to_string()),
        409 => RegistryError::Conflict(what.to_string()),
        status => RegistryError::Status { status, message },
    })
}

fn decode_secret_data(data: BTreeMap<String, String>) -> RegistryResult<BTreeMap<String, Vec<u8>>> {
    data.into_iter()
        .map(|(key, value)| {
            STANDARD
                .decode(value.as_bytes())
                .map(|bytes| (key.clone(), bytes))
                .map_err(|e| RegistryError::Decode(format!("secret key {key}: {e}")))
        })
        .collect()
}

// ── API object shapes ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct NodeList {
    #[serde(default)]
    items: Vec<NodeObject>,
}

#[derive(Debug, Deserialize)]
struct NodeObject {
    metadata: ObjectMeta,
    #[serde(default)]
    spec: NodeSpec,
    #[serde(default)]
    status: NodeStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMeta {
    name: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
    #[serde(default)]
    resource_version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NodeSpec {
    #[serde(default)]
    taints: Vec<Taint>,
}

#[derive(Debug, Default, Deserialize)]
struct NodeStatus {
    #[serde(default)]
    addresses: Vec<NodeAddressEntry>,
}

#[derive(Debug, Deserialize)]
struct NodeAddressEntry {
    #[serde(rename = "type")]
    kind: String,
    address: String,
}

#[derive(Debug, Deserialize)]
struct DataObject {
    #[serde(default)]
    data: BTreeMap<String, String>,
}

impl NodeObject {
    fn into_info(self) -> NodeInfo {
        let address = self
            .status
            .addresses
            .iter()
            .find(|a| a.kind == "InternalIP")
            .or_else(|| self.status.addresses.first())
            .map(|a| a.address.clone())
            .unwrap_or_else(|| self.metadata.name.clone());

        NodeInfo {
            name: self.metadata.name,
            address,
            labels: self.metadata.labels,
            annotations: self.metadata.annotations,
            taints: self.spec.taints,
        }
    }
}
