//! Cluster API collaborator: typed read/write access to the Proxmox REST API.
//!
//! The rest of the crate consumes the [`ClusterApi`] trait, not the concrete
//! client, so resolvers and attachment logic can be exercised against fake
//! clusters in tests. The production implementation talks to `/api2/json`
//! with API-token authentication. Failed requests are not retried.

use serde::Deserialize;

use crate::config::ApiConfig;
use crate::error::DeployError;

/// A node as listed by the `/nodes` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSummary {
    pub node: String,
    #[serde(default)]
    pub maxcpu: u32,
    /// Total memory in bytes.
    #[serde(default)]
    pub maxmem: u64,
    /// Total disk space in bytes.
    #[serde(default)]
    pub maxdisk: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CpuInfo {
    pub sockets: u32,
    pub cores: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryInfo {
    /// Total memory in bytes.
    pub total: u64,
}

/// Live status of a single node (`/nodes/{node}/status`).
#[derive(Debug, Clone, Deserialize)]
pub struct NodeStatus {
    pub cpuinfo: CpuInfo,
    pub memory: MemoryInfo,
}

/// A storage as listed by `/nodes/{node}/storage`.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSummary {
    pub storage: String,
    /// Comma-separated content types this storage accepts.
    #[serde(default)]
    pub content: String,
    /// Available space in bytes.
    #[serde(default)]
    pub avail: u64,
}

impl StorageSummary {
    /// Whether this storage can hold VM disk images.
    pub fn accepts_images(&self) -> bool {
        self.content.split(',').any(|c| c == "images")
    }
}

/// Live status of a single storage (`/nodes/{node}/storage/{storage}/status`).
#[derive(Debug, Clone, Deserialize)]
pub struct StorageStatus {
    #[serde(rename = "type")]
    pub storage_type: String,
    /// Available space in bytes.
    #[serde(default)]
    pub avail: u64,
}

/// Parameters for creating a VM.
#[derive(Debug, Clone)]
pub struct VmSpec {
    pub vmid: u32,
    pub name: String,
    pub cores: u32,
    pub memory_mb: u64,
}

#[allow(async_fn_in_trait)] // trait is internal-only
pub trait ClusterApi {
    async fn nodes(&self) -> Result<Vec<NodeSummary>, DeployError>;
    async fn node_status(&self, node: &str) -> Result<NodeStatus, DeployError>;
    async fn storages(&self, node: &str) -> Result<Vec<StorageSummary>, DeployError>;
    async fn storage_status(
        &self,
        node: &str,
        storage: &str,
    ) -> Result<StorageStatus, DeployError>;
    async fn create_vm(&self, node: &str, spec: &VmSpec) -> Result<(), DeployError>;
    async fn set_vm_config(
        &self,
        node: &str,
        vmid: u32,
        entries: &[(String, String)],
    ) -> Result<(), DeployError>;
}

// ── Proxmox REST client ───────────────────────────────────

/// Every Proxmox response wraps its payload in a `data` field.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

pub struct ProxmoxApi {
    base_url: String,
    auth_header: String,
    client: reqwest::Client,
}

impl ProxmoxApi {
    pub fn new(config: &ApiConfig) -> Result<Self, DeployError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| DeployError::Api {
                message: format!("building HTTP client: {e}"),
            })?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            auth_header: format!(
                "PVEAPIToken={}!{}={}",
                config.user, config.token_id, config.token_secret
            ),
            client,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, DeployError> {
        let url = format!("{}/api2/json{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", &self.auth_header)
            .send()
            .await
            .map_err(|e| DeployError::Api {
                message: format!("GET {path}: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeployError::Api {
                message: format!("GET {path}: HTTP {status}"),
            });
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| DeployError::Api {
            message: format!("GET {path}: decoding response: {e}"),
        })?;
        Ok(envelope.data)
    }

    async fn send_form(
        &self,
        method: reqwest::Method,
        path: &str,
        form: &[(String, String)],
    ) -> Result<(), DeployError> {
        let url = format!("{}/api2/json{path}", self.base_url);
        let response = self
            .client
            .request(method.clone(), &url)
            .header("Authorization", &self.auth_header)
            .form(form)
            .send()
            .await
            .map_err(|e| DeployError::Api {
                message: format!("{method} {path}: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeployError::Api {
                message: format!("{method} {path}: HTTP {status}: {}", body.trim()),
            });
        }
        Ok(())
    }
}

impl ClusterApi for ProxmoxApi {
    async fn nodes(&self) -> Result<Vec<NodeSummary>, DeployError> {
        self.get("/nodes").await
    }

    async fn node_status(&self, node: &str) -> Result<NodeStatus, DeployError> {
        self.get(&format!("/nodes/{node}/status")).await
    }

    async fn storages(&self, node: &str) -> Result<Vec<StorageSummary>, DeployError> {
        self.get(&format!("/nodes/{node}/storage")).await
    }

    async fn storage_status(
        &self,
        node: &str,
        storage: &str,
    ) -> Result<StorageStatus, DeployError> {
        self.get(&format!("/nodes/{node}/storage/{storage}/status"))
            .await
    }

    async fn create_vm(&self, node: &str, spec: &VmSpec) -> Result<(), DeployError> {
        let form = vec![
            ("vmid".to_string(), spec.vmid.to_string()),
            ("name".to_string(), spec.name.clone()),
            ("sockets".to_string(), "1".to_string()),
            ("cores".to_string(), spec.cores.to_string()),
            ("memory".to_string(), spec.memory_mb.to_string()),
            ("net0".to_string(), "virtio,bridge=vmbr0".to_string()),
        ];
        self.send_form(reqwest::Method::POST, &format!("/nodes/{node}/qemu"), &form)
            .await
    }

    async fn set_vm_config(
        &self,
        node: &str,
        vmid: u32,
        entries: &[(String, String)],
    ) -> Result<(), DeployError> {
        self.send_form(
            reqwest::Method::PUT,
            &format!("/nodes/{node}/qemu/{vmid}/config"),
            entries,
        )
        .await
    }
}
