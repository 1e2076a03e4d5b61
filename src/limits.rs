//! Resource limit resolver: reduces live cluster capacity to scalar bounds.
//!
//! Limits are asymmetric on purpose: CPU and memory are host-wide physical
//! ceilings (sockets × cores, total memory), while disk is the consumable
//! resource, so it reports *available* space on the chosen storage. Every
//! query hits the cluster — nothing is cached, so bounds always reflect the
//! state at question time.

use crate::api::{ClusterApi, StorageSummary};
use crate::error::DeployError;

const BYTES_PER_MB: u64 = 1024 * 1024;
const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

pub struct LimitResolver<'a, A: ClusterApi> {
    api: &'a A,
}

impl<'a, A: ClusterApi> LimitResolver<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self { api }
    }

    /// Maximum usable CPU count.
    ///
    /// With a node: that node's physical capacity (sockets × cores).
    /// Without: the minimum across all nodes — a safe universal ceiling
    /// usable before a node is chosen.
    pub async fn max_cpu(&self, node: Option<&str>) -> Result<u32, DeployError> {
        match node {
            Some(node) => {
                let status = self.api.node_status(node).await?;
                Ok(status.cpuinfo.sockets * status.cpuinfo.cores)
            }
            None => {
                let nodes = self.api.nodes().await?;
                nodes
                    .iter()
                    .map(|n| n.maxcpu)
                    .min()
                    .ok_or_else(no_nodes_error)
            }
        }
    }

    /// Maximum usable memory in megabytes (floored).
    pub async fn max_memory_mb(&self, node: Option<&str>) -> Result<u64, DeployError> {
        match node {
            Some(node) => {
                let status = self.api.node_status(node).await?;
                Ok(status.memory.total / BYTES_PER_MB)
            }
            None => {
                let nodes = self.api.nodes().await?;
                nodes
                    .iter()
                    .map(|n| n.maxmem / BYTES_PER_MB)
                    .min()
                    .ok_or_else(no_nodes_error)
            }
        }
    }

    /// Maximum disk size in gigabytes (floored).
    ///
    /// With node and storage: the *available* space on that storage.
    /// With neither: the minimum total disk across all nodes. Passing one
    /// without the other is a precondition violation, not a silent fallback.
    pub async fn max_disk_gb(
        &self,
        node: Option<&str>,
        storage: Option<&str>,
    ) -> Result<u64, DeployError> {
        match (node, storage) {
            (Some(node), Some(storage)) => {
                let status = self.api.storage_status(node, storage).await?;
                Ok(status.avail / BYTES_PER_GB)
            }
            (None, None) => {
                let nodes = self.api.nodes().await?;
                nodes
                    .iter()
                    .map(|n| n.maxdisk / BYTES_PER_GB)
                    .min()
                    .ok_or_else(no_nodes_error)
            }
            _ => Err(DeployError::Validation {
                message: "node and storage must be given together for disk limits".into(),
            }),
        }
    }

    /// Storages on the node that can hold disk images.
    pub async fn image_storages(&self, node: &str) -> Result<Vec<StorageSummary>, DeployError> {
        let storages = self.api.storages(node).await?;
        Ok(storages.into_iter().filter(|s| s.accepts_images()).collect())
    }
}

fn no_nodes_error() -> DeployError {
    DeployError::Validation {
        message: "cluster reports no nodes".into(),
    }
}
