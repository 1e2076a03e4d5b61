//! Provisioning orchestration: validate a request against live bounds,
//! create the VM, then upload and attach its disks.

use std::path::Path;
use std::time::Duration;

use indicatif::ProgressBar;

use crate::api::{ClusterApi, VmSpec};
use crate::attach;
use crate::error::DeployError;
use crate::limits::LimitResolver;
use crate::remote::RemoteSession;

pub const MIN_CPUS: u32 = 1;
pub const MIN_MEMORY_MB: u64 = 32;
pub const MIN_DISK_GB: u64 = 4;

const KB_PER_GB: u64 = 1024 * 1024;

/// A fully specified provisioning request. Values must fall within the
/// live bounds for the chosen node/storage pair — [`ProvisionRequest::validate`]
/// enforces this before anything is mutated; a violation is a caller error,
/// not a pipeline concern.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub node: String,
    pub storage: String,
    pub vmid: u32,
    pub name: String,
    pub cpus: u32,
    pub memory_mb: u64,
    pub disk_gb: u64,
}

impl ProvisionRequest {
    pub async fn validate(&self, api: &impl ClusterApi) -> Result<(), DeployError> {
        if self.name.is_empty() {
            return Err(DeployError::Validation {
                message: "VM name must not be empty".into(),
            });
        }

        let resolver = LimitResolver::new(api);

        let max_cpu = resolver.max_cpu(Some(&self.node)).await?;
        if !(MIN_CPUS..=max_cpu).contains(&self.cpus) {
            return Err(DeployError::Validation {
                message: format!(
                    "cpus must be between {MIN_CPUS} and {max_cpu} (got {})",
                    self.cpus
                ),
            });
        }

        let max_memory = resolver.max_memory_mb(Some(&self.node)).await?;
        if !(MIN_MEMORY_MB..=max_memory).contains(&self.memory_mb) {
            return Err(DeployError::Validation {
                message: format!(
                    "memory must be between {MIN_MEMORY_MB} and {max_memory} MB (got {})",
                    self.memory_mb
                ),
            });
        }

        let max_disk = resolver
            .max_disk_gb(Some(&self.node), Some(&self.storage))
            .await?;
        if !(MIN_DISK_GB..=max_disk).contains(&self.disk_gb) {
            return Err(DeployError::Validation {
                message: format!(
                    "disk must be between {MIN_DISK_GB} and {max_disk} GB (got {})",
                    self.disk_gb
                ),
            });
        }

        Ok(())
    }
}

/// Create the VM and attach its disks. The base image is required; the
/// cloud-init seed is optional. Each disk's upload completes before its
/// configuration binding is made.
pub async fn provision(
    api: &impl ClusterApi,
    session: &impl RemoteSession,
    request: &ProvisionRequest,
    image: &Path,
    seed: Option<&Path>,
) -> Result<(), DeployError> {
    request.validate(api).await?;

    println!("Creating VM {} ({}) on {}...", request.vmid, request.name, request.node);
    api.create_vm(
        &request.node,
        &VmSpec {
            vmid: request.vmid,
            name: request.name.clone(),
            cores: request.cpus,
            memory_mb: request.memory_mb,
        },
    )
    .await?;
    tracing::info!(vmid = request.vmid, node = %request.node, "VM created");

    let pb = spinner(format!("Uploading base image {}...", image.display()));
    let disk_size_kb = request.disk_gb * KB_PER_GB;
    match attach::attach_base_disk(
        api,
        session,
        &request.node,
        &request.storage,
        request.vmid,
        image,
        disk_size_kb,
    )
    .await
    {
        Ok(handle) => pb.finish_with_message(format!("Base disk attached as {handle}")),
        Err(e) => {
            pb.finish_and_clear();
            return Err(e);
        }
    }

    if let Some(seed) = seed {
        let pb = spinner(format!("Uploading cloud-init seed {}...", seed.display()));
        match attach::attach_seed_iso(
            api,
            session,
            &request.node,
            &request.storage,
            request.vmid,
            seed,
        )
        .await
        {
            Ok(handle) => pb.finish_with_message(format!("Seed ISO attached as {handle}")),
            Err(e) => {
                pb.finish_and_clear();
                return Err(e);
            }
        }
    }

    println!("VM {} provisioned.", request.vmid);
    Ok(())
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
