//! Disk attachment: upload an image and bind it into a VM's device slots.
//!
//! Two disk roles exist. The cloud-init seed goes to the secondary slot in
//! raw format with its size derived from the file; the base OS image goes
//! to the primary slot, preferring qcow2, with an explicit size, and is
//! marked as the boot device. In both cases the upload pipeline must fully
//! complete before the configuration binding is issued — a partially
//! uploaded disk is never attached.

use std::path::Path;

use crate::api::ClusterApi;
use crate::backend::{DiskFormat, StorageBackend};
use crate::error::DeployError;
use crate::remote::RemoteSession;
use crate::upload::{self, DiskHandle, UploadRequest};

/// Device slot for the boot/base image.
const BASE_SLOT: &str = "virtio0";
/// Device slot for the cloud-init seed image.
const SEED_SLOT: &str = "virtio1";

/// Resolve the backend strategy for a storage from its live status.
/// Runs before the pipeline touches the remote host, so an unsupported
/// backend never causes a remote mutation.
async fn storage_backend(
    api: &impl ClusterApi,
    node: &str,
    storage: &str,
) -> Result<StorageBackend, DeployError> {
    let status = api.storage_status(node, storage).await?;
    StorageBackend::from_storage_type(&status.storage_type)
}

/// Upload a cloud-init seed ISO and attach it to the VM.
pub async fn attach_seed_iso(
    api: &impl ClusterApi,
    session: &impl RemoteSession,
    node: &str,
    storage: &str,
    vmid: u32,
    iso_file: &Path,
) -> Result<DiskHandle, DeployError> {
    let backend = storage_backend(api, node, storage).await?;
    let handle = upload::upload(
        session,
        backend,
        &UploadRequest {
            storage,
            vmid,
            local_path: iso_file,
            disk_label: "cloudinit-seed",
            format: DiskFormat::Raw,
            size_kb: None,
        },
    )
    .await?;

    api.set_vm_config(node, vmid, &[(SEED_SLOT.to_string(), handle.to_string())])
        .await?;
    tracing::info!(vmid, disk = %handle, slot = SEED_SLOT, "seed ISO attached");
    Ok(handle)
}

/// Upload a base OS image, attach it as the primary disk, and mark it as
/// the boot device. `disk_size_kb` is the allocation size in kilobytes.
pub async fn attach_base_disk(
    api: &impl ClusterApi,
    session: &impl RemoteSession,
    node: &str,
    storage: &str,
    vmid: u32,
    img_file: &Path,
    disk_size_kb: u64,
) -> Result<DiskHandle, DeployError> {
    let backend = storage_backend(api, node, storage).await?;
    let handle = upload::upload(
        session,
        backend,
        &UploadRequest {
            storage,
            vmid,
            local_path: img_file,
            disk_label: "base-disk",
            format: DiskFormat::Qcow2,
            size_kb: Some(disk_size_kb),
        },
    )
    .await?;

    api.set_vm_config(
        node,
        vmid,
        &[
            (BASE_SLOT.to_string(), handle.to_string()),
            ("bootdisk".to_string(), BASE_SLOT.to_string()),
        ],
    )
    .await?;
    tracing::info!(vmid, disk = %handle, slot = BASE_SLOT, "base disk attached as boot device");
    Ok(handle)
}
