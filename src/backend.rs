//! Storage backend dispatch: naming and format policy per backend type.
//!
//! Proxmox addresses an allocated disk differently depending on the storage
//! backend. Directory storages keep one file per disk under an image
//! directory keyed by VM id, so the disk name carries a format extension and
//! the canonical id includes the vmid path segment. LVM storages allocate a
//! logical volume, which has no extension and is addressed flat. LVM also
//! only supports raw volumes, so a qcow2 request is overridden.
//!
//! Strategy selection runs before anything touches the remote host: an
//! unknown backend type is rejected here, never mid-pipeline.

use crate::error::DeployError;

/// Disk image format accepted by the allocation and conversion tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskFormat {
    Raw,
    Qcow2,
}

impl DiskFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Qcow2 => "qcow2",
        }
    }
}

impl std::fmt::Display for DiskFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two supported storage backend families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Flat directory-backed storage (`dir`): one image file per disk.
    Directory,
    /// LVM-backed storage (`lvm`): one logical volume per disk, raw only.
    Lvm,
}

impl StorageBackend {
    /// Select the backend strategy from a storage's declared type string.
    pub fn from_storage_type(storage_type: &str) -> Result<Self, DeployError> {
        match storage_type {
            "dir" => Ok(Self::Directory),
            "lvm" => Ok(Self::Lvm),
            other => Err(DeployError::Validation {
                message: format!(
                    "unsupported storage type '{other}' (only dir and lvm storage are supported)"
                ),
            }),
        }
    }

    /// The format actually used for allocation. LVM only supports raw
    /// volumes, overriding whatever the caller asked for.
    pub fn effective_format(&self, requested: DiskFormat) -> DiskFormat {
        match self {
            Self::Directory => requested,
            Self::Lvm => DiskFormat::Raw,
        }
    }

    /// Name of the disk to allocate.
    pub fn disk_name(&self, vmid: u32, label: &str, format: DiskFormat) -> String {
        match self {
            Self::Directory => format!("vm-{vmid}-{label}.{format}"),
            Self::Lvm => format!("vm-{vmid}-{label}"),
        }
    }

    /// Cluster-wide canonical identifier of the allocated disk.
    pub fn canonical_id(&self, storage: &str, vmid: u32, disk_name: &str) -> String {
        match self {
            Self::Directory => format!("{storage}:{vmid}/{disk_name}"),
            Self::Lvm => format!("{storage}:{disk_name}"),
        }
    }
}
