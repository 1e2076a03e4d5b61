//! Remote upload pipeline: move a local image into cluster storage.
//!
//! The steps executed are:
//!   1. The file is copied to a staging path under `/tmp` on the remote host.
//!   2. A disk is allocated with `pvesm alloc`.
//!   3. The device path backing the disk is resolved with `pvesm path`.
//!   4. The staged file is converted and streamed into the device with
//!      `qemu-img convert`.
//!   5. The staging file is removed.
//!
//! The remote tools report no structured status, so each step is judged by
//! inspecting the captured output streams. Failures abort the remaining
//! steps and carry both streams verbatim; nothing is rolled back — a staged
//! file or half-allocated disk is left in place for operator inspection.

use std::path::Path;

use crate::backend::{DiskFormat, StorageBackend};
use crate::error::DeployError;
use crate::remote::{CommandOutput, RemoteSession};

/// Canonical cluster identifier of an allocated disk.
///
/// Produced once the pipeline has allocated storage; immutable afterwards.
/// Ownership of the underlying disk passes to the VM configuration that
/// binds it — this crate never destroys one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskHandle(String);

impl DiskHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DiskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One upload of a local file into a named storage.
#[derive(Debug)]
pub struct UploadRequest<'a> {
    pub storage: &'a str,
    pub vmid: u32,
    pub local_path: &'a Path,
    pub disk_label: &'a str,
    pub format: DiskFormat,
    /// Disk size override in kilobytes. When absent, the size is computed
    /// from the local file's byte size, rounded up.
    pub size_kb: Option<u64>,
}

/// Upload a file into a datastore and return the allocated disk's handle.
///
/// The backend strategy decides naming and format before the first remote
/// call; the actual work is the five-step pipeline above.
pub async fn upload(
    session: &impl RemoteSession,
    backend: StorageBackend,
    request: &UploadRequest<'_>,
) -> Result<DiskHandle, DeployError> {
    let format = backend.effective_format(request.format);
    let disk_name = backend.disk_name(request.vmid, request.disk_label, format);
    let canonical = backend.canonical_id(request.storage, request.vmid, &disk_name);

    let staging = staging_path(request.local_path)?;
    session.upload_file(request.local_path, &staging).await?;

    let size_kb = match request.size_kb {
        Some(size) => size,
        None => file_size_kb(request.local_path)?,
    };

    // 2. Allocate
    let output = session
        .execute(
            "pvesm",
            &[
                "alloc".into(),
                request.storage.into(),
                request.vmid.to_string(),
                disk_name.clone(),
                size_kb.to_string(),
                "-format".into(),
                format.as_str().into(),
            ],
        )
        .await?;
    if alloc_failed(&output, &canonical) {
        return Err(invocation_failure("failed to allocate disk", output));
    }
    tracing::info!(%canonical, size_kb, %format, "disk allocated");

    // 3. Resolve device path
    let output = session
        .execute("pvesm", &["path".into(), canonical.clone()])
        .await?;
    if !output.stderr.is_empty() {
        return Err(invocation_failure(
            &format!("failed to resolve device path for {canonical}"),
            output,
        ));
    }
    let device_path = output.stdout.trim().to_string();

    // 4. Convert & transfer
    let output = session
        .execute(
            "qemu-img",
            &[
                "convert".into(),
                "-O".into(),
                format.as_str().into(),
                staging.clone(),
                device_path.clone(),
            ],
        )
        .await?;
    if !output.stderr.is_empty() {
        return Err(invocation_failure(
            &format!("failed to copy image into {device_path}"),
            output,
        ));
    }
    tracing::info!(%canonical, %device_path, "image converted into disk");

    // 5. Cleanup — a leftover staging file is a leak, not a failed upload.
    match session.execute("rm", &[staging.clone()]).await {
        Ok(output) if !output.stderr.is_empty() => {
            tracing::warn!(%staging, stderr = %output.stderr.trim(), "failed to remove staging file");
        }
        Err(e) => {
            tracing::warn!(%staging, error = %e, "failed to remove staging file");
        }
        Ok(_) => {}
    }

    Ok(DiskHandle(canonical))
}

/// Success heuristic for `pvesm alloc`, which exposes no structured status:
/// the allocation failed iff stdout does not echo the canonical identifier
/// AND something was written to stderr. Kept in one place so a structured
/// check can replace it if the tool ever grows one.
fn alloc_failed(output: &CommandOutput, canonical: &str) -> bool {
    !output.stdout.contains(canonical) && !output.stderr.is_empty()
}

fn invocation_failure(context: &str, output: CommandOutput) -> DeployError {
    DeployError::CommandInvocation {
        context: context.to_string(),
        stdout: output.stdout,
        stderr: output.stderr,
    }
}

/// Staging location on the remote host: `/tmp/` plus the local basename.
fn staging_path(local: &Path) -> Result<String, DeployError> {
    let basename = local
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| DeployError::Validation {
            message: format!("local file has no usable name: {}", local.display()),
        })?;
    Ok(format!("/tmp/{basename}"))
}

/// Local file size in kilobytes, rounded up.
fn file_size_kb(path: &Path) -> Result<u64, DeployError> {
    let metadata = std::fs::metadata(path).map_err(|e| DeployError::Io {
        context: format!("reading size of {}", path.display()),
        source: e,
    })?;
    Ok(metadata.len().div_ceil(1024))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Scripted session: returns canned outputs in order and records every
    /// upload and command for assertion.
    #[derive(Default)]
    struct FakeSession {
        responses: Mutex<VecDeque<CommandOutput>>,
        uploads: Mutex<Vec<(PathBuf, String)>>,
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl FakeSession {
        fn with_responses(responses: Vec<CommandOutput>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<(String, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }

        fn uploads(&self) -> Vec<(PathBuf, String)> {
            self.uploads.lock().unwrap().clone()
        }
    }

    impl RemoteSession for FakeSession {
        async fn upload_file(&self, local: &Path, remote: &str) -> Result<(), DeployError> {
            self.uploads
                .lock()
                .unwrap()
                .push((local.to_path_buf(), remote.to_string()));
            Ok(())
        }

        async fn execute(
            &self,
            program: &str,
            args: &[String],
        ) -> Result<CommandOutput, DeployError> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default())
        }
    }

    fn out(stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Write a temp file of `len` bytes and return (dir guard, path).
    fn temp_image(name: &str, len: usize) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&vec![0u8; len]).unwrap();
        (dir, path)
    }

    fn request<'a>(storage: &'a str, path: &'a Path, size_kb: Option<u64>) -> UploadRequest<'a> {
        UploadRequest {
            storage,
            vmid: 100,
            local_path: path,
            disk_label: "base-disk",
            format: DiskFormat::Qcow2,
            size_kb,
        }
    }

    #[tokio::test]
    async fn dir_upload_runs_all_steps() {
        let (_dir, path) = temp_image("disk.qcow2", 1024);
        let canonical = "local:100/vm-100-base-disk.qcow2";
        let session = FakeSession::with_responses(vec![
            out(&format!("successfully created '{canonical}'\n"), ""),
            out("/var/lib/vz/images/100/vm-100-base-disk.qcow2\n", ""),
            out("", ""),
            out("", ""),
        ]);

        let handle = upload(
            &session,
            StorageBackend::Directory,
            &request("local", &path, Some(2048)),
        )
        .await
        .unwrap();

        assert_eq!(handle.as_str(), canonical);
        assert_eq!(session.uploads(), vec![(path, "/tmp/disk.qcow2".to_string())]);

        let calls = session.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0].0, "pvesm");
        assert_eq!(
            calls[0].1,
            vec![
                "alloc",
                "local",
                "100",
                "vm-100-base-disk.qcow2",
                "2048",
                "-format",
                "qcow2"
            ]
        );
        assert_eq!(calls[1].0, "pvesm");
        assert_eq!(calls[1].1, vec!["path", canonical]);
        assert_eq!(calls[2].0, "qemu-img");
        assert_eq!(
            calls[2].1,
            vec![
                "convert",
                "-O",
                "qcow2",
                "/tmp/disk.qcow2",
                "/var/lib/vz/images/100/vm-100-base-disk.qcow2"
            ]
        );
        assert_eq!(calls[3].0, "rm");
        assert_eq!(calls[3].1, vec!["/tmp/disk.qcow2"]);
    }

    #[tokio::test]
    async fn lvm_upload_forces_raw_and_flat_name() {
        let (_dir, path) = temp_image("disk.qcow2", 1024);
        let canonical = "vgdata:vm-100-base-disk";
        let session = FakeSession::with_responses(vec![
            out(&format!("{canonical}\n"), ""),
            out("/dev/vgdata/vm-100-base-disk\n", ""),
            out("", ""),
            out("", ""),
        ]);

        let handle = upload(
            &session,
            StorageBackend::Lvm,
            &request("vgdata", &path, Some(2048)),
        )
        .await
        .unwrap();

        // Requested qcow2, but LVM only does raw — no extension anywhere.
        assert_eq!(handle.as_str(), canonical);
        assert!(!handle.as_str().contains(".qcow2"));
        let calls = session.calls();
        assert_eq!(
            calls[0].1,
            vec![
                "alloc",
                "vgdata",
                "100",
                "vm-100-base-disk",
                "2048",
                "-format",
                "raw"
            ]
        );
        assert_eq!(calls[2].1[1..3], ["-O".to_string(), "raw".to_string()]);
    }

    #[tokio::test]
    async fn size_computed_from_file_rounds_up() {
        // 5 MiB file, no override: 5242880 / 1024 = 5120 KB exactly.
        let (_dir, path) = temp_image("seed.iso", 5 * 1024 * 1024);
        let session = FakeSession::with_responses(vec![
            out("local:100/vm-100-base-disk.qcow2", ""),
            out("/var/lib/vz/images/100/vm-100-base-disk.qcow2", ""),
            out("", ""),
            out("", ""),
        ]);

        upload(&session, StorageBackend::Directory, &request("local", &path, None))
            .await
            .unwrap();

        assert_eq!(session.calls()[0].1[4], "5120");
    }

    #[tokio::test]
    async fn partial_kilobyte_rounds_up() {
        let (_dir, path) = temp_image("seed.iso", 1025);
        let session = FakeSession::with_responses(vec![
            out("local:100/vm-100-base-disk.qcow2", ""),
            out("/x", ""),
            out("", ""),
            out("", ""),
        ]);

        upload(&session, StorageBackend::Directory, &request("local", &path, None))
            .await
            .unwrap();

        assert_eq!(session.calls()[0].1[4], "2");
    }

    #[tokio::test]
    async fn alloc_failure_carries_both_streams_and_stops() {
        let (_dir, path) = temp_image("disk.qcow2", 1024);
        let session = FakeSession::with_responses(vec![out(
            "unexpected output",
            "storage 'local' does not exist\n",
        )]);

        let err = upload(
            &session,
            StorageBackend::Directory,
            &request("local", &path, Some(1024)),
        )
        .await
        .unwrap_err();

        match err {
            DeployError::CommandInvocation {
                context,
                stdout,
                stderr,
            } => {
                assert_eq!(context, "failed to allocate disk");
                assert_eq!(stdout, "unexpected output");
                assert_eq!(stderr, "storage 'local' does not exist\n");
            }
            other => panic!("expected CommandInvocation, got {other:?}"),
        }
        // Fail-fast: nothing after the allocation step ran.
        assert_eq!(session.calls().len(), 1);
    }

    #[tokio::test]
    async fn alloc_stderr_noise_tolerated_when_id_present() {
        let (_dir, path) = temp_image("disk.qcow2", 1024);
        let session = FakeSession::with_responses(vec![
            out(
                "successfully created 'local:100/vm-100-base-disk.qcow2'",
                "WARNING: lvm thin pool nearly full\n",
            ),
            out("/dev/somewhere", ""),
            out("", ""),
            out("", ""),
        ]);

        upload(
            &session,
            StorageBackend::Directory,
            &request("local", &path, Some(1024)),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn alloc_without_stderr_passes_without_id() {
        // Compatibility fallback: quiet stderr counts as success even when
        // stdout does not echo the identifier.
        let (_dir, path) = temp_image("disk.qcow2", 1024);
        let session = FakeSession::with_responses(vec![
            out("", ""),
            out("/dev/somewhere", ""),
            out("", ""),
            out("", ""),
        ]);

        upload(
            &session,
            StorageBackend::Directory,
            &request("local", &path, Some(1024)),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn path_step_stderr_is_fatal() {
        let (_dir, path) = temp_image("disk.qcow2", 1024);
        let session = FakeSession::with_responses(vec![
            out("local:100/vm-100-base-disk.qcow2", ""),
            out("", "no such volume\n"),
        ]);

        let err = upload(
            &session,
            StorageBackend::Directory,
            &request("local", &path, Some(1024)),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DeployError::CommandInvocation { .. }));
        assert_eq!(session.calls().len(), 2);
    }

    #[tokio::test]
    async fn convert_stderr_is_fatal_and_staging_is_left_behind() {
        let (_dir, path) = temp_image("disk.qcow2", 1024);
        let session = FakeSession::with_responses(vec![
            out("local:100/vm-100-base-disk.qcow2", ""),
            out("/dev/somewhere", ""),
            out("", "qemu-img: error while writing\n"),
        ]);

        let err = upload(
            &session,
            StorageBackend::Directory,
            &request("local", &path, Some(1024)),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DeployError::CommandInvocation { .. }));
        // No rm call — the staging artifact stays for inspection.
        assert_eq!(session.calls().len(), 3);
    }

    #[tokio::test]
    async fn cleanup_failure_is_not_an_error() {
        let (_dir, path) = temp_image("disk.qcow2", 1024);
        let session = FakeSession::with_responses(vec![
            out("local:100/vm-100-base-disk.qcow2", ""),
            out("/dev/somewhere", ""),
            out("", ""),
            out("", "rm: cannot remove '/tmp/disk.qcow2': Permission denied\n"),
        ]);

        let handle = upload(
            &session,
            StorageBackend::Directory,
            &request("local", &path, Some(1024)),
        )
        .await
        .unwrap();

        assert_eq!(handle.as_str(), "local:100/vm-100-base-disk.qcow2");
        assert_eq!(session.calls().len(), 4);
    }
}
