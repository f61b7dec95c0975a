//! External programs needed for sparse images.
//!
//! [`ImageTools`] is the seam: [`SystemTools`] shells out to `simg2img`,
//! `mount` and `umount`, tests substitute a fake. [`MountGuard`] ties a
//! loop mount to a scope so the unmount runs on every exit path.

use crate::config::ToolConfig;
use crate::error::{DecodeError, DecodeErrorKind, DecodeOutcome};
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

pub trait ImageTools {
    /// Converts an Android sparse image into a raw filesystem image.
    fn sparse_to_raw(&self, sparse: &Path, raw: &Path) -> DecodeOutcome<()>;

    /// Loop-mounts `image` read-only at `mountpoint`.
    fn mount_readonly(&self, image: &Path, mountpoint: &Path) -> DecodeOutcome<()>;

    fn unmount(&self, mountpoint: &Path) -> DecodeOutcome<()>;
}

/// [`ImageTools`] backed by subprocesses.
pub struct SystemTools {
    config: ToolConfig,
}

impl SystemTools {
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    /// Runs `program` to completion. A non-zero exit is mapped to an error
    /// kind by `on_failure`, which sees the captured stderr.
    fn run_command(
        &self,
        program: &Path,
        args: &[&OsStr],
        sudo: bool,
        on_failure: fn(&str) -> DecodeErrorKind,
    ) -> DecodeOutcome<()> {
        let mut command = if sudo {
            let mut c = Command::new("sudo");
            c.arg(program);
            c
        } else {
            Command::new(program)
        };
        command.args(args);

        log::debug!("Running {:?}", command);
        let output = command.output().map_err(|e| spawn_error(program, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(DecodeError::new(
                on_failure(&stderr),
                format!(
                    "{} exited with {}: {}",
                    program.display(),
                    output.status,
                    stderr
                ),
            ));
        }

        Ok(())
    }
}

impl ImageTools for SystemTools {
    fn sparse_to_raw(&self, sparse: &Path, raw: &Path) -> DecodeOutcome<()> {
        self.run_command(
            &self.config.simg2img,
            &[sparse.as_os_str(), raw.as_os_str()],
            false,
            |_| DecodeErrorKind::CorruptInput,
        )
    }

    fn mount_readonly(&self, image: &Path, mountpoint: &Path) -> DecodeOutcome<()> {
        self.run_command(
            &self.config.mount,
            &[
                OsStr::new("-o"),
                OsStr::new("loop,ro"),
                image.as_os_str(),
                mountpoint.as_os_str(),
            ],
            self.config.use_sudo,
            mount_failure_kind,
        )
    }

    fn unmount(&self, mountpoint: &Path) -> DecodeOutcome<()> {
        self.run_command(
            &self.config.umount,
            &[mountpoint.as_os_str()],
            self.config.use_sudo,
            mount_failure_kind,
        )
    }
}

fn spawn_error(program: &Path, err: io::Error) -> DecodeError {
    let kind = match err.kind() {
        io::ErrorKind::PermissionDenied => DecodeErrorKind::PermissionDenied,
        _ => DecodeErrorKind::ToolUnavailable,
    };
    DecodeError::new(
        kind,
        format!("failed to execute {}: {}", program.display(), err),
    )
}

fn mount_failure_kind(stderr: &str) -> DecodeErrorKind {
    let lower = stderr.to_lowercase();
    if lower.contains("permission denied")
        || lower.contains("only root")
        || lower.contains("must be superuser")
        || lower.contains("operation not permitted")
    {
        DecodeErrorKind::PermissionDenied
    } else {
        DecodeErrorKind::ToolUnavailable
    }
}

/// An active read-only mount. Unmounts and removes the mount point on drop.
pub struct MountGuard<'a> {
    tools: &'a dyn ImageTools,
    mountpoint: PathBuf,
    mounted: bool,
}

impl<'a> MountGuard<'a> {
    /// Creates the mount point and mounts `image` on it. A failed mount is an
    /// error; the mount point is removed again.
    pub fn mount(tools: &'a dyn ImageTools, image: &Path, mountpoint: &Path) -> DecodeOutcome<Self> {
        fs::create_dir_all(mountpoint)
            .map_err(|e| DecodeError::io("Failed to create mount point", mountpoint, e))?;

        if let Err(e) = tools.mount_readonly(image, mountpoint) {
            let _ = fs::remove_dir(mountpoint);
            return Err(e);
        }

        Ok(Self {
            tools,
            mountpoint: mountpoint.to_path_buf(),
            mounted: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.mountpoint
    }

    /// Unmounts now and reports the outcome.
    pub fn release(mut self) -> DecodeOutcome<()> {
        self.unmount_inner()
    }

    fn unmount_inner(&mut self) -> DecodeOutcome<()> {
        if !self.mounted {
            return Ok(());
        }
        self.mounted = false;
        self.tools.unmount(&self.mountpoint)?;
        fs::remove_dir(&self.mountpoint)
            .map_err(|e| DecodeError::io("Failed to remove mount point", &self.mountpoint, e))
    }
}

impl Drop for MountGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.unmount_inner() {
            log::warn!(
                "Failed to release mount at {}: {}",
                self.mountpoint.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeTools;
    use tempfile::TempDir;

    #[test]
    fn test_failure_kind_from_stderr() {
        assert_eq!(
            mount_failure_kind("mount: only root can use \"--options\" option"),
            DecodeErrorKind::PermissionDenied
        );
        assert_eq!(
            mount_failure_kind("mount: /mnt: permission denied."),
            DecodeErrorKind::PermissionDenied
        );
        assert_eq!(
            mount_failure_kind("mount: /mnt: failed to setup loop device"),
            DecodeErrorKind::ToolUnavailable
        );
    }

    #[test]
    fn test_missing_program_is_tool_unavailable() {
        let tools = SystemTools::new(ToolConfig {
            simg2img: PathBuf::from("/definitely/not/a/real/simg2img"),
            ..ToolConfig::default()
        });
        let err = tools
            .sparse_to_raw(Path::new("in.img"), Path::new("out.img"))
            .unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::ToolUnavailable);
    }

    #[test]
    fn test_guard_unmounts_on_drop() {
        let dir = TempDir::new().unwrap();
        let tools = FakeTools::default();
        let mountpoint = dir.path().join("mnt");

        {
            let guard = MountGuard::mount(&tools, Path::new("raw.img"), &mountpoint).unwrap();
            assert!(guard.path().is_dir());
        }

        assert_eq!(tools.unmount_calls(), 1);
        assert!(!mountpoint.exists());
    }

    #[test]
    fn test_release_unmounts_once() {
        let dir = TempDir::new().unwrap();
        let tools = FakeTools::default();
        let mountpoint = dir.path().join("mnt");

        let guard = MountGuard::mount(&tools, Path::new("raw.img"), &mountpoint).unwrap();
        guard.release().unwrap();

        assert_eq!(tools.unmount_calls(), 1);
    }

    #[test]
    fn test_failed_mount_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let tools = FakeTools::failing_mount(DecodeErrorKind::PermissionDenied);
        let mountpoint = dir.path().join("mnt");

        let err = MountGuard::mount(&tools, Path::new("raw.img"), &mountpoint)
            .err()
            .unwrap();
        assert_eq!(err.kind, DecodeErrorKind::PermissionDenied);
        assert!(!mountpoint.exists());
        assert_eq!(tools.unmount_calls(), 0);
    }
}
