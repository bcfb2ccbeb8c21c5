//! The trusted scratch directory.
//!
//! Unsigned executables, the cmdline scratch file and the new root image are
//! staged here before they are committed. The directory is owner-only.

use anyhow::{bail, Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::{DirBuilderExt, MetadataExt, PermissionsExt};
use std::path::Path;

/// Create `dir` if needed and make it accessible to its owner only.
///
/// Refuses a path that exists but is a symlink or is owned by someone else;
/// files staged here are signed later and must not be swappable.
pub fn prepare_scratch_dir(dir: &Path) -> Result<()> {
    match fs::symlink_metadata(dir) {
        Ok(meta) => check_scratch_meta(dir, &meta)?,
        Err(e) if e.kind() == ErrorKind::NotFound => create_scratch_dir(dir)?,
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to inspect {}", dir.display()));
        }
    }
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
        .with_context(|| format!("Failed to restrict permissions on {}", dir.display()))?;
    // The path may have been swapped between the checks above and chmod.
    let meta = fs::symlink_metadata(dir)
        .with_context(|| format!("Failed to inspect {}", dir.display()))?;
    check_scratch_meta(dir, &meta)
}

/// Create the final path component with `mkdir`, never following a symlink.
/// Losing a creation race re-runs the ownership checks on whatever won.
fn create_scratch_dir(dir: &Path) -> Result<()> {
    if let Some(parent) = dir.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    match fs::DirBuilder::new().mode(0o700).create(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let meta = fs::symlink_metadata(dir)
                .with_context(|| format!("Failed to inspect {}", dir.display()))?;
            check_scratch_meta(dir, &meta)
        }
        Err(e) => Err(e)
            .with_context(|| format!("Failed to create scratch directory {}", dir.display())),
    }
}

fn check_scratch_meta(dir: &Path, meta: &fs::Metadata) -> Result<()> {
    if meta.file_type().is_symlink() {
        bail!("Scratch path {} is a symlink, refusing to use it", dir.display());
    }
    if !meta.is_dir() {
        bail!("Scratch path {} exists and is not a directory", dir.display());
    }
    if let Some(uid) = current_uid() {
        if meta.uid() != uid {
            bail!(
                "Scratch directory {} is owned by uid {}, refusing to use it",
                dir.display(),
                meta.uid()
            );
        }
    }
    Ok(())
}

/// Effective uid of this process; `/proc/self` is owned by it.
fn current_uid() -> Option<u32> {
    fs::metadata("/proc/self").ok().map(|m| m.uid())
}

/// Remove a scratch file, ignoring a missing one.
pub fn remove_scratch_file(path: &Path) {
    let _ = fs::remove_file(path);
}
