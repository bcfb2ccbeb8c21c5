//! File helpers: writes with parent creation, and moves that never leave a
//! partially written destination behind.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write a file, creating parent directories as needed.
///
/// # Arguments
/// * `path` - Path to the file to write
/// * `content` - Content to write (anything that implements AsRef<[u8]>)
pub fn write_file_with_dirs<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, content: C) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Write a file with specific Unix permissions, creating parent directories as needed.
pub fn write_file_mode<P: AsRef<Path>, C: AsRef<[u8]>>(
    path: P,
    content: C,
    mode: u32,
) -> Result<()> {
    let path = path.as_ref();
    write_file_with_dirs(path, content)?;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    Ok(())
}

/// Hidden sibling of `dst` used while a cross-filesystem copy is in flight.
fn partial_path(dst: &Path) -> PathBuf {
    let name = dst
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dst.with_file_name(format!(".{}.partial", name))
}

/// Move `src` to `dst`, replacing `dst` if it exists.
///
/// A plain rename is tried first. If that fails (typically because `src`
/// lives on another filesystem) the data is copied into a hidden sibling of
/// `dst`, synced, and renamed over `dst`. Either way `dst` only ever holds
/// its old content or the complete new content.
pub fn move_file(src: &Path, dst: &Path) -> Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(e).with_context(|| format!("Cannot move missing file {}", src.display()));
        }
        Err(e) => {
            tracing::debug!(
                "rename {} -> {} failed ({}), copying instead",
                src.display(),
                dst.display(),
                e
            );
        }
    }

    copy_across(src, dst)?;
    discard_source(src);
    Ok(())
}

/// Stream `src` into a hidden sibling of `dst`, sync it, and rename it over
/// `dst`. `src` is left in place.
fn copy_across(src: &Path, dst: &Path) -> Result<()> {
    let partial = partial_path(dst);
    let result = copy_synced(src, &partial).and_then(|()| {
        fs::rename(&partial, dst).with_context(|| {
            format!("Failed to rename {} to {}", partial.display(), dst.display())
        })
    });
    if let Err(e) = result {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }
    sync_parent(dst)
}

fn copy_synced(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
    fs::File::open(dst)
        .and_then(|file| file.sync_all())
        .with_context(|| format!("Failed to sync {}", dst.display()))?;
    Ok(())
}

/// Persist the directory entry created by a rename.
fn sync_parent(path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::File::open(parent)
        .and_then(|dir| dir.sync_all())
        .with_context(|| format!("Failed to sync directory {}", parent.display()))?;
    Ok(())
}

/// Remove `src` once `dst` is committed. Failure is only logged.
fn discard_source(src: &Path) {
    if let Err(e) = fs::remove_file(src) {
        tracing::warn!("Failed to remove {} after copying it: {}", src.display(), e);
    }
}
