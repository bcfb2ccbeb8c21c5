//! Signing of extra files (bootloader, shell, drivers) listed under
//! `[EXTRA_SIGN]`.
//!
//! These files are not slot-scoped: an existing destination is always
//! rotated to `<stem>_backup<.ext>` before the new signature is written.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::artifact::uki::sign;
use crate::config::{Config, ExtraSignEntry};
use crate::process::CommandRunner;
use crate::variant::backup_file;

/// Backup path for an extra file: `dir/name.efi` -> `dir/name_backup.efi`.
pub fn backup_path(dest: &Path) -> PathBuf {
    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match dest.extension() {
        Some(ext) => format!("{}.{}", backup_file(&stem), ext.to_string_lossy()),
        None => backup_file(&stem),
    };
    dest.with_file_name(name)
}

/// Rotate an existing `dest` to its backup, then sign `source` into `dest`.
pub fn backup_and_sign(runner: &dyn CommandRunner, key_dir: &Path, source: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        let backup = backup_path(dest);
        tracing::debug!("Backing up {} to {}", dest.display(), backup.display());
        fs::rename(dest, &backup)
            .with_context(|| format!("Failed to move {} to {}", dest.display(), backup.display()))?;
    }
    sign(runner, key_dir, source, dest)
}

fn sign_entry(runner: &dyn CommandRunner, key_dir: &Path, entry: &ExtraSignEntry) -> Result<()> {
    tracing::info!("Signing {}...", entry.name);
    tracing::debug!(
        "Sign file '{}' to '{}'",
        entry.source.display(),
        entry.dest.display()
    );
    if let Some(parent) = entry.dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    backup_and_sign(runner, key_dir, &entry.source, &entry.dest)
}

/// Sign every configured extra file.
///
/// All entries are parsed before the first file is touched.
pub fn backup_and_sign_extra_files(runner: &dyn CommandRunner, config: &Config) -> Result<usize> {
    let entries = config.extra_sign_entries()?;
    for entry in &entries {
        sign_entry(runner, &config.secure_boot_keys, entry)
            .with_context(|| format!("Failed to sign extra file '{}'", entry.name))?;
    }
    Ok(entries.len())
}
