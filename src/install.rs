//! Backup-aware installation of signed boot executables.
//!
//! A freshly signed executable always lands at its destination. What
//! happens to the file already there depends on whose slot it belongs to:
//!
//! | Existing file                    | Backup path | Action                     |
//! |----------------------------------|-------------|----------------------------|
//! | same slot, or slot unreadable    | any         | overwrite                  |
//! | other slot                       | none        | overwrite                  |
//! | other slot                       | some        | rotate old file to backup  |
//!
//! A file that cannot be shown to be a healthy other-slot executable is not
//! worth keeping as a fallback.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::artifact::uki::{classify, SlotOwnership};
use crate::common::move_file;
use crate::process::CommandRunner;
use crate::slot::Slot;

/// What to do with an existing destination file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallAction {
    /// Delete the existing file.
    Overwrite,
    /// Move the existing file to the backup path.
    RotateToBackup,
}

/// What [`install`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Destination did not exist.
    Fresh,
    /// Existing file was replaced.
    Overwritten(SlotOwnership),
    /// Existing file (of the given slot) became the backup.
    BackedUp(Slot),
}

/// Pure decision over the classification of the existing file.
pub fn decide(ownership: &SlotOwnership, has_backup: bool) -> InstallAction {
    match ownership {
        SlotOwnership::MatchesSlot | SlotOwnership::Unreadable => InstallAction::Overwrite,
        SlotOwnership::DifferentSlot(_) if !has_backup => InstallAction::Overwrite,
        SlotOwnership::DifferentSlot(_) => InstallAction::RotateToBackup,
    }
}

/// Move the signed executable `src` to `dst`, keeping the previous `dst` as
/// `dst_backup` when it is a healthy executable of another slot.
///
/// `scratch_dir` is used to read the existing file's `.cmdline` section.
pub fn install(
    runner: &dyn CommandRunner,
    scratch_dir: &Path,
    src: &Path,
    dst: &Path,
    slot: &Slot,
    dst_backup: Option<&Path>,
) -> Result<InstallOutcome> {
    let outcome = if dst.exists() {
        let ownership = classify(runner, dst, slot, scratch_dir);
        match (decide(&ownership, dst_backup.is_some()), dst_backup) {
            (InstallAction::RotateToBackup, Some(backup)) => {
                tracing::info!("Moving old efi to backup");
                tracing::debug!("Path: {}", backup.display());
                fs::rename(dst, backup).with_context(|| {
                    format!("Failed to move {} to {}", dst.display(), backup.display())
                })?;
                match ownership {
                    SlotOwnership::DifferentSlot(old) => InstallOutcome::BackedUp(old),
                    other => InstallOutcome::Overwritten(other),
                }
            }
            _ => {
                if dst_backup.is_none() {
                    tracing::debug!("Backup ignored");
                } else {
                    tracing::debug!("Backup slot kept as is");
                }
                fs::remove_file(dst)
                    .with_context(|| format!("Failed to remove {}", dst.display()))?;
                InstallOutcome::Overwritten(ownership)
            }
        }
    } else {
        InstallOutcome::Fresh
    };

    move_file(src, dst)
        .with_context(|| format!("Failed to install {} to {}", src.display(), dst.display()))?;
    Ok(outcome)
}
