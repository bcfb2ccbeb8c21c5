//! Expansion of a physical kernel into its boot variants.
//!
//! Every kernel yields four targets:
//!
//! | Variant        | File name             | Label               |
//! |----------------|-----------------------|---------------------|
//! | Primary        | `base`                | `label`             |
//! | Backup         | `base_backup`         | `label Backup`      |
//! | Volatile       | `base_tmpfs`          | `label tmpfs`       |
//! | VolatileBackup | `base_tmpfs_backup`   | `label tmpfs Backup`|
//!
//! Only Primary and Volatile are ever built. The backup variants are filled
//! by the installer when it rotates a previously installed file aside.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::cmdline::VOLATILE_PARAM;

pub fn backup_file(name: &str) -> String {
    format!("{}_backup", name)
}

pub fn backup_label(label: &str) -> String {
    format!("{} Backup", label)
}

pub fn tmpfs_file(name: &str) -> String {
    format!("{}_tmpfs", name)
}

pub fn tmpfs_label(label: &str) -> String {
    format!("{} tmpfs", label)
}

/// A kernel found by the distribution collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelDescriptor {
    /// Kernel identifier (package base or kernel version).
    pub kernel: String,
    /// Initramfs preset, e.g. `default` or `fallback`.
    pub preset: String,
    /// Kernel version used to build the initramfs.
    pub kver: String,
    pub vmlinuz: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Primary,
    Backup,
    Volatile,
    VolatileBackup,
}

impl Variant {
    /// Extra kernel parameter for this variant; empty unless volatile.
    pub fn cmdline_suffix(self) -> &'static str {
        match self {
            Variant::Volatile | Variant::VolatileBackup => VOLATILE_PARAM,
            Variant::Primary | Variant::Backup => "",
        }
    }

    /// The variant a displaced file of this variant rotates into.
    /// Backups never get a backup of their own.
    pub fn backup(self) -> Option<Variant> {
        match self {
            Variant::Primary => Some(Variant::Backup),
            Variant::Volatile => Some(Variant::VolatileBackup),
            Variant::Backup | Variant::VolatileBackup => None,
        }
    }
}

/// One build target: variant plus its derived file name and label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelVariant {
    pub variant: Variant,
    pub base_name: String,
    pub label: String,
}

impl KernelVariant {
    /// File name on the EFI partition.
    pub fn efi_file_name(&self) -> String {
        format!("{}.efi", self.base_name)
    }

    /// The backup target for this variant, if it has one.
    pub fn backup(&self) -> Option<KernelVariant> {
        self.variant.backup().map(|variant| KernelVariant {
            variant,
            base_name: backup_file(&self.base_name),
            label: backup_label(&self.label),
        })
    }
}

/// Primary, Backup, Volatile and VolatileBackup for one kernel, in that order.
///
/// VolatileBackup is `backup(tmpfs(name))`, and its label nests the same way.
pub fn enumerate_variants(base_name: &str, label: &str) -> [KernelVariant; 4] {
    let primary = KernelVariant {
        variant: Variant::Primary,
        base_name: base_name.to_string(),
        label: label.to_string(),
    };
    let volatile = KernelVariant {
        variant: Variant::Volatile,
        base_name: tmpfs_file(base_name),
        label: tmpfs_label(label),
    };
    // Both primary and volatile have backups by construction.
    let backup = primary.backup().unwrap_or_else(|| primary.clone());
    let volatile_backup = volatile.backup().unwrap_or_else(|| volatile.clone());
    [primary, backup, volatile, volatile_backup]
}

/// Per-build decision on which variants are built and which get backups.
#[derive(Debug, Clone, Default)]
pub struct VariantPolicy {
    ignored: BTreeSet<String>,
    backups_enabled: bool,
}

impl VariantPolicy {
    pub fn new<I, S>(ignored: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored: ignored.into_iter().map(Into::into).collect(),
            backups_enabled: true,
        }
    }

    /// Disable backup rotation for every variant.
    pub fn without_backups(mut self) -> Self {
        self.backups_enabled = false;
        self
    }

    pub fn is_ignored(&self, base_name: &str) -> bool {
        self.ignored.contains(base_name)
    }

    /// Where a displaced file of `variant` should go, if anywhere.
    pub fn backup_for(&self, variant: &KernelVariant) -> Option<KernelVariant> {
        if !self.backups_enabled {
            return None;
        }
        variant
            .backup()
            .filter(|backup| !self.is_ignored(&backup.base_name))
    }

    /// True when neither the Primary nor the Volatile variant would be built.
    pub fn kernel_skipped(&self, base_name: &str) -> bool {
        self.is_ignored(base_name) && self.is_ignored(&tmpfs_file(base_name))
    }
}
