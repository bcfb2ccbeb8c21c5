//! Build context shared across the orchestrator.

use std::path::PathBuf;

use crate::config::Config;
use crate::distribution::{Distribution, EFI_KERNELS};
use crate::initramfs::InitramfsBuilder;
use crate::process::CommandRunner;
use crate::slot::Slot;
use crate::variant::{enumerate_variants, KernelDescriptor, KernelVariant, VariantPolicy};

/// Scratch name of the image being built.
pub const TMP_IMAGE: &str = "tmp.squashfs";
/// Scratch name of the executable being assembled.
pub const TMP_EFI: &str = "tmp.efi";

/// Everything one run needs: configuration plus the external collaborators.
pub struct BuildContext<'a> {
    pub config: &'a Config,
    pub runner: &'a dyn CommandRunner,
    pub distribution: &'a dyn Distribution,
    pub initramfs: &'a dyn InitramfsBuilder,
    pub policy: VariantPolicy,
    /// Slot the running system booted from, if known.
    pub current_slot: Option<Slot>,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        config: &'a Config,
        runner: &'a dyn CommandRunner,
        distribution: &'a dyn Distribution,
        initramfs: &'a dyn InitramfsBuilder,
    ) -> Self {
        Self {
            config,
            runner,
            distribution,
            initramfs,
            policy: config.variant_policy(),
            current_slot: None,
        }
    }

    pub fn with_current_slot(mut self, slot: Option<Slot>) -> Self {
        self.current_slot = slot;
        self
    }

    /// `<EFI_PARTITION>/EFI/Linux/<distro-dirname>`
    pub fn out_dir(&self) -> PathBuf {
        self.config
            .efi_partition
            .join(EFI_KERNELS)
            .join(self.distribution.efi_dirname())
    }

    pub fn tmp_image(&self) -> PathBuf {
        self.config.tmp_dir.join(TMP_IMAGE)
    }

    pub fn tmp_efi(&self) -> PathBuf {
        self.config.tmp_dir.join(TMP_EFI)
    }

    /// The four variants of `kernel`, named by the initramfs builder.
    pub fn variants(&self, kernel: &KernelDescriptor) -> [KernelVariant; 4] {
        let base = self.initramfs.file_name(&kernel.kernel, &kernel.preset);
        let label = self.initramfs.display_name(&kernel.kernel, &kernel.preset);
        enumerate_variants(&base, &label)
    }

    /// Final location of `variant` on the EFI partition.
    pub fn efi_path(&self, variant: &KernelVariant) -> PathBuf {
        self.out_dir().join(variant.efi_file_name())
    }
}
