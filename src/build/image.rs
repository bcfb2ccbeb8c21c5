//! The full build: root image, then every kernel's boot executables, then
//! the image swap.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use super::context::BuildContext;
use crate::artifact::squashfs::{build_image, slot_image_path, verity_image_path, ROOT_HASH_FILE};
use crate::artifact::uki::{build_and_sign_kernel, KernelImage};
use crate::common::{move_file, prepare_scratch_dir, remove_scratch_file, write_file_with_dirs};
use crate::install::{install, InstallOutcome};
use crate::slot::Slot;
use crate::timing::Timer;
use crate::variant::{KernelDescriptor, KernelVariant};

/// One installed boot executable.
#[derive(Debug, Clone)]
pub struct InstalledVariant {
    pub label: String,
    pub file_name: String,
    pub outcome: InstallOutcome,
}

/// What a successful build produced.
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub slot: Slot,
    pub root_hash: String,
    pub installed: Vec<InstalledVariant>,
    /// Kernels skipped because all their built variants are ignored.
    pub skipped_kernels: Vec<String>,
}

/// Build the verity root image and sign and install boot executables for
/// every kernel.
///
/// The image lands at `<ROOT_MOUNT>/image_<slot>.squashfs` only after every
/// executable referencing its root hash is installed. Any error aborts the
/// run and leaves the live image alone.
pub fn create_image_and_sign_kernel(ctx: &BuildContext<'_>) -> Result<BuildSummary> {
    let config = ctx.config;
    prepare_scratch_dir(&config.tmp_dir)?;

    let slot = config.slot_policy.allocate(ctx.current_slot.as_ref());
    let out_dir = ctx.out_dir();
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    tracing::info!("Using slot {} for new image", slot);

    let kernels = ctx.distribution.kernels()?;

    let timer = Timer::start("Root image");
    let tmp_image = ctx.tmp_image();
    let root_hash = build_image(
        ctx.runner,
        &config.include_dirs,
        &config.exclude_dirs,
        &tmp_image,
        &config.root_mount,
        &config.efi_partition,
    )?;
    timer.finish();
    write_file_with_dirs(config.root_mount.join(ROOT_HASH_FILE), &root_hash)?;
    tracing::debug!("Calculated root hash: {}", root_hash);

    let mut installed = Vec::new();
    let mut skipped_kernels = Vec::new();

    for kernel in &kernels {
        let [primary, _, volatile, _] = ctx.variants(kernel);
        if ctx.policy.kernel_skipped(&primary.base_name) {
            tracing::info!("Skipping {}: all variants ignored", primary.label);
            skipped_kernels.push(primary.base_name);
            continue;
        }

        let timer = Timer::start(&primary.label);
        tracing::info!("Create initramfs for {}", primary.label);
        let initramfs = ctx.initramfs.build_initramfs(ctx.runner, kernel)?;

        let mut result = Ok(());
        for variant in [&primary, &volatile] {
            match build_and_install_variant(ctx, kernel, &initramfs, &slot, &root_hash, variant) {
                Ok(Some(done)) => installed.push(done),
                Ok(None) => {}
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        remove_scratch_file(&initramfs);
        result?;
        timer.finish();
    }

    commit_image(&tmp_image, &config.root_mount, &slot)?;
    Ok(BuildSummary {
        slot,
        root_hash,
        installed,
        skipped_kernels,
    })
}

/// Assemble `variant` in the scratch directory and install it, or do nothing
/// if it is ignored.
fn build_and_install_variant(
    ctx: &BuildContext<'_>,
    kernel: &KernelDescriptor,
    initramfs: &Path,
    slot: &Slot,
    root_hash: &str,
    variant: &KernelVariant,
) -> Result<Option<InstalledVariant>> {
    if ctx.policy.is_ignored(&variant.base_name) {
        tracing::debug!("{} ignored", variant.base_name);
        return Ok(None);
    }
    tracing::info!("Processing {}", variant.label);

    let out = ctx.efi_path(variant);
    let backup_out = ctx.policy.backup_for(variant).map(|b| ctx.efi_path(&b));
    tracing::debug!("Write efi to {}", out.display());

    let tmp_efi = ctx.tmp_efi();
    build_and_sign_kernel(
        ctx.runner,
        ctx.config,
        &KernelImage {
            vmlinuz: &kernel.vmlinuz,
            initramfs,
            slot,
            root_hash,
            cmdline_add: variant.variant.cmdline_suffix(),
        },
        &tmp_efi,
    )?;

    let outcome = install(
        ctx.runner,
        &ctx.config.tmp_dir,
        &tmp_efi,
        &out,
        slot,
        backup_out.as_deref(),
    )?;

    Ok(Some(InstalledVariant {
        label: variant.label.clone(),
        file_name: variant.efi_file_name(),
        outcome,
    }))
}

/// Move the finished image and its hash device to their slot names.
fn commit_image(tmp_image: &Path, root_mount: &Path, slot: &Slot) -> Result<()> {
    let image = slot_image_path(root_mount, slot);
    tracing::debug!("Moving image to {}", image.display());
    move_file(tmp_image, &image)?;
    move_file(&verity_image_path(tmp_image), &verity_image_path(&image))?;
    Ok(())
}
