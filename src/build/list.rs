//! Status of every boot executable the build would produce.

use anyhow::Result;
use std::fmt;
use std::path::PathBuf;

use super::context::BuildContext;
use crate::artifact::uki::read_embedded_cmdline;
use crate::cmdline;
use crate::common::prepare_scratch_dir;
use crate::slot::Slot;
use crate::variant::KernelVariant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantState {
    /// Listed in `IGNORE_KERNEL_EFIS`.
    Ignored,
    /// Not on the EFI partition.
    Missing,
    /// Present; `None` when its slot cannot be read.
    Installed(Option<Slot>),
}

impl fmt::Display for VariantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantState::Ignored => f.write_str("ignored"),
            VariantState::Missing => f.write_str("missing"),
            VariantState::Installed(Some(slot)) => write!(f, "slot {}", slot),
            VariantState::Installed(None) => f.write_str("unreadable"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VariantStatus {
    pub variant: KernelVariant,
    pub path: PathBuf,
    pub state: VariantState,
}

/// Every variant of every kernel, in build order, with its on-disk state.
pub fn list_variants(ctx: &BuildContext<'_>) -> Result<Vec<VariantStatus>> {
    prepare_scratch_dir(&ctx.config.tmp_dir)?;

    let mut statuses = Vec::new();
    for kernel in ctx.distribution.kernels()? {
        for variant in ctx.variants(&kernel) {
            let path = ctx.efi_path(&variant);
            let state = if ctx.policy.is_ignored(&variant.base_name) {
                VariantState::Ignored
            } else if !path.exists() {
                VariantState::Missing
            } else {
                let slot = read_embedded_cmdline(ctx.runner, &path, &ctx.config.tmp_dir)
                    .ok()
                    .and_then(|text| cmdline::current_slot(&text));
                VariantState::Installed(slot)
            };
            statuses.push(VariantStatus { variant, path, state });
        }
    }
    Ok(statuses)
}
