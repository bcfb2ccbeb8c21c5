//! List command - shows every boot executable and its slot.

use anyhow::Result;

use crate::build::{list_variants, BuildContext};
use crate::config::Config;
use crate::process::SystemRunner;

/// Execute the list command.
pub fn cmd_list(config: &Config) -> Result<()> {
    let runner = SystemRunner;
    let (distribution, initramfs) = super::host_collaborators(config);
    let ctx = BuildContext::new(config, &runner, &distribution, &initramfs);

    for status in list_variants(&ctx)? {
        println!(
            "{:<32} {:<40} {}",
            status.variant.efi_file_name(),
            status.variant.label,
            status.state
        );
    }
    Ok(())
}
