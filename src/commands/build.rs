//! Build command - builds the image and installs boot executables.

use anyhow::Result;

use crate::build::{create_image_and_sign_kernel, BuildContext};
use crate::config::Config;
use crate::install::InstallOutcome;
use crate::preflight;
use crate::process::SystemRunner;
use crate::timing::Timer;

/// Execute the build command.
pub fn cmd_build(config: &Config, skip_preflight: bool) -> Result<()> {
    if !skip_preflight {
        preflight::run_preflight_or_fail(config)?;
    }

    let timer = Timer::start("Build");
    let runner = SystemRunner;
    let (distribution, initramfs) = super::host_collaborators(config);
    let ctx = BuildContext::new(config, &runner, &distribution, &initramfs)
        .with_current_slot(super::booted_slot());

    let summary = create_image_and_sign_kernel(&ctx)?;
    timer.finish();

    println!();
    println!("=== Build Complete ===");
    println!("  Slot:      {}", summary.slot);
    println!("  Root hash: {}", summary.root_hash);
    for installed in &summary.installed {
        let note = match &installed.outcome {
            InstallOutcome::Fresh => "new".to_string(),
            InstallOutcome::Overwritten(_) => "replaced".to_string(),
            InstallOutcome::BackedUp(old) => format!("previous slot {} kept as backup", old),
        };
        println!("  {} ({})", installed.file_name, note);
    }
    for kernel in &summary.skipped_kernels {
        println!("  {} skipped", kernel);
    }
    Ok(())
}
