//! Show command - displays information.

use anyhow::Result;

use crate::cmdline;
use crate::config::Config;

/// Show target for the show command.
pub enum ShowTarget {
    /// Show configuration
    Config,
    /// Show the booted slot and root hash
    Slot,
}

/// Execute the show command.
pub fn cmd_show(target: ShowTarget, config: &Config) -> Result<()> {
    match target {
        ShowTarget::Config => config.print(),
        ShowTarget::Slot => {
            let Some(proc_cmdline) = cmdline::read_proc_cmdline() else {
                anyhow::bail!("Cannot read /proc/cmdline");
            };
            match cmdline::current_slot(&proc_cmdline) {
                Some(slot) => println!("Booted slot: {}", slot),
                None => println!("Booted slot: unknown"),
            }
            println!(
                "Root hash:   {}",
                cmdline::root_hash(&proc_cmdline).unwrap_or("unknown")
            );
            println!("Slot policy: {}", config.slot_policy);
        }
    }
    Ok(())
}
