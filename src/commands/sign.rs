//! Sign command - signs extra files such as the bootloader.

use anyhow::Result;

use crate::config::Config;
use crate::extra::backup_and_sign_extra_files;
use crate::process::SystemRunner;

/// Execute the sign-extra-files command.
pub fn cmd_sign_extra_files(config: &Config) -> Result<()> {
    let count = backup_and_sign_extra_files(&SystemRunner, config)?;
    if count == 0 {
        println!("No extra files configured.");
    } else {
        println!("Signed {} extra file(s).", count);
    }
    Ok(())
}
