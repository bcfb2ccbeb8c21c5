//! Check command - runs preflight checks.

use anyhow::Result;

use crate::config::Config;
use crate::preflight;

/// Execute the check command.
pub fn cmd_check(config: &Config, strict: bool) -> Result<()> {
    if strict {
        preflight::run_preflight_or_fail(config)?;
    } else {
        let report = preflight::run_preflight(config);
        report.print();
        if !report.is_clear() {
            println!("Use --strict to fail the command.");
        }
    }
    Ok(())
}
