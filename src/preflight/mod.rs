//! Preflight checks.
//!
//! Validates host tools, key material and configured paths before a build.
//! Run with `secure-squash-root check` to see everything at once.

mod environment;
mod host_tools;
pub mod types;

use anyhow::{bail, Result};

use crate::config::Config;

pub use types::{CheckResult, CheckStatus, CheckSubject, PreflightReport};

/// Run all preflight checks.
pub fn run_preflight(config: &Config) -> PreflightReport {
    let mut checks = Vec::new();

    tracing::info!("Checking host tools...");
    checks.extend(host_tools::check_host_tools());

    tracing::info!("Checking configured paths...");
    checks.extend(environment::check_environment(config));

    PreflightReport { checks }
}

/// Run preflight, print the report and bail if anything blocks a build.
pub fn run_preflight_or_fail(config: &Config) -> Result<()> {
    let report = run_preflight(config);
    report.print();

    let blocking = report.blocking();
    if !blocking.is_empty() {
        let names: Vec<String> = blocking.iter().map(ToString::to_string).collect();
        bail!("Preflight failed on {}", names.join(", "));
    }
    Ok(())
}
