//! Host tool availability checks.

use crate::process;

use super::types::{CheckResult, CheckSubject};

/// Tools the build invokes, with the package that usually ships them.
pub const REQUIRED_TOOLS: [(&str, &str); 5] = [
    ("mksquashfs", "squashfs-tools"),
    ("veritysetup", "cryptsetup"),
    ("objcopy", "binutils"),
    ("sbsign", "sbsigntools"),
    ("dracut", "dracut"),
];

pub fn check_host_tools() -> Vec<CheckResult> {
    REQUIRED_TOOLS
        .iter()
        .map(|&(tool, package)| check_tool(tool, package))
        .collect()
}

fn check_tool(tool: &'static str, package: &str) -> CheckResult {
    let subject = CheckSubject::Tool(tool);
    match process::which(tool) {
        Some(path) => CheckResult::ok(subject, path),
        None => CheckResult::blocking(subject, format!("not on PATH, install '{}'", package)),
    }
}
