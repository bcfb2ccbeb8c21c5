//! Checks of the configured paths and key material.

use std::path::Path;

use crate::artifact::uki::{DB_CERT, DB_KEY, OS_RELEASE};
use crate::config::Config;

use super::types::{CheckResult, CheckSubject};

const KEYS: &str = "SECURE_BOOT_KEYS";

/// Check every path the build reads or writes.
pub fn check_environment(config: &Config) -> Vec<CheckResult> {
    let key_file = |file: &'static str| CheckSubject::KeyFile { key: KEYS, file };
    let mut results = vec![
        check_dir(CheckSubject::ConfigKey("ROOT_MOUNT"), &config.root_mount),
        check_dir(CheckSubject::ConfigKey("EFI_PARTITION"), &config.efi_partition),
        check_file(CheckSubject::ConfigKey("EFI_STUB"), &config.efi_stub),
        check_file(key_file(DB_KEY), &config.secure_boot_keys.join(DB_KEY)),
        check_file(key_file(DB_CERT), &config.secure_boot_keys.join(DB_CERT)),
        check_file(CheckSubject::HostFile(OS_RELEASE), Path::new(OS_RELEASE)),
    ];

    let extra = CheckSubject::ConfigKey("EXTRA_SIGN");
    results.push(match config.extra_sign_entries() {
        Ok(entries) if entries.is_empty() => CheckResult::ok(extra, "no entries"),
        Ok(entries) => {
            let missing: Vec<String> = entries
                .iter()
                .filter(|e| !e.source.is_file())
                .map(|e| e.source.display().to_string())
                .collect();
            if missing.is_empty() {
                CheckResult::ok(extra, format!("{} entries", entries.len()))
            } else {
                // Only `sign-extra-files` reads these.
                CheckResult::warn(extra, format!("missing source {}", missing.join(", ")))
            }
        }
        Err(e) => CheckResult::blocking(extra, e.to_string()),
    });

    results.push(CheckResult::ok(
        CheckSubject::ConfigKey("IGNORE_KERNEL_EFIS"),
        config.ignore_kernel_efis.join(", "),
    ));

    results
}

fn check_dir(subject: CheckSubject, path: &Path) -> CheckResult {
    if path.is_dir() {
        CheckResult::ok(subject, path.display().to_string())
    } else {
        CheckResult::blocking(subject, format!("{} is not a directory", path.display()))
    }
}

fn check_file(subject: CheckSubject, path: &Path) -> CheckResult {
    if path.is_file() {
        CheckResult::ok(subject, path.display().to_string())
    } else {
        CheckResult::blocking(subject, format!("{} not found", path.display()))
    }
}
