//! Kernel command line parameters owned by secure_squash_root.
//!
//! The parameter names are a contract with the initramfs hook that mounts
//! the verity-protected image at boot; they must stay bit-exact.

use std::path::Path;

use crate::slot::Slot;

/// `secure_squash_root_slot=<slot>`
pub const SLOT_PARAM: &str = "secure_squash_root_slot";
/// `secure_squash_root_hash=<root hash>`
pub const HASH_PARAM: &str = "secure_squash_root_hash";
/// Switch present only on volatile (tmpfs overlay) variants.
pub const VOLATILE_PARAM: &str = "secure_squash_root_volatile";

/// Read the booted kernel command line.
///
/// Returns `None` if `/proc/cmdline` cannot be read; an unknown booted slot
/// is a normal state (e.g. first install from a rescue system).
pub fn read_proc_cmdline() -> Option<String> {
    read_cmdline_from(Path::new("/proc/cmdline"))
}

fn read_cmdline_from(path: &Path) -> Option<String> {
    match std::fs::read(path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            tracing::debug!("Cannot read {}: {}", path.display(), e);
            None
        }
    }
}

/// Extract the slot from a command line.
///
/// The first `secure_squash_root_slot=` parameter wins; its value is
/// lower-cased. A missing parameter, an empty value or a value that is not a
/// valid slot token all yield `None`.
pub fn current_slot(cmdline: &str) -> Option<Slot> {
    let prefix = format!("{}=", SLOT_PARAM);
    let value = cmdline
        .split(|c: char| c.is_whitespace() || c == '\0')
        .find_map(|param| param.strip_prefix(prefix.as_str()))?;
    Slot::new(value.to_lowercase()).ok()
}

/// Extract the root hash from a command line.
pub fn root_hash(cmdline: &str) -> Option<&str> {
    let prefix = format!("{}=", HASH_PARAM);
    cmdline
        .split(|c: char| c.is_whitespace() || c == '\0')
        .find_map(|param| param.strip_prefix(prefix.as_str()))
        .filter(|v| !v.is_empty())
}

/// Compose the command line embedded into a boot executable.
///
/// `base + " " + volatile + " " + slot param + " " + hash param`. When
/// `volatile` is empty this leaves two spaces after `base`; the output is
/// kept byte-identical to what earlier releases embedded.
pub fn compose(base: &str, volatile: &str, slot: &Slot, root_hash: &str) -> String {
    format!(
        "{} {} {}={} {}={}",
        base, volatile, SLOT_PARAM, slot, HASH_PARAM, root_hash
    )
}
