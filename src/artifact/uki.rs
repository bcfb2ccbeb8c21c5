//! UKI (Unified Kernel Image) assembly and signing.
//!
//! A boot executable is the systemd EFI stub with four sections appended by
//! `objcopy`, then signed with `sbsign`:
//!
//! | Section    | Source            | VMA         |
//! |------------|-------------------|-------------|
//! | `.osrel`   | `/etc/os-release` | `0x20000`   |
//! | `.cmdline` | scratch file      | `0x30000`   |
//! | `.linux`   | vmlinuz           | `0x2000000` |
//! | `.initrd`  | initramfs         | `0x3000000` |
//!
//! The `.cmdline` section is the only record of which slot and root hash an
//! installed executable belongs to; [`classify`] reads it back.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cmdline;
use crate::common::{remove_scratch_file, write_file_mode};
use crate::config::Config;
use crate::process::{Cmd, CommandRunner};
use crate::slot::Slot;

/// OS metadata embedded as `.osrel`.
pub const OS_RELEASE: &str = "/etc/os-release";

/// Key pair file names inside the secure boot key directory.
pub const DB_KEY: &str = "db.key";
pub const DB_CERT: &str = "db.crt";

/// Scratch file name for the composed cmdline.
pub const CMDLINE_FILE: &str = "cmdline";
/// Scratch file name for a cmdline section read back from an installed file.
const CMDLINE_DUMP_FILE: &str = "cmdline_dump";

/// A PE section added to the stub.
struct Section {
    name: &'static str,
    vma: &'static str,
}

const OSREL: Section = Section { name: ".osrel", vma: "0x20000" };
const CMDLINE: Section = Section { name: ".cmdline", vma: "0x30000" };
const LINUX: Section = Section { name: ".linux", vma: "0x2000000" };
const INITRD: Section = Section { name: ".initrd", vma: "0x3000000" };

/// Path of the scratch cmdline file under `tmp_dir`.
pub fn cmdline_path(tmp_dir: &Path) -> PathBuf {
    tmp_dir.join(CMDLINE_FILE)
}

/// Embed os-release, cmdline, kernel and initramfs into `stub`, writing the
/// unsigned result to `out`.
pub fn create_efi_executable(
    runner: &dyn CommandRunner,
    stub: &Path,
    cmdline_file: &Path,
    vmlinuz: &Path,
    initramfs: &Path,
    out: &Path,
) -> Result<()> {
    let mut cmd = Cmd::new("objcopy");
    for (section, source) in [
        (OSREL, Path::new(OS_RELEASE)),
        (CMDLINE, cmdline_file),
        (LINUX, vmlinuz),
        (INITRD, initramfs),
    ] {
        cmd = cmd
            .arg("--add-section")
            .arg(format!("{}={}", section.name, source.display()))
            .arg("--change-section-vma")
            .arg(format!("{}={}", section.name, section.vma));
    }
    let cmd = cmd
        .arg_path(stub)
        .arg_path(out)
        .error_msg(format!("Failed to assemble {}", out.display()));

    runner.run(&cmd)?;
    Ok(())
}

/// Sign `in_path` into `out_path` with `db.key`/`db.crt` from `key_dir`.
///
/// `in_path` and `out_path` may be the same file.
pub fn sign(runner: &dyn CommandRunner, key_dir: &Path, in_path: &Path, out_path: &Path) -> Result<()> {
    let cmd = Cmd::new("sbsign")
        .arg("--key")
        .arg_path(&key_dir.join(DB_KEY))
        .arg("--cert")
        .arg_path(&key_dir.join(DB_CERT))
        .arg("--output")
        .arg_path(out_path)
        .arg_path(in_path)
        .error_msg(format!("Failed to sign {}", in_path.display()));

    runner.run(&cmd)?;
    Ok(())
}

/// What goes into one boot executable.
#[derive(Debug, Clone)]
pub struct KernelImage<'a> {
    pub vmlinuz: &'a Path,
    pub initramfs: &'a Path,
    pub slot: &'a Slot,
    pub root_hash: &'a str,
    /// Variant-specific parameter, empty for non-volatile variants.
    pub cmdline_add: &'a str,
}

/// Compose the cmdline, assemble the executable into `out` and sign it in
/// place.
///
/// `out` should live in the trusted scratch directory. If assembly or
/// signing fails, `out` is removed before the error is returned.
pub fn build_and_sign_kernel(
    runner: &dyn CommandRunner,
    config: &Config,
    image: &KernelImage<'_>,
    out: &Path,
) -> Result<()> {
    let cmdline_text = cmdline::compose(&config.cmdline, image.cmdline_add, image.slot, image.root_hash);
    let cmdline_file = cmdline_path(&config.tmp_dir);
    tracing::debug!("Embedded cmdline: {}", cmdline_text);
    write_file_mode(&cmdline_file, &cmdline_text, 0o600)?;

    let result = create_efi_executable(
        runner,
        &config.efi_stub,
        &cmdline_file,
        image.vmlinuz,
        image.initramfs,
        out,
    )
    .and_then(|()| sign(runner, &config.secure_boot_keys, out, out));

    if result.is_err() {
        remove_scratch_file(out);
    }
    result
}

/// Read the `.cmdline` section of an existing executable.
///
/// The section is dumped into `scratch_dir`; `efi` itself is never written.
pub fn read_embedded_cmdline(runner: &dyn CommandRunner, efi: &Path, scratch_dir: &Path) -> Result<String> {
    let dump = scratch_dir.join(CMDLINE_DUMP_FILE);
    remove_scratch_file(&dump);

    let cmd = Cmd::new("objcopy")
        .args(["-O", "binary", "--only-section=.cmdline"])
        .arg_path(efi)
        .arg_path(&dump)
        .error_msg(format!("Failed to read .cmdline of {}", efi.display()));
    let result = runner.run(&cmd).and_then(|_| {
        fs::read(&dump).with_context(|| format!("Failed to read {}", dump.display()))
    });
    remove_scratch_file(&dump);

    Ok(String::from_utf8_lossy(&result?).into_owned())
}

/// Relation of an installed executable to the slot being installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotOwnership {
    /// Built for the slot being installed now.
    MatchesSlot,
    /// A healthy executable of another slot; worth keeping as a fallback.
    DifferentSlot(Slot),
    /// Section missing, unreadable or without a slot parameter.
    Unreadable,
}

/// Classify `efi` against `slot`.
pub fn classify(runner: &dyn CommandRunner, efi: &Path, slot: &Slot, scratch_dir: &Path) -> SlotOwnership {
    let text = match read_embedded_cmdline(runner, efi, scratch_dir) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!("Cannot read slot of {}: {:#}", efi.display(), e);
            return SlotOwnership::Unreadable;
        }
    };
    match cmdline::current_slot(&text) {
        Some(found) if &found == slot => SlotOwnership::MatchesSlot,
        Some(found) => SlotOwnership::DifferentSlot(found),
        None => {
            tracing::debug!("No slot parameter in {}", efi.display());
            SlotOwnership::Unreadable
        }
    }
}
