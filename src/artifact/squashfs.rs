//! Root filesystem image: squashfs of the live root plus a dm-verity hash
//! device.
//!
//! ```text
//! /  (live root, filtered by INCLUDE_DIRS / EXCLUDE_DIRS)
//!         ↓  mksquashfs
//! <TMPDIR>/tmp.squashfs
//!         ↓  veritysetup format
//! <TMPDIR>/tmp.squashfs.verity  + root hash
//!         ↓  (after every boot executable is installed)
//! <ROOT_MOUNT>/image_<slot>.squashfs{,.verity}
//! ```
//!
//! The root hash is the value every boot executable of the build embeds.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

use crate::process::{Cmd, CommandRunner};
use crate::slot::Slot;

/// Suffix of the hash device next to a data image.
pub const VERITY_SUFFIX: &str = ".verity";

/// Plaintext file on the root mount holding the current root hash.
pub const ROOT_HASH_FILE: &str = "root_hash";

/// Path of the verity hash device belonging to `image`.
pub fn verity_image_path(image: &Path) -> PathBuf {
    let mut path = image.as_os_str().to_owned();
    path.push(VERITY_SUFFIX);
    PathBuf::from(path)
}

/// Final location of the image for `slot`.
pub fn slot_image_path(root_mount: &Path, slot: &Slot) -> PathBuf {
    root_mount.join(format!("image_{}.squashfs", slot))
}

/// Exclude pattern relative to the packed root.
fn exclude_pattern(dir: &str) -> String {
    dir.trim_start_matches('/').to_string()
}

/// Pack the live root into `image`.
///
/// `include_dirs` are the sources handed to mksquashfs. Every entry of
/// `exclude_dirs` is excluded, and so are the root mount and the EFI
/// partition so the tool never packs its own output.
pub fn mksquashfs(
    runner: &dyn CommandRunner,
    include_dirs: &[String],
    exclude_dirs: &[String],
    image: &Path,
    root_mount: &Path,
    efi_partition: &Path,
) -> Result<()> {
    if include_dirs.is_empty() {
        bail!("INCLUDE_DIRS is empty, nothing to pack");
    }

    let mut cmd = Cmd::new("mksquashfs")
        .args(include_dirs)
        .arg_path(image)
        .arg("-noappend")
        .arg("-no-recovery")
        .arg("-wildcards");

    let always = [
        root_mount.to_string_lossy().into_owned(),
        efi_partition.to_string_lossy().into_owned(),
    ];
    for dir in exclude_dirs.iter().chain(always.iter()) {
        let pattern = exclude_pattern(dir);
        if pattern.is_empty() {
            continue;
        }
        cmd = cmd.arg("-e").arg(pattern);
    }

    runner.run(&cmd.error_msg("mksquashfs failed"))?;
    Ok(())
}

/// Parse the `Root hash:` line of `veritysetup format` output.
pub fn parse_root_hash(output: &str) -> Result<String> {
    let hash = output.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key.trim() == "Root hash").then(|| value.trim().to_string())
    });

    match hash {
        Some(h) if !h.is_empty() && h.bytes().all(|b| b.is_ascii_hexdigit()) => Ok(h),
        Some(h) => bail!("veritysetup returned an invalid root hash '{}'", h),
        None => bail!("veritysetup output has no 'Root hash' line"),
    }
}

/// Build the hash device for `image` and return its root hash.
pub fn veritysetup_image(runner: &dyn CommandRunner, image: &Path) -> Result<String> {
    let cmd = Cmd::new("veritysetup")
        .arg("format")
        .arg_path(image)
        .arg_path(&verity_image_path(image))
        .error_msg("veritysetup format failed");

    let result = runner.run(&cmd)?;
    parse_root_hash(&result.stdout)
}

/// Pack the root into `image`, build its hash device, return the root hash.
pub fn build_image(
    runner: &dyn CommandRunner,
    include_dirs: &[String],
    exclude_dirs: &[String],
    image: &Path,
    root_mount: &Path,
    efi_partition: &Path,
) -> Result<String> {
    tracing::debug!("Image path: {}", image.display());
    tracing::info!("Creating squashfs...");
    mksquashfs(runner, include_dirs, exclude_dirs, image, root_mount, efi_partition)?;
    tracing::info!("Setup device verity");
    veritysetup_image(runner, image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandResult, RecordingRunner};

    const VERITY_OUTPUT: &str = "VERITY header information for /tmp/secure_squash_root/tmp.squashfs.verity\n\
UUID:            \t2e9f4b2c-2f3c-4c8e-9d9e-1b6a8f2d7c11\n\
Hash type:       \t1\n\
Data blocks:     \t51200\n\
Data block size: \t4096\n\
Hash block size: \t4096\n\
Hash algorithm:  \tsha256\n\
Salt:            \t5b1f0c3a\n\
Root hash:      \t4a8c2f1e9b7d3a6c5e0f1d2c3b4a59687f6e5d4c3b2a19080706050403020100\n";

    #[test]
    fn test_verity_image_path() {
        assert_eq!(
            verity_image_path(Path::new("/mnt/root/image_a.squashfs")),
            PathBuf::from("/mnt/root/image_a.squashfs.verity")
        );
    }

    #[test]
    fn test_slot_image_path() {
        let slot = Slot::new("x1").unwrap();
        assert_eq!(
            slot_image_path(Path::new("/mnt/root"), &slot),
            PathBuf::from("/mnt/root/image_x1.squashfs")
        );
    }

    #[test]
    fn test_parse_root_hash() {
        assert_eq!(
            parse_root_hash(VERITY_OUTPUT).unwrap(),
            "4a8c2f1e9b7d3a6c5e0f1d2c3b4a59687f6e5d4c3b2a19080706050403020100"
        );
    }

    #[test]
    fn test_parse_root_hash_missing_or_invalid() {
        assert!(parse_root_hash("UUID: 1234").is_err());
        assert!(parse_root_hash("Root hash: \n").is_err());
        assert!(parse_root_hash("Root hash: not-hex\n").is_err());
    }

    #[test]
    fn test_mksquashfs_arguments() {
        let runner = RecordingRunner::new();
        mksquashfs(
            &runner,
            &["/".to_string()],
            &["/home".to_string(), "/var/tmp".to_string()],
            Path::new("/tmp/secure_squash_root/tmp.squashfs"),
            Path::new("/mnt/root"),
            Path::new("/boot/efi"),
        )
        .unwrap();

        assert_eq!(
            runner.calls(),
            vec![vec![
                "mksquashfs",
                "/",
                "/tmp/secure_squash_root/tmp.squashfs",
                "-noappend",
                "-no-recovery",
                "-wildcards",
                "-e",
                "home",
                "-e",
                "var/tmp",
                "-e",
                "mnt/root",
                "-e",
                "boot/efi",
            ]]
        );
    }

    #[test]
    fn test_mksquashfs_requires_sources() {
        let runner = RecordingRunner::new();
        let err = mksquashfs(
            &runner,
            &[],
            &[],
            Path::new("/tmp/x"),
            Path::new("/mnt/root"),
            Path::new("/boot/efi"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("INCLUDE_DIRS"));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_build_image_returns_hash() {
        let runner = RecordingRunner::with_handler(|argv| {
            if argv[0] == "veritysetup" {
                Ok(CommandResult::ok(VERITY_OUTPUT))
            } else {
                Ok(CommandResult::ok(""))
            }
        });
        let image = Path::new("/tmp/secure_squash_root/tmp.squashfs");
        let hash = build_image(
            &runner,
            &["/".to_string()],
            &[],
            image,
            Path::new("/mnt/root"),
            Path::new("/boot/efi"),
        )
        .unwrap();

        assert!(hash.starts_with("4a8c2f1e"));
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[1],
            vec![
                "veritysetup",
                "format",
                "/tmp/secure_squash_root/tmp.squashfs",
                "/tmp/secure_squash_root/tmp.squashfs.verity",
            ]
        );
    }

    #[test]
    fn test_build_image_stops_on_mksquashfs_failure() {
        let runner = RecordingRunner::with_handler(|_| Ok(CommandResult::failed(1, "disk full")));
        let err = build_image(
            &runner,
            &["/".to_string()],
            &[],
            Path::new("/tmp/x.squashfs"),
            Path::new("/mnt/root"),
            Path::new("/boot/efi"),
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("disk full"));
        assert_eq!(runner.programs(), vec!["mksquashfs"]);
    }
}
