//! Shared test utilities for secure-squash-root tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use anyhow::{anyhow, Result};
use secure_squash_root::config::Config;
use secure_squash_root::distribution::ModulesDirDistribution;
use secure_squash_root::initramfs::Dracut;
use secure_squash_root::process::{CommandResult, RecordingRunner};

/// Fake executables start with this marker followed by their cmdline.
pub const FAKE_UKI_MAGIC: &str = "UKI:";

pub const OS_RELEASE: &str = "NAME=\"Arch Linux\"\nPRETTY_NAME=\"Arch Linux\"\nID=arch\n";

/// Test environment with a root mount, EFI partition, keys and kernels.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub root_mount: PathBuf,
    pub efi_partition: PathBuf,
    pub keys: PathBuf,
    pub tmp_dir: PathBuf,
    pub modules: PathBuf,
    pub stub: PathBuf,
}

impl TestEnv {
    /// Environment with kernel `linux` (6.9.1-arch1-1) installed.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();

        let env = Self {
            root_mount: base.join("root"),
            efi_partition: base.join("efi"),
            keys: base.join("keys"),
            tmp_dir: base.join("scratch"),
            modules: base.join("modules"),
            stub: base.join("linuxx64.efi.stub"),
            _temp_dir: temp_dir,
        };

        for dir in [&env.root_mount, &env.efi_partition, &env.keys, &env.modules] {
            fs::create_dir_all(dir).expect("Failed to create test dir");
        }
        fs::write(env.keys.join("db.key"), "key").expect("Failed to write key");
        fs::write(env.keys.join("db.crt"), "crt").expect("Failed to write cert");
        fs::write(&env.stub, "stub").expect("Failed to write stub");
        env.add_kernel("6.9.1-arch1-1", "linux");
        env
    }

    /// Add `<modules>/<kver>/vmlinuz` with a `pkgbase` file.
    pub fn add_kernel(&self, kver: &str, pkgbase: &str) {
        let dir = self.modules.join(kver);
        fs::create_dir_all(&dir).expect("Failed to create kernel dir");
        fs::write(dir.join("vmlinuz"), "vmlinuz").expect("Failed to write vmlinuz");
        fs::write(dir.join("pkgbase"), pkgbase).expect("Failed to write pkgbase");
    }

    /// Configuration pointing at this environment, plus `extra` TOML lines.
    pub fn config(&self, extra: &str) -> Config {
        let toml = format!(
            "ROOT_MOUNT = \"{}\"\nEFI_PARTITION = \"{}\"\nSECURE_BOOT_KEYS = \"{}\"\n\
             EFI_STUB = \"{}\"\nTMPDIR = \"{}\"\nCMDLINE = \"rw quiet\"\nSLOT_POLICY = \"alternate\"\n{}",
            self.root_mount.display(),
            self.efi_partition.display(),
            self.keys.display(),
            self.stub.display(),
            self.tmp_dir.display(),
            extra
        );
        Config::from_toml_str(&toml).expect("Failed to parse test config")
    }

    pub fn distribution(&self) -> ModulesDirDistribution {
        ModulesDirDistribution::new(&self.modules, OS_RELEASE, None)
    }

    pub fn initramfs(&self) -> Dracut {
        Dracut::new(&self.tmp_dir, "Arch Linux")
    }

    /// `<EFI_PARTITION>/EFI/Linux/arch`
    pub fn out_dir(&self) -> PathBuf {
        self.efi_partition.join("EFI/Linux/arch")
    }

    /// Place an executable built for `slot` at `name` in the output dir.
    pub fn install_existing(&self, name: &str, slot: &str) -> Vec<u8> {
        let content = fake_uki(&format!(
            "rw quiet  secure_squash_root_slot={} secure_squash_root_hash=0ld",
            slot
        ));
        let path = self.out_dir().join(name);
        fs::create_dir_all(self.out_dir()).expect("Failed to create out dir");
        fs::write(&path, &content).expect("Failed to write existing efi");
        content
    }
}

pub fn fake_uki(cmdline: &str) -> Vec<u8> {
    format!("{}{}", FAKE_UKI_MAGIC, cmdline).into_bytes()
}

/// Embedded cmdline of a fake executable on disk.
pub fn embedded_cmdline(path: &Path) -> String {
    let content = fs::read_to_string(path).expect("Failed to read efi");
    content
        .strip_prefix(FAKE_UKI_MAGIC)
        .unwrap_or_else(|| panic!("{} is not a fake UKI", path.display()))
        .to_string()
}

/// Runner emulating mksquashfs, veritysetup, dracut, objcopy and sbsign on
/// the filesystem. `failing` names a program that exits 1.
pub fn fake_tools(root_hash: &'static str, failing: Option<&'static str>) -> RecordingRunner {
    RecordingRunner::with_handler(move |argv| {
        if Some(argv[0].as_str()) == failing {
            return Ok(CommandResult::failed(1, format!("{} exploded", argv[0])));
        }
        match argv[0].as_str() {
            "mksquashfs" => {
                let image = argv
                    .iter()
                    .find(|a| a.ends_with(".squashfs"))
                    .ok_or_else(|| anyhow!("no image argument"))?;
                fs::write(image, "squashfs")?;
                Ok(CommandResult::ok(""))
            }
            "veritysetup" => {
                fs::write(&argv[3], "verity")?;
                Ok(CommandResult::ok(format!(
                    "VERITY header information for {}\nRoot hash:      \t{}\n",
                    argv[3], root_hash
                )))
            }
            "dracut" => {
                fs::write(argv.last().ok_or_else(|| anyhow!("no output"))?, "initramfs")?;
                Ok(CommandResult::ok(""))
            }
            "objcopy" if argv[1] == "-O" => dump_cmdline(&argv[4], &argv[5]),
            "objcopy" => {
                let cmdline_file = argv
                    .iter()
                    .find_map(|a| a.strip_prefix(".cmdline="))
                    .ok_or_else(|| anyhow!("no .cmdline section"))?;
                let cmdline = fs::read_to_string(cmdline_file)?;
                fs::write(argv.last().ok_or_else(|| anyhow!("no output"))?, fake_uki(&cmdline))?;
                Ok(CommandResult::ok(""))
            }
            "sbsign" => {
                let (out, input) = (&argv[6], &argv[7]);
                if out != input {
                    fs::copy(input, out)?;
                }
                Ok(CommandResult::ok(""))
            }
            other => Err(anyhow!("unexpected program {}", other)),
        }
    })
}

fn dump_cmdline(efi: &str, dump: &str) -> Result<CommandResult> {
    let content = fs::read(efi)?;
    match content.strip_prefix(FAKE_UKI_MAGIC.as_bytes()) {
        Some(cmdline) => {
            fs::write(dump, cmdline)?;
            Ok(CommandResult::ok(""))
        }
        None => Ok(CommandResult::failed(1, "can't dump section")),
    }
}

/// Assert that a file exists.
pub fn assert_file_exists(path: &Path) {
    assert!(path.exists(), "Expected file to exist: {}", path.display());
}

/// Assert that a file does not exist.
pub fn assert_file_missing(path: &Path) {
    assert!(!path.exists(), "Expected file to be absent: {}", path.display());
}

/// Assert that a file contains expected content.
pub fn assert_file_contains(path: &Path, expected: &str) {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|_| panic!("Failed to read file: {}", path.display()));
    assert!(
        content.contains(expected),
        "File {} does not contain expected content.\nExpected to find: {}\nActual content: {}",
        path.display(),
        expected,
        content
    );
}
