//! Initramfs generation.
//!
//! Building the initramfs is delegated to the distribution's generator. The
//! builder also owns the naming of boot executables, since the preset is
//! what distinguishes `linux.efi` from `linux_fallback.efi`.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::process::{Cmd, CommandRunner};
use crate::variant::KernelDescriptor;

/// Preset that produces an un-suffixed file name.
pub const DEFAULT_PRESET: &str = "default";

/// Produces an initramfs per kernel and preset.
pub trait InitramfsBuilder {
    /// Base name of the boot executable for `kernel`/`preset`.
    fn file_name(&self, kernel: &str, preset: &str) -> String;

    /// Human-readable label for the boot menu and logs.
    fn display_name(&self, kernel: &str, preset: &str) -> String;

    /// Build the initramfs and return its path.
    fn build_initramfs(&self, runner: &dyn CommandRunner, kernel: &KernelDescriptor) -> Result<PathBuf>;
}

/// dracut, writing into the trusted scratch directory.
#[derive(Debug, Clone)]
pub struct Dracut {
    out_dir: PathBuf,
    distro_name: String,
}

impl Dracut {
    pub fn new(out_dir: &Path, distro_name: impl Into<String>) -> Self {
        Self {
            out_dir: out_dir.to_path_buf(),
            distro_name: distro_name.into(),
        }
    }

    /// Where the initramfs for `kernel` is written.
    pub fn output_path(&self, kernel: &KernelDescriptor) -> PathBuf {
        self.out_dir.join(format!(
            "initramfs_{}.img",
            self.file_name(&kernel.kernel, &kernel.preset)
        ))
    }
}

impl InitramfsBuilder for Dracut {
    fn file_name(&self, kernel: &str, preset: &str) -> String {
        if preset == DEFAULT_PRESET {
            kernel.to_string()
        } else {
            format!("{}_{}", kernel, preset)
        }
    }

    fn display_name(&self, kernel: &str, preset: &str) -> String {
        if preset == DEFAULT_PRESET {
            format!("{} ({})", self.distro_name, kernel)
        } else {
            format!("{} ({}, {})", self.distro_name, kernel, preset)
        }
    }

    fn build_initramfs(&self, runner: &dyn CommandRunner, kernel: &KernelDescriptor) -> Result<PathBuf> {
        let out = self.output_path(kernel);
        let mut cmd = Cmd::new("dracut").arg("--force");
        // The fallback image carries every driver, not just the host's.
        if kernel.preset != DEFAULT_PRESET {
            cmd = cmd.arg("--no-hostonly");
        }
        let cmd = cmd
            .arg("--kver")
            .arg(&kernel.kver)
            .arg_path(&out)
            .error_msg(format!("dracut failed for {} ({})", kernel.kernel, kernel.preset));

        runner.run(&cmd)?;
        Ok(out)
    }
}
