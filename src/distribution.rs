//! Kernel discovery.
//!
//! The distribution tells the build which kernels are installed and which
//! sub-directory of `EFI/Linux` its executables belong in. The provided
//! implementation follows the `/usr/lib/modules/<kver>/vmlinuz` layout used
//! by Arch, Fedora and other kernel-install based systems.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::variant::KernelDescriptor;

/// Directory on the EFI partition holding all per-distribution UKI folders.
pub const EFI_KERNELS: &str = "EFI/Linux";

/// Presets built for every kernel.
pub const PRESETS: [&str; 2] = ["default", "fallback"];

/// Source of kernels to build boot executables for.
pub trait Distribution {
    /// Sub-directory of [`EFI_KERNELS`] for this distribution.
    fn efi_dirname(&self) -> String;

    /// Pretty name used in variant labels.
    fn display_name(&self) -> String;

    /// Every (kernel, preset) pair to build, in a stable order.
    fn kernels(&self) -> Result<Vec<KernelDescriptor>>;
}

/// Parse `KEY=value` lines of an os-release file, unquoting values.
pub fn parse_os_release(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}

/// Kernels under a `modules` directory, one sub-directory per kernel version.
#[derive(Debug, Clone)]
pub struct ModulesDirDistribution {
    modules_dir: PathBuf,
    os_release: HashMap<String, String>,
    name_override: Option<String>,
}

impl ModulesDirDistribution {
    /// The host layout: `/usr/lib/modules` and `/etc/os-release`.
    pub fn host(name_override: Option<String>) -> Self {
        let os_release = fs::read_to_string("/etc/os-release")
            .or_else(|_| fs::read_to_string("/usr/lib/os-release"))
            .map(|c| parse_os_release(&c))
            .unwrap_or_default();
        Self {
            modules_dir: PathBuf::from("/usr/lib/modules"),
            os_release,
            name_override,
        }
    }

    pub fn new(modules_dir: &Path, os_release: &str, name_override: Option<String>) -> Self {
        Self {
            modules_dir: modules_dir.to_path_buf(),
            os_release: parse_os_release(os_release),
            name_override,
        }
    }

    /// Kernel identifier: the package base if the kernel ships one, else the
    /// version directory name.
    fn kernel_id(dir: &Path, kver: &str) -> String {
        fs::read_to_string(dir.join("pkgbase"))
            .map(|s| s.trim().to_string())
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| kver.to_string())
    }
}

impl Distribution for ModulesDirDistribution {
    fn efi_dirname(&self) -> String {
        if let Some(name) = &self.name_override {
            return name.clone();
        }
        self.os_release
            .get("ID")
            .cloned()
            .unwrap_or_else(|| "linux".to_string())
    }

    fn display_name(&self) -> String {
        self.os_release
            .get("PRETTY_NAME")
            .or_else(|| self.os_release.get("NAME"))
            .cloned()
            .unwrap_or_else(|| "Linux".to_string())
    }

    fn kernels(&self) -> Result<Vec<KernelDescriptor>> {
        let entries = fs::read_dir(&self.modules_dir)
            .with_context(|| format!("Failed to list {}", self.modules_dir.display()))?;

        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.join("vmlinuz").is_file())
            .collect();
        dirs.sort();

        let mut kernels = Vec::new();
        for dir in dirs {
            let kver = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let kernel = Self::kernel_id(&dir, &kver);
            for preset in PRESETS {
                kernels.push(KernelDescriptor {
                    kernel: kernel.clone(),
                    preset: preset.to_string(),
                    kver: kver.clone(),
                    vmlinuz: dir.join("vmlinuz"),
                });
            }
        }
        Ok(kernels)
    }
}
