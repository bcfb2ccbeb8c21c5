//! Configuration management for secure-squash-root.
//!
//! Configuration is TOML, read in layers where later layers win:
//!
//! 1. Built-in defaults (compiled in)
//! 2. `/usr/share/secure_squash_root/default.toml` (distribution defaults)
//! 3. `/etc/secure_squash_root/config.toml` (administrator)
//! 4. A file passed with `--config`
//! 5. `SECURE_SQUASH_ROOT_<KEY>` environment variables (scalar keys only)
//!
//! The result is immutable for the rest of the run. Every problem is reported
//! here, before anything on disk is touched.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::slot::SlotPolicy;
use crate::variant::VariantPolicy;

/// Directory name used under /etc and /usr/share.
pub const CONFIG_DIR_NAME: &str = "secure_squash_root";
/// Distribution-provided defaults.
pub const DISTRI_FILE: &str = "/usr/share/secure_squash_root/default.toml";
/// Administrator configuration.
pub const CONFIG_FILE: &str = "/etc/secure_squash_root/config.toml";
/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "SECURE_SQUASH_ROOT_";

/// Separator between source and destination in `[EXTRA_SIGN]` entries.
const EXTRA_SIGN_SEPARATOR: &str = "=>";

const DEFAULT_CONFIG: &str = r#"
ROOT_MOUNT = "/mnt/root"
EFI_PARTITION = "/boot/efi"
INCLUDE_DIRS = "/"
EXCLUDE_DIRS = "/dev,/proc,/run,/sys,/tmp,/var/tmp,/home,/mnt,/media"
IGNORE_KERNEL_EFIS = ""
SECURE_BOOT_KEYS = "/etc/secure_squash_root/keys"
EFI_STUB = "/usr/lib/systemd/boot/efi/linuxx64.efi.stub"
SLOT_POLICY = "random"
TMPDIR = "/tmp/secure_squash_root"
"#;

/// Errors detected while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("missing required configuration key {0}")]
    Missing(&'static str),
    #[error("unknown SLOT_POLICY '{0}' (expected 'random' or 'alternate')")]
    SlotPolicy(String),
    #[error("extra signing entry '{name}' is invalid; extra signing files need to be specified as\nname = SOURCE => DEST")]
    ExtraSign { name: String },
}

/// One configuration layer; unset keys fall through to earlier layers.
/// Unknown keys are an error.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigLayer {
    #[serde(rename = "ROOT_MOUNT")]
    root_mount: Option<PathBuf>,
    #[serde(rename = "EFI_PARTITION")]
    efi_partition: Option<PathBuf>,
    #[serde(rename = "INCLUDE_DIRS")]
    include_dirs: Option<String>,
    #[serde(rename = "EXCLUDE_DIRS")]
    exclude_dirs: Option<String>,
    #[serde(rename = "IGNORE_KERNEL_EFIS")]
    ignore_kernel_efis: Option<String>,
    #[serde(rename = "CMDLINE")]
    cmdline: Option<String>,
    #[serde(rename = "SECURE_BOOT_KEYS")]
    secure_boot_keys: Option<PathBuf>,
    #[serde(rename = "EFI_STUB")]
    efi_stub: Option<PathBuf>,
    #[serde(rename = "SLOT_POLICY")]
    slot_policy: Option<String>,
    #[serde(rename = "TMPDIR")]
    tmp_dir: Option<PathBuf>,
    #[serde(rename = "DISTRIBUTION_NAME")]
    distribution_name: Option<String>,
    #[serde(rename = "EXTRA_SIGN", default)]
    extra_sign: BTreeMap<String, String>,
}

impl ConfigLayer {
    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn from_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            tracing::debug!("Config layer {} not present", path.display());
            return Ok(None);
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Reading config layer {}", path.display());
        Self::parse(&content, path).map(Some)
    }

    fn from_env() -> Self {
        let var = |key: &str| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok();
        Self {
            root_mount: var("ROOT_MOUNT").map(PathBuf::from),
            efi_partition: var("EFI_PARTITION").map(PathBuf::from),
            include_dirs: var("INCLUDE_DIRS"),
            exclude_dirs: var("EXCLUDE_DIRS"),
            ignore_kernel_efis: var("IGNORE_KERNEL_EFIS"),
            cmdline: var("CMDLINE"),
            secure_boot_keys: var("SECURE_BOOT_KEYS").map(PathBuf::from),
            efi_stub: var("EFI_STUB").map(PathBuf::from),
            slot_policy: var("SLOT_POLICY"),
            tmp_dir: var("TMPDIR").map(PathBuf::from),
            distribution_name: var("DISTRIBUTION_NAME"),
            extra_sign: BTreeMap::new(),
        }
    }

    /// Overlay `other` on top of `self`.
    fn merge(&mut self, other: ConfigLayer) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            root_mount,
            efi_partition,
            include_dirs,
            exclude_dirs,
            ignore_kernel_efis,
            cmdline,
            secure_boot_keys,
            efi_stub,
            slot_policy,
            tmp_dir,
            distribution_name
        );
        self.extra_sign.extend(other.extra_sign);
    }
}

/// A parsed `[EXTRA_SIGN]` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraSignEntry {
    pub name: String,
    pub source: PathBuf,
    pub dest: PathBuf,
}

/// Parse `SOURCE => DEST`. Exactly one separator, both sides non-empty.
pub fn parse_extra_sign(name: &str, value: &str) -> Result<ExtraSignEntry, ConfigError> {
    let parts: Vec<&str> = value.split(EXTRA_SIGN_SEPARATOR).map(str::trim).collect();
    match parts.as_slice() {
        [source, dest] if !source.is_empty() && !dest.is_empty() => Ok(ExtraSignEntry {
            name: name.to_string(),
            source: PathBuf::from(source),
            dest: PathBuf::from(dest),
        }),
        _ => Err(ConfigError::ExtraSign {
            name: name.to_string(),
        }),
    }
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn config_str_to_stripped_arr(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Effective configuration for one run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Mounted real root partition holding the images.
    pub root_mount: PathBuf,
    pub efi_partition: PathBuf,
    pub include_dirs: Vec<String>,
    pub exclude_dirs: Vec<String>,
    /// Base names of variants that are never built.
    pub ignore_kernel_efis: Vec<String>,
    /// Base kernel command line shared by every variant.
    pub cmdline: String,
    /// Directory holding `db.key` and `db.crt`.
    pub secure_boot_keys: PathBuf,
    pub efi_stub: PathBuf,
    pub slot_policy: SlotPolicy,
    /// Trusted scratch directory for unsigned and not-yet-installed files.
    pub tmp_dir: PathBuf,
    /// Overrides the EFI sub-directory otherwise derived from os-release.
    pub distribution_name: Option<String>,
    pub extra_sign: BTreeMap<String, String>,
}

impl Config {
    /// Load configuration from the standard locations plus an optional
    /// explicit file, then apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut files = vec![PathBuf::from(DISTRI_FILE), PathBuf::from(CONFIG_FILE)];
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            files.push(path.to_path_buf());
        }
        Self::load_layers(&files)
    }

    /// Built-in defaults, then each existing file in order, then environment.
    pub fn load_layers(files: &[PathBuf]) -> Result<Self, ConfigError> {
        let mut merged = ConfigLayer::parse(DEFAULT_CONFIG, Path::new("<built-in>"))?;
        for path in files {
            if let Some(layer) = ConfigLayer::from_file(path)? {
                merged.merge(layer);
            }
        }
        merged.merge(ConfigLayer::from_env());
        Self::from_layer(merged)
    }

    /// Parse a single TOML document on top of the built-in defaults.
    /// Environment overrides are not applied.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut merged = ConfigLayer::parse(DEFAULT_CONFIG, Path::new("<built-in>"))?;
        merged.merge(ConfigLayer::parse(content, Path::new("<inline>"))?);
        Self::from_layer(merged)
    }

    fn from_layer(layer: ConfigLayer) -> Result<Self, ConfigError> {
        let slot_policy = match layer.slot_policy {
            Some(s) => s.parse().map_err(ConfigError::SlotPolicy)?,
            None => SlotPolicy::default(),
        };

        let include_dirs = config_str_to_stripped_arr(layer.include_dirs.as_deref().unwrap_or("/"));

        let config = Self {
            root_mount: layer.root_mount.ok_or(ConfigError::Missing("ROOT_MOUNT"))?,
            efi_partition: layer
                .efi_partition
                .ok_or(ConfigError::Missing("EFI_PARTITION"))?,
            include_dirs,
            exclude_dirs: config_str_to_stripped_arr(layer.exclude_dirs.as_deref().unwrap_or("")),
            ignore_kernel_efis: config_str_to_stripped_arr(
                layer.ignore_kernel_efis.as_deref().unwrap_or(""),
            ),
            cmdline: layer
                .cmdline
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .ok_or(ConfigError::Missing("CMDLINE"))?,
            secure_boot_keys: layer
                .secure_boot_keys
                .ok_or(ConfigError::Missing("SECURE_BOOT_KEYS"))?,
            efi_stub: layer.efi_stub.ok_or(ConfigError::Missing("EFI_STUB"))?,
            slot_policy,
            tmp_dir: layer
                .tmp_dir
                .unwrap_or_else(|| PathBuf::from("/tmp").join(CONFIG_DIR_NAME)),
            distribution_name: layer.distribution_name.filter(|s| !s.trim().is_empty()),
            extra_sign: layer.extra_sign,
        };

        // Surface malformed entries now rather than halfway through signing.
        config.extra_sign_entries()?;

        Ok(config)
    }

    /// All `[EXTRA_SIGN]` entries, or the first malformed one as an error.
    pub fn extra_sign_entries(&self) -> Result<Vec<ExtraSignEntry>, ConfigError> {
        self.extra_sign
            .iter()
            .map(|(name, value)| parse_extra_sign(name, value))
            .collect()
    }

    pub fn variant_policy(&self) -> VariantPolicy {
        VariantPolicy::new(self.ignore_kernel_efis.iter().cloned())
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  ROOT_MOUNT:         {}", self.root_mount.display());
        println!("  EFI_PARTITION:      {}", self.efi_partition.display());
        println!("  INCLUDE_DIRS:       {}", self.include_dirs.join(","));
        println!("  EXCLUDE_DIRS:       {}", self.exclude_dirs.join(","));
        println!("  IGNORE_KERNEL_EFIS: {}", self.ignore_kernel_efis.join(","));
        println!("  CMDLINE:            {}", self.cmdline);
        println!("  SECURE_BOOT_KEYS:   {}", self.secure_boot_keys.display());
        println!("  EFI_STUB:           {}", self.efi_stub.display());
        println!("  SLOT_POLICY:        {}", self.slot_policy);
        println!("  TMPDIR:             {}", self.tmp_dir.display());
        if let Some(name) = &self.distribution_name {
            println!("  DISTRIBUTION_NAME:  {}", name);
        }
        if !self.extra_sign.is_empty() {
            println!("  EXTRA_SIGN:");
            for (name, value) in &self.extra_sign {
                println!("    {} = {}", name, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stripped_arr() {
        assert_eq!(
            config_str_to_stripped_arr(" linux_fallback , linux_tmpfs,"),
            vec!["linux_fallback", "linux_tmpfs"]
        );
        assert!(config_str_to_stripped_arr("").is_empty());
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml_str(r#"CMDLINE = "rw quiet""#).unwrap();
        assert_eq!(config.cmdline, "rw quiet");
        assert_eq!(config.root_mount, PathBuf::from("/mnt/root"));
        assert_eq!(config.include_dirs, vec!["/"]);
        assert_eq!(config.slot_policy, SlotPolicy::Random);
        assert_eq!(config.tmp_dir, PathBuf::from("/tmp/secure_squash_root"));
        assert!(config.ignore_kernel_efis.is_empty());
    }

    #[test]
    fn test_missing_cmdline() {
        let err = Config::from_toml_str("").unwrap_err();
        assert!(matches!(err, ConfigError::Missing("CMDLINE")));
    }

    #[test]
    fn test_unknown_slot_policy() {
        let err = Config::from_toml_str(
            r#"
CMDLINE = "rw"
SLOT_POLICY = "sometimes"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::SlotPolicy(ref p) if p == "sometimes"));
    }

    #[test]
    fn test_extra_sign_parse() {
        let entry = parse_extra_sign(
            "systemd_boot",
            " /usr/lib/systemd/boot/efi/systemd-bootx64.efi => /boot/efi/EFI/systemd/systemd-bootx64.efi ",
        )
        .unwrap();
        assert_eq!(
            entry.source,
            PathBuf::from("/usr/lib/systemd/boot/efi/systemd-bootx64.efi")
        );
        assert_eq!(
            entry.dest,
            PathBuf::from("/boot/efi/EFI/systemd/systemd-bootx64.efi")
        );
    }

    #[test]
    fn test_extra_sign_malformed() {
        assert!(parse_extra_sign("a", "/src /dest").is_err());
        assert!(parse_extra_sign("b", "/src => /mid => /dest").is_err());
        assert!(parse_extra_sign("c", " => /dest").is_err());
    }

    #[test]
    fn test_malformed_extra_sign_fails_load() {
        let err = Config::from_toml_str(
            r#"
CMDLINE = "rw"

[EXTRA_SIGN]
bad = "/only/one/path"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ExtraSign { ref name } if name == "bad"));
        assert!(err.to_string().contains("name = SOURCE => DEST"));
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = Config::from_toml_str("CMDLINE = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_misspelled_key_is_rejected() {
        let err = Config::from_toml_str(
            r#"
CMDLINE = "rw"
IGNORE_KERNEL_EFI = "linux"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        let source = std::error::Error::source(&err).map(|e| e.to_string()).unwrap_or_default();
        assert!(source.contains("IGNORE_KERNEL_EFI"));
    }

    #[test]
    fn test_variant_policy_from_ignore_list() {
        let config = Config::from_toml_str(
            r#"
CMDLINE = "rw"
IGNORE_KERNEL_EFIS = "linux_fallback, linux_fallback_tmpfs"
"#,
        )
        .unwrap();
        let policy = config.variant_policy();
        assert!(policy.is_ignored("linux_fallback"));
        assert!(policy.kernel_skipped("linux_fallback"));
        assert!(!policy.is_ignored("linux"));
    }
}
