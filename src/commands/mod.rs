//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `build` - Build the root image and install signed boot executables
//! - `list` - Show the state of every boot executable
//! - `sign` - Sign the configured extra files
//! - `check` - Run preflight checks
//! - `show` - Display configuration and slot information

pub mod build;
mod check;
pub mod list;
mod sign;
pub mod show;

pub use build::cmd_build;
pub use check::cmd_check;
pub use list::cmd_list;
pub use show::{cmd_show, ShowTarget};
pub use sign::cmd_sign_extra_files;

use crate::cmdline;
use crate::config::Config;
use crate::distribution::{Distribution, ModulesDirDistribution};
use crate::initramfs::Dracut;
use crate::slot::Slot;

/// Collaborators for the running host.
pub(crate) fn host_collaborators(config: &Config) -> (ModulesDirDistribution, Dracut) {
    let distribution = ModulesDirDistribution::host(config.distribution_name.clone());
    let initramfs = Dracut::new(&config.tmp_dir, distribution.display_name());
    (distribution, initramfs)
}

/// Slot of the running system, from `/proc/cmdline`.
pub(crate) fn booted_slot() -> Option<Slot> {
    cmdline::read_proc_cmdline().and_then(|c| cmdline::current_slot(&c))
}
