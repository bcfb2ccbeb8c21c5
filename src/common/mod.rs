//! Shared utilities across secure-squash-root modules.

pub mod files;
pub mod temp;

pub use files::{move_file, write_file_mode, write_file_with_dirs};
pub use temp::{prepare_scratch_dir, remove_scratch_file};
