//! secure-squash-root library exports.
//!
//! The binary is a thin clap wrapper; everything it drives lives here so
//! integration tests can run the build against a [`process::RecordingRunner`].

pub mod artifact;
pub mod build;
pub mod cmdline;
pub mod common;
pub mod config;
pub mod distribution;
pub mod extra;
pub mod initramfs;
pub mod install;
pub mod preflight;
pub mod process;
pub mod slot;
pub mod timing;
pub mod variant;

pub mod commands;
