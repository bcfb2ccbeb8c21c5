//! secure-squash-root - builds a verity-protected squashfs root and signed
//! A/B boot executables for secure boot systems.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use secure_squash_root::commands::{self, ShowTarget as ShowCmd};
use secure_squash_root::config::Config;

#[derive(Parser)]
#[command(name = "secure-squash-root")]
#[command(about = "Build a verity squashfs root and signed A/B boot executables")]
#[command(
    after_help = "QUICK START:\n  secure-squash-root check             Check tools, keys and paths\n  secure-squash-root build             Build image and install kernels\n  secure-squash-root list              Show installed boot executables\n  secure-squash-root sign-extra-files  Sign the bootloader and other extras"
)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Extra configuration file, applied after the system ones
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the root image and install signed boot executables
    Build {
        /// Do not run preflight checks first
        #[arg(long)]
        skip_preflight: bool,
    },

    /// List every boot executable with its slot
    List,

    /// Sign the files listed under [EXTRA_SIGN]
    SignExtraFiles,

    /// Check host tools, keys and configured paths
    Check {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show effective configuration
    Config,
    /// Show the booted slot and root hash
    Slot,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Build { skip_preflight } => commands::cmd_build(&config, skip_preflight)?,
        Commands::List => commands::cmd_list(&config)?,
        Commands::SignExtraFiles => commands::cmd_sign_extra_files(&config)?,
        Commands::Check { strict } => commands::cmd_check(&config, strict)?,
        Commands::Show { what } => {
            let target = match what {
                ShowTarget::Config => ShowCmd::Config,
                ShowTarget::Slot => ShowCmd::Slot,
            };
            commands::cmd_show(target, &config)?;
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
