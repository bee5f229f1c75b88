//! canflash CLI - Command-line tool for updating firmware over a CAN bootloader.
//!
//! ## Features
//!
//! - Update every board of a named configuration from a build directory
//! - Wipe the application from every board of a configuration
//! - Report the commits the running applications were built from, optionally
//!   resolved on GitHub
//! - Inspect Intel HEX images against the flash layouts
//! - Shell completion generation
//! - Environment variable support

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;
mod lookup;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl+C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether the user pressed Ctrl+C.
fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Errors that map to dedicated exit codes.
#[derive(Debug, thiserror::Error)]
enum CliError {
    /// Bad arguments or missing input (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// Bad configuration (exit code 3).
    #[error("{0}")]
    Config(String),
    /// Interrupted by the user (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

/// canflash - Update firmware on CAN bootloader boards.
///
/// Environment variables:
///   CANFLASH_INTERFACE   - SocketCAN interface (default: can0)
///   CANFLASH_TIMEOUT     - Reply timeout in seconds (default: 5)
///   CANFLASH_BUILD_DIR   - Firmware build directory (default: build_fw_deploy)
///   GITHUB_TOKEN         - Token for `commits --lookup` (optional)
#[derive(Parser)]
#[command(name = "canflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// SocketCAN interface to use.
    #[arg(short, long, global = true, env = "CANFLASH_INTERFACE")]
    interface: Option<String>,

    /// Reply timeout in seconds for each protocol phase.
    #[arg(short, long, global = true, env = "CANFLASH_TIMEOUT")]
    timeout: Option<f64>,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config-file", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Program every board of a configuration from the build directory.
    Update {
        /// Board configuration (see `list-configs`).
        #[arg(short, long)]
        config: String,

        /// Firmware build directory.
        #[arg(short, long, env = "CANFLASH_BUILD_DIR")]
        build: Option<PathBuf>,
    },

    /// Erase the application from every board of a configuration.
    Erase {
        /// Board configuration (see `list-configs`).
        #[arg(short, long)]
        config: String,
    },

    /// Show the commits the running applications were built from.
    Commits {
        /// Output in JSON format.
        #[arg(long)]
        json: bool,

        /// Seconds to listen for broadcasts.
        #[arg(short, long, default_value_t = 10.0)]
        wait: f64,

        /// Look each commit up on GitHub (message, author, date).
        #[arg(long)]
        lookup: bool,
    },

    /// List board configurations.
    ListConfigs {
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },

    /// Show information about an Intel HEX image.
    Info {
        /// Path to the HEX file.
        hex: PathBuf,

        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type to generate completions for (auto-detected with --install).
        #[arg(value_enum)]
        shell: Option<Shell>,

        /// Install completions into the shell's completion directory.
        #[arg(long)]
        install: bool,
    },
}

fn main() -> ExitCode {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "canflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        debug!("Could not install Ctrl+C handler: {e}");
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", style("Error:").red().bold());
            ExitCode::from(exit_code(&e))
        },
    }
}

/// Exit code for a failed command.
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Usage(_) => 2,
            CliError::Config(_) => 3,
            CliError::Cancelled(_) => 130,
        };
    }
    match err.downcast_ref::<canflash::Error>() {
        Some(canflash::Error::Config(_)) => 3,
        _ => 1,
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Update { config: name, build } => {
            commands::update::cmd_update(cli, &config, name, build.as_deref())
        },
        Commands::Erase { config: name } => commands::update::cmd_erase(cli, &config, name),
        Commands::Commits { json, wait, lookup } => {
            commands::commits::cmd_commits(cli, &config, *json, *wait, *lookup)
        },
        Commands::ListConfigs { json } => commands::info::cmd_list_configs(&config, *json),
        Commands::Info { hex, json } => commands::info::cmd_info(hex, *json),
        Commands::Completions { shell, install } => {
            if *install {
                commands::completions::cmd_completions_install(*shell)
            } else {
                let shell = shell.ok_or_else(|| {
                    CliError::Usage(
                        "specify a shell type, e.g.: canflash completions bash \
                         (or use `canflash completions --install`)"
                            .to_string(),
                    )
                })?;
                commands::completions::cmd_completions(shell);
                Ok(())
            }
        },
    }
}
