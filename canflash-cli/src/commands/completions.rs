//! Shell completion generation and installation.

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{Shell, generate};
use console::style;
use std::env;
use std::fs;
use std::io;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::Cli;

const BIN_NAME: &str = "canflash";

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Shell) {
    generate(shell, &mut Cli::command(), BIN_NAME, &mut io::stdout());
}

/// Shell named by a `$SHELL`-style path.
fn shell_from_path(shell_path: &str) -> Option<Shell> {
    match Path::new(shell_path).file_name()?.to_str()? {
        "bash" => Some(Shell::Bash),
        "zsh" => Some(Shell::Zsh),
        "fish" => Some(Shell::Fish),
        _ => None,
    }
}

fn home_dir() -> Result<PathBuf> {
    env::var("HOME")
        .map(PathBuf::from)
        .context("Could not determine home directory")
}

/// `$XDG_<var>` or `$HOME/<fallback>`.
fn xdg_dir(var: &str, fallback: &[&str]) -> Result<PathBuf> {
    if let Ok(dir) = env::var(var) {
        return Ok(PathBuf::from(dir));
    }
    Ok(fallback.iter().fold(home_dir()?, |p, part| p.join(part)))
}

/// Where the completion script for `shell` is installed.
fn install_path(shell: Shell) -> Result<PathBuf> {
    match shell {
        Shell::Bash => Ok(xdg_dir("XDG_DATA_HOME", &[".local", "share"])?
            .join("bash-completion")
            .join("completions")
            .join(BIN_NAME)),
        Shell::Zsh => Ok(home_dir()?.join(".zfunc").join(format!("_{BIN_NAME}"))),
        Shell::Fish => Ok(xdg_dir("XDG_CONFIG_HOME", &[".config"])?
            .join("fish")
            .join("completions")
            .join(format!("{BIN_NAME}.fish"))),
        other => anyhow::bail!("Automatic install is not supported for {other}"),
    }
}

/// Install shell completions for `shell`, or for `$SHELL` when not given.
pub(crate) fn cmd_completions_install(shell: Option<Shell>) -> Result<()> {
    let shell = match shell {
        Some(s) => s,
        None => env::var("SHELL")
            .ok()
            .and_then(|p| shell_from_path(&p))
            .context("Could not detect your shell; pass it explicitly: canflash completions --install bash")?,
    };

    let path = install_path(shell)?;
    let mut script = Vec::new();
    generate(shell, &mut Cli::command(), BIN_NAME, &mut script);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(&path, &script)
        .with_context(|| format!("Failed to write completion file: {}", path.display()))?;

    eprintln!(
        "{} Installed {shell} completions to {}",
        style("✓").green().bold(),
        style(path.display()).yellow()
    );

    if shell == Shell::Zsh {
        let zshrc = home_dir()?.join(".zshrc");
        let fpath_line = "fpath=(~/.zfunc $fpath)";
        let present = fs::read_to_string(&zshrc).is_ok_and(|c| c.contains(fpath_line));
        if !present {
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&zshrc)
                .with_context(|| format!("Failed to update {}", zshrc.display()))?;
            writeln!(file, "\n# canflash completions")?;
            writeln!(file, "{fpath_line}")?;
            writeln!(file, "autoload -Uz compinit && compinit")?;
        }
        eprintln!("Restart your shell or run: {}", style("exec zsh").cyan());
    } else {
        eprintln!("Completions load automatically in new {shell} sessions.");
    }

    Ok(())
}
