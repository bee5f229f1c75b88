//! Update and erase command implementations.

use anyhow::{Context, Result};
use canflash::{Board, HexImage, ImageSource, Session, Transport};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use std::path::Path;
use std::time::Duration;

use super::open_bus;
use crate::config::Config;
use crate::{Cli, CliError, use_fancy_output, was_interrupted};

fn ensure_not_interrupted() -> Result<()> {
    if was_interrupted() {
        Err(CliError::Cancelled("Interrupted by user".to_string()).into())
    } else {
        Ok(())
    }
}

/// Progress bar for one board, hidden in quiet or non-TTY mode.
fn board_progress(quiet: bool) -> ProgressBar {
    if quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb
}

/// Run `op` on a session for `board`, with a progress bar driven by the
/// session's reports.
fn with_session<T, F>(
    cli: &Cli,
    bus: &mut T,
    board: &Board,
    image: Option<&dyn ImageSource>,
    timeout: Duration,
    op: F,
) -> Result<()>
where
    T: Transport + ?Sized,
    F: FnOnce(&mut Session<'_, T>) -> canflash::Result<()>,
{
    let pb = board_progress(cli.quiet);
    let bar = pb.clone();
    let name = board.name.clone();
    let mut current = String::new();

    let mut session = Session::new(bus, board)
        .with_timeout(timeout)
        .with_progress(move |label: &str, total: usize, done: usize| {
            if label != current {
                current = label.to_string();
                bar.set_message(format!("{name}: {label}"));
                bar.reset();
            }
            bar.set_length(total as u64);
            bar.set_position(done as u64);
        });
    if let Some(image) = image {
        session = session.with_image(image);
    }

    let result = op(&mut session);
    pb.finish_and_clear();
    result.with_context(|| format!("{} failed", board.name))
}

/// Update command implementation.
pub(crate) fn cmd_update(
    cli: &Cli,
    config: &Config,
    name: &str,
    build: Option<&Path>,
) -> Result<()> {
    let catalog = config.catalog()?;
    let boards = catalog.config(name)?;
    let build_dir = config.build_dir(build);
    let timeout = config.timeout(cli.timeout)?;

    // Every image must load before anything goes on the bus.
    let mut images = Vec::with_capacity(boards.len());
    for board in boards {
        let path = board.image_path(&build_dir);
        debug!("{}: loading {}", board.name, path.display());
        let image = HexImage::from_file(&path)
            .with_context(|| format!("{}: failed to load {}", board.name, path.display()))?;
        if !cli.quiet {
            eprintln!(
                "{} {} {} ({} bytes @ 0x{:08X})",
                style("📦").cyan(),
                style(&board.name).bold(),
                path.display(),
                image.span(),
                image.min_address()
            );
        }
        images.push(image);
    }

    let interface = config.interface(cli.interface.as_deref());
    let mut bus = open_bus(&interface)?;
    if !cli.quiet {
        eprintln!("{} Using {}", style("🔌").cyan(), style(&interface).bold());
    }

    for (board, image) in boards.iter().zip(&images) {
        ensure_not_interrupted()?;
        let image: &dyn ImageSource = image;
        with_session(cli, &mut *bus, board, Some(image), timeout, |session| {
            session.update()
        })?;
        if !cli.quiet {
            eprintln!("{} {} updated", style("✓").green(), board.name);
        }
    }

    if !cli.quiet {
        eprintln!(
            "{} Updated {} board(s) in configuration {}",
            style("✓").green().bold(),
            boards.len(),
            style(name).cyan()
        );
    }
    Ok(())
}

/// Erase command implementation.
pub(crate) fn cmd_erase(cli: &Cli, config: &Config, name: &str) -> Result<()> {
    let catalog = config.catalog()?;
    let boards = catalog.config(name)?;
    let timeout = config.timeout(cli.timeout)?;

    let interface = config.interface(cli.interface.as_deref());
    let mut bus = open_bus(&interface)?;
    if !cli.quiet {
        eprintln!("{} Using {}", style("🔌").cyan(), style(&interface).bold());
    }

    for board in boards {
        ensure_not_interrupted()?;
        with_session(cli, &mut *bus, board, None, timeout, |session| {
            session.erase()
        })?;
        if !cli.quiet {
            eprintln!("{} {} erased", style("✓").green(), board.name);
        }
    }

    if !cli.quiet {
        eprintln!(
            "{} Erased {} board(s) in configuration {}",
            style("✓").green().bold(),
            boards.len(),
            style(name).cyan()
        );
    }
    Ok(())
}
