//! Commits command implementation.

use anyhow::Result;
use canflash::{COMMIT_SOURCES, CommitInfo, bootloader::DEFAULT_POLL_INTERVAL, collect_commits};
use console::style;
use log::warn;
use std::env;
use std::time::Duration;

use super::open_bus;
use crate::config::Config;
use crate::lookup::{CommitDetails, CommitLookup, GitHub};
use crate::{Cli, CliError};

/// Boards that never reported, in broadcast-table order.
fn missing_boards(found: &[CommitInfo]) -> Vec<&'static str> {
    COMMIT_SOURCES
        .iter()
        .map(|s| s.board)
        .filter(|board| !found.iter().any(|c| c.board == *board))
        .collect()
}

/// Resolve every commit. A failed lookup is a warning and leaves `None`.
fn look_up_all(lookup: &dyn CommitLookup, commits: &[CommitInfo]) -> Vec<Option<CommitDetails>> {
    commits
        .iter()
        .map(|c| match lookup.lookup(&c.short_sha) {
            Ok(details) => Some(details),
            Err(e) => {
                warn!("{}: commit lookup failed: {e:#}", c.board);
                None
            },
        })
        .collect()
}

fn commit_json(commit: &CommitInfo, details: Option<&CommitDetails>, lookup: bool) -> serde_json::Value {
    let mut value = serde_json::json!({
        "board": commit.board,
        "commit": commit.short_sha,
        "clean": commit.clean,
    });
    if lookup {
        value["details"] = details.map_or(serde_json::Value::Null, |d| {
            serde_json::json!({
                "sha": d.sha,
                "message": d.message,
                "author": d.author,
                "date": d.date,
            })
        });
    }
    value
}

/// Commits command implementation.
pub(crate) fn cmd_commits(
    cli: &Cli,
    config: &Config,
    json: bool,
    wait: f64,
    lookup: bool,
) -> Result<()> {
    let wait = Duration::try_from_secs_f64(wait)
        .map_err(|_| CliError::Usage(format!("invalid wait time: {wait} seconds")))?;

    let interface = config.interface(cli.interface.as_deref());
    let mut bus = open_bus(&interface)?;
    if !cli.quiet && !json {
        eprintln!(
            "{} Listening on {} for {:.1}s",
            style("📡").cyan(),
            style(&interface).bold(),
            wait.as_secs_f64()
        );
    }

    let poll = DEFAULT_POLL_INTERVAL.min(wait.max(Duration::from_millis(1)));
    let commits = collect_commits(&mut *bus, COMMIT_SOURCES, wait, poll)?;
    let missing = missing_boards(&commits);

    let details = if lookup && !commits.is_empty() {
        if !cli.quiet && !json {
            eprintln!(
                "{} Looking up commits in {}",
                style("🔎").cyan(),
                style(config.repository()).bold()
            );
        }
        let github = GitHub::new(config.api_url(), config.repository())?
            .with_token(env::var("GITHUB_TOKEN").ok());
        look_up_all(&github, &commits)
    } else {
        vec![None; commits.len()]
    };

    if json {
        let boards: Vec<serde_json::Value> = commits
            .iter()
            .zip(&details)
            .map(|(c, d)| commit_json(c, d.as_ref(), lookup))
            .collect();
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "commits": boards,
                "missing": missing,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for (commit, details) in commits.iter().zip(&details) {
        let state = if commit.clean {
            style("Clean").green()
        } else {
            style("Dirty").yellow()
        };
        println!(
            "{}: {} ({state})",
            style(&commit.board).bold(),
            style(&commit.short_sha).cyan()
        );
        if let Some(d) = details {
            println!("    \"{}\" by {}", d.summary(), d.author);
            println!("    Date: {}", d.date);
            println!("    SHA: {}", d.sha);
        }
    }
    for board in &missing {
        eprintln!("{} {board}: no broadcast", style("!").yellow());
    }
    Ok(())
}
