//! `weft` command line: back up, abandon and recover plans.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use weft::abandon::{AbandonOptions, AbandonOutcome, AbandonReport, run_abandon};
use weft::exit_codes;
use weft::io::confirm::StdinConfirm;
use weft::io::repo::PlanRepo;
use weft::logging;
use weft::recover::{ListMode, RecoverOptions, list_backups, parse_abandoned_log, recover};

const DEFAULT_GC_EXPIRE: &str = "2.weeks.ago";

#[derive(Parser)]
#[command(name = "weft", version, about = "Plan backups, abandon and recovery")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Remove a plan's workspace, branch and file; keep its backup recoverable.
    Abandon {
        /// Plan id or path to the plan file.
        target: String,
        /// Reason recorded in the abandon log.
        #[arg(long)]
        reason: Option<String>,
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
    /// List backups, or restore a plan from its backup.
    Recover {
        /// Plan to restore. Lists backups when omitted.
        plan_id: Option<String>,
        /// Overwrite an existing plan file.
        #[arg(short, long)]
        force: bool,
        /// Use abandoned backups instead of active ones.
        #[arg(long)]
        abandoned: bool,
        /// List active and abandoned backups.
        #[arg(long, conflicts_with_all = ["plan_id", "abandoned"])]
        all: bool,
        /// Print the listing as JSON.
        #[arg(long, conflicts_with = "plan_id")]
        json: bool,
    },
    /// Snapshot a plan file into its backup ref.
    Backup {
        plan_id: String,
    },
    /// Delete run and session directories past their retention.
    Prune {
        /// Directory in use; never deleted.
        #[arg(long)]
        active: Option<PathBuf>,
    },
    /// Reclaim superseded backup commits.
    Gc {
        /// Only prune objects older than this (git date syntax).
        #[arg(long, default_value = DEFAULT_GC_EXPIRE)]
        expire: String,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILURE);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("read current directory")?;
    let repo = PlanRepo::discover(&cwd)?;
    match cli.command {
        Command::Abandon {
            target,
            reason,
            yes,
        } => cmd_abandon(&repo, &target, reason, yes),
        Command::Recover {
            plan_id,
            force,
            abandoned,
            all,
            json,
        } => match plan_id {
            Some(plan_id) => cmd_recover(&repo, &plan_id, RecoverOptions { force, abandoned }),
            None => cmd_list(&repo, list_mode(abandoned, all), json),
        },
        Command::Backup { plan_id } => cmd_backup(&repo, &plan_id),
        Command::Prune { active } => cmd_prune(&repo, active),
        Command::Gc { expire } => cmd_gc(&repo, &expire),
    }
}

fn cmd_abandon(repo: &PlanRepo, target: &str, reason: Option<String>, yes: bool) -> Result<i32> {
    let options = AbandonOptions {
        reason,
        skip_confirmation: yes,
    };
    match run_abandon(repo, target, &options, &StdinConfirm)? {
        AbandonOutcome::NothingToClean { plan_id } => {
            println!("Nothing to clean for plan '{plan_id}'.");
            Ok(exit_codes::OK)
        }
        AbandonOutcome::Cancelled { plan_id } => {
            println!("Abandon of '{plan_id}' cancelled.");
            Ok(exit_codes::OK)
        }
        AbandonOutcome::Completed(report) => {
            print!("{}", render_report(repo, &report));
            if report.is_success() {
                Ok(exit_codes::OK)
            } else {
                eprintln!(
                    "abandon of '{}' incomplete; fix the errors above and re-run",
                    report.plan_id
                );
                Ok(exit_codes::FAILURE)
            }
        }
    }
}

fn render_report(repo: &PlanRepo, report: &AbandonReport) -> String {
    let mut out = format!("Abandoned plan '{}':\n", report.plan_id);
    for (resource, result) in &report.results {
        out.push_str(&format!("  {resource}: {}", result.label()));
        if let Some(message) = &result.error_message {
            out.push_str(&format!(" ({message})"));
        }
        out.push('\n');
    }
    if report.audit_logged {
        out.push_str(&format!(
            "  reason recorded in {}\n",
            repo.paths.audit_log_path.display()
        ));
    }
    if let Some(err) = &report.audit_error {
        out.push_str(&format!("  reason not recorded: {err}\n"));
    }
    out
}

fn list_mode(abandoned: bool, all: bool) -> ListMode {
    match (all, abandoned) {
        (true, _) => ListMode::All,
        (false, true) => ListMode::Abandoned,
        (false, false) => ListMode::Active,
    }
}

fn cmd_list(repo: &PlanRepo, mode: ListMode, json: bool) -> Result<i32> {
    let rows = list_backups(repo, mode)?;
    if json {
        let payload = serde_json::to_string_pretty(&rows).context("serialize backup list")?;
        println!("{payload}");
        return Ok(exit_codes::OK);
    }
    if rows.is_empty() {
        println!("No backups found.");
    }
    for row in &rows {
        println!("{}", row.render());
    }
    Ok(exit_codes::OK)
}

fn cmd_recover(repo: &PlanRepo, plan_id: &str, options: RecoverOptions) -> Result<i32> {
    let outcome = recover(repo, plan_id, options)?;
    println!(
        "Recovered '{}' to {}",
        outcome.plan_id,
        outcome.path.display()
    );
    if outcome.reactivated {
        if let Some(reason) = parse_abandoned_log(repo, &outcome.plan_id)? {
            println!("It was abandoned because: {reason}");
        }
        println!("Backup moved back to {}.", outcome.namespace.other());
    }
    Ok(exit_codes::OK)
}

fn cmd_backup(repo: &PlanRepo, plan_id: &str) -> Result<i32> {
    let record = repo.backups().create_backup(plan_id)?;
    println!("Backed up '{}' as {}", record.plan_id, record.commit_id);
    Ok(exit_codes::OK)
}

fn cmd_prune(repo: &PlanRepo, active: Option<PathBuf>) -> Result<i32> {
    let passes = repo.ephemeral().prune_all(active.as_deref());
    let mut code = exit_codes::OK;
    for (kind, result) in [("run", passes.runs), ("session", passes.sessions)] {
        match result {
            Ok(report) => {
                println!("Pruned {} {kind} directories.", report.removed.len());
                for (path, reason) in &report.failed {
                    eprintln!("could not remove {}: {reason}", path.display());
                }
            }
            Err(err) => {
                eprintln!("{kind} prune failed: {err}");
                code = exit_codes::FAILURE;
            }
        }
    }
    Ok(code)
}

fn cmd_gc(repo: &PlanRepo, expire: &str) -> Result<i32> {
    repo.backups().prune_unreachable(expire)?;
    println!("Pruned unreachable backup objects older than {expire}.");
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_abandon_with_reason() {
        let cli = Cli::parse_from(["weft", "abandon", "tasks/fix-bug.md", "--reason", "dup", "-y"]);
        match cli.command {
            Command::Abandon {
                target,
                reason,
                yes,
            } => {
                assert_eq!(target, "tasks/fix-bug.md");
                assert_eq!(reason.as_deref(), Some("dup"));
                assert!(yes);
            }
            _ => panic!("expected abandon"),
        }
    }

    #[test]
    fn parse_recover_without_id_lists() {
        let cli = Cli::parse_from(["weft", "recover", "--abandoned", "--json"]);
        assert!(matches!(
            cli.command,
            Command::Recover {
                plan_id: None,
                abandoned: true,
                json: true,
                ..
            }
        ));
    }

    #[test]
    fn all_conflicts_with_plan_id() {
        assert!(Cli::try_parse_from(["weft", "recover", "fix-bug", "--all"]).is_err());
    }

    #[test]
    fn gc_defaults_expire() {
        let cli = Cli::parse_from(["weft", "gc"]);
        assert!(matches!(cli.command, Command::Gc { expire } if expire == DEFAULT_GC_EXPIRE));
    }

    #[test]
    fn list_mode_prefers_all() {
        assert_eq!(list_mode(true, true), ListMode::All);
        assert_eq!(list_mode(false, true), ListMode::Abandoned);
        assert_eq!(list_mode(false, false), ListMode::Active);
    }
}
