//! Ledger command - inspect and reset completion markers

use anyhow::{Context as _, Result};
use chrono::Local;
use colored::Colorize;
use stowkit::RunLedger;

use super::Session;
use crate::paths::contract_home;
use crate::{Context, Finish, ui};

fn open(ctx: &Context) -> Result<RunLedger> {
    let session = Session::load(ctx)?;
    Ok(RunLedger::new(session.options.ledger_dir()))
}

pub fn list(ctx: &Context, json: bool) -> Result<Finish> {
    let ledger = open(ctx)?;
    let entries = ledger
        .entries()
        .with_context(|| format!("Could not read ledger at {}", ledger.dir().display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(Finish::Clean);
    }

    ui::header(&format!("Ledger ({})", contract_home(ledger.dir())));
    if entries.is_empty() {
        ui::dim("No completed steps recorded");
        return Ok(Finish::Clean);
    }

    for entry in &entries {
        let when = entry.completed_at.map_or_else(
            || "unknown".to_string(),
            |t| {
                t.with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            },
        );
        println!(
            "  {:<16} {}  {}",
            entry.step_id.package().unwrap_or("?").bold(),
            when.dimmed(),
            entry.step_id.as_str().bright_black()
        );
    }
    println!();
    println!("  {} step(s) recorded", entries.len());

    Ok(Finish::Clean)
}

pub fn reset(ctx: &Context, package: &str) -> Result<Finish> {
    let ledger = open(ctx)?;
    let removed = ledger.reset_matching(package)?;
    if removed == 0 {
        ui::info(&format!("No ledger entries for '{package}'"));
    } else {
        ui::success(&format!(
            "Forgot {removed} step(s) for '{package}'; the next apply will reconcile it"
        ));
    }
    Ok(Finish::Clean)
}

pub fn reset_all(ctx: &Context) -> Result<Finish> {
    let ledger = open(ctx)?;
    let removed = ledger.reset_all()?;
    ui::success(&format!("Forgot {removed} step(s)"));
    Ok(Finish::Clean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use stowkit::StepId;
    use tempfile::TempDir;

    fn context(temp: &TempDir) -> Context {
        let home = temp.path().join("home");
        fs::create_dir_all(&home).unwrap();
        Context {
            verbose: 0,
            quiet: true,
            config: Some(temp.path().join("config.toml")),
            source: None,
            target: Some(home.display().to_string()),
        }
    }

    fn step(package: &str) -> StepId {
        StepId::new("host", "apply", package, "f", "c")
    }

    #[test]
    fn test_reset_forgets_one_package() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        let ledger = open(&ctx).unwrap();
        ledger.mark_complete(&step("zsh")).unwrap();
        ledger.mark_complete(&step("git")).unwrap();

        assert_eq!(reset(&ctx, "zsh").unwrap(), Finish::Clean);
        assert!(!ledger.is_complete(&step("zsh")));
        assert!(ledger.is_complete(&step("git")));

        reset_all(&ctx).unwrap();
        assert!(ledger.entries().unwrap().is_empty());
    }

    #[test]
    fn test_ledger_lives_under_target_state() {
        let temp = TempDir::new().unwrap();
        let ledger = open(&context(&temp)).unwrap();
        assert_eq!(
            ledger.dir(),
            temp.path().join("home/.local/state/dotlink/install")
        );
    }
}
