//! Plan command - preview links and their current state

use anyhow::Result;
use colored::Colorize;
use stowkit::{Disposition, EntryKind, Preview};

use super::Session;
use crate::cli::PlanArgs;
use crate::{Context, Finish, ui};

pub fn run(ctx: &Context, args: &PlanArgs) -> Result<Finish> {
    let session = Session::load(ctx)?;
    let reconciler = session.reconciler()?;
    let packages = session.packages(&args.packages)?;

    let mut previews = Vec::new();
    let mut finish = Finish::Clean;
    for package in &packages {
        match reconciler.preview(package) {
            Ok(preview) => previews.push(preview),
            Err(e) => {
                ui::error(&format!("{}: {e}", package.name));
                finish = Finish::PackagesFailed;
            }
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&previews)?);
        return Ok(finish);
    }

    for preview in &previews {
        print_preview(preview);
    }

    let to_link: usize = previews.iter().map(count_needs_link).sum();
    let blocking: usize = previews.iter().map(count_blocking).sum();
    println!();
    if to_link == 0 && blocking == 0 {
        ui::success("Everything is in place");
    } else {
        ui::info(&format!(
            "{} to link, {} blocking (will be backed up)",
            to_link, blocking
        ));
        println!("  Run {} to reconcile", "dotlink apply".cyan());
    }

    Ok(finish)
}

fn print_preview(preview: &Preview) {
    let ledger = if preview.complete {
        "recorded".green()
    } else {
        "pending".yellow()
    };
    ui::section(&preview.package);
    ui::dim(&format!(
        "plan from {}, ledger {}, step {}",
        preview.plan_source, ledger, preview.step_id
    ));

    if preview.links.is_empty() {
        ui::dim("nothing to link");
    }

    for classified in &preview.links {
        let target = classified.spec.target.display().to_string();
        match &classified.disposition {
            Disposition::NoOp => {
                println!("  {} {}", "=".bright_black(), target.bright_black());
            }
            Disposition::NeedsLink => {
                let kind = match classified.spec.kind {
                    EntryKind::DirectoryLink => "(directory)",
                    EntryKind::FileLink => "",
                };
                println!("  {} {} {}", "+".green(), target, kind.dimmed());
            }
            Disposition::Blocking(conflict) => {
                let at = if conflict.target == classified.spec.target {
                    String::new()
                } else {
                    format!(" at {}", conflict.target.display())
                };
                println!("  {} {} {}{}", "!".red(), target, conflict.reason.code().red(), at);
            }
        }
    }

    for err in &preview.planning_errors {
        println!("  {} {}", "skipped".yellow(), err.message);
    }
}

fn count_needs_link(preview: &Preview) -> usize {
    preview
        .links
        .iter()
        .filter(|c| c.disposition == Disposition::NeedsLink)
        .count()
}

fn count_blocking(preview: &Preview) -> usize {
    preview
        .links
        .iter()
        .filter(|c| c.disposition.conflict().is_some())
        .count()
}
