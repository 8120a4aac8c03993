//! Status command - per-package table of link state

use anyhow::Result;
use colored::{Color, Colorize};
use stowkit::{Disposition, Error, Preview};

use super::Session;
use crate::paths::contract_home;
use crate::{Context, Finish};

/// Link counts for one package
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct PackageStatus {
    linked: usize,
    unlinked: usize,
    blocked: usize,
}

impl PackageStatus {
    fn from_preview(preview: &Preview) -> Self {
        let mut status = Self::default();
        for classified in &preview.links {
            match classified.disposition {
                Disposition::NoOp => status.linked += 1,
                Disposition::NeedsLink => status.unlinked += 1,
                Disposition::Blocking(_) => status.blocked += 1,
            }
        }
        status
    }

    fn total(&self) -> usize {
        self.linked + self.unlinked + self.blocked
    }

    fn status_label(&self) -> (&'static str, Color) {
        if self.total() == 0 {
            ("empty", Color::BrightBlack)
        } else if self.blocked > 0 {
            ("blocked", Color::Red)
        } else if self.unlinked == 0 {
            ("linked", Color::Green)
        } else if self.linked == 0 {
            ("unlinked", Color::BrightBlack)
        } else {
            ("partial", Color::Yellow)
        }
    }
}

/// Show status of all packages in a table format
pub fn run(ctx: &Context) -> Result<Finish> {
    let session = Session::load(ctx)?;
    let reconciler = session.reconciler()?;
    let packages = session.packages(&[])?;

    println!();
    println!(
        "  {} → {}",
        contract_home(&session.source_root).bold(),
        contract_home(&session.options.target_root).bold()
    );
    println!(
        "  {}",
        format!("config {}", contract_home(&session.config_path)).dimmed()
    );
    println!();
    println!(
        "  {:<20} {:<12} {:>6} {:>8}",
        "Package".bold(),
        "Status".bold(),
        "Links".bold(),
        "Ledger".bold()
    );
    println!(
        "  {} {} {} {}",
        "─".repeat(20),
        "─".repeat(12),
        "─".repeat(6),
        "─".repeat(8)
    );

    let mut total_linked = 0;
    let mut total_pending = 0;
    let mut missing = 0;

    for package in &packages {
        let preview = match reconciler.preview(package) {
            Ok(preview) => preview,
            Err(Error::PackageNotFound { .. }) => {
                missing += 1;
                println!(
                    "  {:<20} {} {:<10} {:>6} {:>8}",
                    package.name,
                    "?".bright_black(),
                    "missing".bright_black(),
                    "-".bright_black(),
                    "-".bright_black()
                );
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let stats = PackageStatus::from_preview(&preview);
        let (label, color) = stats.status_label();
        let icon = match label {
            "linked" => "✓".green(),
            "partial" => "◐".yellow(),
            "blocked" => "✗".red(),
            "unlinked" => "○".bright_black(),
            _ => "?".bright_black(),
        };
        let ledger = if preview.complete {
            "✓".green()
        } else {
            "-".bright_black()
        };

        println!(
            "  {:<20} {} {:<10} {:>6} {:>8}",
            package.name,
            icon,
            label.color(color),
            stats.total().to_string().bright_black(),
            ledger
        );

        total_linked += stats.linked;
        total_pending += stats.unlinked + stats.blocked;
    }

    println!();

    if total_pending > 0 {
        println!(
            "  {} linked, {} to reconcile",
            total_linked.to_string().green(),
            total_pending.to_string().yellow()
        );
        println!();
        println!("  Run {} to reconcile", "dotlink apply".cyan());
    } else if total_linked > 0 {
        println!("  {} All {} links are in place", "✓".green(), total_linked);
    } else {
        println!("  {} No links planned", "○".bright_black());
    }

    if missing > 0 {
        println!(
            "  {} {} package(s) have no source directory",
            "⚠".yellow(),
            missing
        );
    }

    println!();

    Ok(Finish::Clean)
}
