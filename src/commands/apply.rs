//! Apply command - reconcile packages against the target root

use anyhow::Result;
use colored::Colorize;
use std::path::{Path, PathBuf};
use stowkit::retry::RetryCallback;
use stowkit::{BackupEntry, Outcome, PackageReport, RunReport};

use super::Session;
use crate::cli::ApplyArgs;
use crate::paths::contract_home;
use crate::{Context, Finish, ui};

/// Prints protocol progress as it happens
struct PrintCallback<'a> {
    quiet: bool,
    target_root: &'a Path,
}

impl RetryCallback for PrintCallback<'_> {
    fn on_conflicts(&self, package: &str, attempt: u32, conflicts: &[PathBuf]) {
        if self.quiet {
            return;
        }
        println!(
            "  {} {}: {} conflict(s) reported by attempt {}",
            "⚠".yellow(),
            package,
            conflicts.len(),
            attempt
        );
        for path in conflicts {
            println!("      {}", path.display().to_string().dimmed());
        }
    }

    fn on_backup(&self, entry: &BackupEntry) {
        if self.quiet {
            return;
        }
        let rel = entry
            .original
            .strip_prefix(self.target_root)
            .unwrap_or(&entry.original);
        println!(
            "  {} backed up {} {} → {}",
            "↳".cyan(),
            entry.kind,
            rel.display(),
            contract_home(&entry.destination).dimmed()
        );
    }

    fn on_retry(&self, package: &str, attempt: u32, max_attempts: u32) {
        if self.quiet {
            return;
        }
        println!(
            "  {} retrying {} (attempt {}/{})",
            "↻".blue(),
            package,
            attempt,
            max_attempts
        );
    }
}

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<Finish> {
    let mut session = Session::load(ctx)?;
    session.options.force = args.force;

    let reconciler = session.reconciler()?;
    let packages = session.packages(&args.packages)?;
    if packages.is_empty() {
        ui::warn("No packages to reconcile");
        return Ok(Finish::Clean);
    }

    let quiet = ctx.quiet || args.json;
    if !quiet {
        ui::header(&format!("Reconciling {} package(s)", packages.len()));
        ui::kv("Source", &contract_home(&session.source_root));
        ui::kv("Target", &contract_home(&session.options.target_root));
        println!();
    }

    let callback = PrintCallback {
        quiet,
        target_root: &session.options.target_root,
    };
    let report = reconciler.reconcile(&packages, &callback)?;

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print_report(ctx, &report);
    }

    Ok(if report.success() {
        Finish::Clean
    } else {
        Finish::PackagesFailed
    })
}

fn print_report(ctx: &Context, report: &RunReport) {
    println!();
    for pkg in &report.packages {
        print_package(ctx, pkg);
    }
    println!();

    let converged = count(report, Outcome::Converged);
    let unchanged = count(report, Outcome::Unchanged);
    let failed = count(report, Outcome::Failed);
    let backups = report.backups().count();

    if failed == 0 {
        ui::success(&format!("{converged} converged, {unchanged} unchanged"));
    } else {
        ui::error(&format!(
            "{failed} failed, {converged} converged, {unchanged} unchanged"
        ));
    }

    if backups > 0 {
        ui::info(&format!(
            "{} path(s) backed up to {}",
            backups,
            contract_home(&report.backup_root)
        ));
    } else if failed > 0 {
        ui::kv("Backup root", &contract_home(&report.backup_root));
    }
}

fn print_package(ctx: &Context, pkg: &PackageReport) {
    let (icon, label) = match pkg.outcome {
        Outcome::Converged => ("✓".green(), "converged".green()),
        Outcome::Unchanged => ("○".bright_black(), "unchanged".bright_black()),
        Outcome::Failed => ("✗".red(), "failed".red()),
    };

    let detail = match pkg.outcome {
        Outcome::Unchanged => format!("{} links in place", pkg.links.len()),
        _ => format!(
            "{} links, {} changed, {} attempt(s), {}",
            pkg.links.len(),
            pkg.changed_links(),
            pkg.apply_attempts,
            pkg.plan_source
        ),
    };

    println!("  {} {:<20} {:<10} {}", icon, pkg.package, label, detail.dimmed());

    for err in &pkg.planning_errors {
        println!("      {} {}", "skipped".yellow(), err.message);
    }
    for err in &pkg.resolution_failures {
        println!("      {} {}", "kept".yellow(), err.message);
    }
    if let Some(failure) = &pkg.failure {
        println!("      {} {}", failure.category.description().red(), failure.message);
        for path in &pkg.unresolved {
            println!("      {} {}", "conflict".red(), path.display());
        }
        println!("      {}", failure.category.advice().dimmed());
    }

    if ctx.verbose > 0 {
        for link in &pkg.links {
            println!(
                "      {} {}",
                link.spec.target.display(),
                contract_home(&link.spec.source).dimmed()
            );
        }
    }
}

fn count(report: &RunReport, outcome: Outcome) -> usize {
    report
        .packages
        .iter()
        .filter(|p| p.outcome == outcome)
        .count()
}
