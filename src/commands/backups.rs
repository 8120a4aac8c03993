//! Backups command - list what previous runs moved aside
//!
//! Layout: `<backups>/<run-timestamp>[-N]/<origin>/<package>/<relative-path>`.
//! Backups are never pruned automatically.

use anyhow::{Context as _, Result};
use chrono::NaiveDateTime;
use colored::Colorize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use stowkit::resolver::TIMESTAMP_FORMAT;
use walkdir::WalkDir;

use super::Session;
use crate::paths::contract_home;
use crate::{Context, Finish, ui};

/// One run's backup root
#[derive(Debug, Clone, PartialEq, Eq)]
struct BackupRun {
    name: String,
    taken_at: Option<NaiveDateTime>,
    path: PathBuf,
    packages: Vec<BackedUpPackage>,
}

/// Paths one package had moved aside in a run
#[derive(Debug, Clone, PartialEq, Eq)]
struct BackedUpPackage {
    origin: String,
    package: String,
    /// Files and symlinks held (directories are counted by their contents)
    entries: usize,
}

pub fn list(ctx: &Context) -> Result<Finish> {
    let session = Session::load(ctx)?;
    let dir = session.options.backups_dir();
    let runs = collect_runs(&dir)
        .with_context(|| format!("Could not read backups at {}", dir.display()))?;

    ui::header(&format!("Backups ({})", contract_home(&dir)));
    if runs.is_empty() {
        ui::dim("No backups yet");
        return Ok(Finish::Clean);
    }

    for run in &runs {
        let when = run.taken_at.map_or_else(
            || run.name.clone(),
            |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
        );
        println!();
        println!("  {} {}", when.bold(), contract_home(&run.path).bright_black());
        for pkg in &run.packages {
            println!(
                "    {:<20} {:>4} path(s) {}",
                pkg.package,
                pkg.entries,
                format!("[{}]", pkg.origin).dimmed()
            );
        }
    }
    println!();

    Ok(Finish::Clean)
}

fn collect_runs(dir: &Path) -> Result<Vec<BackupRun>> {
    let mut runs = Vec::new();
    for run_dir in subdirs(dir)? {
        let name = file_name(&run_dir);
        let stamp = name.split('-').next().unwrap_or(&name);
        let taken_at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok();

        let mut packages = Vec::new();
        for origin_dir in subdirs(&run_dir)? {
            for package_dir in subdirs(&origin_dir)? {
                packages.push(BackedUpPackage {
                    origin: file_name(&origin_dir),
                    package: file_name(&package_dir),
                    entries: count_entries(&package_dir),
                });
            }
        }

        runs.push(BackupRun {
            name,
            taken_at,
            path: run_dir,
            packages,
        });
    }
    Ok(runs)
}

/// Sorted subdirectories; a missing directory has none.
fn subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let read = match fs::read_dir(dir) {
        Ok(read) => read,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut dirs = Vec::new();
    for entry in read {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn count_entries(dir: &Path) -> usize {
    WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| !e.file_type().is_dir())
        .count()
}
