//! Init command - write a starter config

use anyhow::{Result, bail};
use colored::Colorize;
use stowkit::Markers;

use super::discover_packages;
use crate::cli::InitArgs;
use crate::paths;
use crate::runner;
use crate::schema::DotlinkConfig;
use crate::{Context, Finish, ui};

pub fn run(ctx: &Context, args: &InitArgs) -> Result<Finish> {
    let config_path = match &ctx.config {
        Some(path) => path.clone(),
        None => paths::config_file()?,
    };

    if config_path.exists() && !args.force {
        bail!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let mut config = DotlinkConfig::default();
    if let Some(source) = &ctx.source {
        config.packages.source.clone_from(source);
    }
    if let Some(target) = &ctx.target {
        config.packages.target.clone_from(target);
    }

    let source_root = paths::expand(&config.packages.source);
    let target_root = paths::expand(&config.packages.target);
    let packages = discover_packages(&source_root, &Markers::default())?;

    config.packages.include.clone_from(&packages);
    config.validate()?;
    let saved = config.save_to(&config_path)?;

    if !ctx.quiet {
        println!("{}", "dotlink Config Initialized".bold().green());
        println!("{}", "─".repeat(40));
        println!("Source:   {}", source_root.display());
        println!("Target:   {}", target_root.display());
        println!("Packages: {}", packages.join(", "));
        println!();
        println!("Config saved to: {}", saved.display());
        println!();
        println!("Next steps:");
        println!("  {} - Preview what will be linked", "dotlink plan".cyan());
        println!("  {} - Create the links", "dotlink apply".cyan());
    }

    if !runner::command_exists(&config.packages.stow) {
        ui::warn(&format!(
            "'{}' was not found on PATH; install GNU stow before running apply",
            config.packages.stow
        ));
    }

    Ok(Finish::Clean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn context(temp: &TempDir) -> Context {
        Context {
            verbose: 0,
            quiet: true,
            config: Some(temp.path().join("cfg").join("config.toml")),
            source: Some(temp.path().join("dotfiles").display().to_string()),
            target: Some(temp.path().join("home").display().to_string()),
        }
    }

    #[test]
    fn test_init_writes_discovered_packages() {
        let temp = TempDir::new().unwrap();
        for dir in ["dotfiles/zsh", "dotfiles/git", "dotfiles/.git", "dotfiles/scripts"] {
            fs::create_dir_all(temp.path().join(dir)).unwrap();
        }
        let ctx = context(&temp);

        run(&ctx, &InitArgs { force: false }).unwrap();

        let config = DotlinkConfig::load_from(ctx.config.as_ref().unwrap()).unwrap();
        assert_eq!(config.packages.include, vec!["git", "zsh"]);
        assert_eq!(
            config.packages.source,
            temp.path().join("dotfiles").display().to_string()
        );
    }

    #[test]
    fn test_init_refuses_to_overwrite_without_force() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("dotfiles/zsh")).unwrap();
        let ctx = context(&temp);

        run(&ctx, &InitArgs { force: false }).unwrap();
        assert!(run(&ctx, &InitArgs { force: false }).is_err());
        run(&ctx, &InitArgs { force: true }).unwrap();
    }

    #[test]
    fn test_init_requires_source_root() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        assert!(run(&ctx, &InitArgs { force: false }).is_err());
        assert!(!ctx.config.as_ref().unwrap().exists());
    }
}
