//! Host identity for ledger step ids.
//!
//! Resolution order: config override, `HOSTNAME`, `/etc/hostname`, the
//! `hostname` command, then `localhost`.

use crate::runner;
use std::path::Path;

const HOSTNAME_FILE: &str = "/etc/hostname";
const FALLBACK: &str = "localhost";

/// Resolve the identity of this host.
pub fn identity(config_name: Option<&str>) -> String {
    resolve(config_name, Path::new(HOSTNAME_FILE))
}

fn resolve(config_name: Option<&str>, hostname_file: &Path) -> String {
    if let Some(name) = config_name.and_then(non_empty) {
        log::debug!("Host identity from config: {name}");
        return name;
    }

    if let Some(name) = std::env::var("HOSTNAME").ok().as_deref().and_then(non_empty) {
        log::debug!("Host identity from HOSTNAME: {name}");
        return name;
    }

    if let Some(name) = std::fs::read_to_string(hostname_file)
        .ok()
        .as_deref()
        .and_then(non_empty)
    {
        log::debug!("Host identity from {}: {name}", hostname_file.display());
        return name;
    }

    if runner::command_exists("hostname") {
        match runner::run_capture("hostname", &[]) {
            Ok(out) => {
                if let Some(name) = non_empty(&out) {
                    log::debug!("Host identity from hostname command: {name}");
                    return name;
                }
            }
            Err(e) => log::debug!("hostname command failed: {e}"),
        }
    }

    log::warn!("Could not determine host identity, using '{FALLBACK}'");
    FALLBACK.to_string()
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
