//! `fleet init` and `fleet config`

use anyhow::{bail, Context, Result};
use console::style;
use std::path::{Path, PathBuf};

use crate::cli::OutputFormat;
use crate::core::config::{example_config, ScanConfig};

/// Write the example configuration to `output` or the default location
pub fn init_config(output: Option<PathBuf>, force: bool) -> Result<()> {
    let path = output.unwrap_or_else(ScanConfig::config_path);
    write_example(&path, force)?;

    println!(
        "{} Wrote example configuration: {}",
        style("✓").green().bold(),
        style(path.display()).green()
    );
    println!();
    println!("Next steps:");
    println!("  export FLEET_SSH_PASSWORD=...   or set ssh.private_key");
    println!("  fleet scan --targets terminals.csv");
    Ok(())
}

fn write_example(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Configuration already exists: {} (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }
    std::fs::write(path, example_config())
        .with_context(|| format!("Failed to write config file: {}", path.display()))
}

/// Hide the password part of a connection URL
fn redact_database_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.split_once('@') {
        Some((userinfo, host)) => {
            let user = userinfo.split(':').next().unwrap_or_default();
            if userinfo.contains(':') {
                format!("{scheme}://{user}:***@{host}")
            } else {
                url.to_string()
            }
        }
        None => url.to_string(),
    }
}

/// Print the effective configuration
pub fn show_config(config: &ScanConfig, format: OutputFormat) -> Result<()> {
    let mut shown = config.clone();
    shown.store.database_url = shown.store.database_url.as_deref().map(redact_database_url);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&shown)?),
        OutputFormat::Table => {
            println!("{}", style("Effective configuration").cyan().bold());
            println!("{}", style("=".repeat(40)).dim());
            print!("{}", toml::to_string_pretty(&shown)?);
            if config.ssh.password.is_some() {
                println!();
                println!("{}", style("# ssh password: set (hidden)").dim());
            }
        }
    }
    Ok(())
}
