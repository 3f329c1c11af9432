//! Config command implementations

use std::path::Path;

use anyhow::{Context, Result};

use pl_core::config::{Settings, ACCESS_TOKEN_ENV};

use crate::output::{print_info, print_json, print_warning};

/// Show the effective settings, with the access token masked
pub fn config_show_command(config_path: &Path, json: bool) -> Result<()> {
    let mut settings = Settings::load_or_default(config_path)
        .with_context(|| format!("Failed to load settings from {:?}", config_path))?;
    if settings.api.access_token.is_some() {
        settings.api.access_token = Some("********".to_string());
    }

    if json {
        return print_json(&settings);
    }

    if config_path.exists() {
        print_info(&format!("Configuration file: {}", config_path.display()));
    } else {
        print_warning(&format!(
            "No configuration file at {}, showing defaults",
            config_path.display()
        ));
    }
    if std::env::var_os(ACCESS_TOKEN_ENV).is_some() {
        print_info(&format!("Access token taken from {}", ACCESS_TOKEN_ENV));
    }
    println!();
    println!("{}", toml::to_string_pretty(&settings)?);
    Ok(())
}

/// Print the settings file path
pub fn config_path_command(config_path: &Path) {
    println!("{}", config_path.display());
}
