//! Configuration commands.
//!
//! - `config show`: Display every key and where the file lives
//! - `config get`: Print one key
//! - `config set`: Validate and store one key

use owo_colors::OwoColorize;
use serde_json::json;

use super::print_json;
use crate::config::{CONFIG_KEYS, Config};
use crate::error::Result;

/// Show current configuration
pub fn cmd_config_show(json: bool) -> Result<()> {
    let config = Config::load()?;
    let path = Config::config_path()?;

    let mut entries = Vec::with_capacity(CONFIG_KEYS.len());
    for key in CONFIG_KEYS {
        entries.push((*key, config.get(key)?));
    }

    if json {
        let values: serde_json::Map<String, serde_json::Value> = entries
            .iter()
            .map(|(key, value)| (key.to_string(), json!(value)))
            .collect();
        return print_json(&json!({
            "config_file": path.to_string_lossy(),
            "values": values,
            "api_url_configured": config.api_url().is_some(),
            "api_key_configured": config.api_key().is_some(),
        }));
    }

    println!("{}\n", "Configuration:".cyan().bold());
    for (key, value) in &entries {
        if value.is_empty() {
            println!("  {}: {}", key.cyan(), "not set".dimmed());
        } else {
            println!("  {}: {value}", key.cyan());
        }
    }
    if config.api_url().is_some() != config.api.url.is_some()
        || config.api_key().is_some() != config.api.key.is_some()
    {
        println!("\n{}", "api settings overridden by environment".yellow());
    }
    println!("\n{}", format!("Config file: {}", path.display()).dimmed());
    Ok(())
}

/// Print one configuration value
pub fn cmd_config_get(key: &str, json: bool) -> Result<()> {
    let config = Config::load()?;
    let value = config.get(key)?;

    if json {
        return print_json(&json!({ "key": key, "value": value }));
    }
    println!("{value}");
    Ok(())
}

/// Set a configuration value
pub fn cmd_config_set(key: &str, value: &str, json: bool) -> Result<()> {
    let mut config = Config::load()?;
    config.set(key, value)?;
    config.save()?;

    let shown = config.get(key)?;
    if json {
        return print_json(&json!({
            "action": "config_set",
            "key": key,
            "value": shown,
            "success": true,
        }));
    }
    if shown.is_empty() {
        println!("Cleared {}", key.cyan());
    } else {
        println!("Set {} = {shown}", key.cyan());
    }
    Ok(())
}
