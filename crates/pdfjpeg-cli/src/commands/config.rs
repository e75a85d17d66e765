//! Config command - manage the JSON configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use console::style;
use serde_json::Value;
use tracing::debug;

use pdfjpeg_core::PdfJpegConfig;

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Get a configuration value
    Get {
        /// Dotted key (e.g., "pdf.max_pages")
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Dotted key
        key: String,
        /// New value, parsed as JSON when possible
        value: String,
    },

    /// Show configuration file path
    Path,
}

pub fn run(args: ConfigArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    match args.command {
        ConfigCommand::Show => {
            if !path.exists() {
                eprintln!("{} No config file found, showing defaults.", style("ℹ").blue());
            }
            let config = load_config(config_path)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommand::Init { force } => init_config(&path, force)?,
        ConfigCommand::Get { key } => {
            let json = serde_json::to_value(load_config(config_path)?)?;
            let value = lookup(&json, &key)
                .ok_or_else(|| anyhow::anyhow!("Configuration key not found: {}", key))?;
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        ConfigCommand::Set { key, value } => set_config(&path, config_path, &key, &value)?,
        ConfigCommand::Path => {
            println!("Configuration file: {}", path.display());
            if path.exists() {
                println!("Status: {}", style("exists").green());
            } else {
                println!("Status: {}", style("not created").yellow());
                println!();
                println!("Run 'pdfjpeg config init' to create a configuration file.");
            }
        }
    }

    Ok(())
}

/// Load the config from an explicit path, the default location, or defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<PdfJpegConfig> {
    if let Some(path) = config_path {
        return Ok(PdfJpegConfig::from_file(Path::new(path))?);
    }

    let default_path = default_config_path();
    if default_path.exists() {
        debug!("Using config at {}", default_path.display());
        Ok(PdfJpegConfig::from_file(&default_path)?)
    } else {
        Ok(PdfJpegConfig::default())
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pdfjpeg")
        .join("config.json")
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    PdfJpegConfig::default().save(path)?;

    println!(
        "{} Created configuration file at {}",
        style("✓").green(),
        path.display()
    );
    Ok(())
}

fn set_config(path: &Path, config_path: Option<&str>, key: &str, value: &str) -> anyhow::Result<()> {
    let parsed: Value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));

    let mut json = if path.exists() {
        serde_json::to_value(load_config(config_path)?)?
    } else {
        serde_json::to_value(PdfJpegConfig::default())?
    };

    let (parent, field) = match key.rsplit_once('.') {
        Some((parent, field)) => (lookup_mut(&mut json, parent), field),
        None => (Some(&mut json), key),
    };
    let object = parent
        .and_then(Value::as_object_mut)
        .ok_or_else(|| anyhow::anyhow!("Configuration path not found: {}", key))?;
    if !object.contains_key(field) {
        anyhow::bail!("Configuration key not found: {}", key);
    }
    object.insert(field.to_string(), parsed.clone());

    let config: PdfJpegConfig = serde_json::from_value(json)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    config.save(path)?;

    println!(
        "{} Set {} = {}",
        style("✓").green(),
        key,
        serde_json::to_string(&parsed)?
    );
    Ok(())
}

fn lookup<'a>(json: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(json, |current, part| current.get(part))
}

fn lookup_mut<'a>(json: &'a mut Value, key: &str) -> Option<&'a mut Value> {
    key.split('.').try_fold(json, |current, part| current.get_mut(part))
}
