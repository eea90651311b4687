use crate::cmd::{parse_settings, parse_value};
use crate::output::{print_json, print_table, print_value};
use anyhow::Context;
use clap::Subcommand;
use pipeline_core::project::{self, WarnLevel};
use pipeline_core::{io, stages};
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the whole project configuration
    Show,

    /// Print one value by dot path (e.g. deployment.strategy)
    Get { key: String },

    /// Set a value by dot path; the value is parsed as JSON, else kept as a string
    Set { key: String, value: String },

    /// Check the configuration for missing sections
    Validate,

    /// Deep-merge a JSON file into the configuration (lists are replaced)
    Merge { file: PathBuf },

    /// List the extra build stages that can be attached
    Stages {
        /// Show the stages attached to this project instead
        #[arg(long)]
        current: bool,
    },

    /// Attach an extra build stage, replacing one of the same name
    AddStage {
        name: String,
        /// Stage setting as key=value (repeatable)
        #[arg(short = 's', long = "set")]
        settings: Vec<String>,
    },

    /// Detach an extra build stage
    RemoveStage { name: String },

    /// Copy the configuration to a timestamped backup
    Backup,

    /// List configuration backups
    Backups,

    /// Restore the configuration from a backup (default: the latest)
    Restore { file: Option<PathBuf> },
}

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root),
        ConfigSubcommand::Get { key } => get(root, &key),
        ConfigSubcommand::Set { key, value } => set(root, &key, &value, json),
        ConfigSubcommand::Validate => validate(root, json),
        ConfigSubcommand::Merge { file } => merge(root, &file, json),
        ConfigSubcommand::Stages { current } => {
            if current {
                attached_stages(root, json)
            } else {
                catalog(json)
            }
        }
        ConfigSubcommand::AddStage { name, settings } => add_stage(root, &name, &settings, json),
        ConfigSubcommand::RemoveStage { name } => remove_stage(root, &name, json),
        ConfigSubcommand::Backup => backup(root, json),
        ConfigSubcommand::Backups => backups(root, json),
        ConfigSubcommand::Restore { file } => restore(root, file, json),
    }
}

fn show(root: &Path) -> anyhow::Result<()> {
    let config = project::load(root).context("failed to load project configuration")?;
    print_json(&config)
}

fn get(root: &Path, key: &str) -> anyhow::Result<()> {
    let value = project::get_value(root, key)
        .with_context(|| format!("failed to read '{key}'"))?;
    print_value(&value)
}

fn set(root: &Path, key: &str, raw: &str, json: bool) -> anyhow::Result<()> {
    let value = parse_value(raw);
    project::set_value(root, key, value.clone())
        .with_context(|| format!("failed to set '{key}'"))?;

    if json {
        print_json(&serde_json::json!({ "key": key, "value": value }))?;
    } else {
        println!("Set {key} = {value}");
    }
    Ok(())
}

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = project::load(root).context("failed to load project configuration")?;
    let warnings = project::validate(&config);

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}

fn merge(root: &Path, file: &Path, json: bool) -> anyhow::Result<()> {
    let updates: Value =
        io::read_json(file).with_context(|| format!("failed to read {}", file.display()))?;
    project::merge(root, updates).context("failed to merge configuration")?;
    if json {
        print_json(&serde_json::json!({ "merged": file }))
    } else {
        println!("Merged {} into the configuration", file.display());
        Ok(())
    }
}

fn catalog(json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&stages::catalog());
    }
    let rows = stages::catalog()
        .iter()
        .map(|s| {
            vec![
                s.name.to_string(),
                s.phase.to_string(),
                s.required_keys().collect::<Vec<_>>().join(", "),
                s.description.to_string(),
            ]
        })
        .collect();
    print_table(&["NAME", "PHASE", "REQUIRES", "DESCRIPTION"], rows);
    Ok(())
}

fn attached_stages(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = project::load(root).context("failed to load project configuration")?;
    let attached = project::extra_stages(&config);
    if json {
        return print_json(&attached);
    }
    if attached.is_empty() {
        println!("No extra stages configured.");
        return Ok(());
    }
    let text = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
    let rows = attached
        .iter()
        .map(|s| {
            let enabled = s.get("enabled").and_then(Value::as_bool).unwrap_or(true);
            let settings = match s.get("config") {
                Some(Value::Object(m)) if !m.is_empty() => Value::Object(m.clone()).to_string(),
                _ => String::new(),
            };
            vec![
                text(s, "name"),
                text(s, "phase"),
                if enabled { "yes" } else { "no" }.to_string(),
                settings,
            ]
        })
        .collect();
    print_table(&["NAME", "PHASE", "ENABLED", "CONFIG"], rows);
    Ok(())
}

fn add_stage(root: &Path, name: &str, raw: &[String], json: bool) -> anyhow::Result<()> {
    let settings = parse_settings(raw)?;
    let replaced = project::add_stage(root, name, settings)
        .with_context(|| format!("failed to add stage '{name}'"))?;

    if json {
        return print_json(&serde_json::json!({ "stage": name, "replaced": replaced }));
    }
    let verb = if replaced { "Replaced" } else { "Added" };
    println!("{verb} stage '{name}'");
    if let Some(definition) = stages::find(name) {
        for secret in definition.secrets {
            println!("  requires secret '{}' (as {})", secret.secret, secret.env);
        }
    }
    Ok(())
}

fn remove_stage(root: &Path, name: &str, json: bool) -> anyhow::Result<()> {
    let removed = project::remove_stage(root, name)
        .with_context(|| format!("failed to remove stage '{name}'"))?;
    if !removed {
        anyhow::bail!("stage '{name}' is not attached");
    }
    if json {
        print_json(&serde_json::json!({ "removed": name }))
    } else {
        println!("Removed stage '{name}'");
        Ok(())
    }
}

fn backup(root: &Path, json: bool) -> anyhow::Result<()> {
    let path = project::backup(root).context("failed to back up configuration")?;
    if json {
        print_json(&serde_json::json!({ "backup": path }))
    } else {
        println!("Backed up configuration to {}", path.display());
        Ok(())
    }
}

fn backups(root: &Path, json: bool) -> anyhow::Result<()> {
    let found = project::list_backups(root)?;
    if json {
        return print_json(&found);
    }
    if found.is_empty() {
        println!("No backups found.");
    }
    for path in &found {
        println!("{}", path.display());
    }
    Ok(())
}

fn restore(root: &Path, file: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let file = match file {
        Some(file) => file,
        None => project::list_backups(root)?
            .pop()
            .context("no configuration backups found")?,
    };
    project::restore(root, &file)
        .with_context(|| format!("failed to restore from {}", file.display()))?;
    if json {
        print_json(&serde_json::json!({ "restored": file }))
    } else {
        println!("Restored configuration from {}", file.display());
        Ok(())
    }
}
