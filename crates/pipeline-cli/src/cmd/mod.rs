pub mod config;
pub mod init;
pub mod template;

use anyhow::Context;
use pipeline_core::schema::ParameterValues;
use pipeline_core::service::TemplateService;
use pipeline_core::settings::Settings;
use serde_json::{Map, Value};
use std::path::Path;

/// Parse a command-line value as JSON, falling back to a plain string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Parse repeated `key=value` template parameters. Values stay text; the
/// template schema decides their type when it is applied.
pub fn parse_params(raw: &[String]) -> anyhow::Result<ParameterValues> {
    parse_pairs(raw, |v| Value::String(v.to_string()))
}

/// Parse repeated `key=value` settings, each value read with [`parse_value`].
pub fn parse_settings(raw: &[String]) -> anyhow::Result<Map<String, Value>> {
    parse_pairs(raw, parse_value)
}

fn parse_pairs(raw: &[String], convert: impl Fn(&str) -> Value) -> anyhow::Result<Map<String, Value>> {
    let mut values = Map::new();
    for item in raw {
        let (key, value) = item
            .split_once('=')
            .with_context(|| format!("invalid parameter '{item}': expected key=value"))?;
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("invalid parameter '{item}': empty key");
        }
        values.insert(key.to_string(), convert(value));
    }
    Ok(values)
}

/// Load settings and open the template library, seeding the predefined
/// tier on first use.
pub fn open_service(templates_dir: Option<&Path>) -> anyhow::Result<(Settings, TemplateService)> {
    let settings = Settings::load().context("failed to load settings")?;
    let store = settings
        .open_store(templates_dir)
        .context("failed to locate template library")?;
    let seeded = store
        .install_predefined()
        .context("failed to install predefined templates")?;
    if seeded > 0 {
        tracing::debug!(files = seeded, "seeded predefined templates");
    }
    Ok((settings, TemplateService::new(store)))
}
