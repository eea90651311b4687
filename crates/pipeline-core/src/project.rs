use crate::document;
use crate::error::{PipelineError, Result};
use crate::io;
use crate::paths;
use crate::stages;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};

pub const CONFIG_VERSION: &str = "1.0";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_ENVIRONMENT: &str = "dev";

pub const EXTRA_STAGES_KEY: &str = "extra_stages";

const GITIGNORE_ENTRY: &str = ".pipeline/";
const BACKUP_PREFIX: &str = "config_backup_";

// ---------------------------------------------------------------------------
// ProjectType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Node,
    Python,
    Go,
    Java,
    Docker,
    Generic,
}

impl ProjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectType::Node => "node",
            ProjectType::Python => "python",
            ProjectType::Go => "go",
            ProjectType::Java => "java",
            ProjectType::Docker => "docker",
            ProjectType::Generic => "generic",
        }
    }

    /// Runtime name and version for the generated build spec.
    fn runtime(self) -> (&'static str, &'static str) {
        match self {
            ProjectType::Node => ("nodejs", "18"),
            ProjectType::Python | ProjectType::Generic => ("python", "3.9"),
            ProjectType::Go => ("golang", "1.21"),
            ProjectType::Java => ("corretto", "17"),
            ProjectType::Docker => ("docker", "20"),
        }
    }

    fn build_commands(self) -> Value {
        let (install, test) = match self {
            ProjectType::Node => ("npm ci", "npm test"),
            ProjectType::Python | ProjectType::Generic => {
                ("pip install -r requirements.txt", "python -m pytest")
            }
            ProjectType::Go => ("go mod download", "go test ./..."),
            ProjectType::Java => ("mvn -B dependency:resolve", "mvn -B test"),
            ProjectType::Docker => ("docker --version", "docker build -t app ."),
        };
        json!({
            "pre_build": ["echo Logging in to Amazon ECR...", install],
            "build": [
                "echo Build started on `date`",
                "echo Running tests...",
                test,
                "echo Build completed on `date`"
            ],
            "post_build": ["echo Build completed successfully"]
        })
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guess the project type from marker files in `dir`.
pub fn detect_project_type(dir: &Path) -> ProjectType {
    let has = |file: &str| dir.join(file).exists();
    if has("package.json") {
        ProjectType::Node
    } else if has("requirements.txt") || has("setup.py") {
        ProjectType::Python
    } else if has("go.mod") {
        ProjectType::Go
    } else if has("pom.xml") {
        ProjectType::Java
    } else if has("Dockerfile") {
        ProjectType::Docker
    } else {
        ProjectType::Generic
    }
}

// ---------------------------------------------------------------------------
// Default document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ProjectConfigOptions {
    pub project_name: String,
    pub region: String,
    pub environment: String,
    pub project_type: ProjectType,
}

impl ProjectConfigOptions {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            region: DEFAULT_REGION.to_string(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            project_type: ProjectType::Generic,
        }
    }
}

pub fn default_config(opts: &ProjectConfigOptions) -> Value {
    let (runtime, version) = opts.project_type.runtime();
    json!({
        "version": CONFIG_VERSION,
        "project_name": opts.project_name,
        "aws_region": opts.region,
        "environment": opts.environment,
        "pipeline": {
            "type": "basic",
            "detected_type": opts.project_type,
            "build_spec": {
                "runtime": runtime,
                "version": version,
                "commands": opts.project_type.build_commands()
            },
            "artifacts": {"files": ["**/*"]}
        },
        "deployment": {
            "strategy": "rolling",
            "auto_rollback": true
        },
        "notifications": {
            "slack": {"enabled": false, "webhook_url": ""},
            "email": {"enabled": false, "addresses": []}
        }
    })
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Write a fresh `.pipeline/config.json` under `root`. An existing file is
/// only replaced when `force` is set. Also adds `.pipeline/` to an existing
/// `.gitignore`.
pub fn init(root: &Path, opts: &ProjectConfigOptions, force: bool) -> Result<PathBuf> {
    let path = paths::project_config_path(root);
    if path.exists() && !force {
        return Err(PipelineError::ProjectConfigExists(path));
    }
    io::write_json_pretty(&path, &default_config(opts))?;
    ensure_gitignored(root)?;
    tracing::debug!(path = %path.display(), "initialized project configuration");
    Ok(path)
}

fn ensure_gitignored(root: &Path) -> Result<bool> {
    let path = root.join(".gitignore");
    if !path.is_file() {
        return Ok(false);
    }
    let mut content = std::fs::read_to_string(&path)?;
    if content.lines().any(|l| l.trim() == GITIGNORE_ENTRY) {
        return Ok(false);
    }
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str("\n# Pipeline Creator\n");
    content.push_str(GITIGNORE_ENTRY);
    content.push('\n');
    io::atomic_write(&path, content.as_bytes())?;
    Ok(true)
}

pub fn load(root: &Path) -> Result<Value> {
    let path = paths::project_config_path(root);
    if !path.exists() {
        return Err(PipelineError::ProjectConfigNotFound(path));
    }
    io::read_json(&path)
}

pub fn save(root: &Path, config: &Value) -> Result<()> {
    io::write_json_pretty(&paths::project_config_path(root), config)
}

/// Read a dot-path key such as `aws_region` or `deployment.strategy`.
pub fn get_value(root: &Path, key: &str) -> Result<Value> {
    let config = load(root)?;
    document::get_path(&config, key)
        .cloned()
        .ok_or_else(|| PipelineError::ConfigKeyNotFound(key.to_string()))
}

/// Set a dot-path key, creating intermediate maps, and save.
pub fn set_value(root: &Path, key: &str, value: Value) -> Result<()> {
    let mut config = load_object(root)?;
    document::set_path(&mut config, key, value);
    save(root, &config)
}

/// Overlay `updates` onto the configuration: maps merge key by key, any
/// other value (lists included) replaces what was there.
pub fn merge(root: &Path, updates: Value) -> Result<()> {
    if !updates.is_object() {
        return Err(PipelineError::InvalidConfigDocument(
            "updates must be a JSON object".to_string(),
        ));
    }
    let config = load_object(root)?;
    save(root, &document::overlay(config, updates))
}

/// Writes through a non-object document would silently discard it.
fn load_object(root: &Path) -> Result<Value> {
    let config = load(root)?;
    if !config.is_object() {
        return Err(PipelineError::InvalidConfigDocument(format!(
            "{} is not a JSON object",
            paths::project_config_path(root).display()
        )));
    }
    Ok(config)
}

// ---------------------------------------------------------------------------
// Backups
// ---------------------------------------------------------------------------

/// Copy the configuration to `.pipeline/config_backup_<timestamp>.json`.
pub fn backup(root: &Path) -> Result<PathBuf> {
    let source = paths::project_config_path(root);
    if !source.is_file() {
        return Err(PipelineError::ProjectConfigNotFound(source));
    }
    let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let mut target = paths::config_backup_path(root, &stamp);
    let mut n = 1;
    while target.exists() {
        target = paths::config_backup_path(root, &format!("{stamp}_{n}"));
        n += 1;
    }
    std::fs::copy(&source, &target)?;
    tracing::debug!(path = %target.display(), "backed up project configuration");
    Ok(target)
}

/// Existing backups, oldest first.
pub fn list_backups(root: &Path) -> Result<Vec<PathBuf>> {
    let dir = root.join(paths::PIPELINE_DIR);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut backups = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let path = entry?.path();
        let is_backup = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(BACKUP_PREFIX) && n.ends_with(".json"));
        if is_backup {
            backups.push(path);
        }
    }
    backups.sort();
    Ok(backups)
}

/// Replace the configuration with the contents of `backup`, which must be a
/// JSON object.
pub fn restore(root: &Path, backup: &Path) -> Result<()> {
    if !backup.is_file() {
        return Err(PipelineError::BackupNotFound(backup.to_path_buf()));
    }
    let config: Value = io::read_json(backup)?;
    if !config.is_object() {
        return Err(PipelineError::InvalidConfigDocument(format!(
            "{} is not a JSON object",
            backup.display()
        )));
    }
    save(root, &config)?;
    tracing::debug!(from = %backup.display(), "restored project configuration");
    Ok(())
}

// ---------------------------------------------------------------------------
// Extra stages
// ---------------------------------------------------------------------------

/// Stages attached under `extra_stages`, in order.
pub fn extra_stages(config: &Value) -> Vec<Value> {
    config
        .get(EXTRA_STAGES_KEY)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn stage_name(stage: &Value) -> Option<&str> {
    stage.get("name").and_then(Value::as_str)
}

/// Attach catalog stage `name` configured with `settings`, replacing any
/// stage already attached under that name. Returns true when one was
/// replaced.
pub fn add_stage(root: &Path, name: &str, settings: Map<String, Value>) -> Result<bool> {
    let definition =
        stages::find(name).ok_or_else(|| PipelineError::UnknownStage(name.to_string()))?;
    let missing: Vec<String> = definition
        .required_keys()
        .filter(|key| !settings.contains_key(*key))
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::StageConfigMissing {
            stage: name.to_string(),
            keys: missing,
        });
    }

    let mut config = load_object(root)?;
    let mut attached = extra_stages(&config);
    let before = attached.len();
    attached.retain(|s| stage_name(s) != Some(name));
    let replaced = attached.len() < before;
    attached.push(json!({
        "name": definition.name,
        "enabled": true,
        "phase": definition.phase,
        "config": settings,
    }));
    document::set_path(&mut config, EXTRA_STAGES_KEY, Value::Array(attached));
    save(root, &config)?;
    tracing::debug!(stage = name, replaced, "attached extra stage");
    Ok(replaced)
}

/// Detach every stage called `name`. Returns false when none was attached.
pub fn remove_stage(root: &Path, name: &str) -> Result<bool> {
    let mut config = load_object(root)?;
    let mut attached = extra_stages(&config);
    let before = attached.len();
    attached.retain(|s| stage_name(s) != Some(name));
    if attached.len() == before {
        return Ok(false);
    }
    document::set_path(&mut config, EXTRA_STAGES_KEY, Value::Array(attached));
    save(root, &config)?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

impl ConfigWarning {
    fn error(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            message: message.into(),
        }
    }
}

/// Structural checks on a project configuration document.
pub fn validate(config: &Value) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();
    let has = |path: &str| document::get_path(config, path).is_some();

    for field in ["version", "project_name", "aws_region", "pipeline"] {
        if !has(field) {
            warnings.push(ConfigWarning::error(format!("Missing required field: {field}")));
        }
    }

    if has("pipeline") {
        for field in ["build_spec", "artifacts"] {
            if !has(&format!("pipeline.{field}")) {
                warnings.push(ConfigWarning::error(format!(
                    "Missing required pipeline field: {field}"
                )));
            }
        }
    }

    if has("pipeline.build_spec") {
        match document::get_path(config, "pipeline.build_spec.commands") {
            None => warnings.push(ConfigWarning::error(
                "Missing required build_spec field: commands",
            )),
            Some(commands) => {
                for phase in ["pre_build", "build", "post_build"] {
                    match commands.get(phase) {
                        None => warnings.push(ConfigWarning::warning(format!(
                            "Missing build phase: {phase}"
                        ))),
                        Some(v) if !v.is_array() => warnings.push(ConfigWarning::error(format!(
                            "Build phase {phase} should be a list of commands"
                        ))),
                        Some(_) => {}
                    }
                }
            }
        }
    }

    let enabled = |path: &str| {
        document::get_path(config, &format!("{path}.enabled")).and_then(Value::as_bool) == Some(true)
    };
    let is_blank = |path: &str| match document::get_path(config, path) {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(_) => false,
    };
    if enabled("notifications.slack") && is_blank("notifications.slack.webhook_url") {
        warnings.push(ConfigWarning::warning(
            "Slack enabled but no webhook URL configured",
        ));
    }
    if enabled("notifications.email") && is_blank("notifications.email.addresses") {
        warnings.push(ConfigWarning::warning(
            "Email enabled but no addresses configured",
        ));
    }

    warnings
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
