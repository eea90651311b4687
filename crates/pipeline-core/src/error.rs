use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("template already exists: {0}")]
    TemplateExists(String),

    #[error("base template not found: {0}")]
    BaseTemplateNotFound(String),

    #[error("invalid template name '{0}': must be alphanumeric with '-', '_' or '.'")]
    InvalidTemplateName(String),

    #[error("invalid category '{0}'")]
    InvalidCategory(String),

    #[error("invalid parameter type '{0}'")]
    InvalidParameterKind(String),

    #[error("invalid template definition '{name}': {}", .errors.join("; "))]
    InvalidDefinition { name: String, errors: Vec<String> },

    #[error("parameter validation failed: {}", .0.join("; "))]
    ParameterValidation(Vec<String>),

    #[error("template '{0}' does not produce a JSON object document")]
    NonObjectDocument(String),

    #[error("circular inheritance detected: {chain}")]
    CircularInheritance { chain: String },

    #[error("invalid template source: {}", .0.display())]
    InvalidImportSource(PathBuf),

    #[error("no project configuration found at {}", .0.display())]
    ProjectConfigNotFound(PathBuf),

    #[error("project configuration already exists at {}", .0.display())]
    ProjectConfigExists(PathBuf),

    #[error("configuration key not found: {0}")]
    ConfigKeyNotFound(String),

    #[error("unknown stage '{0}'")]
    UnknownStage(String),

    #[error("stage '{stage}' requires configuration: {}", .keys.join(", "))]
    StageConfigMissing { stage: String, keys: Vec<String> },

    #[error("backup not found: {}", .0.display())]
    BackupNotFound(PathBuf),

    #[error("invalid configuration document: {0}")]
    InvalidConfigDocument(String),

    #[error("home directory not found: set HOME or PIPELINE_TEMPLATES_DIR")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
