use crate::error::{PipelineError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Project layout
// ---------------------------------------------------------------------------

pub const PIPELINE_DIR: &str = ".pipeline";
pub const PROJECT_CONFIG_FILE: &str = ".pipeline/config.json";
/// Document produced by applying a template to a project.
pub const PIPELINE_DOCUMENT: &str = "pipeline.json";

// ---------------------------------------------------------------------------
// Template library layout
// ---------------------------------------------------------------------------

pub const HOME_DIR: &str = ".pipeline-creator";
pub const TEMPLATES_DIR: &str = "templates";
pub const SETTINGS_FILE: &str = "settings.yaml";
pub const PREDEFINED_DIR: &str = "predefined";
pub const USER_DIR: &str = "user";

pub const SCHEMA_FILE: &str = "template.json";
pub const CONFIG_FILE: &str = "config.json";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn project_config_path(root: &Path) -> PathBuf {
    root.join(PROJECT_CONFIG_FILE)
}

/// `.pipeline/config_backup_<stamp>.json`
pub fn config_backup_path(root: &Path, stamp: &str) -> PathBuf {
    root.join(PIPELINE_DIR).join(format!("config_backup_{stamp}.json"))
}

pub fn pipeline_document_path(project: &Path) -> PathBuf {
    project.join(PIPELINE_DOCUMENT)
}

/// `~/.pipeline-creator`
pub fn home_dir() -> Result<PathBuf> {
    home::home_dir()
        .map(|h| h.join(HOME_DIR))
        .ok_or(PipelineError::HomeNotFound)
}

pub fn default_templates_root() -> Result<PathBuf> {
    Ok(home_dir()?.join(TEMPLATES_DIR))
}

pub fn settings_path() -> Result<PathBuf> {
    Ok(home_dir()?.join(SETTINGS_FILE))
}

pub fn predefined_dir(templates_root: &Path) -> PathBuf {
    templates_root.join(PREDEFINED_DIR)
}

pub fn user_dir(templates_root: &Path) -> PathBuf {
    templates_root.join(USER_DIR)
}

pub fn schema_file(template_dir: &Path) -> PathBuf {
    template_dir.join(SCHEMA_FILE)
}

pub fn config_file(template_dir: &Path) -> PathBuf {
    template_dir.join(CONFIG_FILE)
}

// ---------------------------------------------------------------------------
// Template name validation
// ---------------------------------------------------------------------------

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._\-]*$").unwrap())
}

/// Template names double as directory names, so they must be a single safe
/// path component.
pub fn validate_template_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 || !name_re().is_match(name) {
        return Err(PipelineError::InvalidTemplateName(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        for name in ["T1", "python-api", "base_pipeline", "web.v2", "a"] {
            validate_template_name(name).unwrap_or_else(|_| panic!("expected valid: {name}"));
        }
    }

    #[test]
    fn invalid_names() {
        for name in ["", "-dash", ".hidden", "has space", "a/b", "..", "x\\y"] {
            assert!(
                validate_template_name(name).is_err(),
                "expected invalid: {name}"
            );
        }
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/lib");
        assert_eq!(
            schema_file(&user_dir(root).join("api")),
            PathBuf::from("/tmp/lib/user/api/template.json")
        );
        assert_eq!(
            config_file(&predefined_dir(root).join("api")),
            PathBuf::from("/tmp/lib/predefined/api/config.json")
        );
        assert_eq!(
            project_config_path(Path::new("/proj")),
            PathBuf::from("/proj/.pipeline/config.json")
        );
        assert_eq!(
            config_backup_path(Path::new("/proj"), "20240101_120000"),
            PathBuf::from("/proj/.pipeline/config_backup_20240101_120000.json")
        );
    }
}
