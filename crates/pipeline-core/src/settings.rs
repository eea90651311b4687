use crate::error::Result;
use crate::paths;
use crate::store::{ShadowPolicy, TemplateStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the template library location.
pub const TEMPLATES_DIR_ENV: &str = "PIPELINE_TEMPLATES_DIR";

/// Tool-level settings from `~/.pipeline-creator/settings.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Template library root. Defaults to `~/.pipeline-creator/templates`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<PathBuf>,
    #[serde(default)]
    pub shadow_policy: ShadowPolicy,
    /// Author recorded on templates created without an explicit one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_author: Option<String>,
}

impl Settings {
    /// Missing file means defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&paths::settings_path()?)
    }

    /// Template root: explicit override, then the settings file, then the
    /// default under the home directory.
    pub fn templates_root(&self, override_dir: Option<&Path>) -> Result<PathBuf> {
        if let Some(dir) = override_dir {
            return Ok(dir.to_path_buf());
        }
        match &self.templates_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::default_templates_root(),
        }
    }

    pub fn open_store(&self, override_dir: Option<&Path>) -> Result<TemplateStore> {
        let root = self.templates_root(override_dir)?;
        tracing::debug!(root = %root.display(), policy = ?self.shadow_policy, "opening template store");
        Ok(TemplateStore::new(root).with_policy(self.shadow_policy))
    }

    pub fn author_or_default(&self, author: Option<String>) -> String {
        author
            .or_else(|| self.default_author.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_or_empty_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.yaml");
        assert_eq!(Settings::load_from(&path).unwrap(), Settings::default());

        std::fs::write(&path, "\n").unwrap();
        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.shadow_policy, ShadowPolicy::UserFirst);
    }

    #[test]
    fn parses_partial_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(&path, "shadow_policy: predefined-first\ndefault_author: ops\n").unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.shadow_policy, ShadowPolicy::PredefinedFirst);
        assert_eq!(settings.default_author.as_deref(), Some("ops"));
        assert_eq!(settings.templates_dir, None);
        assert_eq!(settings.author_or_default(None), "ops");
        assert_eq!(settings.author_or_default(Some("me".into())), "me");
    }

    #[test]
    fn load_reads_policy_and_library() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(
            &path,
            format!(
                "templates_dir: {}\nshadow_policy: predefined-first\n",
                dir.path().join("lib").display()
            ),
        )
        .unwrap();
        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(
            settings,
            Settings {
                templates_dir: Some(dir.path().join("lib")),
                shadow_policy: ShadowPolicy::PredefinedFirst,
                default_author: None,
            }
        );
    }

    #[test]
    fn templates_root_precedence() {
        let dir = TempDir::new().unwrap();
        let from_file = dir.path().join("from-file");
        let from_flag = dir.path().join("from-flag");
        let settings = Settings {
            templates_dir: Some(from_file.clone()),
            ..Settings::default()
        };

        assert_eq!(settings.templates_root(Some(&from_flag)).unwrap(), from_flag);
        assert_eq!(settings.templates_root(None).unwrap(), from_file);

        let store = settings.open_store(None).unwrap();
        assert_eq!(store.root(), from_file.as_path());
    }
}
