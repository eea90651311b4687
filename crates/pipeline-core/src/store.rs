use crate::error::{PipelineError, Result};
use crate::io;
use crate::paths;
use crate::schema::{ParameterSpec, TemplateCategory, TemplateSchema, DEFAULT_VERSION};
use rust_embed::Embed;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};

/// Templates shipped with the binary, installed into the predefined tier.
#[derive(Embed)]
#[folder = "$CARGO_MANIFEST_DIR/predefined/"]
struct Builtin;

// ---------------------------------------------------------------------------
// Tier / ShadowPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Predefined,
    User,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Predefined => "predefined",
            Tier::User => "user",
        };
        f.write_str(s)
    }
}

/// Which tier answers a lookup when both hold a template of the same name.
/// `list` is unaffected and always returns both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShadowPolicy {
    #[default]
    UserFirst,
    PredefinedFirst,
}

impl ShadowPolicy {
    fn lookup_order(self) -> [Tier; 2] {
        match self {
            ShadowPolicy::UserFirst => [Tier::User, Tier::Predefined],
            ShadowPolicy::PredefinedFirst => [Tier::Predefined, Tier::User],
        }
    }
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub schema: TemplateSchema,
    pub config: Value,
    /// Directory the template was loaded from or written to.
    pub path: PathBuf,
    pub tier: Tier,
}

impl Template {
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn id(&self) -> String {
        self.schema.id()
    }

    pub fn to_bundle(&self) -> TemplateBundle {
        TemplateBundle {
            schema: self.schema.clone(),
            config: self.config.clone(),
        }
    }
}

/// Self-contained single-document form used by import and export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateBundle {
    pub schema: TemplateSchema,
    pub config: Value,
}

/// Input for [`TemplateStore::create`].
#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub name: String,
    pub description: String,
    pub category: TemplateCategory,
    pub author: String,
    pub config: Value,
    pub parameters: Vec<ParameterSpec>,
    pub tags: Vec<String>,
    pub extends: Option<String>,
    pub requirements: Option<Vec<String>>,
    /// Replace an existing user template of the same name.
    pub overwrite: bool,
}

impl NewTemplate {
    pub fn new(name: impl Into<String>, category: TemplateCategory, config: Value) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            category,
            author: String::new(),
            config,
            parameters: Vec::new(),
            tags: Vec::new(),
            extends: None,
            requirements: None,
            overwrite: false,
        }
    }

    fn into_parts(self) -> (TemplateSchema, Value, bool) {
        let schema = TemplateSchema {
            name: self.name,
            version: DEFAULT_VERSION.to_string(),
            description: self.description,
            category: self.category,
            author: self.author,
            tags: self.tags,
            extends: self.extends,
            requirements: self.requirements,
            parameters: self.parameters,
        };
        (schema, self.config, self.overwrite)
    }
}

// ---------------------------------------------------------------------------
// TemplateStore
// ---------------------------------------------------------------------------

/// Filesystem catalog of templates.
///
/// ```text
/// <root>/predefined/<name>/template.json   read-only tier
/// <root>/predefined/<name>/config.json
/// <root>/user/<name>/template.json         read-write tier
/// <root>/user/<name>/config.json
/// ```
#[derive(Debug, Clone)]
pub struct TemplateStore {
    root: PathBuf,
    policy: ShadowPolicy,
}

impl TemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            policy: ShadowPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ShadowPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tier_dir(&self, tier: Tier) -> PathBuf {
        match tier {
            Tier::Predefined => paths::predefined_dir(&self.root),
            Tier::User => paths::user_dir(&self.root),
        }
    }

    // ---------------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------------

    /// Predefined templates followed by user templates, each tier in name
    /// order. A name present in both tiers is returned twice.
    pub fn list(&self, category: Option<TemplateCategory>) -> Result<Vec<Template>> {
        let mut templates = self.load_tier(Tier::Predefined)?;
        templates.extend(self.load_tier(Tier::User)?);
        if let Some(category) = category {
            templates.retain(|t| t.schema.category == category);
        }
        Ok(templates)
    }

    /// First template named `name` (and matching `version`, when given),
    /// searching tiers in the order set by the store's [`ShadowPolicy`].
    pub fn find(&self, name: &str, version: Option<&str>) -> Result<Option<Template>> {
        for tier in self.policy.lookup_order() {
            let found = self.load_tier(tier)?.into_iter().find(|t| {
                t.schema.name == name && version.map_or(true, |v| t.schema.version == v)
            });
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    pub fn get(&self, name: &str, version: Option<&str>) -> Result<Template> {
        self.find(name, version)?
            .ok_or_else(|| PipelineError::TemplateNotFound(name.to_string()))
    }

    /// Lookup restricted to the user tier.
    pub fn get_user(&self, name: &str) -> Result<Template> {
        self.load_tier(Tier::User)?
            .into_iter()
            .find(|t| t.schema.name == name)
            .ok_or_else(|| PipelineError::TemplateNotFound(name.to_string()))
    }

    fn load_tier(&self, tier: Tier) -> Result<Vec<Template>> {
        let dir = self.tier_dir(tier);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if entry.file_type()?.is_dir() && !hidden {
                dirs.push(entry.path());
            }
        }
        dirs.sort();

        let mut templates = Vec::new();
        for path in dirs {
            match load_template_dir(&path, tier) {
                Ok(Some(t)) => templates.push(t),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable template")
                }
            }
        }
        Ok(templates)
    }

    // ---------------------------------------------------------------------------
    // Writes (user tier only)
    // ---------------------------------------------------------------------------

    pub fn create(&self, new: NewTemplate) -> Result<Template> {
        let (schema, config, overwrite) = new.into_parts();
        self.write_user(schema, config, overwrite)
    }

    /// Remove a user template. Predefined templates are never touched; a
    /// name that only exists there is reported as not found.
    pub fn delete(&self, name: &str) -> Result<()> {
        let template = self.get_user(name)?;
        std::fs::remove_dir_all(&template.path)?;
        tracing::debug!(template = name, "deleted user template");
        Ok(())
    }

    /// Import a `.json` bundle or a template directory into the user tier,
    /// replacing any user template of the same name.
    pub fn import(&self, source: &Path) -> Result<Template> {
        if source.is_file() && source.extension().is_some_and(|e| e == "json") {
            let bundle: TemplateBundle = io::read_json(source)?;
            return self.write_user(bundle.schema, bundle.config, true);
        }
        if source.is_dir() {
            if let Some(t) = load_template_dir(source, Tier::User)? {
                return self.write_user(t.schema, t.config, true);
            }
        }
        Err(PipelineError::InvalidImportSource(source.to_path_buf()))
    }

    /// Export to a single bundle when `destination` ends in `.json`,
    /// otherwise to a directory holding the two documents.
    pub fn export(&self, name: &str, destination: &Path) -> Result<()> {
        let template = self.get(name, None)?;
        if destination.extension().is_some_and(|e| e == "json") {
            io::write_json_pretty(destination, &template.to_bundle())
        } else {
            write_template_files(destination, &template.schema, &template.config)
        }
    }

    /// Copy the templates embedded in the binary into the predefined tier.
    /// Existing files are left alone. Returns the number of files written.
    pub fn install_predefined(&self) -> Result<usize> {
        let dir = self.tier_dir(Tier::Predefined);
        let mut written = 0;
        for file in <Builtin as Embed>::iter() {
            let Some(asset) = <Builtin as Embed>::get(&file) else {
                continue;
            };
            if io::write_if_missing(&dir.join(file.as_ref()), &asset.data)? {
                written += 1;
            }
        }
        Ok(written)
    }

    fn write_user(&self, schema: TemplateSchema, config: Value, overwrite: bool) -> Result<Template> {
        paths::validate_template_name(&schema.name)?;
        schema.check()?;
        if !config.is_object() {
            return Err(PipelineError::NonObjectDocument(schema.name));
        }

        let user_dir = self.tier_dir(Tier::User);
        io::ensure_dir(&user_dir)?;
        let target = user_dir.join(&schema.name);
        if target.exists() && !overwrite {
            return Err(PipelineError::TemplateExists(schema.name));
        }

        // Both documents land in a hidden staging directory first and are
        // moved into place together.
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&user_dir)?;
        write_template_files(staging.path(), &schema, &config)?;
        let staged = staging.keep();
        if target.exists() {
            std::fs::remove_dir_all(&target)?;
        }
        if let Err(e) = std::fs::rename(&staged, &target) {
            let _ = std::fs::remove_dir_all(&staged);
            return Err(e.into());
        }

        tracing::debug!(template = %schema.name, path = %target.display(), "wrote user template");
        Ok(Template {
            schema,
            config,
            path: target,
            tier: Tier::User,
        })
    }
}

// ---------------------------------------------------------------------------
// Directory codec
// ---------------------------------------------------------------------------

/// Load a template directory. `Ok(None)` when either document is missing.
fn load_template_dir(dir: &Path, tier: Tier) -> Result<Option<Template>> {
    let schema_file = paths::schema_file(dir);
    let config_file = paths::config_file(dir);
    if !schema_file.is_file() || !config_file.is_file() {
        return Ok(None);
    }
    let schema: TemplateSchema = io::read_json(&schema_file)?;
    schema.check()?;
    let config: Value = io::read_json(&config_file)?;
    Ok(Some(Template {
        schema,
        config,
        path: dir.to_path_buf(),
        tier,
    }))
}

fn write_template_files(dir: &Path, schema: &TemplateSchema, config: &Value) -> Result<()> {
    io::ensure_dir(dir)?;
    io::write_json_pretty(&paths::schema_file(dir), schema)?;
    io::write_json_pretty(&paths::config_file(dir), config)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::schema::ParameterKind;
    use serde_json::json;
    use tempfile::TempDir;

    /// Write a template straight into `tier`, bypassing the store.
    pub(crate) fn seed(store: &TemplateStore, tier: Tier, schema: &TemplateSchema, config: Value) {
        let dir = store.tier_dir(tier).join(&schema.name);
        write_template_files(&dir, schema, &config).unwrap();
    }

    fn schema(name: &str, category: TemplateCategory) -> TemplateSchema {
        TemplateSchema::new(name, category)
    }

    fn new_template(name: &str) -> NewTemplate {
        let mut t = NewTemplate::new(name, TemplateCategory::Api, json!({"runtime": "{{ lang }}"}));
        t.description = "test".to_string();
        t.author = "me".to_string();
        t.parameters = vec![ParameterSpec::new("lang", ParameterKind::String, "language")];
        t
    }

    #[test]
    fn create_writes_both_documents() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path());

        let t = store.create(new_template("T1")).unwrap();
        assert_eq!(t.id(), "T1-1.0.0");
        assert_eq!(t.tier, Tier::User);
        assert!(dir.path().join("user/T1/template.json").is_file());
        assert!(dir.path().join("user/T1/config.json").is_file());

        let loaded = store.get("T1", None).unwrap();
        assert_eq!(loaded.schema, t.schema);
        assert_eq!(loaded.config, json!({"runtime": "{{ lang }}"}));
        assert_eq!(loaded.path, dir.path().join("user/T1"));
    }

    #[test]
    fn create_refuses_existing_unless_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path());
        store.create(new_template("T1")).unwrap();

        assert!(matches!(
            store.create(new_template("T1")),
            Err(PipelineError::TemplateExists(_))
        ));

        let mut again = new_template("T1");
        again.config = json!({"runtime": "go"});
        again.overwrite = true;
        store.create(again).unwrap();
        assert_eq!(store.get("T1", None).unwrap().config, json!({"runtime": "go"}));
    }

    #[test]
    fn create_rejects_bad_name_and_definition() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path());

        assert!(matches!(
            store.create(new_template("../escape")),
            Err(PipelineError::InvalidTemplateName(_))
        ));

        let mut broken = new_template("broken");
        broken
            .parameters
            .push(ParameterSpec::new("lang", ParameterKind::String, "again"));
        assert!(matches!(
            store.create(broken),
            Err(PipelineError::InvalidDefinition { .. })
        ));
        assert!(!dir.path().join("user/broken").exists());

        let mut listy = new_template("listy");
        listy.config = json!(["build", "test"]);
        assert!(matches!(
            store.create(listy),
            Err(PipelineError::NonObjectDocument(_))
        ));
        assert!(!dir.path().join("user/listy").exists());
    }

    #[test]
    fn list_returns_both_tiers_and_filters_category() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path());
        seed(&store, Tier::Predefined, &schema("shared", TemplateCategory::Devops), json!({}));
        seed(&store, Tier::Predefined, &schema("site", TemplateCategory::WebFrontend), json!({}));
        seed(&store, Tier::User, &schema("shared", TemplateCategory::Devops), json!({}));

        let all = store.list(None).unwrap();
        let names: Vec<(&str, Tier)> = all.iter().map(|t| (t.name(), t.tier)).collect();
        assert_eq!(
            names,
            [
                ("shared", Tier::Predefined),
                ("site", Tier::Predefined),
                ("shared", Tier::User)
            ]
        );

        let devops = store.list(Some(TemplateCategory::Devops)).unwrap();
        assert_eq!(devops.len(), 2);
        assert!(store.list(Some(TemplateCategory::Mobile)).unwrap().is_empty());
    }

    #[test]
    fn shadow_policy_decides_lookup() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path());
        seed(&store, Tier::Predefined, &schema("shared", TemplateCategory::Devops), json!({"from": "predefined"}));
        seed(&store, Tier::User, &schema("shared", TemplateCategory::Devops), json!({"from": "user"}));

        assert_eq!(store.get("shared", None).unwrap().tier, Tier::User);
        let store = store.with_policy(ShadowPolicy::PredefinedFirst);
        let t = store.get("shared", None).unwrap();
        assert_eq!(t.tier, Tier::Predefined);
        assert_eq!(t.config, json!({"from": "predefined"}));
    }

    #[test]
    fn get_filters_by_version() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path());
        let mut s = schema("svc", TemplateCategory::Microservice);
        s.version = "2.1.0".to_string();
        seed(&store, Tier::Predefined, &s, json!({}));

        assert!(store.get("svc", Some("2.1.0")).is_ok());
        assert!(matches!(
            store.get("svc", Some("1.0.0")),
            Err(PipelineError::TemplateNotFound(_))
        ));
        assert!(store.find("nope", None).unwrap().is_none());
    }

    #[test]
    fn list_skips_malformed_and_incomplete_entries() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path());
        seed(&store, Tier::User, &schema("good", TemplateCategory::Custom), json!({}));

        let bad = dir.path().join("user/bad");
        std::fs::create_dir_all(&bad).unwrap();
        std::fs::write(bad.join("template.json"), "{ not json").unwrap();
        std::fs::write(bad.join("config.json"), "{}").unwrap();

        let half = dir.path().join("user/half");
        std::fs::create_dir_all(&half).unwrap();
        std::fs::write(half.join("template.json"), "{}").unwrap();

        std::fs::create_dir_all(dir.path().join("user/.staging-x")).unwrap();
        std::fs::write(dir.path().join("user/stray.txt"), "x").unwrap();

        let names: Vec<String> = store
            .list(None)
            .unwrap()
            .into_iter()
            .map(|t| t.schema.name)
            .collect();
        assert_eq!(names, ["good"]);
    }

    #[test]
    fn delete_only_touches_user_tier() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path());
        seed(&store, Tier::Predefined, &schema("builtin", TemplateCategory::Devops), json!({}));
        store.create(new_template("mine")).unwrap();

        assert!(matches!(
            store.delete("builtin"),
            Err(PipelineError::TemplateNotFound(_))
        ));
        assert!(dir.path().join("predefined/builtin").is_dir());

        store.delete("mine").unwrap();
        assert!(matches!(
            store.get_user("mine"),
            Err(PipelineError::TemplateNotFound(_))
        ));
        assert!(matches!(
            store.delete("mine"),
            Err(PipelineError::TemplateNotFound(_))
        ));
    }

    #[test]
    fn export_and_import_bundle() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path().join("lib"));
        let original = store.create(new_template("T1")).unwrap();

        let bundle_path = dir.path().join("out/T1.json");
        store.export("T1", &bundle_path).unwrap();
        let bundle: TemplateBundle = io::read_json(&bundle_path).unwrap();
        assert_eq!(bundle, original.to_bundle());

        let other = TemplateStore::new(dir.path().join("other"));
        let imported = other.import(&bundle_path).unwrap();
        assert_eq!(imported.schema, original.schema);
        assert_eq!(imported.config, original.config);
        assert_eq!(imported.tier, Tier::User);
    }

    #[test]
    fn export_and_import_directory_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path().join("lib"));
        store.create(new_template("T1")).unwrap();

        let out = dir.path().join("exported");
        store.export("T1", &out).unwrap();
        assert!(out.join("template.json").is_file());
        assert!(out.join("config.json").is_file());

        std::fs::write(out.join("config.json"), r#"{"runtime": "rust"}"#).unwrap();
        store.import(&out).unwrap();
        assert_eq!(store.get("T1", None).unwrap().config, json!({"runtime": "rust"}));
    }

    #[test]
    fn import_rejects_unusable_sources() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path().join("lib"));

        let empty = dir.path().join("empty");
        std::fs::create_dir_all(&empty).unwrap();
        assert!(matches!(
            store.import(&empty),
            Err(PipelineError::InvalidImportSource(_))
        ));
        assert!(matches!(
            store.import(&dir.path().join("missing.yaml")),
            Err(PipelineError::InvalidImportSource(_))
        ));

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "[1, 2]").unwrap();
        assert!(matches!(store.import(&garbage), Err(PipelineError::Json(_))));
    }

    #[test]
    fn export_missing_template_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path());
        assert!(matches!(
            store.export("ghost", &dir.path().join("ghost.json")),
            Err(PipelineError::TemplateNotFound(_))
        ));
    }

    #[test]
    fn install_predefined_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path());

        let written = store.install_predefined().unwrap();
        assert!(written >= 6, "expected three templates, wrote {written} files");
        assert_eq!(store.install_predefined().unwrap(), 0);

        let builtins = store.list(None).unwrap();
        assert!(builtins.iter().all(|t| t.tier == Tier::Predefined));
        for name in ["base-pipeline", "python-api", "static-website"] {
            assert!(
                builtins.iter().any(|t| t.name() == name),
                "missing predefined template {name}"
            );
        }
    }
}
