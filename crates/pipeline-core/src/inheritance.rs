use crate::document;
use crate::error::{PipelineError, Result};
use crate::schema::{ParameterSpec, TemplateSchema};
use crate::store::{NewTemplate, Template, TemplateStore};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

/// Problems met while walking an `extends` chain. Resolution carries on past
/// them with whatever has been merged so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InheritanceIssue {
    MissingBase { template: String, base: String },
    Circular { chain: Vec<String> },
}

impl fmt::Display for InheritanceIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InheritanceIssue::MissingBase { template, base } => {
                write!(f, "base template '{base}' of '{template}' not found")
            }
            InheritanceIssue::Circular { chain } => {
                write!(f, "circular inheritance detected: {}", chain.join(" -> "))
            }
        }
    }
}

impl From<InheritanceIssue> for PipelineError {
    fn from(issue: InheritanceIssue) -> Self {
        match issue {
            InheritanceIssue::MissingBase { base, .. } => PipelineError::BaseTemplateNotFound(base),
            InheritanceIssue::Circular { chain } => PipelineError::CircularInheritance {
                chain: chain.join(" -> "),
            },
        }
    }
}

/// A template with its chain flattened, plus anything that went wrong on
/// the way.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub template: Template,
    pub issues: Vec<InheritanceIssue>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.issues.is_empty()
    }

    /// The merged template, or the first issue as an error.
    pub fn into_result(self) -> Result<Template> {
        match self.issues.into_iter().next() {
            Some(issue) => Err(issue.into()),
            None => Ok(self.template),
        }
    }
}

// ---------------------------------------------------------------------------
// InheritanceChain
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InheritanceChain {
    /// Template names from the requested template towards its root.
    pub names: Vec<String>,
    /// Name that reappeared, closing a cycle.
    pub cycle: Option<String>,
    /// Name in the chain with no template behind it.
    pub missing: Option<String>,
}

impl fmt::Display for InheritanceChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names.join(" -> "))?;
        if let Some(name) = &self.cycle {
            write!(f, " -> {name}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ExtendedTemplate
// ---------------------------------------------------------------------------

/// Input for [`TemplateComposer::create_extended`].
#[derive(Debug, Clone)]
pub struct ExtendedTemplate {
    pub base: String,
    pub name: String,
    pub description: String,
    pub author: String,
    /// Stored as-is; merged over the base at resolution time.
    pub config: Option<Value>,
    pub parameters: Vec<ParameterSpec>,
    pub tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// TemplateComposer
// ---------------------------------------------------------------------------

pub struct TemplateComposer<'a> {
    store: &'a TemplateStore,
}

impl<'a> TemplateComposer<'a> {
    pub fn new(store: &'a TemplateStore) -> Self {
        Self { store }
    }

    pub fn resolve_by_name(&self, name: &str) -> Result<Resolution> {
        let template = self.store.get(name, None)?;
        self.resolve(template)
    }

    /// Flatten `template`'s `extends` chain, base first, child winning.
    ///
    /// A missing base or a cycle stops the walk at that point and is
    /// recorded in [`Resolution::issues`]; only store I/O failures are
    /// returned as errors.
    pub fn resolve(&self, template: Template) -> Result<Resolution> {
        let mut visited = vec![template.schema.name.clone()];
        let mut issues = Vec::new();
        let template = self.resolve_chain(template, &mut visited, &mut issues)?;
        for issue in &issues {
            tracing::warn!(template = %template.schema.name, %issue, "incomplete inheritance");
        }
        Ok(Resolution { template, issues })
    }

    fn resolve_chain(
        &self,
        template: Template,
        visited: &mut Vec<String>,
        issues: &mut Vec<InheritanceIssue>,
    ) -> Result<Template> {
        let Some(base_name) = template.schema.extends.clone() else {
            return Ok(template);
        };

        if visited.contains(&base_name) {
            let mut chain = visited.clone();
            chain.push(base_name);
            issues.push(InheritanceIssue::Circular { chain });
            return Ok(template);
        }

        let Some(base) = self.store.find(&base_name, None)? else {
            issues.push(InheritanceIssue::MissingBase {
                template: template.schema.name.clone(),
                base: base_name,
            });
            return Ok(template);
        };

        visited.push(base_name);
        let base = self.resolve_chain(base, visited, issues)?;
        Ok(merge_templates(base, template))
    }

    /// Names from `name` up to its root, stopping at the first repeat or
    /// missing template.
    pub fn inheritance_chain(&self, name: &str) -> Result<InheritanceChain> {
        let mut chain = InheritanceChain {
            names: Vec::new(),
            cycle: None,
            missing: None,
        };
        let mut current = Some(name.to_string());
        while let Some(next) = current.take() {
            if chain.names.contains(&next) {
                chain.cycle = Some(next);
                break;
            }
            chain.names.push(next.clone());
            match self.store.find(&next, None)? {
                Some(t) => current = t.schema.extends,
                None => chain.missing = Some(next),
            }
        }
        Ok(chain)
    }

    /// Every problem with `name`'s chain, without merging anything.
    pub fn validate_inheritance(&self, name: &str) -> std::result::Result<(), Vec<String>> {
        let chain = self.inheritance_chain(name).map_err(|e| vec![e.to_string()])?;
        let mut errors = Vec::new();
        if chain.cycle.is_some() {
            errors.push(format!("Circular inheritance detected: {chain}"));
        }
        if let Some(missing) = &chain.missing {
            errors.push(format!("Template '{missing}' not found in inheritance chain"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Create a user template extending `spec.base`. It takes the base's
    /// category and stores only its own config and parameters.
    pub fn create_extended(&self, spec: ExtendedTemplate) -> Result<Template> {
        let base = self.store.find(&spec.base, None)?.ok_or_else(|| {
            PipelineError::BaseTemplateNotFound(spec.base.clone())
        })?;

        let config = spec.config.unwrap_or_else(|| Value::Object(Map::new()));
        let mut new = NewTemplate::new(spec.name, base.schema.category, config);
        new.description = spec.description;
        new.author = spec.author;
        new.parameters = spec.parameters;
        new.tags = spec.tags;
        new.extends = Some(base.schema.name);
        self.store.create(new)
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

fn merge_templates(base: Template, child: Template) -> Template {
    Template {
        schema: merge_schemas(base.schema, child.schema),
        config: document::deep_merge(base.config, child.config),
        path: child.path,
        tier: child.tier,
    }
}

/// Parameters are keyed by name: base order is kept, a child parameter
/// replaces the base one in place, new ones are appended. Tags and
/// requirements are unioned. Everything else comes from the child.
pub fn merge_schemas(base: TemplateSchema, child: TemplateSchema) -> TemplateSchema {
    let mut parameters = base.parameters;
    for param in child.parameters {
        match parameters.iter_mut().find(|p| p.name == param.name) {
            Some(slot) => *slot = param,
            None => parameters.push(param),
        }
    }

    let tags = union(base.tags, child.tags);
    let requirements = match (base.requirements, child.requirements) {
        (None, None) => None,
        (b, c) => Some(union(b.unwrap_or_default(), c.unwrap_or_default())),
    };

    TemplateSchema {
        parameters,
        tags,
        requirements,
        ..child
    }
}

fn union(first: Vec<String>, second: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(first.len() + second.len());
    for item in first.into_iter().chain(second) {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ParameterKind, TemplateCategory};
    use crate::store::tests::seed;
    use crate::store::Tier;
    use serde_json::json;
    use tempfile::TempDir;

    fn schema(name: &str, extends: Option<&str>) -> TemplateSchema {
        let mut s = TemplateSchema::new(name, TemplateCategory::Custom);
        s.extends = extends.map(str::to_string);
        s
    }

    fn lang_param() -> ParameterSpec {
        ParameterSpec::new("lang", ParameterKind::String, "language")
    }

    #[test]
    fn template_without_base_is_unchanged() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path());
        seed(&store, Tier::User, &schema("T1", None), json!({"a": 1}));

        let resolution = TemplateComposer::new(&store).resolve_by_name("T1").unwrap();
        assert!(resolution.is_complete());
        assert_eq!(resolution.template, store.get("T1", None).unwrap());
    }

    #[test]
    fn child_inherits_config_and_parameters() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path());
        let mut t1 = schema("T1", None);
        t1.parameters = vec![lang_param()];
        seed(&store, Tier::User, &t1, json!({"runtime": "{{ lang }}"}));
        let mut t2 = schema("T2", Some("T1"));
        t2.parameters = vec![ParameterSpec::new("debug", ParameterKind::Boolean, "").optional()];
        seed(&store, Tier::User, &t2, json!({"extra": true}));

        let resolved = TemplateComposer::new(&store)
            .resolve_by_name("T2")
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(resolved.config, json!({"runtime": "{{ lang }}", "extra": true}));
        let names: Vec<&str> = resolved.schema.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["lang", "debug"]);
        assert_eq!(resolved.schema.name, "T2");
        assert_eq!(resolved.schema.extends.as_deref(), Some("T1"));
    }

    #[test]
    fn multi_level_chain_flattens_with_child_winning() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path());
        seed(
            &store,
            Tier::Predefined,
            &schema("root", None),
            json!({"region": "us-east-1", "stages": ["source"], "deploy": {"strategy": "rolling"}}),
        );
        seed(
            &store,
            Tier::User,
            &schema("mid", Some("root")),
            json!({"stages": ["build"], "deploy": {"rollback": true}}),
        );
        seed(
            &store,
            Tier::User,
            &schema("leaf", Some("mid")),
            json!({"region": "eu-west-1", "stages": ["deploy"], "deploy": {"strategy": "canary"}}),
        );

        let resolved = TemplateComposer::new(&store)
            .resolve_by_name("leaf")
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(
            resolved.config,
            json!({
                "region": "eu-west-1",
                "stages": ["source", "build", "deploy"],
                "deploy": {"strategy": "canary", "rollback": true}
            })
        );
    }

    #[test]
    fn cycle_terminates_with_partial_merge() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path());
        seed(&store, Tier::User, &schema("A", Some("B")), json!({"a": 1, "shared": "A"}));
        seed(&store, Tier::User, &schema("B", Some("A")), json!({"b": 2, "shared": "B"}));
        let composer = TemplateComposer::new(&store);

        let errors = composer.validate_inheritance("A").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Circular inheritance detected"));

        let resolution = composer.resolve_by_name("A").unwrap();
        assert_eq!(
            resolution.issues,
            [InheritanceIssue::Circular {
                chain: vec!["A".into(), "B".into(), "A".into()]
            }]
        );
        assert_eq!(resolution.template.config, json!({"b": 2, "shared": "A", "a": 1}));
        assert!(matches!(
            resolution.into_result(),
            Err(PipelineError::CircularInheritance { .. })
        ));
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path());
        seed(&store, Tier::User, &schema("loop", Some("loop")), json!({}));
        let composer = TemplateComposer::new(&store);

        let chain = composer.inheritance_chain("loop").unwrap();
        assert_eq!(chain.names, ["loop"]);
        assert_eq!(chain.cycle.as_deref(), Some("loop"));
        assert_eq!(chain.to_string(), "loop -> loop");
        assert!(!composer.resolve_by_name("loop").unwrap().is_complete());
    }

    #[test]
    fn missing_base_degrades() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path());
        seed(&store, Tier::User, &schema("orphan", Some("gone")), json!({"x": 1}));
        let composer = TemplateComposer::new(&store);

        let resolution = composer.resolve_by_name("orphan").unwrap();
        assert_eq!(resolution.template.config, json!({"x": 1}));
        assert_eq!(
            resolution.issues,
            [InheritanceIssue::MissingBase {
                template: "orphan".into(),
                base: "gone".into()
            }]
        );

        let chain = composer.inheritance_chain("orphan").unwrap();
        assert_eq!(chain.names, ["orphan", "gone"]);
        assert_eq!(chain.missing.as_deref(), Some("gone"));

        let errors = composer.validate_inheritance("orphan").unwrap_err();
        assert_eq!(errors, ["Template 'gone' not found in inheritance chain"]);
    }

    #[test]
    fn valid_chain_passes_validation() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path());
        seed(&store, Tier::Predefined, &schema("base", None), json!({}));
        seed(&store, Tier::User, &schema("child", Some("base")), json!({}));
        let composer = TemplateComposer::new(&store);

        composer.validate_inheritance("child").unwrap();
        assert_eq!(composer.inheritance_chain("child").unwrap().to_string(), "child -> base");
    }

    #[test]
    fn schema_merge_rules() {
        let mut base = schema("base", None);
        base.tags = vec!["aws".into(), "ci".into()];
        base.requirements = Some(vec!["docker".into()]);
        base.author = "base-author".into();
        base.parameters = vec![
            lang_param(),
            ParameterSpec::new("region", ParameterKind::String, "").with_default(json!("us-east-1")),
        ];

        let mut child = schema("child", Some("base"));
        child.version = "2.0.0".into();
        child.tags = vec!["ci".into(), "python".into()];
        child.parameters = vec![
            ParameterSpec::new("region", ParameterKind::String, "").with_default(json!("eu-west-1")),
            ParameterSpec::new("memory", ParameterKind::Integer, "").optional(),
        ];

        let merged = merge_schemas(base, child);
        assert_eq!(merged.name, "child");
        assert_eq!(merged.version, "2.0.0");
        assert_eq!(merged.author, "");
        assert_eq!(merged.tags, ["aws", "ci", "python"]);
        assert_eq!(merged.requirements, Some(vec!["docker".to_string()]));
        let names: Vec<&str> = merged.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["lang", "region", "memory"]);
        assert_eq!(merged.parameters[1].default, Some(json!("eu-west-1")));
    }

    #[test]
    fn create_extended_takes_base_category() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path());
        let mut base = schema("web", None);
        base.category = TemplateCategory::WebBackend;
        seed(&store, Tier::Predefined, &base, json!({"runtime": "node"}));
        let composer = TemplateComposer::new(&store);

        let created = composer
            .create_extended(ExtendedTemplate {
                base: "web".into(),
                name: "web-plus".into(),
                description: "web with cache".into(),
                author: "me".into(),
                config: Some(json!({"cache": true})),
                parameters: Vec::new(),
                tags: vec!["cache".into()],
            })
            .unwrap();
        assert_eq!(created.schema.category, TemplateCategory::WebBackend);
        assert_eq!(created.schema.extends.as_deref(), Some("web"));
        assert_eq!(created.config, json!({"cache": true}));

        let resolved = composer.resolve(created).unwrap().into_result().unwrap();
        assert_eq!(resolved.config, json!({"runtime": "node", "cache": true}));

        let missing = composer.create_extended(ExtendedTemplate {
            base: "nope".into(),
            name: "x".into(),
            description: String::new(),
            author: String::new(),
            config: None,
            parameters: Vec::new(),
            tags: Vec::new(),
        });
        assert!(matches!(missing, Err(PipelineError::BaseTemplateNotFound(_))));
    }
}
