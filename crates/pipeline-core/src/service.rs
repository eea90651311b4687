use crate::document;
use crate::error::{PipelineError, Result};
use crate::inheritance::TemplateComposer;
use crate::io;
use crate::paths;
use crate::schema::{ParameterSpec, ParameterValues, TemplateCategory, TemplateSchema};
use crate::store::{NewTemplate, Template, TemplateStore, Tier};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// Key under which apply records which template produced a document.
pub const PROVENANCE_KEY: &str = "template";

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub template: String,
    pub version: String,
    pub document: PathBuf,
    /// Defaults overlaid with the supplied values.
    pub parameters: ParameterValues,
    /// Inheritance problems that left the template partially merged.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateInfo {
    pub id: String,
    pub tier: Tier,
    pub path: PathBuf,
    pub schema: TemplateSchema,
    pub parameter_count: usize,
    pub required_parameters: Vec<String>,
    pub optional_parameters: Vec<String>,
    pub extends: Option<String>,
    pub requirements: Option<Vec<String>>,
    pub inheritance_chain: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryInfo {
    pub value: &'static str,
    pub name: String,
}

/// Every template category with its display name.
pub fn categories() -> Vec<CategoryInfo> {
    TemplateCategory::all()
        .iter()
        .map(|c| CategoryInfo {
            value: c.as_str(),
            name: c.display_name(),
        })
        .collect()
}

/// Input for [`TemplateService::create_template_from_project`].
#[derive(Debug, Clone)]
pub struct FromProject {
    pub name: String,
    pub description: String,
    pub category: TemplateCategory,
    pub author: String,
    pub parameters: Vec<ParameterSpec>,
    pub tags: Vec<String>,
    pub overwrite: bool,
}

// ---------------------------------------------------------------------------
// TemplateService
// ---------------------------------------------------------------------------

pub struct TemplateService {
    store: TemplateStore,
}

impl TemplateService {
    pub fn new(store: TemplateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    pub fn composer(&self) -> TemplateComposer<'_> {
        TemplateComposer::new(&self.store)
    }

    /// Apply template `name` to the project at `project`.
    ///
    /// Nothing is written unless every parameter validates. The rendered body
    /// is merged over an existing `pipeline.json` (new values win) and the
    /// result carries a `template` provenance block.
    pub fn apply(&self, name: &str, project: &Path, parameters: &ParameterValues) -> Result<ApplyReport> {
        let resolution = self.composer().resolve_by_name(name)?;
        let warnings: Vec<String> = resolution.issues.iter().map(|i| i.to_string()).collect();
        let template = resolution.template;

        let parameters = template.schema.coerce_parameters(parameters);
        template
            .schema
            .validate_parameters(&parameters)
            .map_err(PipelineError::ParameterValidation)?;

        let mut effective = template.schema.default_values();
        for (key, value) in parameters {
            if !value.is_null() {
                effective.insert(key, value);
            }
        }

        let body = document::substitute(&template.config, &effective);
        let path = paths::pipeline_document_path(project);
        let mut doc = if path.is_file() {
            let existing: Value = io::read_json(&path)?;
            document::deep_merge(existing, body)
        } else {
            body
        };
        if !doc.is_object() {
            return Err(PipelineError::NonObjectDocument(template.schema.name));
        }

        let provenance = json!({
            "name": template.schema.name,
            "version": template.schema.version,
            "applied_at": Utc::now().to_rfc3339(),
            "parameters": effective,
        });
        document::set_path(&mut doc, PROVENANCE_KEY, provenance);
        io::write_json_pretty(&path, &doc)?;

        tracing::debug!(template = name, path = %path.display(), "applied template");
        Ok(ApplyReport {
            template: template.schema.name,
            version: template.schema.version,
            document: path,
            parameters: effective,
            warnings,
        })
    }

    /// Turn a project's `pipeline.json` into a user template. String leaves
    /// mentioning a declared parameter name become that parameter's token.
    pub fn create_template_from_project(&self, project: &Path, spec: FromProject) -> Result<Template> {
        let path = paths::pipeline_document_path(project);
        if !path.is_file() {
            return Err(PipelineError::ProjectConfigNotFound(path));
        }
        let mut doc: Value = io::read_json(&path)?;
        if let Some(map) = doc.as_object_mut() {
            map.remove(PROVENANCE_KEY);
        }

        let names: Vec<&str> = spec.parameters.iter().map(|p| p.name.as_str()).collect();
        let config = document::parameterize(&doc, &names);

        let mut new = NewTemplate::new(spec.name, spec.category, config);
        new.description = spec.description;
        new.author = spec.author;
        new.parameters = spec.parameters;
        new.tags = spec.tags;
        new.overwrite = spec.overwrite;
        self.store.create(new)
    }

    pub fn template_info(&self, name: &str) -> Result<TemplateInfo> {
        let template = self.store.get(name, None)?;
        let chain = self.composer().inheritance_chain(name)?;
        let schema = &template.schema;
        Ok(TemplateInfo {
            id: template.id(),
            tier: template.tier,
            path: template.path.clone(),
            parameter_count: schema.parameters.len(),
            required_parameters: owned(schema.required_parameters()),
            optional_parameters: owned(schema.optional_parameters()),
            extends: schema.extends.clone(),
            requirements: schema.requirements.clone(),
            inheritance_chain: chain.names,
            schema: template.schema,
        })
    }

    /// Check `parameters` against the fully resolved schema of `name`,
    /// coercing them the same way [`TemplateService::apply`] does.
    pub fn validate_template_parameters(&self, name: &str, parameters: &ParameterValues) -> Result<()> {
        let template = self.composer().resolve_by_name(name)?.template;
        template
            .schema
            .validate_parameters(&template.schema.coerce_parameters(parameters))
            .map_err(PipelineError::ParameterValidation)
    }

    /// Placeholder tokens in the resolved body of `name` that no declared
    /// parameter fills. They survive apply as literal text.
    pub fn undeclared_placeholders(&self, name: &str) -> Result<Vec<String>> {
        let template = self.composer().resolve_by_name(name)?.template;
        Ok(document::placeholder_names(&template.config)
            .into_iter()
            .filter(|n| template.schema.parameter(n).is_none())
            .collect())
    }
}

fn owned(names: Vec<&str>) -> Vec<String> {
    names.into_iter().map(str::to_string).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
