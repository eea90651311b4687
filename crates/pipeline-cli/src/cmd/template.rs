use crate::cmd::{open_service, parse_params};
use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use pipeline_core::inheritance::ExtendedTemplate;
use pipeline_core::io;
use pipeline_core::schema::{ParameterKind, ParameterSpec, TemplateCategory};
use pipeline_core::service::{self, FromProject, TemplateService};
use pipeline_core::store::{NewTemplate, Template};
use pipeline_core::PipelineError;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum TemplateSubcommand {
    /// List predefined and user templates
    List {
        /// Only templates in this category (e.g. api, web-frontend)
        #[arg(long, short = 'c')]
        category: Option<TemplateCategory>,
    },

    /// Show a template's parameters and inheritance
    Info { name: String },

    /// Apply a template to a project's pipeline.json
    Use {
        name: String,
        /// Project directory (default: the project root)
        #[arg(long, short = 'p')]
        project: Option<PathBuf>,
        /// Template parameter (repeatable: -P lang=python -P memory_size=512)
        #[arg(long = "param", short = 'P', value_name = "KEY=VALUE")]
        params: Vec<String>,
    },

    /// Create a user template from the project's pipeline.json or a config file
    Create {
        name: String,
        #[command(flatten)]
        meta: TemplateMeta,
        /// Category
        #[arg(long, short = 'c', default_value = "custom")]
        category: TemplateCategory,
        /// Take the body from this JSON file instead of the project's pipeline.json
        #[arg(long)]
        config: Option<PathBuf>,
        /// Replace an existing user template of the same name
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Create a user template that extends another template
    Extend {
        base: String,
        name: String,
        #[command(flatten)]
        meta: TemplateMeta,
        /// JSON file holding the additional config body
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Delete a user template
    Delete { name: String },

    /// Import a template bundle (.json) or template directory
    Import { source: PathBuf },

    /// Export a template to a bundle (.json) or a directory
    Export { name: String, destination: PathBuf },

    /// Show the inheritance chain of a template
    Chain { name: String },

    /// Check a template's inheritance and, optionally, parameter values
    Validate {
        name: String,
        #[arg(long = "param", short = 'P', value_name = "KEY=VALUE")]
        params: Vec<String>,
    },

    /// List template categories
    Categories,

    /// Copy the built-in templates into the predefined tier
    Install,
}

#[derive(clap::Args)]
pub struct TemplateMeta {
    /// Description
    #[arg(long, short = 'd', default_value = "")]
    description: String,
    /// Author (default: settings default_author)
    #[arg(long, short = 'a')]
    author: Option<String>,
    /// Tag (repeatable)
    #[arg(long = "tag", short = 't')]
    tags: Vec<String>,
    /// Parameter declaration NAME[:TYPE], e.g. region or memory_size:integer (repeatable)
    #[arg(long = "param", value_name = "NAME[:TYPE]")]
    params: Vec<String>,
    /// JSON file holding a list of full parameter definitions
    #[arg(long)]
    parameters: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(
    root: &Path,
    templates_dir: Option<&Path>,
    subcmd: TemplateSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    if let TemplateSubcommand::Categories = subcmd {
        return categories(json);
    }

    let (settings, service) = open_service(templates_dir)?;
    let store = service.store();

    match subcmd {
        TemplateSubcommand::Categories => categories(json),
        TemplateSubcommand::Use {
            name,
            project,
            params,
        } => {
            let project = project.unwrap_or_else(|| root.to_path_buf());
            apply(&service, &name, &project, &params, json)
        }
        TemplateSubcommand::List { category } => {
            let templates = store.list(category).context("failed to list templates")?;
            list(&templates, json)
        }
        TemplateSubcommand::Info { name } => {
            let info = service
                .template_info(&name)
                .with_context(|| format!("failed to load template '{name}'"))?;
            if json {
                return print_json(&info);
            }
            println!("{} ({})", info.schema.name, info.id);
            println!("  tier:        {}", info.tier);
            println!("  category:    {}", info.schema.category.display_name());
            println!("  author:      {}", info.schema.author);
            println!("  description: {}", info.schema.description);
            if !info.schema.tags.is_empty() {
                println!("  tags:        {}", info.schema.tags.join(", "));
            }
            if let Some(base) = &info.extends {
                println!("  extends:     {base}");
                println!("  chain:       {}", info.inheritance_chain.join(" -> "));
            }
            if let Some(reqs) = &info.requirements {
                println!("  requires:    {}", reqs.join(", "));
            }
            println!();
            println!("Parameters ({}):", info.parameter_count);
            print_parameters(&info.schema.parameters);
            Ok(())
        }
        TemplateSubcommand::Create {
            name,
            meta,
            category,
            config,
            force,
        } => {
            let parameters = meta.parameter_specs()?;
            let author = settings.author_or_default(meta.author);
            let template = match config {
                Some(path) => {
                    let body: Value = io::read_json(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    let mut new = NewTemplate::new(name.as_str(), category, body);
                    new.description = meta.description;
                    new.author = author;
                    new.parameters = parameters;
                    new.tags = meta.tags;
                    new.overwrite = force;
                    store.create(new)
                }
                None => service.create_template_from_project(
                    root,
                    FromProject {
                        name: name.clone(),
                        description: meta.description,
                        category,
                        author,
                        parameters,
                        tags: meta.tags,
                        overwrite: force,
                    },
                ),
            }
            .with_context(|| format!("failed to create template '{name}'"))?;
            report_written("Created", &template, json)
        }
        TemplateSubcommand::Extend {
            base,
            name,
            meta,
            config,
        } => {
            let parameters = meta.parameter_specs()?;
            let config = match config {
                Some(path) => Some(
                    io::read_json::<Value>(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?,
                ),
                None => None,
            };
            let template = service
                .composer()
                .create_extended(ExtendedTemplate {
                    base: base.clone(),
                    name: name.clone(),
                    description: meta.description,
                    author: settings.author_or_default(meta.author),
                    config,
                    parameters,
                    tags: meta.tags,
                })
                .with_context(|| format!("failed to extend '{base}' as '{name}'"))?;
            report_written("Created", &template, json)
        }
        TemplateSubcommand::Delete { name } => {
            store.delete(&name).with_context(|| {
                format!("failed to delete '{name}' (only user templates can be deleted)")
            })?;
            if json {
                print_json(&json!({ "name": name, "deleted": true }))
            } else {
                println!("Deleted template '{name}'");
                Ok(())
            }
        }
        TemplateSubcommand::Import { source } => {
            let template = store
                .import(&source)
                .with_context(|| format!("failed to import {}", source.display()))?;
            report_written("Imported", &template, json)
        }
        TemplateSubcommand::Export { name, destination } => {
            store
                .export(&name, &destination)
                .with_context(|| format!("failed to export '{name}'"))?;
            if json {
                print_json(&json!({ "name": name, "destination": destination }))
            } else {
                println!("Exported '{name}' to {}", destination.display());
                Ok(())
            }
        }
        TemplateSubcommand::Chain { name } => {
            let chain = service
                .composer()
                .inheritance_chain(&name)
                .with_context(|| format!("failed to read inheritance of '{name}'"))?;
            if json {
                return print_json(&chain);
            }
            println!("{chain}");
            if let Some(cycle) = &chain.cycle {
                println!("cycle: '{cycle}' appears twice");
            }
            if let Some(missing) = &chain.missing {
                println!("missing: '{missing}'");
            }
            Ok(())
        }
        TemplateSubcommand::Validate { name, params } => {
            let values = parse_params(&params)?;
            store
                .get(&name, None)
                .with_context(|| format!("failed to load template '{name}'"))?;
            let mut errors = match service.composer().validate_inheritance(&name) {
                Ok(()) => Vec::new(),
                Err(errors) => errors,
            };
            if !params.is_empty() {
                match service.validate_template_parameters(&name, &values) {
                    Ok(()) => {}
                    Err(PipelineError::ParameterValidation(found)) => errors.extend(found),
                    Err(e) => return Err(e.into()),
                }
            }
            let warnings: Vec<String> = service
                .undeclared_placeholders(&name)?
                .into_iter()
                .map(|p| format!("Placeholder '{p}' has no declared parameter"))
                .collect();

            if json {
                print_json(&json!({
                    "name": name,
                    "valid": errors.is_empty(),
                    "errors": errors,
                    "warnings": warnings,
                }))?;
            } else {
                for w in &warnings {
                    println!("[warning] {w}");
                }
                if errors.is_empty() {
                    println!("Template '{name}' is valid.");
                }
                for e in &errors {
                    println!("[error] {e}");
                }
            }
            if !errors.is_empty() {
                anyhow::bail!("template '{name}' failed validation");
            }
            Ok(())
        }
        TemplateSubcommand::Install => {
            // open_service has already seeded anything missing
            let count = store.list(None)?.len();
            if json {
                print_json(&json!({ "root": store.root(), "templates": count }))
            } else {
                println!(
                    "Template library ready at {} ({count} templates)",
                    store.root().display()
                );
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// use / categories
// ---------------------------------------------------------------------------

fn apply(
    service: &TemplateService,
    name: &str,
    project: &Path,
    raw_params: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let values = parse_params(raw_params)?;
    let report = service
        .apply(name, project, &values)
        .with_context(|| format!("failed to apply template '{name}'"))?;

    if json {
        return print_json(&report);
    }
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    println!(
        "Applied {}-{} to {}",
        report.template,
        report.version,
        report.document.display()
    );
    for (key, value) in &report.parameters {
        println!("  {key} = {}", pipeline_core::document::value_text(value));
    }
    Ok(())
}

fn categories(json: bool) -> anyhow::Result<()> {
    let categories = service::categories();
    if json {
        return print_json(&categories);
    }
    let rows = categories
        .iter()
        .map(|c| vec![c.value.to_string(), c.name.clone()])
        .collect();
    print_table(&["VALUE", "NAME"], rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn list(templates: &[Template], json: bool) -> anyhow::Result<()> {
    if json {
        let items: Vec<Value> = templates
            .iter()
            .map(|t| {
                json!({
                    "name": t.schema.name,
                    "version": t.schema.version,
                    "category": t.schema.category,
                    "tier": t.tier,
                    "description": t.schema.description,
                    "extends": t.schema.extends,
                })
            })
            .collect();
        return print_json(&items);
    }

    if templates.is_empty() {
        println!("No templates found.");
        return Ok(());
    }
    let rows = templates
        .iter()
        .map(|t| {
            vec![
                t.schema.name.clone(),
                t.schema.version.clone(),
                t.schema.category.to_string(),
                t.tier.to_string(),
                t.schema.extends.clone().unwrap_or_default(),
                t.schema.description.clone(),
            ]
        })
        .collect();
    print_table(
        &["NAME", "VERSION", "CATEGORY", "TIER", "EXTENDS", "DESCRIPTION"],
        rows,
    );
    Ok(())
}

fn print_parameters(parameters: &[ParameterSpec]) {
    if parameters.is_empty() {
        println!("  (none)");
        return;
    }
    let rows = parameters
        .iter()
        .map(|p| {
            let mut rule = String::new();
            if let Some(options) = &p.options {
                rule = options.join("|");
            } else if p.min_value.is_some() || p.max_value.is_some() {
                let bound = |b: &Option<serde_json::Number>| {
                    b.as_ref().map(|v| v.to_string()).unwrap_or_default()
                };
                rule = format!("{}..{}", bound(&p.min_value), bound(&p.max_value));
            } else if let Some(pattern) = &p.pattern {
                rule = pattern.clone();
            }
            vec![
                p.name.clone(),
                p.kind.to_string(),
                if p.required { "yes" } else { "no" }.to_string(),
                p.default
                    .as_ref()
                    .map(pipeline_core::document::value_text)
                    .unwrap_or_default(),
                rule,
                p.description.clone(),
            ]
        })
        .collect();
    print_table(
        &["NAME", "TYPE", "REQUIRED", "DEFAULT", "RULE", "DESCRIPTION"],
        rows,
    );
}

fn report_written(verb: &str, template: &Template, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&json!({
            "name": template.schema.name,
            "version": template.schema.version,
            "path": template.path,
            "extends": template.schema.extends,
        }));
    }
    println!(
        "{verb} template '{}' at {}",
        template.schema.name,
        template.path.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Parameter declarations
// ---------------------------------------------------------------------------

impl TemplateMeta {
    fn parameter_specs(&self) -> anyhow::Result<Vec<ParameterSpec>> {
        let mut specs: Vec<ParameterSpec> = match &self.parameters {
            Some(path) => io::read_json(path)
                .with_context(|| format!("failed to read parameters from {}", path.display()))?,
            None => Vec::new(),
        };
        for raw in &self.params {
            specs.push(parse_declaration(raw)?);
        }
        Ok(specs)
    }
}

fn parse_declaration(raw: &str) -> anyhow::Result<ParameterSpec> {
    let (name, kind) = match raw.split_once(':') {
        Some((name, kind)) => (name, kind.parse::<ParameterKind>()?),
        None => (raw, ParameterKind::String),
    };
    if name.is_empty() {
        anyhow::bail!("invalid parameter declaration '{raw}'");
    }
    Ok(ParameterSpec::new(name, kind, ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarations_default_to_string() {
        let spec = parse_declaration("region").unwrap();
        assert_eq!(spec.name, "region");
        assert_eq!(spec.kind, ParameterKind::String);
        assert!(spec.required);

        let spec = parse_declaration("memory_size:integer").unwrap();
        assert_eq!(spec.kind, ParameterKind::Integer);

        assert!(parse_declaration("x:float").is_err());
        assert!(parse_declaration(":string").is_err());
    }
}
