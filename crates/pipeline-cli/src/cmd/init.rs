use crate::output::print_json;
use anyhow::Context;
use pipeline_core::project::{self, ProjectConfigOptions};
use std::path::Path;

pub struct InitArgs {
    pub project_name: Option<String>,
    pub region: String,
    pub environment: String,
    pub force: bool,
}

pub fn run(root: &Path, args: InitArgs, json: bool) -> anyhow::Result<()> {
    let project_name = args.project_name.unwrap_or_else(|| {
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    });
    let project_type = project::detect_project_type(root);

    let opts = ProjectConfigOptions {
        project_name,
        region: args.region,
        environment: args.environment,
        project_type,
    };
    let path = project::init(root, &opts, args.force).with_context(|| {
        format!(
            "failed to initialize pipeline configuration in {} (use --force to overwrite)",
            root.display()
        )
    })?;

    if json {
        print_json(&serde_json::json!({
            "path": path,
            "project_name": opts.project_name,
            "region": opts.region,
            "environment": opts.environment,
            "project_type": project_type,
        }))?;
    } else {
        println!("Initialized pipeline configuration: {}", path.display());
        println!("  project:     {}", opts.project_name);
        println!("  region:      {}", opts.region);
        println!("  environment: {}", opts.environment);
        println!("  type:        {project_type}");
    }
    Ok(())
}
