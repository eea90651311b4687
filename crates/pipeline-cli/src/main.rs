mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, template::TemplateSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pipeline",
    about = "Scaffold AWS CI/CD pipeline configuration from reusable templates",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .pipeline/, pipeline.json or .git/)
    #[arg(long, global = true, env = "PIPELINE_ROOT")]
    root: Option<PathBuf>,

    /// Template library root (default: ~/.pipeline-creator/templates)
    #[arg(long, global = true, env = "PIPELINE_TEMPLATES_DIR")]
    templates_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .pipeline/config.json in the project root
    Init {
        /// Project name (default: the root directory name)
        #[arg(long, short = 'n')]
        project_name: Option<String>,
        /// AWS region
        #[arg(long, short = 'r', default_value = "us-east-1")]
        region: String,
        /// Environment (dev, staging, prod)
        #[arg(long, short = 'e', default_value = "dev")]
        environment: String,
        /// Overwrite an existing configuration
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Read and edit the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Manage and apply configuration templates
    Template {
        #[command(subcommand)]
        subcommand: TemplateSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let templates_dir = cli.templates_dir.as_deref();

    let result = match cli.command {
        Commands::Init {
            project_name,
            region,
            environment,
            force,
        } => cmd::init::run(
            &root,
            cmd::init::InitArgs {
                project_name,
                region,
                environment,
                force,
            },
            cli.json,
        ),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Template { subcommand } => {
            cmd::template::run(&root, templates_dir, subcommand, cli.json)
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
