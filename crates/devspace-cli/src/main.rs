//! devspace CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::Project;

#[derive(Parser)]
#[command(name = "devspace")]
#[command(about = "Resolve config variables and build images", long_about = None)]
struct Cli {
    /// Project root containing the .devspace directory
    #[arg(long, env = "DEVSPACE_ROOT", default_value = ".")]
    root: PathBuf,

    /// Config file to load instead of the active one
    #[arg(long, env = "DEVSPACE_CONFIG")]
    config: Option<PathBuf>,

    /// Fail on missing variables instead of asking for them
    #[arg(long, env = "DEVSPACE_NO_PROMPT")]
    no_prompt: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the config with all variables resolved
    Resolve,
    /// Build and push images
    Build {
        /// Only build this image (config key or image name)
        #[arg(long)]
        image: Option<String>,
        /// Build without pushing
        #[arg(long)]
        skip_push: bool,
    },
    /// Manage cached variables
    Vars {
        #[command(subcommand)]
        command: VarCommands,
    },
}

#[derive(Subcommand)]
enum VarCommands {
    /// List cached variables of the active config
    List,
    /// Forget all cached variables of the active config
    Reset,
    /// Switch the active config
    Use {
        /// Config name
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let project = Project::new(cli.root, cli.config, cli.no_prompt);

    match cli.command {
        Commands::Resolve => {
            commands::resolve(&project)?;
        }
        Commands::Build { image, skip_push } => {
            commands::build::run(&project, image, skip_push).await?;
        }
        Commands::Vars { command } => match command {
            VarCommands::List => commands::vars::list(&project)?,
            VarCommands::Reset => commands::vars::reset(&project)?,
            VarCommands::Use { name } => commands::vars::use_config(&project, &name)?,
        },
    }

    Ok(())
}
