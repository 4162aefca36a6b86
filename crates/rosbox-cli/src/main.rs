//! rosbox - ROS development container manager CLI

use clap::{Parser, Subcommand};
use rosbox_cli::commands::{self, CreateOptions};
use rosbox_config::GlobalConfig;
use rosbox_core::{template, BoxManager, CoreError, ResolveMode};
use rosbox_provider::create_provider;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "rosbox")]
#[command(author, version, about = "ROS development container manager", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override the configured backend
    #[arg(long, global = true, value_parser = ["docker", "distrobox"])]
    backend: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a box from a logical image (or a custom image reference)
    Create {
        /// Logical image name, or an image reference with --custom
        image: String,
        /// Box name
        name: String,
        /// Use IMAGE verbatim as an image reference
        #[arg(long, conflicts_with = "build")]
        custom: bool,
        /// Use the locally built image instead of the registry one
        #[arg(long)]
        build: bool,
        /// Host directory mounted as the ROS workspace
        #[arg(long = "ws", value_name = "PATH")]
        ws: Option<PathBuf>,
        /// Do not start the box after creating it
        #[arg(long = "no_start")]
        no_start: bool,
        /// Mount the host SSH directory read-only
        #[arg(long)]
        ssh: bool,
        /// Use bridge networking instead of the host network
        #[arg(long = "no_host_net")]
        no_host_net: bool,
        /// Home directory inside the box (distrobox only)
        #[arg(long, value_name = "DIR")]
        home: Option<String>,
    },

    /// Recreate a box from the latest registry image
    Update {
        /// Box name
        name: String,
    },

    /// Start a box
    Start {
        /// Box name
        name: String,
    },

    /// Stop a box
    Stop {
        /// Box name
        name: String,
    },

    /// Open an interactive shell in a box
    Enter {
        /// Box name
        name: String,
    },

    /// Remove a stopped box
    Remove {
        /// Box name
        name: String,
    },

    /// List boxes
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Build a logical image from its templates
    Build {
        /// Logical image name (interactive selection if not specified)
        image: Option<String>,
        /// Don't use cache when building the image
        #[arg(long)]
        no_cache: bool,
        /// Only write the composed Dockerfile to PATH
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Pick templates interactively, write ./Dockerfile and build it as NAME
    Ibuilder {
        /// Tag for the built image
        name: String,
        /// Only write the Dockerfile
        #[arg(long = "no_build")]
        no_build: bool,
    },

    /// List logical images
    Images,

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Run the CLI, returning the process exit code
async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = GlobalConfig::load()?;

    // Commands that don't need a backend
    match &cli.command {
        Commands::Config => {
            commands::config(&config)?;
            return Ok(0);
        }
        Commands::Build {
            image,
            output: Some(output),
            ..
        } => {
            commands::write_recipe(&config, image.clone(), output)?;
            return Ok(0);
        }
        Commands::Ibuilder {
            name,
            no_build: true,
        } => {
            commands::ibuilder(&config, None, name, None, Path::new(template::DOCKERFILE)).await?;
            return Ok(0);
        }
        _ => {}
    }

    let provider_type =
        commands::select_backend(cli.backend.as_deref(), &config, std::env::consts::OS)?;
    tracing::debug!("Using {} backend", provider_type);
    let provider = create_provider(provider_type, &config)
        .await
        .map_err(CoreError::from)?;
    let manager = BoxManager::new(provider, config)?;

    match cli.command {
        Commands::Create {
            image,
            name,
            custom,
            build,
            ws,
            no_start,
            ssh,
            no_host_net,
            home,
        } => {
            let mode = if custom {
                ResolveMode::Custom
            } else if build {
                ResolveMode::BuildLocal
            } else {
                ResolveMode::PullDefault
            };
            let options = CreateOptions {
                image,
                name,
                mode,
                workspace: ws,
                start: !no_start,
                ssh,
                host_network: !no_host_net,
                home,
            };
            commands::create(&manager, &options).await?;
        }
        Commands::Update { name } => commands::update(&manager, &name).await?,
        Commands::Start { name } => commands::start(&manager, &name).await?,
        Commands::Stop { name } => commands::stop(&manager, &name).await?,
        Commands::Enter { name } => return commands::enter(&manager, &name).await,
        Commands::Remove { name } => commands::remove(&manager, &name).await?,
        Commands::List { json } => commands::list(&manager, json).await?,
        Commands::Build {
            image, no_cache, ..
        } => commands::build(&manager, image, no_cache).await?,
        Commands::Ibuilder { name, .. } => {
            commands::ibuilder(
                manager.config(),
                Some(&manager),
                &name,
                None,
                Path::new(template::DOCKERFILE),
            )
            .await?
        }
        Commands::Images => commands::images(&manager).await?,
        Commands::Config => unreachable!(), // Handled above
    }

    Ok(0)
}
