mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pbxpatch",
    about = "Add unit-test and UI-test targets to an Xcode project descriptor",
    version,
    propagate_version = true
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log step progress
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config with a fresh identifier table for a project
    Init {
        /// `.xcodeproj` bundle or `project.pbxproj` file
        project: PathBuf,

        /// Name of the application target the tests attach to
        #[arg(long)]
        main_target: String,

        /// Config path (default: pbxpatch.yaml next to the project)
        #[arg(long, env = "PBXPATCH_CONFIG")]
        config: Option<PathBuf>,

        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Insert the test targets into the descriptor
    Apply {
        /// `.xcodeproj` bundle or `project.pbxproj` file
        project: PathBuf,

        /// Config path (default: pbxpatch.yaml next to the project)
        #[arg(long, env = "PBXPATCH_CONFIG")]
        config: Option<PathBuf>,

        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,

        /// Write even when some steps could not find their anchor
        #[arg(long)]
        allow_partial: bool,
    },

    /// Check delimiter balance, region markers and references
    Verify {
        /// `.xcodeproj` bundle or `project.pbxproj` file
        project: PathBuf,
    },

    /// Inspect the patch configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Init {
            project,
            main_target,
            config,
            force,
        } => cmd::init::run(&project, &main_target, config.as_deref(), force, cli.json),
        Commands::Apply {
            project,
            config,
            dry_run,
            allow_partial,
        } => cmd::apply::run(
            &project,
            config.as_deref(),
            cmd::apply::ApplyOptions {
                dry_run,
                allow_partial,
            },
            cli.json,
        ),
        Commands::Verify { project } => cmd::verify::run(&project, cli.json),
        Commands::Config { subcommand } => cmd::config::run(subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
