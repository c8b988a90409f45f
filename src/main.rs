// src/main.rs
//! Helmsman - CLI Entry Point

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;

mod commands;

// =============================================================================
// CLI Definitions
// =============================================================================

#[derive(Parser)]
#[command(name = "helmsman")]
#[command(version)]
#[command(about = "Cluster add-on controller driving modules through a helm-style package manager", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Args, Clone)]
struct CommonArgs {
    /// Module catalog directory
    #[arg(long, env = "MODULES_DIR", default_value = "/modules")]
    modules_dir: PathBuf,

    /// Global hooks directory
    #[arg(long, env = "GLOBAL_HOOKS_DIR", default_value = "/global-hooks")]
    global_hooks_dir: PathBuf,

    /// Namespace releases are deployed into
    #[arg(long, default_value = "")]
    namespace: String,

    /// Path to the configuration document (JSON); empty config if omitted
    #[arg(long)]
    config_doc: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the controller event loop
    Run {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// One-shot discovery: print the modules state and exit
    Discover {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Print merged values and their checksum for a scope
    Values {
        /// "global" or a module name
        scope: String,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// List registered hooks per binding
    Hooks {
        /// Module name; global hooks if omitted
        module: Option<String>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Generate shell completions
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { common }) => commands::run(common.into()).await,
        Some(Commands::Discover { common }) => commands::discover(common.into()).await,
        Some(Commands::Values { scope, common }) => commands::values(&scope, common.into()).await,
        Some(Commands::Hooks { module, common }) => {
            commands::hooks(module.as_deref(), common.into()).await
        }
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

impl From<CommonArgs> for commands::Settings {
    fn from(args: CommonArgs) -> Self {
        commands::Settings {
            modules_dir: args.modules_dir,
            global_hooks_dir: args.global_hooks_dir,
            namespace: args.namespace,
            config_doc: args.config_doc,
        }
    }
}
