//! # FormFlow CLI (`formflow`)
//!
//! ## Usage
//!
//! ```bash
//! formflow --config ./config/formflow.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `formflow init` | Create the SQLite database and run schema migrations |
//! | `formflow serve` | Start the HTTP API |
//! | `formflow diff <before> <after>` | Compare two schema JSON files (no config needed) |
//! | `formflow history <form-id>` | List a form's versions |
//! | `formflow undo <form-id>` | Revert a form to its previous version |

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use formflow::{config, diff_cmd, history_cmd, logging, migrate, server};

/// FormFlow: AI-assisted form builder with schema diffs and undo history.
///
/// All commands except `diff` read a TOML configuration file. See
/// `config/formflow.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "formflow",
    about = "FormFlow: AI-assisted form builder with schema diffs and undo history",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/formflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the forms, versions, and
    /// responses tables. Safe to run repeatedly.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Compare two form schema files.
    Diff {
        /// Schema before the change (JSON).
        before: PathBuf,
        /// Schema after the change (JSON).
        after: PathBuf,
        /// Print the diff as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// List every version of a form.
    History {
        form_id: String,
    },

    /// Revert a form to its previous version.
    Undo {
        form_id: String,
    },
}

fn load(path: &Path) -> anyhow::Result<config::Config> {
    let cfg = config::load_config(path)?;
    logging::init_logging(&cfg.logging);
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let cfg = load(&cli.config)?;
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            let cfg = load(&cli.config)?;
            server::run_server(&cfg).await?;
        }
        Commands::Diff {
            before,
            after,
            json,
        } => {
            // Works on plain files; no config needed
            logging::init_logging(&config::LoggingConfig::default());
            diff_cmd::run_diff(&before, &after, json)?;
        }
        Commands::History { form_id } => {
            let cfg = load(&cli.config)?;
            history_cmd::run_history(&cfg, &form_id).await?;
        }
        Commands::Undo { form_id } => {
            let cfg = load(&cli.config)?;
            history_cmd::run_undo(&cfg, &form_id).await?;
        }
    }

    Ok(())
}
