//! # Domain Ledger CLI (`ledger`)
//!
//! ## Usage
//!
//! ```bash
//! ledger --config ./config/ledger.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ledger init` | Create the SQLite database and schema |
//! | `ledger projects` | List projects with active records |
//! | `ledger doc <action>` | Put, get, list, delete and analyze domain documents |
//! | `ledger convention <action>` | Put, get, list and delete project conventions |
//! | `ledger search "<query>"` | Similarity search across both families |
//! | `ledger embed pending` | Backfill missing embeddings |
//! | `ledger embed rebuild` | Delete and regenerate all embeddings |

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use domain_ledger::models::{ConventionKey, DocumentKey};
use domain_ledger::{config, convention_cmd, document_cmd, embed_cmd, migrate, projects, search};

/// Domain Ledger: versioned domain knowledge with similarity search.
#[derive(Parser)]
#[command(name = "ledger", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ledger.toml")]
    config: PathBuf,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it on an existing database changes nothing.
    Init,

    /// List every project that has at least one active document or convention.
    Projects {
        #[arg(long)]
        json: bool,
    },

    /// Manage domain documents.
    Doc {
        #[command(subcommand)]
        action: DocAction,
    },

    /// Manage project conventions.
    Convention {
        #[command(subcommand)]
        action: ConventionAction,
    },

    /// Similarity search over documents and conventions.
    ///
    /// Requires an embedding provider to be configured.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results (defaults to `[search].top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum similarity, exclusive (defaults to `[search].similarity_threshold`).
        #[arg(long, allow_hyphen_values = true)]
        threshold: Option<f64>,

        #[arg(long)]
        json: bool,
    },

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },
}

#[derive(Args)]
struct DocKeyArgs {
    project: String,
    service: String,
    domain: String,
}

impl DocKeyArgs {
    fn key(&self) -> DocumentKey {
        DocumentKey::new(&self.project, &self.service, &self.domain)
    }
}

#[derive(Args)]
struct ConventionKeyArgs {
    project: String,
    category: String,
    title: String,
}

impl ConventionKeyArgs {
    fn key(&self) -> ConventionKey {
        ConventionKey::new(&self.project, &self.category, &self.title)
    }
}

#[derive(Subcommand)]
enum DocAction {
    /// Create a document or append a new version from a JSON draft.
    Put {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show the latest active version, or `--version N`.
    Get {
        #[command(flatten)]
        key: DocKeyArgs,
        #[arg(long)]
        version: Option<i64>,
        #[arg(long)]
        json: bool,
    },
    /// List all active versions, newest first.
    History {
        #[command(flatten)]
        key: DocKeyArgs,
        #[arg(long)]
        json: bool,
    },
    /// Latest version of every document in a project.
    List {
        project: String,
        #[arg(long)]
        json: bool,
    },
    /// Soft-delete every version of a document.
    Delete {
        #[command(flatten)]
        key: DocKeyArgs,
    },
    /// Show the documents that depend on this one.
    Impact {
        #[command(flatten)]
        key: DocKeyArgs,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConventionAction {
    /// Create a convention or append a new version from a JSON draft.
    Put {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show the latest active version, or `--version N`.
    Get {
        #[command(flatten)]
        key: ConventionKeyArgs,
        #[arg(long)]
        version: Option<i64>,
        #[arg(long)]
        json: bool,
    },
    /// List all active versions, newest first.
    History {
        #[command(flatten)]
        key: ConventionKeyArgs,
        #[arg(long)]
        json: bool,
    },
    /// Latest conventions of a project.
    List {
        project: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Soft-delete every version of a convention.
    Delete {
        #[command(flatten)]
        key: ConventionKeyArgs,
    },
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed active rows that have no vector yet.
    Pending {
        /// Maximum number of rows to embed in this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Show counts without performing any embedding.
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete and regenerate all embeddings.
    ///
    /// Needed after switching embedding models or dimensions.
    Rebuild,
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Projects { json } => {
            projects::run_projects(&cfg, json).await?;
        }
        Commands::Doc { action } => match action {
            DocAction::Put { file, json } => {
                document_cmd::run_put(&cfg, &file, json).await?;
            }
            DocAction::Get { key, version, json } => {
                document_cmd::run_get(&cfg, &key.key(), version, json).await?;
            }
            DocAction::History { key, json } => {
                document_cmd::run_history(&cfg, &key.key(), json).await?;
            }
            DocAction::List { project, json } => {
                document_cmd::run_list(&cfg, &project, json).await?;
            }
            DocAction::Delete { key } => {
                document_cmd::run_delete(&cfg, &key.key()).await?;
            }
            DocAction::Impact { key, json } => {
                document_cmd::run_impact(&cfg, &key.key(), json).await?;
            }
        },
        Commands::Convention { action } => match action {
            ConventionAction::Put { file, json } => {
                convention_cmd::run_put(&cfg, &file, json).await?;
            }
            ConventionAction::Get { key, version, json } => {
                convention_cmd::run_get(&cfg, &key.key(), version, json).await?;
            }
            ConventionAction::History { key, json } => {
                convention_cmd::run_history(&cfg, &key.key(), json).await?;
            }
            ConventionAction::List {
                project,
                category,
                json,
            } => {
                convention_cmd::run_list(&cfg, &project, category.as_deref(), json).await?;
            }
            ConventionAction::Delete { key } => {
                convention_cmd::run_delete(&cfg, &key.key()).await?;
            }
        },
        Commands::Search {
            query,
            top_k,
            threshold,
            json,
        } => {
            search::run_search(&cfg, &query, top_k, threshold, json).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending { limit, dry_run } => {
                embed_cmd::run_embed_pending(&cfg, limit, dry_run).await?;
            }
            EmbedAction::Rebuild => {
                embed_cmd::run_embed_rebuild(&cfg).await?;
            }
        },
    }

    Ok(())
}
