//! precedent CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use precedent::{
    chunk::{DecisionFacts, StatuteSource},
    commands::{
        cmd_decision_show, cmd_discover, cmd_ingest_decision, cmd_ingest_dir, cmd_ingest_statute,
        cmd_ingest_xml, cmd_init, cmd_process, cmd_query, cmd_queue_clear, cmd_queue_failed,
        cmd_queue_retry, cmd_queue_stats, cmd_reweight, cmd_status, print_decision,
        print_discovery_report, print_failed_items, print_ingest_stats, print_process_summary,
        print_query_results, print_queue_stats, print_reweight_report, print_status,
        DiscoverOptions, DocumentKind, ProcessOptions, QueryOptions,
    },
    config::Config,
    embed::create_embedder,
    error::{Error, Result},
    meta::MetaDb,
    progress::LogWriterFactory,
    queue::IngestQueue,
    search::SearchMode,
    store::QdrantStore,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "precedent")]
#[command(version, about = "Index statutes and court decisions and retrieve weighted precedents", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize precedent configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Chunk documents and add them to the processing queue
    Ingest {
        #[command(subcommand)]
        source: IngestSource,
    },

    /// Embed queued chunks into the vector index
    Process {
        /// Items claimed per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Stop after this many batches
        #[arg(long)]
        max_batches: Option<usize>,
    },

    /// Inspect and maintain the processing queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Ask a legal question
    Query {
        /// The question
        question: String,

        /// Number of results to rank
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Plain query embedding instead of tension vectors
        #[arg(long)]
        plain: bool,
    },

    /// Cluster stored decisions into doctrines
    Discover {
        /// Cluster and name without persisting doctrines
        #[arg(long)]
        dry_run: bool,

        /// Skip statute and precedent anchoring
        #[arg(long)]
        no_anchors: bool,
    },

    /// Look up stored decisions
    Decision {
        #[command(subcommand)]
        action: DecisionAction,
    },

    /// Recompute authority weights of indexed decisions
    Reweight {
        /// Case ids to recompute (all stored decisions when omitted)
        case_ids: Vec<String>,
    },

    /// Show system status
    Status,

    /// Manage Qdrant vector database
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum IngestSource {
    /// Ingest a statute text file
    Statute {
        path: PathBuf,

        #[command(flatten)]
        statute: StatuteArgs,

        #[arg(long, default_value = "0")]
        priority: i64,
    },

    /// Ingest a court decision text file
    Decision {
        path: PathBuf,

        /// The decision is not binding precedent
        #[arg(long)]
        not_binding: bool,

        /// Decided by a grand chamber
        #[arg(long)]
        en_banc: bool,

        /// The decision has been overruled
        #[arg(long)]
        overruled: bool,

        /// Known number of citing decisions
        #[arg(long, default_value = "0")]
        citations: u32,

        /// Case ids this decision cites
        #[arg(long, value_delimiter = ',')]
        cites: Vec<String>,

        #[arg(long, default_value = "0")]
        priority: i64,
    },

    /// Ingest every decision of a court registry XML export
    Xml {
        path: PathBuf,

        #[arg(long, default_value = "0")]
        priority: i64,
    },

    /// Ingest every matching file in a directory
    Dir {
        path: PathBuf,

        /// What the files contain
        #[arg(long, value_enum)]
        kind: DocumentKind,

        /// File extensions to include
        #[arg(long, value_delimiter = ',', default_value = "txt")]
        extensions: Vec<String>,

        #[command(flatten)]
        statute: StatuteArgs,

        #[arg(long, default_value = "0")]
        priority: i64,
    },
}

#[derive(clap::Args)]
struct StatuteArgs {
    /// Effective date of the statute version
    #[arg(long, default_value = "2014-01-01")]
    version_date: String,

    /// Name of the code
    #[arg(long, default_value = "Občanský zákoník")]
    source_name: String,

    #[arg(long)]
    book: Option<String>,

    #[arg(long)]
    chapter: Option<String>,
}

impl From<StatuteArgs> for StatuteSource {
    fn from(args: StatuteArgs) -> Self {
        Self {
            version_date: args.version_date,
            source: args.source_name,
            book: args.book,
            chapter: args.chapter,
        }
    }
}

#[derive(Subcommand)]
enum DecisionAction {
    /// Show a stored decision and its citations
    Show { case_id: String },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Show item counts per status
    Stats,

    /// Requeue failed items that have retries left
    Retry,

    /// Delete completed items
    Clear {
        /// Delete every item, not only completed ones
        #[arg(long)]
        all: bool,
    },

    /// List failed items
    Failed {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

/// Database management actions
#[derive(Subcommand)]
enum DbAction {
    /// Initialize/create the Qdrant collection
    Init,

    /// Show Qdrant collection status
    Status,

    /// Reset the collection (delete all vectors and recreate)
    Reset {
        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn emit<T: Serialize>(json: bool, value: &T, print: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print(value);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory))
        .with(filter)
        .init();

    let json = cli.json;

    match cli.command {
        Commands::Init { force } => {
            let base_dir = cli.config.as_deref().map(config_base_dir);
            let config = cmd_init(base_dir, force).await?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "ok",
                        "config": config.paths.config_file.display().to_string(),
                        "database": config.paths.db_file.display().to_string(),
                    })
                );
            } else {
                println!("✓ precedent initialized successfully");
                println!("  Config: {}", config.paths.config_file.display());
                println!("\nNext steps:");
                println!("  1. Edit the config file to point at your embedding backend");
                println!("  2. Start Qdrant: docker run -p 6334:6334 qdrant/qdrant");
                println!("  3. Ingest: precedent ingest statute civil_code.txt");
                println!("  4. Embed: precedent process");
            }
            return Ok(());
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "precedent", &mut std::io::stdout());
            return Ok(());
        }

        command => {
            let config = load_config(cli.config.as_deref())?;
            dispatch(&config, command, json).await
        }
    }
}

async fn dispatch(config: &Config, command: Commands, json: bool) -> Result<()> {
    let db = MetaDb::connect(config).await?;
    if !db.is_initialized().await? {
        return Err(Error::NotInitialized);
    }
    let queue = IngestQueue::new(&db, &config.queue);

    match command {
        Commands::Ingest { source } => {
            let stats = match source {
                IngestSource::Statute {
                    path,
                    statute,
                    priority,
                } => {
                    cmd_ingest_statute(config, &queue, &path, &statute.into(), priority).await?
                }
                IngestSource::Decision {
                    path,
                    not_binding,
                    en_banc,
                    overruled,
                    citations,
                    cites,
                    priority,
                } => {
                    let facts = DecisionFacts {
                        is_binding: !not_binding,
                        en_banc,
                        citation_count: citations,
                        overruled,
                        cites,
                    };
                    cmd_ingest_decision(config, &db, &queue, &path, &facts, priority).await?
                }
                IngestSource::Xml { path, priority } => {
                    cmd_ingest_xml(config, &db, &queue, &path, priority, json).await?
                }
                IngestSource::Dir {
                    path,
                    kind,
                    extensions,
                    statute,
                    priority,
                } => {
                    cmd_ingest_dir(
                        config,
                        &db,
                        &queue,
                        &path,
                        kind,
                        &extensions,
                        &statute.into(),
                        priority,
                        json,
                    )
                    .await?
                }
            };
            emit(json, &stats, print_ingest_stats)?;
        }

        Commands::Process {
            batch_size,
            max_batches,
        } => {
            let store = connect_store(config).await?;
            let embedder = create_embedder(config)?;
            let options = ProcessOptions {
                batch_size,
                max_batches,
                quiet: json,
            };
            let summary = cmd_process(config, &queue, embedder.as_ref(), &store, options).await?;
            emit(json, &summary, print_process_summary)?;
        }

        Commands::Queue { action } => match action {
            QueueAction::Stats => {
                let stats = cmd_queue_stats(&queue).await?;
                emit(json, &stats, print_queue_stats)?;
            }
            QueueAction::Retry => {
                let change = cmd_queue_retry(&queue).await?;
                emit(json, &change, |c| {
                    println!("✓ Requeued {} failed items", c.affected)
                })?;
            }
            QueueAction::Clear { all } => {
                let change = cmd_queue_clear(&queue, all).await?;
                emit(json, &change, |c| {
                    println!("✓ Removed {} queue items", c.affected)
                })?;
            }
            QueueAction::Failed { limit } => {
                let items = cmd_queue_failed(&queue, limit).await?;
                emit(json, &items, |i| print_failed_items(i))?;
            }
        },

        Commands::Query {
            question,
            top_k,
            plain,
        } => {
            let store = QdrantStore::connect(config).await?;
            let embedder = create_embedder(config)?;
            let options = QueryOptions {
                top_k,
                mode: plain.then_some(SearchMode::Plain),
            };
            let input = cmd_query(config, &store, embedder.as_ref(), &question, options).await?;
            emit(json, &input, print_query_results)?;
        }

        Commands::Discover {
            dry_run,
            no_anchors,
        } => {
            let store = QdrantStore::connect(config).await?;
            let embedder = create_embedder(config)?;
            let options = DiscoverOptions {
                dry_run,
                no_anchors,
            };
            let report = cmd_discover(config, &db, &store, embedder.as_ref(), options).await?;
            emit(json, &report, |r| print_discovery_report(r, dry_run))?;
        }

        Commands::Decision {
            action: DecisionAction::Show { case_id },
        } => {
            let detail = cmd_decision_show(&db, &case_id).await?;
            emit(json, &detail, print_decision)?;
        }

        Commands::Reweight { case_ids } => {
            let store = QdrantStore::connect(config).await?;
            let report = cmd_reweight(&db, &store, &case_ids).await?;
            emit(json, &report, print_reweight_report)?;
        }

        Commands::Status => {
            let store = QdrantStore::connect(config).await?;
            let status = cmd_status(config, &db, &queue, &store).await?;
            emit(json, &status, print_status)?;
        }

        Commands::Db { action } => handle_db_action(config, action, json).await?,

        Commands::Init { .. } | Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Connect and make sure the collection exists before writing to it
async fn connect_store(config: &Config) -> Result<QdrantStore> {
    let store = QdrantStore::connect(config).await?;
    store.ensure_collection().await?;
    Ok(store)
}

async fn handle_db_action(config: &Config, action: DbAction, json: bool) -> Result<()> {
    let store = QdrantStore::connect(config).await?;

    match action {
        DbAction::Init => {
            store.ensure_collection().await?;
            if json {
                println!(r#"{{"status": "ok", "message": "Collection initialized"}}"#);
            } else {
                println!("✓ Qdrant collection initialized");
            }
        }
        DbAction::Status => match store.get_collection_info().await? {
            Some(info) => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&info)?);
                } else {
                    println!("Qdrant Collection Status:");
                    println!("  Status: {}", info.status);
                    println!("  Points: {}", info.points_count);
                    println!("  Indexed Vectors: {}", info.indexed_vectors_count);
                }
            }
            None => {
                if json {
                    println!(r#"{{"exists": false}}"#);
                } else {
                    println!("Collection does not exist. Run 'precedent db init' to create it.");
                }
            }
        },
        DbAction::Reset { yes } => {
            if !yes {
                return Err(Error::Validation(
                    "This deletes ALL indexed vectors. Run with --yes to confirm.".to_string(),
                ));
            }
            store.reset_collection().await?;
            if json {
                println!(r#"{{"status": "ok", "message": "Collection reset"}}"#);
            } else {
                println!("✓ Qdrant collection reset (all data deleted and collection recreated)");
            }
        }
    }

    Ok(())
}

/// A `.toml` path names the config file; anything else is its directory
fn config_base_dir(path: &std::path::Path) -> PathBuf {
    if path.extension().map_or(false, |e| e == "toml") {
        path.parent()
            .map(PathBuf::from)
            .unwrap_or_else(Config::default_base_dir)
    } else {
        path.to_path_buf()
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = match path {
        Some(p) if p.extension().map_or(false, |e| e == "toml") => p.to_path_buf(),
        Some(dir) => dir.join("config.toml"),
        None => Config::default_config_path(),
    };

    if !config_path.exists() {
        return Err(Error::NotInitialized);
    }

    Config::load(&config_path)
}
