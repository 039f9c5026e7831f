//! Taxtree CLI - Command-line interface for Taxtree
//!
//! This is the main entry point for users interacting with Taxtree.
//! It provides commands for importing the NCBI taxonomy dump, querying the
//! tree and exporting it as RDF.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "taxtree")]
#[command(author = "Taxtree Contributors")]
#[command(version)]
#[command(about = "NCBI taxonomy as a queryable tree and an RDF export", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ./.taxtree/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Row store location, overriding the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Paging flags shared by list commands.
#[derive(clap::Args, Clone, Copy)]
struct PageArgs {
    /// Results to skip
    #[arg(long, default_value = "0")]
    offset: usize,

    /// Maximum results to return
    #[arg(short, long, default_value = "50")]
    limit: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize Taxtree in a directory
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Import nodes.dmp and names.dmp into the row store
    Import {
        /// Directory with the unpacked taxonomy dump
        dump_dir: PathBuf,

        /// Replace the taxonomy already in the store
        #[arg(short, long)]
        force: bool,

        /// Rows per write batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Skip malformed lines instead of aborting
        #[arg(long)]
        skip_malformed: bool,
    },

    /// Show store and tree statistics
    Status,

    /// Show one taxon and its names
    Node {
        id: u32,

        /// Output as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },

    /// Show the path from a taxon to the root
    Lineage {
        id: u32,

        /// Only the standard ranks, with their scientific names
        #[arg(long)]
        ranked: bool,

        /// Output as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },

    /// List the children of a taxon
    Children {
        id: u32,

        /// Output as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },

    /// List the siblings of a taxon
    Siblings {
        id: u32,

        /// Output as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },

    /// Walk the subtree below a taxon, breadth first
    Descendants {
        id: u32,

        /// Maximum hops below the taxon
        #[arg(short, long)]
        depth: Option<usize>,

        #[command(flatten)]
        page: PageArgs,

        /// Output as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },

    /// Find taxa by name (`%` and `_` wildcards, case-insensitive)
    Search {
        pattern: String,

        /// Restrict to one name class, e.g. "scientific name"
        #[arg(short, long)]
        class: Option<String>,

        /// Restrict to the subtree of this taxon
        #[arg(short, long)]
        scope: Option<u32>,

        #[command(flatten)]
        page: PageArgs,

        /// Output as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },

    /// Export the taxonomy as a batched Turtle archive
    Export {
        /// Output file
        #[arg(short, long, default_value = "taxtree.ttl.zip")]
        output: PathBuf,

        /// Base IRI for rank classes and relations
        #[arg(long)]
        base_uri: Option<String>,

        /// Statements per archive file
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let result = run(cli).await;

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> commands::Result<()> {
    if let Commands::Init { path } = &cli.command {
        return commands::init(path);
    }

    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Import {
            dump_dir,
            force,
            batch_size,
            skip_malformed,
        } => {
            if let Some(size) = batch_size {
                config.import.batch_size = size;
            }
            config.import.skip_malformed |= skip_malformed;
            commands::import(&config, dump_dir, force).await
        }
        Commands::Status => commands::status(&config),
        Commands::Node { id, json } => commands::node(&config, id, json),
        Commands::Lineage { id, ranked, json } => commands::lineage(&config, id, ranked, json),
        Commands::Children { id, json } => commands::children(&config, id, json),
        Commands::Siblings { id, json } => commands::siblings(&config, id, json),
        Commands::Descendants {
            id,
            depth,
            page,
            json,
        } => commands::descendants(&config, id, depth, page.into(), json).await,
        Commands::Search {
            pattern,
            class,
            scope,
            page,
            json,
        } => commands::search(&config, &pattern, class.as_deref(), scope, page.into(), json),
        Commands::Export {
            output,
            base_uri,
            batch_size,
        } => {
            if let Some(base_uri) = base_uri {
                config.export.base_uri = base_uri;
            }
            if let Some(size) = batch_size {
                config.export.batch_size = size;
            }
            commands::export(&config, output).await
        }
    }
}

impl From<PageArgs> for taxtree_graph::Page {
    fn from(args: PageArgs) -> Self {
        taxtree_graph::Page::new(args.offset, args.limit)
    }
}
