//! CLI command implementations.

use crate::config::{config_path, Config, CONFIG_DIR};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use taxtree_core::NameClass;
use taxtree_graph::{
    CancelToken, ImportError, ImportOutcome, Importer, NodeInfo, Page, Paged, QueryService,
    RowStore, Taxonomy,
};
use taxtree_rdf::{export_archive, TripleEmitter};
use tracing::debug;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Initialize Taxtree in a directory.
pub fn init(path: &Path) -> Result<()> {
    let config_file = config_path(path);

    if config_file.exists() {
        println!("{} Already initialized", "✓".green());
        return Ok(());
    }

    Config::default().save(&config_file)?;

    println!("{} Initialized Taxtree in {}", "✓".green(), path.join(CONFIG_DIR).display());
    println!(
        "  Run {} to load a taxonomy dump",
        "taxtree import <dump-dir>".cyan()
    );

    Ok(())
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(message.to_string());
    Ok(spinner)
}

/// Cancels `token` on Ctrl+C until the returned task is aborted.
fn cancel_on_ctrl_c(token: CancelToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    })
}

fn open_store(config: &Config) -> Result<RowStore> {
    if !config.db_path.exists() {
        return Err(format!(
            "no taxonomy store at {} (run `taxtree import` first)",
            config.db_path.display()
        )
        .into());
    }
    Ok(RowStore::open(&config.db_path)?)
}

fn load_service(config: &Config) -> Result<QueryService> {
    debug!("Opening store at {}", config.db_path.display());
    let store = open_store(config)?;
    if !store.has_data() {
        return Err("the taxonomy store is empty (run `taxtree import` first)".into());
    }

    let spinner = spinner("Building taxonomy tree...")?;
    let service = QueryService::from_store(&store);
    spinner.finish_and_clear();
    Ok(service?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_node(info: &NodeInfo) {
    println!(
        "  {} {} {}",
        info.id.to_string().cyan(),
        info.scientific_name.as_deref().unwrap_or("-"),
        format!("[{}]", info.rank).yellow()
    );
}

fn print_nodes(nodes: &[NodeInfo], json: bool) -> Result<()> {
    if json {
        return print_json(&nodes);
    }
    if nodes.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for info in nodes {
        print_node(info);
    }
    Ok(())
}

fn print_page(page: &Paged<NodeInfo>, offset: usize, json: bool) -> Result<()> {
    if json {
        return print_json(page);
    }
    print_nodes(&page.items, false)?;
    let shown = match page.total {
        Some(total) => format!("{}-{} of {}", offset + 1, offset + page.items.len(), total),
        None => format!("{}-{}", offset + 1, offset + page.items.len()),
    };
    if !page.items.is_empty() {
        println!("\n  {} {}", "Showing".dimmed(), shown);
    }
    if page.has_more {
        println!(
            "  More results available, use {} to continue",
            format!("--offset {}", offset + page.items.len()).cyan()
        );
    }
    Ok(())
}

fn not_found(id: u32) -> Box<dyn std::error::Error + Send + Sync> {
    format!("taxon {} not found", id).into()
}

/// Import a taxonomy dump into the row store.
pub async fn import(config: &Config, dump_dir: PathBuf, force: bool) -> Result<()> {
    println!("{}", "Importing taxonomy dump...".cyan());
    let spinner = spinner("Writing nodes and names...")?;

    let db_path = config.db_path.clone();
    let import_config = config.import;
    let outcome = tokio::task::spawn_blocking(move || -> std::result::Result<_, ImportError> {
        let store = RowStore::open(&db_path)?;
        Importer::new(store, import_config).run(&dump_dir, force)
    })
    .await?;

    spinner.finish_and_clear();

    match outcome? {
        ImportOutcome::Imported(stamp) => {
            println!(
                "{} Imported {} nodes and {} names into {}",
                "✓".green(),
                stamp.nodes.to_string().cyan(),
                stamp.names.to_string().cyan(),
                config.db_path.display()
            );
            if stamp.skipped_lines > 0 {
                println!(
                    "{} {} lines skipped (malformed or without a taxon)",
                    "⚠".yellow(),
                    stamp.skipped_lines
                );
            }
        }
        ImportOutcome::Skipped => {
            println!("{} Store already holds a taxonomy", "✓".green());
            println!("  Run {} to import again", "taxtree import --force".cyan());
        }
    }
    Ok(())
}

/// Show store and tree statistics.
pub fn status(config: &Config) -> Result<()> {
    if !config.db_path.exists() {
        println!("{} No taxonomy imported", "✗".red());
        println!("  Run {} to import one", "taxtree import <dump-dir>".cyan());
        return Ok(());
    }

    let store = RowStore::open(&config.db_path)?;
    println!("{}", "Taxtree Status".cyan().bold());
    println!();
    println!("  {} {}", "Store:".dimmed(), config.db_path.display());
    println!("  {} {}", "Nodes:".dimmed(), store.node_count());
    println!("  {} {}", "Names:".dimmed(), store.name_count());
    match store.last_import()? {
        Some(stamp) => println!(
            "  {} {} ({} lines skipped)",
            "Imported:".dimmed(),
            stamp.finished_at.to_rfc3339(),
            stamp.skipped_lines
        ),
        None => println!("  {} never", "Imported:".dimmed()),
    }

    if !store.has_data() {
        return Ok(());
    }

    let spinner = spinner("Building taxonomy tree...")?;
    let service = QueryService::from_store(&store);
    spinner.finish_and_clear();
    let stats = service?.stats();

    println!("  {} {}", "Max depth:".dimmed(), stats.tree.max_depth);
    println!("  {} {}", "Leaves:".dimmed(), stats.tree.leaf_count);
    println!("  {} {}", "Distinct names:".dimmed(), stats.distinct_names);

    let mut ranks: Vec<_> = stats.tree.ranks.iter().collect();
    ranks.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    println!("  {}", "Top ranks:".dimmed());
    for (rank, count) in ranks.into_iter().take(10) {
        println!("    {:<20} {}", rank, count);
    }
    Ok(())
}

/// Show one taxon and its names.
pub fn node(config: &Config, id: u32, json: bool) -> Result<()> {
    let service = load_service(config)?;
    let info = service.node(id).ok_or_else(|| not_found(id))?;
    let names = service.names(id).unwrap_or_default();

    if json {
        #[derive(Serialize)]
        struct NodeResult<'a> {
            #[serde(flatten)]
            node: &'a NodeInfo,
            names: &'a [taxtree_core::NameRecord],
        }
        return print_json(&NodeResult {
            node: &info,
            names: &names,
        });
    }

    println!(
        "{} {}",
        info.id.to_string().cyan().bold(),
        info.scientific_name.as_deref().unwrap_or("-").bold()
    );
    println!("  {} {}", "Rank:".dimmed(), info.rank);
    println!("  {} {}", "Parent:".dimmed(), info.parent_id);
    println!("  {} {}", "Depth:".dimmed(), info.depth);
    println!("  {} {}", "Descendants:".dimmed(), info.descendant_count);
    if !names.is_empty() {
        println!("  {}", "Names:".dimmed());
        for record in &names {
            println!(
                "    {} {}",
                record.display_name(),
                format!("({})", record.name_class).dimmed()
            );
        }
    }
    Ok(())
}

/// Show the path from a taxon to the root.
pub fn lineage(config: &Config, id: u32, ranked: bool, json: bool) -> Result<()> {
    let service = load_service(config)?;

    if ranked {
        let lineage = service.ranked_lineage(id).ok_or_else(|| not_found(id))?;
        if json {
            return print_json(&lineage);
        }
        for entry in &lineage.ranks {
            println!(
                "  {:<14} {} {}",
                entry.rank.yellow(),
                entry.name.as_deref().unwrap_or("-"),
                format!("({})", entry.id).dimmed()
            );
        }
        return Ok(());
    }

    let lineage = service.lineage(id).ok_or_else(|| not_found(id))?;
    print_nodes(&lineage, json)
}

/// List the children of a taxon.
pub fn children(config: &Config, id: u32, json: bool) -> Result<()> {
    let service = load_service(config)?;
    let children = service.children(id).ok_or_else(|| not_found(id))?;
    print_nodes(&children, json)
}

/// List the siblings of a taxon.
pub fn siblings(config: &Config, id: u32, json: bool) -> Result<()> {
    let service = load_service(config)?;
    let siblings = service.siblings(id).ok_or_else(|| not_found(id))?;
    print_nodes(&siblings, json)
}

/// Walk the subtree below a taxon. Ctrl+C stops the walk early.
pub async fn descendants(
    config: &Config,
    id: u32,
    depth: Option<usize>,
    page: Page,
    json: bool,
) -> Result<()> {
    let service = load_service(config)?;

    let token = CancelToken::new();
    let watcher = cancel_on_ctrl_c(token.clone());
    let walk_token = token.clone();
    let result = tokio::task::spawn_blocking(move || {
        service.descendants(id, depth, page, Some(&walk_token))
    })
    .await?;
    watcher.abort();

    let found = result.ok_or_else(|| not_found(id))?;
    if token.is_cancelled() {
        eprintln!("{} Interrupted, results are partial", "⚠".yellow());
    }
    print_page(&found, page.offset, json)
}

/// Find taxa by name.
pub fn search(
    config: &Config,
    pattern: &str,
    class: Option<&str>,
    scope: Option<u32>,
    page: Page,
    json: bool,
) -> Result<()> {
    let service = load_service(config)?;
    let class = class.map(NameClass::from_dump);

    let found = service
        .find_by_name(pattern, class.as_ref(), scope, page)
        .ok_or_else(|| not_found(scope.unwrap_or_default()))?;

    if !json && found.items.is_empty() {
        println!("No matches found for \"{}\"", pattern);
        return Ok(());
    }
    print_page(&found, page.offset, json)
}

/// Export the taxonomy as a batched Turtle archive. Ctrl+C aborts.
pub async fn export(config: &Config, output: PathBuf) -> Result<()> {
    let store = open_store(config)?;
    let export_config = config.export.clone();

    let token = CancelToken::new();
    let watcher = cancel_on_ctrl_c(token.clone());
    let spinner = spinner("Emitting triples...")?;

    let out = output.clone();
    let result = tokio::task::spawn_blocking(move || -> Result<_> {
        let taxonomy = Taxonomy::load(&store)?;
        let emitter = TripleEmitter::for_taxonomy(&taxonomy, &export_config).with_cancel(token);
        Ok(export_archive(&out, &emitter, &export_config)?)
    })
    .await?;

    watcher.abort();
    spinner.finish_and_clear();
    let manifest = result?;

    println!(
        "{} Exported {} statements for {} taxa to {}",
        "✓".green(),
        manifest.report.triples.to_string().cyan(),
        manifest.report.nodes.to_string().cyan(),
        output.display()
    );
    println!(
        "  {} batches of up to {} statements",
        manifest.batches.len(),
        manifest.batch_size
    );
    if manifest.report.duplicates_dropped > 0 {
        println!(
            "  {} duplicate statements dropped",
            manifest.report.duplicates_dropped
        );
    }
    if manifest.report.fallback_predicates > 0 {
        println!(
            "{} {} names used the fallback predicate",
            "⚠".yellow(),
            manifest.report.fallback_predicates
        );
    }
    Ok(())
}
