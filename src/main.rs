use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use cosim_core::{Recommender, RecommenderConfig};
use cosim_storage::LmdbStore;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Incremental item-to-item similarity from co-occurrence
#[derive(Parser, Debug)]
#[command(name = "cosim")]
#[command(about = "Related items from co-occurrence", long_about = None)]
struct Args {
    /// Path to the data directory
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Recommender configuration (JSON)
    #[arg(short, long, default_value = "cosim.json")]
    config: PathBuf,

    /// Log level, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest one interaction set
    AddSet {
        /// Input matrix receiving the set
        #[arg(short, long)]
        matrix: String,
        /// Bucket id (order, user, session, ...)
        bucket: String,
        /// Items of the set
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Ingest sets from a file of `bucket<TAB>item,item,...` lines
    Import {
        #[arg(short, long)]
        matrix: String,
        file: PathBuf,
    },
    /// Process every dirty item
    Process,
    /// Process the given items
    ProcessItem {
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Print the stored neighbours of an item
    Related {
        item: String,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        limit: Option<usize>,
        /// Print JSON instead of tab-separated lines
        #[arg(long)]
        json: bool,
    },
    /// Remove an item everywhere, or from one matrix
    Remove {
        item: String,
        #[arg(short, long)]
        matrix: Option<String>,
    },
    /// Print per-matrix set counts and the dirty backlog
    Stats,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = RecommenderConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    info!("Data directory: {:?}", args.data_dir);

    let store = Arc::new(LmdbStore::open(&args.data_dir)?);
    let recommender = Recommender::new(config, store)?;
    info!(
        "Recommender {} ready with {} input matrices",
        recommender.name(),
        recommender.matrices().len()
    );

    match args.command {
        Command::AddSet { matrix, bucket, items } => {
            let distinct = recommender.add_set(&matrix, &bucket, &items)?;
            info!("Added set {} with {} distinct items to {}", bucket, distinct.len(), matrix);
        }
        Command::Import { matrix, file } => {
            let sets = import(&recommender, &matrix, &file)?;
            info!("Imported {} sets into {}", sets, matrix);
        }
        Command::Process => {
            let report = recommender.process()?;
            println!(
                "processed={} conflicts={} failed={}",
                report.processed,
                report.conflicts,
                report.failed.len()
            );
            if !report.failed.is_empty() {
                bail!("{} items failed and remain dirty", report.failed.len());
            }
        }
        Command::ProcessItem { items } => {
            let report = recommender.process_items(&items);
            println!(
                "processed={} conflicts={} failed={}",
                report.processed,
                report.conflicts,
                report.failed.len()
            );
        }
        Command::Related { item, offset, limit, json } => {
            let limit = limit.unwrap_or(recommender.max_neighbors());
            let neighbors = recommender.neighbors_page(&item, offset, limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&neighbors)?);
            } else {
                for entry in neighbors {
                    println!("{}\t{}", entry.item, entry.score);
                }
            }
        }
        Command::Remove { item, matrix } => match matrix {
            Some(matrix) => recommender.remove_item_from_matrix(&matrix, &item)?,
            None => recommender.remove_item(&item)?,
        },
        Command::Stats => {
            for matrix in recommender.matrices() {
                println!(
                    "{}\tweight={}\tmeasure={}\tsets={}",
                    matrix.name(),
                    matrix.weight(),
                    matrix.measure(),
                    matrix.set_count()?
                );
            }
            println!("dirty\t{}", recommender.dirty_items()?.len());
        }
    }

    Ok(())
}

/// Feed every line of `path` to `add_set`, returns the number of sets
fn import(recommender: &Recommender, matrix: &str, path: &Path) -> anyhow::Result<usize> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut sets = 0;
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((bucket, items)) = line.split_once('\t') else {
            bail!("{}:{}: expected bucket<TAB>items", path.display(), lineno + 1);
        };
        let items: Vec<&str> = items
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .collect();
        recommender
            .add_set(matrix, bucket.trim(), &items)
            .with_context(|| format!("{}:{}", path.display(), lineno + 1))?;
        sets += 1;
    }
    Ok(sets)
}
