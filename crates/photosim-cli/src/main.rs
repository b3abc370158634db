//! PhotoSim — index a photo folder and find visually similar photos.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use photosim_core::PhotoSimConfig;
use photosim_index::{CancellationToken, IndexingCoordinator, StartOutcome};
use photosim_infer::{EmbedderBackend, ImagePreprocessor, ResizePreprocessor};
use photosim_search::{SimilarityFinder, SimilarityQuery};
use photosim_store::SqliteStore;

mod media;
mod validate;

fn resolve_data_dir() -> PathBuf {
    std::env::var("PHOTOSIM_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

/// Everything a command needs, wired from configuration.
struct Components {
    config: PhotoSimConfig,
    store: Arc<SqliteStore>,
    embedder: Arc<dyn EmbedderBackend>,
    preprocessor: Arc<dyn ImagePreprocessor>,
}

impl Components {
    fn load(data_dir: &Path) -> anyhow::Result<Self> {
        info!("Data directory: {}", data_dir.display());
        let config = PhotoSimConfig::from_env(data_dir)?;

        let embedder =
            photosim_infer::create_embedder(&config.data_paths.models, config.histogram_bins);
        let store = SqliteStore::open(&config.data_paths.vectordb, embedder.model_id())
            .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;
        let preprocessor = Arc::new(ResizePreprocessor::new(config.image_size));

        Ok(Self {
            config,
            store: Arc::new(store),
            embedder,
            preprocessor,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("help");

    match command {
        "index" => {
            let Some(dir) = args.get(2) else {
                eprintln!("Usage: photosim index <dir> [--all]");
                std::process::exit(1);
            };
            let all = args[3..].iter().any(|a| a == "--all");
            run_index(Path::new(dir), all).await
        }
        "similar" => {
            let Some(image) = args.get(2) else {
                eprintln!("Usage: photosim similar <image> [k]");
                std::process::exit(1);
            };
            let k = match args.get(3) {
                Some(raw) => Some(
                    raw.parse::<usize>()
                        .ok()
                        .filter(|k| *k > 0)
                        .with_context(|| format!("k must be a positive integer, got {:?}", raw))?,
                ),
                None => None,
            };
            run_similar(Path::new(image), k)
        }
        "add" => {
            let Some(image) = args.get(2) else {
                eprintln!("Usage: photosim add <image>");
                std::process::exit(1);
            };
            run_add(Path::new(image))
        }
        "status" => {
            let json = args[2..].iter().any(|a| a == "--json");
            run_status(json)
        }
        "--validate" | "validate" => {
            let json = args[2..].iter().any(|a| a == "--json");
            let data_dir = args[2..]
                .iter()
                .find(|a| !a.starts_with("--"))
                .map(PathBuf::from)
                .unwrap_or_else(resolve_data_dir);
            let report = validate::validate(&data_dir);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                validate::print_report(&report);
            }
            std::process::exit(if report.is_healthy() { 0 } else { 1 });
        }
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}. Use 'photosim help' for usage.", other);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!("PhotoSim — find visually similar photos");
    println!();
    println!("Usage: photosim <command>");
    println!();
    println!("Commands:");
    println!("  index <dir> [--all]      Embed photos under <dir> (--all re-embeds indexed ones)");
    println!("  similar <image> [k]      List the k photos most similar to <image>");
    println!("  add <image>              Embed and store a single photo now");
    println!("  status [--json]          Show store statistics");
    println!("  validate [dir] [--json]  Check the store for corrupt records");
    println!("  help                     Show this help message");
    println!();
    println!("Environment:");
    println!("  PHOTOSIM_DATA_DIR        Data directory (default: ./data)");
    println!("  PHOTOSIM_TOP_K           Default k for 'similar' (default: 30)");
    println!("  PHOTOSIM_IMAGE_SIZE      Edge length images are resized to (default: 224)");
    println!("  PHOTOSIM_HISTOGRAM_BINS  Bins per channel for the colour embedder (default: 8)");
}

async fn run_index(dir: &Path, all: bool) -> anyhow::Result<()> {
    let c = Components::load(&resolve_data_dir())?;
    let dir = std::fs::canonicalize(dir)
        .with_context(|| format!("Cannot read directory {}", dir.display()))?;

    let found = media::scan_directory(&dir)?;
    let candidates = if all {
        found
    } else {
        let indexed = c.store.get_indexed_ids()?;
        found
            .into_iter()
            .filter(|p| !indexed.contains(&p.id))
            .collect()
    };

    let stale = c.store.count_stale()?;
    if stale > 0 && !all {
        warn!(
            "{} photos were embedded by another model; run with --all to re-embed them",
            stale
        );
    }
    if candidates.is_empty() {
        println!("Nothing to index under {}", dir.display());
        return Ok(());
    }

    let coordinator = IndexingCoordinator::new(c.store.clone(), c.embedder, c.preprocessor);
    let token = CancellationToken::new();
    let mut handle = match coordinator.start_with_token(candidates, token.clone())? {
        StartOutcome::Started(handle) => handle,
        StartOutcome::AlreadyRunning => anyhow::bail!("An indexing job is already running"),
    };

    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current photo");
            token.cancel();
        }
    });

    while let Some(progress) = handle.progress.recv().await {
        eprint!("\rIndexed {}/{}", progress.completed, progress.total);
        if progress.finished {
            eprintln!();
        }
    }
    ctrl_c.abort();

    let report = handle.wait().await?;
    let status = if report.cancelled {
        "cancelled"
    } else {
        "completed"
    };
    println!(
        "Indexing {}: {} of {} photos stored, {} skipped",
        status, report.completed, report.total, report.skipped
    );
    Ok(())
}

fn run_similar(image: &Path, k: Option<usize>) -> anyhow::Result<()> {
    let c = Components::load(&resolve_data_dir())?;
    let image = std::fs::canonicalize(image)
        .with_context(|| format!("Cannot read image {}", image.display()))?;
    let query_ref = media::photo_ref(&image)?;
    let k = k.unwrap_or(c.config.top_k);

    let finder = SimilarityFinder::new(c.store, c.embedder, c.preprocessor);
    let query = SimilarityQuery::from_location(query_ref.location).with_id(query_ref.id);
    let results = finder.find_similar(&query, k)?;

    if results.is_empty() {
        println!("No indexed photos yet. Run 'photosim index <dir>' first.");
        return Ok(());
    }
    for (rank, r) in results.iter().enumerate() {
        let marker = if r.is_query { "  (query)" } else { "" };
        println!("{:>3}. {:.4}  {}{}", rank + 1, r.score, r.location, marker);
    }
    Ok(())
}

fn run_add(image: &Path) -> anyhow::Result<()> {
    let c = Components::load(&resolve_data_dir())?;
    let image = std::fs::canonicalize(image)
        .with_context(|| format!("Cannot read image {}", image.display()))?;
    let photo = media::photo_ref(&image)?;

    let finder = SimilarityFinder::new(c.store, c.embedder, c.preprocessor);
    let embedding = finder.index_single(&photo.id, &photo.location)?;
    println!(
        "Stored {} ({} dims) as {}",
        photo.location,
        embedding.len(),
        photo.id
    );
    Ok(())
}

fn run_status(json: bool) -> anyhow::Result<()> {
    let c = Components::load(&resolve_data_dir())?;
    let stats = c.store.get_stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("=== PhotoSim Status ===");
    println!();
    println!("Database:           {}", stats.db_path);
    println!("Size:               {} MB", stats.db_size_mb);
    println!("Photos:             {}", stats.total_records);
    println!("Dimensions:         {:?}", stats.dimensions);
    println!("Current model:      {}", stats.model);
    println!("Embedder dim:       {}", c.embedder.dimension());
    println!("Stale records:      {}", stats.stale_records);
    if stats.stale_records > 0 {
        println!();
        println!("Re-index with 'photosim index <dir> --all' to refresh stale records.");
    }
    Ok(())
}
