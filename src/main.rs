//! Slide Explorer - embed Whole Slide Images and explore embeddings by similarity.
//!
//! This binary starts the explorer API or runs one-shot embedding and ranking
//! commands.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slide_explorer::{
    config::{Cli, Command, EmbedConfig, InferenceArgs, RankConfig, ServeConfig},
    embedding::{EmbeddingEngine, HttpInferenceRuntime, SlideEmbedder},
    explorer::{load_documents, resolve_slide_url, Explorer, SyncEvent},
    server::{create_router, AppState, RouterConfig, DEFAULT_NUM_PATCHES},
    similarity::rank,
    slide::{ImageSourceProvider, RasterImageSource, SlideHandles, TileServiceSource},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Embed(config) => run_embed(config).await,
        Command::Rank(config) => run_rank(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let data_config = match config.dataset.data_config() {
        Ok(data_config) => data_config.with_color_by(config.initial_color_by()),
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Slide Explorer v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Documents: {}", data_config.path.display());

    let documents = match data_config.load().await {
        Ok(documents) => documents,
        Err(e) => {
            error!("Failed to load documents: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("  Loaded {} document(s)", documents.len());
    if let Some(ref property) = data_config.color_by {
        info!("  Color by: {}", property);
    }

    let explorer = match Explorer::from_data_config(data_config, documents) {
        Ok(explorer) => explorer,
        Err(e) => {
            error!("Failed to initialize explorer: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match config.inference.tile_server.as_deref() {
        Some(tile_server) => match TileServiceSource::new(tile_server) {
            Ok(source) => {
                info!("  Tile server: {}", source.base_url());
                serve(config, explorer, source).await
            }
            Err(e) => {
                error!("Configuration error: {}", e);
                ExitCode::FAILURE
            }
        },
        None => serve(config, explorer, RasterImageSource::new()).await,
    }
}

/// Serve the explorer API, embedding slides read from `source`.
async fn serve<P>(config: ServeConfig, mut explorer: Explorer, source: P) -> ExitCode
where
    P: ImageSourceProvider + 'static,
{
    if let Err(e) = explorer.select_model(&config.inference.model) {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    spawn_sync_logger(explorer.subscribe_sync(), config.peer_name.clone());

    let num_patches = config.inference.num_patches_or(DEFAULT_NUM_PATCHES);
    let mut state = AppState::new(explorer)
        .with_default_num_patches(num_patches)
        .with_data_dir(config.dataset.data_dir.clone());

    match config.inference.inference_url.as_deref() {
        Some(inference_url) => match build_embedder(&config.inference, source, config.cache_slides) {
            Ok(embedder) => {
                info!("  Model endpoint: {}", embedder.engine().model_url());
                info!("  Patches per slide: {}", num_patches);
                state = state.with_embedder(embedder, inference_url);
            }
            Err(e) => {
                error!("Failed to set up slide embedding: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => warn!("  Slide embedding: DISABLED (no --inference-url)"),
    }

    let mut router_config = RouterConfig::new().with_tracing(!config.no_tracing);
    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }
    let router = create_router(state, router_config);

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on: http://{}", addr);
    info!("  curl http://{}/views/table", addr);

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Log outgoing peer messages; a transport can replace this subscriber.
fn spawn_sync_logger(mut events: broadcast::Receiver<SyncEvent>, peer_name: Option<String>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let message = event.into_message(peer_name.clone());
                    match serde_json::to_string(&message) {
                        Ok(json) => info!(message = %json, "Outgoing peer message"),
                        Err(e) => warn!("Failed to serialize peer message: {}", e),
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Sync listener fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Build the slide embedding pipeline against the configured model server.
fn build_embedder<P: ImageSourceProvider>(
    args: &InferenceArgs,
    source: P,
    cache_slides: usize,
) -> Result<SlideEmbedder<P, HttpInferenceRuntime>, String> {
    let model = args.encoder()?;
    let base_url = args
        .inference_url
        .as_deref()
        .ok_or_else(|| "no inference URL configured".to_string())?;

    let runtime = HttpInferenceRuntime::new().map_err(|e| e.to_string())?;
    let engine = EmbeddingEngine::new(runtime, model.endpoint(base_url));
    let handles = SlideHandles::with_capacity(source, cache_slides);

    Ok(SlideEmbedder::new(Arc::new(handles), Arc::new(engine))
        .with_detector(args.detector_config())
        .with_sampler(args.sampler_config())
        .with_layout(args.layout()))
}

// =============================================================================
// Embed Command
// =============================================================================

async fn run_embed(config: EmbedConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let url = match resolve_slide_url(&config.slide) {
        Ok(url) => url,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match config.inference.tile_server.as_deref() {
        Some(tile_server) => match TileServiceSource::new(tile_server) {
            Ok(source) => embed(config, &url, source).await,
            Err(e) => {
                error!("Configuration error: {}", e);
                ExitCode::FAILURE
            }
        },
        None => embed(config, &url, RasterImageSource::new()).await,
    }
}

/// Embed the slide at `url` read from `source` and print it as JSON.
async fn embed<P: ImageSourceProvider>(config: EmbedConfig, url: &str, source: P) -> ExitCode {
    let embedder = match build_embedder(&config.inference, source, 1) {
        Ok(embedder) => embedder,
        Err(e) => {
            error!("Failed to set up slide embedding: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let num_patches = config.inference.num_patches_or(DEFAULT_NUM_PATCHES);

    let mut slide = match embedder.embed_slide(url, num_patches, &mut rng).await {
        Ok(slide) => slide,
        Err(e) => {
            error!("Failed to embed {}: {}", url, e);
            return ExitCode::FAILURE;
        }
    };
    if !config.patches {
        slide.patches.clear();
    }

    match serde_json::to_string_pretty(&slide) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize embedding: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Rank Command
// =============================================================================

async fn run_rank(config: RankConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let documents = match config.dataset.path() {
        Ok(path) => match load_documents(&path).await {
            Ok(documents) => documents,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let Some(focus) = documents.get(config.focus) else {
        eprintln!(
            "Error: document {} not found ({} documents)",
            config.focus,
            documents.len()
        );
        return ExitCode::FAILURE;
    };

    let view = match rank(&documents, focus, config.measure) {
        Ok(view) => view,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let score_column = view.columns.last().map(String::as_str).unwrap_or("score");
    println!("{:>8}  {:>10}  properties", "index", score_column);
    println!("─────────────────────────────────────────");
    for row in view.rows.iter().take(config.limit) {
        let properties = serde_json::to_string(&row.properties).unwrap_or_default();
        println!(
            "{:>8}  {:>10.3}  {}",
            row.document_index, row.display_score, properties
        );
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "slide_explorer=debug,tower_http=debug"
    } else {
        "slide_explorer=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
