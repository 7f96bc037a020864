//! Zoomify Viewer - inspect and render Zoomify tile sets from the command line.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use zoomify_viewer::{
    config::{Cli, Command, InspectConfig, RenderConfig},
    fetch_pyramid, AnyTileSource, InputEvent, Point, Pyramid, RasterSurface, TileAddressing,
    TileSource, Viewer,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Inspect(config) => run_inspect(config).await,
        Command::Render(config) => run_render(config).await,
    }
}

// =============================================================================
// Inspect Command
// =============================================================================

async fn run_inspect(config: InspectConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    let source = AnyTileSource::from_location(&config.source);
    let addressing = TileAddressing::new(source.base());

    let pyramid = match fetch_pyramid(&source, &addressing).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if config.json {
        let json = serde_json::json!({
            "source": source.base(),
            "properties": addressing.properties_url(),
            "tile_size": pyramid.tile_size(),
            "total_tiles": pyramid.total_tiles(),
            "tile_groups": pyramid.tile_group_count(),
            "levels": pyramid.levels(),
        });
        match serde_json::to_string_pretty(&json) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_pyramid(&config.source, &pyramid);
    }

    ExitCode::SUCCESS
}

/// Print the level table.
fn print_pyramid(location: &str, pyramid: &Pyramid) {
    let finest = pyramid.finest();
    println!("Zoomify tile set: {}", location);
    println!("═════════════════════════════════════════════════════");
    println!(
        "Image: {} x {}, tile size {}",
        finest.image_width,
        finest.image_height,
        pyramid.tile_size()
    );
    println!();
    println!(
        "{:>5}  {:>11}  {:>7}  {:>6}  {:>11}",
        "Level", "Size", "Tiles", "Count", "TileGroups"
    );
    println!("─────────────────────────────────────────────────────");
    for level in pyramid.levels() {
        let count = level.tile_count();
        let first = level.tile_group_of(0).unwrap_or(0);
        let last = level.tile_group_of(count.saturating_sub(1)).unwrap_or(first);
        println!(
            "{:>5}  {:>11}  {:>7}  {:>6}  {:>11}",
            level.level,
            format!("{}x{}", level.image_width, level.image_height),
            format!("{}x{}", level.tiles_x, level.tiles_y),
            count,
            format!("{}-{}", first, last),
        );
    }
    println!("─────────────────────────────────────────────────────");
    println!(
        "Total: {} tile(s) in {} tile group(s)",
        pyramid.total_tiles(),
        pyramid.tile_group_count()
    );
}

// =============================================================================
// Render Command
// =============================================================================

async fn run_render(config: RenderConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let source = AnyTileSource::from_location(&config.source);
    info!(
        source = source.base(),
        remote = source.is_remote(),
        width = config.width,
        height = config.height,
        "Opening tile set"
    );

    let surface = RasterSurface::new(config.width, config.height).with_device_ratio(config.device_ratio);
    let mut viewer = match Viewer::open(config.viewer_options(), source, surface).await {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to open viewer: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let anchor = config.anchor.map(|(x, y)| Point::new(x, y));
    for &factor in &config.zooms {
        if !viewer.zoom(factor, anchor) {
            warn!(factor, "Zoom step had no effect (scale at its bound)");
        }
        // Each step starts from the level matching the previous one
        viewer.flush_level_check();
    }
    for &(dx, dy) in &config.pans {
        viewer.handle_event(InputEvent::Pan { dx, dy });
    }

    if tokio::time::timeout(config.settle_timeout(), viewer.settle())
        .await
        .is_err()
    {
        warn!(
            timeout_secs = config.settle_timeout,
            "Tile loads did not settle in time, rendering what is resident"
        );
    }
    let pass = viewer.render();
    let stats = viewer.stats();
    info!(
        level = stats.level,
        scale = stats.scale,
        drawn = pass.drawn,
        missing = pass.requested,
        "Rendered view"
    );

    if let Err(e) = viewer.surface().save_png(&config.output) {
        error!("Failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }
    info!("Wrote {}", config.output.display());

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "zoomify_viewer=debug"
    } else {
        "zoomify_viewer=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
