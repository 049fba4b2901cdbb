// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! `mosaic` binary.
//!
//! ```bash
//! mosaic --api-url http://localhost:8080 serve --port 8060
//! mosaic --api-url http://localhost:8080 render --tile dendro-bark --sites 1,2,3 --format csv
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mosaic_tiles::chart::{ChartRenderer, RenderTarget, SnapshotRenderer};
use mosaic_tiles::config::load_tiles;
use mosaic_tiles::export::ExportFormat;
use mosaic_tiles::fetcher::{Endpoints, DEFAULT_SAMPLE_ENDPOINT, DEFAULT_VARIABLE_ENDPOINT};
use mosaic_tiles::server::{self, AppState, ServerConfig};
use mosaic_tiles::{
    DashboardComposer, HttpTransport, RenderOutcome, SiteId, SiteSelection, TileBoard,
    VariableFetcher,
};

#[derive(Parser, Debug)]
#[command(name = "mosaic")]
#[command(about = "Tile dashboard over aggregate site variables")]
#[command(version)]
struct Args {
    /// Base URL of the backend that serves variable aggregates
    #[arg(long, env = "MOSAIC_API_URL", default_value = "http://localhost:8080")]
    api_url: String,

    /// Directory of tile definitions (*.yaml); built-in tiles are used when missing
    #[arg(long, env = "MOSAIC_TILES_DIR", default_value = "/etc/mosaic/tiles.d")]
    tiles_dir: PathBuf,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "30")]
    request_timeout_secs: u64,

    /// Backend path for variable aggregates
    #[arg(long, default_value = DEFAULT_VARIABLE_ENDPOINT)]
    variable_endpoint: String,

    /// Backend path for the sample total
    #[arg(long, default_value = DEFAULT_SAMPLE_ENDPOINT)]
    sample_endpoint: String,

    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the tile API over HTTP
    Serve {
        #[arg(short, long, default_value = "8060")]
        port: u16,
    },
    /// Render one tile and print its export
    Render {
        #[arg(long)]
        tile: String,

        /// Comma-separated site ids
        #[arg(long, value_delimiter = ',')]
        sites: Vec<SiteId>,

        #[arg(long, value_enum, default_value = "json")]
        format: ExportFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    // RUST_LOG takes precedence, fallback to info
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn build_board(args: &Args, renderer: Arc<dyn ChartRenderer>, sites: Vec<SiteId>) -> Result<TileBoard> {
    let timeout = Duration::from_secs(args.request_timeout_secs);
    let transport = HttpTransport::new(&args.api_url, timeout)?;
    let fetcher = VariableFetcher::new(Arc::new(transport))
        .with_endpoints(Endpoints {
            variable: args.variable_endpoint.clone(),
            sample_total: args.sample_endpoint.clone(),
        })
        .with_timeout(timeout);

    let tiles = load_tiles(&args.tiles_dir)?;
    tracing::info!(
        tiles = tiles.len(),
        dir = %args.tiles_dir.display(),
        "loaded tile definitions"
    );

    Ok(TileBoard::new(
        tiles,
        DashboardComposer::new(fetcher),
        renderer,
        SiteSelection::new(sites),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    tracing::info!(
        api_url = %args.api_url,
        request_timeout_secs = args.request_timeout_secs,
        "Starting mosaic"
    );

    let charts = Arc::new(SnapshotRenderer::new());

    match &args.command {
        Command::Serve { port } => {
            let board = build_board(&args, charts.clone(), Vec::new())?;
            let state = AppState {
                board: Arc::new(board),
                charts,
            };
            server::run_server(state, ServerConfig { port: *port }).await
        }
        Command::Render {
            tile,
            sites,
            format,
        } => {
            let board = build_board(&args, charts, sites.clone())?;
            let outcome = board
                .render(tile, Some(RenderTarget::new("cli")))
                .await
                .with_context(|| format!("rendering tile '{tile}'"))?;
            if let RenderOutcome::Discarded { reason, .. } = &outcome {
                bail!("render of '{tile}' was discarded: {reason}");
            }
            let out = board.export(tile, *format).await?;
            println!("{out}");
            Ok(())
        }
    }
}
