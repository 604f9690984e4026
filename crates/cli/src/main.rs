//! CLI application for the feedy event feed.

use clap::{Parser, Subcommand};
use feedy_decoder::decode;
use feedy_ingestion::{LogSubscription, SubscriptionSpec, UpstreamConnector};
use feedy_store::RawLog;
use feedy_telemetry::{init_logging, Metrics};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "feedy")]
#[command(about = "Real-time contract event feed: backfills history, follows new logs and fans them out over WebSocket")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the feed and the fan-out server
    Serve {
        /// Upstream node WebSocket URL
        #[arg(long, default_value = "ws://127.0.0.1:8546")]
        upstream_url: String,

        /// Address the fan-out server binds to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port the fan-out server listens on
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Metrics bind address
        #[arg(long, default_value = "0.0.0.0:9090")]
        metrics_bind_address: String,

        /// Log level
        #[arg(long)]
        log_level: Option<String>,

        /// Contract/topic pair to follow, as <address>:<topic>. Repeatable;
        /// the built-in deployment is used when omitted
        #[arg(long = "subscription")]
        subscriptions: Vec<LogSubscription>,
    },
    /// Decode a JSON array of raw logs and print one event per line
    Decode {
        /// File holding an `eth_getLogs` result
        file: PathBuf,

        /// Log level
        #[arg(long)]
        log_level: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            upstream_url,
            host,
            port,
            metrics_bind_address,
            log_level,
            subscriptions,
        } => {
            init_logging(log_level.as_deref())?;
            let spec = if subscriptions.is_empty() {
                SubscriptionSpec::default()
            } else {
                SubscriptionSpec::new(subscriptions)?
            };
            run_feed(&upstream_url, &host, port, &metrics_bind_address, spec).await?;
        }
        Commands::Decode { file, log_level } => {
            init_logging(Some(log_level.as_deref().unwrap_or("warn")))?;
            decode_file(&file)?;
        }
    }

    Ok(())
}

async fn run_feed(
    upstream_url: &str,
    host: &str,
    port: u16,
    metrics_addr: &str,
    spec: SubscriptionSpec,
) -> anyhow::Result<()> {
    info!("Starting feedy with {} subscriptions", spec.pairs().len());

    let metrics = Metrics::new()?;
    start_metrics_server(metrics_addr, metrics.clone()).await?;

    let listener = feedy_server::bind(host, port).await?;
    let connector = UpstreamConnector::connect(upstream_url, spec, metrics.clone()).await?;
    let feed = connector.feed();

    let mut server = tokio::spawn(feedy_server::serve(listener, feed, metrics));

    tokio::select! {
        result = connector.run() => {
            // Only returns once the upstream is gone.
            result?;
        }
        result = &mut server => {
            result??;
            warn!("Fan-out server stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    server.abort();
    Ok(())
}

fn decode_file(path: &std::path::Path) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(path)?;
    let logs: Vec<RawLog> = serde_json::from_str(&contents)?;

    let mut decoded = 0;
    for raw in &logs {
        match decode(raw) {
            Ok(event) => {
                println!("{}", serde_json::to_string(&event)?);
                decoded += 1;
            }
            Err(e) => error!(key = %raw.dedup_key(), "Skipping log: {}", e),
        }
    }

    info!("Decoded {} of {} logs", decoded, logs.len());
    Ok(())
}

async fn start_metrics_server(addr: &str, metrics: Metrics) -> anyhow::Result<()> {
    use axum::{
        extract::State,
        http::StatusCode,
        response::IntoResponse,
        routing::get,
        Router,
    };
    use std::sync::Arc;

    let metrics = Arc::new(metrics);

    async fn metrics_handler(
        State(metrics): State<Arc<Metrics>>,
    ) -> Result<impl IntoResponse, StatusCode> {
        match metrics.gather() {
            Ok(body) => Ok((StatusCode::OK, body)),
            Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Metrics server listening on http://{}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}
