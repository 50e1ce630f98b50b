//! Netfirst Proxy - offline-first reverse proxy.
//!
//! `proxy` serves an upstream origin through a network-first cache so the page
//! keeps working when the upstream is unreachable. `serve` is a static dev
//! server for the page's own files.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use netfirst_core::{
    CacheDefaults, CacheStorage, ClientRegistry, DevServerConfig, Fetcher, HttpFetcher,
    MemoryCacheStorage, ServiceWorker, SqliteCacheStorage, Url, WorkerConfig,
};
use netfirst_proxy::{start_server, start_static_server, AppState, StaticSiteConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "netfirst-proxy")]
#[command(about = "Network-first caching proxy for offline-capable pages")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Proxy an upstream origin through the offline cache
    Proxy(ProxyArgs),
    /// Serve a directory as a PWA dev site
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct ProxyArgs {
    /// Origin to forward requests to, e.g. http://localhost:8000
    #[arg(long)]
    upstream: Url,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Name of the live cache namespace; every other namespace is removed on start
    #[arg(long, default_value_t = CacheDefaults::DEFAULT_CACHE_NAME.to_string())]
    cache_name: String,

    /// Cache database path (defaults to the platform data directory)
    #[arg(long, conflicts_with = "memory")]
    db: Option<PathBuf>,

    /// Keep the cache in memory only
    #[arg(long)]
    memory: bool,

    /// Origin the page is served from, for basic/cors/opaque classification
    /// (defaults to the upstream origin)
    #[arg(long)]
    page_origin: Option<Url>,

    /// Network timeout in seconds before falling back to the cache
    #[arg(long, default_value = "15")]
    timeout_secs: u64,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Directory to serve
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DevServerConfig::PORT)]
    port: u16,

    /// Worker script served with no-cache headers
    #[arg(long, default_value = DevServerConfig::WORKER_SCRIPT)]
    worker_script: String,

    /// Open the site in the default browser once the server is up
    #[arg(long)]
    open: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match cli.command {
        Command::Proxy(args) => run_proxy(args).await,
        Command::Serve(args) => run_serve(args).await,
    }
}

async fn run_proxy(args: ProxyArgs) -> Result<()> {
    info!("Starting netfirst proxy for {}", args.upstream);

    let storage: Arc<dyn CacheStorage> = if args.memory {
        Arc::new(MemoryCacheStorage::new())
    } else {
        let db_path = args.db.unwrap_or_else(CacheDefaults::default_db_path);
        info!("Cache database: {}", db_path.display());
        Arc::new(
            SqliteCacheStorage::new(&db_path)
                .with_context(|| format!("opening cache database {}", db_path.display()))?,
        )
    };

    let page_origin = args.page_origin.unwrap_or_else(|| args.upstream.clone());
    let config = WorkerConfig::new(args.cache_name)?.with_page_origin(page_origin.clone());
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::with_timeout(
        Some(page_origin),
        Duration::from_secs(args.timeout_secs),
    )?);

    let worker = Arc::new(ServiceWorker::new(
        config,
        storage,
        Arc::clone(&fetcher),
        Arc::new(ClientRegistry::new()),
    ));
    worker.install().await?;
    worker.activate().await?;

    let state = Arc::new(AppState::new(Arc::clone(&worker), fetcher, args.upstream));
    let addr = start_server(state, &args.host, args.port).await?;

    // Print port for wrapper scripts to read (intentional stdout)
    println!("PROXY_PORT={}", addr.port());
    info!("Proxy running on http://{}", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, flushing cache writes");
    worker.settle().await;

    Ok(())
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let root = args
        .root
        .canonicalize()
        .with_context(|| format!("site root {} not found", args.root.display()))?;

    let config = StaticSiteConfig {
        root,
        worker_script: args.worker_script,
    };
    let addr = start_static_server(config, &args.host, args.port).await?;

    let url = site_url(addr);
    println!("Open {} in a browser", url);
    println!("Workers only run on localhost or HTTPS");
    println!("Press Ctrl+C to stop");

    if args.open {
        info!("Opening browser at {}", url);
        if let Err(e) = webbrowser::open(&url) {
            warn!("Failed to open browser: {}", e);
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Server stopped");

    Ok(())
}

/// Address to show the user for the dev site.
///
/// Loopback and wildcard binds are reported as `localhost`, the one host name
/// browsers treat as a secure context without HTTPS.
fn site_url(addr: SocketAddr) -> String {
    if addr.ip().is_loopback() || addr.ip().is_unspecified() {
        format!("http://localhost:{}", addr.port())
    } else {
        format!("http://{}", addr)
    }
}
