use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use clap::Subcommand;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use docmirror_lib::HttpStore;
use docmirror_lib::cache::SnapshotCache;
use docmirror_lib::cache::SqliteStore;
use docmirror_lib::connectivity::Connectivity;
use docmirror_lib::delta::DeltaOptions;
use docmirror_lib::delta::DeltaSync;
use docmirror_lib::gateway::Gateway;
use docmirror_lib::gateway::GatewayConfig;
use docmirror_lib::gateway::MemoryResponseCache;
use docmirror_lib::gateway::serve;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "docmirror")]
#[command(about = "Local mirror and offline gateway for a remote document store")]
#[command(version)]
struct Args {
    /// Path to the local snapshot database
    #[arg(long, default_value = "docmirror.db")]
    db: PathBuf,

    /// Base URL of the remote document store
    #[arg(long, env = "DOCMIRROR_URL")]
    url: Option<String>,

    /// Bearer token for the remote store
    #[arg(long, env = "DOCMIRROR_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mirror datasets and stream change notifications until interrupted
    Sync {
        /// Datasets to mirror, as `dataset` or `dataset=collection`
        #[arg(required = true)]
        datasets: Vec<String>,

        /// Poll interval in seconds
        #[arg(long, default_value_t = 300)]
        interval: u64,

        /// Records fetched per delta check
        #[arg(long, default_value_t = 25)]
        batch_size: usize,
    },

    /// Show snapshot status for datasets
    Status {
        #[arg(required = true)]
        datasets: Vec<String>,
    },

    /// Drop and re-fetch one dataset snapshot
    Refresh {
        dataset: String,

        /// Remote collection name, when it differs from the dataset name
        #[arg(long)]
        collection: Option<String>,
    },

    /// Remove snapshots left over from previous days
    Cleanup,

    /// Remove every snapshot
    ClearCache,

    /// Run the offline request gateway
    Gateway {
        #[arg(long, default_value = "127.0.0.1:8787")]
        listen: SocketAddr,

        /// Origin the static assets are served from
        #[arg(long)]
        origin: String,

        /// Deployment version for cache namespaces
        #[arg(long, default_value = "v1")]
        version: String,

        /// Backend host substrings routed network-first
        #[arg(long = "backend-host")]
        backend_hosts: Vec<String>,

        /// Static asset paths pre-cached and served cache-first
        #[arg(long = "static-asset")]
        static_assets: Vec<String>,

        /// Path prefixes served cache-first
        #[arg(long = "asset-prefix")]
        asset_prefixes: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Sync {
            ref datasets,
            interval,
            batch_size,
        } => {
            let snapshots = snapshots(&args).await?;
            run_sync(&args, snapshots, datasets, interval, batch_size).await
        }
        Command::Status { ref datasets } => {
            let snapshots = snapshots(&args).await?;
            let names: Vec<&str> = datasets.iter().map(String::as_str).collect();
            let status = snapshots.status(&names).await;
            for name in &names {
                let entry = &status[*name];
                if entry.cached {
                    println!(
                        "{name}: {} records, cached {}",
                        entry.count,
                        entry.age.as_deref().unwrap_or("just now"),
                    );
                } else {
                    println!("{name}: not cached");
                }
            }
            Ok(())
        }
        Command::Refresh {
            ref dataset,
            ref collection,
        } => {
            let snapshots = snapshots(&args).await?;
            let collection = collection.as_deref().unwrap_or(dataset);
            let refreshed = snapshots.force_refresh(dataset, collection).await;
            println!("{dataset}: {} records", refreshed.data().len());
            Ok(())
        }
        Command::Cleanup => {
            let snapshots = snapshots(&args).await?;
            println!("removed {} stale snapshots", snapshots.cleanup_stale().await);
            Ok(())
        }
        Command::ClearCache => {
            let snapshots = snapshots(&args).await?;
            println!("removed {} snapshots", snapshots.clear_all().await);
            Ok(())
        }
        Command::Gateway {
            listen,
            ref origin,
            ref version,
            ref backend_hosts,
            ref static_assets,
            ref asset_prefixes,
        } => {
            run_gateway(
                listen,
                origin,
                version,
                backend_hosts,
                static_assets,
                asset_prefixes,
            )
            .await
        }
    }
}

fn remote(args: &Args) -> Result<Arc<HttpStore>> {
    let url = args
        .url
        .as_deref()
        .ok_or_else(|| eyre!("remote store URL required (--url or DOCMIRROR_URL)"))?;

    let builder = HttpStore::builder().url(url);
    let builder = match &args.token {
        Some(token) => builder.bearer_token(token.as_str()),
        None => builder,
    };
    Ok(Arc::new(builder.build()))
}

async fn snapshots(args: &Args) -> Result<Arc<SnapshotCache>> {
    let store = remote(args)?;
    let kv = Arc::new(SqliteStore::open(&args.db).await?);
    Ok(Arc::new(SnapshotCache::new(kv, store)))
}

async fn run_sync(
    args: &Args,
    snapshots: Arc<SnapshotCache>,
    datasets: &[String],
    interval: u64,
    batch_size: usize,
) -> Result<()> {
    let store = remote(args)?;

    // App-start sweep before any listener touches the snapshots.
    snapshots.cleanup_stale().await;

    let sync = DeltaSync::new(store, snapshots, Connectivity::online());
    let mut events = sync.subscribe();

    for spec in datasets {
        let (dataset, collection) = match spec.split_once('=') {
            Some((dataset, collection)) => (dataset, Some(collection)),
            None => (spec.as_str(), None),
        };

        let mut options = DeltaOptions::new()
            .with_batch_size(batch_size)
            .with_poll_interval(Duration::from_secs(interval));
        if let Some(collection) = collection {
            options = options.with_collection(collection);
        }

        sync.start(dataset, options);
    }

    info!("mirroring {} datasets, ctrl-c to stop", datasets.len());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => println!(
                    "{} {}: {} records changed",
                    event.timestamp.format("%H:%M:%S"),
                    event.dataset,
                    event.changed.len()
                ),
                Err(RecvError::Lagged(skipped)) => {
                    eprintln!("skipped {skipped} notifications");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    sync.shutdown();
    Ok(())
}

async fn run_gateway(
    listen: SocketAddr,
    origin: &str,
    version: &str,
    backend_hosts: &[String],
    static_assets: &[String],
    asset_prefixes: &[String],
) -> Result<()> {
    let mut config = GatewayConfig::new(origin).with_version(version);
    for host in backend_hosts {
        config = config.backend_host(host.as_str());
    }
    for asset in static_assets {
        config = config.static_asset(asset.as_str());
    }
    for prefix in asset_prefixes {
        config = config.asset_prefix(prefix.as_str());
    }

    let gateway = Arc::new(Gateway::new(config, Arc::new(MemoryResponseCache::new())));
    gateway.install().await;
    gateway.activate().await;

    let listener = tokio::net::TcpListener::bind(listen).await?;
    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    serve(gateway, listener, shutdown).await;
    Ok(())
}
