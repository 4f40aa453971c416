use choreo::{ChoreoNode, NodeConfig, ServiceSet, StoreConfig};
use clap::{Parser, ValueEnum};
use log::{error, info};
use slog::Drain;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum StoreBackend {
    Memory,
    Files,
    Rocksdb,
}

#[derive(Parser, Debug)]
#[command(name = "choreo")]
#[command(about = "Serve stateful services and execute distributed compositions", long_about = None)]
struct Args {
    /// Address to listen on for HTTP requests (e.g., 0.0.0.0:8000)
    #[arg(short = 'l', long)]
    listen: String,

    /// Address other hosts use to reach this node (e.g., 192.168.1.10:8000)
    /// If not specified, uses the listen address
    #[arg(short = 'a', long)]
    advertise: Option<String>,

    /// Operation feed file; the built-in services' feed is used if omitted
    #[arg(short, long)]
    operations: Option<PathBuf>,

    /// Instance storage backend
    #[arg(long, value_enum, default_value_t = StoreBackend::Memory)]
    store_backend: StoreBackend,

    /// Directory for the files and rocksdb backends
    #[arg(long, default_value = "choreo-data")]
    store_dir: PathBuf,

    /// Timeout in seconds for forwarded requests (0 waits indefinitely)
    #[arg(long, default_value_t = 30)]
    forward_timeout: u64,
}

fn create_logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, slog::o!("service" => "choreo"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::init();

    let args = Args::parse();

    let store = match args.store_backend {
        StoreBackend::Memory => StoreConfig::Memory,
        StoreBackend::Files => StoreConfig::Files(args.store_dir),
        StoreBackend::Rocksdb => StoreConfig::RocksDb(args.store_dir),
    };

    let mut config = NodeConfig::new(args.listen)
        .with_store(store)
        .with_forward_timeout((args.forward_timeout > 0).then(|| Duration::from_secs(args.forward_timeout)));

    if let Some(advertise) = args.advertise {
        config = config.with_advertise_address(advertise);
    }
    if let Some(operations) = args.operations {
        config = config.with_operations_file(operations);
    }

    info!("Starting node advertised as {}", config.advertised());

    let node = match ChoreoNode::start(config, ServiceSet::builtin(), create_logger()).await {
        Ok(node) => node,
        Err(e) => {
            error!("Failed to start node: {}", e);
            return Err(e.into());
        }
    };

    info!("Serving on {}", node.local_address());
    info!("Press Ctrl+C to shutdown gracefully");

    // Wait for shutdown signal
    signal::ctrl_c().await?;

    node.shutdown().await;

    Ok(())
}
