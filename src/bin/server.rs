use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tokio::{select, signal};
use tracing::{error, info};

use dedupserver::api::ApiServer;
use dedupserver::config::{validate_configuration, Configuration};
use dedupserver::store::{BackendRegistry, Store};

fn ensure_data_dir(path: impl AsRef<Path>) -> Result<()> {
    if !path.as_ref().exists() {
        info!("create data directory: {:?}", path.as_ref());
        std::fs::create_dir_all(path.as_ref())?;
    }

    Ok(())
}

#[derive(Parser, Debug)]
#[command(author, version, about = "A fast api for filtering duplicate lines from a supplied file", long_about = None)]
struct Args {
    #[arg(short, long)]
    config: Option<String>,
    #[arg(short, long)]
    listen_address: Option<String>,
    #[arg(short = 'd', long)]
    state_directory: Option<String>,
    #[arg(short = 'k', long)]
    store_kind: Option<String>,
}

fn load_configuration(args: Args) -> Result<Configuration> {
    let mut config = match args.config {
        Some(file) => Configuration::parse_config_file(&file)?,
        None => Configuration::default(),
    };

    if let Some(addr) = args.listen_address {
        info!("overriding listen address from command line argument: {addr}");
        config.listen_addr = addr;
    }
    if let Some(dir) = args.state_directory {
        info!("overriding state directory from command line argument: {dir}");
        config.data_directory = dir;
    }
    if let Some(kind) = args.store_kind {
        info!("overriding store kind from command line argument: {kind}");
        config.store_kind = kind;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    info!("starting dedupserver...");
    let registry = BackendRegistry::with_defaults();
    let config = load_configuration(args)
        .inspect_err(|e| error!("failed to initialize configuration, err: {e}"))?;
    validate_configuration(&config, &registry)
        .inspect_err(|e| error!("invalid configuration, err: {e}"))?;

    ensure_data_dir(&config.data_directory)
        .inspect_err(|e| error!("failed to create data directory, err: {e}"))?;

    let store = Store::open(&registry, &config.store_kind, &config.data_directory)?;

    let server = ApiServer::bind(
        config.listen_socket_addr()?,
        store.clone(),
        config.stream_queue_depth,
    )
    .await?;
    let shutdown = server.shutdown_token();

    let server_handle = tokio::spawn(async move {
        info!("starting api server...");
        if let Err(e) = server.run().await {
            error!("api server failed, err: {e}");
        }
        info!("stop api server");
    });

    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    select! {
        _ = signal::ctrl_c() => {
            info!("ctrl-c pressed");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM received");
        },
    };

    shutdown.cancel();
    server_handle.await?;

    store
        .close()
        .inspect_err(|e| error!("failed to close store, err: {e}"))?;

    Ok(())
}
