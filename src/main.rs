mod cache;
mod config;
mod controller;
mod converter;
mod error;
mod formats;
mod id;
mod processor;
mod record;
mod repository;
mod request;
mod response;
mod routes;
mod signing;
mod storage;
mod view;


#[macro_use]
extern crate serde_json;

#[macro_use]
extern crate tracing;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use poem::listener::TcpListener;
use poem::Server;
use tracing_subscriber::EnvFilter;

use crate::cache::DiskCache;
use crate::config::RuntimeConfig;
use crate::controller::ImageController;
use crate::formats::{ImageFit, ImageFormat};
use crate::id::ImageId;
use crate::processor::Resize;
use crate::repository::MemoryRepository;
use crate::signing::UrlSigner;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// How long in-flight requests get to finish once shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[clap(author, version, about)]
pub struct ServerArgs {
    #[clap(short, long, env = "IMAGES_CONFIG", default_value = "config.yaml")]
    /// The file path to a given config file.
    config: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Runs the server with the given configuration.
    Run,

    /// Deletes every resized variant from the cache.
    SweepCache,

    /// Prints a signed url for an image variant.
    Sign {
        /// The image id in hex.
        id: String,

        #[clap(long, default_value = "jpeg")]
        format: String,

        /// `N` for a square box or `WxH`.
        #[clap(long)]
        size: Option<String>,

        #[clap(long, default_value = "contain")]
        fit: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: ServerArgs = ServerArgs::parse();
    let cfg = RuntimeConfig::from_file(&args.config)?;

    match args.command {
        Command::Run => run_server(cfg).await,
        Command::SweepCache => {
            let removed = DiskCache::new(cfg.cache_directory(), true).sweep().await?;
            println!("removed {} cached variants", removed);
            Ok(())
        },
        Command::Sign { id, format, size, fit } => {
            let id: ImageId = id.parse()?;
            let format = ImageFormat::from_extension(&format)?;
            let resize = match size {
                Some(size) => {
                    let (width, height) = request::parse_size(&size)?;
                    Some(Resize::new(width, height, ImageFit::from_token(&fit)?))
                },
                None => None,
            };

            let mut signer = UrlSigner::new(cfg.secret.as_bytes())?;
            if let Some(base) = cfg.public_url.as_ref() {
                signer = signer.with_public_url(base.clone());
            }

            println!("{}", signer.url_for(id, resize, format));
            Ok(())
        },
    }
}

async fn run_server(cfg: RuntimeConfig) -> Result<()> {
    tokio::fs::create_dir_all(&cfg.root).await?;

    let addr: SocketAddr = format!("{}:{}", &cfg.host, cfg.port).parse()?;
    let defaults = ImageController::default_save_options(&cfg);
    let controller = Arc::new(ImageController::from_config(&cfg, Arc::new(MemoryRepository::new()))?);

    info!(
        %addr,
        root = ?cfg.root,
        workers = controller.converter().workers(),
        cache = cfg.cache.enabled,
        verify_signatures = cfg.verify_signatures,
        "Starting image server",
    );

    if !cfg.verify_signatures {
        warn!("Signature verification is disabled, any variant can be requested");
    }

    let app = routes::app(controller.clone(), defaults);
    Server::new(TcpListener::bind(addr))
        .run_with_graceful_shutdown(
            app,
            async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutting down");
            },
            Some(SHUTDOWN_GRACE),
        )
        .await?;

    controller.shutdown().await;
    Ok(())
}
