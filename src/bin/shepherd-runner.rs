//! Reference model runner for Shepherd sheep
//!
//! # Usage
//!
//! ```bash
//! shepherd-runner -p 9001 doubler/1
//! ```
//!
//! The config path is a YAML file or a directory holding `config.yaml`.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shepherd::runner::{JsonRunner, RunnerConfig, RunnerServer};

#[derive(Parser, Debug)]
#[command(name = "shepherd-runner")]
#[command(about = "Serve a model over the Shepherd message socket")]
struct Args {
    /// Port of the message socket
    #[arg(short, long, default_value_t = 9999)]
    port: u16,

    /// Address to bind (use 0.0.0.0 inside containers)
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Stream the runner serves
    #[arg(short, long, default_value = "predict")]
    stream: String,

    /// Runner configuration file or directory
    config_path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = RunnerConfig::load(&args.config_path)
        .with_context(|| format!("Failed to load runner config from {}", args.config_path.display()))?;
    let runner = JsonRunner::new(config, &args.stream)?;

    let addr = SocketAddr::new(args.host, args.port);
    let server = RunnerServer::bind(addr, runner)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tokio::select! {
        result = server.serve() => result.context("Runner server failed")?,
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
    }

    Ok(())
}
