mod http;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use hcamon_core::collector::Collector;
#[cfg(not(target_os = "linux"))]
use hcamon_core::collector::{MockFs, MockRunner};
#[cfg(target_os = "linux")]
use hcamon_core::collector::{RealFs, RealRunner};
use hcamon_core::config::CollectorConfig;
use hcamon_core::provider::{CycleProvider, LiveProvider};

use state::ExporterState;

// ============================================================
// CLI
// ============================================================

#[derive(Parser)]
#[command(name = "hcamon-exporter", about = "Adapter counter metrics exporter", version = hcamon_core::VERSION)]
struct Args {
    /// Listen address.
    #[arg(long, default_value = "0.0.0.0", env = "HCAMON_LISTEN")]
    listen: String,

    /// Listen port.
    #[arg(long, default_value = "9315", env = "HCAMON_PORT")]
    port: u16,

    /// Adapter class directory.
    #[arg(long, env = "HCAMON_SYSFS_ROOT", default_value = "/sys/class/infiniband")]
    sysfs_root: PathBuf,

    /// mlx5 debugfs root.
    #[arg(long, env = "HCAMON_DEBUGFS_ROOT", default_value = "/sys/kernel/debug/mlx5")]
    debugfs_root: PathBuf,

    /// Collect optical module diagnostics on physical functions.
    #[arg(long, env = "HCAMON_OPTICAL")]
    optical: bool,

    /// Skip the PCIe Max Read Request Size override.
    #[arg(long)]
    no_mrrs: bool,
}

// ============================================================
// Main
// ============================================================

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hcamon_exporter=info")),
        )
        .init();

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")
        .and_then(|rt| rt.block_on(async_main(args)));

    if let Err(e) = result {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    info!(version = hcamon_core::VERSION, "starting exporter");

    let state = ExporterState::new(create_live_provider(&args))
        .context("failed to register metrics")?;
    let app = http::create_router(Arc::new(state));

    let addr: SocketAddr = format!("{}:{}", args.listen, args.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", args.listen, args.port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .context("server error")?;

    Ok(())
}

fn create_live_provider(args: &Args) -> Box<dyn CycleProvider + Send> {
    let config = CollectorConfig {
        sysfs_root: args.sysfs_root.clone(),
        debugfs_root: args.debugfs_root.clone(),
        optical: args.optical,
        tune_mrrs: !args.no_mrrs,
        ..CollectorConfig::default()
    };

    #[cfg(target_os = "linux")]
    {
        let collector = Collector::new(RealFs::new(), Arc::new(RealRunner::new()), config);
        Box::new(LiveProvider::new(collector))
    }
    #[cfg(not(target_os = "linux"))]
    {
        let collector = Collector::new(MockFs::roce_host(), Arc::new(MockRunner::roce_host()), config);
        Box::new(LiveProvider::new(collector))
    }
}
