//! Table-proxy daemon.
//!
//! Multiplexes OPEN/LOOKUP requests against the allow-listed backing
//! tables, sharing open handles across clients. When a backing table
//! changes on disk the process exits cleanly before the next accept so the
//! supervisor restarts it with fresh handles.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use mailgate::config::Params;
use mailgate::core::proxy::ProxyService;
use mailgate::core::server::{ServerLimits, UnixServer};
use mailgate::core::table::TableRegistry;

/// Generic daemon options; service tunables live in the config file.
#[derive(Debug, Parser)]
#[command(name = "tableproxyd", about = "Table-proxy lookup service")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listening socket path.
    #[arg(long, default_value = "./tableproxy.sock")]
    socket: PathBuf,
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("MAILGATE_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let args = Args::parse();
    let params = Params::load(args.config.as_deref())?;

    let registry = Arc::new(TableRegistry::new());
    let mut service = ProxyService::new(params.proxy_read_maps.clone(), registry);

    let listener = UnixServer::bind(&args.socket, ServerLimits::from_params(&params))?;
    let reason = listener.run(&mut service).await?;
    info!(%reason, "done");
    Ok(())
}
