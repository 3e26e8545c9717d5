//! Address-verification cache daemon.
//!
//! Serves QUERY/UPDATE requests on a local stream socket, backed by a
//! persistent map file or by process memory when none is configured.
//! Probes are queued into the mail system's incoming directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use mailgate::clock::SystemClock;
use mailgate::config::Params;
use mailgate::core::server::umask::UmaskGuard;
use mailgate::core::server::{self, ServerLimits, UnixServer};
use mailgate::core::table::file::FileTable;
use mailgate::core::table::mem::MemTable;
use mailgate::core::table::Table;
use mailgate::core::verify::{CachePolicy, QueueSubmitter, VerifyCache, VerifyService};

/// Generic daemon options; service tunables live in the config file.
#[derive(Debug, Parser)]
#[command(name = "verifyd", about = "Address-verification cache service")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listening socket path.
    #[arg(long, default_value = "./verify.sock")]
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

    // Pre-jail: open the backing store while still privileged, then leave
    // the supervisor's process group so a group-wide stop signal cannot
    // land mid-update.
    let table: Arc<dyn Table> = if params.address_verify_map.is_empty() {
        info!("verification cache is memory-resident");
        Arc::new(MemTable::new("verify"))
    } else {
        let map_path = Path::new(&params.address_verify_map);
        let table = {
            let _umask = UmaskGuard::set(0o022);
            FileTable::open(map_path, true).await?
        };
        info!(map = %params.address_verify_map, "opened verification cache");
        Arc::new(table)
    };
    server::detach_process_group()?;

    let cache = VerifyCache::new(
        table,
        CachePolicy::from_params(&params),
        Arc::new(SystemClock),
        Arc::new(QueueSubmitter::new(&params.queue_directory)),
        params.normalized_sender(),
    );
    let mut service = VerifyService::new(cache);

    let listener = UnixServer::bind(&args.socket, ServerLimits::from_params(&params))?;
    let reason = listener.run(&mut service).await?;
    info!(%reason, "done");
    Ok(())
}
