/*!
Single-threaded, request-at-a-time daemon skeleton.

The supervising master starts one process per service and restarts it when
it exits; within a process there is exactly one flow of control. The
skeleton owns the listening socket and the recycling limits (`max_use`
connections, `max_idle` seconds); a [`Service`] implementation supplies the
post-jail initialization, an optional pre-accept check (the proxy's
table-change poll), and the per-connection handler.

Exits fall in two classes: clean recycling (idle, use count, table change),
reported as an [`ExitReason`], and fatal internal errors, which propagate
as [`ServiceError`] so the binary can log and exit nonzero.
*/

pub mod umask;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::BufStream;
use tokio::net::{UnixListener, UnixStream};
use tracing::{info, warn};

use crate::config::Params;
use crate::core::attr::AttrError;
use crate::core::table::TableError;

/// Buffered client connection handed to [`Service::serve`].
pub type ClientStream = BufStream<UnixStream>;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// A reply could not be written; the frame may be half-emitted, so the
    /// process restarts rather than continue with a desynchronized client.
    #[error("reply emission failed: {0}")]
    Reply(#[source] AttrError),

    /// Backing-store failure the service cannot recover from, e.g. an open
    /// of an allow-listed table returning no handle.
    #[error("table failure: {0}")]
    Table(#[from] TableError),

    #[error("socket {path}: {source}")]
    Socket {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot detach from process group: {0}")]
    Detach(String),
}

/// Why a process exited cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// No client arrived within `max_idle` seconds.
    Idle,
    /// Served `max_use` connections.
    MaxUse,
    /// A watched backing table changed on disk; restart for fresh handles.
    TableChanged(String),
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Idle => write!(f, "idle timeout"),
            ExitReason::MaxUse => write!(f, "use count reached"),
            ExitReason::TableChanged(name) => write!(f, "table {name} changed"),
        }
    }
}

/// Process recycling limits; zero disables a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerLimits {
    pub max_use: u32,
    pub max_idle: u64,
}

impl ServerLimits {
    pub fn from_params(params: &Params) -> Self {
        Self {
            max_use: params.max_use,
            max_idle: params.max_idle,
        }
    }

    /// Limits with recycling disabled entirely.
    pub fn unlimited() -> Self {
        Self {
            max_use: 0,
            max_idle: 0,
        }
    }
}

/// Per-service hooks plugged into the accept loop.
#[async_trait]
pub trait Service: Send {
    /// Initialization after the skeleton dropped privileges.
    async fn post_init(&mut self) -> Result<(), ServiceError>;

    /// Chance to override the configured recycling limits.
    ///
    /// The verifier disables recycling when its cache is memory-resident;
    /// a recycled process would lose every cached result.
    fn limits(&self, configured: ServerLimits) -> ServerLimits {
        configured
    }

    /// Called before each accept; `Some(reason)` exits the process cleanly.
    async fn pre_accept(&mut self) -> Option<ExitReason> {
        None
    }

    /// Serve one client connection to completion.
    async fn serve(&mut self, stream: &mut ClientStream) -> Result<(), ServiceError>;
}

/// Accept loop over a local stream socket.
pub struct UnixServer {
    listener: UnixListener,
    path: PathBuf,
    limits: ServerLimits,
}

impl UnixServer {
    /// Bind the service socket, replacing any stale socket file, and
    /// restrict it to the owner.
    pub fn bind(path: &Path, limits: ServerLimits) -> Result<Self, ServiceError> {
        let socket_err = |source| ServiceError::Socket {
            path: path.to_path_buf(),
            source,
        };

        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(socket_err(err)),
        }

        let listener = UnixListener::bind(path).map_err(socket_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(socket_err)?;
        }

        Ok(Self {
            listener,
            path: path.to_path_buf(),
            limits,
        })
    }

    pub fn local_path(&self) -> &Path {
        &self.path
    }

    /// Run the accept loop until a clean exit condition or a fatal error.
    pub async fn run<S: Service>(&self, service: &mut S) -> Result<ExitReason, ServiceError> {
        service.post_init().await?;
        let limits = service.limits(self.limits);
        info!(
            socket = %self.path.display(),
            max_use = limits.max_use,
            max_idle = limits.max_idle,
            "accepting clients"
        );

        let mut used: u32 = 0;
        loop {
            if let Some(reason) = service.pre_accept().await {
                info!(%reason, "exiting before accept");
                return Ok(reason);
            }

            let accepted = if limits.max_idle > 0 {
                match tokio::time::timeout(
                    Duration::from_secs(limits.max_idle),
                    self.listener.accept(),
                )
                .await
                {
                    Err(_elapsed) => return Ok(ExitReason::Idle),
                    Ok(result) => result,
                }
            } else {
                self.listener.accept().await
            };

            let (stream, _peer) = accepted.map_err(|source| ServiceError::Socket {
                path: self.path.clone(),
                source,
            })?;

            let mut stream = BufStream::new(stream);
            service.serve(&mut stream).await?;

            used = used.saturating_add(1);
            if limits.max_use > 0 && used >= limits.max_use {
                return Ok(ExitReason::MaxUse);
            }
        }
    }
}

/// Move this process into its own process group.
///
/// A supervisor-wide stop signal then no longer reaches the daemon, so a
/// cache write in flight cannot be interrupted mid-update; the supervisor
/// has to wait out the current request.
pub fn detach_process_group() -> Result<(), ServiceError> {
    #[cfg(unix)]
    {
        use nix::unistd::{setpgid, Pid};
        setpgid(Pid::from_raw(0), Pid::from_raw(0))
            .map_err(|errno| ServiceError::Detach(errno.to_string()))?;
    }
    Ok(())
}

/// Best-effort warning for handlers replying to a client that already
/// disconnected; anything else on the reply path is fatal.
pub(crate) fn reply_or_fail(result: Result<(), AttrError>) -> Result<(), ServiceError> {
    match result {
        Ok(()) => Ok(()),
        Err(AttrError::Io(err)) if err.kind() == std::io::ErrorKind::BrokenPipe => {
            warn!("client disconnected before reply");
            Ok(())
        }
        Err(err) => Err(ServiceError::Reply(err)),
    }
}
