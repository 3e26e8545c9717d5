//! mailgate - address-verification cache and table-proxy daemons
//!
//! Two cooperating infrastructure services for a mail transfer system, each
//! serving a framed request/reply protocol on a local stream socket:
//!
//! - `verifyd` caches address-verification results with TTL/refresh
//!   semantics and injects probe messages back into the mail queue.
//! - `tableproxyd` multiplexes lookups against a static allow-list of
//!   backing tables, sharing open handles across clients.
//!
//! The library exposes the building blocks; the binaries under `src/bin`
//! wire them to sockets and configuration.

pub mod clock;
pub mod config;
pub mod core;

pub use clock::{Clock, SystemClock};
pub use config::Params;
