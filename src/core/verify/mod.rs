pub mod cache;
pub mod entry;
pub mod probe;
pub mod service;

pub use cache::{CachePolicy, QueryReply, VerifyCache, PROBE_TTL};
pub use entry::{AddrStatus, CacheEntry, PROBE_IN_PROGRESS_TEXT};
pub use probe::{ProbeError, ProbeSubmitter, QueueSubmitter};
pub use service::VerifyService;
