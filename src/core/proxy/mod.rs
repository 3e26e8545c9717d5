pub mod acl;
pub mod handles;
pub mod service;

pub use acl::{AclDecision, AllowList};
pub use handles::HandleCache;
pub use service::{ProxyService, ProxyStat};
