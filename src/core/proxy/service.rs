/*!
Request handler for the table-proxy service.

One connection serves many requests - handle sharing across lookups is the
point of the service - so the handler loops on request frames until the
client disconnects, flushing after every reply.

- `request=open` with `table`, `flags` - open (or reuse) a handle, report
  its capability flags.
- `request=lookup` with `table`, `flags`, `key` - look the key up, mapping
  the backing store's outcome onto the protocol status codes.

Every request is gated by the allow-list before any handle is touched. An
open failure for an approved table is a fatal internal error: the process
exits and the supervisor starts a fresh one.
*/

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::core::attr::{get_attr, print_attrs, scan_attrs, ATTR_REQUEST};
use crate::core::proxy::acl::{AclDecision, AllowList};
use crate::core::proxy::handles::HandleCache;
use crate::core::server::{
    reply_or_fail, ClientStream, ExitReason, Service, ServiceError,
};
use crate::core::table::{TableError, TableRegistry};

pub const PROXY_REQ_OPEN: &str = "open";
pub const PROXY_REQ_LOOKUP: &str = "lookup";

pub const ATTR_TABLE: &str = "table";
pub const ATTR_FLAGS: &str = "flags";
pub const ATTR_KEY: &str = "key";
pub const ATTR_STATUS: &str = "status";
pub const ATTR_VALUE: &str = "value";

/// Protocol status of a proxy reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyStat {
    /// Lookup produced a value.
    Ok,
    /// No such key, no error.
    NoKey,
    /// Transient backing-store failure; the client may retry.
    Retry,
    /// Malformed request.
    Bad,
    /// Table not on the allow-list.
    Deny,
}

impl ProxyStat {
    pub const fn code(self) -> u32 {
        match self {
            ProxyStat::Ok => 0,
            ProxyStat::NoKey => 1,
            ProxyStat::Retry => 2,
            ProxyStat::Bad => 3,
            ProxyStat::Deny => 4,
        }
    }
}

pub struct ProxyService {
    proxy_read_maps: String,
    acl: AllowList,
    handles: HandleCache,
    registry: Arc<TableRegistry>,
}

impl ProxyService {
    pub fn new(proxy_read_maps: String, registry: Arc<TableRegistry>) -> Self {
        Self {
            proxy_read_maps,
            acl: AllowList::from_config(""),
            handles: HandleCache::new(registry.clone()),
            registry,
        }
    }

    /// Open handles held by this process (test support).
    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    async fn reply_open(
        &self,
        stream: &mut ClientStream,
        status: ProxyStat,
        flags: u32,
    ) -> Result<(), ServiceError> {
        let status = status.code().to_string();
        let flags = flags.to_string();
        reply_or_fail(
            print_attrs(
                stream,
                &[(ATTR_STATUS, status.as_str()), (ATTR_FLAGS, flags.as_str())],
            )
            .await,
        )
    }

    async fn reply_lookup(
        &self,
        stream: &mut ClientStream,
        status: ProxyStat,
        value: &str,
    ) -> Result<(), ServiceError> {
        let status = status.code().to_string();
        reply_or_fail(
            print_attrs(stream, &[(ATTR_STATUS, status.as_str()), (ATTR_VALUE, value)]).await,
        )
    }

    fn request_table_flags<'a>(
        attrs: &'a [(String, String)],
    ) -> Option<(&'a str, u32)> {
        let table = get_attr(attrs, ATTR_TABLE)?;
        let flags = get_attr(attrs, ATTR_FLAGS)?.parse::<u32>().ok()?;
        Some((table, flags))
    }

    async fn handle_open(
        &mut self,
        stream: &mut ClientStream,
        attrs: &[(String, String)],
    ) -> Result<(), ServiceError> {
        let Some((table, flags)) = Self::request_table_flags(attrs) else {
            warn!("open request with missing or mistyped attributes");
            return self.reply_open(stream, ProxyStat::Bad, 0).await;
        };
        match self.acl.check(table) {
            AclDecision::Malformed => {
                warn!(table, "open request for malformed table reference");
                self.reply_open(stream, ProxyStat::Bad, 0).await
            }
            AclDecision::Deny => {
                warn!(table, "open request denied by allow-list");
                self.reply_open(stream, ProxyStat::Deny, 0).await
            }
            AclDecision::Allow(canonical) => {
                let handle = self.handles.open(canonical, flags).await?;
                let reported = handle.flags();
                self.reply_open(stream, ProxyStat::Ok, reported).await
            }
        }
    }

    async fn handle_lookup(
        &mut self,
        stream: &mut ClientStream,
        attrs: &[(String, String)],
    ) -> Result<(), ServiceError> {
        let (Some((table, flags)), Some(key)) =
            (Self::request_table_flags(attrs), get_attr(attrs, ATTR_KEY))
        else {
            warn!("lookup request with missing or mistyped attributes");
            return self.reply_lookup(stream, ProxyStat::Bad, "").await;
        };
        match self.acl.check(table) {
            AclDecision::Malformed => {
                warn!(table, "lookup request for malformed table reference");
                self.reply_lookup(stream, ProxyStat::Bad, "").await
            }
            AclDecision::Deny => {
                warn!(table, "lookup request denied by allow-list");
                self.reply_lookup(stream, ProxyStat::Deny, "").await
            }
            AclDecision::Allow(canonical) => {
                let handle = self.handles.open(canonical, flags).await?;
                match handle.get(key).await {
                    Ok(Some(value)) => self.reply_lookup(stream, ProxyStat::Ok, &value).await,
                    Ok(None) => self.reply_lookup(stream, ProxyStat::NoKey, "").await,
                    Err(TableError::Retry { .. }) => {
                        self.reply_lookup(stream, ProxyStat::Retry, "").await
                    }
                    Err(err) => {
                        warn!(table = canonical, error = %err, "lookup failed");
                        self.reply_lookup(stream, ProxyStat::Retry, "").await
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Service for ProxyService {
    async fn post_init(&mut self) -> Result<(), ServiceError> {
        self.acl = AllowList::from_config(&self.proxy_read_maps);
        info!(tables = self.acl.len(), "table allow-list ready");
        Ok(())
    }

    async fn pre_accept(&mut self) -> Option<ExitReason> {
        self.registry.changed().map(ExitReason::TableChanged)
    }

    async fn serve(&mut self, stream: &mut ClientStream) -> Result<(), ServiceError> {
        loop {
            let attrs = match scan_attrs(stream).await {
                Ok(attrs) => attrs,
                Err(err) if err.is_client_fault() => {
                    // Framing is now suspect; answer BAD and drop the client.
                    warn!(error = %err, "malformed request frame");
                    return self.reply_lookup(stream, ProxyStat::Bad, "").await;
                }
                // EOF or read failure: the client went away.
                Err(_) => return Ok(()),
            };

            match get_attr(&attrs, ATTR_REQUEST) {
                Some(PROXY_REQ_OPEN) => self.handle_open(stream, &attrs).await?,
                Some(PROXY_REQ_LOOKUP) => self.handle_lookup(stream, &attrs).await?,
                other => {
                    warn!(request = other.unwrap_or("<none>"), "unknown request");
                    self.reply_lookup(stream, ProxyStat::Bad, "").await?;
                }
            }
        }
    }
}
