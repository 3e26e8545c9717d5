/*!
Request handler for the verification service.

Each client connection carries exactly one request frame:

- `request=query` with `address` - serve the cached status, possibly
  dispatching a probe.
- `request=update` with `address`, `address_status`, `why` - apply a probe
  result.

Anything else is answered with a BAD status and a warning in the log. The
reply is flushed and the connection handed back to the accept loop.
*/

use async_trait::async_trait;
use tracing::{info, warn};

use crate::core::attr::{get_attr, print_attrs, scan_attrs, ATTR_REQUEST};
use crate::core::server::{
    reply_or_fail, ClientStream, ServerLimits, Service, ServiceError,
};
use crate::core::verify::cache::VerifyCache;
use crate::core::verify::entry::AddrStatus;

pub const VRFY_REQ_QUERY: &str = "query";
pub const VRFY_REQ_UPDATE: &str = "update";

pub const ATTR_ADDRESS: &str = "address";
pub const ATTR_ADDRESS_STATUS: &str = "address_status";
pub const ATTR_STATUS: &str = "status";
pub const ATTR_WHY: &str = "why";

/// Top-level reply status of a verifier request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    /// Request understood and served.
    Ok,
    /// Request malformed or not permitted.
    Bad,
    /// Request understood but the cache is temporarily unusable.
    Fail,
}

impl ReplyStatus {
    pub const fn code(self) -> u32 {
        match self {
            ReplyStatus::Ok => 0,
            ReplyStatus::Bad => 1,
            ReplyStatus::Fail => 2,
        }
    }
}

pub struct VerifyService {
    cache: VerifyCache,
}

impl VerifyService {
    pub fn new(cache: VerifyCache) -> Self {
        Self { cache }
    }

    async fn reply_status(
        &self,
        stream: &mut ClientStream,
        status: ReplyStatus,
    ) -> Result<(), ServiceError> {
        let code = status.code().to_string();
        reply_or_fail(print_attrs(stream, &[(ATTR_STATUS, code.as_str())]).await)
    }

    async fn reply_query(
        &self,
        stream: &mut ClientStream,
        status: ReplyStatus,
        addr_status: AddrStatus,
        why: &str,
    ) -> Result<(), ServiceError> {
        let code = status.code().to_string();
        let addr_code = addr_status.code().to_string();
        reply_or_fail(
            print_attrs(
                stream,
                &[
                    (ATTR_STATUS, code.as_str()),
                    (ATTR_ADDRESS_STATUS, addr_code.as_str()),
                    (ATTR_WHY, why),
                ],
            )
            .await,
        )
    }

    async fn handle_query(
        &self,
        stream: &mut ClientStream,
        attrs: &[(String, String)],
    ) -> Result<(), ServiceError> {
        let Some(address) = get_attr(attrs, ATTR_ADDRESS) else {
            warn!("query request without address");
            return self.reply_status(stream, ReplyStatus::Bad).await;
        };
        match self.cache.query(address).await {
            Ok(reply) => {
                self.reply_query(stream, ReplyStatus::Ok, reply.status, &reply.text)
                    .await
            }
            Err(err) => {
                warn!(address, error = %err, "query failed against backing store");
                self.reply_query(
                    stream,
                    ReplyStatus::Fail,
                    AddrStatus::Todo,
                    "address verification temporarily unavailable",
                )
                .await
            }
        }
    }

    async fn handle_update(
        &self,
        stream: &mut ClientStream,
        attrs: &[(String, String)],
    ) -> Result<(), ServiceError> {
        let (Some(address), Some(raw_status), Some(why)) = (
            get_attr(attrs, ATTR_ADDRESS),
            get_attr(attrs, ATTR_ADDRESS_STATUS),
            get_attr(attrs, ATTR_WHY),
        ) else {
            warn!("update request with missing attributes");
            return self.reply_status(stream, ReplyStatus::Bad).await;
        };

        // TODO is never a valid probe result; the cache rejects it too, but
        // an unparseable code never reaches the cache at all.
        let status = raw_status
            .parse::<u32>()
            .ok()
            .and_then(AddrStatus::from_code);
        let Some(status) = status else {
            warn!(address, raw_status, "update with invalid address status");
            return self.reply_status(stream, ReplyStatus::Bad).await;
        };

        match self.cache.update(address, status, why).await {
            Ok(true) => self.reply_status(stream, ReplyStatus::Ok).await,
            Ok(false) => {
                warn!(address, raw_status, "update with non-result status");
                self.reply_status(stream, ReplyStatus::Bad).await
            }
            Err(err) => {
                warn!(address, error = %err, "update failed against backing store");
                self.reply_status(stream, ReplyStatus::Fail).await
            }
        }
    }
}

#[async_trait]
impl Service for VerifyService {
    async fn post_init(&mut self) -> Result<(), ServiceError> {
        info!(
            memory_resident = self.cache.is_memory_resident(),
            "verification cache ready"
        );
        Ok(())
    }

    fn limits(&self, configured: ServerLimits) -> ServerLimits {
        // Recycling a memory-resident cache would drop every stored result.
        if self.cache.is_memory_resident() {
            ServerLimits::unlimited()
        } else {
            configured
        }
    }

    async fn serve(&mut self, stream: &mut ClientStream) -> Result<(), ServiceError> {
        let attrs = match scan_attrs(stream).await {
            Ok(attrs) => attrs,
            Err(err) if err.is_client_fault() => {
                warn!(error = %err, "malformed request frame");
                return self.reply_status(stream, ReplyStatus::Bad).await;
            }
            // EOF or read failure: the client went away.
            Err(_) => return Ok(()),
        };

        match get_attr(&attrs, ATTR_REQUEST) {
            Some(VRFY_REQ_QUERY) => self.handle_query(stream, &attrs).await,
            Some(VRFY_REQ_UPDATE) => self.handle_update(stream, &attrs).await,
            other => {
                warn!(request = other.unwrap_or("<none>"), "unknown request");
                self.reply_status(stream, ReplyStatus::Bad).await
            }
        }
    }
}
