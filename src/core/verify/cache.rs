/*!
The verification cache policy.

QUERY serves the cached status for an address, replacing missing, expired,
or unparseable entries with a transient in-progress record, and proactively
re-probes entries past their refresh threshold. UPDATE applies a probe
result, except that a negative result never overwrites a stored positive
entry (the protective rule) - a known-good address stays good until its own
positive expiry.

Probes are rate-limited per address by [`PROBE_TTL`]: once a probe
timestamp is recorded, no second probe goes out until the first is assumed
lost. A recorded probe time of zero means no probe is outstanding.

The write-back after a refresh probe happens only when the submission was
confirmed queued, and never persists a TODO-only record while negative
caching is off.
*/

use std::sync::Arc;

use tracing::warn;

use crate::clock::Clock;
use crate::config::Params;
use crate::core::table::{table_flags, Table, TableError};
use crate::core::verify::entry::{self, AddrStatus, CacheEntry};
use crate::core::verify::probe::ProbeSubmitter;

/// Seconds after which an unanswered probe is assumed lost.
///
/// This is the minimum interval between probes for one address.
pub const PROBE_TTL: u64 = 1000;

/// Expiry and refresh tunables, lifted out of [`Params`] once at startup.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub positive_expire: u64,
    pub positive_refresh: u64,
    pub negative_expire: u64,
    pub negative_refresh: u64,
    pub negative_cache: bool,
}

impl CachePolicy {
    pub fn from_params(params: &Params) -> Self {
        Self {
            positive_expire: params.address_verify_positive_expire_time,
            positive_refresh: params.address_verify_positive_refresh_time,
            negative_expire: params.address_verify_negative_expire_time,
            negative_refresh: params.address_verify_negative_refresh_time,
            negative_cache: params.address_verify_negative_cache,
        }
    }
}

/// Outcome of a QUERY, ready for the reply frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryReply {
    pub status: AddrStatus,
    pub text: String,
}

/// The verifier's address cache: one writable table plus policy and the
/// probe side-channel. Owned by the service handler; a single flow of
/// control uses it at a time.
pub struct VerifyCache {
    table: Arc<dyn Table>,
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
    submitter: Arc<dyn ProbeSubmitter>,
    /// Normalized probe sender; empty = null sender.
    sender: String,
}

impl VerifyCache {
    pub fn new(
        table: Arc<dyn Table>,
        policy: CachePolicy,
        clock: Arc<dyn Clock>,
        submitter: Arc<dyn ProbeSubmitter>,
        sender: String,
    ) -> Self {
        Self {
            table,
            policy,
            clock,
            submitter,
            sender,
        }
    }

    /// True when the cache has no persistent backing store.
    pub fn is_memory_resident(&self) -> bool {
        self.table.flags() & table_flags::PERSISTENT == 0
    }

    /// No probe may be outstanding: either none was ever sent, or the last
    /// one is old enough to be assumed lost.
    fn probe_gate_open(probed: u64, now: u64) -> bool {
        probed == 0 || now.saturating_sub(probed) > PROBE_TTL
    }

    // An update time of zero means no result was ever applied; such a
    // record is always expired and always due for a refresh.

    fn expired(&self, entry: &CacheEntry, now: u64) -> bool {
        if entry.updated == 0 {
            return true;
        }
        if entry.status.is_ok() {
            entry.updated + self.policy.positive_expire < now
        } else {
            entry.updated + self.policy.negative_expire < now
        }
    }

    fn refresh_due(&self, entry: &CacheEntry, now: u64) -> bool {
        if entry.updated == 0 {
            return true;
        }
        if entry.status.is_ok() {
            entry.updated + self.policy.positive_refresh < now
        } else {
            entry.updated + self.policy.negative_refresh < now
        }
    }

    /// Serve one QUERY: reply with the working status and, when due,
    /// dispatch a refresh probe.
    pub async fn query(&self, addr: &str) -> Result<QueryReply, TableError> {
        let now = self.clock.now();
        let raw = self.table.get(addr).await?;
        let stored = match raw.as_deref() {
            None => None,
            Some(raw_value) => match CacheEntry::parse(raw_value) {
                Ok(parsed) => Some(parsed),
                Err(err) => {
                    warn!(address = addr, error = %err, "ignoring unparseable cache entry");
                    None
                }
            },
        };

        // Replace a missing, unparseable, or expired-and-probe-free entry
        // with a fresh in-progress record. The purge of the old record (when
        // negative caching is off) must happen here, before the refresh step
        // decides about write-back; the two checks share the flag but are
        // ordered.
        let working = match stored {
            Some(stored_entry)
                if !(Self::probe_gate_open(stored_entry.probed, now)
                    && self.expired(&stored_entry, now)) =>
            {
                stored_entry
            }
            _ => {
                if raw.is_some() && !self.policy.negative_cache {
                    self.table.del(addr).await?;
                }
                CacheEntry::in_progress()
            }
        };

        let reply = QueryReply {
            status: working.status,
            text: working.text.clone(),
        };

        if Self::probe_gate_open(working.probed, now) && self.refresh_due(&working, now) {
            match self.submitter.submit_probe(&self.sender, addr).await {
                Ok(()) => {
                    // Record the probe send time so no second probe goes out
                    // within PROBE_TTL. A TODO-only record is not persisted
                    // while negative caching is off.
                    if working.updated != 0 || self.policy.negative_cache {
                        let recorded = CacheEntry {
                            probed: now,
                            ..working
                        };
                        self.table.put(addr, &recorded.serialize()).await?;
                    }
                }
                Err(err) => {
                    warn!(address = addr, error = %err, "probe submission failed");
                }
            }
        }

        Ok(reply)
    }

    /// Apply one UPDATE. Returns `false` when the status is not a valid
    /// probe result (the handler replies BAD).
    pub async fn update(
        &self,
        addr: &str,
        status: AddrStatus,
        text: &str,
    ) -> Result<bool, TableError> {
        if status == AddrStatus::Todo {
            return Ok(false);
        }

        // Protective rule: a failing probe for an address already known
        // good is dropped until the positive entry expires on its own.
        if !status.is_ok() {
            if let Some(raw) = self.table.get(addr).await? {
                if entry::peek_status(&raw) == Some(AddrStatus::Ok) {
                    return Ok(true);
                }
            }
        }

        let now = self.clock.now();
        let entry = CacheEntry {
            status,
            probed: 0,
            updated: now,
            text: text.to_string(),
        };
        self.table.put(addr, &entry.serialize()).await?;
        Ok(true)
    }
}
