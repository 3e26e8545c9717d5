/*!
On-disk codec for verification cache entries.

A stored value is the text `"<status>:<probed>:<updated>:<text>"` with
fixed-radix decimal fields. The diagnostic text may itself contain colons,
so parsing splits on the first three colons only. A value that fails to
parse is treated by the cache policy as a missing entry.
*/

use thiserror::Error;

/// Reply text while a probe is outstanding and no result is known yet.
pub const PROBE_IN_PROGRESS_TEXT: &str = "Address verification in progress";

/// Verification status of one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrStatus {
    /// The mail system accepted the probe for delivery.
    Ok,
    /// Transient failure; the address may become deliverable.
    Defer,
    /// Permanent failure.
    Bounce,
    /// No result yet; a probe is (or will be) outstanding.
    Todo,
}

impl AddrStatus {
    /// Fixed decimal wire/storage code.
    pub const fn code(self) -> u32 {
        match self {
            AddrStatus::Ok => 0,
            AddrStatus::Defer => 1,
            AddrStatus::Bounce => 2,
            AddrStatus::Todo => 3,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(AddrStatus::Ok),
            1 => Some(AddrStatus::Defer),
            2 => Some(AddrStatus::Bounce),
            3 => Some(AddrStatus::Todo),
            _ => None,
        }
    }

    pub fn is_ok(self) -> bool {
        self == AddrStatus::Ok
    }
}

impl std::fmt::Display for AddrStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddrStatus::Ok => write!(f, "deliverable"),
            AddrStatus::Defer => write!(f, "undeliverable (deferred)"),
            AddrStatus::Bounce => write!(f, "undeliverable"),
            AddrStatus::Todo => write!(f, "in progress"),
        }
    }
}

#[derive(Debug, Error)]
#[error("malformed cache entry {raw:?}: {detail}")]
pub struct EntryParseError {
    pub raw: String,
    pub detail: &'static str,
}

/// One cached verification result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub status: AddrStatus,
    /// Wall-clock seconds of the last outstanding probe send; 0 = none.
    pub probed: u64,
    /// Wall-clock seconds of the last probe result applied; 0 = unknown.
    pub updated: u64,
    /// Human-readable diagnostic from the last update.
    pub text: String,
}

impl CacheEntry {
    /// Fresh working record for an address with no usable information.
    pub fn in_progress() -> Self {
        Self {
            status: AddrStatus::Todo,
            probed: 0,
            updated: 0,
            text: PROBE_IN_PROGRESS_TEXT.to_string(),
        }
    }

    pub fn serialize(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.status.code(),
            self.probed,
            self.updated,
            self.text
        )
    }

    pub fn parse(raw: &str) -> Result<Self, EntryParseError> {
        let err = |detail| EntryParseError {
            raw: raw.to_string(),
            detail,
        };
        let mut fields = raw.splitn(4, ':');
        let status = fields.next().ok_or_else(|| err("missing status"))?;
        let probed = fields.next().ok_or_else(|| err("missing probe time"))?;
        let updated = fields.next().ok_or_else(|| err("missing update time"))?;
        let text = fields.next().ok_or_else(|| err("missing text"))?;

        let status = status
            .parse::<u32>()
            .ok()
            .and_then(AddrStatus::from_code)
            .ok_or_else(|| err("bad status code"))?;
        let probed = probed.parse().map_err(|_| err("bad probe time"))?;
        let updated = updated.parse().map_err(|_| err("bad update time"))?;

        Ok(Self {
            status,
            probed,
            updated,
            text: text.to_string(),
        })
    }
}

/// Cheap status extraction without allocating a parsed record.
///
/// Used by the protective-update rule, which only needs to know whether the
/// stored entry says OK.
pub fn peek_status(raw: &str) -> Option<AddrStatus> {
    raw.split(':')
        .next()
        .and_then(|field| field.parse::<u32>().ok())
        .and_then(AddrStatus::from_code)
}
