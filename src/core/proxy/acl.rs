//! The proxy's static table allow-list.
//!
//! Built once at post-jail init from the `proxy_read_maps` setting and
//! immutable afterwards. Configured tokens and incoming requests go
//! through the same canonicalization: strip every leading `proxy:` prefix,
//! then require an inner `:` between table type and name.

use std::collections::HashSet;

use tracing::warn;

const PROXY_PREFIX: &str = "proxy:";

/// Remove any number of leading `proxy:` prefixes.
pub fn strip_proxy_prefixes(reference: &str) -> &str {
    let mut rest = reference;
    while let Some(stripped) = rest.strip_prefix(PROXY_PREFIX) {
        rest = stripped;
    }
    rest
}

/// Outcome of checking a requested table reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclDecision<'a> {
    /// On the allow-list; the canonical `type:name` form.
    Allow(&'a str),
    /// Well-formed but not approved.
    Deny,
    /// No inner `:` separating type and name.
    Malformed,
}

pub struct AllowList {
    entries: HashSet<String>,
}

impl AllowList {
    /// Parse the whitespace-separated `proxy_read_maps` value.
    ///
    /// Tokens without a `proxy:` prefix cannot be proxied and are skipped;
    /// so are tokens that lack a type/name separator after stripping.
    pub fn from_config(proxy_read_maps: &str) -> Self {
        let mut entries = HashSet::new();
        for token in proxy_read_maps.split_whitespace() {
            if !token.starts_with(PROXY_PREFIX) {
                warn!(token, "ignoring non-proxy table in proxy_read_maps");
                continue;
            }
            let canonical = strip_proxy_prefixes(token);
            if !canonical.contains(':') {
                warn!(token, "ignoring malformed table in proxy_read_maps");
                continue;
            }
            entries.insert(canonical.to_string());
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check a requested reference against the list.
    pub fn check<'a>(&self, reference: &'a str) -> AclDecision<'a> {
        let canonical = strip_proxy_prefixes(reference);
        if !canonical.contains(':') {
            AclDecision::Malformed
        } else if self.entries.contains(canonical) {
            AclDecision::Allow(canonical)
        } else {
            AclDecision::Deny
        }
    }
}
