//! Built-in parameter defaults.
//!
//! Expiry defaults are deliberately long and refresh defaults deliberately
//! shorter, so a cached result is re-probed well before clients see it
//! disappear.

use std::path::PathBuf;

pub(super) fn address_verify_sender() -> String {
    "postmaster".to_string()
}

/// 30 days.
pub(super) fn positive_expire_time() -> u64 {
    2_592_000
}

/// 7 days.
pub(super) fn positive_refresh_time() -> u64 {
    604_800
}

/// 3 days.
pub(super) fn negative_expire_time() -> u64 {
    259_200
}

/// 1 hour.
pub(super) fn negative_refresh_time() -> u64 {
    3_600
}

pub(super) fn negative_cache() -> bool {
    true
}

pub(super) fn queue_directory() -> PathBuf {
    PathBuf::from("./queue")
}

pub(super) fn max_use() -> u32 {
    100
}

pub(super) fn max_idle() -> u64 {
    100
}
