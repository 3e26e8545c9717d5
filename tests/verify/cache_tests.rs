//! Cache policy tests: expiry, refresh, probe gating, the protective
//! update rule, and negative-cache persistence behavior. The wall clock is
//! injected, so every scenario pins exact timestamps.

use crate::common::{test_policy, verify_harness};
use mailgate::core::table::Table;
use mailgate::core::verify::entry::CacheEntry;
use mailgate::core::verify::{AddrStatus, PROBE_IN_PROGRESS_TEXT, PROBE_TTL};

const ADDR: &str = "u@x";

async fn stored(harness: &crate::common::VerifyHarness) -> Option<CacheEntry> {
    harness
        .table
        .get(ADDR)
        .await
        .unwrap()
        .map(|raw| CacheEntry::parse(&raw).unwrap())
}

#[tokio::test]
async fn cold_query_replies_todo_and_dispatches_probe() {
    let harness = verify_harness(test_policy(true), 100);

    let reply = harness.cache.query(ADDR).await.unwrap();
    assert_eq!(reply.status, AddrStatus::Todo);
    assert_eq!(reply.text, PROBE_IN_PROGRESS_TEXT);

    assert_eq!(harness.probes.sent(), vec![("postmaster".into(), ADDR.into())]);
    assert_eq!(
        stored(&harness).await,
        Some(CacheEntry {
            status: AddrStatus::Todo,
            probed: 100,
            updated: 0,
            text: PROBE_IN_PROGRESS_TEXT.to_string(),
        })
    );
}

#[tokio::test]
async fn cold_query_persists_nothing_without_negative_cache() {
    let harness = verify_harness(test_policy(false), 100);

    let reply = harness.cache.query(ADDR).await.unwrap();
    assert_eq!(reply.status, AddrStatus::Todo);

    // The probe still goes out; only the TODO record stays unpersisted.
    assert_eq!(harness.probes.count(), 1);
    assert!(harness.table.is_empty().await);
}

#[tokio::test]
async fn update_applies_probe_result() {
    let harness = verify_harness(test_policy(true), 100);
    harness.cache.query(ADDR).await.unwrap();

    harness.clock.set(110);
    assert!(harness.cache.update(ADDR, AddrStatus::Ok, "250 ok").await.unwrap());

    assert_eq!(
        stored(&harness).await,
        Some(CacheEntry {
            status: AddrStatus::Ok,
            probed: 0,
            updated: 110,
            text: "250 ok".to_string(),
        })
    );
}

#[tokio::test]
async fn negative_updates_never_replace_a_positive_entry() {
    let harness = verify_harness(test_policy(true), 110);
    harness
        .cache
        .update(ADDR, AddrStatus::Ok, "250 ok")
        .await
        .unwrap();
    let good = stored(&harness).await;

    // Any sequence of failing results leaves the entry untouched; the
    // updates are still acknowledged as applied.
    harness.clock.set(120);
    for (status, text) in [
        (AddrStatus::Defer, "451 try later"),
        (AddrStatus::Bounce, "550 gone"),
        (AddrStatus::Defer, "451 still trying"),
    ] {
        assert!(harness.cache.update(ADDR, status, text).await.unwrap());
        assert_eq!(stored(&harness).await, good);
    }
}

#[tokio::test]
async fn negative_update_applies_to_negative_entry() {
    let harness = verify_harness(test_policy(true), 100);
    harness
        .cache
        .update(ADDR, AddrStatus::Defer, "451 one")
        .await
        .unwrap();

    harness.clock.set(150);
    harness
        .cache
        .update(ADDR, AddrStatus::Bounce, "550 two")
        .await
        .unwrap();

    let entry = stored(&harness).await.unwrap();
    assert_eq!(entry.status, AddrStatus::Bounce);
    assert_eq!(entry.updated, 150);
    assert_eq!(entry.text, "550 two");
}

#[tokio::test]
async fn update_rejects_todo_status() {
    let harness = verify_harness(test_policy(true), 100);
    assert!(!harness
        .cache
        .update(ADDR, AddrStatus::Todo, "nope")
        .await
        .unwrap());
    assert!(harness.table.is_empty().await);
}

#[tokio::test]
async fn todo_is_transient_within_probe_ttl() {
    let harness = verify_harness(test_policy(true), 100);
    harness.cache.query(ADDR).await.unwrap();
    assert_eq!(harness.probes.count(), 1);

    // Repeat queries before the probe is assumed lost: same answer, no
    // second probe.
    for now in [150, 600, 100 + PROBE_TTL] {
        harness.clock.set(now);
        let reply = harness.cache.query(ADDR).await.unwrap();
        assert_eq!(reply.status, AddrStatus::Todo);
        assert_eq!(harness.probes.count(), 1);
    }
}

#[tokio::test]
async fn unanswered_probe_is_retried_after_probe_ttl() {
    let harness = verify_harness(test_policy(true), 100);
    harness.cache.query(ADDR).await.unwrap();
    assert_eq!(harness.probes.count(), 1);

    harness.clock.set(100 + PROBE_TTL + 1);
    let reply = harness.cache.query(ADDR).await.unwrap();
    assert_eq!(reply.status, AddrStatus::Todo);
    assert_eq!(harness.probes.count(), 2);
}

#[tokio::test]
async fn positive_refresh_reprobes_and_records_send_time() {
    let harness = verify_harness(test_policy(true), 110);
    harness
        .cache
        .update(ADDR, AddrStatus::Ok, "250 ok")
        .await
        .unwrap();

    // Past the refresh threshold but far from expiry: the cached answer
    // stays usable while a fresh probe goes out.
    harness.clock.set(4000);
    let reply = harness.cache.query(ADDR).await.unwrap();
    assert_eq!(reply.status, AddrStatus::Ok);
    assert_eq!(reply.text, "250 ok");
    assert_eq!(harness.probes.count(), 1);
    assert_eq!(
        stored(&harness).await,
        Some(CacheEntry {
            status: AddrStatus::Ok,
            probed: 4000,
            updated: 110,
            text: "250 ok".to_string(),
        })
    );
}

#[tokio::test]
async fn refresh_probes_are_bounded_by_probe_ttl() {
    let harness = verify_harness(test_policy(true), 110);
    harness
        .cache
        .update(ADDR, AddrStatus::Ok, "250 ok")
        .await
        .unwrap();

    harness.clock.set(4000);
    harness.cache.query(ADDR).await.unwrap();
    assert_eq!(harness.probes.count(), 1);

    // A second query within PROBE_TTL seconds must not probe again.
    harness.clock.set(4500);
    let reply = harness.cache.query(ADDR).await.unwrap();
    assert_eq!(reply.status, AddrStatus::Ok);
    assert_eq!(harness.probes.count(), 1);
}

#[tokio::test]
async fn expired_positive_entry_restarts_probe_cycle() {
    let policy = test_policy(true);
    let expire = policy.positive_expire;
    let harness = verify_harness(policy, 110);
    harness
        .cache
        .update(ADDR, AddrStatus::Ok, "250 ok")
        .await
        .unwrap();

    harness.clock.set(110 + expire + 1);
    let reply = harness.cache.query(ADDR).await.unwrap();
    assert_eq!(reply.status, AddrStatus::Todo);
    assert_eq!(reply.text, PROBE_IN_PROGRESS_TEXT);
    assert_eq!(harness.probes.count(), 1);

    // The prior result is gone; only the in-progress marker remains.
    let entry = stored(&harness).await.unwrap();
    assert_eq!(entry.status, AddrStatus::Todo);
    assert_eq!(entry.updated, 0);
}

#[tokio::test]
async fn expired_negative_entry_is_purged_without_negative_cache() {
    let policy = test_policy(false);
    let expire = policy.negative_expire;
    let harness = verify_harness(policy, 100);
    harness
        .cache
        .update(ADDR, AddrStatus::Defer, "451 later")
        .await
        .unwrap();
    assert!(stored(&harness).await.is_some());

    harness.clock.set(100 + expire + 1);
    let reply = harness.cache.query(ADDR).await.unwrap();
    assert_eq!(reply.status, AddrStatus::Todo);

    // Purged on expiry, and the TODO-only record is not written back.
    assert!(harness.table.is_empty().await);
    assert_eq!(harness.probes.count(), 1);
}

#[tokio::test]
async fn unexpired_negative_entry_survives_without_negative_cache() {
    let harness = verify_harness(test_policy(false), 100);
    harness
        .cache
        .update(ADDR, AddrStatus::Bounce, "550 no")
        .await
        .unwrap();

    harness.clock.set(500);
    let reply = harness.cache.query(ADDR).await.unwrap();
    assert_eq!(reply.status, AddrStatus::Bounce);
    assert_eq!(reply.text, "550 no");
    assert!(stored(&harness).await.is_some());
}

#[tokio::test]
async fn unparseable_entry_is_treated_as_missing() {
    let harness = verify_harness(test_policy(true), 100);
    harness.table.put(ADDR, "not a cache entry").await.unwrap();

    let reply = harness.cache.query(ADDR).await.unwrap();
    assert_eq!(reply.status, AddrStatus::Todo);
    assert_eq!(harness.probes.count(), 1);

    // A fresh in-progress record replaces the garbage.
    let entry = stored(&harness).await.unwrap();
    assert_eq!(entry.status, AddrStatus::Todo);
    assert_eq!(entry.probed, 100);
}

#[tokio::test]
async fn unparseable_entry_is_deleted_without_negative_cache() {
    let harness = verify_harness(test_policy(false), 100);
    harness.table.put(ADDR, "3:broken").await.unwrap();

    harness.cache.query(ADDR).await.unwrap();
    assert!(harness.table.is_empty().await);
}

#[tokio::test]
async fn failed_submission_leaves_no_probe_timestamp() {
    let harness = verify_harness(test_policy(true), 100);
    harness.probes.set_failing(true);

    let reply = harness.cache.query(ADDR).await.unwrap();
    assert_eq!(reply.status, AddrStatus::Todo);

    // No confirmed submission, no write-back: the next query may probe
    // again immediately.
    assert!(harness.table.is_empty().await);

    harness.probes.set_failing(false);
    harness.clock.set(130);
    harness.cache.query(ADDR).await.unwrap();
    assert_eq!(harness.probes.count(), 1);
    assert_eq!(stored(&harness).await.unwrap().probed, 130);
}

#[tokio::test]
async fn null_sender_is_passed_through_to_the_submitter() {
    use crate::common::RecordingSubmitter;
    use mailgate::clock::ManualClock;
    use mailgate::core::table::mem::MemTable;
    use mailgate::core::verify::VerifyCache;
    use std::sync::Arc;

    let probes = RecordingSubmitter::new();
    let cache = VerifyCache::new(
        Arc::new(MemTable::new("verify-test")),
        test_policy(true),
        Arc::new(ManualClock::new(100)),
        probes.clone(),
        String::new(),
    );
    cache.query(ADDR).await.unwrap();
    assert_eq!(probes.sent(), vec![(String::new(), ADDR.to_string())]);
}
