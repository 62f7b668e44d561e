// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Property-based tests (fuzzing) for submission sync resilience.
//!
//! Uses proptest to generate random/malformed inputs and verify the crate
//! never panics, only returns clean errors, and keeps its bounds.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::str::FromStr;
use std::sync::Arc;
use proptest::prelude::*;
use serde_json::json;

use submission_sync::adapters::codeforces::{normalize_verdict, parse_user_status};
use submission_sync::adapters::hackerrank::parse_recent_challenges;
use submission_sync::storage::memory::InMemoryUserStore;
use submission_sync::{
    Job, JobQueue, JobTracker, Platform, QueuePressure, ResourcePool, SubmissionFilter, SyncError, UserId,
};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// A Codeforces submission object with random (possibly missing) fields.
fn codeforces_submission_strategy() -> impl Strategy<Value = serde_json::Value> {
    (
        prop::option::of(any::<i64>()),
        prop::option::of(any::<i64>()),
        "[A-Z][0-9]?",
        prop::option::of("[A-Z_]{0,24}"),
        prop::collection::vec("[a-z ]{0,10}", 0..4),
        prop::option::of(any::<f64>().prop_filter("finite", |f| f.is_finite())),
    )
        .prop_map(|(created, contest, index, verdict, tags, points)| {
            let mut problem = json!({ "index": index, "name": "P", "tags": tags });
            if let Some(contest) = contest {
                problem["contestId"] = json!(contest);
            }
            if let Some(points) = points {
                problem["points"] = json!(points);
            }
            let mut submission = json!({ "problem": problem, "programmingLanguage": "Rust" });
            if let Some(created) = created {
                submission["creationTimeSeconds"] = json!(created);
            }
            if let Some(verdict) = verdict {
                submission["verdict"] = json!(verdict);
            }
            submission
        })
}

/// Acquire (`true`) or release (`false`) steps.
fn pool_ops_strategy() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 0..200)
}

// =============================================================================
// Parsers never panic
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn fuzz_codeforces_from_random_bytes(bytes in prop::collection::vec(any::<u8>(), 0..4096)) {
        let _ = parse_user_status("https://codeforces.com", &bytes);
    }

    #[test]
    fn fuzz_hackerrank_from_random_bytes(bytes in prop::collection::vec(any::<u8>(), 0..4096)) {
        let _ = parse_recent_challenges("https://www.hackerrank.com", &bytes);
    }

    #[test]
    fn fuzz_codeforces_structured_payloads(
        status in prop_oneof![Just("OK".to_string()), "[A-Z]{0,6}"],
        submissions in prop::collection::vec(codeforces_submission_strategy(), 0..20),
    ) {
        let body = serde_json::to_vec(&json!({ "status": status, "result": submissions })).unwrap();
        match parse_user_status("https://codeforces.com", &body) {
            Ok(records) => {
                prop_assert!(records.len() <= submissions.len());
                for r in &records {
                    prop_assert_ne!(r.status.as_str(), "TESTING");
                }
            }
            Err(e) => prop_assert!(!e.is_transient(), "parse errors are permanent: {}", e),
        }
    }

    #[test]
    fn fuzz_hackerrank_structured_payloads(
        names in prop::collection::vec("[A-Za-z ]{0,12}", 0..10),
        created in prop::collection::vec(".{0,30}", 0..10),
        cursor in prop::option::of("[a-z0-9]{0,8}"),
        last_page in any::<bool>(),
    ) {
        let models: Vec<_> = names
            .iter()
            .zip(created.iter())
            .map(|(n, c)| json!({ "name": n, "url": "/challenges/x", "created_at": c }))
            .collect();
        let body = serde_json::to_vec(&json!({ "models": models, "cursor": cursor, "last_page": last_page })).unwrap();
        if let Ok((records, next)) = parse_recent_challenges("https://www.hackerrank.com", &body) {
            prop_assert_eq!(records.len(), models.len());
            prop_assert!(records.iter().all(|r| r.status == "AC"));
            if last_page {
                prop_assert!(next.is_none());
            }
        }
    }

    #[test]
    fn prop_verdict_normalization_is_total(verdict in ".{0,40}") {
        let normalized = normalize_verdict(&verdict);
        prop_assert!(!normalized.is_empty() || verdict.is_empty());
    }
}

// =============================================================================
// Identifier parsing never panics
// =============================================================================

proptest! {
    #[test]
    fn fuzz_user_id_parse(raw in ".{0,64}") {
        match UserId::parse(&raw) {
            Ok(id) => {
                prop_assert_eq!(id.as_str().len(), 24);
                prop_assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
            }
            Err(e) => prop_assert!(matches!(e, SyncError::BadInput(_))),
        }
    }

    #[test]
    fn fuzz_platform_parse(raw in ".{0,20}") {
        match Platform::from_str(&raw) {
            Ok(p) => prop_assert!(p.as_str().eq_ignore_ascii_case(raw.trim())),
            Err(e) => prop_assert!(matches!(e, SyncError::BadInput(_))),
        }
    }

    #[test]
    fn prop_filter_params_blank_means_absent(status in "[ \t]{0,4}", tag in "[ \t]{0,4}") {
        prop_assert!(SubmissionFilter::from_params(Some(&status), Some(&tag)).is_unrestricted());
    }
}

// =============================================================================
// Bounds: pool and queue
// =============================================================================

proptest! {
    #[test]
    fn prop_pool_never_exceeds_capacity(capacity in 1usize..8, ops in pool_ops_strategy()) {
        let pool = ResourcePool::from_store(Arc::new(InMemoryUserStore::new()), capacity);
        let mut held = Vec::new();

        for acquire in ops {
            if acquire {
                match pool.try_acquire().unwrap() {
                    Some(conn) => held.push(conn),
                    None => prop_assert_eq!(held.len(), capacity),
                }
            } else if let Some(conn) = held.pop() {
                pool.release(conn);
            }
            prop_assert!(pool.in_use() <= capacity);
            prop_assert_eq!(pool.in_use(), held.len());
        }

        held.clear();
        prop_assert_eq!(pool.in_use(), 0);
        prop_assert_eq!(pool.available(), capacity);
    }

    #[test]
    fn prop_queue_accepts_exactly_capacity(capacity in 1usize..64, attempts in 0usize..128) {
        let queue = JobQueue::new(capacity, Arc::new(JobTracker::new(256)));
        let user = UserId::generate();

        let accepted = (0..attempts)
            .filter(|_| queue.enqueue(Job::new(user.clone(), Platform::Codechef)).is_ok())
            .count();

        prop_assert_eq!(accepted, attempts.min(capacity));
        prop_assert_eq!(queue.depth(), accepted);
        prop_assert_eq!(queue.pressure() == QueuePressure::Full, attempts >= capacity);
    }
}
