// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Database replica set initialization.
//!
//! Overleaf needs its MongoDB instance to run as a single member replica set.
//! The replica set must be initiated exactly once, after the database starts
//! accepting connections. Instead of sleeping for a fixed amount of time and
//! hoping for the best, readiness is polled with a bounded exponential
//! backoff.

use crate::topology::{DATABASE_PORT, DATABASE_SERVICE, REPLICA_SET};

use regex::Regex;
use std::{sync::LazyLock, time::Duration};

/// Command that reports `1` once the database accepts commands.
pub const PING_EVAL: &str = "db.adminCommand('ping').ok";

/// Command that initiates the replica set declared by the topology manifest.
pub fn initiate_eval() -> String {
    format!(
        r#"rs.initiate({{ _id: "{REPLICA_SET}", members: [ {{ _id: 0, host: "{DATABASE_SERVICE}:{DATABASE_PORT}" }} ] }})"#
    )
}

static OK_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["']?\bok["']?\s*:\s*1\b"#).unwrap());

/// Bounded exponential backoff for database readiness polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Maximum number of readiness checks.
    pub attempts: u32,

    /// Delay before the first readiness check.
    pub initial_delay: Duration,

    /// Longest delay between two readiness checks.
    pub max_delay: Duration,
}

impl ReadinessPolicy {
    /// Delay to wait before each readiness check.
    ///
    /// Doubles the delay after every check, capped at the maximum delay.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let mut next = self.initial_delay;
        (0..self.attempts).map(move |_| {
            let current = next.min(self.max_delay);
            next = next.saturating_mul(2);
            current
        })
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            attempts: 6,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// Successful outcome of replica set initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaStatus {
    /// Replica set was initiated just now.
    Initialized,

    /// Replica set was initiated by an earlier run.
    AlreadyInitialized,
}

/// Classify the output of a replica set initiation command.
///
/// Returns `None` if the output reports neither success nor an existing
/// replica set.
pub fn classify_replica_response(output: &str) -> Option<ReplicaStatus> {
    if output.to_ascii_lowercase().contains("already initialized") {
        return Some(ReplicaStatus::AlreadyInitialized);
    }

    if OK_FIELD.is_match(output) {
        return Some(ReplicaStatus::Initialized);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use simple_test_case::test_case;

    #[test]
    fn initiate_matches_topology() {
        assert_eq!(
            initiate_eval(),
            r#"rs.initiate({ _id: "overleaf", members: [ { _id: 0, host: "mongo:27017" } ] })"#
        );
    }

    #[test]
    fn default_backoff_doubles_until_capped() {
        let result = ReadinessPolicy::default().delays().collect::<Vec<_>>();
        let expect = [1, 2, 4, 8, 8, 8].map(Duration::from_secs).to_vec();
        assert_eq!(result, expect);
    }

    #[test]
    fn backoff_respects_attempt_bound() {
        let policy = ReadinessPolicy {
            attempts: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.delays().count(), 2);
    }

    #[test_case("{ ok: 1 }", Some(ReplicaStatus::Initialized); "mongosh shell")]
    #[test_case(r#"{ "ok" : 1 }"#, Some(ReplicaStatus::Initialized); "legacy json")]
    #[test_case(
        "MongoServerError: already initialized",
        Some(ReplicaStatus::AlreadyInitialized);
        "already initialized"
    )]
    #[test_case(
        r#"{ "ok" : 0, "errmsg" : "already initialized", "code" : 23 }"#,
        Some(ReplicaStatus::AlreadyInitialized);
        "legacy already initialized"
    )]
    #[test_case("{ ok: 0, errmsg: 'no replset config' }", None; "failure")]
    #[test_case("MongoNetworkError: connect ECONNREFUSED", None; "unreachable")]
    #[test_case("{ ok: 10 }", None; "not exactly one")]
    #[test]
    fn classify_responses(output: &str, expect: Option<ReplicaStatus>) {
        assert_eq!(classify_replica_response(output), expect);
    }

    #[test]
    fn classify_multiline_response() {
        let output = indoc! {r#"
            {
              info2: 'no configuration specified. Using a default configuration for the set',
              me: 'mongo:27017',
              ok: 1
            }
        "#};
        assert_eq!(
            classify_replica_response(output),
            Some(ReplicaStatus::Initialized)
        );
    }
}
