//! 限流请求账本
//!
//! Sliding-window log of request timestamps keyed by (ip, endpoint). The
//! in-memory ledger is process-local; `repository::PgRateLedger` shares the
//! same log across instances.

use crate::{error::AppError, models::rate_limit::LedgerStats};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};

#[async_trait]
pub trait RateLedger: Send + Sync + 'static {
    /// Append `now`, drop timestamps older than `now - window`, return the count after insertion
    async fn record_hit(
        &self,
        ip: &str,
        endpoint: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<usize, AppError>;

    /// Remove entries untouched for longer than `idle`; returns how many (ip, endpoint) keys were removed
    async fn collect_idle(&self, now: DateTime<Utc>, idle: Duration) -> Result<usize, AppError>;

    async fn stats(&self) -> Result<LedgerStats, AppError>;
}

/// 单个 (ip, endpoint) 的请求记录
#[derive(Debug, Default)]
struct LedgerEntry {
    hits: VecDeque<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
}

/// 进程内账本, 按 IP 分片加锁
#[derive(Default)]
pub struct InMemoryRateLedger {
    entries: DashMap<String, HashMap<String, LedgerEntry>>,
}

impl InMemoryRateLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLedger for InMemoryRateLedger {
    async fn record_hit(
        &self,
        ip: &str,
        endpoint: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<usize, AppError> {
        // entry() holds the shard lock for this ip until the guard drops
        let mut per_ip = self.entries.entry(ip.to_string()).or_default();
        let entry = per_ip.entry(endpoint.to_string()).or_default();

        entry.hits.push_back(now);
        entry.last_seen = Some(now);

        let cutoff = now - window;
        while entry.hits.front().is_some_and(|ts| *ts < cutoff) {
            entry.hits.pop_front();
        }

        Ok(entry.hits.len())
    }

    async fn collect_idle(&self, now: DateTime<Utc>, idle: Duration) -> Result<usize, AppError> {
        let cutoff = now - idle;
        let mut removed = 0;

        self.entries.retain(|_, per_ip| {
            let before = per_ip.len();
            per_ip.retain(|_, entry| entry.last_seen.is_some_and(|seen| seen >= cutoff));
            removed += before - per_ip.len();
            !per_ip.is_empty()
        });

        Ok(removed)
    }

    async fn stats(&self) -> Result<LedgerStats, AppError> {
        let tracked_keys = self.entries.iter().map(|per_ip| per_ip.len()).sum();
        Ok(LedgerStats {
            tracked_ips: self.entries.len(),
            tracked_keys,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_count_includes_current_hit_and_prunes_window() {
        let ledger = InMemoryRateLedger::new();
        let start = Utc::now();
        let window = Duration::milliseconds(60_000);

        for i in 1..=3 {
            let count = ledger.record_hit("10.0.0.1", "/login", start, window).await.unwrap();
            assert_eq!(count, i);
        }

        // The three earlier hits fall out of the window
        let later = start + Duration::milliseconds(60_001);
        let count = ledger.record_hit("10.0.0.1", "/login", later, window).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let ledger = InMemoryRateLedger::new();
        let now = Utc::now();
        let window = Duration::seconds(60);

        ledger.record_hit("10.0.0.1", "/a", now, window).await.unwrap();
        ledger.record_hit("10.0.0.1", "/a", now, window).await.unwrap();
        assert_eq!(ledger.record_hit("10.0.0.1", "/b", now, window).await.unwrap(), 1);
        assert_eq!(ledger.record_hit("10.0.0.2", "/a", now, window).await.unwrap(), 1);

        let stats = ledger.stats().await.unwrap();
        assert_eq!(stats.tracked_ips, 2);
        assert_eq!(stats.tracked_keys, 3);
    }

    #[tokio::test]
    async fn test_collect_idle_drops_empty_ip_maps() {
        let ledger = InMemoryRateLedger::new();
        let start = Utc::now();
        let window = Duration::seconds(60);

        ledger.record_hit("10.0.0.1", "/a", start, window).await.unwrap();
        ledger
            .record_hit("10.0.0.2", "/a", start + Duration::minutes(50), window)
            .await
            .unwrap();

        let removed = ledger
            .collect_idle(start + Duration::minutes(61), Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let stats = ledger.stats().await.unwrap();
        assert_eq!(stats.tracked_ips, 1);
        assert_eq!(stats.tracked_keys, 1);
    }
}
