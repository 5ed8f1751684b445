//! 后台清理任务
//! Each sweep runs on its own interval, off the request path

use crate::{
    config::SecurityConfig,
    db,
    services::{
        ip_block_service::IpBlockRegistry, rate_limiter::RateLimiter,
        session_service::SessionRegistry,
    },
};
use chrono::Utc;
use sqlx::PgPool;
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

#[derive(Debug, Clone, Copy)]
pub struct SweepSchedule {
    pub ledger_gc_interval: Duration,
    pub ledger_idle: Duration,
    pub block_sweep_interval: Duration,
    pub session_sweep_interval: Duration,
}

impl SweepSchedule {
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self {
            ledger_gc_interval: Duration::from_secs(config.ledger_gc_interval_secs),
            ledger_idle: Duration::from_secs(config.ledger_idle_secs),
            block_sweep_interval: Duration::from_secs(config.block_sweep_interval_secs),
            session_sweep_interval: Duration::from_secs(config.session_sweep_interval_secs),
        }
    }
}

impl Default for SweepSchedule {
    fn default() -> Self {
        Self {
            ledger_gc_interval: Duration::from_secs(60),
            ledger_idle: Duration::from_secs(3600),
            block_sweep_interval: Duration::from_secs(300),
            session_sweep_interval: Duration::from_secs(300),
        }
    }
}

/// Spawn the ledger GC, block sweep and session sweep tasks
pub fn spawn_sweepers(
    schedule: SweepSchedule,
    rate_limiter: Arc<RateLimiter>,
    blocks: Arc<IpBlockRegistry>,
    sessions: Arc<SessionRegistry>,
) -> Vec<JoinHandle<()>> {
    let idle = chrono::Duration::from_std(schedule.ledger_idle)
        .unwrap_or_else(|_| chrono::Duration::hours(1));

    let ledger_gc = tokio::spawn(async move {
        let mut interval = ticker(schedule.ledger_gc_interval);
        loop {
            interval.tick().await;
            match rate_limiter.collect_idle(Utc::now(), idle).await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed = removed, "Rate ledger entries collected"),
                Err(e) => tracing::error!(error = %e, "Rate ledger GC failed"),
            }
        }
    });

    let block_sweep = tokio::spawn(async move {
        let mut interval = ticker(schedule.block_sweep_interval);
        loop {
            interval.tick().await;
            if let Err(e) = blocks.sweep_expired().await {
                tracing::error!(error = %e, "Expired IP block sweep failed");
            }
        }
    });

    let session_sweep = tokio::spawn(async move {
        let mut interval = ticker(schedule.session_sweep_interval);
        loop {
            interval.tick().await;
            if let Err(e) = sessions.sweep_expired().await {
                tracing::error!(error = %e, "Expired session sweep failed");
            }
        }
    });

    tracing::info!(
        ledger_gc_secs = schedule.ledger_gc_interval.as_secs(),
        block_sweep_secs = schedule.block_sweep_interval.as_secs(),
        session_sweep_secs = schedule.session_sweep_interval.as_secs(),
        "Background sweepers started"
    );

    vec![ledger_gc, block_sweep, session_sweep]
}

/// 连接池指标随 GC 周期刷新
pub fn spawn_pool_gauges(pool: PgPool, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = ticker(period);
        loop {
            interval.tick().await;
            db::record_pool_metrics(&pool);
        }
    })
}

/// Interval whose first tick is one period out
fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
