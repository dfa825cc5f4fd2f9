//! Subscription scheduling: occurrence pre-materialization and the poll loop.
//!
//! The loop has two states, running and stopped. While running it wakes on a
//! fixed interval, lists the occurrences due today and hands each one to the
//! worker pool keyed by occurrence id. It only stops on cancellation, after
//! which the pool is drained.

use crate::pool::{PoolStats, WorkerPool};
use crate::storage::Stores;
use crate::{
    generate_billing_dates, BalanceLocks, BalanceSubscription, EngineConfig, EngineError,
    OperationMaterializer, Result, ScheduledOccurrence,
};
use chrono::{DateTime, Local, TimeZone, Utc};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub type OccurrencePool = WorkerPool<String, ScheduledOccurrence>;

/// `[start of day, end of day]` of `now`'s calendar day in its own timezone,
/// as UTC instants.
///
/// # Examples
///
/// ```rust
/// use budgetbot_engine::today_window;
/// use chrono::{FixedOffset, TimeZone, Utc};
///
/// let tz = FixedOffset::east_opt(3 * 3600).unwrap();
/// let now = tz.with_ymd_and_hms(2024, 5, 10, 1, 30, 0).unwrap();
/// let (from, to) = today_window(&now);
/// assert_eq!(from, Utc.with_ymd_and_hms(2024, 5, 9, 21, 0, 0).unwrap());
/// assert!(to > from);
/// ```
pub fn today_window<Tz: TimeZone>(now: &DateTime<Tz>) -> (DateTime<Utc>, DateTime<Utc>) {
    let tz = now.timezone();
    let day = now.date_naive();
    let midnight = day.and_hms_opt(0, 0, 0).unwrap_or_default();
    let last_instant = day
        .and_hms_nano_opt(23, 59, 59, 999_999_999)
        .unwrap_or_default();

    let start = tz
        .from_local_datetime(&midnight)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&midnight));
    let end = tz
        .from_local_datetime(&last_instant)
        .latest()
        .unwrap_or_else(|| tz.from_utc_datetime(&last_instant));

    (start.with_timezone(&Utc), end.with_timezone(&Utc))
}

/// Entry point for the surrounding application.
///
/// - [`SubscriptionScheduler::schedule_occurrences`] when a subscription is created
/// - [`SubscriptionScheduler::run_materialization_loop`] once at process start
pub struct SubscriptionScheduler {
    stores: Stores,
    config: EngineConfig,
    locks: Arc<BalanceLocks>,
}

impl SubscriptionScheduler {
    pub fn new(stores: Stores, config: EngineConfig) -> Self {
        Self {
            stores,
            config,
            locks: Arc::new(BalanceLocks::new()),
        }
    }

    /// Share balance locks with other ledger writers in this process.
    pub fn with_locks(mut self, locks: Arc<BalanceLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Persist one occurrence per billing date in the lookahead window.
    ///
    /// Dates are computed in the local timezone so monthly and yearly
    /// charges keep their local calendar day. A failed write is logged and
    /// skipped; occurrences already written stay. Returns the occurrences
    /// that were persisted.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidPeriod`] when the subscription's period is
    /// unknown; nothing is written.
    #[tracing::instrument(skip(self, subscription), fields(subscription_id = %subscription.subscription_id))]
    pub async fn schedule_occurrences(
        &self,
        subscription: &BalanceSubscription,
    ) -> Result<Vec<ScheduledOccurrence>> {
        if !subscription.period.is_known() {
            tracing::warn!(period = %subscription.period, "unknown period, nothing scheduled");
            return Err(EngineError::InvalidPeriod(subscription.period.to_string()));
        }

        let count = self.config.lookahead.count_for(subscription.period);
        let dates = generate_billing_dates(
            subscription.period,
            subscription.start_at.with_timezone(&Local),
            count,
        );

        let mut created = Vec::with_capacity(dates.len());
        for date in dates {
            let occurrence = ScheduledOccurrence::new(
                subscription.subscription_id.clone(),
                date.with_timezone(&Utc),
            );
            match self.stores.occurrences.create_occurrence(&occurrence).await {
                Ok(()) => created.push(occurrence),
                Err(e) => tracing::warn!(
                    scheduled_at = %occurrence.scheduled_at,
                    error = %e,
                    "failed to persist occurrence"
                ),
            }
        }

        tracing::info!(
            period = %subscription.period,
            requested = count,
            created = created.len(),
            "occurrences scheduled"
        );
        Ok(created)
    }

    /// Delete every pending occurrence of a subscription. Returns how many
    /// were removed.
    #[tracing::instrument(skip(self))]
    pub async fn unschedule_subscription(&self, subscription_id: &str) -> Result<usize> {
        let pending = self
            .stores
            .occurrences
            .list_occurrences_for_subscription(subscription_id)
            .await?;
        let mut removed = 0;
        for occurrence in pending {
            match self
                .stores
                .occurrences
                .delete_occurrence(&occurrence.occurrence_id)
                .await
            {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(
                    occurrence_id = %occurrence.occurrence_id,
                    error = %e,
                    "failed to delete occurrence"
                ),
            }
        }
        Ok(removed)
    }

    /// Start a worker pool running the materializer with this scheduler's
    /// configuration.
    pub fn start_pool(&self) -> OccurrencePool {
        let materializer = OperationMaterializer::new(self.stores.clone(), Arc::clone(&self.locks));
        WorkerPool::start(
            "materializer",
            self.config.workers,
            self.config.queue_capacity,
            Arc::new(materializer),
        )
    }

    /// One poll: submit every occurrence due on `now`'s day. Returns how many
    /// jobs the pool accepted (occurrences already in flight are skipped).
    pub async fn poll_due_once<Tz: TimeZone>(
        &self,
        pool: &OccurrencePool,
        now: DateTime<Tz>,
    ) -> Result<usize> {
        let (from, to) = today_window(&now);
        let due = self
            .stores
            .occurrences
            .list_occurrences_between(from, to)
            .await?;

        let found = due.len();
        let mut accepted = 0;
        for occurrence in due {
            if pool
                .submit(occurrence.occurrence_id.clone(), occurrence)
                .await?
            {
                accepted += 1;
            }
        }

        tracing::debug!(found, accepted, "poll tick");
        Ok(accepted)
    }

    /// Poll for due occurrences until `cancel` fires, then drain the pool.
    ///
    /// A failed poll is logged and retried on the next tick. Returns the
    /// pool counters once every in-flight job has finished.
    pub async fn run_materialization_loop(&self, cancel: CancellationToken) -> Result<PoolStats> {
        self.config.validate()?;

        let pool = self.start_pool();
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            poll_interval_ms = self.config.poll_interval_ms,
            workers = self.config.workers,
            "materialization loop running"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        polled = self.poll_due_once(&pool, Local::now()) => {
                            if let Err(e) = polled {
                                tracing::error!(error = %e, "failed to poll due occurrences");
                            }
                        }
                    }
                }
            }
        }

        tracing::info!("materialization loop stopping");
        pool.shutdown().await;
        Ok(pool.stats())
    }
}
