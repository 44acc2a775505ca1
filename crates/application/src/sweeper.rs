//! Periodic housekeeping: expiring overdue payment attempts and purging
//! stale idempotency records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use store::Store;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::services::PaymentService;

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_attempts: u64,
    pub purged_records: u64,
}

#[derive(Clone)]
pub struct Sweeper<S> {
    store: S,
    payments: PaymentService<S>,
    interval: Duration,
}

impl<S: Store> Sweeper<S> {
    pub fn new(store: S, payments: PaymentService<S>, interval: Duration) -> Self {
        Self {
            store,
            payments,
            interval,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let expired_attempts = self.payments.expire_overdue(now).await?;
        let purged_records = self.store.purge_expired_idempotency_records(now).await?;
        if purged_records > 0 {
            metrics::counter!("idempotency_records_purged_total").increment(purged_records);
        }
        Ok(SweepReport {
            expired_attempts,
            purged_records,
        })
    }

    /// Runs a sweep every interval until `shutdown` flips to true.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(interval_secs = self.interval.as_secs(), "sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.run_once(Utc::now()).await {
                            Ok(report) if report != SweepReport::default() => {
                                tracing::info!(
                                    expired_attempts = report.expired_attempts,
                                    purged_records = report.purged_records,
                                    "sweep finished"
                                );
                            }
                            Ok(_) => {}
                            Err(e) => tracing::error!(error = %e, "sweep failed"),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use common::UserId;
    use domain::payments::{IdempotencyKey, IdempotencyRecord, IdempotentOperation};
    use serde_json::json;
    use store::{IdempotencyRepository, InMemoryStore};

    use super::*;
    use crate::settings::Settings;

    fn sweeper(store: &InMemoryStore) -> Sweeper<InMemoryStore> {
        Sweeper::new(
            store.clone(),
            PaymentService::new(store.clone(), Settings::default()),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn purges_expired_records() {
        let store = InMemoryStore::new();
        let then = Utc::now() - ChronoDuration::hours(2);
        let record = IdempotencyRecord::new(
            IdempotencyKey::parse("old").unwrap(),
            UserId::new(),
            IdempotentOperation::Checkout,
            "hash".to_string(),
            201,
            json!({}),
            ChronoDuration::hours(1),
            then,
        );
        store.save_idempotency_record(&record, then).await.unwrap();

        let report = sweeper(&store).run_once(Utc::now()).await.unwrap();
        assert_eq!(report.purged_records, 1);
        assert_eq!(report.expired_attempts, 0);
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let store = InMemoryStore::new();
        let (tx, rx) = watch::channel(false);
        let handle = sweeper(&store).spawn(rx);

        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
