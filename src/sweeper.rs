//! Background task for periodic retention sweeps

use crate::sensors::{SensorType, Timestamp};
use crate::storage::SensorStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;
use tracing::{error, info};

/// Outcome of one sweep across all sensor tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub deleted: Vec<(SensorType, usize)>,
    pub failures: Vec<(SensorType, String)>,
}

impl SweepReport {
    pub fn total_deleted(&self) -> usize {
        self.deleted.iter().map(|(_, n)| n).sum()
    }
}

/// Periodically deletes durable rows older than the retention horizon.
pub struct RetentionSweeper {
    store: Arc<dyn SensorStore>,
    sensors: Vec<SensorType>,
    horizon: Duration,
    interval: Duration,
    initial_delay: Duration,
}

impl RetentionSweeper {
    pub fn new(
        store: Arc<dyn SensorStore>,
        sensors: Vec<SensorType>,
        horizon: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            sensors,
            horizon,
            interval,
            initial_delay: Duration::ZERO,
        }
    }

    /// Wait this long before the first sweep.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Start the background sweep task. It exits once `shutdown` turns true
    /// or its sender is dropped.
    pub fn start(self, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Starting retention sweeper with interval {:?}, horizon {:?}",
                self.interval, self.horizon
            );

            tokio::select! {
                _ = time::sleep(self.initial_delay) => {}
                _ = wait_for_shutdown(&mut shutdown) => return,
            }

            let mut interval = time::interval(self.interval);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = wait_for_shutdown(&mut shutdown) => break,
                }
                let report = self.sweep_once(Timestamp::now()).await;
                info!(
                    deleted = report.total_deleted(),
                    failures = report.failures.len(),
                    "Retention sweep finished"
                );
            }
            info!("Retention sweeper stopped");
        })
    }

    /// Delete rows older than `now - horizon` from every configured table.
    /// A failing table is logged and left for the next sweep.
    pub async fn sweep_once(&self, now: Timestamp) -> SweepReport {
        let cutoff = now.saturating_sub(self.horizon);
        let mut report = SweepReport::default();
        for sensor in &self.sensors {
            match self.store.delete_older_than(*sensor, cutoff).await {
                Ok(deleted) => report.deleted.push((*sensor, deleted)),
                Err(e) => {
                    error!("Retention sweep of {} failed: {}", sensor.table_name(), e);
                    report.failures.push((*sensor, e.to_string()));
                }
            }
        }
        report
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::Sample;
    use crate::storage::memory::MemoryStore;

    const HOUR: Duration = Duration::from_secs(3600);

    fn at_secs(secs: i64) -> Timestamp {
        Timestamp(secs * 1_000_000_000)
    }

    #[tokio::test]
    async fn sweep_removes_only_rows_past_the_horizon() {
        let store = MemoryStore::new();
        store.init(&SensorType::ALL).await.unwrap();
        let now = at_secs(100_000);
        let old = Sample::axes(SensorType::Accelerometer, "a", at_secs(100_000 - 7200), 0.0, 0.0, 0.0);
        let fresh = Sample::axes(SensorType::Accelerometer, "a", at_secs(100_000 - 60), 0.0, 0.0, 0.0);
        store
            .insert_batch(SensorType::Accelerometer, &[old, fresh])
            .await
            .unwrap();

        let sweeper = RetentionSweeper::new(Arc::new(store.clone()), SensorType::ALL.to_vec(), HOUR, HOUR);
        let report = sweeper.sweep_once(now).await;

        assert_eq!(report.total_deleted(), 1);
        assert!(report.failures.is_empty());
        let stats = store.stats(SensorType::Accelerometer).await.unwrap();
        assert_eq!(stats.total_records, 1);
        assert_eq!(stats.oldest, Some(at_secs(100_000 - 60)));
    }

    #[tokio::test]
    async fn failing_table_does_not_stop_the_others() {
        let store = MemoryStore::new();
        // Gravity has no table, so its sweep fails
        store.init(&[SensorType::Accelerometer]).await.unwrap();
        let sweeper = RetentionSweeper::new(
            Arc::new(store),
            vec![SensorType::Gravity, SensorType::Accelerometer],
            HOUR,
            HOUR,
        );
        let report = sweeper.sweep_once(at_secs(10_000)).await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, SensorType::Gravity);
        assert_eq!(report.deleted, vec![(SensorType::Accelerometer, 0)]);
    }

    #[tokio::test]
    async fn task_stops_on_shutdown() {
        let store = MemoryStore::new();
        store.init(&SensorType::ALL).await.unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = RetentionSweeper::new(
            Arc::new(store),
            SensorType::ALL.to_vec(),
            HOUR,
            Duration::from_millis(10),
        )
        .start(rx);

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
