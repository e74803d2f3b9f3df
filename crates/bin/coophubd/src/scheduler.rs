//! Periodic driver of the schedule engine.

use std::sync::Arc;
use std::time::Duration;

use coophub_app::ports::{CommandSink, ExecutionLog, ScheduleRepository};
use coophub_app::schedule_engine::ScheduleEngine;
use coophub_domain::time::now;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Evaluate due schedules every `period` until `stop` flips or its sender
/// is dropped.
///
/// The first pass runs immediately. A pass that overruns the period delays
/// the next one instead of queueing a burst.
pub async fn run<S, L, C>(
    engine: Arc<ScheduleEngine<S, L, C>>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) where
    S: ScheduleRepository,
    L: ExecutionLog,
    C: CommandSink,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!(period_secs = period.as_secs(), "schedule driver started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(err) = engine.tick(now()).await {
                    tracing::error!(error = %err, "failed to evaluate due schedules");
                }
            }
            _ = stop.changed() => break,
        }
    }

    tracing::info!("schedule driver stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use coophub_adapter_storage_sqlite_sqlx::{
        Config, SqliteCommandRepository, SqliteExecutionRepository, SqliteScheduleRepository,
    };
    use coophub_domain::id::{DeviceId, FarmId};
    use coophub_domain::schedule::NewSchedule;
    use coophub_domain::time::Timestamp;

    #[tokio::test]
    async fn should_fire_due_schedule_and_stop_when_signalled() {
        let db = Config {
            database_url: "sqlite::memory:".to_string(),
        }
        .build()
        .await
        .unwrap();
        let schedules = Arc::new(SqliteScheduleRepository::new(db.pool().clone()));
        let executions = Arc::new(SqliteExecutionRepository::new(db.pool().clone()));
        let commands = SqliteCommandRepository::new(db.pool().clone());

        let draft: NewSchedule = serde_json::from_value(serde_json::json!({
            "device_id": DeviceId::new(),
            "name": "Fan cycle",
            "schedule_type": "duration_based",
            "on_duration": 600,
            "off_duration": 300,
            "action": "on",
        }))
        .unwrap();
        let rule = draft.into_rule(FarmId::new(), now()).unwrap();
        let rule = schedules.create(rule).await.unwrap();

        let engine = Arc::new(ScheduleEngine::new(
            Arc::clone(&schedules),
            Arc::clone(&executions),
            commands,
        ));
        let (stop_tx, stop_rx) = watch::channel(false);
        let driver = tokio::spawn(run(engine, Duration::from_secs(3600), stop_rx));

        tokio::time::sleep(Duration::from_millis(200)).await;
        stop_tx.send(true).unwrap();
        driver.await.unwrap();

        let history = executions
            .find_by_schedule(rule.id, Timestamp::MIN_UTC, 10)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        let reloaded = schedules.get_by_id(rule.id).await.unwrap().unwrap();
        assert_eq!(reloaded.execution_count, 1);
    }

    #[tokio::test]
    async fn should_stop_when_sender_is_dropped() {
        let db = Config {
            database_url: "sqlite::memory:".to_string(),
        }
        .build()
        .await
        .unwrap();
        let engine = Arc::new(ScheduleEngine::new(
            SqliteScheduleRepository::new(db.pool().clone()),
            SqliteExecutionRepository::new(db.pool().clone()),
            SqliteCommandRepository::new(db.pool().clone()),
        ));
        let (stop_tx, stop_rx) = watch::channel(false);
        let driver = tokio::spawn(run(engine, Duration::from_secs(3600), stop_rx));

        drop(stop_tx);

        tokio::time::timeout(Duration::from_secs(5), driver)
            .await
            .unwrap()
            .unwrap();
    }
}
