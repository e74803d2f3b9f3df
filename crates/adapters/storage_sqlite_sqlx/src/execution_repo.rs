//! `SQLite` implementation of [`ExecutionLog`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use coophub_app::ports::ExecutionLog;
use coophub_domain::error::CoopHubError;
use coophub_domain::execution::ExecutionRecord;
use coophub_domain::id::ScheduleId;
use coophub_domain::time::Timestamp;

use crate::codec;
use crate::error::StorageError;

struct Wrapper(ExecutionRecord);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let schedule_id: String = row.try_get("schedule_id")?;
        let device_id: String = row.try_get("device_id")?;
        let scheduled_time: String = row.try_get("scheduled_time")?;
        let actual_execution_time: Option<String> = row.try_get("actual_execution_time")?;
        let status: String = row.try_get("status")?;
        let execution_duration_ms: Option<i64> = row.try_get("execution_duration_ms")?;
        let device_response: Option<String> = row.try_get("device_response")?;
        let command_id: Option<String> = row.try_get("command_id")?;
        let created_at: String = row.try_get("created_at")?;

        let device_response = device_response
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(codec::decode_error)?;

        Ok(Self(ExecutionRecord {
            id: codec::parse(&id)?,
            schedule_id: codec::parse(&schedule_id)?,
            device_id: codec::parse(&device_id)?,
            scheduled_time: codec::parse_timestamp(&scheduled_time)?,
            actual_execution_time: codec::parse_optional_timestamp(actual_execution_time)?,
            status: codec::parse(&status)?,
            execution_duration_ms: execution_duration_ms.map(codec::parse_count).transpose()?,
            device_response,
            error_message: row.try_get("error_message")?,
            command_id: codec::parse_optional(command_id)?,
            created_at: codec::parse_timestamp(&created_at)?,
        }))
    }
}

const INSERT: &str = "INSERT INTO schedule_executions (id, schedule_id, device_id, scheduled_time, actual_execution_time, status, execution_duration_ms, device_response, error_message, command_id, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
const SELECT_BY_SCHEDULE: &str = "SELECT * FROM schedule_executions WHERE schedule_id = ? AND scheduled_time >= ? ORDER BY scheduled_time DESC, created_at DESC LIMIT ?";

/// `SQLite`-backed, append-only execution history.
pub struct SqliteExecutionRepository {
    pool: SqlitePool,
}

impl SqliteExecutionRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl ExecutionLog for SqliteExecutionRepository {
    async fn append(&self, record: ExecutionRecord) -> Result<ExecutionRecord, CoopHubError> {
        let device_response = record
            .device_response
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(StorageError::from)?;

        sqlx::query(INSERT)
            .bind(record.id.to_string())
            .bind(record.schedule_id.to_string())
            .bind(record.device_id.to_string())
            .bind(codec::timestamp(record.scheduled_time))
            .bind(codec::optional_timestamp(record.actual_execution_time))
            .bind(record.status.to_string())
            .bind(record.execution_duration_ms.map(codec::count))
            .bind(&device_response)
            .bind(&record.error_message)
            .bind(record.command_id.map(|id| id.to_string()))
            .bind(codec::timestamp(record.created_at))
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(record)
    }

    async fn find_by_schedule(
        &self,
        schedule_id: ScheduleId,
        since: Timestamp,
        limit: u32,
    ) -> Result<Vec<ExecutionRecord>, CoopHubError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_BY_SCHEDULE)
            .bind(schedule_id.to_string())
            .bind(codec::timestamp(since))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Config;
    use crate::schedule_repo::SqliteScheduleRepository;
    use chrono::{TimeZone, Utc};
    use coophub_app::ports::ScheduleRepository;
    use coophub_domain::execution::ExecutionStatus;
    use coophub_domain::id::{CommandId, DeviceId, FarmId};
    use coophub_domain::schedule::{ScheduleKind, ScheduleRule};

    fn at(d: u32, h: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2026, 2, d, h, 0, 0).unwrap()
    }

    async fn setup() -> (SqliteExecutionRepository, ScheduleRule) {
        let db = Config {
            database_url: "sqlite::memory:".to_string(),
        }
        .build()
        .await
        .unwrap();
        let rule = ScheduleRule::builder()
            .farm_id(FarmId::new())
            .device_id(DeviceId::new())
            .name("Morning lights")
            .kind(ScheduleKind::TimeBased {
                cron_expression: "0 6 * * *".parse().unwrap(),
            })
            .created_at(at(1, 0))
            .build()
            .unwrap();
        SqliteScheduleRepository::new(db.pool().clone())
            .create(rule.clone())
            .await
            .unwrap();
        (SqliteExecutionRepository::new(db.pool().clone()), rule)
    }

    #[tokio::test]
    async fn should_append_and_read_back_executed_record() {
        let (repo, rule) = setup().await;
        let mut record = ExecutionRecord::executed(
            rule.id,
            rule.device_id,
            at(19, 6),
            at(19, 6),
            CommandId::new(),
            12,
        );
        record.device_response = Some(serde_json::json!({"ack": true}));

        repo.append(record.clone()).await.unwrap();
        let found = repo.find_by_schedule(rule.id, at(1, 0), 10).await.unwrap();

        assert_eq!(found, vec![record]);
    }

    #[tokio::test]
    async fn should_return_newest_first_within_window_and_limit() {
        let (repo, rule) = setup().await;
        for day in [10, 17, 18, 19] {
            repo.append(ExecutionRecord::skipped(
                rule.id,
                rule.device_id,
                at(day, 6),
                at(day, 6),
                "device busy",
            ))
            .await
            .unwrap();
        }

        let found = repo.find_by_schedule(rule.id, at(15, 0), 2).await.unwrap();

        let times: Vec<Timestamp> = found.iter().map(|r| r.scheduled_time).collect();
        assert_eq!(times, vec![at(19, 6), at(18, 6)]);
        assert!(found.iter().all(|r| r.status == ExecutionStatus::Skipped));
    }

    #[tokio::test]
    async fn should_return_empty_history_for_other_schedule() {
        let (repo, rule) = setup().await;
        repo.append(ExecutionRecord::failed(
            rule.id,
            rule.device_id,
            at(19, 6),
            at(19, 6),
            None,
            "broker unreachable",
        ))
        .await
        .unwrap();

        let found = repo
            .find_by_schedule(ScheduleId::new(), at(1, 0), 10)
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn should_reject_record_for_unknown_schedule() {
        let (repo, _) = setup().await;
        let result = repo
            .append(ExecutionRecord::skipped(
                ScheduleId::new(),
                DeviceId::new(),
                at(19, 6),
                at(19, 6),
                "device busy",
            ))
            .await;
        assert!(matches!(result, Err(CoopHubError::Storage(_))));
    }
}
