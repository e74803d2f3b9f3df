//! `SQLite` implementation of [`CommandSink`]: the device command queue.

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use coophub_app::ports::CommandSink;
use coophub_domain::command::DeviceCommand;
use coophub_domain::error::CoopHubError;
use coophub_domain::id::{CommandId, DeviceId};

use crate::codec;
use crate::error::StorageError;

struct Wrapper(DeviceCommand);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<DeviceCommand> {
        value.map(|w| w.0)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let device_id: String = row.try_get("device_id")?;
        let farm_id: String = row.try_get("farm_id")?;
        let coop_id: Option<String> = row.try_get("coop_id")?;
        let schedule_id: Option<String> = row.try_get("schedule_id")?;
        let command_type: String = row.try_get("command_type")?;
        let duration: Option<i64> = row.try_get("duration")?;
        let status: String = row.try_get("status")?;
        let issued_at: String = row.try_get("issued_at")?;

        Ok(Self(DeviceCommand {
            id: codec::parse(&id)?,
            device_id: codec::parse(&device_id)?,
            farm_id: codec::parse(&farm_id)?,
            coop_id: codec::parse_optional(coop_id)?,
            schedule_id: codec::parse_optional(schedule_id)?,
            command_type: codec::parse(&command_type)?,
            command_value: row.try_get("command_value")?,
            duration: codec::parse_seconds(duration)?,
            status: codec::parse(&status)?,
            issued_at: codec::parse_timestamp(&issued_at)?,
        }))
    }
}

const INSERT: &str = "INSERT INTO device_commands (id, device_id, farm_id, coop_id, schedule_id, command_type, command_value, duration, status, issued_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
const SELECT_BY_ID: &str = "SELECT * FROM device_commands WHERE id = ?";
const SELECT_BY_DEVICE: &str =
    "SELECT * FROM device_commands WHERE device_id = ? ORDER BY issued_at DESC LIMIT ?";

/// `SQLite`-backed command queue. Device gateways drain it.
pub struct SqliteCommandRepository {
    pool: SqlitePool,
}

impl SqliteCommandRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Look up a queued command.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub async fn get_by_id(&self, id: CommandId) -> Result<Option<DeviceCommand>, CoopHubError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(Wrapper::maybe(row))
    }

    /// Most recent commands of a device, newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub async fn list_by_device(
        &self,
        device_id: DeviceId,
        limit: u32,
    ) -> Result<Vec<DeviceCommand>, CoopHubError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_BY_DEVICE)
            .bind(device_id.to_string())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }
}

impl CommandSink for SqliteCommandRepository {
    async fn persist(&self, command: DeviceCommand) -> Result<DeviceCommand, CoopHubError> {
        sqlx::query(INSERT)
            .bind(command.id.to_string())
            .bind(command.device_id.to_string())
            .bind(command.farm_id.to_string())
            .bind(command.coop_id.map(|id| id.to_string()))
            .bind(command.schedule_id.map(|id| id.to_string()))
            .bind(command.command_type.to_string())
            .bind(&command.command_value)
            .bind(command.duration.map(i64::from))
            .bind(command.status.to_string())
            .bind(codec::timestamp(command.issued_at))
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Config;
    use chrono::{TimeZone, Utc};
    use coophub_domain::command::{CommandStatus, CommandType};
    use coophub_domain::id::{CoopId, FarmId, ScheduleId};

    async fn setup() -> SqliteCommandRepository {
        let db = Config {
            database_url: "sqlite::memory:".to_string(),
        }
        .build()
        .await
        .unwrap();
        SqliteCommandRepository::new(db.pool().clone())
    }

    fn command(device: DeviceId, hour: u32) -> DeviceCommand {
        DeviceCommand::builder()
            .device_id(device)
            .farm_id(FarmId::new())
            .command_type(CommandType::On)
            .issued_at(Utc.with_ymd_and_hms(2026, 2, 19, hour, 0, 0).unwrap())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn should_persist_pending_command_with_all_fields() {
        let repo = setup().await;
        let cmd = DeviceCommand::builder()
            .device_id(DeviceId::new())
            .farm_id(FarmId::new())
            .coop_id(Some(CoopId::new()))
            .schedule_id(ScheduleId::new())
            .command_type(CommandType::SetValue)
            .command_value(Some("75".to_string()))
            .duration(Some(600))
            .issued_at(Utc.with_ymd_and_hms(2026, 2, 19, 6, 0, 0).unwrap())
            .build()
            .unwrap();

        repo.persist(cmd.clone()).await.unwrap();
        let fetched = repo.get_by_id(cmd.id).await.unwrap().unwrap();

        assert_eq!(fetched, cmd);
        assert_eq!(fetched.status, CommandStatus::Pending);
    }

    #[tokio::test]
    async fn should_list_device_commands_newest_first() {
        let repo = setup().await;
        let device = DeviceId::new();
        let early = command(device, 6);
        let late = command(device, 18);
        repo.persist(early.clone()).await.unwrap();
        repo.persist(late.clone()).await.unwrap();
        repo.persist(command(DeviceId::new(), 12)).await.unwrap();

        let listed = repo.list_by_device(device, 10).await.unwrap();

        assert_eq!(listed, vec![late, early]);
    }
}
