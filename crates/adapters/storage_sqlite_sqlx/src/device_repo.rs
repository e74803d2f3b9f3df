//! `SQLite` implementation of [`DeviceDirectory`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use coophub_app::ports::DeviceDirectory;
use coophub_domain::device::DeviceInfo;
use coophub_domain::error::CoopHubError;
use coophub_domain::id::DeviceId;
use coophub_domain::time::Timestamp;

use crate::codec;
use crate::error::StorageError;

/// Wrapper for converting database rows into domain [`DeviceInfo`].
struct Wrapper(DeviceInfo);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<DeviceInfo> {
        value.map(|w| w.0)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let farm_id: String = row.try_get("farm_id")?;
        let coop_id: Option<String> = row.try_get("coop_id")?;
        let last_heartbeat: Option<String> = row.try_get("last_heartbeat")?;

        Ok(Self(DeviceInfo {
            id: codec::parse(&id)?,
            farm_id: codec::parse(&farm_id)?,
            coop_id: codec::parse_optional(coop_id)?,
            name: row.try_get("name")?,
            is_online: row.try_get("is_online")?,
            last_heartbeat: codec::parse_optional_timestamp(last_heartbeat)?,
        }))
    }
}

const INSERT: &str = "INSERT INTO devices (id, farm_id, coop_id, name, is_online, last_heartbeat) VALUES (?, ?, ?, ?, ?, ?)";
const SELECT_BY_ID: &str = "SELECT * FROM devices WHERE id = ?";
const UPDATE_STATUS: &str = "UPDATE devices SET is_online = ?, last_heartbeat = ? WHERE id = ?";

/// `SQLite`-backed device directory.
pub struct SqliteDeviceRepository {
    pool: SqlitePool,
}

impl SqliteDeviceRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl DeviceDirectory for SqliteDeviceRepository {
    async fn lookup(&self, id: DeviceId) -> Result<Option<DeviceInfo>, CoopHubError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(Wrapper::maybe(row))
    }

    async fn register(&self, device: DeviceInfo) -> Result<DeviceInfo, CoopHubError> {
        sqlx::query(INSERT)
            .bind(device.id.to_string())
            .bind(device.farm_id.to_string())
            .bind(device.coop_id.map(|id| id.to_string()))
            .bind(&device.name)
            .bind(device.is_online)
            .bind(codec::optional_timestamp(device.last_heartbeat))
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(device)
    }

    async fn set_online(
        &self,
        id: DeviceId,
        is_online: bool,
        at: Timestamp,
    ) -> Result<Option<DeviceInfo>, CoopHubError> {
        let Some(mut device) = self.lookup(id).await? else {
            return Ok(None);
        };
        device.report_status(is_online, at);

        sqlx::query(UPDATE_STATUS)
            .bind(device.is_online)
            .bind(codec::optional_timestamp(device.last_heartbeat))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(Some(device))
    }
}
