//! `SQLite` implementation of [`ScheduleRepository`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use coophub_app::ports::ScheduleRepository;
use coophub_domain::error::{CoopHubError, NotFoundError};
use coophub_domain::id::{DeviceId, FarmId, ScheduleId};
use coophub_domain::schedule::{
    ActionStep, ScheduleKind, ScheduleKindParts, ScheduleProgress, ScheduleRule,
};
use coophub_domain::time::Timestamp;

use crate::codec;
use crate::error::StorageError;

struct Wrapper(ScheduleRule);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<ScheduleRule> {
        value.map(|w| w.0)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let farm_id: String = row.try_get("farm_id")?;
        let coop_id: Option<String> = row.try_get("coop_id")?;
        let device_id: String = row.try_get("device_id")?;
        let condition_json: Option<String> = row.try_get("condition_json")?;
        let action: String = row.try_get("action")?;
        let action_duration: Option<i64> = row.try_get("action_duration")?;
        let action_sequence: Option<String> = row.try_get("action_sequence")?;
        let next_execution: Option<String> = row.try_get("next_execution")?;
        let last_execution: Option<String> = row.try_get("last_execution")?;
        let execution_count: i64 = row.try_get("execution_count")?;
        let duty_phase: Option<String> = row.try_get("duty_phase")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;

        let condition = condition_json
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(codec::decode_error)?;
        let parts = ScheduleKindParts {
            schedule_type: row.try_get("schedule_type")?,
            cron_expression: row.try_get("cron_expression")?,
            on_duration: row.try_get("on_duration")?,
            off_duration: row.try_get("off_duration")?,
            condition,
        };
        let kind = ScheduleKind::try_from(parts).map_err(codec::decode_error)?;
        let action_sequence: Option<Vec<ActionStep>> = action_sequence
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(codec::decode_error)?;

        Ok(Self(ScheduleRule {
            id: codec::parse(&id)?,
            farm_id: codec::parse(&farm_id)?,
            coop_id: codec::parse_optional(coop_id)?,
            device_id: codec::parse(&device_id)?,
            name: row.try_get("name")?,
            kind,
            action: codec::parse(&action)?,
            action_value: row.try_get("action_value")?,
            action_duration: codec::parse_seconds(action_duration)?,
            action_sequence,
            priority: row.try_get("priority")?,
            is_active: row.try_get("is_active")?,
            next_execution: codec::parse_optional_timestamp(next_execution)?,
            last_execution: codec::parse_optional_timestamp(last_execution)?,
            execution_count: codec::parse_count(execution_count)?,
            duty_phase: codec::parse_optional(duty_phase)?,
            created_at: codec::parse_timestamp(&created_at)?,
            updated_at: codec::parse_timestamp(&updated_at)?,
        }))
    }
}

const INSERT: &str = "INSERT INTO device_schedules (id, farm_id, coop_id, device_id, name, schedule_type, cron_expression, on_duration, off_duration, condition_json, action, action_value, action_duration, action_sequence, priority, is_active, next_execution, last_execution, execution_count, duty_phase, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
const SELECT_BY_ID: &str = "SELECT * FROM device_schedules WHERE id = ?";
const SELECT_BY_FARM: &str = "SELECT * FROM device_schedules WHERE farm_id = ? AND is_active = 1 AND (? IS NULL OR device_id = ?) ORDER BY priority DESC, created_at DESC LIMIT ?";
const SELECT_DUE: &str = "SELECT * FROM device_schedules WHERE is_active = 1 AND next_execution IS NOT NULL AND next_execution <= ? ORDER BY next_execution";
const UPDATE: &str = "UPDATE device_schedules SET coop_id = ?, name = ?, schedule_type = ?, cron_expression = ?, on_duration = ?, off_duration = ?, condition_json = ?, action = ?, action_value = ?, action_duration = ?, action_sequence = ?, priority = ?, is_active = ?, next_execution = ?, last_execution = ?, execution_count = ?, duty_phase = ?, updated_at = ? WHERE id = ?";

// Timing columns only move for ?12 and while the stored kind is still
// ?3..?6; a retired row never matches.
const RECORD_PROGRESS: &str = "UPDATE device_schedules SET \
    last_execution = CASE WHEN ?1 THEN ?2 ELSE last_execution END, \
    execution_count = execution_count + ?1, \
    next_execution = CASE WHEN ?12 AND schedule_type = ?3 AND cron_expression IS ?4 AND on_duration IS ?5 AND off_duration IS ?6 THEN ?7 ELSE next_execution END, \
    duty_phase = CASE WHEN ?12 AND schedule_type = ?3 AND cron_expression IS ?4 AND on_duration IS ?5 AND off_duration IS ?6 THEN ?8 ELSE duty_phase END, \
    is_active = CASE WHEN ?12 AND schedule_type = ?3 AND cron_expression IS ?4 AND on_duration IS ?5 AND off_duration IS ?6 THEN ?9 ELSE is_active END, \
    updated_at = ?10 \
    WHERE id = ?11 AND is_active = 1";

/// Column values derived from the rule's kind and action sequence.
struct Columns {
    kind: ScheduleKindParts,
    condition_json: Option<String>,
    action_sequence: Option<String>,
}

impl Columns {
    fn of(rule: &ScheduleRule) -> Result<Self, StorageError> {
        let kind = ScheduleKindParts::from(&rule.kind);
        let condition_json = kind.condition.as_ref().map(serde_json::to_string).transpose()?;
        let action_sequence = rule
            .action_sequence
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        Ok(Self {
            kind,
            condition_json,
            action_sequence,
        })
    }
}

/// `SQLite`-backed schedule repository.
pub struct SqliteScheduleRepository {
    pool: SqlitePool,
}

impl SqliteScheduleRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl ScheduleRepository for SqliteScheduleRepository {
    async fn create(&self, rule: ScheduleRule) -> Result<ScheduleRule, CoopHubError> {
        let columns = Columns::of(&rule)?;

        sqlx::query(INSERT)
            .bind(rule.id.to_string())
            .bind(rule.farm_id.to_string())
            .bind(rule.coop_id.map(|id| id.to_string()))
            .bind(rule.device_id.to_string())
            .bind(&rule.name)
            .bind(&columns.kind.schedule_type)
            .bind(&columns.kind.cron_expression)
            .bind(columns.kind.on_duration)
            .bind(columns.kind.off_duration)
            .bind(&columns.condition_json)
            .bind(rule.action.to_string())
            .bind(&rule.action_value)
            .bind(rule.action_duration.map(i64::from))
            .bind(&columns.action_sequence)
            .bind(rule.priority)
            .bind(rule.is_active)
            .bind(codec::optional_timestamp(rule.next_execution))
            .bind(codec::optional_timestamp(rule.last_execution))
            .bind(codec::count(rule.execution_count))
            .bind(rule.duty_phase.map(|phase| phase.to_string()))
            .bind(codec::timestamp(rule.created_at))
            .bind(codec::timestamp(rule.updated_at))
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(rule)
    }

    async fn get_by_id(&self, id: ScheduleId) -> Result<Option<ScheduleRule>, CoopHubError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(Wrapper::maybe(row))
    }

    async fn list_by_farm(
        &self,
        farm_id: FarmId,
        device_id: Option<DeviceId>,
        limit: u32,
    ) -> Result<Vec<ScheduleRule>, CoopHubError> {
        let device_id = device_id.map(|id| id.to_string());
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_BY_FARM)
            .bind(farm_id.to_string())
            .bind(&device_id)
            .bind(&device_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn get_due(&self, now: Timestamp) -> Result<Vec<ScheduleRule>, CoopHubError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_DUE)
            .bind(codec::timestamp(now))
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn update(&self, rule: ScheduleRule) -> Result<ScheduleRule, CoopHubError> {
        let columns = Columns::of(&rule)?;

        let result = sqlx::query(UPDATE)
            .bind(rule.coop_id.map(|id| id.to_string()))
            .bind(&rule.name)
            .bind(&columns.kind.schedule_type)
            .bind(&columns.kind.cron_expression)
            .bind(columns.kind.on_duration)
            .bind(columns.kind.off_duration)
            .bind(&columns.condition_json)
            .bind(rule.action.to_string())
            .bind(&rule.action_value)
            .bind(rule.action_duration.map(i64::from))
            .bind(&columns.action_sequence)
            .bind(rule.priority)
            .bind(rule.is_active)
            .bind(codec::optional_timestamp(rule.next_execution))
            .bind(codec::optional_timestamp(rule.last_execution))
            .bind(codec::count(rule.execution_count))
            .bind(rule.duty_phase.map(|phase| phase.to_string()))
            .bind(codec::timestamp(rule.updated_at))
            .bind(rule.id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        if result.rows_affected() == 0 {
            return Err(NotFoundError {
                entity: "Schedule",
                id: rule.id.to_string(),
            }
            .into());
        }
        Ok(rule)
    }

    async fn record_progress(&self, progress: ScheduleProgress) -> Result<bool, CoopHubError> {
        let kind = ScheduleKindParts::from(&progress.kind);

        let result = sqlx::query(RECORD_PROGRESS)
            .bind(i64::from(progress.fired))
            .bind(codec::optional_timestamp(progress.last_execution))
            .bind(&kind.schedule_type)
            .bind(&kind.cron_expression)
            .bind(kind.on_duration)
            .bind(kind.off_duration)
            .bind(codec::optional_timestamp(progress.next_execution))
            .bind(progress.duty_phase.map(|phase| phase.to_string()))
            .bind(progress.is_active)
            .bind(codec::timestamp(progress.updated_at))
            .bind(progress.id.to_string())
            .bind(progress.reschedules)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Config;
    use chrono::{TimeZone, Utc};
    use coophub_domain::command::CommandType;
    use coophub_domain::schedule::{DutyPhase, Firing};

    async fn setup() -> SqliteScheduleRepository {
        let db = Config {
            database_url: "sqlite::memory:".to_string(),
        }
        .build()
        .await
        .unwrap();
        SqliteScheduleRepository::new(db.pool().clone())
    }

    fn at(h: u32, m: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2026, 2, 19, h, m, 0).unwrap()
    }

    fn lights(farm: FarmId, priority: i32, created_at: Timestamp) -> ScheduleRule {
        ScheduleRule::builder()
            .farm_id(farm)
            .device_id(DeviceId::new())
            .name("Morning lights")
            .kind(ScheduleKind::TimeBased {
                cron_expression: "0 6 * * *".parse().unwrap(),
            })
            .priority(priority)
            .created_at(created_at)
            .build()
            .unwrap()
    }

    fn fan(farm: FarmId, created_at: Timestamp) -> ScheduleRule {
        ScheduleRule::builder()
            .farm_id(farm)
            .device_id(DeviceId::new())
            .name("Ventilation cycle")
            .kind(ScheduleKind::DurationBased {
                on_duration: 1800,
                off_duration: 600,
            })
            .action(CommandType::SetValue)
            .action_value(Some("75".to_string()))
            .action_sequence(Some(vec![ActionStep {
                action: CommandType::On,
                value: None,
                duration: 60,
            }]))
            .created_at(created_at)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn should_create_and_retrieve_time_based_schedule() {
        let repo = setup().await;
        let rule = lights(FarmId::new(), 0, at(7, 0));

        repo.create(rule.clone()).await.unwrap();
        let fetched = repo.get_by_id(rule.id).await.unwrap().unwrap();

        assert_eq!(fetched, rule);
    }

    #[tokio::test]
    async fn should_preserve_duration_kind_and_action_sequence() {
        let repo = setup().await;
        let mut rule = fan(FarmId::new(), at(7, 0));
        rule.advance(Firing::Scheduled, at(7, 0)).unwrap();

        repo.create(rule.clone()).await.unwrap();
        let fetched = repo.get_by_id(rule.id).await.unwrap().unwrap();

        assert_eq!(fetched, rule);
        assert_eq!(fetched.duty_phase, Some(DutyPhase::On));
    }

    #[tokio::test]
    async fn should_preserve_condition_document() {
        let repo = setup().await;
        let mut rule = lights(FarmId::new(), 0, at(7, 0));
        rule.kind = ScheduleKind::ConditionBased {
            condition: serde_json::json!({"sensor": "temperature", "above": 30}),
        };
        rule.next_execution = None;

        repo.create(rule.clone()).await.unwrap();
        let fetched = repo.get_by_id(rule.id).await.unwrap().unwrap();

        assert_eq!(fetched.kind, rule.kind);
        assert!(fetched.next_execution.is_none());
    }

    #[tokio::test]
    async fn should_return_none_when_schedule_not_found() {
        let repo = setup().await;
        assert!(repo.get_by_id(ScheduleId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_list_active_schedules_of_farm_by_priority_then_newest() {
        let repo = setup().await;
        let farm = FarmId::new();
        let old_low = lights(farm, 1, at(7, 0));
        let new_low = lights(farm, 1, at(8, 0));
        let high = lights(farm, 9, at(6, 0));
        let mut retired = lights(farm, 20, at(6, 0));
        retired.deactivate(at(6, 30));
        let other_farm = lights(FarmId::new(), 5, at(6, 0));
        for rule in [&old_low, &new_low, &high, &retired, &other_farm] {
            repo.create(rule.clone()).await.unwrap();
        }

        let listed = repo.list_by_farm(farm, None, 50).await.unwrap();

        let ids: Vec<ScheduleId> = listed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![high.id, new_low.id, old_low.id]);
    }

    #[tokio::test]
    async fn should_filter_list_by_device_and_apply_limit() {
        let repo = setup().await;
        let farm = FarmId::new();
        let first = lights(farm, 0, at(7, 0));
        let mut second = lights(farm, 0, at(8, 0));
        second.device_id = first.device_id;
        let unrelated = lights(farm, 0, at(9, 0));
        for rule in [&first, &second, &unrelated] {
            repo.create(rule.clone()).await.unwrap();
        }

        let by_device = repo
            .list_by_farm(farm, Some(first.device_id), 50)
            .await
            .unwrap();
        assert_eq!(by_device.len(), 2);

        let limited = repo.list_by_farm(farm, None, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn should_return_only_active_due_schedules() {
        let repo = setup().await;
        let farm = FarmId::new();
        let mut due = lights(farm, 0, at(5, 0));
        due.next_execution = Some(at(6, 0));
        let mut later = lights(farm, 0, at(5, 0));
        later.next_execution = Some(at(18, 0));
        let mut inactive = lights(farm, 0, at(5, 0));
        inactive.is_active = false;
        inactive.next_execution = Some(at(6, 0));
        let mut condition = lights(farm, 0, at(5, 0));
        condition.kind = ScheduleKind::ConditionBased {
            condition: serde_json::json!({}),
        };
        condition.next_execution = None;
        for rule in [&due, &later, &inactive, &condition] {
            repo.create(rule.clone()).await.unwrap();
        }

        let result = repo.get_due(at(6, 0)).await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, due.id);
    }

    #[tokio::test]
    async fn should_update_schedule_state() {
        let repo = setup().await;
        let mut rule = lights(FarmId::new(), 0, at(5, 0));
        repo.create(rule.clone()).await.unwrap();

        rule.advance(Firing::Scheduled, at(6, 0)).unwrap();
        rule.priority = 3;
        repo.update(rule.clone()).await.unwrap();

        let fetched = repo.get_by_id(rule.id).await.unwrap().unwrap();
        assert_eq!(fetched.execution_count, 1);
        assert_eq!(fetched.last_execution, Some(at(6, 0)));
        assert_eq!(fetched.priority, 3);
        assert_eq!(fetched, rule);
    }

    #[tokio::test]
    async fn should_record_progress_without_touching_edited_fields() {
        let repo = setup().await;
        let rule = lights(FarmId::new(), 0, at(5, 0));
        repo.create(rule.clone()).await.unwrap();
        let mut fired = rule.clone();
        fired.advance(Firing::Scheduled, at(6, 0)).unwrap();

        let mut edited = rule.clone();
        edited.name = "Dawn lights".to_string();
        edited.priority = 7;
        repo.update(edited).await.unwrap();

        assert!(repo.record_progress(fired.progress(Some(Firing::Scheduled))).await.unwrap());

        let fetched = repo.get_by_id(rule.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Dawn lights");
        assert_eq!(fetched.priority, 7);
        assert_eq!(fetched.execution_count, 1);
        assert_eq!(fetched.last_execution, Some(at(6, 0)));
        assert_eq!(fetched.next_execution, fired.next_execution);
    }

    #[tokio::test]
    async fn should_keep_retired_schedule_inactive_when_progress_arrives() {
        let repo = setup().await;
        let farm = FarmId::new();
        let mut rule = lights(farm, 0, at(5, 0));
        rule.next_execution = Some(at(6, 0));
        repo.create(rule.clone()).await.unwrap();
        let snapshot = repo.get_due(at(6, 0)).await.unwrap().remove(0);

        let mut retired = rule.clone();
        retired.deactivate(at(6, 0));
        repo.update(retired).await.unwrap();

        let mut fired = snapshot;
        fired.advance(Firing::Scheduled, at(6, 0)).unwrap();
        assert!(!repo.record_progress(fired.progress(Some(Firing::Scheduled))).await.unwrap());

        let fetched = repo.get_by_id(rule.id).await.unwrap().unwrap();
        assert!(!fetched.is_active);
        assert!(fetched.next_execution.is_none());
        assert_eq!(fetched.execution_count, 0);
        assert!(repo.get_due(at(23, 0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_keep_rescheduled_timing_when_kind_changed_during_firing() {
        let repo = setup().await;
        let rule = fan(FarmId::new(), at(5, 0));
        repo.create(rule.clone()).await.unwrap();
        let mut fired = rule.clone();
        fired.advance(Firing::Scheduled, at(5, 0)).unwrap();

        let mut edited = rule.clone();
        edited.kind = ScheduleKind::TimeBased {
            cron_expression: "0 18 * * *".parse().unwrap(),
        };
        edited.duty_phase = None;
        edited.reschedule(at(5, 1)).unwrap();
        repo.update(edited).await.unwrap();

        assert!(repo.record_progress(fired.progress(Some(Firing::Scheduled))).await.unwrap());

        let fetched = repo.get_by_id(rule.id).await.unwrap().unwrap();
        assert_eq!(fetched.next_execution, Some(at(18, 0)));
        assert!(fetched.duty_phase.is_none());
        assert!(fetched.is_active);
        assert_eq!(fetched.execution_count, 1);
    }

    #[tokio::test]
    async fn should_leave_timing_alone_when_recording_manual_firing() {
        let repo = setup().await;
        let rule = lights(FarmId::new(), 0, at(5, 0));
        repo.create(rule.clone()).await.unwrap();
        let mut manual = rule.clone();
        manual.next_execution = Some(at(5, 30));
        manual.advance(Firing::Manual, at(5, 30)).unwrap();

        assert!(repo.record_progress(manual.progress(Some(Firing::Manual))).await.unwrap());

        let fetched = repo.get_by_id(rule.id).await.unwrap().unwrap();
        assert_eq!(fetched.execution_count, 1);
        assert_eq!(fetched.last_execution, Some(at(5, 30)));
        assert_eq!(fetched.next_execution, rule.next_execution);
    }

    #[tokio::test]
    async fn should_record_deferral_without_counting_it() {
        let repo = setup().await;
        let mut rule = lights(FarmId::new(), 0, at(5, 0));
        rule.next_execution = Some(at(6, 0));
        repo.create(rule.clone()).await.unwrap();

        let mut deferred = rule.clone();
        deferred.defer(at(6, 0)).unwrap();
        assert!(repo.record_progress(deferred.progress(None)).await.unwrap());

        let fetched = repo.get_by_id(rule.id).await.unwrap().unwrap();
        assert_eq!(fetched.execution_count, 0);
        assert!(fetched.last_execution.is_none());
        assert_eq!(fetched.next_execution, deferred.next_execution);
    }

    #[tokio::test]
    async fn should_report_missing_schedule_when_recording_progress() {
        let repo = setup().await;
        let rule = lights(FarmId::new(), 0, at(5, 0));
        assert!(!repo.record_progress(rule.progress(Some(Firing::Scheduled))).await.unwrap());
    }

    #[tokio::test]
    async fn should_return_not_found_when_updating_missing_schedule() {
        let repo = setup().await;
        let result = repo.update(lights(FarmId::new(), 0, at(5, 0))).await;
        assert!(matches!(result, Err(CoopHubError::NotFound(_))));
    }
}
