//! In-memory adapters backing the router tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use coophub_app::hub::ConnectionHub;
use coophub_app::ports::{CommandSink, DeviceDirectory, ExecutionLog, ScheduleRepository};
use coophub_domain::command::DeviceCommand;
use coophub_domain::device::DeviceInfo;
use coophub_domain::error::CoopHubError;
use coophub_domain::execution::ExecutionRecord;
use coophub_domain::id::{DeviceId, FarmId, ScheduleId};
use coophub_domain::schedule::{ScheduleProgress, ScheduleRule};
use coophub_domain::time::Timestamp;

use crate::state::AppState;
use crate::ws::WsSettings;

#[derive(Default)]
pub struct MemSchedules(Mutex<HashMap<ScheduleId, ScheduleRule>>);

impl ScheduleRepository for MemSchedules {
    async fn create(&self, rule: ScheduleRule) -> Result<ScheduleRule, CoopHubError> {
        self.0.lock().unwrap().insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn get_by_id(&self, id: ScheduleId) -> Result<Option<ScheduleRule>, CoopHubError> {
        Ok(self.0.lock().unwrap().get(&id).cloned())
    }

    async fn list_by_farm(
        &self,
        farm_id: FarmId,
        device_id: Option<DeviceId>,
        limit: u32,
    ) -> Result<Vec<ScheduleRule>, CoopHubError> {
        let mut rules: Vec<ScheduleRule> = self
            .0
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.farm_id == farm_id && r.is_active)
            .filter(|r| device_id.is_none_or(|d| r.device_id == d))
            .cloned()
            .collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(b.created_at.cmp(&a.created_at)));
        rules.truncate(limit as usize);
        Ok(rules)
    }

    async fn get_due(&self, now: Timestamp) -> Result<Vec<ScheduleRule>, CoopHubError> {
        Ok(self
            .0
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.is_due(now))
            .cloned()
            .collect())
    }

    async fn update(&self, rule: ScheduleRule) -> Result<ScheduleRule, CoopHubError> {
        self.0.lock().unwrap().insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn record_progress(&self, progress: ScheduleProgress) -> Result<bool, CoopHubError> {
        Ok(self
            .0
            .lock()
            .unwrap()
            .get_mut(&progress.id)
            .is_some_and(|rule| progress.apply_to(rule)))
    }
}

#[derive(Default)]
pub struct MemExecutions(Mutex<Vec<ExecutionRecord>>);

impl ExecutionLog for MemExecutions {
    async fn append(&self, record: ExecutionRecord) -> Result<ExecutionRecord, CoopHubError> {
        self.0.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn find_by_schedule(
        &self,
        schedule_id: ScheduleId,
        since: Timestamp,
        limit: u32,
    ) -> Result<Vec<ExecutionRecord>, CoopHubError> {
        let mut records: Vec<ExecutionRecord> = self
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.schedule_id == schedule_id && r.scheduled_time >= since)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.scheduled_time.cmp(&a.scheduled_time));
        records.truncate(limit as usize);
        Ok(records)
    }
}

#[derive(Default)]
pub struct MemCommands(Mutex<Vec<DeviceCommand>>);

impl CommandSink for MemCommands {
    async fn persist(&self, command: DeviceCommand) -> Result<DeviceCommand, CoopHubError> {
        self.0.lock().unwrap().push(command.clone());
        Ok(command)
    }
}

#[derive(Default)]
pub struct MemDevices(Mutex<HashMap<DeviceId, DeviceInfo>>);

impl DeviceDirectory for MemDevices {
    async fn lookup(&self, id: DeviceId) -> Result<Option<DeviceInfo>, CoopHubError> {
        Ok(self.0.lock().unwrap().get(&id).cloned())
    }

    async fn register(&self, device: DeviceInfo) -> Result<DeviceInfo, CoopHubError> {
        self.0.lock().unwrap().insert(device.id, device.clone());
        Ok(device)
    }

    async fn set_online(
        &self,
        id: DeviceId,
        is_online: bool,
        at: Timestamp,
    ) -> Result<Option<DeviceInfo>, CoopHubError> {
        Ok(self.0.lock().unwrap().get_mut(&id).map(|device| {
            device.report_status(is_online, at);
            device.clone()
        }))
    }
}

pub type TestState = AppState<MemSchedules, MemExecutions, MemCommands, MemDevices>;

pub fn state() -> TestState {
    AppState::new(
        Arc::new(ConnectionHub::new(16)),
        MemSchedules::default(),
        MemExecutions::default(),
        MemCommands::default(),
        MemDevices::default(),
        WsSettings::default(),
    )
}

/// Register an offline device of `farm_id`.
pub async fn device(state: &TestState, farm_id: FarmId) -> DeviceInfo {
    let device = DeviceInfo::builder()
        .farm_id(farm_id)
        .name("Coop lights")
        .build()
        .unwrap();
    state.device_service.register(device).await.unwrap()
}
