//! In-memory port implementations shared by the unit tests of this crate.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use coophub_domain::command::DeviceCommand;
use coophub_domain::device::DeviceInfo;
use coophub_domain::error::CoopHubError;
use coophub_domain::event::Event;
use coophub_domain::execution::ExecutionRecord;
use coophub_domain::id::{DeviceId, FarmId, ScheduleId};
use coophub_domain::schedule::{ScheduleProgress, ScheduleRule};
use coophub_domain::time::Timestamp;

use crate::ports::{CommandSink, DeviceDirectory, EventPublisher, ExecutionLog, ScheduleRepository};

#[derive(Clone, Default)]
pub struct InMemorySchedules {
    store: Arc<Mutex<HashMap<ScheduleId, ScheduleRule>>>,
}

impl InMemorySchedules {
    pub fn with(rules: Vec<ScheduleRule>) -> Self {
        let repo = Self::default();
        {
            let mut store = repo.store.lock().unwrap();
            for rule in rules {
                store.insert(rule.id, rule);
            }
        }
        repo
    }

    pub fn get(&self, id: ScheduleId) -> ScheduleRule {
        self.store.lock().unwrap().get(&id).cloned().unwrap()
    }
}

impl ScheduleRepository for InMemorySchedules {
    fn create(
        &self,
        rule: ScheduleRule,
    ) -> impl Future<Output = Result<ScheduleRule, CoopHubError>> + Send {
        self.store.lock().unwrap().insert(rule.id, rule.clone());
        async { Ok(rule) }
    }

    fn get_by_id(
        &self,
        id: ScheduleId,
    ) -> impl Future<Output = Result<Option<ScheduleRule>, CoopHubError>> + Send {
        let result = self.store.lock().unwrap().get(&id).cloned();
        async { Ok(result) }
    }

    fn list_by_farm(
        &self,
        farm_id: FarmId,
        device_id: Option<DeviceId>,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<ScheduleRule>, CoopHubError>> + Send {
        let mut result: Vec<ScheduleRule> = self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.farm_id == farm_id && r.is_active)
            .filter(|r| device_id.is_none_or(|d| r.device_id == d))
            .cloned()
            .collect();
        result.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.created_at.cmp(&a.created_at))
        });
        result.truncate(limit as usize);
        async { Ok(result) }
    }

    fn get_due(
        &self,
        now: Timestamp,
    ) -> impl Future<Output = Result<Vec<ScheduleRule>, CoopHubError>> + Send {
        let result: Vec<ScheduleRule> = self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.is_due(now))
            .cloned()
            .collect();
        async { Ok(result) }
    }

    fn update(
        &self,
        rule: ScheduleRule,
    ) -> impl Future<Output = Result<ScheduleRule, CoopHubError>> + Send {
        self.store.lock().unwrap().insert(rule.id, rule.clone());
        async { Ok(rule) }
    }

    fn record_progress(
        &self,
        progress: ScheduleProgress,
    ) -> impl Future<Output = Result<bool, CoopHubError>> + Send {
        let applied = self
            .store
            .lock()
            .unwrap()
            .get_mut(&progress.id)
            .is_some_and(|rule| progress.apply_to(rule));
        async move { Ok(applied) }
    }
}

/// Execution log that records appends, or rejects them all when `failing`.
#[derive(Clone, Default)]
pub struct InMemoryExecutions {
    records: Arc<Mutex<Vec<ExecutionRecord>>>,
    failing: bool,
}

impl InMemoryExecutions {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn all(&self) -> Vec<ExecutionRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn for_schedule(&self, id: ScheduleId) -> Vec<ExecutionRecord> {
        self.all()
            .into_iter()
            .filter(|r| r.schedule_id == id)
            .collect()
    }
}

impl ExecutionLog for InMemoryExecutions {
    fn append(
        &self,
        record: ExecutionRecord,
    ) -> impl Future<Output = Result<ExecutionRecord, CoopHubError>> + Send {
        let result = if self.failing {
            Err(CoopHubError::Storage(Box::new(StoreDown)))
        } else {
            self.records.lock().unwrap().push(record.clone());
            Ok(record)
        };
        async { result }
    }

    fn find_by_schedule(
        &self,
        schedule_id: ScheduleId,
        since: Timestamp,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<ExecutionRecord>, CoopHubError>> + Send {
        let mut result: Vec<ExecutionRecord> = self
            .for_schedule(schedule_id)
            .into_iter()
            .filter(|r| r.scheduled_time >= since)
            .collect();
        result.sort_by(|a, b| b.scheduled_time.cmp(&a.scheduled_time));
        result.truncate(limit as usize);
        async { Ok(result) }
    }
}

/// Command sink that records commands, or rejects them all when `failing`.
#[derive(Clone, Default)]
pub struct InMemoryCommands {
    commands: Arc<Mutex<Vec<DeviceCommand>>>,
    failing: bool,
}

impl InMemoryCommands {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn all(&self) -> Vec<DeviceCommand> {
        self.commands.lock().unwrap().clone()
    }
}

#[derive(Debug)]
struct BrokerDown;

#[derive(Debug)]
struct StoreDown;

impl std::fmt::Display for StoreDown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("execution log unavailable")
    }
}

impl std::error::Error for StoreDown {}

impl std::fmt::Display for BrokerDown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("broker unreachable")
    }
}

impl std::error::Error for BrokerDown {}

impl CommandSink for InMemoryCommands {
    fn persist(
        &self,
        command: DeviceCommand,
    ) -> impl Future<Output = Result<DeviceCommand, CoopHubError>> + Send {
        let result = if self.failing {
            Err(CoopHubError::Storage(Box::new(BrokerDown)))
        } else {
            self.commands.lock().unwrap().push(command.clone());
            Ok(command)
        };
        async { result }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryDevices {
    store: Arc<Mutex<HashMap<DeviceId, DeviceInfo>>>,
}

impl InMemoryDevices {
    pub fn with(devices: Vec<DeviceInfo>) -> Self {
        let repo = Self::default();
        {
            let mut store = repo.store.lock().unwrap();
            for device in devices {
                store.insert(device.id, device);
            }
        }
        repo
    }
}

impl DeviceDirectory for InMemoryDevices {
    fn lookup(
        &self,
        id: DeviceId,
    ) -> impl Future<Output = Result<Option<DeviceInfo>, CoopHubError>> + Send {
        let result = self.store.lock().unwrap().get(&id).cloned();
        async { Ok(result) }
    }

    fn register(
        &self,
        device: DeviceInfo,
    ) -> impl Future<Output = Result<DeviceInfo, CoopHubError>> + Send {
        self.store.lock().unwrap().insert(device.id, device.clone());
        async { Ok(device) }
    }

    fn set_online(
        &self,
        id: DeviceId,
        is_online: bool,
        at: Timestamp,
    ) -> impl Future<Output = Result<Option<DeviceInfo>, CoopHubError>> + Send {
        let result = self.store.lock().unwrap().get_mut(&id).map(|device| {
            device.report_status(is_online, at);
            device.clone()
        });
        async { Ok(result) }
    }
}

#[derive(Clone, Default)]
pub struct RecordingPublisher {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), CoopHubError>> + Send {
        self.events.lock().unwrap().push(event);
        async { Ok(()) }
    }
}
