//! Shared application state for axum handlers.

use std::sync::Arc;

use coophub_app::hub::ConnectionHub;
use coophub_app::ports::{CommandSink, DeviceDirectory, ExecutionLog, ScheduleRepository};
use coophub_app::schedule_engine::ScheduleEngine;
use coophub_app::services::{CommandDispatcher, DeviceService, ScheduleService};

use crate::ws::WsSettings;

/// Command sink that queues through `C` and announces on the hub.
pub type Dispatcher<C> = CommandDispatcher<Arc<C>, Arc<ConnectionHub>>;

/// Schedule engine wired to the shared repositories and the dispatcher.
pub type Engine<S, L, C> = ScheduleEngine<Arc<S>, Arc<L>, Arc<Dispatcher<C>>>;

/// Schedule service wired to the shared repositories.
pub type Schedules<S, L, D> = ScheduleService<Arc<S>, Arc<L>, Arc<D>>;

/// Device service wired to the shared directory and the dispatcher.
pub type Devices<C, D> = DeviceService<Arc<D>, Arc<Dispatcher<C>>, Arc<ConnectionHub>>;

/// Application state shared across all axum handlers.
///
/// Generic over the schedule repository, execution log, command sink and
/// device directory to avoid dynamic dispatch. `Clone` is implemented
/// manually so the underlying types themselves do not need to be `Clone` —
/// only the `Arc` wrappers are cloned.
pub struct AppState<S, L, C, D> {
    /// Live subscriber registry.
    pub hub: Arc<ConnectionHub>,
    /// Schedule CRUD and history.
    pub schedule_service: Arc<Schedules<S, L, D>>,
    /// Fires schedules; shared with the tick driver.
    pub engine: Arc<Engine<S, L, C>>,
    /// Device registration, status and manual commands.
    pub device_service: Arc<Devices<C, D>>,
    /// Keep-alive timing of WebSocket connections.
    pub ws: WsSettings,
}

impl<S, L, C, D> Clone for AppState<S, L, C, D> {
    fn clone(&self) -> Self {
        Self {
            hub: Arc::clone(&self.hub),
            schedule_service: Arc::clone(&self.schedule_service),
            engine: Arc::clone(&self.engine),
            device_service: Arc::clone(&self.device_service),
            ws: self.ws,
        }
    }
}

impl<S, L, C, D> AppState<S, L, C, D>
where
    S: ScheduleRepository + Send + Sync + 'static,
    L: ExecutionLog + Send + Sync + 'static,
    C: CommandSink + Send + Sync + 'static,
    D: DeviceDirectory + Send + Sync + 'static,
{
    /// Wire the services around the given adapters.
    ///
    /// Every emitted command goes through one [`Dispatcher`], so schedule
    /// firings and manual commands alike are announced on `hub`.
    pub fn new(
        hub: Arc<ConnectionHub>,
        schedules: S,
        executions: L,
        commands: C,
        devices: D,
        ws: WsSettings,
    ) -> Self {
        let schedules = Arc::new(schedules);
        let executions = Arc::new(executions);
        let devices = Arc::new(devices);
        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::new(commands),
            Arc::clone(&hub),
        ));

        Self {
            schedule_service: Arc::new(ScheduleService::new(
                Arc::clone(&schedules),
                Arc::clone(&executions),
                Arc::clone(&devices),
            )),
            engine: Arc::new(ScheduleEngine::new(
                schedules,
                executions,
                Arc::clone(&dispatcher),
            )),
            device_service: Arc::new(DeviceService::new(
                devices,
                dispatcher,
                Arc::clone(&hub),
            )),
            hub,
            ws,
        }
    }
}
