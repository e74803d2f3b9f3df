//! JSON REST API handler modules.

#[allow(clippy::missing_errors_doc)]
pub mod alerts;
#[allow(clippy::missing_errors_doc)]
pub mod devices;
#[allow(clippy::missing_errors_doc)]
pub mod schedules;
pub mod ws_stats;

use std::str::FromStr;

use axum::Router;
use axum::routing::{get, post, put};

use coophub_app::ports::{CommandSink, DeviceDirectory, ExecutionLog, ScheduleRepository};
use coophub_domain::error::ValidationError;

use crate::error::ApiError;
use crate::state::AppState;

/// Build the `/api` sub-router.
pub fn routes<S, L, C, D>() -> Router<AppState<S, L, C, D>>
where
    S: ScheduleRepository + Send + Sync + 'static,
    L: ExecutionLog + Send + Sync + 'static,
    C: CommandSink + Send + Sync + 'static,
    D: DeviceDirectory + Send + Sync + 'static,
{
    Router::new()
        // Hub
        .route("/ws/stats", get(ws_stats::get::<S, L, C, D>))
        // Schedules
        .route(
            "/farms/{farm_id}/schedules",
            get(schedules::list::<S, L, C, D>).post(schedules::create::<S, L, C, D>),
        )
        .route(
            "/farms/{farm_id}/schedules/{id}",
            get(schedules::get::<S, L, C, D>)
                .put(schedules::update::<S, L, C, D>)
                .delete(schedules::delete::<S, L, C, D>),
        )
        .route(
            "/farms/{farm_id}/schedules/{id}/executions",
            get(schedules::executions::<S, L, C, D>),
        )
        .route(
            "/farms/{farm_id}/schedules/{id}/execute-now",
            post(schedules::execute_now::<S, L, C, D>),
        )
        // Devices
        .route("/farms/{farm_id}/devices", post(devices::create::<S, L, C, D>))
        .route("/devices/{id}/status", put(devices::update_status::<S, L, C, D>))
        .route("/devices/{id}/commands", post(devices::send_command::<S, L, C, D>))
        // Alerts
        .route("/farms/{farm_id}/alerts", post(alerts::create::<S, L, C, D>))
}

/// Parse an identifier taken from the path or the body.
pub(crate) fn parse_id<T: FromStr>(raw: &str) -> Result<T, ApiError> {
    T::from_str(raw).map_err(|_| ApiError::from(ValidationError::InvalidId(raw.to_string())))
}
