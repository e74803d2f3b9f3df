//! Live connection statistics.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use coophub_app::ports::{CommandSink, DeviceDirectory, ExecutionLog, ScheduleRepository};
use coophub_domain::id::FarmId;
use coophub_domain::time::{Timestamp, now};

use crate::state::AppState;

/// Response body of `GET /api/ws/stats`.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_connections: usize,
    pub farms: BTreeMap<FarmId, usize>,
    pub timestamp: Timestamp,
}

/// `GET /api/ws/stats`
pub async fn get<S, L, C, D>(State(state): State<AppState<S, L, C, D>>) -> Json<StatsResponse>
where
    S: ScheduleRepository + Send + Sync + 'static,
    L: ExecutionLog + Send + Sync + 'static,
    C: CommandSink + Send + Sync + 'static,
    D: DeviceDirectory + Send + Sync + 'static,
{
    let stats = state.hub.stats();
    Json(StatsResponse {
        total_connections: stats.total_connections,
        farms: stats.farms,
        timestamp: now(),
    })
}
