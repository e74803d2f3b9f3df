//! JSON REST handlers for schedules and their execution history.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use coophub_app::ports::{CommandSink, DeviceDirectory, ExecutionLog, ScheduleRepository};
use coophub_domain::execution::{ExecutionRecord, ExecutionStatus};
use coophub_domain::id::{CommandId, DeviceId, ExecutionId, FarmId, ScheduleId};
use coophub_domain::schedule::{NewSchedule, SchedulePatch, ScheduleRule};
use coophub_domain::time::now;

use crate::api::parse_id;
use crate::error::ApiError;
use crate::state::AppState;

/// Query string of the list endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub device_id: Option<String>,
    pub limit: Option<u32>,
}

/// Query string of the history endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub days: Option<u32>,
    pub limit: Option<u32>,
}

/// Response body of the history endpoint.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub executions: Vec<ExecutionRecord>,
    pub total: usize,
    pub success_rate: f64,
}

/// Response body of the execute-now endpoint.
#[derive(Debug, Serialize)]
pub struct ExecutionAccepted {
    pub execution_id: ExecutionId,
    pub command_id: Option<CommandId>,
    pub schedule_id: ScheduleId,
    pub status: ExecutionStatus,
}

/// Possible responses from the create endpoint.
pub enum CreateResponse {
    Created(Json<ScheduleRule>),
}

impl IntoResponse for CreateResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Created(json) => (StatusCode::CREATED, json).into_response(),
        }
    }
}

/// Possible responses from the delete endpoint.
pub enum DeleteResponse {
    NoContent,
}

impl IntoResponse for DeleteResponse {
    fn into_response(self) -> Response {
        match self {
            Self::NoContent => StatusCode::NO_CONTENT.into_response(),
        }
    }
}

/// Possible responses from the execute-now endpoint.
pub enum ExecuteResponse {
    Accepted(Json<ExecutionAccepted>),
}

impl IntoResponse for ExecuteResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Accepted(json) => (StatusCode::ACCEPTED, json).into_response(),
        }
    }
}

fn ids(farm_id: &str, id: &str) -> Result<(FarmId, ScheduleId), ApiError> {
    Ok((parse_id(farm_id)?, parse_id(id)?))
}

/// `GET /api/farms/:farm_id/schedules`
pub async fn list<S, L, C, D>(
    State(state): State<AppState<S, L, C, D>>,
    Path(farm_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ScheduleRule>>, ApiError>
where
    S: ScheduleRepository + Send + Sync + 'static,
    L: ExecutionLog + Send + Sync + 'static,
    C: CommandSink + Send + Sync + 'static,
    D: DeviceDirectory + Send + Sync + 'static,
{
    let farm_id: FarmId = parse_id(&farm_id)?;
    let device_id = params.device_id.as_deref().map(parse_id::<DeviceId>).transpose()?;
    let rules = state
        .schedule_service
        .list(farm_id, device_id, params.limit)
        .await?;
    Ok(Json(rules))
}

/// `POST /api/farms/:farm_id/schedules`
pub async fn create<S, L, C, D>(
    State(state): State<AppState<S, L, C, D>>,
    Path(farm_id): Path<String>,
    Json(req): Json<NewSchedule>,
) -> Result<CreateResponse, ApiError>
where
    S: ScheduleRepository + Send + Sync + 'static,
    L: ExecutionLog + Send + Sync + 'static,
    C: CommandSink + Send + Sync + 'static,
    D: DeviceDirectory + Send + Sync + 'static,
{
    let farm_id: FarmId = parse_id(&farm_id)?;
    let rule = state.schedule_service.create(farm_id, req).await?;
    Ok(CreateResponse::Created(Json(rule)))
}

/// `GET /api/farms/:farm_id/schedules/:id`
pub async fn get<S, L, C, D>(
    State(state): State<AppState<S, L, C, D>>,
    Path((farm_id, id)): Path<(String, String)>,
) -> Result<Json<ScheduleRule>, ApiError>
where
    S: ScheduleRepository + Send + Sync + 'static,
    L: ExecutionLog + Send + Sync + 'static,
    C: CommandSink + Send + Sync + 'static,
    D: DeviceDirectory + Send + Sync + 'static,
{
    let (farm_id, id) = ids(&farm_id, &id)?;
    let rule = state.schedule_service.get(farm_id, id).await?;
    Ok(Json(rule))
}

/// `PUT /api/farms/:farm_id/schedules/:id`
pub async fn update<S, L, C, D>(
    State(state): State<AppState<S, L, C, D>>,
    Path((farm_id, id)): Path<(String, String)>,
    Json(patch): Json<SchedulePatch>,
) -> Result<Json<ScheduleRule>, ApiError>
where
    S: ScheduleRepository + Send + Sync + 'static,
    L: ExecutionLog + Send + Sync + 'static,
    C: CommandSink + Send + Sync + 'static,
    D: DeviceDirectory + Send + Sync + 'static,
{
    let (farm_id, id) = ids(&farm_id, &id)?;
    let rule = state.schedule_service.update(farm_id, id, patch).await?;
    Ok(Json(rule))
}

/// `DELETE /api/farms/:farm_id/schedules/:id` — retires the schedule.
pub async fn delete<S, L, C, D>(
    State(state): State<AppState<S, L, C, D>>,
    Path((farm_id, id)): Path<(String, String)>,
) -> Result<DeleteResponse, ApiError>
where
    S: ScheduleRepository + Send + Sync + 'static,
    L: ExecutionLog + Send + Sync + 'static,
    C: CommandSink + Send + Sync + 'static,
    D: DeviceDirectory + Send + Sync + 'static,
{
    let (farm_id, id) = ids(&farm_id, &id)?;
    state.schedule_service.retire(farm_id, id).await?;
    Ok(DeleteResponse::NoContent)
}

/// `GET /api/farms/:farm_id/schedules/:id/executions`
pub async fn executions<S, L, C, D>(
    State(state): State<AppState<S, L, C, D>>,
    Path((farm_id, id)): Path<(String, String)>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError>
where
    S: ScheduleRepository + Send + Sync + 'static,
    L: ExecutionLog + Send + Sync + 'static,
    C: CommandSink + Send + Sync + 'static,
    D: DeviceDirectory + Send + Sync + 'static,
{
    let (farm_id, id) = ids(&farm_id, &id)?;
    let history = state
        .schedule_service
        .history(farm_id, id, params.days, params.limit)
        .await?;
    Ok(Json(HistoryResponse {
        total: history.executions.len(),
        executions: history.executions,
        success_rate: history.success_rate,
    }))
}

/// `POST /api/farms/:farm_id/schedules/:id/execute-now`
pub async fn execute_now<S, L, C, D>(
    State(state): State<AppState<S, L, C, D>>,
    Path((farm_id, id)): Path<(String, String)>,
) -> Result<ExecuteResponse, ApiError>
where
    S: ScheduleRepository + Send + Sync + 'static,
    L: ExecutionLog + Send + Sync + 'static,
    C: CommandSink + Send + Sync + 'static,
    D: DeviceDirectory + Send + Sync + 'static,
{
    let (farm_id, id) = ids(&farm_id, &id)?;
    // Scope check: the schedule must belong to the farm in the path.
    state.schedule_service.get(farm_id, id).await?;
    let record = state.engine.execute_now(id, now()).await?;
    Ok(ExecuteResponse::Accepted(Json(ExecutionAccepted {
        execution_id: record.id,
        command_id: record.command_id,
        schedule_id: record.schedule_id,
        status: record.status,
    })))
}
