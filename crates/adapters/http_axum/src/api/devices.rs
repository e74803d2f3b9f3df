//! JSON REST handlers for devices.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use coophub_app::ports::{CommandSink, DeviceDirectory, ExecutionLog, ScheduleRepository};
use coophub_domain::command::{CommandType, DeviceCommand};
use coophub_domain::device::DeviceInfo;
use coophub_domain::id::{CoopId, DeviceId, FarmId};

use crate::api::parse_id;
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for registering a device.
#[derive(Debug, Deserialize)]
pub struct CreateDeviceRequest {
    pub name: String,
    pub coop_id: Option<String>,
    #[serde(default)]
    pub is_online: bool,
}

/// Request body for a status report.
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub is_online: bool,
}

/// Request body for a manual command.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command_type: CommandType,
    pub command_value: Option<String>,
    pub duration: Option<u32>,
}

/// Response body of the command endpoint.
#[derive(Debug, Serialize)]
pub struct CommandAccepted {
    #[serde(flatten)]
    pub command: DeviceCommand,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Possible responses from the create endpoint.
pub enum CreateResponse {
    Created(Json<DeviceInfo>),
}

impl IntoResponse for CreateResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Created(json) => (StatusCode::CREATED, json).into_response(),
        }
    }
}

/// Possible responses from the command endpoint.
pub enum CommandResponse {
    Accepted(Json<CommandAccepted>),
}

impl IntoResponse for CommandResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Accepted(json) => (StatusCode::ACCEPTED, json).into_response(),
        }
    }
}

/// `POST /api/farms/:farm_id/devices`
pub async fn create<S, L, C, D>(
    State(state): State<AppState<S, L, C, D>>,
    Path(farm_id): Path<String>,
    Json(req): Json<CreateDeviceRequest>,
) -> Result<CreateResponse, ApiError>
where
    S: ScheduleRepository + Send + Sync + 'static,
    L: ExecutionLog + Send + Sync + 'static,
    C: CommandSink + Send + Sync + 'static,
    D: DeviceDirectory + Send + Sync + 'static,
{
    let farm_id: FarmId = parse_id(&farm_id)?;
    let coop_id = req.coop_id.as_deref().map(parse_id::<CoopId>).transpose()?;

    let device = DeviceInfo::builder()
        .farm_id(farm_id)
        .coop_id(coop_id)
        .name(req.name)
        .online(req.is_online)
        .build()?;
    let created = state.device_service.register(device).await?;
    Ok(CreateResponse::Created(Json(created)))
}

/// `PUT /api/devices/:id/status`
pub async fn update_status<S, L, C, D>(
    State(state): State<AppState<S, L, C, D>>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<DeviceInfo>, ApiError>
where
    S: ScheduleRepository + Send + Sync + 'static,
    L: ExecutionLog + Send + Sync + 'static,
    C: CommandSink + Send + Sync + 'static,
    D: DeviceDirectory + Send + Sync + 'static,
{
    let id: DeviceId = parse_id(&id)?;
    let device = state.device_service.report_status(id, req.is_online).await?;
    Ok(Json(device))
}

/// `POST /api/devices/:id/commands`
pub async fn send_command<S, L, C, D>(
    State(state): State<AppState<S, L, C, D>>,
    Path(id): Path<String>,
    Json(req): Json<CommandRequest>,
) -> Result<CommandResponse, ApiError>
where
    S: ScheduleRepository + Send + Sync + 'static,
    L: ExecutionLog + Send + Sync + 'static,
    C: CommandSink + Send + Sync + 'static,
    D: DeviceDirectory + Send + Sync + 'static,
{
    let id: DeviceId = parse_id(&id)?;
    let receipt = state
        .device_service
        .send_command(id, req.command_type, req.command_value, req.duration)
        .await?;
    Ok(CommandResponse::Accepted(Json(CommandAccepted {
        command: receipt.command,
        warning: receipt.warning,
    })))
}
