//! Farm alerts: accepted and broadcast, never stored.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use coophub_app::ports::{CommandSink, DeviceDirectory, ExecutionLog, ScheduleRepository};
use coophub_domain::event::Event;
use coophub_domain::id::{CoopId, FarmId};

use crate::api::parse_id;
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for raising an alert.
#[derive(Debug, Deserialize)]
pub struct CreateAlertRequest {
    pub coop_id: Option<String>,
    pub alert_type: String,
    #[serde(default = "default_severity")]
    pub severity: String,
    pub message: String,
}

fn default_severity() -> String {
    "info".to_string()
}

#[derive(Debug, Serialize)]
pub struct AlertAccepted {
    /// Subscribers the alert was queued for.
    pub delivered: usize,
}

/// Possible responses from the create endpoint.
pub enum CreateResponse {
    Accepted(Json<AlertAccepted>),
}

impl IntoResponse for CreateResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Accepted(json) => (StatusCode::ACCEPTED, json).into_response(),
        }
    }
}

/// `POST /api/farms/:farm_id/alerts`
pub async fn create<S, L, C, D>(
    State(state): State<AppState<S, L, C, D>>,
    Path(farm_id): Path<String>,
    Json(req): Json<CreateAlertRequest>,
) -> Result<CreateResponse, ApiError>
where
    S: ScheduleRepository + Send + Sync + 'static,
    L: ExecutionLog + Send + Sync + 'static,
    C: CommandSink + Send + Sync + 'static,
    D: DeviceDirectory + Send + Sync + 'static,
{
    let farm_id: FarmId = parse_id(&farm_id)?;
    let coop_id = req.coop_id.as_deref().map(parse_id::<CoopId>).transpose()?;

    let event = Event::alert(farm_id, coop_id, &req.alert_type, &req.severity, &req.message);
    let delivered = state.hub.broadcast(&event);
    tracing::info!(farm_id = %farm_id, alert_type = %req.alert_type, severity = %req.severity, delivered, "alert raised");
    Ok(CreateResponse::Accepted(Json(AlertAccepted { delivered })))
}
