//! WebSocket endpoint — one live subscriber of the connection hub per socket.
//!
//! Each connection runs two independent tasks:
//!
//! - the **read loop** parses inbound text frames as control messages and
//!   hands them to the hub; any inbound frame counts as a sign of life;
//! - the **write loop** drains the subscriber's outbound queue to the socket
//!   and sends a Ping every `ping_interval`, giving up once nothing was heard
//!   for `pong_timeout`.
//!
//! Whichever loop ends first ends the connection; the subscriber is then
//! unregistered.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use coophub_app::hub::{ConnectionHub, Frame, SubscriberHandle};
use coophub_app::ports::{CommandSink, DeviceDirectory, ExecutionLog, ScheduleRepository};
use coophub_domain::error::ValidationError;
use coophub_domain::event::ControlMessage;
use coophub_domain::id::{CoopId, FarmId, SubscriberId};
use coophub_domain::time::{Timestamp, now};

use crate::error::ApiError;
use crate::state::AppState;

/// Keep-alive timing of WebSocket connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WsSettings {
    /// How often a Ping frame is sent.
    pub ping_interval: Duration,
    /// How long a silent connection is kept.
    pub pong_timeout: Duration,
}

impl Default for WsSettings {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
        }
    }
}

/// Query string of the upgrade request.
#[derive(Debug, Deserialize)]
pub struct SubscribeParams {
    pub farm_id: Option<String>,
    pub coop_id: Option<String>,
}

impl SubscribeParams {
    fn scope(&self) -> Result<(FarmId, Option<CoopId>), ValidationError> {
        let farm_id = self
            .farm_id
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| ValidationError::InvalidId("farm_id is required".to_string()))?;
        let farm_id =
            FarmId::from_str(farm_id).map_err(|_| ValidationError::InvalidId(farm_id.to_string()))?;
        let coop_id = self
            .coop_id
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(|raw| CoopId::from_str(raw).map_err(|_| ValidationError::InvalidId(raw.to_string())))
            .transpose()?;
        Ok((farm_id, coop_id))
    }
}

/// `GET /ws?farm_id=&coop_id=`
///
/// The scope is checked before the upgrade: a missing or malformed
/// `farm_id` is a `400`.
pub async fn upgrade<S, L, C, D>(
    State(state): State<AppState<S, L, C, D>>,
    Query(params): Query<SubscribeParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError>
where
    S: ScheduleRepository + Send + Sync + 'static,
    L: ExecutionLog + Send + Sync + 'static,
    C: CommandSink + Send + Sync + 'static,
    D: DeviceDirectory + Send + Sync + 'static,
{
    let (farm_id, coop_id) = params.scope()?;
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let hub = Arc::clone(&state.hub);
    let settings = state.ws;
    Ok(ws
        .on_upgrade(move |socket| serve(socket, hub, farm_id, coop_id, settings))
        .into_response())
}

async fn serve(
    socket: WebSocket,
    hub: Arc<ConnectionHub>,
    farm_id: FarmId,
    coop_id: Option<CoopId>,
    settings: WsSettings,
) {
    let SubscriberHandle { id, receiver, .. } = hub.register(farm_id, coop_id);
    let (sink, stream) = socket.split();

    let mut writer = tokio::spawn(write_loop(sink, receiver, Arc::clone(&hub), id, settings));
    let mut reader = tokio::spawn(read_loop(stream, Arc::clone(&hub), id));

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    hub.unregister(id);
    tracing::info!(subscriber_id = %id, farm_id = %farm_id, "websocket closed");
}

async fn read_loop(mut stream: SplitStream<WebSocket>, hub: Arc<ConnectionHub>, id: SubscriberId) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match ControlMessage::parse(text.as_str()) {
                Some(control) => hub.handle_control(id, control),
                None => {
                    hub.touch(id);
                    tracing::debug!(subscriber_id = %id, "ignoring malformed frame");
                }
            },
            Ok(Message::Pong(_) | Message::Ping(_) | Message::Binary(_)) => hub.touch(id),
            Ok(Message::Close(_)) => break,
            Err(err) => {
                tracing::debug!(subscriber_id = %id, error = %err, "websocket read failed");
                break;
            }
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut frames: mpsc::Receiver<Frame>,
    hub: Arc<ConnectionHub>,
    id: SubscriberId,
    settings: WsSettings,
) {
    let mut ping = tokio::time::interval(settings.ping_interval);
    // The first tick completes immediately.
    ping.tick().await;

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                if let Err(err) = sink.send(Message::Text(frame.to_string().into())).await {
                    tracing::debug!(subscriber_id = %id, error = %err, "websocket write failed");
                    break;
                }
            }
            _ = ping.tick() => {
                if is_stale(hub.last_seen(id), settings.pong_timeout, now()) {
                    tracing::info!(subscriber_id = %id, "no pong within timeout, dropping connection");
                    break;
                }
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// `true` when a subscriber last seen at `last_seen` has been silent for
/// longer than `timeout`. An unknown subscriber is always stale.
fn is_stale(last_seen: Option<Timestamp>, timeout: Duration, now: Timestamp) -> bool {
    let Some(last_seen) = last_seen else {
        return true;
    };
    (now - last_seen)
        .to_std()
        .is_ok_and(|silence| silence > timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(s: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2026, 2, 19, 6, 0, s).unwrap()
    }

    #[test]
    fn should_not_be_stale_when_seen_within_timeout() {
        assert!(!is_stale(Some(at(0)), Duration::from_secs(60), at(59)));
    }

    #[test]
    fn should_be_stale_when_silent_past_timeout() {
        let last = at(0);
        let now = last + chrono::Duration::seconds(61);
        assert!(is_stale(Some(last), Duration::from_secs(60), now));
    }

    #[test]
    fn should_be_stale_when_subscriber_is_gone() {
        assert!(is_stale(None, Duration::from_secs(60), at(0)));
    }

    #[test]
    fn should_not_be_stale_when_clock_went_backwards() {
        assert!(!is_stale(Some(at(30)), Duration::from_secs(60), at(0)));
    }

    #[test]
    fn should_require_farm_id_in_scope() {
        let params = SubscribeParams {
            farm_id: None,
            coop_id: None,
        };
        assert!(matches!(params.scope(), Err(ValidationError::InvalidId(_))));
    }

    #[test]
    fn should_reject_malformed_coop_id() {
        let params = SubscribeParams {
            farm_id: Some(FarmId::new().to_string()),
            coop_id: Some("coop-7".to_string()),
        };
        assert!(matches!(params.scope(), Err(ValidationError::InvalidId(id)) if id == "coop-7"));
    }

    #[test]
    fn should_parse_farm_and_coop_scope() {
        let farm = FarmId::new();
        let coop = CoopId::new();
        let params = SubscribeParams {
            farm_id: Some(farm.to_string()),
            coop_id: Some(coop.to_string()),
        };
        assert_eq!(params.scope().unwrap(), (farm, Some(coop)));
    }

    mod live {
        use super::*;
        use crate::router::build;
        use crate::testing::{TestState, state};
        use coophub_domain::event::{Event, EventKind};
        use tokio::net::{TcpListener, TcpStream};
        use tokio_tungstenite::tungstenite::Message as ClientMessage;
        use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

        type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

        async fn connect(state: &TestState, farm: FarmId) -> Client {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let app = build(state.clone());
            tokio::spawn(async move { axum::serve(listener, app).await });
            let (client, _) =
                tokio_tungstenite::connect_async(format!("ws://{addr}/ws?farm_id={farm}"))
                    .await
                    .unwrap();
            client
        }

        async fn next_json(client: &mut Client) -> serde_json::Value {
            loop {
                let message = tokio::time::timeout(Duration::from_secs(5), client.next())
                    .await
                    .unwrap()
                    .unwrap()
                    .unwrap();
                if let ClientMessage::Text(text) = message {
                    return serde_json::from_str(text.as_str()).unwrap();
                }
            }
        }

        async fn wait_for(check: impl Fn() -> bool) {
            tokio::time::timeout(Duration::from_secs(5), async {
                while !check() {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .unwrap();
        }

        #[tokio::test]
        async fn should_answer_ping_and_unregister_when_client_closes() {
            let state = state();
            let farm = FarmId::new();
            let mut client = connect(&state, farm).await;
            wait_for(|| state.hub.len() == 1).await;

            client
                .send(ClientMessage::text(r#"{"type":"ping"}"#))
                .await
                .unwrap();
            let reply = next_json(&mut client).await;
            assert_eq!(reply["type"], "pong");
            assert_eq!(reply["farm_id"], farm.to_string());

            client.close(None).await.unwrap();
            wait_for(|| state.hub.is_empty()).await;
        }

        #[tokio::test]
        async fn should_push_coop_events_after_subscribing() {
            let state = state();
            let farm = FarmId::new();
            let coop = CoopId::new();
            let mut client = connect(&state, farm).await;
            wait_for(|| state.hub.len() == 1).await;

            client
                .send(ClientMessage::text(format!(
                    r#"{{"type":"subscribe_coop","coop_id":"{coop}"}}"#
                )))
                .await
                .unwrap();
            let ack = next_json(&mut client).await;
            assert_eq!(ack["type"], "subscribed");
            assert_eq!(ack["coop_id"], coop.to_string());

            let other = Event::new(
                EventKind::Alert,
                farm,
                Some(CoopId::new()),
                serde_json::json!({"n": 0}),
            );
            assert_eq!(state.hub.broadcast(&other), 0);
            let event = Event::new(
                EventKind::DeviceUpdate,
                farm,
                Some(coop),
                serde_json::json!({"n": 1}),
            );
            assert_eq!(state.hub.broadcast(&event), 1);

            let pushed = next_json(&mut client).await;
            assert_eq!(pushed["type"], "device_update");
            assert_eq!(pushed["data"]["n"], 1);
        }

        #[tokio::test]
        async fn should_keep_connection_open_after_malformed_frame() {
            let state = state();
            let mut client = connect(&state, FarmId::new()).await;
            wait_for(|| state.hub.len() == 1).await;

            client.send(ClientMessage::text("not json")).await.unwrap();
            client
                .send(ClientMessage::text(r#"{"type":"ping"}"#))
                .await
                .unwrap();
            assert_eq!(next_json(&mut client).await["type"], "pong");
            assert_eq!(state.hub.len(), 1);
        }
    }
}
