//! The control API server: a raw tokio TCP accept loop with one spawned
//! task per connection.
//!
//! Connections are read incrementally until the header terminator and the
//! declared body length arrive (or the peer closes, in which case whatever
//! was received is processed). Every route answers with a JSON body and
//! closes the connection.

use chrono::SecondsFormat;
use octoprompt_core::ConfigHandle;
use octoprompt_scheduler::{SchedulerEngine, SlackNotifier};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::bridge;
use crate::http::{self, Request};

/// A stalled peer gets this long between reads before we give up and
/// process what arrived.
const READ_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REQUEST_BYTES: usize = 1 << 20;

/// Everything a request handler can touch. The gateway only reads engine
/// state; mutations go through engine/config operations.
pub struct GatewayState {
    pub config: Arc<ConfigHandle>,
    pub engine: Arc<SchedulerEngine>,
    pub slack: Arc<SlackNotifier>,
    secret: String,
    started_at: Instant,
}

impl GatewayState {
    pub fn new(
        config: Arc<ConfigHandle>,
        engine: Arc<SchedulerEngine>,
        slack: Arc<SlackNotifier>,
    ) -> Self {
        let secret = config
            .snapshot()
            .http
            .map(|http| http.secret)
            .unwrap_or_default();
        Self {
            config,
            engine,
            slack,
            secret,
            started_at: Instant::now(),
        }
    }
}

pub struct HttpServer {
    listener: TcpListener,
    state: Arc<GatewayState>,
}

impl HttpServer {
    pub async fn bind(state: GatewayState, host: &str, port: u16) -> std::io::Result<Self> {
        let listener = TcpListener::bind((host, port)).await?;
        tracing::info!("🌐 HTTP server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            state: Arc::new(state),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Runs until the task is dropped.
    pub async fn serve(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        handle_connection(stream, state).await;
                    });
                }
                Err(e) => tracing::warn!("⚠️ Failed to accept connection: {e}"),
            }
        }
    }
}

async fn handle_connection(mut stream: TcpStream, state: Arc<GatewayState>) {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        match tokio::time::timeout(READ_TIMEOUT, stream.read(&mut chunk)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                buf.extend_from_slice(&chunk[..n]);
                if let Some(header_end) = http::find_header_end(&buf) {
                    let header_text = String::from_utf8_lossy(&buf[..header_end]);
                    let expected = http::content_length(&header_text);
                    if buf.len() - (header_end + 4) >= expected {
                        break;
                    }
                }
                if buf.len() > MAX_REQUEST_BYTES {
                    break;
                }
            }
            // Timeout or socket error: process whatever was received.
            Ok(Err(_)) | Err(_) => break,
        }
    }

    if buf.is_empty() {
        return;
    }

    let response = match http::parse_request(&buf) {
        Some(request) => route(&state, request).await,
        None => http::encode_response(400, &json!({"error": "Bad request"})),
    };
    let _ = stream.write_all(&response).await;
    let _ = stream.shutdown().await;
}

async fn route(state: &GatewayState, request: Request) -> Vec<u8> {
    // Bridge events use HMAC auth, not the Bearer token.
    if request.method == "POST" && request.path == "/bridge/events" {
        return bridge::handle_event(state, &request);
    }

    if !state.secret.is_empty() {
        let expected = format!("Bearer {}", state.secret);
        if request.header("authorization") != Some(expected.as_str()) {
            return http::encode_response(401, &json!({"error": "Unauthorized"}));
        }
    }

    let parts: Vec<&str> = request.path.split('/').filter(|p| !p.is_empty()).collect();
    match (request.method.as_str(), parts.as_slice()) {
        ("GET", ["status"]) => handle_status(state),
        ("GET", ["schedules"]) => handle_list_schedules(state),
        ("GET", ["history"]) => handle_history(state),
        ("POST", ["trigger", id]) => handle_trigger(state, id),
        ("POST", ["schedule"]) => http::encode_response(501, &json!({"error": "Not implemented"})),
        ("PATCH", ["schedules", id]) => handle_patch_schedule(state, id, &request.body),
        _ => http::encode_response(404, &json!({"error": "Not found"})),
    }
}

fn handle_status(state: &GatewayState) -> Vec<u8> {
    let config = state.config.snapshot();
    http::encode_response(
        200,
        &json!({
            "status": "ok",
            "uptime": state.started_at.elapsed().as_secs(),
            "schedules": config.schedules.len(),
            "version": config.version,
        }),
    )
}

fn handle_list_schedules(state: &GatewayState) -> Vec<u8> {
    let config = state.config.snapshot();
    let next_fires: HashMap<_, _> = state.engine.next_fire_times().into_iter().collect();

    let schedules: Vec<serde_json::Value> = config
        .schedules
        .iter()
        .map(|schedule| {
            let mut entry = json!({
                "id": schedule.id,
                "name": schedule.name,
                "enabled": schedule.enabled,
                "promptFile": schedule.prompt_file,
                "time": schedule.schedule.time,
            });
            if let Some(next) = next_fires.get(&schedule.id) {
                entry["nextFireDate"] = json!(next.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
            if let Some(last) = state.engine.last_execution(&schedule.id) {
                entry["lastExecution"] = json!(last.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
            if let Some(days) = &schedule.schedule.days_of_week {
                entry["daysOfWeek"] = json!(days);
            }
            entry
        })
        .collect();

    http::encode_response(200, &json!({"schedules": schedules}))
}

fn handle_history(state: &GatewayState) -> Vec<u8> {
    let history: Vec<serde_json::Value> = state
        .engine
        .history()
        .iter()
        .map(|record| {
            let mut entry = json!({
                "scheduleId": record.schedule_id,
                "scheduleName": record.schedule_name,
                "timestamp": record.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                "success": record.success,
            });
            if let Some(error) = &record.error {
                entry["error"] = json!(error);
            }
            entry
        })
        .collect();

    http::encode_response(200, &json!({"history": history, "count": history.len()}))
}

fn handle_trigger(state: &GatewayState, schedule_id: &str) -> Vec<u8> {
    if state.config.snapshot().schedule(schedule_id).is_none() {
        return http::encode_response(
            404,
            &json!({"error": format!("Schedule '{schedule_id}' not found")}),
        );
    }

    tracing::info!("🌐 HTTP trigger for schedule '{schedule_id}'");
    // The fire (and its backoff sleeps) runs in its own task; the response
    // acknowledges dispatch, not completion.
    let engine = Arc::clone(&state.engine);
    let id = schedule_id.to_string();
    tokio::spawn(async move {
        if let Err(e) = engine.execute_now(&id).await {
            tracing::warn!("⚠️ HTTP-triggered execution failed: {e}");
        }
    });

    http::encode_response(
        200,
        &json!({"status": "triggered", "scheduleId": schedule_id}),
    )
}

fn handle_patch_schedule(state: &GatewayState, schedule_id: &str, body: &[u8]) -> Vec<u8> {
    let Some(schedule) = state.config.snapshot().schedule(schedule_id).cloned() else {
        return http::encode_response(
            404,
            &json!({"error": format!("Schedule '{schedule_id}' not found")}),
        );
    };

    let enabled = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("enabled").and_then(serde_json::Value::as_bool));
    let Some(enabled) = enabled else {
        return http::encode_response(
            400,
            &json!({"error": "Missing or invalid 'enabled' field in body"}),
        );
    };

    // No-op PATCH leaves the timer set untouched.
    if enabled != schedule.enabled {
        if let Err(e) = state.config.toggle_schedule(schedule_id) {
            tracing::warn!("⚠️ Failed to toggle schedule '{schedule_id}': {e}");
        }
        state.engine.restart();
    }

    tracing::info!("🌐 HTTP PATCH schedule '{schedule_id}' enabled={enabled}");
    http::encode_response(
        200,
        &json!({"status": "updated", "scheduleId": schedule_id, "enabled": enabled}),
    )
}
