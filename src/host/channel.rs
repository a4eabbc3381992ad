//! Host command channel and router onto the Control API.

use crate::device::Platform;
use crate::engine::RushEngine;
use crate::error::{Result, RushError};
use crate::events::RushEvent;
use crate::host::contract::{
    CommandEnvelope, CommandName, EVENT_VERSION, EventEnvelope, ResponseEnvelope,
};
use crate::task::TaskSpec;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, warn};

struct HostCommandRequest {
    envelope: CommandEnvelope,
    response_tx: oneshot::Sender<ResponseEnvelope>,
}

#[derive(Clone)]
pub struct HostCommandClient {
    request_tx: mpsc::Sender<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl HostCommandClient {
    pub async fn send(&self, envelope: CommandEnvelope) -> Result<ResponseEnvelope> {
        envelope.validate().map_err(|e| {
            RushError::Validation(format!(
                "invalid host command envelope {}: {}",
                envelope.request_id, e
            ))
        })?;

        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(HostCommandRequest {
                envelope,
                response_tx,
            })
            .await
            .map_err(|e| RushError::Channel(format!("failed to send host command request: {e}")))?;

        response_rx
            .await
            .map_err(|e| RushError::Channel(format!("host command response dropped: {e}")))
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_tx.subscribe()
    }
}

pub struct HostCommandServer {
    request_rx: mpsc::Receiver<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
    router: CommandRouter,
}

#[must_use]
pub fn command_channel(
    request_capacity: usize,
    event_capacity: usize,
    engine: Arc<RushEngine>,
) -> (HostCommandClient, HostCommandServer) {
    let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));
    let (event_tx, _event_rx) = broadcast::channel(event_capacity.max(1));

    (
        HostCommandClient {
            request_tx,
            event_tx: event_tx.clone(),
        },
        HostCommandServer {
            request_rx,
            event_tx,
            router: CommandRouter { engine },
        },
    )
}

impl HostCommandServer {
    /// Serve requests until every client is dropped. Engine change events
    /// are forwarded as event envelopes for the lifetime of the server.
    ///
    /// Each request is handled on its own task, so a command waiting on a
    /// device never holds back the ones queued behind it.
    pub async fn run(mut self) {
        let forwarder = tokio::spawn(forward_events(
            self.router.engine.subscribe_events(),
            self.event_tx.clone(),
        ));

        let mut handlers = JoinSet::new();
        while let Some(request) = self.request_rx.recv().await {
            while handlers.try_join_next().is_some() {}
            let router = self.router.clone();
            handlers.spawn(async move {
                let response = router.route(&request.envelope).await;
                let _ = request.response_tx.send(response);
            });
        }

        while handlers.join_next().await.is_some() {}
        forwarder.abort();
    }
}

#[derive(Clone)]
struct CommandRouter {
    engine: Arc<RushEngine>,
}

impl CommandRouter {
    /// Route a command envelope to the engine. Failures become error
    /// envelopes carrying the request id and error class.
    async fn route(&self, envelope: &CommandEnvelope) -> ResponseEnvelope {
        debug!(request_id = %envelope.request_id, command = envelope.command.as_str(), "host command");
        match self.dispatch(envelope).await {
            Ok(payload) => ResponseEnvelope::ok(envelope.request_id.clone(), payload),
            Err(e) => {
                warn!(
                    request_id = %envelope.request_id,
                    command = envelope.command.as_str(),
                    kind = e.kind(),
                    "host command failed: {e}"
                );
                ResponseEnvelope::error(envelope.request_id.clone(), e.to_string())
                    .with_kind(e.kind())
            }
        }
    }

    async fn dispatch(&self, envelope: &CommandEnvelope) -> Result<serde_json::Value> {
        let payload = &envelope.payload;
        let command = envelope.command.as_str();
        let engine = &self.engine;

        match envelope.command {
            CommandName::HostPing => Ok(serde_json::json!({"pong": true})),
            CommandName::HostVersion => Ok(serde_json::json!({
                "contract_version": EVENT_VERSION,
                "channel": "ticketrush_host_v1",
                "engine_version": env!("CARGO_PKG_VERSION"),
            })),
            CommandName::DeviceScan => to_payload(&engine.scan_devices().await),
            CommandName::DeviceConnect => {
                let device_id = parse_non_empty_field(payload, "device_id", command)?;
                let platform = parse_platform(payload, command)?;
                let device = engine.connect_device(&device_id, platform).await?;
                keyed("device", &device)
            }
            CommandName::DeviceList => keyed("devices", &engine.list_devices()),
            CommandName::DeviceDisconnect => {
                let device_id = parse_non_empty_field(payload, "device_id", command)?;
                engine.disconnect_device(&device_id).await?;
                Ok(serde_json::json!({"device_id": device_id, "disconnected": true}))
            }
            CommandName::DeviceTest => {
                let device_id = parse_non_empty_field(payload, "device_id", command)?;
                to_payload(&engine.test_device(&device_id).await?)
            }
            CommandName::TaskCreate => {
                let spec: TaskSpec = serde_json::from_value(payload.clone())
                    .map_err(|e| RushError::Validation(format!("{command} payload: {e}")))?;
                keyed("task", &engine.create_task(spec)?)
            }
            CommandName::TaskList => keyed("tasks", &engine.list_tasks()),
            CommandName::TaskGet => {
                let task_id = parse_non_empty_field(payload, "task_id", command)?;
                keyed("task", &engine.get_task(&task_id)?)
            }
            CommandName::TaskStart => {
                let task_id = parse_non_empty_field(payload, "task_id", command)?;
                engine.start_task(&task_id)?;
                Ok(serde_json::json!({"task_id": task_id, "started": true}))
            }
            CommandName::TaskStop => {
                let task_id = parse_non_empty_field(payload, "task_id", command)?;
                engine.stop_task(&task_id)?;
                Ok(serde_json::json!({"task_id": task_id, "stopped": true}))
            }
            CommandName::TaskDelete => {
                let task_id = parse_non_empty_field(payload, "task_id", command)?;
                engine.delete_task(&task_id)?;
                Ok(serde_json::json!({"task_id": task_id, "deleted": true}))
            }
            CommandName::RuntimeStop => Ok(serde_json::json!({"stopping": true})),
        }
    }
}

async fn forward_events(
    mut rx: broadcast::Receiver<RushEvent>,
    event_tx: broadcast::Sender<EventEnvelope>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let envelope = EventEnvelope::new(
                    uuid::Uuid::new_v4().to_string(),
                    event.name(),
                    event.payload(),
                );
                let _ = event_tx.send(envelope);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(lagged = n, "engine event forwarder lagged; some events were dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn to_payload<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| RushError::Channel(format!("cannot serialize response: {e}")))
}

fn keyed<T: Serialize>(key: &str, value: &T) -> Result<serde_json::Value> {
    let mut body = serde_json::Map::new();
    body.insert(key.to_owned(), to_payload(value)?);
    Ok(serde_json::Value::Object(body))
}

fn parse_non_empty_field(
    payload: &serde_json::Value,
    field: &str,
    command: &str,
) -> Result<String> {
    let Some(raw) = payload.get(field).and_then(serde_json::Value::as_str) else {
        return Err(RushError::Validation(format!(
            "{command} requires payload.{field}"
        )));
    };
    let value = raw.trim();
    if value.is_empty() {
        return Err(RushError::Validation(format!(
            "{command} requires a non-empty payload.{field}"
        )));
    }
    Ok(value.to_owned())
}

fn parse_platform(payload: &serde_json::Value, command: &str) -> Result<Platform> {
    let raw = parse_non_empty_field(payload, "platform", command)?;
    Platform::parse(&raw).ok_or_else(|| {
        RushError::Validation(format!(
            "unsupported platform `{raw}` (expected android/ios)"
        ))
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn non_empty_field_rejects_missing_and_blank() {
        let payload = serde_json::json!({"task_id": "  ", "device_id": " d1 "});
        assert!(parse_non_empty_field(&payload, "missing", "task.get").is_err());
        assert!(parse_non_empty_field(&payload, "task_id", "task.get").is_err());
        assert_eq!(
            parse_non_empty_field(&payload, "device_id", "device.test").unwrap(),
            "d1"
        );
    }

    #[test]
    fn platform_parsing_accepts_known_names() {
        let android = serde_json::json!({"platform": "android"});
        assert_eq!(parse_platform(&android, "device.connect").unwrap(), Platform::Android);
        let bad = serde_json::json!({"platform": "symbian"});
        assert!(matches!(
            parse_platform(&bad, "device.connect"),
            Err(RushError::Validation(_))
        ));
    }

    #[test]
    fn keyed_wraps_value() {
        let body = keyed("tasks", &Vec::<u32>::new()).unwrap();
        assert_eq!(body, serde_json::json!({"tasks": []}));
    }
}
