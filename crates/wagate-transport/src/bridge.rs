// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport implementation backed by a protocol-runner child process.
//!
//! The chat protocol itself lives in a Node.js runner (the library that
//! actually speaks the wire format); this crate spawns one runner per
//! session and exchanges JSON lines with it over stdio:
//!
//! - Rust -> runner: `{"id":n,"op":...,...}` requests.
//! - runner -> Rust: `{"id":n,"ok":bool,...}` responses,
//!   `{"event":name,"payload":...}` protocol events, and
//!   `{"keyreq":n,"op":...}` signal-key operations served from the
//!   gateway's credential store.
//!
//! The runner never calls into the supervisor; everything it produces
//! arrives on the event stream.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};
use wagate_config::BridgeConfig;
use wagate_core::{
    GatewayError, MessageKey, Transport, TransportEvent, TransportFactory, TransportHandle,
};
use wagate_store::AuthStore;

use crate::protocol::map_event;

const EVENT_BUFFER: usize = 256;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

type Waiters = Arc<DashMap<u64, oneshot::Sender<Result<Value, String>>>>;
type Writer = Arc<Mutex<ChildStdin>>;

/// Spawns one protocol runner per session.
pub struct BridgeTransportFactory {
    auth_store: AuthStore,
    config: BridgeConfig,
}

impl BridgeTransportFactory {
    pub fn new(auth_store: AuthStore, config: BridgeConfig) -> Arc<Self> {
        Arc::new(Self { auth_store, config })
    }
}

#[async_trait]
impl TransportFactory for BridgeTransportFactory {
    async fn connect(
        &self,
        session_id: &str,
        creds: Value,
    ) -> Result<TransportHandle, GatewayError> {
        let runner = &self.config.runner_path;
        if !std::path::Path::new(runner).exists() {
            return Err(GatewayError::Config(format!(
                "protocol runner not found at {runner} (set bridge.runner_path)"
            )));
        }

        let mut child = Command::new(&self.config.node_bin)
            .arg(runner)
            .env("SESSION_ID", session_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GatewayError::transport("failed to spawn protocol runner", e))?;

        let stdin = child.stdin.take().ok_or_else(|| GatewayError::Transport {
            message: "failed to acquire runner stdin".into(),
            source: None,
        })?;
        let stdout = child.stdout.take().ok_or_else(|| GatewayError::Transport {
            message: "failed to acquire runner stdout".into(),
            source: None,
        })?;

        let writer: Writer = Arc::new(Mutex::new(stdin));
        let waiters: Waiters = Arc::new(DashMap::new());
        let writable = Arc::new(AtomicBool::new(false));
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);

        spawn_reader(
            session_id.to_string(),
            stdout,
            Arc::clone(&writer),
            Arc::clone(&waiters),
            Arc::clone(&writable),
            events_tx.clone(),
            self.auth_store.clone(),
        );

        let transport = Arc::new(BridgeTransport {
            session_id: session_id.to_string(),
            writer,
            waiters,
            writable,
            next_id: AtomicU64::new(1),
            events: events_tx,
            child: Mutex::new(child),
        });

        // Hand the runner its credential document; it drives pairing or
        // login from there and reports progress as connection updates.
        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);
        tokio::time::timeout(
            connect_timeout,
            transport.request("init", json!({ "creds": creds })),
        )
        .await
        .map_err(|_| GatewayError::Timeout {
            duration: connect_timeout,
        })??;

        info!(session_id, "protocol runner started");
        Ok(TransportHandle {
            transport,
            events: events_rx,
        })
    }
}

/// Reader side: demultiplexes responses, key requests, and events.
fn spawn_reader(
    session_id: String,
    stdout: tokio::process::ChildStdout,
    writer: Writer,
    waiters: Waiters,
    writable: Arc<AtomicBool>,
    events: mpsc::Sender<TransportEvent>,
    auth_store: AuthStore,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    warn!(session_id = %session_id, error = %err, "runner stdout read failed");
                    break;
                }
            };
            let message: Value = match serde_json::from_str(&line) {
                Ok(value) => value,
                Err(err) => {
                    warn!(session_id = %session_id, error = %err, "unparsable runner line");
                    continue;
                }
            };

            if let Some(id) = message.get("id").and_then(Value::as_u64) {
                if let Some((_, waiter)) = waiters.remove(&id) {
                    let result = if message.get("ok").and_then(Value::as_bool).unwrap_or(false) {
                        Ok(message.get("result").cloned().unwrap_or(Value::Null))
                    } else {
                        Err(message
                            .get("error")
                            .and_then(Value::as_str)
                            .unwrap_or("runner error")
                            .to_string())
                    };
                    let _ = waiter.send(result);
                }
                continue;
            }

            if let Some(req_id) = message.get("keyreq").and_then(Value::as_u64) {
                handle_key_request(&session_id, req_id, &message, &auth_store, &writer).await;
                continue;
            }

            if let Some(name) = message.get("event").and_then(Value::as_str) {
                let payload = message.get("payload").cloned().unwrap_or(Value::Null);
                if name == "connection.update" {
                    match payload.get("connection").and_then(Value::as_str) {
                        Some("open") => writable.store(true, Ordering::Relaxed),
                        Some("close") => writable.store(false, Ordering::Relaxed),
                        _ => {}
                    }
                }
                if let Some(event) = map_event(name, payload) {
                    if events.send(event).await.is_err() {
                        // Supervisor dropped the stream (restart/logout).
                        break;
                    }
                }
                continue;
            }

            debug!(session_id = %session_id, "ignoring unrecognized runner message");
        }
        writable.store(false, Ordering::Relaxed);
        debug!(session_id = %session_id, "runner stream ended");
    });
}

/// Serve a signal-key operation from the credential store back to the
/// runner.
async fn handle_key_request(
    session_id: &str,
    req_id: u64,
    message: &Value,
    auth_store: &AuthStore,
    writer: &Writer,
) {
    let keys = auth_store.keys(session_id);
    let op = message.get("op").and_then(Value::as_str).unwrap_or("");
    let result = match op {
        "get" => {
            let category = message.get("category").and_then(Value::as_str).unwrap_or("");
            let ids: Vec<String> = message
                .get("ids")
                .and_then(Value::as_array)
                .map(|ids| {
                    ids.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            keys.get(category, &ids)
                .await
                .map(|data| serde_json::to_value(data).unwrap_or(Value::Null))
        }
        "set" => {
            let data = message.get("data").cloned().unwrap_or(Value::Null);
            match serde_json::from_value(data) {
                Ok(parsed) => keys.set(parsed).await.map(|()| Value::Null),
                Err(err) => Err(GatewayError::Validation(format!(
                    "malformed key batch: {err}"
                ))),
            }
        }
        "clear" => {
            let category = message.get("category").and_then(Value::as_str).unwrap_or("");
            keys.clear(category).await.map(|n| json!(n))
        }
        other => Err(GatewayError::Validation(format!(
            "unknown key op {other:?}"
        ))),
    };

    let response = match result {
        Ok(data) => json!({ "keyres": req_id, "ok": true, "data": data }),
        Err(err) => {
            warn!(session_id, req_id, error = %err, "key request failed");
            json!({ "keyres": req_id, "ok": false, "error": err.to_string() })
        }
    };
    if let Err(err) = write_line(writer, &response).await {
        warn!(session_id, error = %err, "failed to answer key request");
    }
}

async fn write_line(writer: &Writer, message: &Value) -> Result<(), GatewayError> {
    let mut line = message.to_string();
    line.push('\n');
    let mut stdin = writer.lock().await;
    stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|e| GatewayError::transport("runner stdin write failed", e))?;
    stdin
        .flush()
        .await
        .map_err(|e| GatewayError::transport("runner stdin flush failed", e))
}

struct BridgeTransport {
    session_id: String,
    writer: Writer,
    waiters: Waiters,
    writable: Arc<AtomicBool>,
    next_id: AtomicU64,
    events: mpsc::Sender<TransportEvent>,
    child: Mutex<Child>,
}

impl BridgeTransport {
    async fn request(&self, op: &str, mut params: Value) -> Result<Value, GatewayError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Some(obj) = params.as_object_mut() {
            obj.insert("id".into(), json!(id));
            obj.insert("op".into(), json!(op));
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(id, tx);

        if let Err(err) = write_line(&self.writer, &params).await {
            self.waiters.remove(&id);
            return Err(err);
        }

        let response = tokio::time::timeout(REQUEST_TIMEOUT, rx).await;
        match response {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(message))) => Err(GatewayError::Transport {
                message: format!("runner {op} failed: {message}"),
                source: None,
            }),
            Ok(Err(_)) => Err(GatewayError::Transport {
                message: format!("runner dropped {op} response"),
                source: None,
            }),
            Err(_) => {
                self.waiters.remove(&id);
                Err(GatewayError::Timeout {
                    duration: REQUEST_TIMEOUT,
                })
            }
        }
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    fn is_writable(&self) -> bool {
        self.writable.load(Ordering::Relaxed)
    }

    async fn ping(&self) -> Result<(), GatewayError> {
        // Fire-and-forget: the pong arrives on the event stream so the
        // keep-alive loop is never blocked on a slow runner.
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(id, tx);
        write_line(&self.writer, &json!({ "id": id, "op": "ping" })).await?;

        let events = self.events.clone();
        let waiters = Arc::clone(&self.waiters);
        tokio::spawn(async move {
            match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
                Ok(Ok(Ok(_))) => {
                    let _ = events.send(TransportEvent::Pong).await;
                }
                _ => {
                    waiters.remove(&id);
                }
            }
        });
        Ok(())
    }

    async fn presence_probe(&self) -> Result<(), GatewayError> {
        self.request("presence", json!({ "presence": "available" }))
            .await
            .map(|_| ())
    }

    async fn send_message(&self, to: &str, content: Value) -> Result<MessageKey, GatewayError> {
        let result = self
            .request("send", json!({ "to": to, "content": content }))
            .await?;
        serde_json::from_value(result.get("key").cloned().unwrap_or(Value::Null)).map_err(|e| {
            GatewayError::Transport {
                message: format!("runner returned malformed message key: {e}"),
                source: None,
            }
        })
    }

    async fn mark_read(&self, keys: &[MessageKey]) -> Result<(), GatewayError> {
        self.request("read", json!({ "keys": keys })).await.map(|_| ())
    }

    async fn request_pairing_code(&self, phone: &str) -> Result<String, GatewayError> {
        let result = self
            .request("pairing-code", json!({ "phoneNumber": phone }))
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .or_else(|| {
                result
                    .get("code")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .ok_or_else(|| GatewayError::Transport {
                message: "runner returned no pairing code".into(),
                source: None,
            })
    }

    async fn logout(&self) -> Result<(), GatewayError> {
        self.request("logout", json!({})).await.map(|_| ())
    }

    async fn close(&self) -> Result<(), GatewayError> {
        self.writable.store(false, Ordering::Relaxed);
        // Best effort: ask nicely, then reap the child.
        let _ = write_line(&self.writer, &json!({ "op": "close" })).await;
        let mut child = self.child.lock().await;
        match tokio::time::timeout(Duration::from_secs(2), child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                debug!(session_id = %self.session_id, "runner did not exit, killing");
                let _ = child.start_kill();
            }
        }
        Ok(())
    }
}
