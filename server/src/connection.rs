//! One peer's session with the relay.
//!
//! Inbound messages are pushed onto the connection's [`SerialTaskQueue`], so
//! a peer's messages are interpreted strictly one at a time in arrival order.
//! The first message that fails ends the session: the peer gets an `error`
//! message followed by a normal close carrying the failure text.
//!
//! A connection is associated with at most one gate for its lifetime. It keeps
//! only the gate id; the gate itself lives in the registry.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use stargate_shared::protocol::{is_truthy, ServerMsg, WelcomeMsg, PROTOCOL_VERSION};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{RelayError, RelayResult};
use crate::queue::SerialTaskQueue;
use crate::registry_loop::RegistryHandle;

/// What a connection wants written to its channel.
#[derive(Debug, Clone)]
pub enum Outbound {
    Msg(ServerMsg),
    /// Close the channel normally with this reason.
    Close { reason: String },
}

pub struct Connection {
    pub id: u64,
    gate: Mutex<Option<String>>,
    registry: RegistryHandle,
    outbound: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
    queue: SerialTaskQueue,
    max_message_bytes: usize,
}

impl Connection {
    pub fn new(
        id: u64,
        registry: RegistryHandle,
        outbound: mpsc::Sender<Outbound>,
        max_message_bytes: usize,
    ) -> Arc<Self> {
        let cancel = CancellationToken::new();
        let queue = SerialTaskQueue::spawn(format!("connection-{}", id), cancel.clone());
        Arc::new(Self {
            id,
            gate: Mutex::new(None),
            registry,
            outbound,
            cancel,
            queue,
            max_message_bytes,
        })
    }

    pub fn welcome(&self) -> ServerMsg {
        ServerMsg::Welcome(WelcomeMsg {
            protocol_version: PROTOCOL_VERSION,
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            connection_id: self.id,
        })
    }

    /// Id of the associated gate, if any.
    pub fn gate_id(&self) -> Option<String> {
        self.gate.lock().ok().and_then(|g| g.clone())
    }

    /// Cancelled once the session is over, by either side.
    pub fn closed(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Queue an inbound text message for processing.
    pub fn on_message(self: &Arc<Self>, text: String) {
        let this = Arc::clone(self);
        let queued = self
            .queue
            .enqueue(move || async move { this.handle_message(&text).await });
        if queued.is_err() {
            tracing::debug!(connection_id = self.id, "Dropping message for closed connection");
        }
    }

    /// Process one message and report the outcome to the peer.
    pub async fn handle_message(&self, text: &str) -> RelayResult<()> {
        match self.process_message(text).await {
            Ok(reply) => {
                self.send(Outbound::Msg(reply)).await;
                Ok(())
            }
            Err(e) => {
                self.send(Outbound::Msg(ServerMsg::error(e.code(), e.to_string())))
                    .await;
                self.send(Outbound::Close {
                    reason: e.to_string(),
                })
                .await;
                self.cancel.cancel();
                Err(e)
            }
        }
    }

    /// Interpret one message, mutating the registry on the peer's behalf.
    pub async fn process_message(&self, text: &str) -> RelayResult<ServerMsg> {
        if text.len() > self.max_message_bytes {
            return Err(RelayError::InvalidRequest("Message too large.".to_string()));
        }
        let msg: Value = serde_json::from_str(text)
            .map_err(|e| RelayError::InvalidRequest(format!("Malformed message: {}", e)))?;
        if !msg.is_object() {
            return Err(RelayError::InvalidRequest(
                "Message must be a JSON object.".to_string(),
            ));
        }
        let action = msg
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::InvalidRequest("Missing action.".to_string()))?;

        match action {
            "connect" => self.connect(&msg).await,
            other => Err(RelayError::UnknownAction(other.to_string())),
        }
    }

    async fn connect(&self, msg: &Value) -> RelayResult<ServerMsg> {
        let gate_id = msg
            .get("gate")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RelayError::InvalidRequest("Missing gate ID.".to_string()))?;
        if self.gate_id().is_some() {
            return Err(RelayError::AlreadyAssociated);
        }
        let register = msg.get("register").is_some_and(is_truthy);

        let (gate, created) = self.registry.connect(gate_id, register).await?;
        if !self.associate(&gate.id) {
            // The channel closed while the registry was answering
            self.registry.release(&gate.id).await?;
            return Err(RelayError::Transport("Connection closed.".to_string()));
        }
        tracing::info!(
            connection_id = self.id,
            gate = %gate.id,
            created,
            "Connection to gate {} established.",
            gate.id
        );
        Ok(ServerMsg::connected(gate, created))
    }

    /// Record the gate unless the session is already over. Checked under the
    /// slot lock so that `on_close` either sees the gate or `connect` sees the
    /// cancellation.
    fn associate(&self, gate_id: &str) -> bool {
        let Ok(mut slot) = self.gate.lock() else {
            return false;
        };
        if self.cancel.is_cancelled() {
            return false;
        }
        *slot = Some(gate_id.to_string());
        true
    }

    /// Tear down after the channel closed. Releases the associated gate.
    pub async fn on_close(&self) {
        let gate = {
            let slot = self.gate.lock().ok();
            self.cancel.cancel();
            slot.and_then(|slot| slot.clone())
        };
        tracing::info!(
            connection_id = self.id,
            gate = gate.as_deref().unwrap_or("-"),
            "Connection closed"
        );
        if let Some(gate) = gate {
            if let Err(e) = self.registry.release(&gate).await {
                tracing::error!(connection_id = self.id, "Failed to release gate {}: {}", gate, e);
            }
        }
    }

    async fn send(&self, out: Outbound) {
        if self.outbound.send(out).await.is_err() {
            tracing::debug!(connection_id = self.id, "Outbound channel closed");
        }
    }
}
