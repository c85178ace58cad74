use crate::config::DisconnectPolicy;
use crate::error::{RelayError, RelayResult};
use crate::registry::GateRegistry;
use stargate_shared::protocol::GateWire;
use tokio::sync::{mpsc, oneshot};

/// Commands from connections to the registry loop
pub enum RegistryCommand {
    /// Find the gate, creating it first if `register` is set.
    Connect {
        gate_id: String,
        register: bool,
        response: oneshot::Sender<RelayResult<(GateWire, bool)>>,
    },
    Find {
        gate_id: String,
        response: oneshot::Sender<Option<GateWire>>,
    },
    /// The connection associated with this gate closed.
    Release { gate_id: String },
    Snapshot {
        response: oneshot::Sender<Vec<GateWire>>,
    },
}

/// Run the registry loop. Owns the registry, so every find-or-create is atomic.
pub async fn run_registry_loop(
    mut cmd_rx: mpsc::Receiver<RegistryCommand>,
    disconnect_policy: DisconnectPolicy,
) {
    let mut registry = GateRegistry::new();

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            RegistryCommand::Connect {
                gate_id,
                register,
                response,
            } => {
                let result = match registry.find_by_id(&gate_id) {
                    Some(gate) => Ok((gate.to_wire(), false)),
                    None if register => Ok((registry.register(&gate_id).to_wire(), true)),
                    None => Err(RelayError::GateNotFound(gate_id)),
                };
                let _ = response.send(result);
            }
            RegistryCommand::Find { gate_id, response } => {
                let _ = response.send(registry.find_by_id(&gate_id).map(|g| g.to_wire()));
            }
            RegistryCommand::Release { gate_id } => {
                registry.release(&gate_id, disconnect_policy);
            }
            RegistryCommand::Snapshot { response } => {
                let _ = response.send(registry.iter().map(|g| g.to_wire()).collect());
            }
        }
    }

    tracing::info!("Registry loop ended with {} gates", registry.len());
}

/// Cloneable handle connections use to reach the registry loop.
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Spawn a registry loop on the current runtime and return its handle.
    pub fn spawn(buffer: usize, disconnect_policy: DisconnectPolicy) -> Self {
        let (tx, rx) = mpsc::channel(buffer);
        tokio::spawn(run_registry_loop(rx, disconnect_policy));
        Self { tx }
    }

    /// Handle onto a mailbox the caller drains itself.
    #[cfg(test)]
    pub(crate) fn from_sender(tx: mpsc::Sender<RegistryCommand>) -> Self {
        Self { tx }
    }

    pub async fn connect(&self, gate_id: &str, register: bool) -> RelayResult<(GateWire, bool)> {
        let (response, rx) = oneshot::channel();
        self.send(RegistryCommand::Connect {
            gate_id: gate_id.to_string(),
            register,
            response,
        })
        .await?;
        rx.await.map_err(|_| RelayError::RegistryUnavailable)?
    }

    pub async fn find(&self, gate_id: &str) -> RelayResult<Option<GateWire>> {
        let (response, rx) = oneshot::channel();
        self.send(RegistryCommand::Find {
            gate_id: gate_id.to_string(),
            response,
        })
        .await?;
        rx.await.map_err(|_| RelayError::RegistryUnavailable)
    }

    pub async fn release(&self, gate_id: &str) -> RelayResult<()> {
        self.send(RegistryCommand::Release {
            gate_id: gate_id.to_string(),
        })
        .await
    }

    pub async fn snapshot(&self) -> RelayResult<Vec<GateWire>> {
        let (response, rx) = oneshot::channel();
        self.send(RegistryCommand::Snapshot { response }).await?;
        rx.await.map_err(|_| RelayError::RegistryUnavailable)
    }

    async fn send(&self, cmd: RegistryCommand) -> RelayResult<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| RelayError::RegistryUnavailable)
    }
}
