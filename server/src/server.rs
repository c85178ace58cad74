use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Semaphore};
use tower_http::cors::CorsLayer;

use crate::config::ServerConfig;
use crate::connection::{Connection, Outbound};
use crate::registry_loop::RegistryHandle;
use crate::ws::ws_handler;

/// The relay: tracks live connections and owns the gate registry.
pub struct RelayServer {
    config: ServerConfig,
    gates: RegistryHandle,
    connections: Mutex<HashMap<u64, Arc<Connection>>>,
    next_connection_id: AtomicU64,
    connection_slots: Arc<Semaphore>,
}

impl RelayServer {
    /// Create a relay with its own registry. Must be called inside a tokio runtime.
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let gates = RegistryHandle::spawn(config.command_buffer, config.disconnect_policy);
        let connection_slots = Arc::new(Semaphore::new(config.max_connections));
        Arc::new(Self {
            config,
            gates,
            connections: Mutex::new(HashMap::new()),
            next_connection_id: AtomicU64::new(1),
            connection_slots,
        })
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .layer(CorsLayer::permissive())
            .with_state(Arc::clone(self))
    }

    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        axum::serve(listener, self.router()).await
    }

    /// Wrap a freshly opened channel in a connection and start tracking it.
    pub fn accept(&self, outbound: mpsc::Sender<Outbound>) -> Arc<Connection> {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let connection = Connection::new(
            id,
            self.gates.clone(),
            outbound.clone(),
            self.config.max_message_bytes,
        );

        if outbound.try_send(Outbound::Msg(connection.welcome())).is_err() {
            tracing::warn!(connection_id = id, "Could not queue welcome message");
        }

        if let Ok(mut connections) = self.connections.lock() {
            connections.insert(id, Arc::clone(&connection));
        }
        tracing::info!(connection_id = id, "Incoming connection");
        connection
    }

    /// Drop a closed connection from the active set.
    pub async fn remove(&self, id: u64) {
        let connection = self
            .connections
            .lock()
            .ok()
            .and_then(|mut connections| connections.remove(&id));
        if let Some(connection) = connection {
            connection.on_close().await;
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn gates(&self) -> &RegistryHandle {
        &self.gates
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub(crate) fn connection_slots(&self) -> Arc<Semaphore> {
        Arc::clone(&self.connection_slots)
    }
}
