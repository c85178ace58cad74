//! Load test for the stargate relay.
//!
//! Spawns multiple fake gate clients that:
//! - Connect to the relay and wait for the welcome
//! - Derive a gate id from the dialing address of a random position
//! - Register that gate with a `connect` request and wait for the reply
//! - Hold the connection open, then close it
//!
//! Usage: cargo run --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --clients N      Number of clients to spawn (default: 100)
//!   --hold S         Seconds each client stays connected (default: 5)
//!   --cells N        Number of distinct grid cells to place gates in (default: 50)
//!   --seed N         Seed for gate positions (default: 42)
//!   --space ID       Space id used for addressing (default: loadtest)
//!   --url URL        Relay URL (default: ws://127.0.0.1:8080/ws)

use futures_util::{SinkExt, StreamExt};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use stargate_shared::address::{generate_address, GRID_SIZE};
use stargate_shared::protocol::{ClientMsg, ServerMsg};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

// === Metrics ===

#[derive(Default)]
struct Metrics {
    connected: AtomicU64,
    welcomes: AtomicU64,
    gates_created: AtomicU64,
    gates_joined: AtomicU64,
    rejected: AtomicU64,
    errors: AtomicU64,
    latency_sum_ms: AtomicU64,
    latency_count: AtomicU64,
}

// === Client task ===

async fn run_client(
    client_id: u32,
    url: String,
    gate_id: String,
    hold: Duration,
    metrics: Arc<Metrics>,
) {
    let connect_start = Instant::now();

    let (mut ws, _) = match connect_async(&url).await {
        Ok(conn) => conn,
        Err(e) => {
            if client_id < 5 {
                eprintln!("Client {} failed to connect: {}", client_id, e);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };
    metrics.connected.fetch_add(1, Ordering::Relaxed);

    let request = ClientMsg::Connect {
        gate: gate_id.clone(),
        register: true,
    };
    let json = match serde_json::to_string(&request) {
        Ok(json) => json,
        Err(_) => return,
    };

    // Welcome, then the reply to our connect request
    let exchange = tokio::time::timeout(Duration::from_secs(5), async {
        let mut sent = false;
        while let Some(msg) = ws.next().await {
            let text = match msg {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(frame)) => {
                    if client_id < 3 {
                        eprintln!("Client {} closed: {:?}", client_id, frame);
                    }
                    return false;
                }
                Ok(_) => continue,
                Err(_) => return false,
            };
            match serde_json::from_str::<ServerMsg>(&text) {
                Ok(ServerMsg::Welcome(_)) if !sent => {
                    metrics.welcomes.fetch_add(1, Ordering::Relaxed);
                    if ws.send(Message::Text(json.clone().into())).await.is_err() {
                        return false;
                    }
                    sent = true;
                }
                Ok(ServerMsg::Connected(c)) => {
                    if c.created {
                        metrics.gates_created.fetch_add(1, Ordering::Relaxed);
                    } else {
                        metrics.gates_joined.fetch_add(1, Ordering::Relaxed);
                    }
                    return true;
                }
                Ok(ServerMsg::Error(e)) => {
                    if client_id < 3 {
                        eprintln!("Client {} rejected: {} ({})", client_id, e.error, e.code);
                    }
                    metrics.rejected.fetch_add(1, Ordering::Relaxed);
                    return false;
                }
                _ => {}
            }
        }
        false
    })
    .await;

    match exchange {
        Ok(true) => {
            let latency = connect_start.elapsed();
            metrics
                .latency_sum_ms
                .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
            metrics.latency_count.fetch_add(1, Ordering::Relaxed);
            if client_id < 3 {
                eprintln!("Client {} holds gate {}", client_id, gate_id);
            }
            tokio::time::sleep(hold).await;
        }
        Ok(false) => {}
        Err(_) => {
            if client_id < 3 {
                eprintln!("Client {} timed out", client_id);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    let _ = ws.close(None).await;
    metrics.connected.fetch_sub(1, Ordering::Relaxed);
}

// === Main ===

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut num_clients: u32 = 100;
    let mut hold_secs: u64 = 5;
    let mut cells: u32 = 50;
    let mut seed: u64 = 42;
    let mut space = "loadtest".to_string();
    let mut url = "ws://127.0.0.1:8080/ws".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--clients" => {
                i += 1;
                num_clients = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(100);
            }
            "--hold" => {
                i += 1;
                hold_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(5);
            }
            "--cells" => {
                i += 1;
                cells = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(50).max(1);
            }
            "--seed" => {
                i += 1;
                seed = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(42);
            }
            "--space" => {
                i += 1;
                space = args.get(i).cloned().unwrap_or(space);
            }
            "--url" => {
                i += 1;
                url = args.get(i).cloned().unwrap_or(url);
            }
            _ => {}
        }
        i += 1;
    }

    println!("=== Stargate Relay Load Test ===");
    println!("Clients: {}", num_clients);
    println!("Cells: {}", cells);
    println!("Hold: {}s", hold_secs);
    println!("URL: {}", url);
    println!();

    // Clients placed in the same cell share an address, so they race to register it
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let cell_positions: Vec<(f64, f64, f64)> = (0..cells)
        .map(|_| {
            (
                rng.gen_range(-500.0..500.0) * GRID_SIZE,
                rng.gen_range(-10.0..10.0) * GRID_SIZE,
                rng.gen_range(-500.0..500.0) * GRID_SIZE,
            )
        })
        .collect();

    let metrics = Arc::new(Metrics::default());
    let hold = Duration::from_secs(hold_secs);
    let mut handles = Vec::with_capacity(num_clients as usize);
    let start = Instant::now();

    for client_id in 0..num_clients {
        let (x, y, z) = cell_positions[rng.gen_range(0..cell_positions.len())];
        let gate_id = match generate_address(x, y, z, &space, &[]) {
            Ok(address) => address,
            Err(e) => {
                eprintln!("Client {} has no address: {}", client_id, e);
                continue;
            }
        };

        let url = url.clone();
        let metrics = Arc::clone(&metrics);
        handles.push(tokio::spawn(async move {
            run_client(client_id, url, gate_id, hold, metrics).await;
        }));

        // Stagger spawns slightly to avoid thundering herd
        if client_id % 50 == 49 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    for handle in handles {
        let _ = handle.await;
    }

    println!("=== Final Results ({:.1}s) ===", start.elapsed().as_secs_f64());
    let created = metrics.gates_created.load(Ordering::Relaxed);
    let joined = metrics.gates_joined.load(Ordering::Relaxed);
    let latency_sum = metrics.latency_sum_ms.load(Ordering::Relaxed);
    let latency_count = metrics.latency_count.load(Ordering::Relaxed);

    println!("Welcomes: {}", metrics.welcomes.load(Ordering::Relaxed));
    println!("Gates created: {}", created);
    println!("Gates joined: {}", joined);
    println!("Rejected: {}", metrics.rejected.load(Ordering::Relaxed));
    println!("Errors: {}", metrics.errors.load(Ordering::Relaxed));
    if latency_count > 0 {
        println!("Average connect latency: {}ms", latency_sum / latency_count);
    }
    if created > cells as u64 {
        println!("WARNING: more gates created than cells, registration is not atomic");
    }
}
