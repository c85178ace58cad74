use stargate_server::config::ServerConfig;
use stargate_server::server::RelayServer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid server configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        eprintln!("Invalid server configuration: {}", e);
        std::process::exit(1);
    }

    let listen_addr = config.listen_addr.clone();
    tracing::info!(
        "Stargate Network Server v{} (disconnect policy: {:?})",
        env!("CARGO_PKG_VERSION"),
        config.disconnect_policy
    );

    let server = RelayServer::new(config);

    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind {}: {}", listen_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Starting stargate relay on {}", listen_addr);
    println!("Stargate relay listening on {}", listen_addr);

    if let Err(e) = server.serve(listener).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
