use std::str::FromStr;

/// What happens to a gate when the connection associated with it closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisconnectPolicy {
    /// Leave the gate untouched; it persists across reconnects.
    #[default]
    Keep,
    /// Return the gate to idle and clear its active glyphs.
    Reset,
    /// Remove the gate from the registry.
    Remove,
}

impl FromStr for DisconnectPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(DisconnectPolicy::Keep),
            "reset" => Ok(DisconnectPolicy::Reset),
            "remove" => Ok(DisconnectPolicy::Remove),
            other => Err(format!(
                "unknown disconnect policy '{}' (expected keep, reset or remove)",
                other
            )),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub max_connections: usize,
    /// Largest accepted inbound text frame, in bytes
    pub max_message_bytes: usize,
    /// Capacity of the registry command channel
    pub command_buffer: usize,
    /// Capacity of each connection's outbound queue
    pub outbound_buffer: usize,
    pub disconnect_policy: DisconnectPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            max_connections: 1024,
            max_message_bytes: 4096,
            command_buffer: 256,
            outbound_buffer: 32,
            disconnect_policy: DisconnectPolicy::Keep,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `STARGATE_*` environment variables.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = Self::default();
        if let Some(addr) = lookup("STARGATE_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(v) = lookup("STARGATE_MAX_CONNECTIONS") {
            config.max_connections = parse_usize("STARGATE_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = lookup("STARGATE_MAX_MESSAGE_BYTES") {
            config.max_message_bytes = parse_usize("STARGATE_MAX_MESSAGE_BYTES", &v)?;
        }
        if let Some(v) = lookup("STARGATE_DISCONNECT_POLICY") {
            config.disconnect_policy = v.parse()?;
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.trim().is_empty() {
            return Err("listen_addr must not be empty".to_string());
        }
        if self.max_connections == 0 {
            return Err("max_connections must be > 0".to_string());
        }
        if self.max_message_bytes == 0 {
            return Err("max_message_bytes must be > 0".to_string());
        }
        if self.command_buffer == 0 || self.outbound_buffer == 0 {
            return Err("channel buffers must be > 0".to_string());
        }
        Ok(())
    }
}

fn parse_usize(key: &str, value: &str) -> Result<usize, String> {
    value
        .trim()
        .parse()
        .map_err(|e| format!("{} must be a positive integer: {}", key, e))
}
