use std::time::{SystemTime, UNIX_EPOCH};

use stargate_shared::protocol::{GateState, GateWire};

/// A stargate registered on the network.
#[derive(Debug, Clone)]
pub struct Gate {
    pub id: String,
    state: GateState,
    /// Milliseconds since the UNIX epoch of the last state change
    state_last_modified: u64,
    /// Glyphs locked so far in the current dialing sequence
    pub active_glyphs: String,
    /// App-specific data, opaque to the relay
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Gate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: GateState::Idle,
            state_last_modified: now_millis(),
            active_glyphs: String::new(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn state_last_modified(&self) -> u64 {
        self.state_last_modified
    }

    /// Move to `state`. Returns true if the state changed.
    pub fn set_state(&mut self, state: GateState) -> bool {
        if self.state == state {
            return false;
        }
        self.state = state;
        self.state_last_modified = now_millis();
        true
    }

    /// Back to idle with no locked glyphs.
    pub fn reset(&mut self) {
        self.set_state(GateState::Idle);
        self.active_glyphs.clear();
    }

    pub fn to_wire(&self) -> GateWire {
        GateWire {
            id: self.id.clone(),
            state: self.state,
            state_last_modified: self.state_last_modified,
            active_glyphs: self.active_glyphs.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
