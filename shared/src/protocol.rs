use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Protocol version - increment when making breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

// === Gate ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../plugin/src/generated/")]
#[serde(rename_all = "kebab-case")]
pub enum GateState {
    #[default]
    Idle,
    Dialing,
    ChevronLocked,
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../plugin/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct GateWire {
    pub id: String,
    pub state: GateState,
    /// Milliseconds since the UNIX epoch
    #[ts(type = "number")]
    pub state_last_modified: u64,
    pub active_glyphs: String,
    #[serde(default)]
    #[ts(type = "Record<string, unknown>")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

// === Server -> Client ===

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../plugin/src/generated/")]
#[serde(tag = "type")]
pub enum ServerMsg {
    #[serde(rename = "welcome")]
    Welcome(WelcomeMsg),
    #[serde(rename = "connected")]
    Connected(ConnectedMsg),
    #[serde(rename = "error")]
    Error(ErrorMsg),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../plugin/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct WelcomeMsg {
    pub protocol_version: u32,
    pub server_version: String,
    #[ts(type = "number")]
    pub connection_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../plugin/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct ConnectedMsg {
    pub ok: bool,
    pub gate_id: String,
    /// True when this request registered the gate
    pub created: bool,
    pub gate: GateWire,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../plugin/src/generated/")]
pub struct ErrorMsg {
    pub ok: bool,
    pub code: String,
    pub error: String,
}

// === Client -> Server ===

/// Actions a client may request. Parsed from `{"action": ...}` objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../plugin/src/generated/")]
#[serde(tag = "action")]
pub enum ClientMsg {
    #[serde(rename = "connect")]
    Connect {
        gate: String,
        #[serde(default)]
        register: bool,
    },
}

/// JSON truthiness: `false`, `null`, `0`, `""` are falsy, everything else truthy.
pub fn is_truthy(value: &serde_json::Value) -> bool {
    use serde_json::Value;
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl ServerMsg {
    pub fn connected(gate: GateWire, created: bool) -> Self {
        ServerMsg::Connected(ConnectedMsg {
            ok: true,
            gate_id: gate.id.clone(),
            created,
            gate,
        })
    }

    pub fn error(code: impl Into<String>, error: impl Into<String>) -> Self {
        ServerMsg::Error(ErrorMsg {
            ok: false,
            code: code.into(),
            error: error.into(),
        })
    }
}
