use crate::config::DisconnectPolicy;
use crate::gate::Gate;
use std::collections::HashMap;

/// All gates known to one relay, keyed by id. Owned by the registry loop.
#[derive(Debug, Default)]
pub struct GateRegistry {
    gates: HashMap<String, Gate>,
}

impl GateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Gate> {
        self.gates.get(id)
    }

    /// Find or create the gate with this id. New gates start idle.
    pub fn register(&mut self, id: &str) -> &mut Gate {
        self.gates.entry(id.to_string()).or_insert_with(|| {
            tracing::info!("Registering new gate {}", id);
            Gate::new(id)
        })
    }

    /// Apply the disconnect policy to a gate whose connection closed.
    pub fn release(&mut self, id: &str, policy: DisconnectPolicy) {
        match policy {
            DisconnectPolicy::Keep => {}
            DisconnectPolicy::Reset => {
                if let Some(gate) = self.gates.get_mut(id) {
                    gate.reset();
                }
            }
            DisconnectPolicy::Remove => {
                if self.gates.remove(id).is_some() {
                    tracing::info!("Removed gate {}", id);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Gate> {
        self.gates.values()
    }
}
