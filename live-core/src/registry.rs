//! Module id → client state machine.
//!
//! One entry per open document. Entries are created lazily on first use and
//! dropped when the module is closed or the live session ends. Documents
//! never share state.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::client::ClientStateMachine;

/// Registry of per-module state machines.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    clients: HashMap<String, ClientStateMachine>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing machine for `module_id`, or a fresh one at revision 0.
    pub fn get(&mut self, module_id: &str) -> &mut ClientStateMachine {
        self.clients
            .entry(module_id.to_string())
            .or_insert_with(|| {
                log::debug!("creating client for module {module_id}");
                ClientStateMachine::new()
            })
    }

    /// Seed (or re-seed) a module with known contents at `revision`.
    pub fn open(
        &mut self,
        module_id: &str,
        document: impl Into<String>,
        revision: u64,
    ) -> &mut ClientStateMachine {
        let client = ClientStateMachine::with_document(document, revision);
        match self.clients.entry(module_id.to_string()) {
            Entry::Occupied(mut slot) => {
                slot.insert(client);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(client),
        }
    }

    /// Read-only lookup without creating.
    pub fn lookup(&self, module_id: &str) -> Option<&ClientStateMachine> {
        self.clients.get(module_id)
    }

    /// Discard a module's machine. The next `get` starts fresh.
    pub fn close(&mut self, module_id: &str) -> Option<ClientStateMachine> {
        self.clients.remove(module_id)
    }

    /// Drop every machine (session teardown).
    pub fn clear(&mut self) {
        self.clients.clear();
    }

    pub fn module_count(&self) -> usize {
        self.clients.len()
    }

    /// Ids of all modules with a live machine.
    pub fn active_modules(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }
}
