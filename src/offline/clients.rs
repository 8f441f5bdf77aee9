//! Registry of open application pages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Identifier of an open page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

/// Open pages and the worker (by store name) controlling each one.
///
/// Cloning shares the same registry.
#[derive(Debug, Clone, Default)]
pub struct Clients {
    controllers: Arc<Mutex<HashMap<ClientId, Option<String>>>>,
    next_id: Arc<AtomicU64>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened page. It starts uncontrolled.
    pub fn open(&self) -> ClientId {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut map) = self.controllers.lock() {
            map.insert(id, None);
        }
        id
    }

    pub fn close(&self, id: ClientId) -> bool {
        self.controllers
            .lock()
            .map(|mut map| map.remove(&id).is_some())
            .unwrap_or(false)
    }

    /// Store name of the worker controlling `id`.
    pub fn controller_of(&self, id: ClientId) -> Option<String> {
        self.controllers.lock().ok()?.get(&id).cloned().flatten()
    }

    /// Make `controller` the controller of every open page. Returns the page count.
    pub fn claim(&self, controller: &str) -> usize {
        match self.controllers.lock() {
            Ok(mut map) => {
                for slot in map.values_mut() {
                    *slot = Some(controller.to_string());
                }
                map.len()
            }
            Err(_) => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.controllers.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
