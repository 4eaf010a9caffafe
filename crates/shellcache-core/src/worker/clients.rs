use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use url::Url;

/// Identifier of an open page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// An open page.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: ClientId,
    pub url: Url,
    /// Generation currently serving this page, if any.
    pub controller: Option<String>,
}

/// Open pages and which generation controls each of them.
#[derive(Debug, Default)]
pub struct Clients {
    clients: BTreeMap<ClientId, Client>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page opened before any generation was active. It stays
    /// uncontrolled until claimed.
    pub fn open(&mut self, url: Url) -> ClientId {
        self.insert(url, None)
    }

    /// Register a page loaded while `generation` is active; it is controlled
    /// from the start.
    pub fn open_controlled(&mut self, url: Url, generation: &str) -> ClientId {
        self.insert(url, Some(generation.to_string()))
    }

    fn insert(&mut self, url: Url, controller: Option<String>) -> ClientId {
        let id = ClientId::next();
        self.clients.insert(
            id,
            Client {
                id,
                url,
                controller,
            },
        );
        id
    }

    pub fn close(&mut self, id: ClientId) -> Option<Client> {
        self.clients.remove(&id)
    }

    /// Make `generation` the controller of every open page. Returns how many
    /// pages changed controller.
    pub fn claim(&mut self, generation: &str) -> usize {
        let mut claimed = 0;
        for client in self.clients.values_mut() {
            if client.controller.as_deref() != Some(generation) {
                client.controller = Some(generation.to_string());
                claimed += 1;
            }
        }
        claimed
    }

    pub fn is_controlled(&self, id: ClientId, generation: &str) -> bool {
        self.clients
            .get(&id)
            .is_some_and(|c| c.controller.as_deref() == Some(generation))
    }

    pub fn controlled_count(&self, generation: &str) -> usize {
        self.clients
            .values()
            .filter(|c| c.controller.as_deref() == Some(generation))
            .count()
    }
}
