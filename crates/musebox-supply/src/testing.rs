//! Scripted fakes shared by unit and integration tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::fetch::{PackFetcher, PackIndex, RemotePack};
use crate::muse::{MuseBackend, MuseError};

/// Two-phase gate for holding a fetch open mid-flight: the fetcher adds an
/// `entered` permit when a fetch starts and then blocks until the test adds
/// a `release` permit.
pub struct FetchGate {
    pub entered: Semaphore,
    pub release: Semaphore,
}

impl FetchGate {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Semaphore::new(0),
            release: Semaphore::new(0),
        })
    }
}

/// A `PackFetcher` that serves canned responses and counts calls.
#[derive(Default)]
pub struct ScriptedFetcher {
    index: Option<PackIndex>,
    packs: HashMap<String, RemotePack>,
    gate: Option<Arc<FetchGate>>,
    pub index_calls: AtomicUsize,
    pub pack_calls: AtomicUsize,
}

impl ScriptedFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve this manifest; without it, `fetch_index` reports unavailable.
    #[must_use]
    pub fn with_index(mut self, files: &[&str]) -> Self {
        self.index = Some(PackIndex {
            packs: files.iter().map(ToString::to_string).collect(),
        });
        self
    }

    #[must_use]
    pub fn with_pack(mut self, file: &str, pack: RemotePack) -> Self {
        self.packs.insert(file.to_string(), pack);
        self
    }

    /// Make `fetch_index` block on the gate so tests can observe in-flight
    /// replenishment.
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<FetchGate>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl PackFetcher for ScriptedFetcher {
    async fn fetch_index(&self) -> Option<PackIndex> {
        self.index_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.entered.add_permits(1);
            if let Ok(permit) = gate.release.acquire().await {
                permit.forget();
            }
        }
        self.index.clone()
    }

    async fn fetch_pack(&self, file: &str) -> Option<RemotePack> {
        self.pack_calls.fetch_add(1, Ordering::SeqCst);
        self.packs.get(file).cloned()
    }
}

/// Build a pack payload inline.
#[must_use]
pub fn pack_payload(id: &str, ideas: &[&str]) -> RemotePack {
    RemotePack {
        id: id.to_string(),
        name: id.to_string(),
        ideas: ideas.iter().map(ToString::to_string).collect(),
    }
}

/// A generator that always answers with the same text.
pub struct StaticMuse(pub String);

#[async_trait]
impl MuseBackend for StaticMuse {
    async fn generate(&self, _prompt: &str) -> Result<String, MuseError> {
        Ok(self.0.clone())
    }
}

/// A generator that is present but never works.
pub struct OfflineMuse;

#[async_trait]
impl MuseBackend for OfflineMuse {
    async fn generate(&self, _prompt: &str) -> Result<String, MuseError> {
        Err(MuseError::Empty)
    }
}
