//! Bounded, persisted record of served ideas, newest first.

use std::sync::Arc;

use musebox_store::KvStore;
use tracing::warn;

/// Storage key for the history blob (JSON array, newest first).
pub const HISTORY_KEY: &str = "history";

/// Most-recent-first idea history, capped; eviction applies to memory and
/// storage together.
pub struct History {
    store: Arc<dyn KvStore>,
    entries: Vec<String>,
    cap: usize,
}

impl History {
    /// Load persisted history, degrading to empty on any storage failure or
    /// corrupt blob.
    pub fn load(store: Arc<dyn KvStore>, cap: usize) -> Self {
        let mut entries: Vec<String> = match store.get(HISTORY_KEY) {
            Ok(Some(blob)) => serde_json::from_str(&blob).unwrap_or_else(|err| {
                warn!(error = %err, "corrupt history, starting empty");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(error = %err, "history unavailable, starting empty");
                Vec::new()
            }
        };
        entries.truncate(cap);
        Self {
            store,
            entries,
            cap,
        }
    }

    /// Record an idea at the front, evicting past the cap, and persist.
    pub fn push(&mut self, idea: &str) {
        self.entries.insert(0, idea.to_string());
        self.entries.truncate(self.cap);
        self.persist();
    }

    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Forget everything, in memory and in storage.
    pub fn clear(&mut self) {
        self.entries.clear();
        if let Err(err) = self.store.remove(HISTORY_KEY) {
            warn!(error = %err, "could not remove persisted history");
        }
    }

    fn persist(&self) {
        let blob = match serde_json::to_string(&self.entries) {
            Ok(blob) => blob,
            Err(err) => {
                warn!(error = %err, "could not encode history");
                return;
            }
        };
        if let Err(err) = self.store.set(HISTORY_KEY, &blob) {
            warn!(error = %err, "could not persist history, continuing in memory");
        }
    }
}
