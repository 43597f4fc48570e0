//! Content packs and the in-memory repository over them.
//!
//! Ideas are drawn destructively: a drawn idea is removed from its pack and
//! the pack's new state persisted, which realizes per-pack
//! sampling-without-replacement without any "already shown" bookkeeping.
//! The cost is accepted up front: once a pack is exhausted it is gone until
//! a fresh payload repopulates it.

use std::collections::HashMap;
use std::sync::Arc;

use musebox_store::KvStore;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

/// Prefix for per-pack storage keys: a pack `silly` persists as `pack.silly`.
pub const PACK_KEY_PREFIX: &str = "pack.";

/// A named, shrinking collection of idea strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pack {
    pub id: String,
    pub ideas: Vec<String>,
}

impl Pack {
    #[must_use]
    pub fn new(id: impl Into<String>, ideas: Vec<String>) -> Self {
        Self {
            id: id.into(),
            ideas,
        }
    }

    fn storage_key(id: &str) -> String {
        format!("{PACK_KEY_PREFIX}{id}")
    }
}

/// In-memory pack map backed by write-through persistence.
///
/// Invariant: a pack with zero remaining ideas exists nowhere - not in the
/// map, not in storage. `save` enforces this on every write.
pub struct PackRepository {
    store: Arc<dyn KvStore>,
    packs: HashMap<String, Pack>,
}

impl PackRepository {
    /// Reconstruct the pack map by scanning persisted `pack.*` entries.
    ///
    /// Entries that decode to an empty list are treated as exhausted and
    /// deleted. Corrupt entries are skipped (and their blobs dropped), never
    /// fatal. An unreadable store yields an empty repository.
    pub fn load(store: Arc<dyn KvStore>) -> Self {
        let mut repo = Self {
            store,
            packs: HashMap::new(),
        };
        let keys = match repo.store.keys() {
            Ok(keys) => keys,
            Err(err) => {
                warn!(error = %err, "pack storage unavailable, starting with empty supply");
                return repo;
            }
        };
        for key in keys {
            let Some(id) = key.strip_prefix(PACK_KEY_PREFIX) else {
                continue;
            };
            let blob = match repo.store.get(&key) {
                Ok(Some(blob)) => blob,
                Ok(None) => continue,
                Err(err) => {
                    warn!(pack = id, error = %err, "skipping unreadable pack entry");
                    continue;
                }
            };
            match serde_json::from_str::<Vec<String>>(&blob) {
                Ok(ideas) if ideas.is_empty() => {
                    debug!(pack = id, "dropping persisted empty pack");
                    repo.remove_entry(&key);
                }
                Ok(ideas) => {
                    repo.packs.insert(id.to_string(), Pack::new(id, ideas));
                }
                Err(err) => {
                    warn!(pack = id, error = %err, "dropping corrupt pack entry");
                    repo.remove_entry(&key);
                }
            }
        }
        repo
    }

    /// Persist the named pack, or remove it everywhere if it is empty or
    /// absent. This self-heals leaked empty packs on every call.
    pub fn save(&mut self, pack_id: &str) {
        let key = Pack::storage_key(pack_id);
        let is_live = self
            .packs
            .get(pack_id)
            .is_some_and(|pack| !pack.ideas.is_empty());
        if !is_live {
            self.packs.remove(pack_id);
            self.remove_entry(&key);
            return;
        }
        let Some(pack) = self.packs.get(pack_id) else {
            return;
        };
        match serde_json::to_string(&pack.ideas) {
            Ok(blob) => {
                if let Err(err) = self.store.set(&key, &blob) {
                    warn!(pack = pack_id, error = %err, "could not persist pack, continuing in memory");
                }
            }
            Err(err) => warn!(pack = pack_id, error = %err, "could not encode pack"),
        }
    }

    /// Add or fully replace a pack and persist it. Replacement is how a
    /// remote refresh swaps a consumed pack for a fresh payload.
    pub fn insert(&mut self, pack: Pack) {
        let id = pack.id.clone();
        self.packs.insert(id.clone(), pack);
        self.save(&id);
    }

    /// Sum of remaining ideas across all packs.
    #[must_use]
    pub fn total_remaining(&self) -> usize {
        self.packs.values().map(|pack| pack.ideas.len()).sum()
    }

    /// Identifiers of packs with at least one idea remaining, sorted.
    #[must_use]
    pub fn loaded_pack_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .packs
            .values()
            .filter(|pack| !pack.ideas.is_empty())
            .map(|pack| pack.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// `(id, remaining)` for every loaded pack, sorted by id.
    #[must_use]
    pub fn pack_counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = self
            .packs
            .values()
            .map(|pack| (pack.id.clone(), pack.ideas.len()))
            .collect();
        counts.sort();
        counts
    }

    #[must_use]
    pub fn pack_count(&self) -> usize {
        self.packs.len()
    }

    /// Draw one idea: pick a non-empty pack uniformly at random, pick an
    /// idea uniformly within it, remove it, persist the pack's new state.
    ///
    /// Returns `None` when every pack is empty - a signaled absence, not an
    /// error; callers fall back or schedule a fetch.
    pub fn draw_random<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<String> {
        let pack_id = {
            let candidates: Vec<&str> = self
                .packs
                .values()
                .filter(|pack| !pack.ideas.is_empty())
                .map(|pack| pack.id.as_str())
                .collect();
            candidates.as_slice().choose(rng)?.to_string()
        };
        let idea = {
            let pack = self.packs.get_mut(&pack_id)?;
            let index = rng.gen_range(0..pack.ideas.len());
            pack.ideas.swap_remove(index)
        };
        self.save(&pack_id);
        Some(idea)
    }

    /// Drop every pack from memory and storage.
    pub fn clear(&mut self) {
        let ids: Vec<String> = self.packs.keys().cloned().collect();
        for id in ids {
            self.remove_entry(&Pack::storage_key(&id));
        }
        self.packs.clear();
    }

    fn remove_entry(&self, key: &str) {
        if let Err(err) = self.store.remove(key) {
            warn!(key, error = %err, "could not remove storage entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use musebox_store::MemoryStore;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn seeded_rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn ideas(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix} idea {i}")).collect()
    }

    #[test]
    fn draws_are_distinct_until_exhausted() {
        let store = Arc::new(MemoryStore::new());
        let mut repo = PackRepository::load(store);
        repo.insert(Pack::new("alpha", ideas("alpha", 4)));
        repo.insert(Pack::new("beta", ideas("beta", 3)));

        let mut rng = seeded_rng();
        let mut seen = HashSet::new();
        for _ in 0..7 {
            let idea = repo.draw_random(&mut rng).expect("supply not exhausted");
            assert!(seen.insert(idea), "no idea repeats before exhaustion");
        }
        assert_eq!(repo.draw_random(&mut rng), None);
        assert_eq!(repo.total_remaining(), 0);
    }

    #[test]
    fn emptied_pack_disappears_everywhere() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let mut repo = PackRepository::load(Arc::clone(&store));
        repo.insert(Pack::new("solo", vec!["only one".to_string()]));

        let mut rng = seeded_rng();
        assert_eq!(repo.draw_random(&mut rng), Some("only one".to_string()));
        assert!(repo.loaded_pack_ids().is_empty());
        assert_eq!(store.get("pack.solo").expect("store readable"), None);
    }

    #[test]
    fn load_drops_empty_and_corrupt_entries() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        store.set("pack.good", r#"["one","two"]"#).expect("seed");
        store.set("pack.empty", "[]").expect("seed");
        store.set("pack.corrupt", "{nope").expect("seed");
        store.set("rate_limit", "{}").expect("seed");

        let repo = PackRepository::load(Arc::clone(&store));
        assert_eq!(repo.loaded_pack_ids(), vec!["good"]);
        assert_eq!(repo.total_remaining(), 2);
        // Self-healing: the bad entries were removed from storage.
        assert_eq!(store.get("pack.empty").expect("readable"), None);
        assert_eq!(store.get("pack.corrupt").expect("readable"), None);
        // Unrelated keys untouched.
        assert!(store.get("rate_limit").expect("readable").is_some());
    }

    #[test]
    fn insert_replaces_pack_contents() {
        let store = Arc::new(MemoryStore::new());
        let mut repo = PackRepository::load(store);
        repo.insert(Pack::new("alpha", ideas("old", 2)));
        repo.insert(Pack::new("alpha", ideas("new", 5)));

        assert_eq!(repo.total_remaining(), 5);
        assert_eq!(repo.pack_counts(), vec![("alpha".to_string(), 5)]);
    }

    #[test]
    fn unreadable_store_degrades_to_empty_supply() {
        struct BrokenStore;
        impl KvStore for BrokenStore {
            fn get(&self, _: &str) -> Result<Option<String>, musebox_store::StoreError> {
                Err(musebox_store::StoreError::Disabled("test".into()))
            }
            fn set(&self, _: &str, _: &str) -> Result<(), musebox_store::StoreError> {
                Err(musebox_store::StoreError::Disabled("test".into()))
            }
            fn remove(&self, _: &str) -> Result<(), musebox_store::StoreError> {
                Err(musebox_store::StoreError::Disabled("test".into()))
            }
            fn keys(&self) -> Result<Vec<String>, musebox_store::StoreError> {
                Err(musebox_store::StoreError::Disabled("test".into()))
            }
        }

        let mut repo = PackRepository::load(Arc::new(BrokenStore));
        assert_eq!(repo.total_remaining(), 0);
        // Draws still work (as absence) and inserts keep the pack in memory.
        assert_eq!(repo.draw_random(&mut seeded_rng()), None);
        repo.insert(Pack::new("memory-only", ideas("m", 2)));
        assert_eq!(repo.total_remaining(), 2);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Persisting a non-empty pack and reloading yields the same
            /// ideas as a set; persisting an empty one leaves no entry.
            #[test]
            fn persistence_round_trips(ideas in proptest::collection::vec("[a-z ]{1,30}", 0..20)) {
                let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
                let mut repo = PackRepository::load(Arc::clone(&store));
                repo.insert(Pack::new("probe", ideas.clone()));

                let reloaded = PackRepository::load(Arc::clone(&store));
                if ideas.is_empty() {
                    prop_assert_eq!(store.get("pack.probe").expect("readable"), None);
                    prop_assert!(reloaded.loaded_pack_ids().is_empty());
                } else {
                    let before: HashSet<String> = ideas.into_iter().collect();
                    let counts = reloaded.pack_counts();
                    prop_assert_eq!(counts.len(), 1);
                    let mut drained = HashSet::new();
                    let mut reloaded = reloaded;
                    let mut rng = seeded_rng();
                    while let Some(idea) = reloaded.draw_random(&mut rng) {
                        drained.insert(idea);
                    }
                    prop_assert_eq!(drained, before);
                }
            }
        }
    }
}
