//! Orchestration over the pack repository, the remote fetcher, and the
//! optional generator.
//!
//! The manager serves one idea per call and keeps the pool topped up in the
//! background. Replenishment is single-flight: one atomic flag guarantees at
//! most one outstanding fetch, and a call that loses the race is a no-op.
//! The foreground path never awaits a background fetch - a fetch that
//! resolves later only improves *future* draws.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use musebox_store::KvStore;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::fetch::PackFetcher;
use crate::muse::{self, MuseBackend};
use crate::pack::{Pack, PackRepository};

/// Supply tuning.
#[derive(Debug, Clone)]
pub struct SupplyConfig {
    /// Replenish in the background once total remaining ideas drop below
    /// this.
    pub low_water: usize,
    /// Pack file downloaded synchronously on first run, so the very first
    /// press has content.
    pub starter_pack: String,
}

impl Default for SupplyConfig {
    fn default() -> Self {
        Self {
            low_water: 10,
            starter_pack: "starter.json".to_string(),
        }
    }
}

/// Serves ideas and replenishes the pack pool.
pub struct SupplyManager {
    repo: Mutex<PackRepository>,
    fetcher: Arc<dyn PackFetcher>,
    muse: Option<Arc<dyn MuseBackend>>,
    rng: Mutex<StdRng>,
    config: SupplyConfig,
    replenishing: AtomicBool,
    background: Mutex<Vec<JoinHandle<()>>>,
    weak: Weak<Self>,
}

impl SupplyManager {
    /// Build the manager, reconstructing the pack map from storage.
    pub fn new(
        store: Arc<dyn KvStore>,
        fetcher: Arc<dyn PackFetcher>,
        muse: Option<Arc<dyn MuseBackend>>,
        config: SupplyConfig,
    ) -> Arc<Self> {
        let repo = PackRepository::load(store);
        Arc::new_cyclic(|weak| Self {
            repo: Mutex::new(repo),
            fetcher,
            muse,
            rng: Mutex::new(StdRng::from_entropy()),
            config,
            replenishing: AtomicBool::new(false),
            background: Mutex::new(Vec::new()),
            weak: weak.clone(),
        })
    }

    /// First-run setup: when nothing is persisted at all, download the
    /// designated starter pack before returning. Failure is fail-soft - the
    /// supply just starts empty.
    pub async fn bootstrap(&self) {
        if self.lock_repo().pack_count() > 0 {
            return;
        }
        debug!(pack = %self.config.starter_pack, "no packs persisted, fetching starter pack");
        let Some(remote) = self.fetcher.fetch_pack(&self.config.starter_pack).await else {
            warn!(
                pack = %self.config.starter_pack,
                "starter pack unavailable, starting with empty supply"
            );
            return;
        };
        if remote.ideas.is_empty() {
            return;
        }
        info!(pack = %remote.id, ideas = remote.ideas.len(), "installed starter pack");
        self.lock_repo().insert(Pack::new(remote.id, remote.ideas));
    }

    /// Serve one idea.
    ///
    /// The optional generator is consulted first; any failure there falls
    /// through to the pack pool silently. After a pack draw - successful or
    /// not - the low-water threshold is checked and a background replenish
    /// kicked off when supply runs short. A failed draw is returned as
    /// absence for this call; there is no synchronous retry after the fetch.
    pub async fn get_idea(&self) -> Option<String> {
        if let Some(generator) = &self.muse {
            match generator.generate(muse::IDEA_PROMPT).await {
                Ok(text) => return Some(text),
                Err(err) => {
                    debug!(error = %err, "idea generator unavailable, falling back to packs");
                }
            }
        }

        let (idea, remaining) = {
            let mut repo = self.lock_repo();
            let mut rng = self.lock_rng();
            let idea = repo.draw_random(&mut *rng);
            (idea, repo.total_remaining())
        };

        if remaining < self.config.low_water {
            self.spawn_replenish();
        }
        idea
    }

    /// Fetch more content, at most once concurrently.
    ///
    /// Priority order: download a pack we have never loaded; failing that,
    /// re-download the loaded pack with the fewest ideas left, fully
    /// replacing it (the path that reintroduces already-seen ideas once
    /// everything is consumed); failing that, no-op.
    pub async fn replenish(&self) {
        if self
            .replenishing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("replenish already in flight, skipping");
            return;
        }
        self.replenish_inner().await;
        self.replenishing.store(false, Ordering::SeqCst);
    }

    /// Kick off `replenish` on the executor without awaiting it. The handle
    /// is retained so a host can drain background work before shutdown.
    pub fn spawn_replenish(&self) {
        let Some(manager) = self.weak.upgrade() else {
            return;
        };
        let handle = tokio::spawn(async move {
            manager.replenish().await;
        });
        self.lock_background().push(handle);
    }

    /// Await any background replenishment spawned so far. The foreground
    /// flow never calls this before rendering; hosts call it on the way out.
    pub async fn drain_background(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut background = self.lock_background();
            background.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }

    #[must_use]
    pub fn total_remaining(&self) -> usize {
        self.lock_repo().total_remaining()
    }

    /// `(id, remaining)` per loaded pack, sorted by id.
    #[must_use]
    pub fn pack_counts(&self) -> Vec<(String, usize)> {
        self.lock_repo().pack_counts()
    }

    /// Drop all packs from memory and storage.
    pub fn clear(&self) {
        self.lock_repo().clear();
    }

    async fn replenish_inner(&self) {
        let Some(index) = self.fetcher.fetch_index().await else {
            return;
        };
        let loaded = self.lock_repo().pack_counts();
        let loaded_ids: HashSet<&str> = loaded.iter().map(|(id, _)| id.as_str()).collect();

        let fresh: Vec<&String> = index
            .packs
            .iter()
            .filter(|file| !loaded_ids.contains(pack_id_for_file(file)))
            .collect();

        if !fresh.is_empty() {
            let file = {
                let mut rng = self.lock_rng();
                match fresh.as_slice().choose(&mut *rng) {
                    Some(file) => (*file).clone(),
                    None => return,
                }
            };
            let Some(remote) = self.fetcher.fetch_pack(&file).await else {
                return;
            };
            if remote.ideas.is_empty() {
                debug!(pack = %remote.id, "ignoring empty remote pack");
                return;
            }
            info!(pack = %remote.id, ideas = remote.ideas.len(), "downloaded new idea pack");
            self.lock_repo().insert(Pack::new(remote.id, remote.ideas));
            return;
        }

        // Every indexed pack is already loaded (each partially consumed):
        // refresh the one closest to exhaustion.
        let Some((smallest, _)) = loaded.into_iter().min_by_key(|(id, count)| (*count, id.clone()))
        else {
            return;
        };
        let Some(file) = index
            .packs
            .iter()
            .find(|file| pack_id_for_file(file) == smallest)
        else {
            debug!(pack = %smallest, "no index entry to refresh from");
            return;
        };
        let Some(remote) = self.fetcher.fetch_pack(file).await else {
            return;
        };
        if remote.ideas.is_empty() {
            return;
        }
        info!(pack = %remote.id, ideas = remote.ideas.len(), "refreshed idea pack");
        self.lock_repo().insert(Pack::new(remote.id, remote.ideas));
    }

    /// Reseed the draw RNG for deterministic tests.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn seed_rng(&self, seed: u64) {
        *self.lock_rng() = StdRng::seed_from_u64(seed);
    }

    fn lock_repo(&self) -> MutexGuard<'_, PackRepository> {
        self.repo.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_background(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A pack's identifier as referenced by the index: the file name minus its
/// `.json` extension.
fn pack_id_for_file(file: &str) -> &str {
    file.strip_suffix(".json").unwrap_or(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FetchGate, OfflineMuse, ScriptedFetcher, StaticMuse, pack_payload};
    use musebox_store::MemoryStore;

    fn manager_with(
        fetcher: ScriptedFetcher,
        muse: Option<Arc<dyn MuseBackend>>,
    ) -> (Arc<SupplyManager>, Arc<ScriptedFetcher>) {
        let fetcher = Arc::new(fetcher);
        let as_dyn: Arc<dyn PackFetcher> = fetcher.clone();
        let manager = SupplyManager::new(
            Arc::new(MemoryStore::new()),
            as_dyn,
            muse,
            SupplyConfig::default(),
        );
        manager.seed_rng(11);
        (manager, fetcher)
    }

    #[test]
    fn file_stems_identify_packs() {
        assert_eq!(pack_id_for_file("starter.json"), "starter");
        assert_eq!(pack_id_for_file("no-extension"), "no-extension");
    }

    #[tokio::test]
    async fn bootstrap_installs_starter_pack_once() {
        let fetcher = ScriptedFetcher::new()
            .with_pack("starter.json", pack_payload("starter", &["a", "b", "c"]));
        let (manager, fetcher) = manager_with(fetcher, None);

        manager.bootstrap().await;
        assert_eq!(manager.total_remaining(), 3);

        // Packs already loaded: a second bootstrap must not refetch.
        manager.bootstrap().await;
        assert_eq!(fetcher.pack_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn replenish_prefers_packs_never_loaded() {
        let fetcher = ScriptedFetcher::new()
            .with_index(&["starter.json", "rainy.json"])
            .with_pack("starter.json", pack_payload("starter", &["s1"]))
            .with_pack("rainy.json", pack_payload("rainy", &["r1", "r2"]));
        let (manager, _) = manager_with(fetcher, None);

        // "starter" is loaded, "rainy" is new - download-new wins.
        manager
            .lock_repo()
            .insert(Pack::new("starter", vec!["s0".into()]));
        manager.replenish().await;

        assert_eq!(
            manager.pack_counts(),
            vec![("rainy".to_string(), 2), ("starter".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn replenish_refreshes_smallest_when_nothing_is_new() {
        let fetcher = ScriptedFetcher::new()
            .with_index(&["big.json", "small.json"])
            .with_pack("big.json", pack_payload("big", &["b1", "b2", "b3"]))
            .with_pack(
                "small.json",
                pack_payload("small", &["s1", "s2", "s3", "s4"]),
            );
        let (manager, _) = manager_with(fetcher, None);

        manager
            .lock_repo()
            .insert(Pack::new("big", vec!["b-left-1".into(), "b-left-2".into()]));
        manager
            .lock_repo()
            .insert(Pack::new("small", vec!["s-left".into()]));

        manager.replenish().await;

        // "small" had the fewest ideas left and was fully replaced.
        assert_eq!(
            manager.pack_counts(),
            vec![("big".to_string(), 2), ("small".to_string(), 4)]
        );
    }

    #[tokio::test]
    async fn replenish_is_single_flight() {
        let gate = FetchGate::new();
        let fetcher = ScriptedFetcher::new()
            .with_index(&["starter.json"])
            .with_pack("starter.json", pack_payload("starter", &["a"]))
            .with_gate(Arc::clone(&gate));
        let (manager, fetcher) = manager_with(fetcher, None);

        manager.spawn_replenish();
        // Wait until the first fetch is provably in flight.
        if let Ok(permit) = gate.entered.acquire().await {
            permit.forget();
        }

        // A second call while one is running must be a no-op.
        manager.replenish().await;
        assert_eq!(fetcher.index_calls.load(Ordering::SeqCst), 1);

        gate.release.add_permits(1);
        manager.drain_background().await;

        assert_eq!(fetcher.index_calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.total_remaining(), 1);
    }

    #[tokio::test]
    async fn low_supply_triggers_background_replenish() {
        let fetcher = ScriptedFetcher::new()
            .with_index(&["fresh.json"])
            .with_pack("fresh.json", pack_payload("fresh", &["f1", "f2"]));
        let (manager, _) = manager_with(fetcher, None);

        // Empty supply, below low-water: the draw is absent but schedules
        // a fetch.
        assert_eq!(manager.get_idea().await, None);
        manager.drain_background().await;
        assert_eq!(manager.total_remaining(), 2);
    }

    #[tokio::test]
    async fn generator_is_consulted_first() {
        let muse: Arc<dyn MuseBackend> = Arc::new(StaticMuse("paint a tiny rock".into()));
        let (manager, _) = manager_with(ScriptedFetcher::new(), Some(muse));
        manager
            .lock_repo()
            .insert(Pack::new("packed", vec!["from the pack".into()]));

        assert_eq!(
            manager.get_idea().await,
            Some("paint a tiny rock".to_string())
        );
        // The pack pool was not touched.
        assert_eq!(manager.total_remaining(), 1);
    }

    #[tokio::test]
    async fn broken_generator_falls_through_to_packs() {
        let muse: Arc<dyn MuseBackend> = Arc::new(OfflineMuse);
        let (manager, _) = manager_with(ScriptedFetcher::new(), Some(muse));
        manager
            .lock_repo()
            .insert(Pack::new("packed", vec!["from the pack".into()]));

        assert_eq!(manager.get_idea().await, Some("from the pack".to_string()));
    }
}
