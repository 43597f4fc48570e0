//! The session object: one explicit owner for all mutable state.
//!
//! Everything the original widget kept in scattered module globals - the
//! pack map, the rate-limit counters, the single-flight flag - lives here as
//! fields of a `Session` constructed once at startup. Components receive
//! their collaborators by injection, so tests swap in a memory store, a
//! scripted fetcher, and a manual clock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use musebox_limiter::{Clock, Escalation, RateLimiter, SystemClock};
use musebox_store::{FsStore, KvStore, MemoryStore};
use musebox_supply::{
    CommandMuse, History, HttpPackFetcher, MuseBackend, PackFetcher, PackIndex, RemotePack,
    SupplyManager,
};
use tracing::{debug, warn};

use crate::config::Config;

/// Keys from earlier storage schemes, deleted during bootstrap.
pub const LEGACY_KEYS: &[&str] = &["ideas", "press_data"];

/// What one button press produced.
#[derive(Debug)]
pub enum PressOutcome {
    /// An idea was served; `remaining` presses are left in the window.
    Idea { text: String, remaining: u32 },
    /// The press was allowed but the supply is empty; a fetch is underway.
    Dry { remaining: u32 },
    /// Over the limit: show the escalation message and the countdown.
    Throttled {
        message: &'static str,
        reset_in: Duration,
    },
    /// Terminal: the simulated crash. The caller must hard-reset state.
    Crashed,
}

/// Snapshot for the `status` command.
#[derive(Debug)]
pub struct StatusReport {
    pub limit: u32,
    pub remaining_allowance: u32,
    pub limit_reached: bool,
    pub reset_in: Duration,
    pub total_ideas: usize,
    pub packs: Vec<(String, usize)>,
}

/// Owns every component for one run of the program.
pub struct Session {
    store: Arc<dyn KvStore>,
    supply: Arc<SupplyManager>,
    limiter: RateLimiter,
    history: History,
}

impl Session {
    /// Build a session from configuration with real collaborators: a
    /// filesystem store (degrading to memory-only when unavailable), the
    /// HTTP pack fetcher, the system clock, and the configured generator
    /// command if any.
    #[must_use]
    pub fn open(config: &Config) -> Self {
        let store: Arc<dyn KvStore> = match FsStore::open(config.data_dir()) {
            Ok(store) => Arc::new(store),
            Err(err) => {
                warn!(error = %err, "persistent storage unavailable, state will not survive this run");
                Arc::new(MemoryStore::new())
            }
        };
        let fetcher: Arc<dyn PackFetcher> = match HttpPackFetcher::new(&config.remote.base_url) {
            Ok(fetcher) => Arc::new(fetcher),
            Err(err) => {
                warn!(error = %err, "HTTP client unavailable, pack downloads disabled");
                Arc::new(OfflineFetcher)
            }
        };
        let muse = config.muse.as_ref().map(|section| {
            let backend: Arc<dyn MuseBackend> = Arc::new(
                CommandMuse::new(&section.command, section.args.clone())
                    .with_timeout(Duration::from_secs(section.timeout_secs)),
            );
            backend
        });
        Self::assemble(store, fetcher, muse, Arc::new(SystemClock), config)
    }

    /// Wire a session from explicit collaborators. Tests inject fakes here.
    #[must_use]
    pub fn assemble(
        store: Arc<dyn KvStore>,
        fetcher: Arc<dyn PackFetcher>,
        muse: Option<Arc<dyn MuseBackend>>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        let supply = SupplyManager::new(
            Arc::clone(&store),
            fetcher,
            muse,
            config.supply_config(),
        );
        let limiter = RateLimiter::load(Arc::clone(&store), clock, config.limiter_config());
        let history = History::load(Arc::clone(&store), config.history.max_entries);
        Self {
            store,
            supply,
            limiter,
            history,
        }
    }

    /// One-time startup work: clear deprecated keys from earlier storage
    /// schemes, then make sure the very first press has content.
    pub async fn bootstrap(&self) {
        for &key in LEGACY_KEYS {
            if let Err(err) = self.store.remove(key) {
                debug!(key, error = %err, "could not remove legacy key");
            }
        }
        self.supply.bootstrap().await;
    }

    /// One button press: gate on the limiter, then serve an idea.
    pub async fn press(&mut self) -> PressOutcome {
        if self.limiter.is_limit_reached() {
            return match self.limiter.register_post_limit_press() {
                Escalation::Crash => PressOutcome::Crashed,
                Escalation::Warning(message) => PressOutcome::Throttled {
                    message,
                    reset_in: self.limiter.time_to_reset(),
                },
            };
        }
        self.limiter.register_press();
        let remaining = self.limiter.remaining_allowance();
        match self.supply.get_idea().await {
            Some(text) => {
                self.history.push(&text);
                PressOutcome::Idea { text, remaining }
            }
            None => PressOutcome::Dry { remaining },
        }
    }

    /// Current allowance and supply totals. Observing status is enough to
    /// collapse an expired window back to Open.
    pub fn status(&mut self) -> StatusReport {
        let limit_reached = self.limiter.is_limit_reached();
        StatusReport {
            limit: self.limiter.limit(),
            remaining_allowance: self.limiter.remaining_allowance(),
            limit_reached,
            reset_in: self.limiter.time_to_reset(),
            total_ideas: self.supply.total_remaining(),
            packs: self.supply.pack_counts(),
        }
    }

    #[must_use]
    pub fn history(&self) -> &[String] {
        self.history.entries()
    }

    #[must_use]
    pub fn packs(&self) -> Vec<(String, usize)> {
        self.supply.pack_counts()
    }

    #[must_use]
    pub fn total_ideas(&self) -> usize {
        self.supply.total_remaining()
    }

    /// Force one replenish cycle and wait for it.
    pub async fn refresh(&self) {
        self.supply.replenish().await;
    }

    /// Await background replenishment before the process exits. Never
    /// called before rendering output.
    pub async fn drain_background(&self) {
        self.supply.drain_background().await;
    }

    /// The hard reset the crash demands: delete all persisted state and
    /// zero the in-memory counters.
    pub fn reset(&mut self) {
        self.supply.clear();
        self.history.clear();
        self.limiter.reset();
        if let Err(err) = self.store.remove(musebox_limiter::STATE_KEY) {
            warn!(error = %err, "could not remove persisted rate-limit state");
        }
    }

    /// The supply manager, exposed for tests and the `refresh` command.
    #[must_use]
    pub fn supply(&self) -> &Arc<SupplyManager> {
        &self.supply
    }
}

/// Stand-in fetcher when the HTTP client cannot be built: the network is
/// simply "unavailable", which the supply treats as it would any outage.
struct OfflineFetcher;

#[async_trait]
impl PackFetcher for OfflineFetcher {
    async fn fetch_index(&self) -> Option<PackIndex> {
        None
    }

    async fn fetch_pack(&self, _file: &str) -> Option<RemotePack> {
        None
    }
}
