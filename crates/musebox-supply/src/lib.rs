//! Idea supply for musebox
//!
//! Owns the in-memory pool of idea strings partitioned into named content
//! packs, replenishes it from a remote pack network in the background, keeps
//! a bounded history of served ideas, and exposes the seam for an optional
//! external idea generator. Everything here is fail-soft: network and
//! storage trouble degrade to "fewer ideas", never to an error the caller
//! has to handle.

pub mod fetch;
pub mod history;
pub mod manager;
pub mod muse;
pub mod pack;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use fetch::{FetchError, HttpPackFetcher, PackFetcher, PackIndex, RemotePack};
pub use history::History;
pub use manager::{SupplyConfig, SupplyManager};
pub use muse::{CommandMuse, MuseBackend, MuseError};
pub use pack::{PACK_KEY_PREFIX, Pack, PackRepository};
