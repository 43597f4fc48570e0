//! musebox - a boredom button for your terminal
//!
//! musebox keeps a local pool of "boredom-busting idea" strings, partitioned
//! into named content packs downloaded from a remote pack network. Pressing
//! the button (`musebox idea`) serves one idea at random, never repeating an
//! idea until its pack is exhausted, and tops the pool up in the background
//! when supply runs low. Press too often and a rolling-window rate limiter
//! pushes back, first politely, then not.
//!
//! # Quick start (CLI)
//!
//! ```bash
//! # Press the button
//! musebox idea
//!
//! # How many presses are left, and when does the window reset?
//! musebox status
//!
//! # Recently served ideas, newest first
//! musebox history
//! ```
//!
//! # Quick start (library)
//!
//! The CLI is a thin layer over [`session::Session`], which wires the
//! member crates together:
//!
//! - [`musebox_store`] - persistent key-value storage (a cache, not a
//!   source of truth; every failure degrades to empty state)
//! - [`musebox_supply`] - content packs, remote replenishment, history,
//!   and the optional external idea generator
//! - [`musebox_limiter`] - the rolling-window press limiter
//!
//! Tests inject fakes (memory store, scripted fetcher, manual clock)
//! through [`session::Session::assemble`].

pub mod cli;
pub mod config;
pub mod session;

pub use musebox_limiter as limiter;
pub use musebox_store as store;
pub use musebox_supply as supply;
