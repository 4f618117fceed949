// src/models/mod.rs

//! Domain models for the lotwatch crate.
//!
//! This module contains the persisted shapes (auctions, lots, sync runs),
//! the parser output types, and the TOML configuration layer.

mod auction;
mod config;
mod listing;
mod run;

// Re-export all public types
pub use auction::{Auction, Lot, LotState};
pub use config::{
    ConcurrencyBackend, Config, DetailSelectors, FetchConfig, ParserConfig, SyncConfig,
    WorkerConfig,
};
pub use listing::{ListingEntry, LotDetail, ParsedListing};
pub use run::{RunCounters, RunStatus, SyncRun, SyncRunResult};
