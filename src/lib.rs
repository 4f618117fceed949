// src/lib.rs

//! Lotwatch: incremental crawler for paginated auction listings.

pub mod diff;
pub mod error;
pub mod events;
pub mod fetch;
pub mod models;
pub mod parse;
pub mod store;
pub mod sync;
pub mod utils;
pub mod worker;
