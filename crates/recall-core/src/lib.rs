//! recall-core - Core library for Recall
//!
//! This crate contains the shared models, local database layer, and the
//! offline-first sync engine used by all Recall clients (mobile, CLI).
//! Clients write locally first; the sync engine reconciles with the remote
//! API whenever connectivity allows.

pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod review;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Entry, EntityKind, SyncStatus};
