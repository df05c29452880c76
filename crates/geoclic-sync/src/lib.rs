//! # geoclic-sync — Offline-First Sync Engine
//!
//! Reconciles batches of offline edits from field clients with the central
//! observation store and ships back what changed server-side.
//!
//! ## Flow of one sync session
//!
//! ```text
//! open audit record (own commit)
//!   └─ begin outer transaction
//!        ├─ creates  ─┐
//!        ├─ updates  ─┼─ one savepoint per item
//!        ├─ deletes  ─┘
//!        ├─ delta since cursor (newest first, capped)
//!        ├─ taxonomy version check → reference data
//!        └─ close audit record
//!      commit
//! server_time = now()
//! ```
//!
//! Storage is reached only through the [`SyncStore`] and [`SyncTransaction`]
//! ports. [`MemoryStore`] implements them in-process; the HTTP service
//! provides a PostgreSQL adapter.

pub mod config;
pub mod delta;
pub mod dto;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod moderation;
pub mod package;
pub mod principal;
pub mod reference;
pub mod session;
pub mod store;
pub mod uploader;

pub use config::SyncConfig;
pub use dto::{
    CategoryOutcome, CreatedRecord, ModerationRequest, OfflinePackage, PackageRequest,
    SyncOutcomes, SyncRequest, SyncResponse, SyncStatus,
};
pub use error::{StoreError, SyncError};
pub use memory::MemoryStore;
pub use principal::{Principal, Role};
pub use session::SyncEngine;
pub use store::{
    DeleteOutcome, RadiusFilter, SavepointId, SyncSessionRecord, SyncStore, SyncTransaction,
};
