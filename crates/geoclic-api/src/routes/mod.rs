//! # API Route Modules
//!
//! - `sync` — sync exchange, offline packages, sync status and the
//!   unfinished-session listing.
//! - `moderation` — observation review lifecycle.
//! - `ops` — operator counters.

pub mod moderation;
pub mod ops;
pub mod sync;
