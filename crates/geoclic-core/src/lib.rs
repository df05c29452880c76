//! # geoclic-core — Foundational Types for GeoClic Field Sync
//!
//! This crate defines the domain vocabulary shared by the sync engine and the
//! HTTP service. It performs no I/O and depends only on `serde`, `serde_json`,
//! `thiserror`, `chrono`, `uuid`, and `sha2` (plus `utoipa` behind the
//! `openapi` feature).
//!
//! ## Design Principles
//!
//! 1. **One coordinate boundary.** Clients speak `(latitude, longitude)`
//!    ([`LatLng`]); storage speaks `(longitude, latitude)` ([`LngLat`]).
//!    [`Geometry::from_wire`] and [`Geometry::to_wire`] are the only places
//!    where one becomes the other.
//!
//! 2. **Validated geometry by construction.** A [`Geometry`] cannot exist with
//!    a coordinate count that contradicts its [`GeometryKind`].
//!
//! 3. **Typed update masks.** Sparse client updates decode into an
//!    [`ObservationPatch`] whose fields *are* the allow-list of mutable
//!    columns. Unknown keys are rejected before any storage code runs.
//!
//! 4. **Server-side lifecycle.** [`ObservationStatus`] transitions are only
//!    reachable through [`ModerationAction`]; clients never set status.
//!
//! 5. **Deterministic reference-data versioning.** [`TaxonomyVersion`] is a
//!    pure function of the active taxonomy.

pub mod error;
pub mod fields;
pub mod geometry;
pub mod observation;
pub mod patch;
pub mod project;
pub mod status;
pub mod taxonomy;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{
    FieldValueError, GeometryError, PatchError, TaxonomyError, TransitionError, ValidationError,
};
pub use fields::{ConditionOperator, DynamicFieldConfig, FieldType, VisibilityRule};
pub use geometry::{haversine_km, Geometry, GeometryKind, LatLng, LngLat, RingClosure};
pub use observation::{Attachment, NewObservation, Observation, ObservationView, TechnicalAttributes};
pub use patch::{MutableField, ObservationPatch, UpdateItem, ValidatedPatch};
pub use project::{BoundingBox, PermissionGrant, Project};
pub use status::{ModerationAction, ObservationStatus};
pub use taxonomy::{Color, TaxonomyEntry, TaxonomyVersion};
