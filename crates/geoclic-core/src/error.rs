//! # Error Hierarchy
//!
//! Structured validation errors for GeoClic domain types, built with
//! `thiserror`. Each variant carries the offending input so that the sync
//! engine can turn it into a per-item message a field client can show
//! next to the record that failed.

use thiserror::Error;

use crate::geometry::GeometryKind;
use crate::status::ObservationStatus;

/// Top-level validation error for client-submitted records.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Geometry/coordinate coherence failure.
    #[error("invalid geometry: {0}")]
    Geometry(#[from] GeometryError),

    /// Update mask could not be decoded or validated.
    #[error("invalid update: {0}")]
    Patch(#[from] PatchError),

    /// A required text field is missing or blank.
    #[error("field `{0}` must not be empty")]
    EmptyField(&'static str),

    /// A text field exceeds its maximum length.
    #[error("field `{field}` exceeds {max} characters")]
    TooLong {
        /// The field name.
        field: &'static str,
        /// Maximum permitted length in characters.
        max: usize,
    },

    /// The submitted record could not be decoded at all.
    #[error("malformed record: {0}")]
    Malformed(String),
}

/// Geometry validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// Wrong number of coordinates for the geometry kind.
    #[error("{kind} requires {expected} coordinate(s), got {actual}")]
    WrongPointCount {
        /// The geometry kind being built.
        kind: GeometryKind,
        /// Human-readable expectation ("exactly 1", "at least 2").
        expected: &'static str,
        /// The number of coordinates supplied.
        actual: usize,
    },

    /// Polygon ring has fewer than four positions after closure.
    #[error("POLYGON ring requires at least 4 positions (closed), got {actual}")]
    TooFewRingPoints {
        /// Number of positions in the ring.
        actual: usize,
    },

    /// Polygon ring is not closed and auto-closing is disabled.
    #[error("POLYGON ring is not closed: first and last coordinates differ")]
    UnclosedRing,

    /// Latitude or longitude outside the WGS84 range.
    #[error("coordinate out of range: latitude {latitude}, longitude {longitude}")]
    OutOfRange {
        /// The offending latitude.
        latitude: f64,
        /// The offending longitude.
        longitude: f64,
    },

    /// NaN or infinite coordinate value.
    #[error("coordinate is not a finite number")]
    NonFinite,

    /// Unknown geometry kind name.
    #[error("unknown geometry kind \"{0}\" (expected POINT, LINESTRING or POLYGON)")]
    UnknownKind(String),

    /// Stored geometry could not be decoded.
    #[error("malformed stored geometry: {0}")]
    MalformedStorage(String),
}

/// Errors raised while decoding or validating a sparse update.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatchError {
    /// The update item is not a JSON object.
    #[error("update must be a JSON object")]
    NotAnObject,

    /// The update item carries no `id`.
    #[error("update is missing the required `id`")]
    MissingId,

    /// The `id` is not a UUID.
    #[error("update id \"{0}\" is not a valid UUID")]
    InvalidId(String),

    /// Decoding into the field mask failed (unknown or immutable key, wrong type).
    #[error("{0}")]
    Decode(String),

    /// The update names no mutable field.
    #[error("update carries no mutable fields")]
    Empty,

    /// A geometry kind was supplied without replacement coordinates.
    #[error("`geometry_kind` can only change together with `coordinates`")]
    KindWithoutCoordinates,
}

/// Errors raised by the observation status state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The attempted transition is not an edge of the lifecycle graph.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: ObservationStatus,
        /// Attempted target status.
        to: ObservationStatus,
    },

    /// The observation is in a terminal status.
    #[error("observation is in terminal status {0}")]
    Terminal(ObservationStatus),
}

/// Structural errors in the classification tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaxonomyError {
    /// Two entries share a code within the same scope.
    #[error("duplicate taxonomy code \"{0}\" within one scope")]
    DuplicateCode(String),

    /// An entry names a parent that does not exist in its scope or globally.
    #[error("taxonomy entry \"{code}\" references missing parent \"{parent}\"")]
    DanglingParent {
        /// The child code.
        code: String,
        /// The missing parent code.
        parent: String,
    },

    /// An entry's level is not its parent's level plus one.
    #[error("taxonomy entry \"{code}\" has level {actual}, expected {expected}")]
    LevelMismatch {
        /// The entry code.
        code: String,
        /// The level implied by its parent.
        expected: i32,
        /// The stored level.
        actual: i32,
    },

    /// Following parent links returns to a code already visited.
    #[error("taxonomy cycle detected through \"{0}\"")]
    Cycle(String),
}

/// A custom property value that does not fit its dynamic field definition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldValueError {
    /// A required field is missing, null or blank.
    #[error("field `{0}` is required")]
    Required(String),

    /// The value has the wrong JSON type for the field.
    #[error("field `{field}` expects {expected}")]
    WrongType {
        /// The field name.
        field: String,
        /// Human-readable expected type.
        expected: &'static str,
    },

    /// A numeric value falls outside the configured bounds.
    #[error("field `{field}` value {value} is outside [{min}, {max}]")]
    OutOfRange {
        /// The field name.
        field: String,
        /// The submitted value.
        value: f64,
        /// Lower bound (or -inf).
        min: f64,
        /// Upper bound (or +inf).
        max: f64,
    },

    /// A select value is not one of the configured options.
    #[error("field `{field}` does not accept \"{value}\"")]
    NotAnOption {
        /// The field name.
        field: String,
        /// The rejected option.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_error_wraps_into_validation_error() {
        let err: ValidationError = GeometryError::UnclosedRing.into();
        let msg = err.to_string();
        assert!(msg.starts_with("invalid geometry"));
        assert!(msg.contains("not closed"));
    }

    #[test]
    fn wrong_point_count_names_kind() {
        let err = GeometryError::WrongPointCount {
            kind: GeometryKind::Point,
            expected: "exactly 1",
            actual: 3,
        };
        assert_eq!(err.to_string(), "POINT requires exactly 1 coordinate(s), got 3");
    }

    #[test]
    fn transition_error_display() {
        let err = TransitionError::InvalidTransition {
            from: ObservationStatus::Draft,
            to: ObservationStatus::Published,
        };
        assert_eq!(err.to_string(), "invalid status transition from draft to published");
    }

    #[test]
    fn taxonomy_error_display() {
        let err = TaxonomyError::DanglingParent {
            code: "LAMP".into(),
            parent: "LIGHTING".into(),
        };
        assert!(err.to_string().contains("LIGHTING"));
    }
}
