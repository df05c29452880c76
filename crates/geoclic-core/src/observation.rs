//! # Observations
//!
//! An [`Observation`] is one field-collected geographic record. Three shapes
//! exist:
//!
//! - [`NewObservation`] — what a client submits for creation (wire order).
//! - [`Observation`] — the validated domain record (storage order geometry).
//! - [`ObservationView`] — what the server sends back (wire order).
//!
//! Conversions between them go through [`Geometry`]'s wire boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::geometry::{Geometry, GeometryKind, LatLng, RingClosure};
use crate::status::ObservationStatus;

/// Maximum length of an observation name.
pub const NAME_MAX_LEN: usize = 255;
/// Maximum length of an observation kind.
pub const KIND_MAX_LEN: usize = 100;

/// Photo or document reference attached to an observation.
///
/// Only the URL and capture metadata are handled here; binaries live in
/// photo storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Attachment {
    /// Client-assigned attachment id.
    pub id: String,
    /// Location of the binary in photo storage.
    pub url: String,
    /// Thumbnail location, if generated.
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    /// Original file name.
    pub filename: String,
    /// Binary size in bytes.
    #[serde(default)]
    pub size_bytes: Option<i64>,
    /// Capture time reported by the device.
    #[serde(default)]
    pub taken_at: Option<DateTime<Utc>>,
    /// Capture latitude.
    #[serde(default)]
    pub gps_lat: Option<f64>,
    /// Capture longitude.
    #[serde(default)]
    pub gps_lng: Option<f64>,
    /// Capture accuracy in metres.
    #[serde(default)]
    pub gps_accuracy: Option<f64>,
    /// Capturing device model.
    #[serde(default)]
    pub device_model: Option<String>,
    /// Free-text caption.
    #[serde(default)]
    pub comment: Option<String>,
}

/// Technical asset attributes carried by most observations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TechnicalAttributes {
    /// Construction material.
    #[serde(default)]
    pub material: Option<String>,
    /// Height in metres.
    #[serde(default)]
    pub height: Option<f64>,
    /// Width in metres.
    #[serde(default)]
    pub width: Option<f64>,
    /// Installation date.
    #[serde(default)]
    pub install_date: Option<DateTime<Utc>>,
    /// Maintenance priority label.
    #[serde(default)]
    pub priority: Option<String>,
    /// Estimated replacement cost.
    #[serde(default)]
    pub replacement_cost: Option<f64>,
}

/// A creation submitted by a field client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NewObservation {
    /// Owning project.
    #[serde(default)]
    pub project_id: Option<Uuid>,
    /// Human-readable name; used to identify the record in error reports.
    pub name: String,
    /// Taxonomy leaf code.
    #[serde(default)]
    pub classification_code: Option<String>,
    /// Free-text asset kind.
    pub kind: String,
    /// Free-text asset subtype.
    #[serde(default)]
    pub subtype: Option<String>,
    /// Geometry kind; defaults to `POINT`.
    #[serde(default)]
    pub geometry_kind: GeometryKind,
    /// Coordinates in `(lat, lng)` order.
    pub coordinates: Vec<LatLng>,
    /// GPS horizontal precision in metres.
    #[serde(default)]
    pub gps_precision: Option<f64>,
    /// GPS source (device, RTK, manual…).
    #[serde(default)]
    pub gps_source: Option<String>,
    /// Altitude in metres.
    #[serde(default)]
    pub altitude: Option<f64>,
    /// Physical condition label.
    #[serde(default)]
    pub condition_state: Option<String>,
    /// Asset status label (planned, installed…), distinct from lifecycle status.
    #[serde(default)]
    pub asset_status: Option<String>,
    /// Free-text comment.
    #[serde(default)]
    pub comment: Option<String>,
    /// Technical attributes.
    #[serde(flatten)]
    pub technical: TechnicalAttributes,
    /// Dynamic-form values keyed by field name.
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub custom_properties: Map<String, Value>,
    /// Attachment references.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl NewObservation {
    /// Validate the submission and build the stored record in `draft` status.
    pub fn into_observation(
        self,
        id: Uuid,
        owner: Uuid,
        now: DateTime<Utc>,
        closure: RingClosure,
    ) -> Result<Observation, ValidationError> {
        check_text("name", &self.name, NAME_MAX_LEN)?;
        check_text("kind", &self.kind, KIND_MAX_LEN)?;
        let geometry = Geometry::from_wire(self.geometry_kind, &self.coordinates, closure)?;

        Ok(Observation {
            id,
            project_id: self.project_id,
            name: self.name.trim().to_string(),
            classification_code: self.classification_code,
            kind: self.kind.trim().to_string(),
            subtype: self.subtype,
            geometry,
            gps_precision: self.gps_precision,
            gps_source: self.gps_source,
            altitude: self.altitude,
            condition_state: self.condition_state,
            asset_status: self.asset_status,
            comment: self.comment,
            technical: self.technical,
            custom_properties: self.custom_properties,
            attachments: self.attachments,
            status: ObservationStatus::Draft,
            rejection_comment: None,
            created_by: owner,
            updated_by: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Check that a required text field is non-blank and within `max` characters.
pub(crate) fn check_text(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

/// A persisted observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Server identity.
    pub id: Uuid,
    /// Owning project.
    pub project_id: Option<Uuid>,
    /// Human-readable name.
    pub name: String,
    /// Taxonomy leaf code.
    pub classification_code: Option<String>,
    /// Free-text asset kind.
    pub kind: String,
    /// Free-text asset subtype.
    pub subtype: Option<String>,
    /// Validated geometry in storage order.
    pub geometry: Geometry,
    /// GPS horizontal precision in metres.
    pub gps_precision: Option<f64>,
    /// GPS source.
    pub gps_source: Option<String>,
    /// Altitude in metres.
    pub altitude: Option<f64>,
    /// Physical condition label.
    pub condition_state: Option<String>,
    /// Asset status label.
    pub asset_status: Option<String>,
    /// Free-text comment.
    pub comment: Option<String>,
    /// Technical attributes.
    pub technical: TechnicalAttributes,
    /// Dynamic-form values.
    pub custom_properties: Map<String, Value>,
    /// Attachment references.
    pub attachments: Vec<Attachment>,
    /// Lifecycle status.
    pub status: ObservationStatus,
    /// Moderator comment recorded on rejection.
    pub rejection_comment: Option<String>,
    /// Creating principal.
    pub created_by: Uuid,
    /// Last editing principal.
    pub updated_by: Option<Uuid>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time; the delta cursor compares against this.
    pub updated_at: DateTime<Utc>,
}

/// Client-facing representation of an observation, coordinates in `(lat, lng)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ObservationView {
    /// Server identity.
    pub id: Uuid,
    /// Owning project.
    pub project_id: Option<Uuid>,
    /// Human-readable name.
    pub name: String,
    /// Taxonomy leaf code.
    pub classification_code: Option<String>,
    /// Free-text asset kind.
    pub kind: String,
    /// Free-text asset subtype.
    pub subtype: Option<String>,
    /// Geometry kind.
    pub geometry_kind: GeometryKind,
    /// Coordinates in `(lat, lng)` order.
    pub coordinates: Vec<LatLng>,
    /// GPS horizontal precision in metres.
    pub gps_precision: Option<f64>,
    /// GPS source.
    pub gps_source: Option<String>,
    /// Altitude in metres.
    pub altitude: Option<f64>,
    /// Physical condition label.
    pub condition_state: Option<String>,
    /// Asset status label.
    pub asset_status: Option<String>,
    /// Free-text comment.
    pub comment: Option<String>,
    /// Technical attributes.
    #[serde(flatten)]
    pub technical: TechnicalAttributes,
    /// Dynamic-form values.
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub custom_properties: Map<String, Value>,
    /// Attachment references.
    pub attachments: Vec<Attachment>,
    /// Lifecycle status.
    pub status: ObservationStatus,
    /// Moderator comment recorded on rejection.
    pub rejection_comment: Option<String>,
    /// Creating principal.
    pub created_by: Uuid,
    /// Last editing principal.
    pub updated_by: Option<Uuid>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl From<&Observation> for ObservationView {
    fn from(obs: &Observation) -> Self {
        Self {
            id: obs.id,
            project_id: obs.project_id,
            name: obs.name.clone(),
            classification_code: obs.classification_code.clone(),
            kind: obs.kind.clone(),
            subtype: obs.subtype.clone(),
            geometry_kind: obs.geometry.kind(),
            coordinates: obs.geometry.to_wire(),
            gps_precision: obs.gps_precision,
            gps_source: obs.gps_source.clone(),
            altitude: obs.altitude,
            condition_state: obs.condition_state.clone(),
            asset_status: obs.asset_status.clone(),
            comment: obs.comment.clone(),
            technical: obs.technical.clone(),
            custom_properties: obs.custom_properties.clone(),
            attachments: obs.attachments.clone(),
            status: obs.status,
            rejection_comment: obs.rejection_comment.clone(),
            created_by: obs.created_by,
            updated_by: obs.updated_by,
            created_at: obs.created_at,
            updated_at: obs.updated_at,
        }
    }
}

impl From<Observation> for ObservationView {
    fn from(obs: Observation) -> Self {
        Self::from(&obs)
    }
}
