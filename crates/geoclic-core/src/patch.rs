//! # Sparse Update Masks
//!
//! A client update is a JSON object carrying an `id` plus any subset of the
//! mutable observation fields. Decoding goes in two steps:
//!
//! 1. [`UpdateItem::from_value`] splits off the `id` and decodes the rest into
//!    an [`ObservationPatch`]. The patch type denies unknown fields, so keys
//!    such as `status`, `created_by` or `id` inside the mask never reach
//!    storage.
//! 2. [`ValidatedPatch::new`] checks the present fields against the stored
//!    geometry kind and produces the list of [`MutableField`]s to write.
//!
//! Absent and `null` values both mean "leave unchanged".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{PatchError, ValidationError};
use crate::geometry::{Geometry, GeometryKind, LatLng, RingClosure};
use crate::observation::{check_text, Attachment, Observation, KIND_MAX_LEN, NAME_MAX_LEN};

/// The allow-list of client-mutable fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(deny_unknown_fields)]
pub struct ObservationPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub classification_code: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub geometry_kind: Option<GeometryKind>,
    #[serde(default)]
    pub coordinates: Option<Vec<LatLng>>,
    #[serde(default)]
    pub gps_precision: Option<f64>,
    #[serde(default)]
    pub gps_source: Option<String>,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub condition_state: Option<String>,
    #[serde(default)]
    pub asset_status: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub install_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub replacement_cost: Option<f64>,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub custom_properties: Option<Map<String, Value>>,
    #[serde(default)]
    pub attachments: Option<Vec<Attachment>>,
}

/// One decoded update: target id plus field mask.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateItem {
    /// The observation to modify.
    pub id: Uuid,
    /// The fields to overwrite.
    pub patch: ObservationPatch,
}

impl UpdateItem {
    /// Decode a raw update object.
    pub fn from_value(value: Value) -> Result<Self, PatchError> {
        let Value::Object(mut map) = value else {
            return Err(PatchError::NotAnObject);
        };
        let id = match map.remove("id") {
            None | Some(Value::Null) => return Err(PatchError::MissingId),
            Some(Value::String(s)) => {
                Uuid::parse_str(&s).map_err(|_| PatchError::InvalidId(s.clone()))?
            }
            Some(other) => return Err(PatchError::InvalidId(other.to_string())),
        };
        let patch = serde_json::from_value(Value::Object(map))
            .map_err(|e| PatchError::Decode(e.to_string()))?;
        Ok(Self { id, patch })
    }

    /// The raw `id` of an update object, for labelling errors before decoding.
    pub fn raw_id(value: &Value) -> Option<String> {
        match value.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// A mutable column, as written by a storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutableField {
    Name,
    ClassificationCode,
    Kind,
    Subtype,
    /// Geometry kind and coordinates together.
    Geometry,
    GpsPrecision,
    GpsSource,
    Altitude,
    ConditionState,
    AssetStatus,
    Comment,
    Material,
    Height,
    Width,
    InstallDate,
    Priority,
    ReplacementCost,
    CustomProperties,
    Attachments,
}

impl MutableField {
    /// Storage column name. `Geometry` maps to `geom`; backends also write
    /// `geom_type` alongside it.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::ClassificationCode => "classification_code",
            Self::Kind => "kind",
            Self::Subtype => "subtype",
            Self::Geometry => "geom",
            Self::GpsPrecision => "gps_precision",
            Self::GpsSource => "gps_source",
            Self::Altitude => "altitude",
            Self::ConditionState => "condition_state",
            Self::AssetStatus => "asset_status",
            Self::Comment => "comment",
            Self::Material => "material",
            Self::Height => "height",
            Self::Width => "width",
            Self::InstallDate => "install_date",
            Self::Priority => "priority",
            Self::ReplacementCost => "replacement_cost",
            Self::CustomProperties => "custom_properties",
            Self::Attachments => "attachments",
        }
    }
}

/// A patch that passed validation against the stored record's geometry kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPatch {
    patch: ObservationPatch,
    geometry: Option<Geometry>,
    fields: Vec<MutableField>,
}

impl ValidatedPatch {
    /// Validate `patch` for a record whose current geometry kind is
    /// `current_kind`.
    ///
    /// Replacement coordinates without a `geometry_kind` are validated
    /// against the current kind.
    pub fn new(
        patch: ObservationPatch,
        current_kind: GeometryKind,
        closure: RingClosure,
    ) -> Result<Self, ValidationError> {
        if let Some(name) = &patch.name {
            check_text("name", name, NAME_MAX_LEN)?;
        }
        if let Some(kind) = &patch.kind {
            check_text("kind", kind, KIND_MAX_LEN)?;
        }

        let geometry = match (patch.geometry_kind, &patch.coordinates) {
            (Some(_), None) => return Err(PatchError::KindWithoutCoordinates.into()),
            (kind, Some(coords)) => Some(Geometry::from_wire(
                kind.unwrap_or(current_kind),
                coords,
                closure,
            )?),
            (None, None) => None,
        };

        let p = &patch;
        let present = [
            (p.name.is_some(), MutableField::Name),
            (p.classification_code.is_some(), MutableField::ClassificationCode),
            (p.kind.is_some(), MutableField::Kind),
            (p.subtype.is_some(), MutableField::Subtype),
            (geometry.is_some(), MutableField::Geometry),
            (p.gps_precision.is_some(), MutableField::GpsPrecision),
            (p.gps_source.is_some(), MutableField::GpsSource),
            (p.altitude.is_some(), MutableField::Altitude),
            (p.condition_state.is_some(), MutableField::ConditionState),
            (p.asset_status.is_some(), MutableField::AssetStatus),
            (p.comment.is_some(), MutableField::Comment),
            (p.material.is_some(), MutableField::Material),
            (p.height.is_some(), MutableField::Height),
            (p.width.is_some(), MutableField::Width),
            (p.install_date.is_some(), MutableField::InstallDate),
            (p.priority.is_some(), MutableField::Priority),
            (p.replacement_cost.is_some(), MutableField::ReplacementCost),
            (p.custom_properties.is_some(), MutableField::CustomProperties),
            (p.attachments.is_some(), MutableField::Attachments),
        ];
        let fields: Vec<MutableField> = present
            .into_iter()
            .filter_map(|(set, field)| set.then_some(field))
            .collect();

        if fields.is_empty() {
            return Err(PatchError::Empty.into());
        }

        Ok(Self {
            patch,
            geometry,
            fields,
        })
    }

    /// The fields this patch writes, in column order.
    pub fn fields(&self) -> &[MutableField] {
        &self.fields
    }

    /// The decoded field values.
    pub fn patch(&self) -> &ObservationPatch {
        &self.patch
    }

    /// The validated replacement geometry, if any.
    pub fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }

    /// Overwrite the masked fields of `obs` and stamp the edit.
    pub fn apply_to(&self, obs: &mut Observation, editor: Uuid, at: DateTime<Utc>) {
        let p = self.patch.clone();
        if let Some(v) = p.name {
            obs.name = v.trim().to_string();
        }
        if let Some(v) = p.classification_code {
            obs.classification_code = Some(v);
        }
        if let Some(v) = p.kind {
            obs.kind = v.trim().to_string();
        }
        if let Some(v) = p.subtype {
            obs.subtype = Some(v);
        }
        if let Some(g) = &self.geometry {
            obs.geometry = g.clone();
        }
        if let Some(v) = p.gps_precision {
            obs.gps_precision = Some(v);
        }
        if let Some(v) = p.gps_source {
            obs.gps_source = Some(v);
        }
        if let Some(v) = p.altitude {
            obs.altitude = Some(v);
        }
        if let Some(v) = p.condition_state {
            obs.condition_state = Some(v);
        }
        if let Some(v) = p.asset_status {
            obs.asset_status = Some(v);
        }
        if let Some(v) = p.comment {
            obs.comment = Some(v);
        }
        if let Some(v) = p.material {
            obs.technical.material = Some(v);
        }
        if let Some(v) = p.height {
            obs.technical.height = Some(v);
        }
        if let Some(v) = p.width {
            obs.technical.width = Some(v);
        }
        if let Some(v) = p.install_date {
            obs.technical.install_date = Some(v);
        }
        if let Some(v) = p.priority {
            obs.technical.priority = Some(v);
        }
        if let Some(v) = p.replacement_cost {
            obs.technical.replacement_cost = Some(v);
        }
        if let Some(v) = p.custom_properties {
            obs.custom_properties = v;
        }
        if let Some(v) = p.attachments {
            obs.attachments = v;
        }
        obs.updated_by = Some(editor);
        obs.updated_at = at;
    }
}
