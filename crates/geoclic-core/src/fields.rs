//! # Dynamic Form Fields
//!
//! A [`DynamicFieldConfig`] describes one extra form field shown when a
//! collector picks a given taxonomy code. Values end up in an observation's
//! `custom_properties` map under the field's `name`.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::FieldValueError;

/// Input widget and value type of a dynamic field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Select,
    Multiselect,
    Boolean,
    Photo,
    Textarea,
}

impl FieldType {
    /// Return the string stored in the `field_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::Select => "select",
            Self::Multiselect => "multiselect",
            Self::Boolean => "boolean",
            Self::Photo => "photo",
            Self::Textarea => "textarea",
        }
    }
}

impl std::str::FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "number" => Ok(Self::Number),
            "date" => Ok(Self::Date),
            "select" => Ok(Self::Select),
            "multiselect" => Ok(Self::Multiselect),
            "boolean" => Ok(Self::Boolean),
            "photo" => Ok(Self::Photo),
            "textarea" => Ok(Self::Textarea),
            other => Err(format!("unknown field type: {other}")),
        }
    }
}

/// Comparison used by a [`VisibilityRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    In,
    NotIn,
    IsSet,
    IsNotSet,
}

impl std::str::FromStr for ConditionOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equals" => Ok(Self::Equals),
            "not_equals" => Ok(Self::NotEquals),
            "in" => Ok(Self::In),
            "not_in" => Ok(Self::NotIn),
            "is_set" => Ok(Self::IsSet),
            "is_not_set" => Ok(Self::IsNotSet),
            other => Err(format!("unknown condition operator: {other}")),
        }
    }
}

/// Show a field only when another field's value satisfies a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct VisibilityRule {
    /// Name of the field the rule reads.
    pub field: String,
    pub operator: ConditionOperator,
    /// Comparison operands; ignored by `is_set` / `is_not_set`.
    #[serde(default)]
    pub values: Vec<String>,
}

impl VisibilityRule {
    /// Evaluate the rule against a property map.
    pub fn is_satisfied(&self, properties: &Map<String, Value>) -> bool {
        let current = properties.get(&self.field).and_then(scalar_text);
        match self.operator {
            ConditionOperator::IsSet => current.is_some(),
            ConditionOperator::IsNotSet => current.is_none(),
            ConditionOperator::Equals => {
                matches!((&current, self.values.first()), (Some(c), Some(v)) if c == v)
            }
            ConditionOperator::NotEquals => {
                !matches!((&current, self.values.first()), (Some(c), Some(v)) if c == v)
            }
            ConditionOperator::In => current.is_some_and(|c| self.values.contains(&c)),
            ConditionOperator::NotIn => !current.is_some_and(|c| self.values.contains(&c)),
        }
    }
}

/// Text form of a scalar property; `None` for null, blank or structured values.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// One dynamic field definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DynamicFieldConfig {
    pub id: Uuid,
    /// Taxonomy code whose form shows this field.
    pub taxonomy_code: String,
    /// Key in `custom_properties`.
    pub name: String,
    pub label: String,
    pub field_type: FieldType,
    pub required: bool,
    pub display_order: i32,
    /// Choices for `select` / `multiselect`.
    #[serde(default)]
    pub options: Vec<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub default_value: Option<String>,
    pub unit: Option<String>,
    pub help_text: Option<String>,
    /// Client-evaluated formula for computed fields.
    pub formula: Option<String>,
    pub active: bool,
    /// Owning project; `None` for global definitions.
    pub project_id: Option<Uuid>,
    pub visibility: Option<VisibilityRule>,
}

impl DynamicFieldConfig {
    /// Whether the field is shown for the given property map.
    pub fn is_visible(&self, properties: &Map<String, Value>) -> bool {
        self.visibility
            .as_ref()
            .map_or(true, |rule| rule.is_satisfied(properties))
    }

    /// Check a submitted value against the field's type and constraints.
    pub fn check_value(&self, value: Option<&Value>) -> Result<(), FieldValueError> {
        let value = match value {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::Array(a)) if a.is_empty() => None,
            Some(v) => Some(v),
        };
        let Some(value) = value else {
            return if self.required {
                Err(FieldValueError::Required(self.name.clone()))
            } else {
                Ok(())
            };
        };

        match self.field_type {
            FieldType::Text | FieldType::Textarea => {
                value.as_str().map(|_| ()).ok_or_else(|| self.wrong_type("a string"))
            }
            FieldType::Boolean => value.as_bool().map(|_| ()).ok_or_else(|| self.wrong_type("a boolean")),
            FieldType::Number => {
                let n = value.as_f64().ok_or_else(|| self.wrong_type("a number"))?;
                self.check_range(n)
            }
            FieldType::Date => {
                let s = value.as_str().ok_or_else(|| self.wrong_type("a date string"))?;
                let parses = NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
                    || DateTime::parse_from_rfc3339(s).is_ok();
                if parses {
                    Ok(())
                } else {
                    Err(self.wrong_type("a YYYY-MM-DD or RFC 3339 date"))
                }
            }
            FieldType::Select => {
                let s = value.as_str().ok_or_else(|| self.wrong_type("a string"))?;
                self.check_option(s)
            }
            FieldType::Multiselect => {
                let items = value.as_array().ok_or_else(|| self.wrong_type("an array of strings"))?;
                for item in items {
                    let s = item.as_str().ok_or_else(|| self.wrong_type("an array of strings"))?;
                    self.check_option(s)?;
                }
                Ok(())
            }
            FieldType::Photo => match value {
                Value::String(_) => Ok(()),
                Value::Array(items) if items.iter().all(Value::is_string) => Ok(()),
                _ => Err(self.wrong_type("an attachment reference or list of references")),
            },
        }
    }

    fn wrong_type(&self, expected: &'static str) -> FieldValueError {
        FieldValueError::WrongType {
            field: self.name.clone(),
            expected,
        }
    }

    fn check_range(&self, n: f64) -> Result<(), FieldValueError> {
        let min = self.min_value.unwrap_or(f64::NEG_INFINITY);
        let max = self.max_value.unwrap_or(f64::INFINITY);
        if n < min || n > max {
            return Err(FieldValueError::OutOfRange {
                field: self.name.clone(),
                value: n,
                min,
                max,
            });
        }
        Ok(())
    }

    fn check_option(&self, s: &str) -> Result<(), FieldValueError> {
        if self.options.is_empty() || self.options.iter().any(|o| o == s) {
            Ok(())
        } else {
            Err(FieldValueError::NotAnOption {
                field: self.name.clone(),
                value: s.to_string(),
            })
        }
    }
}

/// Active field definitions applicable to `project` (its own plus global).
///
/// Without a project every active definition is returned.
pub fn applicable(configs: &[DynamicFieldConfig], project: Option<Uuid>) -> Vec<&DynamicFieldConfig> {
    configs
        .iter()
        .filter(|c| c.active)
        .filter(|c| match project {
            Some(p) => c.project_id.is_none() || c.project_id == Some(p),
            None => true,
        })
        .collect()
}

/// Validate a property map against the visible fields of one taxonomy code.
///
/// Hidden fields are not checked. All failures are returned.
pub fn validate_properties(
    configs: &[&DynamicFieldConfig],
    taxonomy_code: &str,
    properties: &Map<String, Value>,
) -> Vec<FieldValueError> {
    configs
        .iter()
        .filter(|c| c.taxonomy_code == taxonomy_code)
        .filter(|c| c.is_visible(properties))
        .filter_map(|c| c.check_value(properties.get(&c.name)).err())
        .collect()
}
