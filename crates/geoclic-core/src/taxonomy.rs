//! # Classification Taxonomy
//!
//! A tree of [`TaxonomyEntry`] records (category → type → subtype …) linked
//! by parent code. Children are never stored; they are derived with
//! [`children_of`]. Entries are either global (`project_id = None`) or scoped
//! to one project.
//!
//! [`TaxonomyVersion`] fingerprints the whole active taxonomy so that clients
//! can skip re-downloading reference data that has not changed.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::TaxonomyError;

/// Number of hex characters kept from the SHA-256 digest.
const VERSION_HEX_LEN: usize = 16;

/// A display colour stored as a signed ARGB integer.
///
/// Serialized to clients as `#rrggbb`; the alpha channel is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color(i64);

impl Color {
    /// Wrap a stored ARGB value.
    pub fn from_argb(value: i64) -> Self {
        Self(value)
    }

    /// The stored ARGB value.
    pub fn argb(&self) -> i64 {
        self.0
    }

    /// Render as `#rrggbb`.
    pub fn to_hex(&self) -> String {
        format!("#{:06x}", self.0 & 0x00FF_FFFF)
    }

    /// Parse `#rrggbb` (or `rrggbb`) into an opaque colour.
    pub fn parse_hex(s: &str) -> Option<Self> {
        let digits = s.strip_prefix('#').unwrap_or(s);
        if digits.len() != 6 {
            return None;
        }
        let rgb = i64::from_str_radix(digits, 16).ok()?;
        Some(Self(0xFF00_0000 | rgb))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Color::parse_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid colour \"{s}\"")))
    }
}

/// One node of the classification tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TaxonomyEntry {
    pub id: Uuid,
    /// Unique code within its scope; observations reference it.
    pub code: String,
    pub label: String,
    /// Parent code; `None` for roots.
    pub parent_code: Option<String>,
    /// Depth in the tree; roots are level 0.
    pub level: i32,
    pub display_order: i32,
    pub icon: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, example = "#ff8800"))]
    pub color: Option<Color>,
    pub active: bool,
    /// Whether selecting this entry opens a dynamic form.
    pub triggers_form: bool,
    /// Owning project; `None` for the global taxonomy.
    pub project_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

/// Active entries visible from `project`: the project's own plus global ones.
///
/// Without a project every active entry is returned.
pub fn scoped(entries: &[TaxonomyEntry], project: Option<Uuid>) -> Vec<&TaxonomyEntry> {
    entries
        .iter()
        .filter(|e| e.active)
        .filter(|e| match project {
            Some(p) => e.project_id.is_none() || e.project_id == Some(p),
            None => true,
        })
        .collect()
}

/// Direct children of `code`, in display order.
pub fn children_of<'a>(entries: &'a [TaxonomyEntry], code: &str) -> Vec<&'a TaxonomyEntry> {
    let mut children: Vec<_> = entries
        .iter()
        .filter(|e| e.parent_code.as_deref() == Some(code))
        .collect();
    children.sort_by(|a, b| a.display_order.cmp(&b.display_order).then(a.code.cmp(&b.code)));
    children
}

/// Check that the parent graph is acyclic, rooted and level-consistent.
///
/// A scoped entry may hang under a global parent; a global entry may only
/// hang under another global entry.
pub fn validate_tree(entries: &[TaxonomyEntry]) -> Result<(), TaxonomyError> {
    let mut index: ScopeIndex<'_> = HashMap::new();
    for e in entries {
        if index.insert((e.project_id, e.code.as_str()), e).is_some() {
            return Err(TaxonomyError::DuplicateCode(e.code.clone()));
        }
    }

    for e in entries {
        let mut seen: HashSet<(Option<Uuid>, &str)> = HashSet::new();
        seen.insert((e.project_id, e.code.as_str()));
        let mut cursor = e;
        while let Some(parent) = parent_of(&index, cursor)? {
            if !seen.insert((parent.project_id, parent.code.as_str())) {
                return Err(TaxonomyError::Cycle(e.code.clone()));
            }
            cursor = parent;
        }

        let expected = match parent_of(&index, e)? {
            Some(parent) => parent.level + 1,
            None => 0,
        };
        if e.level != expected {
            return Err(TaxonomyError::LevelMismatch {
                code: e.code.clone(),
                expected,
                actual: e.level,
            });
        }
    }
    Ok(())
}

type ScopeIndex<'a> = HashMap<(Option<Uuid>, &'a str), &'a TaxonomyEntry>;

fn parent_of<'a>(
    index: &ScopeIndex<'a>,
    e: &'a TaxonomyEntry,
) -> Result<Option<&'a TaxonomyEntry>, TaxonomyError> {
    let Some(parent) = e.parent_code.as_deref() else {
        return Ok(None);
    };
    let found = index
        .get(&(e.project_id, parent))
        .or_else(|| index.get(&(None, parent)))
        .copied();
    match found {
        Some(p) => Ok(Some(p)),
        None => Err(TaxonomyError::DanglingParent {
            code: e.code.clone(),
            parent: parent.to_string(),
        }),
    }
}

/// Deterministic fingerprint of the active taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxonomyVersion(String);

impl TaxonomyVersion {
    /// Fingerprint every active entry, regardless of project scope.
    ///
    /// Lines `code:label:updated_at` (RFC 3339, microseconds) are ordered by
    /// code then project scope, joined with `|`, hashed with SHA-256 and
    /// truncated to 16 hex characters.
    pub fn compute(entries: &[TaxonomyEntry]) -> Self {
        let mut active: Vec<&TaxonomyEntry> = entries.iter().filter(|e| e.active).collect();
        active.sort_by(|a, b| {
            a.code
                .cmp(&b.code)
                .then(a.project_id.cmp(&b.project_id))
                .then(a.label.cmp(&b.label))
                .then(a.updated_at.cmp(&b.updated_at))
        });

        let canonical = active
            .iter()
            .map(|e| {
                format!(
                    "{}:{}:{}",
                    e.code,
                    e.label,
                    e.updated_at.to_rfc3339_opts(SecondsFormat::Micros, true)
                )
            })
            .collect::<Vec<_>>()
            .join("|");

        let digest = Sha256::digest(canonical.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        Self(hex[..VERSION_HEX_LEN].to_string())
    }

    /// The fingerprint string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a client-reported version equals this one. `None` never matches.
    pub fn matches(&self, client: Option<&str>) -> bool {
        client == Some(self.0.as_str())
    }
}

impl fmt::Display for TaxonomyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<TaxonomyVersion> for String {
    fn from(v: TaxonomyVersion) -> Self {
        v.0
    }
}
