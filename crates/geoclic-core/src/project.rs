//! # Projects and Permission Grants
//!
//! Projects group observations for one collectivity. A [`PermissionGrant`]
//! narrows what a non-administrator may see along two axes: projects and
//! classification codes. `None` on an axis means unrestricted.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::LngLat;

/// Geographic extent of a project.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Midpoint of the box, used as the origin of radius filters.
    pub fn center(&self) -> LngLat {
        LngLat::new(
            (self.min_lng + self.max_lng) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }

    /// Build a box from optional stored bounds; all four must be present.
    pub fn from_bounds(
        min_lat: Option<f64>,
        max_lat: Option<f64>,
        min_lng: Option<f64>,
        max_lng: Option<f64>,
    ) -> Option<Self> {
        Some(Self {
            min_lat: min_lat?,
            max_lat: max_lat?,
            min_lng: min_lng?,
            max_lng: max_lng?,
        })
    }
}

/// Project metadata delivered to field clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Name of the local authority the project belongs to.
    pub collectivity_name: Option<String>,
    /// Free-text project status label.
    pub status: Option<String>,
    pub active: bool,
    pub bbox: Option<BoundingBox>,
}

/// The caller's authorization scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PermissionGrant {
    /// Permitted projects; `None` = all.
    pub projects: Option<BTreeSet<Uuid>>,
    /// Permitted classification codes; `None` = all.
    pub categories: Option<BTreeSet<String>>,
}

impl PermissionGrant {
    /// A grant with no restriction on either axis.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Whether neither axis is restricted.
    pub fn is_unrestricted(&self) -> bool {
        self.projects.is_none() && self.categories.is_none()
    }

    /// Whether the grant covers `project`.
    pub fn allows_project(&self, project: Uuid) -> bool {
        self.projects.as_ref().map_or(true, |set| set.contains(&project))
    }

    /// Whether the grant covers classification `code`.
    pub fn allows_category(&self, code: &str) -> bool {
        self.categories.as_ref().map_or(true, |set| set.contains(code))
    }

    /// Keep only the projects this grant covers.
    pub fn filter_projects(&self, projects: Vec<Project>) -> Vec<Project> {
        projects
            .into_iter()
            .filter(|p| self.allows_project(p.id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(id: Uuid) -> Project {
        Project {
            id,
            name: "Street lighting 2024".into(),
            description: None,
            collectivity_name: Some("Ville de Lyon".into()),
            status: Some("active".into()),
            active: true,
            bbox: None,
        }
    }

    #[test]
    fn bbox_center_is_storage_order() {
        let b = BoundingBox {
            min_lat: 45.0,
            max_lat: 46.0,
            min_lng: 4.0,
            max_lng: 5.0,
        };
        assert_eq!(b.center(), LngLat::new(4.5, 45.5));
    }

    #[test]
    fn partial_bounds_yield_no_box() {
        assert!(BoundingBox::from_bounds(Some(1.0), Some(2.0), None, Some(3.0)).is_none());
        assert!(BoundingBox::from_bounds(Some(1.0), Some(2.0), Some(3.0), Some(4.0)).is_some());
    }

    #[test]
    fn unrestricted_allows_everything() {
        let g = PermissionGrant::unrestricted();
        assert!(g.is_unrestricted());
        assert!(g.allows_project(Uuid::new_v4()));
        assert!(g.allows_category("ANY"));
    }

    #[test]
    fn project_axis_filters() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let g = PermissionGrant {
            projects: Some([a].into_iter().collect()),
            categories: None,
        };
        assert!(g.allows_project(a));
        assert!(!g.allows_project(b));
        let kept = g.filter_projects(vec![project(a), project(b)]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, a);
    }

    #[test]
    fn empty_set_allows_nothing() {
        let g = PermissionGrant {
            projects: Some(BTreeSet::new()),
            categories: Some(BTreeSet::new()),
        };
        assert!(!g.allows_project(Uuid::new_v4()));
        assert!(!g.allows_category("LAMP"));
        assert!(!g.is_unrestricted());
    }
}
