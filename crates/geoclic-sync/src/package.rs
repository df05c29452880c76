//! # Offline Package Assembler
//!
//! Builds the bootstrap snapshot a client downloads before going offline:
//! reference data, the permitted project list, the caller's grant and,
//! optionally, one project's observations around its centre.

use chrono::Utc;
use geoclic_core::fields::applicable;
use geoclic_core::taxonomy::scoped;
use geoclic_core::{ObservationView, TaxonomyVersion};

use crate::dto::{OfflinePackage, PackageRequest};
use crate::error::SyncError;
use crate::principal::Principal;
use crate::reference::{covered_categories, grant_for, permitted_entries, visible_projects};
use crate::store::{RadiusFilter, SyncStore};

/// Assemble the offline package for `principal`.
pub async fn assemble(
    store: &dyn SyncStore,
    principal: &Principal,
    request: PackageRequest,
    point_limit: usize,
) -> Result<OfflinePackage, SyncError> {
    if let Some(r) = request.radius_km {
        if !r.is_finite() || r <= 0.0 {
            return Err(SyncError::Validation(format!(
                "radius_km must be a positive number, got {r}"
            )));
        }
    }

    let grant = grant_for(store, principal).await?;

    let project = match request.project_id {
        Some(id) => {
            if !grant.allows_project(id) {
                return Err(SyncError::Forbidden(format!(
                    "project {id} is outside the caller's permissions"
                )));
            }
            let project = store
                .project(id)
                .await?
                .ok_or_else(|| SyncError::NotFound(format!("project {id} not found")))?;
            Some(project)
        }
        None => None,
    };

    let entries = store.taxonomy_entries().await?;
    let version = TaxonomyVersion::compute(&entries);
    let covered = covered_categories(&entries, &grant);
    let taxonomy = permitted_entries(scoped(&entries, request.project_id), covered.as_ref());

    let configs = store.field_configs().await?;
    let field_configs = applicable(&configs, request.project_id)
        .into_iter()
        .filter(|c| covered.as_ref().map_or(true, |codes| codes.contains(&c.taxonomy_code)))
        .cloned()
        .collect();

    let projects = visible_projects(store, principal, &grant).await?;

    let (points, total_points) = match (&project, request.include_points) {
        (Some(p), true) => {
            let radius = match (request.radius_km, p.bbox) {
                (Some(radius_km), Some(bbox)) => Some(RadiusFilter {
                    center: bbox.center(),
                    radius_km,
                }),
                (Some(_), None) => {
                    tracing::debug!(project = %p.id, "radius ignored: project has no bounding box");
                    None
                }
                (None, _) => None,
            };
            let (rows, total) = store
                .project_observations(p.id, radius, covered.as_ref(), point_limit)
                .await?;
            (rows.iter().map(ObservationView::from).collect(), total)
        }
        _ => (Vec::new(), 0),
    };

    tracing::info!(
        user = %principal.user_id,
        project = ?request.project_id,
        taxonomy = taxonomy.len(),
        points = points.len(),
        total_points,
        "offline package assembled"
    );

    Ok(OfflinePackage {
        server_time: Utc::now(),
        taxonomy_version: version.into(),
        project,
        taxonomy,
        field_configs,
        projects,
        permissions: grant,
        points,
        total_points,
    })
}
