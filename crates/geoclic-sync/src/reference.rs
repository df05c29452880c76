//! # Reference Data and Taxonomy Versioning
//!
//! Decides whether a client needs fresh taxonomy and field schemas, and
//! assembles them scoped to a project and to the caller's grant.

use std::collections::{BTreeSet, HashMap};

use geoclic_core::fields::applicable;
use geoclic_core::taxonomy::scoped;
use geoclic_core::{DynamicFieldConfig, PermissionGrant, Project, TaxonomyEntry, TaxonomyVersion};
use uuid::Uuid;

use crate::error::StoreError;
use crate::principal::Principal;
use crate::store::SyncStore;

/// Reference payload of one sync response.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceData {
    pub version: TaxonomyVersion,
    /// Whether the client's version differs from `version` (or is absent).
    pub changed: bool,
    pub taxonomy: Vec<TaxonomyEntry>,
    pub field_configs: Vec<DynamicFieldConfig>,
}

/// What the client asked for.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceQuery<'a> {
    pub client_version: Option<&'a str>,
    pub project_id: Option<Uuid>,
    pub include_taxonomy: bool,
    pub include_fields: bool,
}

/// Authorization scope of `principal`. Administrators are unrestricted
/// whatever is recorded for them.
pub async fn grant_for(
    store: &dyn SyncStore,
    principal: &Principal,
) -> Result<PermissionGrant, StoreError> {
    if principal.is_admin() {
        Ok(PermissionGrant::unrestricted())
    } else {
        store.permissions_for(principal.user_id).await
    }
}

/// Taxonomy codes the grant covers: the granted codes plus every entry
/// below one of them. `None` when categories are unrestricted.
pub fn covered_categories(
    entries: &[TaxonomyEntry],
    grant: &PermissionGrant,
) -> Option<BTreeSet<String>> {
    let granted = grant.categories.as_ref()?;
    let parents: HashMap<&str, Option<&str>> = entries
        .iter()
        .map(|e| (e.code.as_str(), e.parent_code.as_deref()))
        .collect();

    let mut covered = granted.clone();
    for entry in entries {
        let mut code = Some(entry.code.as_str());
        // Bounded walk: a malformed tree cannot loop forever.
        for _ in 0..=parents.len() {
            match code {
                Some(c) if granted.contains(c) => {
                    covered.insert(entry.code.clone());
                    break;
                }
                Some(c) => code = parents.get(c).copied().flatten(),
                None => break,
            }
        }
    }
    Some(covered)
}

/// Keep the entries whose code is in `covered` (all of them when `None`).
pub fn permitted_entries(
    entries: Vec<&TaxonomyEntry>,
    covered: Option<&BTreeSet<String>>,
) -> Vec<TaxonomyEntry> {
    entries
        .into_iter()
        .filter(|e| covered.map_or(true, |c| c.contains(&e.code)))
        .cloned()
        .collect()
}

/// Fingerprint of the active taxonomy.
pub async fn current_version(store: &dyn SyncStore) -> Result<TaxonomyVersion, StoreError> {
    let entries = store.taxonomy_entries().await?;
    Ok(TaxonomyVersion::compute(&entries))
}

/// Compare the client's version and attach payloads when it differs or was
/// explicitly requested. Payloads are limited to the categories `grant`
/// covers; the caller checks the project against the grant.
pub async fn resolve(
    store: &dyn SyncStore,
    query: ReferenceQuery<'_>,
    grant: &PermissionGrant,
) -> Result<ReferenceData, StoreError> {
    let entries = store.taxonomy_entries().await?;
    let version = TaxonomyVersion::compute(&entries);
    let changed = !version.matches(query.client_version);
    let covered = covered_categories(&entries, grant);

    let taxonomy = if changed || query.include_taxonomy {
        permitted_entries(scoped(&entries, query.project_id), covered.as_ref())
    } else {
        Vec::new()
    };

    let field_configs = if changed || query.include_fields {
        let configs = store.field_configs().await?;
        applicable(&configs, query.project_id)
            .into_iter()
            .filter(|c| covered.as_ref().map_or(true, |codes| codes.contains(&c.taxonomy_code)))
            .cloned()
            .collect()
    } else {
        Vec::new()
    };

    Ok(ReferenceData {
        version,
        changed,
        taxonomy,
        field_configs,
    })
}

/// Active projects visible to `principal` under `grant`. Administrators see
/// every active project.
pub async fn visible_projects(
    store: &dyn SyncStore,
    principal: &Principal,
    grant: &PermissionGrant,
) -> Result<Vec<Project>, StoreError> {
    let active: Vec<Project> = store
        .projects()
        .await?
        .into_iter()
        .filter(|p| p.active)
        .collect();
    if principal.is_admin() {
        Ok(active)
    } else {
        Ok(grant.filter_projects(active))
    }
}
