//! Reference data: taxonomy, dynamic fields, projects and permission grants.

use chrono::{DateTime, Utc};
use geoclic_core::{
    BoundingBox, Color, DynamicFieldConfig, FieldType, PermissionGrant, Project, TaxonomyEntry,
    VisibilityRule,
};
use geoclic_sync::StoreError;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{malformed, store_error};

#[derive(sqlx::FromRow)]
struct TaxonomyRow {
    id: Uuid,
    code: String,
    label: String,
    parent_code: Option<String>,
    level: i32,
    display_order: i32,
    icon: Option<String>,
    color: Option<i64>,
    active: bool,
    triggers_form: bool,
    project_id: Option<Uuid>,
    updated_at: DateTime<Utc>,
}

impl From<TaxonomyRow> for TaxonomyEntry {
    fn from(row: TaxonomyRow) -> Self {
        Self {
            id: row.id,
            code: row.code,
            label: row.label,
            parent_code: row.parent_code,
            level: row.level,
            display_order: row.display_order,
            icon: row.icon,
            color: row.color.map(Color::from_argb),
            active: row.active,
            triggers_form: row.triggers_form,
            project_id: row.project_id,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FieldConfigRow {
    id: Uuid,
    taxonomy_code: String,
    name: String,
    label: String,
    field_type: String,
    required: bool,
    display_order: i32,
    options: Vec<String>,
    min_value: Option<f64>,
    max_value: Option<f64>,
    default_value: Option<String>,
    unit: Option<String>,
    help_text: Option<String>,
    formula: Option<String>,
    active: bool,
    project_id: Option<Uuid>,
    visibility: Option<Json<VisibilityRule>>,
}

impl TryFrom<FieldConfigRow> for DynamicFieldConfig {
    type Error = StoreError;

    fn try_from(row: FieldConfigRow) -> Result<Self, Self::Error> {
        let field_type: FieldType = row
            .field_type
            .parse()
            .map_err(|e| malformed("field config", e))?;
        Ok(Self {
            id: row.id,
            taxonomy_code: row.taxonomy_code,
            name: row.name,
            label: row.label,
            field_type,
            required: row.required,
            display_order: row.display_order,
            options: row.options,
            min_value: row.min_value,
            max_value: row.max_value,
            default_value: row.default_value,
            unit: row.unit,
            help_text: row.help_text,
            formula: row.formula,
            active: row.active,
            project_id: row.project_id,
            visibility: row.visibility.map(|v| v.0),
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    collectivity_name: Option<String>,
    status: Option<String>,
    active: bool,
    bbox_min_lat: Option<f64>,
    bbox_max_lat: Option<f64>,
    bbox_min_lng: Option<f64>,
    bbox_max_lng: Option<f64>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            collectivity_name: row.collectivity_name,
            status: row.status,
            active: row.active,
            bbox: BoundingBox::from_bounds(
                row.bbox_min_lat,
                row.bbox_max_lat,
                row.bbox_min_lng,
                row.bbox_max_lng,
            ),
        }
    }
}

const PROJECT_COLUMNS: &str = "id, name, description, collectivity_name, status, active,
    bbox_min_lat, bbox_max_lat, bbox_min_lng, bbox_max_lng";

/// Every taxonomy entry, in tree display order.
pub async fn taxonomy_entries(pool: &PgPool) -> Result<Vec<TaxonomyEntry>, StoreError> {
    let rows = sqlx::query_as::<_, TaxonomyRow>(
        "SELECT id, code, label, parent_code, level, display_order, icon, color, active,
                triggers_form, project_id, updated_at
         FROM taxonomy_entries
         ORDER BY level, display_order, code",
    )
    .fetch_all(pool)
    .await
    .map_err(store_error)?;
    Ok(rows.into_iter().map(TaxonomyEntry::from).collect())
}

/// Every dynamic field configuration.
pub async fn field_configs(pool: &PgPool) -> Result<Vec<DynamicFieldConfig>, StoreError> {
    let rows = sqlx::query_as::<_, FieldConfigRow>(
        "SELECT id, taxonomy_code, name, label, field_type, required, display_order, options,
                min_value, max_value, default_value, unit, help_text, formula, active,
                project_id, visibility
         FROM field_configs
         ORDER BY taxonomy_code, display_order, name",
    )
    .fetch_all(pool)
    .await
    .map_err(store_error)?;
    rows.into_iter().map(DynamicFieldConfig::try_from).collect()
}

/// Every project, active or not.
pub async fn projects(pool: &PgPool) -> Result<Vec<Project>, StoreError> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY name");
    let rows = sqlx::query_as::<_, ProjectRow>(&sql)
        .fetch_all(pool)
        .await
        .map_err(store_error)?;
    Ok(rows.into_iter().map(Project::from).collect())
}

pub async fn project(pool: &PgPool, id: Uuid) -> Result<Option<Project>, StoreError> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1");
    let row = sqlx::query_as::<_, ProjectRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(store_error)?;
    Ok(row.map(Project::from))
}

/// Grant recorded for `user_id`. A missing row, or a `NULL` array, leaves
/// that axis unrestricted.
pub async fn permissions_for(pool: &PgPool, user_id: Uuid) -> Result<PermissionGrant, StoreError> {
    let row: Option<(Option<Vec<Uuid>>, Option<Vec<String>>)> =
        sqlx::query_as("SELECT projects, categories FROM user_permissions WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .map_err(store_error)?;

    Ok(match row {
        None => PermissionGrant::unrestricted(),
        Some((projects, categories)) => PermissionGrant {
            projects: projects.map(|v| v.into_iter().collect()),
            categories: categories.map(|v| v.into_iter().collect()),
        },
    })
}
