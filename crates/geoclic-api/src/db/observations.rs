//! Observation persistence operations.
//!
//! Writes go through the session transaction (`&mut PgConnection`); reads
//! accept any executor so the offline package can query the pool directly.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use geoclic_core::{
    Attachment, Geometry, GeometryKind, MutableField, Observation, ObservationStatus,
    TechnicalAttributes, ValidatedPatch,
};
use geoclic_sync::{DeleteOutcome, RadiusFilter, StoreError};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{Executor, PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{malformed, store_error};

/// Column list shared by every observation SELECT. Geometry comes back as
/// the GeoJSON `coordinates` member.
const OBSERVATION_COLUMNS: &str = "id, project_id, name, classification_code, kind, subtype,
    geom_type, ST_AsGeoJSON(geom)::jsonb -> 'coordinates' AS geom_coords,
    gps_precision, gps_source, altitude, condition_state, asset_status, comment,
    material, height, width, install_date, priority, replacement_cost,
    custom_properties, attachments, status, rejection_comment,
    created_by, updated_by, created_at, updated_at";

/// First position of the geometry; radius filters measure from here.
const ANCHOR: &str = "CASE geom_type
    WHEN 'POINT' THEN geom
    WHEN 'LINESTRING' THEN ST_StartPoint(geom)
    ELSE ST_StartPoint(ST_ExteriorRing(geom))
END";

#[derive(sqlx::FromRow)]
struct ObservationRow {
    id: Uuid,
    project_id: Option<Uuid>,
    name: String,
    classification_code: Option<String>,
    kind: String,
    subtype: Option<String>,
    geom_type: String,
    geom_coords: Value,
    gps_precision: Option<f64>,
    gps_source: Option<String>,
    altitude: Option<f64>,
    condition_state: Option<String>,
    asset_status: Option<String>,
    comment: Option<String>,
    material: Option<String>,
    height: Option<f64>,
    width: Option<f64>,
    install_date: Option<DateTime<Utc>>,
    priority: Option<String>,
    replacement_cost: Option<f64>,
    custom_properties: Json<Map<String, Value>>,
    attachments: Json<Vec<Attachment>>,
    status: String,
    rejection_comment: Option<String>,
    created_by: Uuid,
    updated_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ObservationRow> for Observation {
    type Error = StoreError;

    fn try_from(row: ObservationRow) -> Result<Self, Self::Error> {
        let kind: GeometryKind = row
            .geom_type
            .parse()
            .map_err(|e| malformed("observation", e))?;
        let geometry = Geometry::from_geojson_coordinates(kind, &row.geom_coords)
            .map_err(|e| malformed("observation", e))?;
        let status: ObservationStatus = row
            .status
            .parse()
            .map_err(|e| malformed("observation", e))?;

        Ok(Observation {
            id: row.id,
            project_id: row.project_id,
            name: row.name,
            classification_code: row.classification_code,
            kind: row.kind,
            subtype: row.subtype,
            geometry,
            gps_precision: row.gps_precision,
            gps_source: row.gps_source,
            altitude: row.altitude,
            condition_state: row.condition_state,
            asset_status: row.asset_status,
            comment: row.comment,
            technical: TechnicalAttributes {
                material: row.material,
                height: row.height,
                width: row.width,
                install_date: row.install_date,
                priority: row.priority,
                replacement_cost: row.replacement_cost,
            },
            custom_properties: row.custom_properties.0,
            attachments: row.attachments.0,
            status,
            rejection_comment: row.rejection_comment,
            created_by: row.created_by,
            updated_by: row.updated_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn decode_all(rows: Vec<ObservationRow>) -> Result<Vec<Observation>, StoreError> {
    rows.into_iter().map(Observation::try_from).collect()
}

fn clamp_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Insert a new observation.
pub async fn insert(conn: &mut PgConnection, obs: &Observation) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO observations (id, project_id, name, classification_code, kind, subtype,
         geom_type, geom, gps_precision, gps_source, altitude, condition_state, asset_status,
         comment, material, height, width, install_date, priority, replacement_cost,
         custom_properties, attachments, status, rejection_comment, created_by, updated_by,
         created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, ST_GeomFromText($8, 4326), $9, $10, $11, $12, $13,
         $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28)",
    )
    .bind(obs.id)
    .bind(obs.project_id)
    .bind(&obs.name)
    .bind(&obs.classification_code)
    .bind(&obs.kind)
    .bind(&obs.subtype)
    .bind(obs.geometry.kind().as_str())
    .bind(obs.geometry.to_wkt())
    .bind(obs.gps_precision)
    .bind(&obs.gps_source)
    .bind(obs.altitude)
    .bind(&obs.condition_state)
    .bind(&obs.asset_status)
    .bind(&obs.comment)
    .bind(&obs.technical.material)
    .bind(obs.technical.height)
    .bind(obs.technical.width)
    .bind(obs.technical.install_date)
    .bind(&obs.technical.priority)
    .bind(obs.technical.replacement_cost)
    .bind(Json(&obs.custom_properties))
    .bind(Json(&obs.attachments))
    .bind(obs.status.as_str())
    .bind(&obs.rejection_comment)
    .bind(obs.created_by)
    .bind(obs.updated_by)
    .bind(obs.created_at)
    .bind(obs.updated_at)
    .execute(conn)
    .await
    .map_err(store_error)?;

    Ok(())
}

/// Fetch one observation by ID.
pub async fn get_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Observation>, StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {OBSERVATION_COLUMNS} FROM observations WHERE id = $1");
    let row = sqlx::query_as::<_, ObservationRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(store_error)?;
    row.map(Observation::try_from).transpose()
}

/// Write the masked columns of `patch` plus the edit stamp.
///
/// Returns `false` when no row has this ID.
pub async fn apply_patch(
    conn: &mut PgConnection,
    id: Uuid,
    patch: &ValidatedPatch,
    editor: Uuid,
    at: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let p = patch.patch();
    let mut qb = QueryBuilder::<Postgres>::new("UPDATE observations SET ");
    {
        let mut set = qb.separated(", ");
        for field in patch.fields() {
            if *field == MutableField::Geometry {
                if let Some(g) = patch.geometry() {
                    set.push("geom_type = ")
                        .push_bind_unseparated(g.kind().as_str());
                    set.push("geom = ST_GeomFromText(")
                        .push_bind_unseparated(g.to_wkt())
                        .push_unseparated(", 4326)");
                }
                continue;
            }
            set.push(format!("{} = ", field.column()));
            match field {
                MutableField::Name => {
                    set.push_bind_unseparated(p.name.clone().map(|v| v.trim().to_string()))
                }
                MutableField::ClassificationCode => {
                    set.push_bind_unseparated(p.classification_code.clone())
                }
                MutableField::Kind => {
                    set.push_bind_unseparated(p.kind.clone().map(|v| v.trim().to_string()))
                }
                MutableField::Subtype => set.push_bind_unseparated(p.subtype.clone()),
                MutableField::GpsPrecision => set.push_bind_unseparated(p.gps_precision),
                MutableField::GpsSource => set.push_bind_unseparated(p.gps_source.clone()),
                MutableField::Altitude => set.push_bind_unseparated(p.altitude),
                MutableField::ConditionState => {
                    set.push_bind_unseparated(p.condition_state.clone())
                }
                MutableField::AssetStatus => set.push_bind_unseparated(p.asset_status.clone()),
                MutableField::Comment => set.push_bind_unseparated(p.comment.clone()),
                MutableField::Material => set.push_bind_unseparated(p.material.clone()),
                MutableField::Height => set.push_bind_unseparated(p.height),
                MutableField::Width => set.push_bind_unseparated(p.width),
                MutableField::InstallDate => set.push_bind_unseparated(p.install_date),
                MutableField::Priority => set.push_bind_unseparated(p.priority.clone()),
                MutableField::ReplacementCost => {
                    set.push_bind_unseparated(p.replacement_cost)
                }
                MutableField::CustomProperties => {
                    set.push_bind_unseparated(p.custom_properties.clone().map(Json))
                }
                MutableField::Attachments => {
                    set.push_bind_unseparated(p.attachments.clone().map(Json))
                }
                MutableField::Geometry => continue,
            };
        }
        set.push("updated_by = ").push_bind_unseparated(editor);
        set.push("updated_at = ").push_bind_unseparated(at);
    }
    qb.push(" WHERE id = ").push_bind(id);

    let result = qb.build().execute(conn).await.map_err(store_error)?;
    Ok(result.rows_affected() > 0)
}

/// Delete `id` only while it is a draft.
pub async fn delete_draft(conn: &mut PgConnection, id: Uuid) -> Result<DeleteOutcome, StoreError> {
    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM observations WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(store_error)?;

    let Some(status) = status else {
        return Ok(DeleteOutcome::NotFound);
    };
    let status: ObservationStatus = status.parse().map_err(|e| malformed("observation", e))?;
    if !status.is_deletable_via_sync() {
        return Ok(DeleteOutcome::NotDraft(status));
    }

    sqlx::query("DELETE FROM observations WHERE id = $1 AND status = 'draft'")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(store_error)?;
    Ok(DeleteOutcome::Deleted)
}

/// Compare-and-set the lifecycle status.
pub async fn set_status(
    conn: &mut PgConnection,
    id: Uuid,
    from: ObservationStatus,
    to: ObservationStatus,
    rejection_comment: Option<&str>,
    editor: Uuid,
    at: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE observations
         SET status = $1, rejection_comment = COALESCE($2, rejection_comment),
             updated_by = $3, updated_at = $4
         WHERE id = $5 AND status = $6",
    )
    .bind(to.as_str())
    .bind(rejection_comment)
    .bind(editor)
    .bind(at)
    .bind(id)
    .bind(from.as_str())
    .execute(conn)
    .await
    .map_err(store_error)?;

    Ok(result.rows_affected() > 0)
}

/// Observations modified strictly after `cursor`, newest first.
pub async fn changed_since<'e, E>(
    executor: E,
    cursor: Option<DateTime<Utc>>,
    limit: usize,
) -> Result<Vec<Observation>, StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "SELECT {OBSERVATION_COLUMNS} FROM observations
         WHERE ($1::timestamptz IS NULL OR updated_at > $1)
         ORDER BY updated_at DESC, id DESC
         LIMIT $2"
    );
    let rows = sqlx::query_as::<_, ObservationRow>(&sql)
        .bind(cursor)
        .bind(clamp_limit(limit))
        .fetch_all(executor)
        .await
        .map_err(store_error)?;
    decode_all(rows)
}

/// Number of observations modified strictly after `since`.
pub async fn count_changed_since<'e, E>(
    executor: E,
    since: Option<DateTime<Utc>>,
) -> Result<u64, StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    let count: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM observations WHERE ($1::timestamptz IS NULL OR updated_at > $1)",
    )
    .bind(since)
    .fetch_one(executor)
    .await
    .map_err(store_error)?;
    Ok(u64::try_from(count).unwrap_or(0))
}

fn push_project_filter(
    qb: &mut QueryBuilder<'_, Postgres>,
    project_id: Uuid,
    radius: Option<RadiusFilter>,
    categories: Option<&BTreeSet<String>>,
) {
    qb.push(" WHERE project_id = ").push_bind(project_id);
    if let Some(codes) = categories {
        qb.push(" AND classification_code = ANY(")
            .push_bind(codes.iter().cloned().collect::<Vec<String>>())
            .push(")");
    }
    if let Some(r) = radius {
        qb.push(format!(" AND ST_DWithin(({ANCHOR})::geography, ST_SetSRID(ST_MakePoint("))
            .push_bind(r.center.lng)
            .push(", ")
            .push_bind(r.center.lat)
            .push("), 4326)::geography, ")
            .push_bind(r.radius_km * 1000.0)
            .push(")");
    }
}

/// Observations of one project, newest first, with the uncapped match count.
pub async fn for_project(
    pool: &sqlx::PgPool,
    project_id: Uuid,
    radius: Option<RadiusFilter>,
    categories: Option<&BTreeSet<String>>,
    limit: usize,
) -> Result<(Vec<Observation>, u64), StoreError> {
    let mut count = QueryBuilder::<Postgres>::new("SELECT count(*) FROM observations");
    push_project_filter(&mut count, project_id, radius, categories);
    let total: i64 = count
        .build_query_scalar::<i64>()
        .fetch_one(pool)
        .await
        .map_err(store_error)?;

    let mut select = QueryBuilder::<Postgres>::new(format!(
        "SELECT {OBSERVATION_COLUMNS} FROM observations"
    ));
    push_project_filter(&mut select, project_id, radius, categories);
    select
        .push(" ORDER BY updated_at DESC, id DESC LIMIT ")
        .push_bind(clamp_limit(limit));
    let rows = select
        .build_query_as::<ObservationRow>()
        .fetch_all(pool)
        .await
        .map_err(store_error)?;

    Ok((decode_all(rows)?, u64::try_from(total).unwrap_or(0)))
}
