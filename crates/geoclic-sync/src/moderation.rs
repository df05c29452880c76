//! # Server-Side Moderation
//!
//! The only way an observation leaves `draft`. Owners may submit their own
//! records; every other action needs a moderator.

use chrono::Utc;
use geoclic_core::{ModerationAction, ObservationView};
use uuid::Uuid;

use crate::error::SyncError;
use crate::principal::Principal;
use crate::store::SyncStore;

/// Apply `action` to observation `id` and return its new state.
pub async fn moderate(
    store: &dyn SyncStore,
    principal: &Principal,
    id: Uuid,
    action: ModerationAction,
    comment: Option<String>,
) -> Result<ObservationView, SyncError> {
    let comment = comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if action == ModerationAction::Reject && comment.is_none() {
        return Err(SyncError::Validation(
            "a rejection requires a non-empty comment".into(),
        ));
    }

    let mut tx = store.begin().await?;
    let current = tx
        .observation(id)
        .await?
        .ok_or_else(|| SyncError::NotFound(format!("observation {id} not found")))?;

    let is_owner = current.created_by == principal.user_id;
    if !principal.is_moderator() && !(action.owner_may_perform() && is_owner) {
        return Err(SyncError::Forbidden(format!(
            "role {} may not {} observation {id}",
            principal.role,
            action.as_str()
        )));
    }

    let target = action.apply(current.status)?;
    let rejection_comment = match action {
        ModerationAction::Reject => comment.as_deref(),
        _ => None,
    };
    let moved = tx
        .set_status(
            id,
            current.status,
            target,
            rejection_comment,
            principal.user_id,
            Utc::now(),
        )
        .await?;
    if !moved {
        return Err(SyncError::Conflict(format!(
            "observation {id} changed concurrently; retry"
        )));
    }

    let updated = tx
        .observation(id)
        .await?
        .ok_or_else(|| SyncError::NotFound(format!("observation {id} not found")))?;
    tx.commit().await?;

    tracing::info!(
        %id,
        from = %current.status,
        to = %target,
        user = %principal.user_id,
        "observation moderated"
    );
    Ok(ObservationView::from(&updated))
}
