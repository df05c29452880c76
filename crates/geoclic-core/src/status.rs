//! # Observation Lifecycle State Machine
//!
//! ```text
//! draft ──▶ pending ──▶ validated ──▶ published (terminal)
//!              │  ▲
//!              ▼  │
//!            rejected  (re-editable, resubmittable)
//! ```
//!
//! Clients never set status. The sync path creates records in `draft` and
//! may delete them only while they are still `draft`; every other
//! transition is a server-side [`ModerationAction`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TransitionError;

/// Lifecycle status of an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ObservationStatus {
    /// Freshly collected, still owned by the field client.
    Draft,
    /// Submitted for moderation.
    Pending,
    /// Accepted by a moderator.
    Validated,
    /// Refused by a moderator; may be edited and resubmitted.
    Rejected,
    /// Released to downstream consumers. Terminal for this engine.
    Published,
}

impl ObservationStatus {
    /// Return the string stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Validated => "validated",
            Self::Rejected => "rejected",
            Self::Published => "published",
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Published)
    }

    /// Whether the sync path may delete a record in this status.
    pub fn is_deletable_via_sync(&self) -> bool {
        matches!(self, Self::Draft)
    }

    /// Valid successor statuses.
    pub fn valid_transitions(&self) -> &'static [ObservationStatus] {
        match self {
            Self::Draft => &[Self::Pending],
            Self::Pending => &[Self::Validated, Self::Rejected],
            Self::Validated => &[Self::Published],
            Self::Rejected => &[Self::Pending],
            Self::Published => &[],
        }
    }

    /// Validate and perform a transition, returning the new status.
    pub fn transition_to(self, to: ObservationStatus) -> Result<ObservationStatus, TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::Terminal(self));
        }
        if self.valid_transitions().contains(&to) {
            Ok(to)
        } else {
            Err(TransitionError::InvalidTransition { from: self, to })
        }
    }
}

impl Default for ObservationStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl fmt::Display for ObservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "pending" => Ok(Self::Pending),
            "validated" => Ok(Self::Validated),
            "rejected" => Ok(Self::Rejected),
            "published" => Ok(Self::Published),
            other => Err(format!("unknown observation status: {other}")),
        }
    }
}

/// Server-side moderation operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    /// draft | rejected → pending.
    Submit,
    /// pending → validated.
    Validate,
    /// pending → rejected.
    Reject,
    /// validated → published.
    Publish,
}

impl ModerationAction {
    /// Path segment naming the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Validate => "validate",
            Self::Reject => "reject",
            Self::Publish => "publish",
        }
    }

    /// The status this action moves a record into.
    pub fn target(&self) -> ObservationStatus {
        match self {
            Self::Submit => ObservationStatus::Pending,
            Self::Validate => ObservationStatus::Validated,
            Self::Reject => ObservationStatus::Rejected,
            Self::Publish => ObservationStatus::Published,
        }
    }

    /// Apply the action to a current status.
    pub fn apply(&self, current: ObservationStatus) -> Result<ObservationStatus, TransitionError> {
        current.transition_to(self.target())
    }

    /// Whether the record owner (not only a moderator) may perform this action.
    pub fn owner_may_perform(&self) -> bool {
        matches!(self, Self::Submit)
    }
}

impl FromStr for ModerationAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submit" => Ok(Self::Submit),
            "validate" => Ok(Self::Validate),
            "reject" => Ok(Self::Reject),
            "publish" => Ok(Self::Publish),
            other => Err(format!("unknown moderation action: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ObservationStatus; 5] = [
        ObservationStatus::Draft,
        ObservationStatus::Pending,
        ObservationStatus::Validated,
        ObservationStatus::Rejected,
        ObservationStatus::Published,
    ];

    #[test]
    fn happy_path_to_published() {
        let s = ObservationStatus::Draft;
        let s = ModerationAction::Submit.apply(s).unwrap();
        let s = ModerationAction::Validate.apply(s).unwrap();
        let s = ModerationAction::Publish.apply(s).unwrap();
        assert_eq!(s, ObservationStatus::Published);
        assert!(s.is_terminal());
    }

    #[test]
    fn rejected_can_be_resubmitted() {
        let s = ModerationAction::Reject.apply(ObservationStatus::Pending).unwrap();
        assert_eq!(ModerationAction::Submit.apply(s).unwrap(), ObservationStatus::Pending);
    }

    #[test]
    fn draft_cannot_be_validated_directly() {
        let err = ModerationAction::Validate.apply(ObservationStatus::Draft).unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn published_is_terminal() {
        for target in ALL {
            let err = ObservationStatus::Published.transition_to(target).unwrap_err();
            assert_eq!(err, TransitionError::Terminal(ObservationStatus::Published));
        }
    }

    #[test]
    fn nothing_transitions_back_to_draft() {
        for from in ALL {
            assert!(from.transition_to(ObservationStatus::Draft).is_err());
        }
    }

    #[test]
    fn only_draft_is_deletable() {
        for s in ALL {
            assert_eq!(s.is_deletable_via_sync(), s == ObservationStatus::Draft);
        }
    }

    #[test]
    fn status_string_round_trip() {
        for s in ALL {
            assert_eq!(s.as_str().parse::<ObservationStatus>().unwrap(), s);
            assert_eq!(
                serde_json::to_string(&s).unwrap(),
                format!("\"{}\"", s.as_str())
            );
        }
        assert!("syncing".parse::<ObservationStatus>().is_err());
    }

    #[test]
    fn only_submit_is_owner_action() {
        assert!(ModerationAction::Submit.owner_may_perform());
        assert!(!ModerationAction::Validate.owner_may_perform());
        assert!(!ModerationAction::Reject.owner_may_perform());
        assert!(!ModerationAction::Publish.owner_may_perform());
    }
}
