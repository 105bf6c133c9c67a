//! Observation request status and the legal transitions between statuses.
//!
//! ```text
//! draft ──submit──▶ formed ──reject──────────▶ rejected
//!   │                  └────callback result──▶ completed
//!   └──delete──▶ deleted
//! ```
//!
//! `completed`, `rejected` and `deleted` are terminal. A formed request must
//! be resolved; it can never be deleted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle status of an observation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Creator-editable cart.
    Draft,
    /// Submitted for moderation; a computation may be in flight.
    Formed,
    /// Results computed and stored.
    Completed,
    /// Rejected by a moderator.
    Rejected,
    /// Logically deleted.
    Deleted,
}

impl RequestStatus {
    /// Returns the database / wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Formed => "formed",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Deleted => "deleted",
        }
    }

    /// Returns `true` when no transition may leave this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Deleted)
    }

    /// Returns `true` if `self → next` is an edge of the state machine.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Formed)
                | (Self::Draft, Self::Deleted)
                | (Self::Formed, Self::Completed)
                | (Self::Formed, Self::Rejected)
        )
    }

    /// Returns `true` while star links may still be removed.
    #[must_use]
    pub const fn allows_link_removal(self) -> bool {
        matches!(self, Self::Draft | Self::Formed)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown request status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for RequestStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "formed" => Ok(Self::Formed),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            "deleted" => Ok(Self::Deleted),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Moderator decision on a formed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResolveAction {
    /// Trigger the asynchronous accuracy computation.
    Complete,
    /// Reject the request without computing anything.
    Reject,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    const ALL: [RequestStatus; 5] = [
        RequestStatus::Draft,
        RequestStatus::Formed,
        RequestStatus::Completed,
        RequestStatus::Rejected,
        RequestStatus::Deleted,
    ];

    #[test]
    fn terminal_statuses_have_no_outgoing_edges() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn formed_cannot_be_deleted() {
        assert!(!RequestStatus::Formed.can_transition_to(RequestStatus::Deleted));
    }

    #[test]
    fn no_self_transitions() {
        for s in ALL {
            assert!(!s.can_transition_to(s));
        }
    }

    #[test]
    fn draft_edges() {
        assert!(RequestStatus::Draft.can_transition_to(RequestStatus::Formed));
        assert!(RequestStatus::Draft.can_transition_to(RequestStatus::Deleted));
        assert!(!RequestStatus::Draft.can_transition_to(RequestStatus::Completed));
    }

    #[test]
    fn parse_matches_display() {
        for s in ALL {
            let Ok(parsed) = s.to_string().parse::<RequestStatus>() else {
                panic!("failed to parse {s}");
            };
            assert_eq!(parsed, s);
        }
        assert!("archived".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn action_deserializes_snake_case() {
        let Ok(action) = serde_json::from_str::<ResolveAction>("\"reject\"") else {
            panic!("deserialization failed");
        };
        assert_eq!(action, ResolveAction::Reject);
    }
}
