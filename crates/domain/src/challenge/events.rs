//! Notifications published by the challenge workflow.

use common::{ChallengeId, SubmissionId, UserId, VoteId};
use event_bus::{Event, HandlerError};
use serde::{Deserialize, Serialize};

/// `source` of every event this workflow publishes.
pub const EVENT_SOURCE: &str = "challenge-service";

/// Events emitted once a workflow state change has been made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeEvent {
    Created(ChallengeCreatedData),
    Submitted(ChallengeSubmittedData),
    VoteAdded(ChallengeVoteAddedData),
    Approved(ChallengeApprovedData),
    Rejected(ChallengeRejectedData),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeCreatedData {
    pub challenge_id: ChallengeId,
    pub title: String,
    pub reward: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeSubmittedData {
    pub submission_id: SubmissionId,
    pub challenge_id: ChallengeId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeVoteAddedData {
    pub vote_id: VoteId,
    pub submission_id: SubmissionId,
    pub voter_id: UserId,
    pub approved: bool,
    pub is_valid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeApprovedData {
    pub submission_id: SubmissionId,
    pub challenge_id: ChallengeId,
    pub user_id: UserId,
    /// Experience points credited to the submitter.
    pub reward: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeRejectedData {
    pub submission_id: SubmissionId,
    pub challenge_id: ChallengeId,
    pub user_id: UserId,
    pub reason: String,
}

impl ChallengeEvent {
    pub const CREATED: &'static str = "ChallengeCreated";
    pub const SUBMITTED: &'static str = "ChallengeSubmitted";
    pub const VOTE_ADDED: &'static str = "ChallengeVoteAdded";
    pub const APPROVED: &'static str = "ChallengeApproved";
    pub const REJECTED: &'static str = "ChallengeRejected";

    /// Every event type this workflow publishes.
    pub const ALL: [&'static str; 5] = [
        Self::CREATED,
        Self::SUBMITTED,
        Self::VOTE_ADDED,
        Self::APPROVED,
        Self::REJECTED,
    ];

    pub fn event_type(&self) -> &'static str {
        match self {
            ChallengeEvent::Created(_) => Self::CREATED,
            ChallengeEvent::Submitted(_) => Self::SUBMITTED,
            ChallengeEvent::VoteAdded(_) => Self::VOTE_ADDED,
            ChallengeEvent::Approved(_) => Self::APPROVED,
            ChallengeEvent::Rejected(_) => Self::REJECTED,
        }
    }

    /// Wraps the event for the bus, with its data as the payload.
    pub fn to_event(&self) -> serde_json::Result<Event> {
        let event = Event::new(self.event_type(), EVENT_SOURCE, serde_json::Value::Null);
        match self {
            ChallengeEvent::Created(data) => event.with_payload(data),
            ChallengeEvent::Submitted(data) => event.with_payload(data),
            ChallengeEvent::VoteAdded(data) => event.with_payload(data),
            ChallengeEvent::Approved(data) => event.with_payload(data),
            ChallengeEvent::Rejected(data) => event.with_payload(data),
        }
    }
}

impl TryFrom<&Event> for ChallengeEvent {
    type Error = HandlerError;

    fn try_from(event: &Event) -> Result<Self, Self::Error> {
        let parsed = match event.event_type.as_str() {
            Self::CREATED => ChallengeEvent::Created(event.payload_as()?),
            Self::SUBMITTED => ChallengeEvent::Submitted(event.payload_as()?),
            Self::VOTE_ADDED => ChallengeEvent::VoteAdded(event.payload_as()?),
            Self::APPROVED => ChallengeEvent::Approved(event.payload_as()?),
            Self::REJECTED => ChallengeEvent::Rejected(event.payload_as()?),
            other => {
                return Err(HandlerError::failed(format!(
                    "not a challenge event: {other}"
                )));
            }
        };
        Ok(parsed)
    }
}
