//! Shared identifiers and persisted records for the challenge voting system.

pub mod model;
pub mod types;

pub use model::{
    Challenge, ChallengeStatus, Submission, SubmissionStatus, UnknownStatus, Vote, XpEntry,
};
pub use types::{ChallengeId, SubmissionId, UserId, VoteId};
