//! Challenge voting workflow.

pub mod approval;
pub mod commands;
pub mod events;
pub mod locks;
pub mod queue;
pub mod service;
pub mod tally;

pub use approval::{ApprovalEngine, Outcome, REWARD_SOURCE_TYPE};
pub use commands::{CastVote, CreateChallenge, SubmitProof};
pub use events::{
    ChallengeApprovedData, ChallengeCreatedData, ChallengeEvent, ChallengeRejectedData,
    ChallengeSubmittedData, ChallengeVoteAddedData, EVENT_SOURCE,
};
pub use locks::{SubmissionGuard, SubmissionLocks};
pub use queue::ReEvaluationQueue;
pub use service::ChallengeService;
pub use tally::{Decision, Tally};
