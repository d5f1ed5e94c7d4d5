//! Domain layer for the challenge voting system.
//!
//! This crate owns the submission state machine:
//! - [`ChallengeService`] records challenges, submissions and votes
//! - [`ApprovalEngine`] decides a submission once enough votes are in,
//!   transitioning it, granting the reward and announcing the result in one
//!   transaction
//! - [`ReEvaluationQueue`] runs those decisions on a bounded worker pool
//! - [`RewardGranter`] is the seam through which rewards are credited

pub mod challenge;
pub mod config;
pub mod error;
pub mod reward;

pub use challenge::{
    ApprovalEngine, CastVote, ChallengeEvent, ChallengeService, CreateChallenge, Decision,
    Outcome, ReEvaluationQueue, SubmissionLocks, SubmitProof, Tally,
};
pub use config::ChallengeConfig;
pub use error::{ChallengeError, Result};
pub use reward::{LedgerRewardGranter, RewardError, RewardGranter};
