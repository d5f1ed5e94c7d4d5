use common::Vote;
use serde::Serialize;

/// Outcome of a tally that reached the vote threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decision {
    Approve,
    Reject,
}

/// Vote counts for one submission.
///
/// Invalid votes count toward `total`, and so toward the threshold, but
/// never toward the decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub total: u64,
    pub valid_positive: u64,
    pub valid_negative: u64,
    pub invalid: u64,
}

impl Tally {
    pub fn from_votes(votes: &[Vote]) -> Self {
        votes.iter().fold(Tally::default(), |mut tally, vote| {
            tally.total += 1;
            match (vote.is_valid, vote.approved) {
                (false, _) => tally.invalid += 1,
                (true, true) => tally.valid_positive += 1,
                (true, false) => tally.valid_negative += 1,
            }
            tally
        })
    }

    /// `None` until `min_votes` votes are in; then approve only on a strict
    /// majority of valid votes.
    pub fn decide(&self, min_votes: u64) -> Option<Decision> {
        if self.total < min_votes {
            return None;
        }
        if self.valid_positive > self.valid_negative {
            Some(Decision::Approve)
        } else {
            Some(Decision::Reject)
        }
    }
}
