//! End-to-end tests of the voting workflow against the in-memory store.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{Challenge, Submission, SubmissionStatus, UserId, Vote};
use domain::{
    CastVote, ChallengeConfig, ChallengeError, ChallengeEvent, ChallengeService, CreateChallenge,
    LedgerRewardGranter, Outcome, RewardError, RewardGranter, SubmitProof,
};
use event_bus::{Event, EventBus, EventHandler, HandlerError};
use saga::{SagaError, SagaManager};
use store::{MemoryStore, MemoryTx, SubmissionRepository, VoteRepository};
use uuid::Uuid;

const VALID_MS: i64 = 90_000;
const TOO_QUICK_MS: i64 = 5_000;

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

#[async_trait]
impl EventHandler for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Ledger granter that counts how often it is asked to grant.
struct CountingGranter {
    inner: LedgerRewardGranter<MemoryStore>,
    calls: AtomicUsize,
}

#[async_trait]
impl RewardGranter<MemoryTx> for CountingGranter {
    async fn grant_reward(
        &self,
        tx: &mut MemoryTx,
        user_id: UserId,
        source_type: &str,
        source_id: Uuid,
        amount: i64,
    ) -> Result<(), RewardError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner
            .grant_reward(tx, user_id, source_type, source_id, amount)
            .await
    }
}

struct Harness {
    store: MemoryStore,
    bus: EventBus,
    service: ChallengeService<MemoryStore>,
    recorder: Arc<Recorder>,
    granter: Arc<CountingGranter>,
}

impl Harness {
    fn new(min_votes_required: u64) -> Self {
        let store = MemoryStore::new();
        let bus = EventBus::default();
        let recorder = Arc::new(Recorder::default());
        bus.subscribe_many(&ChallengeEvent::ALL, recorder.clone())
            .unwrap();

        let granter = Arc::new(CountingGranter {
            inner: LedgerRewardGranter::new(store.clone()),
            calls: AtomicUsize::new(0),
        });
        let config = ChallengeConfig {
            min_votes_required,
            ..ChallengeConfig::default()
        };
        let service = ChallengeService::new(
            store.clone(),
            bus.clone(),
            SagaManager::new(),
            granter.clone(),
            config,
        );

        Self {
            store,
            bus,
            service,
            recorder,
            granter,
        }
    }

    async fn challenge(&self, reward: i64) -> Challenge {
        self.service
            .create_challenge(CreateChallenge::new("5k run", "Run 5km", reward))
            .await
            .unwrap()
    }

    async fn submission(&self, challenge: &Challenge) -> Submission {
        self.service
            .submit(SubmitProof::new(
                challenge.id,
                UserId::new(),
                "https://proof.example/run.gpx",
            ))
            .await
            .unwrap()
    }

    async fn vote(
        &self,
        submission: &Submission,
        approved: bool,
        review_time_ms: i64,
    ) -> Result<Vote, ChallengeError> {
        self.service
            .vote(CastVote::new(
                submission.id,
                UserId::new(),
                approved,
                review_time_ms,
            ))
            .await
    }

    /// Drains re-evaluations and event delivery.
    async fn settle(&self) {
        self.service.shutdown().await;
        self.bus.shutdown().await;
    }

    fn events(&self, event_type: &str) -> Vec<Event> {
        self.recorder
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    fn grants(&self) -> usize {
        self.granter.calls.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn six_of_ten_valid_approvals_approve_once() {
    let h = Harness::new(10);
    let challenge = h.challenge(100).await;
    let submission = h.submission(&challenge).await;

    for _ in 0..6 {
        h.vote(&submission, true, VALID_MS).await.unwrap();
    }
    for _ in 0..4 {
        h.vote(&submission, false, VALID_MS).await.unwrap();
    }
    h.settle().await;

    let stored = h.service.get_submission(submission.id).await.unwrap();
    assert_eq!(stored.status, SubmissionStatus::Approved);
    assert_eq!(h.grants(), 1);
    assert_eq!(h.service.xp_balance(submission.user_id).await.unwrap(), 100);

    let approved = h.events(ChallengeEvent::APPROVED);
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].payload["reward"], 100);
    assert!(h.events(ChallengeEvent::REJECTED).is_empty());
    assert_eq!(h.events(ChallengeEvent::VOTE_ADDED).len(), 10);
}

#[tokio::test]
async fn quick_approvals_are_ignored_by_the_decision() {
    let h = Harness::new(10);
    let challenge = h.challenge(100).await;
    let submission = h.submission(&challenge).await;

    for _ in 0..3 {
        h.vote(&submission, true, VALID_MS).await.unwrap();
    }
    for _ in 0..3 {
        let vote = h.vote(&submission, true, TOO_QUICK_MS).await.unwrap();
        assert!(!vote.is_valid);
    }
    for _ in 0..4 {
        h.vote(&submission, false, VALID_MS).await.unwrap();
    }
    h.settle().await;

    let stored = h.service.get_submission(submission.id).await.unwrap();
    assert_eq!(stored.status, SubmissionStatus::Rejected);
    assert_eq!(h.grants(), 0);
    assert_eq!(h.service.xp_balance(submission.user_id).await.unwrap(), 0);

    let tally = h.service.tally(submission.id).await.unwrap();
    assert_eq!(tally.total, 10);
    assert_eq!(tally.invalid, 3);

    let rejected = h.events(ChallengeEvent::REJECTED);
    assert_eq!(rejected.len(), 1);
    assert!(rejected[0].payload["reason"].as_str().is_some());
}

#[tokio::test]
async fn review_time_exactly_at_threshold_is_valid() {
    let h = Harness::new(10);
    let challenge = h.challenge(10).await;
    let submission = h.submission(&challenge).await;

    let at = h.vote(&submission, true, 60_000).await.unwrap();
    let below = h.vote(&submission, true, 59_999).await.unwrap();

    assert!(at.is_valid);
    assert!(!below.is_valid);
    h.settle().await;
}

#[tokio::test]
async fn below_threshold_never_leaves_pending() {
    let h = Harness::new(10);
    let challenge = h.challenge(100).await;
    let submission = h.submission(&challenge).await;

    for _ in 0..9 {
        h.vote(&submission, true, VALID_MS).await.unwrap();
    }
    h.settle().await;

    let stored = h.service.get_submission(submission.id).await.unwrap();
    assert!(stored.is_pending());
    assert_eq!(h.grants(), 0);
}

#[tokio::test]
async fn second_vote_by_same_user_is_a_conflict() {
    let h = Harness::new(10);
    let challenge = h.challenge(100).await;
    let submission = h.submission(&challenge).await;
    let voter = UserId::new();

    h.service
        .vote(CastVote::approve(submission.id, voter, VALID_MS))
        .await
        .unwrap();
    let err = h
        .service
        .vote(CastVote::reject(submission.id, voter, VALID_MS))
        .await
        .unwrap_err();

    assert!(matches!(err, ChallengeError::Conflict(_)));
    assert_eq!(h.service.list_votes(submission.id).await.unwrap().len(), 1);
    h.settle().await;
}

#[tokio::test]
async fn author_cannot_vote_on_own_submission() {
    let h = Harness::new(10);
    let challenge = h.challenge(100).await;
    let submission = h.submission(&challenge).await;

    let err = h
        .service
        .vote(CastVote::approve(submission.id, submission.user_id, VALID_MS))
        .await
        .unwrap_err();
    h.settle().await;

    assert!(matches!(err, ChallengeError::Conflict(_)));
    assert_eq!(h.store.count_votes_by_submission(submission.id).await.unwrap(), 0);
    assert!(h.events(ChallengeEvent::VOTE_ADDED).is_empty());
}

#[tokio::test]
async fn votes_after_the_decision_are_conflicts() {
    let h = Harness::new(2);
    let challenge = h.challenge(10).await;
    let submission = h.submission(&challenge).await;
    h.vote(&submission, true, VALID_MS).await.unwrap();
    h.vote(&submission, true, VALID_MS).await.unwrap();

    // Decide synchronously instead of waiting on the workers.
    let outcome = h.service.engine().re_evaluate(submission.id).await.unwrap();
    assert!(matches!(outcome, Outcome::Approved | Outcome::AlreadyDecided));

    let err = h.vote(&submission, false, VALID_MS).await.unwrap_err();
    assert!(matches!(err, ChallengeError::Conflict(_)));
    h.settle().await;
    assert_eq!(h.grants(), 1);
}

#[tokio::test]
async fn unknown_submission_is_not_found() {
    let h = Harness::new(10);
    let err = h
        .service
        .vote(CastVote::approve(
            common::SubmissionId::new(),
            UserId::new(),
            VALID_MS,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ChallengeError::NotFound { entity: "submission", .. }));
    h.settle().await;
}

#[tokio::test]
async fn submission_rules() {
    let h = Harness::new(10);
    let challenge = h.challenge(100).await;
    let user = UserId::new();

    h.service
        .submit(SubmitProof::new(challenge.id, user, "https://a"))
        .await
        .unwrap();
    let duplicate = h
        .service
        .submit(SubmitProof::new(challenge.id, user, "https://b"))
        .await
        .unwrap_err();
    assert!(matches!(duplicate, ChallengeError::Conflict(_)));

    let blank = h
        .service
        .submit(SubmitProof::new(challenge.id, UserId::new(), "  "))
        .await
        .unwrap_err();
    assert!(matches!(blank, ChallengeError::Validation(_)));

    let missing = h
        .service
        .submit(SubmitProof::new(
            common::ChallengeId::new(),
            UserId::new(),
            "https://c",
        ))
        .await
        .unwrap_err();
    assert!(matches!(missing, ChallengeError::NotFound { entity: "challenge", .. }));

    h.service.deactivate_challenge(challenge.id).await.unwrap();
    let inactive = h
        .service
        .submit(SubmitProof::new(challenge.id, UserId::new(), "https://d"))
        .await
        .unwrap_err();
    assert!(matches!(inactive, ChallengeError::Conflict(_)));

    assert_eq!(h.service.list_submissions(challenge.id).await.unwrap().len(), 1);
    h.settle().await;
    assert_eq!(h.events(ChallengeEvent::SUBMITTED).len(), 1);
}

#[tokio::test]
async fn create_challenge_validates_and_announces() {
    let h = Harness::new(10);

    let empty = h
        .service
        .create_challenge(CreateChallenge::new("   ", "x", 10))
        .await
        .unwrap_err();
    assert!(matches!(empty, ChallengeError::Validation(_)));
    let free = h
        .service
        .create_challenge(CreateChallenge::new("Swim", "x", 0))
        .await
        .unwrap_err();
    assert!(matches!(free, ChallengeError::Validation(_)));

    let challenge = h.challenge(25).await;
    assert!(challenge.is_active());
    assert_eq!(h.service.list_challenges().await.unwrap().len(), 1);
    assert!(h.service.sagas().is_empty());

    h.settle().await;
    let created = h.events(ChallengeEvent::CREATED);
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].payload["reward"], 25);
}

#[tokio::test]
async fn failed_announcement_compensates_the_stored_challenge() {
    let h = Harness::new(10);
    h.bus.shutdown().await;

    let err = h
        .service
        .create_challenge(CreateChallenge::new("Swim", "1km", 10))
        .await
        .unwrap_err();

    match err {
        ChallengeError::Saga(SagaError::StepFailed { ref step, .. }) => {
            assert_eq!(step, "announce_challenge");
        }
        other => panic!("expected saga step failure, got {other:?}"),
    }
    assert!(h.service.list_challenges().await.unwrap().is_empty());
    h.service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_votes_past_threshold_grant_exactly_once() {
    let h = Harness::new(3);
    let challenge = h.challenge(50).await;
    let submission = h.submission(&challenge).await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let service = h.service.clone();
        let id = submission.id;
        handles.push(tokio::spawn(async move {
            service
                .vote(CastVote::approve(id, UserId::new(), VALID_MS))
                .await
        }));
    }
    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(ChallengeError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    h.settle().await;

    assert!(accepted >= 3);
    let stored = h.service.get_submission(submission.id).await.unwrap();
    assert_eq!(stored.status, SubmissionStatus::Approved);
    assert_eq!(h.grants(), 1);
    assert_eq!(h.service.xp_balance(submission.user_id).await.unwrap(), 50);
    assert_eq!(h.events(ChallengeEvent::APPROVED).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_re_evaluations_decide_once() {
    let h = Harness::new(5);
    let challenge = h.challenge(30).await;
    let submission = h.submission(&challenge).await;
    // Votes written straight to storage so nothing is queued behind our back.
    for _ in 0..5 {
        h.store
            .create_vote(&Vote::new(submission.id, UserId::new(), true, VALID_MS, true))
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = h.service.clone();
        let id = submission.id;
        handles.push(tokio::spawn(async move {
            service.engine().re_evaluate(id).await
        }));
    }
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap().unwrap());
    }
    h.settle().await;

    let approvals = outcomes.iter().filter(|o| **o == Outcome::Approved).count();
    assert_eq!(approvals, 1);
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o, Outcome::Approved | Outcome::AlreadyDecided))
    );
    assert_eq!(h.grants(), 1);
    assert!(h.service.engine().locks().is_empty());

    let stored = h.store.get_submission(submission.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SubmissionStatus::Approved);
}

#[tokio::test]
async fn voting_after_shutdown_reports_closed_queue() {
    let h = Harness::new(10);
    let challenge = h.challenge(10).await;
    let submission = h.submission(&challenge).await;
    h.service.shutdown().await;

    let err = h.vote(&submission, true, VALID_MS).await.unwrap_err();
    assert!(matches!(err, ChallengeError::QueueClosed));
    assert!(!err.is_client_error());
    assert_eq!(h.store.count_votes_by_submission(submission.id).await.unwrap(), 0);
    assert!(h.events(ChallengeEvent::VOTE_ADDED).is_empty());
}

#[tokio::test]
async fn vote_waits_for_the_decision_in_progress() {
    let h = Harness::new(10);
    let challenge = h.challenge(10).await;
    let submission = h.submission(&challenge).await;

    // Stand in for a re-evaluation that is deciding the submission.
    let guard = h.service.engine().locks().acquire(submission.id).await;
    let service = h.service.clone();
    let id = submission.id;
    let mut pending_vote = tokio::spawn(async move {
        service
            .vote(CastVote::approve(id, UserId::new(), VALID_MS))
            .await
    });
    let early = tokio::time::timeout(Duration::from_millis(50), &mut pending_vote).await;
    assert!(early.is_err(), "vote must not be recorded while the lock is held");

    let decided = Submission {
        status: SubmissionStatus::Approved,
        ..submission.clone()
    };
    assert!(h.store.update_submission(&decided).await.unwrap());
    drop(guard);

    let err = pending_vote.await.unwrap().unwrap_err();
    assert!(matches!(err, ChallengeError::Conflict(_)));
    assert_eq!(h.store.count_votes_by_submission(submission.id).await.unwrap(), 0);
    h.settle().await;
}

/// Grants through the ledger, except that the first call panics.
struct PanicsOnce {
    inner: LedgerRewardGranter<MemoryStore>,
    panicked: AtomicBool,
}

#[async_trait]
impl RewardGranter<MemoryTx> for PanicsOnce {
    async fn grant_reward(
        &self,
        tx: &mut MemoryTx,
        user_id: UserId,
        source_type: &str,
        source_id: Uuid,
        amount: i64,
    ) -> Result<(), RewardError> {
        if !self.panicked.swap(true, Ordering::SeqCst) {
            panic!("ledger client blew up");
        }
        self.inner
            .grant_reward(tx, user_id, source_type, source_id, amount)
            .await
    }
}

#[tokio::test]
async fn worker_survives_a_panicking_re_evaluation() {
    let store = MemoryStore::new();
    let bus = EventBus::default();
    let granter = Arc::new(PanicsOnce {
        inner: LedgerRewardGranter::new(store.clone()),
        panicked: AtomicBool::new(false),
    });
    let config = ChallengeConfig {
        min_votes_required: 1,
        reevaluation_workers: 1,
        ..ChallengeConfig::default()
    };
    let service = ChallengeService::new(
        store.clone(),
        bus.clone(),
        SagaManager::new(),
        granter,
        config,
    );

    let challenge = service
        .create_challenge(CreateChallenge::new("Climb", "Any 6a", 15))
        .await
        .unwrap();
    let first = service
        .submit(SubmitProof::new(challenge.id, UserId::new(), "https://a"))
        .await
        .unwrap();
    let second = service
        .submit(SubmitProof::new(challenge.id, UserId::new(), "https://b"))
        .await
        .unwrap();

    service
        .vote(CastVote::approve(first.id, UserId::new(), VALID_MS))
        .await
        .unwrap();
    service
        .vote(CastVote::approve(second.id, UserId::new(), VALID_MS))
        .await
        .unwrap();
    service.shutdown().await;
    bus.shutdown().await;

    let first = service.get_submission(first.id).await.unwrap();
    let second = service.get_submission(second.id).await.unwrap();
    assert_eq!(first.status, SubmissionStatus::Pending);
    assert_eq!(second.status, SubmissionStatus::Approved);
    assert_eq!(service.xp_balance(first.user_id).await.unwrap(), 0);
    assert_eq!(service.xp_balance(second.user_id).await.unwrap(), 15);
    assert!(service.engine().locks().is_empty());
}
