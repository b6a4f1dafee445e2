use super::*;
use crate::model::{PollOption, ViewerState};
use chrono::Utc;
use std::{
    collections::VecDeque,
    future::{Future, pending},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::time::timeout;

/// Answers loads and votes from queues; an empty queue never answers.
#[derive(Default)]
struct ScriptedTransport {
    loads: Mutex<VecDeque<Outcome>>,
    votes: Mutex<VecDeque<Outcome>>,
    load_calls: AtomicUsize,
    vote_calls: AtomicUsize,
    joins: AtomicUsize,
    leaves: Arc<AtomicUsize>,
    rooms: Mutex<Vec<(String, UpdateHandler, ErrorHandler)>>,
}

impl ScriptedTransport {
    fn new() -> Arc<Self> {
        Arc::new(ScriptedTransport::default())
    }

    fn script_load(&self, result: Outcome) {
        self.loads.lock().unwrap().push_back(result);
    }

    fn script_vote(&self, result: Outcome) {
        self.votes.lock().unwrap().push_back(result);
    }

    fn push(&self, snapshot: PollSnapshot) {
        for (poll_id, on_update, _) in self.rooms.lock().unwrap().iter() {
            if *poll_id == snapshot.id {
                on_update(snapshot.clone());
            }
        }
    }

    fn advise(&self, message: &str) {
        for (_, _, on_error) in self.rooms.lock().unwrap().iter() {
            on_error(message.to_string());
        }
    }

    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

fn next_outcome(queue: &Mutex<VecDeque<Outcome>>) -> impl Future<Output = Outcome> + Send {
    let next = queue.lock().unwrap().pop_front();
    async move {
        match next {
            Some(result) => result,
            None => pending().await,
        }
    }
}

impl PollTransport for ScriptedTransport {
    fn load_poll(&self, _poll_id: &str) -> impl Future<Output = Outcome> + Send {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        next_outcome(&self.loads)
    }

    fn submit_vote(
        &self,
        _poll_id: &str,
        _option_id: &str,
    ) -> impl Future<Output = Outcome> + Send {
        self.vote_calls.fetch_add(1, Ordering::SeqCst);
        next_outcome(&self.votes)
    }

    fn subscribe(
        &self,
        poll_id: &str,
        on_update: UpdateHandler,
        on_error: ErrorHandler,
    ) -> Subscription {
        self.joins.fetch_add(1, Ordering::SeqCst);
        self.rooms
            .lock()
            .unwrap()
            .push((poll_id.to_string(), on_update, on_error));

        let leaves = Arc::clone(&self.leaves);
        Subscription::new(poll_id, move || {
            leaves.fetch_add(1, Ordering::SeqCst);
        })
    }
}

fn snapshot_of(poll_id: &str, red: u64, blue: u64) -> PollSnapshot {
    PollSnapshot {
        id: poll_id.to_string(),
        question: "Pick a color".to_string(),
        created_at: Utc::now(),
        total_votes: red + blue,
        options: vec![
            PollOption {
                id: "r".to_string(),
                text: "Red".to_string(),
                votes: red,
            },
            PollOption {
                id: "b".to_string(),
                text: "Blue".to_string(),
                votes: blue,
            },
        ],
    }
}

fn snapshot(red: u64, blue: u64) -> PollSnapshot {
    snapshot_of("p1", red, blue)
}

fn envelope(poll: PollSnapshot, viewer: ViewerState) -> PollEnvelope {
    PollEnvelope {
        share_url: format!("http://localhost:3000/poll/{}", poll.id),
        poll,
        viewer,
    }
}

async fn next(engine: &mut SyncEngine<ScriptedTransport>) -> Change {
    timeout(Duration::from_secs(2), engine.next_change())
        .await
        .expect("no engine event within 2s")
        .expect("event queue closed")
}

async fn ready_engine(transport: &Arc<ScriptedTransport>) -> SyncEngine<ScriptedTransport> {
    transport.script_load(Ok(envelope(snapshot(0, 0), ViewerState::default())));
    let mut engine = SyncEngine::new(Arc::clone(transport), "p1");
    engine.enter();
    assert_eq!(next(&mut engine).await, Change::Loaded);
    engine
}

#[tokio::test]
async fn test_load_then_vote_shows_results() {
    let transport = ScriptedTransport::new();
    let mut engine = ready_engine(&transport).await;

    let view = engine.view().unwrap();
    assert_eq!(view.phase, Phase::Ready);
    assert_eq!(view.question, "Pick a color");
    assert!(view.can_vote);
    assert_eq!(view.share_url.as_deref(), Some("http://localhost:3000/poll/p1"));

    transport.script_vote(Ok(envelope(snapshot(1, 0), ViewerState::voted_for("r"))));
    assert!(engine.vote("r"));
    assert_eq!(engine.state().pending_option_id.as_deref(), Some("r"));
    assert_eq!(next(&mut engine).await, Change::VoteRecorded);

    let view = engine.view().unwrap();
    assert_eq!(view.phase, Phase::Ready);
    assert_eq!(view.total_votes, 1);
    assert_eq!(view.options[0].percentage, 100);
    assert_eq!(view.options[1].percentage, 0);
    assert!(!view.options[0].can_vote);
    assert!(view.options[0].is_viewer_choice);
    assert_eq!(engine.state().pending_option_id, None);
}

#[tokio::test]
async fn test_second_vote_intent_is_ignored() {
    let transport = ScriptedTransport::new();
    let mut engine = ready_engine(&transport).await;

    assert!(engine.vote("r"));
    let before = engine.state().clone();

    assert!(!engine.vote("b"));
    assert!(!engine.vote("r"));
    tokio::task::yield_now().await;

    assert_eq!(*engine.state(), before);
    assert_eq!(ScriptedTransport::count(&transport.vote_calls), 1);
}

#[tokio::test]
async fn test_vote_before_load_is_ignored() {
    let transport = ScriptedTransport::new();
    let mut engine = SyncEngine::new(Arc::clone(&transport), "p1");
    engine.enter();

    assert!(!engine.vote("r"));
    assert_eq!(engine.state().phase, Phase::Loading);
    assert_eq!(ScriptedTransport::count(&transport.vote_calls), 0);
}

#[tokio::test]
async fn test_push_during_vote_keeps_pending_marker() {
    let transport = ScriptedTransport::new();
    let mut engine = ready_engine(&transport).await;
    assert!(engine.vote("r"));

    transport.push(snapshot(2, 3));
    assert_eq!(next(&mut engine).await, Change::SnapshotMerged);

    let state = engine.state();
    assert_eq!(state.phase, Phase::Voting);
    assert_eq!(state.pending_option_id.as_deref(), Some("r"));
    assert_eq!(state.viewer, ViewerState::default());
    assert_eq!(engine.view().unwrap().total_votes, 5);
}

#[tokio::test]
async fn test_vote_response_replaces_pushed_snapshot() {
    let transport = ScriptedTransport::new();
    let mut engine = ready_engine(&transport).await;
    assert!(engine.vote("r"));
    let ticket = engine.pending_vote.unwrap();

    let mut pushed = snapshot(0, 4);
    pushed.question = "Pick a colour".to_string();
    let change = engine.handle(EngineEvent::Pushed {
        poll_id: "p1".to_string(),
        push: PushEvent::Updated(pushed),
    });
    assert_eq!(change, Change::SnapshotMerged);

    let answered = snapshot(1, 4);
    let change = engine.handle(EngineEvent::Voted {
        poll_id: "p1".to_string(),
        ticket,
        result: Ok(envelope(answered.clone(), ViewerState::voted_for("r"))),
    });

    assert_eq!(change, Change::VoteRecorded);
    assert_eq!(engine.state().snapshot, Some(answered));
    assert_eq!(engine.state().viewer, ViewerState::voted_for("r"));
}

#[tokio::test]
async fn test_already_voted_adopts_server_viewer() {
    let transport = ScriptedTransport::new();
    let mut engine = ready_engine(&transport).await;
    transport.script_vote(Err(TransportError::AlreadyVoted {
        message: "This browser has already voted in this poll.".to_string(),
        state: Some(Box::new(envelope(snapshot(0, 1), ViewerState::voted_for("b")))),
    }));

    assert!(engine.vote("r"));
    assert_eq!(next(&mut engine).await, Change::VoteResolved);

    let state = engine.state();
    assert_eq!(state.phase, Phase::Ready);
    assert_eq!(state.viewer, ViewerState::voted_for("b"));
    assert_eq!(state.last_error, None);
    assert!(matches!(state.notice, Some(Notice::AlreadyVoted(_))));
    assert_eq!(
        engine.view().unwrap().viewer_choice,
        ViewerChoice::Option {
            id: "b".to_string(),
            text: "Blue".to_string()
        }
    );
}

#[tokio::test]
async fn test_already_voted_without_state_reloads() {
    let transport = ScriptedTransport::new();
    let mut engine = ready_engine(&transport).await;
    transport.script_vote(Err(TransportError::AlreadyVoted {
        message: "This network has already voted in this poll.".to_string(),
        state: None,
    }));
    transport.script_load(Ok(envelope(snapshot(0, 1), ViewerState::voted_for("b"))));

    assert!(engine.vote("r"));
    assert_eq!(next(&mut engine).await, Change::Reconciling);
    assert_eq!(engine.state().phase, Phase::Voting);
    assert_eq!(engine.state().pending_option_id.as_deref(), Some("r"));

    assert_eq!(next(&mut engine).await, Change::VoteResolved);
    let state = engine.state();
    assert_eq!(state.phase, Phase::Ready);
    assert_eq!(state.pending_option_id, None);
    assert_eq!(state.viewer, ViewerState::voted_for("b"));
    assert_eq!(ScriptedTransport::count(&transport.load_calls), 2);
}

#[tokio::test]
async fn test_vote_failure_keeps_previous_results() {
    let transport = ScriptedTransport::new();
    let mut engine = ready_engine(&transport).await;
    let loaded = engine.state().snapshot.clone();
    transport.script_vote(Err(TransportError::Network("timed out".to_string())));

    assert!(engine.vote("r"));
    assert_eq!(next(&mut engine).await, Change::VoteFailed);

    let state = engine.state();
    assert_eq!(state.phase, Phase::Ready);
    assert_eq!(state.snapshot, loaded);
    assert_eq!(state.pending_option_id, None);
    assert_eq!(
        state.last_error.as_deref(),
        Some("Could not reach the poll server: timed out")
    );
    assert!(state.can_vote());
}

#[tokio::test]
async fn test_failed_load_waits_for_retry() {
    let transport = ScriptedTransport::new();
    transport.script_load(Err(TransportError::NotFound("Poll not found.".to_string())));
    let mut engine = SyncEngine::new(Arc::clone(&transport), "p1");
    engine.enter();

    assert_eq!(next(&mut engine).await, Change::LoadFailed);
    assert_eq!(engine.state().phase, Phase::Failed);
    assert_eq!(engine.state().last_error.as_deref(), Some("Poll not found."));

    let change = engine.handle(EngineEvent::Pushed {
        poll_id: "p1".to_string(),
        push: PushEvent::Updated(snapshot(1, 0)),
    });
    assert_eq!(change, Change::Ignored(Skip::NotLive));
    assert_eq!(engine.state().snapshot, None);

    transport.script_load(Ok(envelope(snapshot(1, 0), ViewerState::default())));
    assert!(engine.retry());
    assert_eq!(engine.state().phase, Phase::Loading);
    assert_eq!(engine.state().last_error, None);
    assert_eq!(next(&mut engine).await, Change::Loaded);
    assert_eq!(engine.state().phase, Phase::Ready);

    assert!(!engine.retry());
    assert_eq!(ScriptedTransport::count(&transport.joins), 1);
}

#[tokio::test]
async fn test_push_before_first_load_is_dropped() {
    let transport = ScriptedTransport::new();
    let mut engine = SyncEngine::new(Arc::clone(&transport), "p1");
    engine.enter();

    transport.push(snapshot(3, 0));
    assert_eq!(next(&mut engine).await, Change::Ignored(Skip::NotLive));
    assert_eq!(engine.state().snapshot, None);
    assert_eq!(engine.state().phase, Phase::Loading);
}

#[tokio::test]
async fn test_late_load_for_previous_poll_is_discarded() {
    let transport = ScriptedTransport::new();
    let mut engine = SyncEngine::new(Arc::clone(&transport), "p1");
    engine.enter();
    let stale_ticket = engine.pending_load.unwrap().ticket;

    let mut engine = engine.navigate("p2");
    let change = engine.handle(EngineEvent::Loaded {
        poll_id: "p1".to_string(),
        ticket: stale_ticket,
        result: Ok(envelope(snapshot(5, 5), ViewerState::voted_for("r"))),
    });

    assert_eq!(change, Change::Ignored(Skip::OtherPoll));
    assert_eq!(engine.poll_id(), "p2");
    assert_eq!(engine.state().phase, Phase::Loading);
    assert_eq!(engine.state().snapshot, None);
    assert_eq!(engine.state().viewer, ViewerState::default());
}

#[tokio::test]
async fn test_superseded_ticket_is_discarded() {
    let transport = ScriptedTransport::new();
    let mut engine = SyncEngine::new(Arc::clone(&transport), "p1");
    engine.enter();

    let change = engine.handle(EngineEvent::Loaded {
        poll_id: "p1".to_string(),
        ticket: 999,
        result: Ok(envelope(snapshot(1, 1), ViewerState::default())),
    });

    assert_eq!(change, Change::Ignored(Skip::Superseded));
    assert_eq!(engine.state().snapshot, None);
}

#[tokio::test]
async fn test_leaving_before_load_releases_room_once() {
    let transport = ScriptedTransport::new();
    let mut engine = SyncEngine::new(Arc::clone(&transport), "p1");
    engine.enter();
    engine.leave();

    assert_eq!(ScriptedTransport::count(&transport.joins), 1);
    assert_eq!(ScriptedTransport::count(&transport.leaves), 1);
}

#[tokio::test]
async fn test_navigate_leaves_old_room_and_joins_new() {
    let transport = ScriptedTransport::new();
    let mut engine = SyncEngine::new(Arc::clone(&transport), "p1");
    engine.enter();

    let engine = engine.navigate("p2");
    assert_eq!(ScriptedTransport::count(&transport.joins), 2);
    assert_eq!(ScriptedTransport::count(&transport.leaves), 1);

    drop(engine);
    assert_eq!(ScriptedTransport::count(&transport.leaves), 2);
}

#[tokio::test]
async fn test_dropping_an_idle_engine_leaves_nothing() {
    let transport = ScriptedTransport::new();
    drop(SyncEngine::new(Arc::clone(&transport), "p1"));

    assert_eq!(ScriptedTransport::count(&transport.joins), 0);
    assert_eq!(ScriptedTransport::count(&transport.leaves), 0);
}

#[tokio::test]
async fn test_advisory_only_sets_notice() {
    let transport = ScriptedTransport::new();
    let mut engine = ready_engine(&transport).await;
    let before = engine.state().clone();

    transport.advise("Malformed message.");
    assert_eq!(next(&mut engine).await, Change::Advisory);

    let state = engine.state();
    assert_eq!(state.snapshot, before.snapshot);
    assert_eq!(state.viewer, before.viewer);
    assert_eq!(state.phase, before.phase);
    assert_eq!(state.last_error, None);
    assert_eq!(
        state.notice,
        Some(Notice::Advisory("Malformed message.".to_string()))
    );
}

#[tokio::test]
async fn test_envelope_for_another_poll_fails_the_load() {
    let transport = ScriptedTransport::new();
    transport.script_load(Ok(envelope(snapshot_of("p9", 0, 0), ViewerState::default())));
    let mut engine = SyncEngine::new(Arc::clone(&transport), "p1");
    engine.enter();

    assert_eq!(next(&mut engine).await, Change::LoadFailed);
    assert_eq!(engine.state().snapshot, None);
}
