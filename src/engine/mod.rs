//! Per-poll synchronization engine.
//!
//! Load responses, vote responses and room pushes all arrive as
//! [`EngineEvent`]s on one queue and are merged by [`SyncEngine::handle`],
//! one at a time, through [`EngineState::apply_snapshot`].

mod state;
mod view;

pub use state::{EngineState, Notice, Phase};
pub use view::{
    OptionView, PollView, SUBMITTING_LABEL, UNAVAILABLE_CHOICE, VOTE_LABEL, ViewerChoice,
};

use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::model::{PollEnvelope, PollSnapshot};
use crate::transport::{ErrorHandler, PollTransport, Subscription, UpdateHandler};

type Outcome = Result<PollEnvelope, TransportError>;

#[derive(Debug)]
pub enum EngineEvent {
    Loaded {
        poll_id: String,
        ticket: u64,
        result: Outcome,
    },
    Voted {
        poll_id: String,
        ticket: u64,
        result: Outcome,
    },
    Pushed {
        poll_id: String,
        push: PushEvent,
    },
}

#[derive(Debug, Clone)]
pub enum PushEvent {
    Updated(PollSnapshot),
    Advisory(String),
}

/// What handling one event did to the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Loaded,
    LoadFailed,
    VoteRecorded,
    /// The server already had a vote; its record is now shown.
    VoteResolved,
    /// Waiting on a reload after an `AlreadyVoted` without poll state.
    Reconciling,
    VoteFailed,
    SnapshotMerged,
    Advisory,
    Ignored(Skip),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    OtherPoll,
    Superseded,
    NotLive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadPurpose {
    Initial,
    Reconcile,
}

#[derive(Debug, Clone, Copy)]
struct PendingLoad {
    ticket: u64,
    purpose: LoadPurpose,
}

impl EngineEvent {
    pub fn poll_id(&self) -> &str {
        match self {
            EngineEvent::Loaded { poll_id, .. }
            | EngineEvent::Voted { poll_id, .. }
            | EngineEvent::Pushed { poll_id, .. } => poll_id,
        }
    }
}

pub struct SyncEngine<T: PollTransport> {
    transport: Arc<T>,
    state: EngineState,
    sender: mpsc::UnboundedSender<EngineEvent>,
    events: mpsc::UnboundedReceiver<EngineEvent>,
    subscription: Option<Subscription>,
    tickets: u64,
    pending_load: Option<PendingLoad>,
    pending_vote: Option<u64>,
    tasks: Vec<JoinHandle<()>>,
    closed: bool,
}

impl<T: PollTransport> SyncEngine<T> {
    pub fn new(transport: Arc<T>, poll_id: impl Into<String>) -> Self {
        let (sender, events) = mpsc::unbounded_channel();

        SyncEngine {
            transport,
            state: EngineState::new(poll_id),
            sender,
            events,
            subscription: None,
            tickets: 0,
            pending_load: None,
            pending_vote: None,
            tasks: Vec::new(),
            closed: false,
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn poll_id(&self) -> &str {
        &self.state.poll_id
    }

    pub fn view(&self) -> Option<PollView> {
        self.state.view()
    }

    /// Starts the first load and joins the poll's room. Only acts once, from
    /// `Idle`.
    pub fn enter(&mut self) {
        if self.state.phase != Phase::Idle {
            return;
        }
        info!(poll_id = %self.state.poll_id, "entering poll view");

        self.state.begin_loading();
        self.spawn_load(LoadPurpose::Initial);
        self.open_subscription();
    }

    /// Reloads after a failed load. Returns false unless the engine is
    /// `Failed`.
    pub fn retry(&mut self) -> bool {
        if self.state.phase != Phase::Failed {
            return false;
        }
        debug!(poll_id = %self.state.poll_id, "retrying poll load");

        self.state.begin_loading();
        self.spawn_load(LoadPurpose::Initial);
        if self.subscription.is_none() {
            self.open_subscription();
        }
        true
    }

    /// Submits a vote for `option_id`. Returns false, leaving the state
    /// untouched, when voting is not possible (not ready, already voted, or
    /// another vote still pending).
    pub fn vote(&mut self, option_id: &str) -> bool {
        if !self.state.begin_vote(option_id) {
            debug!(poll_id = %self.state.poll_id, %option_id, "ignoring vote intent");
            return false;
        }

        let ticket = self.next_ticket();
        self.pending_vote = Some(ticket);

        let transport = Arc::clone(&self.transport);
        let sender = self.sender.clone();
        let poll_id = self.state.poll_id.clone();
        let option_id = option_id.to_string();
        self.track(tokio::spawn(async move {
            let result = transport.submit_vote(&poll_id, &option_id).await;
            let _ = sender.send(EngineEvent::Voted {
                poll_id,
                ticket,
                result,
            });
        }));
        true
    }

    /// Waits for the next queued event and merges it.
    pub async fn next_change(&mut self) -> Option<Change> {
        let event = self.events.recv().await?;
        Some(self.handle(event))
    }

    pub fn handle(&mut self, event: EngineEvent) -> Change {
        if event.poll_id() != self.state.poll_id {
            debug!(
                poll_id = %self.state.poll_id,
                event_poll_id = %event.poll_id(),
                "discarding event for another poll"
            );
            return Change::Ignored(Skip::OtherPoll);
        }

        match event {
            EngineEvent::Loaded { ticket, result, .. } => self.on_loaded(ticket, result),
            EngineEvent::Voted { ticket, result, .. } => self.on_voted(ticket, result),
            EngineEvent::Pushed { push, .. } => self.on_pushed(push),
        }
    }

    /// Leaves the poll view: late completions are discarded and the room is
    /// left exactly once.
    pub fn leave(mut self) {
        self.teardown();
    }

    /// Leaves this poll and enters `poll_id` with a brand-new state.
    pub fn navigate(mut self, poll_id: impl Into<String>) -> SyncEngine<T> {
        self.teardown();
        let mut next = SyncEngine::new(Arc::clone(&self.transport), poll_id);
        next.enter();
        next
    }

    fn on_loaded(&mut self, ticket: u64, result: Outcome) -> Change {
        let Some(pending) = self.pending_load.take_if(|pending| pending.ticket == ticket) else {
            return Change::Ignored(Skip::Superseded);
        };
        let result = result.and_then(|envelope| self.for_this_poll(envelope));

        match (pending.purpose, result) {
            (LoadPurpose::Initial, Ok(envelope)) => {
                self.state.adopt(envelope);
                self.state.phase = Phase::Ready;
                self.state.last_error = None;
                info!(poll_id = %self.state.poll_id, "poll loaded");
                Change::Loaded
            }
            (LoadPurpose::Initial, Err(e)) => {
                warn!(poll_id = %self.state.poll_id, "poll load failed: {}", e);
                self.state.load_failed(e.to_string());
                Change::LoadFailed
            }
            (LoadPurpose::Reconcile, Ok(envelope)) => {
                self.state.adopt(envelope);
                self.state.finish_vote();
                Change::VoteResolved
            }
            (LoadPurpose::Reconcile, Err(e)) => {
                warn!(poll_id = %self.state.poll_id, "reload after duplicate vote failed: {}", e);
                self.state.vote_failed(e.to_string());
                Change::VoteFailed
            }
        }
    }

    fn on_voted(&mut self, ticket: u64, result: Outcome) -> Change {
        if self.pending_vote.take_if(|pending| *pending == ticket).is_none() {
            return Change::Ignored(Skip::Superseded);
        }

        match result.and_then(|envelope| self.for_this_poll(envelope)) {
            Ok(envelope) => {
                self.state.adopt(envelope);
                self.state.finish_vote();
                info!(poll_id = %self.state.poll_id, "vote recorded");
                Change::VoteRecorded
            }
            Err(TransportError::AlreadyVoted { message, state }) => {
                info!(poll_id = %self.state.poll_id, "server already had a vote: {}", message);
                self.state.notice = Some(Notice::AlreadyVoted(message));

                match state.map(|envelope| self.for_this_poll(*envelope)) {
                    Some(Ok(envelope)) => {
                        self.state.adopt(envelope);
                        self.state.finish_vote();
                        Change::VoteResolved
                    }
                    _ => {
                        self.spawn_load(LoadPurpose::Reconcile);
                        Change::Reconciling
                    }
                }
            }
            Err(e) => {
                warn!(poll_id = %self.state.poll_id, "vote failed: {}", e);
                self.state.vote_failed(e.to_string());
                Change::VoteFailed
            }
        }
    }

    fn on_pushed(&mut self, push: PushEvent) -> Change {
        match push {
            PushEvent::Updated(snapshot) => {
                if snapshot.id != self.state.poll_id {
                    return Change::Ignored(Skip::OtherPoll);
                }
                if !self.state.accepts_push() {
                    debug!(
                        poll_id = %self.state.poll_id,
                        phase = ?self.state.phase,
                        "push before first load, dropped"
                    );
                    return Change::Ignored(Skip::NotLive);
                }
                self.state.apply_snapshot(snapshot, None);
                Change::SnapshotMerged
            }
            PushEvent::Advisory(message) => {
                debug!(poll_id = %self.state.poll_id, "push channel notice: {}", message);
                self.state.notice = Some(Notice::Advisory(message));
                Change::Advisory
            }
        }
    }

    fn for_this_poll(&self, envelope: PollEnvelope) -> Outcome {
        if envelope.poll.id == self.state.poll_id {
            Ok(envelope)
        } else {
            Err(TransportError::ServerError(format!(
                "Server answered with poll {} instead of {}",
                envelope.poll.id, self.state.poll_id
            )))
        }
    }

    fn spawn_load(&mut self, purpose: LoadPurpose) {
        let ticket = self.next_ticket();
        self.pending_load = Some(PendingLoad { ticket, purpose });

        let transport = Arc::clone(&self.transport);
        let sender = self.sender.clone();
        let poll_id = self.state.poll_id.clone();
        self.track(tokio::spawn(async move {
            let result = transport.load_poll(&poll_id).await;
            let _ = sender.send(EngineEvent::Loaded {
                poll_id,
                ticket,
                result,
            });
        }));
    }

    fn open_subscription(&mut self) {
        let poll_id = self.state.poll_id.clone();

        let sender = self.sender.clone();
        let room = poll_id.clone();
        let on_update: UpdateHandler = Box::new(move |snapshot: PollSnapshot| {
            let _ = sender.send(EngineEvent::Pushed {
                poll_id: room.clone(),
                push: PushEvent::Updated(snapshot),
            });
        });

        let sender = self.sender.clone();
        let room = poll_id.clone();
        let on_error: ErrorHandler = Box::new(move |message: String| {
            let _ = sender.send(EngineEvent::Pushed {
                poll_id: room.clone(),
                push: PushEvent::Advisory(message),
            });
        });

        self.subscription = Some(self.transport.subscribe(&poll_id, on_update, on_error));
    }

    fn next_ticket(&mut self) -> u64 {
        self.tickets += 1;
        self.tickets
    }

    fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.retain(|running| !running.is_finished());
        self.tasks.push(task);
    }

    fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pending_load = None;
        self.pending_vote = None;

        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
        }
        self.events.close();
        debug!(poll_id = %self.state.poll_id, "left poll view");
    }
}

impl<T: PollTransport> Drop for SyncEngine<T> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests;
