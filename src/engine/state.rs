use tracing::{debug, warn};

use crate::model::{PollEnvelope, PollSnapshot, ViewerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Ready,
    Voting,
    Failed,
}

/// Informative messages that are not failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The server already had a vote for this viewer; its record was adopted.
    AlreadyVoted(String),
    /// Non-fatal message from the push channel.
    Advisory(String),
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::AlreadyVoted(message) | Notice::Advisory(message) => message,
        }
    }
}

/// Everything known about the viewed poll. Owned by one
/// [`SyncEngine`](super::SyncEngine); a new poll id gets a new state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineState {
    pub poll_id: String,
    pub phase: Phase,
    pub snapshot: Option<PollSnapshot>,
    pub viewer: ViewerState,
    pub share_url: Option<String>,
    pub last_error: Option<String>,
    pub notice: Option<Notice>,
    pub pending_option_id: Option<String>,
}

impl EngineState {
    pub fn new(poll_id: impl Into<String>) -> Self {
        EngineState {
            poll_id: poll_id.into(),
            phase: Phase::Idle,
            snapshot: None,
            viewer: ViewerState::default(),
            share_url: None,
            last_error: None,
            notice: None,
            pending_option_id: None,
        }
    }

    pub fn can_vote(&self) -> bool {
        self.phase == Phase::Ready
            && self.snapshot.is_some()
            && !self.viewer.has_voted
            && self.pending_option_id.is_none()
    }

    /// Push updates are merged once a first load has landed, and never while
    /// idle or failed.
    pub fn accepts_push(&self) -> bool {
        match self.phase {
            Phase::Ready | Phase::Voting => true,
            Phase::Loading => self.snapshot.is_some(),
            Phase::Idle | Phase::Failed => false,
        }
    }

    /// The one place poll state changes: the incoming snapshot replaces the
    /// held one whole, and `viewer` is only replaced when the source is
    /// authoritative for it (a load or vote response, not a push).
    pub fn apply_snapshot(&mut self, snapshot: PollSnapshot, viewer: Option<ViewerState>) {
        if snapshot.total_votes != snapshot.tallied_votes() {
            debug!(
                poll_id = %snapshot.id,
                total_votes = snapshot.total_votes,
                tallied = snapshot.tallied_votes(),
                "snapshot total disagrees with option tallies"
            );
        }

        self.snapshot = Some(snapshot);
        if let Some(viewer) = viewer {
            self.viewer = viewer;
        }
        self.check_viewer();
    }

    pub(crate) fn adopt(&mut self, envelope: PollEnvelope) {
        self.share_url = Some(envelope.share_url);
        self.apply_snapshot(envelope.poll, Some(envelope.viewer));
    }

    pub(crate) fn begin_loading(&mut self) {
        self.phase = Phase::Loading;
        self.last_error = None;
        self.notice = None;
    }

    pub(crate) fn load_failed(&mut self, message: String) {
        self.phase = Phase::Failed;
        self.last_error = Some(message);
    }

    /// Marks `option_id` as pending. Returns false, changing nothing, when a
    /// vote is not allowed right now.
    pub(crate) fn begin_vote(&mut self, option_id: &str) -> bool {
        if !self.can_vote() {
            return false;
        }
        self.phase = Phase::Voting;
        self.pending_option_id = Some(option_id.to_string());
        self.last_error = None;
        self.notice = None;
        true
    }

    pub(crate) fn finish_vote(&mut self) {
        self.phase = Phase::Ready;
        self.pending_option_id = None;
    }

    pub(crate) fn vote_failed(&mut self, message: String) {
        self.finish_vote();
        self.last_error = Some(message);
    }

    fn check_viewer(&self) {
        match (&self.viewer.voted_option_id, &self.snapshot) {
            (Some(option_id), Some(snapshot)) if !snapshot.has_option(option_id) => {
                warn!(
                    poll_id = %self.poll_id,
                    %option_id,
                    "viewer's voted option is not in the current snapshot"
                );
            }
            _ => {}
        }
        if self.viewer.has_voted != self.viewer.voted_option_id.is_some() {
            warn!(
                poll_id = %self.poll_id,
                has_voted = self.viewer.has_voted,
                "viewer state is inconsistent"
            );
        }
    }
}
