//! Render-ready projection of an [`EngineState`]. Percentages are computed
//! from the held snapshot on every call and never stored.

use super::state::{EngineState, Phase};

pub const VOTE_LABEL: &str = "Vote";
pub const SUBMITTING_LABEL: &str = "Submitting...";
pub const UNAVAILABLE_CHOICE: &str = "not currently an available option";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollView {
    pub phase: Phase,
    pub poll_id: String,
    pub question: String,
    pub total_votes: u64,
    pub options: Vec<OptionView>,
    pub viewer_choice: ViewerChoice,
    pub can_vote: bool,
    pub share_url: Option<String>,
    pub error: Option<String>,
    pub notice: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionView {
    pub id: String,
    pub text: String,
    pub votes: u64,
    pub percentage: u8,
    pub is_viewer_choice: bool,
    pub is_pending: bool,
    pub can_vote: bool,
}

/// What the viewer voted for, resolved against the current options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerChoice {
    NotVoted,
    Option { id: String, text: String },
    /// The recorded vote points at an option the snapshot no longer has.
    Unavailable(String),
}

impl OptionView {
    pub fn button_label(&self) -> &'static str {
        if self.is_pending {
            SUBMITTING_LABEL
        } else {
            VOTE_LABEL
        }
    }

    pub fn votes_label(&self) -> String {
        let noun = if self.votes == 1 { "vote" } else { "votes" };
        format!("{} {} ({}%)", self.votes, noun, self.percentage)
    }
}

impl ViewerChoice {
    pub fn describe(&self) -> String {
        match self {
            ViewerChoice::NotVoted => "You have not voted yet.".to_string(),
            ViewerChoice::Option { text, .. } => format!("You voted for {text}."),
            ViewerChoice::Unavailable(_) => {
                format!("You voted for an option that is {UNAVAILABLE_CHOICE}.")
            }
        }
    }
}

impl EngineState {
    /// `None` until a snapshot has been loaded.
    pub fn view(&self) -> Option<PollView> {
        let snapshot = self.snapshot.as_ref()?;
        let can_vote = self.can_vote();
        let voted = self.viewer.voted_option_id.as_deref();
        let pending = self.pending_option_id.as_deref();

        let options = snapshot
            .options
            .iter()
            .map(|option| OptionView {
                id: option.id.clone(),
                text: option.text.clone(),
                votes: option.votes,
                percentage: snapshot.percentage(option),
                is_viewer_choice: voted == Some(option.id.as_str()),
                is_pending: pending == Some(option.id.as_str()),
                can_vote,
            })
            .collect();

        let viewer_choice = match voted {
            None => ViewerChoice::NotVoted,
            Some(id) => match snapshot.option(id) {
                Some(option) => ViewerChoice::Option {
                    id: option.id.clone(),
                    text: option.text.clone(),
                },
                None => ViewerChoice::Unavailable(id.to_string()),
            },
        };

        Some(PollView {
            phase: self.phase,
            poll_id: snapshot.id.clone(),
            question: snapshot.question.clone(),
            total_votes: snapshot.total_votes,
            options,
            viewer_choice,
            can_vote,
            share_url: self.share_url.clone(),
            error: self.last_error.clone(),
            notice: self.notice.as_ref().map(|notice| notice.message().to_string()),
        })
    }
}
