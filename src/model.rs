//! Poll snapshot model shared by the HTTP client, the sync engine and the
//! in-memory server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A poll as the server last described it. Replaced whole, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSnapshot {
    pub id: String,
    pub question: String,
    pub created_at: DateTime<Utc>,
    pub total_votes: u64,
    pub options: Vec<PollOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: String,
    pub text: String,
    pub votes: u64,
}

/// The viewer's relationship to a poll, as derived by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerState {
    pub has_voted: bool,
    #[serde(default)]
    pub voted_option_id: Option<String>,
}

/// Body of every successful poll endpoint: `{poll, shareUrl, viewer}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollEnvelope {
    pub poll: PollSnapshot,
    pub share_url: String,
    pub viewer: ViewerState,
}

impl PollSnapshot {
    pub fn option(&self, option_id: &str) -> Option<&PollOption> {
        self.options.iter().find(|option| option.id == option_id)
    }

    pub fn has_option(&self, option_id: &str) -> bool {
        self.option(option_id).is_some()
    }

    /// Share of `total_votes` held by `option`, rounded half-up.
    pub fn percentage(&self, option: &PollOption) -> u8 {
        percentage(option.votes, self.total_votes)
    }

    pub fn tallied_votes(&self) -> u64 {
        self.options
            .iter()
            .fold(0u64, |sum, option| sum.saturating_add(option.votes))
    }
}

impl ViewerState {
    pub fn voted_for(option_id: impl Into<String>) -> Self {
        ViewerState {
            has_voted: true,
            voted_option_id: Some(option_id.into()),
        }
    }
}

/// `round(votes / total * 100)`, 0 when `total` is 0 and capped at 100 when
/// the server hands out more option votes than its total.
pub fn percentage(votes: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }

    let votes = u128::from(votes);
    let total = u128::from(total);
    let rounded = (votes * 200 + total) / (total * 2);

    rounded.min(100) as u8
}
