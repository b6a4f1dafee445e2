use chrono::Utc;

use super::{PollStore, VoteRecord};
use crate::model::ViewerState;

pub const BROWSER_ALREADY_VOTED: &str = "This browser has already voted in this poll.";
pub const NETWORK_ALREADY_VOTED: &str =
    "A vote from this IP/network has already been recorded for this poll.";

/// Why the store refused a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteRejection {
    UnknownPoll,
    UnknownOption,
    SameBrowser,
    SameNetwork,
}

impl VoteRejection {
    pub fn message(self) -> &'static str {
        match self {
            VoteRejection::UnknownPoll => "Poll not found.",
            VoteRejection::UnknownOption => "Invalid option for this poll.",
            VoteRejection::SameBrowser => BROWSER_ALREADY_VOTED,
            VoteRejection::SameNetwork => NETWORK_ALREADY_VOTED,
        }
    }
}

impl PollStore {
    /// Records a vote unless this browser token or network already voted on
    /// the poll. The token check runs first.
    pub fn cast_vote(
        &mut self,
        poll_id: &str,
        option_id: &str,
        voter_token_hash: &str,
        ip_hash: &str,
    ) -> Result<(), VoteRejection> {
        let poll = self.get_poll(poll_id).ok_or(VoteRejection::UnknownPoll)?;
        if !poll.options.iter().any(|option| option.id == option_id) {
            return Err(VoteRejection::UnknownOption);
        }

        if self
            .votes
            .iter()
            .any(|vote| vote.poll_id == poll_id && vote.voter_token_hash == voter_token_hash)
        {
            return Err(VoteRejection::SameBrowser);
        }
        if self
            .votes
            .iter()
            .any(|vote| vote.poll_id == poll_id && vote.ip_hash == ip_hash)
        {
            return Err(VoteRejection::SameNetwork);
        }

        self.votes.push(VoteRecord {
            poll_id: poll_id.to_string(),
            option_id: option_id.to_string(),
            voter_token_hash: voter_token_hash.to_string(),
            ip_hash: ip_hash.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    pub fn find_viewer_vote(
        &self,
        poll_id: &str,
        voter_token_hash: &str,
        ip_hash: &str,
    ) -> Option<&VoteRecord> {
        self.votes.iter().find(|vote| {
            vote.poll_id == poll_id
                && (vote.voter_token_hash == voter_token_hash || vote.ip_hash == ip_hash)
        })
    }

    pub fn viewer_state(
        &self,
        poll_id: &str,
        voter_token_hash: &str,
        ip_hash: &str,
    ) -> ViewerState {
        match self.find_viewer_vote(poll_id, voter_token_hash, ip_hash) {
            Some(vote) => ViewerState::voted_for(vote.option_id.clone()),
            None => ViewerState::default(),
        }
    }
}
