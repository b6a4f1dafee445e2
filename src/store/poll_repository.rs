use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use super::{OptionRecord, PollRecord, PollStore};
use crate::model::{PollOption, PollSnapshot};

impl PollStore {
    pub fn create_poll(&mut self, question: &str, options: &[String]) -> PollRecord {
        let poll = PollRecord {
            id: Uuid::new_v4().to_string(),
            question: question.to_string(),
            created_at: Utc::now(),
            options: options
                .iter()
                .map(|text| OptionRecord {
                    id: Uuid::new_v4().to_string(),
                    text: text.clone(),
                })
                .collect(),
        };

        self.polls.insert(poll.id.clone(), poll.clone());
        poll
    }

    pub fn get_poll(&self, poll_id: &str) -> Option<&PollRecord> {
        self.polls.get(poll_id)
    }

    pub fn vote_counts(&self, poll_id: &str) -> HashMap<&str, u64> {
        let mut counts = HashMap::new();
        for vote in self.votes.iter().filter(|vote| vote.poll_id == poll_id) {
            *counts.entry(vote.option_id.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Current tallies of a poll in option creation order.
    pub fn snapshot(&self, poll_id: &str) -> Option<PollSnapshot> {
        let poll = self.get_poll(poll_id)?;
        let counts = self.vote_counts(poll_id);

        let options: Vec<PollOption> = poll
            .options
            .iter()
            .map(|option| PollOption {
                id: option.id.clone(),
                text: option.text.clone(),
                votes: counts.get(option.id.as_str()).copied().unwrap_or(0),
            })
            .collect();
        let total_votes = options.iter().map(|option| option.votes).sum();

        Some(PollSnapshot {
            id: poll.id.clone(),
            question: poll.question.clone(),
            created_at: poll.created_at,
            total_votes,
            options,
        })
    }
}
