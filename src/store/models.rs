use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct PollRecord {
    pub id: String,
    pub question: String,
    pub created_at: DateTime<Utc>,
    pub options: Vec<OptionRecord>,
}

#[derive(Debug, Clone)]
pub struct OptionRecord {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct VoteRecord {
    pub poll_id: String,
    pub option_id: String,
    pub voter_token_hash: String,
    pub ip_hash: String,
    pub created_at: DateTime<Utc>,
}
