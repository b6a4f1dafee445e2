//! In-memory poll storage for the reference server.

pub mod models;
pub mod poll_repository;
pub mod vote_repository;

pub use models::*;
pub use vote_repository::VoteRejection;

use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

/// Shared handle to the store. Writers hold the lock across a vote and its
/// broadcast so room updates leave in commit order.
pub type StorePool = Arc<RwLock<PollStore>>;

#[derive(Debug, Default)]
pub struct PollStore {
    polls: HashMap<String, PollRecord>,
    votes: Vec<VoteRecord>,
}

impl PollStore {
    pub fn new_pool() -> StorePool {
        Arc::new(RwLock::new(PollStore::default()))
    }
}
