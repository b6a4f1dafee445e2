//! Request/response and push access to the poll server, behind the
//! [`PollTransport`] seam the sync engine is written against.

mod http;
mod room_listener;

pub use http::PollClient;

use std::future::Future;

use crate::error::TransportError;
use crate::model::{PollEnvelope, PollSnapshot};

/// Receives every full snapshot pushed for the subscribed poll.
pub type UpdateHandler = Box<dyn Fn(PollSnapshot) + Send + Sync + 'static>;
/// Receives advisory, non-fatal push channel messages.
pub type ErrorHandler = Box<dyn Fn(String) + Send + Sync + 'static>;

pub trait PollTransport: Send + Sync + 'static {
    fn load_poll(
        &self,
        poll_id: &str,
    ) -> impl Future<Output = Result<PollEnvelope, TransportError>> + Send;

    fn submit_vote(
        &self,
        poll_id: &str,
        option_id: &str,
    ) -> impl Future<Output = Result<PollEnvelope, TransportError>> + Send;

    /// Joins the poll's room. Updates keep flowing, across reconnects, until
    /// the returned [`Subscription`] is cancelled or dropped.
    fn subscribe(
        &self,
        poll_id: &str,
        on_update: UpdateHandler,
        on_error: ErrorHandler,
    ) -> Subscription;
}

/// Handle to a live room membership.
pub struct Subscription {
    poll_id: String,
    on_cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Subscription {
    pub fn new(poll_id: impl Into<String>, on_cancel: impl FnOnce() + Send + 'static) -> Self {
        Subscription {
            poll_id: poll_id.into(),
            on_cancel: Some(Box::new(on_cancel)),
        }
    }

    pub fn poll_id(&self) -> &str {
        &self.poll_id
    }

    pub fn is_active(&self) -> bool {
        self.on_cancel.is_some()
    }

    /// Leaves the room and releases the channel. Only the first call does
    /// anything.
    pub fn cancel(&mut self) {
        if let Some(on_cancel) = self.on_cancel.take() {
            on_cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("poll_id", &self.poll_id)
            .field("active", &self.is_active())
            .finish()
    }
}
