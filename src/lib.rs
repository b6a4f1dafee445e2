//! Live poll viewer: keeps one viewer's picture of a poll in sync with the
//! server across loads, votes and room pushes.
//!
//! The client side is [`transport::PollClient`] driven by an
//! [`engine::SyncEngine`]. The server side (`polls`, `socket`, `store`,
//! `voter`, `startup`) is the in-memory poll API the client talks to.

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod polls;
pub mod socket;
pub mod startup;
pub mod store;
pub mod transport;
pub mod voter;

pub use engine::{Change, Phase, PollView, SyncEngine};
pub use error::TransportError;
pub use model::{PollEnvelope, PollOption, PollSnapshot, ViewerState};
pub use transport::{PollClient, PollTransport, Subscription};
