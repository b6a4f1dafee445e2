use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::model::PollEnvelope;

/// Failures of the poll REST/push client, as seen by the sync engine.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidOption(String),
    /// The server already holds a vote for this viewer. `state` is the
    /// authoritative poll/viewer when the server sent it along.
    #[error("{message}")]
    AlreadyVoted {
        message: String,
        state: Option<Box<PollEnvelope>>,
    },
    #[error("{0}")]
    Rejected(String),
    #[error("Could not reach the poll server: {0}")]
    Network(String),
    #[error("{0}")]
    ServerError(String),
}

/// Errors returned by the poll HTTP handlers.
#[derive(Error, Debug)]
pub enum PollError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Poll not found.")]
    PollNotFound,
    #[error("Invalid option for this poll.")]
    InvalidOption,
    #[error("{message}")]
    AlreadyVoted {
        message: String,
        state: Box<PollEnvelope>,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            TransportError::ServerError(format!("Malformed response from server: {error}"))
        } else {
            TransportError::Network(error.to_string())
        }
    }
}

impl IntoResponse for PollError {
    fn into_response(self) -> Response {
        let message = self.to_string();

        match self {
            PollError::AlreadyVoted { state, .. } => {
                let body = Json(json!({
                    "error": message,
                    "poll": state.poll,
                    "shareUrl": state.share_url,
                    "viewer": state.viewer,
                }));
                (StatusCode::CONFLICT, body).into_response()
            }
            other => {
                let status = match other {
                    PollError::InvalidRequest(_) | PollError::InvalidOption => {
                        StatusCode::BAD_REQUEST
                    }
                    PollError::PollNotFound => StatusCode::NOT_FOUND,
                    PollError::AlreadyVoted { .. } => StatusCode::CONFLICT,
                };
                (status, Json(json!({ "error": message }))).into_response()
            }
        }
    }
}
