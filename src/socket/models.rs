use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::PollSnapshot;

/// Frames a viewer sends on the push socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    JoinPoll(RoomRequest),
    LeavePoll(RoomRequest),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRequest {
    #[serde(default)]
    pub poll_id: Option<String>,
}

/// Frames the server pushes to a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerFrame {
    PollUpdated(PollSnapshot),
    SocketError(SocketErrorPayload),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketErrorPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A fresh snapshot for every member of one poll room.
#[derive(Debug, Clone)]
pub struct RoomUpdate {
    pub poll_id: String,
    pub snapshot: PollSnapshot,
}

pub type RoomSender = broadcast::Sender<RoomUpdate>;

impl ClientFrame {
    pub fn join(poll_id: &str) -> Self {
        ClientFrame::JoinPoll(RoomRequest {
            poll_id: Some(poll_id.to_string()),
        })
    }

    pub fn leave(poll_id: &str) -> Self {
        ClientFrame::LeavePoll(RoomRequest {
            poll_id: Some(poll_id.to_string()),
        })
    }
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::SocketError(SocketErrorPayload {
            error: Some(message.into()),
        })
    }
}
