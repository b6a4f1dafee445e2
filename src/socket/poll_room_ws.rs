use std::collections::HashSet;

use axum::{
    extract::{
        Extension,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tracing::{debug, warn};

use crate::socket::models::{ClientFrame, RoomUpdate, ServerFrame};
use crate::startup::AppState;

/// Push socket: viewers join poll rooms and receive full snapshots on every
/// tally change.
pub async fn poll_room_ws(
    ws: WebSocketUpgrade,
    Extension(app_state): Extension<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(mut socket: WebSocket, app_state: AppState) {
    let mut rx = app_state.rooms.subscribe();
    let mut rooms: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(update) => {
                        if !rooms.contains(&update.poll_id) {
                            continue;
                        }
                        let frame = ServerFrame::PollUpdated(update.snapshot);
                        if !send_frame(&mut socket, &frame).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "push socket fell behind, resending room snapshots");
                        let frames = catch_up(&app_state, &mut rx, &rooms, true, None).await;
                        if !send_frames(&mut socket, &frames).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            message = socket.recv() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let frames = match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(frame) => {
                                handle_client_frame(frame, &app_state, &mut rx, &mut rooms).await
                            }
                            Err(_) => vec![ServerFrame::error("Malformed message.")],
                        };
                        if !send_frames(&mut socket, &frames).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!(rooms = rooms.len(), "push socket closed");
}

async fn handle_client_frame(
    frame: ClientFrame,
    app_state: &AppState,
    rx: &mut broadcast::Receiver<RoomUpdate>,
    rooms: &mut HashSet<String>,
) -> Vec<ServerFrame> {
    match frame {
        ClientFrame::JoinPoll(request) => {
            let Some(poll_id) = request.poll_id.filter(|id| !id.trim().is_empty()) else {
                return vec![ServerFrame::error("pollId is required.")];
            };
            debug!(%poll_id, "viewer joined poll room");
            rooms.insert(poll_id.clone());
            catch_up(app_state, rx, rooms, false, Some(&poll_id)).await
        }
        ClientFrame::LeavePoll(request) => {
            if let Some(poll_id) = request.poll_id {
                debug!(%poll_id, "viewer left poll room");
                rooms.remove(&poll_id);
            }
            Vec::new()
        }
    }
}

/// Drains whatever is queued on `rx` and returns current snapshots for the
/// rooms it touched, plus `joined`. Holding the read lock keeps voters from
/// broadcasting in between, so nothing older can follow these frames.
async fn catch_up(
    app_state: &AppState,
    rx: &mut broadcast::Receiver<RoomUpdate>,
    rooms: &HashSet<String>,
    all_stale: bool,
    joined: Option<&str>,
) -> Vec<ServerFrame> {
    let store = app_state.store.read().await;

    let mut stale: HashSet<String> = if all_stale {
        rooms.clone()
    } else {
        HashSet::new()
    };
    loop {
        match rx.try_recv() {
            Ok(update) => {
                stale.insert(update.poll_id);
            }
            Err(TryRecvError::Lagged(_)) => stale.extend(rooms.iter().cloned()),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }

    let mut frames: Vec<ServerFrame> = rooms
        .iter()
        .filter(|poll_id| stale.contains(*poll_id) && Some(poll_id.as_str()) != joined)
        .filter_map(|poll_id| store.snapshot(poll_id))
        .map(ServerFrame::PollUpdated)
        .collect();

    if let Some(poll_id) = joined {
        frames.push(match store.snapshot(poll_id) {
            Some(snapshot) => ServerFrame::PollUpdated(snapshot),
            None => ServerFrame::error("Poll not found."),
        });
    }

    frames
}

async fn send_frames(socket: &mut WebSocket, frames: &[ServerFrame]) -> bool {
    for frame in frames {
        if !send_frame(socket, frame).await {
            return false;
        }
    }
    true
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(json) => socket.send(Message::Text(json)).await.is_ok(),
        Err(e) => {
            warn!("failed to encode push frame: {}", e);
            true
        }
    }
}
