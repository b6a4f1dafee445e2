//! Background task behind a [`Subscription`]: one WebSocket per poll room,
//! re-joined on every reconnect until cancelled.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::{
    net::TcpStream,
    sync::oneshot,
    time::sleep,
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::{ErrorHandler, Subscription, UpdateHandler};
use crate::socket::{ClientFrame, ServerFrame};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub(crate) struct RoomTarget {
    pub socket_url: String,
    pub poll_id: String,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

enum RoomExit {
    Cancelled,
    Disconnected,
}

pub(crate) fn spawn(
    target: RoomTarget,
    on_update: UpdateHandler,
    on_error: ErrorHandler,
) -> Subscription {
    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let poll_id = target.poll_id.clone();

    tokio::spawn(run(target, on_update, on_error, cancel_rx));

    Subscription::new(poll_id, move || {
        let _ = cancel_tx.send(());
    })
}

async fn run(
    target: RoomTarget,
    on_update: UpdateHandler,
    on_error: ErrorHandler,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let mut delay = target.reconnect_initial;

    loop {
        let connected = tokio::select! {
            result = connect_async(target.socket_url.as_str()) => result,
            _ = &mut cancel_rx => return,
        };

        match connected {
            Ok((mut socket, _)) => {
                delay = target.reconnect_initial;
                let exit =
                    serve_room(&mut socket, &target, &on_update, &on_error, &mut cancel_rx).await;
                match exit {
                    RoomExit::Cancelled => return,
                    RoomExit::Disconnected => {
                        info!(poll_id = %target.poll_id, "poll room connection lost, reconnecting");
                    }
                }
            }
            Err(e) => {
                warn!(poll_id = %target.poll_id, "poll room connect failed: {}", e);
            }
        }

        tokio::select! {
            _ = sleep(delay) => {}
            _ = &mut cancel_rx => return,
        }
        delay = (delay * 2).min(target.reconnect_max);
    }
}

/// Joins the room on a fresh connection and pumps frames until the socket
/// drops or the subscription is cancelled. A cancelled room is left before
/// the socket is closed.
async fn serve_room(
    socket: &mut Socket,
    target: &RoomTarget,
    on_update: &UpdateHandler,
    on_error: &ErrorHandler,
    cancel_rx: &mut oneshot::Receiver<()>,
) -> RoomExit {
    if !send_frame(socket, &ClientFrame::join(&target.poll_id)).await {
        return RoomExit::Disconnected;
    }
    debug!(poll_id = %target.poll_id, "joined poll room");

    loop {
        tokio::select! {
            message = socket.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => dispatch(&text, target, on_update, on_error),
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        return RoomExit::Disconnected;
                    }
                    Some(Ok(_)) => {}
                }
            }
            _ = &mut *cancel_rx => {
                send_frame(socket, &ClientFrame::leave(&target.poll_id)).await;
                let _ = socket.close(None).await;
                debug!(poll_id = %target.poll_id, "left poll room");
                return RoomExit::Cancelled;
            }
        }
    }
}

fn dispatch(text: &str, target: &RoomTarget, on_update: &UpdateHandler, on_error: &ErrorHandler) {
    match serde_json::from_str::<ServerFrame>(text) {
        Ok(ServerFrame::PollUpdated(snapshot)) if snapshot.id == target.poll_id => {
            on_update(snapshot)
        }
        Ok(ServerFrame::PollUpdated(snapshot)) => {
            debug!(
                expected = %target.poll_id,
                got = %snapshot.id,
                "dropping update for another poll"
            );
        }
        Ok(ServerFrame::SocketError(payload)) => {
            if let Some(error) = payload.error {
                on_error(error);
            }
        }
        Err(e) => warn!("unreadable push frame: {}", e),
    }
}

async fn send_frame(socket: &mut Socket, frame: &ClientFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(json) => socket.send(Message::Text(json)).await.is_ok(),
        Err(e) => {
            warn!("failed to encode room frame: {}", e);
            false
        }
    }
}
