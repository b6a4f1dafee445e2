pub mod models;
pub use models::*;

mod poll_room_ws;

pub use poll_room_ws::poll_room_ws;

use tokio::sync::broadcast;

/// Fan-out channel every push socket subscribes to. Sockets filter by the
/// rooms they joined.
pub fn room_channel(capacity: usize) -> RoomSender {
    let (tx, _rx) = broadcast::channel(capacity.max(1));
    tx
}
