//! Per-game broadcast rooms for websocket clients.
//!
//! Each game code owns one broadcast channel. Sockets subscribe on connect,
//! relay what their client sends, and forward everything published to the
//! room. A room is dropped once its last subscriber leaves.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::debug;

/// Messages buffered per room before slow receivers start lagging.
const ROOM_CAPACITY: usize = 64;

#[derive(Default)]
pub struct Rooms {
    inner: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl Rooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the room for `code`, creating it on first use.
    pub fn subscribe(&self, code: &str) -> broadcast::Receiver<String> {
        let mut rooms = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        rooms
            .entry(code.to_string())
            .or_insert_with(|| {
                debug!(code, "room opened");
                broadcast::channel(ROOM_CAPACITY).0
            })
            .subscribe()
    }

    /// Send `message` to everyone in the room. Returns the number of
    /// receivers reached; a missing room reaches nobody.
    pub fn publish(&self, code: &str, message: String) -> usize {
        let rooms = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        rooms
            .get(code)
            .and_then(|tx| tx.send(message).ok())
            .unwrap_or(0)
    }

    /// Drop the room for `code` if nobody is subscribed any more.
    ///
    /// Call after the leaving socket's receiver has been dropped.
    pub fn leave(&self, code: &str) {
        let mut rooms = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if rooms.get(code).is_some_and(|tx| tx.receiver_count() == 0) {
            rooms.remove(code);
            debug!(code, "room closed");
        }
    }

    /// Current subscriber count of a room.
    pub fn members(&self, code: &str) -> usize {
        let rooms = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        rooms.get(code).map_or(0, |tx| tx.receiver_count())
    }
}
