use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::room::Room;
use super::types::{RoomId, SignalingError};

/// Fresh-id attempts before allocation gives up. With 34^6 ids even a
/// second attempt is vanishingly rare.
const MAX_ALLOCATE_ATTEMPTS: usize = 8;

/// Process-wide registry of live rooms.
pub struct Hub {
    rooms: RwLock<HashMap<RoomId, Arc<Room>>>,
    shutdown: CancellationToken,
}

impl Hub {
    /// `shutdown` is the parent token every room's lifetime hangs off;
    /// cancelling it tears down every room in the registry.
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            shutdown,
        }
    }

    /// Generate a fresh id and register a room under it, retrying on
    /// collision without releasing the write lock.
    pub async fn allocate_room(&self) -> Result<Arc<Room>, SignalingError> {
        let mut rooms = self.rooms.write().await;
        for _ in 0..MAX_ALLOCATE_ATTEMPTS {
            let id = RoomId::generate();
            if rooms.contains_key(&id) {
                debug!(room_id = %id, "room id collision, retrying");
                continue;
            }
            let room = Arc::new(Room::new(id, &self.shutdown));
            rooms.insert(id, Arc::clone(&room));
            debug!(room_id = %id, "room created");
            return Ok(room);
        }
        error!(attempts = MAX_ALLOCATE_ATTEMPTS, "room id allocation failed");
        Err(SignalingError::RoomIdCollision)
    }

    /// Register a room under a caller-chosen id. The caller must have
    /// checked the id against the registry under this lock's discipline;
    /// an existing room under the same id would be displaced.
    pub async fn create_room(&self, id: RoomId) -> Arc<Room> {
        let mut rooms = self.rooms.write().await;
        let room = Arc::new(Room::new(id, &self.shutdown));
        rooms.insert(id, Arc::clone(&room));
        debug!(room_id = %id, "room created");
        room
    }

    pub async fn get_room(&self, id: &RoomId) -> Option<Arc<Room>> {
        self.rooms.read().await.get(id).cloned()
    }

    /// Drive the room to completion, then drop it from the registry. The
    /// delete happens strictly after `run` returns, so a registered room is
    /// never observed half torn down.
    pub async fn run_room(&self, room: Arc<Room>) {
        room.run().await;
        let mut rooms = self.rooms.write().await;
        rooms.remove(&room.id);
        debug!(room_id = %room.id, "room deleted after run finished");
    }
}
