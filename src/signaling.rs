//! Concurrent signaling engine: the room registry, per-connection duplex
//! loops, and the host/guest pairing state machine.

mod client;
mod hub;
mod ice;
mod messages;
mod room;
mod server;
mod types;

pub use client::{ClientSession, MAX_MESSAGE_SIZE, OUTBOUND_QUEUE_CAPACITY, SESSION_TTL};
pub use hub::Hub;
pub use ice::{generate_ice_servers, IceError, IceServer, IceServersResponse};
pub use messages::{LabelPolicy, SignalMessage};
pub use room::{Room, ROOM_TTL};
pub use server::{
    router, AppState, CLOSE_INVALID_ROLE, CLOSE_MISSING_ROOM_ID, CLOSE_ROOM_FULL,
    CLOSE_ROOM_ID_COLLISION, CLOSE_ROOM_NOT_FOUND, CLOSE_UNKNOWN_ERROR,
};
pub use types::{Role, RoomId, SessionId, SignalingError};
