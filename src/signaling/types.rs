use std::fmt;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Signaling errors surfaced to clients on the close frame
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("room already has a host")]
    HostSlotTaken,

    #[error("room already has a guest")]
    GuestSlotTaken,

    #[error("room does not exist")]
    RoomNotFound,

    #[error("room id collision, please try again")]
    RoomIdCollision,
}

// Uppercased shortened-UUID alphabet: digits 2-9 plus A-Z.
const ROOM_ID_CHARS: &[u8] = b"23456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ROOM_ID_LEN: usize = 6;
const SESSION_ID_LEN: usize = 13;
const HEX_CHARS: &[u8] = b"0123456789abcdef";

/// Room id: six uppercase alphanumeric characters, e.g. "AB2CD9"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomId {
    bytes: [u8; ROOM_ID_LEN],
}

impl RoomId {
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let mut bytes = [0u8; ROOM_ID_LEN];
        for byte in &mut bytes {
            *byte = ROOM_ID_CHARS[rng.random_range(0..ROOM_ID_CHARS.len())];
        }
        Self { bytes }
    }

    /// Parse a client-supplied id, normalizing to uppercase. Returns `None`
    /// unless the input is exactly six characters from the id alphabet.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != ROOM_ID_LEN {
            return None;
        }
        let mut bytes = [0u8; ROOM_ID_LEN];
        for (dst, src) in bytes.iter_mut().zip(s.bytes()) {
            let upper = src.to_ascii_uppercase();
            if !ROOM_ID_CHARS.contains(&upper) {
                return None;
            }
            *dst = upper;
        }
        Some(Self { bytes })
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or("")
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RoomId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RoomId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        RoomId::parse(&s).ok_or_else(|| serde::de::Error::custom("malformed room id"))
    }
}

/// Server-assigned opaque session id: "sess_" + 8 hex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId {
    bytes: [u8; SESSION_ID_LEN],
}

impl SessionId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_ID_LEN];
        bytes[..5].copy_from_slice(b"sess_");

        let mut rng = rand::rng();
        let value: u32 = rng.random();

        for i in 0..8 {
            let nibble = ((value >> (28 - i * 4)) & 0xF) as usize;
            bytes[5 + i] = HEX_CHARS[nibble];
        }
        Self { bytes }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or("")
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection role within a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Guest,
}

impl Role {
    /// Map the `role` query parameter to a role. The wire vocabulary calls
    /// the guest side "client".
    pub fn from_query(s: &str) -> Option<Self> {
        match s {
            "host" => Some(Role::Host),
            "client" => Some(Role::Guest),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::Guest => "guest",
        }
    }

    /// The label this role carries in message target/from fields.
    pub fn wire_label(&self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::Guest => "client",
        }
    }

    /// The role of the other occupant in a room.
    pub fn peer(&self) -> Role {
        match self {
            Role::Host => Role::Guest,
            Role::Guest => Role::Host,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
