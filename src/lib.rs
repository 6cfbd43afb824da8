//! Rendezvous: a WebRTC signaling server pairing one host with one guest.
//!
//! The server relays SDP offers/answers and ICE candidates between exactly
//! two peers until they report a direct connection. It never carries media;
//! once the peers are linked, their room closes and they talk P2P.

pub mod config;
pub mod signaling;
