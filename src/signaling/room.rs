use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::client::ClientSession;
use super::messages::SignalMessage;
use super::types::{Role, RoomId, SignalingError};

/// Rooms expire after this long whether or not the peers ever paired. Once
/// they report a direct connection the room has no further purpose anyway.
pub const ROOM_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Default)]
struct Occupants {
    host: Option<Arc<ClientSession>>,
    guest: Option<Arc<ClientSession>>,
}

/// Rendezvous point pairing one host with at most one guest, crossing
/// signaling messages between them until either side has no further use
/// for it.
pub struct Room {
    pub id: RoomId,
    occupants: RwLock<Occupants>,
    cancel: CancellationToken,
}

impl Room {
    pub(crate) fn new(id: RoomId, parent: &CancellationToken) -> Self {
        Self {
            id,
            occupants: RwLock::new(Occupants::default()),
            cancel: parent.child_token(),
        }
    }

    /// Block until the room expires or is cancelled, then tear it down.
    pub async fn run(&self) {
        debug!(room_id = %self.id, "room running");
        tokio::select! {
            _ = tokio::time::sleep(ROOM_TTL) => {
                debug!(room_id = %self.id, "room deadline elapsed");
            }
            _ = self.cancel.cancelled() => {
                debug!(room_id = %self.id, "room cancelled");
            }
        }
        self.cleanup().await;
    }

    /// Fill the slot matching the session's role. The host hears about a
    /// guest arriving; a conflict on either slot is reported to the caller
    /// untouched so it can close the connection with the reason.
    pub async fn add_occupant(&self, session: &Arc<ClientSession>) -> Result<(), SignalingError> {
        let mut occupants = self.occupants.write().await;
        match session.role {
            Role::Host => {
                if occupants.host.is_some() {
                    return Err(SignalingError::HostSlotTaken);
                }
                occupants.host = Some(Arc::clone(session));
                debug!(room_id = %self.id, session_id = %session.id, "host joined room");
            }
            Role::Guest => {
                if occupants.guest.is_some() {
                    return Err(SignalingError::GuestSlotTaken);
                }
                occupants.guest = Some(Arc::clone(session));
                debug!(room_id = %self.id, session_id = %session.id, "guest joined room");
                if let Some(host) = &occupants.host {
                    host.send_message(&SignalMessage::GuestJoined);
                }
            }
        }
        Ok(())
    }

    /// Clear the leaver's slot and notify whoever stayed. A departing host
    /// cancels the room; a guest departure leaves the room open for a
    /// replacement unless nobody is left at all.
    pub async fn remove_occupant(&self, session: &ClientSession) {
        let mut occupants = self.occupants.write().await;
        match session.role {
            Role::Host => {
                occupants.host = None;
                if let Some(guest) = &occupants.guest {
                    guest.send_message(&SignalMessage::HostLeft);
                }
                debug!(room_id = %self.id, session_id = %session.id, "host left room");
                self.cancel.cancel();
            }
            Role::Guest => {
                occupants.guest = None;
                if let Some(host) = &occupants.host {
                    host.send_message(&SignalMessage::GuestLeft);
                } else {
                    // nobody left; the room is unreachable
                    self.cancel.cancel();
                }
                debug!(room_id = %self.id, session_id = %session.id, "guest left room");
            }
        }
    }

    /// Forward a client message to the opposite occupant, dropping it with
    /// a warning when no peer is attached. The enqueue is non-blocking, so
    /// a stuck receiver can never stall the sender's read loop.
    pub async fn route(&self, msg: &SignalMessage, from: &ClientSession) {
        let occupants = self.occupants.read().await;
        let target = match from.role {
            Role::Host => occupants.guest.as_ref(),
            Role::Guest => occupants.host.as_ref(),
        };

        let Some(target) = target else {
            warn!(room_id = %self.id, from = %from.id, "no target client to route message to");
            return;
        };

        target.send_message(msg);
        debug!(
            room_id = %self.id,
            from = %from.id,
            to = %target.id,
            kind = msg.kind(),
            "routed message"
        );
    }

    pub async fn is_empty(&self) -> bool {
        let occupants = self.occupants.read().await;
        occupants.host.is_none() && occupants.guest.is_none()
    }

    /// Notify and detach anyone still here. Idempotent. Each slot is taken
    /// before its queue closes, so a concurrent enqueue or re-close finds
    /// either an empty slot or an already-closed queue, never a race.
    pub async fn cleanup(&self) {
        let mut occupants = self.occupants.write().await;

        if let Some(host) = occupants.host.take() {
            host.send_message(&SignalMessage::RoomClosed);
            host.close_outbound();
        }

        if let Some(guest) = occupants.guest.take() {
            guest.send_message(&SignalMessage::RoomClosed);
            guest.close_outbound();
        }

        debug!(room_id = %self.id, "room cleaned up");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::extract::ws::Utf8Bytes;
    use tokio::sync::mpsc;

    use super::*;
    use crate::signaling::client::OUTBOUND_QUEUE_CAPACITY;
    use crate::signaling::messages::LabelPolicy;

    fn new_room() -> Room {
        Room::new(RoomId::generate(), &CancellationToken::new())
    }

    fn new_session(role: Role) -> (Arc<ClientSession>, mpsc::Receiver<Utf8Bytes>) {
        ClientSession::new(role, LabelPolicy::default())
    }

    async fn recv_msg(rx: &mut mpsc::Receiver<Utf8Bytes>) -> SignalMessage {
        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("queue closed unexpectedly");
        serde_json::from_str(frame.as_str()).expect("frame is valid json")
    }

    fn offer() -> SignalMessage {
        SignalMessage::Offer {
            sdp: "v=0...".to_string(),
            target: None,
            from: None,
        }
    }

    #[tokio::test]
    async fn guest_join_notifies_host() {
        let room = new_room();
        let (host, mut host_rx) = new_session(Role::Host);
        let (guest, _guest_rx) = new_session(Role::Guest);

        room.add_occupant(&host).await.unwrap();
        room.add_occupant(&guest).await.unwrap();

        assert_eq!(recv_msg(&mut host_rx).await, SignalMessage::GuestJoined);
    }

    #[tokio::test]
    async fn second_host_is_rejected() {
        let room = new_room();
        let (host, _rx) = new_session(Role::Host);
        let (intruder, _rx2) = new_session(Role::Host);

        room.add_occupant(&host).await.unwrap();
        let err = room.add_occupant(&intruder).await.unwrap_err();
        assert_eq!(err.to_string(), "room already has a host");
    }

    #[tokio::test]
    async fn second_guest_is_rejected() {
        let room = new_room();
        let (guest, _rx) = new_session(Role::Guest);
        let (intruder, _rx2) = new_session(Role::Guest);

        room.add_occupant(&guest).await.unwrap();
        let err = room.add_occupant(&intruder).await.unwrap_err();
        assert_eq!(err.to_string(), "room already has a guest");
    }

    #[tokio::test]
    async fn routes_cross_between_occupants() {
        let room = new_room();
        let (host, mut host_rx) = new_session(Role::Host);
        let (guest, mut guest_rx) = new_session(Role::Guest);
        room.add_occupant(&host).await.unwrap();
        room.add_occupant(&guest).await.unwrap();
        assert_eq!(recv_msg(&mut host_rx).await, SignalMessage::GuestJoined);

        room.route(&offer(), &host).await;
        assert_eq!(recv_msg(&mut guest_rx).await, offer());

        let answer = SignalMessage::Answer {
            sdp: "v=0...".to_string(),
            target: None,
            from: None,
        };
        room.route(&answer, &guest).await;
        assert_eq!(recv_msg(&mut host_rx).await, answer);
    }

    #[tokio::test]
    async fn route_without_peer_drops_message() {
        let room = new_room();
        let (host, mut host_rx) = new_session(Role::Host);
        room.add_occupant(&host).await.unwrap();

        room.route(&offer(), &host).await;
        assert!(host_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn host_departure_cancels_room_and_notifies_guest() {
        let root = CancellationToken::new();
        let room = Arc::new(Room::new(RoomId::generate(), &root));
        let (host, _host_rx) = new_session(Role::Host);
        let (guest, mut guest_rx) = new_session(Role::Guest);
        room.add_occupant(&host).await.unwrap();
        room.add_occupant(&guest).await.unwrap();

        let runner = tokio::spawn({
            let room = Arc::clone(&room);
            async move { room.run().await }
        });

        room.remove_occupant(&host).await;

        assert_eq!(recv_msg(&mut guest_rx).await, SignalMessage::HostLeft);
        assert_eq!(recv_msg(&mut guest_rx).await, SignalMessage::RoomClosed);
        assert!(guest_rx.recv().await.is_none());

        tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .expect("room run should finish after host leaves")
            .unwrap();
        assert!(room.is_empty().await);
    }

    #[tokio::test]
    async fn guest_departure_keeps_room_open() {
        let room = new_room();
        let (host, mut host_rx) = new_session(Role::Host);
        let (guest, _guest_rx) = new_session(Role::Guest);
        room.add_occupant(&host).await.unwrap();
        room.add_occupant(&guest).await.unwrap();
        assert_eq!(recv_msg(&mut host_rx).await, SignalMessage::GuestJoined);

        room.remove_occupant(&guest).await;
        assert_eq!(recv_msg(&mut host_rx).await, SignalMessage::GuestLeft);

        // a replacement guest can still attach
        let (next, _next_rx) = new_session(Role::Guest);
        room.add_occupant(&next).await.unwrap();
        assert_eq!(recv_msg(&mut host_rx).await, SignalMessage::GuestJoined);
    }

    #[tokio::test]
    async fn cleanup_notifies_and_closes_both_queues() {
        let room = new_room();
        let (host, mut host_rx) = new_session(Role::Host);
        let (guest, mut guest_rx) = new_session(Role::Guest);
        room.add_occupant(&host).await.unwrap();
        room.add_occupant(&guest).await.unwrap();
        assert_eq!(recv_msg(&mut host_rx).await, SignalMessage::GuestJoined);

        room.cleanup().await;

        assert_eq!(recv_msg(&mut host_rx).await, SignalMessage::RoomClosed);
        assert!(host_rx.recv().await.is_none());
        assert_eq!(recv_msg(&mut guest_rx).await, SignalMessage::RoomClosed);
        assert!(guest_rx.recv().await.is_none());
        assert!(room.is_empty().await);

        // second pass finds nothing to do
        room.cleanup().await;
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_tears_the_room_down() {
        let room = Arc::new(new_room());
        let (host, mut host_rx) = new_session(Role::Host);
        room.add_occupant(&host).await.unwrap();

        let runner = tokio::spawn({
            let room = Arc::clone(&room);
            async move { room.run().await }
        });

        // the paused clock jumps straight past the room deadline once the
        // runner's sleep is the only pending timer
        runner.await.unwrap();

        assert_eq!(recv_msg(&mut host_rx).await, SignalMessage::RoomClosed);
        assert!(host_rx.recv().await.is_none());
        assert!(room.is_empty().await);
    }

    #[tokio::test]
    async fn stuck_receiver_is_cut_off_and_peer_continues() {
        let room = new_room();
        let (host, _host_rx) = new_session(Role::Host);
        let (guest, mut guest_rx) = new_session(Role::Guest);
        room.add_occupant(&host).await.unwrap();
        room.add_occupant(&guest).await.unwrap();

        // the guest never drains; one route past capacity closes its queue
        for _ in 0..=OUTBOUND_QUEUE_CAPACITY {
            room.route(&offer(), &host).await;
        }

        let mut drained = 0;
        while guest_rx.recv().await.is_some() {
            drained += 1;
        }
        assert_eq!(drained, OUTBOUND_QUEUE_CAPACITY);

        // further traffic from the host is dropped, not an error
        room.route(&offer(), &host).await;
    }
}
