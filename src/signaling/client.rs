use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::messages::{LabelPolicy, SignalMessage};
use super::room::Room;
use super::types::{Role, SessionId};

/// Hard cap on inbound frame size, enforced by the transport.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 128; // 128KB
/// A session may live this long before it is cut off.
pub const SESSION_TTL: Duration = Duration::from_secs(10 * 60);
/// Outbound frames buffered per session before the receiver counts as stuck.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

const WRITE_WAIT: Duration = Duration::from_secs(10);
const PONG_WAIT: Duration = Duration::from_secs(25);
const PING_PERIOD: Duration = Duration::from_millis(PONG_WAIT.as_millis() as u64 * 9 / 10);
const NORMAL_CLOSURE: u16 = 1000;

enum Enqueue {
    Queued,
    Full,
    Closed,
}

/// Bounded FIFO of serialized frames awaiting the writer task.
///
/// Closing takes the sender, so the writer drains whatever is buffered and
/// then observes end-of-queue. Whoever closes must clear the room slot
/// first; with the sender gone, a concurrent producer sees `Closed` instead
/// of racing a re-close.
#[derive(Debug)]
struct OutboundQueue {
    tx: Mutex<Option<mpsc::Sender<Utf8Bytes>>>,
}

impl OutboundQueue {
    fn new() -> (Self, mpsc::Receiver<Utf8Bytes>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    fn push(&self, frame: Utf8Bytes) -> Enqueue {
        let guard = self.tx.lock().expect("outbound queue lock");
        let Some(tx) = guard.as_ref() else {
            return Enqueue::Closed;
        };
        match tx.try_send(frame) {
            Ok(()) => Enqueue::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => Enqueue::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => Enqueue::Closed,
        }
    }

    fn close(&self) {
        self.tx.lock().expect("outbound queue lock").take();
    }
}

/// One connected peer: its identity, its role in the room, and the bounded
/// queue feeding its writer task.
pub struct ClientSession {
    pub id: SessionId,
    pub role: Role,
    label_policy: LabelPolicy,
    queue: OutboundQueue,
    cancel: CancellationToken,
}

impl ClientSession {
    /// Build a session and hand back the receiving half of its outbound
    /// queue for the writer task in [`run`](Self::run).
    pub fn new(role: Role, label_policy: LabelPolicy) -> (Arc<Self>, mpsc::Receiver<Utf8Bytes>) {
        let (queue, rx) = OutboundQueue::new();
        let session = Arc::new(Self {
            id: SessionId::generate(),
            role,
            label_policy,
            queue,
            cancel: CancellationToken::new(),
        });
        (session, rx)
    }

    /// Serialize and enqueue without blocking. A full queue means the
    /// receiver has stopped draining; the queue is closed and the session
    /// ends rather than stall routing for its peer.
    pub fn send_message(&self, msg: &SignalMessage) {
        let data = match serde_json::to_string(msg) {
            Ok(data) => data,
            Err(err) => {
                error!(session_id = %self.id, %err, "marshal message");
                return;
            }
        };

        match self.queue.push(Utf8Bytes::from(data)) {
            Enqueue::Queued => debug!(session_id = %self.id, kind = msg.kind(), "sent message"),
            Enqueue::Full => {
                warn!(session_id = %self.id, "outbound queue full, closing session");
                self.queue.close();
            }
            Enqueue::Closed => {
                debug!(session_id = %self.id, "outbound queue closed, dropping message");
            }
        }
    }

    /// Close the outbound queue, letting the writer drain and exit. Called
    /// by the room during cleanup after the slot is cleared.
    pub(crate) fn close_outbound(&self) {
        self.queue.close();
    }

    /// Service the connection until the peer disconnects, a deadline fires,
    /// or the room tears the session down. Returns once both the reader and
    /// the writer have stopped; the caller removes the session from its
    /// room.
    pub async fn run(
        &self,
        socket: WebSocket,
        outbound: mpsc::Receiver<Utf8Bytes>,
        room: &Room,
    ) {
        let (sink, stream) = socket.split();

        let mut writer = tokio::spawn(write_loop(sink, outbound, self.cancel.clone(), self.id));
        self.read_loop(stream, room).await;
        self.cancel.cancel();

        // give the writer a bounded window to flush and close; a stalled
        // transport must not pin the session open
        match tokio::time::timeout(WRITE_WAIT, &mut writer).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(session_id = %self.id, %err, "join writer task"),
            Err(_) => {
                debug!(session_id = %self.id, "writer stalled past deadline, aborting");
                writer.abort();
            }
        }
    }

    async fn read_loop(&self, mut stream: SplitStream<WebSocket>, room: &Room) {
        let deadline = tokio::time::sleep(SESSION_TTL);
        tokio::pin!(deadline);

        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(session_id = %self.id, "session cancelled, closing reader");
                    return;
                }
                _ = &mut deadline => {
                    debug!(session_id = %self.id, "session deadline reached");
                    return;
                }
                frame = stream.next() => frame,
            };

            let msg = match frame {
                Some(Ok(msg)) => msg,
                Some(Err(err)) => {
                    debug!(session_id = %self.id, %err, "read message");
                    return;
                }
                None => {
                    debug!(session_id = %self.id, "connection closed");
                    return;
                }
            };

            match msg {
                Message::Text(text) => {
                    if !self.dispatch(text.as_str(), room).await {
                        return;
                    }
                }
                Message::Close(_) => {
                    debug!(session_id = %self.id, "close received");
                    return;
                }
                // control frames carry no signaling payload
                _ => {}
            }
        }
    }

    /// Decode and act on one inbound frame. Returns false when the session
    /// should end.
    async fn dispatch(&self, text: &str, room: &Room) -> bool {
        let mut msg: SignalMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(err) => {
                error!(session_id = %self.id, %err, "unmarshal message");
                return true;
            }
        };

        if matches!(
            msg,
            SignalMessage::Offer { .. }
                | SignalMessage::Answer { .. }
                | SignalMessage::IceCandidate { .. }
        ) {
            msg.relabel(self.label_policy, self.role);
            room.route(&msg, self).await;
            return true;
        }

        if matches!(msg, SignalMessage::WebRtcConnected) {
            // the peers have a direct link; our work here is done
            debug!(session_id = %self.id, room_id = %room.id, "webrtc connected");
            return false;
        }

        warn!(
            session_id = %self.id,
            kind = msg.kind(),
            "discarding message type not accepted from clients"
        );
        true
    }
}

/// Drain the outbound queue onto the socket and keep the connection alive
/// with periodic pings. Exits when the queue closes, a write fails, or the
/// session is cancelled, and cancels the session on the way out so the
/// reader unblocks too.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Utf8Bytes>,
    cancel: CancellationToken,
    session_id: SessionId,
) {
    let start = tokio::time::Instant::now() + PING_PERIOD;
    let mut ping = tokio::time::interval_at(start, PING_PERIOD);

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(err) = sink.send(Message::Text(frame)).await {
                        debug!(session_id = %session_id, %err, "writing to client");
                        break;
                    }
                }
                None => {
                    debug!(session_id = %session_id, "outbound queue closed, closing connection");
                    break;
                }
            },
            _ = ping.tick() => {
                if let Err(err) = sink.send(Message::Ping(Bytes::new())).await {
                    debug!(session_id = %session_id, %err, "pinging client");
                    break;
                }
            }
            _ = cancel.cancelled() => break,
        }
    }

    let frame = CloseFrame {
        code: NORMAL_CLOSURE,
        reason: Utf8Bytes::from_static("closing"),
    };
    let _ = sink.send(Message::Close(Some(frame))).await;
    cancel.cancel();
}
