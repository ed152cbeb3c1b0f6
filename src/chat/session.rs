use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::anyhow;
use bytes::BytesMut;
use tracing::{debug, info};

use crate::chat::action::{encode_actions, Action};
use crate::net::event::InboundEvent;
use crate::net::udp_client::UdpClient;

/// An action on its way out
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Outbound {
    /// to the server for a client, to every peer for the server
    All(Action),
    /// to a single peer, identified by its network id (server only)
    Peer(u64, Action),
    /// to every peer except the listed network ids (server only)
    AllBut(Vec<u64>, Action),
}

/// What the session thread hands to the consuming side
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SessionEvent {
    /// the client's connection was accepted by the server
    Connected,
    Action { origin: u64, action: Action },
    PeerJoined { network_id: u64, address: SocketAddr },
    PeerLost { network_id: u64 },
    /// the client's connection attempt failed, or its connection to the server was lost
    ConnectionLost { reason: String },
}

#[derive(Default)]
struct Exchange {
    outbound: Vec<Outbound>,
    inbound: Vec<SessionEvent>,
}

/// Double buffer between the consuming side and the session thread.
///
/// Producers append to the incoming queue at any time. The exchange slot is owned by one side at
///  a time, as indicated by the `ready_to_send` flag: the consumer drains inbound events and
///  publishes the incoming queue as the next outbound batch, then flips the flag; the session
///  thread takes the batch, sends it, leaves the inbound events it collected, and flips it back.
#[derive(Default)]
pub struct PendingActionBuffer {
    incoming: Mutex<Vec<Outbound>>,
    exchange: Mutex<Exchange>,
    ready_to_send: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PendingActionBuffer {
    pub fn push(&self, outbound: Outbound) {
        lock(&self.incoming).push(outbound);
    }

    pub fn is_ready_to_send(&self) -> bool {
        self.ready_to_send.load(Ordering::Acquire)
    }

    /// consumer side: the inbound events of the last completed tick, `None` while the session
    ///  thread still owns the exchange slot
    pub fn take_inbound(&self) -> Option<Vec<SessionEvent>> {
        if self.is_ready_to_send() {
            return None;
        }
        Some(std::mem::take(&mut lock(&self.exchange).inbound))
    }

    /// consumer side: moves everything pushed so far into the next outbound batch (a `PING` if
    ///  there is nothing else) and hands the exchange slot to the session thread
    pub fn publish(&self) {
        if self.is_ready_to_send() {
            return;
        }
        let mut outbound = std::mem::take(&mut *lock(&self.incoming));
        if outbound.is_empty() {
            outbound.push(Outbound::All(Action::ping()));
        }
        lock(&self.exchange).outbound = outbound;
        self.ready_to_send.store(true, Ordering::Release);
    }

    /// session thread side: the batch published by the consumer, if it is the thread's turn
    pub fn take_outbound(&self) -> Option<Vec<Outbound>> {
        if !self.is_ready_to_send() {
            return None;
        }
        Some(std::mem::take(&mut lock(&self.exchange).outbound))
    }

    /// session thread side: leaves the collected events and hands the slot back
    pub fn hand_back(&self, inbound: Vec<SessionEvent>) {
        lock(&self.exchange).inbound.extend(inbound);
        self.ready_to_send.store(false, Ordering::Release);
    }
}

/// State shared between a session's consuming side and its background thread
#[derive(Default)]
pub struct SessionShared {
    pub buffer: PendingActionBuffer,
    pub connect_target: Mutex<Option<SocketAddr>>,
    pub connect_requested: AtomicBool,
    pub shutdown_requested: AtomicBool,
}

impl SessionShared {
    pub fn request_connect(&self, addr: SocketAddr) {
        *lock(&self.connect_target) = Some(addr);
        self.connect_requested.store(true, Ordering::Release);
    }

    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Release);
    }
}

pub(crate) fn frame_actions(actions: &[Action]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_actions(actions, &mut buf);
    buf.to_vec()
}

/// The role specific part of a session thread's tick
pub(crate) trait SessionRole: Send + 'static {
    fn send_batch(&mut self, udp: &UdpClient, batch: Vec<Outbound>);
    fn on_event(&mut self, udp: &UdpClient, event: InboundEvent, inbound: &mut Vec<SessionEvent>);

    fn on_connect_requested(&mut self, _udp: &UdpClient, _addr: SocketAddr) {}
}

pub(crate) fn spawn_session_thread(name: &str, udp: UdpClient, shared: Arc<SessionShared>, tick_interval: Duration, role: impl SessionRole) -> anyhow::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || run_session(udp, shared, tick_interval, role))
        .map_err(|e| anyhow!("failed to start session thread: {}", e))
}

fn run_session(mut udp: UdpClient, shared: Arc<SessionShared>, tick_interval: Duration, mut role: impl SessionRole) {
    info!("session thread started");

    // events collected while the consuming side owns the exchange slot
    let mut inbound = Vec::new();
    loop {
        if shared.shutdown_requested.load(Ordering::Acquire) {
            debug!("shutting down session thread");
            udp.disconnect_all();
            udp.process_send();
            udp.release();
            break;
        }

        if shared.connect_requested.swap(false, Ordering::AcqRel) {
            let target = *lock(&shared.connect_target);
            if let Some(addr) = target {
                role.on_connect_requested(&udp, addr);
            }
        }

        let our_turn = match shared.buffer.take_outbound() {
            Some(batch) => {
                role.send_batch(&udp, batch);
                true
            }
            None => false,
        };

        udp.receive();
        udp.process_send();
        for event in udp.poll() {
            role.on_event(&udp, event, &mut inbound);
        }

        if our_turn {
            shared.buffer.hand_back(std::mem::take(&mut inbound));
        }
        std::thread::sleep(tick_interval);
    }
    info!("session thread finished");
}

/// the actions of a batch in the order they were pushed, regardless of their addressing
pub(crate) fn actions_of(batch: Vec<Outbound>) -> Vec<Action> {
    batch.into_iter()
        .map(|o| match o {
            Outbound::All(action) | Outbound::Peer(_, action) | Outbound::AllBut(_, action) => action,
        })
        .collect()
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use crate::chat::action::ActionKind;
    use super::*;

    fn text(s: &'static str) -> Action {
        Action::new(ActionKind::MessageText, s.as_bytes())
    }

    #[test]
    fn test_turn_taking() {
        let buffer = PendingActionBuffer::default();
        assert!(buffer.take_outbound().is_none());
        assert_eq!(buffer.take_inbound(), Some(vec![]));

        buffer.push(Outbound::All(text("a")));
        buffer.publish();
        buffer.push(Outbound::All(text("b")));

        assert!(buffer.take_inbound().is_none());
        assert_eq!(buffer.take_outbound(), Some(vec![Outbound::All(text("a"))]));

        let addr = SocketAddr::from_str("127.0.0.1:1").unwrap();
        buffer.hand_back(vec![SessionEvent::PeerJoined { network_id: 1, address: addr }]);
        assert!(buffer.take_outbound().is_none());
        assert_eq!(buffer.take_inbound(), Some(vec![SessionEvent::PeerJoined { network_id: 1, address: addr }]));

        buffer.publish();
        assert_eq!(buffer.take_outbound(), Some(vec![Outbound::All(text("b"))]));
    }

    #[test]
    fn test_ping_when_idle() {
        let buffer = PendingActionBuffer::default();
        buffer.publish();
        assert_eq!(buffer.take_outbound(), Some(vec![Outbound::All(Action::ping())]));
    }

    #[test]
    fn test_publish_twice_keeps_first_batch() {
        let buffer = PendingActionBuffer::default();
        buffer.push(Outbound::All(text("a")));
        buffer.publish();
        buffer.push(Outbound::All(text("b")));
        buffer.publish();
        assert_eq!(buffer.take_outbound(), Some(vec![Outbound::All(text("a"))]));
    }

    #[test]
    fn test_concurrent_producers() {
        let buffer = Arc::new(PendingActionBuffer::default());
        let producers = (0..4)
            .map(|_| {
                let buffer = buffer.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        buffer.push(Outbound::All(Action::ping()));
                    }
                })
            })
            .collect::<Vec<_>>();
        for p in producers {
            p.join().unwrap();
        }

        buffer.publish();
        assert_eq!(buffer.take_outbound().unwrap().len(), 400);
    }
}
