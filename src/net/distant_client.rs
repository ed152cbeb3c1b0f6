use std::net::SocketAddr;
use std::time::Instant;

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::net::channel::ChannelProtocol;
use crate::net::config::UdpConfig;
use crate::net::datagram::{DataFrame, Datagram};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EndpointPhase {
    /// we asked the remote side to connect and wait for its answer
    Connecting,
    /// the remote side asked to connect, and the application did not accept yet
    Incoming,
    Connected,
}

/// Everything the transport knows about one remote address
pub struct DistantClient {
    pub address: SocketAddr,
    pub id: u64,
    /// the connection attempt this endpoint belongs to, see [Datagram::Connect]
    pub session: u64,
    pub phase: EndpointPhase,
    pub created_at: Instant,
    pub last_received: Instant,
    pub last_sent: Option<Instant>,
    pub interrupted: bool,
    channels: FxHashMap<u8, Box<dyn ChannelProtocol>>,
}

impl DistantClient {
    pub fn new(address: SocketAddr, id: u64, session: u64, phase: EndpointPhase, config: &UdpConfig, now: Instant) -> DistantClient {
        let channels = config.channels.iter()
            .map(|(channel_id, kind)| (*channel_id, kind.create(*channel_id, config)))
            .collect();

        DistantClient {
            address,
            id,
            session,
            phase,
            created_at: now,
            last_received: now,
            last_sent: None,
            interrupted: false,
            channels,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.phase == EndpointPhase::Connected
    }

    pub fn has_unacknowledged(&self) -> bool {
        self.channels.values()
            .any(|c| c.has_unacknowledged())
    }

    pub fn send(&mut self, channel: u8, data: &[u8]) {
        match self.channels.get_mut(&channel) {
            Some(c) => c.send(data),
            None => warn!("sending on unregistered channel {} to {:?} - dropping", channel, self.address),
        }
    }

    /// returns the application messages that became deliverable
    pub fn on_data(&mut self, frame: DataFrame) -> Vec<(u8, Vec<u8>)> {
        let channel_id = frame.channel;
        match self.channels.get_mut(&channel_id) {
            Some(channel) => {
                channel.on_receive(frame);
                channel.drain_delivered().into_iter()
                    .map(|data| (channel_id, data))
                    .collect()
            }
            None => {
                warn!("received data on unregistered channel {} from {:?} - dropping", channel_id, self.address);
                Vec::new()
            }
        }
    }

    pub fn on_ack(&mut self, channel: u8, ack: u64) {
        if let Some(c) = self.channels.get_mut(&channel) {
            c.on_ack(ack);
        }
    }

    pub fn poll_outgoing(&mut self, now: Instant, out: &mut Vec<Datagram>) {
        for channel in self.channels.values_mut() {
            channel.poll_outgoing(now, out);
        }
    }
}
