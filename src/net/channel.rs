pub mod reliable_ordered;

use std::time::Instant;

use crate::net::config::UdpConfig;
use crate::net::datagram::{DataFrame, Datagram};
use crate::net::channel::reliable_ordered::ReliableOrdered;

/// Delivery discipline of one channel towards one remote endpoint. Every remote endpoint owns
///  one instance per registered channel id.
pub trait ChannelProtocol: Send {
    fn channel_id(&self) -> u8;

    /// queues an application message, splitting it into fragments if necessary
    fn send(&mut self, message: &[u8]);

    fn on_receive(&mut self, frame: DataFrame);

    fn on_ack(&mut self, ack: u64);

    /// collects the datagrams that are due now: new frames, retransmissions and pending acks
    fn poll_outgoing(&mut self, now: Instant, out: &mut Vec<Datagram>);

    /// fully reassembled application messages in delivery order
    fn drain_delivered(&mut self) -> Vec<Vec<u8>>;

    fn has_unacknowledged(&self) -> bool;
}

/// Registration table entry: which protocol a channel id uses
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ChannelKind {
    ReliableOrdered,
}

impl ChannelKind {
    pub fn create(&self, channel_id: u8, config: &UdpConfig) -> Box<dyn ChannelProtocol> {
        match self {
            ChannelKind::ReliableOrdered => Box::new(ReliableOrdered::new(channel_id, config)),
        }
    }
}
