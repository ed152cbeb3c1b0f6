use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::net::channel::ChannelProtocol;
use crate::net::config::UdpConfig;
use crate::net::datagram::{DataFrame, Datagram};

struct PendingFrame {
    payload: Bytes,
    last_fragment: bool,
    last_sent: Option<Instant>,
}

/// Reliable, in-order delivery with cumulative acks.
///
/// Every fragment gets its own sequence number and is kept until the remote side's receive
///  cursor moves past it. The receive cursor travels back piggybacked on data frames, or in a
///  standalone ack if there is nothing else to send.
pub struct ReliableOrdered {
    channel_id: u8,
    max_fragment_size: usize,
    resend_interval: Duration,
    max_reorder_window: u64,

    next_send_seq: u64,
    unacknowledged: BTreeMap<u64, PendingFrame>,

    /// everything before this was delivered (or is in the assembly buffer)
    next_expected_seq: u64,
    /// frames that arrived ahead of [ReliableOrdered::next_expected_seq]
    reorder_buffer: BTreeMap<u64, (bool, Bytes)>,
    /// fragments of a message whose last fragment has not been reached yet
    assembly_buffer: Vec<u8>,
    delivered: Vec<Vec<u8>>,
    ack_pending: bool,
}

impl ReliableOrdered {
    pub fn new(channel_id: u8, config: &UdpConfig) -> ReliableOrdered {
        ReliableOrdered {
            channel_id,
            max_fragment_size: config.max_fragment_size,
            resend_interval: config.resend_interval,
            max_reorder_window: config.max_reorder_window,
            next_send_seq: 0,
            unacknowledged: BTreeMap::default(),
            next_expected_seq: 0,
            reorder_buffer: BTreeMap::default(),
            assembly_buffer: Vec::new(),
            delivered: Vec::new(),
            ack_pending: false,
        }
    }

    fn enqueue_frame(&mut self, payload: Bytes, last_fragment: bool) {
        self.unacknowledged.insert(self.next_send_seq, PendingFrame {
            payload,
            last_fragment,
            last_sent: None,
        });
        self.next_send_seq += 1;
    }

    fn accept_in_sequence(&mut self, last_fragment: bool, payload: Bytes) {
        self.assembly_buffer.extend_from_slice(&payload);
        self.next_expected_seq += 1;
        if last_fragment {
            self.delivered.push(std::mem::take(&mut self.assembly_buffer));
        }
    }
}

impl ChannelProtocol for ReliableOrdered {
    fn channel_id(&self) -> u8 {
        self.channel_id
    }

    fn send(&mut self, message: &[u8]) {
        if message.is_empty() {
            self.enqueue_frame(Bytes::new(), true);
            return;
        }

        let num_fragments = message.len().div_ceil(self.max_fragment_size);
        for (i, chunk) in message.chunks(self.max_fragment_size).enumerate() {
            self.enqueue_frame(Bytes::copy_from_slice(chunk), i + 1 == num_fragments);
        }
    }

    fn on_receive(&mut self, frame: DataFrame) {
        self.on_ack(frame.ack);
        self.ack_pending = true;

        if frame.seq < self.next_expected_seq {
            debug!("channel {}: received duplicate of frame {}", self.channel_id, frame.seq);
            return;
        }
        if frame.seq >= self.next_expected_seq + self.max_reorder_window {
            debug!("channel {}: frame {} is outside the reorder window starting at {} - dropping", self.channel_id, frame.seq, self.next_expected_seq);
            return;
        }

        if frame.seq > self.next_expected_seq {
            match self.reorder_buffer.entry(frame.seq) {
                Entry::Occupied(_) => debug!("channel {}: received duplicate of buffered frame {}", self.channel_id, frame.seq),
                Entry::Vacant(e) => {
                    trace!("channel {}: buffering frame {} while waiting for {}", self.channel_id, frame.seq, self.next_expected_seq);
                    e.insert((frame.last_fragment, frame.payload));
                }
            }
            return;
        }

        self.accept_in_sequence(frame.last_fragment, frame.payload);
        while let Some((last_fragment, payload)) = self.reorder_buffer.remove(&self.next_expected_seq) {
            self.accept_in_sequence(last_fragment, payload);
        }
    }

    fn on_ack(&mut self, ack: u64) {
        // cumulative: everything below the remote receive cursor has arrived
        let still_pending = self.unacknowledged.split_off(&ack);
        if !self.unacknowledged.is_empty() {
            trace!("channel {}: {} frames acknowledged up to {}", self.channel_id, self.unacknowledged.len(), ack);
        }
        self.unacknowledged = still_pending;
    }

    fn poll_outgoing(&mut self, now: Instant, out: &mut Vec<Datagram>) {
        let mut sent_data = false;
        for (seq, pending) in self.unacknowledged.iter_mut() {
            let due = match pending.last_sent {
                None => true,
                Some(t) => now.duration_since(t) >= self.resend_interval,
            };
            if !due {
                continue;
            }
            if pending.last_sent.is_some() {
                trace!("channel {}: re-sending frame {}", self.channel_id, seq);
            }

            pending.last_sent = Some(now);
            sent_data = true;
            out.push(Datagram::Data(DataFrame {
                channel: self.channel_id,
                seq: *seq,
                ack: self.next_expected_seq,
                last_fragment: pending.last_fragment,
                payload: pending.payload.clone(),
            }));
        }

        if self.ack_pending && !sent_data {
            out.push(Datagram::Ack { channel: self.channel_id, ack: self.next_expected_seq });
        }
        self.ack_pending = false;
    }

    fn drain_delivered(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.delivered)
    }

    fn has_unacknowledged(&self) -> bool {
        !self.unacknowledged.is_empty()
    }
}
