use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::chat::action::{Action, ActionKind};
use crate::chat::large_file::LargeFile;
use crate::chat::payloads::FileDataPayload;

/// One entry of a transfer queue
pub enum TransferCursor {
    File {
        file: Arc<LargeFile>,
        next_packet: u32,
    },
    /// an action that is available in full, replayed to a late joiner
    Replay(Action),
}

impl TransferCursor {
    pub fn file(file: Arc<LargeFile>) -> TransferCursor {
        TransferCursor::File { file, next_packet: 0 }
    }

    /// Produces the next action, or `None` if the cursor is exhausted. Packets a partially
    ///  received file does not have are skipped.
    fn next_part(&mut self) -> Option<(Action, bool)> {
        match self {
            TransferCursor::File { file, next_packet } => {
                while *next_packet < file.packets_count() && !file.has_packet(*next_packet) {
                    *next_packet += 1;
                }
                let packet = file.packet(*next_packet)?;
                let action = Action::from_payload(ActionKind::FileData, &FileDataPayload {
                    key: file.key().to_string(),
                    packet_index: *next_packet,
                    packet,
                });
                *next_packet += 1;
                let exhausted = (*next_packet..file.packets_count()).all(|i| !file.has_packet(i));
                Some((action, exhausted))
            }
            TransferCursor::Replay(action) => Some((action.clone(), true)),
        }
    }
}

/// Feeds large objects into the action stream one packet at a time: a broadcast queue for
///  everyone, and one queue per peer for bringing late joiners up to date
#[derive(Default)]
pub struct FileDataManager {
    broadcast: VecDeque<TransferCursor>,
    per_peer: FxHashMap<u64, VecDeque<TransferCursor>>,
}

impl FileDataManager {
    pub fn new() -> FileDataManager {
        FileDataManager::default()
    }

    pub fn add_broadcast(&mut self, file: Arc<LargeFile>) {
        debug!("queueing {} ({} packets) for broadcast", file.key(), file.packets_count());
        self.broadcast.push_back(TransferCursor::file(file));
    }

    pub fn add_for(&mut self, peer_id: u64, cursor: TransferCursor) {
        self.per_peer.entry(peer_id)
            .or_default()
            .push_back(cursor);
    }

    pub fn has_pending_broadcast(&self) -> bool {
        !self.broadcast.is_empty()
    }

    pub fn has_pending_for(&self, peer_id: u64) -> bool {
        self.per_peer.get(&peer_id)
            .map(|q| !q.is_empty())
            .unwrap_or(false)
    }

    /// peers with a non-empty queue, in ascending order
    pub fn pending_peers(&self) -> Vec<u64> {
        let mut result = self.per_peer.iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(id, _)| *id)
            .collect::<Vec<_>>();
        result.sort();
        result
    }

    pub fn next_broadcast_part(&mut self) -> Option<Action> {
        Self::next_part(&mut self.broadcast)
    }

    pub fn next_part_for(&mut self, peer_id: u64) -> Option<Action> {
        let queue = self.per_peer.get_mut(&peer_id)?;
        let result = Self::next_part(queue);
        if queue.is_empty() {
            self.per_peer.remove(&peer_id);
        }
        result
    }

    pub fn drop_peer(&mut self, peer_id: u64) {
        if self.per_peer.remove(&peer_id).is_some() {
            debug!("dropped pending transfers for peer {}", peer_id);
        }
    }

    fn next_part(queue: &mut VecDeque<TransferCursor>) -> Option<Action> {
        while let Some(cursor) = queue.front_mut() {
            match cursor.next_part() {
                Some((action, exhausted)) => {
                    if exhausted {
                        trace!("transfer cursor exhausted");
                        queue.pop_front();
                    }
                    return Some(action);
                }
                None => {
                    // nothing to send
                    queue.pop_front();
                }
            }
        }
        None
    }
}
