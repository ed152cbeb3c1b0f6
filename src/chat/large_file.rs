use anyhow::bail;
use bit_set::BitSet;
use bytes::Bytes;
use tracing::{debug, trace};

/// size of all packets except possibly the last one
pub const PACKET_SIZE: usize = 0x8000;

/// A binary blob that is moved in fixed-size packets. The sender creates it complete from
///  existing bytes, the receiver allocates it from metadata and fills in packets in any order.
#[derive(Debug, Clone)]
pub struct LargeFile {
    key: String,
    file_type: String,
    data: Vec<u8>,
    received: BitSet,
    complete: bool,
}

impl LargeFile {
    pub fn from_bytes(key: impl Into<String>, file_type: impl Into<String>, data: Vec<u8>) -> LargeFile {
        let num_packets = Self::packets_for(data.len() as u64);
        let mut received = BitSet::with_capacity(num_packets);
        for i in 0..num_packets {
            received.insert(i);
        }

        LargeFile {
            key: key.into(),
            file_type: file_type.into(),
            data,
            received,
            complete: true,
        }
    }

    /// prepares reception of `total_size` bytes, rejecting sizes above `max_size`
    pub fn pre_load(key: impl Into<String>, file_type: impl Into<String>, total_size: u64, max_size: u64) -> anyhow::Result<LargeFile> {
        let key = key.into();
        if total_size > max_size {
            bail!("large file {} declares {} bytes, the maximum is {}", key, total_size, max_size);
        }

        Ok(LargeFile {
            key,
            file_type: file_type.into(),
            data: vec![0u8; total_size as usize],
            received: BitSet::with_capacity(Self::packets_for(total_size)),
            complete: total_size == 0,
        })
    }

    fn packets_for(total_size: u64) -> usize {
        (total_size as usize).div_ceil(PACKET_SIZE)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn file_type(&self) -> &str {
        &self.file_type
    }

    pub fn total_size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn packets_count(&self) -> u32 {
        Self::packets_for(self.total_size()) as u32
    }

    pub fn last_packet_size(&self) -> usize {
        match self.data.len() % PACKET_SIZE {
            0 if self.data.is_empty() => 0,
            0 => PACKET_SIZE,
            rest => rest,
        }
    }

    pub fn expected_packet_size(&self, packet_index: u32) -> Option<usize> {
        let count = self.packets_count();
        if packet_index >= count {
            return None;
        }
        if packet_index + 1 == count {
            Some(self.last_packet_size())
        }
        else {
            Some(PACKET_SIZE)
        }
    }

    pub fn has_packet(&self, packet_index: u32) -> bool {
        self.received.contains(packet_index as usize)
    }

    /// fraction of packets received so far, 1.0 for an empty file
    pub fn loading_completion(&self) -> f32 {
        let count = self.packets_count();
        if count == 0 {
            return 1.0;
        }
        self.received.len() as f32 / count as f32
    }

    /// Stores one packet. Returns `true` if this packet completed the file.
    pub fn accept_packet(&mut self, packet_index: u32, packet: &[u8]) -> anyhow::Result<bool> {
        let expected_size = match self.expected_packet_size(packet_index) {
            Some(s) => s,
            None => bail!("packet index {} is out of range for {} ({} packets)", packet_index, self.key, self.packets_count()),
        };
        if packet.len() != expected_size {
            bail!("packet {} of {} has {} bytes, expected {}", packet_index, self.key, packet.len(), expected_size);
        }

        if self.has_packet(packet_index) {
            debug!("duplicate packet {} for {} - ignoring", packet_index, self.key);
            return Ok(false);
        }

        let offset = packet_index as usize * PACKET_SIZE;
        self.data[offset..offset + expected_size].copy_from_slice(packet);
        self.received.insert(packet_index as usize);
        trace!("received packet {} of {} for {}", packet_index + 1, self.packets_count(), self.key);

        if self.received.len() == self.packets_count() as usize {
            self.complete = true;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn packet(&self, packet_index: u32) -> Option<Bytes> {
        let size = self.expected_packet_size(packet_index)?;
        let offset = packet_index as usize * PACKET_SIZE;
        Some(Bytes::copy_from_slice(&self.data[offset..offset + size]))
    }
}
