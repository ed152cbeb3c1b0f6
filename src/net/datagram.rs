use anyhow::{anyhow, bail};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc::Crc;

use crate::util::buf_ext::BufExt;

const CHECKSUM: Crc<u64> = Crc::<u64>::new(&crc::CRC_64_REDIS);

const KIND_CONNECT: u8 = 1;
const KIND_CONNECT_ACCEPT: u8 = 2;
const KIND_CONNECT_REFUSE: u8 = 3;
const KIND_DISCONNECT: u8 = 4;
const KIND_KEEP_ALIVE: u8 = 5;
const KIND_DATA: u8 = 6;
const KIND_ACK: u8 = 7;

const FLAG_LAST_FRAGMENT: u8 = 1;

/// A frame of a reliable channel: one fragment of an application message, carrying the
///  sender's receive cursor for the same channel as a piggybacked ack
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DataFrame {
    pub channel: u8,
    pub seq: u64,
    /// sequence number the sender of this frame expects next from us
    pub ack: u64,
    pub last_fragment: bool,
    pub payload: Bytes,
}

/// Everything that goes into a single UDP datagram. The wire layout is a CRC-64 checksum over
///  the rest of the datagram, followed by a kind discriminator and the kind's fields.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Datagram {
    /// `session` is chosen at random by the connecting side, once per connection attempt. A
    ///  different session from a known address means the remote side started over.
    Connect { session: u64 },
    ConnectAccept,
    ConnectRefuse,
    Disconnect,
    KeepAlive,
    Data(DataFrame),
    Ack { channel: u8, ack: u64 },
}

impl Datagram {
    pub const HEADER_OVERHEAD: usize = 8 + 1 + 1 + 8 + 8 + 1;

    pub fn kind(&self) -> u8 {
        match self {
            Datagram::Connect { .. } => KIND_CONNECT,
            Datagram::ConnectAccept => KIND_CONNECT_ACCEPT,
            Datagram::ConnectRefuse => KIND_CONNECT_REFUSE,
            Datagram::Disconnect => KIND_DISCONNECT,
            Datagram::KeepAlive => KIND_KEEP_ALIVE,
            Datagram::Data(_) => KIND_DATA,
            Datagram::Ack { .. } => KIND_ACK,
        }
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        let start = buf.len();
        buf.put_u64(0); // checksum placeholder
        buf.put_u8(self.kind());
        match self {
            Datagram::Connect { session } => buf.put_u64(*session),
            Datagram::Data(frame) => {
                buf.put_u8(frame.channel);
                buf.put_u64(frame.seq);
                buf.put_u64(frame.ack);
                buf.put_u8(if frame.last_fragment { FLAG_LAST_FRAGMENT } else { 0 });
                buf.put_slice(&frame.payload);
            }
            Datagram::Ack { channel, ack } => {
                buf.put_u8(*channel);
                buf.put_u64(*ack);
            }
            _ => {}
        }

        let checksum = CHECKSUM.checksum(&buf[start + 8..]);
        buf[start..start + 8].copy_from_slice(&checksum.to_be_bytes());
    }

    pub fn try_deser(raw: &[u8]) -> anyhow::Result<Datagram> {
        let mut buf = raw;
        let checksum = buf.try_read_u64()?;
        if CHECKSUM.checksum(buf) != checksum {
            bail!("checksum mismatch");
        }

        let kind = buf.try_read_u8()?;
        let result = match kind {
            KIND_CONNECT => Datagram::Connect { session: buf.try_read_u64()? },
            KIND_CONNECT_ACCEPT => Datagram::ConnectAccept,
            KIND_CONNECT_REFUSE => Datagram::ConnectRefuse,
            KIND_DISCONNECT => Datagram::Disconnect,
            KIND_KEEP_ALIVE => Datagram::KeepAlive,
            KIND_DATA => {
                let channel = buf.try_read_u8()?;
                let seq = buf.try_read_u64()?;
                let ack = buf.try_read_u64()?;
                let flags = buf.try_read_u8()?;
                let payload = buf.copy_to_bytes(buf.remaining());
                Datagram::Data(DataFrame {
                    channel,
                    seq,
                    ack,
                    last_fragment: flags & FLAG_LAST_FRAGMENT != 0,
                    payload,
                })
            }
            KIND_ACK => {
                let channel = buf.try_read_u8()?;
                let ack = buf.try_read_u64()?;
                Datagram::Ack { channel, ack }
            }
            other => return Err(anyhow!("invalid datagram kind {}", other)),
        };

        if !matches!(result, Datagram::Data(_)) && buf.has_remaining() {
            bail!("{} trailing bytes after datagram of kind {}", buf.remaining(), kind);
        }
        Ok(result)
    }
}
