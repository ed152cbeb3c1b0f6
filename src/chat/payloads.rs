//! Field layouts of the action payloads. Strings and byte ranges are prefixed with a `u64`
//!  length, all numbers are big-endian.

use anyhow::bail;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::chat::action::{Action, ActionKind, Payload};
use crate::chat::user::Color;
use crate::util::buf_ext::{BufExt, BufMutExt};

/// `USER_CONNECT` / `USER_DISCONNECT`
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ConnectionNotice {
    pub timestamp: i64,
    pub user_id: u64,
    pub message_id: u64,
}

impl Payload for ConnectionNotice {
    fn ser(&self, buf: &mut BytesMut) {
        buf.put_i64(self.timestamp);
        buf.put_u64(self.user_id);
        buf.put_u64(self.message_id);
    }

    fn try_deser(buf: &mut Bytes) -> anyhow::Result<Self> {
        Ok(ConnectionNotice {
            timestamp: buf.try_read_i64()?,
            user_id: buf.try_read_u64()?,
            message_id: buf.try_read_u64()?,
        })
    }
}

impl ConnectionNotice {
    pub fn to_action(&self, connected: bool) -> Action {
        let kind = if connected { ActionKind::UserConnect } else { ActionKind::UserDisconnect };
        Action::from_payload(kind, self)
    }
}

/// `MESSAGE_TEXT`
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TextMessagePayload {
    pub timestamp: i64,
    pub user_id: u64,
    pub message_id: u64,
    pub text: String,
}

impl Payload for TextMessagePayload {
    fn ser(&self, buf: &mut BytesMut) {
        buf.put_i64(self.timestamp);
        buf.put_u64(self.user_id);
        buf.put_u64(self.message_id);
        buf.put_string(&self.text);
    }

    fn try_deser(buf: &mut Bytes) -> anyhow::Result<Self> {
        Ok(TextMessagePayload {
            timestamp: buf.try_read_i64()?,
            user_id: buf.try_read_u64()?,
            message_id: buf.try_read_u64()?,
            text: buf.try_read_string()?,
        })
    }
}

/// `USER_UPDATE_NAME`
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UserNamePayload {
    pub user_id: u64,
    pub name: String,
}

impl Payload for UserNamePayload {
    fn ser(&self, buf: &mut BytesMut) {
        buf.put_u64(self.user_id);
        buf.put_string(&self.name);
    }

    fn try_deser(buf: &mut Bytes) -> anyhow::Result<Self> {
        Ok(UserNamePayload {
            user_id: buf.try_read_u64()?,
            name: buf.try_read_string()?,
        })
    }
}

/// `USER_UPDATE_COLOR`
#[derive(Debug, Clone, PartialEq)]
pub struct UserColorPayload {
    pub user_id: u64,
    pub color: Color,
}

impl Payload for UserColorPayload {
    fn ser(&self, buf: &mut BytesMut) {
        buf.put_u64(self.user_id);
        buf.put_f32(self.color.r);
        buf.put_f32(self.color.g);
        buf.put_f32(self.color.b);
    }

    fn try_deser(buf: &mut Bytes) -> anyhow::Result<Self> {
        Ok(UserColorPayload {
            user_id: buf.try_read_u64()?,
            color: Color {
                r: buf.try_read_f32()?,
                g: buf.try_read_f32()?,
                b: buf.try_read_f32()?,
            },
        })
    }
}

/// Describes a large object carrying an image
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ImageMetadata {
    pub key: String,
    pub file_type: String,
    pub width: i32,
    pub height: i32,
    pub total_size: u64,
}

impl ImageMetadata {
    fn ser(&self, buf: &mut BytesMut) {
        buf.put_string(&self.key);
        buf.put_string(&self.file_type);
        buf.put_i32(self.width);
        buf.put_i32(self.height);
        buf.put_u64(self.total_size);
    }

    fn try_deser(buf: &mut Bytes) -> anyhow::Result<Self> {
        Ok(ImageMetadata {
            key: buf.try_read_string()?,
            file_type: buf.try_read_string()?,
            width: buf.try_read_i32()?,
            height: buf.try_read_i32()?,
            total_size: buf.try_read_u64()?,
        })
    }

    /// Metadata is either followed by nothing (the bytes come as `FILE_DATA` packets) or by
    ///  exactly `total_size` bytes of inline data
    fn try_read_inline(&self, buf: &mut Bytes) -> anyhow::Result<Option<Bytes>> {
        if !buf.has_remaining() {
            return Ok(None);
        }
        if buf.remaining() as u64 != self.total_size {
            bail!("image {} declares {} bytes but carries {} inline", self.key, self.total_size, buf.remaining());
        }
        Ok(Some(buf.copy_to_bytes(buf.remaining())))
    }
}

/// `USER_UPDATE_ICON`
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UserIconPayload {
    pub user_id: u64,
    pub image: ImageMetadata,
    pub inline_data: Option<Bytes>,
}

impl Payload for UserIconPayload {
    fn ser(&self, buf: &mut BytesMut) {
        buf.put_u64(self.user_id);
        self.image.ser(buf);
        if let Some(data) = &self.inline_data {
            buf.put_slice(data);
        }
    }

    fn try_deser(buf: &mut Bytes) -> anyhow::Result<Self> {
        let user_id = buf.try_read_u64()?;
        let image = ImageMetadata::try_deser(buf)?;
        let inline_data = image.try_read_inline(buf)?;
        Ok(UserIconPayload {
            user_id,
            image,
            inline_data,
        })
    }
}

/// `MESSAGE_IMAGE`
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ImageMessagePayload {
    pub timestamp: i64,
    pub user_id: u64,
    pub message_id: u64,
    pub image: ImageMetadata,
    pub inline_data: Option<Bytes>,
}

impl Payload for ImageMessagePayload {
    fn ser(&self, buf: &mut BytesMut) {
        buf.put_i64(self.timestamp);
        buf.put_u64(self.user_id);
        buf.put_u64(self.message_id);
        self.image.ser(buf);
        if let Some(data) = &self.inline_data {
            buf.put_slice(data);
        }
    }

    fn try_deser(buf: &mut Bytes) -> anyhow::Result<Self> {
        let timestamp = buf.try_read_i64()?;
        let user_id = buf.try_read_u64()?;
        let message_id = buf.try_read_u64()?;
        let image = ImageMetadata::try_deser(buf)?;
        let inline_data = image.try_read_inline(buf)?;
        Ok(ImageMessagePayload {
            timestamp,
            user_id,
            message_id,
            image,
            inline_data,
        })
    }
}

/// `FILE_DATA`: one packet of a large object
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FileDataPayload {
    pub key: String,
    pub packet_index: u32,
    pub packet: Bytes,
}

impl Payload for FileDataPayload {
    fn ser(&self, buf: &mut BytesMut) {
        buf.put_string(&self.key);
        buf.put_u32(self.packet_index);
        buf.put_u16(self.packet.len() as u16);
        buf.put_slice(&self.packet);
    }

    fn try_deser(buf: &mut Bytes) -> anyhow::Result<Self> {
        let key = buf.try_read_string()?;
        let packet_index = buf.try_read_u32()?;
        let packet_size = buf.try_read_u16()? as usize;
        let packet = buf.try_read_bytes(packet_size)?;
        Ok(FileDataPayload {
            key,
            packet_index,
            packet,
        })
    }
}
