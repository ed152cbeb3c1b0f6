use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use tracing::{error, warn};

use crate::util::buf_ext::{BufExt, BufMutExt};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ActionKind {
    Ping = 0,
    UserConnect = 1,
    UserDisconnect = 2,
    MessageText = 3,
    MessageImage = 4,
    UserUpdateName = 5,
    UserUpdateColor = 6,
    UserUpdateIcon = 7,
    FileData = 8,
}

/// Fixed field layout of one action kind's payload
pub trait Payload: Sized {
    fn ser(&self, buf: &mut BytesMut);
    fn try_deser(buf: &mut Bytes) -> anyhow::Result<Self>;
}

/// One unit of the application protocol: a tag and an opaque payload
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    pub payload: Bytes,
}

impl Action {
    pub fn new(kind: ActionKind, payload: impl Into<Bytes>) -> Action {
        Action {
            kind,
            payload: payload.into(),
        }
    }

    pub fn ping() -> Action {
        Action::new(ActionKind::Ping, Bytes::new())
    }

    pub fn from_payload(kind: ActionKind, payload: &impl Payload) -> Action {
        let mut buf = BytesMut::new();
        payload.ser(&mut buf);
        Action::new(kind, buf.freeze())
    }

    pub fn decode_payload<P: Payload>(&self) -> anyhow::Result<P> {
        let mut buf = self.payload.clone();
        P::try_deser(&mut buf)
    }
}

/// frames a list of actions as `(tag: u8, length: u64, payload)` records
pub fn encode_actions(actions: &[Action], buf: &mut BytesMut) {
    for action in actions {
        buf.put_u8(action.kind.into());
        buf.put_len_prefixed(&action.payload);
    }
}

/// Decodes records until the end of the buffer. A record that claims more data than is left
///  makes the rest of the message unusable; everything decoded before it is returned.
pub fn decode_actions(mut buf: &[u8]) -> Vec<Action> {
    let mut result = Vec::new();
    while buf.has_remaining() {
        let tag = buf.get_u8();
        let payload = match buf.try_read_len_prefixed() {
            Ok(p) => p,
            Err(e) => {
                error!("corrupted action message after {} actions - discarding the remaining {} bytes: {}", result.len(), buf.remaining(), e);
                break;
            }
        };

        match ActionKind::try_from(tag) {
            Ok(kind) => result.push(Action { kind, payload }),
            Err(_) => warn!("invalid action type {} - skipping", tag),
        }
    }
    result
}
