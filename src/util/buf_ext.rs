//! Checked big-endian reads and length-prefixed helpers on top of [bytes::Buf] / [bytes::BufMut].
//!
//! All multi-byte values on the wire are in network byte order. Reads never panic: running out
//!  of data is reported as an error, leaving it to the caller to decide whether the rest of the
//!  buffer is still usable.

use anyhow::bail;
use bytes::{Buf, BufMut, Bytes};

macro_rules! read_try_impl {
    ($try_reader: ident, $ty:ty, $getter: ident) => {
        fn $try_reader(&mut self) -> anyhow::Result<$ty> {
            if self.remaining() < std::mem::size_of::<$ty>() {
                bail!("buffer underflow");
            }
            Ok(self.$getter())
        }
    }
}

pub trait BufExt: Buf {
    read_try_impl!(try_read_u8, u8, get_u8);
    read_try_impl!(try_read_u16, u16, get_u16);
    read_try_impl!(try_read_u32, u32, get_u32);
    read_try_impl!(try_read_u64, u64, get_u64);
    read_try_impl!(try_read_i32, i32, get_i32);
    read_try_impl!(try_read_i64, i64, get_i64);
    read_try_impl!(try_read_f32, f32, get_f32);

    /// a `u64` length as written by [BufMutExt::put_len], checked against the remaining data
    ///  so that a corrupted length can not trigger a huge allocation
    fn try_read_len(&mut self) -> anyhow::Result<usize> {
        let len = self.try_read_u64()?;
        if len > self.remaining() as u64 {
            bail!("declared length {} exceeds remaining {} bytes", len, self.remaining());
        }
        Ok(len as usize)
    }

    fn try_read_bytes(&mut self, len: usize) -> anyhow::Result<Bytes> {
        if self.remaining() < len {
            bail!("buffer underflow");
        }
        Ok(self.copy_to_bytes(len))
    }

    fn try_read_len_prefixed(&mut self) -> anyhow::Result<Bytes> {
        let len = self.try_read_len()?;
        self.try_read_bytes(len)
    }

    fn try_read_string(&mut self) -> anyhow::Result<String> {
        let raw = self.try_read_len_prefixed()?;
        Ok(String::from_utf8(raw.to_vec())?)
    }
}

pub trait BufMutExt: BufMut {
    fn put_len(&mut self, len: usize) {
        self.put_u64(len as u64);
    }

    fn put_len_prefixed(&mut self, data: &[u8]) {
        self.put_len(data.len());
        self.put_slice(data);
    }

    fn put_string(&mut self, s: &str) {
        self.put_len_prefixed(s.as_bytes());
    }
}

impl <T: Buf> BufExt for T {
}

impl <T: BufMut> BufMutExt for T {
}
