//! Owned packet buffer with headroom
//!
//! A [`PacketBuf`] is one contiguous allocation split into three regions:
//!
//! ```text
//! 0            start               end            capacity
//! +-------------+-------------------+-----------------+
//! |  headroom   |    frame data     |    tailroom     |
//! +-------------+-------------------+-----------------+
//! ```
//!
//! Headers are added by moving `start` down ([`PacketBuf::prepend`]) and
//! removed by moving it up ([`PacketBuf::adj`]). Neither operation copies the
//! frame. Every operation checks its bounds first and leaves the buffer
//! unchanged on error.
//!
//! The buffer also carries an optional shared handle to per-flow state, the
//! way a data-plane mbuf carries a user pointer. The buffer never looks
//! inside it.
//!
//! # Examples
//!
//! ```
//! use gtpu_tunnel::mbuf::PacketBuf;
//!
//! let mut pkt: PacketBuf<()> = PacketBuf::with_headroom(8, &[0xAA, 0xBB]);
//! assert_eq!(pkt.headroom(), 8);
//!
//! pkt.prepend(2).unwrap().copy_from_slice(&[0x01, 0x02]);
//! assert_eq!(pkt.data(), &[0x01, 0x02, 0xAA, 0xBB]);
//!
//! pkt.adj(3).unwrap();
//! assert_eq!(pkt.data(), &[0xBB]);
//! assert!(pkt.adj(2).is_err());
//! ```

use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("insufficient headroom: need {needed} bytes, {available} available")]
    InsufficientHeadroom { needed: usize, available: usize },
    #[error("insufficient data: need {needed} bytes, {available} available")]
    InsufficientData { needed: usize, available: usize },
    #[error("insufficient tailroom: need {needed} bytes, {available} available")]
    InsufficientTailroom { needed: usize, available: usize },
}

pub struct PacketBuf<C> {
    buf: Box<[u8]>,
    start: usize,
    end: usize,
    context: Option<Arc<C>>,
}

impl<C> PacketBuf<C> {
    /// Empty buffer of `capacity` bytes with the frame start placed at
    /// `headroom` (clamped to the capacity).
    pub fn new(capacity: usize, headroom: usize) -> Self {
        let start = headroom.min(capacity);
        PacketBuf {
            buf: vec![0u8; capacity].into_boxed_slice(),
            start,
            end: start,
            context: None,
        }
    }

    /// Buffer holding a copy of `frame` preceded by `headroom` bytes.
    pub fn with_headroom(headroom: usize, frame: &[u8]) -> Self {
        let mut buf = vec![0u8; headroom + frame.len()];
        buf[headroom..].copy_from_slice(frame);
        PacketBuf {
            buf: buf.into_boxed_slice(),
            start: headroom,
            end: headroom + frame.len(),
            context: None,
        }
    }

    #[inline]
    pub fn headroom(&self) -> usize {
        self.start
    }

    #[inline]
    pub fn tailroom(&self) -> usize {
        self.buf.len() - self.end
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// False for a zero-capacity buffer, which can hold no frame at all
    #[inline]
    pub fn has_storage(&self) -> bool {
        !self.buf.is_empty()
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.start..self.end]
    }

    /// Grows the frame by `len` bytes at the front and returns the new
    /// region. Its content is whatever the headroom held before.
    pub fn prepend(&mut self, len: usize) -> Result<&mut [u8], BufferError> {
        if len > self.start {
            return Err(BufferError::InsufficientHeadroom {
                needed: len,
                available: self.start,
            });
        }
        self.start -= len;
        Ok(&mut self.buf[self.start..self.start + len])
    }

    /// Removes `len` bytes from the front of the frame.
    pub fn adj(&mut self, len: usize) -> Result<(), BufferError> {
        if len > self.len() {
            return Err(BufferError::InsufficientData {
                needed: len,
                available: self.len(),
            });
        }
        self.start += len;
        Ok(())
    }

    /// Copies `bytes` after the end of the frame.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        if bytes.len() > self.tailroom() {
            return Err(BufferError::InsufficientTailroom {
                needed: bytes.len(),
                available: self.tailroom(),
            });
        }
        self.buf[self.end..self.end + bytes.len()].copy_from_slice(bytes);
        self.end += bytes.len();
        Ok(())
    }

    #[inline]
    pub fn context(&self) -> Option<&Arc<C>> {
        self.context.as_ref()
    }

    #[inline]
    pub fn set_context(&mut self, context: Arc<C>) {
        self.context = Some(context);
    }

    #[inline]
    pub fn clear_context(&mut self) -> Option<Arc<C>> {
        self.context.take()
    }
}

impl<C> std::fmt::Debug for PacketBuf<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketBuf")
            .field("headroom", &self.headroom())
            .field("len", &self.len())
            .field("tailroom", &self.tailroom())
            .field("has_context", &self.context.is_some())
            .finish()
    }
}
