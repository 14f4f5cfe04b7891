use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Socket framing for request and response blobs.
///
/// Messages carry no length prefix or terminator: whatever one read delivers
/// is one message, capped at `capacity` bytes. Bytes beyond the cap stay
/// buffered and are handed out as the next message.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MessageCodec {
    capacity: usize,
}

impl MessageCodec {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

impl Decoder for MessageCodec {
    type Item = Bytes;

    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        if src.len() > self.capacity {
            tracing::debug!(
                "{} bytes pending, handing out {} now and the rest later",
                src.len(),
                self.capacity
            );
        }
        let len = src.len().min(self.capacity);
        Ok(Some(src.split_to(len).freeze()))
    }
}

impl Encoder<String> for MessageCodec {
    type Error = anyhow::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.put_slice(item.as_bytes());
        Ok(())
    }
}
