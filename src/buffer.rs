//! UART accumulation buffer
//!
//! Bounded byte window that survives between capture calls so a frame split
//! across several UART reads is not lost.

use crate::config::ACCUMULATION_CAPACITY;
use heapless::Vec;

/// Ordered byte window of at most `N` bytes.
///
/// Appending past capacity drops the oldest bytes; the most recently received
/// bytes are always kept.
#[derive(Debug, Clone)]
pub struct AccumulationBuffer<const N: usize = ACCUMULATION_CAPACITY> {
    bytes: Vec<u8, N>,
    dropped: usize,
}

impl<const N: usize> AccumulationBuffer<N> {
    /// Create an empty buffer
    pub const fn new() -> Self {
        Self {
            bytes: Vec::new(),
            dropped: 0,
        }
    }

    /// Maximum number of bytes held
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Buffered bytes, oldest first
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Total bytes evicted from the front because of the capacity bound
    pub fn overflowed(&self) -> usize {
        self.dropped
    }

    /// Append `data`, evicting the oldest bytes when the capacity is exceeded.
    /// Returns the number of bytes evicted by this call.
    pub fn extend(&mut self, data: &[u8]) -> usize {
        if data.len() >= N {
            let evicted = self.bytes.len() + data.len() - N;
            self.bytes.clear();
            // Cannot fail: exactly N bytes
            let _ = self.bytes.extend_from_slice(&data[data.len() - N..]);
            self.dropped += evicted;
            return evicted;
        }

        let overflow = (self.bytes.len() + data.len()).saturating_sub(N);
        if overflow > 0 {
            self.consume(overflow);
            self.dropped += overflow;
        }
        let _ = self.bytes.extend_from_slice(data);
        overflow
    }

    /// Remove the first `count` bytes (all of them if `count` exceeds the length)
    pub fn consume(&mut self, count: usize) {
        let len = self.bytes.len();
        if count >= len {
            self.bytes.clear();
            return;
        }
        self.bytes.copy_within(count.., 0);
        self.bytes.truncate(len - count);
    }

    /// Keep only the final byte; used when no sync marker is present
    pub fn retain_last(&mut self) {
        let len = self.bytes.len();
        if len > 1 {
            self.consume(len - 1);
        }
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}

impl<const N: usize> Default for AccumulationBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_within_capacity_keeps_everything() {
        let mut buffer = AccumulationBuffer::<8>::new();
        assert_eq!(buffer.extend(&[1, 2, 3]), 0);
        assert_eq!(buffer.extend(&[4, 5]), 0);
        assert_eq!(buffer.as_slice(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn overflow_drops_oldest_bytes() {
        let mut buffer = AccumulationBuffer::<8>::new();
        buffer.extend(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(buffer.extend(&[7, 8, 9, 10]), 2);
        assert_eq!(buffer.as_slice(), &[3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(buffer.overflowed(), 2);
    }

    #[test]
    fn oversized_append_keeps_its_tail() {
        let mut buffer = AccumulationBuffer::<4>::new();
        buffer.extend(&[0xAA, 0xBB]);
        let evicted = buffer.extend(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(evicted, 4);
        assert_eq!(buffer.as_slice(), &[3, 4, 5, 6]);
    }

    #[test]
    fn consume_and_retain_last() {
        let mut buffer = AccumulationBuffer::<8>::new();
        buffer.extend(&[1, 2, 3, 4, 5]);
        buffer.consume(2);
        assert_eq!(buffer.as_slice(), &[3, 4, 5]);
        buffer.retain_last();
        assert_eq!(buffer.as_slice(), &[5]);
        buffer.consume(10);
        assert!(buffer.is_empty());
    }

    #[test]
    fn default_capacity_matches_config() {
        let buffer: AccumulationBuffer = AccumulationBuffer::new();
        assert_eq!(buffer.capacity(), 8192);
    }
}
