// Licensed under the Apache-2.0 license

//! Fixed-capacity FIFOs backing the controller's command, response, data and
//! IBI queues.
//!
//! Queues never grow and never panic. Pushing into a full queue or popping
//! from an empty one returns `QueueOverflow` / `QueueUnderflow` and leaves
//! the contents untouched; the caller decides whether that is worth logging.

use crate::i3c::error::Error;
use heapless::Deque;

/// Command queue depth in words.
pub const CMD_QUEUE_DEPTH: usize = 0x10;
/// Response queue depth in words.
pub const RESP_QUEUE_DEPTH: usize = 0x10;
/// IBI queue depth in words.
pub const IBI_QUEUE_DEPTH: usize = 0x10;
/// TX data buffer depth in bytes (0x40 words).
pub const TX_BUFFER_BYTES: usize = 0x40 * 4;
/// RX data buffer depth in bytes (0x40 words).
pub const RX_BUFFER_BYTES: usize = 0x40 * 4;

/// FIFO of 32-bit descriptor words.
pub struct WordQueue<const N: usize> {
    words: Deque<u32, N>,
}

impl<const N: usize> Default for WordQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> WordQueue<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            words: Deque::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.words.is_full()
    }

    #[must_use]
    pub fn free(&self) -> usize {
        N - self.words.len()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// # Errors
    ///
    /// Returns `Error::QueueOverflow` when the queue is full.
    pub fn push(&mut self, word: u32) -> Result<(), Error> {
        self.words.push_back(word).map_err(|_| Error::QueueOverflow)
    }

    /// # Errors
    ///
    /// Returns `Error::QueueUnderflow` when the queue is empty.
    pub fn pop(&mut self) -> Result<u32, Error> {
        self.words.pop_front().ok_or(Error::QueueUnderflow)
    }

    #[must_use]
    pub fn peek(&self) -> Option<u32> {
        self.words.front().copied()
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }
}

/// Byte-granular data buffer exposed to software as 32-bit words.
///
/// The controller side always moves whole words. A target-mode peer may
/// leave a partial trailing word, which software reads zero-extended.
pub struct DataBuffer<const BYTES: usize> {
    bytes: Deque<u8, BYTES>,
}

impl<const BYTES: usize> Default for DataBuffer<BYTES> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const BYTES: usize> DataBuffer<BYTES> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bytes: Deque::new(),
        }
    }

    #[must_use]
    pub fn bytes_used(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn bytes_free(&self) -> usize {
        BYTES - self.bytes.len()
    }

    /// Words visible to software, counting a partial trailing word.
    #[must_use]
    pub fn words_used(&self) -> usize {
        self.bytes.len().div_ceil(4)
    }

    /// Whole words that can still be pushed.
    #[must_use]
    pub fn words_free(&self) -> usize {
        self.bytes_free() / 4
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Push a little-endian word.
    ///
    /// # Errors
    ///
    /// Returns `Error::QueueOverflow` if fewer than four bytes are free.
    pub fn push_word(&mut self, word: u32) -> Result<(), Error> {
        if self.bytes_free() < 4 {
            return Err(Error::QueueOverflow);
        }
        for byte in word.to_le_bytes() {
            self.bytes.push_back(byte).map_err(|_| Error::QueueOverflow)?;
        }
        Ok(())
    }

    /// Pop up to four bytes as a little-endian word, zero-padding a short tail.
    ///
    /// # Errors
    ///
    /// Returns `Error::QueueUnderflow` when the buffer is empty.
    pub fn pop_word(&mut self) -> Result<u32, Error> {
        if self.bytes.is_empty() {
            return Err(Error::QueueUnderflow);
        }
        let mut word = [0u8; 4];
        for slot in &mut word {
            match self.bytes.pop_front() {
                Some(byte) => *slot = byte,
                None => break,
            }
        }
        Ok(u32::from_le_bytes(word))
    }

    /// Push as many bytes as fit and return how many were taken.
    pub fn push_bytes(&mut self, data: &[u8]) -> usize {
        let mut taken = 0;
        for &byte in data {
            if self.bytes.push_back(byte).is_err() {
                break;
            }
            taken += 1;
        }
        taken
    }

    pub fn pop_byte(&mut self) -> Option<u8> {
        self.bytes.pop_front()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}

/// Data buffer watermark encoded as `2 << n` words, with 0 meaning one word.
#[must_use]
pub const fn fifo_threshold(field: u32) -> usize {
    if field == 0 {
        1
    } else {
        2 << field
    }
}

/// Target-mode start watermark, in bytes: `1 << (n + 1)` with 2 collapsing to 1.
#[must_use]
pub const fn start_threshold(field: u32) -> usize {
    let bytes = 1usize << (field + 1);
    if bytes == 2 {
        1
    } else {
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_queue_overflow_and_underflow_leave_state_intact() {
        let mut queue: WordQueue<2> = WordQueue::new();
        assert_eq!(queue.pop(), Err(Error::QueueUnderflow));
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        assert_eq!(queue.push(3), Err(Error::QueueOverflow));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.free(), 0);
        assert_eq!(queue.pop(), Ok(1));
        assert_eq!(queue.peek(), Some(2));
    }

    #[test]
    fn data_buffer_partial_tail_is_zero_padded() {
        let mut buf: DataBuffer<8> = DataBuffer::new();
        assert_eq!(buf.push_bytes(&[0x11, 0x22, 0x33, 0x44, 0x55]), 5);
        assert_eq!(buf.words_used(), 2);
        assert_eq!(buf.pop_word(), Ok(0x4433_2211));
        assert_eq!(buf.pop_word(), Ok(0x0000_0055));
        assert_eq!(buf.pop_word(), Err(Error::QueueUnderflow));
    }

    #[test]
    fn data_buffer_rejects_word_without_room() {
        let mut buf: DataBuffer<8> = DataBuffer::new();
        assert_eq!(buf.push_bytes(&[0; 6]), 6);
        assert_eq!(buf.words_free(), 0);
        assert_eq!(buf.push_word(0xdead_beef), Err(Error::QueueOverflow));
        assert_eq!(buf.bytes_used(), 6);
        assert_eq!(buf.push_bytes(&[1, 2, 3]), 2);
    }

    #[test]
    fn threshold_encodings() {
        assert_eq!(fifo_threshold(0), 1);
        assert_eq!(fifo_threshold(1), 4);
        assert_eq!(fifo_threshold(3), 16);
        assert_eq!(start_threshold(0), 1);
        assert_eq!(start_threshold(1), 4);
        assert_eq!(start_threshold(2), 8);
    }
}
