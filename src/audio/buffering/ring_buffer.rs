use std::sync::Mutex;

use crate::audio::error::{StreamError, StreamResult};
use crate::audio::lock_or_recover;

#[derive(Debug)]
struct RingState {
    data: Box<[u8]>,
    write_cursor: usize,
    read_cursor: usize,
    buffered: usize,
}

/// Fixed-capacity circular byte store shared between one producer and one consumer.
///
/// A single mutex guards the cursors and the buffered count, so `buffered()`
/// is always consistent with the sequence of completed reads and writes.
/// Neither `read` nor `write` ever blocks on data: both return short counts.
/// Transfers are rounded down to whole frames so a frame is never split.
#[derive(Debug)]
pub struct RingBuffer {
    state: Mutex<RingState>,
    capacity: usize,
    block_align: usize,
}

impl RingBuffer {
    /// `capacity` must be a positive multiple of `block_align`
    pub fn new(capacity: usize, block_align: usize) -> StreamResult<Self> {
        if capacity == 0 || block_align == 0 || capacity % block_align != 0 {
            return Err(StreamError::InvalidCapacity {
                capacity,
                block_align,
            });
        }

        Ok(Self {
            state: Mutex::new(RingState {
                data: vec![0u8; capacity].into_boxed_slice(),
                write_cursor: 0,
                read_cursor: 0,
                buffered: 0,
            }),
            capacity,
            block_align,
        })
    }

    /// Append up to the free space; returns the number of bytes stored
    pub fn write(&self, bytes: &[u8]) -> usize {
        let mut state = lock_or_recover(&self.state);
        let free = self.capacity - state.buffered;
        let count = self.align_down(bytes.len().min(free));
        if count == 0 {
            return 0;
        }

        // At most two contiguous segments: up to the end, then from the start
        let start = state.write_cursor;
        let first = count.min(self.capacity - start);
        state.data[start..start + first].copy_from_slice(&bytes[..first]);
        if first < count {
            state.data[..count - first].copy_from_slice(&bytes[first..count]);
        }

        state.write_cursor = (start + count) % self.capacity;
        state.buffered += count;
        count
    }

    /// Consume up to `min(buffer.len(), buffered)` bytes
    pub fn read(&self, buffer: &mut [u8]) -> usize {
        let mut state = lock_or_recover(&self.state);
        let count = self.align_down(buffer.len().min(state.buffered));
        if count == 0 {
            return 0;
        }

        let start = state.read_cursor;
        let first = count.min(self.capacity - start);
        buffer[..first].copy_from_slice(&state.data[start..start + first]);
        if first < count {
            buffer[first..count].copy_from_slice(&state.data[..count - first]);
        }

        state.read_cursor = (start + count) % self.capacity;
        state.buffered -= count;
        count
    }

    /// Drop everything buffered and reset both cursors
    pub fn clear(&self) {
        let mut state = lock_or_recover(&self.state);
        state.write_cursor = 0;
        state.read_cursor = 0;
        state.buffered = 0;
    }

    pub fn buffered(&self) -> usize {
        lock_or_recover(&self.state).buffered
    }

    pub fn free(&self) -> usize {
        self.capacity - self.buffered()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn block_align(&self) -> usize {
        self.block_align
    }

    fn align_down(&self, bytes: usize) -> usize {
        bytes - bytes % self.block_align
    }
}
