// Voice buffer rotation
//
// A voice owns a small fixed set of slots that are filled and handed to the
// hardware voice in round-robin order. A slot is reused only after the
// hardware has reported completion for the token it was submitted with.

use super::hardware::CorrelationToken;
use crate::audio::config::VOICE_BUFFER_COUNT;
use crate::audio::error::{StreamError, StreamResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Queued,
}

#[derive(Debug)]
struct BufferSlot {
    data: Vec<u8>,
    filled: usize,
    state: SlotState,
    token: Option<CorrelationToken>,
}

#[derive(Debug)]
pub struct VoiceBufferPool {
    slots: [BufferSlot; VOICE_BUFFER_COUNT],
    current: usize,
    next_token: u64,
    capacity_bytes: usize,
}

impl VoiceBufferPool {
    /// Slot capacity is rounded down to whole frames
    pub fn new(capacity_bytes: usize, block_align: usize) -> StreamResult<Self> {
        let aligned = if block_align == 0 {
            0
        } else {
            capacity_bytes - capacity_bytes % block_align
        };
        if aligned == 0 {
            return Err(StreamError::InvalidCapacity {
                capacity: capacity_bytes,
                block_align,
            });
        }

        Ok(Self {
            slots: std::array::from_fn(|_| BufferSlot {
                data: vec![0; aligned],
                filled: 0,
                state: SlotState::Free,
                token: None,
            }),
            current: 0,
            next_token: 1,
            capacity_bytes: aligned,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity_bytes
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn slot_state(&self, index: usize) -> Option<SlotState> {
        self.slots.get(index).map(|slot| slot.state)
    }

    /// Writable view of the slot next in rotation, `None` while it is still queued
    pub fn current_mut(&mut self) -> Option<&mut [u8]> {
        let slot = &mut self.slots[self.current];
        match slot.state {
            SlotState::Free => Some(&mut slot.data[..]),
            SlotState::Queued => None,
        }
    }

    /// Mark the current slot as queued with `filled` valid bytes and tag it
    /// with a fresh token. Returns the token and the bytes to submit.
    /// The rotation does not move until `advance` is called.
    pub fn queue_current(&mut self, filled: usize) -> (CorrelationToken, &[u8]) {
        let token = CorrelationToken(self.next_token);
        self.next_token += 1;

        let slot = &mut self.slots[self.current];
        slot.filled = filled.min(slot.data.len());
        slot.state = SlotState::Queued;
        slot.token = Some(token);
        (token, &slot.data[..slot.filled])
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % VOICE_BUFFER_COUNT;
    }

    /// Free the slot submitted with `token`. Unknown tokens are ignored.
    pub fn release(&mut self, token: CorrelationToken) -> bool {
        match self.slots.iter_mut().find(|slot| slot.token == Some(token)) {
            Some(slot) => {
                slot.state = SlotState::Free;
                slot.token = None;
                slot.filled = 0;
                true
            }
            None => false,
        }
    }

    pub fn queued_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state == SlotState::Queued)
            .count()
    }

    /// Free every slot and restart the rotation
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.state = SlotState::Free;
            slot.token = None;
            slot.filled = 0;
        }
        self.current = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_aligned_to_frames() {
        let pool = VoiceBufferPool::new(1001, 4).unwrap();
        assert_eq!(pool.capacity(), 1000);
        assert!(matches!(
            VoiceBufferPool::new(3, 4),
            Err(StreamError::InvalidCapacity { .. })
        ));
    }

    #[test]
    fn test_rotation_blocks_on_queued_slot() {
        let mut pool = VoiceBufferPool::new(16, 4).unwrap();
        let mut tokens = Vec::new();
        for _ in 0..VOICE_BUFFER_COUNT {
            pool.current_mut().unwrap().fill(7);
            let (token, data) = pool.queue_current(8);
            assert_eq!(data, &[7u8; 8]);
            tokens.push(token);
            pool.advance();
        }

        assert_eq!(pool.queued_count(), 3);
        assert_eq!(pool.current_index(), 0);
        assert!(pool.current_mut().is_none());

        assert!(pool.release(tokens[0]));
        assert!(!pool.release(tokens[0]));
        assert_eq!(pool.queued_count(), 2);
        assert!(pool.current_mut().is_some());
    }

    #[test]
    fn test_out_of_order_completion() {
        let mut pool = VoiceBufferPool::new(8, 2).unwrap();
        let (first, _) = pool.queue_current(8);
        pool.advance();
        let (second, _) = pool.queue_current(8);
        pool.advance();
        assert_ne!(first, second);

        pool.release(second);
        assert_eq!(pool.slot_state(1), Some(SlotState::Free));
        assert_eq!(pool.slot_state(0), Some(SlotState::Queued));

        pool.reset();
        assert_eq!(pool.queued_count(), 0);
        assert_eq!(pool.current_index(), 0);
    }
}
