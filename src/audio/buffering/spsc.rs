// Lock-free single-producer/single-consumer byte ring
//
// Same contract as `RingBuffer` (fixed capacity, whole frames, short counts,
// never blocks) but split into owned halves backed by rtrb, so a capture
// callback can hand bytes to a reader thread without taking a lock.

use rtrb::{Consumer, Producer, RingBuffer as Rtrb};

use crate::audio::error::{StreamError, StreamResult};

/// Write half, owned by the producing thread
pub struct ByteProducer {
    producer: Producer<u8>,
    block_align: usize,
}

/// Read half, owned by the consuming thread
pub struct ByteConsumer {
    consumer: Consumer<u8>,
    block_align: usize,
}

/// Create a lock-free byte ring. `capacity` must be a positive multiple of `block_align`.
pub fn spsc_byte_ring(capacity: usize, block_align: usize) -> StreamResult<(ByteProducer, ByteConsumer)> {
    if capacity == 0 || block_align == 0 || capacity % block_align != 0 {
        return Err(StreamError::InvalidCapacity {
            capacity,
            block_align,
        });
    }

    let (producer, consumer) = Rtrb::<u8>::new(capacity);
    Ok((
        ByteProducer {
            producer,
            block_align,
        },
        ByteConsumer {
            consumer,
            block_align,
        },
    ))
}

impl ByteProducer {
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let free = self.producer.slots();
        let count = bytes.len().min(free);
        let count = count - count % self.block_align;
        if count == 0 {
            return 0;
        }

        match self.producer.write_chunk(count) {
            Ok(mut chunk) => {
                let (first, second) = chunk.as_mut_slices();
                let split = first.len();
                first.copy_from_slice(&bytes[..split]);
                second.copy_from_slice(&bytes[split..count]);
                chunk.commit_all();
                count
            }
            Err(_) => 0,
        }
    }

    pub fn free(&self) -> usize {
        self.producer.slots()
    }

    pub fn capacity(&self) -> usize {
        self.producer.buffer().capacity()
    }

    /// True once the consumer half has been dropped
    pub fn is_abandoned(&self) -> bool {
        self.producer.is_abandoned()
    }
}

impl ByteConsumer {
    pub fn read(&mut self, buffer: &mut [u8]) -> usize {
        let available = self.consumer.slots();
        let count = buffer.len().min(available);
        let count = count - count % self.block_align;
        if count == 0 {
            return 0;
        }

        match self.consumer.read_chunk(count) {
            Ok(chunk) => {
                let (first, second) = chunk.as_slices();
                buffer[..first.len()].copy_from_slice(first);
                buffer[first.len()..count].copy_from_slice(second);
                chunk.commit_all();
                count
            }
            Err(_) => 0,
        }
    }

    pub fn buffered(&self) -> usize {
        self.consumer.slots()
    }

    pub fn capacity(&self) -> usize {
        self.consumer.buffer().capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spsc_wraparound() {
        let (mut tx, mut rx) = spsc_byte_ring(12, 4).unwrap();
        assert_eq!(tx.write(b"AAAABBBB"), 8);

        let mut out = [0u8; 4];
        assert_eq!(rx.read(&mut out), 4);
        assert_eq!(&out, b"AAAA");

        assert_eq!(tx.write(b"CCCCDDDD"), 8);
        assert_eq!(tx.free(), 0);

        let mut out = [0u8; 12];
        assert_eq!(rx.read(&mut out), 12);
        assert_eq!(&out, b"BBBBCCCCDDDD");
    }

    #[test]
    fn test_spsc_across_threads() {
        let (mut tx, mut rx) = spsc_byte_ring(64, 4).unwrap();
        let expected: Vec<u8> = (0..4000u32).map(|i| (i % 251) as u8).collect();
        let source = expected.clone();

        let writer = std::thread::spawn(move || {
            let mut offset = 0;
            while offset < source.len() {
                let end = (offset + 16).min(source.len());
                offset += tx.write(&source[offset..end]);
                std::thread::yield_now();
            }
        });

        let mut received = Vec::new();
        let mut buf = [0u8; 24];
        while received.len() < expected.len() {
            let n = rx.read(&mut buf);
            received.extend_from_slice(&buf[..n]);
            std::thread::yield_now();
        }
        writer.join().unwrap();
        assert_eq!(received, expected);
    }

    #[test]
    fn test_spsc_rejects_misaligned_capacity() {
        assert!(spsc_byte_ring(10, 4).is_err());
    }
}
