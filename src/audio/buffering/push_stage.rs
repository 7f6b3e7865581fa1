// Push buffering stage
//
// The producer is an external callback (typically a capture device) that
// appends bytes whenever it has them. The consumer reads at its own cadence.
// In zero-fill mode an underrun is padded with silence so the consumer always
// gets the full amount it asked for.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::ring_buffer::RingBuffer;
use crate::audio::error::{StreamError, StreamResult};
use crate::audio::source::WaveSource;
use crate::audio::types::WaveFormat;

struct PushShared {
    ring: RingBuffer,
    disposed: AtomicBool,
    overflowed_bytes: AtomicU64,
}

/// Cloneable write handle for the producing callback
#[derive(Clone)]
pub struct PushWriter {
    shared: Arc<PushShared>,
}

impl PushWriter {
    /// Append as much of `bytes` as fits. Bytes that do not fit are dropped and counted.
    pub fn write(&self, bytes: &[u8]) -> StreamResult<usize> {
        if self.shared.disposed.load(Ordering::Acquire) {
            return Err(StreamError::Disposed("PushBufferingStage"));
        }
        let written = self.shared.ring.write(bytes);
        if written < bytes.len() {
            self.shared
                .overflowed_bytes
                .fetch_add((bytes.len() - written) as u64, Ordering::Relaxed);
            crate::stream_debug!("PUSH_STAGE: overflow, dropped {} bytes", bytes.len() - written);
        }
        Ok(written)
    }
}

/// Ring buffer fed by an external push callback and drained by a reader
pub struct PushBufferingStage {
    shared: Arc<PushShared>,
    format: WaveFormat,
    fill_with_zeros: bool,
}

impl PushBufferingStage {
    pub fn new(format: WaveFormat, capacity: usize, fill_with_zeros: bool) -> StreamResult<Self> {
        let ring = RingBuffer::new(capacity, format.block_align())?;
        info!(
            "🎤 PUSH_STAGE: Created capture buffer ({} bytes, zero fill: {})",
            capacity, fill_with_zeros
        );
        Ok(Self {
            shared: Arc::new(PushShared {
                ring,
                disposed: AtomicBool::new(false),
                overflowed_bytes: AtomicU64::new(0),
            }),
            format,
            fill_with_zeros,
        })
    }

    /// Handle for a capture callback running on another thread
    pub fn writer(&self) -> PushWriter {
        PushWriter {
            shared: self.shared.clone(),
        }
    }

    pub fn write(&self, bytes: &[u8]) -> StreamResult<usize> {
        self.writer().write(bytes)
    }

    pub fn buffered(&self) -> usize {
        self.shared.ring.buffered()
    }

    pub fn capacity(&self) -> usize {
        self.shared.ring.capacity()
    }

    /// Bytes dropped because the buffer was full when the producer wrote
    pub fn overflowed_bytes(&self) -> u64 {
        self.shared.overflowed_bytes.load(Ordering::Relaxed)
    }

    pub fn fill_with_zeros(&self) -> bool {
        self.fill_with_zeros
    }

    pub fn set_fill_with_zeros(&mut self, enabled: bool) {
        self.fill_with_zeros = enabled;
    }

    pub fn clear(&self) -> StreamResult<()> {
        self.ensure_alive()?;
        self.shared.ring.clear();
        Ok(())
    }

    pub fn dispose(&mut self) {
        if !self.shared.disposed.swap(true, Ordering::AcqRel) {
            self.shared.ring.clear();
            debug!("PUSH_STAGE: Disposed");
        }
    }

    fn ensure_alive(&self) -> StreamResult<()> {
        if self.shared.disposed.load(Ordering::Acquire) {
            Err(StreamError::Disposed("PushBufferingStage"))
        } else {
            Ok(())
        }
    }
}

impl WaveSource for PushBufferingStage {
    fn format(&self) -> WaveFormat {
        self.format
    }

    /// In zero-fill mode always returns the requested count (rounded to whole
    /// frames), padding an underrun with silence. Otherwise returns what was buffered.
    fn read(&mut self, buffer: &mut [u8]) -> StreamResult<usize> {
        self.ensure_alive()?;
        let wanted = self.format.align_down(buffer.len());
        let read = self.shared.ring.read(&mut buffer[..wanted]);

        if read < wanted && self.fill_with_zeros {
            buffer[read..wanted].fill(0);
            crate::stream_debug!("PUSH_STAGE: underrun, padded {} bytes", wanted - read);
            return Ok(wanted);
        }
        Ok(read)
    }
}

impl Drop for PushBufferingStage {
    fn drop(&mut self) {
        self.dispose();
    }
}
