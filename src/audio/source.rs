// Stage interfaces
//
// Every stage is a source holding exactly one upstream source. Stages are
// assembled by explicit construction: `TransformChain::new(WaveToSample::new(pull_stage))`.
// Byte streams implement `WaveSource`, interleaved f32 streams implement
// `SampleSource`. Disposal is RAII.

use super::error::{StreamError, StreamResult};
use super::types::WaveFormat;

/// Stream of interleaved PCM bytes
pub trait WaveSource: Send {
    fn format(&self) -> WaveFormat;

    /// Fill `buffer` with up to `buffer.len()` bytes. Returns 0 at end of stream.
    fn read(&mut self, buffer: &mut [u8]) -> StreamResult<usize>;

    /// Current position in bytes, `None` when not seekable
    fn position(&self) -> Option<u64> {
        None
    }

    /// Total length in bytes, `None` when unknown
    fn length(&self) -> Option<u64> {
        None
    }

    fn set_position(&mut self, _position: u64) -> StreamResult<()> {
        Err(StreamError::NotSeekable)
    }

    fn can_seek(&self) -> bool {
        self.position().is_some() && self.length().is_some()
    }
}

/// Stream of interleaved f32 samples in [-1, 1]
pub trait SampleSource: Send {
    /// Format of the samples (always 32-bit float)
    fn format(&self) -> WaveFormat;

    /// Fill `buffer` with up to `buffer.len()` samples. Returns 0 at end of stream.
    fn read(&mut self, buffer: &mut [f32]) -> StreamResult<usize>;

    /// Current position in samples
    fn position(&self) -> Option<u64> {
        None
    }

    /// Total length in samples
    fn length(&self) -> Option<u64> {
        None
    }

    fn set_position(&mut self, _position: u64) -> StreamResult<()> {
        Err(StreamError::NotSeekable)
    }

    fn can_seek(&self) -> bool {
        self.position().is_some() && self.length().is_some()
    }
}

impl<T: WaveSource + ?Sized> WaveSource for Box<T> {
    fn format(&self) -> WaveFormat {
        (**self).format()
    }

    fn read(&mut self, buffer: &mut [u8]) -> StreamResult<usize> {
        (**self).read(buffer)
    }

    fn position(&self) -> Option<u64> {
        (**self).position()
    }

    fn length(&self) -> Option<u64> {
        (**self).length()
    }

    fn set_position(&mut self, position: u64) -> StreamResult<()> {
        (**self).set_position(position)
    }
}

impl<T: SampleSource + ?Sized> SampleSource for Box<T> {
    fn format(&self) -> WaveFormat {
        (**self).format()
    }

    fn read(&mut self, buffer: &mut [f32]) -> StreamResult<usize> {
        (**self).read(buffer)
    }

    fn position(&self) -> Option<u64> {
        (**self).position()
    }

    fn length(&self) -> Option<u64> {
        (**self).length()
    }

    fn set_position(&mut self, position: u64) -> StreamResult<()> {
        (**self).set_position(position)
    }
}

/// Seekable byte source over an in-memory PCM buffer
#[derive(Debug, Clone)]
pub struct MemoryWaveSource {
    format: WaveFormat,
    data: Vec<u8>,
    position: usize,
}

impl MemoryWaveSource {
    /// `data` is truncated to whole frames
    pub fn new(format: WaveFormat, mut data: Vec<u8>) -> Self {
        data.truncate(format.align_down(data.len()));
        Self {
            format,
            data,
            position: 0,
        }
    }

    /// Encode f32 samples as 32-bit float PCM
    pub fn from_samples(format: WaveFormat, samples: &[f32]) -> Self {
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(format, data)
    }
}

impl WaveSource for MemoryWaveSource {
    fn format(&self) -> WaveFormat {
        self.format
    }

    fn read(&mut self, buffer: &mut [u8]) -> StreamResult<usize> {
        let remaining = self.data.len() - self.position;
        let count = self.format.align_down(buffer.len().min(remaining));
        buffer[..count].copy_from_slice(&self.data[self.position..self.position + count]);
        self.position += count;
        Ok(count)
    }

    fn position(&self) -> Option<u64> {
        Some(self.position as u64)
    }

    fn length(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn set_position(&mut self, position: u64) -> StreamResult<()> {
        let position = (position as usize).min(self.data.len());
        self.position = self.format.align_down(position);
        Ok(())
    }
}
