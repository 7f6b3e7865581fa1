use super::{check_interleaved, SampleTransform};
use crate::audio::error::{StreamError, StreamResult};
use crate::audio::source::SampleSource;
use crate::audio::types::WaveFormat;
use crate::stream_debug;

/// Real-time transform chain over one upstream sample source
///
/// Transforms run in insertion order on exactly the samples the upstream
/// returned. A short or zero read passes through untouched.
pub struct TransformChain<S: SampleSource> {
    upstream: S,
    transforms: Vec<Box<dyn SampleTransform>>,
    channels: usize,
}

impl<S: SampleSource> TransformChain<S> {
    pub fn new(upstream: S) -> Self {
        let channels = upstream.format().channels as usize;
        Self {
            upstream,
            transforms: Vec::new(),
            channels,
        }
    }

    /// Append a transform; its channel count must match the stream
    pub fn push(&mut self, transform: impl SampleTransform + 'static) -> StreamResult<()> {
        if transform.channels() != self.channels {
            return Err(StreamError::InvalidChannelCount {
                expected: self.channels.to_string(),
                actual: transform.channels(),
            });
        }
        self.transforms.push(Box::new(transform));
        Ok(())
    }

    /// Builder form of `push`
    pub fn with(mut self, transform: impl SampleTransform + 'static) -> StreamResult<Self> {
        self.push(transform)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Reset all transforms to prevent stale history after a discontinuity
    pub fn reset(&mut self) {
        self.transforms.iter_mut().for_each(|t| t.reset());
    }

    pub fn upstream_mut(&mut self) -> &mut S {
        &mut self.upstream
    }
}

impl<S: SampleSource> SampleSource for TransformChain<S> {
    fn format(&self) -> WaveFormat {
        self.upstream.format()
    }

    fn read(&mut self, buffer: &mut [f32]) -> StreamResult<usize> {
        check_interleaved(buffer.len(), self.channels)?;

        let read = self.upstream.read(buffer)?;
        if read == 0 {
            return Ok(0);
        }
        // Upstream may hand back a partial frame on a short read; only whole frames are processed
        let whole = read - read % self.channels;
        for transform in &mut self.transforms {
            transform.process(&mut buffer[..whole])?;
        }
        Ok(read)
    }

    fn position(&self) -> Option<u64> {
        self.upstream.position()
    }

    fn length(&self) -> Option<u64> {
        self.upstream.length()
    }

    fn set_position(&mut self, position: u64) -> StreamResult<()> {
        self.upstream.set_position(position)?;
        stream_debug!("TRANSFORM_CHAIN: seek to sample {}, resetting {} transforms", position, self.transforms.len());
        self.reset();
        Ok(())
    }
}
