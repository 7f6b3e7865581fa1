use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::{check_interleaved, SampleTransform};
use crate::audio::error::{check_range, StreamError, StreamResult};

/// Pan position handle (-1.0 = hard left, 0.0 = center, 1.0 = hard right)
#[derive(Debug, Clone)]
pub struct PanControl {
    pan_bits: Arc<AtomicU32>,
}

impl PanControl {
    pub fn set_pan(&self, pan: f32) -> StreamResult<()> {
        let pan = check_range("pan", pan, -1.0, 1.0)?;
        self.pan_bits.store(pan.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    pub fn pan(&self) -> f32 {
        f32::from_bits(self.pan_bits.load(Ordering::Relaxed))
    }
}

/// Per-channel balance for stereo streams
#[derive(Debug)]
pub struct PanTransform {
    control: PanControl,
}

impl PanTransform {
    pub fn new(channels: usize, pan: f32) -> StreamResult<Self> {
        if channels != 2 {
            return Err(StreamError::InvalidChannelCount {
                expected: "2".to_string(),
                actual: channels,
            });
        }
        let pan = check_range("pan", pan, -1.0, 1.0)?;
        Ok(Self {
            control: PanControl {
                pan_bits: Arc::new(AtomicU32::new(pan.to_bits())),
            },
        })
    }

    pub fn control(&self) -> PanControl {
        self.control.clone()
    }

    /// (left, right) gains for a pan position; center keeps both at unity
    pub fn channel_gains(pan: f32) -> (f32, f32) {
        ((1.0 - pan).min(1.0), (1.0 + pan).min(1.0))
    }
}

impl SampleTransform for PanTransform {
    fn channels(&self) -> usize {
        2
    }

    fn process(&mut self, samples: &mut [f32]) -> StreamResult<()> {
        check_interleaved(samples.len(), 2)?;

        let (left, right) = Self::channel_gains(self.control.pan());
        if left == 1.0 && right == 1.0 {
            return Ok(());
        }
        for frame in samples.chunks_exact_mut(2) {
            frame[0] *= left;
            frame[1] *= right;
        }
        Ok(())
    }
}
