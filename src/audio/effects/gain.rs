use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::{check_interleaved, SampleTransform};
use crate::audio::error::{check_range, StreamResult};

/// Lock-free gain handle, safe to adjust from any thread while audio is running
#[derive(Debug, Clone)]
pub struct GainControl {
    gain_bits: Arc<AtomicU32>,
}

impl GainControl {
    fn new(gain: f32) -> Self {
        Self {
            gain_bits: Arc::new(AtomicU32::new(gain.to_bits())),
        }
    }

    /// Set the linear gain (0.0 to 1.0)
    pub fn set_gain(&self, gain: f32) -> StreamResult<()> {
        let gain = check_range("gain", gain, 0.0, 1.0)?;
        self.gain_bits.store(gain.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain_bits.load(Ordering::Relaxed))
    }
}

/// Scalar multiply with hard clipping to [-1, 1].
///
/// A gain of exactly 1.0 leaves the buffer untouched.
#[derive(Debug)]
pub struct GainTransform {
    channels: usize,
    control: GainControl,
}

impl GainTransform {
    pub fn new(channels: usize, gain: f32) -> StreamResult<Self> {
        let gain = check_range("gain", gain, 0.0, 1.0)?;
        Ok(Self {
            channels,
            control: GainControl::new(gain),
        })
    }

    pub fn control(&self) -> GainControl {
        self.control.clone()
    }
}

impl SampleTransform for GainTransform {
    fn channels(&self) -> usize {
        self.channels
    }

    fn process(&mut self, samples: &mut [f32]) -> StreamResult<()> {
        check_interleaved(samples.len(), self.channels)?;

        let gain = self.control.gain();
        if gain == 1.0 {
            return Ok(());
        }
        for sample in samples.iter_mut() {
            *sample = (*sample * gain).clamp(-1.0, 1.0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unity_gain_is_identity() {
        let mut gain = GainTransform::new(2, 1.0).unwrap();
        let original = vec![0.25, -0.75, 1.5, -1.5, 0.0, 0.999];
        let mut samples = original.clone();
        gain.process(&mut samples).unwrap();
        assert_eq!(samples, original);
    }

    #[test]
    fn test_gain_scales_and_clamps_symmetrically() {
        let mut gain = GainTransform::new(1, 0.5).unwrap();
        let mut samples = vec![1.0, -1.0, 4.0, -4.0];
        gain.process(&mut samples).unwrap();
        assert_eq!(samples, vec![0.5, -0.5, 1.0, -1.0]);
    }

    #[test]
    fn test_control_updates_running_transform() {
        let mut gain = GainTransform::new(1, 1.0).unwrap();
        let control = gain.control();
        control.set_gain(0.25).unwrap();

        let mut samples = vec![0.8];
        gain.process(&mut samples).unwrap();
        assert!((samples[0] - 0.2).abs() < 1e-6);
        assert!(control.set_gain(1.5).is_err());
        assert_eq!(control.gain(), 0.25);
    }

    #[test]
    fn test_rejects_misaligned_buffer() {
        let mut gain = GainTransform::new(2, 0.5).unwrap();
        let mut samples = vec![0.0; 3];
        assert!(gain.process(&mut samples).is_err());
        assert!(GainTransform::new(2, -0.1).is_err());
    }
}
