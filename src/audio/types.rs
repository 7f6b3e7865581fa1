// Core stream format types shared by every stage
//
// A `WaveFormat` is immutable once built. Stages that change the frame size
// (channel remapping, sample encoding conversion) publish a new format and
// rescale positions/lengths with `rescale_position`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::{StreamError, StreamResult};

pub const DEFAULT_SAMPLE_RATE: u32 = 48000;
pub const MAX_CHANNELS: u16 = 32;

/// How each sample is stored in the byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleEncoding {
    /// Signed integer PCM (unsigned for 8-bit)
    Pcm,
    /// 32-bit IEEE float
    IeeeFloat,
}

/// Immutable stream format descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WaveFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
    pub encoding: SampleEncoding,
}

impl WaveFormat {
    pub fn new(
        sample_rate: u32,
        bits_per_sample: u16,
        channels: u16,
        encoding: SampleEncoding,
    ) -> StreamResult<Self> {
        if sample_rate == 0 {
            return Err(StreamError::UnsupportedFormat(
                "sample rate must be positive".to_string(),
            ));
        }
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(StreamError::InvalidChannelCount {
                expected: format!("1..={}", MAX_CHANNELS),
                actual: channels as usize,
            });
        }
        match (encoding, bits_per_sample) {
            (SampleEncoding::Pcm, 8 | 16 | 24 | 32) | (SampleEncoding::IeeeFloat, 32) => {}
            (encoding, bits) => {
                return Err(StreamError::UnsupportedFormat(format!(
                    "{:?} with {} bits per sample",
                    encoding, bits
                )))
            }
        }

        Ok(Self {
            sample_rate,
            bits_per_sample,
            channels,
            encoding,
        })
    }

    /// 16-bit integer PCM
    pub fn pcm16(sample_rate: u32, channels: u16) -> StreamResult<Self> {
        Self::new(sample_rate, 16, channels, SampleEncoding::Pcm)
    }

    /// 32-bit float, the format every sample transform works in
    pub fn ieee_float(sample_rate: u32, channels: u16) -> StreamResult<Self> {
        Self::new(sample_rate, 32, channels, SampleEncoding::IeeeFloat)
    }

    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample / 8) as usize
    }

    /// Frame size in bytes (bytes per sample × channel count)
    pub fn block_align(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    pub fn bytes_per_second(&self) -> usize {
        self.block_align() * self.sample_rate as usize
    }

    /// Same rate and encoding with a different channel count
    pub fn with_channels(&self, channels: u16) -> StreamResult<Self> {
        Self::new(self.sample_rate, self.bits_per_sample, channels, self.encoding)
    }

    /// Same rate and channel layout with a different encoding
    pub fn with_encoding(&self, bits_per_sample: u16, encoding: SampleEncoding) -> StreamResult<Self> {
        Self::new(self.sample_rate, bits_per_sample, self.channels, encoding)
    }

    /// Number of whole frames covering `duration`
    pub fn frames_for(&self, duration: Duration) -> usize {
        (self.sample_rate as f64 * duration.as_secs_f64()).round() as usize
    }

    /// Byte count for `duration`, rounded down to whole frames
    pub fn bytes_for(&self, duration: Duration) -> usize {
        self.frames_for(duration) * self.block_align()
    }

    /// Round a byte count down to whole frames
    pub fn align_down(&self, bytes: usize) -> usize {
        bytes - bytes % self.block_align()
    }
}

/// Proportionally rescale a position or length between two unit sizes.
///
/// Used whenever a stage changes the size of a frame: a channel matrix going
/// from 1 to 2 channels doubles positions, a float → pcm16 conversion halves
/// byte positions.
pub fn rescale_position(value: u64, from_units: usize, to_units: usize) -> u64 {
    if from_units == 0 {
        return 0;
    }
    ((value as u128 * to_units as u128) / from_units as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_align() {
        let format = WaveFormat::pcm16(44100, 2).unwrap();
        assert_eq!(format.block_align(), 4);
        assert_eq!(format.bytes_per_second(), 176400);

        let float = WaveFormat::ieee_float(48000, 6).unwrap();
        assert_eq!(float.block_align(), 24);
    }

    #[test]
    fn test_invalid_formats_rejected() {
        assert!(WaveFormat::new(48000, 12, 2, SampleEncoding::Pcm).is_err());
        assert!(WaveFormat::new(48000, 16, 2, SampleEncoding::IeeeFloat).is_err());
        assert!(WaveFormat::pcm16(48000, 0).is_err());
        assert!(WaveFormat::pcm16(0, 2).is_err());
    }

    #[test]
    fn test_duration_helpers() {
        let format = WaveFormat::pcm16(48000, 2).unwrap();
        assert_eq!(format.frames_for(Duration::from_millis(100)), 4800);
        assert_eq!(format.bytes_for(Duration::from_millis(100)), 19200);
        assert_eq!(format.align_down(19203), 19200);
    }

    #[test]
    fn test_rescale_position() {
        assert_eq!(rescale_position(100, 1, 2), 200);
        assert_eq!(rescale_position(200, 2, 1), 100);
        assert_eq!(rescale_position(400, 4, 2), 200);
        assert_eq!(rescale_position(10, 0, 2), 0);
    }
}
