// Conversion stages between byte streams and f32 sample streams
//
// Both stages change the size of a sample, so positions and lengths are
// rescaled by the byte width on the way through.

use super::error::{StreamError, StreamResult};
use super::source::{SampleSource, WaveSource};
use super::types::{rescale_position, SampleEncoding, WaveFormat};

/// Grow-only scratch buffer owned by one stage instance
pub(crate) fn ensure_scratch<T: Default + Clone>(scratch: &mut Vec<T>, len: usize) -> &mut [T] {
    if scratch.len() < len {
        scratch.resize(len, T::default());
    }
    &mut scratch[..len]
}

fn decode_sample(bytes: &[u8], format: &WaveFormat) -> f32 {
    match (format.encoding, format.bits_per_sample) {
        (SampleEncoding::IeeeFloat, _) => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        (SampleEncoding::Pcm, 8) => (bytes[0] as f32 - 128.0) / 128.0,
        (SampleEncoding::Pcm, 16) => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32768.0,
        (SampleEncoding::Pcm, 24) => {
            let value = i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8;
            value as f32 / 8_388_608.0
        }
        (SampleEncoding::Pcm, _) => {
            i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32 / 2_147_483_648.0
        }
    }
}

/// Decodes any supported PCM byte stream into normalized f32 samples
pub struct WaveToSample<S: WaveSource> {
    upstream: S,
    input_format: WaveFormat,
    output_format: WaveFormat,
    scratch: Vec<u8>,
}

impl<S: WaveSource> WaveToSample<S> {
    pub fn new(upstream: S) -> StreamResult<Self> {
        let input_format = upstream.format();
        let output_format = WaveFormat::ieee_float(input_format.sample_rate, input_format.channels)?;
        Ok(Self {
            upstream,
            input_format,
            output_format,
            scratch: Vec::new(),
        })
    }

    pub fn upstream(&self) -> &S {
        &self.upstream
    }

    pub fn upstream_mut(&mut self) -> &mut S {
        &mut self.upstream
    }

    pub fn into_inner(self) -> S {
        self.upstream
    }
}

impl<S: WaveSource> SampleSource for WaveToSample<S> {
    fn format(&self) -> WaveFormat {
        self.output_format
    }

    fn read(&mut self, buffer: &mut [f32]) -> StreamResult<usize> {
        let channels = self.input_format.channels as usize;
        let samples = buffer.len() - buffer.len() % channels;
        let bytes_per_sample = self.input_format.bytes_per_sample();

        let scratch = ensure_scratch(&mut self.scratch, samples * bytes_per_sample);
        let read = self.upstream.read(scratch)?;
        let decoded = read / bytes_per_sample;

        for (sample, bytes) in buffer[..decoded]
            .iter_mut()
            .zip(scratch[..decoded * bytes_per_sample].chunks_exact(bytes_per_sample))
        {
            *sample = decode_sample(bytes, &self.input_format);
        }
        Ok(decoded)
    }

    fn position(&self) -> Option<u64> {
        let bytes = self.upstream.position()?;
        Some(rescale_position(bytes, self.input_format.bytes_per_sample(), 1))
    }

    fn length(&self) -> Option<u64> {
        let bytes = self.upstream.length()?;
        Some(rescale_position(bytes, self.input_format.bytes_per_sample(), 1))
    }

    fn set_position(&mut self, position: u64) -> StreamResult<()> {
        self.upstream
            .set_position(rescale_position(position, 1, self.input_format.bytes_per_sample()))
    }
}

/// Encodes f32 samples into 16-bit PCM or 32-bit float bytes
pub struct SampleToWave<S: SampleSource> {
    upstream: S,
    output_format: WaveFormat,
    scratch: Vec<f32>,
}

impl<S: SampleSource> SampleToWave<S> {
    pub fn new(upstream: S, bits_per_sample: u16, encoding: SampleEncoding) -> StreamResult<Self> {
        let output_format = upstream.format().with_encoding(bits_per_sample, encoding)?;
        match (encoding, bits_per_sample) {
            (SampleEncoding::Pcm, 16) | (SampleEncoding::IeeeFloat, 32) => {}
            _ => {
                return Err(StreamError::UnsupportedFormat(format!(
                    "cannot encode samples as {:?} {} bit",
                    encoding, bits_per_sample
                )))
            }
        }
        Ok(Self {
            upstream,
            output_format,
            scratch: Vec::new(),
        })
    }

    pub fn to_pcm16(upstream: S) -> StreamResult<Self> {
        Self::new(upstream, 16, SampleEncoding::Pcm)
    }

    pub fn to_ieee_float(upstream: S) -> StreamResult<Self> {
        Self::new(upstream, 32, SampleEncoding::IeeeFloat)
    }

    pub fn upstream_mut(&mut self) -> &mut S {
        &mut self.upstream
    }
}

impl<S: SampleSource> WaveSource for SampleToWave<S> {
    fn format(&self) -> WaveFormat {
        self.output_format
    }

    fn read(&mut self, buffer: &mut [u8]) -> StreamResult<usize> {
        let bytes_per_sample = self.output_format.bytes_per_sample();
        let aligned = self.output_format.align_down(buffer.len());
        let samples = aligned / bytes_per_sample;

        let scratch = ensure_scratch(&mut self.scratch, samples);
        let read = self.upstream.read(scratch)?;

        let out = buffer[..read * bytes_per_sample].chunks_exact_mut(bytes_per_sample);
        match self.output_format.encoding {
            SampleEncoding::IeeeFloat => {
                for (bytes, sample) in out.zip(scratch[..read].iter()) {
                    bytes.copy_from_slice(&sample.to_le_bytes());
                }
            }
            SampleEncoding::Pcm => {
                for (bytes, sample) in out.zip(scratch[..read].iter()) {
                    let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    bytes.copy_from_slice(&value.to_le_bytes());
                }
            }
        }
        Ok(read * bytes_per_sample)
    }

    fn position(&self) -> Option<u64> {
        let samples = self.upstream.position()?;
        Some(rescale_position(samples, 1, self.output_format.bytes_per_sample()))
    }

    fn length(&self) -> Option<u64> {
        let samples = self.upstream.length()?;
        Some(rescale_position(samples, 1, self.output_format.bytes_per_sample()))
    }

    fn set_position(&mut self, position: u64) -> StreamResult<()> {
        self.upstream
            .set_position(rescale_position(position, self.output_format.bytes_per_sample(), 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::MemoryWaveSource;

    #[test]
    fn test_pcm16_decoding() {
        let format = WaveFormat::pcm16(48000, 2).unwrap();
        let data: Vec<u8> = [0i16, 16384, -32768, 32767]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let mut stage = WaveToSample::new(MemoryWaveSource::new(format, data)).unwrap();

        let mut out = [0.0f32; 4];
        assert_eq!(stage.read(&mut out).unwrap(), 4);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 0.5);
        assert_eq!(out[2], -1.0);
        assert!((out[3] - 1.0).abs() < 1e-4);
        assert_eq!(stage.position(), Some(4));
        assert_eq!(stage.length(), Some(4));
    }

    #[test]
    fn test_pcm24_and_pcm8_decoding() {
        let format = WaveFormat::new(48000, 24, 1, SampleEncoding::Pcm).unwrap();
        // -8388608 and +4194304
        let data = vec![0x00, 0x00, 0x80, 0x00, 0x00, 0x40];
        let mut stage = WaveToSample::new(MemoryWaveSource::new(format, data)).unwrap();
        let mut out = [0.0f32; 2];
        stage.read(&mut out).unwrap();
        assert_eq!(out, [-1.0, 0.5]);

        let format = WaveFormat::new(48000, 8, 1, SampleEncoding::Pcm).unwrap();
        let mut stage = WaveToSample::new(MemoryWaveSource::new(format, vec![128, 0, 192])).unwrap();
        let mut out = [0.0f32; 3];
        stage.read(&mut out).unwrap();
        assert_eq!(out, [0.0, -1.0, 0.5]);
    }

    #[test]
    fn test_float_passthrough_and_seek() {
        let format = WaveFormat::ieee_float(48000, 1).unwrap();
        let source = MemoryWaveSource::from_samples(format, &[0.1, 0.2, 0.3, 0.4]);
        let mut stage = WaveToSample::new(source).unwrap();

        stage.set_position(2).unwrap();
        assert_eq!(stage.upstream().position(), Some(8));

        let mut out = [0.0f32; 8];
        assert_eq!(stage.read(&mut out).unwrap(), 2);
        assert_eq!(&out[..2], &[0.3, 0.4]);
    }

    #[test]
    fn test_sample_to_pcm16_truncates_partial_frames() {
        let format = WaveFormat::ieee_float(48000, 2).unwrap();
        let source = MemoryWaveSource::from_samples(format, &[0.5, -0.5, 1.5, -1.5]);
        let mut stage = SampleToWave::to_pcm16(WaveToSample::new(source).unwrap()).unwrap();
        assert_eq!(stage.format().block_align(), 4);
        assert_eq!(stage.length(), Some(8));

        let mut out = [0u8; 7];
        assert_eq!(stage.read(&mut out).unwrap(), 4);
        assert_eq!(i16::from_le_bytes([out[0], out[1]]), 16383);
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), -16383);

        let mut out = [0u8; 8];
        assert_eq!(stage.read(&mut out).unwrap(), 4);
        assert_eq!(i16::from_le_bytes([out[0], out[1]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), -i16::MAX);
    }

    #[test]
    fn test_unsupported_output_encoding() {
        let format = WaveFormat::ieee_float(48000, 2).unwrap();
        let source = WaveToSample::new(MemoryWaveSource::new(format, Vec::new())).unwrap();
        assert!(SampleToWave::new(source, 24, SampleEncoding::Pcm).is_err());
    }
}
