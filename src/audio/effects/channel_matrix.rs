// Channel count remapping via a gain matrix
//
// Every input sample is distributed into every output channel of the same
// frame, weighted by gain[input][output]. Because the frame size changes,
// positions and lengths are rescaled by outputs/inputs.

use std::f32::consts::FRAC_1_SQRT_2;

use super::check_interleaved;
use crate::audio::convert::ensure_scratch;
use crate::audio::error::{StreamError, StreamResult};
use crate::audio::source::SampleSource;
use crate::audio::types::{rescale_position, WaveFormat};

/// Rectangular `gain[input][output]` table with fixed dimensions
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMatrix {
    inputs: usize,
    outputs: usize,
    gains: Vec<f32>,
}

impl ChannelMatrix {
    /// All gains start at zero
    pub fn new(inputs: usize, outputs: usize) -> StreamResult<Self> {
        if inputs == 0 || outputs == 0 {
            return Err(StreamError::InvalidChannelCount {
                expected: "at least 1 input and 1 output".to_string(),
                actual: inputs.min(outputs),
            });
        }
        Ok(Self {
            inputs,
            outputs,
            gains: vec![0.0; inputs * outputs],
        })
    }

    pub fn identity(channels: usize) -> StreamResult<Self> {
        let mut matrix = Self::new(channels, channels)?;
        for ch in 0..channels {
            matrix.set_gain(ch, ch, 1.0)?;
        }
        Ok(matrix)
    }

    /// Duplicate a mono signal into both stereo channels
    pub fn mono_to_stereo() -> Self {
        Self {
            inputs: 1,
            outputs: 2,
            gains: vec![1.0, 1.0],
        }
    }

    /// Average left and right
    pub fn stereo_to_mono() -> Self {
        Self {
            inputs: 2,
            outputs: 1,
            gains: vec![0.5, 0.5],
        }
    }

    /// 5.1 (L, R, C, LFE, Ls, Rs) to stereo; center and surrounds at -3 dB, LFE dropped
    pub fn surround51_to_stereo() -> Self {
        #[rustfmt::skip]
        let gains = vec![
            1.0,           0.0,            // L
            0.0,           1.0,            // R
            FRAC_1_SQRT_2, FRAC_1_SQRT_2,  // C
            0.0,           0.0,            // LFE
            FRAC_1_SQRT_2, 0.0,            // Ls
            0.0,           FRAC_1_SQRT_2,  // Rs
        ];
        Self {
            inputs: 6,
            outputs: 2,
            gains,
        }
    }

    pub fn inputs(&self) -> usize {
        self.inputs
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }

    /// `None` when either index is outside the matrix
    pub fn gain(&self, input: usize, output: usize) -> Option<f32> {
        if input >= self.inputs || output >= self.outputs {
            return None;
        }
        self.gains.get(input * self.outputs + output).copied()
    }

    pub fn set_gain(&mut self, input: usize, output: usize, gain: f32) -> StreamResult<()> {
        if input >= self.inputs || output >= self.outputs {
            return Err(StreamError::InvalidChannelCount {
                expected: format!("input < {} and output < {}", self.inputs, self.outputs),
                actual: input.max(output),
            });
        }
        if !gain.is_finite() {
            return Err(StreamError::ParameterOutOfRange {
                name: "matrix gain",
                value: gain,
                min: f32::MIN,
                max: f32::MAX,
            });
        }
        self.gains[input * self.outputs + output] = gain;
        Ok(())
    }

    /// Remap whole frames from `input` into `output`; both must hold the same frame count
    pub fn apply(&self, input: &[f32], output: &mut [f32]) {
        for (in_frame, out_frame) in input
            .chunks_exact(self.inputs)
            .zip(output.chunks_exact_mut(self.outputs))
        {
            out_frame.fill(0.0);
            for (in_ch, &sample) in in_frame.iter().enumerate() {
                let row = &self.gains[in_ch * self.outputs..(in_ch + 1) * self.outputs];
                for (out, &gain) in out_frame.iter_mut().zip(row) {
                    *out += sample * gain;
                }
            }
        }
    }
}

/// Stage that changes the channel count of its upstream
pub struct ChannelMatrixTransform<S: SampleSource> {
    upstream: S,
    matrix: ChannelMatrix,
    output_format: WaveFormat,
    scratch: Vec<f32>,
}

impl<S: SampleSource> ChannelMatrixTransform<S> {
    pub fn new(upstream: S, matrix: ChannelMatrix) -> StreamResult<Self> {
        let input_format = upstream.format();
        if input_format.channels as usize != matrix.inputs() {
            return Err(StreamError::InvalidChannelCount {
                expected: format!("{} (matrix inputs)", matrix.inputs()),
                actual: input_format.channels as usize,
            });
        }
        let output_format = input_format.with_channels(matrix.outputs() as u16)?;
        Ok(Self {
            upstream,
            matrix,
            output_format,
            scratch: Vec::new(),
        })
    }

    pub fn matrix(&self) -> &ChannelMatrix {
        &self.matrix
    }

    pub fn upstream_mut(&mut self) -> &mut S {
        &mut self.upstream
    }
}

impl<S: SampleSource> SampleSource for ChannelMatrixTransform<S> {
    fn format(&self) -> WaveFormat {
        self.output_format
    }

    fn read(&mut self, buffer: &mut [f32]) -> StreamResult<usize> {
        let (inputs, outputs) = (self.matrix.inputs(), self.matrix.outputs());
        check_interleaved(buffer.len(), outputs)?;

        let frames = buffer.len() / outputs;
        let input = ensure_scratch(&mut self.scratch, frames * inputs);
        let read = self.upstream.read(input)?;
        let frames_read = read / inputs;

        self.matrix
            .apply(&input[..frames_read * inputs], &mut buffer[..frames_read * outputs]);
        Ok(frames_read * outputs)
    }

    fn position(&self) -> Option<u64> {
        let position = self.upstream.position()?;
        Some(rescale_position(position, self.matrix.inputs(), self.matrix.outputs()))
    }

    fn length(&self) -> Option<u64> {
        let length = self.upstream.length()?;
        Some(rescale_position(length, self.matrix.inputs(), self.matrix.outputs()))
    }

    fn set_position(&mut self, position: u64) -> StreamResult<()> {
        let frame = position / self.matrix.outputs() as u64;
        self.upstream.set_position(frame * self.matrix.inputs() as u64)
    }
}
