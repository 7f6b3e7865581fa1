pub mod channel_matrix;
pub mod effects_chain;
pub mod equalizer;
pub mod fade;
pub mod filter;
pub mod gain;
pub mod meter;
pub mod notification;
pub mod pan;

pub use channel_matrix::{ChannelMatrix, ChannelMatrixTransform};
pub use effects_chain::TransformChain;
pub use equalizer::{EqBandControl, EqBandParams, Equalizer, EqualizerBiquadTransform};
pub use fade::{FadeControl, FadeTransform};
pub use filter::BiquadFilter;
pub use gain::{GainControl, GainTransform};
pub use meter::PeakMeter;
pub use notification::NotificationTransform;
pub use pan::{PanControl, PanTransform};

use super::error::{StreamError, StreamResult};

/// In-place processing of interleaved f32 samples.
///
/// The channel count is fixed when a transform is built. `process` rejects
/// buffers that do not divide into whole frames.
pub trait SampleTransform: Send {
    fn channels(&self) -> usize;

    fn process(&mut self, samples: &mut [f32]) -> StreamResult<()>;

    /// Forget any history (filter state, partial blocks). Called after a seek.
    fn reset(&mut self) {}
}

impl<T: SampleTransform + ?Sized> SampleTransform for Box<T> {
    fn channels(&self) -> usize {
        (**self).channels()
    }

    fn process(&mut self, samples: &mut [f32]) -> StreamResult<()> {
        (**self).process(samples)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Reject buffers that would split a frame
#[inline]
pub(crate) fn check_interleaved(len: usize, channels: usize) -> StreamResult<()> {
    if channels == 0 || len % channels != 0 {
        Err(StreamError::MisalignedBuffer { len, channels })
    } else {
        Ok(())
    }
}

/// Filter stability constants for denormal protection
const DENORMAL_THRESHOLD: f64 = 1e-15;
const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = 40.0;

/// Flush denormals and clamp runaway values in filter history
#[inline]
fn flush_denormal(x: f64) -> f64 {
    let abs_x = x.abs();
    if abs_x < DENORMAL_THRESHOLD || !x.is_finite() {
        0.0
    } else if abs_x > 100.0 {
        // Clamp extreme values that could cause instability
        100.0_f64.copysign(x)
    } else {
        x
    }
}

/// Safe dB conversion with clamping
#[inline]
fn safe_db_to_linear(db: f32) -> f64 {
    let clamped_db = db.clamp(MIN_DB, MAX_DB) as f64;
    10.0_f64.powf(clamped_db / 20.0)
}

/// Replace NaN/inf input with silence
#[inline]
fn validate_float(x: f32) -> f32 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}
