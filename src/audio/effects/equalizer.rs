use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::filter::BiquadFilter;
use super::{check_interleaved, SampleTransform};
use crate::audio::error::{check_range, StreamError, StreamResult};
use crate::audio::lock_or_recover;

/// Center frequencies of the classic 10-band graphic EQ
pub const TEN_BAND_FREQUENCIES: [f32; 10] = [
    31.0, 62.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];

const MIN_BANDWIDTH: f32 = 0.05;
const MAX_BANDWIDTH: f32 = 8.0;
const MAX_GAIN_DB: f32 = 30.0;

/// Parameters of one peaking band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqBandParams {
    pub frequency: f32,
    /// Width in octaves
    pub bandwidth: f32,
    pub gain_db: f32,
}

impl EqBandParams {
    fn validate(&self, sample_rate: u32) -> StreamResult<()> {
        let nyquist = sample_rate as f32 / 2.0;
        if !(self.frequency > 0.0 && self.frequency < nyquist) {
            return Err(StreamError::ParameterOutOfRange {
                name: "center frequency",
                value: self.frequency,
                min: 0.0,
                max: nyquist,
            });
        }
        check_range("bandwidth", self.bandwidth, MIN_BANDWIDTH, MAX_BANDWIDTH)?;
        check_range("gain (dB)", self.gain_db, -MAX_GAIN_DB, MAX_GAIN_DB)?;
        Ok(())
    }
}

/// Thread-safe handle to change a band while it is running.
/// Every change bumps a version; the transform recomputes coefficients on its next block.
#[derive(Debug, Clone)]
pub struct EqBandControl {
    params: Arc<Mutex<EqBandParams>>,
    version: Arc<AtomicU64>,
    sample_rate: u32,
}

impl EqBandControl {
    pub fn params(&self) -> EqBandParams {
        *lock_or_recover(&self.params)
    }

    pub fn set_params(&self, params: EqBandParams) -> StreamResult<()> {
        params.validate(self.sample_rate)?;
        *lock_or_recover(&self.params) = params;
        self.version.fetch_add(1, Ordering::Release);
        Ok(())
    }

    pub fn set_frequency(&self, frequency: f32) -> StreamResult<()> {
        self.set_params(EqBandParams {
            frequency,
            ..self.params()
        })
    }

    pub fn set_bandwidth(&self, bandwidth: f32) -> StreamResult<()> {
        self.set_params(EqBandParams {
            bandwidth,
            ..self.params()
        })
    }

    pub fn set_gain_db(&self, gain_db: f32) -> StreamResult<()> {
        self.set_params(EqBandParams {
            gain_db,
            ..self.params()
        })
    }
}

/// One peaking band with an independent biquad per channel
#[derive(Debug)]
pub struct EqualizerBiquadTransform {
    channels: usize,
    sample_rate: u32,
    filters: Vec<BiquadFilter>,
    control: EqBandControl,
    applied_version: u64,
}

impl EqualizerBiquadTransform {
    pub fn new(channels: usize, sample_rate: u32, params: EqBandParams) -> StreamResult<Self> {
        if channels == 0 {
            return Err(StreamError::InvalidChannelCount {
                expected: "at least 1".to_string(),
                actual: 0,
            });
        }
        params.validate(sample_rate)?;

        let filters = (0..channels)
            .map(|_| BiquadFilter::peak(sample_rate, params.frequency, params.bandwidth, params.gain_db))
            .collect();

        Ok(Self {
            channels,
            sample_rate,
            filters,
            control: EqBandControl {
                params: Arc::new(Mutex::new(params)),
                version: Arc::new(AtomicU64::new(0)),
                sample_rate,
            },
            applied_version: 0,
        })
    }

    pub fn control(&self) -> EqBandControl {
        self.control.clone()
    }

    fn refresh_coefficients(&mut self) {
        let version = self.control.version.load(Ordering::Acquire);
        if version == self.applied_version {
            return;
        }
        let params = self.control.params();
        for filter in &mut self.filters {
            filter.update_peak_coeffs(self.sample_rate, params.frequency, params.bandwidth, params.gain_db);
        }
        self.applied_version = version;
    }
}

impl SampleTransform for EqualizerBiquadTransform {
    fn channels(&self) -> usize {
        self.channels
    }

    fn process(&mut self, samples: &mut [f32]) -> StreamResult<()> {
        check_interleaved(samples.len(), self.channels)?;
        self.refresh_coefficients();

        // Channel-major: each filter walks its own channel with stride = channel count
        for (channel, filter) in self.filters.iter_mut().enumerate() {
            for sample in samples[channel..].iter_mut().step_by(self.channels) {
                *sample = filter.process(*sample);
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.filters.iter_mut().for_each(BiquadFilter::reset);
    }
}

/// Ordered set of peaking bands applied in series
#[derive(Debug)]
pub struct Equalizer {
    channels: usize,
    bands: Vec<EqualizerBiquadTransform>,
}

impl Equalizer {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            bands: Vec::new(),
        }
    }

    /// Flat 10-band graphic EQ, one octave per band
    pub fn ten_band(channels: usize, sample_rate: u32) -> StreamResult<Self> {
        let mut equalizer = Self::new(channels);
        let nyquist = sample_rate as f32 / 2.0;
        for &frequency in TEN_BAND_FREQUENCIES.iter().filter(|&&f| f < nyquist) {
            equalizer.add_band(sample_rate, EqBandParams {
                frequency,
                bandwidth: 1.0,
                gain_db: 0.0,
            })?;
        }
        Ok(equalizer)
    }

    pub fn add_band(&mut self, sample_rate: u32, params: EqBandParams) -> StreamResult<EqBandControl> {
        let band = EqualizerBiquadTransform::new(self.channels, sample_rate, params)?;
        let control = band.control();
        self.bands.push(band);
        Ok(control)
    }

    pub fn band(&self, index: usize) -> Option<EqBandControl> {
        self.bands.get(index).map(EqualizerBiquadTransform::control)
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }
}

impl SampleTransform for Equalizer {
    fn channels(&self) -> usize {
        self.channels
    }

    fn process(&mut self, samples: &mut [f32]) -> StreamResult<()> {
        check_interleaved(samples.len(), self.channels)?;
        for band in &mut self.bands {
            band.process(samples)?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.bands.iter_mut().for_each(|band| band.reset());
    }
}
