// Peak metering
//
// Read-through stage: samples pass unchanged while a running maximum of the
// absolute value is kept per channel. Every `interval` worth of frames the
// peaks are published and the accumulator starts over.

use crossbeam::channel::Receiver;
use std::time::Duration;

use super::{check_interleaved, SampleTransform};
use crate::audio::error::{StreamError, StreamResult};
use crate::audio::events::{EventEmitter, PeakEvent};

/// Running peak level per channel, published once per interval
#[derive(Debug)]
pub struct PeakMeter {
    channels: usize,
    sample_rate: u32,
    block_frames: usize,
    frames_accumulated: usize,
    channel_peaks: Vec<f32>,
    events: EventEmitter<PeakEvent>,
}

impl PeakMeter {
    pub fn new(channels: usize, sample_rate: u32, interval: Duration) -> StreamResult<Self> {
        if channels == 0 {
            return Err(StreamError::InvalidChannelCount {
                expected: "at least 1".to_string(),
                actual: 0,
            });
        }
        Ok(Self {
            channels,
            sample_rate,
            block_frames: Self::frames_for(sample_rate, interval)?,
            frames_accumulated: 0,
            channel_peaks: vec![0.0; channels],
            events: EventEmitter::new(),
        })
    }

    fn frames_for(sample_rate: u32, interval: Duration) -> StreamResult<usize> {
        let frames = (sample_rate as f64 * interval.as_secs_f64()).round() as usize;
        if frames == 0 {
            return Err(StreamError::ParameterOutOfRange {
                name: "metering interval (ms)",
                value: interval.as_secs_f32() * 1000.0,
                min: 1000.0 / sample_rate as f32,
                max: f32::MAX,
            });
        }
        Ok(frames)
    }

    /// Change the interval; the partial block collected so far is discarded
    pub fn set_interval(&mut self, interval: Duration) -> StreamResult<()> {
        self.block_frames = Self::frames_for(self.sample_rate, interval)?;
        self.reset();
        Ok(())
    }

    pub fn block_frames(&self) -> usize {
        self.block_frames
    }

    pub fn subscribe(&self) -> Receiver<PeakEvent> {
        self.events.subscribe()
    }

    fn publish(&mut self) {
        let average_peak = self.channel_peaks.iter().sum::<f32>() / self.channels as f32;
        self.events.emit(PeakEvent {
            channel_peaks: self.channel_peaks.clone(),
            average_peak,
            frames: self.frames_accumulated,
        });
        self.channel_peaks.fill(0.0);
        self.frames_accumulated = 0;
    }
}

impl SampleTransform for PeakMeter {
    fn channels(&self) -> usize {
        self.channels
    }

    fn process(&mut self, samples: &mut [f32]) -> StreamResult<()> {
        check_interleaved(samples.len(), self.channels)?;

        for frame in samples.chunks_exact(self.channels) {
            for (peak, sample) in self.channel_peaks.iter_mut().zip(frame) {
                *peak = peak.max(sample.abs());
            }
            self.frames_accumulated += 1;
            if self.frames_accumulated >= self.block_frames {
                self.publish();
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.channel_peaks.fill(0.0);
        self.frames_accumulated = 0;
    }
}
