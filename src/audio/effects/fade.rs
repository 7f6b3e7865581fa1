// Linear fade
//
// A fade walks the running volume from a start set-point to a target in
// equal steps, one step per block of frames. The volume is recomputed from
// the block index instead of accumulated, so the last block lands exactly on
// the target and the ramp stays monotonic.

use crossbeam::channel::Receiver;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use super::{check_interleaved, SampleTransform};
use crate::audio::error::{check_range, StreamResult};
use crate::audio::events::{EventEmitter, FadeFinishedEvent};
use crate::audio::lock_or_recover;

/// Distance from the target at which a fade counts as finished
const FADE_EPSILON: f32 = 1e-6;

#[derive(Debug)]
struct FadeState {
    volume: f32,
    start: f32,
    target: f32,
    step: f32,
    total_blocks: u64,
    blocks_done: u64,
    block_frames: usize,
    frames_into_block: usize,
    fading: bool,
}

impl FadeState {
    fn advance_block(&mut self) -> bool {
        self.blocks_done += 1;
        let next = self.start + self.step * self.blocks_done as f32;
        let next = if self.step > 0.0 {
            next.min(self.target)
        } else {
            next.max(self.target)
        };

        if self.blocks_done >= self.total_blocks || (next - self.target).abs() <= FADE_EPSILON {
            self.volume = self.target;
            self.fading = false;
            true
        } else {
            self.volume = next;
            false
        }
    }
}

/// Thread-safe control surface for a running `FadeTransform`
#[derive(Debug, Clone)]
pub struct FadeControl {
    state: Arc<Mutex<FadeState>>,
    finished: Arc<EventEmitter<FadeFinishedEvent>>,
    sample_rate: u32,
}

impl FadeControl {
    /// Fade from the current volume to `target` over `duration`, one step per frame
    pub fn start_fading(&self, duration: Duration, target: f32) -> StreamResult<()> {
        let start = self.current_volume();
        self.start_fading_from(duration, target, start, None)
    }

    /// Fade from `start` to `target`. `resolution` is the block length; the
    /// volume changes once per block. Defaults to one frame.
    pub fn start_fading_from(
        &self,
        duration: Duration,
        target: f32,
        start: f32,
        resolution: Option<Duration>,
    ) -> StreamResult<()> {
        let target = check_range("target volume", target, 0.0, 1.0)?;
        let start = check_range("start volume", start, 0.0, 1.0)?;

        let frames_for = |d: Duration| (self.sample_rate as f64 * d.as_secs_f64()).round() as u64;
        let block_frames = resolution.map(|r| frames_for(r).max(1)).unwrap_or(1);
        let total_blocks = frames_for(duration).div_ceil(block_frames);

        let mut state = lock_or_recover(&self.state);
        state.start = start;
        state.target = target;
        state.block_frames = block_frames as usize;
        state.frames_into_block = 0;
        state.blocks_done = 0;
        state.total_blocks = total_blocks;

        if total_blocks == 0 || (target - start).abs() <= FADE_EPSILON {
            state.volume = target;
            state.step = 0.0;
            state.fading = false;
            drop(state);
            self.finished.emit(FadeFinishedEvent {
                target_volume: target,
            });
            return Ok(());
        }

        state.volume = start;
        state.step = (target - start) / total_blocks as f32;
        state.fading = true;
        debug!(
            "🎚️ FADE: {:.3} → {:.3} over {} blocks of {} frames",
            start, target, total_blocks, block_frames
        );
        Ok(())
    }

    /// Freeze at the current volume. No finished notification is raised.
    pub fn stop_fading(&self) {
        let mut state = lock_or_recover(&self.state);
        state.fading = false;
    }

    pub fn current_volume(&self) -> f32 {
        lock_or_recover(&self.state).volume
    }

    pub fn is_fading(&self) -> bool {
        lock_or_recover(&self.state).fading
    }

    /// Receives one event per completed fade
    pub fn subscribe_finished(&self) -> Receiver<FadeFinishedEvent> {
        self.finished.subscribe()
    }
}

/// Applies the running fade volume to every sample of a frame
#[derive(Debug)]
pub struct FadeTransform {
    channels: usize,
    control: FadeControl,
}

impl FadeTransform {
    /// Starts idle at full volume
    pub fn new(channels: usize, sample_rate: u32) -> Self {
        Self {
            channels,
            control: FadeControl {
                state: Arc::new(Mutex::new(FadeState {
                    volume: 1.0,
                    start: 1.0,
                    target: 1.0,
                    step: 0.0,
                    total_blocks: 0,
                    blocks_done: 0,
                    block_frames: 1,
                    frames_into_block: 0,
                    fading: false,
                })),
                finished: Arc::new(EventEmitter::new()),
                sample_rate,
            },
        }
    }

    pub fn control(&self) -> FadeControl {
        self.control.clone()
    }
}

impl SampleTransform for FadeTransform {
    fn channels(&self) -> usize {
        self.channels
    }

    fn process(&mut self, samples: &mut [f32]) -> StreamResult<()> {
        check_interleaved(samples.len(), self.channels)?;

        let mut finished_at = None;
        {
            let mut state = lock_or_recover(&self.control.state);
            for frame in samples.chunks_exact_mut(self.channels) {
                let volume = state.volume;
                if volume != 1.0 {
                    frame.iter_mut().for_each(|s| *s *= volume);
                }

                if state.fading {
                    state.frames_into_block += 1;
                    if state.frames_into_block >= state.block_frames {
                        state.frames_into_block = 0;
                        if state.advance_block() {
                            finished_at = Some(state.target);
                        }
                    }
                }
            }
        }

        if let Some(target_volume) = finished_at {
            debug!("🎚️ FADE: finished at {:.3}", target_volume);
            self.control
                .finished
                .emit(FadeFinishedEvent { target_volume });
        }
        Ok(())
    }
}
