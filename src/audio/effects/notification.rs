use crossbeam::channel::Receiver;

use super::{check_interleaved, SampleTransform};
use crate::audio::error::{StreamError, StreamResult};
use crate::audio::events::{BlockReadEvent, EventEmitter, SingleFrameEvent};

/// Read-through stage that reports what passed through it.
///
/// Nothing is copied unless someone is listening.
#[derive(Debug)]
pub struct NotificationTransform {
    channels: usize,
    block_events: EventEmitter<BlockReadEvent>,
    frame_events: EventEmitter<SingleFrameEvent>,
}

impl NotificationTransform {
    pub fn new(channels: usize) -> StreamResult<Self> {
        if channels == 0 {
            return Err(StreamError::InvalidChannelCount {
                expected: "at least 1".to_string(),
                actual: 0,
            });
        }
        Ok(Self {
            channels,
            block_events: EventEmitter::new(),
            frame_events: EventEmitter::new(),
        })
    }

    pub fn subscribe_blocks(&self) -> Receiver<BlockReadEvent> {
        self.block_events.subscribe()
    }

    pub fn subscribe_frames(&self) -> Receiver<SingleFrameEvent> {
        self.frame_events.subscribe()
    }
}

impl SampleTransform for NotificationTransform {
    fn channels(&self) -> usize {
        self.channels
    }

    fn process(&mut self, samples: &mut [f32]) -> StreamResult<()> {
        check_interleaved(samples.len(), self.channels)?;
        if samples.is_empty() {
            return Ok(());
        }

        if self.frame_events.has_subscribers() {
            for frame in samples.chunks_exact(self.channels) {
                self.frame_events.emit(SingleFrameEvent {
                    frame: frame.to_vec(),
                });
            }
        }
        if self.block_events.has_subscribers() {
            self.block_events.emit(BlockReadEvent {
                samples: samples.to_vec(),
                channels: self.channels,
            });
        }
        Ok(())
    }
}
