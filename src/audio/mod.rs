// Audio module - PCM streaming core for BeatStream
//
// This module provides the streaming pipeline broken down into logical components:
// - types: Stream format descriptor and position helpers
// - source: Byte and sample stage interfaces
// - convert: PCM <-> f32 conversion stages
// - buffering: Ring buffers and pull/push buffering stages
// - effects: Sample transforms (gain, pan, fade, channel matrix, EQ, metering)
// - voice: Buffer rotation, streaming voices and the shared voice scheduler

pub mod config;
pub mod convert;
pub mod error;
pub mod events;
pub mod source;
pub mod types;

pub mod buffering;
pub mod effects;
pub mod voice;

use std::sync::{Mutex, MutexGuard, PoisonError};

// Re-export commonly used types for easier imports
pub use config::{
    BufferingConfig, MeteringConfig, SchedulerConfig, StreamingConfig, VoiceConfig,
    MAX_WAIT_HANDLES, VOICE_BUFFER_COUNT,
};
pub use convert::{SampleToWave, WaveToSample};
pub use error::{StreamError, StreamResult};
pub use events::{BlockReadEvent, EventEmitter, FadeFinishedEvent, PeakEvent, SingleFrameEvent};
pub use source::{MemoryWaveSource, SampleSource, WaveSource};
pub use types::{SampleEncoding, WaveFormat};

pub use buffering::{
    spsc_byte_ring, ByteConsumer, ByteProducer, PullBufferingStage, PushBufferingStage,
    PushWriter, RingBuffer,
};

pub use effects::{
    BiquadFilter, ChannelMatrix, ChannelMatrixTransform, EqBandControl, EqBandParams, Equalizer,
    EqualizerBiquadTransform, FadeControl, FadeTransform, GainControl, GainTransform,
    NotificationTransform, PanControl, PanTransform, PeakMeter, SampleTransform, TransformChain,
};

pub use voice::{
    CorrelationToken, HardwareVoice, ScheduledVoice, StreamingVoice, VoiceBufferPool, VoiceId,
    VoiceScheduler, VoiceState,
};

/// Lock a mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
