pub mod audio;
pub mod log;

// Re-export the streaming core for tests and embedding applications
pub use audio::{
    BufferingConfig, ChannelMatrix, ChannelMatrixTransform, EqBandParams, Equalizer,
    EqualizerBiquadTransform, FadeTransform, GainTransform, HardwareVoice, MemoryWaveSource,
    PanTransform, PeakMeter, PullBufferingStage, PushBufferingStage, RingBuffer, SampleSource,
    SampleTransform, StreamError, StreamResult, StreamingConfig, StreamingVoice, TransformChain,
    VoiceScheduler, WaveFormat, WaveSource,
};
pub use log::{init_tracing, is_stream_debug_enabled, set_stream_debug};
