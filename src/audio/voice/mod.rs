pub mod buffer_pool;
pub mod hardware;
pub mod scheduler;
pub mod streaming_voice;

pub use buffer_pool::{SlotState, VoiceBufferPool};
pub use hardware::{CorrelationToken, HardwareVoice, VoiceId};
pub use scheduler::{ScheduledVoice, VoiceScheduler};
pub use streaming_voice::{StreamingVoice, VoiceState};
