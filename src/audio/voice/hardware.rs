use crossbeam::channel::Receiver;

use crate::audio::error::StreamResult;

/// Tag attached to a submitted buffer and handed back on its completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationToken(pub u64);

/// Process-unique identity of a streaming voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u64);

impl std::fmt::Display for VoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

/// Platform voice that plays queued buffers.
///
/// Implementations copy `data` during `submit_buffer`, so the caller may
/// reuse its slot as soon as the matching token arrives on the completion
/// signal. Every voice owns exactly one completion signal; it stays connected
/// for the lifetime of the voice.
#[cfg_attr(test, mockall::automock)]
pub trait HardwareVoice: Send {
    fn submit_buffer(
        &mut self,
        data: &[u8],
        token: CorrelationToken,
        end_of_stream: bool,
    ) -> StreamResult<()>;

    /// Buffers submitted but not yet completed
    fn queued_buffer_count(&self) -> usize;

    fn start(&mut self) -> StreamResult<()>;

    fn stop(&mut self) -> StreamResult<()>;

    fn completion_signal(&self) -> Receiver<CorrelationToken>;
}

impl<T: HardwareVoice + ?Sized> HardwareVoice for Box<T> {
    fn submit_buffer(
        &mut self,
        data: &[u8],
        token: CorrelationToken,
        end_of_stream: bool,
    ) -> StreamResult<()> {
        (**self).submit_buffer(data, token, end_of_stream)
    }

    fn queued_buffer_count(&self) -> usize {
        (**self).queued_buffer_count()
    }

    fn start(&mut self) -> StreamResult<()> {
        (**self).start()
    }

    fn stop(&mut self) -> StreamResult<()> {
        (**self).stop()
    }

    fn completion_signal(&self) -> Receiver<CorrelationToken> {
        (**self).completion_signal()
    }
}
