// Streaming voice
//
// Couples a byte source to a hardware voice through a rotating set of
// buffers. Refills are driven by the shared scheduler: every completion frees
// a slot, and the freed slot is filled and resubmitted.
//
// State machine: Stopped -> Started -> (Refilling <-> Playing) -> Stopped

use colored::*;
use crossbeam::channel::Receiver;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

use super::buffer_pool::VoiceBufferPool;
use super::hardware::{CorrelationToken, HardwareVoice, VoiceId};
use super::scheduler::{ScheduledVoice, VoiceScheduler};
use crate::audio::config::{VoiceConfig, VOICE_BUFFER_COUNT};
use crate::audio::error::StreamResult;
use crate::audio::lock_or_recover;
use crate::audio::source::WaveSource;
use crate::audio::types::WaveFormat;

static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Stopped,
    Started,
    Refilling,
    Playing,
}

struct VoiceCore<H, S> {
    hardware: H,
    source: S,
    pool: VoiceBufferPool,
    state: VoiceState,
    looping: bool,
    finished: bool,
}

impl<H: HardwareVoice, S: WaveSource> VoiceCore<H, S> {
    /// Fill and submit one slot. Returns false when nothing was submitted.
    fn refill(&mut self, id: VoiceId) -> StreamResult<bool> {
        if self.state == VoiceState::Stopped || self.finished {
            return Ok(false);
        }
        if self.hardware.queued_buffer_count() >= VOICE_BUFFER_COUNT {
            crate::stream_debug!("STREAMING_VOICE: {} queue full, skipping refill", id);
            return Ok(false);
        }
        if self.pool.current_mut().is_none() {
            return Ok(false);
        }

        self.state = VoiceState::Refilling;
        let result = Self::fill_and_submit(&mut self.hardware, &mut self.source, &mut self.pool, self.looping);
        self.state = VoiceState::Playing;

        match result? {
            Submission::Queued { end_of_stream } => {
                if end_of_stream {
                    debug!("STREAMING_VOICE: {} submitted its last buffer", id);
                    self.finished = true;
                }
                Ok(true)
            }
            Submission::Exhausted => {
                debug!("STREAMING_VOICE: {} source exhausted", id);
                self.finished = true;
                Ok(false)
            }
        }
    }

    fn fill_and_submit(
        hardware: &mut H,
        source: &mut S,
        pool: &mut VoiceBufferPool,
        looping: bool,
    ) -> StreamResult<Submission> {
        let Some(buffer) = pool.current_mut() else {
            return Ok(Submission::Exhausted);
        };

        let mut read = source.read(buffer)?;
        if read == 0 && looping && source.can_seek() {
            source.set_position(0)?;
            read = source.read(buffer)?;
        }
        if read == 0 {
            return Ok(Submission::Exhausted);
        }

        let at_end = matches!(
            (source.position(), source.length()),
            (Some(position), Some(length)) if position >= length
        );
        if at_end && looping {
            source.set_position(0)?;
        }
        let end_of_stream = at_end && !looping;

        let (token, data) = pool.queue_current(read);
        if let Err(e) = hardware.submit_buffer(data, token, end_of_stream) {
            pool.release(token);
            return Err(e);
        }
        pool.advance();
        Ok(Submission::Queued { end_of_stream })
    }
}

enum Submission {
    Queued { end_of_stream: bool },
    Exhausted,
}

struct VoiceInner<H, S> {
    id: VoiceId,
    format: WaveFormat,
    signal: Receiver<CorrelationToken>,
    core: Mutex<VoiceCore<H, S>>,
}

impl<H, S> ScheduledVoice for VoiceInner<H, S>
where
    H: HardwareVoice + 'static,
    S: WaveSource + 'static,
{
    fn voice_id(&self) -> VoiceId {
        self.id
    }

    fn completion_signal(&self) -> Receiver<CorrelationToken> {
        self.signal.clone()
    }

    fn on_buffer_completed(&self, token: CorrelationToken) {
        lock_or_recover(&self.core).pool.release(token);
    }

    fn refill(&self) -> StreamResult<()> {
        lock_or_recover(&self.core).refill(self.id).map(|_| ())
    }
}

/// Plays a `WaveSource` on a hardware voice, refilled by a `VoiceScheduler`
pub struct StreamingVoice<H, S>
where
    H: HardwareVoice + 'static,
    S: WaveSource + 'static,
{
    inner: Arc<VoiceInner<H, S>>,
    scheduler: Arc<VoiceScheduler>,
}

impl<H, S> StreamingVoice<H, S>
where
    H: HardwareVoice + 'static,
    S: WaveSource + 'static,
{
    /// Buffers hold `config.buffer_duration` of audio each, in the source's format
    pub fn new(
        hardware: H,
        source: S,
        config: VoiceConfig,
        scheduler: Arc<VoiceScheduler>,
    ) -> StreamResult<Self> {
        let format = source.format();
        let pool = VoiceBufferPool::new(format.bytes_for(config.buffer_duration()), format.block_align())?;
        let signal = hardware.completion_signal();
        let id = VoiceId(NEXT_VOICE_ID.fetch_add(1, Ordering::Relaxed));

        debug!(
            "STREAMING_VOICE: created {} ({} x {} bytes, looping: {})",
            id,
            VOICE_BUFFER_COUNT,
            pool.capacity(),
            config.looping
        );

        Ok(Self {
            inner: Arc::new(VoiceInner {
                id,
                format,
                signal,
                core: Mutex::new(VoiceCore {
                    hardware,
                    source,
                    pool,
                    state: VoiceState::Stopped,
                    looping: config.looping,
                    finished: false,
                }),
            }),
            scheduler,
        })
    }

    pub fn id(&self) -> VoiceId {
        self.inner.id
    }

    pub fn format(&self) -> WaveFormat {
        self.inner.format
    }

    pub fn state(&self) -> VoiceState {
        lock_or_recover(&self.inner.core).state
    }

    pub fn is_looping(&self) -> bool {
        lock_or_recover(&self.inner.core).looping
    }

    pub fn set_looping(&self, looping: bool) {
        lock_or_recover(&self.inner.core).looping = looping;
    }

    /// Slots submitted to the hardware and not yet completed
    pub fn queued_buffers(&self) -> usize {
        lock_or_recover(&self.inner.core).pool.queued_count()
    }

    /// True once the last buffer of a non-looping source was submitted
    pub fn is_finished(&self) -> bool {
        lock_or_recover(&self.inner.core).finished
    }

    /// Fill and submit the next slot. Returns false when the call was a no-op
    /// (stopped, finished, or all slots queued).
    pub fn refill(&self) -> StreamResult<bool> {
        lock_or_recover(&self.inner.core).refill(self.inner.id)
    }

    /// Register with the scheduler, prime every free slot and start the hardware voice
    pub fn start(&self) -> StreamResult<()> {
        if self.state() != VoiceState::Stopped {
            return Ok(());
        }

        self.scheduler.add(self.inner.clone())?;

        let result = {
            let mut core = lock_or_recover(&self.inner.core);
            core.state = VoiceState::Started;
            core.finished = false;
            Self::prime_and_start(&mut core, self.inner.id)
        };

        match result {
            Ok(primed) => {
                info!(
                    "{}: {} started ({} buffers primed)",
                    "STREAMING_VOICE".on_blue().cyan(),
                    self.inner.id,
                    primed
                );
                Ok(())
            }
            Err(e) => {
                error!("STREAMING_VOICE: {} failed to start: {}", self.inner.id, e);
                let _ = self.stop();
                Err(e)
            }
        }
    }

    fn prime_and_start(core: &mut VoiceCore<H, S>, id: VoiceId) -> StreamResult<usize> {
        let mut primed = 0;
        while core.refill(id)? {
            primed += 1;
        }
        core.hardware.start()?;
        if core.state == VoiceState::Started {
            core.state = VoiceState::Playing;
        }
        Ok(primed)
    }

    /// Unregister from the scheduler first so no refill can follow, then stop
    /// the hardware voice and free every slot.
    pub fn stop(&self) -> StreamResult<()> {
        let was_running = {
            let mut core = lock_or_recover(&self.inner.core);
            let was_running = core.state != VoiceState::Stopped;
            core.state = VoiceState::Stopped;
            was_running
        };
        self.scheduler.remove(self.inner.id);
        if !was_running {
            return Ok(());
        }

        let mut core = lock_or_recover(&self.inner.core);
        let result = core.hardware.stop();
        while let Ok(token) = self.inner.signal.try_recv() {
            core.pool.release(token);
        }
        core.pool.reset();

        info!("{}: {} stopped", "STREAMING_VOICE".on_blue().cyan(), self.inner.id);
        result
    }
}

impl<H, S> Drop for StreamingVoice<H, S>
where
    H: HardwareVoice + 'static,
    S: WaveSource + 'static,
{
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("STREAMING_VOICE: {} failed to stop on drop: {}", self.inner.id, e);
        }
    }
}
