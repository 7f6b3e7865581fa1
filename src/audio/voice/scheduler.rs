// Voice scheduler
//
// One worker thread services every active voice. It waits on the completion
// signals of all registered voices at once; when a voice reports a finished
// buffer the slot is released and the voice refilled. The wait set is rebuilt
// from the registry whenever a voice is added or removed, so a removed voice
// is never waited on again once its removal returns.

use colored::*;
use crossbeam::channel::{Receiver, Select};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

use super::hardware::{CorrelationToken, VoiceId};
use crate::audio::config::{SchedulerConfig, MAX_WAIT_HANDLES};
use crate::audio::error::{StreamError, StreamResult};
use crate::audio::lock_or_recover;

/// What the scheduler needs from a voice
pub trait ScheduledVoice: Send + Sync {
    fn voice_id(&self) -> VoiceId;

    /// Completion signal of the underlying hardware voice
    fn completion_signal(&self) -> Receiver<CorrelationToken>;

    /// The hardware finished playing the buffer tagged with `token`
    fn on_buffer_completed(&self, token: CorrelationToken);

    /// Top up the voice's queue; a no-op when nothing can be queued
    fn refill(&self) -> StreamResult<()>;
}

struct RegisteredVoice {
    voice: Arc<dyn ScheduledVoice>,
    signal: Receiver<CorrelationToken>,
}

#[derive(Default)]
struct Registry {
    voices: Vec<RegisteredVoice>,
    generation: u64,
}

struct SchedulerInner {
    registry: Mutex<Registry>,
    stop: AtomicBool,
    config: SchedulerConfig,
    max_voices: usize,
}

impl SchedulerInner {
    fn remove(&self, id: VoiceId) -> bool {
        let mut registry = lock_or_recover(&self.registry);
        let before = registry.voices.len();
        registry.voices.retain(|entry| entry.voice.voice_id() != id);
        let removed = registry.voices.len() != before;
        if removed {
            registry.generation += 1;
        }
        removed
    }
}

/// Shared refill worker for streaming voices
pub struct VoiceScheduler {
    inner: Arc<SchedulerInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

static SHARED_SCHEDULER: OnceLock<Arc<VoiceScheduler>> = OnceLock::new();

impl VoiceScheduler {
    /// `max_active_voices` is capped at the multiplexed wait capacity (64)
    pub fn new(config: SchedulerConfig) -> Self {
        let max_voices = config.max_active_voices.clamp(1, MAX_WAIT_HANDLES);
        if max_voices != config.max_active_voices {
            warn!(
                "VOICE_SCHEDULER: max_active_voices {} adjusted to {}",
                config.max_active_voices, max_voices
            );
        }

        Self {
            inner: Arc::new(SchedulerInner {
                registry: Mutex::new(Registry::default()),
                stop: AtomicBool::new(false),
                config,
                max_voices,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Process-wide scheduler with default settings
    pub fn shared() -> Arc<VoiceScheduler> {
        SHARED_SCHEDULER
            .get_or_init(|| Arc::new(VoiceScheduler::new(SchedulerConfig::default())))
            .clone()
    }

    pub fn max_active_voices(&self) -> usize {
        self.inner.max_voices
    }

    pub fn active_voices(&self) -> usize {
        lock_or_recover(&self.inner.registry).voices.len()
    }

    pub fn contains(&self, id: VoiceId) -> bool {
        lock_or_recover(&self.inner.registry)
            .voices
            .iter()
            .any(|entry| entry.voice.voice_id() == id)
    }

    /// Register a voice. Adding a voice that is already registered is a no-op.
    pub fn add(&self, voice: Arc<dyn ScheduledVoice>) -> StreamResult<()> {
        if self.inner.stop.load(Ordering::Acquire) {
            return Err(StreamError::Disposed("VoiceScheduler"));
        }

        {
            let mut registry = lock_or_recover(&self.inner.registry);
            let id = voice.voice_id();
            if registry.voices.iter().any(|entry| entry.voice.voice_id() == id) {
                return Ok(());
            }
            if registry.voices.len() >= self.inner.max_voices {
                warn!(
                    "{}: rejecting {}, {} voices already active",
                    "VOICE_SCHEDULER".on_yellow().black(),
                    id,
                    registry.voices.len()
                );
                return Err(StreamError::SchedulerFull {
                    max: self.inner.max_voices,
                });
            }

            let signal = voice.completion_signal();
            registry.voices.push(RegisteredVoice { voice, signal });
            registry.generation += 1;
            debug!("VOICE_SCHEDULER: added {} ({} active)", id, registry.voices.len());
        }

        self.ensure_worker()
    }

    /// Unregister a voice. Returns false if it was not registered.
    pub fn remove(&self, id: VoiceId) -> bool {
        let removed = self.inner.remove(id);
        if removed {
            debug!("VOICE_SCHEDULER: removed {}", id);
        }
        removed
    }

    fn ensure_worker(&self) -> StreamResult<()> {
        let mut worker = lock_or_recover(&self.worker);
        if worker.is_some() {
            return Ok(());
        }

        let inner = self.inner.clone();
        let handle = std::thread::Builder::new()
            .name("voice-scheduler".to_string())
            .spawn(move || Self::worker_loop(&inner))?;
        *worker = Some(handle);

        info!(
            "{}: Started worker (max {} voices, poll {:?})",
            "VOICE_SCHEDULER".on_blue().cyan(),
            self.inner.max_voices,
            self.inner.config.poll_timeout()
        );
        Ok(())
    }

    fn worker_loop(inner: &SchedulerInner) {
        let poll_timeout = inner.config.poll_timeout();
        let idle_sleep = inner.config.idle_sleep();

        let mut generation = None;
        let mut snapshot: Vec<(Arc<dyn ScheduledVoice>, Receiver<CorrelationToken>)> = Vec::new();

        while !inner.stop.load(Ordering::Acquire) {
            {
                let registry = lock_or_recover(&inner.registry);
                if generation != Some(registry.generation) {
                    snapshot = registry
                        .voices
                        .iter()
                        .map(|entry| (entry.voice.clone(), entry.signal.clone()))
                        .collect();
                    generation = Some(registry.generation);
                    crate::stream_debug!("VOICE_SCHEDULER: wait set rebuilt ({} voices)", snapshot.len());
                }
            }

            if snapshot.is_empty() {
                std::thread::sleep(idle_sleep);
                continue;
            }

            let mut select = Select::new();
            for (_, signal) in &snapshot {
                select.recv(signal);
            }
            let Ok(operation) = select.select_timeout(poll_timeout) else {
                continue;
            };

            let (voice, signal) = &snapshot[operation.index()];
            match operation.recv(signal) {
                Ok(token) => {
                    voice.on_buffer_completed(token);
                    if let Err(e) = voice.refill() {
                        error!(
                            "{}: refill of {} failed: {}",
                            "VOICE_SCHEDULER".on_red().white(),
                            voice.voice_id(),
                            e
                        );
                    }
                }
                Err(_) => {
                    // Hardware voice went away without being stopped
                    warn!(
                        "VOICE_SCHEDULER: completion signal of {} disconnected, removing",
                        voice.voice_id()
                    );
                    inner.remove(voice.voice_id());
                }
            }
        }

        info!("{}: Worker stopped", "VOICE_SCHEDULER".on_blue().cyan());
    }

    /// Stop the worker and drop every registration. Further adds fail.
    pub fn shutdown(&self) {
        if self.inner.stop.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let mut registry = lock_or_recover(&self.inner.registry);
            registry.voices.clear();
            registry.generation += 1;
        }
        if let Some(handle) = lock_or_recover(&self.worker).take() {
            if handle.join().is_err() {
                error!("VOICE_SCHEDULER: worker panicked");
            }
        }
    }
}

impl Drop for VoiceScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::{unbounded, Sender};
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    struct CountingVoice {
        id: VoiceId,
        signal: Receiver<CorrelationToken>,
        completed: Mutex<Vec<CorrelationToken>>,
        refills: AtomicUsize,
    }

    fn counting_voice(id: u64) -> (Arc<CountingVoice>, Sender<CorrelationToken>) {
        let (tx, rx) = unbounded();
        let voice = Arc::new(CountingVoice {
            id: VoiceId(id),
            signal: rx,
            completed: Mutex::new(Vec::new()),
            refills: AtomicUsize::new(0),
        });
        (voice, tx)
    }

    impl ScheduledVoice for CountingVoice {
        fn voice_id(&self) -> VoiceId {
            self.id
        }

        fn completion_signal(&self) -> Receiver<CorrelationToken> {
            self.signal.clone()
        }

        fn on_buffer_completed(&self, token: CorrelationToken) {
            self.completed.lock().unwrap().push(token);
        }

        fn refill(&self) -> StreamResult<()> {
            self.refills.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn wait_for(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_registry_capacity() {
        let scheduler = VoiceScheduler::new(SchedulerConfig::default());
        let mut senders = Vec::new();
        for id in 0..64 {
            let (voice, tx) = counting_voice(id);
            scheduler.add(voice).unwrap();
            senders.push(tx);
        }
        assert_eq!(scheduler.active_voices(), 64);

        let (extra, _tx) = counting_voice(64);
        assert!(matches!(
            scheduler.add(extra.clone()),
            Err(StreamError::SchedulerFull { max: 64 })
        ));

        assert!(scheduler.remove(VoiceId(3)));
        scheduler.add(extra).unwrap();
        assert_eq!(scheduler.active_voices(), 64);
        scheduler.shutdown();
    }

    #[test]
    fn test_configured_limit_is_capped() {
        let config = SchedulerConfig {
            max_active_voices: 500,
            ..SchedulerConfig::default()
        };
        assert_eq!(VoiceScheduler::new(config).max_active_voices(), 64);
    }

    #[test]
    fn test_add_is_idempotent() {
        let scheduler = VoiceScheduler::new(SchedulerConfig::default());
        let (voice, _tx) = counting_voice(1);
        scheduler.add(voice.clone()).unwrap();
        scheduler.add(voice).unwrap();
        assert_eq!(scheduler.active_voices(), 1);
        assert!(!scheduler.remove(VoiceId(2)));
    }

    #[test]
    fn test_completion_triggers_refill() {
        let scheduler = VoiceScheduler::new(SchedulerConfig::default());
        let (quiet, _quiet_tx) = counting_voice(1);
        let (busy, busy_tx) = counting_voice(2);
        scheduler.add(quiet.clone()).unwrap();
        scheduler.add(busy.clone()).unwrap();

        busy_tx.send(CorrelationToken(7)).unwrap();
        assert!(wait_for(|| busy.refills.load(Ordering::SeqCst) == 1));
        assert_eq!(*busy.completed.lock().unwrap(), vec![CorrelationToken(7)]);
        assert_eq!(quiet.refills.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_removed_voice_is_not_refilled() {
        let scheduler = VoiceScheduler::new(SchedulerConfig::default());
        let (voice, tx) = counting_voice(1);
        scheduler.add(voice.clone()).unwrap();
        scheduler.remove(VoiceId(1));

        // Give the worker time to rebuild its wait set
        std::thread::sleep(Duration::from_millis(60));
        tx.send(CorrelationToken(1)).unwrap();
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(voice.refills.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_disconnected_signal_is_dropped() {
        let scheduler = VoiceScheduler::new(SchedulerConfig::default());
        let (voice, tx) = counting_voice(1);
        scheduler.add(voice).unwrap();
        drop(tx);
        assert!(wait_for(|| scheduler.active_voices() == 0));
    }

    #[test]
    fn test_shutdown_rejects_new_voices() {
        let scheduler = VoiceScheduler::new(SchedulerConfig::default());
        let (voice, _tx) = counting_voice(1);
        scheduler.add(voice.clone()).unwrap();
        scheduler.shutdown();
        assert_eq!(scheduler.active_voices(), 0);
        assert!(matches!(scheduler.add(voice), Err(StreamError::Disposed(_))));
    }
}
