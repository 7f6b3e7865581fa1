// Pull buffering stage
//
// A dedicated worker thread keeps the ring buffer topped up from the upstream
// source until the high-water mark, then idles. Readers only ever touch the
// ring. End of stream is detected by the worker: `eof_retry_limit`
// consecutive zero-byte upstream reads. Once that happens readers drain what
// is left and return short reads instead of waiting.

use colored::*;
use crossbeam::channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

use super::ring_buffer::RingBuffer;
use crate::audio::config::BufferingConfig;
use crate::audio::error::{StreamError, StreamResult};
use crate::audio::lock_or_recover;
use crate::audio::source::WaveSource;
use crate::audio::types::WaveFormat;

struct PullShared<S> {
    ring: RingBuffer,
    // Held across upstream read + ring write so a seek never interleaves with a refill
    upstream: Mutex<S>,
    stop: AtomicBool,
    empty_reads: AtomicUsize,
    worker_failed: AtomicBool,
    config: BufferingConfig,
}

impl<S> PullShared<S> {
    fn upstream_exhausted(&self) -> bool {
        self.empty_reads.load(Ordering::Acquire) >= self.config.eof_retry_limit
            || self.worker_failed.load(Ordering::Acquire)
    }
}

/// Signals the owner when the worker leaves its loop, even on panic.
/// A panicking worker is treated like a failed upstream so readers drain and return.
struct ExitSignal<S> {
    shared: Arc<PullShared<S>>,
    exited: Sender<()>,
}

impl<S> Drop for ExitSignal<S> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!(
                "{}: Buffering worker panicked, upstream treated as ended",
                "PULL_STAGE".on_red().white()
            );
            self.shared.worker_failed.store(true, Ordering::Release);
        }
        let _ = self.exited.try_send(());
    }
}

/// Background-thread prefetch between a bursty upstream and a steady reader
pub struct PullBufferingStage<S: WaveSource + 'static> {
    shared: Arc<PullShared<S>>,
    format: WaveFormat,
    worker: Option<JoinHandle<()>>,
    worker_exited: Receiver<()>,
    disposed: bool,
}

impl<S: WaveSource + 'static> PullBufferingStage<S> {
    /// Create the stage and start its worker immediately.
    /// `capacity` is in bytes and must be a positive multiple of the upstream block align.
    pub fn new(upstream: S, capacity: usize, config: BufferingConfig) -> StreamResult<Self> {
        config
            .validate()
            .map_err(|e| StreamError::InvalidConfig(e.to_string()))?;
        let format = upstream.format();
        let ring = RingBuffer::new(capacity, format.block_align())?;

        let shared = Arc::new(PullShared {
            ring,
            upstream: Mutex::new(upstream),
            stop: AtomicBool::new(false),
            empty_reads: AtomicUsize::new(0),
            worker_failed: AtomicBool::new(false),
            config,
        });

        let (exit_tx, worker_exited) = bounded(1);
        let worker_shared = shared.clone();
        let worker = std::thread::Builder::new()
            .name("pull-buffer".to_string())
            .spawn(move || {
                let exit = ExitSignal {
                    shared: worker_shared,
                    exited: exit_tx,
                };
                Self::worker_loop(&exit.shared);
            })?;

        info!(
            "{}: Started buffering worker ({} bytes, high water {:.0}%)",
            "PULL_STAGE".on_blue().cyan(),
            capacity,
            config.high_water_fraction * 100.0
        );

        Ok(Self {
            shared,
            format,
            worker: Some(worker),
            worker_exited,
            disposed: false,
        })
    }

    fn worker_loop(shared: &PullShared<S>) {
        let config = shared.config;
        let capacity = shared.ring.capacity();
        let block_align = shared.ring.block_align();
        let high_water = (capacity as f64 * config.high_water_fraction as f64) as usize;

        let scratch_len = config.scratch_buffer_bytes.max(block_align);
        let mut scratch = vec![0u8; scratch_len - scratch_len % block_align];

        while !shared.stop.load(Ordering::Acquire) {
            if shared.ring.buffered() >= high_water {
                std::thread::sleep(config.worker_idle());
                continue;
            }

            let result = {
                let mut upstream = lock_or_recover(&shared.upstream);
                let free = shared.ring.free();
                let want = free.min(scratch.len());
                let want = want - want % block_align;
                if want == 0 {
                    Ok(None)
                } else {
                    upstream.read(&mut scratch[..want]).map(|read| {
                        shared.ring.write(&scratch[..read]);
                        Some(read)
                    })
                }
            };

            match result {
                Ok(Some(0)) => {
                    let empty = shared.empty_reads.fetch_add(1, Ordering::AcqRel) + 1;
                    if empty == config.eof_retry_limit {
                        debug!("📭 PULL_STAGE: upstream returned no data {} times, treating as end of stream", empty);
                    }
                    std::thread::sleep(config.worker_idle());
                }
                Ok(Some(read)) => {
                    shared.empty_reads.store(0, Ordering::Release);
                    crate::stream_debug!("PULL_STAGE: buffered {} bytes ({} total)", read, shared.ring.buffered());
                }
                Ok(None) => std::thread::sleep(config.worker_idle()),
                Err(e) => {
                    error!(
                        "{}: Upstream read failed, stopping worker: {}",
                        "PULL_STAGE".on_red().white(),
                        e
                    );
                    shared.worker_failed.store(true, Ordering::Release);
                    break;
                }
            }
        }

        debug!("PULL_STAGE: worker loop exited");
    }

    fn ensure_alive(&self) -> StreamResult<()> {
        if self.disposed {
            Err(StreamError::Disposed("PullBufferingStage"))
        } else {
            Ok(())
        }
    }

    /// Bytes currently prefetched
    pub fn buffered(&self) -> usize {
        self.shared.ring.buffered()
    }

    pub fn capacity(&self) -> usize {
        self.shared.ring.capacity()
    }

    /// Consecutive zero-byte reads the worker has seen from upstream
    pub fn consecutive_empty_reads(&self) -> usize {
        self.shared.empty_reads.load(Ordering::Acquire)
    }

    /// True once the upstream hit end of stream (or the worker failed) and the ring is empty
    pub fn is_drained(&self) -> bool {
        self.shared.upstream_exhausted() && self.shared.ring.buffered() == 0
    }

    /// Discard everything prefetched. Used after the upstream was repositioned.
    pub fn reset_buffer(&self) -> StreamResult<()> {
        self.ensure_alive()?;
        let _upstream = lock_or_recover(&self.shared.upstream);
        self.shared.ring.clear();
        Ok(())
    }

    /// Stop the worker and release the buffer. Waits at most `dispose_timeout`
    /// for the worker; on timeout the thread is detached and cleanup proceeds.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.shared.stop.store(true, Ordering::Release);

        let timeout = self.shared.config.dispose_timeout();
        match self.worker_exited.recv_timeout(timeout) {
            Ok(()) => {
                if let Some(worker) = self.worker.take() {
                    if worker.join().is_err() {
                        warn!("PULL_STAGE: worker thread panicked");
                    }
                }
            }
            Err(_) => {
                warn!(
                    "{}: Worker did not exit within {:?}, detaching",
                    "PULL_STAGE".on_yellow().black(),
                    timeout
                );
                self.worker.take();
            }
        }

        self.shared.ring.clear();
        info!("{}: Disposed", "PULL_STAGE".on_blue().cyan());
    }
}

impl<S: WaveSource + 'static> WaveSource for PullBufferingStage<S> {
    fn format(&self) -> WaveFormat {
        self.format
    }

    /// Deliver `buffer.len()` bytes (rounded down to whole frames) unless the
    /// upstream reached end of stream first, in which case a short read is returned.
    fn read(&mut self, buffer: &mut [u8]) -> StreamResult<usize> {
        self.ensure_alive()?;

        let wanted = self.format.align_down(buffer.len());
        let mut total = 0;
        loop {
            total += self.shared.ring.read(&mut buffer[total..wanted]);
            if total >= wanted {
                break;
            }
            if self.shared.upstream_exhausted() {
                // The worker may have written its last chunk after our read above
                total += self.shared.ring.read(&mut buffer[total..wanted]);
                break;
            }
            std::thread::sleep(self.shared.config.reader_poll());
        }
        Ok(total)
    }

    /// Position of the reader, i.e. upstream position minus what is still prefetched
    fn position(&self) -> Option<u64> {
        let upstream = lock_or_recover(&self.shared.upstream);
        let position = upstream.position()?;
        Some(position.saturating_sub(self.shared.ring.buffered() as u64))
    }

    fn length(&self) -> Option<u64> {
        lock_or_recover(&self.shared.upstream).length()
    }

    fn set_position(&mut self, position: u64) -> StreamResult<()> {
        self.ensure_alive()?;
        let mut upstream = lock_or_recover(&self.shared.upstream);
        upstream.set_position(self.format.align_down(position as usize) as u64)?;
        self.shared.ring.clear();
        self.shared.empty_reads.store(0, Ordering::Release);
        debug!("⏩ PULL_STAGE: seek to byte {}, prefetch discarded", position);
        Ok(())
    }
}

impl<S: WaveSource + 'static> Drop for PullBufferingStage<S> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::MemoryWaveSource;
    use std::time::{Duration, Instant};

    fn fast_config() -> BufferingConfig {
        BufferingConfig {
            worker_idle_ms: 1,
            reader_poll_ms: 1,
            ..BufferingConfig::default()
        }
    }

    fn ramp_source(len: usize) -> MemoryWaveSource {
        let format = WaveFormat::pcm16(48000, 2).unwrap();
        MemoryWaveSource::new(format, (0..len).map(|i| (i % 256) as u8).collect())
    }

    #[test]
    fn test_reads_entire_upstream_in_order() {
        let mut stage = PullBufferingStage::new(ramp_source(4000), 1024, fast_config()).unwrap();
        let mut collected = Vec::new();
        let mut buf = [0u8; 300];
        loop {
            let n = stage.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }
        let expected: Vec<u8> = (0..4000).map(|i| (i % 256) as u8).collect();
        assert_eq!(collected, expected);
        assert!(stage.is_drained());
    }

    #[test]
    fn test_capacity_must_be_frame_aligned() {
        assert!(PullBufferingStage::new(ramp_source(16), 1022, fast_config()).is_err());
    }

    #[test]
    fn test_short_read_after_eof_does_not_hang() {
        let mut stage = PullBufferingStage::new(ramp_source(40), 1024, fast_config()).unwrap();
        let started = Instant::now();
        let mut buf = [0u8; 400];
        let n = stage.read(&mut buf).unwrap();
        assert_eq!(n, 40);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(stage.consecutive_empty_reads() >= 5);
    }

    #[test]
    fn test_seek_discards_prefetch() {
        let mut stage = PullBufferingStage::new(ramp_source(4000), 2048, fast_config()).unwrap();
        let mut buf = [0u8; 8];
        stage.read(&mut buf).unwrap();

        stage.set_position(1000).unwrap();
        assert_eq!(stage.read(&mut buf).unwrap(), 8);
        let expected: Vec<u8> = (1000..1008).map(|i| (i % 256) as u8).collect();
        assert_eq!(&buf[..], &expected[..]);
        assert_eq!(stage.length(), Some(4000));
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let no_high_water = BufferingConfig {
            high_water_fraction: 0.0,
            ..fast_config()
        };
        assert!(matches!(
            PullBufferingStage::new(ramp_source(64), 64, no_high_water),
            Err(StreamError::InvalidConfig(_))
        ));

        let no_retries = BufferingConfig {
            eof_retry_limit: 0,
            ..fast_config()
        };
        assert!(matches!(
            PullBufferingStage::new(ramp_source(64), 64, no_retries),
            Err(StreamError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_disposed_stage_rejects_calls() {
        let mut stage = PullBufferingStage::new(ramp_source(64), 64, fast_config()).unwrap();
        stage.dispose();
        let mut buf = [0u8; 4];
        assert!(matches!(stage.read(&mut buf), Err(StreamError::Disposed(_))));
        assert!(matches!(stage.reset_buffer(), Err(StreamError::Disposed(_))));
        assert!(matches!(stage.set_position(0), Err(StreamError::Disposed(_))));
        assert_eq!(stage.buffered(), 0);
    }
}
