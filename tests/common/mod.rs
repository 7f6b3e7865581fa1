// Shared test doubles for integration tests
#![allow(dead_code)]

use beat_stream_lib::audio::{
    CorrelationToken, HardwareVoice, StreamError, StreamResult, WaveFormat, WaveSource,
};
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Byte source that hands out `data` once, then reports end of stream forever.
/// Counts every read call so tests can see how often the upstream was polled.
pub struct TrickleSource {
    format: WaveFormat,
    data: Vec<u8>,
    offset: usize,
    chunk: usize,
    pub reads: Arc<AtomicUsize>,
    fail_after_data: bool,
    panic_after_data: bool,
}

impl TrickleSource {
    pub fn new(format: WaveFormat, data: Vec<u8>, chunk: usize) -> Self {
        Self {
            format,
            data,
            offset: 0,
            chunk,
            reads: Arc::new(AtomicUsize::new(0)),
            fail_after_data: false,
            panic_after_data: false,
        }
    }

    /// Return an error instead of end of stream once the data is used up
    pub fn failing(mut self) -> Self {
        self.fail_after_data = true;
        self
    }

    /// Panic inside `read` once the data is used up, like a decoder bug would
    pub fn panicking(mut self) -> Self {
        self.panic_after_data = true;
        self
    }
}

impl WaveSource for TrickleSource {
    fn format(&self) -> WaveFormat {
        self.format
    }

    fn read(&mut self, buffer: &mut [u8]) -> StreamResult<usize> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let remaining = self.data.len() - self.offset;
        if remaining == 0 && self.fail_after_data {
            return Err(StreamError::Upstream("device unplugged".to_string()));
        }
        if remaining == 0 && self.panic_after_data {
            panic!("decoder state corrupted");
        }
        let count = self
            .format
            .align_down(buffer.len().min(remaining).min(self.chunk));
        buffer[..count].copy_from_slice(&self.data[self.offset..self.offset + count]);
        self.offset += count;
        Ok(count)
    }
}

/// In-process stand-in for a platform voice.
///
/// Submitted buffers are recorded; `complete_next` plays the role of the
/// hardware finishing the oldest queued buffer.
#[derive(Clone)]
pub struct FakeHardwareVoice {
    pub submitted: Arc<Mutex<Vec<(CorrelationToken, Vec<u8>, bool)>>>,
    queue: Arc<Mutex<Vec<CorrelationToken>>>,
    completion_tx: Sender<CorrelationToken>,
    completion_rx: Receiver<CorrelationToken>,
    pub started: Arc<AtomicUsize>,
    pub stopped: Arc<AtomicUsize>,
}

impl FakeHardwareVoice {
    pub fn new() -> Self {
        let (completion_tx, completion_rx) = unbounded();
        Self {
            submitted: Arc::default(),
            queue: Arc::default(),
            completion_tx,
            completion_rx,
            started: Arc::default(),
            stopped: Arc::default(),
        }
    }

    /// Finish the oldest queued buffer and raise its completion signal
    pub fn complete_next(&self) -> Option<CorrelationToken> {
        let token = {
            let mut queue = self.queue.lock().unwrap();
            if queue.is_empty() {
                return None;
            }
            queue.remove(0)
        };
        self.completion_tx.send(token).ok()?;
        Some(token)
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

impl HardwareVoice for FakeHardwareVoice {
    fn submit_buffer(
        &mut self,
        data: &[u8],
        token: CorrelationToken,
        end_of_stream: bool,
    ) -> StreamResult<()> {
        self.submitted
            .lock()
            .unwrap()
            .push((token, data.to_vec(), end_of_stream));
        self.queue.lock().unwrap().push(token);
        Ok(())
    }

    fn queued_buffer_count(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    fn start(&mut self) -> StreamResult<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> StreamResult<()> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        self.queue.lock().unwrap().clear();
        Ok(())
    }

    fn completion_signal(&self) -> Receiver<CorrelationToken> {
        self.completion_rx.clone()
    }
}

/// Poll `condition` for up to two seconds
pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
    condition()
}
