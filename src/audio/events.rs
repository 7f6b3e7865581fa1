use crossbeam::channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use super::lock_or_recover;

/// Peak levels accumulated over one metering interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakEvent {
    /// Highest absolute sample per channel (0.0 to 1.0 for in-range audio)
    pub channel_peaks: Vec<f32>,
    /// Mean of `channel_peaks`
    pub average_peak: f32,
    /// Frames covered by this measurement
    pub frames: usize,
}

/// Raised once a fade has reached its target volume
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FadeFinishedEvent {
    pub target_volume: f32,
}

/// Raised by a notification stage after each processed read
#[derive(Debug, Clone, PartialEq)]
pub struct BlockReadEvent {
    /// Interleaved samples exactly as they left the stage
    pub samples: Vec<f32>,
    pub channels: usize,
}

/// Raised by a notification stage for every frame read
#[derive(Debug, Clone, PartialEq)]
pub struct SingleFrameEvent {
    /// One sample per channel
    pub frame: Vec<f32>,
}

/// Listener registration for stage notifications.
///
/// Each `subscribe` returns its own receiver, every emitted event is cloned to
/// every live subscriber, and subscribers whose receiver was dropped are
/// pruned on the next emit.
pub struct EventEmitter<E> {
    subscribers: Mutex<Vec<Sender<E>>>,
}

impl<E: Clone> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> Receiver<E> {
        let (tx, rx) = unbounded();
        lock_or_recover(&self.subscribers).push(tx);
        rx
    }

    pub fn has_subscribers(&self) -> bool {
        !lock_or_recover(&self.subscribers).is_empty()
    }

    pub fn emit(&self, event: E) {
        let mut subscribers = lock_or_recover(&self.subscribers);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl<E: Clone> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = lock_or_recover(&self.subscribers).len();
        f.debug_struct("EventEmitter")
            .field("subscribers", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_subscriber_receives_event() {
        let emitter = EventEmitter::new();
        let a = emitter.subscribe();
        let b = emitter.subscribe();

        emitter.emit(FadeFinishedEvent { target_volume: 1.0 });

        assert_eq!(a.try_recv().unwrap().target_volume, 1.0);
        assert_eq!(b.try_recv().unwrap().target_volume, 1.0);
        assert!(a.try_recv().is_err());
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let emitter = EventEmitter::new();
        let kept = emitter.subscribe();
        drop(emitter.subscribe());

        emitter.emit(FadeFinishedEvent { target_volume: 0.5 });
        assert!(emitter.has_subscribers());
        assert_eq!(lock_or_recover(&emitter.subscribers).len(), 1);
        assert!(kept.try_recv().is_ok());

        drop(kept);
        emitter.emit(FadeFinishedEvent { target_volume: 0.5 });
        assert!(!emitter.has_subscribers());
    }
}
