mod common;

use beat_stream_lib::audio::{
    MemoryWaveSource, SchedulerConfig, StreamError, StreamingVoice, VoiceConfig, VoiceScheduler,
    VoiceState, WaveFormat,
};
use common::{wait_until, FakeHardwareVoice};
use serial_test::serial;
use std::sync::Arc;

#[cfg(test)]
mod voice_scheduler_tests {
    use super::*;

    fn pcm16_source(bytes: usize) -> MemoryWaveSource {
        // 1 kHz mono, 10 ms buffers hold 20 bytes
        let format = WaveFormat::pcm16(1000, 1).unwrap();
        MemoryWaveSource::new(format, (0..bytes).map(|i| (i % 251) as u8).collect())
    }

    fn voice_config(looping: bool) -> VoiceConfig {
        VoiceConfig {
            buffer_duration_ms: 10,
            looping,
        }
    }

    #[test]
    fn test_refill_is_noop_with_three_buffers_queued() {
        let scheduler = Arc::new(VoiceScheduler::new(SchedulerConfig::default()));
        let hardware = FakeHardwareVoice::new();
        let voice =
            StreamingVoice::new(hardware.clone(), pcm16_source(2000), voice_config(false), scheduler)
                .unwrap();

        voice.start().unwrap();
        assert_eq!(hardware.submitted_count(), 3);
        for _ in 0..10 {
            assert!(!voice.refill().unwrap(), "refill beyond 3 queued buffers must be a no-op");
        }
        assert_eq!(hardware.submitted_count(), 3);
        assert_eq!(voice.queued_buffers(), 3);
    }

    #[test]
    fn test_scheduler_streams_whole_source_in_order() {
        let scheduler = Arc::new(VoiceScheduler::new(SchedulerConfig::default()));
        let hardware = FakeHardwareVoice::new();
        let source = pcm16_source(200);
        let expected: Vec<u8> = (0..200).map(|i| (i % 251) as u8).collect();
        let voice =
            StreamingVoice::new(hardware.clone(), source, voice_config(false), scheduler).unwrap();

        voice.start().unwrap();
        assert_eq!(voice.state(), VoiceState::Playing);

        // Play the queue out; every completion lets the scheduler refill one slot
        assert!(wait_until(|| {
            hardware.complete_next();
            voice.is_finished() && hardware.submitted_count() == 10
        }));

        let submitted = hardware.submitted.lock().unwrap();
        let streamed: Vec<u8> = submitted.iter().flat_map(|(_, data, _)| data.clone()).collect();
        assert_eq!(streamed, expected);
        let end_flags: Vec<bool> = submitted.iter().map(|(_, _, end)| *end).collect();
        assert_eq!(end_flags.iter().filter(|&&end| end).count(), 1);
        assert!(end_flags[9]);
    }

    #[test]
    fn test_stopped_voice_is_never_refilled() {
        let scheduler = Arc::new(VoiceScheduler::new(SchedulerConfig::default()));
        let hardware = FakeHardwareVoice::new();
        let voice = StreamingVoice::new(
            hardware.clone(),
            pcm16_source(2000),
            voice_config(true),
            scheduler.clone(),
        )
        .unwrap();

        voice.start().unwrap();
        voice.stop().unwrap();
        assert_eq!(scheduler.active_voices(), 0);
        assert_eq!(voice.state(), VoiceState::Stopped);
        assert_eq!(hardware.stopped.load(std::sync::atomic::Ordering::SeqCst), 1);

        let before = hardware.submitted_count();
        hardware.complete_next();
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!voice.refill().unwrap());
        assert_eq!(hardware.submitted_count(), before);
    }

    #[test]
    fn test_65th_voice_rejected_until_one_stops() {
        let scheduler = Arc::new(VoiceScheduler::new(SchedulerConfig::default()));
        let mut voices = Vec::new();
        for _ in 0..64 {
            let voice = StreamingVoice::new(
                FakeHardwareVoice::new(),
                pcm16_source(2000),
                voice_config(false),
                scheduler.clone(),
            )
            .unwrap();
            voice.start().unwrap();
            voices.push(voice);
        }
        assert_eq!(scheduler.active_voices(), 64);

        let extra = StreamingVoice::new(
            FakeHardwareVoice::new(),
            pcm16_source(2000),
            voice_config(false),
            scheduler.clone(),
        )
        .unwrap();
        assert!(matches!(extra.start(), Err(StreamError::SchedulerFull { max: 64 })));

        voices.remove(0).stop().unwrap();
        extra.start().unwrap();
        assert_eq!(scheduler.active_voices(), 64);
    }

    #[test]
    #[serial]
    fn test_shared_scheduler_is_process_wide() {
        let first = VoiceScheduler::shared();
        let second = VoiceScheduler::shared();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.max_active_voices(), 64);

        let voice = StreamingVoice::new(
            FakeHardwareVoice::new(),
            pcm16_source(2000),
            voice_config(false),
            VoiceScheduler::shared(),
        )
        .unwrap();
        let before = first.active_voices();
        voice.start().unwrap();
        assert_eq!(first.active_voices(), before + 1);
        drop(voice);
        assert_eq!(first.active_voices(), before);
    }
}
