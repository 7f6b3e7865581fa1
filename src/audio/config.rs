// Streaming configuration
//
// Every tuning constant of the buffering stages, voices, scheduler and meter
// lives here with its default. Configurations can be loaded from a JSON file
// and are validated before use.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upper bound imposed by the multiplexed wait primitive
pub const MAX_WAIT_HANDLES: usize = 64;

/// Number of native buffers rotated per voice
pub const VOICE_BUFFER_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferingConfig {
    /// Fill fraction above which the pull worker idles
    pub high_water_fraction: f32,
    /// Consecutive zero-byte upstream reads treated as end of stream
    pub eof_retry_limit: usize,
    /// Worker sleep when the ring is above the high-water mark
    pub worker_idle_ms: u64,
    /// Reader sleep while waiting for the worker to catch up
    pub reader_poll_ms: u64,
    /// How long dispose() waits for the worker thread
    pub dispose_timeout_ms: u64,
    /// Largest single pull from upstream
    pub scratch_buffer_bytes: usize,
}

impl Default for BufferingConfig {
    fn default() -> Self {
        Self {
            high_water_fraction: 0.85,
            eof_retry_limit: 5,
            worker_idle_ms: 10,
            reader_poll_ms: 1,
            dispose_timeout_ms: 500,
            scratch_buffer_bytes: 16 * 1024,
        }
    }
}

impl BufferingConfig {
    pub fn worker_idle(&self) -> Duration {
        Duration::from_millis(self.worker_idle_ms)
    }

    pub fn reader_poll(&self) -> Duration {
        Duration::from_millis(self.reader_poll_ms)
    }

    pub fn dispose_timeout(&self) -> Duration {
        Duration::from_millis(self.dispose_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.high_water_fraction > 0.0 && self.high_water_fraction <= 1.0) {
            return Err(anyhow::anyhow!(
                "Invalid high water fraction: {} (must be within (0, 1])",
                self.high_water_fraction
            ));
        }
        if self.eof_retry_limit == 0 {
            return Err(anyhow::anyhow!("EOF retry limit must be at least 1"));
        }
        if self.worker_idle_ms == 0 || self.reader_poll_ms == 0 {
            return Err(anyhow::anyhow!("Worker idle and reader poll intervals must be positive"));
        }
        if self.scratch_buffer_bytes == 0 {
            return Err(anyhow::anyhow!("Scratch buffer size must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_active_voices: usize,
    /// Bounded wait on the completion signals
    pub poll_timeout_ms: u64,
    /// Sleep when no voice is registered
    pub idle_sleep_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_active_voices: MAX_WAIT_HANDLES,
            poll_timeout_ms: 20,
            idle_sleep_ms: 5,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_active_voices == 0 || self.max_active_voices > MAX_WAIT_HANDLES {
            return Err(anyhow::anyhow!(
                "Invalid max active voices: {} (must be 1-{})",
                self.max_active_voices,
                MAX_WAIT_HANDLES
            ));
        }
        if self.poll_timeout_ms == 0 || self.idle_sleep_ms == 0 {
            return Err(anyhow::anyhow!("Scheduler poll timeout and idle sleep must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Audio held by each of the rotating buffers
    pub buffer_duration_ms: u64,
    pub looping: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            buffer_duration_ms: 100,
            looping: false,
        }
    }
}

impl VoiceConfig {
    pub fn buffer_duration(&self) -> Duration {
        Duration::from_millis(self.buffer_duration_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_duration_ms == 0 || self.buffer_duration_ms > 10_000 {
            return Err(anyhow::anyhow!(
                "Invalid voice buffer duration: {}ms (must be 1-10000ms)",
                self.buffer_duration_ms
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeteringConfig {
    pub interval_ms: u64,
}

impl Default for MeteringConfig {
    fn default() -> Self {
        Self { interval_ms: 250 }
    }
}

impl MeteringConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(anyhow::anyhow!("Metering interval must be positive"));
        }
        Ok(())
    }
}

/// Top-level configuration for the streaming core
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub buffering: BufferingConfig,
    pub scheduler: SchedulerConfig,
    pub voice: VoiceConfig,
    pub metering: MeteringConfig,
}

impl StreamingConfig {
    /// Load and validate a JSON configuration file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read streaming config {}", path.display()))?;
        let config: StreamingConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse streaming config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.buffering.validate().context("buffering")?;
        self.scheduler.validate().context("scheduler")?;
        self.voice.validate().context("voice")?;
        self.metering.validate().context("metering")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = StreamingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffering.high_water_fraction, 0.85);
        assert_eq!(config.buffering.eof_retry_limit, 5);
        assert_eq!(config.scheduler.max_active_voices, 64);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "buffering": {{ "eof_retry_limit": 8 }}, "voice": {{ "looping": true }} }}"#
        )
        .unwrap();

        let config = StreamingConfig::load(file.path()).unwrap();
        assert_eq!(config.buffering.eof_retry_limit, 8);
        assert_eq!(config.buffering.high_water_fraction, 0.85);
        assert!(config.voice.looping);
        assert_eq!(config.voice.buffer_duration_ms, 100);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = StreamingConfig::default();
        config.scheduler.max_active_voices = 65;
        assert!(config.validate().is_err());

        let mut config = StreamingConfig::default();
        config.buffering.high_water_fraction = 1.5;
        assert!(config.validate().is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "buffering": {{ "eof_retry_limit": 0 }} }}"#).unwrap();
        assert!(StreamingConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = StreamingConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(format!("{:#}", err).contains("here.json"));
    }
}
