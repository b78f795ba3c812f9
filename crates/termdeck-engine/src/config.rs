use std::time::Duration;

/// Output tuning parameters used by the cpal sink.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Resampler input chunk size in frames.
    pub chunk_frames: usize,
    /// Max frames pulled per output callback refill.
    pub refill_max_frames: usize,
    /// Target duration of the sink queue.
    ///
    /// This also bounds how long a renderer can stay blocked in a write,
    /// and therefore how long a track switch waits for the join.
    pub buffer_seconds: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            refill_max_frames: 4096,
            buffer_seconds: 0.5,
        }
    }
}

/// Renderer loop tuning.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Sleep between state checks while stopped or paused.
    pub idle_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_millis(10),
        }
    }
}
