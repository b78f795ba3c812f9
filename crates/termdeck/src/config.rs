use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use termdeck_engine::config::{EngineConfig, PlaybackConfig};
use termdeck_engine::playlist::ScanOptions;

use crate::cli::Args;

#[derive(Clone, Debug)]
pub struct PlayerConfig {
    pub music_dir: PathBuf,
    pub device: Option<String>,
    pub playback: PlaybackConfig,
    pub engine: EngineConfig,
    pub scan: ScanOptions,
}

impl PlayerConfig {
    pub fn from_args(args: &Args) -> Result<Self> {
        let music_dir = args
            .music_dir
            .clone()
            .ok_or_else(|| anyhow!("missing MUSIC_DIR"))?;

        let mut scan = ScanOptions {
            max_tracks: args.max_tracks,
            sort: args.sort,
            ..ScanOptions::default()
        };
        let extensions = normalize_extensions(&args.extensions);
        if !extensions.is_empty() {
            scan.extensions = extensions;
        }

        Ok(Self {
            music_dir,
            device: normalize_device_name(args.device.clone()),
            playback: PlaybackConfig {
                chunk_frames: args.chunk_frames,
                refill_max_frames: args.refill_max_frames,
                buffer_seconds: args.buffer_seconds,
            },
            engine: EngineConfig {
                idle_interval: Duration::from_millis(args.idle_ms.max(1)),
            },
            scan,
        })
    }
}

pub fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Strip leading dots and blanks; `--ext .FLAC` and `--ext flac` mean the same.
fn normalize_extensions(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|e| e.trim().trim_start_matches('.').to_string())
        .filter(|e| !e.is_empty())
        .collect()
}
