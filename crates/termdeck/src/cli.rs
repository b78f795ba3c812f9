use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "termdeck", version, about = "Play a directory of audio files from the terminal")]
pub struct Args {
    /// Directory with the audio files to play (not searched recursively)
    #[arg(value_name = "MUSIC_DIR", required_unless_present = "list_devices")]
    pub music_dir: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Output queue target in seconds (also bounds how long a track switch waits)
    #[arg(long, default_value_t = 0.5)]
    pub buffer_seconds: f32,

    /// Playback callback refill cap (frames). Larger reduces lock churn but can add latency.
    #[arg(long, default_value_t = 4096)]
    pub refill_max_frames: usize,

    /// Resampler input chunk size in frames (higher => more latency, lower => more overhead)
    #[arg(long, default_value_t = 1024)]
    pub chunk_frames: usize,

    /// Maximum number of tracks loaded from the directory
    #[arg(long, default_value_t = 1000)]
    pub max_tracks: usize,

    /// Accepted file extension (repeatable); defaults to common audio formats
    #[arg(long = "ext", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Sort the playlist by file name instead of directory order
    #[arg(long)]
    pub sort: bool,

    /// Renderer poll interval in milliseconds while stopped or paused
    #[arg(long, default_value_t = 10)]
    pub idle_ms: u64,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
