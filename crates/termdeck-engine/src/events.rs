use std::path::PathBuf;

/// Notifications the player sends to the foreground loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayerEvent {
    NowPlaying { index: usize, track: PathBuf },
    Paused,
    Resumed,
    Stopped,
    /// A transport command arrived while nothing was playing.
    NothingPlaying,
    /// A track could not be opened; nothing is loaded afterwards.
    TrackFailed { track: PathBuf, error: String },
    /// The renderer hit a sink error and stopped.
    RenderFailed { error: String },
}
