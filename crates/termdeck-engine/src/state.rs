//! Player state shared between the controller and the renderer.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use crate::decode::Decoder;
use crate::output::{OutputControl, Sink};
use crate::playlist::Playlist;

/// Everything guarded by the player lock.
///
/// No adapter I/O, join, open or close happens while this is borrowed.
#[derive(Default)]
pub struct PlayerState {
    pub playing: bool,
    pub paused: bool,
    pub stop_requested: bool,
    pub shut_down: bool,
    pub output: Option<Arc<ActiveOutput>>,
    pub renderer: Option<JoinHandle<()>>,
    pub playlist: Playlist,
}

impl PlayerState {
    pub fn new(playlist: Playlist) -> Self {
        Self {
            playlist,
            ..Self::default()
        }
    }

    pub fn renderer_alive(&self) -> bool {
        self.renderer.as_ref().is_some_and(|h| !h.is_finished())
    }
}

/// An open decoder and the sink it feeds.
///
/// Both handles live and die together. The inner mutexes are only taken by
/// the one renderer that owns the snapshot, so they never contend. The
/// control flags are lock-free so the controller can hold or release the
/// sink while the renderer is blocked inside it.
pub struct ActiveOutput {
    track: PathBuf,
    control: Arc<OutputControl>,
    sink: Mutex<Box<dyn Sink>>,
    decoder: Mutex<Box<dyn Decoder>>,
}

impl ActiveOutput {
    pub fn new(
        track: PathBuf,
        decoder: Box<dyn Decoder>,
        sink: Box<dyn Sink>,
        control: Arc<OutputControl>,
    ) -> Self {
        Self {
            track,
            control,
            sink: Mutex::new(sink),
            decoder: Mutex::new(decoder),
        }
    }

    pub fn track(&self) -> &Path {
        &self.track
    }

    pub fn control(&self) -> &OutputControl {
        &self.control
    }

    pub fn decoder(&self) -> MutexGuard<'_, Box<dyn Decoder>> {
        self.decoder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn sink(&self) -> MutexGuard<'_, Box<dyn Sink>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close the sink, then the decoder.
    pub fn close(self) {
        let Self { track, sink, decoder, .. } = self;
        drop(sink);
        drop(decoder);
        tracing::debug!(track = %track.display(), "output closed");
    }
}

/// Close an output taken out of the state.
///
/// A renderer that is still finishing may hold the last other reference; in
/// that case it drops the pair (in field order, sink first) when it lets go.
pub fn close_output(output: Arc<ActiveOutput>) {
    match Arc::try_unwrap(output) {
        Ok(output) => output.close(),
        Err(shared) => {
            tracing::warn!(track = %shared.track.display(), "output still referenced; deferring close");
        }
    }
}

/// Point-in-time copy of the player state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlayerSnapshot {
    pub playing: bool,
    pub paused: bool,
    pub stop_requested: bool,
    pub shut_down: bool,
    pub has_output: bool,
    pub has_renderer: bool,
    pub renderer_alive: bool,
    pub active_renderers: usize,
    pub current: Option<usize>,
    pub track: Option<PathBuf>,
}

impl PlayerSnapshot {
    pub fn capture(state: &PlayerState, active_renderers: usize) -> Self {
        Self {
            playing: state.playing,
            paused: state.paused,
            stop_requested: state.stop_requested,
            shut_down: state.shut_down,
            has_output: state.output.is_some(),
            has_renderer: state.renderer.is_some(),
            renderer_alive: state.renderer_alive(),
            active_renderers,
            current: state.playlist.current_index(),
            track: state.playlist.current_track().map(Path::to_path_buf),
        }
    }
}
