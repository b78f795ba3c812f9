//! Playback controller and renderer loop.
//!
//! [`Player`] owns the lock-guarded [`PlayerState`] and at most one renderer
//! thread. The lock only ever covers flags and handles: decoder reads, sink
//! writes, adapter open/close and thread joins all run with it released.
//!
//! Two paths replace the active track:
//! - [`Player::switch_to`] (foreground) stops and joins the renderer, closes
//!   the old pair, opens the new one and starts a fresh renderer
//! - `Shared::auto_advance` (renderer, at end of stream) swaps the pair in
//!   place and never touches the renderer handle, so it can't join itself
//!
//! Only the end-of-stream path drains the sink before closing it. A
//! controller that tears an output down releases it first, so a renderer
//! blocked in `write` or `drain` returns and can be joined.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, bail};
use crossbeam_channel::{Receiver, Sender};

use crate::config::EngineConfig;
use crate::decode::{Chunk, DecoderFactory};
use crate::events::PlayerEvent;
use crate::output::{OutputControl, SinkFactory};
use crate::playlist::{Playlist, PlaylistListing};
use crate::state::{ActiveOutput, PlayerSnapshot, PlayerState, close_output};

/// Playback controller.
///
/// Dropping the player runs [`Player::shutdown`].
pub struct Player {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<PlayerState>,
    decoders: Arc<dyn DecoderFactory>,
    sinks: Arc<dyn SinkFactory>,
    events: Sender<PlayerEvent>,
    config: EngineConfig,
    active_renderers: AtomicUsize,
}

impl Player {
    pub fn new(
        playlist: Playlist,
        decoders: Arc<dyn DecoderFactory>,
        sinks: Arc<dyn SinkFactory>,
        config: EngineConfig,
    ) -> (Self, Receiver<PlayerEvent>) {
        let (events, rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared {
            state: Mutex::new(PlayerState::new(playlist)),
            decoders,
            sinks,
            events,
            config,
            active_renderers: AtomicUsize::new(0),
        });
        (Self { shared }, rx)
    }

    /// Stop whatever is playing and start track `index`.
    ///
    /// On failure nothing is loaded afterwards: no decoder, no sink, no
    /// renderer and `playing == false`.
    pub fn switch_to(&self, index: usize) -> Result<()> {
        let shared = &self.shared;
        let track = {
            let mut state = shared.lock();
            if state.shut_down {
                bail!("player is shut down");
            }
            let track = state.playlist.select(index)?.to_path_buf();
            state.stop_requested = true;
            if let Some(output) = &state.output {
                output.control().release();
            }
            track
        };

        let renderer = shared.lock().renderer.take();
        join_renderer(renderer);
        let old = shared.lock().output.take();
        if let Some(old) = old {
            close_output(old);
        }

        let output = match shared.open_output(&track) {
            Ok(output) => output,
            Err(e) => {
                {
                    let mut state = shared.lock();
                    state.playing = false;
                    state.paused = false;
                }
                tracing::error!(track = %track.display(), "cannot play track: {e:#}");
                shared.emit(PlayerEvent::TrackFailed {
                    track,
                    error: format!("{e:#}"),
                });
                return Err(e);
            }
        };

        {
            let mut state = shared.lock();
            if state.shut_down {
                drop(state);
                output.close();
                bail!("player is shut down");
            }
            state.playing = true;
            state.paused = false;
            state.stop_requested = false;
            state.output = Some(Arc::new(output));
        }
        tracing::info!(index, track = %track.display(), "now playing");
        shared.emit(PlayerEvent::NowPlaying {
            index,
            track: track.clone(),
        });

        let worker = shared.clone();
        match thread::Builder::new()
            .name("renderer".into())
            .spawn(move || render_loop(worker))
        {
            Ok(handle) => {
                shared.lock().renderer = Some(handle);
                Ok(())
            }
            Err(e) => {
                let output = {
                    let mut state = shared.lock();
                    state.playing = false;
                    state.output.take()
                };
                if let Some(output) = output {
                    close_output(output);
                }
                shared.emit(PlayerEvent::TrackFailed {
                    track,
                    error: e.to_string(),
                });
                Err(e).context("spawn renderer thread")
            }
        }
    }

    /// Flip pause. Returns the new paused state, or `None` when nothing is
    /// playing (including a renderer that died on a sink error).
    pub fn pause_toggle(&self) -> Option<bool> {
        let paused = {
            let mut state = self.shared.lock();
            if !state.playing || !state.renderer_alive() {
                None
            } else {
                state.paused = !state.paused;
                // No output while auto-advance is opening the next track;
                // the flag is applied when it is installed.
                if let Some(output) = &state.output {
                    output.control().set_hold(state.paused);
                }
                Some(state.paused)
            }
        };
        match paused {
            Some(true) => self.shared.emit(PlayerEvent::Paused),
            Some(false) => self.shared.emit(PlayerEvent::Resumed),
            None => self.shared.emit(PlayerEvent::NothingPlaying),
        }
        tracing::debug!(?paused, "pause toggled");
        paused
    }

    /// Stop rendering. The decoder, sink and parked renderer stay open until
    /// the next switch or shutdown.
    pub fn stop(&self) {
        {
            let mut state = self.shared.lock();
            state.playing = false;
            state.paused = false;
            if let Some(output) = &state.output {
                output.control().set_hold(true);
            }
        }
        tracing::info!("playback stopped");
        self.shared.emit(PlayerEvent::Stopped);
    }

    pub fn next(&self) -> Result<()> {
        let index = self.shared.lock().playlist.advance();
        match index {
            Some(index) => self.switch_to(index),
            None => Ok(()),
        }
    }

    pub fn previous(&self) -> Result<()> {
        let index = self.shared.lock().playlist.retreat();
        match index {
            Some(index) => self.switch_to(index),
            None => Ok(()),
        }
    }

    /// Stop the renderer, close the sink then the decoder, and release the
    /// playlist. Safe to call any number of times.
    pub fn shutdown(&self) {
        let renderer = {
            let mut state = self.shared.lock();
            if state.shut_down && state.renderer.is_none() && state.output.is_none() {
                return;
            }
            state.stop_requested = true;
            state.shut_down = true;
            state.playing = false;
            state.paused = false;
            if let Some(output) = &state.output {
                output.control().release();
            }
            state.renderer.take()
        };
        join_renderer(renderer);

        let output = self.shared.lock().output.take();
        if let Some(output) = output {
            close_output(output);
        }
        self.shared.lock().playlist.clear();
        tracing::info!("player shut down");
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        let state = self.shared.lock();
        PlayerSnapshot::capture(&state, self.shared.active_renderers.load(Ordering::SeqCst))
    }

    pub fn playlist_listing(&self) -> PlaylistListing {
        self.shared.lock().playlist.listing()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PlayerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: PlayerEvent) {
        self.events.send(event).ok();
    }

    /// Open a decoder for `track` and a sink in its format.
    ///
    /// A decoder opened before a failing sink open is dropped on return.
    fn open_output(&self, track: &Path) -> Result<ActiveOutput> {
        let decoder = self.decoders.open(track)?;
        let format = decoder
            .format()
            .with_context(|| format!("read stream format of {}", track.display()))?;
        tracing::debug!(
            track = %track.display(),
            rate_hz = format.sample_rate,
            channels = format.channels,
            codec = format.codec.as_deref().unwrap_or("unknown"),
            "stream format"
        );
        let control = Arc::new(OutputControl::default());
        let sink = self.sinks.open(&format, control.clone()).context("open output")?;
        Ok(ActiveOutput::new(track.to_path_buf(), decoder, sink, control))
    }

    /// End-of-stream transition, run on the renderer thread.
    ///
    /// Never joins or replaces the renderer. Backs off as soon as a
    /// controller switch or shutdown has raised `stop_requested`, and never
    /// clears that flag itself. `playing` and `paused` are left alone while
    /// the next track opens, so a stop or pause issued meanwhile is applied
    /// to the new output.
    fn auto_advance(&self) {
        let (index, track, old) = {
            let mut state = self.lock();
            if state.stop_requested {
                return;
            }
            let Some(index) = state.playlist.advance() else {
                return;
            };
            let Some(track) = state.playlist.current_track().map(Path::to_path_buf) else {
                return;
            };
            (index, track, state.output.take())
        };
        if let Some(old) = old {
            close_output(old);
        }

        let opened = self.open_output(&track);

        let mut state = self.lock();
        if state.stop_requested {
            drop(state);
            if let Ok(output) = opened {
                output.close();
            }
            return;
        }
        match opened {
            Ok(output) => {
                let playing = state.playing;
                output.control().set_hold(state.paused || !playing);
                state.output = Some(Arc::new(output));
                drop(state);
                if playing {
                    tracing::info!(index, track = %track.display(), "now playing");
                    self.emit(PlayerEvent::NowPlaying { index, track });
                } else {
                    tracing::debug!(index, track = %track.display(), "track loaded while stopped");
                }
            }
            Err(e) => {
                state.playing = false;
                state.paused = false;
                drop(state);
                tracing::error!(track = %track.display(), "cannot advance: {e:#}");
                self.emit(PlayerEvent::TrackFailed {
                    track,
                    error: format!("{e:#}"),
                });
            }
        }
    }
}

/// What the renderer does next, decided under the lock.
enum RenderStep {
    Stop,
    Idle,
    Render(Arc<ActiveOutput>),
}

impl RenderStep {
    fn from_state(state: &PlayerState) -> Self {
        if state.stop_requested {
            return Self::Stop;
        }
        match &state.output {
            Some(output) if state.playing && !state.paused => Self::Render(output.clone()),
            _ => Self::Idle,
        }
    }
}

/// Counts live renderers for the snapshot.
struct RendererGuard<'a>(&'a AtomicUsize);

impl<'a> RendererGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for RendererGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn render_loop(shared: Arc<Shared>) {
    let _guard = RendererGuard::enter(&shared.active_renderers);
    tracing::debug!("renderer started");

    loop {
        let step = RenderStep::from_state(&shared.lock());
        let output = match step {
            RenderStep::Stop => break,
            RenderStep::Idle => {
                thread::sleep(shared.config.idle_interval);
                continue;
            }
            RenderStep::Render(output) => output,
        };

        let chunk = output.decoder().read();
        match chunk {
            Ok(Chunk::Pcm(samples)) => {
                let written = output.sink().write(&samples);
                if let Err(e) = written {
                    tracing::error!(track = %output.track().display(), "output write failed: {e:#}");
                    drop(output);
                    shared.lock().playing = false;
                    shared.emit(PlayerEvent::RenderFailed {
                        error: format!("{e:#}"),
                    });
                    break;
                }
            }
            Ok(Chunk::EndOfStream) => {
                tracing::debug!(track = %output.track().display(), "end of stream");
                finish_track(&shared, output);
            }
            Err(e) => {
                tracing::warn!(track = %output.track().display(), "decode error, skipping track: {e:#}");
                finish_track(&shared, output);
            }
        }
    }
    tracing::debug!("renderer exiting");
}

/// Let the sink play out what it has buffered, then move to the next track.
fn finish_track(shared: &Shared, output: Arc<ActiveOutput>) {
    let drained = output.sink().drain();
    if let Err(e) = drained {
        tracing::warn!(track = %output.track().display(), "drain failed: {e:#}");
    }
    drop(output);
    shared.auto_advance();
}

fn join_renderer(handle: Option<JoinHandle<()>>) {
    if let Some(handle) = handle
        && handle.join().is_err()
    {
        tracing::error!("renderer thread panicked");
    }
}
