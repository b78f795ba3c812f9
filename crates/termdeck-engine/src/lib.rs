//! Playback engine for `termdeck`.
//!
//! The [`engine::Player`] controller owns the playlist and a lock-guarded
//! [`state::PlayerState`], and drives one renderer thread that pulls PCM from a
//! [`decode::Decoder`] and pushes it into an [`output::Sink`].

pub mod config;
pub mod decode;
pub mod device;
pub mod engine;
pub mod events;
pub mod output;
pub mod playlist;
pub mod queue;
pub mod resample;
pub mod state;

#[cfg(test)]
mod mock;
