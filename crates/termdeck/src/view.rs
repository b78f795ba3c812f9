//! Text shown to the user.

use termdeck_engine::events::PlayerEvent;
use termdeck_engine::playlist::{PlaylistListing, display_name};

pub const TITLE: &str = "==================== termdeck ====================";

pub fn controls() -> Vec<String> {
    [
        "",
        "======== CONTROLS ========",
        "SPACE - Play/Pause",
        "n     - Next song",
        "p     - Previous song",
        "l     - List playlist",
        "s     - Stop",
        "q     - Quit",
        "==========================",
        "",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Numbered playlist, current track marked with `->`.
pub fn playlist(listing: &PlaylistListing) -> Vec<String> {
    let mut lines = vec![String::new(), "==================== PLAYLIST ====================".to_string()];
    if listing.names.is_empty() {
        lines.push("No songs in playlist".to_string());
    }
    for (i, name) in listing.names.iter().enumerate() {
        let marker = if listing.current == Some(i) { "->" } else { "  " };
        lines.push(format!("{marker} {}. {name}", i + 1));
    }
    lines.push("==================================================".to_string());
    lines.push(String::new());
    lines
}

/// One status line per player event.
pub fn event_line(event: &PlayerEvent) -> String {
    match event {
        PlayerEvent::NowPlaying { index, track } => {
            format!("Now playing: {}. {}", index + 1, display_name(track))
        }
        PlayerEvent::Paused => "Paused".to_string(),
        PlayerEvent::Resumed => "Resumed".to_string(),
        PlayerEvent::Stopped => "Stopped".to_string(),
        PlayerEvent::NothingPlaying => "Nothing is playing".to_string(),
        PlayerEvent::TrackFailed { track, error } => {
            format!("Error: cannot play {}: {error}", display_name(track))
        }
        PlayerEvent::RenderFailed { error } => format!("Playback error: {error}"),
    }
}
