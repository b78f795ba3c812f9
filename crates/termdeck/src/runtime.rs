//! Startup, the foreground command loop and shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use crossbeam_channel::Receiver;
use termdeck_engine::decode::SymphoniaDecoderFactory;
use termdeck_engine::device;
use termdeck_engine::engine::Player;
use termdeck_engine::events::PlayerEvent;
use termdeck_engine::output::CpalSinkFactory;
use termdeck_engine::playlist::{self, Playlist, ScanReport};

use crate::commands::Command;
use crate::config::PlayerConfig;
use crate::terminal::{self, Console, TerminalGuard};
use crate::view;

/// How long the foreground loop waits for a key before checking events and
/// the quit flag again.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Scan the music directory, then play it until the user quits or a
/// termination signal arrives.
pub fn run(config: PlayerConfig) -> Result<()> {
    let report = playlist::scan_dir(&config.music_dir, &config.scan)?;
    let mut console = Console::stdout();
    for line in scan_warnings(&report, config.scan.max_tracks) {
        console.line(&line)?;
    }
    if report.tracks.is_empty() {
        bail!("No audio files found in directory: {}", config.music_dir.display());
    }
    console.line(&format!(
        "Loaded {} audio files from {}",
        report.tracks.len(),
        config.music_dir.display()
    ))?;

    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit = quit.clone();
        ctrlc::set_handler(move || quit.store(true, Ordering::SeqCst))
            .context("install signal handler")?;
    }

    let (player, events) = Player::new(
        Playlist::new(report.tracks),
        Arc::new(SymphoniaDecoderFactory),
        Arc::new(CpalSinkFactory::new(config.device.clone(), config.playback.clone())),
        config.engine.clone(),
    );

    let terminal = TerminalGuard::enter()?;
    console.line(view::TITLE)?;
    console.lines(view::controls())?;
    console.lines(view::playlist(&player.playlist_listing()))?;
    if let Err(e) = player.switch_to(0) {
        tracing::debug!("first track failed: {e:#}");
    }

    let result = command_loop(&player, &events, &quit, &mut console);

    player.shutdown();
    print_events(&events, &mut console)?;
    drop(terminal);
    println!("Goodbye");
    result
}

fn command_loop(
    player: &Player,
    events: &Receiver<PlayerEvent>,
    quit: &AtomicBool,
    console: &mut Console<std::io::Stdout>,
) -> Result<()> {
    loop {
        print_events(events, console)?;
        if quit.load(Ordering::SeqCst) {
            tracing::info!("termination signal received");
            return Ok(());
        }

        let Some(key) = terminal::poll_key(POLL_INTERVAL)? else {
            continue;
        };
        let Some(command) = Command::from_key(&key) else {
            continue;
        };
        tracing::debug!(?command, "command");

        match command {
            Command::Quit => return Ok(()),
            Command::PauseToggle => {
                player.pause_toggle();
            }
            Command::Next => {
                if let Err(e) = player.next() {
                    tracing::debug!("next failed: {e:#}");
                }
            }
            Command::Previous => {
                if let Err(e) = player.previous() {
                    tracing::debug!("previous failed: {e:#}");
                }
            }
            Command::List => console.lines(view::playlist(&player.playlist_listing()))?,
            Command::Stop => player.stop(),
        }
    }
}

fn print_events(events: &Receiver<PlayerEvent>, console: &mut Console<std::io::Stdout>) -> Result<()> {
    for event in events.try_iter() {
        console.line(&view::event_line(&event))?;
    }
    Ok(())
}

fn scan_warnings(report: &ScanReport, max_tracks: usize) -> Vec<String> {
    let mut lines: Vec<String> = report
        .skipped
        .iter()
        .map(|s| format!("Warning: skipping {}: {}", s.path.display(), s.reason))
        .collect();
    if report.truncated {
        lines.push(format!("Warning: playlist limit reached, only the first {max_tracks} files were loaded"));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use termdeck_engine::playlist::SkippedEntry;

    #[test]
    fn scan_warnings_report_skips_and_truncation() {
        let report = ScanReport {
            tracks: vec![PathBuf::from("/m/a.mp3")],
            skipped: vec![SkippedEntry {
                path: PathBuf::from("/m/long.mp3"),
                reason: "path too long (600 > 512 bytes)".into(),
            }],
            truncated: true,
        };
        let lines = scan_warnings(&report, 1);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("/m/long.mp3"));
        assert!(lines[1].contains("first 1 files"));
    }

    #[test]
    fn clean_scan_has_no_warnings() {
        assert!(scan_warnings(&ScanReport::default(), 1000).is_empty());
    }
}
