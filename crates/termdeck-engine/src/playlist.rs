//! Playlist cursor and the directory scan that builds it.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

/// Ordered tracks plus a cursor.
///
/// `current` is a valid index whenever the playlist is non-empty; navigation
/// wraps modulo the track count.
#[derive(Clone, Debug, Default)]
pub struct Playlist {
    tracks: Vec<PathBuf>,
    current: usize,
}

impl Playlist {
    pub fn new(tracks: Vec<PathBuf>) -> Self {
        Self { tracks, current: 0 }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Path> {
        self.tracks.get(index).map(PathBuf::as_path)
    }

    pub fn current_index(&self) -> Option<usize> {
        (!self.is_empty()).then_some(self.current)
    }

    pub fn current_track(&self) -> Option<&Path> {
        self.get(self.current)
    }

    /// Move the cursor forward one track, wrapping at the end.
    pub fn advance(&mut self) -> Option<usize> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        self.current = (self.current + 1) % len;
        Some(self.current)
    }

    /// Move the cursor back one track, wrapping at the start.
    pub fn retreat(&mut self) -> Option<usize> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        self.current = (self.current + len - 1) % len;
        Some(self.current)
    }

    /// Point the cursor at `index`.
    pub fn select(&mut self, index: usize) -> Result<&Path> {
        if index >= self.len() {
            return Err(anyhow!(
                "track {} is out of range (playlist has {} tracks)",
                index + 1,
                self.len()
            ));
        }
        self.current = index;
        Ok(&self.tracks[index])
    }

    /// Drop every track.
    pub fn clear(&mut self) {
        self.tracks = Vec::new();
        self.current = 0;
    }

    pub fn listing(&self) -> PlaylistListing {
        PlaylistListing {
            names: self.tracks.iter().map(|p| display_name(p)).collect(),
            current: self.current_index(),
        }
    }
}

/// Display names plus the cursor, copied out for printing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaylistListing {
    pub names: Vec<String>,
    pub current: Option<usize>,
}

/// File name used when showing a track to the user.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Directory scan settings.
#[derive(Clone, Debug)]
pub struct ScanOptions {
    /// Accepted file extensions, compared case-insensitively, without the dot.
    pub extensions: Vec<String>,
    /// Stop after this many tracks.
    pub max_tracks: usize,
    /// Entries whose full path is longer than this (in bytes) are skipped.
    pub max_path_len: usize,
    /// Sort by file name instead of keeping directory order.
    pub sort: bool,
}

pub const DEFAULT_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "ogg", "m4a", "aiff", "aif"];

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            max_tracks: 1000,
            max_path_len: 512,
            sort: false,
        }
    }
}

/// An entry the scan had to leave out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of scanning one directory.
#[derive(Clone, Debug, Default)]
pub struct ScanReport {
    pub tracks: Vec<PathBuf>,
    pub skipped: Vec<SkippedEntry>,
    /// The scan stopped at `max_tracks`.
    pub truncated: bool,
}

/// List playable files directly inside `dir` (non-recursive).
///
/// Failing to open `dir` is an error; an empty result is not. Per-entry
/// problems are logged and recorded in [`ScanReport::skipped`].
pub fn scan_dir(dir: &Path, options: &ScanOptions) -> Result<ScanReport> {
    let entries = fs::read_dir(dir).with_context(|| format!("cannot open directory {}", dir.display()))?;
    let mut report = ScanReport::default();

    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), "unreadable directory entry: {e}");
                report.skipped.push(SkippedEntry {
                    path: dir.to_path_buf(),
                    reason: format!("unreadable entry: {e}"),
                });
                continue;
            }
        };
        let path = entry.path();
        if !has_audio_extension(&path, &options.extensions) || !path.is_file() {
            continue;
        }
        if report.tracks.len() >= options.max_tracks {
            report.truncated = true;
            tracing::warn!(max_tracks = options.max_tracks, "playlist limit reached");
            break;
        }

        let path_len = path.as_os_str().len();
        if path_len > options.max_path_len {
            tracing::warn!(path = %path.display(), path_len, "path too long, skipping");
            report.skipped.push(SkippedEntry {
                path,
                reason: format!("path too long ({path_len} > {} bytes)", options.max_path_len),
            });
            continue;
        }
        report.tracks.push(path);
    }

    if options.sort {
        report
            .tracks
            .sort_by_key(|p| p.file_name().map(|n| n.to_string_lossy().to_lowercase()));
    }
    tracing::info!(dir = %dir.display(), count = report.tracks.len(), "playlist scanned");
    Ok(report)
}

fn has_audio_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracks(names: &[&str]) -> Playlist {
        Playlist::new(names.iter().map(PathBuf::from).collect())
    }

    /// Fresh, empty directory under the system temp dir.
    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("termdeck-scan-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn empty_playlist_has_no_cursor() {
        let mut p = Playlist::default();
        assert_eq!(p.current_index(), None);
        assert_eq!(p.advance(), None);
        assert_eq!(p.retreat(), None);
        assert!(p.current_track().is_none());
    }

    #[test]
    fn next_wraps_through_three_tracks() {
        let mut p = tracks(&["A.mp3", "B.mp3", "C.mp3"]);
        assert_eq!(p.current_index(), Some(0));
        assert_eq!(p.advance(), Some(1));
        assert_eq!(p.advance(), Some(2));
        assert_eq!(p.advance(), Some(0));
        assert_eq!(p.current_track(), Some(Path::new("A.mp3")));
    }

    #[test]
    fn previous_wraps_to_last_track() {
        let mut p = tracks(&["A.mp3", "B.mp3", "C.mp3"]);
        assert_eq!(p.retreat(), Some(2));
        assert_eq!(p.retreat(), Some(1));
    }

    #[test]
    fn cursor_follows_modulo_arithmetic() {
        for n in 1..=7usize {
            let names: Vec<String> = (0..n).map(|i| format!("{i}.mp3")).collect();
            for c0 in 0..n {
                for k in 0..(3 * n) {
                    let mut p = Playlist::new(names.iter().map(PathBuf::from).collect());
                    p.select(c0).unwrap();
                    for _ in 0..k {
                        p.advance();
                    }
                    assert_eq!(p.current_index(), Some((c0 + k) % n));
                    for _ in 0..k {
                        p.retreat();
                    }
                    assert_eq!(p.current_index(), Some(c0));
                }
            }
        }
    }

    #[test]
    fn select_rejects_out_of_range() {
        let mut p = tracks(&["A.mp3"]);
        assert!(p.select(1).is_err());
        assert_eq!(p.current_index(), Some(0));
    }

    #[test]
    fn clear_releases_tracks() {
        let mut p = tracks(&["A.mp3", "B.mp3"]);
        p.advance();
        p.clear();
        assert!(p.is_empty());
        assert_eq!(p.current_index(), None);
    }

    #[test]
    fn listing_marks_cursor() {
        let mut p = tracks(&["/m/A.mp3", "/m/B.flac"]);
        p.advance();
        let listing = p.listing();
        assert_eq!(listing.names, vec!["A.mp3", "B.flac"]);
        assert_eq!(listing.current, Some(1));
    }

    #[test]
    fn display_name_uses_file_name() {
        assert_eq!(display_name(Path::new("/music/a/Song.mp3")), "Song.mp3");
        assert_eq!(display_name(Path::new("/")), "/");
    }

    #[test]
    fn scan_filters_extensions_case_insensitively() {
        let dir = scratch_dir("filter");
        for name in ["a.mp3", "B.MP3", "c.Flac", "notes.txt", "mp3"] {
            fs::write(dir.join(name), b"x").unwrap();
        }
        fs::create_dir(dir.join("folder.mp3")).unwrap();

        let report = scan_dir(&dir, &ScanOptions { sort: true, ..ScanOptions::default() }).unwrap();
        let names: Vec<String> = report.tracks.iter().map(|p| display_name(p)).collect();
        assert_eq!(names, vec!["a.mp3", "B.MP3", "c.Flac"]);
        assert!(report.skipped.is_empty());
        assert!(!report.truncated);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn scan_caps_track_count() {
        let dir = scratch_dir("cap");
        for i in 0..5 {
            fs::write(dir.join(format!("{i}.mp3")), b"x").unwrap();
        }
        let options = ScanOptions {
            max_tracks: 3,
            ..ScanOptions::default()
        };
        let report = scan_dir(&dir, &options).unwrap();
        assert_eq!(report.tracks.len(), 3);
        assert!(report.truncated);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn scan_skips_overlong_paths() {
        let dir = scratch_dir("long");
        fs::write(dir.join("short.mp3"), b"x").unwrap();
        let long_name = format!("{}.mp3", "x".repeat(60));
        fs::write(dir.join(&long_name), b"x").unwrap();

        let limit = dir.join("short.mp3").as_os_str().len();
        let options = ScanOptions {
            max_path_len: limit,
            ..ScanOptions::default()
        };
        let report = scan_dir(&dir, &options).unwrap();
        assert_eq!(report.tracks, vec![dir.join("short.mp3")]);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].reason.contains("too long"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn scan_of_empty_dir_is_ok_and_empty() {
        let dir = scratch_dir("empty");
        let report = scan_dir(&dir, &ScanOptions::default()).unwrap();
        assert!(report.tracks.is_empty());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn scan_of_missing_dir_is_an_error() {
        let dir = std::env::temp_dir().join(format!("termdeck-scan-{}-missing", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let err = scan_dir(&dir, &ScanOptions::default()).unwrap_err();
        assert!(format!("{err:#}").contains("cannot open directory"));
    }
}
