//! Bounded sample queue between a sink's `write` and the cpal callback.
//!
//! The writer side blocks when the queue is full (this is what paces the
//! renderer to real time). The callback side never blocks: it takes whatever
//! is buffered, up to a cap, and the caller fills the rest with silence.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Thread-safe bounded queue of interleaved `f32` samples.
///
/// The `closed` flag lives under the same mutex as the samples so a writer
/// waiting for room can never miss a close.
pub struct SharedAudio {
    channels: usize,
    max_buffered_samples: usize,
    inner: Mutex<SharedInner>,
    cv: Condvar,
}

struct SharedInner {
    queue: VecDeque<f32>,
    closed: bool,
}

/// Queue capacity in samples for `seconds` of audio at `rate_hz`.
///
/// Non-finite or non-positive durations fall back to half a second. The
/// result always holds at least one frame.
pub fn calc_max_buffered_samples(rate_hz: u32, channels: usize, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        0.5
    };
    let frames = ((rate_hz as f32 * secs).ceil() as usize).max(1);
    frames.saturating_mul(channels.max(1))
}

impl SharedAudio {
    pub fn new(channels: usize, max_buffered_samples: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            max_buffered_samples: max_buffered_samples.max(channels),
            inner: Mutex::new(SharedInner {
                queue: VecDeque::new(),
                closed: false,
            }),
            cv: Condvar::new(),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Capacity in frames.
    pub fn max_frames(&self) -> usize {
        self.max_buffered_samples / self.channels
    }

    /// Buffered frames right now (best-effort).
    pub fn len_frames(&self) -> usize {
        self.lock().queue.len() / self.channels
    }

    /// Mark the queue closed and wake every waiter. Idempotent.
    pub fn close(&self) {
        self.lock().closed = true;
        self.cv.notify_all();
    }

    /// Append samples, waiting for room while the queue is full.
    ///
    /// Returns `false` if the queue was closed or `cancel` was raised before
    /// every sample was accepted; the remainder is dropped.
    pub fn push_interleaved_blocking(&self, samples: &[f32], cancel: &AtomicBool) -> bool {
        let mut offset = 0;
        while offset < samples.len() {
            let mut g = self.lock();
            while g.queue.len() >= self.max_buffered_samples && !g.closed {
                if cancel.load(Ordering::Relaxed) {
                    return false;
                }
                g = self.wait(g);
            }
            if g.closed {
                return false;
            }
            let room = self.max_buffered_samples - g.queue.len();
            let take = room.min(samples.len() - offset);
            g.queue.extend(&samples[offset..offset + take]);
            offset += take;
            drop(g);
            self.cv.notify_all();
        }
        true
    }

    /// Block until the consumer has taken everything, the queue is closed,
    /// or `cancel` is raised.
    ///
    /// Returns `true` if the queue drained (or was closed), `false` if cancelled.
    pub fn wait_until_empty_or_cancel(&self, cancel: &AtomicBool) -> bool {
        let mut g = self.lock();
        loop {
            if cancel.load(Ordering::Relaxed) {
                return false;
            }
            if g.closed || g.queue.is_empty() {
                return true;
            }
            g = self.wait(g);
        }
    }

    /// Take up to `max_frames` whole frames without waiting.
    ///
    /// Returns `None` when less than one frame is buffered.
    pub fn try_pop(&self, max_frames: usize) -> Option<Vec<f32>> {
        let mut g = self.lock();
        let frames = (g.queue.len() / self.channels).min(max_frames);
        if frames == 0 {
            return None;
        }
        let out: Vec<f32> = g.queue.drain(..frames * self.channels).collect();
        drop(g);
        self.cv.notify_all();
        Some(out)
    }

    fn lock(&self) -> MutexGuard<'_, SharedInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancellation is a plain flag nobody notifies on, so waits are sliced.
    fn wait<'a>(&self, g: MutexGuard<'a, SharedInner>) -> MutexGuard<'a, SharedInner> {
        let (g, _timeout) = self
            .cv
            .wait_timeout(g, CANCEL_POLL)
            .unwrap_or_else(PoisonError::into_inner);
        g
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn never() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn calc_max_buffered_samples_falls_back_on_bad_durations() {
        assert_eq!(calc_max_buffered_samples(48_000, 2, 1.0), 96_000);
        assert_eq!(calc_max_buffered_samples(48_000, 2, 0.0), 48_000);
        assert_eq!(calc_max_buffered_samples(48_000, 2, f32::NAN), 48_000);
        assert_eq!(calc_max_buffered_samples(0, 2, 1.0), 2);
    }

    #[test]
    fn try_pop_returns_none_when_empty() {
        let q = SharedAudio::new(2, 16);
        assert!(q.try_pop(4).is_none());
    }

    #[test]
    fn try_pop_returns_whole_frames_only() {
        let q = SharedAudio::new(2, 64);
        assert!(q.push_interleaved_blocking(&[1.0, 2.0, 3.0, 4.0, 5.0], &never()));
        let out = q.try_pop(8).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(q.try_pop(8).is_none());
    }

    #[test]
    fn try_pop_respects_frame_cap() {
        let q = SharedAudio::new(1, 64);
        q.push_interleaved_blocking(&[1.0, 2.0, 3.0], &never());
        assert_eq!(q.try_pop(2).unwrap(), vec![1.0, 2.0]);
        assert_eq!(q.len_frames(), 1);
    }

    #[test]
    fn push_blocks_until_consumer_makes_room() {
        let q = Arc::new(SharedAudio::new(1, 4));
        let producer = {
            let q = q.clone();
            thread::spawn(move || q.push_interleaved_blocking(&[0.0; 10], &never()))
        };
        let mut drained = 0;
        while drained < 10 {
            if let Some(v) = q.try_pop(3) {
                drained += v.len();
            } else {
                thread::sleep(Duration::from_millis(1));
            }
        }
        assert!(producer.join().unwrap());
    }

    #[test]
    fn close_releases_blocked_writer() {
        let q = Arc::new(SharedAudio::new(1, 2));
        let producer = {
            let q = q.clone();
            thread::spawn(move || q.push_interleaved_blocking(&[0.0; 8], &never()))
        };
        thread::sleep(Duration::from_millis(20));
        q.close();
        assert!(!producer.join().unwrap());
        assert!(!q.push_interleaved_blocking(&[0.0], &never()));
    }

    #[test]
    fn max_frames_reports_capacity_in_frames() {
        let q = SharedAudio::new(2, calc_max_buffered_samples(1_000, 2, 0.5));
        assert_eq!(q.max_frames(), 500);
    }

    #[test]
    fn cancel_releases_blocked_writer() {
        let q = Arc::new(SharedAudio::new(1, 2));
        let cancel = Arc::new(AtomicBool::new(false));
        let producer = {
            let q = q.clone();
            let cancel = cancel.clone();
            thread::spawn(move || q.push_interleaved_blocking(&[0.0; 8], &cancel))
        };
        thread::sleep(Duration::from_millis(20));
        cancel.store(true, Ordering::Relaxed);
        assert!(!producer.join().unwrap());
        assert_eq!(q.len_frames(), 2);
    }

    #[test]
    fn wait_until_empty_returns_once_consumer_catches_up() {
        let q = Arc::new(SharedAudio::new(1, 16));
        q.push_interleaved_blocking(&[0.5; 6], &never());
        let consumer = {
            let q = q.clone();
            thread::spawn(move || {
                while q.len_frames() > 0 {
                    q.try_pop(2);
                    thread::sleep(Duration::from_millis(2));
                }
            })
        };
        assert!(q.wait_until_empty_or_cancel(&never()));
        assert_eq!(q.len_frames(), 0);
        consumer.join().unwrap();
    }

    #[test]
    fn wait_until_empty_gives_up_when_cancelled() {
        let q = SharedAudio::new(1, 16);
        q.push_interleaved_blocking(&[0.5; 4], &never());
        assert!(!q.wait_until_empty_or_cancel(&AtomicBool::new(true)));
        assert_eq!(q.len_frames(), 4);
    }
}
