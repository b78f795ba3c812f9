//! Scripted decoder and sink adapters for engine tests.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::decode::{Chunk, Decoder, DecoderFactory, StreamFormat};
use crate::output::{OutputControl, Sink, SinkFactory};
use crate::playlist::display_name;

/// Shared bookkeeping for every mock adapter opened from one world.
///
/// Tracks are identified by file name. A track with no scripted chunk count
/// never ends.
#[derive(Default)]
pub struct MockWorld {
    chunks: Mutex<HashMap<String, usize>>,
    read_failures: Mutex<HashSet<String>>,
    pub fail_decoder_open: AtomicBool,
    pub fail_sink_open: AtomicBool,
    pub fail_write: AtomicBool,
    open_delay: Mutex<Duration>,
    read_delay: Mutex<Duration>,
    write_delay: Mutex<Duration>,
    live_decoders: AtomicUsize,
    peak_decoders: AtomicUsize,
    writes: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl MockWorld {
    pub fn new() -> Arc<Self> {
        let world = Self::default();
        *world.write_delay.lock().unwrap() = Duration::from_millis(1);
        Arc::new(world)
    }

    pub fn set_chunks(&self, track: &str, chunks: usize) {
        self.chunks.lock().unwrap().insert(track.to_string(), chunks);
    }

    /// Every read from `track` fails.
    pub fn set_read_failure(&self, track: &str) {
        self.read_failures.lock().unwrap().insert(track.to_string());
    }

    pub fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.lock().unwrap() = delay;
    }

    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = delay;
    }

    pub fn live_decoders(&self) -> usize {
        self.live_decoders.load(Ordering::SeqCst)
    }

    pub fn peak_decoders(&self) -> usize {
        self.peak_decoders.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// How many times a decoder was opened for `track`.
    pub fn opens(&self, track: &str) -> usize {
        self.count(&format!("open decoder {track}"))
    }

    /// How many times `entry` appears in the log.
    pub fn count(&self, entry: &str) -> usize {
        self.log().iter().filter(|e| *e == entry).count()
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    pub fn decoders(self: &Arc<Self>) -> Arc<dyn DecoderFactory> {
        Arc::new(MockDecoders(self.clone()))
    }

    pub fn sinks(self: &Arc<Self>) -> Arc<dyn SinkFactory> {
        Arc::new(MockSinks(self.clone()))
    }
}

struct MockDecoders(Arc<MockWorld>);

impl DecoderFactory for MockDecoders {
    fn open(&self, path: &Path) -> Result<Box<dyn Decoder>> {
        let world = &self.0;
        let delay = *world.open_delay.lock().unwrap();
        thread::sleep(delay);
        let track = display_name(path);
        if world.fail_decoder_open.load(Ordering::SeqCst) {
            return Err(anyhow!("mock decoder refused {track}"));
        }
        let live = world.live_decoders.fetch_add(1, Ordering::SeqCst) + 1;
        world.peak_decoders.fetch_max(live, Ordering::SeqCst);
        world.record(format!("open decoder {track}"));
        let remaining = world.chunks.lock().unwrap().get(&track).copied();
        Ok(Box::new(MockDecoder {
            world: world.clone(),
            track,
            remaining,
        }))
    }
}

struct MockSinks(Arc<MockWorld>);

impl SinkFactory for MockSinks {
    fn open(&self, format: &StreamFormat, control: Arc<OutputControl>) -> Result<Box<dyn Sink>> {
        let world = &self.0;
        if world.fail_sink_open.load(Ordering::SeqCst) {
            return Err(anyhow!("mock sink refused {} Hz", format.sample_rate));
        }
        world.record("open sink".to_string());
        Ok(Box::new(MockSink {
            world: world.clone(),
            control,
        }))
    }
}

struct MockDecoder {
    world: Arc<MockWorld>,
    track: String,
    remaining: Option<usize>,
}

impl Decoder for MockDecoder {
    fn format(&self) -> Result<StreamFormat> {
        Ok(StreamFormat {
            sample_rate: 44_100,
            channels: 2,
            codec: Some("MOCK".to_string()),
        })
    }

    fn read(&mut self) -> Result<Chunk> {
        let delay = *self.world.read_delay.lock().unwrap();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        if self.world.read_failures.lock().unwrap().contains(&self.track) {
            return Err(anyhow!("mock decode error in {}", self.track));
        }
        match self.remaining.as_mut() {
            Some(0) => Ok(Chunk::EndOfStream),
            Some(n) => {
                *n -= 1;
                Ok(Chunk::Pcm(vec![0.0; 8]))
            }
            None => Ok(Chunk::Pcm(vec![0.0; 8])),
        }
    }
}

impl Drop for MockDecoder {
    fn drop(&mut self) {
        self.world.live_decoders.fetch_sub(1, Ordering::SeqCst);
        self.world.record(format!("close decoder {}", self.track));
    }
}

/// Behaves like a sink whose queue is full: while held, `write` and `drain`
/// block until the hold lifts or the output is released.
struct MockSink {
    world: Arc<MockWorld>,
    control: Arc<OutputControl>,
}

impl MockSink {
    /// Returns `false` if released.
    fn wait_while_held(&self) -> bool {
        while self.control.is_held() && !self.control.is_released() {
            thread::sleep(Duration::from_millis(1));
        }
        !self.control.is_released()
    }
}

impl Sink for MockSink {
    fn write(&mut self, _samples: &[f32]) -> Result<()> {
        if self.world.fail_write.load(Ordering::SeqCst) {
            return Err(anyhow!("mock device unplugged"));
        }
        if !self.wait_while_held() {
            return Ok(());
        }
        self.world.writes.fetch_add(1, Ordering::SeqCst);
        let delay = *self.world.write_delay.lock().unwrap();
        thread::sleep(delay);
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        self.world.record("drain sink".to_string());
        self.wait_while_held();
        Ok(())
    }
}

impl Drop for MockSink {
    fn drop(&mut self) {
        self.world.record("close sink".to_string());
    }
}
