//! Sink adapter.
//!
//! A [`Sink`] accepts interleaved `f32` chunks in the format it was opened
//! with and renders them; closing a sink is dropping it. [`CpalSink`] is the
//! production implementation:
//!
//! - a dedicated output thread owns the `cpal::Stream` (streams are not
//!   `Send` on every platform) and lives until the sink is dropped
//! - `write` resamples when the device could not be opened at the source
//!   rate, then blocks on a bounded [`SharedAudio`] queue, which paces the
//!   renderer to real time
//! - the cpal callback drains the queue without blocking, maps channels,
//!   converts to the device sample format and pads underruns with silence
//! - an [`OutputControl`] shared with the controller holds the callback on
//!   silence (pause, stop) without draining the queue, and releases blocked
//!   writers when the output is being torn down
//! - `drain` flushes the resampler tail and waits until the device has
//!   played everything, so a track that ends naturally is heard in full

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};

use crate::config::PlaybackConfig;
use crate::decode::StreamFormat;
use crate::device;
use crate::queue::{SharedAudio, calc_max_buffered_samples};
use crate::resample::StreamResampler;

/// How often `drain` rechecks the frames the callback still holds.
const DRAIN_POLL: Duration = Duration::from_millis(5);

pub trait Sink: Send {
    fn write(&mut self, samples: &[f32]) -> Result<()>;

    /// Block until everything written so far has been rendered, or the
    /// output is released.
    fn drain(&mut self) -> Result<()>;
}

pub trait SinkFactory: Send + Sync {
    fn open(&self, format: &StreamFormat, control: Arc<OutputControl>) -> Result<Box<dyn Sink>>;
}

/// Flags the controller flips on an open sink.
///
/// While `hold` is set the device plays silence and buffered samples stay
/// queued. Once `release` is set, blocked `write` and `drain` calls return
/// promptly; it is never cleared.
#[derive(Debug, Default)]
pub struct OutputControl {
    hold: AtomicBool,
    released: AtomicBool,
}

impl OutputControl {
    pub fn set_hold(&self, hold: bool) {
        self.hold.store(hold, Ordering::Relaxed);
    }

    pub fn is_held(&self) -> bool {
        self.hold.load(Ordering::Relaxed)
    }

    pub fn release(&self) {
        self.released.store(true, Ordering::Relaxed);
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Relaxed)
    }
}

/// Opens [`CpalSink`]s on a fixed device selection.
#[derive(Clone, Debug, Default)]
pub struct CpalSinkFactory {
    device: Option<String>,
    playback: PlaybackConfig,
}

impl CpalSinkFactory {
    /// `device` is a case-insensitive substring; `None` means the host default.
    pub fn new(device: Option<String>, playback: PlaybackConfig) -> Self {
        Self { device, playback }
    }
}

impl SinkFactory for CpalSinkFactory {
    fn open(&self, format: &StreamFormat, control: Arc<OutputControl>) -> Result<Box<dyn Sink>> {
        Ok(Box::new(CpalSink::open(
            self.device.as_deref(),
            format,
            &self.playback,
            control,
        )?))
    }
}

/// What the output thread settled on.
#[derive(Clone, Debug)]
struct OutputInfo {
    device: String,
    sample_rate: u32,
    channels: u16,
    sample_format: cpal::SampleFormat,
}

/// Everything the stream callback and the sink share.
#[derive(Clone)]
struct StreamShared {
    queue: Arc<SharedAudio>,
    control: Arc<OutputControl>,
    failed: Arc<AtomicBool>,
    /// Frames the callback has popped but not yet played.
    unplayed: Arc<AtomicUsize>,
    refill_max_frames: usize,
}

pub struct CpalSink {
    shared: StreamShared,
    resampler: Option<StreamResampler>,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl CpalSink {
    pub fn open(
        device: Option<&str>,
        format: &StreamFormat,
        playback: &PlaybackConfig,
        control: Arc<OutputControl>,
    ) -> Result<Self> {
        let src_channels = usize::from(format.channels);
        let shared = StreamShared {
            queue: Arc::new(SharedAudio::new(
                src_channels,
                calc_max_buffered_samples(format.sample_rate, src_channels, playback.buffer_seconds),
            )),
            control,
            failed: Arc::new(AtomicBool::new(false)),
            unplayed: Arc::new(AtomicUsize::new(0)),
            refill_max_frames: playback.refill_max_frames.max(1),
        };
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<OutputInfo>>(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        let worker = {
            let device = device.map(str::to_string);
            let shared = shared.clone();
            let target_rate = format.sample_rate;
            std::thread::Builder::new()
                .name("audio-output".into())
                .spawn(move || output_thread_main(device, target_rate, shared, ready_tx, stop_rx))
                .context("spawn audio output thread")?
        };

        let info = match ready_rx.recv() {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(anyhow!("audio output thread exited during setup"));
            }
        };

        tracing::info!(
            device = %info.device,
            source_rate_hz = format.sample_rate,
            output_rate_hz = info.sample_rate,
            source_channels = format.channels,
            output_channels = info.channels,
            sample_format = ?info.sample_format,
            queue_frames = shared.queue.max_frames(),
            "output stream open"
        );

        let resampler = if info.sample_rate == format.sample_rate {
            None
        } else {
            Some(StreamResampler::new(
                format.sample_rate,
                info.sample_rate,
                src_channels,
                playback.chunk_frames,
            )?)
        };

        Ok(Self {
            shared,
            resampler,
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        })
    }

    fn check_device(&self) -> Result<()> {
        if self.shared.failed.load(Ordering::Relaxed) {
            return Err(anyhow!("output device is no longer available"));
        }
        Ok(())
    }
}

/// Queue `samples`; a push cut short by `release` is not an error.
fn enqueue(shared: &StreamShared, samples: &[f32]) -> Result<()> {
    if samples.is_empty()
        || shared.queue.push_interleaved_blocking(samples, &shared.control.released)
        || shared.control.is_released()
    {
        Ok(())
    } else {
        Err(anyhow!("output stream closed"))
    }
}

impl Sink for CpalSink {
    fn write(&mut self, samples: &[f32]) -> Result<()> {
        self.check_device()?;
        let samples = match self.resampler.as_mut() {
            Some(r) => r.process(samples)?,
            None => samples,
        };
        enqueue(&self.shared, samples)
    }

    fn drain(&mut self) -> Result<()> {
        self.check_device()?;
        if let Some(r) = self.resampler.as_mut() {
            enqueue(&self.shared, r.flush()?)?;
        }
        let shared = &self.shared;
        if !shared.queue.wait_until_empty_or_cancel(&shared.control.released) {
            return Ok(());
        }
        while shared.unplayed.load(Ordering::Relaxed) > 0
            && !shared.control.is_released()
            && !shared.failed.load(Ordering::Relaxed)
        {
            std::thread::sleep(DRAIN_POLL);
        }
        tracing::debug!("output drained");
        Ok(())
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        tracing::debug!(buffered_frames = self.shared.queue.len_frames(), "closing output");
        self.shared.queue.close();
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn output_thread_main(
    device: Option<String>,
    target_rate: u32,
    shared: StreamShared,
    ready_tx: Sender<Result<OutputInfo>>,
    stop_rx: Receiver<()>,
) {
    let stream = match start_stream(device.as_deref(), target_rate, &shared) {
        Ok((stream, info)) => {
            let _ = ready_tx.send(Ok(info));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    // Either a stop message or the sender being dropped ends the stream.
    let _ = stop_rx.recv();
    drop(stream);
}

fn start_stream(
    device_name: Option<&str>,
    target_rate: u32,
    shared: &StreamShared,
) -> Result<(cpal::Stream, OutputInfo)> {
    let host = cpal::default_host();
    let device = device::pick_device(&host, device_name)?;
    let config = device::pick_output_config(&device, target_rate)?;
    let mut stream_config: cpal::StreamConfig = config.clone().into();
    if let Some(buf) = device::pick_buffer_size(&config) {
        stream_config.buffer_size = buf;
    }

    let stream = build_output_stream(&device, &stream_config, config.sample_format(), shared)?;
    stream.play().context("start output stream")?;

    let info = OutputInfo {
        device: device
            .description()
            .map(|d| d.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string()),
        sample_rate: stream_config.sample_rate,
        channels: stream_config.channels,
        sample_format: config.sample_format(),
    };
    Ok((stream, info))
}

fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    shared: &StreamShared,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, shared),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, shared),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, shared),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, shared),
        other => Err(anyhow!("unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: &StreamShared,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let dst_channels = usize::from(config.channels).max(1);
    let shared_cb = shared.clone();
    let mut pending = FrameCursor::default();

    let queue_err = shared.queue.clone();
    let failed_err = shared.failed.clone();
    let err_fn = move |err: cpal::StreamError| {
        if matches!(err, cpal::StreamError::DeviceNotAvailable) {
            tracing::error!("output device disappeared");
            failed_err.store(true, Ordering::Relaxed);
            queue_err.close();
        } else {
            tracing::warn!("stream error: {err}");
        }
    };

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _| fill_output(data, dst_channels, &mut pending, &shared_cb),
            err_fn,
            None,
        )
        .context("build output stream")?;
    Ok(stream)
}

/// Fill one device buffer from the queue.
///
/// While held, the whole buffer is silence and nothing is taken from the
/// queue, so resuming continues exactly where playback left off.
fn fill_output<T>(data: &mut [T], dst_channels: usize, pending: &mut FrameCursor, shared: &StreamShared)
where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);
    if shared.control.is_held() {
        data.fill(silence);
        return;
    }
    let src_channels = shared.queue.channels();
    for frame in data.chunks_mut(dst_channels) {
        if pending.is_drained() {
            match shared.queue.try_pop(shared.refill_max_frames) {
                Some(samples) => pending.reset(samples),
                None => {
                    frame.fill(silence);
                    continue;
                }
            }
        }
        let src = pending.frame(src_channels);
        for (ch, out) in frame.iter_mut().enumerate() {
            *out = <T as cpal::Sample>::from_sample::<f32>(map_channel(src, dst_channels, ch));
        }
        pending.advance(src_channels);
    }
    shared
        .unplayed
        .store(pending.remaining_frames(src_channels), Ordering::Relaxed);
}

/// Interleaved samples the callback has popped but not yet written.
#[derive(Default)]
struct FrameCursor {
    samples: Vec<f32>,
    pos: usize,
}

impl FrameCursor {
    fn is_drained(&self) -> bool {
        self.pos >= self.samples.len()
    }

    fn reset(&mut self, samples: Vec<f32>) {
        self.samples = samples;
        self.pos = 0;
    }

    fn frame(&self, channels: usize) -> &[f32] {
        let end = (self.pos + channels).min(self.samples.len());
        &self.samples[self.pos..end]
    }

    fn advance(&mut self, channels: usize) {
        self.pos += channels;
    }

    fn remaining_frames(&self, channels: usize) -> usize {
        self.samples.len().saturating_sub(self.pos) / channels.max(1)
    }
}

/// Sample for output channel `dst_ch` from one source frame.
///
/// Mono is duplicated to every output channel, stereo folds to mono by
/// averaging, and other layouts clamp to the last available source channel.
fn map_channel(src: &[f32], dst_channels: usize, dst_ch: usize) -> f32 {
    match (src.len(), dst_channels) {
        (0, _) => 0.0,
        (1, _) => src[0],
        (2, 1) => 0.5 * (src[0] + src[1]),
        (n, _) => src[dst_ch.min(n - 1)],
    }
}
