//! Inline sample-rate conversion for the sink.
//!
//! The cpal sink converts decoder output to the device rate when the device
//! cannot run at the source rate. Conversion happens synchronously inside
//! `Sink::write`. Input is buffered until a whole rubato chunk is available.

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

/// Streaming converter for interleaved `f32` samples.
pub struct StreamResampler {
    inner: Box<dyn Resampler<f32> + Send>,
    channels: usize,
    chunk_frames: usize,
    pending: Vec<f32>,
    scratch: Vec<f32>,
    produced: Vec<f32>,
}

impl StreamResampler {
    pub fn new(src_rate: u32, dst_rate: u32, channels: usize, chunk_frames: usize) -> Result<Self> {
        if src_rate == 0 || dst_rate == 0 || channels == 0 {
            return Err(anyhow!(
                "invalid resampler setup: {src_rate} Hz -> {dst_rate} Hz, {channels} channels"
            ));
        }
        let chunk_frames = chunk_frames.max(1);
        let ratio = dst_rate as f64 / src_rate as f64;

        let sinc_len = 128;
        let window = WindowFunction::BlackmanHarris2;
        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff: calculate_cutoff(sinc_len, window),
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 256,
            window,
        };

        let inner = Async::<f32>::new_sinc(ratio, 1.1, &params, chunk_frames, channels, FixedAsync::Input)
            .map_err(|e| anyhow!("resampler init: {e}"))?;

        let scratch_frames = max_output_frames(chunk_frames, ratio);
        tracing::debug!(src_rate, dst_rate, channels, chunk_frames, "resampler ready");

        Ok(Self {
            inner: Box::new(inner),
            channels,
            chunk_frames,
            pending: Vec::with_capacity(chunk_frames * channels * 2),
            scratch: vec![0.0; scratch_frames * channels],
            produced: Vec::new(),
        })
    }

    /// Feed interleaved input and return whatever output is ready.
    ///
    /// Input shorter than one chunk is held back until the next call.
    pub fn process(&mut self, input: &[f32]) -> Result<&[f32]> {
        self.pending.extend_from_slice(input);
        self.produced.clear();

        let chunk_samples = self.chunk_frames * self.channels;
        let mut consumed = 0;
        while self.pending.len() - consumed >= chunk_samples {
            let input_adapter = InterleavedSlice::new(
                &self.pending[consumed..consumed + chunk_samples],
                self.channels,
                self.chunk_frames,
            )
            .map_err(|e| anyhow!("resampler input: {e}"))?;
            let scratch_frames = self.scratch.len() / self.channels;
            let mut output_adapter =
                InterleavedSlice::new_mut(&mut self.scratch, self.channels, scratch_frames)
                    .map_err(|e| anyhow!("resampler output: {e}"))?;

            let (_frames_in, frames_out) = self
                .inner
                .process_into_buffer(&input_adapter, &mut output_adapter, None)
                .map_err(|e| anyhow!("resample: {e}"))?;

            self.produced
                .extend_from_slice(&self.scratch[..frames_out * self.channels]);
            consumed += chunk_samples;
        }
        self.pending.drain(..consumed);
        Ok(&self.produced)
    }

    /// Convert whatever input is still held back, as a partial chunk.
    ///
    /// Called once at the end of a track. Returns nothing if no input is
    /// pending.
    pub fn flush(&mut self) -> Result<&[f32]> {
        self.produced.clear();
        let tail_frames = self.pending.len() / self.channels;
        if tail_frames == 0 {
            self.pending.clear();
            return Ok(&self.produced);
        }

        let input_adapter = InterleavedSlice::new(
            &self.pending[..tail_frames * self.channels],
            self.channels,
            tail_frames,
        )
        .map_err(|e| anyhow!("resampler tail input: {e}"))?;
        let scratch_frames = self.scratch.len() / self.channels;
        let mut output_adapter = InterleavedSlice::new_mut(&mut self.scratch, self.channels, scratch_frames)
            .map_err(|e| anyhow!("resampler tail output: {e}"))?;
        let indexing = Indexing {
            input_offset: 0,
            output_offset: 0,
            active_channels_mask: None,
            partial_len: Some(tail_frames),
        };

        let (_frames_in, frames_out) = self
            .inner
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .map_err(|e| anyhow!("resample tail: {e}"))?;
        self.produced
            .extend_from_slice(&self.scratch[..frames_out * self.channels]);
        self.pending.clear();
        Ok(&self.produced)
    }
}

/// Output frames one input chunk can produce, with headroom for the
/// asynchronous ratio drift.
fn max_output_frames(chunk_frames: usize, ratio: f64) -> usize {
    (chunk_frames as f64 * ratio * 1.2).ceil() as usize + 64
}
