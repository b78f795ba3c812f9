//! Decoder adapter.
//!
//! The engine only sees the [`Decoder`] / [`DecoderFactory`] pair: open a
//! track, ask for its stream format, then pull interleaved `f32` chunks until
//! [`Chunk::EndOfStream`]. Closing a decoder is dropping it.
//!
//! [`SymphoniaDecoder`] is the production implementation.

use std::fs::File;
use std::io;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, CodecParameters, Decoder as CodecDecoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Format of the PCM a decoder produces.
///
/// Samples are always interleaved `f32`; `codec` names the source encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub codec: Option<String>,
}

/// One pull from a decoder.
#[derive(Debug, PartialEq)]
pub enum Chunk {
    /// Interleaved samples, a whole number of frames.
    Pcm(Vec<f32>),
    EndOfStream,
}

pub trait Decoder: Send {
    fn format(&self) -> Result<StreamFormat>;
    fn read(&mut self) -> Result<Chunk>;
}

pub trait DecoderFactory: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn Decoder>>;
}

/// Opens [`SymphoniaDecoder`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct SymphoniaDecoderFactory;

impl DecoderFactory for SymphoniaDecoderFactory {
    fn open(&self, path: &Path) -> Result<Box<dyn Decoder>> {
        Ok(Box::new(SymphoniaDecoder::open(path)?))
    }
}

/// Packet-at-a-time decoder for one file.
pub struct SymphoniaDecoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn CodecDecoder>,
    track_id: u32,
    params: CodecParameters,
}

impl SymphoniaDecoder {
    /// Open `path` (using its extension as a hint) and set up a codec for
    /// the first decodable track.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .with_context(|| format!("detect format of {}", path.display()))?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| anyhow!("no decodable audio track in {}", path.display()))?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .with_context(|| format!("create decoder for {}", path.display()))?;

        tracing::debug!(
            path = %path.display(),
            codec = codec_name_from_params(&params).unwrap_or("unknown"),
            "decoder opened"
        );

        Ok(Self {
            reader,
            decoder,
            track_id,
            params,
        })
    }
}

impl Decoder for SymphoniaDecoder {
    fn format(&self) -> Result<StreamFormat> {
        let sample_rate = self
            .params
            .sample_rate
            .ok_or_else(|| anyhow!("unknown sample rate"))?;
        let channels = self
            .params
            .channels
            .ok_or_else(|| anyhow!("unknown channel layout"))?
            .count();
        if sample_rate == 0 || channels == 0 {
            return Err(anyhow!("invalid stream format: {sample_rate} Hz, {channels} channels"));
        }
        Ok(StreamFormat {
            sample_rate,
            channels: u16::try_from(channels).context("channel count")?,
            codec: codec_name_from_params(&self.params).map(str::to_string),
        })
    }

    fn read(&mut self) -> Result<Chunk> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(Chunk::EndOfStream);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(Chunk::EndOfStream),
                Err(e) => return Err(e).context("read packet"),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(msg)) => {
                    tracing::debug!(reason = msg, "skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(e).context("decode packet"),
            };
            if decoded.frames() == 0 {
                continue;
            }

            let mut buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
            buf.copy_interleaved_ref(decoded);
            return Ok(Chunk::Pcm(buf.samples().to_vec()));
        }
    }
}

/// Best-effort codec label for status output.
fn codec_name_from_params(params: &CodecParameters) -> Option<&'static str> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name)
}
