//! Symphonia-backed block source.
//!
//! Two flavours share one implementation:
//! - [`Backend::RandomAccess`]: the file is a seekable media source and repositioning uses the
//!   container's accurate seek.
//! - [`Backend::Streaming`]: the file is read forward only; repositioning reopens it from the
//!   start (the frame reader then decodes and discards up to the target).

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions};
use symphonia::core::errors::{Error as SymError, SeekErrorKind};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use super::frames::{BlockSource, FrameReader};
use super::registry::Backend;
use super::{AudioFormat, DecodeError, Decoder};

/// Open `path` with the given backend and wrap it for frame-exact access.
pub(crate) fn open(path: &Path, backend: Backend) -> Result<Box<dyn Decoder>, DecodeError> {
    let source = SymphoniaSource::open(path, backend)?;
    Ok(Box::new(FrameReader::new(source)))
}

pub(crate) struct SymphoniaSource {
    path: PathBuf,
    backend: Backend,
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    track_id: u32,
    format: AudioFormat,
    total_frames: Option<u64>,
    time_base: Option<TimeBase>,
    sample_buf: Option<SampleBuffer<f32>>,
}

impl SymphoniaSource {
    pub(crate) fn open(path: &Path, backend: Backend) -> Result<Self, DecodeError> {
        let file = File::open(path).map_err(|source| DecodeError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let media: Box<dyn MediaSource> = match backend {
            Backend::RandomAccess => Box::new(file),
            Backend::Streaming => Box::new(ReadOnlySource::new(file)),
        };
        let mss = MediaSourceStream::new(media, Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let detected = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let reader = detected.format;

        let track = reader.default_track().ok_or(DecodeError::NoAudioTrack)?;
        let params = track.codec_params.clone();
        let track_id = track.id;

        let format = format_from_params(&params)?;
        let decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;

        tracing::debug!(
            path = %path.display(),
            codec = codec_label(&params).unwrap_or("unknown"),
            ?backend,
            channels = format.channels,
            rate = format.sample_rate,
            frames = ?params.n_frames,
            "decoder opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            backend,
            reader,
            decoder,
            track_id,
            format,
            total_frames: params.n_frames,
            time_base: params.time_base,
            sample_buf: None,
        })
    }

    fn frame_to_ts(&self, frame: u64) -> u64 {
        match self.time_base {
            Some(tb) => {
                let rate = self.format.sample_rate as u64;
                let time = Time::new(frame / rate, (frame % rate) as f64 / rate as f64);
                tb.calc_timestamp(time)
            }
            None => frame,
        }
    }

    fn ts_to_frame(&self, ts: u64) -> u64 {
        match self.time_base {
            Some(tb) => {
                let time = tb.calc_time(ts);
                let rate = self.format.sample_rate as u64;
                time.seconds * rate + (time.frac * rate as f64).round() as u64
            }
            None => ts,
        }
    }
}

impl BlockSource for SymphoniaSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }

    fn next_block(&mut self, out: &mut Vec<f32>) -> Result<bool, DecodeError> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                // A chained stream changed parameters; treat as end of this track.
                Err(SymError::ResetRequired) => return Ok(false),
                Err(SymError::IoError(e)) => return Err(DecodeError::Io(e)),
                Err(e) => return Err(e.into()),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymError::DecodeError(msg)) => {
                    tracing::warn!(path = %self.path.display(), error = msg, "skipping corrupt packet");
                    continue;
                }
                Err(SymError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            };
            if decoded.frames() == 0 {
                continue;
            }

            let spec = *decoded.spec();
            let got = spec.channels.count();
            let expected = self.format.channels as usize;
            if got != expected {
                return Err(DecodeError::LayoutChanged { expected, got });
            }

            let needs_new = self
                .sample_buf
                .as_ref()
                .is_none_or(|b| b.capacity() < decoded.capacity());
            if needs_new {
                self.sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
            }
            if let Some(buf) = self.sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);
                out.extend_from_slice(buf.samples());
            }
            return Ok(true);
        }
    }

    fn random_access(&self) -> bool {
        self.backend == Backend::RandomAccess
    }

    fn reposition(&mut self, frame: u64) -> Result<Option<u64>, DecodeError> {
        match self.backend {
            Backend::Streaming => {
                tracing::debug!(path = %self.path.display(), frame, "restarting stream to seek");
                *self = SymphoniaSource::open(&self.path, Backend::Streaming)?;
                Ok(Some(0))
            }
            Backend::RandomAccess => {
                let ts = self.frame_to_ts(frame);
                let seek = self.reader.seek(
                    SeekMode::Accurate,
                    SeekTo::TimeStamp {
                        ts,
                        track_id: self.track_id,
                    },
                );
                match seek {
                    Ok(seeked) => {
                        self.decoder.reset();
                        Ok(Some(self.ts_to_frame(seeked.actual_ts)))
                    }
                    Err(SymError::SeekError(SeekErrorKind::OutOfRange)) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }
}

fn format_from_params(params: &CodecParameters) -> Result<AudioFormat, DecodeError> {
    let channels = params
        .channels
        .ok_or(DecodeError::MissingParameter("channel layout"))?
        .count();
    let sample_rate = params
        .sample_rate
        .filter(|r| *r > 0)
        .ok_or(DecodeError::MissingParameter("sample rate"))?;
    // Lossy codecs have no intrinsic depth; report the 16-bit output they are mastered for.
    let bits_per_sample = params
        .bits_per_sample
        .or(params.bits_per_coded_sample)
        .and_then(|v| u16::try_from(v).ok())
        .unwrap_or(16);
    Ok(AudioFormat {
        channels: u16::try_from(channels).map_err(|_| DecodeError::MissingParameter("channel layout"))?,
        sample_rate,
        bits_per_sample,
    })
}

/// Short codec name for logs.
fn codec_label(params: &CodecParameters) -> Option<&'static str> {
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
