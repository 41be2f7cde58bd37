//! Extension-based codec selection.

use std::path::Path;

use super::{DecodeError, Decoder, DecoderFactory, media};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    Wav,
    Flac,
    Aiff,
    Mp3,
    Vorbis,
    Aac,
}

/// How a codec's files are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Seekable file with native accurate seek.
    RandomAccess,
    /// Forward-only reader; backward seeks restart from the beginning.
    Streaming,
}

const EXTENSIONS: &[(&str, CodecId)] = &[
    ("wav", CodecId::Wav),
    ("wave", CodecId::Wav),
    ("flac", CodecId::Flac),
    ("aif", CodecId::Aiff),
    ("aiff", CodecId::Aiff),
    ("aifc", CodecId::Aiff),
    ("mp3", CodecId::Mp3),
    ("ogg", CodecId::Vorbis),
    ("oga", CodecId::Vorbis),
    ("aac", CodecId::Aac),
];

impl CodecId {
    pub fn backend(self) -> Backend {
        match self {
            CodecId::Wav | CodecId::Flac | CodecId::Aiff => Backend::RandomAccess,
            CodecId::Mp3 | CodecId::Vorbis | CodecId::Aac => Backend::Streaming,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CodecId::Wav => "wav",
            CodecId::Flac => "flac",
            CodecId::Aiff => "aiff",
            CodecId::Mp3 => "mp3",
            CodecId::Vorbis => "vorbis",
            CodecId::Aac => "aac",
        }
    }
}

/// Classify `path` by its extension (case-insensitive).
pub fn codec_for_path(path: &Path) -> Result<CodecId, DecodeError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, id)| *id)
        .ok_or(DecodeError::UnsupportedExtension { ext })
}

/// Default decoder factory: extension table plus symphonia backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct CodecRegistry;

impl DecoderFactory for CodecRegistry {
    fn open(&self, path: &Path) -> Result<Box<dyn Decoder>, DecodeError> {
        let codec = codec_for_path(path)?;
        tracing::debug!(path = %path.display(), codec = codec.name(), "codec selected");
        media::open(path, codec.backend())
    }
}
