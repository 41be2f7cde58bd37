//! Daemon configuration.
//!
//! Values come from an optional TOML file and from `serve` flags; flags win.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use playd_engine::config::EngineConfig;
use serde::Deserialize;

use crate::cli::ServeArgs;

/// How many times a busy listen address is retried.
pub const BIND_ATTEMPTS: u32 = 15;
pub const BIND_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Config file schema.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Listen address (host:port).
    pub bind: Option<String>,
    /// Output device name (substring match).
    pub device: Option<String>,
    /// Largest accepted packet payload in bytes.
    pub max_payload: Option<u32>,
    /// Playback loop tuning.
    pub playback: Option<PlaybackSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaybackSection {
    pub chunk_millis: Option<u32>,
    pub sub_chunks: Option<u32>,
    pub seek_chunks: Option<u32>,
    pub sink_buffer_millis: Option<u32>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse config {:?}", path))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

/// Fully resolved settings for `playd serve`.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub bind: SocketAddr,
    pub device: Option<String>,
    pub engine: EngineConfig,
    pub max_payload: u32,
    pub bind_attempts: u32,
    pub bind_retry_delay: Duration,
}

impl DaemonConfig {
    /// Load the file named by `--config` (if any) and merge the flags over it.
    pub fn from_args(args: &ServeArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => Some(FileConfig::load(path)?),
            None => None,
        };
        resolve(args, file)
    }
}

/// Merge flags over file values over defaults, then validate.
pub fn resolve(args: &ServeArgs, file: Option<FileConfig>) -> Result<DaemonConfig> {
    let file = file.unwrap_or_default();
    let playback = file.playback.unwrap_or_default();
    let defaults = EngineConfig::default();

    let engine = EngineConfig {
        chunk_millis: args
            .chunk_millis
            .or(playback.chunk_millis)
            .unwrap_or(defaults.chunk_millis),
        sub_chunks: args.sub_chunks.or(playback.sub_chunks).unwrap_or(defaults.sub_chunks),
        seek_chunks: args
            .seek_chunks
            .or(playback.seek_chunks)
            .unwrap_or(defaults.seek_chunks),
        sink_buffer_millis: args
            .sink_buffer_millis
            .or(playback.sink_buffer_millis)
            .unwrap_or(defaults.sink_buffer_millis),
    };
    if engine.chunk_millis == 0 {
        bail!("chunk_millis must be at least 1");
    }
    if engine.sub_chunks == 0 {
        bail!("sub_chunks must be at least 1");
    }
    if engine.sink_buffer_millis == 0 {
        bail!("sink_buffer_millis must be at least 1");
    }

    let max_payload = args
        .max_payload
        .or(file.max_payload)
        .unwrap_or(playd_proto::DEFAULT_MAX_PAYLOAD);
    if max_payload == 0 {
        bail!("max_payload must be at least 1");
    }

    let bind = args
        .bind
        .clone()
        .or(file.bind)
        .unwrap_or_else(|| playd_proto::DEFAULT_BIND.to_string());
    let bind = resolve_bind(&bind)?;

    Ok(DaemonConfig {
        bind,
        device: normalize_device_name(args.device.clone().or(file.device)),
        engine,
        max_payload,
        bind_attempts: BIND_ATTEMPTS,
        bind_retry_delay: BIND_RETRY_DELAY,
    })
}

fn resolve_bind(bind: &str) -> Result<SocketAddr> {
    bind.to_socket_addrs()
        .with_context(|| format!("invalid bind address {bind:?}"))?
        .next()
        .ok_or_else(|| anyhow!("bind address {bind:?} resolved to nothing"))
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
