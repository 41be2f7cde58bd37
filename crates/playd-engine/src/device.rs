//! Output sink interface and the cpal implementation.
//!
//! The playback loop only sees [`Sink`]; [`CpalSinkFactory`] picks a device, negotiates a
//! stream config whose sample rate equals the source rate, and feeds the device callback from a
//! bounded [`SampleQueue`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::decode::AudioFormat;
use crate::queue::{SampleQueue, capacity_for};

/// An open output stream. Closing is dropping.
pub trait Sink {
    /// Queue interleaved samples, blocking until all of them are accepted.
    fn write(&mut self, samples: &[f32]) -> Result<()>;
    /// Output silence without consuming queued audio.
    fn pause(&mut self) -> Result<()>;
    fn resume(&mut self) -> Result<()>;
    /// Drop queued audio that has not been played yet.
    fn discard(&mut self);
    /// Wait until queued audio has been played.
    fn drain(&mut self);
}

/// Opens sinks for a given PCM format. Shared between threads.
pub trait SinkFactory: Send + Sync {
    fn open(&self, format: &AudioFormat) -> Result<Box<dyn Sink>>;
}

/// Largest device buffer requested, in frames. Pause latency grows with it.
const MAX_DEVICE_BUFFER_FRAMES: u32 = 4096;

#[derive(Clone, Debug, Default)]
pub struct CpalSinkFactory {
    /// Case-insensitive substring of the device name; `None` for the host default.
    pub device: Option<String>,
    pub buffer_millis: u32,
}

impl CpalSinkFactory {
    /// `device` is a name substring; `None` picks the host default. `buffer_millis` sizes each
    /// sink's queue.
    pub fn new(device: Option<String>, buffer_millis: u32) -> Self {
        Self {
            device,
            buffer_millis,
        }
    }
}

impl SinkFactory for CpalSinkFactory {
    fn open(&self, format: &AudioFormat) -> Result<Box<dyn Sink>> {
        let host = cpal::default_host();
        let device = pick_device(&host, self.device.as_deref())?;
        let supported = pick_output_config(&device, format.sample_rate, format.channels)?;
        let sample_format = supported.sample_format();
        let mut config: cpal::StreamConfig = supported.config();
        if let Some(size) = pick_buffer_size(&supported) {
            config.buffer_size = size;
        }

        let src_channels = format.channels as usize;
        let queue = Arc::new(SampleQueue::new(
            src_channels,
            capacity_for(format.sample_rate, src_channels, self.buffer_millis),
        ));
        let paused = Arc::new(AtomicBool::new(false));

        let stream = build_output_stream(&device, &config, sample_format, &queue, &paused)?;
        stream.play().context("start output stream")?;

        tracing::info!(
            device = %device_label(&device),
            rate = config.sample_rate,
            channels_in = src_channels,
            channels_out = config.channels,
            format = ?sample_format,
            "output stream opened"
        );

        Ok(Box::new(CpalSink {
            _stream: stream,
            queue,
            paused,
            drain_timeout: Duration::from_millis(self.buffer_millis as u64 * 2 + 500),
        }))
    }
}

struct CpalSink {
    _stream: cpal::Stream,
    queue: Arc<SampleQueue>,
    paused: Arc<AtomicBool>,
    drain_timeout: Duration,
}

impl Sink for CpalSink {
    fn write(&mut self, samples: &[f32]) -> Result<()> {
        if !self.queue.push_blocking(samples) {
            bail!("output device unavailable");
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.paused.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.paused.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn discard(&mut self) {
        let dropped = self.queue.clear();
        tracing::debug!(frames = dropped, "discarded queued audio");
    }

    fn drain(&mut self) {
        if self.queue.wait_until_empty(self.drain_timeout) {
            return;
        }
        if self.queue.is_closed() {
            tracing::warn!(frames = self.queue.len_frames(), "output device went away before draining");
        } else {
            tracing::warn!(frames = self.queue.len_frames(), "output did not drain in time");
        }
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        // Release any writer before the stream itself goes away.
        self.queue.close();
    }
}

/// Pick the first output device whose name contains `needle` (case-insensitive), or the
/// host default.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let mut devices = host.output_devices().context("enumerate output devices")?;
        return devices
            .find(|d| matches_device_name(&device_label(d), needle))
            .ok_or_else(|| anyhow!("no output device matched: {needle}"));
    }
    host.default_output_device()
        .ok_or_else(|| anyhow!("no default output device"))
}

/// Pick an output config running at exactly `rate`.
///
/// Prefers configs with the source channel count, then the sample formats that convert with
/// the least loss.
pub fn pick_output_config(
    device: &cpal::Device,
    rate: u32,
    channels: u16,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .context("query output configs")?
        .collect();

    let best = ranges
        .into_iter()
        .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
        .filter(|r| sample_format_rank(r.sample_format()).is_some())
        .min_by_key(|r| {
            (
                channel_penalty(channels, r.channels()),
                sample_format_rank(r.sample_format()),
            )
        });

    match best {
        Some(range) => Ok(range.with_sample_rate(rate)),
        None => bail!("output device unavailable: no config supports {rate} Hz"),
    }
}

/// Prefer a fixed buffer size if the device advertises a range, capped to keep pause latency
/// low. `None` leaves the device default.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            let chosen = (*max).min(MAX_DEVICE_BUFFER_FRAMES).max(*min);
            Some(cpal::BufferSize::Fixed(chosen))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// One entry of `playd devices`.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub min_rate: u32,
    pub max_rate: u32,
}

/// Enumerate output devices with their supported sample-rate span.
pub fn list_devices(host: &cpal::Host) -> Result<Vec<DeviceInfo>> {
    let default_name = host.default_output_device().map(|d| device_label(&d));
    let devices = host.output_devices().context("enumerate output devices")?;
    let mut out = Vec::new();
    for d in devices {
        let name = device_label(&d);
        let (mut min_rate, mut max_rate) = (u32::MAX, 0u32);
        if let Ok(ranges) = d.supported_output_configs() {
            for r in ranges {
                min_rate = min_rate.min(r.min_sample_rate());
                max_rate = max_rate.max(r.max_sample_rate());
            }
        }
        if max_rate == 0 {
            tracing::debug!(device = %name, "device reports no output configs");
            min_rate = 0;
        }
        out.push(DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            min_rate,
            max_rate,
        });
    }
    Ok(out)
}

fn device_label(device: &cpal::Device) -> String {
    device
        .description()
        .map(|d| d.name().to_string())
        .unwrap_or_else(|_| "<unnamed>".to_string())
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

fn channel_penalty(source: u16, device: u16) -> u8 {
    match (source, device) {
        (s, d) if s == d => 0,
        (1, 2) | (2, 1) => 1,
        (s, d) if d > s => 2,
        _ => 3,
    }
}

fn sample_format_rank(format: cpal::SampleFormat) -> Option<u8> {
    match format {
        cpal::SampleFormat::F32 => Some(0),
        cpal::SampleFormat::I32 => Some(1),
        cpal::SampleFormat::I16 => Some(2),
        cpal::SampleFormat::U16 => Some(3),
        _ => None,
    }
}

fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: &Arc<SampleQueue>,
    paused: &Arc<AtomicBool>,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, queue, paused),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, queue, paused),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, queue, paused),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, queue, paused),
        other => Err(anyhow!("unsupported sample format: {other:?}")),
    }
}

/// The device callback never blocks: it takes what the queue has, maps channels, converts to
/// the device format, and pads with silence.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SampleQueue>,
    paused: &Arc<AtomicBool>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let dst_channels = config.channels as usize;
    let src_channels = queue.channels();
    let queue_cb = queue.clone();
    let queue_err = queue.clone();
    let paused = paused.clone();
    let mut scratch: Vec<f32> = Vec::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);
            if paused.load(Ordering::Relaxed) {
                data.fill(silence);
                return;
            }
            let frames = data.len() / dst_channels;
            scratch.resize(frames * src_channels, 0.0);
            let got = queue_cb.pop_into(&mut scratch) / src_channels;

            for (frame, out) in data.chunks_mut(dst_channels).enumerate() {
                if frame < got {
                    let src = &scratch[frame * src_channels..(frame + 1) * src_channels];
                    for (ch, sample) in out.iter_mut().enumerate() {
                        *sample = T::from_sample(map_channel(src, dst_channels, ch));
                    }
                } else {
                    out.fill(silence);
                }
            }
        },
        move |err| match err {
            cpal::StreamError::DeviceNotAvailable => {
                tracing::error!("output device disappeared");
                queue_err.close();
            }
            other => tracing::warn!("stream error: {other}"),
        },
        None,
    )?;
    Ok(stream)
}

/// Output sample for `dst_ch` of one source frame.
///
/// mono → stereo duplicates, stereo → mono averages, anything else clamps to the last
/// available source channel.
fn map_channel(src: &[f32], dst_channels: usize, dst_ch: usize) -> f32 {
    match (src.len(), dst_channels) {
        (2, 1) => 0.5 * (src[0] + src[1]),
        (0, _) => 0.0,
        (n, _) => src[dst_ch.min(n - 1)],
    }
}
