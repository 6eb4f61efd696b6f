//! Microphone capture via cpal.
//!
//! cpal streams are not `Send`, so each recording owns a dedicated thread that
//! builds the input stream, meters it and writes the WAV file once told to stop.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use hound::{WavSpec, WavWriter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::capture::{CaptureBackend, CaptureHandle, CaptureRequest};
use super::format::EncodingConfig;
use super::level_monitor::{LevelSample, DB_FLOOR};
use super::resample::resample;
use crate::diagnostics::DiagnosticLog;

/// RMS amplitude in `[0, 1]` to dBFS, floored at the platform minimum.
pub fn rms_to_dbfs(rms: f32) -> f32 {
    if rms <= 0.0 || !rms.is_finite() {
        return DB_FLOOR;
    }
    (20.0 * rms.log10()).clamp(DB_FLOOR, 0.0)
}

/// Turns a continuous mono stream into one `LevelSample` per interval.
#[derive(Debug, Clone)]
pub struct LevelWindow {
    sample_rate: u32,
    frames_per_sample: usize,
    sum_squares: f64,
    count: usize,
    frames_seen: u64,
}

impl LevelWindow {
    pub fn new(sample_rate: u32, interval: Duration) -> Self {
        let frames = (sample_rate as u128 * interval.as_millis() / 1000) as usize;
        Self {
            sample_rate: sample_rate.max(1),
            frames_per_sample: frames.max(1),
            sum_squares: 0.0,
            count: 0,
            frames_seen: 0,
        }
    }

    pub fn push(&mut self, frames: &[f32]) -> Vec<LevelSample> {
        let mut levels = Vec::new();
        for &frame in frames {
            self.sum_squares += (frame as f64) * (frame as f64);
            self.count += 1;
            self.frames_seen += 1;

            if self.count >= self.frames_per_sample {
                let rms = (self.sum_squares / self.count as f64).sqrt() as f32;
                let timestamp_ms = self.frames_seen * 1000 / self.sample_rate as u64;
                levels.push(LevelSample::new(rms_to_dbfs(rms), timestamp_ms));
                self.sum_squares = 0.0;
                self.count = 0;
            }
        }
        levels
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CpalCaptureBackend;

impl CpalCaptureBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CaptureBackend for CpalCaptureBackend {
    async fn open(&self, request: CaptureRequest) -> Result<Box<dyn CaptureHandle>> {
        if !request.format.is_wav() {
            bail!(
                "{:?} recordings are not supported by the microphone backend",
                request.format.container
            );
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();

        std::thread::Builder::new()
            .name("voicecheck-capture".to_string())
            .spawn(move || run_capture(request, ready_tx, stop_rx, done_tx))
            .context("Failed to spawn capture thread")?;

        ready_rx
            .await
            .context("Capture thread exited during startup")??;

        Ok(Box::new(CpalCaptureHandle {
            stop_tx: Some(stop_tx),
            done_rx: Some(done_rx),
        }))
    }
}

struct CpalCaptureHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    done_rx: Option<oneshot::Receiver<Result<Option<PathBuf>>>>,
}

#[async_trait]
impl CaptureHandle for CpalCaptureHandle {
    async fn finish(mut self: Box<Self>) -> Result<Option<PathBuf>> {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }

        match self.done_rx.take() {
            Some(done) => done
                .await
                .context("Capture thread exited without finalizing")?,
            None => Ok(None),
        }
    }
}

impl Drop for CpalCaptureHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop_tx.take() {
            debug!("Dropping active capture handle, stopping stream");
            let _ = stop.send(());
        }
    }
}

type Buffer = Arc<Mutex<Vec<f32>>>;

fn run_capture(
    request: CaptureRequest,
    ready_tx: oneshot::Sender<Result<()>>,
    stop_rx: oneshot::Receiver<()>,
    done_tx: oneshot::Sender<Result<Option<PathBuf>>>,
) {
    let CaptureRequest {
        path,
        format,
        sample_interval,
        samples,
        log,
    } = request;

    let (stream, buffer, native_rate) = match open_input_stream(sample_interval, samples, log) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));

    // Either an explicit stop or the handle being dropped.
    let _ = stop_rx.blocking_recv();

    debug!("Stopping microphone stream");
    drop(stream);

    let captured = {
        let mut guard = buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *guard)
    };

    info!("Microphone stopped, {} samples captured", captured.len());
    let result = write_recording(&path, &format, &captured, native_rate).map(|_| Some(path));
    let _ = done_tx.send(result);
}

fn open_input_stream(
    interval: Duration,
    samples: mpsc::UnboundedSender<LevelSample>,
    log: DiagnosticLog,
) -> Result<(cpal::Stream, Buffer, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .context("No input device available")?;
    let supported = device
        .default_input_config()
        .context("Failed to query input device configuration")?;

    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let native_rate = config.sample_rate.0;

    info!(
        "Recording from {} at {}Hz ({} channels)",
        device.name().unwrap_or_else(|_| "unknown".to_string()),
        native_rate,
        config.channels
    );

    let buffer: Buffer = Arc::new(Mutex::new(Vec::new()));
    let window = LevelWindow::new(native_rate, interval);

    let stream = match sample_format {
        SampleFormat::F32 => build_input::<f32>(&device, &config, buffer.clone(), window, samples, log),
        SampleFormat::I16 => build_input::<i16>(&device, &config, buffer.clone(), window, samples, log),
        SampleFormat::U16 => build_input::<u16>(&device, &config, buffer.clone(), window, samples, log),
        other => bail!("Unsupported input sample format {:?}", other),
    }?;

    stream.play().context("Failed to start input stream")?;
    Ok((stream, buffer, native_rate))
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    buffer: Buffer,
    mut window: LevelWindow,
    samples: mpsc::UnboundedSender<LevelSample>,
    log: DiagnosticLog,
) -> Result<cpal::Stream>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = (config.channels as usize).max(1);
    let err_fn = move |err: cpal::StreamError| log.error(format!("Microphone stream error: {err}"));

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let mono: Vec<f32> = data
                .chunks(channels)
                .map(|frame| {
                    frame.iter().map(|&s| s.to_sample::<f32>()).sum::<f32>() / frame.len() as f32
                })
                .collect();

            for level in window.push(&mono) {
                if samples.send(level).is_err() {
                    break;
                }
            }

            if let Ok(mut captured) = buffer.lock() {
                captured.extend_from_slice(&mono);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Writes `samples` (mono, `native_rate`) to `path` in the requested encoding.
/// Nothing captured produces a zero-length file.
pub fn write_recording(
    path: &Path,
    format: &EncodingConfig,
    samples: &[f32],
    native_rate: u32,
) -> Result<()> {
    if samples.is_empty() {
        std::fs::File::create(path)
            .with_context(|| format!("Failed to create recording {:?}", path))?;
        return Ok(());
    }

    let resampled = resample(samples, native_rate, format.sample_rate);
    let sample_format = match format.bits_per_sample {
        16 => hound::SampleFormat::Int,
        32 => hound::SampleFormat::Float,
        other => bail!("Unsupported WAV bit depth {}", other),
    };
    let spec = WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: format.bits_per_sample,
        sample_format,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create recording {:?}", path))?;
    for &sample in &resampled {
        let clamped = sample.clamp(-1.0, 1.0);
        for _ in 0..format.channels {
            match sample_format {
                hound::SampleFormat::Int => writer.write_sample((clamped * i16::MAX as f32) as i16)?,
                hound::SampleFormat::Float => writer.write_sample(clamped)?,
            }
        }
    }
    writer.finalize()?;

    info!("Recording saved: {:?} ({} samples)", path, resampled.len());
    Ok(())
}
