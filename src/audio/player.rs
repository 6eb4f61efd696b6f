//! Playback backend abstraction and the cpal/hound implementation.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::resample::{downmix, resample};

#[async_trait]
pub trait PlaybackBackend: Send + Sync {
    /// Decode `path` and allocate a player for it.
    async fn load(&self, path: &Path) -> Result<Box<dyn PlaybackHandle>>;
}

#[async_trait]
pub trait PlaybackHandle: Send {
    /// Begin output. The returned receiver resolves when the media reaches its
    /// natural end; it is dropped unresolved if playback is stopped early.
    async fn play(&mut self) -> Result<oneshot::Receiver<()>>;

    /// Stop output if running and release the device.
    async fn stop(self: Box<Self>) -> Result<()>;

    fn duration_ms(&self) -> u64;
}

/// Decoded mono PCM.
#[derive(Debug, Clone)]
pub struct Clip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Clip {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

pub fn read_wav(path: &Path) -> Result<Clip> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .context("Failed to decode WAV samples")?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .context("Failed to decode WAV samples")?
        }
    };

    Ok(Clip {
        samples: downmix(&interleaved, spec.channels as usize),
        sample_rate: spec.sample_rate,
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CpalPlaybackBackend;

impl CpalPlaybackBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PlaybackBackend for CpalPlaybackBackend {
    async fn load(&self, path: &Path) -> Result<Box<dyn PlaybackHandle>> {
        let owned = path.to_path_buf();
        let clip = tokio::task::spawn_blocking(move || read_wav(&owned))
            .await
            .context("WAV decoder task failed")??;

        info!(
            "Loaded {:?}: {} samples at {}Hz",
            path,
            clip.samples.len(),
            clip.sample_rate
        );

        Ok(Box::new(CpalPlaybackHandle {
            path: path.to_path_buf(),
            clip: Arc::new(clip),
            control: None,
            exited: None,
        }))
    }
}

enum PlayerControl {
    Finished,
    Stop,
}

struct CpalPlaybackHandle {
    path: PathBuf,
    clip: Arc<Clip>,
    control: Option<std_mpsc::Sender<PlayerControl>>,
    exited: Option<oneshot::Receiver<()>>,
}

#[async_trait]
impl PlaybackHandle for CpalPlaybackHandle {
    async fn play(&mut self) -> Result<oneshot::Receiver<()>> {
        if self.control.is_some() {
            bail!("Playback of {:?} already started", self.path);
        }

        let (control_tx, control_rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (complete_tx, complete_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = oneshot::channel();

        let clip = Arc::clone(&self.clip);
        let callback_control = control_tx.clone();
        std::thread::Builder::new()
            .name("voicecheck-playback".to_string())
            .spawn(move || {
                run_player(clip, callback_control, control_rx, ready_tx, complete_tx);
                let _ = exited_tx.send(());
            })
            .context("Failed to spawn playback thread")?;

        ready_rx
            .await
            .context("Playback thread exited during startup")??;

        self.control = Some(control_tx);
        self.exited = Some(exited_rx);
        Ok(complete_rx)
    }

    async fn stop(mut self: Box<Self>) -> Result<()> {
        if let Some(control) = self.control.take() {
            // Already gone if playback finished on its own.
            let _ = control.send(PlayerControl::Stop);
        }
        if let Some(exited) = self.exited.take() {
            if exited.await.is_err() {
                warn!("Playback thread for {:?} ended abnormally", self.path);
            }
        }
        debug!("Playback of {:?} released", self.path);
        Ok(())
    }

    fn duration_ms(&self) -> u64 {
        self.clip.duration_ms()
    }
}

fn run_player(
    clip: Arc<Clip>,
    callback_control: std_mpsc::Sender<PlayerControl>,
    control_rx: std_mpsc::Receiver<PlayerControl>,
    ready_tx: oneshot::Sender<Result<()>>,
    complete_tx: oneshot::Sender<()>,
) {
    let stream = match open_output_stream(&clip, callback_control) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));

    let finished = matches!(control_rx.recv(), Ok(PlayerControl::Finished));
    drop(stream);

    if finished {
        let _ = complete_tx.send(());
    }
}

fn open_output_stream(
    clip: &Clip,
    control: std_mpsc::Sender<PlayerControl>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("No output device available")?;
    let supported = device
        .default_output_config()
        .context("Failed to query output device configuration")?;

    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let pcm = Arc::new(resample(&clip.samples, clip.sample_rate, config.sample_rate.0));

    let stream = match sample_format {
        SampleFormat::F32 => build_output::<f32>(&device, &config, pcm, control),
        SampleFormat::I16 => build_output::<i16>(&device, &config, pcm, control),
        SampleFormat::U16 => build_output::<u16>(&device, &config, pcm, control),
        other => bail!("Unsupported output sample format {:?}", other),
    }?;

    stream.play().context("Failed to start output stream")?;
    Ok(stream)
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    pcm: Arc<Vec<f32>>,
    control: std_mpsc::Sender<PlayerControl>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = (config.channels as usize).max(1);
    let mut cursor = 0usize;
    let mut finished = false;
    let err_fn = |err: cpal::StreamError| warn!("Playback stream error: {}", err);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            for frame in data.chunks_mut(channels) {
                let value = pcm.get(cursor).copied().unwrap_or(0.0);
                if cursor < pcm.len() {
                    cursor += 1;
                }
                for out in frame.iter_mut() {
                    *out = T::from_sample(value);
                }
            }

            if cursor >= pcm.len() && !finished {
                finished = true;
                let _ = control.send(PlayerControl::Finished);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn write_wav(path: &Path, channels: u16, samples: &[i16]) {
        let spec = WavSpec {
            channels,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_read_wav_scales_int_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        write_wav(&path, 1, &[0, 16384, -16384]);

        let clip = read_wav(&path).unwrap();
        assert_eq!(clip.sample_rate, 8000);
        assert_eq!(clip.samples, vec![0.0, 0.5, -0.5]);
    }

    #[test]
    fn test_read_wav_downmixes_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 2, &[16384, 0, 16384, 16384]);

        let clip = read_wav(&path).unwrap();
        assert_eq!(clip.samples, vec![0.25, 0.5]);
    }

    #[test]
    fn test_read_wav_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.wav");
        std::fs::write(&path, b"not a wav file").unwrap();
        assert!(read_wav(&path).is_err());
    }

    #[test]
    fn test_clip_duration() {
        let clip = Clip {
            samples: vec![0.0; 16_000],
            sample_rate: 16_000,
        };
        assert_eq!(clip.duration_ms(), 1000);
    }
}
