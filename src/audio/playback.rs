//! Audio playback with interrupt, looping, and fallback discipline
//!
//! cpal output streams are bound to their thread, so playback runs on a
//! dedicated worker that owns the sink; the [`AudioPlayer`] handle is cheap
//! to clone and safe to use from the control plane while the capture thread
//! is mid-playback.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate};

use crate::audio::{AudioFormat, pcm_to_samples, pcm_to_wav};
use crate::hub::HubExchangeResult;
use crate::{Error, Result};

/// Decoded mono audio ready for the sink
#[derive(Debug, Clone)]
pub struct PcmAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

/// What to play
#[derive(Debug, Clone)]
pub enum PlaybackSource {
    Pcm(PcmAudio),
    File(PathBuf),
}

/// Per-playback view of the player's shared state
///
/// Sinks poll `halted()` while playing so an interrupt or a superseding play
/// takes effect immediately.
pub struct PlaybackControl {
    shared: Arc<PlayerShared>,
    id: u64,
}

impl PlaybackControl {
    /// True once this playback has been interrupted or superseded
    #[must_use]
    pub fn halted(&self) -> bool {
        self.shared.active.load(Ordering::Acquire) != self.id
    }

    /// Current volume as a 0.0..=1.0 multiplier
    #[must_use]
    pub fn volume(&self) -> f32 {
        self.shared.volume.load(Ordering::Relaxed) as f32 / 100.0
    }
}

/// Playback backend capability
///
/// The production sink drives a cpal output stream; tests substitute a
/// scripted sink to observe interrupt behavior.
pub trait PlaybackSink {
    /// Play one audio buffer to completion or until `ctl.halted()`
    ///
    /// # Errors
    ///
    /// Returns error if the output device cannot play the buffer.
    fn play(&mut self, audio: &PcmAudio, ctl: &PlaybackControl) -> Result<()>;
}

struct PlayerShared {
    /// Id of the playback allowed to make sound; 0 means none
    active: AtomicU64,
    seq: AtomicU64,
    /// Software volume, 0..=100 percent
    volume: AtomicU32,
    pending: Mutex<usize>,
    idle: Condvar,
}

struct Job {
    source: PlaybackSource,
    id: u64,
    looping: bool,
    /// Cache file to replay if the primary playback fails
    fallback: Option<PathBuf>,
}

/// Plays ambient and response audio
///
/// Holds at most one actively playing resource; a new play request
/// supersedes the current one before starting.
#[derive(Clone)]
pub struct AudioPlayer {
    shared: Arc<PlayerShared>,
    tx: Sender<Job>,
    cache_path: PathBuf,
}

impl AudioPlayer {
    /// Spawn the playback worker over a cpal sink
    #[must_use]
    pub fn new(speaker_index: Option<usize>, cache_path: PathBuf) -> Self {
        Self::with_sink(Box::new(CpalSink { speaker_index }), cache_path)
    }

    /// Spawn the playback worker over a custom sink
    #[must_use]
    pub fn with_sink(sink: Box<dyn PlaybackSink + Send>, cache_path: PathBuf) -> Self {
        let shared = Arc::new(PlayerShared {
            active: AtomicU64::new(0),
            seq: AtomicU64::new(0),
            volume: AtomicU32::new(100),
            pending: Mutex::new(0),
            idle: Condvar::new(),
        });

        let (tx, rx) = mpsc::channel::<Job>();
        let worker_shared = Arc::clone(&shared);

        std::thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || worker_loop(&rx, &worker_shared, sink))
            .expect("failed to spawn playback worker");

        Self {
            shared,
            tx,
            cache_path,
        }
    }

    /// Play a source, superseding any current playback first
    ///
    /// With `asynchronous` false, blocks until playback finishes or is
    /// interrupted.
    pub fn play(&self, source: PlaybackSource, asynchronous: bool, looping: bool) {
        self.submit(source, asynchronous, looping, None);
    }

    /// Write the hub response to the cache file, then play it
    ///
    /// The cache write happens before playback so the file survives as a
    /// fallback path even if the primary sink fails.
    pub fn play_response(&self, response: &HubExchangeResult, asynchronous: bool) {
        let Some(samples) = pcm_to_samples(&response.audio, response.sample_width) else {
            tracing::warn!(
                sample_width = response.sample_width,
                "unsupported response sample width, skipping playback"
            );
            return;
        };

        if response.sample_width == 2 {
            let format = AudioFormat::mono16(response.sample_rate);
            let cached = pcm_to_wav(&response.audio, format)
                .and_then(|wav| std::fs::write(&self.cache_path, wav).map_err(Into::into));
            if let Err(e) = cached {
                tracing::warn!(error = %e, path = %self.cache_path.display(), "failed to cache response audio");
            }
        }

        self.submit(
            PlaybackSource::Pcm(PcmAudio {
                samples,
                sample_rate: response.sample_rate,
            }),
            asynchronous,
            false,
            Some(self.cache_path.clone()),
        );
    }

    fn submit(
        &self,
        source: PlaybackSource,
        asynchronous: bool,
        looping: bool,
        fallback: Option<PathBuf>,
    ) {
        let id = self.shared.seq.fetch_add(1, Ordering::AcqRel) + 1;
        // Supersede whatever is playing before the new job starts
        self.shared.active.store(id, Ordering::Release);

        if let Ok(mut pending) = self.shared.pending.lock() {
            *pending += 1;
        }

        if self
            .tx
            .send(Job {
                source,
                id,
                looping,
                fallback,
            })
            .is_err()
        {
            tracing::error!("playback worker is gone");
            self.finish_one();
            return;
        }

        if !asynchronous {
            self.wait_idle();
        }
    }

    /// Immediately halt any in-progress playback; idempotent
    pub fn interrupt(&self) {
        self.shared.active.store(0, Ordering::Release);
    }

    /// Set software volume as a percentage, clamped to 0..=100
    pub fn set_volume(&self, percent: u8) {
        self.shared
            .volume
            .store(u32::from(percent.min(100)), Ordering::Relaxed);
    }

    /// True while any playback job is queued or running
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.shared.pending.lock().map(|p| *p > 0).unwrap_or(false)
    }

    /// Block until all submitted jobs have drained
    pub fn wait_idle(&self) {
        let Ok(mut pending) = self.shared.pending.lock() else {
            return;
        };
        while *pending > 0 {
            let Ok(guard) = self.shared.idle.wait(pending) else {
                return;
            };
            pending = guard;
        }
    }

    fn finish_one(&self) {
        if let Ok(mut pending) = self.shared.pending.lock() {
            *pending = pending.saturating_sub(1);
        }
        self.shared.idle.notify_all();
    }
}

fn worker_loop(rx: &mpsc::Receiver<Job>, shared: &Arc<PlayerShared>, mut sink: Box<dyn PlaybackSink + Send>) {
    while let Ok(job) = rx.recv() {
        run_job(&job, shared, sink.as_mut());

        if let Ok(mut pending) = shared.pending.lock() {
            *pending = pending.saturating_sub(1);
        }
        shared.idle.notify_all();
    }
}

fn run_job(job: &Job, shared: &Arc<PlayerShared>, sink: &mut dyn PlaybackSink) {
    // Superseded while still queued
    if shared.active.load(Ordering::Acquire) != job.id {
        return;
    }

    let audio = match &job.source {
        PlaybackSource::Pcm(audio) => audio.clone(),
        PlaybackSource::File(path) => match read_wav(path) {
            Ok(audio) => audio,
            Err(e) => {
                tracing::error!(error = %e, path = %path.display(), "failed to load audio file");
                return;
            }
        },
    };

    loop {
        let ctl = PlaybackControl {
            shared: Arc::clone(shared),
            id: job.id,
        };

        if let Err(e) = sink.play(&audio, &ctl) {
            tracing::warn!(error = %e, "primary playback failed");
            play_fallback(job, shared, sink);
            return;
        }

        if !job.looping || ctl.halted() {
            return;
        }
    }
}

/// Replay the cached response file after a primary playback failure
///
/// A second failure is logged and swallowed.
fn play_fallback(job: &Job, shared: &Arc<PlayerShared>, sink: &mut dyn PlaybackSink) {
    let Some(path) = &job.fallback else {
        return;
    };

    let ctl = PlaybackControl {
        shared: Arc::clone(shared),
        id: job.id,
    };

    let result = read_wav(path).and_then(|audio| sink.play(&audio, &ctl));
    if let Err(e) = result {
        tracing::error!(error = %e, path = %path.display(), "fallback playback failed");
    }
}

/// Read a mono WAV file into playable samples
///
/// # Errors
///
/// Returns error if the file cannot be read or decoded.
pub fn read_wav(path: &Path) -> Result<PcmAudio> {
    let bytes = std::fs::read(path)?;
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let samples: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Int => reader.samples::<i16>().collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| {
                s.map(|v| {
                    #[allow(clippy::cast_possible_truncation)]
                    let sample = (v * 32767.0).clamp(-32768.0, 32767.0) as i16;
                    sample
                })
            })
            .collect::<std::result::Result<_, _>>()?,
    };

    // Downmix to mono if needed
    let samples = if spec.channels > 1 {
        samples
            .chunks(spec.channels as usize)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
                #[allow(clippy::cast_possible_truncation)]
                let avg = (sum / frame.len() as i32) as i16;
                avg
            })
            .collect()
    } else {
        samples
    };

    Ok(PcmAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// cpal-backed sink; opens the output device per play like the capture side
struct CpalSink {
    speaker_index: Option<usize>,
}

impl CpalSink {
    fn output_device(&self) -> Result<Device> {
        let host = cpal::default_host();

        match self.speaker_index {
            Some(index) => host
                .output_devices()
                .map_err(|e| Error::Playback(e.to_string()))?
                .nth(index)
                .ok_or_else(|| {
                    Error::Playback(format!("output device index {index} out of range"))
                }),
            None => host
                .default_output_device()
                .ok_or_else(|| Error::Playback("no output device available".to_string())),
        }
    }
}

impl PlaybackSink for CpalSink {
    fn play(&mut self, audio: &PcmAudio, ctl: &PlaybackControl) -> Result<()> {
        if audio.samples.is_empty() {
            return Ok(());
        }

        let device = self.output_device()?;
        let rate = SampleRate(audio.sample_rate);

        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::Playback(e.to_string()))?
            .find(|c| c.channels() == 1 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            .or_else(|| {
                // Fallback: try stereo
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| c.channels() == 2 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            })
            .ok_or_else(|| {
                Error::Playback(format!(
                    "no output configuration supports {} Hz",
                    audio.sample_rate
                ))
            })?;

        let config = supported.with_sample_rate(rate).config();
        let channels = config.channels as usize;

        let samples = Arc::new(audio.samples.clone());
        let position = Arc::new(AtomicU64::new(0));
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let cb_samples = Arc::clone(&samples);
        let cb_position = Arc::clone(&position);
        let cb_finished = Arc::clone(&finished);
        let volume = ctl.volume();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    #[allow(clippy::cast_possible_truncation)]
                    let mut pos = cb_position.load(Ordering::Relaxed) as usize;

                    for frame in data.chunks_mut(channels) {
                        let sample = if pos < cb_samples.len() {
                            f32::from(cb_samples[pos]) / 32768.0 * volume
                        } else {
                            cb_finished.store(true, Ordering::Release);
                            0.0
                        };

                        for out in frame.iter_mut() {
                            *out = sample;
                        }

                        if pos < cb_samples.len() {
                            pos += 1;
                        }
                    }

                    cb_position.store(pos as u64, Ordering::Relaxed);
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Playback(e.to_string()))?;

        stream.play().map_err(|e| Error::Playback(e.to_string()))?;

        // Poll for completion, bounded by the buffer duration plus slack
        let duration_ms = audio.samples.len() as u64 * 1000 / u64::from(audio.sample_rate);
        let deadline = std::time::Instant::now() + Duration::from_millis(duration_ms + 500);

        while !finished.load(Ordering::Acquire) && !ctl.halted() {
            if std::time::Instant::now() > deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        drop(stream);
        Ok(())
    }
}

/// Short rising two-tone cue played when the node starts listening
#[must_use]
pub fn activation_cue(sample_rate: u32) -> PcmAudio {
    let mut samples = tone(sample_rate, 660.0, 0.07);
    samples.extend(tone(sample_rate, 880.0, 0.07));
    PcmAudio {
        samples,
        sample_rate,
    }
}

/// Short falling two-tone cue played when capture ends
#[must_use]
pub fn deactivation_cue(sample_rate: u32) -> PcmAudio {
    let mut samples = tone(sample_rate, 880.0, 0.07);
    samples.extend(tone(sample_rate, 660.0, 0.07));
    PcmAudio {
        samples,
        sample_rate,
    }
}

/// Repeated beeps for timer expiry
#[must_use]
pub fn alert_tone(sample_rate: u32) -> PcmAudio {
    let gap = vec![0i16; (sample_rate as f32 * 0.15) as usize];
    let mut samples = Vec::new();
    for _ in 0..3 {
        samples.extend(tone(sample_rate, 988.0, 0.25));
        samples.extend(&gap);
    }
    PcmAudio {
        samples,
        sample_rate,
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn tone(sample_rate: u32, frequency: f32, duration_secs: f32) -> Vec<i16> {
    let count = (sample_rate as f32 * duration_secs) as usize;
    (0..count)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let value = (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3;
            (value * 32767.0) as i16
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cues_are_nonempty_and_bounded() {
        let cue = activation_cue(16_000);
        assert!(!cue.samples.is_empty());
        assert!(cue.samples.len() < 16_000);

        let alert = alert_tone(16_000);
        assert!(alert.samples.len() > cue.samples.len());
    }

    #[test]
    fn volume_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let player = AudioPlayer::new(None, dir.path().join("response.wav"));

        player.set_volume(250);
        let ctl = PlaybackControl {
            shared: Arc::clone(&player.shared),
            id: 1,
        };
        assert!((ctl.volume() - 1.0).abs() < f32::EPSILON);

        player.set_volume(50);
        assert!((ctl.volume() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn interrupt_with_nothing_playing_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let player = AudioPlayer::new(None, dir.path().join("response.wav"));

        player.interrupt();
        player.interrupt();
        assert!(!player.is_playing());
    }
}
