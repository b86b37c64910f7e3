//! Microphone capture stream with fixed-duration framing

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, SupportedStreamConfigRange};

use crate::audio::{AudioFormat, AudioFrame, PREFERRED_RATES};
use crate::{Error, Result};

/// Source of fixed-duration PCM frames
///
/// The production implementation is [`AudioStream`]; tests drive the listener
/// with scripted sources.
pub trait FrameSource {
    /// Negotiated capture format
    fn format(&self) -> AudioFormat;

    /// Block until one full frame of audio is available
    ///
    /// Never returns a partial frame.
    ///
    /// # Errors
    ///
    /// Returns error once the stream is closed or the device fails.
    fn frame(&mut self) -> Result<AudioFrame>;

    /// Discard buffered-but-unread audio and resume from a clean boundary
    fn reset(&mut self);
}

/// Sample queue shared with the cpal callback
struct SampleQueue {
    samples: Mutex<VecDeque<i16>>,
    available: Condvar,
    closed: AtomicBool,
}

impl SampleQueue {
    fn new() -> Self {
        Self {
            samples: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn push(&self, data: &[i16]) {
        if let Ok(mut queue) = self.samples.lock() {
            queue.extend(data.iter().copied());
        }
        self.available.notify_all();
    }

    fn take(&self, count: usize) -> Result<Vec<i16>> {
        let mut queue = self
            .samples
            .lock()
            .map_err(|_| Error::Audio("sample queue poisoned".to_string()))?;

        loop {
            if queue.len() >= count {
                return Ok(queue.drain(..count).collect());
            }
            if self.closed.load(Ordering::Acquire) {
                return Err(Error::Audio("capture stream closed".to_string()));
            }
            let (guard, _) = self
                .available
                .wait_timeout(queue, Duration::from_millis(250))
                .map_err(|_| Error::Audio("sample queue poisoned".to_string()))?;
            queue = guard;
        }
    }

    fn clear(&self) {
        if let Ok(mut queue) = self.samples.lock() {
            queue.clear();
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.available.notify_all();
    }
}

/// Owns the microphone device and produces a continuous, restartable
/// sequence of fixed-duration frames
///
/// Not `Send`: cpal streams are bound to the thread that created them, so
/// the stream lives on the capture thread for its whole lifetime.
pub struct AudioStream {
    format: AudioFormat,
    queue: Arc<SampleQueue>,
    stream: Option<Stream>,
}

impl AudioStream {
    /// Open the input device and negotiate a capture rate
    ///
    /// Probes the preference-ordered rate list against the device's mono
    /// input configurations.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnsupported` if no preferred rate is usable, or an
    /// audio error if the device cannot be opened.
    pub fn open(mic_index: Option<usize>) -> Result<Self> {
        let device = input_device(mic_index)?;

        let (range, rate) = negotiate_rate(&device)?;
        let format = AudioFormat::mono16(rate);

        let supported = range.with_sample_rate(SampleRate(rate));
        let sample_format = supported.sample_format();
        let config = supported.config();

        let queue = Arc::new(SampleQueue::new());
        let callback_queue = Arc::clone(&queue);

        let err_fn = |err| {
            tracing::error!(error = %err, "audio capture error");
        };

        let stream = match sample_format {
            SampleFormat::I16 => device
                .build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        callback_queue.push(data);
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?,
            SampleFormat::F32 => device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let converted: Vec<i16> = data
                            .iter()
                            .map(|&s| {
                                #[allow(clippy::cast_possible_truncation)]
                                let sample = (s * 32767.0).clamp(-32768.0, 32767.0) as i16;
                                sample
                            })
                            .collect();
                        callback_queue.push(&converted);
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?,
            other => {
                return Err(Error::Audio(format!(
                    "unsupported input sample format {other:?}"
                )));
            }
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::info!(
            device = device.name().unwrap_or_default(),
            sample_rate = rate,
            frame_len = format.frame_len(),
            "microphone stream started"
        );

        Ok(Self {
            format,
            queue,
            stream: Some(stream),
        })
    }

    /// Stop capture and release the device
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.queue.close();
            drop(stream);
            tracing::debug!("microphone stream closed");
        }
    }
}

impl FrameSource for AudioStream {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn frame(&mut self) -> Result<AudioFrame> {
        let samples = self.queue.take(self.format.frame_len())?;
        Ok(AudioFrame::new(samples, self.format))
    }

    fn reset(&mut self) {
        self.queue.clear();
    }
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// Select the input device by index, or the host default
fn input_device(mic_index: Option<usize>) -> Result<Device> {
    let host = cpal::default_host();

    match mic_index {
        Some(index) => host
            .input_devices()
            .map_err(|e| Error::Audio(e.to_string()))?
            .nth(index)
            .ok_or_else(|| Error::Audio(format!("input device index {index} out of range"))),
        None => host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string())),
    }
}

/// Probe preferred rates against the device's mono input configurations
fn negotiate_rate(device: &Device) -> Result<(SupportedStreamConfigRange, u32)> {
    let ranges: Vec<SupportedStreamConfigRange> = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter(|c| {
            c.channels() == 1
                && matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::F32)
        })
        .collect();

    for &rate in PREFERRED_RATES {
        if let Some(range) = ranges
            .iter()
            .find(|c| c.min_sample_rate() <= SampleRate(rate) && c.max_sample_rate() >= SampleRate(rate))
        {
            return Ok((range.clone(), rate));
        }
    }

    Err(Error::DeviceUnsupported(format!(
        "no mono input configuration supports any of {PREFERRED_RATES:?}"
    )))
}
