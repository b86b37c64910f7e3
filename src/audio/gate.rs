//! Voice activity classification over capture frames

use earshot::{VoiceActivityDetector, VoiceActivityProfile};

use crate::audio::AudioFrame;
use crate::{Error, Result};

/// Frame-level speech/silence classifier
///
/// Classifiers consume windows of their own preferred size, which is usually
/// smaller than a capture frame; [`VoiceActivityGate`] handles the
/// re-chunking.
pub trait SpeechClassifier {
    /// Samples per classifier window
    fn window_len(&self) -> usize;

    /// Classify one window as speech
    fn is_speech(&mut self, window: &[i16]) -> bool;

    /// Clear internal classifier state
    fn reset(&mut self);
}

/// WebRTC-style VAD adapter over `earshot`
pub struct WebRtcClassifier {
    detector: VoiceActivityDetector,
    sample_rate: u32,
    window_len: usize,
}

impl WebRtcClassifier {
    /// Build a classifier at the capture rate with the given sensitivity
    ///
    /// Sensitivity 0 is the most permissive profile, 3 the most aggressive,
    /// matching the underlying detector's modes.
    ///
    /// # Errors
    ///
    /// Returns error if the capture rate is not a WebRTC VAD rate.
    pub fn new(sample_rate: u32, sensitivity: u8) -> Result<Self> {
        if !matches!(sample_rate, 8_000 | 16_000 | 32_000 | 48_000) {
            return Err(Error::VoiceActivity(format!(
                "unsupported classifier rate {sample_rate}"
            )));
        }

        let profile = match sensitivity {
            0 => VoiceActivityProfile::QUALITY,
            1 => VoiceActivityProfile::LBR,
            2 => VoiceActivityProfile::AGGRESSIVE,
            _ => VoiceActivityProfile::VERY_AGGRESSIVE,
        };

        // 10ms windows, the smallest the detector accepts
        let window_len = (sample_rate / 100) as usize;

        Ok(Self {
            detector: VoiceActivityDetector::new(profile),
            sample_rate,
            window_len,
        })
    }
}

impl SpeechClassifier for WebRtcClassifier {
    fn window_len(&self) -> usize {
        self.window_len
    }

    fn is_speech(&mut self, window: &[i16]) -> bool {
        let prediction = match self.sample_rate {
            8_000 => self.detector.predict_8khz(window),
            16_000 => self.detector.predict_16khz(window),
            32_000 => self.detector.predict_32khz(window),
            _ => self.detector.predict_48khz(window),
        };

        prediction.unwrap_or(false)
    }

    fn reset(&mut self) {
        self.detector.reset();
    }
}

/// Classifies capture frames as speech or silence
///
/// Re-chunks each frame into classifier-sized windows, retaining any
/// undersized remainder across calls so no audio is skipped. Speech in any
/// window makes the whole frame speech. The engaged-mode minimum listening
/// window is applied through the `force` flag: the classifier is still fed
/// (keeping its state warm) but the decision is overridden.
pub struct VoiceActivityGate {
    classifier: Box<dyn SpeechClassifier + Send>,
    pending: Vec<i16>,
}

impl VoiceActivityGate {
    #[must_use]
    pub fn new(classifier: Box<dyn SpeechClassifier + Send>) -> Self {
        Self {
            classifier,
            pending: Vec::new(),
        }
    }

    /// Classify one capture frame
    pub fn classify(&mut self, frame: &AudioFrame, force_speech: bool) -> bool {
        self.pending.extend_from_slice(&frame.samples);

        let window_len = self.classifier.window_len();
        let mut speech = false;
        while self.pending.len() >= window_len {
            let window: Vec<i16> = self.pending.drain(..window_len).collect();
            speech |= self.classifier.is_speech(&window);
        }

        speech || force_speech
    }

    /// Drop the re-chunk remainder and reset the classifier
    pub fn reset(&mut self) {
        self.pending.clear();
        self.classifier.reset();
    }
}
