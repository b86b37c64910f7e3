//! Wake word scoring over capture frames

use std::path::Path;

use rustpotter::{Rustpotter, RustpotterConfig, SampleFormat};

use crate::{Error, Result};

/// A wake word trigger with the score that crossed the threshold
#[derive(Debug, Clone)]
pub struct WakeDetection {
    pub name: String,
    pub score: f32,
}

/// Opaque wake word scoring capability
///
/// Implementations own a pretrained model bound to a single wake word and a
/// confidence threshold; the listener only sees trigger events.
pub trait WakeScorer {
    /// Feed one capture frame of samples; returns a detection when the
    /// model's confidence exceeds the threshold
    fn feed(&mut self, samples: &[i16]) -> Option<WakeDetection>;

    /// Clear buffered audio and pending model state between attempts
    fn reset(&mut self);
}

/// Rustpotter-backed wake word engine
///
/// Buffers incoming capture frames into the detector's required frame size,
/// retaining remainders across calls.
pub struct RustpotterScorer {
    detector: Rustpotter,
    pending: Vec<f32>,
    frame_len: usize,
}

impl RustpotterScorer {
    /// Load the model for `wake_word` from the model directory
    ///
    /// The model file is `<model_dir>/<wake_word>.rpw`. The noise
    /// suppression toggle enables the detector's gain-normalizer and
    /// band-pass filters.
    ///
    /// # Errors
    ///
    /// Returns `ModelNotFound` if the model file does not exist, or a wake
    /// word error if the detector rejects it.
    pub fn new(
        model_dir: &Path,
        wake_word: &str,
        confidence_threshold: f32,
        sample_rate: u32,
        noise_suppression: bool,
    ) -> Result<Self> {
        let model_path = model_dir.join(format!("{wake_word}.rpw"));
        if !model_path.exists() {
            return Err(Error::ModelNotFound(format!(
                "{wake_word} ({})",
                model_path.display()
            )));
        }

        let mut config = RustpotterConfig::default();
        config.fmt.sample_rate = sample_rate as usize;
        config.fmt.channels = 1;
        config.fmt.sample_format = SampleFormat::F32;
        config.detector.threshold = confidence_threshold;
        if noise_suppression {
            config.filters.gain_normalizer.enabled = true;
            config.filters.band_pass.enabled = true;
        }

        let mut detector =
            Rustpotter::new(&config).map_err(|e| Error::WakeWord(e.to_string()))?;
        detector
            .add_wakeword_from_file(wake_word, &model_path.to_string_lossy())
            .map_err(|e| Error::WakeWord(e.to_string()))?;

        let frame_len = detector.get_samples_per_frame();

        tracing::info!(
            wake_word,
            model = %model_path.display(),
            threshold = confidence_threshold,
            sample_rate,
            "wake word model loaded"
        );

        Ok(Self {
            detector,
            pending: Vec::new(),
            frame_len,
        })
    }
}

impl WakeScorer for RustpotterScorer {
    fn feed(&mut self, samples: &[i16]) -> Option<WakeDetection> {
        self.pending
            .extend(samples.iter().map(|&s| f32::from(s) / 32768.0));

        while self.pending.len() >= self.frame_len {
            let chunk: Vec<f32> = self.pending.drain(..self.frame_len).collect();
            if let Some(detection) = self.detector.process_samples(chunk) {
                tracing::debug!(
                    name = %detection.name,
                    score = detection.score,
                    "wake word detected"
                );
                return Some(WakeDetection {
                    name: detection.name.clone(),
                    score: detection.score,
                });
            }
        }

        None
    }

    fn reset(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_file_is_model_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = RustpotterScorer::new(dir.path(), "hey outpost", 0.5, 16_000, false);

        assert!(matches!(result, Err(Error::ModelNotFound(_))));
    }
}
