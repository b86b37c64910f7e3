//! Audio capture, gating, wake scoring, and playback
//!
//! The capture side produces fixed-duration PCM frames; the gate and wake
//! engine consume them through narrow capability traits so the listener can
//! be exercised without hardware.

pub mod devices;
mod frame;
mod gate;
mod playback;
mod stream;
mod wake;

pub use frame::{
    AudioFormat, AudioFrame, FRAME_MS, PREFERRED_RATES, frames_to_bytes, pcm_to_samples,
    pcm_to_wav,
};
pub use gate::{SpeechClassifier, VoiceActivityGate, WebRtcClassifier};
pub use playback::{
    AudioPlayer, PcmAudio, PlaybackControl, PlaybackSink, PlaybackSource, activation_cue,
    alert_tone, deactivation_cue, read_wav,
};
pub use stream::{AudioStream, FrameSource};
pub use wake::{RustpotterScorer, WakeDetection, WakeScorer};
