//! Listener state machine tests
//!
//! Drive the capture pipeline with scripted sources, classifiers, and wake
//! scorers so no audio hardware is needed.

use std::collections::VecDeque;
use std::time::Duration;

use outpost::audio::{
    AudioFormat, AudioFrame, FrameSource, SpeechClassifier, VoiceActivityGate, WakeDetection,
    WakeScorer,
};
use outpost::listener::{Listener, ListenerTuning};
use outpost::node::StopToken;

const FORMAT: AudioFormat = AudioFormat::mono16(16_000);

/// Loud enough that the scripted classifier calls it speech
const SPEECH_LEVEL: i16 = 5_000;

fn silent_frame() -> AudioFrame {
    AudioFrame::new(vec![0; FORMAT.frame_len()], FORMAT)
}

fn speech_frame() -> AudioFrame {
    AudioFrame::new(vec![SPEECH_LEVEL; FORMAT.frame_len()], FORMAT)
}

/// Frame source playing back a fixed script, erroring when exhausted
struct ScriptedSource {
    frames: VecDeque<AudioFrame>,
    resets: usize,
}

impl ScriptedSource {
    fn new(frames: Vec<AudioFrame>) -> Self {
        Self {
            frames: frames.into(),
            resets: 0,
        }
    }
}

impl FrameSource for ScriptedSource {
    fn format(&self) -> AudioFormat {
        FORMAT
    }

    fn frame(&mut self) -> outpost::Result<AudioFrame> {
        self.frames
            .pop_front()
            .ok_or_else(|| outpost::Error::Audio("script exhausted".to_string()))
    }

    fn reset(&mut self) {
        self.resets += 1;
    }
}

/// Amplitude-threshold classifier with frame-sized windows
struct AmplitudeClassifier;

impl SpeechClassifier for AmplitudeClassifier {
    fn window_len(&self) -> usize {
        FORMAT.frame_len()
    }

    fn is_speech(&mut self, window: &[i16]) -> bool {
        window.iter().any(|&s| s.abs() >= SPEECH_LEVEL)
    }

    fn reset(&mut self) {}
}

/// Wake scorer that triggers on the first frame fed after each reset
struct InstantWake;

impl WakeScorer for InstantWake {
    fn feed(&mut self, _samples: &[i16]) -> Option<WakeDetection> {
        Some(WakeDetection {
            name: "hey outpost".to_string(),
            score: 0.9,
        })
    }

    fn reset(&mut self) {}
}

/// Wake scorer that never triggers
struct DeafWake;

impl WakeScorer for DeafWake {
    fn feed(&mut self, _samples: &[i16]) -> Option<WakeDetection> {
        None
    }

    fn reset(&mut self) {}
}

fn tuning() -> ListenerTuning {
    ListenerTuning {
        pre_buffer_frames: 10,
        hangover_frames: 20,
        min_utterance_frames: 40,
        pre_roll_frames: 0,
        start_window_frames: 100,
        engaged_delay: Duration::ZERO,
        wakeup_sound: false,
    }
}

fn listener(wake: Box<dyn WakeScorer>, tuning: ListenerTuning) -> (Listener, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let player = outpost::audio::AudioPlayer::new(None, dir.path().join("response.wav"));
    let gate = VoiceActivityGate::new(Box::new(AmplitudeClassifier));
    (
        Listener::new(wake, gate, tuning, player, "test-node".to_string()),
        dir,
    )
}

fn frame_bytes(frames: usize) -> usize {
    frames * FORMAT.frame_len() * 2
}

#[test]
fn silence_never_produces_an_utterance_without_a_trigger() {
    let (mut listener, _dir) = listener(Box::new(DeafWake), tuning());
    let mut source = ScriptedSource::new(vec![silent_frame(); 50]);
    let stop = StopToken::default();

    // The wake stage consumes the whole script without ever leaving it
    let result = listener.listen(&mut source, false, 0.0, &stop);
    assert!(result.is_err());
    assert!(source.frames.is_empty());
}

#[test]
fn stop_token_exits_the_wake_stage() {
    let (mut listener, _dir) = listener(Box::new(DeafWake), tuning());
    let mut source = ScriptedSource::new(vec![silent_frame(); 4]);
    let stop = StopToken::default();
    stop.stop();

    let result = listener.listen(&mut source, false, 0.0, &stop).unwrap();
    assert!(result.is_none());
    // Stopped before consuming any audio
    assert_eq!(source.frames.len(), 4);
}

#[test]
fn pre_roll_is_never_lost() {
    let tuning = ListenerTuning {
        pre_roll_frames: 16,
        ..tuning()
    };
    let (mut listener, _dir) = listener(Box::new(InstantWake), tuning);

    let mut script = vec![silent_frame()]; // consumed by the wake trigger
    script.extend(vec![silent_frame(); 16]); // pre-roll capture
    script.extend(vec![speech_frame(); 30]);
    script.extend(vec![silent_frame(); 20]);

    let mut source = ScriptedSource::new(script);
    let stop = StopToken::default();

    let utterance = listener
        .listen(&mut source, false, 0.0, &stop)
        .unwrap()
        .expect("speech should produce an utterance");

    // pre-roll(16) + speech(30) + hangover(20)
    assert_eq!(utterance.audio.len(), frame_bytes(66));
    assert!(utterance.audio.len() >= frame_bytes(16));
    assert_eq!(utterance.sample_rate, FORMAT.sample_rate);
    assert_eq!(utterance.node_id, "test-node");
}

#[test]
fn sub_minimum_utterance_is_discarded_in_engaged_mode() {
    let (mut listener, _dir) = listener(Box::new(DeafWake), tuning());

    let mut script = vec![speech_frame(); 5];
    script.extend(vec![silent_frame(); 20]);
    let mut source = ScriptedSource::new(script);
    let stop = StopToken::default();

    // 5 speech + 20 hangover = 25 < 40: consumed engagement, no utterance
    let result = listener.listen(&mut source, true, 0.0, &stop).unwrap();
    assert!(result.is_none());
}

#[test]
fn boundary_arithmetic_discards_at_exactly_thirty_five_frames() {
    let (mut listener, _dir) = listener(Box::new(DeafWake), tuning());

    let mut script = vec![silent_frame(); 20];
    script.extend(vec![speech_frame(); 5]);
    script.extend(vec![silent_frame(); 25]);
    let mut source = ScriptedSource::new(script);
    let stop = StopToken::default();

    // pre-buffer keeps 10 of the 20 silent frames; 10 + 5 + 20 hangover = 35,
    // below the 40-frame minimum, so the capture is a false trigger
    let result = listener.listen(&mut source, true, 0.0, &stop).unwrap();
    assert!(result.is_none());
}

#[test]
fn boundary_arithmetic_accepts_thirty_five_frames_under_a_lower_minimum() {
    let tuning = ListenerTuning {
        min_utterance_frames: 30,
        ..tuning()
    };
    let (mut listener, _dir) = listener(Box::new(DeafWake), tuning);

    let mut script = vec![silent_frame(); 20];
    script.extend(vec![speech_frame(); 5]);
    script.extend(vec![silent_frame(); 25]);
    let mut source = ScriptedSource::new(script);
    let stop = StopToken::default();

    let utterance = listener
        .listen(&mut source, true, 0.0, &stop)
        .unwrap()
        .expect("35 frames clears a 30-frame minimum");

    assert_eq!(utterance.audio.len(), frame_bytes(35));
    assert!(utterance.engaged);
    // The hangover fills after 20 of the 25 trailing silent frames, leaving
    // the last 5 unconsumed
    assert_eq!(source.frames.len(), 5);
}

#[test]
fn false_trigger_restarts_the_wake_cycle() {
    let (mut listener, _dir) = listener(Box::new(InstantWake), tuning());

    // First cycle: 1 trigger frame, 3 speech, 20 hangover = 23 < 40, discard.
    // Second cycle: 1 trigger frame, 45 speech, 20 hangover = 65, accepted.
    let mut script = vec![silent_frame()];
    script.extend(vec![speech_frame(); 3]);
    script.extend(vec![silent_frame(); 20]);
    script.push(silent_frame());
    script.extend(vec![speech_frame(); 45]);
    script.extend(vec![silent_frame(); 20]);

    let mut source = ScriptedSource::new(script);
    let stop = StopToken::default();

    let utterance = listener
        .listen(&mut source, false, 0.0, &stop)
        .unwrap()
        .expect("second capture should survive the minimum");

    assert_eq!(utterance.audio.len(), frame_bytes(65));
    // Both cycles reset the source on wake entry
    assert_eq!(source.resets, 2);
}

#[test]
fn no_speech_after_trigger_gives_up_within_the_start_window() {
    let tuning = ListenerTuning {
        start_window_frames: 30,
        ..tuning()
    };
    let (mut listener, _dir) = listener(Box::new(DeafWake), tuning);

    // Engaged turn with nothing said: the start window expires and the
    // engagement is consumed without an utterance
    let mut source = ScriptedSource::new(vec![silent_frame(); 35]);
    let stop = StopToken::default();

    let result = listener.listen(&mut source, true, 0.0, &stop).unwrap();
    assert!(result.is_none());
    // 30 frames consumed the window; the rest of the script is untouched
    assert_eq!(source.frames.len(), 5);
}
