//! Utterance capture state machine
//!
//! Orchestrates the frame source, wake word engine, and voice activity gate
//! into one blocking capture cycle: wait for the wake word (or skip it when
//! engaged), grab a short pre-roll so the start of speech is not clipped,
//! record until the trailing-silence hangover fills, then assemble the frames
//! into an utterance or silently discard a false trigger.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::audio::{
    AudioFrame, AudioPlayer, FrameSource, PlaybackSource, VoiceActivityGate, WakeScorer,
    activation_cue, deactivation_cue, frames_to_bytes,
};
use crate::hub::epoch_seconds;
use crate::node::StopToken;
use crate::Result;

/// One complete spoken command ready for the hub exchange
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Little-endian i16 PCM bytes
    pub audio: Vec<u8>,
    pub sample_rate: u32,
    pub sample_width: u16,
    pub channels: u16,
    pub node_id: String,
    /// Epoch seconds when capture finished
    pub finished_at: f64,
    /// Epoch seconds of the previous successful hub exchange
    pub last_engaged_at: f64,
    /// Whether this utterance was captured in engaged mode
    pub engaged: bool,
}

/// Capture tuning, fixed at listener construction
#[derive(Debug, Clone)]
pub struct ListenerTuning {
    /// Rolling pre-buffer capacity while waiting for speech (frames)
    pub pre_buffer_frames: usize,
    /// Consecutive silent frames that end the utterance
    pub hangover_frames: usize,
    /// Utterances shorter than this are discarded as false triggers (frames)
    pub min_utterance_frames: usize,
    /// Frames captured unconditionally right after the trigger
    pub pre_roll_frames: usize,
    /// Silent frames allowed before a trigger is declared false
    pub start_window_frames: usize,
    /// Engaged mode forces the speech decision for this long
    pub engaged_delay: Duration,
    /// Play activation/deactivation cues around capture
    pub wakeup_sound: bool,
}

impl Default for ListenerTuning {
    fn default() -> Self {
        Self {
            pre_buffer_frames: 10,
            hangover_frames: 20,
            min_utterance_frames: 40,
            pre_roll_frames: 16,
            start_window_frames: 100,
            engaged_delay: Duration::from_secs(3),
            wakeup_sound: true,
        }
    }
}

/// Outcome of one recording pass
enum Recording {
    Captured,
    /// No speech arrived inside the start window
    FalseTrigger,
    Stopped,
}

/// Captures one utterance per call
pub struct Listener {
    wake: Box<dyn WakeScorer>,
    gate: VoiceActivityGate,
    tuning: ListenerTuning,
    player: AudioPlayer,
    node_id: String,
}

impl Listener {
    #[must_use]
    pub fn new(
        wake: Box<dyn WakeScorer>,
        gate: VoiceActivityGate,
        tuning: ListenerTuning,
        player: AudioPlayer,
        node_id: String,
    ) -> Self {
        Self {
            wake,
            gate,
            tuning,
            player,
            node_id,
        }
    }

    /// Run one capture cycle and return the finalized utterance
    ///
    /// Returns `Ok(None)` when the stop token fires, or when an engaged turn
    /// ends without usable speech (the engagement is consumed either way).
    /// False triggers outside engaged mode silently restart the cycle.
    ///
    /// # Errors
    ///
    /// Returns error if the frame source fails.
    pub fn listen(
        &mut self,
        source: &mut dyn FrameSource,
        engaged: bool,
        last_engaged_at: f64,
        stop: &StopToken,
    ) -> Result<Option<Utterance>> {
        loop {
            if !engaged && !self.await_wake_word(source, stop)? {
                return Ok(None);
            }
            if engaged {
                // Engaged turns re-enter directly at pre-roll
                source.reset();
            }

            if self.tuning.wakeup_sound {
                let cue = activation_cue(source.format().sample_rate);
                self.player.play(PlaybackSource::Pcm(cue), true, false);
            }

            let mut frames = Vec::new();
            for _ in 0..self.tuning.pre_roll_frames {
                frames.push(source.frame()?);
            }

            match self.record(source, &mut frames, engaged, stop)? {
                Recording::Stopped => return Ok(None),
                Recording::FalseTrigger => {
                    if engaged {
                        return Ok(None);
                    }
                    continue;
                }
                Recording::Captured if frames.len() < self.tuning.min_utterance_frames => {
                    tracing::debug!(
                        frames = frames.len(),
                        min = self.tuning.min_utterance_frames,
                        "captured audio below minimum duration, discarding"
                    );
                    if engaged {
                        return Ok(None);
                    }
                    continue;
                }
                Recording::Captured => {}
            }

            if self.tuning.wakeup_sound {
                let cue = deactivation_cue(source.format().sample_rate);
                self.player.play(PlaybackSource::Pcm(cue), true, false);
            }

            let format = source.format();
            let audio = frames_to_bytes(&frames);
            tracing::info!(
                frames = frames.len(),
                bytes = audio.len(),
                engaged,
                "utterance captured"
            );

            return Ok(Some(Utterance {
                audio,
                sample_rate: format.sample_rate,
                sample_width: format.sample_width,
                channels: format.channels,
                node_id: self.node_id.clone(),
                finished_at: epoch_seconds(),
                last_engaged_at,
                engaged,
            }));
        }
    }

    /// Feed frames to the wake engine until it triggers
    ///
    /// There is no timeout here; the node can wait forever. Returns false on
    /// stop.
    fn await_wake_word(&mut self, source: &mut dyn FrameSource, stop: &StopToken) -> Result<bool> {
        source.reset();
        self.wake.reset();
        tracing::debug!("listening for wake word");

        loop {
            if stop.stopped() {
                return Ok(false);
            }
            let frame = source.frame()?;
            if let Some(detection) = self.wake.feed(&frame.samples) {
                tracing::info!(
                    wake_word = %detection.name,
                    score = detection.score,
                    "wake word triggered"
                );
                return Ok(true);
            }
        }
    }

    /// Record until the trailing-silence hangover fills
    ///
    /// Before speech is first heard, frames cycle through a bounded rolling
    /// pre-buffer; the first speech frame flushes it into the utterance so
    /// the onset is preserved. Once recording, silent frames accumulate and
    /// are appended (natural trailing audio) when the hangover threshold
    /// ends the utterance.
    fn record(
        &mut self,
        source: &mut dyn FrameSource,
        frames: &mut Vec<AudioFrame>,
        engaged: bool,
        stop: &StopToken,
    ) -> Result<Recording> {
        self.gate.reset();

        let mut rolling: VecDeque<AudioFrame> =
            VecDeque::with_capacity(self.tuning.pre_buffer_frames);
        let mut silence_run: Vec<AudioFrame> = Vec::new();
        let mut quiet_start_frames = 0usize;
        let mut speaking = false;
        let started = Instant::now();

        loop {
            if stop.stopped() {
                return Ok(Recording::Stopped);
            }

            let frame = source.frame()?;
            let force = engaged && started.elapsed() < self.tuning.engaged_delay;
            let speech = self.gate.classify(&frame, force);

            if !speaking {
                if speech {
                    speaking = true;
                    frames.extend(rolling.drain(..));
                    frames.push(frame);
                } else {
                    if rolling.len() >= self.tuning.pre_buffer_frames {
                        rolling.pop_front();
                    }
                    rolling.push_back(frame);

                    quiet_start_frames += 1;
                    if quiet_start_frames >= self.tuning.start_window_frames {
                        tracing::debug!("no speech after trigger, treating as false trigger");
                        return Ok(Recording::FalseTrigger);
                    }
                }
            } else if speech {
                // Silence between words stays in the utterance
                frames.extend(silence_run.drain(..));
                frames.push(frame);
            } else {
                silence_run.push(frame);
                if silence_run.len() >= self.tuning.hangover_frames {
                    frames.extend(silence_run.drain(..));
                    return Ok(Recording::Captured);
                }
            }
        }
    }
}
