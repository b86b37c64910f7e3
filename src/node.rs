//! Node supervisor
//!
//! Owns the capture/dispatch loop thread and exposes the narrow, thread-safe
//! surface the control plane is allowed to touch: stop/restart/liveness plus
//! fire-and-forget timer, volume, and playback commands. The capture loop is
//! the sole mutator of conversation state; everything it owns (stream,
//! listener, hub client) is constructed on its own thread because cpal
//! streams cannot move between threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::audio::{
    AudioPlayer, AudioStream, FrameSource, PlaybackSource, RustpotterScorer, VoiceActivityGate,
    WebRtcClassifier, alert_tone,
};
use crate::config::NodeConfig;
use crate::hub::{HubClient, epoch_seconds};
use crate::listener::{Listener, ListenerTuning};
use crate::timer::Timer;
use crate::{Error, Result};

/// Cooperative shutdown signal observed at state-machine step boundaries
#[derive(Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    /// Request the capture loop to exit after its current step
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Multi-turn conversation bookkeeping, owned by the capture loop
struct ConversationState {
    /// Skip wake word detection for the next turn
    engaged: bool,
    /// Epoch seconds of the last successful hub exchange
    last_engaged: f64,
}

struct RunHandle {
    stop: StopToken,
    thread: JoinHandle<()>,
}

/// The outpost node: capture loop plus control-plane surface
pub struct Node {
    config: Mutex<NodeConfig>,
    player: AudioPlayer,
    run: Mutex<Option<RunHandle>>,
    timer: Mutex<Option<Timer>>,
}

impl Node {
    /// Create a node; no devices are opened until [`Node::start`]
    #[must_use]
    pub fn new(config: NodeConfig) -> Arc<Self> {
        let player = AudioPlayer::new(config.speaker_index, config.response_cache_path());

        Arc::new(Self {
            config: Mutex::new(config),
            player,
            run: Mutex::new(None),
            timer: Mutex::new(None),
        })
    }

    /// Spawn the capture thread with the current configuration
    ///
    /// Blocks until the thread reports that its pipeline constructed, so
    /// startup failures (`DeviceUnsupported`, `ModelNotFound`) surface here
    /// and abort startup.
    ///
    /// # Errors
    ///
    /// Returns error if the pipeline cannot be constructed.
    pub fn start(&self) -> Result<()> {
        let mut run = self.run.lock().map_err(|_| lock_poisoned())?;
        if let Some(handle) = run.as_ref() {
            if !handle.thread.is_finished() {
                tracing::debug!("capture loop already running");
                return Ok(());
            }
        }

        let config = self.config.lock().map_err(|_| lock_poisoned())?.clone();
        let player = self.player.clone();
        let stop = StopToken::default();
        let loop_stop = stop.clone();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();

        let thread = std::thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || match CaptureLoop::build(&config, player, loop_stop) {
                Ok(capture) => {
                    let _ = ready_tx.send(Ok(()));
                    capture.run();
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *run = Some(RunHandle { stop, thread });
                tracing::info!("node started");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(Error::Audio("capture thread died during startup".to_string()))
            }
        }
    }

    /// Signal the capture loop to exit and wait for it
    pub fn stop(&self) {
        let handle = self
            .run
            .lock()
            .ok()
            .and_then(|mut run| run.take());

        if let Some(handle) = handle {
            handle.stop.stop();
            if handle.thread.join().is_err() {
                tracing::error!("capture thread panicked");
            }
            tracing::info!("node stopped");
        }
    }

    /// Stop, then start again with the current configuration
    ///
    /// # Errors
    ///
    /// Returns error if the restarted pipeline cannot be constructed.
    pub fn restart(&self) -> Result<()> {
        tracing::info!("restarting node");
        self.stop();
        self.start()
    }

    /// Whether the capture thread is running
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.run
            .lock()
            .ok()
            .and_then(|run| run.as_ref().map(|h| !h.thread.is_finished()))
            .unwrap_or(false)
    }

    /// Snapshot of the current configuration
    ///
    /// # Errors
    ///
    /// Returns error if the config lock is poisoned.
    pub fn config(&self) -> Result<NodeConfig> {
        Ok(self.config.lock().map_err(|_| lock_poisoned())?.clone())
    }

    /// Replace the configuration; takes effect on the next (re)start
    ///
    /// # Errors
    ///
    /// Returns error if the new configuration fails validation.
    pub fn update_config(&self, config: NodeConfig) -> Result<()> {
        config.validate()?;
        *self.config.lock().map_err(|_| lock_poisoned())? = config;
        Ok(())
    }

    /// Start a countdown, replacing any active timer
    ///
    /// Expiry plays the alert tone through the node's player.
    pub fn set_timer(&self, duration: Duration) {
        let player = self.player.clone();
        let timer = Timer::start(duration, move || {
            tracing::info!("timer expired");
            player.play(PlaybackSource::Pcm(alert_tone(24_000)), true, false);
        });

        if let Ok(mut slot) = self.timer.lock() {
            if let Some(previous) = slot.replace(timer) {
                previous.cancel();
            }
        }
        tracing::info!(secs = duration.as_secs(), "timer set");
    }

    /// Cancel the active timer, if any
    pub fn stop_timer(&self) {
        if let Ok(mut slot) = self.timer.lock() {
            if let Some(timer) = slot.take() {
                timer.cancel();
                tracing::info!("timer cancelled");
            }
        }
    }

    /// Remaining time on the active timer
    #[must_use]
    pub fn timer_remaining(&self) -> Option<Duration> {
        self.timer
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(Timer::remaining))
    }

    /// Set playback volume as a percentage
    pub fn set_volume(&self, percent: u8) {
        self.player.set_volume(percent);
        tracing::info!(percent, "volume set");
    }

    /// Play an audio file through the node's player
    pub fn play_audio_file(&self, path: std::path::PathBuf, asynchronous: bool, looping: bool) {
        self.player
            .play(PlaybackSource::File(path), asynchronous, looping);
    }

    /// Halt any in-progress playback; safe from any thread
    pub fn interrupt_playback(&self) {
        self.player.interrupt();
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.stop();
        self.stop_timer();
    }
}

fn lock_poisoned() -> Error {
    Error::Config("node state lock poisoned".to_string())
}

/// The capture/dispatch loop, constructed and run on its own thread
struct CaptureLoop {
    stream: AudioStream,
    listener: Listener,
    hub: HubClient,
    player: AudioPlayer,
    stop: StopToken,
}

impl CaptureLoop {
    fn build(config: &NodeConfig, player: AudioPlayer, stop: StopToken) -> Result<Self> {
        let stream = AudioStream::open(config.mic_index)?;
        let format = stream.format();

        let classifier = WebRtcClassifier::new(format.sample_rate, config.vad_sensitivity)?;
        let gate = VoiceActivityGate::new(Box::new(classifier));

        let wake = RustpotterScorer::new(
            &config.model_dir,
            &config.wake_word,
            config.confidence_threshold,
            format.sample_rate,
            config.noise_suppression,
        )?;

        let tuning = ListenerTuning {
            wakeup_sound: config.wakeup_sound,
            ..ListenerTuning::default()
        };

        let listener = Listener::new(
            Box::new(wake),
            gate,
            tuning,
            player.clone(),
            config.node_id.clone(),
        );

        let hub = HubClient::new(&config.hub_url)?;

        Ok(Self {
            stream,
            listener,
            hub,
            player,
            stop,
        })
    }

    fn run(mut self) {
        tracing::info!("capture loop running");
        let mut conversation = ConversationState {
            engaged: false,
            last_engaged: epoch_seconds(),
        };

        while !self.stop.stopped() {
            // Engagement is good for exactly one turn
            let engaged = std::mem::take(&mut conversation.engaged);

            let utterance = match self.listener.listen(
                &mut self.stream,
                engaged,
                conversation.last_engaged,
                &self.stop,
            ) {
                Ok(Some(utterance)) => utterance,
                Ok(None) => continue,
                Err(e) => {
                    if self.stop.stopped() {
                        break;
                    }
                    tracing::error!(error = %e, "capture failed, resuming");
                    continue;
                }
            };

            match self.hub.send(&utterance, &self.stop) {
                Ok(result) => {
                    conversation.last_engaged = epoch_seconds();
                    conversation.engaged =
                        result.callout.as_deref().is_some_and(|c| !c.is_empty());

                    tracing::info!(
                        command = %result.command,
                        engaged = conversation.engaged,
                        "hub response"
                    );
                    if let Some(callout) = &result.callout {
                        tracing::debug!(callout = %callout, "hub follow-up");
                    }

                    if result.audio.is_empty() {
                        tracing::debug!("hub returned no response audio");
                    } else {
                        // Block while speaking so the mic does not record us
                        self.player.play_response(&result, false);
                    }
                }
                Err(Error::Protocol(e)) => {
                    tracing::warn!(error = %e, "bad hub response, treating as empty");
                }
                Err(e) => {
                    // Deliberate: the spoken input is lost on reconnection
                    // rather than resent
                    tracing::warn!(error = %e, "utterance dropped");
                }
            }
        }

        self.stream.close();
        tracing::info!("capture loop exited");
    }
}
