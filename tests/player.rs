//! Playback interrupt and fallback discipline, observed through a scripted sink

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use outpost::audio::{
    AudioFormat, AudioPlayer, PcmAudio, PlaybackControl, PlaybackSink, PlaybackSource, pcm_to_wav,
};
use outpost::hub::HubExchangeResult;

/// Events recorded by the scripted sink; the marker is the clip's first sample
#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Started(i16),
    Completed(i16),
    Halted(i16),
    Failed(i16),
}

/// Sink that blocks clips whose marker is negative until they are halted,
/// completes others, and can fail once on demand
struct ScriptedSink {
    events: Arc<Mutex<Vec<Event>>>,
    fail_next: Arc<AtomicBool>,
}

impl ScriptedSink {
    fn new() -> (Self, Arc<Mutex<Vec<Event>>>, Arc<AtomicBool>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let fail_next = Arc::new(AtomicBool::new(false));
        (
            Self {
                events: Arc::clone(&events),
                fail_next: Arc::clone(&fail_next),
            },
            events,
            fail_next,
        )
    }
}

impl PlaybackSink for ScriptedSink {
    fn play(&mut self, audio: &PcmAudio, ctl: &PlaybackControl) -> outpost::Result<()> {
        let marker = audio.samples.first().copied().unwrap_or(0);
        self.events.lock().unwrap().push(Event::Started(marker));

        if self.fail_next.swap(false, Ordering::SeqCst) {
            self.events.lock().unwrap().push(Event::Failed(marker));
            return Err(outpost::Error::Playback("scripted failure".to_string()));
        }

        if marker < 0 {
            // Hold the clip until it is interrupted or superseded
            let deadline = Instant::now() + Duration::from_secs(5);
            while !ctl.halted() {
                assert!(Instant::now() < deadline, "clip was never halted");
                std::thread::sleep(Duration::from_millis(2));
            }
            self.events.lock().unwrap().push(Event::Halted(marker));
            return Ok(());
        }

        std::thread::sleep(Duration::from_millis(2));
        self.events.lock().unwrap().push(Event::Completed(marker));
        Ok(())
    }
}

fn clip(marker: i16) -> PlaybackSource {
    PlaybackSource::Pcm(PcmAudio {
        samples: vec![marker; 64],
        sample_rate: 16_000,
    })
}

fn wait_for_start(events: &Arc<Mutex<Vec<Event>>>, marker: i16) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if events.lock().unwrap().contains(&Event::Started(marker)) {
            return;
        }
        assert!(Instant::now() < deadline, "clip {marker} never started");
        std::thread::sleep(Duration::from_millis(2));
    }
}

fn player_with_sink(cache: PathBuf) -> (AudioPlayer, Arc<Mutex<Vec<Event>>>, Arc<AtomicBool>) {
    let (sink, events, fail_next) = ScriptedSink::new();
    (
        AudioPlayer::with_sink(Box::new(sink), cache),
        events,
        fail_next,
    )
}

#[test]
fn interrupt_then_play_leaves_only_the_new_clip() {
    let dir = tempfile::tempdir().unwrap();
    let (player, events, _) = player_with_sink(dir.path().join("response.wav"));

    player.play(clip(-1), true, false);
    wait_for_start(&events, -1);

    player.interrupt();
    player.play(clip(2), false, false);

    let log = events.lock().unwrap().clone();
    assert!(log.contains(&Event::Halted(-1)));
    assert!(log.contains(&Event::Completed(2)));
    // The halt happens before the new clip makes any sound
    let halted_at = log.iter().position(|e| *e == Event::Halted(-1)).unwrap();
    let started_b = log.iter().position(|e| *e == Event::Started(2)).unwrap();
    assert!(halted_at < started_b);
    assert!(!player.is_playing());
}

#[test]
fn a_new_play_supersedes_the_current_one() {
    let dir = tempfile::tempdir().unwrap();
    let (player, events, _) = player_with_sink(dir.path().join("response.wav"));

    player.play(clip(-3), true, false);
    wait_for_start(&events, -3);

    // No explicit interrupt: the play itself must stop the prior clip
    player.play(clip(4), false, false);

    let log = events.lock().unwrap().clone();
    assert!(log.contains(&Event::Halted(-3)));
    assert!(log.contains(&Event::Completed(4)));
}

#[test]
fn looping_playback_repeats_until_interrupted() {
    let dir = tempfile::tempdir().unwrap();
    let (player, events, _) = player_with_sink(dir.path().join("response.wav"));

    player.play(clip(5), true, true);

    // Let it loop a few times
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let starts = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| **e == Event::Started(5))
            .count();
        if starts >= 3 {
            break;
        }
        assert!(Instant::now() < deadline, "loop never repeated");
        std::thread::sleep(Duration::from_millis(2));
    }

    player.interrupt();
    player.wait_idle();
    assert!(!player.is_playing());
}

#[test]
fn response_playback_caches_audio_and_falls_back_on_failure() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("response.wav");
    let (player, events, fail_next) = player_with_sink(cache.clone());

    // 6s marker as little-endian PCM bytes
    let samples: Vec<i16> = vec![6; 32];
    let mut audio = Vec::new();
    for s in &samples {
        audio.extend_from_slice(&s.to_le_bytes());
    }

    let response = HubExchangeResult {
        command: "play something".to_string(),
        callout: None,
        audio,
        sample_rate: 16_000,
        sample_width: 2,
    };

    fail_next.store(true, Ordering::SeqCst);
    player.play_response(&response, false);

    // The cache file was written before playback
    assert!(cache.exists());
    let wav = std::fs::read(&cache).unwrap();
    let expected = pcm_to_wav(&response.audio, AudioFormat::mono16(16_000)).unwrap();
    assert_eq!(wav, expected);

    // Primary failed once, then the fallback replayed the cached file
    let log = events.lock().unwrap().clone();
    assert_eq!(
        log,
        vec![
            Event::Started(6),
            Event::Failed(6),
            Event::Started(6),
            Event::Completed(6),
        ]
    );
}

#[test]
fn unsupported_response_width_is_skipped_without_panicking() {
    let dir = tempfile::tempdir().unwrap();
    let (player, events, _) = player_with_sink(dir.path().join("response.wav"));

    let response = HubExchangeResult {
        command: "noop".to_string(),
        callout: None,
        audio: vec![0u8; 12],
        sample_rate: 16_000,
        sample_width: 3,
    };

    player.play_response(&response, false);
    assert!(events.lock().unwrap().is_empty());
    assert!(!player.is_playing());
}
