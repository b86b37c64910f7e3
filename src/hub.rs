//! Hub request/response exchange
//!
//! The hub client runs on the capture thread and is deliberately blocking:
//! the loop holds at most one utterance in flight and does not listen again
//! until the exchange resolves.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::audio::{AudioFormat, pcm_to_wav};
use crate::listener::Utterance;
use crate::node::StopToken;
use crate::{Error, Result};

/// Interval between liveness probes while the hub is unreachable
const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Request timeout for the interpretation call; hub inference can be slow
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Parsed hub response
#[derive(Debug, Clone)]
pub struct HubExchangeResult {
    /// Interpreted command text
    pub command: String,
    /// Follow-up prompt, present when the hub expects another turn
    pub callout: Option<String>,
    /// Raw PCM response audio
    pub audio: Vec<u8>,
    pub sample_rate: u32,
    pub sample_width: u16,
}

#[derive(Serialize)]
struct HubRequest<'a> {
    audio_file: String,
    samplerate: u32,
    node_id: &'a str,
    engage: bool,
    last_time_engaged: f64,
    time_sent: f64,
}

#[derive(Deserialize)]
struct HubResponse {
    command: String,
    #[serde(default)]
    callout: Option<String>,
    audio_data: String,
    sample_rate: u32,
    sample_width: u16,
}

/// Blocking client for the hub's audio interpretation endpoint
pub struct HubClient {
    base_url: String,
    client: reqwest::blocking::Client,
    retry_interval: Duration,
}

impl HubClient {
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be constructed.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(EXCHANGE_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            retry_interval: RETRY_INTERVAL,
        })
    }

    /// Override the liveness probe interval (tests)
    #[must_use]
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Send one utterance and parse the hub's reply
    ///
    /// # Errors
    ///
    /// - `Connectivity`: the hub was unreachable. This call blocks on the
    ///   liveness probe until the hub answers again (or the stop token
    ///   fires), then returns; the utterance is dropped, not resent.
    /// - `Protocol`: the hub answered with a non-success status or a body
    ///   that does not match the response schema. Callers treat this as an
    ///   exchange with no response audio.
    pub fn send(&self, utterance: &Utterance, stop: &StopToken) -> Result<HubExchangeResult> {
        let format = AudioFormat {
            sample_rate: utterance.sample_rate,
            sample_width: utterance.sample_width,
            channels: utterance.channels,
        };
        let wav = pcm_to_wav(&utterance.audio, format)?;

        let request = HubRequest {
            audio_file: BASE64.encode(&wav),
            samplerate: utterance.sample_rate,
            node_id: &utterance.node_id,
            engage: utterance.engaged,
            last_time_engaged: utterance.last_engaged_at,
            time_sent: epoch_seconds(),
        };

        let response = match self
            .client
            .post(format!("{}/respond/audio", self.base_url))
            .json(&request)
            .send()
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "lost connection to hub");
                self.wait_until_reachable(stop);
                return Err(Error::Connectivity(
                    "hub connection lost during exchange".to_string(),
                ));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Protocol(format!("hub returned {status}")));
        }

        let body: HubResponse = response
            .json()
            .map_err(|e| Error::Protocol(format!("malformed hub response: {e}")))?;

        let audio = BASE64
            .decode(&body.audio_data)
            .map_err(|e| Error::Protocol(format!("invalid response audio encoding: {e}")))?;

        Ok(HubExchangeResult {
            command: body.command,
            callout: body.callout,
            audio,
            sample_rate: body.sample_rate,
            sample_width: body.sample_width,
        })
    }

    /// Poll the hub's liveness endpoint until it answers
    ///
    /// Returns early when the stop token fires so shutdown is not held up
    /// by an unreachable hub.
    fn wait_until_reachable(&self, stop: &StopToken) {
        loop {
            if stop.stopped() {
                return;
            }

            let probe = self
                .client
                .get(&self.base_url)
                .timeout(Duration::from_secs(2))
                .send();
            match probe {
                Ok(response) if response.status().is_success() => {
                    tracing::info!("hub reachable again");
                    return;
                }
                Ok(response) => {
                    tracing::debug!(status = %response.status(), "hub liveness probe not ready");
                }
                Err(_) => {}
            }

            std::thread::sleep(self.retry_interval);
        }
    }
}

/// Current time as epoch seconds, the hub protocol's timestamp unit
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn epoch_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
