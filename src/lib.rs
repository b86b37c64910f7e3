//! Outpost - voice satellite node for a distributed assistant
//!
//! This library provides the client-side node of a hub-and-satellite voice
//! assistant:
//! - Continuous microphone framing with rate negotiation
//! - Wake word triggering and voice-activity utterance bounding
//! - The blocking hub exchange with retry-on-connectivity-loss
//! - Response/ambient playback with interrupt discipline
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 Capture thread                        │
//! │  AudioStream → WakeWordEngine / VoiceActivityGate     │
//! │       → Listener → HubClient → AudioPlayer            │
//! └───────────────────────┬──────────────────────────────┘
//!                         │ narrow, synchronized surface
//! ┌───────────────────────▼──────────────────────────────┐
//! │            Node (supervisor)                          │
//! │  start/stop/restart │ timer │ volume │ interrupt      │
//! └───────────────────────┬──────────────────────────────┘
//!                         │
//! ┌───────────────────────▼──────────────────────────────┐
//! │            Control plane (axum, tokio)                │
//! │  /health │ /api/config │ /api/restart │ /api/timer    │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod hub;
pub mod listener;
pub mod node;
pub mod timer;

pub use config::NodeConfig;
pub use error::{Error, Result};
pub use hub::{HubClient, HubExchangeResult};
pub use listener::{Listener, ListenerTuning, Utterance};
pub use node::{Node, StopToken};
pub use timer::Timer;
