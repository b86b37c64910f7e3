//! Configuration management for the outpost node

pub mod file;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};
use file::{NodeConfigFile, WakeupFileConfig};

/// Node configuration with named, typed fields
///
/// Every field is read at construction time — the capture pipeline never
/// polls configuration per frame. Loading layers env vars over the TOML file
/// over defaults, then validates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node identifier reported to the hub
    pub node_id: String,

    /// Hub base URL
    pub hub_url: String,

    /// Control plane port
    pub port: u16,

    /// Input device index; `None` selects the host default
    pub mic_index: Option<usize>,

    /// Output device index; `None` selects the host default
    pub speaker_index: Option<usize>,

    /// Wake word name; selects `<model_dir>/<wake_word>.rpw`
    pub wake_word: String,

    /// Wake confidence threshold in (0, 1]
    pub confidence_threshold: f32,

    /// Voice activity sensitivity, 0 (permissive) to 3 (aggressive)
    pub vad_sensitivity: u8,

    /// Play activation/deactivation cues around capture
    pub wakeup_sound: bool,

    /// Enable the wake engine's noise suppression filters
    pub noise_suppression: bool,

    /// Directory holding wake word model files
    pub model_dir: PathBuf,

    /// Data directory (response cache, defaults for model_dir)
    pub data_dir: PathBuf,
}

impl NodeConfig {
    /// Load configuration from the given file path (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if validation fails.
    pub fn load(config_path: Option<&std::path::Path>) -> Result<Self> {
        let fc = config_path.map_or_else(NodeConfigFile::default, file::load_config_file);
        Self::from_overlay(fc)
    }

    /// Build from a file overlay plus env vars and defaults, then validate
    ///
    /// # Errors
    ///
    /// Returns error if validation fails.
    pub fn from_overlay(fc: NodeConfigFile) -> Result<Self> {
        let data_dir = directories::BaseDirs::new()
            .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("outpost"));
        std::fs::create_dir_all(&data_dir).ok();

        let node_id = std::env::var("OUTPOST_NODE_ID")
            .ok()
            .or(fc.node_id)
            .unwrap_or_else(default_node_id);

        let hub_url = std::env::var("OUTPOST_HUB_URL")
            .ok()
            .or(fc.hub_url)
            .unwrap_or_else(|| "http://localhost:7123".to_string());

        let port = std::env::var("OUTPOST_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .or(fc.port)
            .unwrap_or(7321);

        let model_dir = std::env::var("OUTPOST_MODEL_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| fc.model_dir.map(PathBuf::from))
            .unwrap_or_else(|| data_dir.join("models"));

        let wakeup = fc.wakeup;
        let config = Self {
            node_id,
            hub_url,
            port,
            mic_index: fc.mic_index,
            speaker_index: fc.speaker_index,
            wake_word: std::env::var("OUTPOST_WAKE_WORD")
                .ok()
                .or(wakeup.wake_word)
                .unwrap_or_else(|| "hey outpost".to_string()),
            confidence_threshold: wakeup.confidence_threshold.unwrap_or(0.5),
            vad_sensitivity: wakeup.vad_sensitivity.unwrap_or(3),
            wakeup_sound: wakeup.wakeup_sound.unwrap_or(true),
            noise_suppression: wakeup.noise_suppression.unwrap_or(false),
            model_dir,
            data_dir,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check field ranges; a bad config is a load-time error, not a silent
    /// runtime `None`
    ///
    /// # Errors
    ///
    /// Returns `Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.node_id.trim().is_empty() {
            return Err(Error::Config("node_id must not be empty".to_string()));
        }
        if self.hub_url.trim().is_empty() {
            return Err(Error::Config("hub_url must not be empty".to_string()));
        }
        if !(self.hub_url.starts_with("http://") || self.hub_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "hub_url must be an http(s) URL, got {}",
                self.hub_url
            )));
        }
        if self.wake_word.trim().is_empty() {
            return Err(Error::Config("wake_word must not be empty".to_string()));
        }
        if !(self.confidence_threshold > 0.0 && self.confidence_threshold <= 1.0) {
            return Err(Error::Config(format!(
                "confidence_threshold must be in (0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.vad_sensitivity > 3 {
            return Err(Error::Config(format!(
                "vad_sensitivity must be 0..=3, got {}",
                self.vad_sensitivity
            )));
        }
        Ok(())
    }

    /// Persist the current configuration to the given path as TOML
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the write fails.
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let overlay = NodeConfigFile {
            node_id: Some(self.node_id.clone()),
            hub_url: Some(self.hub_url.clone()),
            port: Some(self.port),
            mic_index: self.mic_index,
            speaker_index: self.speaker_index,
            wakeup: WakeupFileConfig {
                wake_word: Some(self.wake_word.clone()),
                confidence_threshold: Some(self.confidence_threshold),
                vad_sensitivity: Some(self.vad_sensitivity),
                wakeup_sound: Some(self.wakeup_sound),
                noise_suppression: Some(self.noise_suppression),
            },
            model_dir: Some(self.model_dir.display().to_string()),
        };

        let content = toml::to_string_pretty(&overlay)
            .map_err(|e| Error::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        tracing::info!(path = %path.display(), "config saved");
        Ok(())
    }

    /// Cache location for the most recent response audio
    #[must_use]
    pub fn response_cache_path(&self) -> PathBuf {
        self.data_dir.join("response.wav")
    }
}

/// Hostname-derived node id, with a random fallback
fn default_node_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| format!("node-{}", uuid::Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> NodeConfig {
        NodeConfig {
            node_id: "kitchen".to_string(),
            hub_url: "http://hub.local:7123".to_string(),
            port: 7321,
            mic_index: None,
            speaker_index: None,
            wake_word: "hey outpost".to_string(),
            confidence_threshold: 0.5,
            vad_sensitivity: 3,
            wakeup_sound: true,
            noise_suppression: false,
            model_dir: PathBuf::from("/tmp/models"),
            data_dir: PathBuf::from("/tmp"),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let mut config = base_config();
        config.confidence_threshold = 0.0;
        assert!(config.validate().is_err());

        config.confidence_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_sensitivity_and_urls_are_rejected() {
        let mut config = base_config();
        config.vad_sensitivity = 4;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.hub_url = "hub.local".to_string();
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.node_id = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn overlay_fields_survive_a_save_load_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = base_config();
        config.confidence_threshold = 0.72;
        config.mic_index = Some(2);
        config.save(&path).unwrap();

        let loaded = file::load_config_file(&path);
        assert_eq!(loaded.node_id.as_deref(), Some("kitchen"));
        assert_eq!(loaded.mic_index, Some(2));
        let wakeup = loaded.wakeup;
        assert!((wakeup.confidence_threshold.unwrap() - 0.72).abs() < 1e-6);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let loaded = file::load_config_file(std::path::Path::new("/nonexistent/config.toml"));
        assert!(loaded.node_id.is_none());
        assert!(loaded.wakeup.wake_word.is_none());
    }
}
