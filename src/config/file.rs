//! TOML configuration file loading
//!
//! Supports `~/.config/outpost/config.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay on top of
//! defaults, and the control plane rewrites it on `PUT /api/config`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NodeConfigFile {
    /// Node identifier reported to the hub
    pub node_id: Option<String>,

    /// Hub base URL (e.g. `http://hub.local:7123`)
    pub hub_url: Option<String>,

    /// Control plane port
    pub port: Option<u16>,

    /// Input device index; omit for the host default
    pub mic_index: Option<usize>,

    /// Output device index; omit for the host default
    pub speaker_index: Option<usize>,

    /// Wake word / capture tuning
    #[serde(default)]
    pub wakeup: WakeupFileConfig,

    /// Directory holding wake word model files
    pub model_dir: Option<String>,
}

/// Wake word and capture gating configuration
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WakeupFileConfig {
    /// Wake word name; selects `<model_dir>/<wake_word>.rpw`
    pub wake_word: Option<String>,

    /// Wake confidence threshold in (0, 1]
    pub confidence_threshold: Option<f32>,

    /// Voice activity sensitivity, 0 (permissive) to 3 (aggressive)
    pub vad_sensitivity: Option<u8>,

    /// Play activation/deactivation cues
    pub wakeup_sound: Option<bool>,

    /// Enable the wake engine's noise suppression filters
    pub noise_suppression: Option<bool>,
}

/// Load the TOML config file from the given path
///
/// Returns `NodeConfigFile::default()` if the file doesn't exist or can't be
/// parsed.
pub fn load_config_file(path: &Path) -> NodeConfigFile {
    if !path.exists() {
        return NodeConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                NodeConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            NodeConfigFile::default()
        }
    }
}

/// Return the default config file path: `~/.config/outpost/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("outpost").join("config.toml"))
}
