//! Audio device enumeration for the control plane

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

use crate::{Error, Result};

/// One selectable audio device
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
}

/// List input devices in host order; the index is what `mic_index` selects
///
/// # Errors
///
/// Returns error if the host cannot enumerate devices.
pub fn list_input_devices() -> Result<Vec<DeviceInfo>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| Error::Audio(e.to_string()))?;

    Ok(collect(devices))
}

/// List output devices in host order; the index is what `speaker_index` selects
///
/// # Errors
///
/// Returns error if the host cannot enumerate devices.
pub fn list_output_devices() -> Result<Vec<DeviceInfo>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| Error::Audio(e.to_string()))?;

    Ok(collect(devices))
}

fn collect(devices: impl Iterator<Item = cpal::Device>) -> Vec<DeviceInfo> {
    devices
        .enumerate()
        .map(|(index, device)| DeviceInfo {
            index,
            name: device.name().unwrap_or_else(|_| format!("device {index}")),
        })
        .collect()
}
