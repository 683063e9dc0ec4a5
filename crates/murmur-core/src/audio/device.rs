//! Output device discovery
//!
//! Every cpal host is searched, so a config can pin a device to one backend
//! (a raw ALSA device rather than the PulseAudio bridge, say). Only devices
//! with an f32 output configuration are useful to the engine; the others are
//! listed but flagged.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, HostId, SampleFormat};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Rates reported for a device when they fall inside one of its ranges
const PROBE_RATES: [u32; 4] = [44100, 48000, 88200, 96000];

/// Display name of a cpal host ("ALSA", "CoreAudio", ...)
fn host_label(id: HostId) -> String {
    let name = format!("{:?}", id);
    match name.as_str() {
        "Alsa" | "Jack" | "Wasapi" | "Asio" => name.to_uppercase(),
        _ => name,
    }
}

/// Visit each output device of each host that initialises
fn for_each_output_device(mut visit: impl FnMut(&str, Option<&str>, Device) -> bool) {
    for id in cpal::available_hosts() {
        let host = match cpal::host_from_id(id) {
            Ok(host) => host,
            Err(e) => {
                log::debug!("Skipping audio host {:?}: {}", id, e);
                continue;
            }
        };
        let label = host_label(id);
        let default_name = host.default_output_device().and_then(|d| d.name().ok());
        let Ok(devices) = host.output_devices() else {
            log::debug!("Audio host {} cannot list output devices", label);
            continue;
        };
        for device in devices {
            if !visit(&label, default_name.as_deref(), device) {
                return;
            }
        }
    }
}

/// An output device as seen by the engine
#[derive(Debug, Clone)]
pub struct AudioDevice {
    pub id: DeviceId,
    /// Default device of its host
    pub is_default: bool,
    /// Has a float configuration with at least two channels
    pub stereo_f32: bool,
    /// Probe rates inside the device's f32 ranges
    pub sample_rates: Vec<u32>,
}

impl AudioDevice {
    fn probe(host: &str, default_name: Option<&str>, device: &Device) -> Option<Self> {
        let name = device.name().ok()?;
        let ranges: Vec<_> = device
            .supported_output_configs()
            .ok()?
            .filter(|range| range.sample_format() == SampleFormat::F32)
            .collect();

        let mut sample_rates: Vec<u32> = PROBE_RATES
            .into_iter()
            .filter(|rate| {
                ranges
                    .iter()
                    .any(|r| (r.min_sample_rate().0..=r.max_sample_rate().0).contains(rate))
            })
            .collect();
        sample_rates.dedup();

        Some(Self {
            is_default: default_name == Some(name.as_str()),
            stereo_f32: ranges.iter().any(|r| r.channels() >= 2),
            sample_rates,
            id: DeviceId::with_host(&name, host),
        })
    }
}

/// Every output device, defaults first
pub fn get_output_devices() -> AudioResult<Vec<AudioDevice>> {
    let mut found = Vec::new();
    for_each_output_device(|host, default_name, device| {
        if let Some(probed) = AudioDevice::probe(host, default_name, &device) {
            found.push(probed);
        }
        true
    });
    if found.is_empty() {
        return Err(AudioError::NoDevices);
    }

    found.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.id.display_label().cmp(&b.id.display_label()))
    });
    log::debug!("{} audio output devices", found.len());
    Ok(found)
}

/// Look a device up by name, restricted to its host when one is given
pub(crate) fn find_device(id: &DeviceId) -> AudioResult<Device> {
    let mut hit = None;
    for_each_output_device(|host, _, device| {
        let host_matches = id.host.as_deref().map_or(true, |h| h == host);
        if host_matches && device.name().ok().as_deref() == Some(id.name.as_str()) {
            hit = Some(device);
            return false;
        }
        true
    });
    hit.ok_or_else(|| AudioError::DeviceNotFound(id.display_label()))
}

/// Default output device of the default host
pub(crate) fn default_device() -> AudioResult<Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or(AudioError::NoDefaultDevice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_never_panics() {
        // Build machines usually have no sound card
        match get_output_devices() {
            Ok(devices) => {
                for device in &devices {
                    assert!(!device.id.name.is_empty());
                    assert!(device.id.host.is_some());
                }
                let defaults = devices.iter().take_while(|d| d.is_default).count();
                assert!(devices[defaults..].iter().all(|d| !d.is_default));
            }
            Err(e) => println!("No devices: {}", e),
        }
    }

    #[test]
    fn test_unknown_device_is_not_found() {
        let id = DeviceId::with_host("murmur-no-such-device", "ALSA");
        assert!(matches!(find_device(&id), Err(AudioError::DeviceNotFound(_))));
    }
}
