//! Output driver preferences
//!
//! Everything here is a request; the device may negotiate something else and
//! the host reads the outcome back from
//! [`PreparedOutput`](super::PreparedOutput).

use serde::{Deserialize, Serialize};

use crate::types::SAMPLE_RATE;

/// Largest device buffer accepted (frames)
pub const MAX_BUFFER_SIZE: usize = crate::config::MAX_BUFFER_FRAMES;

/// Device buffer request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Driver's choice; the engine keeps ramping over its own buffer length
    #[default]
    Default,
    /// Frames per callback, clamped to `64..=MAX_BUFFER_SIZE`
    Fixed(u32),
}

/// Output device, optionally pinned to one cpal host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    pub name: String,
    /// Host label such as "ALSA" or "CoreAudio"; None searches every host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// "[host] name", or just the name
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// `audio:` section of a player config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// None = default device of the default host
    pub device: Option<DeviceId>,
    pub buffer_size: BufferSize,
    /// None = 48 kHz when the device can do it
    pub sample_rate: Option<u32>,
}

impl AudioConfig {
    /// Rate asked of the device
    pub fn target_sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(SAMPLE_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_label() {
        assert_eq!(DeviceId::new("hw:0").display_label(), "hw:0");
        assert_eq!(DeviceId::with_host("hw:0", "ALSA").display_label(), "[ALSA] hw:0");
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = AudioConfig {
            device: Some(DeviceId::with_host("pulse", "ALSA")),
            buffer_size: BufferSize::Fixed(512),
            sample_rate: Some(44100),
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: AudioConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, config);
        assert_eq!(back.target_sample_rate(), 44100);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: AudioConfig = serde_yaml::from_str("sample_rate: 96000\n").unwrap();
        assert_eq!(config.device, None);
        assert_eq!(config.buffer_size, BufferSize::Default);
        assert_eq!(AudioConfig::default().target_sample_rate(), SAMPLE_RATE);
    }
}
