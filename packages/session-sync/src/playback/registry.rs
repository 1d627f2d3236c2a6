//! Devices connected to the user's session

use crate::messages::ConnectedDevice;

/// Latest device list pushed by the server
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<ConnectedDevice>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, devices: Vec<ConnectedDevice>) {
        self.devices = devices;
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }

    pub fn get(&self, id: usize) -> Option<&ConnectedDevice> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn name_of(&self, id: usize) -> Option<&str> {
        self.get(id).map(|d| d.name.as_str())
    }

    /// The device currently flagged as rendering audio
    pub fn audio_device(&self) -> Option<&ConnectedDevice> {
        self.devices.iter().find(|d| d.is_audio_device)
    }

    pub fn devices(&self) -> &[ConnectedDevice] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::DeviceType;

    fn device(id: usize, audio: bool) -> ConnectedDevice {
        ConnectedDevice {
            id,
            name: format!("Device {}", id),
            device_type: DeviceType::Web,
            is_audio_device: audio,
            connected_at: 0,
        }
    }

    #[test]
    fn finds_audio_device() {
        let mut registry = DeviceRegistry::new();
        registry.replace(vec![device(1, false), device(2, true)]);

        assert_eq!(registry.audio_device().map(|d| d.id), Some(2));
        assert_eq!(registry.name_of(1), Some("Device 1"));
        assert_eq!(registry.len(), 2);

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.audio_device().is_none());
    }
}
