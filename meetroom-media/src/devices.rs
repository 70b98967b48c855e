//! Device descriptors, the per-kind device inventory and the current selection

use crate::error::{MediaError, MediaResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Kind of a capture or render endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    /// Video input
    Camera,
    /// Audio input
    Microphone,
    /// Audio output
    Speaker,
}

impl DeviceKind {
    /// All kinds in inventory order
    pub const ALL: [DeviceKind; 3] = [
        DeviceKind::Camera,
        DeviceKind::Microphone,
        DeviceKind::Speaker,
    ];

    /// Human readable name used for label fallbacks
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::Camera => "Camera",
            DeviceKind::Microphone => "Microphone",
            DeviceKind::Speaker => "Speaker",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a single device as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Opaque platform identifier
    pub id: String,
    /// Device kind
    pub kind: DeviceKind,
    /// Human readable label, empty until capture permission is granted
    pub label: String,
}

impl DeviceDescriptor {
    /// Create a new descriptor
    pub fn new(id: impl Into<String>, kind: DeviceKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
        }
    }

    /// Label to show in a device picker
    ///
    /// Falls back to the kind followed by the first eight characters of the
    /// id when the platform withheld the label.
    pub fn display_label(&self) -> String {
        if !self.label.is_empty() {
            return self.label.clone();
        }
        let short_id: String = self.id.chars().take(8).collect();
        format!("{} {}", self.kind, short_id)
    }
}

/// Devices discovered by one enumeration call, partitioned by kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInventory {
    cameras: Vec<DeviceDescriptor>,
    microphones: Vec<DeviceDescriptor>,
    speakers: Vec<DeviceDescriptor>,
}

impl DeviceInventory {
    /// Empty inventory
    pub fn empty() -> Self {
        Self::default()
    }

    /// Partition an enumeration result by kind, keeping platform order
    ///
    /// A repeated id within the same kind keeps its first occurrence.
    pub fn from_devices(devices: impl IntoIterator<Item = DeviceDescriptor>) -> Self {
        let mut inventory = Self::default();
        let mut seen: HashSet<(DeviceKind, String)> = HashSet::new();

        for device in devices {
            if !seen.insert((device.kind, device.id.clone())) {
                debug!(device_id = %device.id, kind = %device.kind, "Skipping duplicate device");
                continue;
            }
            match device.kind {
                DeviceKind::Camera => inventory.cameras.push(device),
                DeviceKind::Microphone => inventory.microphones.push(device),
                DeviceKind::Speaker => inventory.speakers.push(device),
            }
        }

        inventory
    }

    /// Video inputs
    pub fn cameras(&self) -> &[DeviceDescriptor] {
        &self.cameras
    }

    /// Audio inputs
    pub fn microphones(&self) -> &[DeviceDescriptor] {
        &self.microphones
    }

    /// Audio outputs
    pub fn speakers(&self) -> &[DeviceDescriptor] {
        &self.speakers
    }

    /// Devices of one kind
    pub fn devices(&self, kind: DeviceKind) -> &[DeviceDescriptor] {
        match kind {
            DeviceKind::Camera => &self.cameras,
            DeviceKind::Microphone => &self.microphones,
            DeviceKind::Speaker => &self.speakers,
        }
    }

    /// Find a device of the given kind by id
    pub fn find(&self, kind: DeviceKind, id: &str) -> Option<&DeviceDescriptor> {
        self.devices(kind).iter().find(|d| d.id == id)
    }

    /// Check whether an id of the given kind is present
    pub fn contains(&self, kind: DeviceKind, id: &str) -> bool {
        self.find(kind, id).is_some()
    }

    /// Total number of devices across all kinds
    pub fn len(&self) -> usize {
        self.cameras.len() + self.microphones.len() + self.speakers.len()
    }

    /// Check if no device of any kind was discovered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Chosen device id per kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSelection {
    camera: Option<String>,
    microphone: Option<String>,
    speaker: Option<String>,
}

impl DeviceSelection {
    /// Select the first device of each non-empty partition
    pub fn seed_from(inventory: &DeviceInventory) -> Self {
        let mut selection = Self::default();
        for kind in DeviceKind::ALL {
            if let Some(first) = inventory.devices(kind).first() {
                *selection.slot_mut(kind) = Some(first.id.clone());
            }
        }
        selection
    }

    /// Keep selections still present in `inventory`, re-default the rest
    ///
    /// Returns the kinds whose selection changed.
    pub fn reconcile_with(&mut self, inventory: &DeviceInventory) -> Vec<DeviceKind> {
        let mut changed = Vec::new();
        for kind in DeviceKind::ALL {
            let still_present = self
                .get(kind)
                .map(|id| inventory.contains(kind, id))
                .unwrap_or(false);
            if still_present {
                continue;
            }
            let next = inventory.devices(kind).first().map(|d| d.id.clone());
            let slot = self.slot_mut(kind);
            if *slot != next {
                *slot = next;
                changed.push(kind);
            }
        }
        changed
    }

    /// Select `id` for `kind`
    ///
    /// # Errors
    ///
    /// [`MediaError::DeviceNotFound`] if the inventory has no such device.
    pub fn select(
        &mut self,
        inventory: &DeviceInventory,
        kind: DeviceKind,
        id: &str,
    ) -> MediaResult<bool> {
        if !inventory.contains(kind, id) {
            return Err(MediaError::DeviceNotFound {
                device_id: id.to_string(),
            });
        }
        let slot = self.slot_mut(kind);
        if slot.as_deref() == Some(id) {
            return Ok(false);
        }
        *slot = Some(id.to_string());
        Ok(true)
    }

    /// Selected id for `kind`
    pub fn get(&self, kind: DeviceKind) -> Option<&str> {
        match kind {
            DeviceKind::Camera => self.camera.as_deref(),
            DeviceKind::Microphone => self.microphone.as_deref(),
            DeviceKind::Speaker => self.speaker.as_deref(),
        }
    }

    /// Selected camera id
    pub fn camera(&self) -> Option<&str> {
        self.get(DeviceKind::Camera)
    }

    /// Selected microphone id
    pub fn microphone(&self) -> Option<&str> {
        self.get(DeviceKind::Microphone)
    }

    /// Selected speaker id
    pub fn speaker(&self) -> Option<&str> {
        self.get(DeviceKind::Speaker)
    }

    fn slot_mut(&mut self, kind: DeviceKind) -> &mut Option<String> {
        match kind {
            DeviceKind::Camera => &mut self.camera,
            DeviceKind::Microphone => &mut self.microphone,
            DeviceKind::Speaker => &mut self.speaker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_devices() -> Vec<DeviceDescriptor> {
        vec![
            DeviceDescriptor::new("mic-1", DeviceKind::Microphone, "Built-in Mic"),
            DeviceDescriptor::new("cam-a", DeviceKind::Camera, "FaceTime HD"),
            DeviceDescriptor::new("spk-1", DeviceKind::Speaker, ""),
            DeviceDescriptor::new("cam-b", DeviceKind::Camera, "USB Webcam"),
            DeviceDescriptor::new("cam-a", DeviceKind::Camera, "FaceTime HD (dup)"),
        ]
    }

    #[test]
    fn test_partition_keeps_platform_order() {
        let inventory = DeviceInventory::from_devices(sample_devices());

        let camera_ids: Vec<_> = inventory.cameras().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(camera_ids, vec!["cam-a", "cam-b"]);
        assert_eq!(inventory.cameras()[0].label, "FaceTime HD");
        assert_eq!(inventory.microphones().len(), 1);
        assert_eq!(inventory.speakers().len(), 1);
        assert_eq!(inventory.len(), 4);
    }

    #[test]
    fn test_display_label_fallback() {
        let unlabeled = DeviceDescriptor::new("0123456789abcdef", DeviceKind::Speaker, "");
        assert_eq!(unlabeled.display_label(), "Speaker 01234567");

        let short = DeviceDescriptor::new("abc", DeviceKind::Camera, "");
        assert_eq!(short.display_label(), "Camera abc");

        let labeled = DeviceDescriptor::new("x", DeviceKind::Microphone, "Headset");
        assert_eq!(labeled.display_label(), "Headset");
    }

    #[test]
    fn test_seed_selects_first_of_each_kind() {
        let inventory = DeviceInventory::from_devices(sample_devices());
        let selection = DeviceSelection::seed_from(&inventory);

        assert_eq!(selection.camera(), Some("cam-a"));
        assert_eq!(selection.microphone(), Some("mic-1"));
        assert_eq!(selection.speaker(), Some("spk-1"));
    }

    #[test]
    fn test_seed_from_empty_inventory_leaves_unset() {
        let selection = DeviceSelection::seed_from(&DeviceInventory::empty());
        assert_eq!(selection, DeviceSelection::default());
        assert!(selection.camera().is_none());
    }

    #[test]
    fn test_select_rejects_unknown_device() {
        let inventory = DeviceInventory::from_devices(sample_devices());
        let mut selection = DeviceSelection::seed_from(&inventory);

        assert_eq!(
            selection.select(&inventory, DeviceKind::Camera, "cam-z"),
            Err(MediaError::DeviceNotFound {
                device_id: "cam-z".to_string()
            })
        );
        // A microphone id is not a camera
        assert!(selection
            .select(&inventory, DeviceKind::Camera, "mic-1")
            .is_err());
        assert_eq!(selection.camera(), Some("cam-a"));

        assert_eq!(selection.select(&inventory, DeviceKind::Camera, "cam-b"), Ok(true));
        assert_eq!(selection.select(&inventory, DeviceKind::Camera, "cam-b"), Ok(false));
        assert_eq!(selection.camera(), Some("cam-b"));
    }

    #[test]
    fn test_reconcile_keeps_present_and_redefaults_missing() {
        let inventory = DeviceInventory::from_devices(sample_devices());
        let mut selection = DeviceSelection::seed_from(&inventory);
        selection
            .select(&inventory, DeviceKind::Camera, "cam-b")
            .unwrap();

        let next = DeviceInventory::from_devices(vec![
            DeviceDescriptor::new("cam-b", DeviceKind::Camera, "USB Webcam"),
            DeviceDescriptor::new("mic-2", DeviceKind::Microphone, "Headset"),
        ]);
        let changed = selection.reconcile_with(&next);

        assert_eq!(selection.camera(), Some("cam-b"));
        assert_eq!(selection.microphone(), Some("mic-2"));
        assert_eq!(selection.speaker(), None);
        assert_eq!(changed, vec![DeviceKind::Microphone, DeviceKind::Speaker]);
    }
}
