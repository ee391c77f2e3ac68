// Copyright 2024 Kestrel Input Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Device registry

use crate::{InputDevice, InputSink};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use kestrel_core::{DeviceId, InputDeviceInfo};
use std::sync::Arc;
use tracing::{info, trace};

/// Where platforms announce their devices.
///
/// Both operations are set-like: adding a member again or removing a
/// non-member does nothing.
pub trait InputDeviceRegistry: Send + Sync {
    fn add_device(&self, device: Arc<InputDevice>);

    fn remove_device(&self, device: &Arc<InputDevice>);
}

/// Registry that routes every registered device to one shared sink
pub struct DefaultInputDeviceRegistry {
    sink: Arc<dyn InputSink>,
    devices: DashMap<DeviceId, Arc<InputDevice>>,
}

impl DefaultInputDeviceRegistry {
    pub fn new(sink: Arc<dyn InputSink>) -> Self {
        DefaultInputDeviceRegistry {
            sink,
            devices: DashMap::new(),
        }
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.devices.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Descriptions of every registered device
    pub fn devices(&self) -> Vec<InputDeviceInfo> {
        let mut devices: Vec<_> = self.devices.iter().map(|entry| entry.value().info().clone()).collect();
        devices.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));
        devices
    }
}

impl InputDeviceRegistry for DefaultInputDeviceRegistry {
    fn add_device(&self, device: Arc<InputDevice>) {
        match self.devices.entry(device.id().clone()) {
            Entry::Occupied(_) => trace!("Device {} already registered", device.id()),
            Entry::Vacant(slot) => {
                device.attach_sink(Arc::downgrade(&self.sink));
                info!("Input device added: {} ({}) {:?}", device.name(), device.id(), device.capabilities());
                slot.insert(device);
            }
        }
    }

    fn remove_device(&self, device: &Arc<InputDevice>) {
        if let Some((_, removed)) = self.devices.remove(device.id()) {
            removed.detach_sink();
            info!("Input device removed: {} ({})", removed.name(), removed.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::{DeviceCapability, InputEvent};
    use std::collections::BTreeSet;

    struct NullSink;

    impl InputSink for NullSink {
        fn handle_input(&self, _event: InputEvent) {}
    }

    fn device(id: &str) -> Arc<InputDevice> {
        Arc::new(InputDevice::new(InputDeviceInfo::new(id, id, DeviceCapability::POINTER)))
    }

    #[test]
    fn test_add_attaches_and_remove_detaches_sink() {
        let registry = DefaultInputDeviceRegistry::new(Arc::new(NullSink));
        let mouse = device("mouse");

        registry.add_device(mouse.clone());
        assert!(mouse.has_sink());
        assert!(registry.contains(mouse.id()));

        registry.remove_device(&mouse);
        assert!(!mouse.has_sink());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_add_and_remove_are_noops() {
        let registry = DefaultInputDeviceRegistry::new(Arc::new(NullSink));
        let mouse = device("mouse");

        registry.add_device(mouse.clone());
        registry.add_device(mouse.clone());
        assert_eq!(registry.len(), 1);

        registry.remove_device(&mouse);
        registry.remove_device(&mouse);
        assert_eq!(registry.len(), 0);
        assert!(!mouse.has_sink());
    }

    #[test]
    fn test_membership_matches_set_replay() {
        let registry = DefaultInputDeviceRegistry::new(Arc::new(NullSink));
        let devices: Vec<_> = ["a", "b", "c", "d"].iter().map(|id| device(id)).collect();

        // (device index, add?) chosen to hit repeated adds, stray removes and re-adds.
        let ops = [
            (0, true), (1, true), (0, true), (2, false), (1, false), (3, true),
            (1, false), (2, true), (0, false), (0, true), (3, false), (2, true),
        ];
        let mut expected = BTreeSet::new();
        for (index, add) in ops {
            let device = &devices[index];
            if add {
                registry.add_device(device.clone());
                expected.insert(device.id().clone());
            } else {
                registry.remove_device(device);
                expected.remove(device.id());
            }
        }

        let actual: BTreeSet<_> = registry.devices().into_iter().map(|info| info.unique_id).collect();
        assert_eq!(actual, expected);
        for device in &devices {
            assert_eq!(device.has_sink(), expected.contains(device.id()));
        }
    }
}
