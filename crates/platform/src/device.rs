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

//! Logical input devices

use crate::InputSink;
use kestrel_core::*;
use std::fmt;
use std::sync::{Mutex, Weak};

/// Backend-owned mutable state of a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceState {
    /// Last absolute pointer position seen on a button event
    pub pointer_position: Point,
}

/// A single logical device exposed by a platform.
///
/// The sink is a weak reference handed out by the registry while the device
/// is registered; the device never keeps its sink alive.
pub struct InputDevice {
    info: InputDeviceInfo,
    builder: EventBuilder,
    sink: Mutex<Option<Weak<dyn InputSink>>>,
    state: Mutex<DeviceState>,
}

impl InputDevice {
    pub fn new(info: InputDeviceInfo) -> Self {
        let builder = EventBuilder::new(info.unique_id.clone());
        InputDevice {
            info,
            builder,
            sink: Mutex::new(None),
            state: Mutex::new(DeviceState::default()),
        }
    }

    pub fn info(&self) -> &InputDeviceInfo {
        &self.info
    }

    pub fn id(&self) -> &DeviceId {
        &self.info.unique_id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn capabilities(&self) -> DeviceCapability {
        self.info.capabilities
    }

    pub fn builder(&self) -> &EventBuilder {
        &self.builder
    }

    /// Attach the delivery target. Called by a registry when it accepts the device.
    pub fn attach_sink(&self, sink: Weak<dyn InputSink>) {
        *lock_unpoisoned(&self.sink) = Some(sink);
    }

    /// Detach the delivery target. Called by a registry on removal.
    pub fn detach_sink(&self) {
        *lock_unpoisoned(&self.sink) = None;
    }

    /// Whether a live sink is attached
    pub fn has_sink(&self) -> bool {
        lock_unpoisoned(&self.sink)
            .as_ref()
            .is_some_and(|sink| sink.strong_count() > 0)
    }

    /// Hand one event to the attached sink
    pub fn deliver(&self, event: InputEvent) -> InputResult<()> {
        let sink = lock_unpoisoned(&self.sink).as_ref().and_then(Weak::upgrade);
        match sink {
            Some(sink) => {
                sink.handle_input(event);
                Ok(())
            }
            None => Err(InputError::NoSink {
                device: self.info.unique_id.to_string(),
            }),
        }
    }

    /// Run `f` with exclusive access to the device state
    pub fn with_state<R>(&self, f: impl FnOnce(&mut DeviceState) -> R) -> R {
        f(&mut lock_unpoisoned(&self.state))
    }

    pub fn state(&self) -> DeviceState {
        *lock_unpoisoned(&self.state)
    }
}

impl fmt::Debug for InputDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputDevice")
            .field("info", &self.info)
            .field("has_sink", &self.has_sink())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct Recording(Mutex<Vec<InputEvent>>);

    impl InputSink for Recording {
        fn handle_input(&self, event: InputEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn keyboard() -> InputDevice {
        InputDevice::new(InputDeviceInfo::new("kbd", "kbd-1", DeviceCapability::KEYBOARD))
    }

    #[test]
    fn test_deliver_without_sink_fails() {
        let device = keyboard();
        let event = device.builder().key_event(Duration::ZERO, KeyboardAction::Down, 0, 1);

        assert!(!device.has_sink());
        assert!(matches!(device.deliver(event), Err(InputError::NoSink { .. })));
    }

    #[test]
    fn test_deliver_reaches_sink() {
        let device = keyboard();
        let sink = Arc::new(Recording::default());
        let dyn_sink: Arc<dyn InputSink> = sink.clone();
        device.attach_sink(Arc::downgrade(&dyn_sink));

        let event = device.builder().key_event(Duration::ZERO, KeyboardAction::Up, 0x61, 30);
        device.deliver(event.clone()).unwrap();

        assert_eq!(*sink.0.lock().unwrap(), vec![event]);
    }

    #[test]
    fn test_device_outlives_sink() {
        let device = keyboard();
        let sink: Arc<dyn InputSink> = Arc::new(Recording::default());
        device.attach_sink(Arc::downgrade(&sink));
        assert!(device.has_sink());

        drop(sink);
        assert!(!device.has_sink());
        let event = device.builder().key_event(Duration::ZERO, KeyboardAction::Down, 0, 1);
        assert!(device.deliver(event).is_err());
    }

    #[test]
    fn test_state_is_mutable() {
        let device = keyboard();
        device.with_state(|state| state.pointer_position = Point::new(3, 4));
        assert_eq!(device.state().pointer_position, Point::new(3, 4));
    }
}
