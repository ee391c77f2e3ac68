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

//! Native input from `/dev/input/event*` nodes
//!
//! Every usable node becomes one [`InputDevice`]. The nodes' descriptors are
//! gathered in a private multiplexer, which is the platform's single
//! dispatchable.

pub mod translate;

pub use translate::{EvdevTranslator, NO_SYMBOL};

use crate::platform::duplicate_event_fd;
use crate::{InputDevice, InputDeviceRegistry, Platform, PlatformError, PlatformResult};
use ::evdev::{AttributeSetRef, Device, Key, RelativeAxisType};
use kestrel_core::*;
use kestrel_dispatch::{Dispatchable, MultiplexingDispatchable, ReadableFd};
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

pub(crate) const LOG_TARGET: &str = "evdev-input";

/// evdev backend settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvdevOptions {
    /// Nodes to open; empty means every node under `/dev/input`
    pub devices: Vec<PathBuf>,
    /// Take exclusive access while the platform is started
    pub grab: bool,
}

/// Derive canonical capabilities from the codes a node advertises
pub fn capabilities_from(
    keys: Option<&AttributeSetRef<Key>>,
    relative_axes: Option<&AttributeSetRef<RelativeAxisType>>,
) -> DeviceCapability {
    let mut capabilities = DeviceCapability::empty();
    if let Some(keys) = keys {
        if keys.contains(Key::KEY_A) && keys.contains(Key::KEY_Z) {
            capabilities |= DeviceCapability::KEYBOARD;
        }
        if keys.contains(Key::BTN_LEFT) {
            capabilities |= DeviceCapability::POINTER;
        }
        if keys.contains(Key::BTN_TOUCH) {
            capabilities |= DeviceCapability::TOUCH;
        }
    }
    if let Some(axes) = relative_axes {
        if axes.contains(RelativeAxisType::REL_X) && axes.contains(RelativeAxisType::REL_Y) {
            capabilities |= DeviceCapability::POINTER;
        }
    }
    capabilities
}

struct EvdevSource {
    path: PathBuf,
    device: Arc<InputDevice>,
    node: Mutex<Device>,
    translator: Mutex<EvdevTranslator>,
}

impl EvdevSource {
    /// Read everything the node has queued; false once the node is gone.
    fn process_input_events(&self) -> bool {
        let mut node = lock_unpoisoned(&self.node);
        let mut translator = lock_unpoisoned(&self.translator);
        let events = match node.fetch_events() {
            Ok(events) => events,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => return true,
            Err(e) => {
                error!(target: LOG_TARGET, "Lost input device {}: {}", self.path.display(), e);
                return false;
            }
        };

        for event in events {
            let Some(event) = translator.translate(self.device.builder(), &event) else {
                continue;
            };
            if let Err(e) = self.device.deliver(event) {
                error!(target: LOG_TARGET, "Dropping input event: {}", e);
            }
        }
        true
    }

    fn set_grabbed(&self, grabbed: bool) {
        let mut node = lock_unpoisoned(&self.node);
        let result = if grabbed { node.grab() } else { node.ungrab() };
        if let Err(e) = result {
            warn!(
                target: LOG_TARGET,
                "Failed to {} {}: {}",
                if grabbed { "grab" } else { "release" },
                self.path.display(),
                e
            );
        }
    }
}

/// Keyboards, mice and touch devices read straight from the kernel
pub struct EvdevPlatform {
    registry: Arc<dyn InputDeviceRegistry>,
    sources: Vec<Arc<EvdevSource>>,
    multiplexer: Arc<MultiplexingDispatchable>,
    grab: bool,
}

impl EvdevPlatform {
    pub fn new(registry: Arc<dyn InputDeviceRegistry>, options: EvdevOptions) -> PlatformResult<Self> {
        let nodes: Vec<(PathBuf, Device)> = if options.devices.is_empty() {
            ::evdev::enumerate().collect()
        } else {
            options
                .devices
                .iter()
                .filter_map(|path| match Device::open(path) {
                    Ok(node) => Some((path.clone(), node)),
                    Err(e) => {
                        warn!(target: LOG_TARGET, "Cannot open {}: {}", path.display(), e);
                        None
                    }
                })
                .collect()
        };

        let multiplexer = Arc::new(MultiplexingDispatchable::new()?);
        let mut sources = Vec::new();
        for (path, node) in nodes {
            if let Some(source) = Self::open_source(&path, node, &multiplexer)? {
                sources.push(source);
            }
        }

        if sources.is_empty() {
            return Err(PlatformError::NoDevices);
        }
        info!(target: LOG_TARGET, "Using {} evdev device(s)", sources.len());

        Ok(EvdevPlatform {
            registry,
            sources,
            multiplexer,
            grab: options.grab,
        })
    }

    fn open_source(
        path: &Path,
        node: Device,
        multiplexer: &MultiplexingDispatchable,
    ) -> PlatformResult<Option<Arc<EvdevSource>>> {
        let capabilities = capabilities_from(node.supported_keys(), node.supported_relative_axes());
        let name = node.name().unwrap_or("evdev device").to_string();
        if capabilities.is_empty() {
            debug!(target: LOG_TARGET, "Skipping {} ({}): no input capabilities", path.display(), name);
            return Ok(None);
        }

        // SAFETY: evdev 0.12's `Device` implements `AsRawFd` but not `AsFd`; the
        // descriptor is owned by `node`, which outlives this borrow.
        let fd = duplicate_event_fd(&unsafe { BorrowedFd::borrow_raw(node.as_raw_fd()) })?;
        let info = InputDeviceInfo::new(name, format!("evdev:{}", path.display()), capabilities);
        let source = Arc::new(EvdevSource {
            path: path.to_path_buf(),
            device: Arc::new(InputDevice::new(info)),
            node: Mutex::new(node),
            translator: Mutex::new(EvdevTranslator::new()),
        });

        let reader = source.clone();
        multiplexer.add_watch(Arc::new(ReadableFd::new(fd, move || reader.process_input_events())))?;
        debug!(target: LOG_TARGET, "Opened {} as {:?}", path.display(), source.device);
        Ok(Some(source))
    }

    pub fn devices(&self) -> impl Iterator<Item = &Arc<InputDevice>> {
        self.sources.iter().map(|source| &source.device)
    }
}

impl Platform for EvdevPlatform {
    fn dispatchable(&self) -> Arc<dyn Dispatchable> {
        self.multiplexer.clone()
    }

    fn start(&self) {
        for source in &self.sources {
            if self.grab {
                source.set_grabbed(true);
            }
            self.registry.add_device(source.device.clone());
        }
        info!(target: LOG_TARGET, "evdev input platform started");
    }

    fn stop(&self) {
        for source in &self.sources {
            self.registry.remove_device(&source.device);
            if self.grab {
                source.set_grabbed(false);
            }
        }
        info!(target: LOG_TARGET, "evdev input platform stopped");
    }

    fn name(&self) -> &str {
        "evdev"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::evdev::AttributeSet;

    #[test]
    fn test_keyboard_capabilities() {
        let keys: AttributeSet<Key> = [Key::KEY_A, Key::KEY_Z, Key::KEY_ENTER].into_iter().collect();
        assert_eq!(capabilities_from(Some(&*keys), None), DeviceCapability::KEYBOARD);
    }

    #[test]
    fn test_mouse_capabilities() {
        let keys: AttributeSet<Key> = [Key::BTN_LEFT, Key::BTN_RIGHT].into_iter().collect();
        let axes: AttributeSet<RelativeAxisType> =
            [RelativeAxisType::REL_X, RelativeAxisType::REL_Y].into_iter().collect();
        assert_eq!(capabilities_from(Some(&*keys), Some(&*axes)), DeviceCapability::POINTER);
        assert_eq!(capabilities_from(None, Some(&*axes)), DeviceCapability::POINTER);
    }

    #[test]
    fn test_touch_and_unusable_nodes() {
        let keys: AttributeSet<Key> = [Key::BTN_TOUCH].into_iter().collect();
        assert_eq!(capabilities_from(Some(&*keys), None), DeviceCapability::TOUCH);

        // Power button style node: one key, no letters
        let keys: AttributeSet<Key> = [Key::KEY_POWER].into_iter().collect();
        assert!(capabilities_from(Some(&*keys), None).is_empty());
    }

    #[test]
    fn test_missing_nodes_are_no_devices() {
        let registry = Arc::new(crate::DefaultInputDeviceRegistry::new(Arc::new(crate::ChannelSink::new(1).0)));
        let options = EvdevOptions {
            devices: vec![PathBuf::from("/nonexistent/kestrel/event0")],
            grab: false,
        };
        assert!(matches!(EvdevPlatform::new(registry, options), Err(PlatformError::NoDevices)));
    }
}
