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

//! Input from a (nested) X server

pub mod keymap;
pub mod translate;
pub mod window;

pub use keymap::{Keymap, KeymapCache};
pub use translate::{Translation, X11EventTranslator, X11_KEYCODE_OFFSET};
pub use window::{create_input_window, InputWindowOptions};

use crate::platform::duplicate_event_fd;
use crate::{InputDevice, InputDeviceRegistry, Platform, PlatformResult};
use kestrel_core::*;
use kestrel_dispatch::{Dispatchable, ReadableFd};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt as _, GrabMode, Window};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::CURRENT_TIME;

pub(crate) const LOG_TARGET: &str = "x11-input";

/// X11 backend behaviour switches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XInputOptions {
    /// Grab the keyboard while the window has focus
    pub grab_keyboard: bool,
}

impl Default for XInputOptions {
    fn default() -> Self {
        XInputOptions { grab_keyboard: true }
    }
}

/// Connect to the X server named by `display` (or `$DISPLAY`)
pub fn connect(display: Option<&str>) -> PlatformResult<(Arc<RustConnection>, usize)> {
    let (conn, screen_num) = RustConnection::connect(display)?;
    info!(target: LOG_TARGET, "Connected to X server, screen {}", screen_num);
    Ok((Arc::new(conn), screen_num))
}

struct XInputState {
    connection: Arc<RustConnection>,
    keyboard: Arc<InputDevice>,
    pointer: Arc<InputDevice>,
    keymap: Mutex<KeymapCache>,
    options: XInputOptions,
}

impl XInputState {
    /// Drain every event the connection has; false once the connection is gone.
    fn process_input_events(&self) -> bool {
        loop {
            match self.connection.poll_for_event() {
                Ok(Some(event)) => self.process_input_event(event),
                Ok(None) => return true,
                Err(e) => {
                    error!(target: LOG_TARGET, "X11 connection failed, no more input from it: {}", e);
                    return false;
                }
            }
        }
    }

    fn process_input_event(&self, event: Event) {
        if !self.keyboard.has_sink() && !self.pointer.has_sink() {
            error!(target: LOG_TARGET, "input event received with no sink to handle it");
            return;
        }

        let translation = {
            let mut cache = lock_unpoisoned(&self.keymap);
            if matches!(event, Event::KeyPress(_) | Event::KeyRelease(_)) {
                cache.refresh_if_stale(|| Keymap::fetch(&*self.connection));
            }
            let translator = X11EventTranslator {
                keyboard: self.keyboard.builder(),
                pointer: self.pointer.builder(),
                keymap: cache.keymap(),
            };
            self.pointer
                .with_state(|state| translator.translate(&event, &mut state.pointer_position))
        };

        match translation {
            Translation::Keyboard(event) => Self::deliver(&self.keyboard, event),
            Translation::Pointer(event) => Self::deliver(&self.pointer, event),
            Translation::GrabKeyboard { window } if self.options.grab_keyboard => self.grab_keyboard(window),
            Translation::UngrabKeyboard if self.options.grab_keyboard => self.ungrab_keyboard(),
            Translation::RefreshKeymap => lock_unpoisoned(&self.keymap).invalidate(),
            Translation::GrabKeyboard { .. } | Translation::UngrabKeyboard | Translation::Ignored => {}
        }
    }

    fn deliver(device: &InputDevice, event: InputEvent) {
        if let Err(e) = device.deliver(event) {
            error!(target: LOG_TARGET, "Dropping input event: {}", e);
        }
    }

    fn grab_keyboard(&self, window: Window) {
        // The reply is discarded; a failed grab only costs keyboard focus.
        let result = self
            .connection
            .grab_keyboard(true, window, CURRENT_TIME, GrabMode::ASYNC, GrabMode::ASYNC)
            .map(drop)
            .and_then(|()| self.connection.flush());
        match result {
            Ok(()) => debug!(target: LOG_TARGET, "Grabbed keyboard for window {:#x}", window),
            Err(e) => warn!(target: LOG_TARGET, "Failed to grab keyboard: {}", e),
        }
    }

    fn ungrab_keyboard(&self) {
        let result = self
            .connection
            .ungrab_keyboard(CURRENT_TIME)
            .map(drop)
            .and_then(|()| self.connection.flush());
        match result {
            Ok(()) => debug!(target: LOG_TARGET, "Released keyboard grab"),
            Err(e) => warn!(target: LOG_TARGET, "Failed to release keyboard grab: {}", e),
        }
    }
}

/// Core keyboard and pointer of an X server connection.
///
/// The connection is shared with whatever owns the X window (normally the
/// graphics side); this platform only reads events from it.
pub struct XInputPlatform {
    state: Arc<XInputState>,
    registry: Arc<dyn InputDeviceRegistry>,
    dispatchable: Arc<ReadableFd>,
}

impl XInputPlatform {
    pub fn new(
        registry: Arc<dyn InputDeviceRegistry>,
        connection: Arc<RustConnection>,
        options: XInputOptions,
    ) -> PlatformResult<Self> {
        let fd = duplicate_event_fd(connection.stream())?;

        let keymap = Keymap::fetch(&*connection).unwrap_or_else(|e| {
            warn!(target: LOG_TARGET, "Failed to fetch keyboard mapping, key symbols unavailable: {}", e);
            Keymap::default()
        });

        let state = Arc::new(XInputState {
            connection,
            keyboard: Arc::new(InputDevice::new(InputDeviceInfo::new(
                "x11-keyboard-device",
                "x11-key-dev-1",
                DeviceCapability::KEYBOARD,
            ))),
            pointer: Arc::new(InputDevice::new(InputDeviceInfo::new(
                "x11-mouse-device",
                "x11-mouse-dev-1",
                DeviceCapability::POINTER,
            ))),
            keymap: Mutex::new(KeymapCache::new(keymap)),
            options,
        });

        let reader = state.clone();
        let dispatchable = Arc::new(ReadableFd::new(fd, move || reader.process_input_events()));

        Ok(XInputPlatform {
            state,
            registry,
            dispatchable,
        })
    }

    pub fn keyboard(&self) -> &Arc<InputDevice> {
        &self.state.keyboard
    }

    pub fn pointer(&self) -> &Arc<InputDevice> {
        &self.state.pointer
    }
}

impl Platform for XInputPlatform {
    fn dispatchable(&self) -> Arc<dyn Dispatchable> {
        self.dispatchable.clone()
    }

    fn start(&self) {
        self.registry.add_device(self.state.keyboard.clone());
        self.registry.add_device(self.state.pointer.clone());
        info!(target: LOG_TARGET, "X11 input platform started");
    }

    fn stop(&self) {
        self.registry.remove_device(&self.state.keyboard);
        self.registry.remove_device(&self.state.pointer);
        info!(target: LOG_TARGET, "X11 input platform stopped");
    }

    fn name(&self) -> &str {
        "x11"
    }
}
