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

//! Canonical input events consumed by the compositor

use crate::{DeviceId, PointerButtons};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Keyboard event actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyboardAction {
    Down,
    Up,
    Repeat,
}

/// Pointer event actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerAction {
    ButtonDown,
    ButtonUp,
    Motion,
}

/// A key transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub device_id: DeviceId,
    pub event_time: Duration,
    pub action: KeyboardAction,
    /// Resolved key symbol, `0` when the backend leaves resolution to the consumer.
    pub key_code: u32,
    /// Linux input scan code.
    pub scan_code: i32,
}

/// A pointer button, motion or scroll event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub device_id: DeviceId,
    pub event_time: Duration,
    pub action: PointerAction,
    pub buttons: PointerButtons,
    pub hscroll: f32,
    pub vscroll: f32,
    pub relative_x: f32,
    pub relative_y: f32,
}

/// Canonical input event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    Key(KeyEvent),
    Pointer(PointerEvent),
}

impl InputEvent {
    pub fn device_id(&self) -> &DeviceId {
        match self {
            InputEvent::Key(key) => &key.device_id,
            InputEvent::Pointer(pointer) => &pointer.device_id,
        }
    }

    pub fn event_time(&self) -> Duration {
        match self {
            InputEvent::Key(key) => key.event_time,
            InputEvent::Pointer(pointer) => pointer.event_time,
        }
    }

    pub fn as_key(&self) -> Option<&KeyEvent> {
        match self {
            InputEvent::Key(key) => Some(key),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<&PointerEvent> {
        match self {
            InputEvent::Pointer(pointer) => Some(pointer),
            _ => None,
        }
    }
}

/// Builds canonical events stamped with one device's identity.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    device_id: DeviceId,
}

impl EventBuilder {
    pub fn new(device_id: DeviceId) -> Self {
        EventBuilder { device_id }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn key_event(&self, event_time: Duration, action: KeyboardAction, key_code: u32, scan_code: i32) -> InputEvent {
        InputEvent::Key(KeyEvent {
            device_id: self.device_id.clone(),
            event_time,
            action,
            key_code,
            scan_code,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn pointer_event(
        &self,
        event_time: Duration,
        action: PointerAction,
        buttons: PointerButtons,
        hscroll: f32,
        vscroll: f32,
        relative_x: f32,
        relative_y: f32,
    ) -> InputEvent {
        InputEvent::Pointer(PointerEvent {
            device_id: self.device_id.clone(),
            event_time,
            action,
            buttons,
            hscroll,
            vscroll,
            relative_x,
            relative_y,
        })
    }
}
