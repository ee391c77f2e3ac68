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

//! evdev event to canonical event translation

use kestrel_core::*;
use ::evdev::{InputEvent as EvdevEvent, InputEventKind, Key, RelativeAxisType, Synchronization};

/// Key symbol reported for evdev keys; the compositor resolves symbols
/// from its own keymap.
pub const NO_SYMBOL: u32 = 0;

const BUTTON_MAP: [(Key, PointerButtons); 5] = [
    (Key::BTN_LEFT, PointerButtons::PRIMARY),
    (Key::BTN_RIGHT, PointerButtons::SECONDARY),
    (Key::BTN_MIDDLE, PointerButtons::TERTIARY),
    (Key::BTN_SIDE, PointerButtons::BACK),
    (Key::BTN_EXTRA, PointerButtons::FORWARD),
];

/// Canonical button for an evdev button code, if it is one we track
pub fn pointer_button(key: Key) -> Option<PointerButtons> {
    BUTTON_MAP.iter().find(|(code, _)| *code == key).map(|(_, button)| *button)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PendingMotion {
    dx: i32,
    dy: i32,
    hscroll: i32,
    vscroll: i32,
    dirty: bool,
}

/// Per-node translation state.
///
/// Relative axes are accumulated until `SYN_REPORT` and emitted as one
/// motion event; buttons update the live mask immediately.
#[derive(Debug, Default)]
pub struct EvdevTranslator {
    buttons: PointerButtons,
    pending: PendingMotion,
}

impl EvdevTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buttons(&self) -> PointerButtons {
        self.buttons
    }

    pub fn translate(&mut self, builder: &EventBuilder, event: &EvdevEvent) -> Option<InputEvent> {
        let event_time = event_time_from_system_time(event.timestamp());
        match event.kind() {
            InputEventKind::Key(key) => match pointer_button(key) {
                Some(button) => self.button(builder, event_time, button, event.value()),
                None => Self::key(builder, event_time, key, event.value()),
            },
            InputEventKind::RelAxis(axis) => {
                self.accumulate(axis, event.value());
                None
            }
            InputEventKind::Synchronization(Synchronization::SYN_REPORT) => self.flush(builder, event_time),
            InputEventKind::Synchronization(Synchronization::SYN_DROPPED) => {
                self.pending = PendingMotion::default();
                None
            }
            _ => None,
        }
    }

    fn key(builder: &EventBuilder, event_time: std::time::Duration, key: Key, value: i32) -> Option<InputEvent> {
        let action = match value {
            0 => KeyboardAction::Up,
            1 => KeyboardAction::Down,
            2 => KeyboardAction::Repeat,
            _ => return None,
        };
        Some(builder.key_event(event_time, action, NO_SYMBOL, i32::from(key.code())))
    }

    fn button(
        &mut self,
        builder: &EventBuilder,
        event_time: std::time::Duration,
        button: PointerButtons,
        value: i32,
    ) -> Option<InputEvent> {
        let action = match value {
            0 => {
                self.buttons.remove(button);
                PointerAction::ButtonUp
            }
            1 => {
                self.buttons.insert(button);
                PointerAction::ButtonDown
            }
            _ => return None,
        };
        Some(builder.pointer_event(event_time, action, self.buttons, 0.0, 0.0, 0.0, 0.0))
    }

    fn accumulate(&mut self, axis: RelativeAxisType, value: i32) {
        let slot = match axis {
            RelativeAxisType::REL_X => &mut self.pending.dx,
            RelativeAxisType::REL_Y => &mut self.pending.dy,
            RelativeAxisType::REL_WHEEL => &mut self.pending.vscroll,
            RelativeAxisType::REL_HWHEEL => &mut self.pending.hscroll,
            _ => return,
        };
        *slot = slot.saturating_add(value);
        self.pending.dirty = true;
    }

    fn flush(&mut self, builder: &EventBuilder, event_time: std::time::Duration) -> Option<InputEvent> {
        let pending = std::mem::take(&mut self.pending);
        if !pending.dirty {
            return None;
        }
        Some(builder.pointer_event(
            event_time,
            PointerAction::Motion,
            self.buttons,
            pending.hscroll as f32,
            pending.vscroll as f32,
            pending.dx as f32,
            pending.dy as f32,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::evdev::EventType;

    fn builder() -> EventBuilder {
        EventBuilder::new(DeviceId::new("evdev:/dev/input/event3"))
    }

    fn key(key: Key, value: i32) -> EvdevEvent {
        EvdevEvent::new(EventType::KEY, key.code(), value)
    }

    fn rel(axis: RelativeAxisType, value: i32) -> EvdevEvent {
        EvdevEvent::new(EventType::RELATIVE, axis.0, value)
    }

    fn syn() -> EvdevEvent {
        EvdevEvent::new(EventType::SYNCHRONIZATION, Synchronization::SYN_REPORT.0, 0)
    }

    #[test]
    fn test_key_values_map_to_actions() {
        let builder = builder();
        let mut translator = EvdevTranslator::new();

        let actions: Vec<_> = [1, 2, 0]
            .into_iter()
            .map(|value| {
                let event = translator.translate(&builder, &key(Key::KEY_A, value)).unwrap();
                let key_event = event.as_key().unwrap().clone();
                assert_eq!(key_event.scan_code, i32::from(Key::KEY_A.code()));
                assert_eq!(key_event.key_code, NO_SYMBOL);
                key_event.action
            })
            .collect();

        assert_eq!(actions, vec![KeyboardAction::Down, KeyboardAction::Repeat, KeyboardAction::Up]);
    }

    #[test]
    fn test_buttons_track_live_mask() {
        let builder = builder();
        let mut translator = EvdevTranslator::new();

        let down = translator.translate(&builder, &key(Key::BTN_MIDDLE, 1)).unwrap();
        let pointer = down.as_pointer().unwrap();
        assert_eq!(pointer.action, PointerAction::ButtonDown);
        assert_eq!(pointer.buttons, PointerButtons::TERTIARY);

        translator.translate(&builder, &key(Key::BTN_RIGHT, 1)).unwrap();
        assert_eq!(translator.buttons(), PointerButtons::TERTIARY | PointerButtons::SECONDARY);

        let up = translator.translate(&builder, &key(Key::BTN_MIDDLE, 0)).unwrap();
        let pointer = up.as_pointer().unwrap();
        assert_eq!(pointer.action, PointerAction::ButtonUp);
        assert_eq!(pointer.buttons, PointerButtons::SECONDARY);
    }

    #[test]
    fn test_relative_axes_flush_on_report() {
        let builder = builder();
        let mut translator = EvdevTranslator::new();

        assert!(translator.translate(&builder, &rel(RelativeAxisType::REL_X, 3)).is_none());
        assert!(translator.translate(&builder, &rel(RelativeAxisType::REL_Y, -2)).is_none());
        assert!(translator.translate(&builder, &rel(RelativeAxisType::REL_X, 1)).is_none());
        assert!(translator.translate(&builder, &rel(RelativeAxisType::REL_WHEEL, -1)).is_none());

        let event = translator.translate(&builder, &syn()).unwrap();
        let pointer = event.as_pointer().unwrap();
        assert_eq!(pointer.action, PointerAction::Motion);
        assert_eq!((pointer.relative_x, pointer.relative_y), (4.0, -2.0));
        assert_eq!(pointer.vscroll, -1.0);
        assert_eq!(pointer.hscroll, 0.0);

        // Nothing pending after the flush
        assert!(translator.translate(&builder, &syn()).is_none());
    }

    #[test]
    fn test_dropped_frame_discards_motion() {
        let builder = builder();
        let mut translator = EvdevTranslator::new();

        translator.translate(&builder, &rel(RelativeAxisType::REL_HWHEEL, 1));
        let dropped = EvdevEvent::new(EventType::SYNCHRONIZATION, Synchronization::SYN_DROPPED.0, 0);
        assert!(translator.translate(&builder, &dropped).is_none());
        assert!(translator.translate(&builder, &syn()).is_none());
    }
}
