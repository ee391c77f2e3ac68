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

//! X11 event to canonical event translation
//!
//! Pure logic: no connection, no sinks. The platform applies the returned
//! [`Translation`] (delivering events, grabbing the keyboard, refreshing the
//! keymap).

use super::keymap::Keymap;
use super::LOG_TARGET;
use kestrel_core::*;
use tracing::trace;
use x11rb::protocol::xproto::{Button, ButtonPressEvent, KeyButMask, KeyPressEvent, Mapping, Window};
use x11rb::protocol::Event;

/// X keycodes are offset by 8 from Linux input scan codes
pub const X11_KEYCODE_OFFSET: i32 = 8;

const BUTTON_1: Button = 1;
const BUTTON_2: Button = 2;
const BUTTON_3: Button = 3;
const BUTTON_4: Button = 4;
const BUTTON_5: Button = 5;

/// What the platform should do with one X event
#[derive(Debug, Clone, PartialEq)]
pub enum Translation {
    /// Deliver through the keyboard device
    Keyboard(InputEvent),
    /// Deliver through the pointer device
    Pointer(InputEvent),
    GrabKeyboard { window: Window },
    UngrabKeyboard,
    RefreshKeymap,
    Ignored,
}

/// Map an X button number to the canonical button it stands for.
///
/// X button 2 is the middle button, hence tertiary. Buttons 4 and 5 are the
/// wheel and only map to back/forward for completeness of the mask.
pub fn pointer_button(button: Button) -> PointerButtons {
    match button {
        BUTTON_1 => PointerButtons::PRIMARY,
        BUTTON_2 => PointerButtons::TERTIARY,
        BUTTON_3 => PointerButtons::SECONDARY,
        BUTTON_4 => PointerButtons::BACK,
        BUTTON_5 => PointerButtons::FORWARD,
        _ => PointerButtons::empty(),
    }
}

/// Buttons held according to an X modifier/button state word
pub fn pointer_buttons_from_state(state: u16) -> PointerButtons {
    const MASKS: [(KeyButMask, PointerButtons); 5] = [
        (KeyButMask::BUTTON1, PointerButtons::PRIMARY),
        (KeyButMask::BUTTON2, PointerButtons::TERTIARY),
        (KeyButMask::BUTTON3, PointerButtons::SECONDARY),
        (KeyButMask::BUTTON4, PointerButtons::BACK),
        (KeyButMask::BUTTON5, PointerButtons::FORWARD),
    ];

    MASKS
        .iter()
        .filter(|(mask, _)| state & u16::from(*mask) != 0)
        .fold(PointerButtons::empty(), |held, (_, button)| held | *button)
}

/// Translates events for one keyboard/pointer device pair
pub struct X11EventTranslator<'a> {
    pub keyboard: &'a EventBuilder,
    pub pointer: &'a EventBuilder,
    pub keymap: &'a Keymap,
}

impl X11EventTranslator<'_> {
    /// Translate one event. `pointer_position` is the pointer device's last
    /// known position and is updated by button events.
    pub fn translate(&self, event: &Event, pointer_position: &mut Point) -> Translation {
        match event {
            Event::FocusIn(focus) => Translation::GrabKeyboard { window: focus.event },
            Event::FocusOut(_) => Translation::UngrabKeyboard,
            Event::KeyPress(key) => self.key(key, KeyboardAction::Down),
            Event::KeyRelease(key) => self.key(key, KeyboardAction::Up),
            Event::ButtonPress(button) => self.button(button, true, pointer_position),
            Event::ButtonRelease(button) => self.button(button, false, pointer_position),
            Event::MotionNotify(motion) => {
                let event_time = event_time_from_millis(motion.time);
                let buttons = pointer_buttons_from_state(u16::from(motion.state));
                trace!(target: LOG_TARGET, "X11 motion event: x={}, y={}, buttons={:?}", motion.event_x, motion.event_y, buttons);

                Translation::Pointer(self.pointer.pointer_event(
                    event_time,
                    PointerAction::Motion,
                    buttons,
                    0.0,
                    0.0,
                    0.0,
                    0.0,
                ))
            }
            Event::ConfigureNotify(configure) => {
                trace!(target: LOG_TARGET, "Window size: {}x{}", configure.width, configure.height);
                Translation::Ignored
            }
            Event::MappingNotify(mapping) if mapping.request == Mapping::POINTER => Translation::Ignored,
            Event::MappingNotify(_) => {
                trace!(target: LOG_TARGET, "Keyboard mapping changed at server, refreshing the cache");
                Translation::RefreshKeymap
            }
            other => {
                trace!(target: LOG_TARGET, "Uninteresting event: {:?}", other);
                Translation::Ignored
            }
        }
    }

    fn key(&self, key: &KeyPressEvent, action: KeyboardAction) -> Translation {
        let event_time = event_time_from_millis(key.time);
        let state = u16::from(key.state);
        let keysym = self.keymap.lookup(key.detail, state);
        let scan_code = i32::from(key.detail) - X11_KEYCODE_OFFSET;
        trace!(
            target: LOG_TARGET,
            "X11 key event: {:?} keycode={} state={:#06x} -> keysym={:#x} scan_code={}",
            action, key.detail, state, keysym, scan_code
        );

        Translation::Keyboard(self.keyboard.key_event(event_time, action, keysym, scan_code))
    }

    fn button(&self, button: &ButtonPressEvent, pressed: bool, pointer_position: &mut Point) -> Translation {
        let is_wheel = button.detail == BUTTON_4 || button.detail == BUTTON_5;
        if is_wheel && !pressed {
            trace!(target: LOG_TARGET, "Swallowed wheel release of button {}", button.detail);
            return Translation::Ignored;
        }

        let event_time = event_time_from_millis(button.time);
        if is_wheel {
            let vscroll = if button.detail == BUTTON_4 { 1.0 } else { -1.0 };
            return Translation::Pointer(self.pointer.pointer_event(
                event_time,
                PointerAction::Motion,
                PointerButtons::empty(),
                0.0,
                vscroll,
                0.0,
                0.0,
            ));
        }

        let buttons = if pressed { pointer_button(button.detail) } else { PointerButtons::empty() };
        let previous = *pointer_position;
        *pointer_position = Point::new(i32::from(button.event_x), i32::from(button.event_y));
        let movement = *pointer_position - previous;
        trace!(
            target: LOG_TARGET,
            "X11 button event: button={} pressed={} x={} y={} buttons={:?}",
            button.detail, pressed, button.event_x, button.event_y, buttons
        );

        let action = if pressed { PointerAction::ButtonDown } else { PointerAction::ButtonUp };
        Translation::Pointer(self.pointer.pointer_event(
            event_time,
            action,
            buttons,
            0.0,
            0.0,
            movement.dx_f32(),
            movement.dy_f32(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use x11rb::protocol::xproto::{
        FocusInEvent, MappingNotifyEvent, Motion, MotionNotifyEvent, NotifyDetail, NotifyMode,
        BUTTON_PRESS_EVENT, BUTTON_RELEASE_EVENT, FOCUS_IN_EVENT, FOCUS_OUT_EVENT, KEY_PRESS_EVENT,
        KEY_RELEASE_EVENT, MAPPING_NOTIFY_EVENT, MOTION_NOTIFY_EVENT,
    };

    struct Fixture {
        keyboard: EventBuilder,
        pointer: EventBuilder,
        keymap: Keymap,
    }

    impl Fixture {
        fn new() -> Self {
            let mut keysyms = vec![0; (255 - 8 + 1) * 2];
            keysyms[(38 - 8) * 2] = 0x61;
            keysyms[(38 - 8) * 2 + 1] = 0x41;
            Fixture {
                keyboard: EventBuilder::new(DeviceId::new("x11-key-dev-1")),
                pointer: EventBuilder::new(DeviceId::new("x11-mouse-dev-1")),
                keymap: Keymap::new(8, 2, keysyms),
            }
        }

        fn translate(&self, event: Event, position: &mut Point) -> Translation {
            let translator = X11EventTranslator {
                keyboard: &self.keyboard,
                pointer: &self.pointer,
                keymap: &self.keymap,
            };
            translator.translate(&event, position)
        }
    }

    fn key(response_type: u8, keycode: u8, state: u16) -> KeyPressEvent {
        KeyPressEvent {
            response_type,
            detail: keycode,
            sequence: 0,
            time: 1234,
            root: 1,
            event: 2,
            child: 0,
            root_x: 0,
            root_y: 0,
            event_x: 0,
            event_y: 0,
            state: KeyButMask::from(state),
            same_screen: true,
        }
    }

    fn button(response_type: u8, detail: u8, x: i16, y: i16) -> ButtonPressEvent {
        ButtonPressEvent {
            response_type,
            detail,
            sequence: 0,
            time: 40,
            root: 1,
            event: 2,
            child: 0,
            root_x: x,
            root_y: y,
            event_x: x,
            event_y: y,
            state: KeyButMask::from(0u16),
            same_screen: true,
        }
    }

    fn press(detail: u8, x: i16, y: i16) -> Event {
        Event::ButtonPress(button(BUTTON_PRESS_EVENT, detail, x, y))
    }

    fn release(detail: u8, x: i16, y: i16) -> Event {
        Event::ButtonRelease(button(BUTTON_RELEASE_EVENT, detail, x, y))
    }

    fn pointer_of(translation: Translation) -> PointerEvent {
        match translation {
            Translation::Pointer(InputEvent::Pointer(pointer)) => pointer,
            other => panic!("expected a pointer event, got {:?}", other),
        }
    }

    #[test]
    fn test_key_press_scan_code_and_time() {
        let fixture = Fixture::new();
        let translation = fixture.translate(Event::KeyPress(key(KEY_PRESS_EVENT, 38, 0)), &mut Point::default());

        let Translation::Keyboard(InputEvent::Key(event)) = translation else {
            panic!("expected a key event");
        };
        assert_eq!(event.scan_code, 30);
        assert_eq!(event.key_code, 0x61);
        assert_eq!(event.action, KeyboardAction::Down);
        assert_eq!(event.event_time, Duration::from_millis(1234));
        assert_eq!(event.event_time.as_nanos(), 1_234_000_000);
        assert_eq!(event.device_id.as_str(), "x11-key-dev-1");
    }

    #[test]
    fn test_key_release_with_shift() {
        let fixture = Fixture::new();
        let translation = fixture.translate(Event::KeyRelease(key(KEY_RELEASE_EVENT, 38, 1)), &mut Point::default());

        let Translation::Keyboard(InputEvent::Key(event)) = translation else {
            panic!("expected a key event");
        };
        assert_eq!(event.action, KeyboardAction::Up);
        assert_eq!(event.key_code, 0x41);
        assert_eq!(event.scan_code, 30);
    }

    #[test]
    fn test_middle_button_is_tertiary() {
        let fixture = Fixture::new();
        let event = pointer_of(fixture.translate(press(2, 0, 0), &mut Point::default()));
        assert_eq!(event.buttons, PointerButtons::TERTIARY);
        assert!(!event.buttons.contains(PointerButtons::SECONDARY));

        let event = pointer_of(fixture.translate(press(3, 0, 0), &mut Point::default()));
        assert_eq!(event.buttons, PointerButtons::SECONDARY);

        let event = pointer_of(fixture.translate(press(1, 0, 0), &mut Point::default()));
        assert_eq!(event.buttons, PointerButtons::PRIMARY);
    }

    #[test]
    fn test_wheel_press_scrolls() {
        let fixture = Fixture::new();
        let mut position = Point::new(7, 7);

        let up = pointer_of(fixture.translate(press(4, 50, 50), &mut position));
        assert_eq!(up.action, PointerAction::Motion);
        assert_eq!(up.vscroll, 1.0);
        assert_eq!(up.hscroll, 0.0);
        assert_eq!(up.buttons, PointerButtons::empty());
        assert_eq!((up.relative_x, up.relative_y), (0.0, 0.0));

        let down = pointer_of(fixture.translate(press(5, 50, 50), &mut position));
        assert_eq!(down.vscroll, -1.0);

        assert_eq!(position, Point::new(7, 7));
    }

    #[test]
    fn test_wheel_release_is_swallowed() {
        let fixture = Fixture::new();
        let mut position = Point::default();
        assert_eq!(fixture.translate(release(4, 1, 1), &mut position), Translation::Ignored);
        assert_eq!(fixture.translate(release(5, 1, 1), &mut position), Translation::Ignored);
    }

    #[test]
    fn test_button_movement_delta() {
        let fixture = Fixture::new();
        let mut position = Point::new(10, 10);

        let event = pointer_of(fixture.translate(press(1, 15, 12), &mut position));
        assert_eq!(event.action, PointerAction::ButtonDown);
        assert_eq!((event.relative_x, event.relative_y), (5.0, 2.0));
        assert_eq!((event.hscroll, event.vscroll), (0.0, 0.0));
        assert_eq!(position, Point::new(15, 12));

        let event = pointer_of(fixture.translate(release(1, 15, 12), &mut position));
        assert_eq!(event.action, PointerAction::ButtonUp);
        assert_eq!(event.buttons, PointerButtons::empty());
        assert_eq!((event.relative_x, event.relative_y), (0.0, 0.0));
    }

    #[test]
    fn test_motion_uses_live_button_mask() {
        let fixture = Fixture::new();
        let mut position = Point::new(3, 3);
        let motion = MotionNotifyEvent {
            response_type: MOTION_NOTIFY_EVENT,
            detail: Motion::NORMAL,
            sequence: 0,
            time: 99,
            root: 1,
            event: 2,
            child: 0,
            root_x: 100,
            root_y: 100,
            event_x: 100,
            event_y: 100,
            state: KeyButMask::BUTTON1 | KeyButMask::BUTTON2,
            same_screen: true,
        };

        let event = pointer_of(fixture.translate(Event::MotionNotify(motion), &mut position));
        assert_eq!(event.action, PointerAction::Motion);
        assert_eq!(event.buttons, PointerButtons::PRIMARY | PointerButtons::TERTIARY);
        assert_eq!((event.relative_x, event.relative_y, event.vscroll), (0.0, 0.0, 0.0));
        assert_eq!(position, Point::new(3, 3));
    }

    #[test]
    fn test_focus_changes_grab() {
        let fixture = Fixture::new();
        let focus = |response_type| FocusInEvent {
            response_type,
            detail: NotifyDetail::NONLINEAR,
            sequence: 0,
            event: 42,
            mode: NotifyMode::NORMAL,
        };

        assert_eq!(
            fixture.translate(Event::FocusIn(focus(FOCUS_IN_EVENT)), &mut Point::default()),
            Translation::GrabKeyboard { window: 42 }
        );
        assert_eq!(
            fixture.translate(Event::FocusOut(focus(FOCUS_OUT_EVENT)), &mut Point::default()),
            Translation::UngrabKeyboard
        );
    }

    #[test]
    fn test_mapping_notify() {
        let fixture = Fixture::new();
        let mapping = |request| MappingNotifyEvent {
            response_type: MAPPING_NOTIFY_EVENT,
            sequence: 0,
            request,
            first_keycode: 8,
            count: 10,
        };

        assert_eq!(
            fixture.translate(Event::MappingNotify(mapping(Mapping::KEYBOARD)), &mut Point::default()),
            Translation::RefreshKeymap
        );
        assert_eq!(
            fixture.translate(Event::MappingNotify(mapping(Mapping::MODIFIER)), &mut Point::default()),
            Translation::RefreshKeymap
        );
        assert_eq!(
            fixture.translate(Event::MappingNotify(mapping(Mapping::POINTER)), &mut Point::default()),
            Translation::Ignored
        );
    }

    #[test]
    fn test_state_mask_mapping() {
        assert_eq!(pointer_buttons_from_state(0), PointerButtons::empty());
        assert_eq!(pointer_buttons_from_state(u16::from(KeyButMask::BUTTON3)), PointerButtons::SECONDARY);
        assert_eq!(pointer_buttons_from_state(u16::from(KeyButMask::BUTTON5)), PointerButtons::FORWARD);
        assert_eq!(pointer_button(9), PointerButtons::empty());
    }
}
