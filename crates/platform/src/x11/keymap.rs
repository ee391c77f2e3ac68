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

//! Cached X server keyboard mapping

use super::LOG_TARGET;
use crate::PlatformResult;
use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt as _, KeyButMask, Keycode, Keysym};

pub const NO_SYMBOL: Keysym = 0;

/// Keycode to keysym table as reported by `GetKeyboardMapping`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keymap {
    min_keycode: Keycode,
    keysyms_per_keycode: u8,
    keysyms: Vec<Keysym>,
}

impl Keymap {
    pub fn new(min_keycode: Keycode, keysyms_per_keycode: u8, keysyms: Vec<Keysym>) -> Self {
        Keymap {
            min_keycode,
            keysyms_per_keycode,
            keysyms,
        }
    }

    /// Fetch the full mapping from the server. Blocks for one round trip.
    pub fn fetch<C: Connection>(conn: &C) -> PlatformResult<Self> {
        let setup = conn.setup();
        let (min, max) = (setup.min_keycode, setup.max_keycode);
        let count = max.saturating_sub(min).saturating_add(1);
        let reply = conn.get_keyboard_mapping(min, count)?.reply()?;
        Ok(Keymap::new(min, reply.keysyms_per_keycode, reply.keysyms))
    }

    /// Resolve a keycode under the given modifier state.
    ///
    /// Shift selects the second column; Lock alone upper-cases Latin-1
    /// letters from the first column.
    pub fn lookup(&self, keycode: Keycode, state: u16) -> Keysym {
        let per = usize::from(self.keysyms_per_keycode);
        if per == 0 || keycode < self.min_keycode {
            return NO_SYMBOL;
        }
        let base = usize::from(keycode - self.min_keycode) * per;
        let Some(syms) = self.keysyms.get(base..base + per) else {
            return NO_SYMBOL;
        };

        let lower = syms[0];
        let upper = syms.get(1).copied().unwrap_or(NO_SYMBOL);
        let shift = state & u16::from(KeyButMask::SHIFT) != 0;
        let lock = state & u16::from(KeyButMask::LOCK) != 0;

        if shift {
            if upper != NO_SYMBOL {
                upper
            } else {
                to_upper_latin1(lower)
            }
        } else if lock {
            to_upper_latin1(lower)
        } else {
            lower
        }
    }
}

/// Keymap that is re-fetched lazily after the server reports a change.
///
/// `invalidate` only marks the map stale; the round trip happens on the next
/// key event. A burst of `MappingNotify` events therefore costs at most one
/// blocking fetch on the input thread.
#[derive(Debug, Default)]
pub struct KeymapCache {
    keymap: Keymap,
    stale: bool,
}

impl KeymapCache {
    pub fn new(keymap: Keymap) -> Self {
        KeymapCache { keymap, stale: false }
    }

    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Replace the map with `fetch` if it was invalidated. A failed fetch
    /// keeps the previous map until the next invalidation.
    pub fn refresh_if_stale<F>(&mut self, fetch: F)
    where
        F: FnOnce() -> PlatformResult<Keymap>,
    {
        if !self.stale {
            return;
        }
        self.stale = false;
        match fetch() {
            Ok(keymap) => {
                debug!(target: LOG_TARGET, "Keyboard mapping refreshed");
                self.keymap = keymap;
            }
            Err(e) => warn!(target: LOG_TARGET, "Failed to refresh keyboard mapping: {}", e),
        }
    }

    pub fn keymap(&self) -> &Keymap {
        &self.keymap
    }
}

fn to_upper_latin1(sym: Keysym) -> Keysym {
    match sym {
        0x61..=0x7a => sym - 0x20,
        0xe0..=0xfe if sym != 0xf7 => sym - 0x20,
        _ => sym,
    }
}
