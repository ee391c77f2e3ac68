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

//! Standalone input window for running against a nested X server

use super::LOG_TARGET;
use crate::{PlatformError, PlatformResult};
use tracing::info;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    AtomEnum, ConnectionExt as _, CreateWindowAux, EventMask, PropMode, Window, WindowClass,
};
use x11rb::wrapper::ConnectionExt as _;
use x11rb::{COPY_DEPTH_FROM_PARENT, COPY_FROM_PARENT};

/// Geometry and title of the input window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputWindowOptions {
    pub width: u16,
    pub height: u16,
    pub title: String,
}

impl Default for InputWindowOptions {
    fn default() -> Self {
        InputWindowOptions {
            width: 640,
            height: 480,
            title: "kestrel input".to_string(),
        }
    }
}

/// Event mask selecting everything the X11 translator understands
pub fn input_event_mask() -> EventMask {
    EventMask::KEY_PRESS
        | EventMask::KEY_RELEASE
        | EventMask::BUTTON_PRESS
        | EventMask::BUTTON_RELEASE
        | EventMask::POINTER_MOTION
        | EventMask::FOCUS_CHANGE
        | EventMask::STRUCTURE_NOTIFY
}

/// Create and map a top-level window that receives input events
pub fn create_input_window<C: Connection>(
    conn: &C,
    screen_num: usize,
    options: &InputWindowOptions,
) -> PlatformResult<Window> {
    let screen = conn
        .setup()
        .roots
        .get(screen_num)
        .ok_or_else(|| PlatformError::Unsupported(format!("X screen {} does not exist", screen_num)))?;
    let window = conn.generate_id()?;

    let aux = CreateWindowAux::new()
        .background_pixel(screen.black_pixel)
        .event_mask(input_event_mask());
    conn.create_window(
        COPY_DEPTH_FROM_PARENT,
        window,
        screen.root,
        0,
        0,
        options.width,
        options.height,
        0,
        WindowClass::INPUT_OUTPUT,
        COPY_FROM_PARENT,
        &aux,
    )?;
    conn.change_property8(
        PropMode::REPLACE,
        window,
        AtomEnum::WM_NAME,
        AtomEnum::STRING,
        options.title.as_bytes(),
    )?;
    conn.map_window(window)?;
    conn.flush()?;

    info!(target: LOG_TARGET, "Created input window {:#x} ({}x{})", window, options.width, options.height);
    Ok(window)
}
