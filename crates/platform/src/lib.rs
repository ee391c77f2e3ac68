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

//! # Kestrel Platform
//!
//! Input backends (X11 nested server, native evdev), the logical devices
//! they expose, and the registry that connects devices to event sinks.

pub mod device;
pub mod evdev;
pub mod platform;
pub mod registry;
pub mod sink;
pub mod x11;

pub use device::{DeviceState, InputDevice};
pub use platform::Platform;
pub use registry::{DefaultInputDeviceRegistry, InputDeviceRegistry};
pub use sink::{ChannelSink, InputSink};

/// Platform result type
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Platform-specific errors
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] kestrel_dispatch::DispatchError),

    #[error("Failed to connect to X server: {0}")]
    X11Connect(#[from] x11rb::errors::ConnectError),

    #[error("X11 connection error: {0}")]
    X11Connection(#[from] x11rb::errors::ConnectionError),

    #[error("X11 request failed: {0}")]
    X11Reply(#[from] x11rb::errors::ReplyError),

    #[error("X11 resource ids exhausted: {0}")]
    X11IdsExhausted(#[from] x11rb::errors::ReplyOrIdError),

    #[error("No usable input devices found")]
    NoDevices,

    #[error("Unsupported platform: {0}")]
    Unsupported(String),
}
