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

//! Input configuration file

use crate::{ManagerError, ManagerResult};
use kestrel_platform::evdev::{EvdevOptions, EvdevPlatform};
use kestrel_platform::x11::{self, InputWindowOptions, XInputOptions, XInputPlatform};
use kestrel_platform::{InputDeviceRegistry, Platform};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Input configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfigFile {
    pub log_level: String,
    pub dispatch: DispatchConfigData,
    pub x11: X11ConfigData,
    pub evdev: EvdevConfigData,
}

/// Dispatch thread configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfigData {
    pub thread_name: String,
}

/// X11 backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct X11ConfigData {
    pub enabled: bool,
    /// Display name; `None` uses `$DISPLAY`
    pub display: Option<String>,
    pub grab_keyboard: bool,
    pub create_window: bool,
    pub window_width: u16,
    pub window_height: u16,
    pub window_title: String,
}

/// evdev backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvdevConfigData {
    pub enabled: bool,
    pub devices: Vec<PathBuf>,
    pub grab: bool,
}

impl Default for InputConfigFile {
    fn default() -> Self {
        InputConfigFile {
            log_level: "info".to_string(),
            dispatch: DispatchConfigData::default(),
            x11: X11ConfigData::default(),
            evdev: EvdevConfigData::default(),
        }
    }
}

impl Default for DispatchConfigData {
    fn default() -> Self {
        DispatchConfigData {
            thread_name: "InputReader".to_string(),
        }
    }
}

impl Default for X11ConfigData {
    fn default() -> Self {
        let window = InputWindowOptions::default();
        X11ConfigData {
            enabled: true,
            display: None,
            grab_keyboard: XInputOptions::default().grab_keyboard,
            create_window: true,
            window_width: window.width,
            window_height: window.height,
            window_title: window.title,
        }
    }
}

impl Default for EvdevConfigData {
    fn default() -> Self {
        EvdevConfigData {
            enabled: false,
            devices: Vec::new(),
            grab: false,
        }
    }
}

impl InputConfigFile {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> ManagerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: InputConfigFile = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ManagerResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> ManagerResult<()> {
        if self.dispatch.thread_name.is_empty() || self.dispatch.thread_name.contains('\0') {
            return Err(ManagerError::Config("Invalid dispatch thread name".to_string()));
        }
        if self.x11.create_window && (self.x11.window_width == 0 || self.x11.window_height == 0) {
            return Err(ManagerError::Config("Input window size must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn x11_options(&self) -> XInputOptions {
        XInputOptions {
            grab_keyboard: self.x11.grab_keyboard,
        }
    }

    pub fn window_options(&self) -> InputWindowOptions {
        InputWindowOptions {
            width: self.x11.window_width,
            height: self.x11.window_height,
            title: self.x11.window_title.clone(),
        }
    }

    pub fn evdev_options(&self) -> EvdevOptions {
        EvdevOptions {
            devices: self.evdev.devices.clone(),
            grab: self.evdev.grab,
        }
    }

    /// Open every enabled backend
    pub fn build_platforms(&self, registry: Arc<dyn InputDeviceRegistry>) -> ManagerResult<Vec<Arc<dyn Platform>>> {
        let mut platforms: Vec<Arc<dyn Platform>> = Vec::new();

        if self.x11.enabled {
            let (connection, screen_num) = x11::connect(self.x11.display.as_deref())?;
            if self.x11.create_window {
                x11::create_input_window(&*connection, screen_num, &self.window_options())?;
            }
            platforms.push(Arc::new(XInputPlatform::new(registry.clone(), connection, self.x11_options())?));
        }

        if self.evdev.enabled {
            platforms.push(Arc::new(EvdevPlatform::new(registry, self.evdev_options())?));
        }

        if platforms.is_empty() {
            return Err(ManagerError::Config("No input backend enabled".to_string()));
        }
        info!("Configured {} input platform(s)", platforms.len());
        Ok(platforms)
    }
}
