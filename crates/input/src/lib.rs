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

//! # Kestrel Input
//!
//! Owns the input dispatch thread and the set of input platforms feeding it.

pub mod config;
pub mod fault;
pub mod logging;
pub mod manager;

pub use config::InputConfigFile;
pub use manager::{FaultHandler, PlatformInputManager};

use kestrel_dispatch::DispatchError;
use kestrel_platform::PlatformError;

/// Manager result type
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Input manager errors
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dispatch thread error: {0}")]
    Thread(String),
}
