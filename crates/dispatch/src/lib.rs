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

//! # Kestrel Dispatch
//!
//! Readiness based work sources and the machinery that waits on them: a
//! readable descriptor wrapper, a cross-thread action queue, a multiplexer
//! that composes any number of sources, and a dedicated dispatch thread.

pub mod action_queue;
pub mod dispatchable;
pub mod multiplexer;
pub mod readable_fd;
pub mod thread;

pub use action_queue::{Action, ActionQueue};
pub use dispatchable::{Dispatchable, FdEvents};
pub use multiplexer::MultiplexingDispatchable;
pub use readable_fd::ReadableFd;
pub use thread::DispatchThread;

/// Dispatch result type
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Dispatch errors
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Readiness wait failed: {0}")]
    Wait(std::io::Error),

    #[error("Dispatch callback panicked: {0}")]
    Panicked(String),
}
