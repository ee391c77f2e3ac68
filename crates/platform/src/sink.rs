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

//! Delivery targets for canonical events

use kestrel_core::InputEvent;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

/// Receives canonical events on the input thread.
///
/// Implementations must return promptly; they run on the thread that
/// services every input backend.
pub trait InputSink: Send + Sync {
    fn handle_input(&self, event: InputEvent);
}

/// Forwards events into a bounded tokio channel.
///
/// Sending never blocks: when the consumer falls behind or has gone away the
/// event is logged and dropped.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<InputEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<InputEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (ChannelSink { sender }, receiver)
    }
}

impl InputSink for ChannelSink {
    fn handle_input(&self, event: InputEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("Input consumer is behind, dropping event from {}", event.device_id());
            }
            Err(TrySendError::Closed(event)) => {
                warn!("Input consumer is gone, dropping event from {}", event.device_id());
            }
        }
    }
}
