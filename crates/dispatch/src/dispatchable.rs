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

//! The readiness source abstraction

use std::os::fd::BorrowedFd;

bitflags::bitflags! {
    /// Readiness conditions on a watched descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FdEvents: u32 {
        const READABLE = 1 << 0;
        const WRITABLE = 1 << 1;
        const REMOTE_CLOSED = 1 << 2;
        const ERROR = 1 << 3;
    }
}

/// A unit of work tied to a readiness signal.
///
/// A multiplexer waits on [`Dispatchable::watch_fd`] and calls
/// [`Dispatchable::dispatch`] once the descriptor reports one of
/// [`Dispatchable::relevant_events`]. `dispatch` must handle the work that is
/// ready now and return without blocking.
pub trait Dispatchable: Send + Sync {
    /// Descriptor a readiness multiplexer should watch.
    fn watch_fd(&self) -> BorrowedFd<'_>;

    /// Conditions this source wants to be woken for.
    fn relevant_events(&self) -> FdEvents {
        FdEvents::READABLE
    }

    /// Handle ready work. Returning `false` asks the multiplexer to stop
    /// watching this source.
    fn dispatch(&self, events: FdEvents) -> bool;
}
