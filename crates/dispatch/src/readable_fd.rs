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

//! Binds a backend event-source descriptor to a readiness callback

use crate::{Dispatchable, FdEvents};
use std::fmt;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};

type ReadableCallback = Box<dyn Fn() -> bool + Send + Sync>;

/// Owns a descriptor and runs a callback every time it becomes readable.
///
/// The callback returns whether the descriptor should stay watched; a backend
/// whose connection went away returns `false`. The descriptor is closed when
/// the `ReadableFd` is dropped.
pub struct ReadableFd {
    fd: OwnedFd,
    on_readable: ReadableCallback,
}

impl ReadableFd {
    pub fn new<F>(fd: OwnedFd, on_readable: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        ReadableFd {
            fd,
            on_readable: Box::new(on_readable),
        }
    }
}

impl Dispatchable for ReadableFd {
    fn watch_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }

    fn dispatch(&self, events: FdEvents) -> bool {
        if events.contains(FdEvents::ERROR) {
            return false;
        }
        if events.contains(FdEvents::READABLE) {
            return (self.on_readable)();
        }
        !events.contains(FdEvents::REMOTE_CLOSED)
    }
}

impl fmt::Debug for ReadableFd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadableFd").field("fd", &self.fd.as_raw_fd()).finish()
    }
}
