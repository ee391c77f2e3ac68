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

//! Cross-thread FIFO of deferred operations

use crate::{Dispatchable, DispatchResult, FdEvents};
use kestrel_core::lock_unpoisoned;
use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd, FromRawFd, OwnedFd};
use std::sync::Mutex;
use tracing::error;

/// A deferred zero-argument operation
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// Thread-safe FIFO of actions, consumed by whoever dispatches it.
///
/// Any thread may enqueue. The queue is readable (through an eventfd) while
/// it holds at least one action; `dispatch` runs everything queued so far in
/// submission order.
pub struct ActionQueue {
    event_fd: File,
    actions: Mutex<VecDeque<Action>>,
}

impl ActionQueue {
    /// Create an empty queue
    pub fn new() -> DispatchResult<Self> {
        // SAFETY: eventfd has no memory safety preconditions.
        let raw = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
        if raw < 0 {
            return Err(io::Error::last_os_error().into());
        }
        // SAFETY: `raw` is a freshly created descriptor nobody else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        Ok(ActionQueue {
            event_fd: File::from(fd),
            actions: Mutex::new(VecDeque::new()),
        })
    }

    /// Append an action. Never blocks on the consumer.
    pub fn enqueue<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut actions = lock_unpoisoned(&self.actions);
        let was_empty = actions.is_empty();
        actions.push_back(Box::new(action));
        if was_empty {
            if let Err(e) = (&self.event_fd).write_all(&1u64.to_ne_bytes()) {
                error!("Failed to signal action queue readiness: {}", e);
            }
        }
    }

    /// Number of actions waiting to run
    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.actions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear_readiness(&self) {
        let mut counter = [0u8; 8];
        match (&self.event_fd).read(&mut counter) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => error!("Failed to clear action queue readiness: {}", e),
        }
    }
}

impl Dispatchable for ActionQueue {
    fn watch_fd(&self) -> BorrowedFd<'_> {
        self.event_fd.as_fd()
    }

    fn dispatch(&self, events: FdEvents) -> bool {
        if !events.contains(FdEvents::READABLE) {
            return true;
        }

        let pending = {
            let mut actions = lock_unpoisoned(&self.actions);
            self.clear_readiness();
            std::mem::take(&mut *actions)
        };

        for action in pending {
            action();
        }
        true
    }
}

impl fmt::Debug for ActionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionQueue").field("pending", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn is_readable(queue: &ActionQueue) -> bool {
        let mut pfd = libc::pollfd {
            fd: std::os::fd::AsRawFd::as_raw_fd(&queue.watch_fd()),
            events: libc::POLLIN,
            revents: 0,
        };
        // SAFETY: `pfd` is a valid pollfd for the duration of the call.
        let ready = unsafe { libc::poll(&mut pfd, 1, 0) };
        ready == 1 && (pfd.revents & libc::POLLIN) != 0
    }

    #[test]
    fn test_dispatch_runs_actions_in_order() {
        let queue = ActionQueue::new().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let log = log.clone();
            queue.enqueue(move || log.lock().unwrap().push(i));
        }

        assert_eq!(queue.len(), 5);
        assert!(queue.dispatch(FdEvents::READABLE));
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_readiness_follows_contents() {
        let queue = ActionQueue::new().unwrap();
        assert!(!is_readable(&queue));

        queue.enqueue(|| {});
        queue.enqueue(|| {});
        assert!(is_readable(&queue));

        queue.dispatch(FdEvents::READABLE);
        assert!(!is_readable(&queue));
    }

    #[test]
    fn test_action_enqueued_while_dispatching_runs_next_time() {
        let queue = Arc::new(ActionQueue::new().unwrap());
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner_queue = queue.clone();
        let inner_log = log.clone();
        queue.enqueue(move || {
            inner_log.lock().unwrap().push("outer");
            let log = inner_log.clone();
            inner_queue.enqueue(move || log.lock().unwrap().push("inner"));
        });

        queue.dispatch(FdEvents::READABLE);
        assert_eq!(*log.lock().unwrap(), vec!["outer"]);
        assert!(is_readable(&queue));

        queue.dispatch(FdEvents::READABLE);
        assert_eq!(*log.lock().unwrap(), vec!["outer", "inner"]);
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let queue = Arc::new(ActionQueue::new().unwrap());
        let log = Arc::new(Mutex::new(Vec::new()));

        std::thread::scope(|scope| {
            for producer in 0..4 {
                let queue = queue.clone();
                let log = log.clone();
                scope.spawn(move || {
                    for i in 0..100 {
                        let log = log.clone();
                        queue.enqueue(move || log.lock().unwrap().push((producer, i)));
                    }
                });
            }
        });

        queue.dispatch(FdEvents::READABLE);
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 400);
        for producer in 0..4 {
            let mine: Vec<_> = log.iter().filter(|(p, _)| *p == producer).map(|(_, i)| *i).collect();
            assert_eq!(mine, (0..100).collect::<Vec<_>>());
        }
    }
}
