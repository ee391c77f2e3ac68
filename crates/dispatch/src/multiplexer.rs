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

//! Waits on many dispatchables at once

use crate::{DispatchError, DispatchResult, Dispatchable, FdEvents};
use kestrel_core::lock_unpoisoned;
use polling::{Event, Events, PollMode, Poller};
use std::collections::HashMap;
use std::fmt;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, trace};

#[derive(Default)]
struct Watches {
    next_key: usize,
    by_key: HashMap<usize, Arc<dyn Dispatchable>>,
}

impl Watches {
    fn key_of(&self, dispatchable: &Arc<dyn Dispatchable>) -> Option<usize> {
        self.by_key
            .iter()
            .find(|(_, watched)| same_dispatchable(watched, dispatchable))
            .map(|(key, _)| *key)
    }
}

fn same_dispatchable(a: &Arc<dyn Dispatchable>, b: &Arc<dyn Dispatchable>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

fn interest(key: usize, events: FdEvents) -> Event {
    Event::new(
        key,
        events.contains(FdEvents::READABLE),
        events.contains(FdEvents::WRITABLE),
    )
}

/// Aggregates a dynamic set of dispatchables behind one poll descriptor.
///
/// Watches may be added or removed at any time, including from inside a
/// dispatch callback running on this multiplexer. The multiplexer holds a
/// strong reference to every watched source, so a source cannot be destroyed
/// while it is still registered with the poller.
pub struct MultiplexingDispatchable {
    poller: Poller,
    watches: Mutex<Watches>,
}

impl MultiplexingDispatchable {
    pub fn new() -> DispatchResult<Self> {
        Ok(MultiplexingDispatchable {
            poller: Poller::new()?,
            watches: Mutex::new(Watches::default()),
        })
    }

    /// Start watching a source. Adding an already-watched source is a no-op.
    pub fn add_watch(&self, dispatchable: Arc<dyn Dispatchable>) -> DispatchResult<()> {
        let mut watches = lock_unpoisoned(&self.watches);
        if watches.key_of(&dispatchable).is_some() {
            trace!("Dispatchable already watched");
            return Ok(());
        }

        let key = watches.next_key;
        let raw_fd = dispatchable.watch_fd().as_raw_fd();
        // SAFETY: the descriptor belongs to `dispatchable`, which is kept alive in
        // `watches` until it has been deleted from the poller in `remove_watch`.
        unsafe {
            self.poller
                .add_with_mode(raw_fd, interest(key, dispatchable.relevant_events()), PollMode::Level)?;
        }
        watches.next_key += 1;
        watches.by_key.insert(key, dispatchable);
        debug!("Watching fd {} (key {}), {} sources watched", raw_fd, key, watches.by_key.len());
        Ok(())
    }

    /// Stop watching a source. Removing an unknown source is a no-op.
    pub fn remove_watch(&self, dispatchable: &Arc<dyn Dispatchable>) -> DispatchResult<()> {
        let mut watches = lock_unpoisoned(&self.watches);
        let Some(key) = watches.key_of(dispatchable) else {
            return Ok(());
        };

        if let Some(removed) = watches.by_key.remove(&key) {
            self.poller.delete(removed.watch_fd())?;
            debug!("Stopped watching key {}, {} sources watched", key, watches.by_key.len());
        }
        Ok(())
    }

    /// Number of currently watched sources
    pub fn watch_count(&self) -> usize {
        lock_unpoisoned(&self.watches).by_key.len()
    }

    /// Interrupt a blocked [`dispatch_pending`](Self::dispatch_pending) call
    pub fn wake(&self) -> DispatchResult<()> {
        self.poller.notify()?;
        Ok(())
    }

    /// Wait up to `timeout` (forever with `None`) for any source to become
    /// ready, then dispatch every ready source before returning.
    pub fn dispatch_pending(&self, timeout: Option<Duration>) -> DispatchResult<()> {
        let mut events = Events::new();
        self.poller.wait(&mut events, timeout).map_err(DispatchError::Wait)?;

        for event in events.iter() {
            let watched = lock_unpoisoned(&self.watches).by_key.get(&event.key).cloned();
            // Removed by an earlier callback in this batch.
            let Some(dispatchable) = watched else {
                continue;
            };

            let mut ready = FdEvents::empty();
            if event.readable {
                ready |= FdEvents::READABLE;
            }
            if event.writable {
                ready |= FdEvents::WRITABLE;
            }

            if !dispatchable.dispatch(ready) {
                debug!("Dispatchable for key {} asked to be unwatched", event.key);
                self.remove_watch(&dispatchable)?;
            }
        }
        Ok(())
    }
}

impl Dispatchable for MultiplexingDispatchable {
    fn watch_fd(&self) -> BorrowedFd<'_> {
        self.poller.as_fd()
    }

    fn dispatch(&self, _events: FdEvents) -> bool {
        match self.dispatch_pending(Some(Duration::ZERO)) {
            Ok(()) => true,
            Err(e) => {
                error!("Nested multiplexer failed: {}", e);
                false
            }
        }
    }
}

impl fmt::Debug for MultiplexingDispatchable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiplexingDispatchable")
            .field("watches", &self.watch_count())
            .finish()
    }
}
