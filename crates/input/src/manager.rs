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

//! Platform input manager
//!
//! All changes to the platform set and to multiplexer watches happen on the
//! dispatch thread. Other threads only enqueue actions; `stop()` additionally
//! waits for its action to have run.

use crate::{fault, ManagerError, ManagerResult};
use kestrel_core::lock_unpoisoned;
use kestrel_dispatch::{ActionQueue, DispatchThread, Dispatchable, FdEvents, MultiplexingDispatchable};
use kestrel_platform::Platform;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Receives the error that ended the dispatch thread
pub type FaultHandler = Arc<dyn Fn(&ManagerError) + Send + Sync>;

const DEFAULT_THREAD_NAME: &str = "InputReader";
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Default)]
struct PlatformSet {
    platforms: Vec<Arc<dyn Platform>>,
    /// Platforms in the set are started and watched
    active: bool,
}

struct Shared {
    multiplexer: Arc<MultiplexingDispatchable>,
    queue: Arc<ActionQueue>,
    platforms: Mutex<PlatformSet>,
    running: AtomicBool,
    fault_handler: Mutex<Option<FaultHandler>>,
}

impl Shared {
    fn queue_dispatchable(&self) -> Arc<dyn Dispatchable> {
        self.queue.clone()
    }

    fn watch_platform(&self, platform: &Arc<dyn Platform>) {
        if let Err(e) = self.multiplexer.add_watch(platform.dispatchable()) {
            error!("Failed to watch input platform {}: {}", platform.name(), e);
        }
    }

    fn start_platform(&self, platform: &Arc<dyn Platform>) {
        platform.start();
        self.watch_platform(platform);
        debug!("Started input platform {}", platform.name());
    }

    /// Runs on the dispatch thread, first thing after `start()`.
    fn bootstrap(&self) {
        debug!(
            "Input dispatch thread {} running",
            thread::current().name().unwrap_or("<unnamed>")
        );

        let (platforms, resumed) = {
            let mut set = lock_unpoisoned(&self.platforms);
            let resumed = std::mem::replace(&mut set.active, true);
            (set.platforms.clone(), resumed)
        };

        for platform in &platforms {
            if resumed {
                // Still started from before the dispatch thread failed
                self.watch_platform(platform);
            } else {
                self.start_platform(platform);
            }
        }
    }

    fn record_platform(&self, platform: Arc<dyn Platform>) {
        let active = {
            let mut set = lock_unpoisoned(&self.platforms);
            if set.platforms.iter().any(|known| same_platform(known, &platform)) {
                debug!("Input platform {} already added", platform.name());
                return;
            }
            set.platforms.push(platform.clone());
            set.active
        };
        if active {
            self.start_platform(&platform);
        }
    }

    fn stop_platforms(&self) {
        let platforms = {
            let mut set = lock_unpoisoned(&self.platforms);
            if !std::mem::replace(&mut set.active, false) {
                return;
            }
            set.platforms.clone()
        };

        for platform in &platforms {
            if let Err(e) = self.multiplexer.remove_watch(&platform.dispatchable()) {
                warn!("Failed to unwatch input platform {}: {}", platform.name(), e);
            }
            platform.stop();
            debug!("Stopped input platform {}", platform.name());
        }
    }

    fn report_fault(&self, error: ManagerError) {
        self.running.store(false, Ordering::Release);
        let handler = lock_unpoisoned(&self.fault_handler).clone();
        match handler {
            Some(handler) => handler(&error),
            None => fault::report_fault(&error),
        }
    }
}

fn same_platform(a: &Arc<dyn Platform>, b: &Arc<dyn Platform>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[derive(Default)]
struct Completion {
    done: Mutex<bool>,
    signal: Condvar,
}

impl Completion {
    fn complete(&self) {
        *lock_unpoisoned(&self.done) = true;
        self.signal.notify_all();
    }

    fn is_complete(&self) -> bool {
        *lock_unpoisoned(&self.done)
    }

    /// Wait until completed or until the dispatch thread is gone
    fn wait(&self, thread: &DispatchThread) -> bool {
        let mut done = lock_unpoisoned(&self.done);
        while !*done && !thread.is_finished() {
            done = match self.signal.wait_timeout(done, STOP_POLL_INTERVAL) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *done
    }
}

/// Runs input platforms on a dedicated dispatch thread.
///
/// Platforms can be added at any time; they are started when the manager
/// is (or once it gets) running. `stop()` returns only after every platform
/// has been unwatched and stopped, so no platform callback runs after it.
///
/// A fault handler runs on the failing dispatch thread and must not call
/// back into the manager.
pub struct PlatformInputManager {
    shared: Arc<Shared>,
    thread_name: String,
    thread: Mutex<Option<DispatchThread>>,
}

impl PlatformInputManager {
    pub fn new(multiplexer: Arc<MultiplexingDispatchable>) -> ManagerResult<Self> {
        Ok(PlatformInputManager {
            shared: Arc::new(Shared {
                multiplexer,
                queue: Arc::new(ActionQueue::new()?),
                platforms: Mutex::new(PlatformSet::default()),
                running: AtomicBool::new(false),
                fault_handler: Mutex::new(None),
            }),
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            thread: Mutex::new(None),
        })
    }

    /// Name given to the dispatch thread
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Handle dispatch thread faults here instead of through
    /// [`fault::report_fault`]
    pub fn with_fault_handler<F>(self, handler: F) -> Self
    where
        F: Fn(&ManagerError) + Send + Sync + 'static,
    {
        *lock_unpoisoned(&self.shared.fault_handler) = Some(Arc::new(handler));
        self
    }

    pub fn multiplexer(&self) -> &Arc<MultiplexingDispatchable> {
        &self.shared.multiplexer
    }

    /// Queue a platform for the dispatch thread to record, and to start if
    /// the manager is running when the action runs.
    pub fn add_platform(&self, platform: Arc<dyn Platform>) {
        debug!("Queueing input platform {}", platform.name());
        let shared = Arc::downgrade(&self.shared);
        self.shared.queue.enqueue(move || {
            if let Some(shared) = shared.upgrade() {
                shared.record_platform(platform);
            }
        });
    }

    pub fn start(&self) -> ManagerResult<()> {
        let mut slot = lock_unpoisoned(&self.thread);
        if self.shared.running.load(Ordering::Acquire) {
            return Ok(());
        }
        // Left behind by a failed dispatch thread
        drop(slot.take());

        self.shared.multiplexer.add_watch(self.shared.queue_dispatchable())?;

        let shared = Arc::downgrade(&self.shared);
        self.shared.queue.enqueue(move || {
            if let Some(shared) = shared.upgrade() {
                shared.bootstrap();
            }
        });

        self.shared.running.store(true, Ordering::Release);
        let faulted: Weak<Shared> = Arc::downgrade(&self.shared);
        let spawned = DispatchThread::spawn(&self.thread_name, self.shared.multiplexer.clone(), move |e| {
            match faulted.upgrade() {
                Some(shared) => shared.report_fault(ManagerError::Dispatch(e)),
                None => fault::report_fault(&e),
            }
        });

        match spawned {
            Ok(thread) => {
                *slot = Some(thread);
                info!("Platform input manager started");
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                if let Err(unwatch) = self.shared.multiplexer.remove_watch(&self.shared.queue_dispatchable()) {
                    warn!("Failed to unwatch input action queue: {}", unwatch);
                }
                Err(ManagerError::Thread(e.to_string()))
            }
        }
    }

    pub fn stop(&self) -> ManagerResult<()> {
        let mut slot = lock_unpoisoned(&self.thread);
        let Some(thread) = slot.take() else {
            return Ok(());
        };
        self.shared.running.store(false, Ordering::Release);

        let completion = Arc::new(Completion::default());
        let signal = completion.clone();
        let shared = Arc::downgrade(&self.shared);
        self.shared.queue.enqueue(move || {
            if let Some(shared) = shared.upgrade() {
                shared.stop_platforms();
            }
            signal.complete();
        });

        let on_dispatch_thread = thread.thread_id() == Some(thread::current().id());
        if on_dispatch_thread || !completion.wait(&thread) {
            // Nobody else will drain the queue: the dispatch thread is gone,
            // or it is this thread
            let drained = panic::catch_unwind(AssertUnwindSafe(|| {
                self.shared.queue.dispatch(FdEvents::READABLE);
            }));
            if drained.is_err() {
                error!("Queued input action panicked while stopping");
            }
        }
        if !completion.is_complete() {
            // The stop action was lost with a batch that panicked on the
            // dispatch thread, which no longer runs
            warn!("Stop action did not run, stopping input platforms here");
            self.shared.stop_platforms();
        }

        drop(thread);
        self.shared.multiplexer.remove_watch(&self.shared.queue_dispatchable())?;
        info!("Platform input manager stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Platforms recorded so far by the dispatch thread
    pub fn platform_count(&self) -> usize {
        lock_unpoisoned(&self.shared.platforms).platforms.len()
    }
}

impl Drop for PlatformInputManager {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Failed to stop platform input manager: {}", e);
        }
    }
}
