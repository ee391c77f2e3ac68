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

//! A dedicated thread running a multiplexer's wait/dispatch loop

use crate::{DispatchError, DispatchResult, MultiplexingDispatchable};
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error, warn};

/// Runs [`MultiplexingDispatchable::dispatch_pending`] in a loop on its own
/// thread until dropped.
///
/// If the loop cannot continue (the readiness wait fails, or a dispatch
/// callback panics) the thread exits and `on_failure` is called with the
/// cause. Dropping the handle stops and joins the thread.
pub struct DispatchThread {
    shutdown: Arc<AtomicBool>,
    multiplexer: Arc<MultiplexingDispatchable>,
    handle: Option<JoinHandle<()>>,
}

impl DispatchThread {
    pub fn spawn<F>(name: &str, multiplexer: Arc<MultiplexingDispatchable>, on_failure: F) -> DispatchResult<Self>
    where
        F: FnOnce(DispatchError) + Send + 'static,
    {
        let waiter = multiplexer.clone();
        Self::spawn_with(name, multiplexer, move || waiter.dispatch_pending(None), on_failure)
    }

    /// Spawn a loop that calls `wait_and_dispatch` until shutdown. `multiplexer`
    /// is only woken on drop.
    fn spawn_with<W, F>(
        name: &str,
        multiplexer: Arc<MultiplexingDispatchable>,
        mut wait_and_dispatch: W,
        on_failure: F,
    ) -> DispatchResult<Self>
    where
        W: FnMut() -> DispatchResult<()> + Send + 'static,
        F: FnOnce(DispatchError) + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();

        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                run_loop(&mut wait_and_dispatch, &thread_shutdown)
            }));

            match outcome {
                Ok(Ok(())) => debug!("Dispatch loop finished"),
                Ok(Err(e)) => {
                    error!("Dispatch loop terminated: {}", e);
                    on_failure(e);
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!("Dispatch callback panicked: {}", message);
                    on_failure(DispatchError::Panicked(message));
                }
            }
        })?;

        Ok(DispatchThread {
            shutdown,
            multiplexer,
            handle: Some(handle),
        })
    }

    /// Id of the dispatch thread
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.handle.as_ref().map(|handle| handle.thread().id())
    }

    /// Whether the loop has already exited
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |handle| handle.is_finished())
    }
}

fn run_loop<W>(wait_and_dispatch: &mut W, shutdown: &AtomicBool) -> DispatchResult<()>
where
    W: FnMut() -> DispatchResult<()>,
{
    while !shutdown.load(Ordering::Acquire) {
        match wait_and_dispatch() {
            Ok(()) => {}
            Err(DispatchError::Wait(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl Drop for DispatchThread {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Err(e) = self.multiplexer.wake() {
            warn!("Failed to wake dispatch thread: {}", e);
        }

        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            debug!("Dispatch thread dropped from itself, detaching");
            return;
        }
        if handle.join().is_err() {
            error!("Dispatch thread panicked while shutting down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ActionQueue;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_runs_queued_actions_on_named_thread() {
        let mux = Arc::new(MultiplexingDispatchable::new().unwrap());
        let queue = Arc::new(ActionQueue::new().unwrap());
        mux.add_watch(queue.clone()).unwrap();

        let thread = DispatchThread::spawn("TestReader", mux.clone(), |_| panic!("unexpected failure")).unwrap();
        let (tx, rx) = mpsc::channel();
        queue.enqueue(move || {
            tx.send(thread::current().name().map(str::to_string)).unwrap();
        });

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("TestReader"));
        assert!(!thread.is_finished());
        drop(thread);
    }

    #[test]
    fn test_drop_joins_idle_thread() {
        let mux = Arc::new(MultiplexingDispatchable::new().unwrap());
        let thread = DispatchThread::spawn("Idle", mux, |_| {}).unwrap();
        let id = thread.thread_id();
        assert!(id.is_some());
        drop(thread);
    }

    #[test]
    fn test_panicking_callback_reports_failure() {
        let mux = Arc::new(MultiplexingDispatchable::new().unwrap());
        let queue = Arc::new(ActionQueue::new().unwrap());
        mux.add_watch(queue.clone()).unwrap();

        let (tx, rx) = mpsc::channel();
        let thread = DispatchThread::spawn("Panicky", mux, move |e| {
            tx.send(e.to_string()).unwrap();
        })
        .unwrap();

        queue.enqueue(|| panic!("boom"));
        let reason = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(reason.contains("boom"));

        // The loop is gone; dropping must not hang.
        drop(thread);
    }

    #[test]
    fn test_wait_failure_reports_failure_once() {
        let mux = Arc::new(MultiplexingDispatchable::new().unwrap());
        let mut calls = 0;
        let wait = move || {
            calls += 1;
            match calls {
                1 => Err(DispatchError::Wait(io::Error::from(io::ErrorKind::Interrupted))),
                2 => Ok(()),
                _ => Err(DispatchError::Wait(io::Error::from_raw_os_error(libc::EBADF))),
            }
        };

        let (tx, rx) = mpsc::channel();
        let thread = DispatchThread::spawn_with("Failing", mux, wait, move |e| {
            tx.send(e).unwrap();
        })
        .unwrap();

        let failure = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        match failure {
            DispatchError::Wait(e) => assert_eq!(e.raw_os_error(), Some(libc::EBADF)),
            other => panic!("unexpected failure {:?}", other),
        }
        drop(thread);
        assert!(rx.try_recv().is_err());
    }
}
