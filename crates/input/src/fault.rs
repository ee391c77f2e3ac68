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

//! Process-wide handling of faults the input thread cannot recover from

use std::error::Error;
use std::sync::{Arc, RwLock};
use tracing::error;

/// Receives a fault that ended input dispatch
pub type FaultHook = Arc<dyn Fn(&(dyn Error + 'static)) + Send + Sync>;

static FAULT_HOOK: RwLock<Option<FaultHook>> = RwLock::new(None);

/// Install the process-wide fault hook, replacing any previous one
pub fn set_fault_hook<F>(hook: F)
where
    F: Fn(&(dyn Error + 'static)) + Send + Sync + 'static,
{
    *FAULT_HOOK.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(hook));
}

/// Remove the installed hook, restoring the default abort behaviour
pub fn clear_fault_hook() -> Option<FaultHook> {
    FAULT_HOOK.write().unwrap_or_else(|e| e.into_inner()).take()
}

/// Hand a fault to the installed hook. Without one the fault is logged and
/// the process aborts.
pub fn report_fault(fault: &(dyn Error + 'static)) {
    let hook = FAULT_HOOK.read().unwrap_or_else(|e| e.into_inner()).clone();
    match hook {
        Some(hook) => hook(fault),
        None => {
            error!("Unhandled fault in input dispatch: {}", fault);
            std::process::abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    #[test]
    fn test_installed_hook_receives_fault() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        set_fault_hook(move |fault| recorder.lock().unwrap().push(fault.to_string()));

        report_fault(&io::Error::new(io::ErrorKind::Other, "epoll went away"));

        assert!(clear_fault_hook().is_some());
        assert_eq!(*seen.lock().unwrap(), vec!["epoll went away".to_string()]);
    }
}
