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

//! The backend platform abstraction

use crate::PlatformResult;
use kestrel_dispatch::Dispatchable;
use std::os::fd::{AsFd, OwnedFd};
use std::sync::Arc;

/// An input backend.
///
/// A platform owns its devices and one readiness source. `start` registers
/// the devices with the registry the platform was built with; `stop` removes
/// them again and must be safe to call more than once. Events read through
/// the dispatchable are only delivered once `start` has run.
pub trait Platform: Send + Sync {
    /// Readiness source the input thread should watch for this backend
    fn dispatchable(&self) -> Arc<dyn Dispatchable>;

    fn start(&self);

    fn stop(&self);

    /// Short name used in log output
    fn name(&self) -> &str {
        "input platform"
    }
}

/// Duplicate a backend's event descriptor for its readiness source.
///
/// The copy stays open after `source` is dropped.
pub(crate) fn duplicate_event_fd(source: &impl AsFd) -> PlatformResult<OwnedFd> {
    Ok(source.as_fd().try_clone_to_owned()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_duplicate_outlives_source() {
        let (reader, mut writer) = UnixStream::pair().unwrap();
        let fd = duplicate_event_fd(&reader).unwrap();
        drop(reader);

        writer.write_all(b"ev").unwrap();
        let mut duplicate = UnixStream::from(fd);
        let mut buf = [0u8; 2];
        duplicate.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ev");
    }
}
