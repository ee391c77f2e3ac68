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

//! # Kestrel Input Daemon
//!
//! Runs the configured input backends on the input dispatch thread and logs
//! every canonical event it receives.

use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use kestrel_core::*;
use kestrel_dispatch::MultiplexingDispatchable;
use kestrel_input::{logging, InputConfigFile, PlatformInputManager};
use kestrel_platform::{ChannelSink, DefaultInputDeviceRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, info};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

fn command() -> Command {
    Command::new("kestrel-inputd")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Kestrel Input Team")
        .about("Reads X11 and evdev input and logs the canonical events")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .help("JSON configuration file"),
        )
        .arg(
            Arg::new("display")
                .short('d')
                .long("display")
                .value_name("DISPLAY")
                .help("X display to read input from (default: $DISPLAY)"),
        )
        .arg(
            Arg::new("no-x11")
                .long("no-x11")
                .help("Disable the X11 backend")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("evdev")
                .long("evdev")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .num_args(1..)
                .action(ArgAction::Append)
                .help("Read these evdev nodes (enables the evdev backend)"),
        )
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<InputConfigFile> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => InputConfigFile::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => InputConfigFile::default(),
    };

    if let Some(display) = matches.get_one::<String>("display") {
        config.x11.display = Some(display.clone());
    }
    if matches.get_flag("no-x11") {
        config.x11.enabled = false;
    }
    if let Some(paths) = matches.get_many::<PathBuf>("evdev") {
        config.evdev.enabled = true;
        config.evdev.devices = paths.cloned().collect();
    }
    config.validate()?;
    Ok(config)
}

fn describe(event: &InputEvent) -> String {
    match event {
        InputEvent::Key(key) => format!(
            "key {:?} keysym={:#x} scan={} at {}",
            key.action,
            key.key_code,
            key.scan_code,
            format_event_time(key.event_time)
        ),
        InputEvent::Pointer(pointer) => format!(
            "pointer {:?} buttons={:?} scroll=({}, {}) delta=({}, {}) at {}",
            pointer.action,
            pointer.buttons,
            pointer.hscroll,
            pointer.vscroll,
            pointer.relative_x,
            pointer.relative_y,
            format_event_time(pointer.event_time)
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = command().get_matches();
    let config = load_config(&matches)?;
    logging::init(&config.log_level)?;

    let (sink, mut events) = ChannelSink::new(EVENT_CHANNEL_CAPACITY);
    let registry = Arc::new(DefaultInputDeviceRegistry::new(Arc::new(sink)));
    let platforms = config.build_platforms(registry.clone()).context("opening input backends")?;

    let manager = PlatformInputManager::new(Arc::new(MultiplexingDispatchable::new()?))?
        .with_thread_name(config.dispatch.thread_name.clone());
    for platform in platforms {
        manager.add_platform(platform);
    }
    manager.start()?;
    info!("Kestrel input daemon running, press Ctrl-C to exit");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => info!("{}: {}", event.device_id(), describe(&event)),
                None => break,
            },
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    manager.stop()?;
    debug!("Devices still registered after stop: {:?}", registry.devices());
    info!("Kestrel input daemon stopped");
    Ok(())
}
