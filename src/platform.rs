//! Contracts for the platform collaborators the core drives: desktop
//! notifications, process spawning and global hotkeys. The real desktop
//! integrations live outside this crate; the implementations here are the
//! headless ones the CLI and tests run with.

use std::process::{Command, Stdio};

/// Fire-and-forget desktop notification sink. Failures are swallowed.
pub trait Notifier {
    fn notify(&self, summary: &str, body: &str);
}

/// Fire-and-forget process spawn sink. The spawned process is detached and
/// its result never observed.
pub trait Spawner {
    fn spawn(&self, argv: &[String]);
}

/// Global trigger registrar: binds a key combination to a callback invoked
/// on the event-loop thread.
pub trait HotkeyBinder {
    fn bind(&self, combo: &str, callback: Box<dyn Fn()>);
}

/// Notification sink that routes to the log, for headless operation.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, summary: &str, body: &str) {
        log::info!("notify: {}: {}", summary, body);
    }
}

/// Spawns the argv detached, stdio to /dev/null.
pub struct ProcessSpawner;

impl Spawner for ProcessSpawner {
    fn spawn(&self, argv: &[String]) {
        let Some((program, args)) = argv.split_first() else {
            log::warn!("Ignoring empty spawn request");
            return;
        };

        let result = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match result {
            Ok(child) => log::debug!("Spawned {:?} (pid {})", program, child.id()),
            Err(e) => log::warn!("Failed to spawn {:?}: {}", program, e),
        }
    }
}

/// Hotkey registrar that only records the request in the log. Used when no
/// desktop keybinding service is attached.
pub struct NullHotkeys;

impl HotkeyBinder for NullHotkeys {
    fn bind(&self, combo: &str, _callback: Box<dyn Fn()>) {
        log::debug!("No hotkey service; binding for {:?} not registered", combo);
    }
}
