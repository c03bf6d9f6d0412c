//! Log plumbing shared by the daemon binary and the server loop.
//!
//! [`ForwardLayer`] observes the launcher's own tracing events and queues them
//! for remote subscribers. Server output is forwarded by the output pump
//! instead, so events under [`SERVER_TARGET`] are skipped here.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use pilot_types::{LogEntry, LogLevel};
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber, warn};
use tracing_subscriber::layer::{Context, Layer};

/// Target under which server records are re-emitted.
pub const SERVER_TARGET: &str = "pilot::server";

const LAUNCHER_TARGET_PREFIX: &str = "pilot";

thread_local! {
    /// Set while this thread broadcasts; forwarding is synchronous, so the
    /// flag never outlives the call that set it.
    static PAUSED: Cell<bool> = const { Cell::new(false) };
}

/// Switches for the forwarding layer
#[derive(Debug, Clone, Default)]
pub struct ForwardHandle {
    enabled: Arc<AtomicBool>,
}

impl ForwardHandle {
    /// Events are only queued while enabled, i.e. while someone subscribes.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Stop observing events from the current thread until the guard is
    /// dropped. Other threads keep forwarding.
    #[must_use]
    pub fn pause(&self) -> PauseGuard {
        PauseGuard {
            was_paused: PAUSED.replace(true),
            _thread_bound: PhantomData,
        }
    }

    /// Whether the current thread is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        PAUSED.get()
    }

    fn accepts(&self) -> bool {
        self.is_enabled() && !self.is_paused()
    }
}

/// Resumes the forwarding layer on this thread when dropped.
#[derive(Debug)]
pub struct PauseGuard {
    was_paused: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        PAUSED.set(self.was_paused);
    }
}

/// `tracing` layer queueing launcher events as [`LogEntry`] values
pub struct ForwardLayer {
    handle: ForwardHandle,
    tx: mpsc::UnboundedSender<LogEntry>,
}

impl<S: Subscriber> Layer<S> for ForwardLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !self.handle.accepts() {
            return;
        }
        let metadata = event.metadata();
        if !is_launcher_target(metadata.target()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let _ = self.tx.send(LogEntry::launcher(
            level_from_tracing(*metadata.level()),
            visitor.message,
        ));
    }
}

fn is_launcher_target(target: &str) -> bool {
    target.starts_with(LAUNCHER_TARGET_PREFIX) && target != SERVER_TARGET
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}

type FilterReload = Box<dyn Fn(LogLevel) -> Result<(), String> + Send + Sync>;

/// What the server loop needs from the logging setup.
pub struct LogControl {
    forward: ForwardHandle,
    entries: Option<mpsc::UnboundedReceiver<LogEntry>>,
    reload: Option<FilterReload>,
}

impl LogControl {
    /// A control with no layer installed; nothing is ever forwarded.
    #[must_use]
    pub fn detached() -> Self {
        let (_layer, control) = forward_layer();
        control
    }

    /// Install the callback that swaps the active `EnvFilter`.
    #[must_use]
    pub fn with_filter_reload<F>(mut self, reload: F) -> Self
    where
        F: Fn(LogLevel) -> Result<(), String> + Send + Sync + 'static,
    {
        self.reload = Some(Box::new(reload));
        self
    }

    #[must_use]
    pub fn forward(&self) -> &ForwardHandle {
        &self.forward
    }

    /// Receiver of queued launcher events; can be taken once.
    pub fn take_entries(&mut self) -> Option<mpsc::UnboundedReceiver<LogEntry>> {
        self.entries.take()
    }

    /// Apply a new launcher log level to the active filter.
    pub fn apply_level(&self, level: LogLevel) -> bool {
        let Some(reload) = &self.reload else {
            return true;
        };
        match reload(level) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to change log level to {level}: {e}");
                false
            }
        }
    }
}

/// Build the forwarding layer and its control.
#[must_use]
pub fn forward_layer() -> (ForwardLayer, LogControl) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = ForwardHandle::default();
    (
        ForwardLayer {
            handle: handle.clone(),
            tx,
        },
        LogControl {
            forward: handle,
            entries: Some(rx),
            reload: None,
        },
    )
}

/// `EnvFilter` directive for a launcher log level.
#[must_use]
pub fn filter_directive(level: LogLevel) -> String {
    let name = match level {
        LogLevel::Error => "error",
        LogLevel::Warning => "warn",
        LogLevel::Undefined | LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };
    format!("{LAUNCHER_TARGET_PREFIX}={name}")
}

#[must_use]
pub fn level_from_tracing(level: Level) -> LogLevel {
    match level {
        Level::ERROR => LogLevel::Error,
        Level::WARN => LogLevel::Warning,
        Level::INFO => LogLevel::Info,
        Level::DEBUG => LogLevel::Debug,
        Level::TRACE => LogLevel::Trace,
    }
}

/// Re-emit a server record through the launcher's logger.
pub fn emit_server_record(level: LogLevel, message: &str) {
    match level {
        LogLevel::Error => tracing::error!(target: "pilot::server", origin = "SERVER", "{message}"),
        LogLevel::Warning => tracing::warn!(target: "pilot::server", origin = "SERVER", "{message}"),
        LogLevel::Undefined | LogLevel::Info => {
            tracing::info!(target: "pilot::server", origin = "SERVER", "{message}");
        }
        LogLevel::Debug => tracing::debug!(target: "pilot::server", origin = "SERVER", "{message}"),
        LogLevel::Trace => tracing::trace!(target: "pilot::server", origin = "SERVER", "{message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_types::LogOrigin;
    use tracing_subscriber::prelude::*;

    fn with_layer<F: FnOnce(&ForwardHandle)>(f: F) -> Vec<LogEntry> {
        let (layer, mut control) = forward_layer();
        let mut rx = control.take_entries().unwrap();
        let handle = control.forward().clone();
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || f(&handle));

        let mut entries = Vec::new();
        while let Ok(entry) = rx.try_recv() {
            entries.push(entry);
        }
        entries
    }

    #[test]
    fn test_disabled_layer_queues_nothing() {
        let entries = with_layer(|_| tracing::info!("Client connected."));
        assert!(entries.is_empty());
    }

    #[test]
    fn test_enabled_layer_forwards_launcher_events() {
        let entries = with_layer(|handle| {
            handle.set_enabled(true);
            tracing::warn!("Server did not shut down cleanly");
        });
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Warning);
        assert_eq!(entries[0].origin, LogOrigin::Launcher);
        assert_eq!(entries[0].message, "Server did not shut down cleanly");
    }

    #[test]
    fn test_server_target_and_foreign_targets_are_skipped() {
        let entries = with_layer(|handle| {
            handle.set_enabled(true);
            emit_server_record(LogLevel::Info, "from the server");
            tracing::info!(target: "hyper::proto", "foreign");
        });
        assert!(entries.is_empty());
    }

    #[test]
    fn test_pause_guard_suppresses_and_restores() {
        let entries = with_layer(|handle| {
            handle.set_enabled(true);
            {
                let _guard = handle.pause();
                assert!(handle.is_paused());
                tracing::error!("Unable to send command response to client");
            }
            assert!(!handle.is_paused());
            tracing::info!("after");
        });
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "after");
    }

    #[test]
    fn test_pause_only_affects_the_pausing_thread() {
        let (layer, mut control) = forward_layer();
        let mut rx = control.take_entries().unwrap();
        let handle = control.forward().clone();
        handle.set_enabled(true);
        let dispatch = tracing::Dispatch::new(tracing_subscriber::registry().with(layer));

        tracing::dispatcher::with_default(&dispatch, || {
            let _guard = handle.pause();
            tracing::info!("logged while broadcasting");
            std::thread::scope(|scope| {
                scope.spawn(|| {
                    assert!(!handle.is_paused());
                    tracing::dispatcher::with_default(&dispatch, || {
                        tracing::info!("Client connected: 3");
                    });
                });
            });
            assert!(handle.is_paused());
        });

        let mut messages = Vec::new();
        while let Ok(entry) = rx.try_recv() {
            messages.push(entry.message);
        }
        assert_eq!(messages, vec!["Client connected: 3"]);
    }

    #[test]
    fn test_nested_pause_restores_outer_state() {
        let handle = ForwardHandle::default();
        let outer = handle.pause();
        {
            let _inner = handle.pause();
        }
        assert!(handle.is_paused());
        drop(outer);
        assert!(!handle.is_paused());
    }

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive(LogLevel::Warning), "pilot=warn");
        assert_eq!(filter_directive(LogLevel::Trace), "pilot=trace");
        assert_eq!(filter_directive(LogLevel::Undefined), "pilot=info");
    }

    #[test]
    fn test_level_from_tracing() {
        assert_eq!(level_from_tracing(Level::ERROR), LogLevel::Error);
        assert_eq!(level_from_tracing(Level::DEBUG), LogLevel::Debug);
    }

    #[test]
    fn test_apply_level_uses_reload_callback() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let control = LogControl::detached().with_filter_reload(move |level| {
            seen_clone.lock().unwrap().push(level);
            if level == LogLevel::Trace {
                Err("rejected".to_string())
            } else {
                Ok(())
            }
        });

        assert!(control.apply_level(LogLevel::Debug));
        assert!(!control.apply_level(LogLevel::Trace));
        assert_eq!(*seen.lock().unwrap(), vec![LogLevel::Debug, LogLevel::Trace]);
        assert!(LogControl::detached().apply_level(LogLevel::Error));
    }
}
