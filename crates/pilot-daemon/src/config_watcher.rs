//! Settings file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, error, info};

use crate::error::{DaemonError, Result};

/// Editors often write a file in several steps; wait for them to finish.
const RELOAD_SETTLE_DELAY: Duration = Duration::from_millis(100);
const DEBOUNCE: Duration = Duration::from_millis(500);

pub struct ConfigWatcher {
    _watcher_thread: std::thread::JoinHandle<()>,
    _bridge_thread: std::thread::JoinHandle<()>,
}

/// Watch `settings_path` and send `()` on `tx` after each (debounced) change.
pub fn spawn_config_watcher(
    settings_path: PathBuf,
    tx: tokio_mpsc::UnboundedSender<()>,
) -> ConfigWatcher {
    let (sync_tx, sync_rx) = mpsc::channel::<()>();

    let watcher_thread = std::thread::spawn(move || {
        if let Err(e) = watch_settings_file(&settings_path, &sync_tx) {
            error!("Config watcher error: {e}");
        }
    });

    let bridge_thread = std::thread::spawn(move || {
        while sync_rx.recv().is_ok() {
            debug!("Settings file changed, sending reload notification");
            std::thread::sleep(RELOAD_SETTLE_DELAY);
            if tx.send(()).is_err() {
                debug!("Settings reload receiver dropped, stopping watcher");
                return;
            }
        }
        debug!("Config watcher channel closed");
    });

    ConfigWatcher {
        _watcher_thread: watcher_thread,
        _bridge_thread: bridge_thread,
    }
}

fn is_settings_event(event: &notify::Event, settings_path: &Path) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == settings_path.file_name())
}

fn watch_settings_file(settings_path: &Path, tx: &mpsc::Sender<()>) -> Result<()> {
    let Some(parent) = settings_path.parent() else {
        return Err(DaemonError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Invalid settings path",
        )));
    };

    let target = settings_path.to_owned();
    let (event_tx, event_rx) = mpsc::channel();
    let mut last_event: Option<Instant> = None;

    let mut watcher =
        notify::recommended_watcher(move |result: notify::Result<notify::Event>| match result {
            Ok(event) if is_settings_event(&event, &target) => {
                let now = Instant::now();
                if last_event.is_none_or(|last| now.duration_since(last) > DEBOUNCE) {
                    last_event = Some(now);
                    let _ = event_tx.send(());
                }
            }
            Ok(_) => {}
            Err(e) => error!("Watcher error: {e}"),
        })?;

    watcher.watch(parent, RecursiveMode::NonRecursive)?;
    info!("Watching settings directory: {}", parent.display());

    while event_rx.recv().is_ok() {
        let _ = tx.send(());
    }

    Ok(())
}
