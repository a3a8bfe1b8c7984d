use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Watch the store's database file for writes from other processes.
/// The returned watcher must be kept alive for events to be received.
///
/// SQLite writes go through `-wal`/`-shm`/`-journal` siblings, so the parent
/// directory is watched and events are filtered to names starting with the
/// database filename.
pub fn watch_db(db_path: &str) -> Result<(RecommendedWatcher, Receiver<()>)> {
    let (tx, rx) = mpsc::channel();

    let db_filename = Path::new(db_path)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let Ok(event) = res else {
            return;
        };
        // Reads by any process (including our own snapshot queries) show up
        // as access events; reacting to them would loop.
        if matches!(event.kind, EventKind::Access(_)) {
            return;
        }
        let ours = event.paths.iter().any(|p| {
            p.file_name()
                .map(|f| f.to_string_lossy().starts_with(&*db_filename))
                .unwrap_or(false)
        });
        if ours {
            let _ = tx.send(());
        }
    })
    .context("failed to create file watcher")?;

    let path = Path::new(db_path);
    let watch_path = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    watcher
        .watch(watch_path, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", watch_path.display()))?;

    Ok((watcher, rx))
}

/// Waits for a database change event with timeout.
/// Returns true if an event was received, false on timeout.
pub fn wait_for_change(rx: &Receiver<()>, timeout: Duration) -> bool {
    rx.recv_timeout(timeout).is_ok()
}

/// Drains any pending events from the receiver.
pub fn drain_events(rx: &Receiver<()>) {
    while rx.try_recv().is_ok() {}
}

/// Runs `on_change` on a background thread after each burst of file events.
/// Dropping the guard stops the watcher; the thread exits once the event
/// channel closes.
pub struct ExternalWatch {
    _watcher: RecommendedWatcher,
    _thread: JoinHandle<()>,
}

/// Quiet period used to coalesce the several file events one commit produces.
const SETTLE: Duration = Duration::from_millis(50);

impl ExternalWatch {
    pub fn spawn(db_path: &str, mut on_change: impl FnMut() + Send + 'static) -> Result<Self> {
        let (watcher, rx) = watch_db(db_path)?;
        let thread = thread::Builder::new()
            .name("todosync-watch".into())
            .spawn(move || {
                while rx.recv().is_ok() {
                    while wait_for_change(&rx, SETTLE) {}
                    drain_events(&rx);
                    on_change();
                }
                log::debug!("external watch stopped");
            })
            .context("failed to spawn watch thread")?;
        Ok(Self {
            _watcher: watcher,
            _thread: thread,
        })
    }
}
