//! Source watcher for `xavva dev` / `--watch`.
//!
//! Raw notify events are bridged onto a tokio channel; [`watch_loop`] runs
//! them through the cooling set and debounce timer and dispatches cycles.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;

use async_trait::async_trait;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;
use xavva_core::{WatchAction, WatchDebounce};

use crate::orchestrator::{CycleError, CycleGuard};
use crate::output;

/// Handle that keeps the watcher alive
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
    _thread: std::thread::JoinHandle<()>,
}

/// Watches the whole project tree and forwards changed paths.
pub struct ChangeWatcher {
    project_dir: PathBuf,
    changed_tx: mpsc::Sender<PathBuf>,
}

impl ChangeWatcher {
    pub fn new(project_dir: PathBuf, changed_tx: mpsc::Sender<PathBuf>) -> Self {
        Self {
            project_dir,
            changed_tx,
        }
    }

    pub fn start(self) -> Result<WatcherHandle, notify::Error> {
        let (tx, rx) = std_mpsc::channel::<notify::Result<notify::Event>>();
        let mut watcher = notify::recommended_watcher(tx)?;
        watcher.watch(&self.project_dir, RecursiveMode::Recursive)?;

        let changed_tx = self.changed_tx;
        let handle = std::thread::spawn(move || {
            for result in rx {
                match result {
                    Ok(event) => {
                        if !matches!(
                            event.kind,
                            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                        ) {
                            continue;
                        }
                        for path in event.paths {
                            if changed_tx.blocking_send(path).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(err = %e, "Watch error");
                    }
                }
            }
        });

        Ok(WatcherHandle {
            _watcher: watcher,
            _thread: handle,
        })
    }
}

/// The work a watch loop can trigger.
#[async_trait]
pub trait CycleRunner: Send + Sync + 'static {
    /// Claim the single cycle slot, or `None` while a cycle runs.
    fn try_begin(&self) -> Option<CycleGuard>;

    /// Compile and hot-deploy changed classes. `guard` is held to the end.
    async fn incremental_cycle(&self, guard: CycleGuard) -> Result<(), CycleError>;

    /// Copy one changed resource into the running app.
    async fn sync_resource(&self, guard: CycleGuard, path: PathBuf) -> Result<(), CycleError>;
}

fn relative_to(root: &Path, path: &Path) -> Option<PathBuf> {
    path.strip_prefix(root)
        .ok()
        .filter(|rel| !rel.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

async fn until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

fn spawn_cycle<R: CycleRunner>(runner: &Arc<R>, resource: Option<PathBuf>) {
    let Some(guard) = runner.try_begin() else {
        tracing::info!(?resource, "Cycle in progress, change dropped");
        return;
    };
    let runner = Arc::clone(runner);
    tokio::spawn(async move {
        let result = match resource {
            Some(path) => runner.sync_resource(guard, path).await,
            None => runner.incremental_cycle(guard).await,
        };
        if let Err(e) = result {
            output::error(&e.to_string());
            output::muted("Still watching for changes");
        }
    });
}

/// Consume `events` until the channel closes.
///
/// Compile-triggering changes collapse into one incremental cycle after the
/// debounce delay; resource changes are synced immediately. Either kind is
/// dropped when a cycle already runs.
pub async fn watch_loop<R: CycleRunner>(
    runner: Arc<R>,
    root: PathBuf,
    mut events: mpsc::Receiver<PathBuf>,
) {
    let mut debounce = WatchDebounce::default();
    loop {
        let deadline = debounce.deadline();
        tokio::select! {
            event = events.recv() => {
                let Some(path) = event else {
                    break;
                };
                let Some(relative) = relative_to(&root, &path) else {
                    continue;
                };
                match debounce.on_event(&relative, Instant::now().into_std()) {
                    WatchAction::Ignore => {}
                    WatchAction::Scheduled(_) => {
                        tracing::debug!(path = %relative.display(), "Compile scheduled");
                    }
                    WatchAction::SyncResource => spawn_cycle(&runner, Some(path)),
                }
            }
            _ = until(deadline) => {
                if debounce.fire_if_due(Instant::now().into_std()) {
                    spawn_cycle(&runner, None);
                }
            }
        }
    }
}
