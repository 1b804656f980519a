//! Rebuilds the cached tree when archives in the backup directory change.

use crate::state::AppState;
use backup_reader::utils::paths::normalize_path;
use backup_reader::ReaderConfig;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_BUFFER: usize = 64;
/// Quiet period before a rebuild, so a file being copied in triggers one scan
const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Decides which events concern the backup listing.
#[derive(Clone)]
pub struct EventFilter {
    dirs: Vec<String>,
    config: ReaderConfig,
}

impl EventFilter {
    pub fn new(config: &ReaderConfig) -> Self {
        let mut dirs = vec![normalize_path(&config.backup_dir)];
        // Events arrive with resolved paths.
        if let Ok(canonical) = std::fs::canonicalize(&config.backup_dir) {
            dirs.push(normalize_path(&canonical));
        }
        Self {
            dirs,
            config: config.clone(),
        }
    }

    /// Creation, removal, modification or rename of an archive directly
    /// inside the backup directory.
    pub fn matches(&self, event: &Event) -> bool {
        matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
        ) && event.paths.iter().any(|path| self.is_backup_file(path))
    }

    fn is_backup_file(&self, path: &Path) -> bool {
        let in_dir = path
            .parent()
            .is_some_and(|parent| self.dirs.contains(&normalize_path(parent)));
        let is_archive = path
            .file_name()
            .is_some_and(|name| self.config.is_archive_name(&name.to_string_lossy()));
        in_dir && is_archive
    }
}

/// Start watching the backup directory. The watcher lives as long as the
/// returned task, which ends when `cancel` fires.
pub fn spawn(state: Arc<AppState>, cancel: CancellationToken) -> anyhow::Result<JoinHandle<()>> {
    let dir = state.config.reader.backup_dir.clone();
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let _ = tx.blocking_send(event);
            }
            Err(e) => warn!("File watcher error: {}", e),
        },
        Config::default(),
    )?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    info!("Watching backup directory {}", dir.display());

    let filter = EventFilter::new(&state.config.reader);
    Ok(tokio::spawn(async move {
        let _watcher = watcher;
        run(rx, filter, state, cancel, SETTLE_DELAY).await;
    }))
}

async fn run(
    mut rx: mpsc::Receiver<Event>,
    filter: EventFilter,
    state: Arc<AppState>,
    cancel: CancellationToken,
    settle: Duration,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Backup watcher cancelled");
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                if !filter.matches(&event) {
                    debug!("Ignoring file event {:?} on {:?}", event.kind, event.paths);
                    continue;
                }

                tokio::time::sleep(settle).await;
                let mut drained = 0usize;
                while rx.try_recv().is_ok() {
                    drained += 1;
                }
                info!("Backup directory changed ({:?}, {} more events), rebuilding tree", event.paths, drained);

                let state = state.clone();
                match tokio::task::spawn_blocking(move || state.backups.invalidate()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Tree rebuild failed: {}", e),
                    Err(e) => warn!("Tree rebuild task failed: {}", e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::routes::test_support::write_backup;
    use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind, RenameMode};
    use tempfile::TempDir;

    fn event(kind: EventKind, path: &Path) -> Event {
        Event::new(kind).add_path(path.to_path_buf())
    }

    #[test]
    fn test_filter_matches_archive_changes_only() {
        let temp = TempDir::new().unwrap();
        let filter = EventFilter::new(&ReaderConfig::without_passwords(temp.path()));
        let archive = temp.path().join("full.tar");

        assert!(filter.matches(&event(EventKind::Create(CreateKind::File), &archive)));
        assert!(filter.matches(&event(EventKind::Remove(RemoveKind::File), &archive)));
        assert!(filter.matches(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            &temp.path().join("daily.TGZ")
        )));

        assert!(!filter.matches(&event(EventKind::Access(AccessKind::Any), &archive)));
        assert!(!filter.matches(&event(
            EventKind::Create(CreateKind::File),
            &temp.path().join("notes.txt")
        )));
        assert!(!filter.matches(&event(
            EventKind::Create(CreateKind::File),
            &temp.path().join("sub").join("full.tar")
        )));
    }

    #[tokio::test]
    async fn test_relevant_event_rebuilds_tree() {
        let backups = TempDir::new().unwrap();
        write_backup(backups.path(), "first.tar", &[("./a.txt", b"a")]);

        let mut reader = ReaderConfig::without_passwords(backups.path());
        reader.workers = 1;
        let config = AppConfig {
            port: 0,
            static_dir: backups.path().to_path_buf(),
            log_level: "info".into(),
            reader,
        };
        let state = Arc::new(AppState::new(config).unwrap());
        assert_eq!(state.backups.list_tree().unwrap().children().len(), 1);

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let filter = EventFilter::new(&state.config.reader);
        let task = tokio::spawn(run(rx, filter, state.clone(), cancel.clone(), Duration::ZERO));

        let second = write_backup(backups.path(), "second.tar", &[("./b.txt", b"b")]);
        tx.send(event(EventKind::Create(CreateKind::File), &second)).await.unwrap();
        tx.send(event(EventKind::Modify(ModifyKind::Any), &second)).await.unwrap();

        let mut rebuilt = false;
        for _ in 0..100 {
            let tree = {
                let state = state.clone();
                tokio::task::spawn_blocking(move || state.backups.list_tree()).await.unwrap().unwrap()
            };
            if tree.children().len() == 2 {
                rebuilt = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(rebuilt);

        cancel.cancel();
        task.await.unwrap();
    }
}
