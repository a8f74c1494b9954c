//! Inbox watcher: statement files dropped into `{inbox}/{AccountName}/` are
//! imported into the matching account and moved to a `processed/` subfolder.
//! The notify callback runs on its own thread; a bounded channel bridges it
//! to the async import task.

use chrono::{DateTime, Utc};
use notify::{EventKind, RecursiveMode, Watcher};
use serde::Serialize;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use teller_engine::{import_statement, ImportOutcome};
use teller_storage::{get_account_by_name, DbPool};

const LOG_CAPACITY: usize = 50;
const STABLE_POLL: Duration = Duration::from_secs(2);
const STABLE_POLLS: u32 = 30;
const EVENT_QUEUE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Success,
    Skipped,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportLogEntry {
    pub timestamp: DateTime<Utc>,
    pub file: String,
    pub account: String,
    pub status: ImportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(flatten)]
    pub outcome: Option<ImportOutcome>,
}

fn entry(
    file: &str,
    account: &str,
    status: ImportStatus,
    detail: Option<String>,
    outcome: Option<ImportOutcome>,
) -> ImportLogEntry {
    ImportLogEntry {
        timestamp: Utc::now(),
        file: file.to_string(),
        account: account.to_string(),
        status,
        detail,
        outcome,
    }
}

/// Fixed-capacity ring of recent import attempts, oldest entries dropped.
pub struct ImportLog {
    entries: Mutex<VecDeque<ImportLogEntry>>,
}

impl ImportLog {
    fn new() -> Self {
        ImportLog { entries: Mutex::new(VecDeque::with_capacity(LOG_CAPACITY)) }
    }

    async fn push(&self, entry: ImportLogEntry) {
        let mut entries = self.entries.lock().await;
        while entries.len() >= LOG_CAPACITY {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Up to `limit` entries, newest first.
    async fn recent(&self, limit: usize) -> Vec<ImportLogEntry> {
        let entries = self.entries.lock().await;
        entries.iter().rev().take(limit).cloned().collect()
    }
}

#[derive(Debug, Serialize)]
pub struct WatcherStatus {
    pub running: bool,
    pub inbox_dir: String,
    pub recent_imports: Vec<ImportLogEntry>,
}

/// Cheap clone handed to the HTTP layer; answers status/log queries whether
/// or not a watcher is actually running.
#[derive(Clone)]
pub struct WatcherHandle {
    running: Arc<AtomicBool>,
    inbox_dir: PathBuf,
    log: Arc<ImportLog>,
}

impl WatcherHandle {
    /// Handle for a server running with the watcher turned off.
    pub fn disabled(inbox_dir: PathBuf) -> Self {
        WatcherHandle {
            running: Arc::new(AtomicBool::new(false)),
            inbox_dir,
            log: Arc::new(ImportLog::new()),
        }
    }

    pub async fn status(&self) -> WatcherStatus {
        WatcherStatus {
            running: self.running.load(Ordering::SeqCst),
            inbox_dir: self.inbox_dir.display().to_string(),
            recent_imports: self.log.recent(5).await,
        }
    }

    pub async fn entries(&self, limit: usize) -> Vec<ImportLogEntry> {
        self.log.recent(limit).await
    }
}

/// The watcher proper. The notify handle must stay alive for events to keep
/// flowing, so it lives here and dies on `stop`.
pub struct InboxWatcher {
    handle: WatcherHandle,
    task: JoinHandle<()>,
    _watcher: notify::RecommendedWatcher,
}

impl InboxWatcher {
    /// Starts watching `inbox_dir` recursively. Create events are funneled
    /// through a bounded channel; if the queue is full the event is dropped
    /// with a warning and the file waits for the next drop.
    pub fn spawn(inbox_dir: PathBuf, pool: DbPool) -> notify::Result<Self> {
        let (tx, mut rx) = mpsc::channel::<PathBuf>(EVENT_QUEUE);

        let mut watcher =
            notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
                if let Ok(ev) = event {
                    if matches!(ev.kind, EventKind::Create(_)) {
                        for path in ev.paths {
                            if tx.try_send(path).is_err() {
                                tracing::warn!("inbox event queue full; dropping event");
                            }
                        }
                    }
                }
            })?;
        watcher.watch(&inbox_dir, RecursiveMode::Recursive)?;

        let handle = WatcherHandle {
            running: Arc::new(AtomicBool::new(true)),
            inbox_dir: inbox_dir.clone(),
            log: Arc::new(ImportLog::new()),
        };

        let task_handle = handle.clone();
        let task = tokio::spawn(async move {
            while let Some(path) = rx.recv().await {
                process_inbox_file(&pool, &task_handle, &path, STABLE_POLL).await;
            }
        });

        tracing::info!(dir = %inbox_dir.display(), "watching inbox");
        Ok(InboxWatcher { handle, task, _watcher: watcher })
    }

    pub fn handle(&self) -> WatcherHandle {
        self.handle.clone()
    }

    pub fn stop(self) {
        self.handle.running.store(false, Ordering::SeqCst);
        self.task.abort();
        tracing::info!("inbox watcher stopped");
    }
}

/// The account folder a path belongs to, if it is somewhere we import from:
/// a `.csv` directly inside `{inbox}/{AccountName}/`. Files in the inbox
/// root, under `processed/`, or nested deeper are not imported.
fn account_folder(inbox_dir: &Path, path: &Path) -> Option<String> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if !is_csv {
        return None;
    }

    let parent = path.parent()?;
    if parent == inbox_dir || parent.parent() != Some(inbox_dir) {
        return None;
    }

    let folder = parent.file_name()?.to_str()?;
    if folder.eq_ignore_ascii_case("processed") {
        return None;
    }
    Some(folder.to_string())
}

/// Polls the file size until two consecutive non-zero reads agree, so a file
/// still being copied in is not imported halfway. Gives up after a bounded
/// number of polls instead of waiting forever on a file that never settles.
async fn wait_for_stable(path: &Path, poll: Duration) -> io::Result<()> {
    let mut last: Option<u64> = None;
    for _ in 0..STABLE_POLLS {
        let size = tokio::fs::metadata(path).await?.len();
        if size > 0 && last == Some(size) {
            return Ok(());
        }
        last = Some(size);
        tokio::time::sleep(poll).await;
    }
    Err(io::Error::new(io::ErrorKind::TimedOut, "file size never stabilized"))
}

/// Moves an imported file into `processed/` next to it, prefixed with a UTC
/// timestamp so repeated drops of the same name never collide.
async fn archive(path: &Path) -> io::Result<PathBuf> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file has no parent directory"))?;
    let processed = parent.join("processed");
    tokio::fs::create_dir_all(&processed).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "statement.csv".to_string());
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let dest = processed.join(format!("{stamp}_{file_name}"));
    tokio::fs::rename(path, &dest).await?;
    Ok(dest)
}

async fn process_inbox_file(
    pool: &DbPool,
    handle: &WatcherHandle,
    path: &Path,
    poll: Duration,
) {
    let Some(folder) = account_folder(&handle.inbox_dir, path) else {
        return;
    };
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if let Err(err) = wait_for_stable(path, poll).await {
        tracing::warn!(file = %path.display(), error = %err, "inbox file never became readable");
        handle
            .log
            .push(entry(&file_name, &folder, ImportStatus::Skipped, Some(err.to_string()), None))
            .await;
        return;
    }

    let account = match get_account_by_name(pool, &folder).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            tracing::warn!(folder = %folder, file = %file_name, "no account matches inbox folder");
            handle
                .log
                .push(entry(
                    &file_name,
                    &folder,
                    ImportStatus::Skipped,
                    Some("no matching account".to_string()),
                    None,
                ))
                .await;
            return;
        }
        Err(err) => {
            tracing::error!(error = %err, "account lookup failed");
            handle
                .log
                .push(entry(&file_name, &folder, ImportStatus::Error, Some(err.to_string()), None))
                .await;
            return;
        }
    };
    let Some(account_id) = account.id else {
        return;
    };

    let content = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            handle
                .log
                .push(entry(&file_name, &folder, ImportStatus::Error, Some(err.to_string()), None))
                .await;
            return;
        }
    };

    match import_statement(pool, account_id, &content, &file_name).await {
        Ok(outcome) => {
            if let Err(err) = archive(path).await {
                tracing::warn!(file = %file_name, error = %err, "imported but could not move to processed/");
            }
            tracing::info!(
                file = %file_name,
                account = %account.name,
                imported = outcome.imported,
                skipped = outcome.skipped,
                "inbox import complete"
            );
            handle
                .log
                .push(entry(&file_name, &account.name, ImportStatus::Success, None, Some(outcome)))
                .await;
        }
        Err(err) => {
            // Keep the file where it is so the problem can be fixed and retried.
            tracing::warn!(file = %file_name, error = %err, "inbox import failed");
            handle
                .log
                .push(entry(
                    &file_name,
                    &account.name,
                    ImportStatus::Error,
                    Some(err.to_string()),
                    None,
                ))
                .await;
        }
    }
}
