use std::{
    path::PathBuf,
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::{broadcast, oneshot};

use crate::{
    db::{migrations::run_migrations, models::GiftChange},
    error::RegistryResult,
};

const CHANGE_FEED_CAPACITY: usize = 256;
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum WorkerMessage {
    Run(Job),
    Stop,
}

/// Worker thread plus the queue feeding it. Dropping the last handle stops
/// the thread after queued jobs have run.
struct Worker {
    queue: mpsc::Sender<WorkerMessage>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let thread = match self.thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(thread) = thread else {
            return;
        };

        if self.queue.send(WorkerMessage::Stop).is_err() {
            error!("Registry DB worker already gone at shutdown");
        }
        if let Err(panic) = thread.join() {
            error!("Registry DB worker panicked: {panic:?}");
        }
    }
}

fn configure(conn: &mut Connection, busy_timeout: Duration) -> anyhow::Result<()> {
    conn.busy_timeout(busy_timeout)
        .context("failed to set busy timeout")?;
    // Gift rows rely on ON DELETE CASCADE.
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign keys")?;
    // In-memory databases stay in "memory" mode.
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("WAL journal unavailable, continuing with default: {err}");
    }
    run_migrations(conn).context("failed to run database migrations")
}

fn run_worker(mut conn: Connection, queue: mpsc::Receiver<WorkerMessage>) {
    for message in queue {
        match message {
            WorkerMessage::Run(job) => job(&mut conn),
            WorkerMessage::Stop => break,
        }
    }
    info!("Registry DB worker stopped");
}

/// Handle to the registry database.
///
/// A single worker thread owns the SQLite connection; every operation is a
/// closure shipped to that thread. Cloning the handle is cheap and all clones
/// share the worker and the gift change feed.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    changes: broadcast::Sender<GiftChange>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> anyhow::Result<Self> {
        Self::with_busy_timeout(db_path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn with_busy_timeout(db_path: PathBuf, busy_timeout: Duration) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let path_for_thread = db_path.clone();
        Self::spawn(db_path, busy_timeout, move || {
            Connection::open(&path_for_thread)
        })
    }

    /// Private database that vanishes with the last handle. Used by tests and
    /// throwaway sessions.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::spawn(
            PathBuf::from(":memory:"),
            DEFAULT_BUSY_TIMEOUT,
            Connection::open_in_memory,
        )
    }

    fn spawn<F>(db_path: PathBuf, busy_timeout: Duration, open: F) -> anyhow::Result<Self>
    where
        F: FnOnce() -> rusqlite::Result<Connection> + Send + 'static,
    {
        let (queue_tx, queue_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<anyhow::Result<()>>(1);

        let thread = thread::Builder::new()
            .name("registry-db".into())
            .spawn(move || {
                let opened = open()
                    .context("failed to open SQLite database")
                    .and_then(|mut conn| configure(&mut conn, busy_timeout).map(|_| conn));
                match opened {
                    Ok(conn) => {
                        if ready_tx.send(Ok(())).is_ok() {
                            run_worker(conn, queue_rx);
                        }
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                    }
                }
            })
            .context("failed to spawn registry DB worker")?;

        ready_rx
            .recv()
            .context("registry DB worker exited during startup")??;
        info!("Registry database ready at {}", db_path.display());

        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Ok(Self {
            worker: Arc::new(Worker {
                queue: queue_tx,
                thread: Mutex::new(Some(thread)),
            }),
            changes,
        })
    }

    pub async fn execute<F, T>(&self, task: F) -> RegistryResult<T>
    where
        F: FnOnce(&mut Connection) -> RegistryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            // A dropped receiver means the caller stopped waiting.
            let _ = reply_tx.send(task(conn));
        });

        self.worker
            .queue
            .send(WorkerMessage::Run(job))
            .map_err(|_| anyhow!("registry DB worker is not running"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("registry DB worker dropped the request"))?
    }

    /// Subscribe to gift mutations made through this handle (and its clones).
    ///
    /// Changes written by other processes sharing the file are not seen here;
    /// viewers that need them use the polling sync mode.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<GiftChange> {
        self.changes.subscribe()
    }

    pub(crate) fn publish_change(&self, change: GiftChange) {
        // No subscribers is the common case for one-shot CLI calls.
        let _ = self.changes.send(change);
    }
}
