//! store.rs: the two listing boards plus their durable copy.
//!
//! Mutations run on the in-memory boards under one mutex and never touch the
//! disk themselves. Each one hands a full snapshot of the document to a single
//! writer task, which applies them in order. A failed write is logged and
//! counted; the in-memory boards stay authoritative for the session.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

use crate::error::PersistenceError;
use crate::record::{Category, Record, RecordId};

/// Namespace key written into the document; a file with another key is ignored.
pub const STORE_KEY: &str = "freight-board/records";
const STORE_VERSION: u32 = 1;

/// Both visible collections, most-recent-first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Boards {
    pub cargo_seeking_transport: Vec<Record>,
    pub transport_seeking_cargo: Vec<Record>,
}

impl Boards {
    fn board_mut(&mut self, category: Category) -> Option<&mut Vec<Record>> {
        match category {
            Category::CargoSeekingTransport => Some(&mut self.cargo_seeking_transport),
            Category::TransportSeekingCargo => Some(&mut self.transport_seeking_cargo),
            Category::Unknown => None,
        }
    }

    pub fn board(&self, category: Category) -> &[Record] {
        match category {
            Category::CargoSeekingTransport => &self.cargo_seeking_transport,
            Category::TransportSeekingCargo => &self.transport_seeking_cargo,
            Category::Unknown => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.cargo_seeking_transport.len() + self.transport_seeking_cargo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every record with `id`, whichever board it is on.
    fn remove_id(&mut self, id: RecordId) -> Option<Category> {
        let mut found = None;
        for cat in [Category::CargoSeekingTransport, Category::TransportSeekingCargo] {
            if let Some(board) = self.board_mut(cat) {
                let before = board.len();
                board.retain(|r| r.id != id);
                if board.len() != before {
                    found = Some(cat);
                }
            }
        }
        found
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    key: String,
    version: u32,
    boards: Boards,
}

/// Result of `merge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "category")]
pub enum MergeOutcome {
    Inserted(Category),
    /// Same id was already stored; the new record replaced it.
    Replaced(Category),
    /// UNKNOWN category; nothing stored.
    Quarantined,
}

impl MergeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeOutcome::Inserted(_) => "inserted",
            MergeOutcome::Replaced(_) => "replaced",
            MergeOutcome::Quarantined => "quarantined",
        }
    }
}

/// Where the serialized document lives.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// `Ok(None)` when nothing has been persisted yet.
    async fn load(&self) -> Result<Option<String>, PersistenceError>;
    async fn save(&self, document: String) -> Result<(), PersistenceError>;
    /// Erase durable state entirely.
    async fn clear(&self) -> Result<(), PersistenceError>;
}

/// JSON file, replaced atomically (write to `.tmp`, then rename).
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StoreBackend for FileBackend {
    async fn load(&self) -> Result<Option<String>, PersistenceError> {
        match fs::read_to_string(&self.path).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, document: String) -> Result<(), PersistenceError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let mut f = fs::File::create(&tmp).await?;
        f.write_all(document.as_bytes()).await?;
        f.sync_all().await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Lets callers keep a handle on the backend they gave the store.
#[async_trait]
impl<B: StoreBackend + ?Sized> StoreBackend for Arc<B> {
    async fn load(&self) -> Result<Option<String>, PersistenceError> {
        (**self).load().await
    }

    async fn save(&self, document: String) -> Result<(), PersistenceError> {
        (**self).save(document).await
    }

    async fn clear(&self) -> Result<(), PersistenceError> {
        (**self).clear().await
    }
}

/// Persistence health, surfaced on `/stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreHealth {
    pub failed_writes: u64,
    pub last_error: Option<String>,
}

type SharedHealth = Arc<Mutex<StoreHealth>>;

enum WriteOp {
    Save(String),
    Clear,
    Flush(oneshot::Sender<()>),
}

/// The single shared mutable resource. Both ingestion paths merge through here.
pub struct RecordStore {
    boards: Mutex<Boards>,
    /// `None` for a volatile store.
    writer: Option<mpsc::UnboundedSender<WriteOp>>,
    quarantined: AtomicU64,
    health: SharedHealth,
}

impl RecordStore {
    /// Load the durable document and start the writer task. An unreadable or
    /// foreign document is logged and the store starts empty; nothing is
    /// overwritten until the next mutation.
    pub async fn open(backend: impl StoreBackend + 'static) -> Self {
        let boards = match backend.load().await {
            Ok(Some(doc)) => match serde_json::from_str::<StoreDocument>(&doc) {
                Ok(d) if d.key == STORE_KEY => d.boards,
                Ok(d) => {
                    tracing::warn!(target: "store", key = %d.key, "ignoring document with foreign key");
                    Boards::default()
                }
                Err(e) => {
                    tracing::warn!(target: "store", error = %e, "stored document is malformed; starting empty");
                    Boards::default()
                }
            },
            Ok(None) => Boards::default(),
            Err(e) => {
                tracing::warn!(target: "store", error = %e, "store load failed; starting empty");
                Boards::default()
            }
        };
        tracing::info!(
            target: "store",
            cargo = boards.cargo_seeking_transport.len(),
            transport = boards.transport_seeking_cargo.len(),
            "record store loaded"
        );

        let health = SharedHealth::default();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(Box::new(backend), rx, Arc::clone(&health)));
        Self::with_parts(boards, Some(tx), health)
    }

    /// A store with no durable copy (tests, or `store.path = ""`).
    pub fn in_memory() -> Self {
        Self::with_parts(Boards::default(), None, SharedHealth::default())
    }

    fn with_parts(boards: Boards, writer: Option<mpsc::UnboundedSender<WriteOp>>, health: SharedHealth) -> Self {
        let store = Self {
            boards: Mutex::new(boards),
            writer,
            quarantined: AtomicU64::new(0),
            health,
        };
        store.publish_sizes(&store.lock());
        store
    }

    fn lock(&self) -> MutexGuard<'_, Boards> {
        // A panic mid-mutation cannot leave a half-written Vec; keep serving.
        self.boards.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Insert or replace by id. UNKNOWN records are counted and dropped.
    pub fn merge(&self, record: Record) -> MergeOutcome {
        let category = record.category;
        if !category.is_listed() {
            self.quarantined.fetch_add(1, Ordering::Relaxed);
            counter!("store_merges_total", "outcome" => "quarantined").increment(1);
            return MergeOutcome::Quarantined;
        }

        let mut boards = self.lock();
        let replaced = boards.remove_id(record.id).is_some();
        if let Some(board) = boards.board_mut(category) {
            // Newest first; an event carrying an older source time slots in behind newer ones.
            let pos = board
                .iter()
                .position(|r| r.timestamp <= record.timestamp)
                .unwrap_or(board.len());
            board.insert(pos, record);
        }
        self.persist(&boards);
        self.publish_sizes(&boards);

        let outcome = if replaced {
            MergeOutcome::Replaced(category)
        } else {
            MergeOutcome::Inserted(category)
        };
        counter!("store_merges_total", "outcome" => outcome.as_str()).increment(1);
        outcome
    }

    /// Remove by (id, category). Returns whether anything was removed.
    pub fn delete(&self, id: RecordId, category: Category) -> bool {
        let mut boards = self.lock();
        let Some(board) = boards.board_mut(category) else {
            return false;
        };
        let before = board.len();
        board.retain(|r| r.id != id);
        let removed = board.len() != before;
        if removed {
            self.persist(&boards);
            self.publish_sizes(&boards);
        }
        removed
    }

    /// Clear both boards and erase the durable document.
    pub fn reset(&self) {
        let mut boards = self.lock();
        *boards = Boards::default();
        self.enqueue(WriteOp::Clear);
        self.publish_sizes(&boards);
        tracing::info!(target: "store", "record store reset");
    }

    /// Wait until every write queued so far has reached the backend.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.enqueue(WriteOp::Flush(tx)) {
            let _ = rx.await;
        }
    }

    pub fn snapshot(&self) -> Boards {
        self.lock().clone()
    }

    pub fn get(&self, id: RecordId) -> Option<Record> {
        let boards = self.lock();
        boards
            .cargo_seeking_transport
            .iter()
            .chain(boards.transport_seeking_cargo.iter())
            .find(|r| r.id == id)
            .cloned()
    }

    pub fn len(&self, category: Category) -> usize {
        self.lock().board(category).len()
    }

    pub fn quarantined(&self) -> u64 {
        self.quarantined.load(Ordering::Relaxed)
    }

    pub fn health(&self) -> StoreHealth {
        self.health.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Queue the whole document. Called with the board lock held so the
    /// writer sees snapshots in mutation order.
    fn persist(&self, boards: &Boards) {
        if self.writer.is_none() {
            return;
        }
        let doc = StoreDocument {
            key: STORE_KEY.to_string(),
            version: STORE_VERSION,
            boards: boards.clone(),
        };
        match serde_json::to_string(&doc) {
            Ok(s) => {
                self.enqueue(WriteOp::Save(s));
            }
            Err(e) => record_failure(&self.health, &e.into()),
        }
    }

    /// `false` when there is no writer to hand the op to.
    fn enqueue(&self, op: WriteOp) -> bool {
        let Some(tx) = &self.writer else {
            return false;
        };
        if tx.send(op).is_err() {
            record_failure(
                &self.health,
                &PersistenceError::Unavailable("store writer stopped".into()),
            );
            return false;
        }
        true
    }

    fn publish_sizes(&self, boards: &Boards) {
        gauge!("store_records", "category" => Category::CARGO_TOKEN)
            .set(boards.cargo_seeking_transport.len() as f64);
        gauge!("store_records", "category" => Category::TRANSPORT_TOKEN)
            .set(boards.transport_seeking_cargo.len() as f64);
    }
}

/// Applies queued writes one at a time. Saves queued back to back collapse
/// into the newest one, since each carries the full document.
async fn write_loop(
    backend: Box<dyn StoreBackend>,
    mut rx: mpsc::UnboundedReceiver<WriteOp>,
    health: SharedHealth,
) {
    let mut held: Option<WriteOp> = None;
    loop {
        let op = match held.take() {
            Some(op) => op,
            None => match rx.recv().await {
                Some(op) => op,
                None => break,
            },
        };
        match op {
            WriteOp::Save(mut doc) => {
                while let Ok(next) = rx.try_recv() {
                    match next {
                        WriteOp::Save(newer) => doc = newer,
                        other => {
                            held = Some(other);
                            break;
                        }
                    }
                }
                if let Err(e) = backend.save(doc).await {
                    record_failure(&health, &e);
                }
            }
            WriteOp::Clear => {
                if let Err(e) = backend.clear().await {
                    record_failure(&health, &e);
                }
            }
            WriteOp::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    tracing::debug!(target: "store", "store writer stopped");
}

fn record_failure(health: &SharedHealth, e: &PersistenceError) {
    tracing::warn!(target: "store", error = %e, "persisting record store failed; keeping in-memory state");
    counter!("store_persist_errors_total").increment(1);
    let mut h = health.lock().unwrap_or_else(|p| p.into_inner());
    h.failed_writes += 1;
    h.last_error = Some(e.to_string());
}
