//! Asynchronous binary persistence for the transposition table.
//!
//! All file IO runs on one dedicated worker thread fed through a crossbeam
//! channel, so table reads and writes never block on disk. Files are written
//! atomically (temp file + rename).
//!
//! ## File format (little-endian)
//!
//! ```text
//! i32 count N
//! N records: i64 key, i32 value, i32 depth, i8 flag ordinal, i32 best_move
//! ```
//!
//! Older files omit the trailing `best_move`; readers detect that from the
//! file size and load such entries with `best_move = -1`.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crossbeam_channel::{Receiver, Sender, unbounded};
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::search::tt::{Flag, TtEntry};

/// Bytes per record in the current format (key + value + depth + flag + move).
const RECORD_BYTES: u64 = 8 + 4 + 4 + 1 + 4;

/// Bytes per record in the legacy format without `best_move`.
const LEGACY_RECORD_BYTES: u64 = 8 + 4 + 4 + 1;

/// Errors from transposition-table persistence.
///
/// Cloneable so a shared [`PersistTask`] can hand the outcome to every
/// waiter; the io error is carried as its message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistError {
    /// No home directory was available to resolve the default table path.
    #[error("no home directory for the default table path")]
    NoHomeDir,
    /// The table file does not match either known layout.
    #[error("table file is corrupt: {reason}")]
    Corrupt {
        /// What the reader found.
        reason: String,
    },
    /// Reading or writing the table file failed.
    #[error("table io failed: {message}")]
    Io {
        /// The underlying io error message.
        message: String,
    },
}

impl From<std::io::Error> for PersistError {
    fn from(err: std::io::Error) -> Self {
        PersistError::Io {
            message: err.to_string(),
        }
    }
}

/// Persistence lifecycle of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PersistStatus {
    /// Nothing loaded yet, or the last IO attempt failed.
    NotLoaded = 0,
    /// A load is in flight.
    Loading = 1,
    /// The table reflects the file (or a completed save).
    Ready = 2,
    /// A save is in flight.
    Saving = 3,
}

impl PersistStatus {
    const fn from_bits(bits: u8) -> PersistStatus {
        match bits {
            1 => PersistStatus::Loading,
            2 => PersistStatus::Ready,
            3 => PersistStatus::Saving,
            _ => PersistStatus::NotLoaded,
        }
    }
}

/// Shared status cell with broadcast to subscribers.
struct StatusCell {
    value: AtomicU8,
    listeners: Mutex<Vec<Sender<PersistStatus>>>,
}

impl StatusCell {
    fn new() -> Self {
        Self {
            value: AtomicU8::new(PersistStatus::NotLoaded as u8),
            listeners: Mutex::new(Vec::new()),
        }
    }

    fn get(&self) -> PersistStatus {
        PersistStatus::from_bits(self.value.load(Ordering::Acquire))
    }

    fn set(&self, status: PersistStatus) {
        self.value.store(status as u8, Ordering::Release);
        let mut listeners = self.listeners.lock().expect("status listeners poisoned");
        listeners.retain(|listener| listener.send(status).is_ok());
    }

    fn subscribe(&self) -> Receiver<PersistStatus> {
        let (sender, receiver) = unbounded();
        self.listeners
            .lock()
            .expect("status listeners poisoned")
            .push(sender);
        receiver
    }
}

/// Future-style handle to one asynchronous save or load.
///
/// Cloneable: coalesced loads share a single task. [`wait`](Self::wait)
/// blocks until the IO worker resolves it.
#[derive(Clone)]
pub struct PersistTask {
    state: Arc<TaskState>,
}

struct TaskState {
    result: Mutex<Option<Result<usize, PersistError>>>,
    done: Condvar,
}

impl PersistTask {
    fn new() -> Self {
        Self {
            state: Arc::new(TaskState {
                result: Mutex::new(None),
                done: Condvar::new(),
            }),
        }
    }

    /// A task that already failed (used when no path can be resolved).
    fn failed(error: PersistError) -> Self {
        let task = Self::new();
        task.complete(Err(error));
        task
    }

    fn complete(&self, result: Result<usize, PersistError>) {
        let mut slot = self.state.result.lock().expect("task result poisoned");
        *slot = Some(result);
        self.state.done.notify_all();
    }

    /// Block until the IO worker finishes, returning the entry count on
    /// success.
    pub fn wait(&self) -> Result<usize, PersistError> {
        let mut slot = self.state.result.lock().expect("task result poisoned");
        while slot.is_none() {
            slot = self.state.done.wait(slot).expect("task result poisoned");
        }
        slot.clone().expect("checked above")
    }

    /// The outcome, if the worker has already finished.
    pub fn try_result(&self) -> Option<Result<usize, PersistError>> {
        self.state
            .result
            .lock()
            .expect("task result poisoned")
            .clone()
    }

    /// Whether two handles resolve to the same underlying operation, as
    /// coalesced loads do.
    pub fn shares_state_with(&self, other: &PersistTask) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

enum IoJob {
    Save {
        path: PathBuf,
        entries: Vec<(u64, TtEntry)>,
        task: PersistTask,
    },
    Load {
        path: PathBuf,
        map: Arc<DashMap<u64, TtEntry>>,
        task: PersistTask,
    },
}

/// Per-table persistence state plus the handle to its IO worker.
pub(crate) struct Persistence {
    path: Option<PathBuf>,
    status: Arc<StatusCell>,
    in_flight_load: Arc<Mutex<Option<PersistTask>>>,
    jobs: Sender<IoJob>,
}

impl Persistence {
    pub(crate) fn new(path: Option<PathBuf>) -> Self {
        let status = Arc::new(StatusCell::new());
        let in_flight_load = Arc::new(Mutex::new(None));
        let (jobs, receiver) = unbounded();

        let worker_status = Arc::clone(&status);
        let worker_loads = Arc::clone(&in_flight_load);
        thread::Builder::new()
            .name("honeycomb-tt-io".into())
            .spawn(move || run_worker(receiver, worker_status, worker_loads))
            .expect("spawn transposition-table io worker");

        Self {
            path,
            status,
            in_flight_load,
            jobs,
        }
    }

    /// Default location: `~/.honeycomb/transposition-table.bin`.
    pub(crate) fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".honeycomb").join("transposition-table.bin"))
    }

    pub(crate) fn status(&self) -> PersistStatus {
        self.status.get()
    }

    pub(crate) fn subscribe(&self) -> Receiver<PersistStatus> {
        self.status.subscribe()
    }

    pub(crate) fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn save(&self, entries: Vec<(u64, TtEntry)>) -> PersistTask {
        let Some(path) = self.path.clone() else {
            return PersistTask::failed(PersistError::NoHomeDir);
        };

        self.status.set(PersistStatus::Saving);
        let task = PersistTask::new();
        self.jobs
            .send(IoJob::Save {
                path,
                entries,
                task: task.clone(),
            })
            .expect("io worker alive");
        task
    }

    pub(crate) fn load(&self, map: Arc<DashMap<u64, TtEntry>>) -> PersistTask {
        let Some(path) = self.path.clone() else {
            return PersistTask::failed(PersistError::NoHomeDir);
        };

        let mut in_flight = self.in_flight_load.lock().expect("load slot poisoned");
        if let Some(task) = in_flight.as_ref() {
            // Coalesce onto the in-flight load.
            return task.clone();
        }

        let task = PersistTask::new();
        *in_flight = Some(task.clone());
        drop(in_flight);

        self.status.set(PersistStatus::Loading);
        self.jobs
            .send(IoJob::Load {
                path,
                map,
                task: task.clone(),
            })
            .expect("io worker alive");
        task
    }
}

fn run_worker(
    jobs: Receiver<IoJob>,
    status: Arc<StatusCell>,
    in_flight_load: Arc<Mutex<Option<PersistTask>>>,
) {
    while let Ok(job) = jobs.recv() {
        match job {
            IoJob::Save { path, entries, task } => {
                let count = entries.len();
                match write_table(&path, &entries) {
                    Ok(()) => {
                        debug!(?path, count, "saved transposition table");
                        status.set(PersistStatus::Ready);
                        task.complete(Ok(count));
                    }
                    Err(err) => {
                        warn!(?path, %err, "saving transposition table failed");
                        status.set(PersistStatus::NotLoaded);
                        task.complete(Err(err));
                    }
                }
            }
            IoJob::Load { path, map, task } => {
                let outcome = read_table(&path, &map);
                let mut slot = in_flight_load.lock().expect("load slot poisoned");
                if let Some(current) = slot.as_ref()
                    && current.shares_state_with(&task)
                {
                    *slot = None;
                }
                drop(slot);

                match outcome {
                    Ok(count) => {
                        debug!(?path, count, "loaded transposition table");
                        status.set(PersistStatus::Ready);
                        task.complete(Ok(count));
                    }
                    Err(err) => {
                        warn!(?path, %err, "loading transposition table failed");
                        status.set(PersistStatus::NotLoaded);
                        task.complete(Err(err));
                    }
                }
            }
        }
    }
}

fn write_table(path: &Path, entries: &[(u64, TtEntry)]) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        writer.write_i32::<LittleEndian>(entries.len() as i32)?;
        for (key, entry) in entries {
            writer.write_i64::<LittleEndian>(*key as i64)?;
            writer.write_i32::<LittleEndian>(entry.value)?;
            writer.write_i32::<LittleEndian>(entry.depth)?;
            writer.write_i8(entry.flag as i8)?;
            writer.write_i32::<LittleEndian>(entry.best_move)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_table(path: &Path, map: &DashMap<u64, TtEntry>) -> Result<usize, PersistError> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let count = reader.read_i32::<LittleEndian>()?;
    if count < 0 {
        return Err(PersistError::Corrupt {
            reason: format!("negative entry count {count}"),
        });
    }
    let count = count as u64;

    let has_best_move = if size == 4 + count * RECORD_BYTES {
        true
    } else if size == 4 + count * LEGACY_RECORD_BYTES {
        false
    } else {
        return Err(PersistError::Corrupt {
            reason: format!("{size} bytes does not fit {count} entries"),
        });
    };

    for _ in 0..count {
        let key = reader.read_i64::<LittleEndian>()? as u64;
        let value = reader.read_i32::<LittleEndian>()?;
        let depth = reader.read_i32::<LittleEndian>()?;
        let flag_bits = reader.read_i8()?;
        let flag = Flag::from_ordinal(flag_bits).ok_or_else(|| PersistError::Corrupt {
            reason: format!("unknown bound flag {flag_bits}"),
        })?;
        let best_move = if has_best_move {
            reader.read_i32::<LittleEndian>()?
        } else {
            TtEntry::NO_MOVE
        };

        let entry = TtEntry {
            value,
            depth,
            flag,
            best_move,
        };

        // Depth-preferred merge, same policy as live stores.
        map.entry(key)
            .and_modify(|existing| {
                if entry.depth > existing.depth {
                    *existing = entry;
                }
            })
            .or_insert(entry);
    }

    Ok(count as usize)
}
