//! File-backed [`LocalStore`].
//!
//! Layout under the data directory:
//!
//! ```text
//!   offline/00000000000000000042.bin   one postcard-encoded PendingReading
//!   offline/…                          per queued reading
//!   offline/seq                        postcard u64, next free position
//!   sensor_data/readings.jsonl         permanent copy, one JSON document per line
//! ```
//!
//! Queue entries and the `seq` mark are written to a `.tmp` file, synced,
//! then renamed, so a crash never leaves a half-written file under its
//! real name.  The mark is advanced before the entry is written, so
//! positions never repeat across restarts, even after a full drain.
//!
//! The queue order `(timestamp, position)` is indexed in memory at open;
//! `pending(limit)` only reads the files it returns.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::app::ports::LocalStore;
use crate::error::StorageError;
use crate::telemetry::reading::{PendingReading, Reading};

const OFFLINE_DIR: &str = "offline";
const ARCHIVE_DIR: &str = "sensor_data";
const ARCHIVE_FILE: &str = "readings.jsonl";
const SEQ_FILE: &str = "seq";
const ENTRY_EXT: &str = "bin";
const TMP_EXT: &str = "tmp";
const CORRUPT_EXT: &str = "corrupt";

/// In-memory view of the offline directory.
#[derive(Default)]
struct Queue {
    /// Next position to hand out.  Persisted in `seq`.
    next: u64,
    order: BTreeSet<(DateTime<Utc>, u64)>,
    timestamps: HashMap<u64, DateTime<Utc>>,
}

impl Queue {
    fn insert(&mut self, position: u64, timestamp: DateTime<Utc>) {
        self.order.insert((timestamp, position));
        self.timestamps.insert(position, timestamp);
    }

    fn forget(&mut self, position: u64) {
        if let Some(ts) = self.timestamps.remove(&position) {
            self.order.remove(&(ts, position));
        }
    }
}

pub struct FileStore {
    offline_dir: PathBuf,
    archive_path: PathBuf,
    /// Guards the offline directory.
    queue: Mutex<Queue>,
    /// Guards appends to the archive.
    archive: Mutex<()>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// Decodes every queued entry once to build the order index;
    /// unreadable entries are quarantined as `.corrupt`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref();
        let offline_dir = root.join(OFFLINE_DIR);
        let archive_dir = root.join(ARCHIVE_DIR);
        fs::create_dir_all(&offline_dir)?;
        fs::create_dir_all(&archive_dir)?;

        let mut queue = Queue::default();
        let mut highest = 0;
        for entry in fs::read_dir(&offline_dir)? {
            let path = entry?.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some(TMP_EXT) => {
                    warn!("Removing interrupted write {}", path.display());
                    fs::remove_file(&path)?;
                }
                Some(CORRUPT_EXT) => {
                    if let Some(pos) = position_of(&path) {
                        highest = highest.max(pos);
                    }
                }
                Some(ENTRY_EXT) => {
                    let Some(pos) = position_of(&path) else {
                        continue;
                    };
                    highest = highest.max(pos);
                    if let Some(entry) = read_entry(&path)? {
                        queue.insert(pos, entry.reading.timestamp);
                    }
                }
                _ => {}
            }
        }
        queue.next = read_seq(&offline_dir.join(SEQ_FILE)).max(highest + 1);

        let pending = queue.order.len();
        let store = Self {
            offline_dir,
            archive_path: archive_dir.join(ARCHIVE_FILE),
            queue: Mutex::new(queue),
            archive: Mutex::new(()),
        };
        info!("File store open at {} ({pending} pending)", root.display());
        Ok(store)
    }

    fn entry_path(&self, position: u64) -> PathBuf {
        self.offline_dir.join(format!("{position:020}.{ENTRY_EXT}"))
    }

    fn lock_queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn position_of(path: &Path) -> Option<u64> {
    path.file_stem()?.to_str()?.parse().ok()
}

/// `None` (after quarantining the file) if the entry does not decode.
fn read_entry(path: &Path) -> Result<Option<PendingReading>, StorageError> {
    let bytes = fs::read(path)?;
    match postcard::from_bytes::<PendingReading>(&bytes) {
        Ok(entry) => Ok(Some(entry)),
        Err(e) => {
            warn!("Quarantining unreadable queue entry {}: {e}", path.display());
            fs::rename(path, path.with_extension(CORRUPT_EXT))?;
            Ok(None)
        }
    }
}

fn read_seq(path: &Path) -> u64 {
    match fs::read(path) {
        Ok(bytes) => postcard::from_bytes(&bytes).unwrap_or_else(|e| {
            warn!("Ignoring unreadable {}: {e}", path.display());
            0
        }),
        Err(_) => 0,
    }
}

/// tmp → sync → rename.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let tmp = path.with_extension(TMP_EXT);
    let mut file = File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)?;
    Ok(())
}

impl LocalStore for FileStore {
    fn enqueue(&self, reading: &Reading) -> Result<u64, StorageError> {
        let mut queue = self.lock_queue();
        let position = queue.next;
        let entry = PendingReading {
            position,
            reading: reading.clone(),
        };
        let bytes = postcard::to_allocvec(&entry).map_err(|e| StorageError::Encode(e.to_string()))?;
        let seq = postcard::to_allocvec(&(position + 1)).map_err(|e| StorageError::Encode(e.to_string()))?;

        write_atomically(&self.offline_dir.join(SEQ_FILE), &seq)?;
        queue.next = position + 1;
        write_atomically(&self.entry_path(position), &bytes)?;
        queue.insert(position, reading.timestamp);
        Ok(position)
    }

    fn pending(&self, limit: usize) -> Result<Vec<PendingReading>, StorageError> {
        let mut queue = self.lock_queue();
        let head: Vec<u64> = queue.order.iter().take(limit).map(|&(_, pos)| pos).collect();
        let mut entries = Vec::with_capacity(head.len());
        for pos in head {
            let path = self.entry_path(pos);
            let entry = match read_entry(&path) {
                Ok(entry) => entry,
                Err(StorageError::Io(e)) if e.kind() == io::ErrorKind::NotFound => None,
                Err(e) => return Err(e),
            };
            match entry {
                Some(entry) => entries.push(entry),
                None => queue.forget(pos),
            }
        }
        Ok(entries)
    }

    fn remove(&self, position: u64) -> Result<(), StorageError> {
        let mut queue = self.lock_queue();
        match fs::remove_file(self.entry_path(position)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        queue.forget(position);
        Ok(())
    }

    fn pending_count(&self) -> Result<usize, StorageError> {
        Ok(self.lock_queue().order.len())
    }

    fn archive(&self, reading: &Reading) -> Result<(), StorageError> {
        let mut line = serde_json::to_string(reading).map_err(|e| StorageError::Encode(e.to_string()))?;
        line.push('\n');

        let _guard = self.archive.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.archive_path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn archived_count(&self) -> Result<usize, StorageError> {
        let _guard = self.archive.lock().unwrap_or_else(PoisonError::into_inner);
        let file = match File::open(&self.archive_path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut count = 0;
        for line in BufReader::new(file).lines() {
            if !line?.trim().is_empty() {
                count += 1;
            }
        }
        Ok(count)
    }
}
