//! Per-stream memory-mapped append-only log file and the registry that
//! owns one per stream name.

use crate::entry::{decode, Direction, LogEntry, ParsedEntry};
use crate::error::LogError;
use memmap2::{MmapMut, MmapOptions};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

const HEADER_LEN: u64 = 64;
const MAGIC: &[u8; 8] = b"XLNKLOG1";

/// `(entry_count, write_position)` live at the start of the 64-byte
/// header; bytes `[16..24]` hold a magic string checked at `open()`.
struct Header;

impl Header {
    fn entry_count(mmap: &[u8]) -> u64 {
        u64::from_le_bytes(mmap[0..8].try_into().unwrap())
    }

    fn write_position(mmap: &[u8]) -> u64 {
        u64::from_le_bytes(mmap[8..16].try_into().unwrap())
    }

    fn set(mmap: &mut [u8], entry_count: u64, write_position: u64) {
        mmap[0..8].copy_from_slice(&entry_count.to_le_bytes());
        mmap[8..16].copy_from_slice(&write_position.to_le_bytes());
    }

    fn write_magic(mmap: &mut [u8]) {
        mmap[16..24].copy_from_slice(MAGIC);
    }

    fn check_magic(mmap: &[u8]) -> bool {
        &mmap[16..24] == MAGIC
    }
}

/// An append-only, memory-mapped log file for one stream.
pub struct StreamStore {
    stream: String,
    mmap: MmapMut,
    max_size: u64,
    sync_on_write: bool,
}

impl StreamStore {
    /// Opens (creating if absent) the log file for `stream` at `path`,
    /// preallocated to `max_size` bytes. Runs a header-magic sanity check
    /// on an existing file, the mmap analogue of the teacher's
    /// `PRAGMA integrity_check`.
    pub fn open(
        path: &Path,
        stream: &str,
        max_size: u64,
        sync_on_write: bool,
    ) -> Result<Self, LogError> {
        let existed = path.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|source| LogError::Io {
                stream: stream.to_string(),
                source,
            })?;
        if !existed || file.metadata().map(|m| m.len()).unwrap_or(0) < HEADER_LEN {
            file.set_len(max_size.max(HEADER_LEN)).map_err(|source| LogError::Io {
                stream: stream.to_string(),
                source,
            })?;
        }
        let mut mmap = unsafe {
            MmapOptions::new()
                .map_mut(&file)
                .map_err(|source| LogError::Io {
                    stream: stream.to_string(),
                    source,
                })?
        };

        if existed {
            if !Header::check_magic(&mmap) {
                return Err(LogError::Corrupt {
                    stream: stream.to_string(),
                    reason: "missing or mismatched header magic".to_string(),
                });
            }
        } else {
            Header::set(&mut mmap, 0, HEADER_LEN);
            Header::write_magic(&mut mmap);
        }

        Ok(StreamStore {
            stream: stream.to_string(),
            mmap,
            max_size,
            sync_on_write,
        })
    }

    pub fn entry_count(&self) -> u64 {
        Header::entry_count(&self.mmap)
    }

    pub fn write_position(&self) -> u64 {
        Header::write_position(&self.mmap)
    }

    /// Appends `entry` at the current write position. Fails with
    /// `LogFull` if the entry would overflow the configured max size.
    pub fn write(&mut self, entry: &LogEntry<'_>) -> Result<(), LogError> {
        let entry_len = entry.on_disk_len() as u64;
        let write_position = self.write_position();
        if write_position + entry_len > self.max_size {
            return Err(LogError::LogFull {
                stream: self.stream.clone(),
                write_position,
                entry_len,
                max_size: self.max_size,
            });
        }
        let start = write_position as usize;
        let end = start + entry_len as usize;
        entry.encode_into(&mut self.mmap[start..end]);

        let entry_count = Header::entry_count(&self.mmap) + 1;
        Header::set(&mut self.mmap, entry_count, write_position + entry_len);

        if self.sync_on_write {
            self.sync()?;
        }
        Ok(())
    }

    /// Walks entries forward from the start of the log, applying
    /// `direction`/`seq_range`/`time_range` filters, invoking `callback`
    /// for each match and stopping early if it returns `false`.
    pub fn replay<'a, F>(
        &'a self,
        direction: Option<Direction>,
        seq_range: Option<(u32, u32)>,
        time_range: Option<(i64, i64)>,
        mut callback: F,
    ) where
        F: FnMut(ParsedEntry<'a>) -> bool,
    {
        let write_position = self.write_position() as usize;
        let mut pos = HEADER_LEN as usize;
        while pos < write_position {
            let Some(entry) = decode(&self.mmap[pos..write_position]) else {
                break;
            };
            let matches_direction = direction.is_none_or(|d| d == entry.direction);
            let matches_seq = seq_range.is_none_or(|(lo, hi)| {
                (lo == 0 && hi == 0) || (entry.seq >= lo && (hi == 0 || entry.seq <= hi))
            });
            let matches_time = time_range.is_none_or(|(lo, hi)| {
                (lo == 0 && hi == 0)
                    || (entry.timestamp_nanos >= lo && (hi == 0 || entry.timestamp_nanos <= hi))
            });
            let on_disk_len = entry.on_disk_len;
            if matches_direction && matches_seq && matches_time && !callback(entry) {
                break;
            }
            pos += on_disk_len;
        }
    }

    /// Linear scan for the most recently written entry matching
    /// `direction` (or the very latest entry if `None`).
    pub fn get_latest<'a>(&'a self, direction: Option<Direction>) -> Option<ParsedEntry<'a>> {
        let mut latest = None;
        self.replay(direction, None, None, |entry| {
            latest = Some(entry);
            true
        });
        latest
    }

    pub fn sync(&self) -> Result<(), LogError> {
        self.mmap.flush().map_err(|source| LogError::Io {
            stream: self.stream.clone(),
            source,
        })
    }

    pub fn close(self) -> Result<(), LogError> {
        self.sync()
    }
}

fn sanitize(stream: &str) -> String {
    stream
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Owns one [`StreamStore`] per stream name, opened lazily, matching
/// spec.md §6's `<sanitized_stream_name>.fixlog` file naming.
pub struct LogStore {
    dir: PathBuf,
    max_size: u64,
    sync_on_write: bool,
    streams: HashMap<String, StreamStore>,
}

impl LogStore {
    pub fn new(dir: impl Into<PathBuf>, max_size: u64, sync_on_write: bool) -> Self {
        LogStore {
            dir: dir.into(),
            max_size,
            sync_on_write,
            streams: HashMap::new(),
        }
    }

    fn path_for(&self, stream: &str) -> PathBuf {
        self.dir.join(format!("{}.fixlog", sanitize(stream)))
    }

    pub fn stream(&mut self, stream: &str) -> Result<&mut StreamStore, LogError> {
        if !self.streams.contains_key(stream) {
            let path = self.path_for(stream);
            let store = StreamStore::open(&path, stream, self.max_size, self.sync_on_write)?;
            self.streams.insert(stream.to_string(), store);
        }
        Ok(self.streams.get_mut(stream).unwrap())
    }

    pub fn write(&mut self, stream: &str, entry: &LogEntry<'_>) -> Result<(), LogError> {
        self.stream(stream)?.write(entry)
    }

    pub fn replay<F>(
        &mut self,
        stream: &str,
        direction: Option<Direction>,
        seq_range: Option<(u32, u32)>,
        time_range: Option<(i64, i64)>,
        callback: F,
    ) -> Result<(), LogError>
    where
        F: FnMut(ParsedEntry<'_>) -> bool,
    {
        self.stream(stream)?
            .replay(direction, seq_range, time_range, callback);
        Ok(())
    }

    pub fn get_latest(
        &mut self,
        stream: &str,
        direction: Option<Direction>,
    ) -> Result<Option<ParsedEntry<'_>>, LogError> {
        Ok(self.stream(stream)?.get_latest(direction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(seq: u32, direction: Direction) -> LogEntry<'static> {
        LogEntry {
            timestamp_nanos: seq as i64 * 1000,
            seq,
            direction,
            txn_id: 7,
            msg_type: "D",
            metadata: b"",
            raw: b"8=FIX.4.4|",
        }
    }

    #[test]
    fn write_then_replay_returns_entries_in_append_order() {
        let dir = tempdir().unwrap();
        let mut store = StreamStore::open(&dir.path().join("s1.fixlog"), "s1", 1 << 20, false).unwrap();

        store.write(&entry(1, Direction::In)).unwrap();
        store.write(&entry(2, Direction::Out)).unwrap();
        store.write(&entry(3, Direction::In)).unwrap();

        let mut seqs = Vec::new();
        store.replay(Some(Direction::In), None, None, |e| {
            seqs.push(e.seq);
            true
        });
        assert_eq!(seqs, vec![1, 3]);
        assert_eq!(store.entry_count(), 3);
    }

    #[test]
    fn replay_stops_when_callback_returns_false() {
        let dir = tempdir().unwrap();
        let mut store = StreamStore::open(&dir.path().join("s1.fixlog"), "s1", 1 << 20, false).unwrap();
        for seq in 1..=5 {
            store.write(&entry(seq, Direction::In)).unwrap();
        }
        let mut seen = Vec::new();
        store.replay(None, None, None, |e| {
            seen.push(e.seq);
            e.seq < 3
        });
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn write_fails_with_log_full_past_max_size() {
        let dir = tempdir().unwrap();
        let mut store = StreamStore::open(&dir.path().join("s1.fixlog"), "s1", 64 + 44, false).unwrap();
        store.write(&entry(1, Direction::In)).unwrap();
        let err = store.write(&entry(2, Direction::In)).unwrap_err();
        assert!(matches!(err, LogError::LogFull { .. }));
    }

    #[test]
    fn reopen_preserves_previously_written_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s1.fixlog");
        {
            let mut store = StreamStore::open(&path, "s1", 1 << 20, true).unwrap();
            store.write(&entry(1, Direction::In)).unwrap();
        }
        let store = StreamStore::open(&path, "s1", 1 << 20, true).unwrap();
        assert_eq!(store.entry_count(), 1);
        assert_eq!(store.get_latest(None).unwrap().seq, 1);
    }

    #[test]
    fn log_store_sanitizes_stream_names_into_file_names() {
        let dir = tempdir().unwrap();
        let mut log_store = LogStore::new(dir.path(), 1 << 20, false);
        log_store.write("CLIENT->SERVER", &entry(1, Direction::Out)).unwrap();
        assert!(dir.path().join("CLIENT-_SERVER.fixlog").exists());
    }
}
