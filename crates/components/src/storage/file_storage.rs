use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use byteorder::{BigEndian, ByteOrder};
use common::errors::{Error, Result, StorageError};
use common::protos::prelude::{ClusterConfig, Entry, HardState, Message, Snapshot};
use common::storage::{limit_size, RaftState, Storage};
use slog::{debug, info, warn, Logger};

use super::record::{next_record, read_record, write_record, NextRecord, HEADER_SIZE};

const HARD_STATE_FILE: &str = "hard_state";
const CLUSTER_CONFIG_FILE: &str = "cluster_config";
const SNAPSHOT_FILE: &str = "snapshot";
const LOG_FILE: &str = "raft.log";

/// Durable storage kept in one directory:
/// * `hard_state`, `cluster_config` and `snapshot` are single records,
/// replaced atomically (temp file, fsync, rename).
/// * `raft.log` holds one record per entry, appended in index order and
/// cut back with `set_len` when a suffix is overwritten.
///
/// Every write is synced before it returns. Anything on disk that can't
/// be read back exactly is reported as [StorageError::Corrupted].
#[derive(Clone)]
pub struct FileStorage {
    core: Arc<RwLock<FileStorageCore>>,
}

pub struct FileStorageCore {
    dir: PathBuf,
    raft_state: RaftState,
    snapshot: Snapshot,
    /// contiguous, entries[0] is at the first index
    entries: Vec<Entry>,
    /// entry_ends[i] is the byte length of the log file up to entries[i]
    entry_ends: Vec<u64>,
    log: File,
    logger: Logger,
}

impl FileStorage {
    /// Open the storage in `dir`, creating it with `bootstrap` as the
    /// membership if it's a new one.
    pub fn open<P: AsRef<Path>>(dir: P, bootstrap: ClusterConfig, logger: &Logger) -> Result<FileStorage> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let logger = logger.new(slog::o!("storage" => dir.display().to_string()));

        let mut hard_state = match read_file(&dir, HARD_STATE_FILE)? {
            Some(bytes) => HardState::decode(bytes.as_slice()).map_err(undecodable(HARD_STATE_FILE))?,
            None => HardState::default(),
        };
        let snapshot = match read_file(&dir, SNAPSHOT_FILE)? {
            Some(bytes) => Snapshot::decode(bytes.as_slice()).map_err(undecodable(SNAPSHOT_FILE))?,
            None => Snapshot::default(),
        };
        let (mut cluster_config, mut config_index) = match read_file(&dir, CLUSTER_CONFIG_FILE)? {
            Some(bytes) => decode_cluster_config(&bytes)?,
            None => {
                write_file(&dir, CLUSTER_CONFIG_FILE, &encode_cluster_config(&bootstrap, 0))?;
                (bootstrap, 0)
            }
        };

        // an install interrupted after the snapshot landed, finish it.
        let meta = snapshot.get_metadata();
        if meta.index > hard_state.commit {
            warn!(
                logger,
                "hard state is behind the snapshot, catch it up";
                "commit" => hard_state.commit,
                "snapshot index" => meta.index,
            );
            if meta.term > hard_state.term {
                hard_state.term = meta.term;
                hard_state.vote = 0;
            }
            hard_state.commit = meta.index;
            write_file(&dir, HARD_STATE_FILE, &hard_state.encode_to_vec())?;
        }
        if let Some(config) = meta.config.as_ref() {
            if meta.index > config_index && *config != cluster_config {
                warn!(
                    logger,
                    "membership is behind the snapshot, take the snapshot's";
                    "config index" => config_index,
                    "snapshot index" => meta.index,
                );
                write_file(&dir, CLUSTER_CONFIG_FILE, &encode_cluster_config(config, meta.index))?;
                cluster_config = config.clone();
                config_index = meta.index;
            }
        }

        let log_path = dir.join(LOG_FILE);
        let (entries, entry_ends) = load_log(&log_path, meta.index, meta.term, &logger)?;
        let log = OpenOptions::new().create(true).read(true).append(true).open(&log_path)?;

        info!(
            logger,
            "opened file storage";
            "term" => hard_state.term,
            "commit" => hard_state.commit,
            "snapshot index" => snapshot.get_metadata().index,
            "entries" => entries.len(),
            "config" => %cluster_config,
        );
        let core = FileStorageCore {
            dir,
            raft_state: RaftState::new(hard_state, cluster_config, config_index),
            snapshot,
            entries,
            entry_ends,
            log,
            logger,
        };
        Ok(FileStorage {
            core: Arc::new(RwLock::new(core)),
        })
    }

    pub fn rl(&self) -> RwLockReadGuard<'_, FileStorageCore> {
        self.core.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn wl(&self) -> RwLockWriteGuard<'_, FileStorageCore> {
        self.core.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FileStorageCore {
    #[inline]
    pub fn hard_state(&self) -> &HardState {
        &self.raft_state.hard_state
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn first_index(&self) -> u64 {
        match self.entries.first() {
            Some(entry) => entry.index,
            None => self.snapshot.get_metadata().index + 1,
        }
    }

    fn last_index(&self) -> u64 {
        match self.entries.last() {
            Some(entry) => entry.index,
            None => self.snapshot.get_metadata().index,
        }
    }

    fn term(&self, index: u64) -> Result<u64> {
        let meta = self.snapshot.get_metadata();
        if index == meta.index {
            return Ok(meta.term);
        }
        let offset = self.first_index();
        if index < offset {
            return Err(Error::Store(StorageError::Compacted));
        } else if index > self.last_index() {
            return Err(Error::Store(StorageError::Unavailable));
        }
        Ok(self.entries[(index - offset) as usize].term)
    }

    fn set_hard_state(&mut self, hard_state: HardState) -> Result<()> {
        write_file(&self.dir, HARD_STATE_FILE, &hard_state.encode_to_vec())?;
        self.raft_state.hard_state = hard_state;
        Ok(())
    }

    fn set_cluster_config(&mut self, config: ClusterConfig, index: u64) -> Result<()> {
        write_file(&self.dir, CLUSTER_CONFIG_FILE, &encode_cluster_config(&config, index))?;
        self.raft_state.cluster_config = config;
        self.raft_state.config_index = index;
        Ok(())
    }

    /// Cut the log file (and the cache) back to the first `keep` entries.
    fn truncate_log(&mut self, keep: usize) -> Result<()> {
        let len = if keep == 0 { 0 } else { self.entry_ends[keep - 1] };
        self.log.set_len(len)?;
        self.log.sync_all()?;
        self.entries.truncate(keep);
        self.entry_ends.truncate(keep);
        Ok(())
    }

    fn append(&mut self, ents: &[Entry]) -> Result<()> {
        if ents.is_empty() {
            return Ok(());
        }
        if self.first_index() > ents[0].index {
            panic!(
                "overwrite compacted raft logs, compacted: {}, append: {}",
                self.first_index() - 1,
                ents[0].index,
            );
        }
        if self.last_index() + 1 < ents[0].index {
            panic!(
                "raft logs should be continuous, last index: {}, new appended: {}",
                self.last_index(),
                ents[0].index,
            );
        }

        let keep = (ents[0].index - self.first_index()) as usize;
        if keep < self.entries.len() {
            debug!(self.logger, "truncate conflicting log suffix"; "from" => ents[0].index);
            self.truncate_log(keep)?;
        }

        let mut end = self.entry_ends.last().copied().unwrap_or(0);
        let mut buf = Vec::new();
        let mut ends = Vec::with_capacity(ents.len());
        for entry in ents {
            end += write_record(&mut buf, &entry.encode_to_vec())?;
            ends.push(end);
        }
        self.log.write_all(&buf)?;
        self.log.sync_all()?;
        self.entries.extend_from_slice(ents);
        self.entry_ends.extend(ends);
        Ok(())
    }

    fn apply_snapshot(&mut self, snapshot: Snapshot) -> Result<()> {
        let meta = snapshot.get_metadata();
        let index = meta.index;
        if self.snapshot.get_metadata().index > index {
            return Err(Error::Store(StorageError::SnapshotOutOfDate));
        }

        // the snapshot goes first, a log left behind is dropped on reopen.
        write_file(&self.dir, SNAPSHOT_FILE, &snapshot.encode_to_vec())?;
        let mut hard_state = self.raft_state.hard_state.clone();
        if meta.term > hard_state.term {
            hard_state.term = meta.term;
            hard_state.vote = 0;
        }
        hard_state.commit = index;
        self.set_hard_state(hard_state)?;
        if let Some(config) = meta.config.clone() {
            self.set_cluster_config(config, index)?;
        }
        self.snapshot = snapshot;
        self.truncate_log(0)
    }

    fn create_snapshot(&mut self, index: u64, data: Vec<u8>) -> Result<Snapshot> {
        if index <= self.snapshot.get_metadata().index {
            return Err(Error::Store(StorageError::SnapshotOutOfDate));
        }
        if index > self.raft_state.hard_state.commit {
            panic!(
                "snapshot index {} is larger than commit {}",
                index, self.raft_state.hard_state.commit
            );
        }
        let term = self.term(index)?;
        let config = Some(self.raft_state.cluster_config.clone());
        let snapshot = Snapshot::new(index, term, config, data);
        write_file(&self.dir, SNAPSHOT_FILE, &snapshot.encode_to_vec())?;
        self.snapshot = snapshot.clone();
        Ok(snapshot)
    }

    /// Rewrite the log without the entries below `compact_index`.
    fn compact(&mut self, compact_index: u64) -> Result<()> {
        if compact_index <= self.first_index() {
            return Ok(());
        }
        if compact_index > self.snapshot.get_metadata().index + 1 {
            return Err(Error::Store(StorageError::Unavailable));
        }
        let drop = ((compact_index - self.first_index()) as usize).min(self.entries.len());
        let remain = self.entries.split_off(drop);

        let mut buf = Vec::new();
        let mut ends = Vec::with_capacity(remain.len());
        let mut end = 0;
        for entry in remain.iter() {
            end += write_record(&mut buf, &entry.encode_to_vec())?;
            ends.push(end);
        }
        let tmp = self.dir.join(format!("{}.tmp", LOG_FILE));
        let mut file = File::create(&tmp)?;
        file.write_all(&buf)?;
        file.sync_all()?;
        let log_path = self.dir.join(LOG_FILE);
        fs::rename(&tmp, &log_path)?;
        sync_dir(&self.dir)?;

        self.log = OpenOptions::new().read(true).append(true).open(&log_path)?;
        self.entries = remain;
        self.entry_ends = ends;
        debug!(self.logger, "compacted log"; "first index" => self.first_index());
        Ok(())
    }
}

impl Storage for FileStorage {
    fn initial_state(&self) -> Result<RaftState> {
        Ok(self.rl().raft_state.clone())
    }

    fn entries(&self, low: u64, high: u64, max_size: Option<u64>) -> Result<Vec<Entry>> {
        let core = self.rl();
        if low < core.first_index() {
            return Err(Error::Store(StorageError::Compacted));
        }
        if high > core.last_index() + 1 {
            panic!(
                "index out of bound (last: {}, high: {})",
                core.last_index() + 1,
                high
            );
        }
        if low >= high {
            return Ok(Vec::new());
        }
        let offset = core.first_index();
        let mut result = core.entries[(low - offset) as usize..(high - offset) as usize].to_vec();
        limit_size(&mut result, max_size);
        Ok(result)
    }

    fn term(&self, index: u64) -> Result<u64> {
        self.rl().term(index)
    }

    fn first_index(&self) -> Result<u64> {
        Ok(self.rl().first_index())
    }

    fn last_index(&self) -> Result<u64> {
        Ok(self.rl().last_index())
    }

    fn snapshot(&self, request_index: u64) -> Result<Snapshot> {
        let core = self.rl();
        if core.snapshot.get_metadata().index < request_index {
            return Err(Error::Store(StorageError::SnapshotTemporarilyUnavailable));
        }
        Ok(core.snapshot.clone())
    }

    fn append(&self, entries: &[Entry]) -> Result<()> {
        self.wl().append(entries)
    }

    fn set_hard_state(&self, hard_state: HardState) -> Result<()> {
        self.wl().set_hard_state(hard_state)
    }

    fn set_cluster_config(&self, config: ClusterConfig, index: u64) -> Result<()> {
        self.wl().set_cluster_config(config, index)
    }

    fn apply_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        self.wl().apply_snapshot(snapshot)
    }

    fn create_snapshot(&self, index: u64, data: Vec<u8>) -> Result<Snapshot> {
        self.wl().create_snapshot(index, data)
    }

    fn compact(&self, compact_index: u64) -> Result<()> {
        self.wl().compact(compact_index)
    }
}

fn undecodable(file: &'static str) -> impl Fn(common::protos::prelude::prost::DecodeError) -> Error {
    move |err| Error::Store(StorageError::corrupted(format!("undecodable {}: {}", file, err)))
}

fn encode_cluster_config(config: &ClusterConfig, index: u64) -> Vec<u8> {
    let mut payload = vec![0; 8];
    BigEndian::write_u64(&mut payload, index);
    payload.extend(config.to_bytes());
    payload
}

fn decode_cluster_config(payload: &[u8]) -> Result<(ClusterConfig, u64)> {
    if payload.len() < 8 {
        return Err(Error::Store(StorageError::corrupted("cluster config record too short")));
    }
    let index = BigEndian::read_u64(&payload[..8]);
    let config = ClusterConfig::from_bytes(&payload[8..]).map_err(undecodable(CLUSTER_CONFIG_FILE))?;
    Ok((config, index))
}

/// Read back the log. A record cut short at the tail was never synced, so
/// never acknowledged, and is cut off. A log that doesn't reach the snapshot,
/// or disagrees with it, was left behind by an interrupted snapshot install
/// and is dropped.
fn load_log(
    path: &Path,
    snapshot_index: u64,
    snapshot_term: u64,
    logger: &Logger,
) -> Result<(Vec<Entry>, Vec<u64>)> {
    let (mut entries, mut ends): (Vec<Entry>, Vec<u64>) = (Vec::new(), Vec::new());
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok((entries, ends)),
        Err(err) => return Err(Error::Io(err)),
    };
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let mut end = 0;
    loop {
        let payload = match next_record(&mut reader, file_len - end)? {
            NextRecord::Record(payload) => payload,
            NextRecord::End => break,
            NextRecord::Torn => {
                warn!(
                    logger,
                    "cut off a torn record at the end of the log";
                    "offset" => end,
                    "bytes" => file_len - end,
                );
                let file = OpenOptions::new().write(true).open(path)?;
                file.set_len(end)?;
                file.sync_all()?;
                break;
            }
        };
        end += (HEADER_SIZE + payload.len()) as u64;
        let entry = Entry::decode(payload.as_slice()).map_err(undecodable(LOG_FILE))?;
        if let Some(last) = entries.last() {
            if entry.index != last.index + 1 {
                return Err(Error::Store(StorageError::corrupted(format!(
                    "log has a gap, expected index {} found {}",
                    last.index + 1,
                    entry.index
                ))));
            }
        }
        entries.push(entry);
        ends.push(end);
    }

    let (first, last) = match (entries.first(), entries.last()) {
        (Some(first), Some(last)) => (first.index, last.index),
        _ => return Ok((entries, ends)),
    };
    if first > snapshot_index + 1 {
        return Err(Error::Store(StorageError::corrupted(format!(
            "log starts at {} but the snapshot ends at {}",
            first, snapshot_index
        ))));
    }
    let disagrees = first <= snapshot_index
        && snapshot_index <= last
        && entries[(snapshot_index - first) as usize].term != snapshot_term;
    if last < snapshot_index || disagrees {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(0)?;
        file.sync_all()?;
        entries.clear();
        ends.clear();
    }
    Ok((entries, ends))
}

fn read_file(dir: &Path, name: &str) -> Result<Option<Vec<u8>>> {
    let bytes = match fs::read(dir.join(name)) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(Error::Io(err)),
    };
    let mut reader = bytes.as_slice();
    let payload = match read_record(&mut reader, bytes.len() as u64)? {
        Some(payload) => payload,
        None => return Err(Error::Store(StorageError::corrupted(format!("{} is empty", name)))),
    };
    if !reader.is_empty() {
        return Err(Error::Store(StorageError::corrupted(format!("trailing data in {}", name))));
    }
    Ok(Some(payload))
}

/// Replace `name` in `dir` with a single record of `payload`.
fn write_file(dir: &Path, name: &str, payload: &[u8]) -> Result<()> {
    let tmp = dir.join(format!("{}.tmp", name));
    let mut file = File::create(&tmp)?;
    write_record(&mut file, payload)?;
    file.sync_all()?;
    fs::rename(&tmp, dir.join(name))?;
    sync_dir(dir)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;
    use std::io::{Seek, SeekFrom, Write};

    use common::errors::{Error, StorageError};
    use common::logger::discard;
    use common::protos::prelude::*;
    use common::storage::Storage;
    use tempfile::tempdir;

    use super::{FileStorage, LOG_FILE};

    fn entries(from: u64, to: u64, term: u64) -> Vec<Entry> {
        (from..to)
            .map(|index| Entry::new(EntryType::EntryNormal, term, index, vec![index as u8; 3]))
            .collect()
    }

    fn open(dir: &std::path::Path) -> common::errors::Result<FileStorage> {
        FileStorage::open(dir, ClusterConfig::with_voters(&[1, 2, 3]), &discard())
    }

    #[test]
    fn test_fresh_directory() {
        let dir = tempdir().unwrap();
        let storage = open(dir.path()).unwrap();
        let state = storage.initial_state().unwrap();
        assert_eq!(state.hard_state, HardState::default());
        assert_eq!(state.cluster_config, ClusterConfig::with_voters(&[1, 2, 3]));
        assert_eq!(state.config_index, 0);
        assert_eq!(storage.first_index().unwrap(), 1);
        assert_eq!(storage.last_index().unwrap(), 0);
        assert_eq!(storage.term(0).unwrap(), 0);
    }

    #[test]
    fn test_reopen_round_trip() {
        let dir = tempdir().unwrap();
        let config = ClusterConfig::with_voters(&[1, 2, 3, 4]);
        {
            let storage = open(dir.path()).unwrap();
            storage.append(&entries(1, 6, 1)).unwrap();
            storage.set_hard_state(HardState::new(2, 3, 4)).unwrap();
            storage.set_cluster_config(config.clone(), 3).unwrap();
        }
        let storage = open(dir.path()).unwrap();
        let state = storage.initial_state().unwrap();
        assert_eq!(state.hard_state, HardState::new(2, 3, 4));
        assert_eq!(state.cluster_config, config);
        assert_eq!(state.config_index, 3);
        assert_eq!(storage.entries(1, 6, None).unwrap(), entries(1, 6, 1));
    }

    #[test]
    fn test_overwrite_suffix() {
        let dir = tempdir().unwrap();
        {
            let storage = open(dir.path()).unwrap();
            storage.append(&entries(1, 6, 1)).unwrap();
            storage.append(&entries(4, 5, 2)).unwrap();
            assert_eq!(storage.last_index().unwrap(), 4);
            assert_eq!(storage.term(4).unwrap(), 2);
            storage.append(&entries(5, 7, 2)).unwrap();
        }
        let storage = open(dir.path()).unwrap();
        let terms: Vec<u64> = storage
            .entries(1, 7, None)
            .unwrap()
            .iter()
            .map(|entry| entry.term)
            .collect();
        assert_eq!(terms, vec![1, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn test_snapshot_and_compact() {
        let dir = tempdir().unwrap();
        {
            let storage = open(dir.path()).unwrap();
            storage.append(&entries(1, 11, 1)).unwrap();
            storage.set_hard_state(HardState::new(1, 1, 8)).unwrap();
            let snapshot = storage.create_snapshot(8, b"image".to_vec()).unwrap();
            assert_eq!(snapshot.get_metadata().index, 8);
            storage.compact(9).unwrap();
            assert_eq!(storage.first_index().unwrap(), 9);
            assert_eq!(
                storage.entries(5, 9, None),
                Err(Error::Store(StorageError::Compacted))
            );
            assert_eq!(
                storage.snapshot(9),
                Err(Error::Store(StorageError::SnapshotTemporarilyUnavailable))
            );
            assert_eq!(
                storage.create_snapshot(7, vec![]),
                Err(Error::Store(StorageError::SnapshotOutOfDate))
            );
            storage.append(&entries(11, 12, 2)).unwrap();
        }
        let storage = open(dir.path()).unwrap();
        assert_eq!(storage.first_index().unwrap(), 9);
        assert_eq!(storage.last_index().unwrap(), 11);
        assert_eq!(storage.term(8).unwrap(), 1);
        let snapshot = storage.snapshot(0).unwrap();
        assert_eq!(snapshot.data, b"image".to_vec());
        assert_eq!(
            snapshot.get_metadata().config,
            Some(ClusterConfig::with_voters(&[1, 2, 3]))
        );
    }

    #[test]
    fn test_apply_snapshot() {
        let dir = tempdir().unwrap();
        let config = ClusterConfig::with_voters(&[2, 3, 4]);
        {
            let storage = open(dir.path()).unwrap();
            storage.append(&entries(1, 4, 1)).unwrap();
            storage.set_hard_state(HardState::new(1, 0, 2)).unwrap();
            let snapshot = Snapshot::new(20, 3, Some(config.clone()), b"leader".to_vec());
            storage.apply_snapshot(snapshot).unwrap();
            let stale = Snapshot::new(10, 2, None, vec![]);
            assert_eq!(
                storage.apply_snapshot(stale),
                Err(Error::Store(StorageError::SnapshotOutOfDate))
            );
        }
        let storage = open(dir.path()).unwrap();
        let state = storage.initial_state().unwrap();
        assert_eq!(state.hard_state, HardState::new(3, 0, 20));
        assert_eq!((state.cluster_config, state.config_index), (config, 20));
        assert_eq!(storage.first_index().unwrap(), 21);
        assert_eq!(storage.last_index().unwrap(), 20);
    }

    #[test]
    fn test_refuse_corrupted_log() {
        let dir = tempdir().unwrap();
        {
            let storage = open(dir.path()).unwrap();
            storage.append(&entries(1, 4, 1)).unwrap();
        }
        let log_path = dir.path().join(LOG_FILE);
        let mut file = OpenOptions::new().write(true).open(&log_path).unwrap();
        // flip a byte of the last entry's payload.
        let len = file.metadata().unwrap().len();
        file.seek(SeekFrom::Start(len - 1)).unwrap();
        file.write_all(&[0xee]).unwrap();
        file.sync_all().unwrap();
        assert!(matches!(
            open(dir.path()),
            Err(Error::Store(StorageError::Corrupted(_)))
        ));
    }

    #[test]
    fn test_torn_tail_is_cut_off() {
        let dir = tempdir().unwrap();
        let intact = {
            let storage = open(dir.path()).unwrap();
            storage.append(&entries(1, 3, 1)).unwrap();
            let intact = std::fs::metadata(dir.path().join(LOG_FILE)).unwrap().len();
            storage.append(&entries(3, 4, 1)).unwrap();
            intact
        };
        // the last append was cut in the middle of its payload.
        let log_path = dir.path().join(LOG_FILE);
        let len = std::fs::metadata(&log_path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&log_path).unwrap();
        file.set_len(len - 2).unwrap();
        drop(file);

        let storage = open(dir.path()).unwrap();
        assert_eq!(storage.last_index().unwrap(), 2);
        assert_eq!(storage.entries(1, 3, None).unwrap(), entries(1, 3, 1));
        assert_eq!(std::fs::metadata(&log_path).unwrap().len(), intact);
        storage.append(&entries(3, 5, 2)).unwrap();
        drop(storage);

        // or in the middle of its header.
        let file = OpenOptions::new().append(true).open(&log_path).unwrap();
        (&file).write_all(&[0, 0, 0]).unwrap();
        drop(file);
        let storage = open(dir.path()).unwrap();
        assert_eq!(storage.last_index().unwrap(), 4);
        assert_eq!(storage.term(4).unwrap(), 2);
    }

    #[test]
    fn test_interrupted_snapshot_install() {
        let dir = tempdir().unwrap();
        let config = ClusterConfig::with_voters(&[2, 3, 4]);
        let (hard_state_before, config_before) = {
            let storage = open(dir.path()).unwrap();
            storage.append(&entries(1, 4, 1)).unwrap();
            storage.set_hard_state(HardState::new(1, 0, 2)).unwrap();
            let hard_state = std::fs::read(dir.path().join("hard_state")).unwrap();
            let cluster_config = std::fs::read(dir.path().join("cluster_config")).unwrap();
            let snapshot = Snapshot::new(20, 3, Some(config.clone()), b"leader".to_vec());
            storage.apply_snapshot(snapshot).unwrap();
            (hard_state, cluster_config)
        };
        // the crash came right after the snapshot file was renamed in.
        std::fs::write(dir.path().join("hard_state"), hard_state_before).unwrap();
        std::fs::write(dir.path().join("cluster_config"), config_before).unwrap();

        let storage = open(dir.path()).unwrap();
        let state = storage.initial_state().unwrap();
        assert_eq!(state.hard_state, HardState::new(3, 0, 20));
        assert_eq!((state.cluster_config.clone(), state.config_index), (config.clone(), 20));
        assert_eq!(storage.first_index().unwrap(), 21);
        assert_eq!(storage.last_index().unwrap(), 20);
        drop(storage);

        // what was caught up is on disk as well.
        let storage = open(dir.path()).unwrap();
        let state = storage.initial_state().unwrap();
        assert_eq!(state.hard_state.commit, 20);
        assert_eq!(state.cluster_config, config);
    }

    #[test]
    fn test_refuse_corrupted_hard_state() {
        let dir = tempdir().unwrap();
        {
            let storage = open(dir.path()).unwrap();
            storage.set_hard_state(HardState::new(5, 2, 0)).unwrap();
        }
        std::fs::write(dir.path().join("hard_state"), b"garbage").unwrap();
        assert!(matches!(
            open(dir.path()),
            Err(Error::Store(StorageError::Corrupted(_)))
        ));
    }
}
