//! Instance engine: one IVF-Flat index made durable by a snapshot plus
//! an operation log, with a buffer log that absorbs writes while a backup
//! snapshot is being written.
//!
//! Layout of one instance:
//!
//! ```text
//! <data_dir>/<version>/FIF          snapshot
//! <data_dir>/<version>/AOF          primary log
//! <data_dir>/<version>/BUFFER       buffer log
//! <data_dir>/<version>/data/*.arr   content files
//! ```
//!
//! Lock order is always `state` before `index`. Searches take only an
//! `index` read lock, so they keep running during a backup.

pub mod mode;
pub mod version;

pub use mode::WriteMode;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::aof::writer::{remove_log, write_synced};
use crate::aof::{AofReader, AofWriter, LogTarget, Operation};
use crate::error::{AntError, Result};
use crate::index::ivf_flat::build::validate_batch;
use crate::index::IvfFlatIndex;
use crate::snapshot;
use crate::types::{InstanceInfo, InstanceParams, SearchResult, VectorId};

/// Presence of ids touched by buffered writes, layered over the frozen
/// index so buffered writes are validated as if already applied.
#[derive(Debug, Default)]
struct IdOverlay {
    built: bool,
    present: HashMap<VectorId, bool>,
}

impl IdOverlay {
    fn contains(&self, index: Option<&IvfFlatIndex>, id: VectorId) -> bool {
        match self.present.get(&id) {
            Some(&present) => present,
            None => index.map_or(false, |i| i.contains(id)),
        }
    }

    fn record(&mut self, op: &Operation) {
        let present = !matches!(op, Operation::Remove { .. });
        if matches!(op, Operation::Build { .. }) {
            self.built = true;
        }
        for &id in op.ids() {
            self.present.insert(id, present);
        }
    }
}

#[derive(Debug)]
struct BufferState {
    /// Version directory holding the buffer log.
    version: String,
    overlay: IdOverlay,
    /// Set when the buffering was started by `backup`.
    backup: bool,
}

#[derive(Debug)]
enum Routing {
    Normal,
    Replay,
    Buffering(BufferState),
}

impl Routing {
    fn mode(&self) -> WriteMode {
        match self {
            Routing::Normal => WriteMode::Normal,
            Routing::Replay => WriteMode::Replay,
            Routing::Buffering(_) => WriteMode::Buffering,
        }
    }
}

#[derive(Debug)]
struct WriteState {
    routing: Routing,
    version: String,
    /// Operations in the current version's primary log.
    primary_ops: usize,
    /// Set once the instance's directory has been deleted.
    closed: bool,
}

impl WriteState {
    fn ensure_open(&self, data_dir: &Path) -> Result<()> {
        if self.closed {
            return Err(AntError::InstanceNotFound {
                name: data_dir
                    .file_name()
                    .map_or_else(String::new, |n| n.to_string_lossy().into_owned()),
            });
        }
        Ok(())
    }
}

pub struct Instance {
    data_dir: PathBuf,
    params: InstanceParams,
    state: Mutex<WriteState>,
    index: RwLock<Option<IvfFlatIndex>>,
}

impl Instance {
    /// Open an unbuilt instance on `data_dir/version`.
    ///
    /// `data_dir` must exist. The version directory is created if needed.
    /// Call [`Instance::rebuild`] to recover persisted state.
    pub fn open(data_dir: impl AsRef<Path>, version: &str, params: InstanceParams) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        if !data_dir.is_dir() {
            return Err(AntError::DirectoryNotFound { path: data_dir });
        }
        if params.dim == 0 {
            return Err(AntError::Validation("dim must be > 0".into()));
        }
        if params.nlist == 0 {
            return Err(AntError::Validation("nlist must be > 0".into()));
        }
        if !version::is_version_name(version) {
            return Err(AntError::Validation(format!(
                "invalid version name '{version}'"
            )));
        }
        fs::create_dir_all(data_dir.join(version).join(&params.dumps_dir))?;

        Ok(Self {
            data_dir,
            params,
            state: Mutex::new(WriteState {
                routing: Routing::Normal,
                version: version.to_string(),
                primary_ops: 0,
                closed: false,
            }),
            index: RwLock::new(None),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn params(&self) -> &InstanceParams {
        &self.params
    }

    pub fn version(&self) -> String {
        self.state.lock().version.clone()
    }

    pub fn mode(&self) -> WriteMode {
        self.state.lock().routing.mode()
    }

    /// `(memory_lock, aof_lock)`.
    pub fn locks(&self) -> (bool, bool) {
        self.mode().locks()
    }

    pub fn is_built(&self) -> bool {
        self.index.read().is_some()
    }

    /// Vectors in the live index; 0 when unbuilt.
    pub fn count(&self) -> usize {
        self.index.read().as_ref().map_or(0, |i| i.count())
    }

    pub fn contains(&self, id: VectorId) -> bool {
        self.index.read().as_ref().map_or(false, |i| i.contains(id))
    }

    pub fn ids(&self) -> Result<Vec<VectorId>> {
        let index = self.index.read();
        Ok(index.as_ref().ok_or(AntError::NotBuilt)?.ids())
    }

    pub fn get_info(&self) -> InstanceInfo {
        let state = self.state.lock();
        let index = self.index.read();
        let (memory_lock, aof_lock) = state.routing.mode().locks();
        InstanceInfo {
            count: index.as_ref().map_or(0, |i| i.count()),
            built: index.is_some(),
            data_dir: self.data_dir.display().to_string(),
            version: state.version.clone(),
            memory_lock,
            aof_lock,
            params: self.params.clone(),
        }
    }

    /// Train the index on `vectors` and add them. Allowed once.
    pub fn build(&self, vectors: Vec<Vec<f32>>, ids: Vec<VectorId>) -> Result<()> {
        self.mutate(Operation::Build { vectors, ids })
    }

    pub fn insert(&self, vectors: Vec<Vec<f32>>, ids: Vec<VectorId>) -> Result<()> {
        self.mutate(Operation::Insert { vectors, ids })
    }

    /// Replace the vectors stored under `ids`; absent ids are added.
    pub fn update(&self, vectors: Vec<Vec<f32>>, ids: Vec<VectorId>) -> Result<()> {
        self.mutate(Operation::Update { vectors, ids })
    }

    /// Remove `ids`. Absent ids are ignored.
    pub fn remove(&self, ids: Vec<VectorId>) -> Result<()> {
        self.mutate(Operation::Remove { ids })
    }

    pub fn search(
        &self,
        queries: &[Vec<f32>],
        top_k: usize,
        nprobe: usize,
    ) -> Result<Vec<Vec<SearchResult>>> {
        let index = self.index.read();
        index
            .as_ref()
            .ok_or(AntError::NotBuilt)?
            .search(queries, top_k, nprobe)
    }

    /// Snapshot the live index into the current version directory.
    ///
    /// The snapshot records how much of the primary log it covers, so a
    /// later rebuild replays only the remainder.
    #[instrument(skip(self))]
    pub fn save(&self) -> Result<()> {
        let state = self.state.lock();
        state.ensure_open(&self.data_dir)?;
        let index = self.index.read();
        let index = index.as_ref().ok_or(AntError::NotBuilt)?;
        let path = self.version_dir(&state.version).join(&self.params.fif);
        snapshot::save(&path, index, state.primary_ops)
    }

    /// Switch the write mode.
    ///
    /// Entering `Buffering` sends writes to the current version's buffer
    /// log. Leaving it is only possible towards `Normal` and replays the
    /// buffer into the live index. A backup's buffering cannot be changed.
    pub fn set_mode(&self, mode: WriteMode) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open(&self.data_dir)?;
        if let Routing::Buffering(buffer) = &state.routing {
            if buffer.backup {
                return Err(AntError::BackupInProgress {
                    version: buffer.version.clone(),
                });
            }
        }

        match (state.routing.mode(), mode) {
            (current, target) if current == target => Ok(()),
            (WriteMode::Buffering, WriteMode::Normal) => {
                state.routing = Routing::Normal;
                let dir = self.version_dir(&state.version);
                let mut index = self.index.write();
                let drained = self.drain_buffer(&mut state, &mut index, &dir)?;
                info!(drained, "left buffering mode");
                Ok(())
            }
            (WriteMode::Buffering, WriteMode::Replay) => {
                let (memory_lock, aof_lock) = mode.locks();
                Err(AntError::InvalidLockState {
                    memory_lock,
                    aof_lock,
                })
            }
            (_, WriteMode::Buffering) => {
                state.routing = Routing::Buffering(BufferState {
                    version: state.version.clone(),
                    overlay: IdOverlay::default(),
                    backup: false,
                });
                debug!("entered buffering mode");
                Ok(())
            }
            (_, WriteMode::Normal) => {
                state.routing = Routing::Normal;
                Ok(())
            }
            (_, WriteMode::Replay) => {
                state.routing = Routing::Replay;
                Ok(())
            }
        }
    }

    /// `set_mode` in terms of the lock pair. `(true, false)` is rejected.
    pub fn set_locks(&self, memory_lock: bool, aof_lock: bool) -> Result<()> {
        self.set_mode(WriteMode::from_locks(memory_lock, aof_lock)?)
    }

    /// Recover the live index of the current version: snapshot (if any),
    /// then the primary log tail, then any buffer log left by an
    /// interrupted backup.
    #[instrument(skip(self), fields(version = %self.version()))]
    pub fn rebuild(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open(&self.data_dir)?;
        if let Routing::Buffering(buffer) = &state.routing {
            return Err(AntError::BackupInProgress {
                version: buffer.version.clone(),
            });
        }
        let current = state.version.clone();
        let dir = self.version_dir(&current);
        let mut index = self.index.write();
        *index = None;

        let mut offset = 0;
        let fif = dir.join(&self.params.fif);
        if fif.exists() {
            let snap = snapshot::load(&fif)?;
            if snap.index.dimension() != self.params.dim || snap.index.nlist() != self.params.nlist {
                return Err(AntError::CorruptSnapshot {
                    path: fif,
                    reason: format!(
                        "snapshot has dim={} nlist={}, instance expects dim={} nlist={}",
                        snap.index.dimension(),
                        snap.index.nlist(),
                        self.params.dim,
                        self.params.nlist
                    ),
                });
            }
            offset = snap.log_offset;
            if snap.index.is_trained() {
                *index = Some(snap.index);
            }
        }

        state.routing = Routing::Replay;
        let replayed = self
            .reader(&dir, LogTarget::Primary)
            .replay(offset, |op| self.apply(&mut state, &mut index, op));
        state.routing = Routing::Normal;
        state.primary_ops = replayed?;

        let drained = self.drain_buffer(&mut state, &mut index, &dir)?;

        for newer in version::list_versions(&self.data_dir)? {
            if version::compare(&newer, &current) != Ordering::Greater {
                continue;
            }
            let newer_dir = self.version_dir(&newer);
            let adopted = self.drain_buffer(&mut state, &mut index, &newer_dir)?;
            fs::remove_dir_all(&newer_dir)?;
            warn!(version = %newer, adopted, "discarded unfinished backup version");
        }

        info!(
            count = index.as_ref().map_or(0, |i| i.count()),
            snapshot_offset = offset,
            primary_ops = state.primary_ops,
            drained,
            "rebuilt instance"
        );
        Ok(())
    }

    /// Produce a new version without blocking writers.
    ///
    /// Writes are buffered into the new version's buffer log while the
    /// frozen index is snapshotted there. `commit` is called with the new
    /// version once the snapshot is durable; when it succeeds the instance
    /// moves to the new version. Either way the buffer is then replayed
    /// into the live index and the primary log of whichever version is
    /// current. Returns the new version.
    #[instrument(skip(self, commit))]
    pub fn backup<F>(&self, commit: F) -> Result<String>
    where
        F: FnOnce(&str) -> Result<()>,
    {
        let (old_version, new_version) = {
            let mut state = self.state.lock();
            state.ensure_open(&self.data_dir)?;
            match &state.routing {
                Routing::Normal => {}
                Routing::Buffering(buffer) => {
                    return Err(AntError::BackupInProgress {
                        version: buffer.version.clone(),
                    })
                }
                Routing::Replay => {
                    return Err(AntError::Validation(
                        "backup requires normal write mode".into(),
                    ))
                }
            }
            if self.index.read().is_none() {
                return Err(AntError::NotBuilt);
            }

            let new_version = version::next_version(Some(&state.version));
            fs::create_dir_all(self.version_dir(&new_version).join(&self.params.dumps_dir))?;
            state.routing = Routing::Buffering(BufferState {
                version: new_version.clone(),
                overlay: IdOverlay::default(),
                backup: true,
            });
            (state.version.clone(), new_version)
        };
        info!(from = %old_version, to = %new_version, "backup started, buffering writes");

        let new_dir = self.version_dir(&new_version);
        let snapshotted = {
            let index = self.index.read();
            match index.as_ref() {
                Some(index) => snapshot::save(&new_dir.join(&self.params.fif), index, 0),
                None => Err(AntError::NotBuilt),
            }
        };

        let mut state = self.state.lock();
        state.routing = Routing::Normal;
        // Deleted while snapshotting: the buffered writes went with it.
        state.ensure_open(&self.data_dir)?;
        let committed = snapshotted.and_then(|()| commit(&new_version));
        let mut index = self.index.write();

        match committed {
            Ok(()) => {
                state.version = new_version.clone();
                state.primary_ops = 0;
                let drained = self.drain_buffer(&mut state, &mut index, &new_dir)?;
                crate::metrics::BACKUPS_TOTAL
                    .with_label_values(&["success"])
                    .inc();
                info!(version = %new_version, drained, "backup committed");
                Ok(new_version)
            }
            Err(e) => {
                warn!(version = %old_version, error = %e, "backup failed, keeping current version");
                let drained = self.drain_buffer(&mut state, &mut index, &new_dir)?;
                fs::remove_dir_all(&new_dir)?;
                crate::metrics::BACKUPS_TOTAL
                    .with_label_values(&["failure"])
                    .inc();
                debug!(drained, "replayed buffered writes into current version");
                Err(e)
            }
        }
    }

    /// Close the instance and delete its directory.
    ///
    /// Runs under the write-state lock, so an in-flight mutation or drain
    /// finishes first. Every later write, save, rebuild or backup through
    /// a retained handle fails with `InstanceNotFound`. Searches keep
    /// answering from memory until the last handle is dropped.
    #[instrument(skip(self), fields(data_dir = %self.data_dir.display()))]
    pub fn destroy(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open(&self.data_dir)?;
        state.closed = true;
        match fs::remove_dir_all(&self.data_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!("instance closed and removed");
        Ok(())
    }

    #[instrument(skip(self, op), fields(command = %op.command(), count = op.ids().len()))]
    fn mutate(&self, op: Operation) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open(&self.data_dir)?;
        if let Routing::Buffering(buffer) = &mut state.routing {
            return self.buffer_write(buffer, op);
        }
        let mut index = self.index.write();
        self.apply(&mut state, &mut index, op)
    }

    /// Validate, log (in `Normal`) and apply one operation.
    fn apply(
        &self,
        state: &mut WriteState,
        index: &mut Option<IvfFlatIndex>,
        op: Operation,
    ) -> Result<()> {
        {
            let live = index.as_ref();
            self.check(live.is_some(), |id| live.map_or(false, |i| i.contains(id)), &op)?;
        }
        if is_noop(&op) {
            return Ok(());
        }

        if let Routing::Normal = state.routing {
            self.writer(&state.version, LogTarget::Primary).append(&op)?;
            state.primary_ops += 1;
        }

        match op {
            Operation::Build { vectors, ids } => {
                let mut fresh = IvfFlatIndex::new(self.params.dim, self.params.nlist);
                fresh.train_and_add(&vectors, &ids, &self.params.kmeans)?;
                *index = Some(fresh);
            }
            Operation::Insert { vectors, ids } => {
                index.as_mut().ok_or(AntError::NotBuilt)?.add(&vectors, &ids)?;
            }
            Operation::Update { vectors, ids } => {
                index
                    .as_mut()
                    .ok_or(AntError::NotBuilt)?
                    .replace(&ids, &vectors)?;
            }
            Operation::Remove { ids } => {
                index.as_mut().ok_or(AntError::NotBuilt)?.remove(&ids);
            }
        }
        Ok(())
    }

    /// Log one operation to the buffer without touching the live index.
    fn buffer_write(&self, buffer: &mut BufferState, op: Operation) -> Result<()> {
        let index = self.index.read();
        let live = index.as_ref();
        let overlay = &buffer.overlay;
        self.check(
            live.is_some() || overlay.built,
            |id| overlay.contains(live, id),
            &op,
        )?;
        if is_noop(&op) {
            return Ok(());
        }

        self.writer(&buffer.version, LogTarget::Buffer).append(&op)?;
        buffer.overlay.record(&op);
        Ok(())
    }

    /// Every check an operation must pass before it is logged, so a logged
    /// operation always applies cleanly.
    fn check(
        &self,
        built: bool,
        contains: impl Fn(VectorId) -> bool,
        op: &Operation,
    ) -> Result<()> {
        let dim = self.params.dim;
        match op {
            Operation::Build { vectors, ids } => {
                if built {
                    return Err(AntError::AlreadyBuilt);
                }
                validate_batch(dim, vectors, ids)?;
                if vectors.len() < self.params.nlist {
                    return Err(AntError::InsufficientData {
                        required: self.params.nlist,
                        actual: vectors.len(),
                    });
                }
            }
            Operation::Insert { vectors, ids } => {
                if !built {
                    return Err(AntError::NotBuilt);
                }
                validate_batch(dim, vectors, ids)?;
                if let Some(&id) = ids.iter().find(|&&id| contains(id)) {
                    return Err(AntError::DuplicateId { id });
                }
            }
            Operation::Update { vectors, ids } => {
                if !built {
                    return Err(AntError::NotBuilt);
                }
                validate_batch(dim, vectors, ids)?;
            }
            Operation::Remove { .. } => {
                if !built {
                    return Err(AntError::NotBuilt);
                }
            }
        }
        Ok(())
    }

    /// Replay the buffer log found in `buffer_dir` into the live index and
    /// the current primary log, then delete it.
    ///
    /// Before the first record is replayed, a marker holding the primary
    /// log's operation count is written next to the buffer. If a drain is
    /// interrupted, the next one skips the records that already reached
    /// the primary log.
    fn drain_buffer(
        &self,
        state: &mut WriteState,
        index: &mut Option<IvfFlatIndex>,
        buffer_dir: &Path,
    ) -> Result<usize> {
        let reader = self.reader(buffer_dir, LogTarget::Buffer);
        let marker = buffer_dir.join(format!("{}.base", self.params.buffer));
        if !reader.exists() {
            remove_log(&marker)?;
            return Ok(0);
        }

        let skip = match read_marker(&marker)? {
            Some(base) => state.primary_ops.saturating_sub(base),
            None => {
                write_marker(&marker, state.primary_ops)?;
                0
            }
        };
        if skip > 0 {
            warn!(skip, path = %reader.path().display(), "resuming interrupted buffer replay");
        }

        let visited = reader.replay(skip, |op| self.apply(state, index, op))?;
        remove_log(reader.path())?;
        remove_log(&marker)?;
        Ok(visited.saturating_sub(skip))
    }

    fn version_dir(&self, version: &str) -> PathBuf {
        self.data_dir.join(version)
    }

    fn writer(&self, version: &str, target: LogTarget) -> AofWriter {
        AofWriter::new(
            &self.version_dir(version),
            self.log_name(target),
            &self.params.dumps_dir,
            target,
        )
    }

    fn reader(&self, version_dir: &Path, target: LogTarget) -> AofReader {
        AofReader::new(version_dir, self.log_name(target), target)
    }

    fn log_name(&self, target: LogTarget) -> &str {
        match target {
            LogTarget::Primary => &self.params.aof,
            LogTarget::Buffer => &self.params.buffer,
        }
    }
}

fn is_noop(op: &Operation) -> bool {
    !matches!(op, Operation::Build { .. }) && op.ids().is_empty()
}

fn read_marker(path: &Path) -> Result<Option<usize>> {
    match fs::read_to_string(path) {
        Ok(text) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AntError::AofCorrupt {
                path: path.to_path_buf(),
                line: 1,
                reason: format!("invalid replay marker '{}'", text.trim()),
            }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_marker(path: &Path, base: usize) -> Result<()> {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    write_synced(&tmp, base.to_string().as_bytes())?;
    fs::rename(&tmp, path)?;
    Ok(())
}
