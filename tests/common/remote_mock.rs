//! A recording, scriptable stand-in for the remote store.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use stagefs::error::FsError;
use stagefs::remote::{RemoteFs, RemoteStat, RemoteWriter};
use tokio::sync::Semaphore;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOp {
    Stat(String),
    OpenRead(String),
    Create(String),
    Remove(String),
    Chmod(String, u32),
    Chown(String, u32, u32),
    FreeSpace,
    Reset,
}

/// Error class a scripted failure produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedError {
    Transient,
    Denied,
    NotFound,
}

impl ScriptedError {
    fn to_error(self, path: &str) -> FsError {
        match self {
            Self::Transient => FsError::unavailable("connection reset by peer"),
            Self::Denied => FsError::PermissionDenied(path.to_owned()),
            Self::NotFound => FsError::RemoteNotFound(path.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockFile {
    pub data: Vec<u8>,
    pub mode: u32,
}

#[derive(Default)]
struct MockState {
    files: HashMap<String, MockFile>,
    ops: Vec<RemoteOp>,
}

/// In-memory remote store that records every call and can be scripted to
/// fail in targeted places.
pub struct MockRemoteFs {
    state: Arc<Mutex<MockState>>,
    free_space: Mutex<Option<u64>>,
    create_calls: AtomicU32,
    /// First `n` create calls fail with the given class.
    fail_first_creates: Mutex<Option<(u32, ScriptedError)>>,
    /// Per-call (1-based index) create failures.
    create_call_script: Mutex<HashMap<u32, ScriptedError>>,
    fail_stat: AtomicBool,
    fail_open_read: AtomicBool,
    fail_chmod: AtomicBool,
    fail_chown: AtomicBool,
    resets: AtomicU32,
    /// When set, `open_read` parks on the semaphore after recording its op.
    read_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MockRemoteFs {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            free_space: Mutex::new(Some(1 << 40)),
            create_calls: AtomicU32::new(0),
            fail_first_creates: Mutex::new(None),
            create_call_script: Mutex::new(HashMap::new()),
            fail_stat: AtomicBool::new(false),
            fail_open_read: AtomicBool::new(false),
            fail_chmod: AtomicBool::new(false),
            fail_chown: AtomicBool::new(false),
            resets: AtomicU32::new(0),
            read_gate: Mutex::new(None),
        }
    }

    pub fn insert_file(&self, path: &str, data: &[u8], mode: u32) {
        self.state.lock().unwrap().files.insert(
            path.to_owned(),
            MockFile {
                data: data.to_vec(),
                mode,
            },
        );
    }

    pub fn file(&self, path: &str) -> Option<MockFile> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn ops(&self) -> Vec<RemoteOp> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn op_count(&self, pred: impl Fn(&RemoteOp) -> bool) -> usize {
        self.ops().iter().filter(|op| pred(op)).count()
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> u32 {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn set_free_space(&self, space: Option<u64>) {
        *self.free_space.lock().unwrap() = space;
    }

    pub fn fail_first_creates(&self, n: u32, err: ScriptedError) {
        *self.fail_first_creates.lock().unwrap() = Some((n, err));
    }

    /// Fails the `index`-th create call (1-based) with the given class.
    pub fn script_create_failure(&self, index: u32, err: ScriptedError) {
        self.create_call_script.lock().unwrap().insert(index, err);
    }

    pub fn set_fail_stat(&self, fail: bool) {
        self.fail_stat.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_open_read(&self, fail: bool) {
        self.fail_open_read.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_chmod(&self, fail: bool) {
        self.fail_chmod.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_chown(&self, fail: bool) {
        self.fail_chown.store(fail, Ordering::SeqCst);
    }

    pub fn set_read_gate(&self, gate: Arc<Semaphore>) {
        *self.read_gate.lock().unwrap() = Some(gate);
    }

    fn record(&self, op: RemoteOp) {
        self.state.lock().unwrap().ops.push(op);
    }
}

/// Buffers everything written and commits the file on close.
pub struct MockWriter {
    path: String,
    mode: u32,
    buf: Vec<u8>,
    state: Arc<Mutex<MockState>>,
}

impl RemoteWriter for MockWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<(), FsError> {
        self.buf.extend_from_slice(buf);
        Ok(())
    }

    async fn close(self) -> Result<(), FsError> {
        self.state.lock().unwrap().files.insert(
            self.path,
            MockFile {
                data: self.buf,
                mode: self.mode,
            },
        );
        Ok(())
    }
}

impl RemoteFs for MockRemoteFs {
    type Reader = Cursor<Vec<u8>>;
    type Writer = MockWriter;

    async fn stat(&self, path: &str) -> Result<RemoteStat, FsError> {
        self.record(RemoteOp::Stat(path.to_owned()));
        if self.fail_stat.load(Ordering::SeqCst) {
            return Err(FsError::unavailable("stat scripted to fail"));
        }
        self.state
            .lock()
            .unwrap()
            .files
            .get(path)
            .map(|f| RemoteStat {
                size: f.data.len() as u64,
                mode: f.mode,
                mtime: SystemTime::UNIX_EPOCH,
            })
            .ok_or_else(|| FsError::RemoteNotFound(path.to_owned()))
    }

    async fn open_read(&self, path: &str) -> Result<Self::Reader, FsError> {
        self.record(RemoteOp::OpenRead(path.to_owned()));
        let gate = self.read_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.fail_open_read.load(Ordering::SeqCst) {
            return Err(FsError::unavailable("read stream scripted to fail"));
        }
        self.state
            .lock()
            .unwrap()
            .files
            .get(path)
            .map(|f| Cursor::new(f.data.clone()))
            .ok_or_else(|| FsError::RemoteNotFound(path.to_owned()))
    }

    async fn create(&self, path: &str, mode: u32) -> Result<Self::Writer, FsError> {
        let index = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(RemoteOp::Create(path.to_owned()));
        if let Some((remaining, err)) = &mut *self.fail_first_creates.lock().unwrap() {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(err.to_error(path));
            }
        }
        if let Some(err) = self.create_call_script.lock().unwrap().get(&index) {
            return Err(err.to_error(path));
        }
        Ok(MockWriter {
            path: path.to_owned(),
            mode,
            buf: Vec::new(),
            state: Arc::clone(&self.state),
        })
    }

    async fn remove(&self, path: &str) -> Result<(), FsError> {
        self.record(RemoteOp::Remove(path.to_owned()));
        // Absence is not an error, matching the backend contract.
        self.state.lock().unwrap().files.remove(path);
        Ok(())
    }

    async fn chmod(&self, path: &str, mode: u32) -> Result<(), FsError> {
        self.record(RemoteOp::Chmod(path.to_owned(), mode));
        if self.fail_chmod.load(Ordering::SeqCst) {
            return Err(FsError::PermissionDenied(path.to_owned()));
        }
        if let Some(file) = self.state.lock().unwrap().files.get_mut(path) {
            file.mode = mode;
        }
        Ok(())
    }

    async fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<(), FsError> {
        self.record(RemoteOp::Chown(path.to_owned(), uid, gid));
        if self.fail_chown.load(Ordering::SeqCst) {
            return Err(FsError::PermissionDenied(path.to_owned()));
        }
        Ok(())
    }

    async fn free_space(&self) -> Result<u64, FsError> {
        self.record(RemoteOp::FreeSpace);
        self.free_space
            .lock()
            .unwrap()
            .ok_or_else(|| FsError::unavailable("capacity query scripted to fail"))
    }

    async fn reset(&self) -> Result<(), FsError> {
        self.record(RemoteOp::Reset);
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
