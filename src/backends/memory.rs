//! In-process remote store
//!
//! `MemoryClient` behaves like a small remote filesystem service: sessions
//! are cheap, every call blocks the calling thread for as long as any latency
//! injected for the path, and the store keeps counters of live sessions and
//! natively open files so leaks are observable.
//!
//! Store conventions:
//! - paths are absolute; `.` and empty components are ignored, `..` pops
//! - write opens create the file and its parents, truncating unless
//!   `APPEND` is set; read opens require an existing file
//! - read-write opens are refused
//! - written bytes become visible at `flush` or `close`
//! - `create_directory` creates parents; `delete` is recursive

use crate::remote::native::{KIND_DIRECTORY, KIND_FILE};
use crate::remote::{NativeFileInfo, OpenFlags, RemoteClient, RemoteSession};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

const BLOCK_SIZE: i64 = 128 * 1024 * 1024;
const REPLICATION: i16 = 3;
const OWNER: &str = "hdfs";
const GROUP: &str = "supergroup";

#[derive(Debug, Clone)]
enum Node {
    File {
        data: Vec<u8>,
        modified: i64,
        accessed: i64,
    },
    Directory {
        modified: i64,
    },
}

/// Shared state of an in-process remote store
#[derive(Debug)]
pub struct MemoryStore {
    nodes: DashMap<String, Node>,
    delays: DashMap<String, Duration>,
    refuse_connections: AtomicBool,
    live_sessions: AtomicUsize,
    open_files: AtomicUsize,
    connects: AtomicU64,
}

impl MemoryStore {
    /// Empty store containing only `/`
    #[must_use]
    pub fn new() -> Self {
        let nodes = DashMap::new();
        nodes.insert("/".to_string(), Node::Directory { modified: now() });
        Self {
            nodes,
            delays: DashMap::new(),
            refuse_connections: AtomicBool::new(false),
            live_sessions: AtomicUsize::new(0),
            open_files: AtomicUsize::new(0),
            connects: AtomicU64::new(0),
        }
    }

    /// Make every call that touches `path` block for `delay` first
    pub fn set_delay(&self, path: &str, delay: Duration) {
        self.delays.insert(normalize(path), delay);
    }

    /// Refuse (or accept again) new sessions
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse_connections.store(refuse, Ordering::Relaxed);
    }

    /// Sessions established and not yet disconnected
    #[must_use]
    pub fn live_sessions(&self) -> usize {
        self.live_sessions.load(Ordering::Relaxed)
    }

    /// Files opened and not yet closed
    #[must_use]
    pub fn open_files(&self) -> usize {
        self.open_files.load(Ordering::Relaxed)
    }

    /// Sessions established since the store was created
    #[must_use]
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    /// Store a file directly, creating its parents
    pub fn insert_file(&self, path: &str, data: &[u8]) {
        let path = normalize(path);
        self.create_parents(&path);
        let stamp = now();
        self.nodes.insert(
            path,
            Node::File {
                data: data.to_vec(),
                modified: stamp,
                accessed: stamp,
            },
        );
    }

    /// Contents of a file, if it exists
    #[must_use]
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        match self.nodes.get(&normalize(path)).as_deref() {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    fn pause(&self, path: &str) {
        if let Some(delay) = self.delays.get(path).map(|d| *d) {
            trace!(path, ?delay, "injected latency");
            std::thread::sleep(delay);
        }
    }

    fn info(&self, path: &str) -> Option<NativeFileInfo> {
        let node = self.nodes.get(path)?;
        let info = match &*node {
            Node::File {
                data,
                modified,
                accessed,
            } => NativeFileInfo {
                kind: KIND_FILE,
                name: path.to_string(),
                last_mod: *modified,
                size: i64::try_from(data.len()).unwrap_or(i64::MAX),
                replication: REPLICATION,
                block_size: BLOCK_SIZE,
                owner: OWNER.to_string(),
                group: GROUP.to_string(),
                permissions: 0o644,
                last_access: *accessed,
            },
            Node::Directory { modified } => NativeFileInfo {
                kind: KIND_DIRECTORY,
                name: path.to_string(),
                last_mod: *modified,
                size: 0,
                replication: 0,
                block_size: 0,
                owner: OWNER.to_string(),
                group: GROUP.to_string(),
                permissions: 0o755,
                last_access: 0,
            },
        };
        Some(info)
    }

    /// Create every missing ancestor of `path`; fails if one is a file
    fn create_parents(&self, path: &str) -> bool {
        match parent(path) {
            Some(parent) => self.create_directories(parent),
            None => true,
        }
    }

    fn create_directories(&self, path: &str) -> bool {
        let mut current = String::new();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            current.push('/');
            current.push_str(component);
            let created = self
                .nodes
                .entry(current.clone())
                .or_insert_with(|| Node::Directory { modified: now() });
            if matches!(*created, Node::File { .. }) {
                return false;
            }
        }
        true
    }

    fn remove_tree(&self, path: &str) -> bool {
        if path == "/" || self.nodes.remove(path).is_none() {
            return false;
        }
        let prefix = format!("{path}/");
        self.nodes.retain(|key, _| !key.starts_with(&prefix));
        true
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// [`RemoteClient`] backed by a [`MemoryStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryClient {
    store: Arc<MemoryStore>,
}

impl MemoryClient {
    /// Client over a fresh, empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Client over an existing store
    #[must_use]
    pub const fn with_store(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// The store this client talks to
    #[must_use]
    pub fn store(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.store)
    }
}

impl RemoteClient for MemoryClient {
    type Session = MemorySession;

    fn connect(&self, host: &str, port: u16) -> Option<MemorySession> {
        if self.store.refuse_connections.load(Ordering::Relaxed) {
            debug!(host, port, "memory store refused connection");
            return None;
        }
        self.store.live_sessions.fetch_add(1, Ordering::Relaxed);
        self.store.connects.fetch_add(1, Ordering::Relaxed);
        Some(MemorySession {
            store: Arc::clone(&self.store),
            disconnected: AtomicBool::new(false),
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Session on a [`MemoryStore`]
#[derive(Debug)]
pub struct MemorySession {
    store: Arc<MemoryStore>,
    disconnected: AtomicBool,
}

/// File handle on a [`MemoryStore`]
#[derive(Debug)]
pub struct MemoryFile {
    path: String,
    writable: bool,
    pending: Mutex<Vec<u8>>,
    closed: AtomicBool,
}

impl MemorySession {
    fn publish(&self, file: &MemoryFile) -> i32 {
        let pending = std::mem::take(&mut *file.pending.lock().unwrap_or_else(PoisonError::into_inner));
        if pending.is_empty() {
            return 0;
        }
        match self.store.nodes.get_mut(&file.path).as_deref_mut() {
            Some(Node::File { data, modified, .. }) => {
                data.extend_from_slice(&pending);
                *modified = now();
                0
            }
            _ => -1,
        }
    }
}

impl RemoteSession for MemorySession {
    type File = MemoryFile;

    fn disconnect(&self) -> i32 {
        if self.disconnected.swap(true, Ordering::AcqRel) {
            return -1;
        }
        self.store.live_sessions.fetch_sub(1, Ordering::Relaxed);
        0
    }

    fn open_file(&self, path: &str, flags: OpenFlags) -> Option<MemoryFile> {
        let path = normalize(path);
        self.store.pause(&path);
        if flags.is_read_write() {
            return None;
        }

        if flags.is_read_only() {
            match self.store.nodes.get_mut(&path).as_deref_mut() {
                Some(Node::File { accessed, .. }) => *accessed = now(),
                _ => return None,
            }
        } else {
            if !self.store.create_parents(&path) {
                return None;
            }
            let stamp = now();
            let mut node = self.store.nodes.entry(path.clone()).or_insert(Node::File {
                data: Vec::new(),
                modified: stamp,
                accessed: stamp,
            });
            match &mut *node {
                Node::File { data, modified, .. } => {
                    if !flags.contains(OpenFlags::APPEND) {
                        data.clear();
                        *modified = stamp;
                    }
                }
                Node::Directory { .. } => return None,
            }
        }

        self.store.open_files.fetch_add(1, Ordering::Relaxed);
        Some(MemoryFile {
            path,
            writable: !flags.is_read_only(),
            pending: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    fn close_file(&self, file: &MemoryFile) -> i32 {
        if file.closed.swap(true, Ordering::AcqRel) {
            return -1;
        }
        self.store.pause(&file.path);
        self.store.open_files.fetch_sub(1, Ordering::Relaxed);
        self.publish(file)
    }

    fn pread(&self, file: &MemoryFile, position: u64, buf: &mut [u8]) -> i32 {
        self.store.pause(&file.path);
        if file.writable || file.closed.load(Ordering::Acquire) {
            return -1;
        }
        let Some(node) = self.store.nodes.get(&file.path) else {
            return -1;
        };
        let Node::File { data, .. } = &*node else {
            return -1;
        };
        let start = usize::try_from(position).unwrap_or(usize::MAX).min(data.len());
        let count = buf.len().min(data.len() - start);
        buf[..count].copy_from_slice(&data[start..start + count]);
        i32::try_from(count).unwrap_or(-1)
    }

    fn write(&self, file: &MemoryFile, buf: &[u8]) -> i32 {
        self.store.pause(&file.path);
        if !file.writable || file.closed.load(Ordering::Acquire) {
            return -1;
        }
        let Ok(count) = i32::try_from(buf.len()) else {
            return -1;
        };
        file.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        count
    }

    fn flush(&self, file: &MemoryFile) -> i32 {
        if file.closed.load(Ordering::Acquire) {
            return -1;
        }
        self.publish(file)
    }

    fn get_path_info(&self, path: &str) -> Option<NativeFileInfo> {
        let path = normalize(path);
        self.store.pause(&path);
        self.store.info(&path)
    }

    fn list_directory(&self, path: &str) -> Option<Vec<NativeFileInfo>> {
        let path = normalize(path);
        self.store.pause(&path);
        let info = self.store.info(&path)?;
        if info.kind != KIND_DIRECTORY {
            return Some(vec![info]);
        }

        let mut children: Vec<String> = self
            .store
            .nodes
            .iter()
            .filter(|entry| parent(entry.key()) == Some(path.as_str()))
            .map(|entry| entry.key().clone())
            .collect();
        children.sort();
        Some(
            children
                .iter()
                .filter_map(|child| self.store.info(child))
                .collect(),
        )
    }

    fn create_directory(&self, path: &str) -> i32 {
        let path = normalize(path);
        self.store.pause(&path);
        if self.store.create_directories(&path) {
            0
        } else {
            -1
        }
    }

    fn exists(&self, path: &str) -> i32 {
        let path = normalize(path);
        self.store.pause(&path);
        if self.store.nodes.contains_key(&path) {
            0
        } else {
            -1
        }
    }

    fn delete(&self, path: &str) -> i32 {
        let path = normalize(path);
        self.store.pause(&path);
        if self.store.remove_tree(&path) {
            0
        } else {
            -1
        }
    }
}

/// Canonical absolute form of a store path
fn normalize(path: &str) -> String {
    let mut components: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            other => components.push(other),
        }
    }
    format!("/{}", components.join("/"))
}

fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(index) => Some(&path[..index]),
        None => None,
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use rstest::rstest;

    fn session() -> (Arc<MemoryStore>, MemorySession) {
        let client = MemoryClient::new();
        let session = client.connect("localhost", 8020).unwrap();
        (client.store(), session)
    }

    #[rstest]
    #[case("/", "/")]
    #[case("", "/")]
    #[case("/a//b/", "/a/b")]
    #[case("a/./b", "/a/b")]
    #[case("/a/b/../c", "/a/c")]
    #[case("/..", "/")]
    fn test_normalize(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize(raw), expected);
    }

    #[test]
    fn test_write_visible_after_flush() {
        let (store, session) = session();
        let file = session
            .open_file("/tmp/t.txt", OpenFlags::WRONLY | OpenFlags::CREATE)
            .unwrap();
        assert_eq!(session.write(&file, b"hello"), 5);
        assert_eq!(store.contents("/tmp/t.txt").unwrap(), b"");
        assert_eq!(session.flush(&file), 0);
        assert_eq!(store.contents("/tmp/t.txt").unwrap(), b"hello");
        assert_eq!(session.close_file(&file), 0);
        assert_eq!(session.close_file(&file), -1);
        assert_eq!(store.open_files(), 0);
        assert!(session.get_path_info("/tmp").unwrap().kind == KIND_DIRECTORY);
    }

    #[test]
    fn test_append_keeps_and_write_truncates() {
        let (store, session) = session();
        store.insert_file("/f", b"abc");

        let file = session
            .open_file("/f", OpenFlags::WRONLY | OpenFlags::APPEND)
            .unwrap();
        session.write(&file, b"def");
        session.close_file(&file);
        assert_eq!(store.contents("/f").unwrap(), b"abcdef");

        let file = session.open_file("/f", OpenFlags::WRONLY).unwrap();
        session.close_file(&file);
        assert_eq!(store.contents("/f").unwrap(), b"");
    }

    #[test]
    fn test_read_modes_and_eof() {
        let (store, session) = session();
        store.insert_file("/r", b"0123456789");
        assert!(session.open_file("/missing", OpenFlags::RDONLY).is_none());
        assert!(session.open_file("/r", OpenFlags::RDWR).is_none());

        let file = session.open_file("/r", OpenFlags::RDONLY).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(session.pread(&file, 8, &mut buf), 2);
        assert_eq!(&buf[..2], b"89");
        assert_eq!(session.pread(&file, 100, &mut buf), 0);
        assert_eq!(session.write(&file, b"x"), -1);
        session.close_file(&file);
    }

    #[test]
    fn test_directory_operations() {
        let (store, session) = session();
        assert_eq!(session.create_directory("/a/b/c"), 0);
        store.insert_file("/a/b/f1", b"1");
        store.insert_file("/a/b/f2", b"22");
        assert_eq!(session.create_directory("/a/b/f1/x"), -1);

        let names: Vec<_> = session
            .list_directory("/a/b")
            .unwrap()
            .into_iter()
            .map(|info| info.name)
            .collect();
        assert_eq!(names, vec!["/a/b/c", "/a/b/f1", "/a/b/f2"]);
        assert_eq!(session.list_directory("/a/b/f2").unwrap().len(), 1);
        assert!(session.list_directory("/nope").is_none());

        assert_eq!(session.exists("/a/b/f1"), 0);
        assert_eq!(session.delete("/a"), 0);
        assert_eq!(session.exists("/a/b/f1"), -1);
        assert_eq!(session.delete("/a"), -1);
        assert_eq!(session.delete("/"), -1);
    }

    #[test]
    fn test_session_counters() {
        let client = MemoryClient::new();
        let store = client.store();
        let session = client.connect("h", 1).unwrap();
        assert_eq!(store.live_sessions(), 1);
        assert_eq!(session.disconnect(), 0);
        assert_eq!(session.disconnect(), -1);
        assert_eq!(store.live_sessions(), 0);

        store.refuse_connections(true);
        assert!(client.connect("h", 1).is_none());
        assert_eq!(store.connects(), 1);
    }
}
