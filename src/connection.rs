//! Connection to a remote filesystem and its operation catalog
//!
//! A [`Connection`] owns at most one remote session and the table of files
//! opened through it. Every operation except `connect` and `disconnect` has
//! the same shape:
//!
//! 1. validate arguments (synchronously, before anything else)
//! 2. take a reference to the live session, or fail with `NotConnected`
//! 3. resolve handle ids through the [`HandleTable`], or fail with
//!    `InvalidHandle` without dispatching
//! 4. [`dispatch`] the blocking call with a pin holding the connection, the
//!    session or file, and the owned inputs
//! 5. translate the raw result on the caller's thread
//!
//! # Lifetimes
//!
//! The native session is torn down exactly once, when the last reference to
//! it is gone: the connection's own slot, each open file, and each in-flight
//! request hold one. Those references are always released on worker threads,
//! so the blocking disconnect never runs on the caller's context. That
//! includes dropping the last [`Connection`] handle while still connected:
//! its files and session are handed to a worker, or released in place when
//! no runtime is running on the dropping thread.
//!
//! # Reconnecting
//!
//! `connect` on a connection that is connected, or has a connect in flight,
//! fails with `AlreadyConnected`. Call `disconnect` first.

use crate::dispatch::{dispatch, retire, OpKind, PanicPolicy};
use crate::error::{invalid_argument, BridgeError, Result};
use crate::handle_table::{HandleId, HandleTable};
use crate::remote::{OpenFlags, RemoteClient, RemoteSession, SessionOf};
use crate::stats::{DispatchStats, SharedStats};
use crate::translate::{self, DirectoryListing, FileStatus};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Connection configuration options
///
/// Owned by this module; the CLI and the [`crate::Client`] facade build it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Number of handle table slots (guaranteed >= 1)
    handle_capacity: NonZeroUsize,
    /// What to do when a completion callback panics
    panic_policy: PanicPolicy,
}

impl BridgeOptions {
    /// Create options, clamping `handle_capacity` to at least 1
    #[must_use]
    pub fn new(handle_capacity: usize, panic_policy: PanicPolicy) -> Self {
        Self {
            handle_capacity: NonZeroUsize::new(handle_capacity).unwrap_or(NonZeroUsize::MIN),
            panic_policy,
        }
    }

    /// Number of handle table slots
    #[must_use]
    pub const fn handle_capacity(&self) -> NonZeroUsize {
        self.handle_capacity
    }

    /// Completion callback panic policy
    #[must_use]
    pub const fn panic_policy(&self) -> PanicPolicy {
        self.panic_policy
    }

    /// Replace the panic policy
    #[must_use]
    pub const fn with_panic_policy(mut self, panic_policy: PanicPolicy) -> Self {
        self.panic_policy = panic_policy;
        self
    }
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self::new(HandleTable::<()>::DEFAULT_CAPACITY, PanicPolicy::default())
    }
}

// ============================================================================
// SESSION AND FILE OWNERSHIP
// ============================================================================

/// An established session, disconnected natively when the last reference drops
struct LiveSession<S: RemoteSession> {
    inner: S,
    endpoint: String,
}

impl<S: RemoteSession> Drop for LiveSession<S> {
    fn drop(&mut self) {
        let code = self.inner.disconnect();
        if code == 0 {
            info!(endpoint = %self.endpoint, "session released");
        } else {
            warn!(endpoint = %self.endpoint, code, "remote disconnect reported failure");
        }
    }
}

/// A natively open file bound to the session it was opened on
struct OpenFile<S: RemoteSession> {
    file: S::File,
    session: Arc<LiveSession<S>>,
    path: String,
    closed: AtomicBool,
}

impl<S: RemoteSession> OpenFile<S> {
    /// Close natively; later calls return 0 without touching the client
    fn close(&self) -> i32 {
        if self.closed.swap(true, Ordering::AcqRel) {
            return 0;
        }
        self.session.inner.close_file(&self.file)
    }

    fn pread(&self, position: u64, length: usize) -> (i32, Vec<u8>) {
        let mut buffer = vec![0u8; length];
        let count = self.session.inner.pread(&self.file, position, &mut buffer);
        (count, buffer)
    }

    /// Write then flush, so completion implies the data reached the service
    fn write_flushed(&self, data: &[u8]) -> (i32, i32) {
        let count = self.session.inner.write(&self.file, data);
        if count < 0 {
            return (count, 0);
        }
        (count, self.session.inner.flush(&self.file))
    }
}

impl<S: RemoteSession> Drop for OpenFile<S> {
    fn drop(&mut self) {
        if !*self.closed.get_mut() {
            let code = self.session.inner.close_file(&self.file);
            debug!(path = %self.path, code, "closed file on release");
        }
    }
}

enum SessionState<S: RemoteSession> {
    Disconnected,
    Connecting { attempt: u64 },
    Connected(Arc<LiveSession<S>>),
}

type FileTable<C> = HandleTable<OpenFile<SessionOf<C>>>;

struct Shared<C: RemoteClient> {
    client: C,
    state: Mutex<SessionState<SessionOf<C>>>,
    handles: FileTable<C>,
    options: BridgeOptions,
    stats: Arc<SharedStats>,
    attempts: AtomicU64,
}

impl<C: RemoteClient> Shared<C> {
    fn lock_state(&self) -> MutexGuard<'_, SessionState<SessionOf<C>>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: RemoteClient> Drop for Shared<C> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        let SessionState::Connected(session) = std::mem::replace(state, SessionState::Disconnected)
        else {
            return;
        };
        let files = self.handles.drain();
        debug!(
            endpoint = %session.endpoint,
            open_files = files.len(),
            "last connection handle dropped while connected"
        );
        retire((files, session));
    }
}

// ============================================================================
// PINS
// ============================================================================

/// Pin for calls made on the session itself
struct SessionPin<C: RemoteClient, I> {
    _connection: Arc<Shared<C>>,
    session: Arc<LiveSession<SessionOf<C>>>,
    input: I,
}

/// Pin for calls made on an open file
struct FilePin<C: RemoteClient, I> {
    _connection: Arc<Shared<C>>,
    file: Arc<OpenFile<SessionOf<C>>>,
    input: I,
}

struct ConnectPin<C: RemoteClient> {
    connection: Arc<Shared<C>>,
    host: String,
    port: u16,
}

/// Everything a disconnect releases; files drop before the session
struct DisconnectPin<C: RemoteClient> {
    _connection: Arc<Shared<C>>,
    _files: Vec<Arc<OpenFile<SessionOf<C>>>>,
    _session: Arc<LiveSession<SessionOf<C>>>,
}

/// Resets a pending connect if its future goes away before settling
struct ConnectAttempt<'a, C: RemoteClient> {
    shared: &'a Shared<C>,
    attempt: u64,
}

impl<C: RemoteClient> Drop for ConnectAttempt<'_, C> {
    fn drop(&mut self) {
        let mut state = self.shared.lock_state();
        if matches!(*state, SessionState::Connecting { attempt } if attempt == self.attempt) {
            *state = SessionState::Disconnected;
        }
    }
}

// ============================================================================
// CONNECTION
// ============================================================================

/// A connection to a remote filesystem through a blocking client
///
/// Cheap to clone; clones share the session, the handle table and the
/// counters. Must be used from within a compio runtime.
///
/// # Examples
///
/// ```rust,ignore
/// use ahdfs::{Connection, MemoryClient, OpenFlags};
///
/// #[compio::main]
/// async fn main() -> ahdfs::Result<()> {
///     let connection = Connection::new(MemoryClient::new());
///     connection.connect("localhost", 8020).await?;
///     let id = connection.open("/tmp/t.txt", OpenFlags::WRONLY | OpenFlags::CREATE).await?;
///     connection.write(id, b"hello".to_vec()).await?;
///     connection.close(id).await?;
///     println!("{}", connection.stat("/tmp/t.txt").await?.size);
///     Ok(())
/// }
/// ```
pub struct Connection<C: RemoteClient> {
    shared: Arc<Shared<C>>,
}

impl<C: RemoteClient> Clone for Connection<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: RemoteClient> Connection<C> {
    /// Create a disconnected connection with default options
    #[must_use]
    pub fn new(client: C) -> Self {
        Self::with_options(client, BridgeOptions::default())
    }

    /// Create a disconnected connection
    #[must_use]
    pub fn with_options(client: C, options: BridgeOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                client,
                state: Mutex::new(SessionState::Disconnected),
                handles: HandleTable::new(options.handle_capacity()),
                options,
                stats: Arc::new(SharedStats::new()),
                attempts: AtomicU64::new(0),
            }),
        }
    }

    /// The blocking client this connection drives
    #[must_use]
    pub fn client(&self) -> &C {
        &self.shared.client
    }

    /// Options this connection was built with
    #[must_use]
    pub fn options(&self) -> BridgeOptions {
        self.shared.options
    }

    /// Whether a session is currently established
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(*self.shared.lock_state(), SessionState::Connected(_))
    }

    /// `host:port` of the current session
    #[must_use]
    pub fn endpoint(&self) -> Option<String> {
        match &*self.shared.lock_state() {
            SessionState::Connected(session) => Some(session.endpoint.clone()),
            _ => None,
        }
    }

    /// Ids currently bound to an open file, in ascending order
    #[must_use]
    pub fn open_handles(&self) -> Vec<HandleId> {
        self.shared.handles.open_ids()
    }

    /// Snapshot of this connection's dispatch counters
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.shared.stats.snapshot()
    }

    pub(crate) fn shared_stats(&self) -> &Arc<SharedStats> {
        &self.shared.stats
    }

    /// Establish the session
    ///
    /// Success is `Ok(())`: a refused session is `ConnectFailed`, never a
    /// `false` result.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty host
    /// - `AlreadyConnected` if a session exists or a connect is in flight
    /// - `ConnectFailed` if the client could not establish a session
    /// - `NotConnected` if `disconnect` was called while the connect was in flight
    pub async fn connect(&self, host: &str, port: u16) -> Result<()> {
        validate_host(host)?;
        let attempt = {
            let mut state = self.shared.lock_state();
            match &*state {
                SessionState::Connected(session) => {
                    return Err(BridgeError::AlreadyConnected(session.endpoint.clone()));
                }
                SessionState::Connecting { .. } => {
                    return Err(BridgeError::AlreadyConnected(format!(
                        "{host}:{port} (connect in progress)"
                    )));
                }
                SessionState::Disconnected => {}
            }
            let attempt = self.shared.attempts.fetch_add(1, Ordering::Relaxed);
            *state = SessionState::Connecting { attempt };
            attempt
        };
        let pending = ConnectAttempt {
            shared: &*self.shared,
            attempt,
        };

        let pin = ConnectPin {
            connection: Arc::clone(&self.shared),
            host: host.to_string(),
            port,
        };
        let requested = host.to_string();
        let session = dispatch(
            &self.shared.stats,
            OpKind::Connect,
            pin,
            |pin| {
                pin.connection
                    .client
                    .connect(&pin.host, pin.port)
                    .map(|inner| LiveSession {
                        inner,
                        endpoint: format!("{}:{}", pin.host, pin.port),
                    })
            },
            move |session| {
                session.ok_or(BridgeError::ConnectFailed {
                    host: requested,
                    port,
                })
            },
        )
        .await?;

        let session = Arc::new(session);
        let installed = {
            let mut state = self.shared.lock_state();
            if matches!(*state, SessionState::Connecting { attempt: current } if current == attempt) {
                *state = SessionState::Connected(Arc::clone(&session));
                true
            } else {
                false
            }
        };
        drop(pending);

        if installed {
            info!(
                endpoint = %session.endpoint,
                backend = self.shared.client.name(),
                "connected"
            );
            Ok(())
        } else {
            debug!(endpoint = %session.endpoint, "connect superseded by disconnect");
            retire(session);
            Err(BridgeError::NotConnected)
        }
    }

    /// Release the session
    ///
    /// Every handle id is invalidated at once. Requests already in flight keep
    /// their own references and run to completion; the native session is torn
    /// down after the last of them. Disconnecting while not connected is an
    /// acknowledgement, not an error.
    ///
    /// # Errors
    ///
    /// Returns `WorkerPanicked` if releasing the session's files panicked.
    pub async fn disconnect(&self) -> Result<()> {
        let session = {
            let mut state = self.shared.lock_state();
            match std::mem::replace(&mut *state, SessionState::Disconnected) {
                SessionState::Connected(session) => session,
                SessionState::Connecting { attempt } => {
                    debug!(attempt, "disconnect cancelled a pending connect");
                    return Ok(());
                }
                SessionState::Disconnected => return Ok(()),
            }
        };

        let files = self.shared.handles.drain();
        info!(endpoint = %session.endpoint, open_files = files.len(), "disconnecting");

        let pin = DisconnectPin {
            _connection: Arc::clone(&self.shared),
            _files: files,
            _session: session,
        };
        dispatch(&self.shared.stats, OpKind::Disconnect, pin, |_| (), |()| Ok(())).await
    }

    /// Status of a remote path
    ///
    /// # Errors
    ///
    /// `InvalidArgument`, `NotConnected`, or `PathNotFound`.
    pub async fn stat(&self, path: &str) -> Result<FileStatus> {
        validate_path(path)?;
        let requested = path.to_string();
        self.on_session(
            OpKind::Stat,
            path.to_string(),
            |session, path| session.get_path_info(path),
            move |info| translate::status(requested, info),
        )
        .await
    }

    /// Contents of a remote directory
    ///
    /// # Errors
    ///
    /// `InvalidArgument`, `NotConnected`, or `PathNotFound`.
    pub async fn list(&self, path: &str) -> Result<DirectoryListing> {
        validate_path(path)?;
        let requested = path.to_string();
        self.on_session(
            OpKind::List,
            path.to_string(),
            |session, path| session.list_directory(path),
            move |records| translate::listing(requested, records),
        )
        .await
    }

    /// Open a remote file and bind it to the lowest free handle id
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a bad path or conflicting access modes
    /// - `NotConnected`
    /// - `CapacityExceeded` when the handle table is full (no dispatch)
    /// - `PathNotFound` for a read-only open of a missing path
    /// - `OpenFailed` when the client refused any other open
    pub async fn open(&self, path: &str, flags: OpenFlags) -> Result<HandleId> {
        validate_path(path)?;
        flags.validate()?;
        let session = self.session()?;
        let reservation = self.shared.handles.reserve_slot()?;
        debug!(path, %flags, id = %reservation.id(), "reserved handle");

        let pin = SessionPin {
            _connection: Arc::clone(&self.shared),
            session,
            input: (path.to_string(), flags),
        };
        let requested = path.to_string();
        let file = dispatch(
            &self.shared.stats,
            OpKind::Open,
            pin,
            |pin| {
                let (path, flags) = &pin.input;
                pin.session
                    .inner
                    .open_file(path, *flags)
                    .map(|file| OpenFile {
                        file,
                        session: Arc::clone(&pin.session),
                        path: path.clone(),
                        closed: AtomicBool::new(false),
                    })
            },
            move |file| file.ok_or_else(|| open_error(requested, flags)),
        )
        .await?;

        if !self.is_current(&file.session) {
            retire(file);
            return Err(BridgeError::NotConnected);
        }
        Ok(reservation.commit(Arc::new(file)))
    }

    /// Close an open file and free its handle id
    ///
    /// Closing an id that is not open is an acknowledgement. A failing native
    /// close is logged; the id is freed either way.
    ///
    /// # Errors
    ///
    /// `NotConnected`, or `WorkerPanicked` if the native close panicked.
    pub async fn close(&self, id: HandleId) -> Result<()> {
        self.session()?;
        let Some(file) = self.shared.handles.release(id) else {
            debug!(%id, "close of unallocated handle ignored");
            return Ok(());
        };

        let pin = FilePin {
            _connection: Arc::clone(&self.shared),
            file,
            input: (),
        };
        dispatch(
            &self.shared.stats,
            OpKind::Close,
            pin,
            |pin| (pin.file.close(), pin.file.path.clone()),
            move |(code, path)| {
                if code != 0 {
                    warn!(%id, path, code, "remote close reported failure");
                }
                Ok(())
            },
        )
        .await
    }

    /// Read up to `length` bytes at `offset`
    ///
    /// The result is shorter than `length` near end of file and empty at or
    /// past it.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` or `NotConnected`
    /// - `InvalidHandle` for an id that is not open (no dispatch)
    /// - `Remote` when the client reported a read failure
    pub async fn read(&self, id: HandleId, offset: u64, length: usize) -> Result<Vec<u8>> {
        validate_length(OpKind::Read, length)?;
        let file = self.file(id)?;
        self.on_file(
            OpKind::Read,
            file,
            (offset, length),
            |file, &(offset, length)| file.pread(offset, length),
            |(count, buffer)| translate::read_bytes(count, buffer),
        )
        .await
    }

    /// Write `data` and flush it before completing
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` or `NotConnected`
    /// - `InvalidHandle` for an id that is not open (no dispatch)
    /// - `Remote` when the write or the flush failed
    pub async fn write(&self, id: HandleId, data: Vec<u8>) -> Result<usize> {
        validate_length(OpKind::Write, data.len())?;
        let file = self.file(id)?;
        self.on_file(
            OpKind::Write,
            file,
            data,
            |file, data| file.write_flushed(data),
            |(count, flush_code)| translate::written_bytes(count, flush_code),
        )
        .await
    }

    /// Create a directory and its parents; returns the native result code
    ///
    /// # Errors
    ///
    /// `InvalidArgument` or `NotConnected`. Remote failures are in the code.
    pub async fn mkdir(&self, path: &str) -> Result<i32> {
        self.path_code(OpKind::Mkdir, path, |session, path| session.create_directory(path))
            .await
    }

    /// Check a path; returns 0 if it exists
    ///
    /// # Errors
    ///
    /// `InvalidArgument` or `NotConnected`. Remote failures are in the code.
    pub async fn exists(&self, path: &str) -> Result<i32> {
        self.path_code(OpKind::Exists, path, |session, path| session.exists(path))
            .await
    }

    /// Delete a path recursively; returns the native result code
    ///
    /// # Errors
    ///
    /// `InvalidArgument` or `NotConnected`. Remote failures are in the code.
    pub async fn delete(&self, path: &str) -> Result<i32> {
        self.path_code(OpKind::Delete, path, |session, path| session.delete(path))
            .await
    }

    fn session(&self) -> Result<Arc<LiveSession<SessionOf<C>>>> {
        match &*self.shared.lock_state() {
            SessionState::Connected(session) => Ok(Arc::clone(session)),
            _ => Err(BridgeError::NotConnected),
        }
    }

    fn is_current(&self, session: &Arc<LiveSession<SessionOf<C>>>) -> bool {
        matches!(
            &*self.shared.lock_state(),
            SessionState::Connected(current) if Arc::ptr_eq(current, session)
        )
    }

    fn file(&self, id: HandleId) -> Result<Arc<OpenFile<SessionOf<C>>>> {
        self.session()?;
        self.shared.handles.lookup(id)
    }

    async fn on_session<I, T, R, W, X>(&self, op: OpKind, input: I, work: W, translate: X) -> Result<R>
    where
        I: Send + 'static,
        T: Send + 'static,
        W: FnOnce(&SessionOf<C>, &I) -> T + Send + 'static,
        X: FnOnce(T) -> Result<R>,
    {
        let pin = SessionPin {
            _connection: Arc::clone(&self.shared),
            session: self.session()?,
            input,
        };
        dispatch(
            &self.shared.stats,
            op,
            pin,
            move |pin| work(&pin.session.inner, &pin.input),
            translate,
        )
        .await
    }

    async fn on_file<I, T, R, W, X>(
        &self,
        op: OpKind,
        file: Arc<OpenFile<SessionOf<C>>>,
        input: I,
        work: W,
        translate: X,
    ) -> Result<R>
    where
        I: Send + 'static,
        T: Send + 'static,
        W: FnOnce(&OpenFile<SessionOf<C>>, &I) -> T + Send + 'static,
        X: FnOnce(T) -> Result<R>,
    {
        let pin = FilePin {
            _connection: Arc::clone(&self.shared),
            file,
            input,
        };
        dispatch(
            &self.shared.stats,
            op,
            pin,
            move |pin| work(&pin.file, &pin.input),
            translate,
        )
        .await
    }

    async fn path_code<W>(&self, op: OpKind, path: &str, work: W) -> Result<i32>
    where
        W: FnOnce(&SessionOf<C>, &str) -> i32 + Send + 'static,
    {
        validate_path(path)?;
        self.on_session(
            op,
            path.to_string(),
            move |session, path: &String| work(session, path),
            |code| {
                if code != 0 {
                    debug!(%op, code, "path operation returned non-zero code");
                }
                Ok(code)
            },
        )
        .await
    }
}

impl<C: RemoteClient> fmt::Debug for Connection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("backend", &self.shared.client.name())
            .field("endpoint", &self.endpoint())
            .field("handles", &self.shared.handles)
            .finish_non_exhaustive()
    }
}

fn open_error(path: String, flags: OpenFlags) -> BridgeError {
    if flags.is_read_only() {
        BridgeError::PathNotFound(path)
    } else {
        BridgeError::OpenFailed { path, flags }
    }
}

// ============================================================================
// ARGUMENT VALIDATION
// ============================================================================

pub(crate) fn validate_host(host: &str) -> Result<()> {
    if host.is_empty() {
        return Err(invalid_argument("host must not be empty"));
    }
    if host.contains('\0') {
        return Err(invalid_argument("host contains a NUL byte"));
    }
    Ok(())
}

pub(crate) fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid_argument("path must not be empty"));
    }
    if path.contains('\0') {
        return Err(invalid_argument(format!("path contains a NUL byte: {path:?}")));
    }
    Ok(())
}

/// Native byte counts are `i32`, so larger transfers cannot be reported
pub(crate) fn validate_length(op: OpKind, length: usize) -> Result<()> {
    if i32::try_from(length).is_err() {
        return Err(invalid_argument(format!(
            "{op} length {length} exceeds {}",
            i32::MAX
        )));
    }
    Ok(())
}
