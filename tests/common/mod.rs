//! Shared fixtures for integration tests

use ahdfs::backends::{MemorySession, MemoryStore};
use ahdfs::{Connection, MemoryClient, NativeFileInfo, OpenFlags, RemoteClient, RemoteSession};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Connection to a fresh in-memory store, already connected
#[allow(dead_code)]
pub async fn connected() -> (Arc<MemoryStore>, Connection<MemoryClient>) {
    let client = MemoryClient::new();
    let store = client.store();
    let connection = Connection::new(client);
    connection
        .connect("localhost", 8020)
        .await
        .expect("memory store accepts connections");
    (store, connection)
}

/// Yield to the worker pool until `condition` holds or `attempts` run out
#[allow(dead_code)]
pub async fn wait_until(mut condition: impl FnMut() -> bool, attempts: usize) -> bool {
    for _ in 0..attempts {
        if condition() {
            return true;
        }
        compio::runtime::spawn_blocking(|| std::thread::sleep(Duration::from_millis(10)))
            .await
            .expect("sleep task");
    }
    condition()
}

/// Path whose calls panic inside [`PanickingClient`]
#[allow(dead_code)]
pub const BOOM: &str = "/boom";

/// Memory client whose sessions panic on any call touching [`BOOM`]
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct PanickingClient {
    inner: MemoryClient,
}

#[allow(dead_code)]
impl PanickingClient {
    pub fn store(&self) -> Arc<MemoryStore> {
        self.inner.store()
    }
}

#[allow(dead_code)]
pub struct PanickingSession(MemorySession);

fn check(path: &str) {
    assert_ne!(path, BOOM, "remote client crashed on {path}");
}

impl RemoteClient for PanickingClient {
    type Session = PanickingSession;

    fn connect(&self, host: &str, port: u16) -> Option<PanickingSession> {
        self.inner.connect(host, port).map(PanickingSession)
    }
}

impl RemoteSession for PanickingSession {
    type File = <MemorySession as RemoteSession>::File;

    fn disconnect(&self) -> i32 {
        self.0.disconnect()
    }

    fn open_file(&self, path: &str, flags: OpenFlags) -> Option<Self::File> {
        check(path);
        self.0.open_file(path, flags)
    }

    fn close_file(&self, file: &Self::File) -> i32 {
        self.0.close_file(file)
    }

    fn pread(&self, file: &Self::File, position: u64, buf: &mut [u8]) -> i32 {
        self.0.pread(file, position, buf)
    }

    fn write(&self, file: &Self::File, buf: &[u8]) -> i32 {
        self.0.write(file, buf)
    }

    fn flush(&self, file: &Self::File) -> i32 {
        self.0.flush(file)
    }

    fn get_path_info(&self, path: &str) -> Option<NativeFileInfo> {
        check(path);
        self.0.get_path_info(path)
    }

    fn list_directory(&self, path: &str) -> Option<Vec<NativeFileInfo>> {
        check(path);
        self.0.list_directory(path)
    }

    fn create_directory(&self, path: &str) -> i32 {
        check(path);
        self.0.create_directory(path)
    }

    fn exists(&self, path: &str) -> i32 {
        check(path);
        self.0.exists(path)
    }

    fn delete(&self, path: &str) -> i32 {
        check(path);
        self.0.delete(path)
    }
}

#[allow(dead_code)]
pub struct TestTimeoutGuard {
    cancelled: Arc<AtomicBool>,
}

impl Drop for TestTimeoutGuard {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Abort the test binary if the guard is still alive after `duration`
#[allow(dead_code)]
pub fn test_timeout_guard(duration: Duration) -> TestTimeoutGuard {
    let cancelled = Arc::new(AtomicBool::new(false));
    let cancelled_clone = Arc::clone(&cancelled);
    std::thread::spawn(move || {
        std::thread::sleep(duration);
        if !cancelled_clone.load(Ordering::SeqCst) {
            eprintln!("Test timeout exceeded ({}s). Aborting.", duration.as_secs());
            std::process::abort();
        }
    });
    TestTimeoutGuard { cancelled }
}
