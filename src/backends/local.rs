//! Local directory tree served through the remote client interface
//!
//! `LocalClient` maps remote paths onto a root directory and performs real
//! blocking `std::fs` I/O, which makes it the backend the CLI uses and a
//! realistic stand-in for a network client in tests. Remote paths may not
//! escape the root: any `..` component is refused.

use crate::remote::native::{KIND_DIRECTORY, KIND_FILE};
use crate::remote::{NativeFileInfo, OpenFlags, RemoteClient, RemoteSession};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{FileExt, MetadataExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Largest offset `pread(2)` accepts
const MAX_OFFSET: u64 = i64::MAX.unsigned_abs();

/// [`RemoteClient`] over a local directory
#[derive(Debug, Clone)]
pub struct LocalClient {
    root: PathBuf,
}

impl LocalClient {
    /// Serve the tree below `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory remote paths resolve under
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl RemoteClient for LocalClient {
    type Session = LocalSession;

    fn connect(&self, host: &str, port: u16) -> Option<LocalSession> {
        if !self.root.is_dir() {
            debug!(host, port, root = %self.root.display(), "root is not a directory");
            return None;
        }
        Some(LocalSession {
            root: self.root.clone(),
        })
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Session over a local directory
#[derive(Debug)]
pub struct LocalSession {
    root: PathBuf,
}

/// Open local file
#[derive(Debug)]
pub struct LocalFile {
    file: File,
    path: PathBuf,
}

impl LocalSession {
    /// Map a remote path below the root, refusing `..`
    fn resolve(&self, remote: &str) -> Option<PathBuf> {
        let mut resolved = self.root.clone();
        for component in Path::new(remote).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    debug!(remote, "refusing path outside the root");
                    return None;
                }
            }
        }
        Some(resolved)
    }

    fn remote_name(&self, local: &Path) -> String {
        let relative = local.strip_prefix(&self.root).unwrap_or(local);
        format!("/{}", relative.display())
    }

    fn info(&self, local: &Path) -> Option<NativeFileInfo> {
        let metadata = fs::metadata(local)
            .map_err(|e| debug!(path = %local.display(), error = %e, "stat failed"))
            .ok()?;
        let kind = if metadata.is_file() {
            KIND_FILE
        } else if metadata.is_dir() {
            KIND_DIRECTORY
        } else {
            b'O'
        };
        #[allow(clippy::cast_possible_truncation)] // masked to nine bits
        let permissions = (metadata.permissions().mode() & 0o777) as i16;
        Some(NativeFileInfo {
            kind,
            name: self.remote_name(local),
            last_mod: metadata.mtime(),
            size: i64::try_from(metadata.len()).unwrap_or(i64::MAX),
            replication: 1,
            block_size: i64::try_from(metadata.blksize()).unwrap_or(0),
            owner: metadata.uid().to_string(),
            group: metadata.gid().to_string(),
            permissions,
            last_access: metadata.atime(),
        })
    }
}

fn code<T>(result: std::io::Result<T>, op: &str, path: &Path) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => {
            debug!(op, path = %path.display(), error = %e, "local call failed");
            -1
        }
    }
}

impl RemoteSession for LocalSession {
    type File = LocalFile;

    fn disconnect(&self) -> i32 {
        0
    }

    fn open_file(&self, path: &str, flags: OpenFlags) -> Option<LocalFile> {
        if flags.is_read_write() {
            return None;
        }
        let local = self.resolve(path)?;
        let opened = if flags.is_read_only() {
            if !local.is_file() {
                return None;
            }
            File::open(&local)
        } else {
            if let Some(parent) = local.parent() {
                fs::create_dir_all(parent).ok()?;
            }
            let append = flags.contains(OpenFlags::APPEND);
            OpenOptions::new()
                .write(true)
                .create(true)
                .append(append)
                .truncate(!append)
                .open(&local)
        };
        match opened {
            Ok(file) => Some(LocalFile { file, path: local }),
            Err(e) => {
                debug!(path = %local.display(), error = %e, "open failed");
                None
            }
        }
    }

    fn close_file(&self, file: &LocalFile) -> i32 {
        code(file.file.sync_all(), "close", &file.path)
    }

    fn pread(&self, file: &LocalFile, position: u64, buf: &mut [u8]) -> i32 {
        let mut filled = 0;
        while filled < buf.len() {
            // The kernel rejects ranges ending past off_t; no file reaches there
            let Some((offset, room)) = position
                .checked_add(filled as u64)
                .and_then(|offset| Some((offset, MAX_OFFSET.checked_sub(offset)?)))
                .filter(|&(_, room)| room > 0)
            else {
                break;
            };
            let end = buf
                .len()
                .min(filled.saturating_add(usize::try_from(room).unwrap_or(usize::MAX)));
            match file.file.read_at(&mut buf[filled..end], offset) {
                Ok(0) => break,
                Ok(count) => filled += count,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    debug!(path = %file.path.display(), error = %e, "read failed");
                    return -1;
                }
            }
        }
        i32::try_from(filled).unwrap_or(-1)
    }

    fn write(&self, file: &LocalFile, buf: &[u8]) -> i32 {
        let Ok(count) = i32::try_from(buf.len()) else {
            return -1;
        };
        match (&file.file).write_all(buf) {
            Ok(()) => count,
            Err(e) => {
                debug!(path = %file.path.display(), error = %e, "write failed");
                -1
            }
        }
    }

    fn flush(&self, file: &LocalFile) -> i32 {
        code(file.file.sync_data(), "flush", &file.path)
    }

    fn get_path_info(&self, path: &str) -> Option<NativeFileInfo> {
        self.info(&self.resolve(path)?)
    }

    fn list_directory(&self, path: &str) -> Option<Vec<NativeFileInfo>> {
        let local = self.resolve(path)?;
        if !local.is_dir() {
            return self.info(&local).map(|info| vec![info]);
        }
        let entries = fs::read_dir(&local)
            .map_err(|e| debug!(path = %local.display(), error = %e, "list failed"))
            .ok()?;
        let mut children: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
        children.sort();
        Some(children.iter().filter_map(|child| self.info(child)).collect())
    }

    fn create_directory(&self, path: &str) -> i32 {
        match self.resolve(path) {
            Some(local) => code(fs::create_dir_all(&local), "mkdir", &local),
            None => -1,
        }
    }

    fn exists(&self, path: &str) -> i32 {
        match self.resolve(path) {
            Some(local) if local.symlink_metadata().is_ok() => 0,
            _ => -1,
        }
    }

    fn delete(&self, path: &str) -> i32 {
        let Some(local) = self.resolve(path) else {
            return -1;
        };
        if local == self.root {
            return -1;
        }
        if local.is_dir() {
            code(fs::remove_dir_all(&local), "delete", &local)
        } else {
            code(fs::remove_file(&local), "delete", &local)
        }
    }
}
