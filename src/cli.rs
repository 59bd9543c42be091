//! Command-line interface definitions
//!
//! This module organizes CLI arguments by **functional usage** - each group
//! contains the options needed by a specific component or subsystem.

use crate::client::ClientOptions;
use crate::connection::BridgeOptions;
use crate::dispatch::PanicPolicy;
use crate::translate::{FileKind, FileStatus};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

/// Non-blocking remote filesystem client
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Remote endpoint configuration
    #[command(flatten)]
    pub remote: RemoteConfig,

    /// Bridge and worker pool configuration
    #[command(flatten)]
    pub bridge: BridgeConfig,

    /// Output and logging configuration
    #[command(flatten)]
    pub output: OutputConfig,

    /// Operation to run
    #[command(subcommand)]
    pub command: Command,
}

// ============================================================================
// FUNCTIONAL GROUPS: Organized by what component consumes them
// ============================================================================

/// Remote endpoint configuration
///
/// Used by: `LocalClient::new()`, `Client::ensure_connected()`
#[derive(clap::Args, Debug, Clone)]
#[command(next_help_heading = "Remote Options")]
pub struct RemoteConfig {
    /// Remote host
    #[arg(long, default_value = "default")]
    pub host: String,

    /// Remote port (0 = client default)
    #[arg(long, default_value = "0")]
    pub port: u16,

    /// Local directory served as the remote filesystem
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

/// Bridge configuration
///
/// Used by: `Connection::with_options()`, runtime construction in `main()`
#[derive(clap::Args, Debug, Clone)]
#[command(next_help_heading = "Bridge Options")]
pub struct BridgeConfig {
    /// Maximum number of simultaneously open remote files
    #[arg(long, default_value = "1024")]
    pub handle_capacity: usize,

    /// Blocking worker threads (0 = one per CPU core)
    #[arg(long, default_value = "0")]
    pub workers: usize,

    /// Read chunk size in KB
    #[arg(long, default_value = "1024")]
    pub chunk_size_kb: usize,

    /// Buffered bytes (in KB) before a remote write is issued
    #[arg(long, default_value = "64")]
    pub flush_threshold_kb: usize,
}

impl BridgeConfig {
    /// Largest chunk a single native read or write can report
    pub const MAX_CHUNK_SIZE_KB: usize = (i32::MAX as usize) / 1024;

    /// Get the actual worker count to use
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }

    /// Get chunk size in bytes
    #[must_use]
    pub const fn chunk_size_bytes(&self) -> usize {
        self.chunk_size_kb.saturating_mul(1024)
    }

    /// Get flush threshold in bytes
    #[must_use]
    pub const fn flush_threshold_bytes(&self) -> usize {
        self.flush_threshold_kb.saturating_mul(1024)
    }
}

/// Output and logging configuration
///
/// Used by: `main()`, logging initialization, progress display
#[derive(clap::Args, Debug, Clone)]
#[command(next_help_heading = "Output Options")]
pub struct OutputConfig {
    /// Show progress bars for transfers
    #[arg(long)]
    pub progress: bool,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress all output except errors)
    #[arg(short, long)]
    pub quiet: bool,
}

impl OutputConfig {
    /// Log level implied by `-v` / `-q`
    #[must_use]
    pub const fn log_level(&self) -> tracing::Level {
        if self.quiet {
            return tracing::Level::ERROR;
        }
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

/// Remote operations
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the status of a path
    Stat {
        /// Remote path
        path: String,
    },
    /// List a directory
    Ls {
        /// Remote path
        #[arg(default_value = "/")]
        path: String,
    },
    /// Create a directory and its parents
    Mkdir {
        /// Remote path
        path: String,
    },
    /// Delete a path recursively
    Rm {
        /// Remote path
        path: String,
    },
    /// Exit 0 if a path exists, 1 otherwise
    Exists {
        /// Remote path
        path: String,
    },
    /// Write a remote file to stdout
    Cat {
        /// Remote path
        path: String,
    },
    /// Copy a remote file to a local path
    Get {
        /// Remote source
        remote: String,
        /// Local destination
        local: PathBuf,
    },
    /// Copy a local file to a remote path
    Put {
        /// Local source
        local: PathBuf,
        /// Remote destination
        remote: String,
    },
}

// ============================================================================
// IMPLEMENTATION: Convenience methods and validation
// ============================================================================

impl Args {
    /// Validate command-line arguments
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - The root is not an existing directory
    /// - Handle capacity is outside 1-65536
    /// - Chunk size is 0 or too large for a native read
    /// - Flush threshold is 0 or too large for a native write
    /// - Both --quiet and --verbose options are used
    pub fn validate(&self) -> Result<()> {
        if !self.remote.root.is_dir() {
            anyhow::bail!(
                "Root must be an existing directory: {}",
                self.remote.root.display()
            );
        }

        if self.bridge.handle_capacity < 1 || self.bridge.handle_capacity > 65_536 {
            anyhow::bail!(
                "Handle capacity must be between 1 and 65536, got: {}",
                self.bridge.handle_capacity
            );
        }

        if self.bridge.chunk_size_kb == 0 || self.bridge.chunk_size_kb > BridgeConfig::MAX_CHUNK_SIZE_KB
        {
            anyhow::bail!(
                "Chunk size must be between 1 and {} KB, got: {}",
                BridgeConfig::MAX_CHUNK_SIZE_KB,
                self.bridge.chunk_size_kb
            );
        }

        if self.bridge.flush_threshold_kb == 0
            || self.bridge.flush_threshold_kb > BridgeConfig::MAX_CHUNK_SIZE_KB
        {
            anyhow::bail!(
                "Flush threshold must be between 1 and {} KB, got: {}",
                BridgeConfig::MAX_CHUNK_SIZE_KB,
                self.bridge.flush_threshold_kb
            );
        }

        if self.output.quiet && self.output.verbose > 0 {
            anyhow::bail!("Cannot use both --quiet and --verbose options");
        }

        Ok(())
    }

    /// Build the client options these arguments describe
    #[must_use]
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            host: self.remote.host.clone(),
            port: self.remote.port,
            chunk_size: self.bridge.chunk_size_bytes(),
            flush_threshold: self.bridge.flush_threshold_bytes(),
            bridge: BridgeOptions::new(self.bridge.handle_capacity, PanicPolicy::Report),
        }
    }
}

// ============================================================================
// OUTPUT FORMATTING
// ============================================================================

/// `drwxr-xr-x` style rendering of a kind and permission bits
#[must_use]
pub fn mode_string(kind: FileKind, permissions: u16) -> String {
    let mut mode = String::with_capacity(10);
    mode.push(match kind {
        FileKind::Directory => 'd',
        FileKind::File => '-',
        FileKind::Other => '?',
    });
    for shift in [6u16, 3, 0] {
        let bits = (permissions >> shift) & 0o7;
        mode.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        mode.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        mode.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    mode
}

/// One `ls` line: mode, replication, owner, group, size, mtime, path
#[must_use]
pub fn listing_line(status: &FileStatus) -> String {
    let replication = if status.is_dir() {
        "-".to_string()
    } else {
        status.replication.to_string()
    };
    format!(
        "{} {:>3} {} {} {:>12} {:>10} {}",
        mode_string(status.kind, status.permissions),
        replication,
        status.owner,
        status.group,
        status.size,
        epoch_seconds(status.modified),
        status.path
    )
}

/// Multi-line `stat` report
#[must_use]
pub fn status_report(status: &FileStatus) -> String {
    format!(
        "path: {}\nkind: {}\nsize: {}\nreplication: {}\nblock size: {}\nowner: {}\ngroup: {}\npermissions: {} ({:o})\nmodified: {}\naccessed: {}",
        status.path,
        status.kind,
        status.size,
        status.replication,
        status.block_size,
        status.owner,
        status.group,
        mode_string(status.kind, status.permissions),
        status.permissions,
        epoch_seconds(status.modified),
        epoch_seconds(status.accessed),
    )
}

fn epoch_seconds(time: std::time::SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}
