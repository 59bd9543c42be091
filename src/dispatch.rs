//! Blocking-call dispatch onto the worker pool
//!
//! Every catalog operation funnels through [`dispatch`]: the caller's context
//! hands a *pin* (owned references that keep the connection and whatever the
//! call touches alive) and a blocking closure to a compio worker thread, then
//! awaits the raw result and translates it back on its own thread.
//!
//! # Guarantees
//!
//! - The caller's context never blocks; awaiting the result is the only
//!   suspension point.
//! - Once submitted, the worker always runs to completion. Dropping the
//!   awaiting future does not cancel it; the result is simply discarded.
//! - The pin is dropped on the worker right after the blocking call returns,
//!   including when the call panics.
//! - Completion order across requests follows worker completion order.
//!
//! [`deliver`] is the callback half: it invokes a completion callback exactly
//! once and routes a panicking callback to the configured [`PanicPolicy`].

use crate::error::{BridgeError, Result};
use crate::stats::SharedStats;
use compio::runtime::Runtime;
use futures::channel::oneshot;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Catalog operation kinds, used for logging and error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Establish a session
    Connect,
    /// Release the session
    Disconnect,
    /// Status of one path
    Stat,
    /// Directory listing
    List,
    /// Open a file
    Open,
    /// Close a file
    Close,
    /// Positional read
    Read,
    /// Write and flush
    Write,
    /// Create a directory
    Mkdir,
    /// Check a path
    Exists,
    /// Delete a path
    Delete,
}

impl OpKind {
    /// Lowercase operation name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Stat => "stat",
            Self::List => "list",
            Self::Open => "open",
            Self::Close => "close",
            Self::Read => "read",
            Self::Write => "write",
            Self::Mkdir => "mkdir",
            Self::Exists => "exists",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when a completion callback panics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanicPolicy {
    /// Log the panic at error level, count it, and keep running
    #[default]
    Report,
    /// Log the panic and abort the process
    Abort,
}

/// Run `work` on a worker thread and translate its output on the caller's thread
///
/// `pin` is moved to the worker and handed to `work` by reference; it is
/// dropped on the worker as soon as `work` returns or unwinds. `translate`
/// runs on the caller's thread once the worker result has arrived.
///
/// # Errors
///
/// Returns whatever `translate` returns, or `WorkerPanicked` if `work`
/// panicked.
pub async fn dispatch<P, T, R, W, X>(
    stats: &Arc<SharedStats>,
    op: OpKind,
    pin: P,
    work: W,
    translate: X,
) -> Result<R>
where
    P: Send + 'static,
    T: Send + 'static,
    W: FnOnce(&P) -> T + Send + 'static,
    X: FnOnce(T) -> Result<R>,
{
    let (tx, rx) = oneshot::channel();
    let worker_stats = Arc::clone(stats);
    let started = Instant::now();

    stats.record_dispatch();
    debug!(%op, "dispatching to worker");

    compio::runtime::spawn_blocking(move || {
        let outcome = catch_unwind(AssertUnwindSafe(|| work(&pin)));
        drop(pin);
        worker_stats.record_worker_done();
        // The receiver is gone if the caller stopped waiting
        let _ = tx.send(outcome);
    })
    .detach();

    let result = match rx.await {
        Ok(Ok(raw)) => translate(raw),
        Ok(Err(payload)) => Err(BridgeError::WorkerPanicked {
            op,
            message: panic_message(payload.as_ref()),
        }),
        Err(oneshot::Canceled) => Err(BridgeError::WorkerPanicked {
            op,
            message: "worker dropped its result".to_string(),
        }),
    };

    stats.record_outcome(result.is_ok());
    debug!(
        %op,
        ok = result.is_ok(),
        elapsed_us = started.elapsed().as_micros(),
        "worker result delivered"
    );
    result
}

/// Move `value` to a worker thread and drop it there
///
/// Used for values whose destructor performs blocking remote calls (closing
/// files, tearing down sessions). Off the runtime the value is dropped in
/// place.
pub fn retire<T: Send + 'static>(value: T) {
    let release = move |runtime: &Runtime| runtime.spawn_blocking(move || drop(value)).detach();
    if let Err(release) = Runtime::try_with_current(release) {
        drop(release);
    }
}

/// Invoke a completion callback exactly once
///
/// A panicking callback is caught so the runtime keeps serving other
/// requests, then reported according to `policy`.
pub fn deliver<R, F>(stats: &SharedStats, policy: PanicPolicy, op: OpKind, callback: F, result: Result<R>)
where
    F: FnOnce(Result<R>),
{
    let outcome = catch_unwind(AssertUnwindSafe(move || callback(result)));
    stats.record_callback(outcome.is_err());

    if let Err(payload) = outcome {
        let message = panic_message(payload.as_ref());
        error!(%op, %message, "completion callback panicked");
        if policy == PanicPolicy::Abort {
            eprintln!("ahdfs: completion callback for {op} panicked: {message}");
            std::process::abort();
        }
    }
}

/// Render a panic payload as text
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[compio::test]
    async fn test_dispatch_runs_work_and_translates() {
        let stats = Arc::new(SharedStats::new());
        let caller = std::thread::current().id();

        let result = dispatch(
            &stats,
            OpKind::Stat,
            21_u32,
            move |value| (*value * 2, std::thread::current().id()),
            |(value, worker)| Ok((value, worker)),
        )
        .await
        .unwrap();

        assert_eq!(result.0, 42);
        assert_ne!(result.1, caller, "blocking work must not run on the caller's thread");
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.dispatched, 1);
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.in_flight, 0);
    }

    #[compio::test]
    async fn test_dispatch_translate_error_counts_as_failure() {
        let stats = Arc::new(SharedStats::new());
        let result: Result<()> = dispatch(&stats, OpKind::Mkdir, (), |()| -1, |code| {
            Err(BridgeError::Remote { op: OpKind::Mkdir, code })
        })
        .await;

        assert!(matches!(result, Err(BridgeError::Remote { code: -1, .. })));
        assert_eq!(stats.snapshot().failed, 1);
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[compio::test]
    async fn test_worker_panic_releases_pin() {
        let stats = Arc::new(SharedStats::new());
        let dropped = Arc::new(AtomicBool::new(false));
        let pin = DropFlag(Arc::clone(&dropped));

        let result: Result<()> = dispatch(
            &stats,
            OpKind::Read,
            pin,
            |_pin| -> () { panic!("remote client blew up") },
            Ok,
        )
        .await;

        match result {
            Err(BridgeError::WorkerPanicked { op, message }) => {
                assert_eq!(op, OpKind::Read);
                assert!(message.contains("blew up"));
            }
            other => panic!("expected WorkerPanicked, got {other:?}"),
        }
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(stats.snapshot().in_flight, 0);
    }

    #[compio::test]
    async fn test_completion_order_follows_workers() {
        let stats = Arc::new(SharedStats::new());
        let slow = dispatch(
            &stats,
            OpKind::Stat,
            (),
            |()| std::thread::sleep(Duration::from_millis(200)),
            |()| Ok("slow"),
        );
        let fast = dispatch(&stats, OpKind::Stat, (), |()| (), |()| Ok("fast"));

        futures::pin_mut!(slow);
        futures::pin_mut!(fast);
        let first = match futures::future::select(slow, fast).await {
            futures::future::Either::Left((value, _)) | futures::future::Either::Right((value, _)) => {
                value.unwrap()
            }
        };
        assert_eq!(first, "fast");
    }

    #[test]
    fn test_deliver_invokes_callback_once() {
        let stats = SharedStats::new();
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::clone(&calls);

        deliver(&stats, PanicPolicy::Report, OpKind::Close, move |r: Result<()>| {
            assert!(r.is_ok());
            seen.set(seen.get() + 1);
        }, Ok(()));

        assert_eq!(calls.get(), 1);
        assert_eq!(stats.snapshot().callbacks_delivered, 1);
    }

    #[test]
    fn test_deliver_reports_panicking_callback() {
        let stats = SharedStats::new();
        deliver(
            &stats,
            PanicPolicy::Report,
            OpKind::Write,
            |_: Result<usize>| panic!("caller bug"),
            Ok(5),
        );
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.callbacks_delivered, 1);
        assert_eq!(snapshot.callback_panics, 1);
    }

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "non-string panic payload");
    }
}
