//! Callback delivery through `Connection::submit`

mod common;

use ahdfs::{BridgeError, HandleId, MemoryClient, OpenFlags, Reply, Request, Result};
use common::{connected, test_timeout_guard, wait_until};
use futures::channel::mpsc;
use futures::StreamExt;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

fn stat(path: &str) -> Request {
    Request::Stat {
        path: path.to_string(),
    }
}

#[compio::test]
async fn test_callbacks_follow_completion_order() {
    let _guard = test_timeout_guard(Duration::from_secs(30));
    let (store, connection) = connected().await;
    store.insert_file("/slow", b"slow");
    store.insert_file("/fast", b"fast");
    store.set_delay("/slow", Duration::from_millis(300));

    let (tx, mut rx) = mpsc::unbounded();
    for path in ["/slow", "/fast"] {
        let tx = tx.clone();
        connection
            .submit(stat(path), move |result| {
                let _ = tx.unbounded_send((path, result));
            })
            .unwrap();
    }
    drop(tx);

    let (first, result) = rx.next().await.unwrap();
    assert_eq!(first, "/fast");
    assert!(matches!(result, Ok(Reply::Status(status)) if status.size == 4));
    let (second, _) = rx.next().await.unwrap();
    assert_eq!(second, "/slow");
    assert!(rx.next().await.is_none());
}

#[compio::test]
async fn test_full_request_sequence() {
    let connection = ahdfs::Connection::new(MemoryClient::new());
    let (tx, mut rx) = mpsc::unbounded::<Result<Reply>>();
    let submit = |request: Request| {
        let tx = tx.clone();
        connection
            .submit(request, move |result| {
                let _ = tx.unbounded_send(result);
            })
            .unwrap();
    };

    submit(Request::Connect {
        host: "localhost".to_string(),
        port: 8020,
    });
    assert_eq!(rx.next().await.unwrap().unwrap(), Reply::Connected);

    submit(Request::Open {
        path: "/tmp/t.txt".to_string(),
        flags: OpenFlags::WRONLY | OpenFlags::CREATE,
    });
    let Reply::Opened(handle) = rx.next().await.unwrap().unwrap() else {
        panic!("expected a handle");
    };
    assert_eq!(handle, HandleId::new(0));

    submit(Request::Write {
        handle,
        data: b"hello".to_vec(),
    });
    assert_eq!(rx.next().await.unwrap().unwrap(), Reply::Written(5));

    submit(Request::Close { handle });
    assert_eq!(rx.next().await.unwrap().unwrap(), Reply::Closed);

    submit(stat("/tmp/t.txt"));
    match rx.next().await.unwrap().unwrap() {
        Reply::Status(status) => assert_eq!(status.size, 5),
        other => panic!("unexpected reply {other:?}"),
    }

    submit(Request::Disconnect);
    assert_eq!(rx.next().await.unwrap().unwrap(), Reply::Disconnected);
}

#[compio::test]
async fn test_malformed_request_never_calls_back() {
    let (_store, connection) = connected().await;
    let called = Rc::new(Cell::new(false));
    let flag = Rc::clone(&called);
    let before = connection.stats().dispatched;

    let err = connection
        .submit(stat(""), move |_| flag.set(true))
        .unwrap_err();
    assert!(matches!(err, BridgeError::InvalidArgument(_)));

    // Give any stray task a chance to run
    assert!(!wait_until(|| called.get(), 5).await);
    assert_eq!(connection.stats().dispatched, before);
}

#[compio::test]
async fn test_errors_are_delivered_to_the_callback() {
    let (_store, connection) = connected().await;
    let (tx, mut rx) = mpsc::unbounded();
    connection
        .submit(stat("/missing"), move |result| {
            let _ = tx.unbounded_send(result);
        })
        .unwrap();
    assert!(matches!(
        rx.next().await.unwrap(),
        Err(BridgeError::PathNotFound(_))
    ));
}

#[compio::test]
async fn test_panicking_callback_is_contained() {
    let (store, connection) = connected().await;
    store.insert_file("/file", b"x");

    connection
        .submit(stat("/file"), |_| panic!("callback failure"))
        .unwrap();
    assert!(wait_until(|| connection.stats().callback_panics == 1, 200).await);

    // The runtime keeps serving requests
    let status = connection.stat("/file").await.unwrap();
    assert_eq!(status.size, 1);
    let stats = connection.stats();
    assert_eq!(stats.callbacks_delivered, 1);
    assert_eq!(stats.in_flight, 0);
}

#[compio::test]
async fn test_callback_outlives_the_submitting_handle() {
    let _guard = test_timeout_guard(Duration::from_secs(30));
    let (store, connection) = connected().await;
    store.insert_file("/slow", b"late");
    store.set_delay("/slow", Duration::from_millis(100));

    let (tx, mut rx) = mpsc::unbounded();
    connection
        .submit(stat("/slow"), move |result| {
            let _ = tx.unbounded_send(result);
        })
        .unwrap();
    drop(connection);

    let status = rx.next().await.unwrap().unwrap();
    assert!(matches!(status, Reply::Status(status) if status.size == 4));
}
