use std::sync::{Arc, Mutex};

use procwarden::supervisor::dispatch::{forward_command, CommandStreams, DispatchTable};
use procwarden::AppError;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

fn client_streams() -> (CommandStreams, DuplexStream, DuplexStream) {
    let (out_write, out_read) = tokio::io::duplex(4096);
    let (err_write, err_read) = tokio::io::duplex(4096);
    let streams = CommandStreams {
        out: Box::new(out_write),
        err: Box::new(err_write),
        input: Box::new(tokio::io::empty()),
    };
    (streams, out_read, err_read)
}

async fn read_all(mut reader: DuplexStream) -> String {
    let mut text = String::new();
    reader.read_to_string(&mut text).await.expect("read channel");
    text
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

#[test]
fn lookup_is_case_insensitive() {
    let mut table = DispatchTable::new();
    table.register("status", |_args, _streams| async { Ok(()) });

    assert!(table.resolve("status").is_some());
    assert!(table.resolve("STATUS").is_some());
    assert!(table.resolve("StAtUs").is_some());
    assert!(table.resolve("shutdown").is_none());
}

#[test]
fn names_are_stored_uppercased_and_sorted() {
    let mut table = DispatchTable::new();
    table.register("zeta", |_args, _streams| async { Ok(()) });
    table.register("Alpha", |_args, _streams| async { Ok(()) });

    assert_eq!(table.command_names(), vec!["ALPHA", "ZETA"]);
}

#[test]
fn reregistration_replaces_the_handler() {
    let hits = Arc::new(Mutex::new(Vec::<&str>::new()));

    let mut table = DispatchTable::new();
    let first_hits = Arc::clone(&hits);
    table.register("probe", move |_args, _streams| {
        let hits = Arc::clone(&first_hits);
        async move {
            hits.lock().unwrap().push("first");
            Ok(())
        }
    });
    let second_hits = Arc::clone(&hits);
    table.register("probe", move |_args, _streams| {
        let hits = Arc::clone(&second_hits);
        async move {
            hits.lock().unwrap().push("second");
            Ok(())
        }
    });

    let handler = table.resolve("probe").expect("registered");
    let (streams, _out, _err) = client_streams();
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(handler(Vec::new(), streams))
        .expect("handler runs");

    assert_eq!(*hits.lock().unwrap(), vec!["second"]);
}

#[tokio::test]
async fn handler_receives_stripped_arguments() {
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));

    let mut table = DispatchTable::new();
    let seen_handle = Arc::clone(&seen);
    table.register("echo", move |args, _streams| {
        let seen = Arc::clone(&seen_handle);
        async move {
            seen.lock().unwrap().clone_from(&args);
            Ok(())
        }
    });

    let (streams, _out, _err) = client_streams();
    let (report_write, _report_read) = tokio::io::duplex(1024);
    let status = forward_command(
        &table,
        "test harness",
        args(&["ECHO", "alpha", "beta"]),
        streams,
        Box::new(report_write),
    )
    .await;

    assert_eq!(status, 0);
    assert_eq!(*seen.lock().unwrap(), vec!["alpha", "beta"]);
}

#[tokio::test]
async fn empty_argument_vector_reports_an_error() {
    let table = DispatchTable::new();
    let (streams, _out, _err) = client_streams();
    let (report_write, report_read) = tokio::io::duplex(1024);

    let status = forward_command(&table, "test harness", Vec::new(), streams, Box::new(report_write))
        .await;

    assert_eq!(status, 1);
    let report = read_all(report_read).await;
    assert_eq!(report, "ERROR: test harness has no command to execute\n");
}

#[tokio::test]
async fn unknown_command_reports_not_implemented() {
    let table = DispatchTable::new();
    let (streams, _out, _err) = client_streams();
    let (report_write, report_read) = tokio::io::duplex(1024);

    let status = forward_command(
        &table,
        "test harness",
        args(&["frobnicate"]),
        streams,
        Box::new(report_write),
    )
    .await;

    assert_eq!(status, 1);
    let report = read_all(report_read).await;
    assert_eq!(
        report,
        "ERROR: test harness - command 'frobnicate' not implemented\n"
    );
}

#[tokio::test]
async fn handler_failure_is_reported_on_the_error_channel() {
    let mut table = DispatchTable::new();
    table.register("explode", |_args, _streams| async {
        Err(AppError::Dispatch("boom".into()))
    });

    let (streams, _out, _err) = client_streams();
    let (report_write, report_read) = tokio::io::duplex(1024);

    let status = forward_command(
        &table,
        "test harness",
        args(&["explode"]),
        streams,
        Box::new(report_write),
    )
    .await;

    assert_eq!(status, 1);
    let report = read_all(report_read).await;
    assert_eq!(report, "ERROR: explode: dispatch: boom\n");
}

#[tokio::test]
async fn handler_writes_reach_the_client_channels() {
    let mut table = DispatchTable::new();
    table.register("greet", |_args, mut streams| async move {
        streams.out.write_all(b"hello\n").await?;
        streams.err.write_all(b"aside\n").await?;
        streams.out.flush().await?;
        streams.err.flush().await?;
        Ok(())
    });

    let (streams, out_read, err_read) = client_streams();
    let (report_write, _report_read) = tokio::io::duplex(1024);

    let status =
        forward_command(&table, "test harness", args(&["greet"]), streams, Box::new(report_write))
            .await;

    assert_eq!(status, 0);
    assert_eq!(read_all(out_read).await, "hello\n");
    assert_eq!(read_all(err_read).await, "aside\n");
}
