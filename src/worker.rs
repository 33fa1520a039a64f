//! Child-worker mode — runs one command in a spawned worker process.
//!
//! When the supervisor invokes a child worker it re-enters this executable
//! with `--worker CMD ARGS...`; the worker's own stdout/stderr/stdin are
//! the three channels back to the invoker (the pipe ends the spawner
//! captured). The process exit code is the command status: 0 on success,
//! 1 on failure or unknown command.

use crate::supervisor::dispatch::{forward_command, CommandStreams, DispatchTable};

/// Run one child-worker command against `table` and return the process
/// exit code.
pub async fn run_worker(table: &DispatchTable, args: Vec<String>) -> i32 {
    let streams = CommandStreams {
        out: Box::new(tokio::io::stdout()),
        err: Box::new(tokio::io::stderr()),
        input: Box::new(tokio::io::stdin()),
    };

    forward_command(
        table,
        "child worker",
        args,
        streams,
        Box::new(tokio::io::stderr()),
    )
    .await
}
