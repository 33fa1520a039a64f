//! Built-in supervisor commands.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::flow::Flow;
use crate::supervisor::dispatch::DispatchTable;
use crate::supervisor::session::SupervisorContext;
use crate::supervisor::status::render_status;
use crate::AppError;

/// Register the supervisor's built-in commands (`STATUS`, `INVOKE`,
/// `SHUTDOWN`) against `table`.
pub fn register_builtins(table: &mut DispatchTable, ctx: &Arc<SupervisorContext>) {
    let status_ctx = Arc::clone(ctx);
    table.register("status", move |_args, mut streams| {
        let ctx = Arc::clone(&status_ctx);
        async move {
            let report = render_status(&ctx.registry);
            streams.out.write_all(report.as_bytes()).await?;
            streams.out.flush().await?;
            Ok(())
        }
    });

    let invoke_ctx = Arc::clone(ctx);
    table.register("invoke", move |args, streams| {
        let ctx = Arc::clone(&invoke_ctx);
        async move { invoke_child(&ctx, args, streams).await }
    });

    let shutdown_ctx = Arc::clone(ctx);
    table.register("shutdown", move |_args, mut streams| {
        let ctx = Arc::clone(&shutdown_ctx);
        async move {
            streams.out.write_all(b"supervisor shutting down\n").await?;
            streams.out.flush().await?;
            ctx.shutdown.cancel();
            Ok(())
        }
    });
}

/// Invoke a child worker, register its pid, subscribe to both of its
/// output streams, and relay them to the client until the child's tasks
/// complete.
async fn invoke_child(
    ctx: &Arc<SupervisorContext>,
    args: Vec<String>,
    streams: crate::supervisor::dispatch::CommandStreams,
) -> crate::Result<()> {
    if args.is_empty() {
        return Err(AppError::Dispatch(
            "invoke requires a child-worker command".into(),
        ));
    }

    let command_line = args.join(" ");
    let invocation = ctx.spawner.invoke_ex(&args)?;
    let pid = invocation.pid;
    ctx.registry.register(pid, &command_line);

    let out = streams.out;
    let err = streams.err;
    let input = streams.input;
    let mut completions = Flow::subscribe(invocation, Arc::clone(&ctx.signaller))
        .on_output(move |mut stream, subscription| async move {
            // Relay client input into the child's stdin; client EOF closes
            // the pipe so the child sees end-of-input.
            let pump = subscription.request_stream().map(|mut stdin| {
                tokio::spawn(async move {
                    let mut input = input;
                    if tokio::io::copy(&mut input, &mut stdin).await.is_ok() {
                        let _ = stdin.shutdown().await;
                    }
                })
            });

            let mut out = out;
            let copied = tokio::io::copy(&mut stream, &mut out).await;
            // Output EOF means the child is gone; stop feeding it.
            if let Some(pump) = pump {
                pump.abort();
            }
            copied?;
            Ok(())
        })
        .on_error(move |mut stream, _subscription| async move {
            let mut err = err;
            tokio::io::copy(&mut stream, &mut err).await?;
            Ok(())
        })
        .start()?;

    // Harvest both consumer-task completions; per-task failures are
    // reported but do not fail the sibling task.
    while let Some(outcome) = completions.take().await {
        if let Err(task_err) = outcome {
            warn!(%task_err, "flow consumer task failed");
        }
    }

    ctx.registry.unregister(pid);
    Ok(())
}
