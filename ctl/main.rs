#![forbid(unsafe_code)]

//! `procwarden-ctl` — local CLI companion for `procwarden`.
//!
//! Connects to the supervisor's IPC socket, sends one command request, and
//! relays the response frames: `out` frames to stdout, `err` frames to
//! stderr, local stdin forwarded as `in` frames. Exits with the status
//! carried by the final `exit` frame.

use std::io::{BufRead, BufReader, Read, Write};

use clap::Parser;
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};
use serde::{Deserialize, Serialize};

#[derive(Debug, Parser)]
#[command(
    name = "procwarden-ctl",
    about = "Local CLI for the procwarden supervisor",
    version,
    long_about = None
)]
struct Cli {
    /// IPC socket name (must match the server's `ipc_name` config).
    #[arg(long, default_value = "procwarden")]
    ipc_name: String,

    /// Do not forward local stdin to the command.
    #[arg(long)]
    no_input: bool,

    /// Command name followed by its arguments.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

/// Wire types for the control protocol, defined locally because the ctl
/// binary does not depend on the library crate.
#[derive(Debug, Serialize)]
struct Request<'a> {
    args: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ResponseFrame {
    channel: String,
    data: Option<String>,
    code: Option<i32>,
}

#[derive(Debug, Serialize)]
struct InputFrame<'a> {
    channel: &'static str,
    data: &'a str,
}

fn main() {
    let args = Cli::parse();

    match run(&args) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Failed to talk to supervisor: {err}");
            eprintln!("Is procwarden running with ipc_name '{}'?", args.ipc_name);
            std::process::exit(1);
        }
    }
}

fn run(args: &Cli) -> Result<i32, Box<dyn std::error::Error>> {
    let name = args.ipc_name.clone().to_ns_name::<GenericNamespaced>()?;
    let stream = Stream::connect(name)?;
    let (recv, mut send) = stream.split();

    let mut request_line = serde_json::to_string(&Request { args: &args.args })?;
    request_line.push('\n');
    send.write_all(request_line.as_bytes())?;
    send.flush()?;

    // Forward local stdin line-by-line as `in` frames; dropping the send
    // half on EOF closes the command's input channel. The thread dies with
    // the process when the exit frame arrives.
    if args.no_input {
        drop(send);
    } else {
        std::thread::spawn(move || forward_stdin(&mut send));
    }

    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let mut reader = BufReader::new(recv);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            // Server went away without an exit frame.
            return Ok(1);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let frame: ResponseFrame = serde_json::from_str(trimmed)?;
        match frame.channel.as_str() {
            "out" => {
                stdout.write_all(frame.data.unwrap_or_default().as_bytes())?;
                stdout.flush()?;
            }
            "err" => {
                stderr.write_all(frame.data.unwrap_or_default().as_bytes())?;
                stderr.flush()?;
            }
            "exit" => return Ok(frame.code.unwrap_or(1)),
            other => eprintln!("warning: unknown response channel '{other}'"),
        }
    }
}

fn forward_stdin(send: &mut impl Write) {
    let stdin = std::io::stdin();
    let mut buf = [0u8; 4096];
    let mut handle = stdin.lock();
    loop {
        match handle.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let data = String::from_utf8_lossy(&buf[..n]);
                let Ok(mut frame_line) = serde_json::to_string(&InputFrame {
                    channel: "in",
                    data: &data,
                }) else {
                    break;
                };
                frame_line.push('\n');
                if send.write_all(frame_line.as_bytes()).is_err() || send.flush().is_err() {
                    break;
                }
            }
        }
    }
}
