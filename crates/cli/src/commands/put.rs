//! put command - Write stdin to a resource
//!
//! The write is committed only when stdin reaches EOF; any failure aborts it.

use std::io::{self, Read};

use clap::Args;
use serde::Serialize;
use urio_core::{Operation, Result, WriteMode, WriteStream};

use crate::context::Context;
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Write stdin to a resource
#[derive(Args, Debug)]
pub struct PutArgs {
    /// Destination URI
    pub uri: String,

    /// Append instead of replacing
    #[arg(short, long)]
    pub append: bool,
}

#[derive(Debug, Serialize)]
struct PutOutput {
    uri: String,
    mode: &'static str,
    bytes: u64,
}

pub fn execute(args: PutArgs, ctx: &Context, formatter: &Formatter) -> ExitCode {
    let mode = if args.append {
        WriteMode::Append
    } else {
        WriteMode::Overwrite
    };

    let stdin = io::stdin();
    let result = ctx
        .dispatcher
        .with_writer(args.uri.as_str(), mode, |writer| {
            drain(&mut stdin.lock(), writer)
        });

    match result {
        Ok(bytes) => {
            if formatter.is_json() {
                formatter.json(&PutOutput {
                    uri: args.uri,
                    mode: if args.append { "append" } else { "overwrite" },
                    bytes,
                });
            } else {
                formatter.success(&format!(
                    "Wrote {} to {}",
                    humansize::format_size(bytes, humansize::BINARY),
                    args.uri
                ));
            }
            ExitCode::Success
        }
        Err(e) => formatter.fail(&e),
    }
}

fn drain(input: &mut impl Read, writer: &mut WriteStream) -> Result<u64> {
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => return Ok(writer.bytes_written()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(writer.target().transfer(Operation::Read, format!("stdin: {e}"))),
        };
        writer.write_all_bytes(&buf[..n])?;
    }
}
