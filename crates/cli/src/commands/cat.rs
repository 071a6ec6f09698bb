//! cat command - Write resource contents to stdout
//!
//! Streams chunk by chunk, so arbitrarily large resources never sit in memory.

use std::io::{self, Write};

use clap::Args;
use urio_core::{ReadStream, Result};

use crate::context::Context;
use crate::exit_code::ExitCode;
use crate::output::Formatter;

const CHUNK_SIZE: usize = 64 * 1024;

/// Write resource contents to stdout
#[derive(Args, Debug)]
pub struct CatArgs {
    /// Resource URI(s), written in order
    #[arg(required = true)]
    pub uris: Vec<String>,
}

pub fn execute(args: CatArgs, ctx: &Context, formatter: &Formatter) -> ExitCode {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for uri in &args.uris {
        let mut reader = match ctx.dispatcher.open_reader(uri.as_str()) {
            Ok(reader) => reader,
            Err(e) => return formatter.fail(&e),
        };
        match pump(&mut reader, &mut out) {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => return ExitCode::Success,
            Ok(Err(e)) => {
                formatter.error(&format!("Failed to write to stdout: {e}"));
                return ExitCode::GeneralError;
            }
            Err(e) => return formatter.fail(&e),
        }
        if let Err(e) = reader.close() {
            return formatter.fail(&e);
        }
    }

    match out.flush() {
        Ok(()) => ExitCode::Success,
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => ExitCode::Success,
        Err(e) => {
            formatter.error(&format!("Failed to write to stdout: {e}"));
            ExitCode::GeneralError
        }
    }
}

/// Copy `reader` into `out`; the outer error is the backend's, the inner the sink's
fn pump(reader: &mut ReadStream, out: &mut impl Write) -> Result<io::Result<()>> {
    loop {
        let chunk = reader.read_chunk(CHUNK_SIZE)?;
        if chunk.is_empty() {
            return Ok(Ok(()));
        }
        if let Err(e) = out.write_all(&chunk) {
            return Ok(Err(e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use urio_core::Target;

    #[test]
    fn test_pump_copies_everything() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let mut reader = ReadStream::from_reader(
            Target::new("memory", "ns"),
            "/blob",
            io::Cursor::new(data.clone()),
        );
        let mut out = Vec::new();
        pump(&mut reader, &mut out).unwrap().unwrap();
        assert_eq!(out, data);
    }
}
