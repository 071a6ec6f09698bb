//! cp command - Stream one resource into another
//!
//! Source and destination may live on different backends; bytes flow through
//! in fixed-size chunks and the destination is committed only after the
//! source is exhausted.

use clap::Args;
use serde::Serialize;

use crate::context::Context;
use crate::exit_code::ExitCode;
use crate::output::{Formatter, ProgressBar};

/// Stream one resource into another
#[derive(Args, Debug)]
pub struct CpArgs {
    /// Source URI
    pub source: String,

    /// Destination URI (replaced)
    pub target: String,
}

#[derive(Debug, Serialize)]
struct CpOutput {
    source: String,
    target: String,
    bytes: u64,
}

pub fn execute(args: CpArgs, ctx: &Context, formatter: &Formatter) -> ExitCode {
    let progress = ProgressBar::transfer(formatter.config(), &args.target);

    let result = ctx
        .dispatcher
        .copy_with_progress(args.source.as_str(), args.target.as_str(), |total| {
            progress.set_position(total)
        });
    progress.finish_and_clear();

    match result {
        Ok(bytes) => {
            if formatter.is_json() {
                formatter.json(&CpOutput {
                    source: args.source,
                    target: args.target,
                    bytes,
                });
            } else {
                formatter.success(&format!(
                    "{} -> {} ({})",
                    args.source,
                    args.target,
                    humansize::format_size(bytes, humansize::BINARY)
                ));
            }
            ExitCode::Success
        }
        Err(e) => formatter.fail(&e),
    }
}
