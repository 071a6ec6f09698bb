//! stat command - Check whether a resource exists

use std::fmt;

use clap::Args;
use serde::Serialize;

use crate::context::Context;
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Check whether a resource exists
#[derive(Args, Debug)]
pub struct StatArgs {
    /// Resource URI
    pub uri: String,
}

#[derive(Debug, Serialize)]
struct StatOutput {
    uri: String,
    exists: bool,
}

impl fmt::Display for StatOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.exists { "exists" } else { "missing" };
        write!(f, "{}: {state}", self.uri)
    }
}

/// Exits with `NotFound` when the resource is missing
pub fn execute(args: StatArgs, ctx: &Context, formatter: &Formatter) -> ExitCode {
    match ctx.dispatcher.exists(args.uri.as_str()) {
        Ok(exists) => {
            formatter.output(&StatOutput {
                uri: args.uri,
                exists,
            });
            if exists {
                ExitCode::Success
            } else {
                ExitCode::NotFound
            }
        }
        Err(e) => formatter.fail(&e),
    }
}
