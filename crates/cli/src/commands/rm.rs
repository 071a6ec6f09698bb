//! rm command - Remove resources
//!
//! Every URI is attempted; the exit code reflects the last failure.

use clap::Args;
use serde::Serialize;

use crate::context::Context;
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Remove resources
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Resource URI(s) to remove
    #[arg(required = true)]
    pub uris: Vec<String>,

    /// Ignore resources that do not exist
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct RmOutput {
    removed: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failed: Vec<String>,
}

pub fn execute(args: RmArgs, ctx: &Context, formatter: &Formatter) -> ExitCode {
    let mut code = ExitCode::Success;
    let mut removed = Vec::new();
    let mut failed = Vec::new();

    for uri in args.uris {
        match ctx.dispatcher.remove(uri.as_str()) {
            Ok(()) => {
                formatter.success(&format!("Removed {uri}"));
                removed.push(uri);
            }
            Err(urio_core::Error::NotFound { .. }) if args.force => {}
            Err(e) => {
                code = formatter.fail(&e);
                failed.push(uri);
            }
        }
    }

    if formatter.is_json() {
        formatter.json(&RmOutput { removed, failed });
    }
    code
}
