//! connections command - Show named connections
//!
//! Passwords and credential-like query values are always redacted.

use comfy_table::{Cell, Color, Table};
use serde::Serialize;

use crate::context::{Context, Source};
use crate::exit_code::ExitCode;
use crate::output::Formatter;

#[derive(Debug, Serialize)]
struct ConnectionInfo {
    name: String,
    uri: String,
    source: Source,
}

pub fn execute(ctx: &Context, formatter: &Formatter) -> ExitCode {
    let connections: Vec<ConnectionInfo> = ctx
        .connections()
        .into_iter()
        .map(|(name, uri, source)| ConnectionInfo { name, uri, source })
        .collect();

    if formatter.is_json() {
        formatter.json(&connections);
        return ExitCode::Success;
    }

    if connections.is_empty() {
        formatter.warning("No named connections configured");
        return ExitCode::Success;
    }

    formatter.println(&render_table(&connections, formatter.colors_enabled()).to_string());
    ExitCode::Success
}

fn render_table(connections: &[ConnectionInfo], colors: bool) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Name", "URI", "Source"]);
    for info in connections {
        let name = if colors {
            Cell::new(&info.name).fg(Color::Cyan)
        } else {
            Cell::new(&info.name)
        };
        let source = match info.source {
            Source::Config => "config",
            Source::Env => "env",
        };
        table.add_row(vec![name, Cell::new(&info.uri), Cell::new(source)]);
    }
    table
}
