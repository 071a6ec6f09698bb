//! ls command - List entries under a prefix
//!
//! Paths are shown relative to the listed prefix; directories end with '/'.

use clap::Args;
use serde::Serialize;
use urio_core::{Entry, Result};

use crate::context::Context;
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// List entries under a prefix
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Prefix URI (e.g. ftp://host/dir/)
    pub uri: String,

    /// Show total count and size
    #[arg(long)]
    pub summarize: bool,
}

#[derive(Debug, Serialize)]
struct LsOutput {
    items: Vec<Entry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<Summary>,
}

#[derive(Debug, Serialize)]
struct Summary {
    total_files: usize,
    total_size_bytes: u64,
    total_size_human: String,
}

impl Summary {
    fn of(entries: &[Entry]) -> Self {
        let total_size_bytes = entries.iter().filter_map(|e| e.size).sum();
        Self {
            total_files: entries.iter().filter(|e| !e.is_dir).count(),
            total_size_bytes,
            total_size_human: humansize::format_size(total_size_bytes, humansize::BINARY),
        }
    }
}

pub fn execute(args: LsArgs, ctx: &Context, formatter: &Formatter) -> ExitCode {
    let entries = match ctx
        .dispatcher
        .list(args.uri.as_str())
        .and_then(|listing| listing.collect::<Result<Vec<_>>>())
    {
        Ok(entries) => entries,
        Err(e) => return formatter.fail(&e),
    };

    if formatter.is_json() {
        let summary = args.summarize.then(|| Summary::of(&entries));
        formatter.json(&LsOutput {
            items: entries,
            summary,
        });
        return ExitCode::Success;
    }

    for entry in &entries {
        formatter.println(&render(entry));
    }
    if args.summarize {
        let summary = Summary::of(&entries);
        formatter.println(&format!(
            "\nTotal: {} files, {}",
            summary.total_files, summary.total_size_human
        ));
    }
    ExitCode::Success
}

fn render(entry: &Entry) -> String {
    let date = entry
        .last_modified
        .map(|d| d.strftime("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| " ".repeat(19));
    let size = match (entry.is_dir, entry.size) {
        (true, _) | (false, None) => "-".to_string(),
        (false, Some(bytes)) => humansize::format_size(bytes, humansize::BINARY),
    };
    format!("[{date}] {size:>10} {}", entry.path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_file_and_dir() {
        let mut file = Entry::file("b.csv", 2048);
        file.last_modified = Some("2024-03-01T12:30:00Z".parse().unwrap());
        assert_eq!(render(&file), format!("[2024-03-01 12:30:00] {:>10} b.csv", "2 KiB"));
        assert_eq!(
            render(&Entry::dir("nested/")),
            format!("[{}] {:>10} nested/", " ".repeat(19), "-")
        );
    }

    #[test]
    fn test_summary_skips_dirs() {
        let entries = vec![
            Entry::file("a.csv", 10),
            Entry::file("b.csv", 20),
            Entry::dir("nested/"),
        ];
        let summary = Summary::of(&entries);
        assert_eq!(summary.total_files, 2);
        assert_eq!(summary.total_size_bytes, 30);
    }
}
