//! LIST output parsing

use std::str::FromStr;

use suppaftp::list::File;
use urio_core::Entry;

/// Parse one LIST line into an entry; `.`/`..` and unparseable lines yield `None`
pub(crate) fn parse_line(line: &str) -> Option<Entry> {
    let file = match File::from_str(line) {
        Ok(file) => file,
        Err(_) => {
            tracing::debug!(line, "Skipping unparseable LIST line");
            return None;
        }
    };

    let name = file.name();
    if name == "." || name == ".." {
        return None;
    }

    let modified = jiff::Timestamp::try_from(file.modified()).ok();
    let entry = if file.is_directory() {
        Entry::dir(name)
    } else {
        Entry::file(name, file.size() as u64)
    };
    Some(entry.with_last_modified(modified))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posix_file() {
        let entry =
            parse_line("-rw-r--r--    1 1000     1000         1234 Jan 15 10:30 report.csv").unwrap();
        assert_eq!(entry.path, "report.csv");
        assert!(!entry.is_dir);
        assert_eq!(entry.size, Some(1234));
        assert!(entry.last_modified.is_some());
    }

    #[test]
    fn test_posix_directory() {
        let entry = parse_line("drwxr-xr-x    2 1000     1000         4096 Mar 01  2023 archive").unwrap();
        assert_eq!(entry.path, "archive/");
        assert!(entry.is_dir);
    }

    #[test]
    fn test_dos_format() {
        let entry = parse_line("04-27-23  09:14AM       <DIR>          logs").unwrap();
        assert_eq!(entry.path, "logs/");
    }

    #[test]
    fn test_skips_dot_entries_and_garbage() {
        assert!(parse_line("drwxr-xr-x    2 1000     1000         4096 Mar 01  2023 .").is_none());
        assert!(parse_line("drwxr-xr-x    2 1000     1000         4096 Mar 01  2023 ..").is_none());
        assert!(parse_line("total 12").is_none());
    }
}
