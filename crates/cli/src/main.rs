//! urio - URI-addressed streaming I/O
//!
//! Reads, writes and copies resources on S3, GCS, FTP, SFTP, PostgreSQL, HTTP and
//! local files, addressed by URI.

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use urio_cli::commands::{self, Cli};

fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins; --debug raises the fallback level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.debug { "debug" } else { "warn" })
    });
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let exit_code = commands::execute(cli);

    std::process::exit(exit_code.as_i32());
}
