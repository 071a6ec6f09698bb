//! CLI command definitions and execution
//!
//! Every command is thin glue over the Dispatcher: it resolves its URIs
//! through the shared [`Context`] and maps failures to exit codes.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::context::Context;
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

mod cat;
mod completions;
mod connections;
mod cp;
mod ls;
mod put;
mod rm;
mod stat;

/// urio - URI-addressed streaming I/O
///
/// Read, write, copy and list resources on S3, GCS, FTP, SFTP, PostgreSQL, HTTP
/// and local files through one URI syntax.
#[derive(Parser, Debug)]
#[command(name = "urio")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format: human-readable or JSON
    #[arg(long, global = true, default_value = "false")]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true, default_value = "false")]
    pub no_color: bool,

    /// Disable progress bar
    #[arg(long, global = true, default_value = "false")]
    pub no_progress: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true, default_value = "false")]
    pub debug: bool,

    /// Prefix of PREFIX__CONN__NAME environment variables
    #[arg(long, global = true, value_name = "PREFIX")]
    pub env_prefix: Option<String>,

    /// Configuration file (default: $URIO_CONFIG_DIR/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a resource to stdout
    Cat(cat::CatArgs),

    /// Write stdin to a resource
    Put(put::PutArgs),

    /// Stream one resource into another
    Cp(cp::CpArgs),

    /// List entries under a prefix
    Ls(ls::LsArgs),

    /// Remove resources
    Rm(rm::RmArgs),

    /// Check whether a resource exists
    Stat(stat::StatArgs),

    /// Show named connections (credentials redacted)
    Connections,

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Execute the CLI command and return an exit code
pub fn execute(cli: Cli) -> ExitCode {
    let output_config = OutputConfig {
        json: cli.json,
        no_color: cli.no_color,
        no_progress: cli.no_progress,
        quiet: cli.quiet,
    };
    let formatter = Formatter::new(output_config);

    // Completions need no configuration
    let command = match cli.command {
        Commands::Completions(args) => return completions::execute(args),
        other => other,
    };

    let ctx = match Context::load(cli.config.as_deref(), cli.env_prefix.as_deref()) {
        Ok(ctx) => ctx,
        Err(e) => return formatter.fail(&e),
    };

    match command {
        Commands::Cat(args) => cat::execute(args, &ctx, &formatter),
        Commands::Put(args) => put::execute(args, &ctx, &formatter),
        Commands::Cp(args) => cp::execute(args, &ctx, &formatter),
        Commands::Ls(args) => ls::execute(args, &ctx, &formatter),
        Commands::Rm(args) => rm::execute(args, &ctx, &formatter),
        Commands::Stat(args) => stat::execute(args, &ctx, &formatter),
        Commands::Connections => connections::execute(&ctx, &formatter),
        Commands::Completions(_) => ExitCode::Success,
    }
}
