//! completions command - Print a shell completion script

use std::io::{self, Write};

use clap::CommandFactory;
use clap_complete::Shell;

use super::Cli;
use crate::exit_code::ExitCode;

/// Print a shell completion script
#[derive(clap::Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,
}

pub fn execute(args: CompletionsArgs) -> ExitCode {
    match io::stdout().lock().write_all(&script(args.shell)) {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            eprintln!("Failed to write completions: {e}");
            ExitCode::GeneralError
        }
    }
}

fn script(shell: Shell) -> Vec<u8> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    let mut buf = Vec::new();
    clap_complete::generate(shell, &mut cmd, name, &mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_name_the_binary() {
        for (shell, marker) in [
            (Shell::Bash, "complete"),
            (Shell::Zsh, "compdef"),
            (Shell::Fish, "complete -c urio"),
            (Shell::PowerShell, "Register-ArgumentCompleter"),
        ] {
            let text = String::from_utf8(script(shell)).unwrap();
            assert!(text.contains("urio"), "{shell}");
            assert!(text.contains(marker), "{shell}");
        }
    }

    #[test]
    fn test_subcommands_are_completed() {
        let text = String::from_utf8(script(Shell::Bash)).unwrap();
        for sub in ["cat", "put", "cp", "ls", "rm", "stat", "connections"] {
            assert!(text.contains(sub), "{sub}");
        }
    }
}
