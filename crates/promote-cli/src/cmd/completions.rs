use anyhow::{Context as _, Result};
use clap::Args;
use clap_complete::{Shell, generate};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    #[arg(value_enum)]
    pub shell: Shell,

    /// Write the script to PATH instead of stdout, creating parent directories.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

/// Completion script for `command` under its own binary name.
fn write_script(shell: Shell, command: &mut clap::Command, w: &mut dyn Write) {
    let name = command.get_name().to_string();
    generate(shell, command, name, w);
}

/// Execute `promote completions`.
///
/// # Errors
///
/// Returns an error if the output file or its directory cannot be written.
pub fn run_completions(args: &CompletionsArgs, command: &mut clap::Command) -> Result<()> {
    let Some(path) = &args.output else {
        write_script(args.shell, command, &mut io::stdout().lock());
        return Ok(());
    };

    let mut script = Vec::new();
    write_script(args.shell, command, &mut script);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, script).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!(shell = %args.shell, path = %path.display(), "completions written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> clap::Command {
        clap::Command::new("promote").subcommand(clap::Command::new("sync"))
    }

    #[test]
    fn script_uses_the_command_name() {
        let mut buf = Vec::new();
        write_script(Shell::Bash, &mut command(), &mut buf);
        let script = String::from_utf8(buf).unwrap();
        assert!(script.contains("_promote()"));
        assert!(script.contains("sync"));
    }

    #[test]
    fn output_path_gets_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("completions/zsh/_promote");
        let args = CompletionsArgs {
            shell: Shell::Zsh,
            output: Some(path.clone()),
        };
        run_completions(&args, &mut command()).unwrap();
        let script = std::fs::read_to_string(path).unwrap();
        assert!(script.starts_with("#compdef promote"));
    }
}
