use anyhow::{Context as _, Result};
use clap::Args;
use promote_core::config::{PROJECT_FILE, TEMPLATE};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::output::{OutputMode, render_mode};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing settings file.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct InitReport {
    path: PathBuf,
    overwritten: bool,
}

/// Execute `promote init`. Writes the commented settings template to
/// `promote.toml` in the project root, or to the global `--config` path.
///
/// # Errors
///
/// Returns an error if the target exists and `--force` is not set, or if
/// the file cannot be written.
pub fn run_init(args: &InitArgs, config: Option<&Path>, project_root: &Path, output: OutputMode) -> Result<()> {
    let path = config.map_or_else(|| project_root.join(PROJECT_FILE), Path::to_path_buf);
    let existed = path.exists();

    if existed && !args.force {
        anyhow::bail!(
            "{} already exists. Use `promote init --force` to overwrite it.",
            path.display()
        );
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(&path, TEMPLATE).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), overwritten = existed, "settings template written");

    let report = InitReport {
        path,
        overwritten: existed,
    };
    render_mode(
        output,
        &report,
        |r, w| writeln!(w, "path={}\noverwritten={}", r.path.display(), r.overwritten),
        |r, w| {
            writeln!(w, "Wrote {}", r.path.display())?;
            writeln!(w, "Fill in organization, project and token (or set PROMOTE_TOKEN),")?;
            writeln!(w, "then preview with `promote sync --report-only`.")
        },
    )
}
