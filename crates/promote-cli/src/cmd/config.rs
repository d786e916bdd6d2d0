use anyhow::Result;
use clap::Args;
use promote_core::config::{PROJECT_FILE, Settings, user_config_path};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

const ENV_KEYS: [&str; 5] = [
    "PROMOTE_ORG",
    "PROMOTE_PROJECT",
    "PROMOTE_TOKEN",
    "PROMOTE_REPORT_ONLY",
    "PROMOTE_TAGS",
];

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Exit non-zero when required settings are missing.
    #[arg(long)]
    pub check: bool,
}

#[derive(Debug, Serialize)]
struct SourceFile {
    path: PathBuf,
    present: bool,
}

#[derive(Debug, Serialize)]
struct ConfigReport {
    settings: Settings,
    missing: Vec<&'static str>,
    files: Vec<SourceFile>,
    env: Vec<&'static str>,
}

fn source_file(path: PathBuf) -> SourceFile {
    SourceFile {
        present: path.exists(),
        path,
    }
}

fn build_report(settings: &Settings, config: Option<&Path>, project_root: &Path) -> ConfigReport {
    let mut files = vec![source_file(
        config.map_or_else(|| project_root.join(PROJECT_FILE), Path::to_path_buf),
    )];
    if let Some(path) = user_config_path() {
        files.push(source_file(path));
    }
    ConfigReport {
        settings: settings.redacted(),
        missing: settings.missing_fields(),
        files,
        env: ENV_KEYS
            .into_iter()
            .filter(|key| std::env::var_os(key).is_some())
            .collect(),
    }
}

fn or_unset(value: Option<&String>) -> &str {
    value.map_or("(unset)", String::as_str)
}

/// Execute `promote config`: print effective settings with the token masked.
///
/// # Errors
///
/// Returns an error if settings cannot be loaded, or with `--check` if any
/// required setting is missing.
pub fn run_config(
    args: &ConfigArgs,
    settings: &Settings,
    config: Option<&Path>,
    project_root: &Path,
    output: OutputMode,
) -> Result<()> {
    let report = build_report(settings, config, project_root);

    render_mode(
        output,
        &report,
        |r, w| {
            let s = &r.settings;
            writeln!(w, "organization={}", or_unset(s.organization.as_ref()))?;
            writeln!(w, "project={}", or_unset(s.project.as_ref()))?;
            writeln!(w, "token={}", or_unset(s.token.as_ref()))?;
            writeln!(w, "label={}", s.label)?;
            writeln!(w, "report_only={}", s.report_only)?;
            writeln!(w, "page_size={}", s.page_size)?;
            writeln!(w, "api_version={}", s.api_version)?;
            writeln!(w, "tags_to_promote={}", s.tags_to_promote.join(","))?;
            writeln!(w, "missing={}", r.missing.join(","))
        },
        |r, w| {
            let s = &r.settings;
            pretty_section(w, "Settings")?;
            pretty_kv(w, "organization", or_unset(s.organization.as_ref()))?;
            pretty_kv(w, "project", or_unset(s.project.as_ref()))?;
            pretty_kv(w, "token", or_unset(s.token.as_ref()))?;
            pretty_kv(w, "query", or_unset(s.query.as_ref()))?;
            pretty_kv(w, "label", &s.label)?;
            pretty_kv(w, "report_only", s.report_only.to_string())?;
            pretty_kv(w, "page_size", s.page_size.to_string())?;
            pretty_kv(w, "api_version", &s.api_version)?;
            pretty_kv(w, "tags_to_promote", s.tags_to_promote.join(", "))?;
            writeln!(w)?;
            pretty_section(w, "Sources")?;
            for file in &r.files {
                let state = if file.present { "found" } else { "absent" };
                pretty_kv(w, state, file.path.display().to_string())?;
            }
            if !r.env.is_empty() {
                pretty_kv(w, "env", r.env.join(", "))?;
            }
            if !r.missing.is_empty() {
                writeln!(w)?;
                writeln!(w, "Missing: {}", r.missing.join(", "))?;
            }
            Ok(())
        },
    )?;

    if args.check {
        settings.connection()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use promote_core::config::SettingsFile;

    #[test]
    fn report_masks_token_and_lists_missing() {
        let settings = Settings::from(SettingsFile {
            organization: Some("contoso".to_string()),
            token: Some("secret".to_string()),
            ..SettingsFile::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let report = build_report(&settings, None, dir.path());

        assert_eq!(report.settings.token.as_deref(), Some("********"));
        assert_eq!(report.missing, vec!["project", "query"]);
        assert_eq!(report.files[0].path, dir.path().join(PROJECT_FILE));
        assert!(!report.files[0].present);
    }
}
