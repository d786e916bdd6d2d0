pub mod completions;
pub mod config;
pub mod init;
pub mod snapshot;
pub mod sync;
pub mod tags_report;
pub mod tree;

use anyhow::{Context as _, Result};
use promote_core::config::Settings;
use promote_core::graph::Registry;
use promote_core::snapshot::load_snapshot;
use std::path::Path;

use crate::azdo::AzureDevOpsClient;

/// Client for the configured organization and project.
///
/// # Errors
///
/// Returns an error naming every required setting that is unset.
pub fn connect(settings: &Settings) -> Result<AzureDevOpsClient> {
    let connection = settings
        .connection()
        .context("Cannot reach Azure DevOps without complete settings")?;
    tracing::debug!(
        organization = %connection.organization,
        project = %connection.project,
        api_version = %connection.api_version,
        "connecting"
    );
    Ok(AzureDevOpsClient::new(&connection))
}

/// Load a snapshot file as a registry, with path context on failure.
pub fn load_registry(path: &Path) -> Result<Registry> {
    load_snapshot(path).with_context(|| format!("Failed to load snapshot {}", path.display()))
}

/// Configured tags plus any given with `--tag`, compared case-insensitively.
pub fn promotable_tags(configured: &[String], extra: &[String]) -> Vec<String> {
    let mut tags = configured.to_vec();
    for tag in extra.iter().map(|tag| tag.trim()).filter(|tag| !tag.is_empty()) {
        if !tags.iter().any(|known| known.eq_ignore_ascii_case(tag)) {
            tags.push(tag.to_string());
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_tags_are_appended_once() {
        let tags = promotable_tags(
            &["blocked".to_string()],
            &["Blocked".to_string(), "perf".to_string(), " ".to_string(), "perf".to_string()],
        );
        assert_eq!(tags, vec!["blocked", "perf"]);
    }
}
