use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ErrorCode;
use crate::graph::DEFAULT_PAGE_SIZE;
use crate::model::parse_tags;
use crate::rollup::DEFAULT_LABEL;

/// Settings file looked up in the working directory.
pub const PROJECT_FILE: &str = "promote.toml";

/// Placeholder in the query text replaced by the configured project.
pub const PROJECT_PLACEHOLDER: &str = "{project}";

pub const DEFAULT_API_VERSION: &str = "6.0";

/// Recursive parent→child link query over one team project.
pub const DEFAULT_QUERY: &str = "SELECT [System.Id] FROM WorkItemLinks \
WHERE ([Source].[System.TeamProject] = '{project}') \
AND ([System.Links.LinkType] = 'System.LinkTypes.Hierarchy-Forward') \
MODE (Recursive)";

/// Commented settings template written by `promote init`.
pub const TEMPLATE: &str = r#"# promote settings
#
# Values here can be overridden with PROMOTE_ORG, PROMOTE_PROJECT,
# PROMOTE_TOKEN, PROMOTE_REPORT_ONLY and PROMOTE_TAGS.

# Azure DevOps organization and team project.
organization = ""
project = ""

# Personal access token with work-item read/write scope.
# Prefer PROMOTE_TOKEN over storing it here.
token = ""

# Hierarchy query. {project} is replaced with the project above.
query = "SELECT [System.Id] FROM WorkItemLinks WHERE ([Source].[System.TeamProject] = '{project}') AND ([System.Links.LinkType] = 'System.LinkTypes.Hierarchy-Forward') MODE (Recursive)"

# Heading written above promoted content. Its presence marks a parent as
# already promoted.
label = "Rollup"

# Log intended updates without writing them.
report_only = true

# Tags copied from children onto their parents. PROMOTE_TAGS takes a
# comma or semicolon separated list; `promote sync --tag` adds to it.
tags_to_promote = []

# page_size = 200
# api_version = "6.0"
"#;

/// Errors raised while loading or validating settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("settings file {} not found", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("missing required settings: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
}

impl ConfigError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } | Self::Read { .. } => ErrorCode::ConfigNotFound,
            Self::Parse { .. } => ErrorCode::ConfigParseError,
            Self::Missing(_) => ErrorCode::MissingSettings,
        }
    }
}

/// One settings source as written on disk. Every field is optional so
/// sources can be layered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub report_only: Option<bool>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub tags_to_promote: Option<Vec<String>>,
}

impl SettingsFile {
    /// Field-wise merge; values in `self` win.
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        Self {
            organization: self.organization.or(fallback.organization),
            project: self.project.or(fallback.project),
            token: self.token.or(fallback.token),
            query: self.query.or(fallback.query),
            label: self.label.or(fallback.label),
            report_only: self.report_only.or(fallback.report_only),
            page_size: self.page_size.or(fallback.page_size),
            api_version: self.api_version.or(fallback.api_version),
            tags_to_promote: self.tags_to_promote.or(fallback.tags_to_promote),
        }
    }
}

/// Effective settings after layering and defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub organization: Option<String>,
    pub project: Option<String>,
    pub token: Option<String>,
    pub query: Option<String>,
    pub label: String,
    pub report_only: bool,
    pub page_size: usize,
    pub api_version: String,
    pub tags_to_promote: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from(SettingsFile::default())
    }
}

impl From<SettingsFile> for Settings {
    fn from(file: SettingsFile) -> Self {
        Self {
            organization: non_empty(file.organization),
            project: non_empty(file.project),
            token: non_empty(file.token),
            query: non_empty(file.query),
            label: non_empty(file.label).unwrap_or_else(|| DEFAULT_LABEL.to_string()),
            report_only: file.report_only.unwrap_or(false),
            page_size: file.page_size.filter(|size| *size > 0).unwrap_or(DEFAULT_PAGE_SIZE),
            api_version: non_empty(file.api_version).unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            tags_to_promote: file.tags_to_promote.unwrap_or_default(),
        }
    }
}

/// What the tracker client needs, all present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub organization: String,
    pub project: String,
    pub token: String,
    pub api_version: String,
    /// Query text with the project substituted.
    pub query: String,
}

impl Settings {
    /// Names of settings required to talk to the tracker that are unset.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("organization", self.organization.is_none()),
            ("project", self.project.is_none()),
            ("token", self.token.is_none()),
            ("query", self.query.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect()
    }

    /// Query text with `{project}` replaced.
    #[must_use]
    pub fn rendered_query(&self) -> Option<String> {
        let query = self.query.as_deref()?;
        Some(query.replace(PROJECT_PLACEHOLDER, self.project.as_deref().unwrap_or_default()))
    }

    /// Validate and extract connection settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] naming every unset required field.
    pub fn connection(&self) -> Result<Connection, ConfigError> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }
        match (&self.organization, &self.project, &self.token, self.rendered_query()) {
            (Some(organization), Some(project), Some(token), Some(query)) => Ok(Connection {
                organization: organization.clone(),
                project: project.clone(),
                token: token.clone(),
                api_version: self.api_version.clone(),
                query,
            }),
            _ => Err(ConfigError::Missing(self.missing_fields())),
        }
    }

    /// Copy with the token masked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        Self {
            token: self.token.as_ref().map(|_| "********".to_string()),
            ..self.clone()
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse one settings file.
///
/// # Errors
///
/// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
pub fn read_settings_file(path: &Path) -> Result<SettingsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str::<SettingsFile>(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("promote/config.toml"))
}

fn read_optional(path: &Path) -> Result<SettingsFile, ConfigError> {
    if path.exists() {
        read_settings_file(path)
    } else {
        Ok(SettingsFile::default())
    }
}

/// Overlay `PROMOTE_*` environment values read through `lookup`.
pub fn apply_env_overrides<F>(file: SettingsFile, lookup: F) -> SettingsFile
where
    F: Fn(&str) -> Option<String>,
{
    let env = SettingsFile {
        organization: lookup("PROMOTE_ORG"),
        project: lookup("PROMOTE_PROJECT"),
        token: lookup("PROMOTE_TOKEN"),
        report_only: lookup("PROMOTE_REPORT_ONLY").and_then(|raw| parse_flag(&raw)),
        tags_to_promote: lookup("PROMOTE_TAGS")
            .map(|raw| parse_tags(Some(&raw)))
            .filter(|tags| !tags.is_empty()),
        ..SettingsFile::default()
    };
    SettingsFile {
        organization: non_empty(env.organization),
        project: non_empty(env.project),
        token: non_empty(env.token),
        ..env
    }
    .or(file)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            tracing::warn!(value = other, "ignoring unrecognized PROMOTE_REPORT_ONLY value");
            None
        }
    }
}

/// Layer project file, user file and environment into effective settings.
///
/// `explicit` replaces the project file lookup and must exist.
///
/// # Errors
///
/// Returns an error if a settings file exists but cannot be read or parsed,
/// or if `explicit` names a missing file.
pub fn resolve_settings(explicit: Option<&Path>, project_root: &Path) -> Result<Settings> {
    let project = match explicit {
        Some(path) if !path.exists() => {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            })
            .context("Failed to load settings");
        }
        Some(path) => read_settings_file(path),
        None => read_optional(&project_root.join(PROJECT_FILE)),
    }
    .context("Failed to load project settings")?;

    let user = match user_config_path() {
        Some(path) => read_optional(&path).context("Failed to load user settings")?,
        None => SettingsFile::default(),
    };

    let layered = apply_env_overrides(project.or(user), |key| std::env::var(key).ok());
    Ok(Settings::from(layered))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_string())
        }
    }

    #[test]
    fn defaults_fill_unset_fields() {
        let settings = Settings::default();
        assert_eq!(settings.label, "Rollup");
        assert_eq!(settings.page_size, 200);
        assert_eq!(settings.api_version, "6.0");
        assert!(!settings.report_only);
        assert!(settings.tags_to_promote.is_empty());
    }

    #[test]
    fn template_parses_and_needs_credentials() {
        let file: SettingsFile = toml::from_str(TEMPLATE).expect("template parses");
        let settings = Settings::from(file);
        assert!(settings.report_only);
        assert_eq!(settings.query.as_deref(), Some(DEFAULT_QUERY));
        assert_eq!(settings.missing_fields(), vec!["organization", "project", "token"]);
    }

    #[test]
    fn project_file_wins_over_user_file() {
        let project: SettingsFile = toml::from_str(r#"project = "Web""#).unwrap();
        let user: SettingsFile = toml::from_str(
            r#"
organization = "contoso"
project = "Ignored"
label = "ACAI"
"#,
        )
        .unwrap();
        let settings = Settings::from(project.or(user));
        assert_eq!(settings.project.as_deref(), Some("Web"));
        assert_eq!(settings.organization.as_deref(), Some("contoso"));
        assert_eq!(settings.label, "ACAI");
    }

    #[test]
    fn env_overrides_files() {
        let file: SettingsFile = toml::from_str(
            r#"
organization = "contoso"
token = "from-file"
report_only = false
"#,
        )
        .unwrap();
        let layered = apply_env_overrides(
            file,
            env_of(&[("PROMOTE_TOKEN", "from-env"), ("PROMOTE_REPORT_ONLY", "yes")]),
        );
        let settings = Settings::from(layered);
        assert_eq!(settings.token.as_deref(), Some("from-env"));
        assert_eq!(settings.organization.as_deref(), Some("contoso"));
        assert!(settings.report_only);
    }

    #[test]
    fn env_tags_replace_file_tags() {
        let file = SettingsFile {
            tags_to_promote: Some(vec!["from-file".to_string()]),
            ..SettingsFile::default()
        };
        let settings = Settings::from(apply_env_overrides(
            file.clone(),
            env_of(&[("PROMOTE_TAGS", "blocked, needs review;perf")]),
        ));
        assert_eq!(settings.tags_to_promote, vec!["blocked", "needs review", "perf"]);

        let blank = Settings::from(apply_env_overrides(file, env_of(&[("PROMOTE_TAGS", " ; ")])));
        assert_eq!(blank.tags_to_promote, vec!["from-file"]);
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let file = SettingsFile {
            project: Some("Web".to_string()),
            ..SettingsFile::default()
        };
        let settings = Settings::from(apply_env_overrides(file, env_of(&[("PROMOTE_PROJECT", "")])));
        assert_eq!(settings.project.as_deref(), Some("Web"));
    }

    #[test]
    fn connection_renders_query() {
        let settings = Settings::from(SettingsFile {
            organization: Some("contoso".to_string()),
            project: Some("Web".to_string()),
            token: Some("pat".to_string()),
            query: Some(DEFAULT_QUERY.to_string()),
            ..SettingsFile::default()
        });
        let connection = settings.connection().expect("complete settings");
        assert!(connection.query.contains("= 'Web'"));
        assert!(!connection.query.contains(PROJECT_PLACEHOLDER));
    }

    #[test]
    fn connection_lists_missing_fields() {
        let err = Settings::default().connection().unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingSettings);
        assert_eq!(
            err.to_string(),
            "missing required settings: organization, project, token, query"
        );
    }

    #[test]
    fn redacted_masks_token_only() {
        let settings = Settings {
            token: Some("secret".to_string()),
            ..Settings::default()
        };
        let redacted = settings.redacted();
        assert_eq!(redacted.token.as_deref(), Some("********"));
        assert_eq!(redacted.label, settings.label);
        assert!(Settings::default().redacted().token.is_none());
    }

    #[test]
    fn zero_page_size_falls_back_to_default() {
        let settings = Settings::from(SettingsFile {
            page_size: Some(0),
            ..SettingsFile::default()
        });
        assert_eq!(settings.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn explicit_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = resolve_settings(Some(&missing), dir.path()).unwrap_err();
        let config_err = err.downcast_ref::<ConfigError>().expect("config error");
        assert_eq!(config_err.code(), ErrorCode::ConfigNotFound);
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROJECT_FILE);
        std::fs::write(&path, "label = [").unwrap();
        let err = read_settings_file(&path).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigParseError);
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "label = \"Custom\"\npage_size = 50\n").unwrap();
        let settings = resolve_settings(Some(&path), dir.path()).unwrap();
        assert_eq!(settings.label, "Custom");
        assert_eq!(settings.page_size, 50);
    }
}
