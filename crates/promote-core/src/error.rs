use std::fmt;

/// Machine-readable error codes for operator and script decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigNotFound,
    ConfigParseError,
    MissingSettings,
    EdgeQueryFailed,
    BatchFetchFailed,
    MalformedHierarchy,
    HistoryFetchFailed,
    PatchFailed,
    SnapshotReadFailed,
    SnapshotWriteFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigNotFound => "E1001",
            Self::ConfigParseError => "E1002",
            Self::MissingSettings => "E1003",
            Self::EdgeQueryFailed => "E2001",
            Self::BatchFetchFailed => "E2002",
            Self::MalformedHierarchy => "E2003",
            Self::HistoryFetchFailed => "E2004",
            Self::PatchFailed => "E3001",
            Self::SnapshotReadFailed => "E4001",
            Self::SnapshotWriteFailed => "E4002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigNotFound => "Settings file not found",
            Self::ConfigParseError => "Settings file parse error",
            Self::MissingSettings => "Required settings are missing",
            Self::EdgeQueryFailed => "Hierarchy query failed",
            Self::BatchFetchFailed => "Work-item batch fetch failed",
            Self::MalformedHierarchy => "Malformed work-item hierarchy",
            Self::HistoryFetchFailed => "Work-item history fetch failed",
            Self::PatchFailed => "Work-item update failed",
            Self::SnapshotReadFailed => "Snapshot read failed",
            Self::SnapshotWriteFailed => "Snapshot write failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound => Some("Run `promote init` to write a settings template."),
            Self::ConfigParseError => Some("Fix syntax in promote.toml and retry."),
            Self::MissingSettings => Some(
                "Set organization, project, token and query in promote.toml or PROMOTE_* env vars.",
            ),
            Self::EdgeQueryFailed => {
                Some("Check the query text and that the token can read work items.")
            }
            Self::BatchFetchFailed => Some("Re-run; affected subtrees were skipped this time."),
            Self::MalformedHierarchy => {
                Some("Each work item must have at most one parent and no cycles.")
            }
            Self::HistoryFetchFailed => Some("Re-run; items without history were left out of the report."),
            Self::PatchFailed => Some("Check that the token has work-item write scope."),
            Self::SnapshotReadFailed => {
                Some("Re-create the snapshot with `promote snapshot --output <PATH>`.")
            }
            Self::SnapshotWriteFailed => Some("Check disk space and write permissions."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;
    use std::collections::HashSet;

    const ALL: [ErrorCode; 11] = [
        ErrorCode::ConfigNotFound,
        ErrorCode::ConfigParseError,
        ErrorCode::MissingSettings,
        ErrorCode::EdgeQueryFailed,
        ErrorCode::BatchFetchFailed,
        ErrorCode::MalformedHierarchy,
        ErrorCode::HistoryFetchFailed,
        ErrorCode::PatchFailed,
        ErrorCode::SnapshotReadFailed,
        ErrorCode::SnapshotWriteFailed,
        ErrorCode::InternalUnexpected,
    ];

    #[test]
    fn all_codes_are_unique() {
        let mut seen = HashSet::new();
        for code in ALL {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        for code in ALL {
            let raw = code.code();
            assert_eq!(raw.len(), 5);
            assert!(raw.starts_with('E'));
            assert!(raw.chars().skip(1).all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn display_is_the_code() {
        assert_eq!(ErrorCode::PatchFailed.to_string(), "E3001");
    }
}
