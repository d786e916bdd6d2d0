use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use promote_core::config::{ConfigError, Settings};
use promote_core::history::{TagEvent, TagHistory, collect_tag_history, format_duration};
use promote_core::pipeline::{SyncOptions, fetch_registry};
use serde::Serialize;
use std::io::{self, Write};

use crate::output::{OutputMode, pretty_kv, pretty_rule, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct TagsReportArgs {
    /// Also report on TAG (repeatable), on top of tags_to_promote.
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    /// Only list tags still on their work item.
    #[arg(long)]
    pub open: bool,
}

#[derive(Debug, Serialize)]
struct TagsReport {
    #[serde(flatten)]
    history: TagHistory,
    requests: usize,
    fetch_failures: usize,
}

/// Execute `promote tags-report`: attribute every promotable tag in the
/// hierarchy from the work items' revision history.
///
/// # Errors
///
/// Returns an error if no tags are configured, settings are incomplete, or
/// the hierarchy query fails.
pub fn run_tags_report(args: &TagsReportArgs, settings: &Settings, output: OutputMode) -> Result<()> {
    let tags = super::promotable_tags(&settings.tags_to_promote, &args.tags);
    if tags.is_empty() {
        return Err(anyhow::Error::new(ConfigError::Missing(vec!["tags_to_promote"]))
            .context("No tags to report on; set tags_to_promote, PROMOTE_TAGS or --tag"));
    }

    let client = super::connect(settings)?;
    let options = SyncOptions::from_settings(settings);
    let fetched = fetch_registry(&client, &options, |_, _| {})?;

    let mut history = collect_tag_history(&client, &fetched.build.registry, &tags);
    if args.open {
        history.events.retain(TagEvent::is_open);
    }

    let report = TagsReport {
        history,
        requests: client.request_count(),
        fetch_failures: fetched.build.fetch_failures.len(),
    };
    render_mode(output, &report, write_text, write_pretty)
}

fn rfc3339(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(|| "-".to_string(), |at| at.to_rfc3339())
}

fn duration(event: &TagEvent) -> String {
    event.duration_secs.map_or_else(|| "-".to_string(), format_duration)
}

fn write_text(report: &TagsReport, w: &mut dyn Write) -> io::Result<()> {
    for event in &report.history.events {
        writeln!(
            w,
            "tag={} id={} added={} added_by={} removed={} removed_by={} duration={}",
            event.tag,
            event.work_item,
            rfc3339(event.added_at),
            event.added_by.as_deref().unwrap_or("-"),
            rfc3339(event.removed_at),
            event.removed_by.as_deref().unwrap_or("-"),
            duration(event).replace(' ', "")
        )?;
    }
    writeln!(w, "items={}", report.history.items)?;
    writeln!(w, "events={}", report.history.events.len())?;
    writeln!(w, "open={}", report.history.open().count())?;
    writeln!(w, "errors={}", report.history.errors.len())
}

fn pretty_stamp(at: Option<DateTime<Utc>>, by: Option<&str>) -> String {
    match (at, by) {
        (Some(at), Some(by)) => format!("{} by {by}", at.format("%Y-%m-%d %H:%M")),
        (Some(at), None) => at.format("%Y-%m-%d %H:%M").to_string(),
        (None, Some(by)) => format!("by {by}"),
        (None, None) => "-".to_string(),
    }
}

fn write_event(w: &mut dyn Write, event: &TagEvent) -> io::Result<()> {
    writeln!(
        w,
        "{} on {} {}. {}",
        event.tag, event.work_item_type, event.work_item, event.title
    )?;
    writeln!(w, "    added        {}", pretty_stamp(event.added_at, event.added_by.as_deref()))?;
    if event.is_open() {
        writeln!(w, "    removed      still tagged")?;
    } else {
        let removed = pretty_stamp(event.removed_at, event.removed_by.as_deref());
        writeln!(w, "    removed      {removed}")?;
        writeln!(w, "    duration     {}", duration(event))?;
    }
    if !event.current_tags.is_empty() {
        writeln!(w, "    tags now     {}", event.current_tags.join(", "))?;
    }
    Ok(())
}

fn write_pretty(report: &TagsReport, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, "Tag history")?;
    if report.history.events.is_empty() {
        writeln!(w, "No tag changes found.")?;
    }
    for event in &report.history.events {
        write_event(w, event)?;
    }

    writeln!(w)?;
    pretty_section(w, "Summary")?;
    pretty_kv(w, "tags", report.history.tags.join(", "))?;
    pretty_kv(w, "work items", report.history.items.to_string())?;
    pretty_kv(w, "entries", report.history.events.len().to_string())?;
    pretty_kv(w, "still tagged", report.history.open().count().to_string())?;
    pretty_kv(w, "requests", report.requests.to_string())?;
    if report.fetch_failures > 0 {
        pretty_kv(w, "failed batches", report.fetch_failures.to_string())?;
    }

    if !report.history.errors.is_empty() {
        writeln!(w)?;
        pretty_section(w, "Errors")?;
        for error in &report.history.errors {
            writeln!(w, "{error}")?;
        }
        pretty_rule(w)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use promote_core::model::WorkItemId;

    fn event(removed: bool) -> TagEvent {
        let added = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();
        let gone = Utc.with_ymd_and_hms(2024, 5, 3, 9, 30, 0).unwrap();
        TagEvent {
            work_item: WorkItemId(10),
            work_item_type: "User Story".to_string(),
            title: "S1".to_string(),
            tag: "blocked".to_string(),
            current_tags: vec!["perf".to_string()],
            added_at: Some(added),
            added_by: Some("Ada".to_string()),
            removed_at: removed.then_some(gone),
            removed_by: removed.then(|| "Grace".to_string()),
            duration_secs: removed.then(|| (gone - added).num_seconds()),
        }
    }

    fn report() -> TagsReport {
        TagsReport {
            history: TagHistory {
                tags: vec!["blocked".to_string()],
                items: 3,
                events: vec![event(true), event(false)],
                errors: vec!["E2004: history of work item 11: gone".to_string()],
            },
            requests: 5,
            fetch_failures: 0,
        }
    }

    #[test]
    fn text_is_one_line_per_entry() {
        let mut buf = Vec::new();
        write_text(&report(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let first = text.lines().next().unwrap();
        assert_eq!(
            first,
            "tag=blocked id=10 added=2024-05-02T08:00:00+00:00 added_by=Ada \
             removed=2024-05-03T09:30:00+00:00 removed_by=Grace duration=1d1h30m"
        );
        assert!(text.contains("removed=- removed_by=- duration=-"));
        assert!(text.contains("open=1\n"));
        assert!(text.ends_with("errors=1\n"));
    }

    #[test]
    fn pretty_shows_attribution_and_errors() {
        let mut buf = Vec::new();
        write_pretty(&report(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("Tag history\n"));
        assert!(text.contains("blocked on User Story 10. S1\n"));
        assert!(text.contains("2024-05-02 08:00 by Ada"));
        assert!(text.contains("1d 1h 30m"));
        assert!(text.contains("still tagged"));
        assert!(text.contains("E2004: history of work item 11"));
    }

    #[test]
    fn json_flattens_history() {
        let value = serde_json::to_value(report()).unwrap();
        assert_eq!(value["items"], 3);
        assert_eq!(value["requests"], 5);
        assert_eq!(value["events"][0]["added_by"], "Ada");
        assert!(value["events"][1].get("removed_at").is_none());
    }
}
