//! Cross-project recent-activity reports.
//!
//! Read-only: walks the registry and each conversation's log, never touching
//! statuses or scores. External agent logs configured under
//! `[[activity.external_sources]]` are reported alongside but never ingested.

pub mod external;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::ActivityConfig;
use crate::store::{EpisodicStore, SessionRegistry};
use crate::sync::lock;
use crate::types::{format_micros, InteractionStatus, MemxError, MemxResult, MICROS_PER_SEC};

pub use external::{scan_sources, ExternalRecord};

/// Source label for the engine's own interactions.
pub const ENGINE_SOURCE: &str = "memx";

/// One interaction in a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionSummary {
    /// Unix epoch microseconds.
    pub timestamp: u64,
    /// RFC 3339 rendering of `timestamp`.
    pub time: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<InteractionStatus>,
    /// Single-line prefix of the content.
    pub snippet: String,
}

/// Activity of one project within the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectActivity {
    pub source: String,
    pub project_key: String,
    /// Latest session activity recorded by the registry, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active_at: Option<u64>,
    /// Interactions in the window.
    pub total: usize,
    /// How many of `total` were left out of `items`.
    pub omitted: usize,
    /// Newest first.
    pub items: Vec<InteractionSummary>,
}

impl ProjectActivity {
    fn newest(&self) -> Option<u64> {
        self.items.first().map(|i| i.timestamp)
    }
}

/// Result of `get_recent_activity`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityReport {
    pub window_hours: f64,
    pub generated_at: u64,
    /// Every registry project: active ones newest first, then idle ones by key.
    pub projects: Vec<ProjectActivity>,
    /// External sources grouped by source and project.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub external: Vec<ProjectActivity>,
}

/// Builds [`ActivityReport`]s.
pub struct ActivityAggregator<'a> {
    registry: &'a SessionRegistry,
    episodic: &'a EpisodicStore,
    config: &'a ActivityConfig,
}

impl<'a> ActivityAggregator<'a> {
    pub fn new(
        registry: &'a SessionRegistry,
        episodic: &'a EpisodicStore,
        config: &'a ActivityConfig,
    ) -> Self {
        Self {
            registry,
            episodic,
            config,
        }
    }

    /// Activity within the last `window_hours` before `now`.
    pub fn recent_activity(&self, window_hours: f64, now: u64) -> MemxResult<ActivityReport> {
        if !(window_hours.is_finite() && window_hours > 0.0) {
            return Err(MemxError::Validation(format!(
                "window_hours must be positive, got {window_hours}"
            )));
        }
        let window = (window_hours * 3600.0 * MICROS_PER_SEC as f64) as u64;
        let cutoff = now.saturating_sub(window);

        let mut projects = Vec::new();
        for (key, entry) in self.registry.projects() {
            let mut summaries = Vec::new();
            for conversation_id in entry.conversation_ids() {
                summaries.extend(self.conversation_summaries(&conversation_id, cutoff)?);
            }
            let last = entry.last_active_at();
            projects.push(self.group(
                ENGINE_SOURCE,
                key,
                (last > 0).then_some(last),
                summaries,
            ));
        }
        sort_projects(&mut projects);

        let mut grouped: BTreeMap<(String, String), Vec<InteractionSummary>> = BTreeMap::new();
        for record in scan_sources(&self.config.external_sources, cutoff) {
            let summary = InteractionSummary {
                timestamp: record.timestamp,
                time: format_micros(record.timestamp),
                role: record.role,
                conversation_id: None,
                status: None,
                snippet: snippet(&record.content, self.config.snippet_chars),
            };
            grouped
                .entry((record.source, record.project))
                .or_default()
                .push(summary);
        }
        let mut external: Vec<ProjectActivity> = grouped
            .into_iter()
            .map(|((source, project), summaries)| self.group(&source, project, None, summaries))
            .collect();
        sort_projects(&mut external);

        Ok(ActivityReport {
            window_hours,
            generated_at: now,
            projects,
            external,
        })
    }

    fn conversation_summaries(
        &self,
        conversation_id: &str,
        cutoff: u64,
    ) -> MemxResult<Vec<InteractionSummary>> {
        if !self.episodic.contains(conversation_id) {
            return Ok(Vec::new());
        }
        let handle = self.episodic.log(conversation_id)?;
        let log = lock(&handle);
        Ok(log
            .interactions()
            .iter()
            .filter(|i| i.timestamp >= cutoff && i.status != InteractionStatus::Pruned)
            .map(|i| InteractionSummary {
                timestamp: i.timestamp,
                time: format_micros(i.timestamp),
                role: i.role.to_string(),
                conversation_id: Some(i.conversation_id.clone()),
                status: Some(i.status),
                snippet: snippet(&i.content, self.config.snippet_chars),
            })
            .collect())
    }

    fn group(
        &self,
        source: &str,
        project_key: String,
        last_active_at: Option<u64>,
        mut summaries: Vec<InteractionSummary>,
    ) -> ProjectActivity {
        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let total = summaries.len();
        summaries.truncate(self.config.max_items_per_project);
        ProjectActivity {
            source: source.to_string(),
            project_key,
            last_active_at,
            total,
            omitted: total - summaries.len(),
            items: summaries,
        }
    }
}

/// Projects with activity, newest first; idle projects after, by key.
fn sort_projects(projects: &mut [ProjectActivity]) {
    projects.sort_by(|a, b| match (a.newest(), b.newest()) {
        (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.project_key.cmp(&b.project_key)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.project_key.cmp(&b.project_key),
    });
}

/// Collapse whitespace and cut to `max_chars`, marking truncation with `...`.
pub fn snippet(content: &str, max_chars: usize) -> String {
    let line = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.chars().count() <= max_chars {
        return line;
    }
    let mut cut: String = line.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}
