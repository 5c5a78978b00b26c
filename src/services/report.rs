//! Report data handed to the external renderer.
//!
//! [`ReportBuilder`] turns a store snapshot into one row per test, per-status
//! counts and the namespace rollup tree. Rendering is left to a
//! [`ReportRenderer`]; the crate ships one that writes the data as JSON.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::report_tree::{ReportNode, TreeEntry};
use crate::domain::models::{
    ExceptionInfo, FileDescriptor, OverallStatus, PhaseStatuses, RunContext, StatusCounts,
    TestRecord,
};
use crate::domain::{HubError, PluginResult};

/// Matches the http(s) URLs found in a short traceback.
const URL_PATTERN: &str = r"https?://[^/\s]+(?:/[^/\s?]+)*/?(?:\?(?:[^&\s=]+(?:=[^&\s]+)?&?)*)?";

const FILE_TYPE_SHORT_TB: &str = "short_tb";
const SKIP_PROVIDER: &str = "provider";
const SKIP_BLOCKER: &str = "blocker";

/// Name of the file written by [`JsonReportRenderer`].
pub const REPORT_FILE_NAME: &str = "report.json";

/// Knobs for report generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportOptions {
    /// Leave passed tests out of the row list. Counts and the tree still
    /// include them.
    pub only_failed: bool,
    /// Keep only rows whose name contains this text followed by `-` or `]`.
    pub name_filter: Option<String>,
}

/// A file attached to a test, with its path relative to the report directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportFile {
    #[serde(flatten)]
    pub descriptor: FileDescriptor,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileGroup {
    pub group_id: String,
    pub files: Vec<ReportFile>,
}

/// One test as shown in the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestRow {
    pub name: String,
    pub overall: OverallStatus,
    pub statuses: PhaseStatuses,
    pub slaveid: String,
    pub color: &'static str,
    pub duration: f64,
    pub in_progress: bool,
    pub file_groups: Vec<FileGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_provider: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_blocker: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_tb: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
}

impl TreeEntry for TestRow {
    fn ident(&self) -> &str {
        &self.name
    }

    fn overall(&self) -> OverallStatus {
        self.overall
    }

    fn duration(&self) -> f64 {
        self.duration
    }
}

/// Everything the renderer needs.
#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub tests: Vec<TestRow>,
    pub counts: StatusCounts,
    pub blocker_skip_count: u64,
    pub provider_skip_count: u64,
    pub tree: ReportNode<TestRow>,
    pub run_id: Option<String>,
    pub version: Option<String>,
    pub fw_version: Option<String>,
    pub generated_at: DateTime<Utc>,
}

/// Builds [`ReportData`] from a store snapshot.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    only_failed: bool,
    name_filter: Option<Regex>,
    url: Regex,
}

impl ReportBuilder {
    pub fn new(options: &ReportOptions) -> Result<Self, regex::Error> {
        let name_filter = options
            .name_filter
            .as_deref()
            .map(|filter| Regex::new(&format!(r"{}[-\]]+", regex::escape(filter))))
            .transpose()?;
        Ok(Self {
            only_failed: options.only_failed,
            name_filter,
            url: Regex::new(URL_PATTERN)?,
        })
    }

    /// Build the report for `records`, resolving file names against
    /// `report_dir`.
    pub fn build(
        &self,
        records: &IndexMap<String, TestRecord>,
        run: &RunContext,
        report_dir: &Path,
        now: DateTime<Utc>,
    ) -> ReportData {
        let mut counts = StatusCounts::default();
        let mut blocker_skip_count = 0;
        let mut provider_skip_count = 0;
        let mut tests = Vec::with_capacity(records.len());

        for (ident, record) in records {
            if record.statuses.is_empty() {
                continue;
            }
            let row = self.row(ident, record, report_dir, now);
            counts.increment(row.overall);
            if row.skip_provider.is_some() {
                provider_skip_count += 1;
            }
            if row.skip_blocker.is_some() {
                blocker_skip_count += 1;
            }
            tests.push(row);
        }

        if let Some(filter) = &self.name_filter {
            tests.retain(|row| filter.is_match(&row.name));
        }

        let tree = ReportNode::build(&tests);

        if self.only_failed {
            tests.retain(|row| row.overall != OverallStatus::Passed);
        }

        debug!(rows = tests.len(), total = counts.total(), "Built report data");

        ReportData {
            tests,
            counts,
            blocker_skip_count,
            provider_skip_count,
            tree,
            run_id: run.run_id.clone(),
            version: run.details.version.clone(),
            fw_version: run.details.fw_version.clone(),
            generated_at: now,
        }
    }

    fn row(&self, ident: &str, record: &TestRecord, report_dir: &Path, now: DateTime<Utc>) -> TestRow {
        let overall = record.classify();
        let (skip_provider, skip_blocker) = match &record.skipped {
            Some(skip) => match skip.kind.as_deref() {
                Some(SKIP_PROVIDER) => (Some(skip.reasons.clone()), None),
                Some(SKIP_BLOCKER) => (None, Some(skip.reasons.clone())),
                _ => (None, None),
            },
            None => (None, None),
        };

        let mut short_tb = None;
        let mut groups: IndexMap<&str, Vec<ReportFile>> = IndexMap::new();
        for file in &record.files {
            let files = groups.entry(file.group_id.as_str()).or_default();
            if file.file_type == FILE_TYPE_SHORT_TB {
                match fs::read_to_string(&file.os_filename) {
                    Ok(contents) => short_tb = Some(contents),
                    Err(e) => warn!(test_ident = ident, path = ?file.os_filename, error = %e, "Failed to read short traceback"),
                }
                continue;
            }
            files.push(ReportFile {
                filename: relative_name(&file.os_filename, report_dir),
                descriptor: file.clone(),
            });
        }
        let short_tb = short_tb.or_else(|| {
            record
                .exception
                .as_ref()
                .and_then(|exception| exception.short_tb.clone())
        });
        let urls = short_tb
            .as_deref()
            .map(|tb| self.url.find_iter(tb).map(|m| m.as_str().to_string()).collect())
            .unwrap_or_default();

        TestRow {
            name: ident.to_string(),
            overall,
            statuses: record.statuses.clone(),
            slaveid: record.slaveid.clone().unwrap_or_else(|| "Unknown".to_string()),
            color: overall.color(),
            duration: record.report_duration_secs(now),
            in_progress: record.start_time.is_some() && !record.is_finished(),
            file_groups: groups
                .into_iter()
                .filter(|(_, files)| !files.is_empty())
                .map(|(group_id, files)| FileGroup {
                    group_id: group_id.to_string(),
                    files,
                })
                .collect(),
            skip_provider,
            skip_blocker,
            exception: record.exception.clone(),
            short_tb,
            urls,
        }
    }
}

fn relative_name(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

/// Seam to whatever turns [`ReportData`] into a presentable report.
pub trait ReportRenderer: Send + Sync {
    /// Render `report` into `report_dir` and return the written path.
    fn render(&self, report: &ReportData, report_dir: &Path) -> PluginResult<PathBuf>;
}

/// Writes the report data as `report.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReportRenderer;

impl ReportRenderer for JsonReportRenderer {
    fn render(&self, report: &ReportData, report_dir: &Path) -> PluginResult<PathBuf> {
        fs::create_dir_all(report_dir)?;
        let path = report_dir.join(REPORT_FILE_NAME);
        let body = serde_json::to_vec_pretty(report).map_err(HubError::from)?;
        fs::write(&path, body)?;
        info!(path = ?path, tests = report.tests.len(), "Report written");
        Ok(path)
    }
}
