//! The canonical per-test record and the typed partial updates merged into it.
//!
//! Every field belongs to exactly one merge category:
//!
//! - scalar overwrite: `start_time`, `finish_time`, `slaveid`, `test_module`,
//!   `test_name`, `overall`, `exception.*`, `skipped.type`
//! - mapping accumulate (per key, recursively for JSON objects): `statuses`,
//!   `durations`, `metadata`, `params`, `skipped.extra`
//! - set union: `skipped.reason`
//! - sequence append: `files`

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::status::{classify, OverallStatus, PhaseStatus, PhaseStatuses};
use crate::domain::errors::{HubError, HubResult};

/// Canonical record for one test, keyed by its identifier in the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    #[serde(default)]
    pub statuses: PhaseStatuses,
    #[serde(default)]
    pub durations: IndexMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slaveid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub files: Vec<FileDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall: Option<OverallStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionInfo>,
}

impl TestRecord {
    /// Fold a partial update into this record.
    pub fn apply(&mut self, update: RecordUpdate) {
        accumulate(&mut self.statuses, update.statuses);
        accumulate(&mut self.durations, update.durations);
        overwrite(&mut self.start_time, update.start_time);
        overwrite(&mut self.finish_time, update.finish_time);
        overwrite(&mut self.slaveid, update.slaveid);
        overwrite(&mut self.test_module, update.test_module);
        overwrite(&mut self.test_name, update.test_name);
        deep_merge(&mut self.metadata, update.metadata);
        deep_merge(&mut self.params, update.params);
        append_unique(&mut self.files, update.files);
        overwrite(&mut self.overall, update.overall);

        if let Some(skipped) = update.skipped {
            self.skipped.get_or_insert_with(SkipInfo::default).merge(skipped);
        }
        if let Some(exception) = update.exception {
            self.exception
                .get_or_insert_with(ExceptionInfo::default)
                .merge(exception);
        }
    }

    /// A record is terminal once a finish time has been written.
    pub const fn is_finished(&self) -> bool {
        self.finish_time.is_some()
    }

    /// Verdict from the current phase statuses.
    pub fn classify(&self) -> OverallStatus {
        classify(&self.statuses)
    }

    /// Stored verdict, falling back to classifying the statuses seen so far.
    pub fn overall_or_classify(&self) -> OverallStatus {
        self.overall.unwrap_or_else(|| self.classify())
    }

    /// Wall-clock duration in seconds.
    ///
    /// Finished tests report `finish - start`; tests still running report the
    /// time elapsed until `now`. A record without a start time reports zero.
    pub fn duration_secs(&self, now: DateTime<Utc>) -> f64 {
        let Some(start) = self.start_time else {
            return 0.0;
        };
        let end = self.finish_time.unwrap_or(now);
        #[allow(clippy::cast_precision_loss)]
        let secs = (end - start).num_milliseconds() as f64 / 1000.0;
        secs.max(0.0)
    }

    /// Sum of the per-phase durations reported by the worker.
    pub fn phase_duration_secs(&self) -> f64 {
        self.durations.values().sum()
    }

    /// Duration shown in reports and pushed as a metric.
    ///
    /// A finished test reports the sum of its phase durations, or its
    /// wall-clock duration when no phase reported one. A test still in
    /// progress reports the time elapsed so far.
    pub fn report_duration_secs(&self, now: DateTime<Utc>) -> f64 {
        if self.is_finished() && !self.durations.is_empty() {
            self.phase_duration_secs()
        } else {
            self.duration_secs(now)
        }
    }
}

/// Partial update for a [`TestRecord`].
///
/// Empty collections and `None` fields leave the record untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordUpdate {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub statuses: PhaseStatuses,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub durations: IndexMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slaveid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall: Option<OverallStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionInfo>,
}

impl RecordUpdate {
    /// Field names accepted in a raw JSON update.
    pub const FIELDS: &'static [&'static str] = &[
        "statuses",
        "durations",
        "start_time",
        "finish_time",
        "slaveid",
        "test_module",
        "test_name",
        "metadata",
        "params",
        "files",
        "overall",
        "skipped",
        "exception",
    ];

    /// Validate and convert a raw JSON update for `test_ident`.
    pub fn from_value(test_ident: &str, value: Value) -> HubResult<Self> {
        let Value::Object(fields) = &value else {
            return Err(HubError::InvalidUpdate {
                test_ident: test_ident.to_string(),
                reason: "update must be a JSON object".to_string(),
            });
        };
        if let Some(field) = fields.keys().find(|k| !Self::FIELDS.contains(&k.as_str())) {
            return Err(HubError::UnknownField {
                test_ident: test_ident.to_string(),
                field: field.clone(),
            });
        }
        serde_json::from_value(value).map_err(|e| HubError::InvalidUpdate {
            test_ident: test_ident.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn with_status(mut self, phase: impl Into<String>, status: PhaseStatus) -> Self {
        self.statuses.insert(phase.into(), status);
        self
    }

    pub fn with_duration(mut self, phase: impl Into<String>, secs: f64) -> Self {
        self.durations.insert(phase.into(), secs);
        self
    }

    pub fn with_file(mut self, file: FileDescriptor) -> Self {
        self.files.push(file);
        self
    }
}

/// Descriptor of an artifact file attached to a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub group_id: String,
    pub file_type: String,
    pub os_filename: PathBuf,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_glyph: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Why and how a test was skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkipInfo {
    /// Skip category such as `blocker` or `provider`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "reason", default, deserialize_with = "one_or_many")]
    pub reasons: BTreeSet<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SkipInfo {
    fn merge(&mut self, other: Self) {
        overwrite(&mut self.kind, other.kind);
        self.reasons.extend(other.reasons);
        deep_merge(&mut self.extra, other.extra);
    }
}

/// Traceback summary for a failed test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_tb: Option<String>,
}

impl ExceptionInfo {
    fn merge(&mut self, other: Self) {
        overwrite(&mut self.exception, other.exception);
        overwrite(&mut self.file_line, other.file_line);
        overwrite(&mut self.short_tb, other.short_tb);
    }
}

fn overwrite<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn accumulate<V>(target: &mut IndexMap<String, V>, entries: IndexMap<String, V>) {
    // `insert` keeps the original position of an existing key.
    for (key, value) in entries {
        target.insert(key, value);
    }
}

/// Merge JSON objects key by key, recursing into nested objects.
pub fn deep_merge(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

fn append_unique<T: PartialEq>(target: &mut Vec<T>, items: Vec<T>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(reason) => BTreeSet::from([reason]),
        OneOrMany::Many(reasons) => reasons.into_iter().collect(),
        OneOrMany::Null(()) => BTreeSet::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::status::{Outcome, PHASE_CALL, PHASE_SETUP};
    use serde_json::json;

    fn passed() -> PhaseStatus {
        PhaseStatus::new(Outcome::Passed, false)
    }

    #[test]
    fn test_statuses_accumulate_without_clearing() {
        let mut record = TestRecord::default();
        record.apply(RecordUpdate::default().with_status(PHASE_SETUP, passed()));
        record.apply(RecordUpdate::default().with_status(PHASE_CALL, passed()));

        assert_eq!(record.statuses.len(), 2);
        let phases: Vec<_> = record.statuses.keys().cloned().collect();
        assert_eq!(phases, vec![PHASE_SETUP, PHASE_CALL]);
    }

    #[test]
    fn test_repeated_phase_overwrites_in_place() {
        let mut record = TestRecord::default();
        record.apply(
            RecordUpdate::default()
                .with_status(PHASE_SETUP, passed())
                .with_duration(PHASE_SETUP, 1.0),
        );
        record.apply(RecordUpdate::default().with_status(PHASE_CALL, passed()));
        record.apply(
            RecordUpdate::default()
                .with_status(PHASE_SETUP, PhaseStatus::new(Outcome::Failed, false))
                .with_duration(PHASE_SETUP, 2.5),
        );

        assert_eq!(record.statuses.get_index(0).unwrap().0, PHASE_SETUP);
        assert_eq!(record.statuses[PHASE_SETUP].outcome, Outcome::Failed);
        assert!((record.durations[PHASE_SETUP] - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_scalars_overwrite_only_when_present() {
        let mut record = TestRecord::default();
        record.apply(RecordUpdate {
            slaveid: Some("gw0".to_string()),
            test_name: Some("t1".to_string()),
            ..Default::default()
        });
        record.apply(RecordUpdate {
            overall: Some(OverallStatus::Failed),
            ..Default::default()
        });
        assert_eq!(record.slaveid.as_deref(), Some("gw0"));
        assert_eq!(record.test_name.as_deref(), Some("t1"));
        assert_eq!(record.overall, Some(OverallStatus::Failed));

        record.apply(RecordUpdate {
            overall: Some(OverallStatus::Passed),
            ..Default::default()
        });
        assert_eq!(record.overall, Some(OverallStatus::Passed));
    }

    #[test]
    fn test_metadata_merges_recursively() {
        let mut target = json!({"a": {"x": 1, "y": 2}, "b": 1})
            .as_object()
            .cloned()
            .unwrap();
        let source = json!({"a": {"y": 3, "z": 4}, "c": [1]})
            .as_object()
            .cloned()
            .unwrap();
        deep_merge(&mut target, source);
        assert_eq!(
            Value::Object(target),
            json!({"a": {"x": 1, "y": 3, "z": 4}, "b": 1, "c": [1]})
        );
    }

    #[test]
    fn test_files_append_and_skip_duplicates() {
        let file = FileDescriptor {
            group_id: "pytest-logfile".to_string(),
            file_type: "log".to_string(),
            os_filename: PathBuf::from("/tmp/a.log"),
            description: "iqe.log".to_string(),
            display_glyph: None,
            extra: Map::new(),
        };
        let mut other = file.clone();
        other.os_filename = PathBuf::from("/tmp/b.log");

        let mut record = TestRecord::default();
        record.apply(RecordUpdate::default().with_file(file.clone()));
        record.apply(RecordUpdate::default().with_file(file).with_file(other));
        assert_eq!(record.files.len(), 2);
    }

    #[test]
    fn test_skip_reasons_form_a_set() {
        let first: SkipInfo =
            serde_json::from_value(json!({"type": "blocker", "reason": ["BZ2", "BZ1"]})).unwrap();
        let second: SkipInfo =
            serde_json::from_value(json!({"type": "blocker", "reason": "BZ1"})).unwrap();

        let mut record = TestRecord::default();
        record.apply(RecordUpdate {
            skipped: Some(first),
            ..Default::default()
        });
        record.apply(RecordUpdate {
            skipped: Some(second),
            ..Default::default()
        });

        let skipped = record.skipped.unwrap();
        assert_eq!(skipped.kind.as_deref(), Some("blocker"));
        assert_eq!(skipped.reasons.into_iter().collect::<Vec<_>>(), vec!["BZ1", "BZ2"]);
    }

    #[test]
    fn test_from_value_rejects_unknown_fields() {
        let err = RecordUpdate::from_value("mod/t1", json!({"statuses": {}, "bogus": 1}))
            .unwrap_err();
        match err {
            HubError::UnknownField { field, test_ident } => {
                assert_eq!(field, "bogus");
                assert_eq!(test_ident, "mod/t1");
            }
            other => panic!("Expected UnknownField, got {other:?}"),
        }

        assert!(matches!(
            RecordUpdate::from_value("mod/t1", json!([1, 2])),
            Err(HubError::InvalidUpdate { .. })
        ));
    }

    #[test]
    fn test_from_value_accepts_known_fields() {
        let update = RecordUpdate::from_value(
            "mod/t1",
            json!({
                "statuses": {"call": {"outcome": "failed", "xfail": false}},
                "durations": {"call": 0.25},
                "metadata": {"owner": "qe"}
            }),
        )
        .unwrap();
        assert_eq!(update.statuses[PHASE_CALL].outcome, Outcome::Failed);
        assert!(!update.is_empty());
    }

    #[test]
    fn test_duration_of_finished_and_running_records() {
        let start = Utc::now() - chrono::Duration::seconds(10);
        let mut record = TestRecord {
            start_time: Some(start),
            ..Default::default()
        };
        let running = record.duration_secs(start + chrono::Duration::seconds(4));
        assert!((running - 4.0).abs() < 1e-6);

        record.finish_time = Some(start + chrono::Duration::milliseconds(1500));
        assert!((record.duration_secs(Utc::now()) - 1.5).abs() < 1e-6);
        assert!(record.is_finished());

        assert!(TestRecord::default().duration_secs(Utc::now()).abs() < f64::EPSILON);
    }

    #[test]
    fn test_report_duration_prefers_phase_sum_once_finished() {
        let start = Utc::now();
        let mut record = TestRecord {
            start_time: Some(start),
            ..Default::default()
        };
        record.apply(RecordUpdate::default().with_duration(PHASE_CALL, 1.5));
        let running = record.report_duration_secs(start + chrono::Duration::seconds(3));
        assert!((running - 3.0).abs() < 1e-6);

        record.finish_time = Some(start);
        assert!((record.report_duration_secs(Utc::now()) - 1.5).abs() < 1e-6);
    }
}
