use std::collections::BTreeSet;

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use serde_json::{json, Map, Value};
use testhub::domain::models::{
    FileDescriptor, Outcome, OverallStatus, PhaseStatus, RecordUpdate, SkipInfo, TestRecord,
};
use testhub::services::report_tree::{ReportNode, TreeEntry};

fn outcome() -> impl Strategy<Value = Outcome> {
    prop_oneof![Just(Outcome::Passed), Just(Outcome::Failed), Just(Outcome::Skipped)]
}

fn overall() -> impl Strategy<Value = OverallStatus> {
    prop::sample::select(OverallStatus::ALL.to_vec())
}

fn metadata(prefix: &'static str) -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map("[a-c]{1,2}", prop_oneof![
        "[a-z]{0,4}".prop_map(Value::from),
        ("[a-z]{1,3}", "[a-z]{0,4}").prop_map(|(k, v)| json!({ k: v })),
    ], 0..4)
    .prop_map(move |entries| {
        entries
            .into_iter()
            .map(|(k, v)| (format!("{prefix}{k}"), v))
            .collect()
    })
}

fn file() -> impl Strategy<Value = FileDescriptor> {
    ("[a-c]", "[a-z]{1,4}").prop_map(|(group, name)| FileDescriptor {
        group_id: group,
        file_type: "log".to_string(),
        os_filename: format!("/tmp/{name}.log").into(),
        description: name,
        display_glyph: None,
        extra: Map::new(),
    })
}

/// Update whose per-key fields all use keys starting with `prefix`.
fn update(prefix: &'static str) -> impl Strategy<Value = RecordUpdate> {
    (
        prop::collection::vec(("[a-c]", outcome(), any::<bool>()), 0..3),
        prop::collection::vec(("[a-c]", 0u16..1000), 0..3),
        metadata(prefix),
        prop::collection::btree_set("[a-z]{1,3}", 0..3),
    )
        .prop_map(move |(statuses, durations, metadata, reasons)| {
            let mut update = RecordUpdate {
                metadata,
                ..Default::default()
            };
            for (phase, outcome, xfail) in statuses {
                update = update.with_status(format!("{prefix}{phase}"), PhaseStatus::new(outcome, xfail));
            }
            for (phase, ms) in durations {
                update = update.with_duration(format!("{prefix}{phase}"), f64::from(ms) / 1000.0);
            }
            if !reasons.is_empty() {
                update.skipped = Some(SkipInfo {
                    reasons,
                    ..Default::default()
                });
            }
            update
        })
}

fn applied(updates: &[&RecordUpdate]) -> TestRecord {
    let mut record = TestRecord::default();
    for update in updates {
        record.apply((*update).clone());
    }
    record
}

#[derive(Debug, Clone)]
struct Row {
    ident: String,
    overall: OverallStatus,
    duration: f64,
}

impl TreeEntry for Row {
    fn ident(&self) -> &str {
        &self.ident
    }

    fn overall(&self) -> OverallStatus {
        self.overall
    }

    fn duration(&self) -> f64 {
        self.duration
    }
}

fn rows() -> impl Strategy<Value = Vec<Row>> {
    prop::collection::btree_set(prop::collection::vec("[a-c]{1,2}", 1..4), 0..25)
        .prop_flat_map(|paths: BTreeSet<Vec<String>>| {
            let paths: Vec<Vec<String>> = paths.into_iter().collect();
            let n = paths.len();
            (
                Just(paths),
                prop::collection::vec((overall(), 0u16..5000), n),
            )
        })
        .prop_map(|(paths, attrs)| {
            paths
                .into_iter()
                .zip(attrs)
                .map(|(segments, (overall, ms))| Row {
                    ident: segments.join("/"),
                    overall,
                    duration: f64::from(ms) / 100.0,
                })
                .collect()
        })
}

/// Every node counts its own leaf plus everything below it.
fn assert_node_consistent(node: &ReportNode<Row>) -> Result<(), TestCaseError> {
    let child_total: u64 = node.children.values().map(|c| c.stats.total()).sum();
    let own = u64::from(node.is_leaf());
    prop_assert_eq!(node.stats.total(), child_total + own);

    let child_duration: f64 = node.children.values().map(|c| c.duration).sum();
    let own_duration = node.leaf.as_ref().map_or(0.0, |leaf| leaf.duration);
    prop_assert!((node.duration - child_duration - own_duration).abs() < 1e-6);

    for child in node.children.values() {
        assert_node_consistent(child)?;
    }
    Ok(())
}

proptest! {
    /// Property: applying the same update twice equals applying it once
    #[test]
    fn prop_merge_idempotent(u in update("")) {
        prop_assert_eq!(applied(&[&u, &u]), applied(&[&u]));
    }

    /// Property: idempotence holds for file lists as well
    #[test]
    fn prop_file_append_idempotent(files in prop::collection::vec(file(), 0..4)) {
        let u = RecordUpdate { files, ..Default::default() };
        let once = applied(&[&u]);
        let twice = applied(&[&u, &u]);
        prop_assert_eq!(once.files.len(), twice.files.len());
        prop_assert_eq!(once, twice);
    }

    /// Property: updates touching disjoint keys commute
    #[test]
    fn prop_merge_commutes_on_disjoint_keys(a in update("a_"), b in update("b_")) {
        prop_assert_eq!(applied(&[&a, &b]), applied(&[&b, &a]));
    }

    /// Property: a later scalar write wins
    #[test]
    fn prop_scalar_overwrite(first in "[a-z]{1,4}", second in "[a-z]{1,4}") {
        let a = RecordUpdate { slaveid: Some(first), ..Default::default() };
        let b = RecordUpdate { slaveid: Some(second.clone()), ..Default::default() };
        prop_assert_eq!(applied(&[&a, &b]).slaveid, Some(second));
    }

    /// Property: root aggregates equal the leaf count and the leaf duration sum
    #[test]
    fn prop_tree_root_aggregates(rows in rows()) {
        let tree = ReportNode::build(&rows);

        prop_assert_eq!(tree.stats.total(), rows.len() as u64);
        prop_assert_eq!(tree.leaf_count(), rows.len());

        let total: f64 = rows.iter().map(|r| r.duration).sum();
        prop_assert!((tree.duration - total).abs() < 1e-6);

        for status in OverallStatus::ALL {
            let expected = rows.iter().filter(|r| r.overall == status).count() as u64;
            prop_assert_eq!(tree.stats.get(status), expected);
        }
    }

    /// Property: every node's aggregates are consistent with its subtree
    #[test]
    fn prop_tree_nodes_consistent(rows in rows()) {
        let tree = ReportNode::build(&rows);
        for child in tree.children.values() {
            assert_node_consistent(child)?;
        }
    }

    /// Property: every row is reachable at its own path
    #[test]
    fn prop_tree_leaves_reachable(rows in rows()) {
        let tree = ReportNode::build(&rows);
        for row in &rows {
            let path: Vec<&str> = row.ident.split('/').collect();
            let node = tree.find(path.as_slice());
            prop_assert!(node.is_some_and(ReportNode::is_leaf));
        }
    }
}
