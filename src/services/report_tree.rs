//! Hierarchical rollup of test results by identifier segment.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use crate::domain::models::{segment, OverallStatus, StatusCounts};

/// A test result that can be placed in a [`ReportNode`] tree.
pub trait TreeEntry: Clone {
    fn ident(&self) -> &str;
    fn overall(&self) -> OverallStatus;
    fn duration(&self) -> f64;
}

/// One level of the namespace hierarchy.
///
/// `stats` and `duration` cover every leaf at or below this node. A node
/// reached by a test identifier carries that test in `leaf`; it may still
/// have children if another identifier extends it.
#[derive(Debug, Clone, Serialize)]
pub struct ReportNode<L> {
    pub children: IndexMap<String, ReportNode<L>>,
    pub stats: StatusCounts,
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leaf: Option<Box<L>>,
}

impl<L> Default for ReportNode<L> {
    fn default() -> Self {
        Self {
            children: IndexMap::new(),
            stats: StatusCounts::default(),
            duration: 0.0,
            leaf: None,
        }
    }
}

impl<L: TreeEntry> ReportNode<L> {
    /// Build the tree rooted at an unnamed node.
    pub fn build<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a L>,
        L: 'a,
    {
        let mut root = Self::default();
        for entry in entries {
            let segments = segment(entry.ident());
            if segments.is_empty() {
                warn!(test_ident = entry.ident(), "Skipping test with an empty identifier");
                continue;
            }
            root.insert(&segments, entry);
        }
        root
    }

    fn insert(&mut self, segments: &[String], entry: &L) {
        self.stats.increment(entry.overall());
        self.duration += entry.duration();
        match segments.split_first() {
            None => self.leaf = Some(Box::new(entry.clone())),
            Some((head, rest)) => self
                .children
                .entry(head.clone())
                .or_default()
                .insert(rest, entry),
        }
    }
}

impl<L> ReportNode<L> {
    pub const fn is_leaf(&self) -> bool {
        self.leaf.is_some()
    }

    /// Share of `passed` and `xfailed` leaves, in percent.
    pub fn pass_percentage(&self) -> Option<f64> {
        self.stats.pass_percentage()
    }

    /// Descend along `path`.
    pub fn find<S: AsRef<str>>(&self, path: &[S]) -> Option<&Self> {
        path.iter()
            .try_fold(self, |node, name| node.children.get(name.as_ref()))
    }

    /// Number of leaves at or below this node.
    pub fn leaf_count(&self) -> usize {
        usize::from(self.is_leaf())
            + self
                .children
                .values()
                .map(Self::leaf_count)
                .sum::<usize>()
    }
}
