//! Structural diff between desired and current agent specs.
//!
//! This module walks two [`ConfigTree`]s side by side and reports every
//! location where they differ. Output order is deterministic: top-level keys
//! follow the platform's canonical field order, nested keys are
//! lexicographic, array elements are positional.
//!
//! Direction convention: `before` is always the remote (current) value and
//! `after` is always the local (desired) value.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::trace;

use crate::tree::{ChangePath, ConfigTree};

/// Canonical top-level field order of a Cortex agent spec.
pub const AGENT_FIELD_ORDER: &[&str] = &[
    "comment",
    "profile",
    "models",
    "instructions",
    "orchestration",
    "tools",
    "tool_resources",
];

static NULL: ConfigTree = ConfigTree::Null;

/// Options that suppress one-sided differences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// Skip values present locally but absent remotely.
    ///
    /// Used when the remote service does not echo back some optional fields.
    pub ignore_missing_remote: bool,
    /// Skip values present remotely but absent locally.
    pub ignore_missing_local: bool,
}

/// Kind of a single structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Present locally, absent remotely.
    Added,
    /// Present remotely, absent locally.
    Removed,
    /// Present on both sides with different values or shapes.
    Modified,
}

/// One detected difference, addressed by path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    path: String,
    kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    before: Option<ConfigTree>,
    #[serde(skip_serializing_if = "Option::is_none")]
    after: Option<ConfigTree>,
}

impl Change {
    /// Creates an `Added` change.
    #[must_use]
    pub fn added(path: impl Into<String>, after: ConfigTree) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Added,
            before: None,
            after: Some(after),
        }
    }

    /// Creates a `Removed` change.
    #[must_use]
    pub fn removed(path: impl Into<String>, before: ConfigTree) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Removed,
            before: Some(before),
            after: None,
        }
    }

    /// Creates a `Modified` change.
    #[must_use]
    pub fn modified(path: impl Into<String>, before: ConfigTree, after: ConfigTree) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Modified,
            before: Some(before),
            after: Some(after),
        }
    }

    /// Path of the changed location.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Kind of change.
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        self.kind
    }

    /// Remote value, absent for `Added`.
    #[must_use]
    pub const fn before(&self) -> Option<&ConfigTree> {
        self.before.as_ref()
    }

    /// Local value, absent for `Removed`.
    #[must_use]
    pub const fn after(&self) -> Option<&ConfigTree> {
        self.after.as_ref()
    }

    /// Top-level field this change touches.
    #[must_use]
    pub fn top_level_key(&self) -> &str {
        crate::tree::top_level_key(&self.path)
    }
}

/// Computes ordered structural diffs between configuration trees.
#[derive(Debug, Clone, Copy)]
pub struct TreeDiffer {
    field_order: &'static [&'static str],
}

impl Default for TreeDiffer {
    fn default() -> Self {
        Self::new(AGENT_FIELD_ORDER)
    }
}

impl TreeDiffer {
    /// Creates a differ with the given top-level field priority.
    #[must_use]
    pub const fn new(field_order: &'static [&'static str]) -> Self {
        Self { field_order }
    }

    /// Diffs the desired tree against the current one.
    #[must_use]
    pub fn diff(&self, local: &ConfigTree, remote: &ConfigTree, options: DiffOptions) -> Vec<Change> {
        let mut changes = Vec::new();
        self.diff_node(&ChangePath::root(), local, remote, options, &mut changes);
        trace!("Tree diff produced {} changes", changes.len());
        changes
    }

    /// Lists every leaf of a tree that is about to be created as `Added`.
    #[must_use]
    pub fn diff_for_create(&self, local: &ConfigTree) -> Vec<Change> {
        let mut changes = Vec::new();
        self.flatten_added(&ChangePath::root(), local, &mut changes);
        changes
    }

    fn diff_node(
        &self,
        path: &ChangePath,
        local: &ConfigTree,
        remote: &ConfigTree,
        options: DiffOptions,
        out: &mut Vec<Change>,
    ) {
        match (local.is_empty(), remote.is_empty()) {
            (true, true) => return,
            (true, false) => {
                if path.is_root()
                    && let ConfigTree::Object(r) = remote
                {
                    self.diff_object(path, &BTreeMap::new(), r, options, out);
                } else if !options.ignore_missing_local {
                    out.push(Change::removed(path.clone(), remote.clone()));
                }
                return;
            }
            (false, true) => {
                if !options.ignore_missing_remote {
                    self.flatten_added(path, local, out);
                }
                return;
            }
            (false, false) => {}
        }

        match (local, remote) {
            (ConfigTree::Object(l), ConfigTree::Object(r)) => {
                self.diff_object(path, l, r, options, out);
            }
            (ConfigTree::Array(l), ConfigTree::Array(r)) => {
                for i in 0..l.len().max(r.len()) {
                    self.diff_node(
                        &path.index(i),
                        l.get(i).unwrap_or(&NULL),
                        r.get(i).unwrap_or(&NULL),
                        options,
                        out,
                    );
                }
            }
            (ConfigTree::Scalar(a), ConfigTree::Scalar(b)) => {
                if a.same_kind_eq(b) != Some(true) {
                    out.push(Change::modified(path.clone(), remote.clone(), local.clone()));
                }
            }
            _ => {
                trace!(
                    "Type mismatch at '{path}': {} vs {}",
                    local.kind_name(),
                    remote.kind_name()
                );
                out.push(Change::modified(path.clone(), remote.clone(), local.clone()));
            }
        }
    }

    /// Diffs two object nodes member by member over the key union.
    ///
    /// The root is always walked this way, even when one side is empty, so
    /// every change addresses a field and never the whole tree.
    fn diff_object(
        &self,
        path: &ChangePath,
        local: &BTreeMap<String, ConfigTree>,
        remote: &BTreeMap<String, ConfigTree>,
        options: DiffOptions,
        out: &mut Vec<Change>,
    ) {
        let keys: Vec<&String> = if options.ignore_missing_remote {
            remote.keys().collect()
        } else {
            let mut union: Vec<&String> = local.keys().chain(remote.keys()).collect();
            union.sort();
            union.dedup();
            union
        };
        for key in self.order_keys(path, keys) {
            self.diff_node(
                &path.key(key),
                local.get(key).unwrap_or(&NULL),
                remote.get(key).unwrap_or(&NULL),
                options,
                out,
            );
        }
    }

    fn flatten_added(&self, path: &ChangePath, node: &ConfigTree, out: &mut Vec<Change>) {
        match node {
            ConfigTree::Null => {}
            ConfigTree::Scalar(_) => out.push(Change::added(path.clone(), node.clone())),
            ConfigTree::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.flatten_added(&path.index(i), item, out);
                }
            }
            ConfigTree::Object(map) => {
                for key in self.order_keys(path, map.keys().collect()) {
                    if let Some(child) = map.get(key) {
                        self.flatten_added(&path.key(key), child, out);
                    }
                }
            }
        }
    }

    /// Orders object keys; the priority table applies only at the root.
    fn order_keys<'k>(&self, path: &ChangePath, mut keys: Vec<&'k String>) -> Vec<&'k String> {
        if path.is_root() {
            let rank = |key: &str| {
                self.field_order
                    .iter()
                    .position(|field| *field == key)
                    .unwrap_or(self.field_order.len())
            };
            keys.sort_by(|a, b| rank(a).cmp(&rank(b)).then_with(|| a.cmp(b)));
        } else {
            keys.sort();
        }
        keys
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Modified => "modified",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, &self.before, &self.after) {
            (ChangeKind::Added, _, Some(after)) => write!(f, "+ {} = {after}", self.path),
            (ChangeKind::Removed, Some(before), _) => write!(f, "- {} (was {before})", self.path),
            (ChangeKind::Modified, Some(before), Some(after)) => {
                write!(f, "~ {}: {before} -> {after}", self.path)
            }
            _ => write!(f, "{} {}", self.kind, self.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(value: serde_json::Value) -> ConfigTree {
        ConfigTree::from(value)
    }

    fn paths(changes: &[Change]) -> Vec<&str> {
        changes.iter().map(Change::path).collect()
    }

    fn sample() -> ConfigTree {
        tree(json!({
            "comment": "sales helper",
            "models": {"orchestration": "claude-4-sonnet"},
            "instructions": {"response": "be brief", "sample_questions": [{"question": "q1"}]},
            "orchestration": {"budget": {"seconds": 30, "tokens": 16000}},
            "tools": [{"tool_spec": {"type": "cortex_analyst_text_to_sql", "name": "analyst"}}],
            "tool_resources": {"analyst": {"semantic_view": "AI.SV.SALES"}}
        }))
    }

    #[test]
    fn test_identical_trees_have_no_changes() {
        let differ = TreeDiffer::default();
        for t in [
            ConfigTree::Null,
            tree(json!(1)),
            tree(json!("x")),
            tree(json!([1, [2, 3], {"a": null}])),
            sample(),
        ] {
            assert!(differ.diff(&t, &t, DiffOptions::default()).is_empty());
        }
    }

    #[test]
    fn test_modified_scalar() {
        let changes = TreeDiffer::default().diff(
            &tree(json!({"comment": "new"})),
            &tree(json!({"comment": "old"})),
            DiffOptions::default(),
        );

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind(), ChangeKind::Modified);
        assert_eq!(changes[0].path(), "comment");
        assert_eq!(changes[0].before(), Some(&ConfigTree::string("old")));
        assert_eq!(changes[0].after(), Some(&ConfigTree::string("new")));
    }

    #[test]
    fn test_added_tool_is_flattened_to_leaves() {
        let local = tree(json!({
            "tools": [{"tool_spec": {"type": "generic", "name": "toolA", "description": "does a"}}]
        }));
        let changes = TreeDiffer::default().diff(&local, &tree(json!({})), DiffOptions::default());

        assert_eq!(
            paths(&changes),
            vec![
                "tools[0].tool_spec.description",
                "tools[0].tool_spec.name",
                "tools[0].tool_spec.type",
            ]
        );
        for change in &changes {
            assert_eq!(change.kind(), ChangeKind::Added);
            assert!(change.before().is_none());
            assert_eq!(change.top_level_key(), "tools");
        }
    }

    #[test]
    fn test_shorter_local_array_removes_trailing_element() {
        let changes = TreeDiffer::default().diff(
            &tree(json!({"list": ["a"]})),
            &tree(json!({"list": ["a", "b"]})),
            DiffOptions::default(),
        );

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind(), ChangeKind::Removed);
        assert_eq!(changes[0].path(), "list[1]");
        assert_eq!(changes[0].before(), Some(&ConfigTree::string("b")));
        assert!(changes[0].after().is_none());
    }

    #[test]
    fn test_removed_subtree_is_single_change() {
        let changes = TreeDiffer::default().diff(
            &tree(json!({"comment": "c"})),
            &tree(json!({"comment": "c", "profile": {"display_name": "Sales", "color": "blue"}})),
            DiffOptions::default(),
        );

        assert_eq!(paths(&changes), vec!["profile"]);
        assert_eq!(changes[0].kind(), ChangeKind::Removed);
    }

    #[test]
    fn test_empty_local_removes_each_top_level_field() {
        let remote = tree(json!({
            "comment": "old",
            "profile": {"display_name": "Sales"},
            "tools": [{"tool_spec": {"name": "search"}}]
        }));

        for local in [tree(json!({})), ConfigTree::Null] {
            let changes = TreeDiffer::default().diff(&local, &remote, DiffOptions::default());

            assert_eq!(paths(&changes), vec!["comment", "profile", "tools"]);
            assert!(changes.iter().all(|c| c.kind() == ChangeKind::Removed));
            assert_eq!(changes[1].before(), remote.get("profile"));
        }
    }

    #[test]
    fn test_empty_local_respects_ignore_missing_local() {
        let options = DiffOptions {
            ignore_missing_local: true,
            ..DiffOptions::default()
        };
        let changes =
            TreeDiffer::default().diff(&tree(json!({})), &tree(json!({"comment": "old"})), options);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_type_mismatch_is_single_modified() {
        let differ = TreeDiffer::default();

        let changes = differ.diff(
            &tree(json!({"x": {"a": 1, "b": 2}})),
            &tree(json!({"x": [1, 2, 3]})),
            DiffOptions::default(),
        );
        assert_eq!(paths(&changes), vec!["x"]);
        assert_eq!(changes[0].kind(), ChangeKind::Modified);

        let changes = differ.diff(&tree(json!({"x": "1"})), &tree(json!({"x": 1})), DiffOptions::default());
        assert_eq!(paths(&changes), vec!["x"]);
        assert_eq!(changes[0].kind(), ChangeKind::Modified);
    }

    #[test]
    fn test_empty_collections_equal_null() {
        let differ = TreeDiffer::default();
        let opts = DiffOptions::default();

        assert!(differ.diff(&tree(json!({})), &tree(json!({})), opts).is_empty());
        assert!(differ.diff(&tree(json!({"tools": []})), &tree(json!({})), opts).is_empty());
        assert!(differ.diff(&tree(json!({"a": null})), &tree(json!({"a": {}})), opts).is_empty());
        assert!(differ.diff(&tree(json!({"a": []})), &tree(json!({"a": {}})), opts).is_empty());
    }

    #[test]
    fn test_size_difference_never_modifies_collection() {
        let changes = TreeDiffer::default().diff(
            &tree(json!({"q": [1, 2, 3]})),
            &tree(json!({"q": [1]})),
            DiffOptions::default(),
        );

        assert_eq!(paths(&changes), vec!["q[1]", "q[2]"]);
        assert!(changes.iter().all(|c| c.kind() == ChangeKind::Added));
    }

    #[test]
    fn test_top_level_priority_order() {
        let local = tree(json!({
            "zeta": 1,
            "tool_resources": {"t": {"b": 1, "a": 1}},
            "tools": [{"n": 1}],
            "comment": "c",
            "alpha": 1
        }));
        let changes = TreeDiffer::default().diff(&local, &ConfigTree::Null, DiffOptions::default());

        assert_eq!(
            paths(&changes),
            vec!["comment", "tools[0].n", "tool_resources.t.a", "tool_resources.t.b", "alpha", "zeta"]
        );
    }

    #[test]
    fn test_custom_field_order() {
        static ORDER: &[&str] = &["b", "a"];
        let changes = TreeDiffer::new(ORDER).diff(
            &tree(json!({"a": 1, "b": 1})),
            &tree(json!({"a": 2, "b": 2})),
            DiffOptions::default(),
        );
        assert_eq!(paths(&changes), vec!["b", "a"]);
    }

    #[test]
    fn test_ignore_missing_remote() {
        let options = DiffOptions {
            ignore_missing_remote: true,
            ..DiffOptions::default()
        };
        let changes = TreeDiffer::default().diff(
            &tree(json!({"comment": "new", "profile": {"display_name": "x"}, "list": [1, 2]})),
            &tree(json!({"comment": "old", "list": [1]})),
            options,
        );

        assert_eq!(paths(&changes), vec!["comment"]);
    }

    #[test]
    fn test_ignore_missing_local() {
        let options = DiffOptions {
            ignore_missing_local: true,
            ..DiffOptions::default()
        };
        let changes = TreeDiffer::default().diff(
            &tree(json!({"comment": "c"})),
            &tree(json!({"comment": "c", "profile": {"display_name": "x"}})),
            options,
        );

        assert!(changes.is_empty());
    }

    #[test]
    fn test_change_invariants_hold() {
        let local = tree(json!({"a": [1, {"b": 2}], "c": "x", "d": {"e": true}}));
        let remote = tree(json!({"a": [1, {"b": 3}, 4], "c": 5, "f": "gone"}));

        let changes = TreeDiffer::default().diff(&local, &remote, DiffOptions::default());
        assert!(!changes.is_empty());
        for change in &changes {
            match change.kind() {
                ChangeKind::Added => assert!(change.before().is_none() && change.after().is_some()),
                ChangeKind::Removed => assert!(change.after().is_none() && change.before().is_some()),
                ChangeKind::Modified => assert!(change.before().is_some() && change.after().is_some()),
            }
        }
        assert_eq!(paths(&changes), vec!["a[1].b", "a[2]", "c", "d.e", "f"]);
    }

    #[test]
    fn test_diff_for_create_skips_empty_collections() {
        let local = tree(json!({
            "comment": "c",
            "tools": [],
            "profile": {},
            "instructions": {"sample_questions": [{"question": "q"}]}
        }));
        let changes = TreeDiffer::default().diff_for_create(&local);

        assert_eq!(paths(&changes), vec!["comment", "instructions.sample_questions[0].question"]);
        assert!(changes.iter().all(|c| c.kind() == ChangeKind::Added));
    }

    #[test]
    fn test_change_display() {
        let change = Change::modified("comment", ConfigTree::string("old"), ConfigTree::string("new"));
        assert_eq!(change.to_string(), "~ comment: \"old\" -> \"new\"");
        assert_eq!(Change::added("a", ConfigTree::bool(true)).to_string(), "+ a = true");
    }
}
