use std::collections::HashSet;

use ragline_corpus::{Candidate, DocumentNode, Metadata};
use serde::Serialize;

use crate::hierarchy::{HierarchyNode, NodeIndex};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeConfig {
    /// Fraction of a parent's children that must be present before they are
    /// replaced by the parent. `1.0` requires every child.
    pub child_ratio: f32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self { child_ratio: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRecord {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

impl MergedRecord {
    #[must_use]
    pub fn into_candidate(self) -> Candidate {
        Candidate::new(self.id, self.text).with_metadata(self.metadata)
    }
}

impl From<MergedRecord> for DocumentNode {
    fn from(r: MergedRecord) -> Self {
        DocumentNode::new(r.id, r.text).with_metadata(r.metadata)
    }
}

impl From<HierarchyNode> for MergedRecord {
    fn from(n: HierarchyNode) -> Self {
        Self {
            id: n.id,
            text: n.text,
            metadata: n.metadata,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub records: Vec<MergedRecord>,
    /// Passes that changed the working set.
    pub passes: usize,
    /// Working-set size before the first pass and after each changing pass.
    pub sizes: Vec<usize>,
}

/// Auto-merge: promotes complete sets of sibling chunks to their parent until
/// nothing changes.
#[derive(Debug, Clone, Default)]
pub struct HierarchicalMerger {
    config: MergeConfig,
}

impl HierarchicalMerger {
    #[must_use]
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    /// Merge `leaves` against a node index rebuilt from the full `corpus`.
    #[tracing::instrument(skip_all, fields(leaves = leaves.len(), corpus = corpus.len()))]
    pub fn merge(&self, leaves: &[DocumentNode], corpus: &[DocumentNode]) -> Vec<MergedRecord> {
        let report = self.merge_with_index(leaves, &NodeIndex::build(corpus));
        tracing::debug!(passes = report.passes, merged = report.records.len(), "hierarchy merged");
        report.records
    }

    /// Merge `leaves` against a prebuilt index.
    ///
    /// Leaves are taken from the index when present there, otherwise from the
    /// given document. A parent replaces its children at the position of the
    /// first child in the working set.
    #[must_use]
    pub fn merge_with_index(&self, leaves: &[DocumentNode], index: &NodeIndex) -> MergeReport {
        let mut seen = HashSet::new();
        let mut working: Vec<HierarchyNode> = leaves
            .iter()
            .filter(|d| seen.insert(d.id.as_str()))
            .map(|d| {
                index
                    .get(&d.id)
                    .cloned()
                    .unwrap_or_else(|| HierarchyNode::from_document(d))
            })
            .collect();

        let mut sizes = vec![working.len()];
        let mut passes = 0;
        // A changing pass lifts at least one node one level, so the index size bounds the loop.
        while passes <= index.len() {
            let Some(next) = self.merge_pass(&working, index) else {
                break;
            };
            passes += 1;
            sizes.push(next.len());
            working = next;
        }

        MergeReport {
            records: working.into_iter().map(MergedRecord::from).collect(),
            passes,
            sizes,
        }
    }

    /// One bottom-up pass. Returns `None` when the set of ids would not change.
    fn merge_pass(&self, working: &[HierarchyNode], index: &NodeIndex) -> Option<Vec<HierarchyNode>> {
        let present: HashSet<&str> = working.iter().map(|n| n.id.as_str()).collect();
        let promote: HashSet<&str> = working
            .iter()
            .filter_map(HierarchyNode::parent_id)
            .filter(|parent| self.siblings_complete(parent, &present, index))
            .collect();
        if promote.is_empty() {
            return None;
        }

        let mut emitted = HashSet::new();
        let mut next = Vec::with_capacity(working.len());
        for node in working {
            let target = node
                .parent_id()
                .filter(|p| promote.contains(p))
                .and_then(|p| index.get(p))
                .unwrap_or(node);
            if emitted.insert(target.id.as_str()) {
                next.push(target.clone());
            }
        }

        let changed = next.len() != working.len() || next.iter().any(|n| !present.contains(n.id.as_str()));
        changed.then_some(next)
    }

    #[allow(clippy::cast_precision_loss)]
    fn siblings_complete(&self, parent: &str, present: &HashSet<&str>, index: &NodeIndex) -> bool {
        // A parent on a cycle would hand the set back to its own child.
        if index.get(parent).is_none() || index.on_parent_cycle(parent) {
            return false;
        }
        let children = index.children_of(parent);
        if children.is_empty() {
            return false;
        }
        let found = children.iter().filter(|c| present.contains(c.as_str())).count();
        found as f64 / children.len() as f64 >= f64::from(self.config.child_ratio)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::{Value, json};

    use super::*;
    use crate::hierarchy::RELATIONSHIPS_KEY;

    fn node(id: &str, parent: Option<&str>, children: &[&str]) -> DocumentNode {
        let mut rel = serde_json::Map::new();
        if let Some(p) = parent {
            rel.insert("PARENT".into(), json!({ "node_id": p }));
        }
        if !children.is_empty() {
            rel.insert("CHILD".into(), json!(children));
        }
        DocumentNode::new(id, format!("text {id}"))
            .with_metadata([(RELATIONSHIPS_KEY.to_owned(), Value::Object(rel))].into())
    }

    /// root -> (p -> (a, b), q -> (c, d)), plus an orphan `o` whose parent is missing.
    fn corpus() -> Vec<DocumentNode> {
        vec![
            node("root", None, &["p", "q"]),
            node("p", Some("root"), &["a", "b"]),
            node("q", Some("root"), &["c", "d"]),
            node("a", Some("p"), &[]),
            node("b", Some("p"), &[]),
            node("c", Some("q"), &[]),
            node("d", Some("q"), &[]),
            node("o", Some("gone"), &[]),
            DocumentNode::new("plain", "no metadata"),
        ]
    }

    fn pick(ids: &[&str]) -> Vec<DocumentNode> {
        let all = corpus();
        ids.iter()
            .map(|id| all.iter().find(|n| n.id == *id).unwrap().clone())
            .collect()
    }

    fn ids(records: &[MergedRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn complete_siblings_become_parent() {
        let out = HierarchicalMerger::default().merge(&pick(&["a", "b"]), &corpus());
        assert_eq!(ids(&out), vec!["p"]);
        assert_eq!(out[0].text, "text p");
    }

    #[test]
    fn partial_siblings_stay() {
        let out = HierarchicalMerger::default().merge(&pick(&["a", "c"]), &corpus());
        assert_eq!(ids(&out), vec!["a", "c"]);
    }

    #[test]
    fn parent_takes_first_child_position() {
        let out = HierarchicalMerger::default().merge(&pick(&["plain", "b", "c", "a"]), &corpus());
        assert_eq!(ids(&out), vec!["plain", "p", "c"]);
    }

    #[test]
    fn merges_up_several_levels() {
        let merger = HierarchicalMerger::default();
        let report = merger.merge_with_index(&pick(&["a", "b", "c", "d"]), &NodeIndex::build(&corpus()));
        assert_eq!(ids(&report.records), vec!["root"]);
        assert_eq!(report.passes, 2);
        assert_eq!(report.sizes, vec![4, 2, 1]);
    }

    #[test]
    fn missing_parent_and_no_metadata_stay_unmerged() {
        let out = HierarchicalMerger::default().merge(&pick(&["o", "plain"]), &corpus());
        assert_eq!(ids(&out), vec!["o", "plain"]);
    }

    #[test]
    fn lower_ratio_merges_partial_sets() {
        let merger = HierarchicalMerger::new(MergeConfig { child_ratio: 0.5 });
        let out = merger.merge(&pick(&["a"]), &corpus());
        // a -> p, then p is half of root's children.
        assert_eq!(ids(&out), vec!["root"]);
    }

    #[test]
    fn parent_cycle_is_left_unmerged() {
        let cyclic = vec![node("a", Some("b"), &[]), node("b", Some("a"), &[])];
        let index = NodeIndex::build(&cyclic);
        let merger = HierarchicalMerger::default();
        for leaves in [vec![cyclic[0].clone()], cyclic.clone()] {
            let report = merger.merge_with_index(&leaves, &index);
            assert_eq!(report.passes, 0);
            let again: Vec<DocumentNode> = report.records.iter().cloned().map(DocumentNode::from).collect();
            assert_eq!(merger.merge_with_index(&again, &index).records, report.records);
        }
    }

    #[test]
    fn chain_into_cycle_stops_below_it() {
        let docs = vec![
            node("t1", Some("p"), &[]),
            node("t2", Some("p"), &[]),
            node("p", Some("a"), &["t1", "t2"]),
            node("a", Some("b"), &["p"]),
            node("b", Some("a"), &["a"]),
        ];
        let index = NodeIndex::build(&docs);
        let merger = HierarchicalMerger::default();
        let report = merger.merge_with_index(&docs[..2], &index);
        assert_eq!(ids(&report.records), vec!["p"]);
        assert_eq!(report.passes, 1);
        assert!(report.passes <= index.depth());
        let again: Vec<DocumentNode> = report.records.iter().cloned().map(DocumentNode::from).collect();
        assert_eq!(merger.merge_with_index(&again, &index).records, report.records);
    }

    #[test]
    fn duplicate_leaves_collapse() {
        let out = HierarchicalMerger::default().merge(&pick(&["c", "c"]), &corpus());
        assert_eq!(ids(&out), vec!["c"]);
    }

    #[test]
    fn leaf_outside_corpus_uses_own_metadata() {
        let stray = node("x", Some("p"), &[]);
        let out = HierarchicalMerger::default().merge(&[stray], &corpus());
        assert_eq!(ids(&out), vec!["x"]);
    }

    #[test]
    fn empty_inputs() {
        let merger = HierarchicalMerger::default();
        assert!(merger.merge(&[], &corpus()).is_empty());
        let out = merger.merge(&pick(&["a"]), &[]);
        assert_eq!(ids(&out), vec!["a"]);
    }

    #[test]
    fn records_convert_back_to_documents() {
        let out = HierarchicalMerger::default().merge(&pick(&["a", "b"]), &corpus());
        let doc = DocumentNode::from(out[0].clone());
        assert_eq!(doc.id, "p");
        assert!(doc.metadata.contains_key(RELATIONSHIPS_KEY));
        let candidate = out[0].clone().into_candidate();
        assert_eq!(candidate.score, None);
    }

    /// Random forest: node `i` optionally hangs under an earlier node.
    fn forest() -> impl Strategy<Value = (Vec<DocumentNode>, Vec<DocumentNode>, f32)> {
        (
            proptest::collection::vec(proptest::option::of(any::<prop::sample::Index>()), 1..24),
            proptest::collection::vec(any::<bool>(), 24),
            prop_oneof![Just(1.0_f32), Just(0.5_f32), Just(0.34_f32)],
        )
            .prop_map(|(links, mask, ratio)| {
                let parents: Vec<Option<usize>> = links
                    .iter()
                    .enumerate()
                    .map(|(i, l)| if i == 0 { None } else { l.map(|ix| ix.index(i)) })
                    .collect();
                let name = |i: usize| format!("n{i}");
                let docs: Vec<DocumentNode> = (0..parents.len())
                    .map(|i| {
                        let children: Vec<String> =
                            (0..parents.len()).filter(|&c| parents[c] == Some(i)).map(name).collect();
                        let child_refs: Vec<&str> = children.iter().map(String::as_str).collect();
                        let parent = parents[i].map(name);
                        node(&name(i), parent.as_deref(), &child_refs)
                    })
                    .collect();
                let leaves = docs
                    .iter()
                    .zip(&mask)
                    .filter(|(_, keep)| **keep)
                    .map(|(d, _)| d.clone())
                    .collect();
                (docs, leaves, ratio)
            })
    }

    proptest! {
        #[test]
        fn merge_is_idempotent((corpus, leaves, ratio) in forest()) {
            let merger = HierarchicalMerger::new(MergeConfig { child_ratio: ratio });
            let once = merger.merge(&leaves, &corpus);
            let again_input: Vec<DocumentNode> = once.iter().cloned().map(DocumentNode::from).collect();
            let twice = merger.merge(&again_input, &corpus);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn merge_terminates_within_depth((corpus, leaves, ratio) in forest()) {
            let merger = HierarchicalMerger::new(MergeConfig { child_ratio: ratio });
            let index = NodeIndex::build(&corpus);
            let report = merger.merge_with_index(&leaves, &index);
            prop_assert!(report.passes <= index.depth());
            prop_assert!(report.sizes.windows(2).all(|w| w[1] <= w[0]));

            let mut unique: Vec<&str> = ids(&report.records);
            let total = unique.len();
            unique.sort_unstable();
            unique.dedup();
            prop_assert_eq!(unique.len(), total);
        }
    }
}
