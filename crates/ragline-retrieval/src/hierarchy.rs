//! Parent/child structure of the chunk corpus.
//!
//! Ingestion stores each chunk's relationships as serialized metadata under
//! [`RELATIONSHIPS_KEY`]. Relation kinds appear either by name (`"PARENT"`,
//! `"child"`, ...) or by numeric code (`"1"` source, `"2"` previous, `"3"` next,
//! `"4"` parent, `"5"` child). A related entry is a bare id, an object carrying
//! `node_id`, or a list of either.

use std::collections::{BTreeMap, HashMap, HashSet};

use ragline_corpus::{DocumentNode, Metadata};
use serde_json::Value;

pub const RELATIONSHIPS_KEY: &str = "relationships";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelationKind {
    Source,
    Previous,
    Next,
    Parent,
    Child,
}

impl RelationKind {
    /// Parse a relation key by name or numeric code, ignoring case and any
    /// `NodeRelationship.` style prefix.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        let key = key.trim();
        let name = key.rsplit('.').next().unwrap_or(key);
        match name.to_ascii_uppercase().as_str() {
            "1" | "SOURCE" => Some(Self::Source),
            "2" | "PREV" | "PREVIOUS" => Some(Self::Previous),
            "3" | "NEXT" => Some(Self::Next),
            "4" | "PARENT" => Some(Self::Parent),
            "5" | "CHILD" | "CHILDREN" => Some(Self::Child),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Related {
    One(String),
    Many(Vec<String>),
}

impl Related {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => {
                let ids: Vec<String> = items.iter().filter_map(related_id).collect();
                (!ids.is_empty()).then_some(Self::Many(ids))
            }
            other => related_id(other).map(Self::One),
        }
    }

    #[must_use]
    pub fn ids(&self) -> &[String] {
        match self {
            Self::One(id) => std::slice::from_ref(id),
            Self::Many(ids) => ids,
        }
    }
}

fn related_id(value: &Value) -> Option<String> {
    let id = match value {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("node_id").or_else(|| map.get("id"))?.as_str()?,
        _ => return None,
    };
    let id = id.trim();
    (!id.is_empty()).then(|| id.to_owned())
}

/// A corpus chunk with its relationships rehydrated.
#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyNode {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub relationships: BTreeMap<RelationKind, Related>,
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl HierarchyNode {
    #[must_use]
    pub fn from_document(node: &DocumentNode) -> Self {
        let offset = |keys: [&str; 2]| {
            keys.iter()
                .find_map(|k| node.metadata.get(*k).and_then(Value::as_u64))
        };
        Self {
            id: node.id.clone(),
            text: node.text.clone(),
            metadata: node.metadata.clone(),
            relationships: parse_relationships(node.metadata.get(RELATIONSHIPS_KEY)),
            start: offset(["start_char_idx", "start"]),
            end: offset(["end_char_idx", "end"]),
        }
    }

    /// The parent link, ignoring self-references.
    #[must_use]
    pub fn parent_id(&self) -> Option<&str> {
        self.relationships
            .get(&RelationKind::Parent)
            .and_then(|r| r.ids().first())
            .map(String::as_str)
            .filter(|p| *p != self.id)
    }

    #[must_use]
    pub fn child_ids(&self) -> &[String] {
        self.relationships
            .get(&RelationKind::Child)
            .map(Related::ids)
            .unwrap_or_default()
    }
}

fn parse_relationships(raw: Option<&Value>) -> BTreeMap<RelationKind, Related> {
    let decoded;
    let map = match raw {
        Some(Value::Object(map)) => map,
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => {
                decoded = map;
                &decoded
            }
            _ => return BTreeMap::new(),
        },
        _ => return BTreeMap::new(),
    };
    map.iter()
        .filter_map(|(k, v)| Some((RelationKind::parse(k)?, Related::from_value(v)?)))
        .collect()
}

/// Arena of corpus nodes keyed by id, with parent and child links resolved.
///
/// Children of a node are its own `CHILD` entries followed by any node whose
/// `PARENT` points at it but which the parent does not list.
#[derive(Debug, Clone, Default)]
pub struct NodeIndex {
    nodes: HashMap<String, HierarchyNode>,
    children: HashMap<String, Vec<String>>,
}

impl NodeIndex {
    #[must_use]
    pub fn build(corpus: &[DocumentNode]) -> Self {
        let mut nodes: HashMap<String, HierarchyNode> = HashMap::with_capacity(corpus.len());
        let mut order = Vec::with_capacity(corpus.len());
        for doc in corpus {
            if !nodes.contains_key(&doc.id) {
                order.push(doc.id.clone());
                nodes.insert(doc.id.clone(), HierarchyNode::from_document(doc));
            }
        }

        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for id in &order {
            let node = &nodes[id];
            let listed: Vec<String> = node
                .child_ids()
                .iter()
                .filter(|c| *c != id)
                .cloned()
                .collect();
            if !listed.is_empty() {
                children.insert(id.clone(), listed);
            }
        }
        for id in &order {
            if let Some(parent) = nodes[id].parent_id() {
                let list = children.entry(parent.to_owned()).or_default();
                if !list.contains(id) {
                    list.push(id.clone());
                }
            }
        }

        Self { nodes, children }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&HierarchyNode> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn children_of(&self, id: &str) -> &[String] {
        self.children.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Length of the longest parent chain, counted in edges. Cycles are cut at
    /// the first repeated node.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.nodes
            .values()
            .map(|node| {
                let mut seen = HashSet::from([node.id.as_str()]);
                let mut current = node;
                let mut hops = 0;
                while let Some(parent) = current.parent_id().and_then(|p| self.nodes.get(p)) {
                    if !seen.insert(parent.id.as_str()) {
                        break;
                    }
                    hops += 1;
                    current = parent;
                }
                hops
            })
            .max()
            .unwrap_or(0)
    }

    /// Whether following parent links up from `id` leads back to `id`.
    #[must_use]
    pub fn on_parent_cycle(&self, id: &str) -> bool {
        let mut seen = HashSet::new();
        let mut current = id;
        while let Some(parent) = self.nodes.get(current).and_then(HierarchyNode::parent_id) {
            if parent == id {
                return true;
            }
            if !seen.insert(parent) {
                return false;
            }
            current = parent;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(id: &str, relationships: Value) -> DocumentNode {
        DocumentNode::new(id, format!("text {id}"))
            .with_metadata([(RELATIONSHIPS_KEY.to_owned(), relationships)].into())
    }

    #[test]
    fn relation_kind_names_and_codes() {
        assert_eq!(RelationKind::parse("PARENT"), Some(RelationKind::Parent));
        assert_eq!(RelationKind::parse("child"), Some(RelationKind::Child));
        assert_eq!(RelationKind::parse("NodeRelationship.PREV"), Some(RelationKind::Previous));
        assert_eq!(RelationKind::parse("4"), Some(RelationKind::Parent));
        assert_eq!(RelationKind::parse("1"), Some(RelationKind::Source));
        assert_eq!(RelationKind::parse("sibling"), None);
    }

    #[test]
    fn rehydrates_objects_and_lists() {
        let node = HierarchyNode::from_document(&doc(
            "p",
            json!({
                "4": {"node_id": "root"},
                "CHILD": [{"node_id": "a"}, "b", {"other": 1}],
                "next": "q",
            }),
        ));
        assert_eq!(node.parent_id(), Some("root"));
        assert_eq!(node.child_ids(), ["a".to_owned(), "b".to_owned()]);
        assert_eq!(
            node.relationships.get(&RelationKind::Next),
            Some(&Related::One("q".into()))
        );
    }

    #[test]
    fn rehydrates_string_encoded_relationships() {
        let node = HierarchyNode::from_document(&doc("a", json!(r#"{"PARENT": "p"}"#)));
        assert_eq!(node.parent_id(), Some("p"));
    }

    #[test]
    fn missing_or_malformed_metadata_means_no_parent() {
        assert_eq!(
            HierarchyNode::from_document(&DocumentNode::new("a", "t")).parent_id(),
            None
        );
        assert_eq!(
            HierarchyNode::from_document(&doc("a", json!("not json"))).parent_id(),
            None
        );
        assert_eq!(
            HierarchyNode::from_document(&doc("a", json!({"PARENT": "a"}))).parent_id(),
            None
        );
    }

    #[test]
    fn offsets_read_from_metadata() {
        let node = HierarchyNode::from_document(&DocumentNode::new("a", "t").with_metadata(
            [
                ("start_char_idx".to_owned(), json!(10)),
                ("end_char_idx".to_owned(), json!(42)),
            ]
            .into(),
        ));
        assert_eq!((node.start, node.end), (Some(10), Some(42)));
    }

    #[test]
    fn index_merges_listed_and_back_linked_children() {
        let corpus = vec![
            doc("p", json!({"CHILD": ["a"]})),
            doc("a", json!({"PARENT": "p"})),
            doc("b", json!({"PARENT": "p"})),
        ];
        let index = NodeIndex::build(&corpus);
        assert_eq!(index.children_of("p"), ["a".to_owned(), "b".to_owned()]);
        assert!(index.children_of("a").is_empty());
        assert_eq!(index.depth(), 1);
    }

    #[test]
    fn depth_survives_cycles() {
        let corpus = vec![doc("a", json!({"PARENT": "b"})), doc("b", json!({"PARENT": "a"}))];
        assert_eq!(NodeIndex::build(&corpus).depth(), 1);
    }

    #[test]
    fn parent_cycle_membership() {
        let corpus = vec![
            doc("a", json!({"PARENT": "b"})),
            doc("b", json!({"PARENT": "a"})),
            doc("tail", json!({"PARENT": "a"})),
        ];
        let index = NodeIndex::build(&corpus);
        assert!(index.on_parent_cycle("a"));
        assert!(index.on_parent_cycle("b"));
        assert!(!index.on_parent_cycle("tail"));
        assert!(!index.on_parent_cycle("missing"));
    }
}
