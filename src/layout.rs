//! Three-column mind map layout.
//!
//! Columns are level-1 labels, level-2 labels and topics. Topics get one row
//! each; every label is then pulled up (or down) to the row of its first
//! child, so parents always line up with the top of their subtree. Labels
//! with no children are appended below everything already placed.
//!
//! The layout is data only (row positions and edges). Drawing is left to
//! `render`.

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::db::{Label, Topic};
use crate::hierarchy::{reference_matches, resolve_parent, resolve_reference};
use crate::ordering::{compare_item_codes, compare_items};

/// Vertical distance between rows.
pub const ROW_PITCH: f64 = 120.0;

/// Node identifier in the rendered diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    Level1(i64),
    Level2(i64),
    Topic(i64),
}

impl NodeId {
    /// Diagram column, left to right.
    pub fn column(&self) -> usize {
        match self {
            NodeId::Level1(_) => 0,
            NodeId::Level2(_) => 1,
            NodeId::Topic(_) => 2,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Level1(id) => write!(f, "node-l1-{}", id),
            NodeId::Level2(id) => write!(f, "node-l2-{}", id),
            NodeId::Topic(id) => write!(f, "stack-{}", id),
        }
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MindMapLayout {
    pub positions: BTreeMap<NodeId, f64>,
    pub edges: Vec<Edge>,
    #[serde(rename = "totalHeight")]
    pub total_height: f64,
}

impl MindMapLayout {
    pub fn position(&self, id: &NodeId) -> Option<f64> {
        self.positions.get(id).copied()
    }
}

/// Result of a layout pass. `Empty` means there were no level-1 labels at all,
/// which callers render differently from a map whose nodes are disconnected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Layout {
    Empty,
    Ready(MindMapLayout),
}

/// Assigns rows in order, handing out fresh rows for nodes without children.
struct RowCursor {
    next_free: usize,
}

impl RowCursor {
    fn append(&mut self) -> usize {
        let row = self.next_free;
        self.next_free += 1;
        row
    }
}

fn row_y(row: usize) -> f64 {
    row as f64 * ROW_PITCH
}

/// Compute row positions and edges for the mind map.
pub fn compute_layout(level1: &[Label], level2: &[Label], topics: &[Topic]) -> Layout {
    if level1.is_empty() {
        return Layout::Empty;
    }

    // Index of each level-2 label's level-1 parent
    let l2_parent: Vec<Option<usize>> = level2
        .iter()
        .map(|l| resolve_parent(l, level1).and_then(|p| index_of(level1, p)))
        .collect();

    // Index of each topic's level-2 ancestor (sort key only)
    let topic_l2: Vec<Option<usize>> = topics
        .iter()
        .map(|t| {
            t.label_id
                .as_ref()
                .and_then(|r| resolve_reference(r, level2))
                .and_then(|l| index_of(level2, l))
        })
        .collect();

    let l2_item = |i: usize| level2[i].item.as_deref();
    let l1_item_of_l2 = |i: usize| l2_parent[i].and_then(|p| level1[p].item.as_deref());

    // Step 1: topics by (level-2 item, level-1 item, own item)
    let mut topic_order: Vec<usize> = (0..topics.len()).collect();
    topic_order.sort_by(|&a, &b| {
        compare_item_codes(topic_l2[a].and_then(l2_item), topic_l2[b].and_then(l2_item))
            .then_with(|| {
                compare_item_codes(
                    topic_l2[a].and_then(l1_item_of_l2),
                    topic_l2[b].and_then(l1_item_of_l2),
                )
            })
            .then_with(|| compare_items(&topics[a], &topics[b]))
    });

    let mut positions = BTreeMap::new();
    for (row, &t) in topic_order.iter().enumerate() {
        positions.insert(NodeId::Topic(topics[t].id), row_y(row));
    }

    let mut cursor = RowCursor { next_free: topics.len() };

    // Step 2: level-2 labels by (level-1 item, own item), aligned to first topic
    let mut l2_order: Vec<usize> = (0..level2.len()).collect();
    l2_order.sort_by(|&a, &b| {
        compare_item_codes(l1_item_of_l2(a), l1_item_of_l2(b))
            .then_with(|| compare_items(&level2[a], &level2[b]))
    });

    let mut l2_y = vec![0.0; level2.len()];
    for &i in &l2_order {
        let first_topic_row = topic_order
            .iter()
            .position(|&t| topic_belongs_to(&topics[t], &level2[i]));
        let row = first_topic_row.unwrap_or_else(|| cursor.append());
        l2_y[i] = row_y(row);
        positions.insert(NodeId::Level2(level2[i].id), l2_y[i]);
    }

    // Step 3: level-1 labels by own item, aligned to first level-2 child
    let mut l1_order: Vec<usize> = (0..level1.len()).collect();
    l1_order.sort_by(|&a, &b| compare_items(&level1[a], &level1[b]));

    for &p in &l1_order {
        let first_child = l2_order.iter().find(|&&i| l2_parent[i] == Some(p));
        let y = match first_child {
            Some(&i) => l2_y[i],
            None => row_y(cursor.append()),
        };
        positions.insert(NodeId::Level1(level1[p].id), y);
    }

    // Step 4: edges, level-1 -> level-2 first, then level-2 -> topic
    let mut edges = Vec::new();
    let mut seen = HashSet::new();
    let mut push_edge = |from: NodeId, to: NodeId| {
        if seen.insert((from, to)) {
            edges.push(Edge { from, to });
        }
    };

    for &p in &l1_order {
        for &i in l2_order.iter().filter(|&&i| l2_parent[i] == Some(p)) {
            push_edge(NodeId::Level1(level1[p].id), NodeId::Level2(level2[i].id));
        }
    }
    for &i in &l2_order {
        for &t in topic_order.iter().filter(|&&t| topic_belongs_to(&topics[t], &level2[i])) {
            push_edge(NodeId::Level2(level2[i].id), NodeId::Topic(topics[t].id));
        }
    }

    // Step 5
    let max_y = positions.values().copied().fold(0.0_f64, f64::max);

    Layout::Ready(MindMapLayout {
        positions,
        edges,
        total_height: max_y + ROW_PITCH,
    })
}

fn index_of(labels: &[Label], target: &Label) -> Option<usize> {
    labels.iter().position(|l| std::ptr::eq(l, target))
}

fn topic_belongs_to(topic: &Topic, label: &Label) -> bool {
    topic
        .label_id
        .as_ref()
        .map(|r| reference_matches(r, label))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ParentFields, RefValue};

    fn l1(id: i64, item: &str) -> Label {
        Label {
            id,
            name: format!("Root {}", id),
            description: None,
            level: 1,
            item: Some(item.to_string()),
            course_id: None,
            parent: ParentFields::default(),
        }
    }

    fn l2(id: i64, item: &str, parent: Option<RefValue>) -> Label {
        Label {
            id,
            name: format!("Branch {}", id),
            description: None,
            level: 2,
            item: Some(item.to_string()),
            course_id: None,
            parent: ParentFields { parent_id: parent, ..Default::default() },
        }
    }

    fn topic(id: i64, label: RefValue, item: &str) -> Topic {
        Topic {
            id,
            topic: format!("Topic {}", id),
            description: None,
            weightage: 0,
            label_id: Some(label),
            item: Some(item.to_string()),
        }
    }

    fn ready(layout: Layout) -> MindMapLayout {
        match layout {
            Layout::Ready(l) => l,
            Layout::Empty => panic!("expected a populated layout"),
        }
    }

    /// Every parent sits on the row of its first child.
    fn assert_aligned(layout: &MindMapLayout) {
        let mut first_child: BTreeMap<NodeId, NodeId> = BTreeMap::new();
        for edge in &layout.edges {
            first_child.entry(edge.from).or_insert(edge.to);
        }
        for (parent, child) in first_child {
            assert_eq!(layout.position(&parent), layout.position(&child), "{} vs {}", parent, child);
        }
    }

    #[test]
    fn test_single_chain_end_to_end() {
        let level1 = vec![Label { name: "Root".to_string(), item: Some("A".to_string()), ..l1(1, "A") }];
        let level2 = vec![Label { name: "Child".to_string(), ..l2(2, "A", Some(RefValue::Int(1))) }];
        let topics = vec![topic(10, RefValue::Int(2), "A")];

        let layout = ready(compute_layout(&level1, &level2, &topics));
        assert_eq!(layout.position(&NodeId::Topic(10)), Some(0.0));
        assert_eq!(layout.position(&NodeId::Level2(2)), Some(0.0));
        assert_eq!(layout.position(&NodeId::Level1(1)), Some(0.0));

        let edges: Vec<(String, String)> = layout
            .edges
            .iter()
            .map(|e| (e.from.to_string(), e.to.to_string()))
            .collect();
        assert_eq!(
            edges,
            vec![
                ("node-l1-1".to_string(), "node-l2-2".to_string()),
                ("node-l2-2".to_string(), "stack-10".to_string()),
            ]
        );
        assert_eq!(layout.total_height, ROW_PITCH);
    }

    #[test]
    fn test_empty_level1_is_distinguished() {
        let level2 = vec![l2(2, "A", None)];
        let topics = vec![topic(10, RefValue::Int(2), "A")];
        assert_eq!(compute_layout(&[], &level2, &topics), Layout::Empty);

        // Populated but disconnected is still a real layout
        let layout = ready(compute_layout(&[l1(1, "A")], &level2, &[]));
        assert!(layout.edges.is_empty());
        assert_eq!(layout.position(&NodeId::Level2(2)), Some(0.0));
        assert_eq!(layout.position(&NodeId::Level1(1)), Some(ROW_PITCH));
    }

    #[test]
    fn test_parents_align_with_first_child() {
        let level1 = vec![l1(1, "B"), l1(2, "A")];
        let level2 = vec![
            l2(10, "2", Some(RefValue::Int(1))),
            l2(11, "1", Some(RefValue::Text("Root 1".to_string()))),
            l2(12, "1", Some(RefValue::Int(2))),
        ];
        let topics = vec![
            topic(100, RefValue::Int(10), "b"),
            topic(101, RefValue::Int(10), "a"),
            topic(102, RefValue::Text("Branch 11".to_string()), "a"),
            topic(103, RefValue::Int(12), "z"),
            topic(104, RefValue::Int(12), "c"),
        ];

        let layout = ready(compute_layout(&level1, &level2, &topics));
        assert_aligned(&layout);

        // Topic rows are unique and contiguous
        let mut topic_rows: Vec<f64> = topics
            .iter()
            .filter_map(|t| layout.position(&NodeId::Topic(t.id)))
            .collect();
        topic_rows.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(topic_rows, vec![0.0, 120.0, 240.0, 360.0, 480.0]);

        // Level-2 item "1" topics come before item "2"; among "1", root "A" first
        assert_eq!(layout.position(&NodeId::Topic(104)), Some(0.0));
        assert_eq!(layout.position(&NodeId::Topic(103)), Some(120.0));
        assert_eq!(layout.position(&NodeId::Topic(102)), Some(240.0));
        assert_eq!(layout.position(&NodeId::Topic(101)), Some(360.0));
        assert_eq!(layout.position(&NodeId::Level1(1)), Some(240.0));
        assert_eq!(layout.total_height, 600.0);
    }

    #[test]
    fn test_childless_labels_are_appended() {
        let level1 = vec![l1(1, "A"), l1(2, "B")];
        let level2 = vec![l2(10, "A", Some(RefValue::Int(1))), l2(11, "B", Some(RefValue::Int(1)))];
        let topics = vec![topic(100, RefValue::Int(10), "A")];

        let layout = ready(compute_layout(&level1, &level2, &topics));
        assert_eq!(layout.position(&NodeId::Level2(10)), Some(0.0));
        assert_eq!(layout.position(&NodeId::Level2(11)), Some(120.0));
        assert_eq!(layout.position(&NodeId::Level1(1)), Some(0.0));
        assert_eq!(layout.position(&NodeId::Level1(2)), Some(240.0));
        assert_eq!(layout.total_height, 360.0);
    }

    #[test]
    fn test_orphans_have_no_incoming_edges() {
        let level1 = vec![l1(1, "A")];
        let level2 = vec![l2(10, "A", Some(RefValue::Text("Missing".to_string()))), l2(11, "B", None)];
        let topics = vec![topic(100, RefValue::Int(10), "A"), topic(101, RefValue::Int(99), "B")];

        let layout = ready(compute_layout(&level1, &level2, &topics));
        assert!(!layout.edges.iter().any(|e| e.to == NodeId::Level2(10)));
        assert!(!layout.edges.iter().any(|e| e.to == NodeId::Level2(11)));
        assert!(!layout.edges.iter().any(|e| e.to == NodeId::Topic(101)));
        assert!(layout.edges.contains(&Edge { from: NodeId::Level2(10), to: NodeId::Topic(100) }));
        assert!(layout.position(&NodeId::Topic(101)).is_some());
    }

    #[test]
    fn test_edges_are_deduplicated() {
        // Two identical label rows and a topic matched by both id and name
        let level1 = vec![l1(1, "A")];
        let level2 = vec![l2(10, "A", Some(RefValue::Int(1))), l2(10, "A", Some(RefValue::Int(1)))];
        let topics = vec![topic(100, RefValue::Int(10), "A")];

        let layout = ready(compute_layout(&level1, &level2, &topics));
        let mut pairs: Vec<(NodeId, NodeId)> = layout.edges.iter().map(|e| (e.from, e.to)).collect();
        let before = pairs.len();
        pairs.sort();
        pairs.dedup();
        assert_eq!(pairs.len(), before);
        assert_eq!(before, 2);
    }

    #[test]
    fn test_layout_is_deterministic() {
        let level1 = vec![l1(1, "A"), l1(2, "a")];
        let level2 = vec![l2(10, "x", Some(RefValue::Int(2))), l2(11, "X", Some(RefValue::Int(1)))];
        let topics = vec![topic(100, RefValue::Int(10), "1"), topic(101, RefValue::Int(11), "1")];
        assert_eq!(
            compute_layout(&level1, &level2, &topics),
            compute_layout(&level1, &level2, &topics)
        );
    }

    #[test]
    fn test_layout_serializes_node_ids_as_strings() {
        let layout = compute_layout(&[l1(1, "A")], &[], &[]);
        let json = serde_json::to_value(&layout).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["positions"]["node-l1-1"], 0.0);
        assert_eq!(json["totalHeight"], 120.0);
        assert_eq!(serde_json::to_value(Layout::Empty).unwrap()["status"], "empty");
    }
}
