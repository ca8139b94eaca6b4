//! Mind map view model: layout positions joined with names and progress.

use serde::Serialize;
use std::collections::HashMap;

use crate::db::{Label, Topic};
use crate::error::CoreResult;
use crate::layout::{compute_layout, Layout, NodeId};
use crate::store::CourseStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MindMapNode {
    pub id: NodeId,
    pub column: usize,
    pub name: String,
    pub item: Option<String>,
    pub y: f64,
    /// Topics only; `None` when no progress row exists.
    #[serde(rename = "progressPercent", skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f64>,
    /// Topic id for the Learn link; labels have none.
    #[serde(rename = "topicId", skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MindMap {
    #[serde(flatten)]
    pub layout: Layout,
    pub nodes: Vec<MindMapNode>,
}

impl MindMap {
    pub fn is_empty(&self) -> bool {
        matches!(self.layout, Layout::Empty)
    }
}

/// Load labels, topics and progress, then lay them out.
pub fn build_mind_map(store: &dyn CourseStore) -> CoreResult<MindMap> {
    let level1 = store.get_labels_by_level(1)?;
    let level2 = store.get_labels_by_level(2)?;
    let topics: Vec<Topic> = store
        .get_all_topics_with_labels()?
        .into_iter()
        .map(|t| t.topic)
        .collect();
    let progress: HashMap<i64, f64> = store
        .get_topic_progress()?
        .into_iter()
        .map(|p| (p.topic_id, p.progress_percent))
        .collect();

    tracing::debug!(
        "[MindMap] {} level-1, {} level-2, {} topics",
        level1.len(),
        level2.len(),
        topics.len()
    );

    Ok(assemble(&level1, &level2, &topics, &progress))
}

fn assemble(level1: &[Label], level2: &[Label], topics: &[Topic], progress: &HashMap<i64, f64>) -> MindMap {
    let layout = compute_layout(level1, level2, topics);
    let positioned = match &layout {
        Layout::Empty => return MindMap { layout, nodes: Vec::new() },
        Layout::Ready(l) => l,
    };

    let label_node = |id: NodeId, label: &Label| MindMapNode {
        id,
        column: id.column(),
        name: label.name.clone(),
        item: label.item.clone(),
        y: positioned.position(&id).unwrap_or(0.0),
        progress_percent: None,
        topic_id: None,
    };

    let mut nodes: Vec<MindMapNode> = level1
        .iter()
        .map(|l| label_node(NodeId::Level1(l.id), l))
        .chain(level2.iter().map(|l| label_node(NodeId::Level2(l.id), l)))
        .collect();

    nodes.extend(topics.iter().map(|t| {
        let id = NodeId::Topic(t.id);
        MindMapNode {
            id,
            column: id.column(),
            name: t.topic.clone(),
            item: t.item.clone(),
            y: positioned.position(&id).unwrap_or(0.0),
            progress_percent: progress.get(&t.id).copied(),
            topic_id: Some(t.id),
        }
    }));

    // Top to bottom, left to right
    nodes.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.column.cmp(&b.column)));

    MindMap { layout, nodes }
}
