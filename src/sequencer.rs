//! "What's next" after a topic's quiz is finished.
//!
//! The next topic is the following sibling under the same level-2 label (by
//! item). When the label is exhausted, the walk moves to the next level-2 label
//! under the same level-1 parent and starts at its lowest-id topic. Running off
//! the end of the course yields `None`.

use serde::Serialize;

use crate::db::{Label, RefValue, Topic, TopicWithLabel};
use crate::error::{CoreError, CoreResult};
use crate::hierarchy::{id_equals, parent_ref, reference_matches, resolve_reference};
use crate::ordering::{compare_items, item_greater};
use crate::store::CourseStore;

/// What the completion screen needs to link onwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NextTopic {
    #[serde(rename = "nextTopicId")]
    pub next_topic_id: Option<i64>,
    #[serde(rename = "nextTopicName")]
    pub next_topic_name: Option<String>,
}

impl From<Option<Topic>> for NextTopic {
    fn from(topic: Option<Topic>) -> Self {
        match topic {
            Some(t) => NextTopic { next_topic_id: Some(t.id), next_topic_name: Some(t.topic) },
            None => NextTopic { next_topic_id: None, next_topic_name: None },
        }
    }
}

/// Compute the topic to present after `current_topic_id`.
///
/// Level-2 labels count as siblings only when their raw parent references are
/// equal. Use [`next_topic_with_roots`] to also group labels whose parent
/// references name the same level-1 label in different forms.
///
/// Fails with `NotFound` when the topic or its label cannot be resolved.
pub fn next_topic(
    current_topic_id: &RefValue,
    all_topics: &[TopicWithLabel],
    level2: &[Label],
) -> CoreResult<Option<Topic>> {
    next_topic_with_roots(current_topic_id, all_topics, level2, &[])
}

/// Like [`next_topic`], but two level-2 labels also share a parent when both
/// parent references resolve to the same label in `level1`.
pub fn next_topic_with_roots(
    current_topic_id: &RefValue,
    all_topics: &[TopicWithLabel],
    level2: &[Label],
    level1: &[Label],
) -> CoreResult<Option<Topic>> {
    let current = all_topics
        .iter()
        .find(|t| id_equals(&RefValue::Int(t.topic.id), current_topic_id))
        .ok_or_else(|| CoreError::NotFound(format!("topic {}", current_topic_id)))?;

    let label = current
        .label
        .as_ref()
        .or_else(|| {
            current
                .topic
                .label_id
                .as_ref()
                .and_then(|r| resolve_reference(r, level2))
        })
        .ok_or_else(|| CoreError::NotFound(format!("label for topic {}", current.topic.id)))?;

    if let Some(sibling) = next_sibling(&current.topic, label, all_topics) {
        return Ok(Some(sibling.clone()));
    }

    Ok(first_topic_of_next_label(label, all_topics, level2, level1).cloned())
}

/// Following topic under the same label with a strictly greater item.
fn next_sibling<'a>(current: &Topic, label: &Label, all_topics: &'a [TopicWithLabel]) -> Option<&'a Topic> {
    let mut siblings: Vec<&Topic> = all_topics
        .iter()
        .map(|t| &t.topic)
        .filter(|t| belongs_to(t, label))
        .collect();
    siblings.sort_by(|a, b| compare_items(*a, *b));

    let index = siblings.iter().position(|t| t.id == current.id)?;
    siblings[index + 1..]
        .iter()
        .find(|t| item_greater(t.item.as_deref(), current.item.as_deref()))
        .copied()
}

/// Lowest-id topic of the next level-2 label under the same parent.
fn first_topic_of_next_label<'a>(
    label: &Label,
    all_topics: &'a [TopicWithLabel],
    level2: &[Label],
    level1: &[Label],
) -> Option<&'a Topic> {
    let parent = parent_ref(label)?;
    let root = resolve_reference(parent, level1).map(|r| r.id);

    let mut pool: Vec<&Label> = level2
        .iter()
        .filter(|l| match parent_ref(l) {
            Some(p) if id_equals(p, parent) => true,
            Some(p) => root.is_some() && resolve_reference(p, level1).map(|r| r.id) == root,
            None => false,
        })
        .collect();
    pool.sort_by(|a, b| compare_items(*a, *b));

    let index = pool.iter().position(|l| l.id == label.id).unwrap_or(0);
    let next_label = pool[index..]
        .iter()
        .find(|l| item_greater(l.item.as_deref(), label.item.as_deref()))?;

    all_topics
        .iter()
        .map(|t| &t.topic)
        .filter(|t| belongs_to(t, next_label))
        .min_by_key(|t| t.id)
}

fn belongs_to(topic: &Topic, label: &Label) -> bool {
    topic
        .label_id
        .as_ref()
        .map(|r| reference_matches(r, label))
        .unwrap_or(false)
}

/// Load everything the sequencer needs from storage and compute the next topic.
pub fn next_topic_for(store: &dyn CourseStore, current_topic_id: &RefValue) -> CoreResult<NextTopic> {
    let all_topics = store.get_all_topics_with_labels()?;
    let level2 = store.get_labels_by_level(2)?;
    let level1 = store.get_labels_by_level(1)?;
    let next = next_topic_with_roots(current_topic_id, &all_topics, &level2, &level1)?;
    Ok(NextTopic::from(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ParentFields;

    fn l2(id: i64, item: &str, parent: RefValue) -> Label {
        Label {
            id,
            name: format!("Branch {}", id),
            description: None,
            level: 2,
            item: Some(item.to_string()),
            course_id: None,
            parent: ParentFields { parent_node_id: Some(parent), ..Default::default() },
        }
    }

    fn topic(id: i64, label: &Label, item: &str) -> TopicWithLabel {
        TopicWithLabel {
            topic: Topic {
                id,
                topic: format!("Topic {}", id),
                description: None,
                weightage: 50,
                label_id: Some(RefValue::Int(label.id)),
                item: Some(item.to_string()),
            },
            label: Some(label.clone()),
        }
    }

    fn next_id(id: i64, topics: &[TopicWithLabel], level2: &[Label]) -> Option<i64> {
        next_topic(&RefValue::Int(id), topics, level2).unwrap().map(|t| t.id)
    }

    #[test]
    fn test_next_sibling_by_item() {
        let a = l2(1, "1", RefValue::Int(100));
        let topics = vec![topic(11, &a, "B"), topic(10, &a, "A")];
        let level2 = vec![a];

        assert_eq!(next_id(10, &topics, &level2), Some(11));
        assert_eq!(next_id(11, &topics, &level2), None);
    }

    #[test]
    fn test_moves_to_next_label_lowest_id() {
        let a = l2(1, "1", RefValue::Int(100));
        let b = l2(2, "2", RefValue::Int(100));
        let topics = vec![
            topic(10, &a, "A"),
            topic(31, &b, "A"),
            topic(30, &b, "Z"),
        ];
        let level2 = vec![b, a];

        // Lowest id, not lowest item
        assert_eq!(next_id(10, &topics, &level2), Some(30));
    }

    #[test]
    fn test_next_label_must_share_parent() {
        let a = l2(1, "1", RefValue::Int(100));
        let other = l2(2, "2", RefValue::Int(200));
        let topics = vec![topic(10, &a, "A"), topic(20, &other, "A")];
        let level2 = vec![a, other];

        assert_eq!(next_id(10, &topics, &level2), None);
    }

    #[test]
    fn test_parent_reference_compared_by_string_form() {
        let a = l2(1, "1", RefValue::Int(100));
        let b = l2(2, "2", RefValue::Text("100".to_string()));
        let topics = vec![topic(10, &a, "A"), topic(20, &b, "A")];
        let level2 = vec![a, b];

        assert_eq!(next_id(10, &topics, &level2), Some(20));
    }

    #[test]
    fn test_parent_by_id_and_by_name_share_root() {
        let root = Label {
            id: 1,
            name: "Root".to_string(),
            description: None,
            level: 1,
            item: Some("1".to_string()),
            course_id: None,
            parent: ParentFields::default(),
        };
        let a = l2(2, "1", RefValue::Int(1));
        let mut b = l2(3, "2", RefValue::Int(0));
        b.parent = ParentFields { parent_label: Some(RefValue::Text("Root".to_string())), ..Default::default() };
        let topics = vec![topic(10, &a, "A"), topic(20, &b, "A")];
        let level2 = vec![a, b];

        // Raw references differ, so the plain walk stops
        assert_eq!(next_id(10, &topics, &level2), None);

        let next = next_topic_with_roots(&RefValue::Int(10), &topics, &level2, &[root]).unwrap();
        assert_eq!(next.map(|t| t.id), Some(20));
    }

    #[test]
    fn test_equal_items_are_skipped() {
        let a = l2(1, "1", RefValue::Int(100));
        let topics = vec![topic(10, &a, "A"), topic(11, &a, "a"), topic(12, &a, "B")];
        let level2 = vec![a];

        assert_eq!(next_id(10, &topics, &level2), Some(12));
    }

    #[test]
    fn test_orphan_label_ends_after_siblings() {
        let mut orphan = l2(1, "1", RefValue::Int(0));
        orphan.parent = ParentFields::default();
        let later = l2(2, "2", RefValue::Int(100));
        let topics = vec![topic(10, &orphan, "A"), topic(20, &later, "A")];
        let level2 = vec![orphan, later];

        assert_eq!(next_id(10, &topics, &level2), None);
    }

    #[test]
    fn test_string_topic_id_is_accepted() {
        let a = l2(1, "1", RefValue::Int(100));
        let topics = vec![topic(10, &a, "A"), topic(11, &a, "B")];
        let level2 = vec![a];

        let next = next_topic(&RefValue::Text("10".to_string()), &topics, &level2).unwrap();
        assert_eq!(next.map(|t| t.id), Some(11));
    }

    #[test]
    fn test_unknown_topic_or_label_is_not_found() {
        let a = l2(1, "1", RefValue::Int(100));
        let mut unlabeled = topic(10, &a, "A");
        unlabeled.label = None;
        unlabeled.topic.label_id = Some(RefValue::Text("Nowhere".to_string()));
        let topics = vec![unlabeled];
        let level2 = vec![a];

        assert!(matches!(
            next_topic(&RefValue::Int(99), &topics, &level2),
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            next_topic(&RefValue::Int(10), &topics, &level2),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_next_topic_into_completion_payload() {
        let payload = NextTopic::from(None::<Topic>);
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json["nextTopicId"].is_null());
        assert!(json["nextTopicName"].is_null());
    }
}
