//! Sibling ordering by free-text `item` codes.
//!
//! Items are compared case-insensitively and lexicographically, so "10" sorts
//! before "2". All sorts are stable: equal items keep their input order.

use std::cmp::Ordering;

use crate::db::{Label, Topic, TopicWithLabel};

/// Anything that sorts among its siblings by an item code.
pub trait HasItem {
    fn item(&self) -> Option<&str>;
}

impl HasItem for Label {
    fn item(&self) -> Option<&str> {
        self.item.as_deref()
    }
}

impl HasItem for Topic {
    fn item(&self) -> Option<&str> {
        self.item.as_deref()
    }
}

impl HasItem for TopicWithLabel {
    fn item(&self) -> Option<&str> {
        self.topic.item.as_deref()
    }
}

impl<T: HasItem + ?Sized> HasItem for &T {
    fn item(&self) -> Option<&str> {
        (**self).item()
    }
}

/// Case-folded sort key for an item; missing items sort as "".
pub fn item_key(item: Option<&str>) -> String {
    item.unwrap_or("").to_lowercase()
}

/// Compare two raw item codes.
pub fn compare_item_codes(a: Option<&str>, b: Option<&str>) -> Ordering {
    item_key(a).cmp(&item_key(b))
}

/// Compare two siblings by item.
pub fn compare_items<A: HasItem + ?Sized, B: HasItem + ?Sized>(a: &A, b: &B) -> Ordering {
    compare_item_codes(a.item(), b.item())
}

/// Stable in-place sort by item.
pub fn sort_by_item<T: HasItem>(nodes: &mut [T]) {
    nodes.sort_by(|a, b| compare_items(a, b));
}

/// Whether `a` sorts strictly after `b`.
pub fn item_greater(a: Option<&str>, b: Option<&str>) -> bool {
    compare_item_codes(a, b) == Ordering::Greater
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ParentFields;

    fn label(id: i64, item: Option<&str>) -> Label {
        Label {
            id,
            name: format!("L{}", id),
            description: None,
            level: 2,
            item: item.map(|s| s.to_string()),
            course_id: None,
            parent: ParentFields::default(),
        }
    }

    fn ids(labels: &[Label]) -> Vec<i64> {
        labels.iter().map(|l| l.id).collect()
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(compare_item_codes(Some("abc"), Some("ABC")), Ordering::Equal);
        assert_eq!(compare_item_codes(Some("a"), Some("B")), Ordering::Less);
        assert_eq!(compare_item_codes(Some("b"), Some("A")), Ordering::Greater);
    }

    #[test]
    fn test_lexicographic_not_numeric() {
        assert_eq!(compare_item_codes(Some("10"), Some("2")), Ordering::Less);
        assert_eq!(compare_item_codes(Some("1.10"), Some("1.2")), Ordering::Less);
    }

    #[test]
    fn test_missing_item_sorts_first() {
        assert_eq!(compare_item_codes(None, Some("A")), Ordering::Less);
        assert_eq!(compare_item_codes(None, Some("")), Ordering::Equal);
    }

    #[test]
    fn test_sort_is_stable_and_idempotent() {
        let mut labels = vec![
            label(1, Some("b")),
            label(2, Some("A")),
            label(3, Some("B")),
            label(4, None),
            label(5, Some("a")),
        ];
        sort_by_item(&mut labels);
        assert_eq!(ids(&labels), vec![4, 2, 5, 1, 3]);

        let once = ids(&labels);
        sort_by_item(&mut labels);
        assert_eq!(ids(&labels), once);
    }

    #[test]
    fn test_sort_references() {
        let a = label(1, Some("z"));
        let b = label(2, Some("m"));
        let mut refs = vec![&a, &b];
        sort_by_item(&mut refs);
        assert_eq!(refs[0].id, 2);
    }

    #[test]
    fn test_item_greater_is_strict() {
        assert!(item_greater(Some("B"), Some("a")));
        assert!(!item_greater(Some("b"), Some("B")));
        assert!(!item_greater(Some("A"), Some("b")));
    }
}
