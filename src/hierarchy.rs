//! Parent resolution for label rows.
//!
//! Label rows have accumulated several names for their parent column over the
//! life of the schema, and the value stored there is sometimes the parent's
//! numeric id and sometimes its name. Resolution is split into two ordered
//! tables so the fallback order can be read and tested on its own:
//!
//! 1. `PARENT_ALIASES` - which column holds the reference (first present wins)
//! 2. `MATCH_STRATEGIES` - how a reference value is matched against candidates
//!
//! A reference that matches nothing is an orphan, not an error.

use crate::db::{Label, ParentFields, RefValue};

/// Reads one legacy parent column.
pub type ParentSelector = fn(&ParentFields) -> Option<&RefValue>;

/// Decides whether a reference value points at a candidate label.
pub type MatchStrategy = fn(&RefValue, &Label) -> bool;

/// Parent columns in priority order.
pub const PARENT_ALIASES: [(&str, ParentSelector); 6] = [
    ("parent_node", select_parent_node),
    ("parent_node_id", select_parent_node_id),
    ("parent_id", select_parent_id),
    ("parent", select_parent),
    ("parent_label_id", select_parent_label_id),
    ("parent_label", select_parent_label),
];

/// Matching strategies in priority order. Each strategy is tried against every
/// candidate before moving on to the next one.
pub const MATCH_STRATEGIES: [(&str, MatchStrategy); 5] = [
    ("id", matches_id_exact),
    ("id-parsed", matches_id_parsed),
    ("id-string", matches_id_string),
    ("name", matches_name_exact),
    ("name-string", matches_name_string),
];

fn select_parent_node(p: &ParentFields) -> Option<&RefValue> {
    p.parent_node.as_ref()
}

fn select_parent_node_id(p: &ParentFields) -> Option<&RefValue> {
    p.parent_node_id.as_ref()
}

fn select_parent_id(p: &ParentFields) -> Option<&RefValue> {
    p.parent_id.as_ref()
}

fn select_parent(p: &ParentFields) -> Option<&RefValue> {
    p.parent.as_ref()
}

fn select_parent_label_id(p: &ParentFields) -> Option<&RefValue> {
    p.parent_label_id.as_ref()
}

fn select_parent_label(p: &ParentFields) -> Option<&RefValue> {
    p.parent_label.as_ref()
}

fn matches_id_exact(reference: &RefValue, candidate: &Label) -> bool {
    matches!(reference, RefValue::Int(n) if *n == candidate.id)
}

fn matches_id_parsed(reference: &RefValue, candidate: &Label) -> bool {
    match reference {
        RefValue::Text(s) => s.trim().parse::<i64>().ok() == Some(candidate.id),
        RefValue::Int(_) => false,
    }
}

fn matches_id_string(reference: &RefValue, candidate: &Label) -> bool {
    reference.to_string() == candidate.id.to_string()
}

fn matches_name_exact(reference: &RefValue, candidate: &Label) -> bool {
    matches!(reference, RefValue::Text(s) if *s == candidate.name)
}

fn matches_name_string(reference: &RefValue, candidate: &Label) -> bool {
    reference.to_string() == candidate.name
}

/// Identifier comparison used everywhere ids meet: identity, then string form.
pub fn id_equals(a: &RefValue, b: &RefValue) -> bool {
    a == b || a.to_string() == b.to_string()
}

/// The first populated parent column, with the column name it came from.
pub fn parent_ref_with_alias(fields: &ParentFields) -> Option<(&'static str, &RefValue)> {
    PARENT_ALIASES
        .iter()
        .find_map(|(alias, select)| select(fields).map(|value| (*alias, value)))
}

/// The label's parent reference, if any alias carries one.
pub fn parent_ref(label: &Label) -> Option<&RefValue> {
    parent_ref_with_alias(&label.parent).map(|(_, value)| value)
}

/// Find the candidate a reference value points at.
pub fn resolve_reference<'a>(reference: &RefValue, candidates: &'a [Label]) -> Option<&'a Label> {
    MATCH_STRATEGIES.iter().find_map(|(_, strategy)| {
        candidates.iter().find(|candidate| strategy(reference, candidate))
    })
}

/// Whether a reference value points at this label under any strategy.
pub fn reference_matches(reference: &RefValue, label: &Label) -> bool {
    MATCH_STRATEGIES.iter().any(|(_, strategy)| strategy(reference, label))
}

/// Resolve a label's parent among `candidates` (normally the level above).
/// Returns `None` for labels without a parent reference and for orphans.
pub fn resolve_parent<'a>(node: &Label, candidates: &'a [Label]) -> Option<&'a Label> {
    parent_ref(node).and_then(|reference| resolve_reference(reference, candidates))
}
