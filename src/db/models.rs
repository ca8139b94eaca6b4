use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identifier or reference value as it arrives from storage or a request.
///
/// Legacy rows reference parents by numeric id in some columns and by name in
/// others, so every reference is either an integer or free text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RefValue {
    Int(i64),
    Text(String),
}

impl RefValue {
    /// Parse a path/query parameter: integers become `Int`, anything else `Text`.
    pub fn from_param(s: &str) -> Self {
        let trimmed = s.trim();
        match trimmed.parse::<i64>() {
            Ok(n) => RefValue::Int(n),
            Err(_) => RefValue::Text(trimmed.to_string()),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            RefValue::Int(n) => Some(*n),
            RefValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for RefValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefValue::Int(n) => write!(f, "{}", n),
            RefValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RefValue {
    fn from(n: i64) -> Self {
        RefValue::Int(n)
    }
}

impl From<&str> for RefValue {
    fn from(s: &str) -> Self {
        RefValue::Text(s.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Parent reference columns accumulated over several schema revisions.
/// Only one is expected to be set on any given row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParentFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_node: Option<RefValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_node_id: Option<RefValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<RefValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<RefValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_label_id: Option<RefValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_label: Option<RefValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub level: i32,                      // 1 = root column, 2 = middle column
    #[serde(default)]
    pub item: Option<String>,            // Free-text ordering code ("1.2", "B", ...)
    #[serde(rename = "courseId", alias = "course_id", default)]
    pub course_id: Option<i64>,
    #[serde(flatten)]
    pub parent: ParentFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub topic: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub weightage: i32,                  // 0-100
    #[serde(rename = "labelId", alias = "label_id", default)]
    pub label_id: Option<RefValue>,      // Level-2 label id, or its name on legacy rows
    #[serde(default)]
    pub item: Option<String>,
}

/// Topic joined with the label its `label_id` points at (if any).
#[derive(Debug, Clone, Serialize)]
pub struct TopicWithLabel {
    #[serde(flatten)]
    pub topic: Topic,
    pub label: Option<Label>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub question: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_difficulty")]
    pub difficulty: i32,                 // 1-5
    #[serde(rename = "topicId", alias = "topic_id")]
    pub topic_id: i64,
    #[serde(default)]
    pub points: i32,
}

fn default_difficulty() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub answer: String,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(deserialize_with = "deserialize_truthy", default)]
    pub correct: bool,
    #[serde(rename = "questionId", alias = "question_id")]
    pub question_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicProgress {
    #[serde(rename = "topicId", alias = "topic_id")]
    pub topic_id: i64,
    #[serde(rename = "progressPercent", alias = "progress_percent")]
    pub progress_percent: f64,
}

/// Interpret loosely encoded boolean flags: `true`, `1`, `"1"`, `"true"`.
pub fn is_truthy_json(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_i64() == Some(1) || n.as_f64() == Some(1.0),
        serde_json::Value::String(s) => is_truthy_text(s),
        _ => false,
    }
}

pub fn is_truthy_text(s: &str) -> bool {
    let s = s.trim();
    s == "1" || s.eq_ignore_ascii_case("true")
}

fn deserialize_truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(is_truthy_json(&value))
}
