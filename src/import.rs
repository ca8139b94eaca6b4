//! Seed import for course content.
//!
//! A seed is one JSON document holding every table. Legacy field spellings are
//! accepted as-is (see `Label`'s parent aliases) so exports from older tooling
//! load without conversion.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::db::{Answer, Course, Database, Label, Question, Topic, TopicProgress};
use crate::error::StoreError;

/// Seed document format
#[derive(Debug, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub topics: Vec<Topic>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub answers: Vec<Answer>,
    #[serde(default)]
    pub progress: Vec<TopicProgress>,
}

/// Rows written per table
#[derive(Debug, Default, Serialize, PartialEq)]
pub struct ImportStats {
    pub courses: usize,
    pub labels: usize,
    pub topics: usize,
    pub questions: usize,
    pub answers: usize,
    pub progress: usize,
}

impl SeedFile {
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        serde_json::from_str(json).map_err(|e| StoreError::Seed(format!("invalid seed JSON: {}", e)))
    }

    /// Dangling references that will not break loading but will never show up
    /// in the mind map or a quiz.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let topic_ids: HashSet<i64> = self.topics.iter().map(|t| t.id).collect();
        for q in &self.questions {
            if !topic_ids.contains(&q.topic_id) {
                warnings.push(format!("question {} points at unknown topic {}", q.id, q.topic_id));
            }
        }

        let question_ids: HashSet<i64> = self.questions.iter().map(|q| q.id).collect();
        for a in &self.answers {
            if !question_ids.contains(&a.question_id) {
                warnings.push(format!("answer {} points at unknown question {}", a.id, a.question_id));
            }
        }

        for l in &self.labels {
            if l.level != 1 && l.level != 2 {
                warnings.push(format!("label {} has level {}, only 1 and 2 are displayed", l.id, l.level));
            }
        }

        for t in self.topics.iter().filter(|t| t.label_id.is_none()) {
            warnings.push(format!("topic {} has no label", t.id));
        }

        warnings
    }
}

pub fn load_seed_file(path: &Path) -> Result<SeedFile, StoreError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| StoreError::Seed(format!("failed to read {}: {}", path.display(), e)))?;
    SeedFile::from_json(&content)
}

/// Read a seed file and write it to the database in one transaction.
pub fn import_seed(db: &Database, path: &Path) -> Result<ImportStats, StoreError> {
    let seed = load_seed_file(path)?;
    for warning in seed.warnings() {
        tracing::warn!(target: "import", "{}", warning);
    }
    let stats = db.insert_seed(&seed)?;
    tracing::info!(
        target: "import",
        courses = stats.courses,
        labels = stats.labels,
        topics = stats.topics,
        questions = stats.questions,
        answers = stats.answers,
        "seed imported from {}",
        path.display()
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SEED: &str = r#"{
        "labels": [
            {"id": 1, "name": "Algebra", "level": 1, "item": "A"},
            {"id": 2, "name": "Equations", "level": 2, "item": "A", "parent_node": 1}
        ],
        "topics": [{"id": 10, "topic": "Linear", "labelId": 2, "item": "1"}],
        "questions": [
            {"id": 100, "question": "x + 1 = 2", "topicId": 10}
        ],
        "answers": [{"id": 1000, "answer": "1", "correct": true, "question_id": 100}]
    }"#;

    #[test]
    fn test_missing_tables_default_to_empty() {
        let seed = SeedFile::from_json(r#"{"labels": []}"#).unwrap();
        assert!(seed.courses.is_empty());
        assert!(seed.progress.is_empty());
    }

    #[test]
    fn test_invalid_json_is_a_seed_error() {
        assert!(matches!(SeedFile::from_json("{not json"), Err(StoreError::Seed(_))));
    }

    #[test]
    fn test_warnings_for_dangling_rows() {
        assert!(SeedFile::from_json(SEED).unwrap().warnings().is_empty());

        let seed = SeedFile::from_json(
            r#"{"questions": [{"id": 101, "question": "Lost", "topicId": 99}]}"#,
        ).unwrap();
        let warnings = seed.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("unknown topic 99"));
    }

    #[test]
    fn test_import_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SEED.as_bytes()).unwrap();

        let db = Database::in_memory().unwrap();
        let stats = import_seed(&db, file.path()).unwrap();
        assert_eq!(
            stats,
            ImportStats { courses: 0, labels: 2, topics: 1, questions: 1, answers: 1, progress: 0 }
        );
        assert_eq!(db.get_labels_by_level(2).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_file() {
        let db = Database::in_memory().unwrap();
        let err = import_seed(&db, Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, StoreError::Seed(_)));
    }

    #[test]
    fn test_dangling_question_rolls_back_whole_seed() {
        let seed = SeedFile::from_json(
            r#"{
                "labels": [{"id": 1, "name": "Algebra", "level": 1}],
                "questions": [{"id": 101, "question": "Lost", "topicId": 99}]
            }"#,
        ).unwrap();
        let db = Database::in_memory().unwrap();
        assert!(db.insert_seed(&seed).is_err());
        assert!(db.get_labels().unwrap().is_empty());
    }
}
