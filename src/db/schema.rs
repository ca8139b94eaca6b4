use rusqlite::types::Value;
use rusqlite::{params, Connection, Result};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use super::models::{
    is_truthy_text, Answer, Course, Label, ParentFields, Question, RefValue, Topic,
    TopicProgress, TopicWithLabel,
};
use crate::hierarchy;
use crate::import::{ImportStats, SeedFile};

pub struct Database {
    conn: Mutex<Connection>,
    path: String,
}

impl Database {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let conn = Connection::open(&path)?;
        let db = Database { conn: Mutex::new(conn), path: path_str };
        db.init()?;
        Ok(db)
    }

    pub fn get_path(&self) -> String {
        self.path.clone()
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn: Mutex::new(conn), path: ":memory:".to_string() };
        db.init()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock leaves the connection itself usable
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn init(&self) -> Result<()> {
        let conn = self.conn();

        // Parent reference and label_id columns are declared without a type so
        // SQLite keeps integers and names exactly as they were written.
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS courses (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT
            );

            CREATE TABLE IF NOT EXISTS labels (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                level INTEGER NOT NULL,
                item TEXT,
                course_id INTEGER REFERENCES courses(id) ON DELETE SET NULL,
                -- Legacy parent reference columns (id or name)
                parent_node,
                parent_node_id,
                parent_id,
                parent,
                parent_label_id,
                parent_label
            );

            CREATE TABLE IF NOT EXISTS topics (
                id INTEGER PRIMARY KEY,
                topic TEXT NOT NULL,
                description TEXT,
                weightage INTEGER NOT NULL DEFAULT 0,
                label_id,
                item TEXT
            );

            CREATE TABLE IF NOT EXISTS questions (
                id INTEGER PRIMARY KEY,
                question TEXT NOT NULL,
                description TEXT,
                difficulty INTEGER NOT NULL DEFAULT 1,
                topic_id INTEGER NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
                points INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS answers (
                id INTEGER PRIMARY KEY,
                answer TEXT NOT NULL,
                explanation TEXT,
                correct,
                question_id INTEGER NOT NULL REFERENCES questions(id) ON DELETE CASCADE
            );

            -- Maintained outside this service; read-only here
            CREATE TABLE IF NOT EXISTS topic_progress (
                topic_id INTEGER PRIMARY KEY,
                progress_percent REAL NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_labels_level ON labels(level);
            CREATE INDEX IF NOT EXISTS idx_questions_topic ON questions(topic_id);
            CREATE INDEX IF NOT EXISTS idx_answers_question ON answers(question_id);

            PRAGMA foreign_keys = ON;
            "
        )?;

        Ok(())
    }

    // ==================== Row mapping ====================

    const LABEL_COLUMNS: &'static str = "id, name, description, level, item, course_id, parent_node, parent_node_id, parent_id, parent, parent_label_id, parent_label";
    const TOPIC_COLUMNS: &'static str = "id, topic, description, weightage, label_id, item";
    const QUESTION_COLUMNS: &'static str = "id, question, description, difficulty, topic_id, points";
    const ANSWER_COLUMNS: &'static str = "id, answer, explanation, correct, question_id";

    fn row_to_label(row: &rusqlite::Row) -> Result<Label> {
        Ok(Label {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            level: row.get(3)?,
            item: row.get(4)?,
            course_id: row.get(5)?,
            parent: ParentFields {
                parent_node: ref_at(row, 6)?,
                parent_node_id: ref_at(row, 7)?,
                parent_id: ref_at(row, 8)?,
                parent: ref_at(row, 9)?,
                parent_label_id: ref_at(row, 10)?,
                parent_label: ref_at(row, 11)?,
            },
        })
    }

    fn row_to_topic(row: &rusqlite::Row) -> Result<Topic> {
        Ok(Topic {
            id: row.get(0)?,
            topic: row.get(1)?,
            description: row.get(2)?,
            weightage: row.get::<_, Option<i32>>(3)?.unwrap_or(0),
            label_id: ref_at(row, 4)?,
            item: row.get(5)?,
        })
    }

    fn row_to_question(row: &rusqlite::Row) -> Result<Question> {
        Ok(Question {
            id: row.get(0)?,
            question: row.get(1)?,
            description: row.get(2)?,
            difficulty: row.get::<_, Option<i32>>(3)?.unwrap_or(1),
            topic_id: row.get(4)?,
            points: row.get::<_, Option<i32>>(5)?.unwrap_or(0).max(0),
        })
    }

    fn row_to_answer(row: &rusqlite::Row) -> Result<Answer> {
        let correct = match row.get::<_, Value>(3)? {
            Value::Integer(n) => n == 1,
            Value::Real(f) => f == 1.0,
            Value::Text(s) => is_truthy_text(&s),
            Value::Null | Value::Blob(_) => false,
        };
        Ok(Answer {
            id: row.get(0)?,
            answer: row.get(1)?,
            explanation: row.get(2)?,
            correct,
            question_id: row.get(4)?,
        })
    }

    // ==================== Reads ====================

    pub fn get_courses(&self) -> Result<Vec<Course>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id, name, description FROM courses ORDER BY id")?;
        let courses = stmt.query_map([], |row| {
            Ok(Course { id: row.get(0)?, name: row.get(1)?, description: row.get(2)? })
        })?.collect::<Result<Vec<_>>>()?;
        Ok(courses)
    }

    pub fn get_labels(&self) -> Result<Vec<Label>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM labels ORDER BY id",
            Self::LABEL_COLUMNS
        ))?;
        let labels = stmt.query_map([], Self::row_to_label)?.collect::<Result<Vec<_>>>()?;
        Ok(labels)
    }

    pub fn get_labels_by_level(&self, level: i32) -> Result<Vec<Label>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM labels WHERE level = ?1 ORDER BY id",
            Self::LABEL_COLUMNS
        ))?;
        let labels = stmt.query_map(params![level], Self::row_to_label)?.collect::<Result<Vec<_>>>()?;
        Ok(labels)
    }

    pub fn get_topics(&self) -> Result<Vec<Topic>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM topics ORDER BY id",
            Self::TOPIC_COLUMNS
        ))?;
        let topics = stmt.query_map([], Self::row_to_topic)?.collect::<Result<Vec<_>>>()?;
        Ok(topics)
    }

    /// All topics, each joined with the label its `label_id` resolves to.
    pub fn get_all_topics_with_labels(&self) -> Result<Vec<TopicWithLabel>> {
        let labels = self.get_labels()?;
        let topics = self.get_topics()?;
        Ok(topics.into_iter().map(|topic| join_label(topic, &labels)).collect())
    }

    pub fn get_topic_with_label(&self, topic_id: &RefValue) -> Result<Option<TopicWithLabel>> {
        let Some(id) = topic_id.as_int() else { return Ok(None) };

        let topic = {
            let conn = self.conn();
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM topics WHERE id = ?1",
                Self::TOPIC_COLUMNS
            ))?;
            let mut rows = stmt.query(params![id])?;
            match rows.next()? {
                Some(row) => Self::row_to_topic(row)?,
                None => return Ok(None),
            }
        };

        let labels = self.get_labels()?;
        Ok(Some(join_label(topic, &labels)))
    }

    pub fn get_questions_for_topic(&self, topic_id: i64) -> Result<Vec<Question>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM questions WHERE topic_id = ?1 ORDER BY id",
            Self::QUESTION_COLUMNS
        ))?;
        let questions = stmt.query_map(params![topic_id], Self::row_to_question)?.collect::<Result<Vec<_>>>()?;
        Ok(questions)
    }

    pub fn get_answers_for_question(&self, question_id: i64) -> Result<Vec<Answer>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM answers WHERE question_id = ?1 ORDER BY id",
            Self::ANSWER_COLUMNS
        ))?;
        let answers = stmt.query_map(params![question_id], Self::row_to_answer)?.collect::<Result<Vec<_>>>()?;
        Ok(answers)
    }

    pub fn get_topic_progress(&self) -> Result<Vec<TopicProgress>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT topic_id, progress_percent FROM topic_progress ORDER BY topic_id"
        )?;
        let progress = stmt.query_map([], |row| {
            Ok(TopicProgress {
                topic_id: row.get(0)?,
                progress_percent: row.get::<_, f64>(1)?.clamp(0.0, 100.0),
            })
        })?.collect::<Result<Vec<_>>>()?;
        Ok(progress)
    }

    /// Row counts for (courses, labels, topics, questions), used by /health.
    pub fn get_stats(&self) -> Result<(usize, usize, usize, usize)> {
        let conn = self.conn();
        let count = |table: &str| -> Result<usize> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get::<_, i64>(0))
                .map(|n| n as usize)
        };
        Ok((count("courses")?, count("labels")?, count("topics")?, count("questions")?))
    }

    // ==================== Writes (seed import only) ====================

    /// Insert a whole seed file in one transaction. Existing rows with the same
    /// ids are updated in place, so child rows keep pointing at them.
    pub fn insert_seed(&self, seed: &SeedFile) -> Result<ImportStats> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut stats = ImportStats::default();

        for course in &seed.courses {
            tx.execute(
                &upsert_sql("courses", "id, name, description", "id"),
                params![course.id, course.name, course.description],
            )?;
            stats.courses += 1;
        }

        for label in &seed.labels {
            let p = &label.parent;
            tx.execute(
                &upsert_sql("labels", Self::LABEL_COLUMNS, "id"),
                params![
                    label.id,
                    label.name,
                    label.description,
                    label.level,
                    label.item,
                    label.course_id,
                    ref_sql(&p.parent_node),
                    ref_sql(&p.parent_node_id),
                    ref_sql(&p.parent_id),
                    ref_sql(&p.parent),
                    ref_sql(&p.parent_label_id),
                    ref_sql(&p.parent_label),
                ],
            )?;
            stats.labels += 1;
        }

        for topic in &seed.topics {
            tx.execute(
                &upsert_sql("topics", Self::TOPIC_COLUMNS, "id"),
                params![
                    topic.id,
                    topic.topic,
                    topic.description,
                    topic.weightage.clamp(0, 100),
                    ref_sql(&topic.label_id),
                    topic.item,
                ],
            )?;
            stats.topics += 1;
        }

        for question in &seed.questions {
            tx.execute(
                &upsert_sql("questions", Self::QUESTION_COLUMNS, "id"),
                params![
                    question.id,
                    question.question,
                    question.description,
                    question.difficulty.clamp(1, 5),
                    question.topic_id,
                    question.points.max(0),
                ],
            )?;
            stats.questions += 1;
        }

        for answer in &seed.answers {
            tx.execute(
                &upsert_sql("answers", Self::ANSWER_COLUMNS, "id"),
                params![
                    answer.id,
                    answer.answer,
                    answer.explanation,
                    answer.correct as i64,
                    answer.question_id,
                ],
            )?;
            stats.answers += 1;
        }

        for progress in &seed.progress {
            tx.execute(
                &upsert_sql("topic_progress", "topic_id, progress_percent", "topic_id"),
                params![progress.topic_id, progress.progress_percent.clamp(0.0, 100.0)],
            )?;
            stats.progress += 1;
        }

        tx.commit()?;
        Ok(stats)
    }

    /// Write a raw value into a legacy column. Lets tests reproduce rows that
    /// were written by older tooling (text flags, names instead of ids).
    #[cfg(test)]
    pub(crate) fn set_raw(&self, table: &str, column: &str, id: i64, value: Value) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            &format!("UPDATE {} SET {} = ?1 WHERE id = ?2", table, column),
            params![value, id],
        )?;
        Ok(())
    }
}

fn join_label(topic: Topic, labels: &[Label]) -> TopicWithLabel {
    let label = topic
        .label_id
        .as_ref()
        .and_then(|reference| hierarchy::resolve_reference(reference, labels))
        .cloned();
    TopicWithLabel { topic, label }
}

/// Read a dynamically typed reference column.
fn ref_at(row: &rusqlite::Row, idx: usize) -> Result<Option<RefValue>> {
    Ok(match row.get::<_, Value>(idx)? {
        Value::Null => None,
        Value::Integer(n) => Some(RefValue::Int(n)),
        Value::Real(f) if f.fract() == 0.0 => Some(RefValue::Int(f as i64)),
        Value::Real(f) => Some(RefValue::Text(f.to_string())),
        Value::Text(s) if s.trim().is_empty() => None,
        Value::Text(s) => Some(RefValue::Text(s)),
        Value::Blob(b) => Some(RefValue::Text(String::from_utf8_lossy(&b).into_owned())),
    })
}

/// `INSERT .. ON CONFLICT DO UPDATE` for the given column list. Unlike
/// `INSERT OR REPLACE` this never deletes the old row, so foreign key
/// cascades on dependent tables do not fire.
fn upsert_sql(table: &str, columns: &str, key: &str) -> String {
    let names: Vec<&str> = columns.split(',').map(str::trim).collect();
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
    let updates: Vec<String> = names
        .iter()
        .filter(|name| **name != key)
        .map(|name| format!("{0} = excluded.{0}", name))
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) DO UPDATE SET {}",
        table,
        names.join(", "),
        placeholders.join(", "),
        key,
        updates.join(", ")
    )
}

fn ref_sql(value: &Option<RefValue>) -> Value {
    match value {
        Some(RefValue::Int(n)) => Value::Integer(*n),
        Some(RefValue::Text(s)) => Value::Text(s.clone()),
        None => Value::Null,
    }
}
