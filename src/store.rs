//! Read-only storage contract consumed by the mind map, sequencer and quiz.
//!
//! Handlers and the CLI receive a `&dyn CourseStore` so tests can swap in any
//! backing store; the production implementation is the SQLite `Database`.

use crate::db::{Answer, Course, Database, Label, Question, RefValue, TopicProgress, TopicWithLabel};
use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

pub trait CourseStore: Send + Sync {
    fn get_courses(&self) -> StoreResult<Vec<Course>>;
    fn get_labels(&self) -> StoreResult<Vec<Label>>;
    fn get_labels_by_level(&self, level: i32) -> StoreResult<Vec<Label>>;
    fn get_topic_with_label(&self, topic_id: &RefValue) -> StoreResult<Option<TopicWithLabel>>;
    fn get_all_topics_with_labels(&self) -> StoreResult<Vec<TopicWithLabel>>;
    fn get_topic_progress(&self) -> StoreResult<Vec<TopicProgress>>;
    fn get_questions_for_topic(&self, topic_id: i64) -> StoreResult<Vec<Question>>;
    fn get_answers_for_question(&self, question_id: i64) -> StoreResult<Vec<Answer>>;
}

impl CourseStore for Database {
    fn get_courses(&self) -> StoreResult<Vec<Course>> {
        Ok(Database::get_courses(self)?)
    }

    fn get_labels(&self) -> StoreResult<Vec<Label>> {
        Ok(Database::get_labels(self)?)
    }

    fn get_labels_by_level(&self, level: i32) -> StoreResult<Vec<Label>> {
        Ok(Database::get_labels_by_level(self, level)?)
    }

    fn get_topic_with_label(&self, topic_id: &RefValue) -> StoreResult<Option<TopicWithLabel>> {
        Ok(Database::get_topic_with_label(self, topic_id)?)
    }

    fn get_all_topics_with_labels(&self) -> StoreResult<Vec<TopicWithLabel>> {
        Ok(Database::get_all_topics_with_labels(self)?)
    }

    fn get_topic_progress(&self) -> StoreResult<Vec<TopicProgress>> {
        Ok(Database::get_topic_progress(self)?)
    }

    fn get_questions_for_topic(&self, topic_id: i64) -> StoreResult<Vec<Question>> {
        Ok(Database::get_questions_for_topic(self, topic_id)?)
    }

    fn get_answers_for_question(&self, question_id: i64) -> StoreResult<Vec<Answer>> {
        Ok(Database::get_answers_for_question(self, question_id)?)
    }
}
