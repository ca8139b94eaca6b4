mod schema;
mod models;

pub use schema::Database;
pub use models::{
    is_truthy_json, is_truthy_text, Answer, Course, Label, ParentFields, Question, RefValue,
    Topic, TopicProgress, TopicWithLabel,
};
