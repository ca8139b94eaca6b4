//! Learn-mode quiz progression.
//!
//! Each question moves through a small state machine:
//!
//! ```text
//! Unanswered --submit(correct)--> Correct           (terminal)
//! Unanswered --submit(wrong)----> IncorrectRetry --submit--> ...
//! Unanswered --skip-------------> Skipped           (terminal)
//! ```
//!
//! `transition` is the pure per-question step. `QuizSession` strings questions
//! together, tracks the correct count and is serializable so the HTTP layer can
//! hand it to the client and take it back on the next request without keeping
//! any server-side state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::db::Question;
use crate::error::CoreResult;
use crate::sequencer::NextTopic;
use crate::store::CourseStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionState {
    Unanswered,
    IncorrectRetry,
    Correct,
    Skipped,
}

impl QuestionState {
    /// Correct and Skipped are final; only they allow moving on.
    pub fn is_terminal(&self) -> bool {
        matches!(self, QuestionState::Correct | QuestionState::Skipped)
    }
}

/// Per-question input to `transition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionEvent {
    Submit { correct: bool },
    Skip,
}

/// Pure per-question transition. Terminal states absorb every event.
pub fn transition(state: QuestionState, event: QuestionEvent) -> QuestionState {
    match (state, event) {
        (QuestionState::Correct, _) | (QuestionState::Skipped, _) => state,
        (_, QuestionEvent::Submit { correct: true }) => QuestionState::Correct,
        (_, QuestionEvent::Submit { correct: false }) => QuestionState::IncorrectRetry,
        (_, QuestionEvent::Skip) => QuestionState::Skipped,
    }
}

/// Session-level input, as posted by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuizEvent {
    Submit {
        #[serde(rename = "optionId", alias = "option_id")]
        option_id: i64,
    },
    Skip,
    Advance,
}

impl std::str::FromStr for QuizEvent {
    type Err = QuizError;

    /// Form encoding used by the server-rendered quiz: `submit:<id>`, `skip`, `advance`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "skip" => Ok(QuizEvent::Skip),
            "advance" => Ok(QuizEvent::Advance),
            other => other
                .strip_prefix("submit:")
                .and_then(|id| id.trim().parse().ok())
                .map(|option_id| QuizEvent::Submit { option_id })
                .ok_or_else(|| QuizError::BadEvent(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum QuizError {
    #[error("unrecognized quiz event '{0}'")]
    BadEvent(String),
    #[error("option {0} does not belong to the current question")]
    UnknownOption(i64),
    #[error("option {0} was already tried")]
    LockedOption(i64),
    #[error("answer or skip the question before moving on")]
    NotAnswered,
    #[error("quiz already finished")]
    Finished,
    #[error("quiz session does not match the questions for this topic")]
    SessionMismatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizOption {
    pub id: i64,
    pub text: String,
    /// Never sent to clients; only `Feedback` reveals it.
    #[serde(skip_serializing, default)]
    pub correct: bool,
    #[serde(skip_serializing, default)]
    pub explanation: Option<String>,
}

/// Verdict and explanation for the option just chosen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feedback {
    #[serde(rename = "optionId")]
    pub option_id: i64,
    pub correct: bool,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: i64,
    pub text: String,
    pub description: Option<String>,
    pub difficulty: i32,
    pub points: i32,
    pub options: Vec<QuizOption>,
}

/// The questions for one topic, in presentation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    #[serde(rename = "topicId")]
    pub topic_id: i64,
    pub questions: Vec<QuizQuestion>,
}

impl Quiz {
    pub fn from_rows(topic_id: i64, questions: Vec<(Question, Vec<crate::db::Answer>)>) -> Self {
        let questions = questions
            .into_iter()
            .map(|(q, answers)| QuizQuestion {
                id: q.id,
                text: q.question,
                description: q.description,
                difficulty: q.difficulty,
                points: q.points,
                options: answers
                    .into_iter()
                    .map(|a| QuizOption {
                        id: a.id,
                        text: a.answer,
                        correct: a.correct,
                        explanation: a.explanation,
                    })
                    .collect(),
            })
            .collect();
        Quiz { topic_id, questions }
    }
}

/// Load a topic's questions and their answer options.
pub fn load_quiz(store: &dyn CourseStore, topic_id: i64) -> CoreResult<Quiz> {
    let mut rows = Vec::new();
    for question in store.get_questions_for_topic(topic_id)? {
        let answers = store.get_answers_for_question(question.id)?;
        rows.push((question, answers));
    }
    Ok(Quiz::from_rows(topic_id, rows))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionProgress {
    #[serde(rename = "questionId")]
    pub question_id: i64,
    pub state: QuestionState,
    /// Wrong options already tried; they stay disabled.
    #[serde(default)]
    pub locked: Vec<i64>,
    /// Option whose explanation is on screen.
    #[serde(default)]
    pub revealed: Option<i64>,
}

impl QuestionProgress {
    /// A correct question shows one of its correct options and is counted.
    /// Locked options are always wrong ones.
    fn is_consistent_with(&self, question: &QuizQuestion, correct_ids: &BTreeSet<i64>) -> bool {
        let option = |id: i64| question.options.iter().find(|o| o.id == id);
        let locks_wrong = self.locked.iter().all(|id| option(*id).map(|o| !o.correct).unwrap_or(false));
        let correct_shown = match self.state {
            QuestionState::Correct => {
                correct_ids.contains(&question.id)
                    && self.revealed.and_then(option).map(|o| o.correct).unwrap_or(false)
            }
            _ => true,
        };
        locks_wrong && correct_shown
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizSession {
    #[serde(rename = "topicId")]
    pub topic_id: i64,
    pub current: usize,
    pub questions: Vec<QuestionProgress>,
    #[serde(rename = "correctIds", default)]
    pub correct_ids: BTreeSet<i64>,
    #[serde(default)]
    pub finished: bool,
}

/// What applying an event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizSummary {
    #[serde(rename = "correctCount")]
    pub correct_count: usize,
    #[serde(rename = "totalQuestions")]
    pub total_questions: usize,
    #[serde(flatten)]
    pub next: NextTopic,
}

impl QuizSession {
    pub fn new(quiz: &Quiz) -> Self {
        QuizSession {
            topic_id: quiz.topic_id,
            current: 0,
            questions: quiz
                .questions
                .iter()
                .map(|q| QuestionProgress {
                    question_id: q.id,
                    state: QuestionState::Unanswered,
                    locked: Vec::new(),
                    revealed: None,
                })
                .collect(),
            correct_ids: BTreeSet::new(),
            finished: quiz.questions.is_empty(),
        }
    }

    pub fn correct_count(&self) -> usize {
        self.correct_ids.len()
    }

    pub fn current_progress(&self) -> Option<&QuestionProgress> {
        if self.finished {
            return None;
        }
        self.questions.get(self.current)
    }

    /// Whether an option of the current question can still be chosen.
    pub fn is_selectable(&self, option_id: i64) -> bool {
        match self.current_progress() {
            Some(p) => !p.state.is_terminal() && !p.locked.contains(&option_id),
            None => false,
        }
    }

    fn check_matches(&self, quiz: &Quiz) -> Result<(), QuizError> {
        let same_questions = self.topic_id == quiz.topic_id
            && self.questions.len() == quiz.questions.len()
            && self
                .questions
                .iter()
                .zip(&quiz.questions)
                .all(|(p, q)| p.question_id == q.id);
        let in_bounds = self.finished || self.current < self.questions.len();
        let counts_consistent = self.correct_ids.iter().all(|id| {
            self.questions
                .iter()
                .any(|p| p.question_id == *id && p.state == QuestionState::Correct)
        });
        // Every state must be reachable by real submits against this quiz
        let states_earned = same_questions
            && self.questions.iter().zip(&quiz.questions).all(|(p, q)| p.is_consistent_with(q, &self.correct_ids));
        if same_questions && in_bounds && counts_consistent && states_earned {
            Ok(())
        } else {
            Err(QuizError::SessionMismatch)
        }
    }

    /// Apply one client event.
    pub fn apply(&mut self, quiz: &Quiz, event: QuizEvent) -> Result<Step, QuizError> {
        self.check_matches(quiz)?;
        if self.finished {
            return Err(QuizError::Finished);
        }

        let question = &quiz.questions[self.current];
        let progress = &mut self.questions[self.current];

        match event {
            QuizEvent::Submit { option_id } => {
                let option = question
                    .options
                    .iter()
                    .find(|o| o.id == option_id)
                    .ok_or(QuizError::UnknownOption(option_id))?;
                if progress.state.is_terminal() {
                    // Repeat submits after the question is settled change nothing
                    return Ok(Step::Continue);
                }
                if progress.locked.contains(&option_id) {
                    return Err(QuizError::LockedOption(option_id));
                }

                progress.state = transition(progress.state, QuestionEvent::Submit { correct: option.correct });
                progress.revealed = Some(option_id);
                match progress.state {
                    QuestionState::Correct => {
                        self.correct_ids.insert(question.id);
                    }
                    _ => progress.locked.push(option_id),
                }
                Ok(Step::Continue)
            }
            QuizEvent::Skip => {
                progress.state = transition(progress.state, QuestionEvent::Skip);
                Ok(Step::Continue)
            }
            QuizEvent::Advance => {
                if !progress.state.is_terminal() {
                    return Err(QuizError::NotAnswered);
                }
                self.current += 1;
                if self.current >= self.questions.len() {
                    self.finished = true;
                    Ok(Step::Completed)
                } else {
                    Ok(Step::Continue)
                }
            }
        }
    }

    /// The option whose explanation is on screen for the current question.
    pub fn revealed<'a>(&self, quiz: &'a Quiz) -> Option<&'a QuizOption> {
        let progress = self.current_progress()?;
        let question = quiz.questions.get(self.current)?;
        let id = progress.revealed?;
        question.options.iter().find(|o| o.id == id)
    }

    pub fn feedback(&self, quiz: &Quiz) -> Option<Feedback> {
        self.revealed(quiz).map(|o| Feedback {
            option_id: o.id,
            correct: o.correct,
            explanation: o.explanation.clone(),
        })
    }

    pub fn summary(&self, next: NextTopic) -> QuizSummary {
        QuizSummary {
            correct_count: self.correct_count(),
            total_questions: self.questions.len(),
            next,
        }
    }
}
