//! Questionnaire navigation and submission state.
//!
//! A session walks the questions section by section, then shows a review of
//! all answers. Submission is two-step: the clinician requests it from the
//! review, confirms, and the caller brackets the actual network call with
//! [`QuestionnaireSession::begin_submit`] and
//! [`QuestionnaireSession::complete_submit`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::definition::{Question, QuestionnaireDefinition, QuestionnaireKind};
use crate::error::QuestionnaireError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionState {
    #[default]
    Idle,
    Submitting,
    Succeeded {
        result: Value,
    },
    Failed {
        message: String,
    },
}

/// Client-driven operations, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum QuestionnaireAction {
    Answer { question_id: String, value: String },
    Next,
    Previous,
    Edit { section: usize, question: usize },
    Review,
    RequestSubmit,
    CancelSubmit,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireSession {
    kind: QuestionnaireKind,
    current_section: usize,
    current_question: usize,
    /// Question id to answer value, in the order answers were first given.
    answers: IndexMap<String, String>,
    reviewing: bool,
    confirming: bool,
    submission: SubmissionState,
}

impl QuestionnaireSession {
    #[must_use]
    pub fn new(kind: QuestionnaireKind) -> Self {
        Self {
            kind,
            current_section: 0,
            current_question: 0,
            answers: IndexMap::new(),
            reviewing: false,
            confirming: false,
            submission: SubmissionState::Idle,
        }
    }

    #[must_use]
    pub fn kind(&self) -> QuestionnaireKind {
        self.kind
    }

    #[must_use]
    pub fn definition(&self) -> &'static QuestionnaireDefinition {
        self.kind.definition()
    }

    #[must_use]
    pub fn position(&self) -> (usize, usize) {
        (self.current_section, self.current_question)
    }

    /// The question on screen; `None` while reviewing.
    #[must_use]
    pub fn current_question(&self) -> Option<&'static Question> {
        if self.reviewing {
            return None;
        }
        self.definition()
            .question_at(self.current_section, self.current_question)
    }

    #[must_use]
    pub fn answers(&self) -> &IndexMap<String, String> {
        &self.answers
    }

    #[must_use]
    pub fn answer(&self, question_id: &str) -> Option<&str> {
        self.answers.get(question_id).map(String::as_str)
    }

    #[must_use]
    pub fn is_reviewing(&self) -> bool {
        self.reviewing
    }

    #[must_use]
    pub fn is_confirming(&self) -> bool {
        self.confirming
    }

    #[must_use]
    pub fn submission(&self) -> &SubmissionState {
        &self.submission
    }

    /// Ids of questions without an answer, in definition order.
    #[must_use]
    pub fn unanswered(&self) -> Vec<&'static str> {
        self.definition()
            .questions()
            .filter(|q| !self.answers.contains_key(&q.id))
            .map(|q| q.id.as_str())
            .collect()
    }

    /// Percentage through the questionnaire; 100 while reviewing.
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.reviewing {
            return 100.0;
        }
        let definition = self.definition();
        let total = definition.total_questions();
        if total == 0 {
            return 100.0;
        }
        let ordinal = definition.ordinal(self.current_section, self.current_question);
        ordinal as f64 / total as f64 * 100.0
    }

    pub fn apply(&mut self, action: QuestionnaireAction) -> Result<(), QuestionnaireError> {
        match action {
            QuestionnaireAction::Answer { question_id, value } => {
                self.record_answer(&question_id, &value)
            }
            QuestionnaireAction::Next => {
                self.next();
                Ok(())
            }
            QuestionnaireAction::Previous => {
                self.previous();
                Ok(())
            }
            QuestionnaireAction::Edit { section, question } => self.edit(section, question),
            QuestionnaireAction::Review => {
                self.review();
                Ok(())
            }
            QuestionnaireAction::RequestSubmit => self.request_submit(),
            QuestionnaireAction::CancelSubmit => {
                self.cancel_submit();
                Ok(())
            }
            QuestionnaireAction::Reset => {
                self.reset();
                Ok(())
            }
        }
    }

    /// Records an answer and, unless reviewing, advances to the next question.
    pub fn record_answer(
        &mut self,
        question_id: &str,
        value: &str,
    ) -> Result<(), QuestionnaireError> {
        if self.submission == SubmissionState::Submitting {
            return Err(QuestionnaireError::SubmissionInProgress);
        }
        let (_, _, question) =
            self.definition()
                .find(question_id)
                .ok_or_else(|| QuestionnaireError::UnknownQuestion {
                    kind: self.kind,
                    question_id: question_id.to_string(),
                })?;
        if question.option(value).is_none() {
            return Err(QuestionnaireError::InvalidAnswer {
                question_id: question_id.to_string(),
                value: value.to_string(),
            });
        }

        self.answers.insert(question_id.to_string(), value.to_string());
        if !self.reviewing {
            self.next();
        }
        Ok(())
    }

    /// Next question, else first question of the next section, else review.
    pub fn next(&mut self) {
        let sections = &self.definition().sections;
        if self.reviewing {
            return;
        }
        if self.current_question + 1 < sections[self.current_section].questions.len() {
            self.current_question += 1;
        } else if self.current_section + 1 < sections.len() {
            self.current_section += 1;
            self.current_question = 0;
        } else {
            self.reviewing = true;
        }
    }

    /// From review, back to the last question; otherwise one question back,
    /// crossing into the previous section. No-op at the first question.
    pub fn previous(&mut self) {
        let sections = &self.definition().sections;
        if self.reviewing {
            self.reviewing = false;
            self.confirming = false;
            self.current_section = sections.len() - 1;
            self.current_question = sections[self.current_section].questions.len() - 1;
        } else if self.current_question > 0 {
            self.current_question -= 1;
        } else if self.current_section > 0 {
            self.current_section -= 1;
            self.current_question = sections[self.current_section].questions.len() - 1;
        }
    }

    /// Jumps to a question and leaves the review.
    pub fn edit(&mut self, section: usize, question: usize) -> Result<(), QuestionnaireError> {
        if self.definition().question_at(section, question).is_none() {
            return Err(QuestionnaireError::InvalidPosition { section, question });
        }
        self.reviewing = false;
        self.confirming = false;
        self.current_section = section;
        self.current_question = question;
        Ok(())
    }

    pub fn review(&mut self) {
        self.reviewing = true;
    }

    /// Opens the confirmation step. Only allowed from the review.
    pub fn request_submit(&mut self) -> Result<(), QuestionnaireError> {
        if !self.reviewing {
            return Err(QuestionnaireError::NotReviewing);
        }
        if self.submission == SubmissionState::Submitting {
            return Err(QuestionnaireError::SubmissionInProgress);
        }
        self.confirming = true;
        Ok(())
    }

    /// Closes the confirmation step and clears a previous failure.
    pub fn cancel_submit(&mut self) {
        if self.submission == SubmissionState::Submitting {
            return;
        }
        self.confirming = false;
        if matches!(self.submission, SubmissionState::Failed { .. }) {
            self.submission = SubmissionState::Idle;
        }
    }

    /// Marks the confirmed submission as in flight.
    pub fn begin_submit(&mut self) -> Result<(), QuestionnaireError> {
        if self.submission == SubmissionState::Submitting {
            return Err(QuestionnaireError::SubmissionInProgress);
        }
        if !self.confirming {
            return Err(QuestionnaireError::NotConfirmed);
        }
        self.submission = SubmissionState::Submitting;
        Ok(())
    }

    /// Records the outcome of the in-flight submission. On failure the
    /// confirmation stays open so the clinician can retry or cancel.
    pub fn complete_submit(
        &mut self,
        outcome: Result<Value, String>,
    ) -> Result<(), QuestionnaireError> {
        if self.submission != SubmissionState::Submitting {
            return Err(QuestionnaireError::NoSubmissionInProgress);
        }
        match outcome {
            Ok(result) => {
                tracing::info!(questionnaire = %self.kind, "Questionnaire submitted");
                self.confirming = false;
                self.submission = SubmissionState::Succeeded { result };
            }
            Err(message) => {
                tracing::warn!(
                    questionnaire = %self.kind,
                    error = %message,
                    "Questionnaire submission failed"
                );
                self.submission = SubmissionState::Failed { message };
            }
        }
        Ok(())
    }

    /// Back to the first question with no answers.
    pub fn reset(&mut self) {
        *self = Self::new(self.kind);
    }
}
