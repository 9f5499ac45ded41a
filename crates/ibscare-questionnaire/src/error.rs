use crate::definition::QuestionnaireKind;

/// Rejected questionnaire operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuestionnaireError {
    #[error("Unknown questionnaire '{0}'")]
    UnknownQuestionnaire(String),

    #[error("Question '{question_id}' is not part of the {kind} questionnaire")]
    UnknownQuestion {
        kind: QuestionnaireKind,
        question_id: String,
    },

    #[error("'{value}' is not a valid answer to question '{question_id}'")]
    InvalidAnswer { question_id: String, value: String },

    #[error("No question at section {section}, position {question}")]
    InvalidPosition { section: usize, question: usize },

    #[error("Answers can only be submitted from the review screen")]
    NotReviewing,

    #[error("Submission has not been confirmed")]
    NotConfirmed,

    #[error("A submission is already in progress")]
    SubmissionInProgress,

    #[error("No submission is in progress")]
    NoSubmissionInProgress,

    #[error("Failed to build questionnaire payload: {0}")]
    Payload(String),
}

impl QuestionnaireError {
    /// Whether the client sent something invalid (as opposed to an
    /// out-of-order operation).
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::UnknownQuestionnaire(_)
                | Self::UnknownQuestion { .. }
                | Self::InvalidAnswer { .. }
                | Self::InvalidPosition { .. }
        )
    }

    /// Message suitable for showing to the clinician.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::UnknownQuestionnaire(_) => "This questionnaire does not exist.",
            Self::UnknownQuestion { .. } => "This question is not part of the questionnaire.",
            Self::InvalidAnswer { .. } => "Please choose one of the listed answers.",
            Self::InvalidPosition { .. } => "That question does not exist.",
            Self::NotReviewing => "Please review your answers before submitting.",
            Self::NotConfirmed => "Please confirm the submission first.",
            Self::SubmissionInProgress => "A submission is already in progress.",
            Self::NoSubmissionInProgress => "No submission is in progress.",
            Self::Payload(_) => "The answers could not be prepared for submission.",
        }
    }
}
