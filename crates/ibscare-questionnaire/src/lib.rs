//! IBS questionnaires.
//!
//! Two instruments are defined: the Rome IV diagnostic questionnaire, whose
//! answers are written to the FHIR server as a `QuestionnaireResponse`, and
//! the IBS quality-of-life questionnaire, whose ratings feed the prediction
//! backend.

pub mod definition;
pub mod error;
pub mod payload;
pub mod session;

pub use definition::{Question, QuestionOption, QuestionnaireDefinition, QuestionnaireKind, Section};
pub use error::QuestionnaireError;
pub use payload::{quality_of_life_answers, rome_iv_response};
pub use session::{QuestionnaireAction, QuestionnaireSession, SubmissionState};
