//! Submission payloads.

use indexmap::IndexMap;
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::definition::QuestionnaireKind;
use crate::error::QuestionnaireError;
use crate::session::QuestionnaireSession;

/// Identifier system stamped on generated responses.
pub const RESPONSE_IDENTIFIER_SYSTEM: &str = "http://limogi.ai";

/// Builds a completed Rome IV `QuestionnaireResponse` for `patient_id`.
///
/// Answers are grouped per section (sections without answers are left out);
/// questions keep definition order.
pub fn rome_iv_response(
    session: &QuestionnaireSession,
    questionnaire_url: &str,
    patient_id: &str,
    now: OffsetDateTime,
) -> Result<Value, QuestionnaireError> {
    if session.kind() != QuestionnaireKind::RomeIv {
        return Err(QuestionnaireError::Payload(format!(
            "expected a rome-iv session, got {}",
            session.kind()
        )));
    }

    let now = now
        .replace_nanosecond(u32::from(now.millisecond()) * 1_000_000)
        .unwrap_or(now);
    let authored = now
        .format(&Rfc3339)
        .map_err(|e| QuestionnaireError::Payload(e.to_string()))?;
    let epoch_millis = now.unix_timestamp_nanos() / 1_000_000;

    let groups: Vec<Value> = session
        .definition()
        .sections
        .iter()
        .filter_map(|section| {
            let items: Vec<Value> = section
                .questions
                .iter()
                .filter_map(|question| {
                    session.answer(&question.id).map(|answer| {
                        json!({
                            "linkId": question.id,
                            "text": question.text,
                            "answer": [{"valueString": answer}],
                        })
                    })
                })
                .collect();
            (!items.is_empty()).then(|| {
                json!({
                    "linkId": section.link_id(),
                    "text": section.title,
                    "item": items,
                })
            })
        })
        .collect();

    Ok(json!({
        "resourceType": "QuestionnaireResponse",
        "identifier": {
            "system": RESPONSE_IDENTIFIER_SYSTEM,
            "value": format!("answer-{epoch_millis}"),
        },
        "questionnaire": questionnaire_url,
        "status": "completed",
        "subject": {"reference": format!("Patient/{patient_id}")},
        "authored": authored,
        "item": groups,
    }))
}

/// Quality-of-life answers (`question id -> "1".."5"`) in definition order,
/// as sent to the prediction backend.
pub fn quality_of_life_answers(
    session: &QuestionnaireSession,
) -> Result<IndexMap<String, String>, QuestionnaireError> {
    if session.kind() != QuestionnaireKind::QualityOfLife {
        return Err(QuestionnaireError::Payload(format!(
            "expected a quality-of-life session, got {}",
            session.kind()
        )));
    }
    Ok(session
        .definition()
        .questions()
        .filter_map(|q| session.answer(&q.id).map(|a| (q.id.clone(), a.to_string())))
        .collect())
}
