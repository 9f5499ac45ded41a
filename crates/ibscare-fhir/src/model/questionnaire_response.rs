use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{resource_id, text};

/// One answered question, with its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedQuestion {
    pub link_id: String,
    pub question_text: String,
    pub answers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested_questions: Vec<ParsedQuestion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireResponseSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questionnaire_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encounter_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authored: Option<String>,
    pub status: String,
    pub questions: Vec<ParsedQuestion>,
}

/// Parses a `QuestionnaireResponse`; `questionnaire` supplies text for items
/// that carry none.
pub fn parse_questionnaire_response(
    resource: &Value,
    questionnaire: Option<&Value>,
) -> QuestionnaireResponseSummary {
    QuestionnaireResponseSummary {
        id: resource_id(resource),
        questionnaire_ref: text(resource, "/questionnaire").map(str::to_string),
        encounter_ref: text(resource, "/encounter/reference").map(str::to_string),
        authored: text(resource, "/authored").map(str::to_string),
        status: text(resource, "/status").unwrap_or("unknown").to_string(),
        questions: parse_question_items(resource.get("item"), questionnaire),
    }
}

pub fn parse_question_items(
    items: Option<&Value>,
    questionnaire: Option<&Value>,
) -> Vec<ParsedQuestion> {
    items
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|item| parse_question(item, questionnaire))
        .collect()
}

fn parse_question(item: &Value, questionnaire: Option<&Value>) -> ParsedQuestion {
    let link_id = text(item, "/linkId").unwrap_or_default().to_string();
    let question_text = text(item, "/text")
        .map(str::to_string)
        .or_else(|| questionnaire.and_then(|q| find_question_text(q.get("item"), &link_id)))
        .unwrap_or_else(|| "No question text provided".to_string());

    let answers = item
        .get("answer")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(answer_text)
        .collect();

    ParsedQuestion {
        nested_questions: parse_question_items(item.get("item"), questionnaire),
        link_id,
        question_text,
        answers,
    }
}

fn answer_text(answer: &Value) -> String {
    if let Some(s) = answer.get("valueString").and_then(Value::as_str) {
        return s.to_string();
    }
    if let Some(b) = answer.get("valueBoolean").and_then(Value::as_bool) {
        return if b { "Yes" } else { "No" }.to_string();
    }
    if let Some(coding) = answer.get("valueCoding") {
        return text(coding, "/display")
            .or_else(|| text(coding, "/code"))
            .unwrap_or("Unknown coding")
            .to_string();
    }
    for key in ["valueInteger", "valueDecimal"] {
        if let Some(Value::Number(n)) = answer.get(key) {
            return n.to_string();
        }
    }
    for key in ["valueDate", "valueDateTime", "valueTime", "valueUri"] {
        if let Some(s) = answer.get(key).and_then(Value::as_str) {
            return s.to_string();
        }
    }
    "(no recognized answer)".to_string()
}

/// Text of the Questionnaire item with `link_id`, searching nested items.
pub fn find_question_text(items: Option<&Value>, link_id: &str) -> Option<String> {
    for item in items.and_then(Value::as_array).into_iter().flatten() {
        if item.get("linkId").and_then(Value::as_str) == Some(link_id)
            && let Some(found) = text(item, "/text")
        {
            return Some(found.to_string());
        }
        if let Some(found) = find_question_text(item.get("item"), link_id) {
            return Some(found);
        }
    }
    None
}

/// Whether any top-level item lacks question text.
pub fn missing_question_text(resource: &Value) -> bool {
    resource
        .get("item")
        .and_then(Value::as_array)
        .is_some_and(|items| items.iter().any(|item| text(item, "/text").is_none()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn questionnaire() -> Value {
        json!({
            "resourceType": "Questionnaire",
            "item": [
                {"linkId": "group", "text": "Symptoms", "item": [
                    {"linkId": "pain", "text": "How often do you have abdominal pain?"}
                ]},
                {"linkId": "bloat", "text": "Do you feel bloated?"}
            ]
        })
    }

    #[test]
    fn answer_kinds() {
        let response = json!({
            "resourceType": "QuestionnaireResponse",
            "id": "qr1",
            "status": "completed",
            "questionnaire": "Questionnaire/rome",
            "item": [{
                "linkId": "q1",
                "text": "Answers",
                "answer": [
                    {"valueString": "daily"},
                    {"valueBoolean": true},
                    {"valueBoolean": false},
                    {"valueCoding": {"code": "C1", "display": "Constipation"}},
                    {"valueCoding": {"code": "C2"}},
                    {"valueCoding": {}},
                    {"valueInteger": 4},
                    {"valueDate": "2024-01-01"},
                    {"valueAttachment": {}}
                ]
            }]
        });
        let parsed = parse_questionnaire_response(&response, None);
        assert_eq!(parsed.id, "qr1");
        assert_eq!(parsed.questionnaire_ref.as_deref(), Some("Questionnaire/rome"));
        assert_eq!(
            parsed.questions[0].answers,
            [
                "daily",
                "Yes",
                "No",
                "Constipation",
                "C2",
                "Unknown coding",
                "4",
                "2024-01-01",
                "(no recognized answer)"
            ]
        );
    }

    #[test]
    fn missing_text_is_looked_up_recursively() {
        let questionnaire = questionnaire();
        let response = json!({
            "item": [
                {"linkId": "pain", "answer": [{"valueString": "weekly"}]},
                {"linkId": "other", "text": " "}
            ]
        });
        assert!(missing_question_text(&response));
        let parsed = parse_questionnaire_response(&response, Some(&questionnaire));
        assert_eq!(
            parsed.questions[0].question_text,
            "How often do you have abdominal pain?"
        );
        assert_eq!(parsed.questions[1].question_text, "No question text provided");
        assert!(parsed.questions[1].answers.is_empty());
    }

    #[test]
    fn nested_items_become_nested_questions() {
        let response = json!({
            "item": [{
                "linkId": "group",
                "text": "Symptoms",
                "item": [{"linkId": "bloat", "answer": [{"valueBoolean": true}]}]
            }]
        });
        let questionnaire = questionnaire();
        let parsed = parse_questionnaire_response(&response, Some(&questionnaire));
        let nested = &parsed.questions[0].nested_questions;
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].question_text, "Do you feel bloated?");
        assert_eq!(nested[0].answers, ["Yes"]);
        assert!(!missing_question_text(&response));
    }

    #[test]
    fn nested_questions_skipped_when_empty() {
        let json = serde_json::to_value(ParsedQuestion {
            link_id: "a".into(),
            question_text: "A".into(),
            answers: vec![],
            nested_questions: vec![],
        })
        .unwrap();
        assert!(json.get("nestedQuestions").is_none());
    }
}
