//! The patient digest sent to the scoring backend.

use serde::{Deserialize, Serialize};
use time::{Date, Month};

use crate::model::{ConditionSummary, ObservationSummary, PatientSummary};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedFhirData {
    pub patient: ProcessedPatient,
    pub relevant_conditions: Vec<RelevantCondition>,
    pub relevant_observations: Vec<RelevantObservation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedPatient {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevantCondition {
    pub code: String,
    pub display: String,
    pub onset: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelevantObservation {
    pub id: String,
    pub code: String,
    pub value: String,
    pub effective_date_time: String,
}

impl ProcessedFhirData {
    /// Builds the digest from parsed view-models, computing age as of `today`.
    #[must_use]
    pub fn from_summaries(
        patient: &PatientSummary,
        conditions: &[ConditionSummary],
        observations: &[ObservationSummary],
        today: Date,
    ) -> Self {
        let gender = Some(patient.gender.clone()).filter(|g| g != "N/A");
        Self {
            patient: ProcessedPatient {
                id: patient.id.clone(),
                gender,
                age: compute_age(&patient.birth_date, today),
            },
            relevant_conditions: conditions
                .iter()
                .map(|c| RelevantCondition {
                    code: c.code.clone().unwrap_or_default(),
                    display: c.display.clone(),
                    onset: c.onset.clone().unwrap_or_else(|| c.recorded_date.clone()),
                    status: c.clinical_status.clone(),
                })
                .collect(),
            relevant_observations: observations
                .iter()
                .map(|o| RelevantObservation {
                    id: o.id.clone(),
                    code: o.code.clone(),
                    value: o.value.clone(),
                    effective_date_time: o.effective_date_time.clone(),
                })
                .collect(),
        }
    }
}

/// Whole years between `birth_date` and `today`, counting a year only once
/// its anniversary has passed.
///
/// Accepts FHIR `date` values (`YYYY`, `YYYY-MM`, `YYYY-MM-DD`) and the date
/// part of a `dateTime`. Returns `None` for unparseable or future dates.
#[must_use]
pub fn compute_age(birth_date: &str, today: Date) -> Option<u32> {
    let birth = parse_fhir_date(birth_date)?;
    let mut age = today.year() - birth.year();
    if (today.month() as u8, today.day()) < (birth.month() as u8, birth.day()) {
        age -= 1;
    }
    u32::try_from(age).ok()
}

fn parse_fhir_date(value: &str) -> Option<Date> {
    let date_part = value.trim().get(..10.min(value.trim().len()))?;
    let mut parts = date_part.split('-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month = match parts.next() {
        Some(m) => Month::try_from(m.parse::<u8>().ok()?).ok()?,
        None => Month::January,
    };
    let day = match parts.next() {
        Some(d) => d.parse::<u8>().ok()?,
        None => 1,
    };
    Date::from_calendar_date(year, month, day).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::date;

    #[test]
    fn age_counts_completed_years() {
        let today = date!(2024 - 06 - 15);
        assert_eq!(compute_age("1980-06-15", today), Some(44));
        assert_eq!(compute_age("1980-06-16", today), Some(43));
        assert_eq!(compute_age("1980-07-01", today), Some(43));
        assert_eq!(compute_age("1980-05-31", today), Some(44));
    }

    #[test]
    fn age_for_partial_dates_and_datetimes() {
        let today = date!(2024 - 06 - 15);
        assert_eq!(compute_age("1990", today), Some(34));
        assert_eq!(compute_age("1990-07", today), Some(33));
        assert_eq!(compute_age("1990-01-02T08:30:00Z", today), Some(34));
    }

    #[test]
    fn age_absent_for_bad_or_future_dates() {
        let today = date!(2024 - 06 - 15);
        assert_eq!(compute_age("N/A", today), None);
        assert_eq!(compute_age("", today), None);
        assert_eq!(compute_age("1990-02-30", today), None);
        assert_eq!(compute_age("2030-01-01", today), None);
    }

    #[test]
    fn digest_from_summaries() {
        let patient = crate::model::parse_patient(&json!({
            "id": "p1", "gender": "female", "birthDate": "1990-01-01"
        }));
        let conditions = [crate::model::parse_condition(&json!({
            "id": "c1",
            "code": {"coding": [{"code": "10743008", "display": "IBS"}]},
            "recordedDate": "2024-01-02",
            "clinicalStatus": {"coding": [{"code": "active"}]}
        }))];
        let observations = [crate::model::parse_observation(&json!({
            "id": "o1", "code": {"text": "Pain"}, "valueString": "moderate"
        }))];

        let data = ProcessedFhirData::from_summaries(
            &patient,
            &conditions,
            &observations,
            date!(2024 - 06 - 15),
        );
        assert_eq!(
            serde_json::to_value(&data).unwrap(),
            json!({
                "patient": {"id": "p1", "gender": "female", "age": 34},
                "relevantConditions": [{
                    "code": "10743008", "display": "IBS", "onset": "2024-01-02", "status": "active"
                }],
                "relevantObservations": [{
                    "id": "o1", "code": "Pain", "value": "moderate",
                    "effectiveDateTime": "Unknown DateTime"
                }]
            })
        );
    }

    #[test]
    fn unknown_gender_and_birth_date_are_omitted() {
        let patient = crate::model::parse_patient(&json!({"id": "p2"}));
        let data = ProcessedFhirData::from_summaries(&patient, &[], &[], date!(2024 - 06 - 15));
        assert_eq!(
            serde_json::to_value(&data.patient).unwrap(),
            json!({"id": "p2"})
        );
    }
}
