//! Decoding of treatment recommendations from free-form model output.

use crate::api::models::Recommendation;
use crate::core::error::FormatError;
use serde_json::{Map, Value};

const MEDICATION_FIELDS: [&str; 4] = ["medication_name", "dosage", "frequency", "side_effects"];
const TREATMENT_PLAN_FIELDS: [&str; 2] = ["treatment_type", "treatment_detail"];

/// Narrow raw model output to the embedded JSON object.
///
/// Text already starting with `{` is kept as is; otherwise the slice from the
/// first `{` to the last `}` is taken when both exist in that order.
pub fn locate_json_object(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        return trimmed;
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Parse and validate a recommendation out of model output.
pub fn parse_recommendation(raw: &str) -> Result<Recommendation, FormatError> {
    let candidate = locate_json_object(raw);
    let value: Value =
        serde_json::from_str(candidate).map_err(|e| FormatError::InvalidJson(e.to_string()))?;

    let object = value.as_object().ok_or(FormatError::NotAnObject)?;
    let medications = require(object, "medications")?
        .as_array()
        .ok_or(FormatError::WrongType {
            field: "medications",
            expected: "an array",
        })?;
    let treatment_plan = require(object, "treatment_plan")?
        .as_object()
        .ok_or(FormatError::WrongType {
            field: "treatment_plan",
            expected: "an object",
        })?;

    for (index, medication) in medications.iter().enumerate() {
        let medication = medication.as_object().ok_or(FormatError::WrongType {
            field: "medications",
            expected: "an array of objects",
        })?;
        let missing = missing_keys(medication, &MEDICATION_FIELDS);
        if !missing.is_empty() {
            return Err(FormatError::MissingMedicationFields {
                index,
                fields: missing,
            });
        }
    }

    let missing = missing_keys(treatment_plan, &TREATMENT_PLAN_FIELDS);
    if !missing.is_empty() {
        return Err(FormatError::MissingTreatmentPlanFields(missing));
    }

    serde_json::from_value(value).map_err(|e| FormatError::InvalidValue(e.to_string()))
}

fn require<'a>(object: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value, FormatError> {
    object.get(field).ok_or(FormatError::MissingField(field))
}

// Key presence only: a `null` side_effects still counts as present.
fn missing_keys(object: &Map<String, Value>, keys: &[&'static str]) -> Vec<&'static str> {
    keys.iter()
        .copied()
        .filter(|key| !object.contains_key(*key))
        .collect()
}
