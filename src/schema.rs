//! Schema Validator
//!
//! TigerStyle: One place decides what a valid form looks like.
//!
//! Raw JSON (from disk or from a request body) is checked attribute by
//! attribute and converted into typed values. Unknown attributes are
//! ignored. A collection is valid only if every element is valid and ids
//! are unique; this module never drops elements, see `repair` for that.

use crate::form::{
    Form, FormInput, FormPatch, FormStatus, FIELDS_COUNT_MAX, FIELDS_COUNT_MIN, TITLE_CHARS_MIN,
};
use crate::ids::is_canonical_uuid;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Layouts with a numeric offset (`+0000` or `+00:00`) besides RFC 3339.
const OFFSET_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
];

/// Naive layouts accepted for `updatedAt`; read as UTC. A trailing `Z` is
/// matched literally.
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%MZ",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

// =============================================================================
// Errors
// =============================================================================

/// Why a value is not a valid form
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("form must be an object")]
    NotAnObject,

    #[error("form collection must be a list")]
    NotAList,

    #[error("missing attribute: {0}")]
    Missing(&'static str),

    #[error("title must be text")]
    TitleNotText,

    #[error("title too short: {len} < {min} characters")]
    TitleTooShort { len: usize, min: usize },

    #[error("description must be text or null")]
    DescriptionNotText,

    #[error("fieldsCount must be an integer")]
    FieldsCountNotInteger,

    #[error("fieldsCount out of range: {0} not in [0, 50]")]
    FieldsCountOutOfRange(i64),

    #[error("status must be one of draft, active, archived")]
    InvalidStatus,

    #[error("updatedAt must be a valid date/time")]
    InvalidTimestamp,

    #[error("id must be a canonical UUID: {0}")]
    InvalidId(String),

    #[error("duplicate id: {0}")]
    DuplicateId(String),

    #[error("form {index}: {reason}")]
    Element {
        index: usize,
        reason: Box<ValidationError>,
    },
}

impl ValidationError {
    fn at(index: usize, reason: ValidationError) -> Self {
        Self::Element {
            index,
            reason: Box::new(reason),
        }
    }
}

// =============================================================================
// Raw values
// =============================================================================

/// Validate one persisted form. `id` is required.
pub fn validate(value: &Value) -> Result<Form, ValidationError> {
    let map = object(value)?;
    let id = match map.get("id") {
        Some(raw) => id(raw)?,
        None => return Err(ValidationError::Missing("id")),
    };

    let form = Form {
        id,
        title: title(required(map, "title")?)?,
        description: description(map.get("description"))?,
        fields_count: fields_count(required(map, "fieldsCount")?)?,
        status: status(required(map, "status")?)?,
        updated_at: updated_at(required(map, "updatedAt")?)?,
    };
    Ok(form)
}

/// Validate a persisted collection; fails on the first bad element.
pub fn validate_list(value: &Value) -> Result<Vec<Form>, ValidationError> {
    let items = value.as_array().ok_or(ValidationError::NotAList)?;
    let forms = items
        .iter()
        .enumerate()
        .map(|(index, item)| validate(item).map_err(|e| ValidationError::at(index, e)))
        .collect::<Result<Vec<_>, _>>()?;
    check_unique(&forms)?;
    Ok(forms)
}

/// Validate a creation request. Any `id` or `updatedAt` is ignored; the
/// store assigns both.
pub fn validate_input(value: &Value) -> Result<FormInput, ValidationError> {
    let map = object(value)?;
    let input = FormInput {
        title: title(required(map, "title")?)?,
        description: description(map.get("description"))?,
        fields_count: fields_count(required(map, "fieldsCount")?)?,
        status: status(required(map, "status")?)?,
    };
    Ok(input)
}

/// Type-check an update request. Constraints that depend on the merged
/// result (title length, count range) are checked after the merge.
pub fn validate_patch(value: &Value) -> Result<FormPatch, ValidationError> {
    let map = object(value)?;
    let mut patch = FormPatch::default();

    if let Some(raw) = map.get("title") {
        patch.title = Some(raw.as_str().ok_or(ValidationError::TitleNotText)?.to_string());
    }
    if let Some(raw) = map.get("description") {
        patch.description = Some(description(Some(raw))?);
    }
    if let Some(raw) = map.get("fieldsCount") {
        patch.fields_count = Some(integer(raw)?);
    }
    if let Some(raw) = map.get("status") {
        patch.status = Some(status(raw)?);
    }
    Ok(patch)
}

// =============================================================================
// Typed values
// =============================================================================

/// Re-check an assembled form before it is stored.
pub fn validate_form(form: &Form) -> Result<(), ValidationError> {
    check_title(&form.title)?;
    check_fields_count(form.fields_count)?;
    if !is_canonical_uuid(&form.id) {
        return Err(ValidationError::InvalidId(form.id.clone()));
    }
    Ok(())
}

/// Every form valid and every id unique.
pub fn validate_collection(forms: &[Form]) -> Result<(), ValidationError> {
    for (index, form) in forms.iter().enumerate() {
        validate_form(form).map_err(|e| ValidationError::at(index, e))?;
    }
    check_unique(forms)
}

/// Parse a timestamp in any accepted layout: RFC 3339, ISO 8601 with or
/// without seconds or offset, RFC 2822, or a plain date.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in OFFSET_TIMESTAMP_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(text, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    for format in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// =============================================================================
// Attribute checks
// =============================================================================

fn object(value: &Value) -> Result<&Map<String, Value>, ValidationError> {
    value.as_object().ok_or(ValidationError::NotAnObject)
}

fn required<'a>(map: &'a Map<String, Value>, name: &'static str) -> Result<&'a Value, ValidationError> {
    map.get(name).ok_or(ValidationError::Missing(name))
}

fn id(raw: &Value) -> Result<String, ValidationError> {
    match raw.as_str() {
        Some(text) if is_canonical_uuid(text) => Ok(text.to_string()),
        Some(text) => Err(ValidationError::InvalidId(text.to_string())),
        None => Err(ValidationError::InvalidId(raw.to_string())),
    }
}

fn title(raw: &Value) -> Result<String, ValidationError> {
    let text = raw.as_str().ok_or(ValidationError::TitleNotText)?;
    check_title(text)?;
    Ok(text.to_string())
}

fn check_title(text: &str) -> Result<(), ValidationError> {
    let len = text.chars().count();
    if len < TITLE_CHARS_MIN {
        return Err(ValidationError::TitleTooShort {
            len,
            min: TITLE_CHARS_MIN,
        });
    }
    Ok(())
}

fn description(raw: Option<&Value>) -> Result<Option<String>, ValidationError> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(_) => Err(ValidationError::DescriptionNotText),
    }
}

fn fields_count(raw: &Value) -> Result<i64, ValidationError> {
    let count = integer(raw)?;
    check_fields_count(count)?;
    Ok(count)
}

/// JSON integers, and floats with no fractional part (`5.0`).
fn integer(raw: &Value) -> Result<i64, ValidationError> {
    let number = match raw {
        Value::Number(number) => number,
        _ => return Err(ValidationError::FieldsCountNotInteger),
    };
    if let Some(n) = number.as_i64() {
        return Ok(n);
    }
    match number.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
        _ => Err(ValidationError::FieldsCountNotInteger),
    }
}

fn check_fields_count(count: i64) -> Result<(), ValidationError> {
    if !(FIELDS_COUNT_MIN..=FIELDS_COUNT_MAX).contains(&count) {
        return Err(ValidationError::FieldsCountOutOfRange(count));
    }
    Ok(())
}

fn status(raw: &Value) -> Result<FormStatus, ValidationError> {
    raw.as_str()
        .and_then(|text| text.parse().ok())
        .ok_or(ValidationError::InvalidStatus)
}

fn updated_at(raw: &Value) -> Result<DateTime<Utc>, ValidationError> {
    raw.as_str()
        .and_then(parse_timestamp)
        .ok_or(ValidationError::InvalidTimestamp)
}

fn check_unique(forms: &[Form]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(forms.len());
    for form in forms {
        if !seen.insert(form.id.as_str()) {
            return Err(ValidationError::DuplicateId(form.id.clone()));
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ID: &str = "9b2f4b1e-3c1d-4f7a-8e2b-1a2b3c4d5e6f";

    fn valid() -> Value {
        json!({
            "id": ID,
            "title": "Customer survey",
            "description": null,
            "fieldsCount": 5,
            "status": "draft",
            "updatedAt": "2024-05-01T10:00:00.000Z"
        })
    }

    fn with(key: &str, value: Value) -> Value {
        let mut form = valid();
        form[key] = value;
        form
    }

    #[test]
    fn test_valid_form() {
        let form = validate(&valid()).unwrap();
        assert_eq!(form.id, ID);
        assert_eq!(form.fields_count, 5);
        assert_eq!(form.status, FormStatus::Draft);
        assert_eq!(form.description, None);
    }

    #[test]
    fn test_description_optional() {
        let mut value = valid();
        value.as_object_mut().unwrap().remove("description");
        assert_eq!(validate(&value).unwrap().description, None);

        let form = validate(&with("description", json!("Quarterly"))).unwrap();
        assert_eq!(form.description.as_deref(), Some("Quarterly"));

        assert_eq!(
            validate(&with("description", json!(42))),
            Err(ValidationError::DescriptionNotText)
        );
    }

    #[test]
    fn test_unknown_attributes_ignored() {
        let form = validate(&with("owner", json!("someone"))).unwrap();
        assert_eq!(form.title, "Customer survey");
    }

    #[test]
    fn test_title_too_short() {
        let err = validate(&with("title", json!("Hi"))).unwrap_err();
        assert_eq!(err, ValidationError::TitleTooShort { len: 2, min: 3 });
        assert!(err.to_string().starts_with("title too short"));

        // counted in characters, not bytes
        assert!(validate(&with("title", json!("日本語"))).is_ok());
    }

    #[test]
    fn test_fields_count_bounds() {
        assert!(validate(&with("fieldsCount", json!(0))).is_ok());
        assert!(validate(&with("fieldsCount", json!(50))).is_ok());
        assert!(validate(&with("fieldsCount", json!(5.0))).is_ok());
        assert_eq!(
            validate(&with("fieldsCount", json!(51))),
            Err(ValidationError::FieldsCountOutOfRange(51))
        );
        assert_eq!(
            validate(&with("fieldsCount", json!(-1))),
            Err(ValidationError::FieldsCountOutOfRange(-1))
        );
        assert_eq!(
            validate(&with("fieldsCount", json!(2.5))),
            Err(ValidationError::FieldsCountNotInteger)
        );
        assert_eq!(
            validate(&with("fieldsCount", json!("5"))),
            Err(ValidationError::FieldsCountNotInteger)
        );
    }

    #[test]
    fn test_status_enum() {
        assert!(validate(&with("status", json!("archived"))).is_ok());
        assert_eq!(
            validate(&with("status", json!("deleted"))),
            Err(ValidationError::InvalidStatus)
        );
    }

    #[test]
    fn test_timestamps() {
        assert!(validate(&with("updatedAt", json!("2024-05-01"))).is_ok());
        assert!(validate(&with("updatedAt", json!("2024-05-01T10:00:00"))).is_ok());
        assert!(validate(&with("updatedAt", json!("2024-05-01T10:00:00+02:00"))).is_ok());
        assert_eq!(
            validate(&with("updatedAt", json!("yesterday"))),
            Err(ValidationError::InvalidTimestamp)
        );
        assert_eq!(
            validate(&with("updatedAt", json!("2024-02-30T00:00:00Z"))),
            Err(ValidationError::InvalidTimestamp)
        );
    }

    #[test]
    fn test_timestamps_without_seconds_or_colon_offset() {
        let expected = parse_timestamp("2023-06-01T12:00:00Z").unwrap();
        for text in [
            "2023-06-01T12:00Z",
            "2023-06-01T12:00",
            "Thu, 01 Jun 2023 12:00:00 GMT",
            "Thu, 01 Jun 2023 12:00:00 +0000",
            "2023-06-01T12:00:00.000+0000",
            "2023-06-01T14:00:00+0200",
            "2023-06-01 12:00:00",
        ] {
            assert_eq!(parse_timestamp(text), Some(expected), "{text}");
            assert!(validate(&with("updatedAt", json!(text))).is_ok(), "{text}");
        }
        assert_eq!(parse_timestamp("2023-06-01T12"), None);
        assert_eq!(parse_timestamp("Thu, 01 Jun 2023"), None);
    }

    #[test]
    fn test_parse_timestamp_normalizes_offset() {
        let parsed = parse_timestamp("2024-05-01T12:00:00+02:00").unwrap();
        assert_eq!(parsed, parse_timestamp("2024-05-01T10:00:00Z").unwrap());
    }

    #[test]
    fn test_id_rules() {
        assert_eq!(
            validate(&with("id", json!("not-a-uuid"))),
            Err(ValidationError::InvalidId("not-a-uuid".to_string()))
        );
        let mut value = valid();
        value.as_object_mut().unwrap().remove("id");
        assert_eq!(validate(&value), Err(ValidationError::Missing("id")));
    }

    #[test]
    fn test_list_fails_on_any_element() {
        let list = json!([valid(), with("id", json!("a1b2c3d4-0000-4000-8000-000000000001")), with("title", json!(""))]);
        let err = validate_list(&list).unwrap_err();
        assert!(matches!(err, ValidationError::Element { index: 2, .. }));
    }

    #[test]
    fn test_list_rejects_duplicates_and_non_lists() {
        assert_eq!(
            validate_list(&json!([valid(), valid()])),
            Err(ValidationError::DuplicateId(ID.to_string()))
        );
        assert_eq!(validate_list(&json!({"forms": []})), Err(ValidationError::NotAList));
        assert_eq!(validate_list(&json!([])).unwrap(), Vec::new());
    }

    #[test]
    fn test_input_ignores_id_and_timestamp() {
        let input = validate_input(&json!({
            "id": "caller-chosen",
            "title": "Survey",
            "fieldsCount": 5,
            "status": "draft",
            "updatedAt": "garbage"
        }))
        .unwrap();
        assert_eq!(input, FormInput::new("Survey", 5, FormStatus::Draft));

        assert!(matches!(
            validate_input(&json!({"title": "Hi", "fieldsCount": 5, "status": "draft"})),
            Err(ValidationError::TitleTooShort { .. })
        ));
        assert_eq!(
            validate_input(&json!({"title": "Survey", "status": "draft"})),
            Err(ValidationError::Missing("fieldsCount"))
        );
    }

    #[test]
    fn test_patch_types() {
        let patch = validate_patch(&json!({"description": null, "fieldsCount": 60})).unwrap();
        assert_eq!(patch.description, Some(None));
        assert_eq!(patch.fields_count, Some(60));
        assert_eq!(patch.title, None);

        assert!(validate_patch(&json!({})).unwrap().is_empty());
        assert_eq!(
            validate_patch(&json!({"status": "live"})),
            Err(ValidationError::InvalidStatus)
        );
        assert_eq!(validate_patch(&json!([])), Err(ValidationError::NotAnObject));
    }

    #[test]
    fn test_validate_form_typed() {
        let mut form = validate(&valid()).unwrap();
        assert!(validate_form(&form).is_ok());

        form.fields_count = 99;
        assert_eq!(validate_form(&form), Err(ValidationError::FieldsCountOutOfRange(99)));

        form.fields_count = 1;
        form.id = "17000000000001abcdef".to_string();
        assert!(matches!(validate_form(&form), Err(ValidationError::InvalidId(_))));
    }
}
