//! Repair Pass
//!
//! Best-effort normalization of a persisted form collection that failed
//! validation. Runs at load time only; writes are always validated without
//! repair.
//!
//! Per element, in order:
//! 1. missing, non-canonical or duplicate `id` gets a fresh id
//! 2. missing or unparseable `updatedAt` becomes the current time
//! 3. `fieldsCount` is coerced to a number, clamped to [0, 50], truncated
//! 4. `title`, `description`, `status` are left alone
//!
//! Elements still invalid afterwards are dropped and reported.

use crate::clock::Clock;
use crate::form::{Form, FIELDS_COUNT_MAX, FIELDS_COUNT_MIN};
use crate::ids::{assign_id, is_canonical_uuid, IdGenerator};
use crate::schema::{self, parse_timestamp, ValidationError};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// A dropped element and why it could not be kept
#[derive(Debug, Clone, PartialEq)]
pub struct Dropped {
    /// Position in the persisted list
    pub index: usize,
    pub reason: ValidationError,
}

/// Outcome of a repair pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairReport {
    /// Surviving forms, in persisted order
    pub forms: Vec<Form>,
    pub ids_regenerated: usize,
    pub timestamps_reset: usize,
    pub counts_coerced: usize,
    pub dropped: Vec<Dropped>,
}

impl RepairReport {
    /// True when nothing had to change.
    pub fn is_clean(&self) -> bool {
        self.ids_regenerated == 0
            && self.timestamps_reset == 0
            && self.counts_coerced == 0
            && self.dropped.is_empty()
    }
}

/// Repair a persisted list of raw form values.
///
/// The surviving forms always make a valid collection: each one passed
/// `schema::validate` and `repair_id` never lets an id through twice.
pub fn repair(items: Vec<Value>, clock: &dyn Clock, ids: &dyn IdGenerator) -> RepairReport {
    let mut report = RepairReport::default();
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());

    for (index, mut item) in items.into_iter().enumerate() {
        if let Value::Object(map) = &mut item {
            if repair_id(map, &mut seen, clock, ids) {
                report.ids_regenerated += 1;
            }
            if repair_updated_at(map, clock) {
                report.timestamps_reset += 1;
            }
            if repair_fields_count(map) {
                report.counts_coerced += 1;
            }
        }

        match schema::validate(&item) {
            Ok(form) => report.forms.push(form),
            Err(reason) => {
                tracing::warn!(index, reason = %reason, "dropping unrecoverable form");
                report.dropped.push(Dropped { index, reason });
            }
        }
    }

    debug_assert!(schema::validate_collection(&report.forms).is_ok());
    report
}

fn repair_id(
    map: &mut Map<String, Value>,
    seen: &mut HashSet<String>,
    clock: &dyn Clock,
    ids: &dyn IdGenerator,
) -> bool {
    let current = map
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| is_canonical_uuid(id) && !seen.contains(*id))
        .map(str::to_string);

    match current {
        Some(id) => {
            seen.insert(id);
            false
        }
        None => {
            let id = assign_id(ids, clock);
            tracing::debug!(old = ?map.get("id"), new = %id, "regenerated form id");
            seen.insert(id.clone());
            map.insert("id".to_string(), Value::String(id));
            true
        }
    }
}

fn repair_updated_at(map: &mut Map<String, Value>, clock: &dyn Clock) -> bool {
    let parseable = map
        .get("updatedAt")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .is_some();
    if parseable {
        return false;
    }
    map.insert("updatedAt".to_string(), Value::String(clock.now().to_rfc3339()));
    true
}

fn repair_fields_count(map: &mut Map<String, Value>) -> bool {
    let coerced = coerce_count(map.get("fieldsCount"));
    let unchanged = map
        .get("fieldsCount")
        .and_then(Value::as_i64)
        .is_some_and(|n| n == coerced);
    if unchanged {
        return false;
    }
    map.insert("fieldsCount".to_string(), Value::from(coerced));
    true
}

/// Numeric coercion in the spirit of a lenient number parse: numeric text,
/// booleans as 0/1, null and blank as 0, anything else 0. The result is
/// truncated and clamped into range.
fn coerce_count(raw: Option<&Value>) -> i64 {
    let n = match raw {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(text)) if text.trim().is_empty() => 0.0,
        Some(Value::String(text)) => text.trim().parse::<f64>().unwrap_or(f64::NAN),
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(Value::Null) | None => 0.0,
        Some(_) => f64::NAN,
    };
    if !n.is_finite() {
        return FIELDS_COUNT_MIN;
    }
    (n.trunc() as i64).clamp(FIELDS_COUNT_MIN, FIELDS_COUNT_MAX)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ids::SequentialIds;
    use serde_json::json;
    use uuid::Uuid;

    const ID_A: &str = "9b2f4b1e-3c1d-4f7a-8e2b-1a2b3c4d5e6f";
    const ID_B: &str = "1c9d7a20-5b4e-4e0f-9a8b-7c6d5e4f3a2b";

    #[derive(Debug)]
    struct NoRandomness;

    impl IdGenerator for NoRandomness {
        fn new_id(&self) -> Option<Uuid> {
            None
        }
    }

    fn form(id: &str, title: &str) -> Value {
        json!({
            "id": id,
            "title": title,
            "description": "notes",
            "fieldsCount": 7,
            "status": "active",
            "updatedAt": "2024-03-01T08:30:00Z"
        })
    }

    fn run(items: Vec<Value>) -> RepairReport {
        repair(items, &ManualClock::new(), &SequentialIds::new())
    }

    #[test]
    fn test_clean_collection_is_noop() {
        let items = vec![form(ID_A, "First form"), form(ID_B, "Second form")];
        let expected = schema::validate_list(&Value::Array(items.clone())).unwrap();

        let report = run(items);

        assert!(report.is_clean());
        assert_eq!(report.forms, expected);
    }

    #[test]
    fn test_bad_id_regenerated_other_fields_kept() {
        let report = run(vec![form("not-a-uuid", "Survey form")]);

        assert_eq!(report.ids_regenerated, 1);
        let repaired = &report.forms[0];
        assert!(is_canonical_uuid(&repaired.id));
        assert_eq!(repaired.title, "Survey form");
        assert_eq!(repaired.description.as_deref(), Some("notes"));
        assert_eq!(repaired.fields_count, 7);
        assert_eq!(repaired.updated_at.to_rfc3339(), "2024-03-01T08:30:00+00:00");
    }

    #[test]
    fn test_missing_id_regenerated() {
        let mut item = form(ID_A, "Survey form");
        item.as_object_mut().unwrap().remove("id");

        let report = run(vec![item]);

        assert_eq!(report.ids_regenerated, 1);
        assert!(is_canonical_uuid(&report.forms[0].id));
    }

    #[test]
    fn test_duplicate_id_regenerated() {
        let report = run(vec![form(ID_A, "First form"), form(ID_A, "Second form")]);

        assert_eq!(report.ids_regenerated, 1);
        assert_eq!(report.forms[0].id, ID_A);
        assert_ne!(report.forms[1].id, ID_A);
    }

    #[test]
    fn test_bad_timestamp_reset_to_now() {
        let clock = ManualClock::new();
        let mut item = form(ID_A, "Survey form");
        item["updatedAt"] = json!("last tuesday");

        let report = repair(vec![item], &clock, &SequentialIds::new());

        assert_eq!(report.timestamps_reset, 1);
        assert_eq!(report.forms[0].updated_at, clock.now());
    }

    #[test]
    fn test_loose_timestamp_layouts_kept() {
        for text in ["2024-03-01T08:30Z", "Fri, 01 Mar 2024 08:30:00 GMT", "2024-03-01T08:30:00.000+0000"] {
            let mut item = form(ID_A, "Survey form");
            item["updatedAt"] = json!(text);

            let report = run(vec![item]);

            assert_eq!(report.timestamps_reset, 0, "{text}");
            assert_eq!(report.forms[0].updated_at.to_rfc3339(), "2024-03-01T08:30:00+00:00", "{text}");
        }
    }

    #[test]
    fn test_survivors_always_form_valid_collection() {
        let mut no_id = form(ID_B, "No id");
        no_id.as_object_mut().unwrap().remove("id");
        let mut stale = form(ID_A, "Stale");
        stale["updatedAt"] = json!(17);
        stale["fieldsCount"] = json!("99");
        let items = vec![
            form(ID_A, "First"),
            form(ID_A, "Second"),
            stale,
            no_id,
            form(ID_B, "Third"),
            form(ID_B, "Fourth"),
            form("", "Fifth"),
            json!(null),
        ];

        let report = run(items);

        assert_eq!(report.forms.len(), 7);
        assert_eq!(report.dropped.len(), 1);
        assert!(schema::validate_collection(&report.forms).is_ok());
    }

    #[test]
    fn test_fields_count_coercion() {
        let cases = [
            (json!(999), 50),
            (json!(-4), 0),
            (json!(12.9), 12),
            (json!("8"), 8),
            (json!(" 3 "), 3),
            (json!("seven"), 0),
            (json!(""), 0),
            (json!(true), 1),
            (json!(null), 0),
            (json!([1, 2]), 0),
        ];
        for (raw, expected) in cases {
            let mut item = form(ID_A, "Survey form");
            item["fieldsCount"] = raw.clone();
            let report = run(vec![item]);
            assert_eq!(report.forms[0].fields_count, expected, "input {}", raw);
            assert_eq!(report.counts_coerced, 1, "input {}", raw);
        }
    }

    #[test]
    fn test_missing_fields_count_defaults_to_zero() {
        let mut item = form(ID_A, "Survey form");
        item.as_object_mut().unwrap().remove("fieldsCount");

        assert_eq!(run(vec![item]).forms[0].fields_count, 0);
    }

    #[test]
    fn test_unrecoverable_elements_dropped() {
        let mut bad_status = form(ID_B, "Bad status");
        bad_status["status"] = json!("published");
        let items = vec![form(ID_A, "Keeper"), form(ID_B, "Hi"), bad_status, json!("junk")];

        let report = run(items);

        assert_eq!(report.forms.len(), 1);
        assert_eq!(report.forms[0].title, "Keeper");
        let indices: Vec<usize> = report.dropped.iter().map(|d| d.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(report.dropped[2].reason, ValidationError::NotAnObject);
    }

    #[test]
    fn test_fallback_id_is_dropped() {
        let report = repair(
            vec![form("not-a-uuid", "Survey form")],
            &ManualClock::new(),
            &NoRandomness,
        );

        assert!(report.forms.is_empty());
        assert!(matches!(report.dropped[0].reason, ValidationError::InvalidId(_)));
    }
}
