//! AND-condition evaluation over the enriched call payload.
//!
//! Fields are dotted paths. A missing field fails every operator, including
//! the negated ones; absence is not knowledge.

use serde_json::Value;

use dialplane_types::{Condition, ConditionOperator};

/// Walk a dotted path into the payload.
pub fn lookup_path<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = payload;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

pub fn all_pass(conditions: &[Condition], payload: &Value) -> bool {
    conditions.iter().all(|c| evaluate(c, payload))
}

pub fn evaluate(condition: &Condition, payload: &Value) -> bool {
    let Some(actual) = lookup_path(payload, &condition.field) else {
        return false;
    };
    if actual.is_null() {
        return false;
    }

    let expected = &condition.value;
    match condition.operator {
        ConditionOperator::Eq => loose_eq(actual, expected),
        ConditionOperator::NotEq => !loose_eq(actual, expected),
        ConditionOperator::Gt => compare(actual, expected, |ord| ord > 0.0),
        ConditionOperator::Lt => compare(actual, expected, |ord| ord < 0.0),
        ConditionOperator::Gte => compare(actual, expected, |ord| ord >= 0.0),
        ConditionOperator::Lte => compare(actual, expected, |ord| ord <= 0.0),
        ConditionOperator::Contains => contains(actual, expected),
        ConditionOperator::NotContains => {
            // only meaningful for containers; scalars fail outright
            matches!(actual, Value::String(_) | Value::Array(_)) && !contains(actual, expected)
        }
    }
}

/// Equality with number/string coercion: `"5" == 5` holds, matching how
/// CRM payloads stringify everything.
fn loose_eq(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        },
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn compare(actual: &Value, expected: &Value, check: impl Fn(f64) -> bool) -> bool {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => check(a - b),
        _ => false,
    }
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::String(haystack) => match expected.as_str() {
            Some(needle) => haystack.to_lowercase().contains(&needle.to_lowercase()),
            None => false,
        },
        Value::Array(items) => items.iter().any(|item| loose_eq(item, expected)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond(field: &str, operator: ConditionOperator, value: Value) -> Condition {
        Condition {
            field: field.into(),
            operator,
            value,
        }
    }

    fn payload() -> Value {
        json!({
            "status": "completed",
            "duration_secs": 95,
            "sentiment": "positive",
            "topics": ["pricing", "booking"],
            "transcript": "I would like to book an appointment",
            "metadata": {
                "contact_id": "c-123",
                "score": "7"
            },
            "ended_at": null
        })
    }

    #[test]
    fn dotted_paths_resolve() {
        let p = payload();
        assert_eq!(
            lookup_path(&p, "metadata.contact_id").unwrap(),
            &json!("c-123")
        );
        assert_eq!(lookup_path(&p, "topics.0").unwrap(), &json!("pricing"));
        assert!(lookup_path(&p, "metadata.missing").is_none());
        assert!(lookup_path(&p, "status.deeper").is_none());
    }

    #[test]
    fn missing_fields_fail_every_operator() {
        let p = payload();
        for operator in [
            ConditionOperator::Eq,
            ConditionOperator::NotEq,
            ConditionOperator::Gt,
            ConditionOperator::Contains,
            ConditionOperator::NotContains,
        ] {
            assert!(
                !evaluate(&cond("nope.nothing", operator, json!("x")), &p),
                "{:?} passed on a missing field",
                operator
            );
        }
        // explicit null behaves like absent
        assert!(!evaluate(
            &cond("ended_at", ConditionOperator::Eq, json!(null)),
            &p
        ));
    }

    #[test]
    fn numeric_comparisons_coerce_strings() {
        let p = payload();
        assert!(evaluate(
            &cond("duration_secs", ConditionOperator::Gt, json!(60)),
            &p
        ));
        assert!(evaluate(
            &cond("duration_secs", ConditionOperator::Lte, json!("95")),
            &p
        ));
        assert!(evaluate(
            &cond("metadata.score", ConditionOperator::Gte, json!(7)),
            &p
        ));
        assert!(!evaluate(
            &cond("status", ConditionOperator::Gt, json!(1)),
            &p
        ));
    }

    #[test]
    fn contains_on_strings_and_arrays() {
        let p = payload();
        assert!(evaluate(
            &cond("transcript", ConditionOperator::Contains, json!("book an")),
            &p
        ));
        assert!(evaluate(
            &cond("topics", ConditionOperator::Contains, json!("pricing")),
            &p
        ));
        assert!(evaluate(
            &cond("topics", ConditionOperator::NotContains, json!("refund")),
            &p
        ));
        assert!(!evaluate(
            &cond("duration_secs", ConditionOperator::Contains, json!("9")),
            &p
        ));
    }

    #[test]
    fn and_semantics() {
        let p = payload();
        let pass = vec![
            cond("status", ConditionOperator::Eq, json!("completed")),
            cond("duration_secs", ConditionOperator::Gt, json!(30)),
        ];
        assert!(all_pass(&pass, &p));

        let fail = vec![
            cond("status", ConditionOperator::Eq, json!("completed")),
            cond("duration_secs", ConditionOperator::Gt, json!(1000)),
        ];
        assert!(!all_pass(&fail, &p));

        assert!(all_pass(&[], &p));
    }
}
