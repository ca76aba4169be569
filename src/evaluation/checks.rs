//! Structural assertions over a final store snapshot.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tolerance when comparing numbers; amounts are exact to the cent.
const NUMBER_EPSILON: f64 = 1e-9;

/// An assertion about the final store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeCheck {
    /// The value at `path` inside record `id` of `table` equals `expected`.
    FieldEquals {
        /// Table name (top-level snapshot key).
        table: String,
        /// Record id.
        id: String,
        /// Dotted path inside the record, e.g. `balance.current` or `payment_history.1.amount`.
        path: String,
        /// Expected value.
        expected: Value,
    },
    /// Some record of `table` has every `matching` path equal to its value.
    EntryExists {
        /// Table name.
        table: String,
        /// Dotted path to expected value.
        matching: Map<String, Value>,
    },
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// The check.
    pub check: OutcomeCheck,
    /// Whether it held.
    pub passed: bool,
    /// What was found instead, on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl OutcomeCheck {
    /// Evaluates the check against a snapshot.
    #[must_use]
    pub fn evaluate(&self, snapshot: &Value) -> CheckResult {
        let detail = match self {
            Self::FieldEquals {
                table,
                id,
                path,
                expected,
            } => match snapshot.get(table).and_then(|t| t.get(id)) {
                None => Some(format!("{table}/{id} does not exist")),
                Some(record) => match lookup(record, path) {
                    None => Some(format!("{table}/{id} has no field {path}")),
                    Some(actual) if values_equal(actual, expected) => None,
                    Some(actual) => Some(format!("{table}/{id}.{path} is {actual}")),
                },
            },
            Self::EntryExists { table, matching } => match snapshot.get(table) {
                Some(Value::Object(rows)) => {
                    let found = rows.values().any(|record| {
                        matching.iter().all(|(path, expected)| {
                            lookup(record, path).is_some_and(|actual| values_equal(actual, expected))
                        })
                    });
                    (!found).then(|| format!("no record of {table} matches"))
                }
                _ => Some(format!("table {table} does not exist")),
            },
        };
        CheckResult {
            check: self.clone(),
            passed: detail.is_none(),
            detail,
        }
    }
}

/// Follows a dotted path through objects and arrays.
pub(crate) fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Structural equality with numbers compared by value (`100` equals `100.0`).
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() < NUMBER_EPSILON,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot() -> Value {
        json!({
            "accounts": {
                "acc_1": {"status": "frozen", "balance": {"current": 100.0}},
                "acc_2": {"status": "active", "balance": {"current": 5}}
            },
            "bookings": {
                "B1": {"payment_history": [{"payment_id": "pm_1", "amount": 250.0},
                                           {"payment_id": "pm_1", "amount": -250.0}]}
            }
        })
    }

    #[test]
    fn field_equals_follows_paths() {
        let check = OutcomeCheck::FieldEquals {
            table: "accounts".to_string(),
            id: "acc_1".to_string(),
            path: "status".to_string(),
            expected: json!("frozen"),
        };
        assert!(check.evaluate(&snapshot()).passed);

        let check = OutcomeCheck::FieldEquals {
            table: "accounts".to_string(),
            id: "acc_1".to_string(),
            path: "balance.current".to_string(),
            expected: json!(100),
        };
        assert!(check.evaluate(&snapshot()).passed);

        let check = OutcomeCheck::FieldEquals {
            table: "bookings".to_string(),
            id: "B1".to_string(),
            path: "payment_history.1.amount".to_string(),
            expected: json!(-250),
        };
        assert!(check.evaluate(&snapshot()).passed);
    }

    #[test]
    fn field_equals_reports_mismatch() {
        let check = OutcomeCheck::FieldEquals {
            table: "accounts".to_string(),
            id: "acc_2".to_string(),
            path: "status".to_string(),
            expected: json!("frozen"),
        };
        let result = check.evaluate(&snapshot());
        assert!(!result.passed);
        assert!(result.detail.unwrap().contains("active"));

        let missing = OutcomeCheck::FieldEquals {
            table: "accounts".to_string(),
            id: "acc_9".to_string(),
            path: "status".to_string(),
            expected: json!("frozen"),
        };
        assert!(!missing.evaluate(&snapshot()).passed);
    }

    #[test]
    fn entry_exists_matches_any_record() {
        let mut matching = Map::new();
        matching.insert("status".to_string(), json!("active"));
        matching.insert("balance.current".to_string(), json!(5.0));
        let check = OutcomeCheck::EntryExists {
            table: "accounts".to_string(),
            matching: matching.clone(),
        };
        assert!(check.evaluate(&snapshot()).passed);

        matching.insert("status".to_string(), json!("closed"));
        let check = OutcomeCheck::EntryExists {
            table: "accounts".to_string(),
            matching,
        };
        assert!(!check.evaluate(&snapshot()).passed);
    }

    #[test]
    fn check_deserializes_from_task_json() {
        let check: OutcomeCheck = serde_json::from_value(json!({
            "kind": "entry_exists",
            "table": "transactions",
            "matching": {"amount": -100.0, "type": "transfer"}
        }))
        .unwrap();
        assert!(matches!(check, OutcomeCheck::EntryExists { .. }));
    }
}
