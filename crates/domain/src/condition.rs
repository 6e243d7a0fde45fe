use bureau_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison applied to one trigger context field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    /// Field equals the configured value.
    Equals,
    /// Field is absent or differs from the configured value.
    NotEquals,
    /// Field resolves to a non-null value.
    Exists,
    /// Field equals one element of the configured array.
    In,
    /// Numeric field is greater than the configured number.
    GreaterThan,
    /// Numeric field is less than the configured number.
    LessThan,
    /// String field contains the configured substring, or array field contains the value.
    Contains,
}

/// One predicate over a dot-separated trigger context path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCondition {
    /// Dot-separated path, e.g. `appointment.status`.
    pub field: String,
    /// Comparison operator.
    pub operator: ConditionOperator,
    /// Comparison value, absent only for `exists`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl FieldCondition {
    /// Validates path and operand shape.
    pub fn validate(&self) -> AppResult<()> {
        if self.field.trim().is_empty() || self.field.split('.').any(str::is_empty) {
            return Err(AppError::Validation(format!(
                "condition field '{}' must be a dot-separated path",
                self.field
            )));
        }

        match (self.operator, self.value.as_ref()) {
            (ConditionOperator::Exists, None) => Ok(()),
            (ConditionOperator::Exists, Some(_)) => Err(AppError::Validation(
                "condition operator exists does not accept a value".to_owned(),
            )),
            (_, None) => Err(AppError::Validation(format!(
                "condition on '{}' requires a value",
                self.field
            ))),
            (ConditionOperator::In, Some(value)) if !value.is_array() => Err(
                AppError::Validation("condition operator in requires an array value".to_owned()),
            ),
            (ConditionOperator::GreaterThan | ConditionOperator::LessThan, Some(value))
                if !value.is_number() =>
            {
                Err(AppError::Validation(
                    "numeric condition operators require a number value".to_owned(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Evaluates the predicate against a trigger context.
    #[must_use]
    pub fn matches(&self, context: &Value) -> bool {
        let actual = lookup_path(context, self.field.as_str()).filter(|value| !value.is_null());
        let expected = self.value.as_ref();

        match self.operator {
            ConditionOperator::Exists => actual.is_some(),
            ConditionOperator::Equals => actual.is_some() && actual == expected,
            ConditionOperator::NotEquals => actual != expected,
            ConditionOperator::In => match (actual, expected.and_then(Value::as_array)) {
                (Some(actual), Some(options)) => options.contains(actual),
                _ => false,
            },
            ConditionOperator::GreaterThan => compare_numbers(actual, expected, |a, b| a > b),
            ConditionOperator::LessThan => compare_numbers(actual, expected, |a, b| a < b),
            ConditionOperator::Contains => match (actual, expected) {
                (Some(Value::String(haystack)), Some(Value::String(needle))) => {
                    haystack.contains(needle.as_str())
                }
                (Some(Value::Array(items)), Some(needle)) => items.contains(needle),
                _ => false,
            },
        }
    }
}

fn compare_numbers(
    actual: Option<&Value>,
    expected: Option<&Value>,
    compare: impl Fn(f64, f64) -> bool,
) -> bool {
    match (
        actual.and_then(Value::as_f64),
        expected.and_then(Value::as_f64),
    ) {
        (Some(actual), Some(expected)) => compare(actual, expected),
        _ => false,
    }
}

/// Conjunction of field predicates. An empty set always matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionSet(Vec<FieldCondition>);

impl ConditionSet {
    /// Creates a validated condition set.
    pub fn new(conditions: Vec<FieldCondition>) -> AppResult<Self> {
        for condition in &conditions {
            condition.validate()?;
        }

        Ok(Self(conditions))
    }

    /// Returns the predicates.
    #[must_use]
    pub fn conditions(&self) -> &[FieldCondition] {
        &self.0
    }

    /// Returns whether no predicate is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns whether every predicate matches.
    #[must_use]
    pub fn matches(&self, context: &Value) -> bool {
        self.0.iter().all(|condition| condition.matches(context))
    }
}

/// Resolves a dot-separated path inside a JSON value.
///
/// Numeric segments index into arrays.
#[must_use]
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get(index)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ConditionOperator, ConditionSet, FieldCondition, lookup_path};

    fn condition(field: &str, operator: ConditionOperator, value: Option<serde_json::Value>) -> FieldCondition {
        FieldCondition {
            field: field.to_owned(),
            operator,
            value,
        }
    }

    #[test]
    fn lookup_path_walks_objects_and_arrays() {
        let context = json!({"appointment": {"attendees": [{"name": "Ada"}]}});
        assert_eq!(
            lookup_path(&context, "appointment.attendees.0.name"),
            Some(&json!("Ada"))
        );
        assert_eq!(lookup_path(&context, "appointment.missing"), None);
    }

    #[test]
    fn conjunction_requires_every_condition() {
        let conditions = ConditionSet::new(vec![
            condition("status", ConditionOperator::Equals, Some(json!("open"))),
            condition("amount", ConditionOperator::GreaterThan, Some(json!(100))),
        ]);
        assert!(conditions.is_ok());
        let conditions = conditions.unwrap_or_default();

        assert!(conditions.matches(&json!({"status": "open", "amount": 250})));
        assert!(!conditions.matches(&json!({"status": "open", "amount": 50})));
        assert!(!conditions.matches(&json!({"status": "closed", "amount": 250})));
    }

    #[test]
    fn empty_condition_set_matches_everything() {
        assert!(ConditionSet::default().matches(&json!(null)));
    }

    #[test]
    fn exists_ignores_null_values() {
        let exists = condition("customer.email", ConditionOperator::Exists, None);
        assert!(exists.matches(&json!({"customer": {"email": "a@b.c"}})));
        assert!(!exists.matches(&json!({"customer": {"email": null}})));
    }

    #[test]
    fn not_equals_matches_missing_field() {
        let not_equals = condition("status", ConditionOperator::NotEquals, Some(json!("done")));
        assert!(not_equals.matches(&json!({})));
        assert!(!not_equals.matches(&json!({"status": "done"})));
    }

    #[test]
    fn in_and_contains_operators() {
        let in_list = condition("priority", ConditionOperator::In, Some(json!(["high", "urgent"])));
        assert!(in_list.matches(&json!({"priority": "urgent"})));

        let contains = condition("title", ConditionOperator::Contains, Some(json!("invoice")));
        assert!(contains.matches(&json!({"title": "send invoice to ACME"})));

        let tags = condition("tags", ConditionOperator::Contains, Some(json!("vip")));
        assert!(tags.matches(&json!({"tags": ["new", "vip"]})));
    }

    #[test]
    fn invalid_operands_are_rejected() {
        assert!(condition("status", ConditionOperator::Equals, None).validate().is_err());
        assert!(
            condition("status", ConditionOperator::Exists, Some(json!(1)))
                .validate()
                .is_err()
        );
        assert!(
            condition("amount", ConditionOperator::LessThan, Some(json!("ten")))
                .validate()
                .is_err()
        );
        assert!(
            condition("a..b", ConditionOperator::Exists, None)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn conditions_deserialize_from_json_array() {
        let parsed = serde_json::from_value::<ConditionSet>(json!([
            {"field": "status", "operator": "equals", "value": "open"},
            {"field": "customer.id", "operator": "exists"}
        ]));
        assert!(matches!(parsed, Ok(ref value) if value.conditions().len() == 2));
    }
}
