//! Condition evaluation for decision branches
//!
//! Comparison rules:
//! - `equals` / `notEquals` compare string-coerced values
//! - `greaterThan` / `lessThan` coerce both sides to numbers; a side
//!   that is not numeric makes the comparison false
//! - `contains` is a substring test on string-coerced values (or
//!   membership when the field is an array)
//! - `matches` tests the field against a regular expression; an invalid
//!   pattern never matches
//! - any other operator counts as met

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ExecutionContext;

/// Comparison operator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    Matches,
    /// Unrecognized operator; always met
    Unknown(String),
}

impl ConditionOperator {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "notEquals",
            Self::GreaterThan => "greaterThan",
            Self::LessThan => "lessThan",
            Self::Contains => "contains",
            Self::Matches => "matches",
            Self::Unknown(op) => op,
        }
    }
}

impl From<String> for ConditionOperator {
    fn from(op: String) -> Self {
        match op.as_str() {
            "equals" => Self::Equals,
            "notEquals" => Self::NotEquals,
            "greaterThan" => Self::GreaterThan,
            "lessThan" => Self::LessThan,
            "contains" => Self::Contains,
            "matches" => Self::Matches,
            _ => Self::Unknown(op),
        }
    }
}

impl From<ConditionOperator> for String {
    fn from(op: ConditionOperator) -> Self {
        match op {
            ConditionOperator::Unknown(op) => op,
            other => other.as_str().to_string(),
        }
    }
}

/// How a list of conditions combines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionLogic {
    #[default]
    And,
    Or,
}

/// `field operator value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Evaluate against the execution context
    pub fn evaluate(&self, context: &ExecutionContext) -> bool {
        let actual = context.lookup(&self.field);
        compare(actual, &self.operator, &self.value)
    }
}

/// Evaluate a list of conditions; an empty list is met
pub fn evaluate_all(conditions: &[Condition], logic: ConditionLogic, context: &ExecutionContext) -> bool {
    match logic {
        ConditionLogic::And => conditions.iter().all(|c| c.evaluate(context)),
        ConditionLogic::Or => conditions.is_empty() || conditions.iter().any(|c| c.evaluate(context)),
    }
}

/// Apply `operator` to a (possibly missing) field value
pub fn compare(actual: Option<&Value>, operator: &ConditionOperator, expected: &Value) -> bool {
    match operator {
        ConditionOperator::Equals => loosely_equal(actual, expected),
        ConditionOperator::NotEquals => !loosely_equal(actual, expected),
        ConditionOperator::GreaterThan => to_number(actual) > to_number(Some(expected)),
        ConditionOperator::LessThan => to_number(actual) < to_number(Some(expected)),
        ConditionOperator::Contains => contains(actual, expected),
        ConditionOperator::Matches => matches_pattern(actual, expected),
        ConditionOperator::Unknown(op) => {
            log::debug!("Unrecognized operator '{}' treated as met", op);
            true
        }
    }
}

fn loosely_equal(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(actual) => to_text(actual) == to_text(expected),
    }
}

fn contains(actual: Option<&Value>, expected: &Value) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    let needle = to_text(expected);
    match actual {
        Value::Array(items) => items.iter().any(|item| to_text(item) == needle),
        other => to_text(other).contains(&needle),
    }
}

fn matches_pattern(actual: Option<&Value>, pattern: &Value) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    match Regex::new(&to_text(pattern)) {
        Ok(re) => re.is_match(&to_text(actual)),
        Err(e) => {
            log::warn!("Invalid pattern in condition: {}", e);
            false
        }
    }
}

/// String form used for comparisons
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            // 1000 and 1000.0 compare equal
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Numeric form used for ordering; NaN when not numeric
pub fn to_number(value: Option<&Value>) -> f64 {
    match value {
        None => f64::NAN,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        Some(Value::Bool(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Some(Value::Null) => 0.0,
        Some(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(vars: Value) -> ExecutionContext {
        let mut context = ExecutionContext::new("exec-test");
        if let Value::Object(map) = vars {
            for (k, v) in map {
                context.set(k, v);
            }
        }
        context
    }

    #[test]
    fn test_greater_than_coerces_strings() {
        let condition = Condition::new("amount", ConditionOperator::GreaterThan, json!("1000"));
        assert!(condition.evaluate(&ctx(json!({ "amount": 5000 }))));
        assert!(!condition.evaluate(&ctx(json!({ "amount": 100 }))));
        assert!(condition.evaluate(&ctx(json!({ "amount": "1500.50" }))));
    }

    #[test]
    fn test_nan_comparisons_are_false() {
        let gt = Condition::new("amount", ConditionOperator::GreaterThan, json!("1000"));
        let lt = Condition::new("amount", ConditionOperator::LessThan, json!("1000"));
        let context = ctx(json!({ "amount": "lots" }));
        assert!(!gt.evaluate(&context));
        assert!(!lt.evaluate(&context));
        assert!(!gt.evaluate(&ctx(json!({}))));
    }

    #[test]
    fn test_equals_is_string_coerced() {
        let condition = Condition::new("code", ConditionOperator::Equals, json!("42"));
        assert!(condition.evaluate(&ctx(json!({ "code": 42 }))));
        assert!(condition.evaluate(&ctx(json!({ "code": 42.0 }))));
        assert!(!condition.evaluate(&ctx(json!({ "code": 43 }))));

        let not_equals = Condition::new("code", ConditionOperator::NotEquals, json!("42"));
        assert!(not_equals.evaluate(&ctx(json!({ "code": "7" }))));
        assert!(not_equals.evaluate(&ctx(json!({}))));
    }

    #[test]
    fn test_contains() {
        let condition = Condition::new("diagnosis", ConditionOperator::Contains, json!("E11"));
        assert!(condition.evaluate(&ctx(json!({ "diagnosis": "E11.9 type 2 diabetes" }))));
        assert!(!condition.evaluate(&ctx(json!({ "diagnosis": "J45" }))));
        assert!(condition.evaluate(&ctx(json!({ "diagnosis": ["J45", "E11"] }))));
        assert!(!condition.evaluate(&ctx(json!({}))));
    }

    #[test]
    fn test_matches() {
        let condition = Condition::new("cpt", ConditionOperator::Matches, json!("^99[0-9]{3}$"));
        assert!(condition.evaluate(&ctx(json!({ "cpt": "99213" }))));
        assert!(!condition.evaluate(&ctx(json!({ "cpt": "12345" }))));

        let broken = Condition::new("cpt", ConditionOperator::Matches, json!("(unclosed"));
        assert!(!broken.evaluate(&ctx(json!({ "cpt": "(unclosed" }))));
    }

    #[test]
    fn test_unknown_operator_is_met() {
        let condition = Condition::new("x", ConditionOperator::from("approximately".to_string()), json!(1));
        assert!(condition.evaluate(&ctx(json!({}))));
        assert_eq!(String::from(condition.operator), "approximately");
    }

    #[test]
    fn test_logic_combination() {
        let context = ctx(json!({ "amount": 5000, "state": "CA" }));
        let big = Condition::new("amount", ConditionOperator::GreaterThan, json!(1000));
        let ny = Condition::new("state", ConditionOperator::Equals, json!("NY"));

        assert!(!evaluate_all(&[big.clone(), ny.clone()], ConditionLogic::And, &context));
        assert!(evaluate_all(&[big, ny], ConditionLogic::Or, &context));
        assert!(evaluate_all(&[], ConditionLogic::Or, &context));
    }

    #[test]
    fn test_nested_field_lookup() {
        let mut context = ExecutionContext::new("exec-test");
        context.record_output("doc", json!({ "extractedFields": { "chargedAmount": 2500 } }));
        let condition = Condition::new(
            "lastOutput.extractedFields.chargedAmount",
            ConditionOperator::GreaterThan,
            json!(2000),
        );
        assert!(condition.evaluate(&context));
    }
}
