//! Built-in rule evaluation. Pure logic, no store access.
//!
//! Presence rules (`unique`, `exists`) are not handled here; the validator
//! routes them to its presence verifier.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::Value;
use validator::{ValidateEmail, ValidateIp, ValidateUrl};

use crate::builtin::BuiltinRule;
use crate::error::CoreError;
use crate::rules::Rule;
use crate::types::{is_empty_value, loosely_equal, scalar_to_string, Record};

/// Everything a built-in rule may look at.
pub(crate) struct RuleInput<'a> {
    pub field: &'a str,
    pub value: Option<&'a Value>,
    pub rule: &'a Rule,
    pub data: &'a Record,
    /// The field also carries `numeric` or `integer`.
    pub numeric: bool,
}

/// Evaluate one built-in rule. `Ok(false)` is a validation failure; `Err`
/// means the rule itself is misconfigured.
pub(crate) fn evaluate_builtin(
    builtin: BuiltinRule,
    input: &RuleInput<'_>,
) -> Result<bool, CoreError> {
    let value = input.value;
    let passed = match builtin {
        BuiltinRule::Required => has_value(value),
        BuiltinRule::RequiredWith => {
            !others(input).any(|o| has_value(input.data.get(o))) || has_value(value)
        }
        BuiltinRule::RequiredWithAll => {
            !others(input).all(|o| has_value(input.data.get(o))) || has_value(value)
        }
        BuiltinRule::RequiredWithout => {
            !others(input).any(|o| !has_value(input.data.get(o))) || has_value(value)
        }
        BuiltinRule::RequiredWithoutAll => {
            !others(input).all(|o| !has_value(input.data.get(o))) || has_value(value)
        }
        BuiltinRule::RequiredIf => evaluate_required_if(input),
        BuiltinRule::Accepted => has_value(value) && is_accepted(value),
        BuiltinRule::Sometimes | BuiltinRule::Bail => true,
        BuiltinRule::Confirmed => {
            let confirmation = format!("{}_confirmation", input.field);
            matches_other(value, input.data.get(&confirmation))
        }
        BuiltinRule::Same => matches_other(value, input.data.get(first_param(input)?)),
        BuiltinRule::Different => match (value, input.data.get(first_param(input)?)) {
            (Some(v), Some(other)) => !loosely_equal(v, other),
            _ => false,
        },
        BuiltinRule::String => value.is_some_and(Value::is_string),
        BuiltinRule::Numeric => value.is_some_and(is_numeric),
        BuiltinRule::Integer => value.is_some_and(is_integer),
        BuiltinRule::Boolean => value.is_some_and(is_boolean),
        BuiltinRule::Array => value.is_some_and(Value::is_array),
        BuiltinRule::Alpha => str_all(value, char::is_alphabetic),
        BuiltinRule::AlphaNum => str_all(value, char::is_alphanumeric),
        BuiltinRule::AlphaDash => str_all(value, |c| c.is_alphanumeric() || c == '-' || c == '_'),
        BuiltinRule::Email => scalar(value).is_some_and(|s| s.validate_email()),
        BuiltinRule::Url => scalar(value).is_some_and(|s| s.validate_url()),
        BuiltinRule::Ip => scalar(value).is_some_and(|s| s.validate_ip()),
        BuiltinRule::Regex => evaluate_regex(input)?,
        BuiltinRule::In => is_in(value, &input.rule.parameters),
        BuiltinRule::NotIn => !is_in(value, &input.rule.parameters),
        BuiltinRule::Size => {
            let size = number_param(input.rule, 0)?;
            size_of(value, input.numeric).is_some_and(|s| s == size)
        }
        BuiltinRule::Min => {
            let min = number_param(input.rule, 0)?;
            size_of(value, input.numeric).is_some_and(|s| s >= min)
        }
        BuiltinRule::Max => {
            let max = number_param(input.rule, 0)?;
            size_of(value, input.numeric).is_some_and(|s| s <= max)
        }
        BuiltinRule::Between => {
            let min = number_param(input.rule, 0)?;
            let max = number_param(input.rule, 1)?;
            size_of(value, input.numeric).is_some_and(|s| s >= min && s <= max)
        }
        BuiltinRule::Digits => {
            let len = number_param(input.rule, 0)?;
            digit_count(value).is_some_and(|n| n as f64 == len)
        }
        BuiltinRule::DigitsBetween => {
            let min = number_param(input.rule, 0)?;
            let max = number_param(input.rule, 1)?;
            digit_count(value).is_some_and(|n| (n as f64) >= min && (n as f64) <= max)
        }
        BuiltinRule::Date => scalar(value).is_some_and(|s| is_date(&s)),
        BuiltinRule::Unique | BuiltinRule::Exists => {
            return Err(CoreError::Configuration(format!(
                "rule `{}` must be evaluated against a presence verifier",
                builtin.name()
            )))
        }
    };
    Ok(passed)
}

/// Reject malformed parameters before any rule runs: unparseable numbers
/// for size-style rules and patterns that do not compile.
pub(crate) fn check_builtin_parameters(builtin: BuiltinRule, rule: &Rule) -> Result<(), CoreError> {
    rule.require_params(builtin.min_parameters())?;
    match builtin {
        BuiltinRule::Size | BuiltinRule::Min | BuiltinRule::Max | BuiltinRule::Digits => {
            number_param(rule, 0)?;
        }
        BuiltinRule::Between | BuiltinRule::DigitsBetween => {
            number_param(rule, 0)?;
            number_param(rule, 1)?;
        }
        BuiltinRule::Regex => {
            let pattern = rule.param(0).unwrap_or_default();
            compile_pattern(pattern)
                .map_err(|e| CoreError::invalid_parameter(&rule.name, e.to_string()))?;
        }
        _ => {}
    }
    Ok(())
}

/// Present and not blank. Whitespace-only strings do not satisfy `required`.
fn has_value(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(s)) => !s.trim().is_empty(),
        other => !is_empty_value(other),
    }
}

fn others<'a>(input: &'a RuleInput<'_>) -> impl Iterator<Item = &'a str> {
    input.rule.parameters.iter().map(String::as_str)
}

fn first_param<'a>(input: &'a RuleInput<'_>) -> Result<&'a str, CoreError> {
    input.rule.param(0).ok_or_else(|| CoreError::MissingParameters {
        rule: input.rule.name.clone(),
        expected: 1,
    })
}

fn evaluate_required_if(input: &RuleInput<'_>) -> bool {
    let Some(other) = input.rule.param(0) else {
        return true;
    };
    let triggered = input
        .data
        .get(other)
        .and_then(scalar_to_string)
        .is_some_and(|v| input.rule.parameters[1..].iter().any(|p| *p == v));
    !triggered || has_value(input.value)
}

fn is_accepted(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(v) => scalar_to_string(v)
            .is_some_and(|s| matches!(s.as_str(), "yes" | "on" | "1" | "true")),
        None => false,
    }
}

fn matches_other(value: Option<&Value>, other: Option<&Value>) -> bool {
    match (value, other) {
        (Some(v), Some(o)) => loosely_equal(v, o),
        _ => false,
    }
}

fn scalar(value: Option<&Value>) -> Option<String> {
    value.and_then(scalar_to_string)
}

fn str_all(value: Option<&Value>, pred: impl Fn(char) -> bool) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|s| s.chars().all(pred))
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn is_numeric(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => parse_number(s).is_some(),
        _ => false,
    }
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_i64() || n.is_u64(),
        Value::String(s) => s.trim().parse::<i64>().is_ok(),
        _ => false,
    }
}

fn is_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(_) => true,
        Value::Number(n) => matches!(n.as_i64(), Some(0 | 1)),
        Value::String(s) => matches!(s.as_str(), "0" | "1"),
        _ => false,
    }
}

fn is_in(value: Option<&Value>, allowed: &[String]) -> bool {
    scalar(value).is_some_and(|v| allowed.iter().any(|a| *a == v))
}

fn number_param(rule: &Rule, index: usize) -> Result<f64, CoreError> {
    let raw = rule.param(index).ok_or_else(|| CoreError::MissingParameters {
        rule: rule.name.clone(),
        expected: index + 1,
    })?;
    parse_number(raw)
        .ok_or_else(|| CoreError::invalid_parameter(&rule.name, format!("`{raw}` is not a number")))
}

/// Measure a value: its number for numeric fields, element count for arrays,
/// character count otherwise.
pub(crate) fn size_of(value: Option<&Value>, numeric: bool) -> Option<f64> {
    match value? {
        Value::Number(n) if numeric => n.as_f64(),
        Value::String(s) if numeric => parse_number(s),
        Value::Array(items) => Some(items.len() as f64),
        other => scalar_to_string(other).map(|s| s.chars().count() as f64),
    }
}

fn digit_count(value: Option<&Value>) -> Option<usize> {
    let s = scalar(value)?;
    (!s.is_empty() && s.chars().all(|c| c.is_ascii_digit())).then(|| s.len())
}

fn is_date(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
}

fn evaluate_regex(input: &RuleInput<'_>) -> Result<bool, CoreError> {
    let pattern = first_param(input)?;
    let re = compile_pattern(pattern)
        .map_err(|e| CoreError::invalid_parameter(&input.rule.name, e.to_string()))?;
    Ok(scalar(input.value).is_some_and(|s| re.is_match(&s)))
}

/// Compile a pattern, accepting `/body/flags` delimited form as well as a
/// bare pattern.
fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    if let Some(rest) = pattern.strip_prefix('/') {
        if let Some(end) = rest.rfind('/') {
            let (body, flags) = (&rest[..end], &rest[end + 1..]);
            let flags: String = flags.chars().filter(|c| "imsx".contains(*c)).collect();
            return if flags.is_empty() {
                Regex::new(body)
            } else {
                Regex::new(&format!("(?{flags}){body}"))
            };
        }
    }
    Regex::new(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn data(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn check(spec: &str, d: &Record, numeric: bool) -> Result<bool, CoreError> {
        let rule = Rule::parse(spec).unwrap();
        let builtin = BuiltinRule::from_name(&rule.name).unwrap();
        let input = RuleInput {
            field: "field",
            value: d.get("field"),
            rule: &rule,
            data: d,
            numeric,
        };
        evaluate_builtin(builtin, &input)
    }

    fn passes(spec: &str, value: Value) -> bool {
        check(spec, &data(&[("field", value)]), false).unwrap()
    }

    #[test]
    fn required_rejects_blank_strings() {
        assert!(passes("required", json!("x")));
        assert!(!passes("required", json!("   ")));
        assert!(!passes("required", json!([])));
        assert!(!check("required", &data(&[]), false).unwrap());
    }

    #[test]
    fn required_with_only_applies_when_other_present() {
        let d = data(&[("other", json!("set"))]);
        assert!(!check("required_with:other", &d, false).unwrap());
        assert!(check("required_with:other", &data(&[]), false).unwrap());
    }

    #[test]
    fn required_without_all() {
        assert!(!check("required_without_all:a,b", &data(&[]), false).unwrap());
        let d = data(&[("a", json!(1))]);
        assert!(check("required_without_all:a,b", &d, false).unwrap());
    }

    #[test]
    fn required_if_matches_other_value() {
        let d = data(&[("kind", json!("company"))]);
        assert!(!check("required_if:kind,company,org", &d, false).unwrap());
        let d = data(&[("kind", json!("person"))]);
        assert!(check("required_if:kind,company,org", &d, false).unwrap());
    }

    #[test]
    fn accepted_values() {
        assert!(passes("accepted", json!("yes")));
        assert!(passes("accepted", json!(true)));
        assert!(passes("accepted", json!(1)));
        assert!(!passes("accepted", json!("no")));
    }

    #[test]
    fn confirmed_compares_confirmation_field() {
        let d = data(&[("field", json!("secret")), ("field_confirmation", json!("secret"))]);
        assert!(check("confirmed", &d, false).unwrap());
        let d = data(&[("field", json!("secret"))]);
        assert!(!check("confirmed", &d, false).unwrap());
    }

    #[test]
    fn different_requires_other_to_exist() {
        let d = data(&[("field", json!("a")), ("other", json!("b"))]);
        assert!(check("different:other", &d, false).unwrap());
        let d = data(&[("field", json!("a"))]);
        assert!(!check("different:other", &d, false).unwrap());
    }

    #[test]
    fn type_rules() {
        assert!(passes("numeric", json!("12.5")));
        assert!(!passes("numeric", json!("NaN")));
        assert!(passes("integer", json!(7)));
        assert!(!passes("integer", json!(7.5)));
        assert!(passes("boolean", json!("0")));
        assert!(!passes("boolean", json!("yes")));
        assert!(passes("array", json!([1])));
        assert!(passes("string", json!("s")));
        assert!(!passes("string", json!(1)));
    }

    #[test]
    fn character_class_rules() {
        assert!(passes("alpha", json!("Zoë")));
        assert!(!passes("alpha", json!("abc1")));
        assert!(passes("alpha_num", json!("abc1")));
        assert!(passes("alpha_dash", json!("a-b_c")));
        assert!(!passes("alpha_dash", json!("a b")));
    }

    #[test]
    fn format_rules() {
        assert!(passes("email", json!("x@y.com")));
        assert!(!passes("email", json!("not-an-email")));
        assert!(passes("url", json!("https://example.com/a")));
        assert!(!passes("url", json!("example")));
        assert!(passes("ip", json!("10.0.0.1")));
        assert!(passes("ip", json!("::1")));
        assert!(!passes("ip", json!("10.0.0.300")));
        assert!(passes("date", json!("2024-02-29")));
        assert!(!passes("date", json!("2023-02-29")));
    }

    #[test]
    fn regex_accepts_delimited_patterns() {
        assert!(passes("regex:/^[a-z]+$/i", json!("Hello")));
        assert!(passes("regex:^[a-z]+$", json!("hello")));
        assert!(!passes("regex:^[a-z]+$", json!("Hello")));
    }

    #[test]
    fn invalid_regex_is_configuration_error() {
        let result = check("regex:([", &data(&[("field", json!("x"))]), false);
        assert_matches!(result, Err(CoreError::InvalidParameter { .. }));
    }

    #[test]
    fn in_and_not_in() {
        assert!(passes("in:a,b,c", json!("b")));
        assert!(!passes("in:a,b,c", json!("d")));
        assert!(passes("not_in:a,b", json!("c")));
        assert!(passes("in:1,2", json!(2)));
    }

    #[test]
    fn size_rules_measure_by_kind() {
        // Strings by character count unless the field is numeric.
        assert!(passes("min:3", json!("abc")));
        assert!(!passes("min:3", json!("ab")));
        let d = data(&[("field", json!("50"))]);
        assert!(check("min:10", &d, true).unwrap());
        assert!(!check("min:10", &d, false).unwrap());
        assert!(passes("max:2", json!([1, 2])));
        assert!(!passes("size:2", json!([1, 2, 3])));
        assert!(passes("between:2,4", json!("abc")));
    }

    #[test]
    fn non_numeric_size_parameter_is_configuration_error() {
        let result = check("min:lots", &data(&[("field", json!("x"))]), false);
        assert_matches!(result, Err(CoreError::InvalidParameter { .. }));
    }

    #[test]
    fn digits_rules() {
        assert!(passes("digits:4", json!("1234")));
        assert!(passes("digits:4", json!(1234)));
        assert!(!passes("digits:4", json!("12a4")));
        assert!(passes("digits_between:2,3", json!("123")));
        assert!(!passes("digits_between:2,3", json!("1234")));
    }

    #[test]
    fn parameters_are_checked_up_front() {
        let rule = Rule::parse("between:1").unwrap();
        assert_matches!(
            check_builtin_parameters(BuiltinRule::Between, &rule),
            Err(CoreError::MissingParameters { expected: 2, .. })
        );
        let rule = Rule::parse("max:ten").unwrap();
        assert_matches!(
            check_builtin_parameters(BuiltinRule::Max, &rule),
            Err(CoreError::InvalidParameter { .. })
        );
        let rule = Rule::parse("regex:/^ok$/").unwrap();
        assert!(check_builtin_parameters(BuiltinRule::Regex, &rule).is_ok());
    }

    #[test]
    fn presence_rules_are_rejected_here() {
        let result = check("unique:users", &data(&[("field", json!("x"))]), false);
        assert_matches!(result, Err(CoreError::Configuration(_)));
    }
}
