//! Rule specifications and the textual rule grammar.
//!
//! A field's rules may be written as `required|min:3|unique:users,email`, as a
//! list of such segments, or as structured `{ "name", "parameters" }` objects.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoreError;

/// A named check plus its string parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<String>,
}

impl Rule {
    /// Build a rule; the name is normalized to snake_case.
    pub fn new<I, S>(name: &str, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: snake_case(name.trim()),
            parameters: parameters.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse one `name` or `name:p1,p2` segment.
    pub fn parse(segment: &str) -> Result<Self, CoreError> {
        let segment = segment.trim();
        let (name, raw_params) = match segment.split_once(':') {
            Some((name, params)) => (name.trim(), Some(params)),
            None => (segment, None),
        };

        if name.is_empty() {
            return Err(CoreError::Configuration(format!(
                "rule segment `{segment}` has no rule name"
            )));
        }

        let name = snake_case(name);
        let parameters = match raw_params {
            None => Vec::new(),
            // Patterns may legitimately contain commas.
            Some(p) if name == "regex" => vec![p.to_string()],
            Some(p) => p.split(',').map(|s| s.trim().to_string()).collect(),
        };

        Ok(Self { name, parameters })
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.parameters.get(index).map(String::as_str)
    }

    /// Fail with a configuration error unless at least `count` parameters
    /// were supplied.
    pub fn require_params(&self, count: usize) -> Result<(), CoreError> {
        if self.parameters.len() < count {
            return Err(CoreError::MissingParameters {
                rule: self.name.clone(),
                expected: count,
            });
        }
        Ok(())
    }
}

impl FromStr for Rule {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rule::parse(s)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parameters.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}", self.name, self.parameters.join(","))
        }
    }
}

/// Parse a pipe-separated rule string such as `required|unique:users,email`.
///
/// Empty segments are ignored.
pub fn parse_rules(spec: &str) -> Result<Vec<Rule>, CoreError> {
    spec.split('|')
        .filter(|segment| !segment.trim().is_empty())
        .map(Rule::parse)
        .collect()
}

/// Normalize a rule name: `requiredIf` and `RequiredIf` become `required_if`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Field name to its ordered list of rules. Field order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RuleSet {
    fields: IndexMap<String, Vec<Rule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(field, "rule|rule:param")` pairs.
    pub fn from_strings<'a, I>(pairs: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut set = Self::new();
        for (field, spec) in pairs {
            set.extend_field(field, parse_rules(spec)?);
        }
        Ok(set)
    }

    /// Append rules to a field, keeping any already declared.
    pub fn extend_field(&mut self, field: &str, rules: impl IntoIterator<Item = Rule>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .extend(rules);
    }

    /// Builder-style variant of [`RuleSet::extend_field`] taking a rule string.
    pub fn with(mut self, field: &str, spec: &str) -> Result<Self, CoreError> {
        self.extend_field(field, parse_rules(spec)?);
        Ok(self)
    }

    pub fn get(&self, field: &str) -> Option<&[Rule]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    /// Whether `field` carries any of the named rules.
    pub fn has_rule(&self, field: &str, names: &[&str]) -> bool {
        self.get(field)
            .is_some_and(|rules| rules.iter().any(|r| names.contains(&r.name.as_str())))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Rule>)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Accepted shapes for one field's rules in serialized rule sets.
#[derive(Deserialize)]
#[serde(untagged)]
enum FieldRules {
    Piped(String),
    List(Vec<RuleEntry>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RuleEntry {
    Text(String),
    Structured(Rule),
}

impl<'de> Deserialize<'de> for RuleSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = IndexMap::<String, FieldRules>::deserialize(deserializer)?;
        let mut set = RuleSet::new();

        for (field, rules) in raw {
            let parsed = match rules {
                FieldRules::Piped(spec) => parse_rules(&spec).map_err(serde::de::Error::custom)?,
                FieldRules::List(entries) => entries
                    .into_iter()
                    .map(|entry| match entry {
                        RuleEntry::Text(segment) => Rule::parse(&segment),
                        RuleEntry::Structured(rule) => Ok(Rule::new(&rule.name, rule.parameters)),
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(serde::de::Error::custom)?,
            };
            set.extend_field(&field, parsed);
        }

        Ok(set)
    }
}
