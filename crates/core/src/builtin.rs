//! The closed catalog of built-in rules.

/// Every rule the engine knows without registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinRule {
    Required,
    RequiredWith,
    RequiredWithAll,
    RequiredWithout,
    RequiredWithoutAll,
    RequiredIf,
    Accepted,
    Sometimes,
    Bail,
    Confirmed,
    Same,
    Different,
    String,
    Numeric,
    Integer,
    Boolean,
    Array,
    Alpha,
    AlphaNum,
    AlphaDash,
    Email,
    Url,
    Ip,
    Regex,
    In,
    NotIn,
    Size,
    Min,
    Max,
    Between,
    Digits,
    DigitsBetween,
    Date,
    Unique,
    Exists,
}

impl BuiltinRule {
    pub const ALL: &'static [BuiltinRule] = &[
        Self::Required,
        Self::RequiredWith,
        Self::RequiredWithAll,
        Self::RequiredWithout,
        Self::RequiredWithoutAll,
        Self::RequiredIf,
        Self::Accepted,
        Self::Sometimes,
        Self::Bail,
        Self::Confirmed,
        Self::Same,
        Self::Different,
        Self::String,
        Self::Numeric,
        Self::Integer,
        Self::Boolean,
        Self::Array,
        Self::Alpha,
        Self::AlphaNum,
        Self::AlphaDash,
        Self::Email,
        Self::Url,
        Self::Ip,
        Self::Regex,
        Self::In,
        Self::NotIn,
        Self::Size,
        Self::Min,
        Self::Max,
        Self::Between,
        Self::Digits,
        Self::DigitsBetween,
        Self::Date,
        Self::Unique,
        Self::Exists,
    ];

    /// Look up a built-in by its snake_case name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|rule| rule.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::RequiredWith => "required_with",
            Self::RequiredWithAll => "required_with_all",
            Self::RequiredWithout => "required_without",
            Self::RequiredWithoutAll => "required_without_all",
            Self::RequiredIf => "required_if",
            Self::Accepted => "accepted",
            Self::Sometimes => "sometimes",
            Self::Bail => "bail",
            Self::Confirmed => "confirmed",
            Self::Same => "same",
            Self::Different => "different",
            Self::String => "string",
            Self::Numeric => "numeric",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Alpha => "alpha",
            Self::AlphaNum => "alpha_num",
            Self::AlphaDash => "alpha_dash",
            Self::Email => "email",
            Self::Url => "url",
            Self::Ip => "ip",
            Self::Regex => "regex",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Size => "size",
            Self::Min => "min",
            Self::Max => "max",
            Self::Between => "between",
            Self::Digits => "digits",
            Self::DigitsBetween => "digits_between",
            Self::Date => "date",
            Self::Unique => "unique",
            Self::Exists => "exists",
        }
    }

    /// Emptiness-testing rules run even when the field is absent or empty.
    pub fn is_implicit(self) -> bool {
        matches!(
            self,
            Self::Required
                | Self::RequiredWith
                | Self::RequiredWithAll
                | Self::RequiredWithout
                | Self::RequiredWithoutAll
                | Self::RequiredIf
                | Self::Accepted
        )
    }

    /// Rules answered by the presence verifier.
    pub fn is_presence(self) -> bool {
        matches!(self, Self::Unique | Self::Exists)
    }

    /// Rules whose message depends on the kind of value being measured.
    pub fn is_size(self) -> bool {
        matches!(self, Self::Size | Self::Min | Self::Max | Self::Between)
    }

    /// Markers that change evaluation policy but never fail.
    pub fn is_marker(self) -> bool {
        matches!(self, Self::Sometimes | Self::Bail)
    }

    pub fn min_parameters(self) -> usize {
        match self {
            Self::RequiredWith
            | Self::RequiredWithAll
            | Self::RequiredWithout
            | Self::RequiredWithoutAll
            | Self::Same
            | Self::Different
            | Self::Regex
            | Self::In
            | Self::NotIn
            | Self::Size
            | Self::Min
            | Self::Max
            | Self::Digits
            | Self::Unique
            | Self::Exists => 1,
            Self::RequiredIf | Self::Between | Self::DigitsBetween => 2,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_resolves_by_name() {
        for rule in BuiltinRule::ALL {
            assert_eq!(BuiltinRule::from_name(rule.name()), Some(*rule));
        }
    }

    #[test]
    fn unknown_name_is_none() {
        assert_eq!(BuiltinRule::from_name("frobnicate"), None);
    }

    #[test]
    fn presence_rules_are_not_implicit() {
        assert!(!BuiltinRule::Unique.is_implicit());
        assert!(BuiltinRule::Unique.is_presence());
        assert!(BuiltinRule::RequiredIf.is_implicit());
    }
}
