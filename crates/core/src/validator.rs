//! Evaluates one record against one rule set.
//!
//! Every rule in the set is resolved before anything runs, so an unknown rule
//! or a malformed parameter aborts the run before any presence query is
//! issued. Rules for a field then run in declaration order:
//!
//! - non-implicit rules are skipped while the field is empty;
//! - `sometimes` skips the whole field when its key is absent;
//! - `bail` stops the field's remaining rules after its first failure.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::builtin::BuiltinRule;
use crate::error::CoreError;
use crate::evaluator::{check_builtin_parameters, evaluate_builtin, RuleInput};
use crate::extensions::{ExtensionFn, ExtensionRegistry, ReplacerFn};
use crate::failures::MessageBag;
use crate::messages::{MessageCatalog, GENERIC_MESSAGE};
use crate::presence::{is_safe_identifier, ExtraFilters, PresenceVerifier};
use crate::rules::{Rule, RuleSet};
use crate::types::{is_empty_value, scalar_to_string, Record};

static NULL_VALUE: Value = Value::Null;

/// How a rule name resolved.
#[derive(Clone)]
enum Handler {
    Builtin(BuiltinRule),
    Extension(ExtensionFn),
    Implicit(ExtensionFn),
}

impl Handler {
    /// Implicitness follows the rule name: an extension registered under
    /// `required` (or another implicit built-in name) still runs on empty values.
    fn runs_when_empty(&self, rule: &Rule) -> bool {
        match self {
            Handler::Implicit(_) => true,
            Handler::Extension(_) => {
                BuiltinRule::from_name(&rule.name).is_some_and(BuiltinRule::is_implicit)
            }
            Handler::Builtin(b) => b.is_implicit(),
        }
    }

    fn builtin(&self) -> Option<BuiltinRule> {
        match self {
            Handler::Builtin(b) => Some(*b),
            _ => None,
        }
    }
}

struct FieldPlan {
    field: String,
    steps: Vec<(Rule, Handler)>,
    sometimes: bool,
    bail: bool,
    numeric: bool,
}

pub struct Validator<'a> {
    catalog: Arc<MessageCatalog>,
    data: &'a Record,
    rules: RuleSet,
    custom_attributes: HashMap<String, String>,
    custom_messages: HashMap<String, String>,
    registry: ExtensionRegistry,
    verifier: Option<Arc<dyn PresenceVerifier>>,
    failures: MessageBag,
    failed_rules: IndexMap<String, Vec<Rule>>,
}

impl<'a> Validator<'a> {
    pub fn new(
        catalog: Arc<MessageCatalog>,
        data: &'a Record,
        rules: RuleSet,
        custom_attributes: HashMap<String, String>,
    ) -> Self {
        Self {
            catalog,
            data,
            rules,
            custom_attributes,
            custom_messages: HashMap::new(),
            registry: ExtensionRegistry::new(),
            verifier: None,
            failures: MessageBag::new(),
            failed_rules: IndexMap::new(),
        }
    }

    /// Inline messages keyed by `field.rule` or `rule`; they win over every
    /// other message source.
    pub fn set_custom_messages(&mut self, messages: HashMap<String, String>) {
        self.custom_messages = messages;
    }

    pub fn add_extensions(&mut self, extensions: HashMap<String, ExtensionFn>) {
        for (rule, extension) in extensions {
            self.registry.add_extension(&rule, extension);
        }
    }

    pub fn add_implicit_extensions(&mut self, extensions: HashMap<String, ExtensionFn>) {
        for (rule, extension) in extensions {
            self.registry.add_implicit_extension(&rule, extension);
        }
    }

    pub fn add_replacers(&mut self, replacers: HashMap<String, ReplacerFn>) {
        for (rule, replacer) in replacers {
            self.registry.add_replacer(&rule, replacer);
        }
    }

    pub fn set_fallback_messages(&mut self, messages: HashMap<String, String>) {
        self.registry.fallback_messages.clear();
        for (rule, message) in messages {
            self.registry.add_fallback_message(&rule, message);
        }
    }

    pub fn set_presence_verifier(&mut self, verifier: Arc<dyn PresenceVerifier>) {
        self.verifier = Some(verifier);
    }

    pub fn presence_verifier(&self) -> Option<&Arc<dyn PresenceVerifier>> {
        self.verifier.as_ref()
    }

    pub fn data(&self) -> &Record {
        self.data
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Messages from the most recent run.
    pub fn failures(&self) -> &MessageBag {
        &self.failures
    }

    /// Rules that failed in the most recent run, per field.
    pub fn failed_rules(&self) -> &IndexMap<String, Vec<Rule>> {
        &self.failed_rules
    }

    /// Run every rule and rebuild the failure set. Returns whether the record
    /// passed.
    pub async fn validate(&mut self) -> Result<bool, CoreError> {
        self.failures = MessageBag::new();
        self.failed_rules.clear();

        let plans = self.plan()?;
        let data = self.data;

        for plan in &plans {
            let value = data.get(&plan.field);
            if plan.sometimes && value.is_none() {
                continue;
            }

            for (rule, handler) in &plan.steps {
                if !handler.runs_when_empty(rule) && is_empty_value(value) {
                    continue;
                }

                if !self.run_rule(plan, rule, handler, value).await? {
                    self.add_failure(plan, rule, handler, value);
                    if plan.bail {
                        break;
                    }
                }
            }
        }

        Ok(self.failures.is_empty())
    }

    pub async fn passes(&mut self) -> Result<bool, CoreError> {
        self.validate().await
    }

    pub async fn fails(&mut self) -> Result<bool, CoreError> {
        Ok(!self.validate().await?)
    }

    /// Resolve every rule, failing on the first configuration problem.
    fn plan(&self) -> Result<Vec<FieldPlan>, CoreError> {
        let mut plans = Vec::with_capacity(self.rules.len());

        for (field, rules) in self.rules.iter() {
            let mut plan = FieldPlan {
                field: field.clone(),
                steps: Vec::with_capacity(rules.len()),
                sometimes: false,
                bail: false,
                numeric: self.rules.has_rule(field, &["numeric", "integer"]),
            };

            for rule in rules {
                let handler = self.resolve(rule)?;
                match handler.builtin() {
                    Some(BuiltinRule::Sometimes) => plan.sometimes = true,
                    Some(BuiltinRule::Bail) => plan.bail = true,
                    Some(builtin) => {
                        check_builtin_parameters(builtin, rule)?;
                        if builtin.is_presence() {
                            check_presence_parameters(builtin, field, rule)?;
                        }
                        plan.steps.push((rule.clone(), handler));
                    }
                    None => plan.steps.push((rule.clone(), handler)),
                }
            }

            plans.push(plan);
        }

        Ok(plans)
    }

    /// Registered extensions win over built-ins of the same name.
    fn resolve(&self, rule: &Rule) -> Result<Handler, CoreError> {
        if let Some(ext) = self.registry.implicit_extension(&rule.name) {
            return Ok(Handler::Implicit(Arc::clone(ext)));
        }
        if let Some(ext) = self.registry.extension(&rule.name) {
            return Ok(Handler::Extension(Arc::clone(ext)));
        }
        BuiltinRule::from_name(&rule.name)
            .map(Handler::Builtin)
            .ok_or_else(|| CoreError::UnknownRule {
                rule: rule.name.clone(),
            })
    }

    async fn run_rule(
        &self,
        plan: &FieldPlan,
        rule: &Rule,
        handler: &Handler,
        value: Option<&Value>,
    ) -> Result<bool, CoreError> {
        match handler {
            Handler::Extension(ext) | Handler::Implicit(ext) => Ok(ext(
                &plan.field,
                value.unwrap_or(&NULL_VALUE),
                &rule.parameters,
                self.data,
            )),
            Handler::Builtin(builtin) if builtin.is_presence() => {
                self.validate_presence(*builtin, &plan.field, rule, value).await
            }
            Handler::Builtin(builtin) => evaluate_builtin(
                *builtin,
                &RuleInput {
                    field: &plan.field,
                    value,
                    rule,
                    data: self.data,
                    numeric: plan.numeric,
                },
            ),
        }
    }

    async fn validate_presence(
        &self,
        builtin: BuiltinRule,
        field: &str,
        rule: &Rule,
        value: Option<&Value>,
    ) -> Result<bool, CoreError> {
        let verifier = self
            .verifier
            .as_ref()
            .ok_or_else(|| CoreError::MissingPresenceVerifier {
                rule: rule.name.clone(),
            })?;

        let collection = rule.param(0).unwrap_or_default();
        let column = non_empty(rule.param(1)).unwrap_or(field);

        if builtin == BuiltinRule::Unique {
            let Some(value) = value.and_then(scalar_to_string) else {
                return Ok(false);
            };
            let exclude_id = non_empty(rule.param(2));
            let id_column = non_empty(rule.param(3));
            let extra = extra_filters(rule, 4)?;

            let count = verifier
                .get_count(collection, column, &value, exclude_id, id_column, &extra)
                .await
                .inspect_err(|e| {
                    tracing::warn!(error = %e, collection, column, "Uniqueness query failed")
                })?;
            return Ok(count == 0);
        }

        let extra = extra_filters(rule, 2)?;
        let values = match value {
            Some(Value::Array(items)) => {
                let mut values: Vec<String> = Vec::with_capacity(items.len());
                for item in items {
                    let Some(v) = scalar_to_string(item) else {
                        return Ok(false);
                    };
                    if !values.contains(&v) {
                        values.push(v);
                    }
                }
                values
            }
            Some(other) => match scalar_to_string(other) {
                Some(v) => vec![v],
                None => return Ok(false),
            },
            None => return Ok(false),
        };

        all_values_exist(verifier.as_ref(), collection, column, &values, &extra)
            .await
            .inspect_err(|e| {
                tracing::warn!(error = %e, collection, column, "Existence query failed")
            })
    }

    fn add_failure(
        &mut self,
        plan: &FieldPlan,
        rule: &Rule,
        handler: &Handler,
        value: Option<&Value>,
    ) {
        let template = self.message_template(plan, rule, handler, value);
        let message = self.make_replacements(&template, &plan.field, rule);

        tracing::debug!(field = %plan.field, rule = %rule.name, "Validation rule failed");

        self.failures.add(&plan.field, message);
        self.failed_rules
            .entry(plan.field.clone())
            .or_default()
            .push(rule.clone());
    }

    /// Inline custom message, catalog `custom.<field>.<rule>`, registered
    /// fallback, catalog entry, then the generic message.
    fn message_template(
        &self,
        plan: &FieldPlan,
        rule: &Rule,
        handler: &Handler,
        value: Option<&Value>,
    ) -> String {
        let field = &plan.field;
        let name = &rule.name;

        let inline = self
            .custom_messages
            .get(&format!("{field}.{name}"))
            .or_else(|| self.custom_messages.get(name))
            .map(String::as_str);
        if let Some(message) = inline {
            return message.to_string();
        }

        if let Some(message) = self.catalog.get(&format!("custom.{field}.{name}")) {
            return message.to_string();
        }

        if let Some(message) = self.registry.fallback_message(name) {
            return message.to_string();
        }

        if handler.builtin().is_some_and(BuiltinRule::is_size) {
            let kind = if plan.numeric {
                "numeric"
            } else if matches!(value, Some(Value::Array(_))) {
                "array"
            } else {
                "string"
            };
            if let Some(message) = self.catalog.get(&format!("{name}.{kind}")) {
                return message.to_string();
            }
        }

        self.catalog
            .get(name)
            .unwrap_or(GENERIC_MESSAGE)
            .to_string()
    }

    fn make_replacements(&self, template: &str, field: &str, rule: &Rule) -> String {
        let label = self.attribute_label(field);
        let message = template
            .replace(":attribute", &label)
            .replace(":Attribute", &upper_first(&label));

        if let Some(replacer) = self.registry.replacer(&rule.name) {
            return replacer(&message, field, &rule.name, &rule.parameters);
        }

        match BuiltinRule::from_name(&rule.name) {
            Some(builtin) => self.builtin_replacements(message, builtin, rule),
            None => message,
        }
    }

    fn builtin_replacements(&self, message: String, builtin: BuiltinRule, rule: &Rule) -> String {
        let p = |i: usize| rule.param(i).unwrap_or_default();
        match builtin {
            BuiltinRule::Between | BuiltinRule::DigitsBetween => {
                message.replace(":min", p(0)).replace(":max", p(1))
            }
            BuiltinRule::Min => message.replace(":min", p(0)),
            BuiltinRule::Max => message.replace(":max", p(0)),
            BuiltinRule::Size => message.replace(":size", p(0)),
            BuiltinRule::Digits => message.replace(":digits", p(0)),
            BuiltinRule::In | BuiltinRule::NotIn => {
                message.replace(":values", &rule.parameters.join(", "))
            }
            BuiltinRule::Same | BuiltinRule::Different => {
                message.replace(":other", &self.attribute_label(p(0)))
            }
            BuiltinRule::RequiredWith
            | BuiltinRule::RequiredWithAll
            | BuiltinRule::RequiredWithout
            | BuiltinRule::RequiredWithoutAll => {
                let labels: Vec<String> = rule
                    .parameters
                    .iter()
                    .map(|other| self.attribute_label(other))
                    .collect();
                message.replace(":values", &labels.join(" / "))
            }
            BuiltinRule::RequiredIf => message
                .replace(":other", &self.attribute_label(p(0)))
                .replace(":value", p(1)),
            _ => message,
        }
    }

    /// Custom attribute, catalog `attributes.<field>`, else the field name
    /// with underscores as spaces.
    fn attribute_label(&self, field: &str) -> String {
        if let Some(label) = self.custom_attributes.get(field) {
            return label.clone();
        }
        if let Some(label) = self.catalog.attribute(field) {
            return label.to_string();
        }
        field.replace('_', " ")
    }
}

impl std::fmt::Debug for Validator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("rules", &self.rules)
            .field("registry", &self.registry)
            .field("has_verifier", &self.verifier.is_some())
            .field("failures", &self.failures)
            .finish()
    }
}

/// Every distinct value must match at least one row. The multi-count only
/// proves absence: duplicate rows for one value can make the row count
/// reach `values.len()` while another value is missing, so each value is
/// then confirmed on its own.
async fn all_values_exist(
    verifier: &dyn PresenceVerifier,
    collection: &str,
    column: &str,
    values: &[String],
    extra: &ExtraFilters,
) -> Result<bool, CoreError> {
    if let [value] = values {
        let found = verifier
            .get_count(collection, column, value, None, None, extra)
            .await?;
        return Ok(found >= 1);
    }

    let rows = verifier
        .get_multi_count(collection, column, values, extra)
        .await?;
    if rows < values.len() as i64 {
        return Ok(false);
    }

    for value in values {
        let found = verifier
            .get_count(collection, column, value, None, None, extra)
            .await?;
        if found == 0 {
            return Ok(false);
        }
    }
    Ok(true)
}

fn non_empty(param: Option<&str>) -> Option<&str> {
    param.filter(|p| !p.is_empty())
}

/// Pair up trailing `column,value` parameters starting at `start`.
fn extra_filters(rule: &Rule, start: usize) -> Result<Vec<(String, String)>, CoreError> {
    let rest = rule.parameters.get(start..).unwrap_or_default();
    if rest.len() % 2 != 0 {
        return Err(CoreError::invalid_parameter(
            &rule.name,
            "extra conditions must be column/value pairs",
        ));
    }
    Ok(rest
        .chunks(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect())
}

/// Collection, column and filter names end up in query text, so they must be
/// plain identifiers.
fn check_presence_parameters(
    builtin: BuiltinRule,
    field: &str,
    rule: &Rule,
) -> Result<(), CoreError> {
    let extra_start = match builtin {
        BuiltinRule::Unique => 4,
        _ => 2,
    };

    // The column defaults to the field name, which must then be an identifier too.
    let mut identifiers: Vec<&str> = vec![
        rule.param(0).unwrap_or_default(),
        non_empty(rule.param(1)).unwrap_or(field),
    ];
    if builtin == BuiltinRule::Unique {
        identifiers.extend(non_empty(rule.param(3)));
    }

    let extra = extra_filters(rule, extra_start)?;
    identifiers.extend(extra.iter().map(|(key, _)| key.as_str()));

    match identifiers.into_iter().find(|name| !is_safe_identifier(name)) {
        Some(bad) => Err(CoreError::invalid_parameter(
            &rule.name,
            format!("`{bad}` is not a valid collection or column name"),
        )),
        None => Ok(()),
    }
}

fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
