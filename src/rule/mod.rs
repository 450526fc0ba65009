//! The rule model: [`Ruler`] is a closed set of three calculation styles
//! (basic/advanced/switch). A tagged enum -- rather than `dyn Ruler` trait
//! objects -- keeps the recursive `child`/`default` composition (an advanced
//! item or switch case can itself be any style of nested ruler) plain old
//! pattern matching instead of downcasting.

mod advanced;
mod basic;
mod switch;

use jsonschema::Validator;
use serde_json::Value;

pub use advanced::{AdvancedRuleCollection, AdvancedRuleItem};
pub use basic::BasicRule;
pub use switch::SwitchRule;

use crate::error::RuleError;
use crate::expr::CompileFn;
use crate::value::{normalize, Data, Payload};

/// A compiled, ready-to-evaluate rule.
#[derive(Debug, Clone)]
pub enum Ruler {
    /// A static result (`style: basic`, or no `style` at all).
    Basic(BasicRule),
    /// An ordered list of `if`/`then` items, first match wins (`style: advanced`).
    Advanced(AdvancedRuleCollection),
    /// Dispatch on a payload field's value (`style: switch`).
    Switch(SwitchRule),
}

impl Ruler {
    /// Parse a style-tagged YAML document into the matching [`Ruler`]
    /// variant. `doc` must already be key-normalized (see [`normalize`]).
    /// An absent or empty `style` field defaults to `basic`.
    pub fn from_document(doc: &Value) -> Result<Ruler, RuleError> {
        let style = doc.get("style").and_then(Value::as_str).unwrap_or("");
        match style {
            "" | "basic" => Ok(Ruler::Basic(BasicRule::from_document(doc)?)),
            "advanced" => Ok(Ruler::Advanced(AdvancedRuleCollection::from_document(doc)?)),
            "switch" => Ok(Ruler::Switch(SwitchRule::from_document(doc)?)),
            other => Err(RuleError::UnsupportedStyle(other.to_string())),
        }
    }

    /// Parse raw YAML bytes straight into a [`Ruler`].
    pub fn from_yaml(src: &[u8]) -> Result<Ruler, RuleError> {
        let raw: serde_yaml::Value = serde_yaml::from_slice(src)?;
        let doc = normalize(raw);
        Ruler::from_document(&doc)
    }

    /// Compile every embedded expression with the default, strict compiler.
    pub fn compile(&mut self) -> Result<(), RuleError> {
        self.compile_with(&crate::expr::default_compile_fn())
    }

    /// Compile every embedded expression with a caller-supplied compile
    /// function (e.g. one that permits undefined payload fields).
    pub fn compile_with(&mut self, compile_fn: &CompileFn) -> Result<(), RuleError> {
        match self {
            Ruler::Basic(r) => r.compile(),
            Ruler::Advanced(r) => r.compile_with(compile_fn),
            Ruler::Switch(r) => r.compile_with(compile_fn),
        }
    }

    /// Evaluate against a payload, producing the matched `then` data (or an
    /// empty map if nothing in the rule matched).
    pub fn calculate(&self, payload: &Payload) -> Result<Data, RuleError> {
        match self {
            Ruler::Basic(r) => Ok(r.calculate()),
            Ruler::Advanced(r) => r.calculate(payload),
            Ruler::Switch(r) => r.calculate(payload),
        }
    }

    /// Validate every reachable `then`/case result against a compiled
    /// JSON-Schema.
    pub fn validate_with_schema(&self, schema: &Validator) -> Result<(), RuleError> {
        match self {
            Ruler::Basic(r) => r.validate_with_schema(schema),
            Ruler::Advanced(r) => r.validate_with_schema(schema),
            Ruler::Switch(r) => r.validate_with_schema(schema),
        }
    }
}

pub(crate) fn validate_data_with_schema(data: &Data, schema: &Validator) -> Result<(), RuleError> {
    let instance = Value::Object(data.clone());
    let errors: Vec<String> = schema.iter_errors(&instance).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(RuleError::SchemaInvalid(errors.join("; ")))
    }
}
