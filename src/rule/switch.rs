//! `style: switch` -- pick a nested ruler by the stringified value of a
//! payload field (`by`), falling back to `default` when no `case` matches.

use jsonschema::Validator;
use serde_json::Value;

use super::Ruler;
use crate::error::RuleError;
use crate::expr::CompileFn;
use crate::value::{value_to_string, Data, Payload};

#[derive(Debug, Clone)]
struct SwitchItem {
    case: String,
    ruler: Ruler,
}

/// Dispatch on `payload[by]`.
#[derive(Debug, Clone)]
pub struct SwitchRule {
    by: String,
    items: Vec<SwitchItem>,
    default: Box<Ruler>,
}

impl SwitchRule {
    pub(super) fn from_document(doc: &Value) -> Result<Self, RuleError> {
        let by = doc
            .get("by")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RuleError::MalformedDocument("by field not found in switch rule".to_string()))?
            .to_string();

        let items = doc
            .get("rule")
            .and_then(Value::as_array)
            .ok_or_else(|| RuleError::MalformedDocument("rule list not found in switch rule".to_string()))?
            .iter()
            .map(|item| {
                let case = item
                    .get("case")
                    .map(value_to_string)
                    .ok_or_else(|| RuleError::MalformedDocument("case not found in switch rule item".to_string()))?;
                let ruler = Ruler::from_document(item)?;
                Ok(SwitchItem { case, ruler })
            })
            .collect::<Result<Vec<_>, RuleError>>()?;

        let default_doc = doc
            .get("default")
            .ok_or_else(|| RuleError::MalformedDocument("default not found in switch rule".to_string()))?;
        let default = Box::new(Ruler::from_document(default_doc)?);

        Ok(SwitchRule { by, items, default })
    }

    pub(super) fn compile_with(&mut self, compile_fn: &CompileFn) -> Result<(), RuleError> {
        for item in &mut self.items {
            item.ruler.compile_with(compile_fn)?;
        }
        self.default.compile_with(compile_fn)
    }

    pub(super) fn calculate(&self, payload: &Payload) -> Result<Data, RuleError> {
        let key = payload.get(&self.by).map(value_to_string).unwrap_or_default();
        for item in &self.items {
            if item.case == key {
                return item.ruler.calculate(payload);
            }
        }
        self.default.calculate(payload)
    }

    pub(super) fn validate_with_schema(&self, schema: &Validator) -> Result<(), RuleError> {
        let mut errors = Vec::new();
        for item in &self.items {
            if let Err(e) = item.ruler.validate_with_schema(schema) {
                errors.push(e.to_string());
            }
        }
        if let Err(e) = self.default.validate_with_schema(schema) {
            errors.push(e.to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RuleError::SchemaInvalid(errors.join("; ")))
        }
    }
}
