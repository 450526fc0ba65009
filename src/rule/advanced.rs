//! `style: advanced` -- an ordered list of `if`/`then` items evaluated in
//! order; the first item whose `if` is truthy wins. An item may nest a
//! full sub-[`Ruler`] under `child` instead of a literal `then` block.

use jsonschema::Validator;
use serde_json::Value;

use super::{validate_data_with_schema, Ruler};
use crate::error::RuleError;
use crate::expr::{self, CompileFn, Program};
use crate::value::{into_data, is_truthy, Data, Payload};

/// A single `if: <cond>` / `then: <data>` (or `child: <ruler>`) item.
#[derive(Debug, Clone)]
pub struct AdvancedRuleItem {
    cond_src: String,
    program: Option<Program>,
    then: Option<Data>,
    child: Option<Box<Ruler>>,
}

impl AdvancedRuleItem {
    fn from_document(doc: &Value) -> Result<Self, RuleError> {
        let cond_src = doc
            .get("if")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RuleError::MalformedDocument("if condition not found in advanced rule".to_string()))?
            .to_string();

        let then = doc.get("then").cloned().map(into_data);

        let child = if then.is_none() && doc.get("child").is_some() {
            let child_doc = doc.get("child").expect("checked above");
            let style = child_doc.get("style").and_then(Value::as_str).unwrap_or("");
            if style.is_empty() {
                return Err(RuleError::MalformedDocument("missing child style".to_string()));
            }
            Some(Box::new(Ruler::from_document(child_doc)?))
        } else {
            None
        };

        Ok(AdvancedRuleItem {
            cond_src,
            program: None,
            then,
            child,
        })
    }

    fn compile_with(&mut self, compile_fn: &CompileFn) -> Result<(), RuleError> {
        self.program = Some(compile_fn(&self.cond_src)?);
        if let Some(child) = &mut self.child {
            child.compile_with(compile_fn)?;
        }
        Ok(())
    }

    /// `Some(data)` if `if` evaluated truthy; `None` to try the next item.
    fn calculate(&self, payload: &Payload) -> Result<Option<Data>, RuleError> {
        let program = self
            .program
            .as_ref()
            .expect("item must be compiled before Calculate is called");
        let output = expr::run(program, payload).map_err(RuleError::Evaluation)?;
        if !is_truthy(&output) {
            return Ok(None);
        }
        if let Some(then) = &self.then {
            return Ok(Some(then.clone()));
        }
        if let Some(child) = &self.child {
            return Ok(Some(child.calculate(payload)?));
        }
        // Neither `then` nor `child`: the item is legal but unreachable --
        // try the next item rather than matching on an empty result.
        Ok(None)
    }

    fn validate_with_schema(&self, schema: &Validator) -> Result<(), RuleError> {
        if self.then.is_none() {
            if let Some(child) = &self.child {
                return child.validate_with_schema(schema);
            }
            return Ok(());
        }
        validate_data_with_schema(self.then.as_ref().unwrap(), schema)
    }
}

/// The full ordered list of `if`/`then` items.
#[derive(Debug, Clone, Default)]
pub struct AdvancedRuleCollection {
    items: Vec<AdvancedRuleItem>,
}

impl AdvancedRuleCollection {
    pub(super) fn from_document(doc: &Value) -> Result<Self, RuleError> {
        let items = doc
            .get("rule")
            .and_then(Value::as_array)
            .ok_or_else(|| RuleError::MalformedDocument("rule list not found in advanced rule".to_string()))?
            .iter()
            .map(AdvancedRuleItem::from_document)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AdvancedRuleCollection { items })
    }

    pub(super) fn compile_with(&mut self, compile_fn: &CompileFn) -> Result<(), RuleError> {
        for item in &mut self.items {
            item.compile_with(compile_fn)?;
        }
        Ok(())
    }

    pub(super) fn calculate(&self, payload: &Payload) -> Result<Data, RuleError> {
        for item in &self.items {
            if let Some(data) = item.calculate(payload)? {
                return Ok(data);
            }
        }
        Ok(Data::new())
    }

    pub(super) fn validate_with_schema(&self, schema: &Validator) -> Result<(), RuleError> {
        let mut errors = Vec::new();
        for item in &self.items {
            if let Err(e) = item.validate_with_schema(schema) {
                errors.push(e.to_string());
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RuleError::SchemaInvalid(errors.join("; ")))
        }
    }
}
