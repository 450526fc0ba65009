//! `style: basic` -- a rule whose `rule:` block is returned verbatim,
//! regardless of payload. No expression is ever compiled or evaluated.

use jsonschema::Validator;
use serde_json::Value;

use super::validate_data_with_schema;
use crate::error::RuleError;
use crate::value::{into_data, Data};

/// A static result rule.
#[derive(Debug, Clone)]
pub struct BasicRule {
    data: Data,
}

impl BasicRule {
    pub(super) fn from_document(doc: &Value) -> Result<Self, RuleError> {
        let data = doc.get("rule").cloned().map(into_data).unwrap_or_default();
        Ok(BasicRule { data })
    }

    pub(super) fn compile(&mut self) -> Result<(), RuleError> {
        Ok(())
    }

    pub(super) fn calculate(&self) -> Data {
        self.data.clone()
    }

    pub(super) fn validate_with_schema(&self, schema: &Validator) -> Result<(), RuleError> {
        validate_data_with_schema(&self.data, schema)
    }
}
