//! The embedded expression language: parse, compile once, evaluate many times
//! against an [`Environment`]. Used for `BasicRule.condition`, every
//! `AdvancedRuleItem.if`, and `TestCase` `expect` assertions.

mod ast;
mod compiler;
mod parser;
mod vm;

use std::sync::Arc;

use serde_json::Value;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use vm::{Environment, Instr};

use crate::error::ExprError;

/// A compiled program: bytecode plus the settings it was compiled with.
/// Cheap to clone (wraps an `Arc`'d instruction list) so a rule can hand the
/// same program to every concurrent evaluation.
#[derive(Debug, Clone)]
pub struct Program {
    instructions: Arc<[Instr]>,
    source: Arc<str>,
    allow_undefined: bool,
}

impl Program {
    /// The expression source this program was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Compile `src`, erroring on any identifier the grammar can parse but that
/// does not resolve to a payload field or helper call at evaluation time is
/// still fine -- this only controls whether an *unset* variable is an error.
pub fn compile(src: &str) -> Result<Program, ExprError> {
    compile_with(src, false)
}

/// Like [`compile`], but an identifier missing from the environment resolves
/// to `null` instead of raising [`ExprError::UndefinedVariable`]. Used for
/// per-key custom compile functions that intentionally tolerate sparse
/// payloads.
pub fn compile_permissive(src: &str) -> Result<Program, ExprError> {
    compile_with(src, true)
}

fn compile_with(src: &str, allow_undefined: bool) -> Result<Program, ExprError> {
    let ast = parser::parse(src)?;
    let instructions = compiler::compile(&ast);
    Ok(Program {
        instructions: instructions.into(),
        source: Arc::from(src),
        allow_undefined,
    })
}

/// Evaluate a compiled program against an environment.
pub fn run(program: &Program, env: &dyn Environment) -> Result<Value, ExprError> {
    vm::run(&program.instructions, env, program.allow_undefined)
}

/// A stored compile function: turns condition source into a [`Program`]. The
/// repository keeps one of these per rule key (or one default for the whole
/// catalogue) so callers can swap in permissive compilation, custom helper
/// namespaces, or validation-time linting without changing the VM itself.
pub type CompileFn = Arc<dyn Fn(&str) -> Result<Program, ExprError> + Send + Sync>;

/// The default [`CompileFn`]: strict compilation via [`compile`].
pub fn default_compile_fn() -> CompileFn {
    Arc::new(compile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct PayloadEnv(HashMap<String, Value>);

    impl Environment for PayloadEnv {
        fn get_var(&self, name: &str) -> Option<Value> {
            self.0.get(name).cloned()
        }

        fn call(&self, name: &str, _args: &[Value]) -> Result<Value, ExprError> {
            Err(ExprError::UndefinedFunction(name.to_string()))
        }
    }

    #[test]
    fn compiled_program_runs_against_an_environment() {
        let program = compile("age >= 18 && verified").unwrap();
        let env = PayloadEnv(HashMap::from([
            ("age".to_string(), Value::from(21)),
            ("verified".to_string(), Value::Bool(true)),
        ]));
        assert_eq!(run(&program, &env).unwrap(), Value::Bool(true));
    }

    #[test]
    fn permissive_program_tolerates_missing_fields() {
        let program = compile_permissive("missing_field == 0").unwrap();
        let env = PayloadEnv(HashMap::new());
        assert_eq!(run(&program, &env).unwrap(), Value::Bool(false));
    }

    #[test]
    fn strict_program_rejects_missing_fields() {
        let program = compile("missing_field == 0").unwrap();
        let env = PayloadEnv(HashMap::new());
        assert!(run(&program, &env).is_err());
    }

    #[test]
    fn program_is_cheap_to_clone_and_reuse() {
        let program = compile("x == 1").unwrap();
        let clone = program.clone();
        let env = PayloadEnv(HashMap::from([("x".to_string(), Value::from(1))]));
        assert_eq!(run(&program, &env).unwrap(), Value::Bool(true));
        assert_eq!(run(&clone, &env).unwrap(), Value::Bool(true));
    }
}
