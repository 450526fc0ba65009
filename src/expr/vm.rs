//! Stack-based virtual machine that executes a compiled [`Instr`] program
//! against an [`Environment`]. Compilation happens once per rule load;
//! `run` is the hot path, called once per incoming payload.

use serde_json::Value;

use super::ast::BinaryOp;
use crate::error::ExprError;
use crate::value::{is_truthy, value_to_string};

/// A single bytecode instruction.
#[derive(Debug, Clone)]
pub enum Instr {
    /// Push a literal value.
    Const(Value),
    /// Push the named variable, resolved through [`Environment::get_var`].
    Load(String),
    /// Pop `argc` values (in order) and invoke a named function.
    Call(String, usize),
    /// Pop one value, push its logical negation.
    Not,
    /// Pop one value, push its arithmetic negation.
    Neg,
    /// Pop two values, push the result of applying a binary operator.
    BinOp(BinaryOp),
    /// `&&` short-circuit: if the top of stack is falsy, leave it and jump to
    /// `target`; otherwise pop it and fall through to evaluate the rhs.
    JumpIfFalseOrPop(usize),
    /// `||` short-circuit: mirror image of [`Instr::JumpIfFalseOrPop`].
    JumpIfTrueOrPop(usize),
}

/// Everything a running program can read or invoke. The rule engine's
/// payload helpers (`Now`, `DaysAgo`, ...) are reached through `call`.
pub trait Environment {
    /// Resolve a bare identifier. `None` means the field is absent.
    fn get_var(&self, name: &str) -> Option<Value>;

    /// Invoke a named function with already-evaluated arguments.
    fn call(&self, name: &str, args: &[Value]) -> Result<Value, ExprError>;
}

/// Execute `program` against `env`. `allow_undefined` controls whether a
/// missing variable resolves to `null` or raises [`ExprError::UndefinedVariable`].
pub fn run(program: &[Instr], env: &dyn Environment, allow_undefined: bool) -> Result<Value, ExprError> {
    let mut stack: Vec<Value> = Vec::new();
    let mut pc = 0usize;

    while pc < program.len() {
        match &program[pc] {
            Instr::Const(v) => {
                stack.push(v.clone());
                pc += 1;
            }
            Instr::Load(name) => {
                let v = match env.get_var(name) {
                    Some(v) => v,
                    None if allow_undefined => Value::Null,
                    None => return Err(ExprError::UndefinedVariable(name.clone())),
                };
                stack.push(v);
                pc += 1;
            }
            Instr::Call(name, argc) => {
                let start = stack.len().checked_sub(*argc).expect("compiler emits balanced call arity");
                let args: Vec<Value> = stack.split_off(start);
                let result = env.call(name, &args)?;
                stack.push(result);
                pc += 1;
            }
            Instr::Not => {
                let v = stack.pop().expect("compiler emits balanced unary operand");
                stack.push(Value::Bool(!is_truthy(&v)));
                pc += 1;
            }
            Instr::Neg => {
                let v = stack.pop().expect("compiler emits balanced unary operand");
                stack.push(negate(&v)?);
                pc += 1;
            }
            Instr::BinOp(op) => {
                let rhs = stack.pop().expect("compiler emits balanced binary operands");
                let lhs = stack.pop().expect("compiler emits balanced binary operands");
                stack.push(apply_binop(*op, lhs, rhs)?);
                pc += 1;
            }
            Instr::JumpIfFalseOrPop(target) => {
                let top = stack.last().expect("compiler emits a value before a jump");
                if !is_truthy(top) {
                    pc = *target;
                } else {
                    stack.pop();
                    pc += 1;
                }
            }
            Instr::JumpIfTrueOrPop(target) => {
                let top = stack.last().expect("compiler emits a value before a jump");
                if is_truthy(top) {
                    pc = *target;
                } else {
                    stack.pop();
                    pc += 1;
                }
            }
        }
    }

    Ok(stack.pop().unwrap_or(Value::Null))
}

fn negate(value: &Value) -> Result<Value, ExprError> {
    match as_number(value)? {
        Num::Int(i) => Ok(Value::from(-i)),
        Num::Float(f) => Ok(serde_json::Number::from_f64(-f).map(Value::Number).unwrap_or(Value::Null)),
    }
}

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn to_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

fn as_number(value: &Value) -> Result<Num, ExprError> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Num::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Num::Float(f))
            } else {
                Err(ExprError::Type(format!("number out of range: {n}")))
            }
        }
        other => Err(ExprError::Type(format!("expected a number, got {other}"))),
    }
}

fn apply_binop(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, ExprError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(lhs == rhs)),
        BinaryOp::Ne => Ok(Value::Bool(lhs != rhs)),
        BinaryOp::Add if matches!(&lhs, Value::String(_)) || matches!(&rhs, Value::String(_)) => {
            Ok(Value::String(value_to_string(&lhs) + &value_to_string(&rhs)))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            numeric_binop(op, &lhs, &rhs)
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, &lhs, &rhs),
        BinaryOp::And | BinaryOp::Or => {
            unreachable!("and/or are lowered to jump instructions by the compiler")
        }
    }
}

fn numeric_binop(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, ExprError> {
    let a = as_number(lhs)?;
    let b = as_number(rhs)?;

    if let (Num::Int(x), Num::Int(y)) = (a, b) {
        if matches!(op, BinaryOp::Div | BinaryOp::Rem) && y == 0 {
            return Err(ExprError::DivisionByZero);
        }
        let result = match op {
            BinaryOp::Add => x.wrapping_add(y),
            BinaryOp::Sub => x.wrapping_sub(y),
            BinaryOp::Mul => x.wrapping_mul(y),
            BinaryOp::Div => x / y,
            BinaryOp::Rem => x % y,
            _ => unreachable!(),
        };
        return Ok(Value::from(result));
    }

    let x = a.to_f64();
    let y = b.to_f64();
    if matches!(op, BinaryOp::Div) && y == 0.0 {
        return Err(ExprError::DivisionByZero);
    }
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => x / y,
        BinaryOp::Rem => x % y,
        _ => unreachable!(),
    };
    Ok(serde_json::Number::from_f64(result).map(Value::Number).unwrap_or(Value::Null))
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, ExprError> {
    let ordering = match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => {
            let a = as_number(lhs)?.to_f64();
            let b = as_number(rhs)?.to_f64();
            a.partial_cmp(&b)
                .ok_or_else(|| ExprError::Type("cannot compare NaN".to_string()))?
        }
    };
    use std::cmp::Ordering::*;
    let result = match op {
        BinaryOp::Lt => ordering == Less,
        BinaryOp::Le => ordering != Greater,
        BinaryOp::Gt => ordering == Greater,
        BinaryOp::Ge => ordering != Less,
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::compiler::compile;
    use crate::expr::parser::parse;
    use std::collections::HashMap;

    struct MapEnv(HashMap<String, Value>);

    impl Environment for MapEnv {
        fn get_var(&self, name: &str) -> Option<Value> {
            self.0.get(name).cloned()
        }

        fn call(&self, name: &str, args: &[Value]) -> Result<Value, ExprError> {
            match name {
                "len" => Ok(Value::from(args.len() as i64)),
                other => Err(ExprError::UndefinedFunction(other.to_string())),
            }
        }
    }

    fn eval(src: &str, env: &MapEnv) -> Value {
        let ast = parse(src).unwrap();
        let code = compile(&ast);
        run(&code, env, false).unwrap()
    }

    #[test]
    fn short_circuits_and_without_calling_rhs() {
        let env = MapEnv(HashMap::from([("active".to_string(), Value::Bool(false))]));
        let ast = parse("active && missing").unwrap();
        let code = compile(&ast);
        let result = run(&code, &env, false);
        assert_eq!(result.unwrap(), Value::Bool(false));
    }

    #[test]
    fn or_short_circuits_on_truthy_left() {
        let env = MapEnv(HashMap::from([("active".to_string(), Value::Bool(true))]));
        let ast = parse("active || missing").unwrap();
        let code = compile(&ast);
        assert_eq!(run(&code, &env, false).unwrap(), Value::Bool(true));
    }

    #[test]
    fn undefined_variable_errors_by_default() {
        let env = MapEnv(HashMap::new());
        let ast = parse("missing == 1").unwrap();
        let code = compile(&ast);
        assert!(matches!(run(&code, &env, false), Err(ExprError::UndefinedVariable(_))));
    }

    #[test]
    fn undefined_variable_resolves_to_null_when_permissive() {
        let env = MapEnv(HashMap::new());
        let ast = parse("missing == null_marker").unwrap();
        let code = compile(&ast);
        let result = run(&code, &env, true).unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn integer_division_truncates() {
        let env = MapEnv(HashMap::new());
        assert_eq!(eval("7 / 2", &env), Value::from(3));
    }

    #[test]
    fn division_by_zero_errors() {
        let env = MapEnv(HashMap::new());
        let ast = parse("1 / 0").unwrap();
        let code = compile(&ast);
        assert!(matches!(run(&code, &env, false), Err(ExprError::DivisionByZero)));
    }

    #[test]
    fn string_concatenation_via_add() {
        let env = MapEnv(HashMap::new());
        assert_eq!(eval(r#""a" + "b""#, &env), Value::String("ab".to_string()));
    }

    #[test]
    fn string_concatenation_coerces_a_mixed_numeric_operand() {
        let env = MapEnv(HashMap::new());
        assert_eq!(eval(r#""foo" + 5"#, &env), Value::String("foo5".to_string()));
        assert_eq!(eval(r#"5 + "foo""#, &env), Value::String("5foo".to_string()));
    }

    #[test]
    fn calls_dispatch_to_environment() {
        let env = MapEnv(HashMap::new());
        assert_eq!(eval("len(1, 2, 3)", &env), Value::from(3));
    }
}
