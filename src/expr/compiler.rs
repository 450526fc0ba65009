//! Compiles an [`Expr`] tree into a flat [`Instr`] program. `&&`/`||` lower to
//! jump instructions so evaluation short-circuits exactly like the source
//! language -- the right-hand side of `a && b` is never reached once `a` is
//! falsy, which matters because payload helpers can fault on bad input.

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::vm::Instr;
use serde_json::Value;

/// Compile an expression tree to bytecode.
pub fn compile(expr: &Expr) -> Vec<Instr> {
    let mut code = Vec::new();
    emit(expr, &mut code);
    code
}

fn emit(expr: &Expr, code: &mut Vec<Instr>) {
    match expr {
        Expr::Int(i) => code.push(Instr::Const(Value::from(*i))),
        Expr::Float(f) => {
            let v = serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null);
            code.push(Instr::Const(v));
        }
        Expr::Str(s) => code.push(Instr::Const(Value::String(s.clone()))),
        Expr::Bool(b) => code.push(Instr::Const(Value::Bool(*b))),
        Expr::Var(name) => code.push(Instr::Load(name.clone())),
        Expr::Call(name, args) => {
            for arg in args {
                emit(arg, code);
            }
            code.push(Instr::Call(name.clone(), args.len()));
        }
        Expr::Unary(UnaryOp::Not, inner) => {
            emit(inner, code);
            code.push(Instr::Not);
        }
        Expr::Unary(UnaryOp::Neg, inner) => {
            emit(inner, code);
            code.push(Instr::Neg);
        }
        Expr::Binary(BinaryOp::And, lhs, rhs) => {
            emit(lhs, code);
            let jump_at = code.len();
            code.push(Instr::JumpIfFalseOrPop(0));
            emit(rhs, code);
            code[jump_at] = Instr::JumpIfFalseOrPop(code.len());
        }
        Expr::Binary(BinaryOp::Or, lhs, rhs) => {
            emit(lhs, code);
            let jump_at = code.len();
            code.push(Instr::JumpIfTrueOrPop(0));
            emit(rhs, code);
            code[jump_at] = Instr::JumpIfTrueOrPop(code.len());
        }
        Expr::Binary(op, lhs, rhs) => {
            emit(lhs, code);
            emit(rhs, code);
            code.push(Instr::BinOp(*op));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse;

    #[test]
    fn and_short_circuits_with_a_jump() {
        let code = compile(&parse("a && b").unwrap());
        assert!(matches!(code.last(), Some(Instr::Load(name)) if name == "b"));
        assert!(code.iter().any(|i| matches!(i, Instr::JumpIfFalseOrPop(_))));
    }

    #[test]
    fn plain_comparison_has_no_jumps() {
        let code = compile(&parse("a == 1").unwrap());
        assert!(!code.iter().any(|i| matches!(i, Instr::JumpIfFalseOrPop(_) | Instr::JumpIfTrueOrPop(_))));
    }
}
