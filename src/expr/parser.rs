//! Parses expression source into an [`Expr`] tree via the PEG grammar in
//! `grammar.pest`.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use super::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::ExprError;

#[derive(Parser)]
#[grammar = "expr/grammar.pest"]
struct ExprParser;

/// Parse a single expression. Trailing garbage after a complete expression is
/// a parse error (the grammar anchors on `EOI`).
pub fn parse(src: &str) -> Result<Expr, ExprError> {
    let mut pairs = ExprParser::parse(Rule::program, src).map_err(|e| ExprError::Parse {
        src: src.to_string(),
        reason: e.to_string(),
    })?;
    let program_pair = pairs.next().ok_or_else(|| ExprError::Parse {
        src: src.to_string(),
        reason: "empty parse".to_string(),
    })?;
    let expr_pair = program_pair
        .into_inner()
        .find(|p| p.as_rule() == Rule::expr)
        .ok_or_else(|| ExprError::Parse {
            src: src.to_string(),
            reason: "missing expression body".to_string(),
        })?;
    Ok(build(expr_pair))
}

fn build(pair: Pair<Rule>) -> Expr {
    match pair.as_rule() {
        Rule::expr => build(pair.into_inner().next().expect("expr wraps or_expr")),
        Rule::or_expr
        | Rule::and_expr
        | Rule::equality_expr
        | Rule::relational_expr
        | Rule::additive_expr
        | Rule::multiplicative_expr => build_chain(pair),
        Rule::unary_expr => build_unary(pair),
        Rule::primary => build(pair.into_inner().next().expect("primary wraps one alternative")),
        Rule::function_call => build_call(pair),
        Rule::literal => build(pair.into_inner().next().expect("literal wraps one alternative")),
        Rule::identifier => Expr::Var(pair.as_str().to_string()),
        Rule::int => Expr::Int(pair.as_str().parse().expect("int grammar guarantees digits")),
        Rule::float => Expr::Float(pair.as_str().parse().expect("float grammar guarantees a decimal")),
        Rule::string => {
            let inner = pair.into_inner().next().expect("string wraps string_inner");
            Expr::Str(inner.as_str().to_string())
        }
        Rule::boolean => Expr::Bool(pair.as_str() == "true"),
        other => unreachable!("unexpected rule in expression tree: {other:?}"),
    }
}

/// Fold a `operand (op operand)*` chain into a left-associative binary tree.
fn build_chain(pair: Pair<Rule>) -> Expr {
    let mut inner = pair.into_inner();
    let first = inner.next().expect("chain rule always has a left operand");
    let mut expr = build(first);
    while let Some(op_pair) = inner.next() {
        let rhs_pair = inner.next().expect("binary operator missing right operand");
        let op = binary_op(&op_pair);
        expr = Expr::Binary(op, Box::new(expr), Box::new(build(rhs_pair)));
    }
    expr
}

fn build_unary(pair: Pair<Rule>) -> Expr {
    let mut ops = Vec::new();
    let mut primary_pair = None;
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::unary_op => {
                let inner = p.into_inner().next().expect("unary_op wraps not_op/neg_op");
                ops.push(match inner.as_rule() {
                    Rule::not_op => UnaryOp::Not,
                    Rule::neg_op => UnaryOp::Neg,
                    other => unreachable!("unexpected unary operator: {other:?}"),
                });
            }
            Rule::primary => primary_pair = Some(p),
            other => unreachable!("unexpected token in unary expression: {other:?}"),
        }
    }
    let mut expr = build(primary_pair.expect("unary_expr always contains a primary"));
    for op in ops.into_iter().rev() {
        expr = Expr::Unary(op, Box::new(expr));
    }
    expr
}

fn build_call(pair: Pair<Rule>) -> Expr {
    let mut inner = pair.into_inner();
    let name = inner
        .next()
        .expect("function_call always names a function")
        .as_str()
        .to_string();
    let args = inner.map(build).collect();
    Expr::Call(name, args)
}

fn binary_op(pair: &Pair<Rule>) -> BinaryOp {
    match pair.as_rule() {
        Rule::or_op => BinaryOp::Or,
        Rule::and_op => BinaryOp::And,
        Rule::eq_op => match pair.as_str() {
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            other => unreachable!("unexpected equality operator: {other}"),
        },
        Rule::rel_op => match pair.as_str() {
            "<=" => BinaryOp::Le,
            ">=" => BinaryOp::Ge,
            "<" => BinaryOp::Lt,
            ">" => BinaryOp::Gt,
            other => unreachable!("unexpected relational operator: {other}"),
        },
        Rule::add_op => match pair.as_str() {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            other => unreachable!("unexpected additive operator: {other}"),
        },
        Rule::mul_op => match pair.as_str() {
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            other => unreachable!("unexpected multiplicative operator: {other}"),
        },
        other => unreachable!("unexpected operator rule: {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_equality_over_field() {
        let expr = parse(r#"name == "foo""#).unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Eq,
                Box::new(Expr::Var("name".to_string())),
                Box::new(Expr::Str("foo".to_string())),
            )
        );
    }

    #[test]
    fn parses_calls_and_precedence() {
        let expr = parse("DaysAgo(created_at) > 7 && active").unwrap();
        match expr {
            Expr::Binary(BinaryOp::And, lhs, rhs) => {
                assert!(matches!(*lhs, Expr::Binary(BinaryOp::Gt, _, _)));
                assert_eq!(*rhs, Expr::Var("active".to_string()));
            }
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn parses_bare_true() {
        assert_eq!(parse("true").unwrap(), Expr::Bool(true));
    }

    #[test]
    fn parses_parens_and_unary() {
        let expr = parse("!(a == b)").unwrap();
        assert!(matches!(expr, Expr::Unary(UnaryOp::Not, _)));
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse("true true").is_err());
    }
}
