//! Expression builders used by the report, view, and rollup definitions.

use crate::logical_plan::{BinaryOp, Expr, LiteralValue, Param, ScalarFunc, SortExpr};

/// Builds a column-reference expression.
pub fn col(name: &str) -> Expr {
    Expr::Column(name.to_string())
}

/// Builds a `Float64` literal expression.
pub fn lit_f64(v: f64) -> Expr {
    Expr::Literal(LiteralValue::Float64(v))
}

/// Builds a UTF-8 string literal expression.
pub fn lit_str(v: &str) -> Expr {
    Expr::Literal(LiteralValue::Utf8(v.to_string()))
}

pub fn param(p: Param) -> Expr {
    Expr::Param(p)
}

fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

/// Builds an equality expression (`left = right`).
pub fn eq(left: Expr, right: Expr) -> Expr {
    binary(left, BinaryOp::Eq, right)
}

pub fn gt(left: Expr, right: Expr) -> Expr {
    binary(left, BinaryOp::Gt, right)
}

pub fn gt_eq(left: Expr, right: Expr) -> Expr {
    binary(left, BinaryOp::GtEq, right)
}

pub fn lt_eq(left: Expr, right: Expr) -> Expr {
    binary(left, BinaryOp::LtEq, right)
}

pub fn sub(left: Expr, right: Expr) -> Expr {
    binary(left, BinaryOp::Minus, right)
}

pub fn mul(left: Expr, right: Expr) -> Expr {
    binary(left, BinaryOp::Multiply, right)
}

/// Division; a zero divisor yields NULL.
pub fn div(left: Expr, right: Expr) -> Expr {
    binary(left, BinaryOp::Divide, right)
}

/// Builds a boolean AND expression.
pub fn and(left: Expr, right: Expr) -> Expr {
    Expr::And(Box::new(left), Box::new(right))
}

/// Builds a boolean OR expression.
pub fn or(left: Expr, right: Expr) -> Expr {
    Expr::Or(Box::new(left), Box::new(right))
}

pub fn not(e: Expr) -> Expr {
    Expr::Not(Box::new(e))
}

pub fn is_null(e: Expr) -> Expr {
    Expr::IsNull(Box::new(e))
}

pub fn func(func: ScalarFunc, arg: Expr) -> Expr {
    Expr::Func {
        func,
        args: vec![arg],
    }
}

pub fn coalesce(args: Vec<Expr>) -> Expr {
    Expr::Func {
        func: ScalarFunc::Coalesce,
        args,
    }
}

pub fn round_money(e: Expr) -> Expr {
    func(ScalarFunc::RoundMoney, e)
}

/// `lower(order_status) = 'cancelled'`.
pub fn is_cancelled() -> Expr {
    eq(func(ScalarFunc::Lower, col("order_status")), lit_str("cancelled"))
}

/// `lower(order_status) = 'delivered'`.
pub fn is_delivered() -> Expr {
    eq(func(ScalarFunc::Lower, col("order_status")), lit_str("delivered"))
}

pub fn asc(name: &str) -> SortExpr {
    SortExpr {
        expr: col(name),
        descending: false,
    }
}

pub fn desc(name: &str) -> SortExpr {
    SortExpr {
        expr: col(name),
        descending: true,
    }
}
