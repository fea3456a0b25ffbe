//! Expression compilation and evaluation for execution operators.
//!
//! Output contract:
//! - each evaluation returns an `ArrayRef` aligned to input batch row count;
//! - numeric operands of mixed width are widened to `Float64`, a NULL literal
//!   takes the type of the other operand;
//! - division by zero yields NULL.

mod functions;

use std::sync::Arc;

use arrow::array::{
    new_null_array, Array, ArrayRef, BooleanArray, BooleanBuilder, Float64Array, Float64Builder,
    Int64Builder, StringBuilder,
};
use arrow::compute::kernels::{
    boolean::{and_kleene, not, or_kleene},
    cast::cast,
    cmp::{eq, gt, gt_eq, lt, lt_eq, neq},
    numeric::{add, mul, sub},
};
use arrow::compute::is_null;
use arrow::record_batch::RecordBatch;
use arrow_schema::{DataType, SchemaRef};
use fdq_common::{FdqError, Result};
use fdq_planner::{BinaryOp, Expr, LiteralValue, Param};

use crate::context::TaskContext;
use crate::scalar::{scalar_from_array, scalars_to_array, ScalarValue};

pub use functions::FuncExpr;

/// Executable expression for the execution engine.
///
/// - planner produces `Expr` trees naming columns
/// - execution compiles `Expr` -> `PhysicalExpr` against one input schema
/// - evaluation returns an Arrow `ArrayRef` aligned with the input batch
pub trait PhysicalExpr: Send + Sync {
    /// Static output data type of this expression.
    fn data_type(&self) -> DataType;
    /// Evaluate the expression for every row in `batch`.
    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef>;
}

/// Compile a planner expression against `input_schema`.
pub fn compile_expr(
    expr: &Expr,
    input_schema: &SchemaRef,
    ctx: &TaskContext,
) -> Result<Arc<dyn PhysicalExpr>> {
    match expr {
        Expr::Column(name) => {
            let idx = input_schema
                .fields()
                .iter()
                .position(|f| f.name() == name)
                .ok_or_else(|| FdqError::Planning(format!("unknown column: {name}")))?;
            let dt = input_schema.field(idx).data_type().clone();
            Ok(Arc::new(ColumnExpr { index: idx, dt }))
        }

        Expr::Literal(v) => Ok(Arc::new(LiteralExpr {
            v: v.clone(),
            dt: literal_type(v),
        })),

        Expr::Param(p) => {
            let v = param_value(*p, ctx);
            Ok(Arc::new(LiteralExpr {
                dt: literal_type(&v),
                v,
            }))
        }

        Expr::Not(e) => {
            let inner = boolean_operand(compile_expr(e, input_schema, ctx)?, "NOT")?;
            Ok(Arc::new(NotExpr { inner }))
        }

        Expr::IsNull(e) => {
            let inner = compile_expr(e, input_schema, ctx)?;
            Ok(Arc::new(IsNullExpr { inner }))
        }

        Expr::And(a, b) | Expr::Or(a, b) => {
            let op = if matches!(expr, Expr::And(..)) {
                BoolOp::And
            } else {
                BoolOp::Or
            };
            let left = boolean_operand(compile_expr(a, input_schema, ctx)?, "AND/OR")?;
            let right = boolean_operand(compile_expr(b, input_schema, ctx)?, "AND/OR")?;
            Ok(Arc::new(BoolBinaryExpr { left, right, op }))
        }

        Expr::BinaryOp { left, op, right } => {
            let l = compile_expr(left, input_schema, ctx)?;
            let r = compile_expr(right, input_schema, ctx)?;
            let (l, r) = if *op == BinaryOp::Divide {
                (cast_to(l, DataType::Float64)?, cast_to(r, DataType::Float64)?)
            } else {
                coerce_pair(l, r)?
            };
            let out = binary_out_type(*op, &l.data_type())?;
            Ok(Arc::new(BinaryExpr {
                left: l,
                right: r,
                op: *op,
                out,
            }))
        }

        Expr::Func { func, args } => {
            let compiled = args
                .iter()
                .map(|a| compile_expr(a, input_schema, ctx))
                .collect::<Result<Vec<_>>>()?;
            Ok(Arc::new(FuncExpr::try_new(*func, compiled, ctx)?))
        }

        Expr::Case {
            when_then,
            otherwise,
        } => {
            let mut branches = Vec::with_capacity(when_then.len());
            let mut values = Vec::with_capacity(when_then.len() + 1);
            for (w, t) in when_then {
                branches.push(boolean_operand(compile_expr(w, input_schema, ctx)?, "CASE WHEN")?);
                values.push(compile_expr(t, input_schema, ctx)?);
            }
            if let Some(o) = otherwise {
                values.push(compile_expr(o, input_schema, ctx)?);
            }
            let out = common_type(values.iter().map(|v| v.data_type()))?;
            let mut values = values
                .into_iter()
                .map(|v| cast_to(v, out.clone()))
                .collect::<Result<Vec<_>>>()?;
            let otherwise = if otherwise.is_some() { values.pop() } else { None };
            Ok(Arc::new(CaseExpr {
                branches: branches.into_iter().zip(values).collect(),
                otherwise,
                out,
            }))
        }
    }
}

/// Evaluate `expr` over `batch` in one step.
pub fn evaluate_expr(expr: &Expr, batch: &RecordBatch, ctx: &TaskContext) -> Result<ArrayRef> {
    compile_expr(expr, &batch.schema(), ctx)?.evaluate(batch)
}

// =====================
// Standard expressions
// =====================

struct ColumnExpr {
    index: usize,
    dt: DataType,
}

impl PhysicalExpr for ColumnExpr {
    fn data_type(&self) -> DataType {
        self.dt.clone()
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        Ok(batch.column(self.index).clone())
    }
}

struct LiteralExpr {
    v: LiteralValue,
    dt: DataType,
}

impl PhysicalExpr for LiteralExpr {
    fn data_type(&self) -> DataType {
        self.dt.clone()
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        literal_to_array(&self.v, batch.num_rows())
    }
}

struct CastExpr {
    inner: Arc<dyn PhysicalExpr>,
    to_type: DataType,
}

impl PhysicalExpr for CastExpr {
    fn data_type(&self) -> DataType {
        self.to_type.clone()
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let arr = self.inner.evaluate(batch)?;
        cast(&arr, &self.to_type).map_err(|e| FdqError::Execution(format!("cast failed: {e}")))
    }
}

struct NotExpr {
    inner: Arc<dyn PhysicalExpr>,
}

impl PhysicalExpr for NotExpr {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let arr = self.inner.evaluate(batch)?;
        let out = not(as_boolean(&arr, "NOT")?)
            .map_err(|e| FdqError::Execution(format!("not failed: {e}")))?;
        Ok(Arc::new(out))
    }
}

struct IsNullExpr {
    inner: Arc<dyn PhysicalExpr>,
}

impl PhysicalExpr for IsNullExpr {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let arr = self.inner.evaluate(batch)?;
        let out =
            is_null(&arr).map_err(|e| FdqError::Execution(format!("is_null failed: {e}")))?;
        Ok(Arc::new(out))
    }
}

#[derive(Clone, Copy)]
enum BoolOp {
    And,
    Or,
}

struct BoolBinaryExpr {
    left: Arc<dyn PhysicalExpr>,
    right: Arc<dyn PhysicalExpr>,
    op: BoolOp,
}

impl PhysicalExpr for BoolBinaryExpr {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let l = self.left.evaluate(batch)?;
        let r = self.right.evaluate(batch)?;
        let lb = as_boolean(&l, "AND/OR")?;
        let rb = as_boolean(&r, "AND/OR")?;

        let out = match self.op {
            BoolOp::And => and_kleene(lb, rb),
            BoolOp::Or => or_kleene(lb, rb),
        }
        .map_err(|e| FdqError::Execution(format!("boolean kernel failed: {e}")))?;

        Ok(Arc::new(out))
    }
}

struct BinaryExpr {
    left: Arc<dyn PhysicalExpr>,
    right: Arc<dyn PhysicalExpr>,
    op: BinaryOp,
    out: DataType,
}

impl PhysicalExpr for BinaryExpr {
    fn data_type(&self) -> DataType {
        self.out.clone()
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let l = self.left.evaluate(batch)?;
        let r = self.right.evaluate(batch)?;

        match self.op {
            BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Multiply => eval_arith(self.op, &l, &r),
            BinaryOp::Divide => eval_divide(&l, &r),
            BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::Lt
            | BinaryOp::LtEq
            | BinaryOp::Gt
            | BinaryOp::GtEq => eval_cmp(self.op, &l, &r),
        }
    }
}

/// First branch whose condition is true wins; no match and no ELSE is NULL.
struct CaseExpr {
    branches: Vec<(Arc<dyn PhysicalExpr>, Arc<dyn PhysicalExpr>)>,
    otherwise: Option<Arc<dyn PhysicalExpr>>,
    out: DataType,
}

impl PhysicalExpr for CaseExpr {
    fn data_type(&self) -> DataType {
        self.out.clone()
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let rows = batch.num_rows();
        let mut evaluated = Vec::with_capacity(self.branches.len());
        for (cond, value) in &self.branches {
            evaluated.push((cond.evaluate(batch)?, value.evaluate(batch)?));
        }
        let otherwise = match &self.otherwise {
            Some(o) => Some(o.evaluate(batch)?),
            None => None,
        };

        let mut out = Vec::with_capacity(rows);
        for row in 0..rows {
            let mut picked = None;
            for (cond, value) in &evaluated {
                let cond = as_boolean(cond, "CASE WHEN")?;
                if cond.is_valid(row) && cond.value(row) {
                    picked = Some(scalar_from_array(value, row)?);
                    break;
                }
            }
            let v = match (picked, &otherwise) {
                (Some(v), _) => v,
                (None, Some(o)) => scalar_from_array(o, row)?,
                (None, None) => ScalarValue::Null,
            };
            out.push(v);
        }
        scalars_to_array(&out, &self.out)
    }
}

// ------------------ helpers ------------------

fn param_value(p: Param, ctx: &TaskContext) -> LiteralValue {
    let cfg = &ctx.config;
    match p {
        Param::MinOrdersForRate => LiteralValue::Int64(cfg.min_orders_for_rate),
        Param::HighSpenderThreshold => LiteralValue::Float64(cfg.high_spender_threshold),
        Param::MediumSpenderThreshold => LiteralValue::Float64(cfg.medium_spender_threshold),
    }
}

fn literal_type(v: &LiteralValue) -> DataType {
    match v {
        LiteralValue::Int64(_) => DataType::Int64,
        LiteralValue::Float64(_) => DataType::Float64,
        LiteralValue::Utf8(_) => DataType::Utf8,
        LiteralValue::Boolean(_) => DataType::Boolean,
        LiteralValue::Null => DataType::Null,
    }
}

fn literal_to_array(v: &LiteralValue, len: usize) -> Result<ArrayRef> {
    match v {
        LiteralValue::Int64(x) => {
            let mut b = Int64Builder::with_capacity(len);
            for _ in 0..len {
                b.append_value(*x);
            }
            Ok(Arc::new(b.finish()))
        }
        LiteralValue::Float64(x) => {
            let mut b = Float64Builder::with_capacity(len);
            for _ in 0..len {
                b.append_value(*x);
            }
            Ok(Arc::new(b.finish()))
        }
        LiteralValue::Boolean(x) => {
            let mut b = BooleanBuilder::with_capacity(len);
            for _ in 0..len {
                b.append_value(*x);
            }
            Ok(Arc::new(b.finish()))
        }
        LiteralValue::Utf8(s) => {
            let mut b = StringBuilder::with_capacity(len, s.len() * len);
            for _ in 0..len {
                b.append_value(s);
            }
            Ok(Arc::new(b.finish()))
        }
        LiteralValue::Null => Ok(new_null_array(&DataType::Null, len)),
    }
}

pub(crate) fn is_numeric(dt: &DataType) -> bool {
    matches!(dt, DataType::Int64 | DataType::Float64)
}

pub(crate) fn cast_to(e: Arc<dyn PhysicalExpr>, to_type: DataType) -> Result<Arc<dyn PhysicalExpr>> {
    let from = e.data_type();
    if from == to_type {
        return Ok(e);
    }
    if from != DataType::Null && !(is_numeric(&from) && is_numeric(&to_type)) {
        return Err(FdqError::Planning(format!(
            "cannot use {from:?} where {to_type:?} is expected"
        )));
    }
    Ok(Arc::new(CastExpr { inner: e, to_type }))
}

/// Shared type of several branches: the single non-null type, `Float64` for
/// mixed numerics, `Null` when every branch is NULL.
pub(crate) fn common_type(types: impl IntoIterator<Item = DataType>) -> Result<DataType> {
    let mut out = DataType::Null;
    for t in types {
        out = match (&out, &t) {
            (_, DataType::Null) => out,
            (DataType::Null, _) => t,
            (a, b) if a == b => out,
            (a, b) if is_numeric(a) && is_numeric(b) => DataType::Float64,
            (a, b) => {
                return Err(FdqError::Planning(format!(
                    "incompatible expression types {a:?} and {b:?}"
                )))
            }
        };
    }
    Ok(out)
}

fn coerce_pair(
    l: Arc<dyn PhysicalExpr>,
    r: Arc<dyn PhysicalExpr>,
) -> Result<(Arc<dyn PhysicalExpr>, Arc<dyn PhysicalExpr>)> {
    let target = common_type([l.data_type(), r.data_type()])?;
    Ok((cast_to(l, target.clone())?, cast_to(r, target)?))
}

fn boolean_operand(e: Arc<dyn PhysicalExpr>, what: &str) -> Result<Arc<dyn PhysicalExpr>> {
    match e.data_type() {
        DataType::Boolean => Ok(e),
        DataType::Null => cast_to(e, DataType::Boolean),
        other => Err(FdqError::Planning(format!("{what} expects boolean, got {other:?}"))),
    }
}

fn as_boolean<'a>(arr: &'a ArrayRef, what: &str) -> Result<&'a BooleanArray> {
    arr.as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| FdqError::Execution(format!("{what} expects boolean")))
}

fn binary_out_type(op: BinaryOp, operand: &DataType) -> Result<DataType> {
    match op {
        BinaryOp::Eq
        | BinaryOp::NotEq
        | BinaryOp::Lt
        | BinaryOp::LtEq
        | BinaryOp::Gt
        | BinaryOp::GtEq => Ok(DataType::Boolean),
        BinaryOp::Divide => Ok(DataType::Float64),
        BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Multiply => {
            if is_numeric(operand) || *operand == DataType::Null {
                Ok(operand.clone())
            } else {
                Err(FdqError::Planning(format!(
                    "arithmetic not supported for {operand:?}"
                )))
            }
        }
    }
}

fn eval_arith(op: BinaryOp, l: &ArrayRef, r: &ArrayRef) -> Result<ArrayRef> {
    if l.data_type() == &DataType::Null {
        return Ok(new_null_array(&DataType::Null, l.len()));
    }
    match op {
        BinaryOp::Plus => add(l, r),
        BinaryOp::Minus => sub(l, r),
        BinaryOp::Multiply => mul(l, r),
        other => {
            return Err(FdqError::Execution(format!(
                "{other:?} is not an arithmetic operator"
            )))
        }
    }
    .map_err(|e| FdqError::Execution(format!("arith kernel failed: {e}")))
}

fn eval_divide(l: &ArrayRef, r: &ArrayRef) -> Result<ArrayRef> {
    let la = l
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| FdqError::Execution("expected Float64 array".to_string()))?;
    let ra = r
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| FdqError::Execution("expected Float64 array".to_string()))?;
    let out: Float64Array = la
        .iter()
        .zip(ra.iter())
        .map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) if b != 0.0 => Some(a / b),
            _ => None,
        })
        .collect();
    Ok(Arc::new(out))
}

fn eval_cmp(op: BinaryOp, l: &ArrayRef, r: &ArrayRef) -> Result<ArrayRef> {
    if l.data_type() == &DataType::Null {
        return Ok(new_null_array(&DataType::Boolean, l.len()));
    }
    let res = match op {
        BinaryOp::Eq => eq(l, r),
        BinaryOp::NotEq => neq(l, r),
        BinaryOp::Lt => lt(l, r),
        BinaryOp::LtEq => lt_eq(l, r),
        BinaryOp::Gt => gt(l, r),
        BinaryOp::GtEq => gt_eq(l, r),
        other => {
            return Err(FdqError::Execution(format!(
                "{other:?} is not a comparison operator"
            )))
        }
    }
    .map_err(|e| FdqError::Execution(format!("cmp kernel failed: {e}")))?;
    Ok(Arc::new(res))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow_schema::{Field, Schema};
    use fdq_planner::expr::{col, div, eq, func, gt_eq, is_cancelled, lit_f64, lit_str, param};
    use fdq_planner::{Expr, ScalarFunc};

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("n", DataType::Int64, true),
            Field::new("x", DataType::Float64, true),
            Field::new("s", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![Some(4), Some(0), None])),
                Arc::new(Float64Array::from(vec![Some(2.0), Some(3.5), Some(1.0)])),
                Arc::new(StringArray::from(vec![Some("Cancelled"), Some("delivered"), None])),
            ],
        )
        .expect("batch")
    }

    fn eval(e: &Expr) -> ArrayRef {
        evaluate_expr(e, &batch(), &TaskContext::default()).expect("evaluate")
    }

    #[test]
    fn mixed_numeric_comparison_widens() {
        let out = eval(&gt_eq(col("n"), col("x")));
        let out = out.as_any().downcast_ref::<BooleanArray>().expect("bool");
        assert!(out.value(0));
        assert!(!out.value(1));
        assert!(out.is_null(2));
    }

    #[test]
    fn division_by_zero_is_null() {
        let out = eval(&div(col("x"), col("n")));
        let out = out.as_any().downcast_ref::<Float64Array>().expect("f64");
        assert_eq!(out.value(0), 0.5);
        assert!(out.is_null(1));
        assert!(out.is_null(2));
    }

    #[test]
    fn status_match_is_case_insensitive() {
        let out = eval(&is_cancelled());
        let out = out.as_any().downcast_ref::<BooleanArray>().expect("bool");
        assert!(out.value(0));
        assert!(!out.value(1));
        assert!(out.is_null(2));
    }

    #[test]
    fn case_picks_first_true_branch() {
        let e = Expr::Case {
            when_then: vec![
                (gt_eq(col("x"), lit_f64(3.0)), lit_str("big")),
                (gt_eq(col("x"), lit_f64(2.0)), lit_str("mid")),
            ],
            otherwise: None,
        };
        let out = eval(&e);
        let out = out.as_any().downcast_ref::<StringArray>().expect("utf8");
        assert_eq!(out.value(0), "mid");
        assert_eq!(out.value(1), "big");
        assert!(out.is_null(2));
    }

    #[test]
    fn params_bind_engine_config() {
        let out = eval(&gt_eq(col("n"), param(Param::MinOrdersForRate)));
        let out = out.as_any().downcast_ref::<BooleanArray>().expect("bool");
        assert!(!out.value(0));
    }

    #[test]
    fn unknown_column_and_bad_types_fail_to_compile() {
        let schema = batch().schema();
        let ctx = TaskContext::default();
        assert!(matches!(
            compile_expr(&col("missing"), &schema, &ctx),
            Err(FdqError::Planning(_))
        ));
        assert!(compile_expr(&eq(col("s"), col("n")), &schema, &ctx).is_err());
        assert!(compile_expr(&func(ScalarFunc::Lower, col("s")), &schema, &ctx).is_ok());
    }
}
