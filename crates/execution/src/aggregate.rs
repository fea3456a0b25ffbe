//! Hash aggregation.
//!
//! Groups are keyed by the encoded group values (NULL is its own group) and
//! emitted in ascending natural key order, NULL keys last.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::record_batch::RecordBatch;
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use fdq_common::{FdqError, Result};
use fdq_planner::{AggExpr, Expr};
use tracing::debug;

use crate::context::TaskContext;
use crate::expressions::{compile_expr, PhysicalExpr};
use crate::scalar::{
    cmp_keys, cmp_natural, encode_group_key, scalar_from_array, scalars_to_array, ScalarValue,
};

struct AggSpec {
    expr: AggExpr,
    name: String,
    /// Compiled argument, absent for `CountAll`/`ShareOfTotal`.
    input: Option<Arc<dyn PhysicalExpr>>,
    out_type: DataType,
}

#[derive(Debug, Clone)]
enum AggState {
    Count(i64),
    SumInt(Option<i64>),
    SumFloat(Option<f64>),
    Min(Option<ScalarValue>),
    Max(Option<ScalarValue>),
    Avg { sum: f64, count: i64 },
    Ratio { matched: i64, total: i64 },
}

struct GroupEntry {
    key: Vec<ScalarValue>,
    states: Vec<AggState>,
}

type GroupMap = HashMap<Vec<u8>, GroupEntry>;

/// Aggregate `input` by `group_exprs`. With no group expressions the output
/// is exactly one row, even for empty input.
pub fn run_hash_aggregate(
    input: &RecordBatch,
    group_exprs: &[(Expr, String)],
    aggr_exprs: &[(AggExpr, String)],
    ctx: &TaskContext,
) -> Result<RecordBatch> {
    let input_schema = input.schema();
    let group_compiled = group_exprs
        .iter()
        .map(|(e, _)| compile_expr(e, &input_schema, ctx))
        .collect::<Result<Vec<_>>>()?;
    let specs = build_agg_specs(aggr_exprs, &input_schema, ctx)?;

    let mut groups: GroupMap = HashMap::new();
    accumulate_batch(&specs, &group_compiled, input, &mut groups)?;

    if group_exprs.is_empty() && groups.is_empty() {
        groups.insert(
            encode_group_key(&[]),
            GroupEntry {
                key: vec![],
                states: init_states(&specs),
            },
        );
    }
    debug!(
        rows_in = input.num_rows(),
        groups = groups.len(),
        "hash aggregate finished"
    );

    let group_fields = group_exprs
        .iter()
        .zip(&group_compiled)
        .map(|((_, name), c)| Field::new(name, key_type(c.data_type()), true))
        .collect::<Vec<_>>();
    build_output(groups, &specs, group_fields, input.num_rows() as i64, ctx)
}

fn key_type(dt: DataType) -> DataType {
    match dt {
        DataType::Null => DataType::Utf8,
        other => other,
    }
}

fn build_agg_specs(
    aggr_exprs: &[(AggExpr, String)],
    input_schema: &SchemaRef,
    ctx: &TaskContext,
) -> Result<Vec<AggSpec>> {
    let mut specs = Vec::with_capacity(aggr_exprs.len());
    for (expr, name) in aggr_exprs {
        let input = match expr {
            AggExpr::CountAll | AggExpr::ShareOfTotal => None,
            AggExpr::Count(e)
            | AggExpr::CountIf(e)
            | AggExpr::Sum(e)
            | AggExpr::Avg(e)
            | AggExpr::Min(e)
            | AggExpr::Max(e)
            | AggExpr::Percent(e) => Some(compile_expr(e, input_schema, ctx)?),
        };
        let in_type = input.as_ref().map(|c| c.data_type());
        let out_type = match expr {
            AggExpr::CountAll | AggExpr::Count(_) | AggExpr::CountIf(_) => DataType::Int64,
            AggExpr::Avg(_) | AggExpr::Percent(_) | AggExpr::ShareOfTotal => DataType::Float64,
            AggExpr::Sum(_) => match &in_type {
                Some(DataType::Int64) => DataType::Int64,
                Some(DataType::Float64) | Some(DataType::Null) => DataType::Float64,
                other => {
                    return Err(FdqError::Planning(format!(
                        "sum({name}) needs a numeric input, got {other:?}"
                    )))
                }
            },
            AggExpr::Min(_) | AggExpr::Max(_) => {
                key_type(in_type.clone().unwrap_or(DataType::Null))
            }
        };
        if matches!(expr, AggExpr::CountIf(_) | AggExpr::Percent(_))
            && !matches!(in_type, Some(DataType::Boolean))
        {
            return Err(FdqError::Planning(format!(
                "{name} needs a boolean predicate"
            )));
        }
        specs.push(AggSpec {
            expr: expr.clone(),
            name: name.clone(),
            input,
            out_type,
        });
    }
    Ok(specs)
}

fn init_states(specs: &[AggSpec]) -> Vec<AggState> {
    specs
        .iter()
        .map(|s| match s.expr {
            AggExpr::CountAll | AggExpr::Count(_) | AggExpr::CountIf(_) | AggExpr::ShareOfTotal => {
                AggState::Count(0)
            }
            AggExpr::Sum(_) => match s.out_type {
                DataType::Int64 => AggState::SumInt(None),
                _ => AggState::SumFloat(None),
            },
            AggExpr::Min(_) => AggState::Min(None),
            AggExpr::Max(_) => AggState::Max(None),
            AggExpr::Avg(_) => AggState::Avg { sum: 0.0, count: 0 },
            AggExpr::Percent(_) => AggState::Ratio {
                matched: 0,
                total: 0,
            },
        })
        .collect()
}

fn accumulate_batch(
    specs: &[AggSpec],
    group_exprs: &[Arc<dyn PhysicalExpr>],
    batch: &RecordBatch,
    groups: &mut GroupMap,
) -> Result<()> {
    let group_arrays = group_exprs
        .iter()
        .map(|e| e.evaluate(batch))
        .collect::<Result<Vec<_>>>()?;
    let agg_arrays = specs
        .iter()
        .map(|s| s.input.as_ref().map(|e| e.evaluate(batch)).transpose())
        .collect::<Result<Vec<Option<ArrayRef>>>>()?;

    for row in 0..batch.num_rows() {
        let key = group_arrays
            .iter()
            .map(|a| scalar_from_array(a, row))
            .collect::<Result<Vec<_>>>()?;
        let encoded_key = encode_group_key(&key);
        let state_vec = &mut groups
            .entry(encoded_key)
            .or_insert_with(|| GroupEntry {
                key,
                states: init_states(specs),
            })
            .states;
        for (idx, spec) in specs.iter().enumerate() {
            let value = match &agg_arrays[idx] {
                Some(a) => scalar_from_array(a, row)?,
                None => ScalarValue::Null,
            };
            update_state(&mut state_vec[idx], spec, value)?;
        }
    }
    Ok(())
}

fn update_state(state: &mut AggState, spec: &AggSpec, value: ScalarValue) -> Result<()> {
    match (state, &spec.expr) {
        (AggState::Count(c), AggExpr::CountAll | AggExpr::ShareOfTotal) => *c += 1,
        (AggState::Count(c), AggExpr::Count(_)) => {
            if !value.is_null() {
                *c += 1;
            }
        }
        (AggState::Count(c), AggExpr::CountIf(_)) => {
            if value == ScalarValue::Boolean(true) {
                *c += 1;
            }
        }
        (AggState::Ratio { matched, total }, _) => {
            *total += 1;
            if value == ScalarValue::Boolean(true) {
                *matched += 1;
            }
        }
        (AggState::SumInt(acc), _) => {
            if let ScalarValue::Int64(v) = value {
                let next = acc.unwrap_or(0).checked_add(v).ok_or_else(|| {
                    FdqError::Execution(format!("sum overflow in {}", spec.name))
                })?;
                *acc = Some(next);
            }
        }
        (AggState::SumFloat(acc), _) => {
            if let Some(v) = value.as_f64() {
                *acc = Some(acc.unwrap_or(0.0) + v);
            }
        }
        (AggState::Avg { sum, count }, _) => {
            if let Some(v) = value.as_f64() {
                *sum += v;
                *count += 1;
            }
        }
        (AggState::Min(cur), _) => {
            if !value.is_null()
                && cur
                    .as_ref()
                    .map_or(true, |c| cmp_natural(&value, c).is_lt())
            {
                *cur = Some(value);
            }
        }
        (AggState::Max(cur), _) => {
            if !value.is_null()
                && cur
                    .as_ref()
                    .map_or(true, |c| cmp_natural(&value, c).is_gt())
            {
                *cur = Some(value);
            }
        }
        (_, expr) => {
            return Err(FdqError::Execution(format!(
                "aggregate state mismatch for {expr:?}"
            )))
        }
    }
    Ok(())
}

fn finalize(state: &AggState, spec: &AggSpec, total_rows: i64, ctx: &TaskContext) -> ScalarValue {
    let float = |v: Option<f64>| v.map_or(ScalarValue::Null, ScalarValue::float);
    match state {
        AggState::Count(c) => match spec.expr {
            AggExpr::ShareOfTotal => float(ctx.percent(*c, total_rows)),
            _ => ScalarValue::Int64(*c),
        },
        AggState::Ratio { matched, total } => float(ctx.percent(*matched, *total)),
        AggState::SumInt(v) => v.map_or(ScalarValue::Null, ScalarValue::Int64),
        AggState::SumFloat(v) => float(*v),
        AggState::Avg { sum, count } => {
            if *count == 0 {
                ScalarValue::Null
            } else {
                ScalarValue::float(sum / *count as f64)
            }
        }
        AggState::Min(v) | AggState::Max(v) => v.clone().unwrap_or(ScalarValue::Null),
    }
}

fn build_output(
    groups: GroupMap,
    specs: &[AggSpec],
    group_fields: Vec<Field>,
    total_rows: i64,
    ctx: &TaskContext,
) -> Result<RecordBatch> {
    let mut entries = groups.into_values().collect::<Vec<_>>();
    entries.sort_by(|a, b| cmp_keys(&a.key, &b.key));

    let mut fields = group_fields;
    let mut columns = Vec::with_capacity(fields.len() + specs.len());
    for (idx, field) in fields.iter().enumerate() {
        let values = entries.iter().map(|e| e.key[idx].clone()).collect::<Vec<_>>();
        columns.push(scalars_to_array(&values, field.data_type())?);
    }
    for (idx, spec) in specs.iter().enumerate() {
        let values = entries
            .iter()
            .map(|e| finalize(&e.states[idx], spec, total_rows, ctx))
            .collect::<Vec<_>>();
        columns.push(scalars_to_array(&values, &spec.out_type)?);
        fields.push(Field::new(&spec.name, spec.out_type.clone(), true));
    }
    let schema = Arc::new(Schema::new(fields));
    RecordBatch::try_new(schema, columns)
        .map_err(|e| FdqError::Execution(format!("aggregate output failed: {e}")))
}
