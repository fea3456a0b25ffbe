//! Row-level scalar functions, including the derived categorizations.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::compute::kernels::zip::zip;
use arrow::compute::{cast, is_not_null};
use arrow::record_batch::RecordBatch;
use arrow_schema::DataType;
use chrono::Datelike;
use fdq_common::{FdqError, HourWindow, Result};
use fdq_planner::ScalarFunc;

use super::{cast_to, common_type, PhysicalExpr};
use crate::context::TaskContext;
use crate::derive;
use crate::scalar::round_to;

pub struct FuncExpr {
    func: ScalarFunc,
    args: Vec<Arc<dyn PhysicalExpr>>,
    out: DataType,
    peak_windows: Vec<HourWindow>,
    delayed_threshold_min: f64,
    money_decimals: u32,
}

impl FuncExpr {
    pub fn try_new(
        func: ScalarFunc,
        args: Vec<Arc<dyn PhysicalExpr>>,
        ctx: &TaskContext,
    ) -> Result<Self> {
        let arity_ok = match func {
            ScalarFunc::Coalesce => !args.is_empty(),
            _ => args.len() == 1,
        };
        if !arity_ok {
            return Err(FdqError::Planning(format!(
                "{func:?} called with {} arguments",
                args.len()
            )));
        }
        let (args, out) = match func {
            ScalarFunc::Coalesce => {
                let out = common_type(args.iter().map(|a| a.data_type()))?;
                let args = args
                    .into_iter()
                    .map(|a| cast_to(a, out.clone()))
                    .collect::<Result<Vec<_>>>()?;
                (args, out)
            }
            ScalarFunc::YearMonth
            | ScalarFunc::WeekdayName
            | ScalarFunc::DayType
            | ScalarFunc::AgeGroup
            | ScalarFunc::DistanceBucket
            | ScalarFunc::DeliveryPerformance
            | ScalarFunc::DeliverySpeed
            | ScalarFunc::Lower => (args, DataType::Utf8),
            ScalarFunc::Year | ScalarFunc::Month | ScalarFunc::Hour => (args, DataType::Int64),
            ScalarFunc::IsPeakHour => (args, DataType::Boolean),
            ScalarFunc::Round(_) | ScalarFunc::RoundMoney => (args, DataType::Float64),
        };
        Ok(Self {
            func,
            args,
            out,
            peak_windows: ctx.config.peak_windows.clone(),
            delayed_threshold_min: ctx.config.delayed_threshold_min,
            money_decimals: ctx.config.money_decimals,
        })
    }

    fn is_peak(&self, hour: u32) -> bool {
        self.peak_windows.iter().any(|w| w.contains(hour))
    }
}

impl PhysicalExpr for FuncExpr {
    fn data_type(&self) -> DataType {
        self.out.clone()
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let arrays = self
            .args
            .iter()
            .map(|a| a.evaluate(batch))
            .collect::<Result<Vec<_>>>()?;
        if self.func == ScalarFunc::Coalesce {
            return coalesce(arrays);
        }
        let arg = &arrays[0];
        let out: ArrayRef = match self.func {
            ScalarFunc::YearMonth => Arc::new(
                map_dates(arg, |d| Some(derive::year_month(d)))?
                    .into_iter()
                    .collect::<StringArray>(),
            ),
            ScalarFunc::Year => Arc::new(
                map_dates(arg, |d| Some(i64::from(d.year())))?
                    .into_iter()
                    .collect::<Int64Array>(),
            ),
            ScalarFunc::Month => Arc::new(
                map_dates(arg, |d| Some(i64::from(d.month())))?
                    .into_iter()
                    .collect::<Int64Array>(),
            ),
            ScalarFunc::WeekdayName => Arc::new(
                map_dates(arg, |d| Some(derive::weekday_name(d)))?
                    .into_iter()
                    .collect::<StringArray>(),
            ),
            ScalarFunc::DayType => Arc::new(
                map_dates(arg, |d| Some(derive::day_type(d)))?
                    .into_iter()
                    .collect::<StringArray>(),
            ),
            ScalarFunc::Hour => Arc::new(
                map_strings(arg, |s| derive::parse_hour(s).map(i64::from))?
                    .into_iter()
                    .collect::<Int64Array>(),
            ),
            ScalarFunc::IsPeakHour => Arc::new(
                map_strings(arg, |s| derive::parse_hour(s).map(|h| self.is_peak(h)))?
                    .into_iter()
                    .collect::<BooleanArray>(),
            ),
            ScalarFunc::Lower => Arc::new(
                map_strings(arg, |s| Some(s.to_lowercase()))?
                    .into_iter()
                    .collect::<StringArray>(),
            ),
            ScalarFunc::AgeGroup => Arc::new(
                map_floats(arg, |v| Some(derive::age_group(v)))?
                    .into_iter()
                    .collect::<StringArray>(),
            ),
            ScalarFunc::DistanceBucket => Arc::new(
                map_floats(arg, |v| Some(derive::distance_bucket(v)))?
                    .into_iter()
                    .collect::<StringArray>(),
            ),
            ScalarFunc::DeliveryPerformance => Arc::new(
                map_floats(arg, |v| {
                    Some(derive::delivery_performance(v, self.delayed_threshold_min))
                })?
                .into_iter()
                .collect::<StringArray>(),
            ),
            ScalarFunc::DeliverySpeed => Arc::new(
                map_floats(arg, |v| Some(derive::delivery_speed(v)))?
                    .into_iter()
                    .collect::<StringArray>(),
            ),
            ScalarFunc::Round(d) => Arc::new(
                map_floats(arg, |v| Some(round_to(v, d)))?
                    .into_iter()
                    .collect::<Float64Array>(),
            ),
            ScalarFunc::RoundMoney => Arc::new(
                map_floats(arg, |v| Some(round_to(v, self.money_decimals)))?
                    .into_iter()
                    .collect::<Float64Array>(),
            ),
            ScalarFunc::Coalesce => {
                return Err(FdqError::Execution("coalesce handled above".to_string()))
            }
        };
        Ok(out)
    }
}

fn to_type(arg: &ArrayRef, dt: &DataType) -> Result<ArrayRef> {
    cast(arg, dt).map_err(|e| FdqError::Execution(format!("function argument cast failed: {e}")))
}

fn map_strings<T>(arg: &ArrayRef, f: impl Fn(&str) -> Option<T>) -> Result<Vec<Option<T>>> {
    let arr = to_type(arg, &DataType::Utf8)?;
    let strings = arr
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| FdqError::Execution("expected StringArray".to_string()))?;
    Ok(strings.iter().map(|v| v.and_then(&f)).collect())
}

/// Unparsable dates map to NULL.
fn map_dates<T>(arg: &ArrayRef, f: impl Fn(chrono::NaiveDate) -> Option<T>) -> Result<Vec<Option<T>>> {
    map_strings(arg, |s| derive::parse_date(s).and_then(&f))
}

fn map_floats<T>(arg: &ArrayRef, f: impl Fn(f64) -> Option<T>) -> Result<Vec<Option<T>>> {
    let arr = to_type(arg, &DataType::Float64)?;
    let floats = arr
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| FdqError::Execution("expected Float64Array".to_string()))?;
    Ok(floats.iter().map(|v| v.and_then(&f)).collect())
}

fn coalesce(arrays: Vec<ArrayRef>) -> Result<ArrayRef> {
    let mut iter = arrays.into_iter();
    let mut acc = iter
        .next()
        .ok_or_else(|| FdqError::Execution("coalesce needs an argument".to_string()))?;
    for next in iter {
        if acc.null_count() == 0 {
            break;
        }
        let keep = is_not_null(&acc)
            .map_err(|e| FdqError::Execution(format!("coalesce failed: {e}")))?;
        acc = zip(&keep, &acc, &next)
            .map_err(|e| FdqError::Execution(format!("coalesce failed: {e}")))?;
    }
    Ok(acc)
}
