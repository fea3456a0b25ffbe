use crate::logical_plan::{AggExpr, BinaryOp, Expr, LiteralValue, LogicalPlan, SortExpr};
use crate::views::view_plan;

/// Render logical plan as human-readable multiline text.
///
/// Views are expanded inline so the output shows every table a plan reads.
pub fn explain_logical(plan: &LogicalPlan) -> String {
    let mut s = String::new();
    fmt_plan(plan, 0, &mut s);
    s
}

fn fmt_plan(plan: &LogicalPlan, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match plan {
        LogicalPlan::Scan { table } => {
            out.push_str(&format!("{pad}Scan table={table}\n"));
        }
        LogicalPlan::View { name } => {
            out.push_str(&format!("{pad}View name={name}\n"));
            match view_plan(name) {
                Ok(expanded) => fmt_plan(&expanded, indent + 1, out),
                Err(e) => out.push_str(&format!("{pad}  <{e}>\n")),
            }
        }
        LogicalPlan::Filter { predicate, input } => {
            out.push_str(&format!("{pad}Filter {}\n", fmt_expr(predicate)));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Projection { exprs, input } => {
            out.push_str(&format!("{pad}Projection\n"));
            for (e, name) in exprs {
                out.push_str(&format!("{pad}  {name} := {}\n", fmt_expr(e)));
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Aggregate {
            group_exprs,
            aggr_exprs,
            input,
        } => {
            out.push_str(&format!("{pad}Aggregate\n"));
            out.push_str(&format!("{pad}  group_by={}\n", group_exprs.len()));
            for (g, name) in group_exprs {
                out.push_str(&format!("{pad}    {name} := {}\n", fmt_expr(g)));
            }
            out.push_str(&format!("{pad}  aggs={}\n", aggr_exprs.len()));
            for (a, name) in aggr_exprs {
                out.push_str(&format!("{pad}    {name} := {}\n", fmt_agg(a)));
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Join {
            left,
            right,
            left_key,
            right_key,
        } => {
            out.push_str(&format!("{pad}Join type=left on={left_key}={right_key}\n"));
            out.push_str(&format!("{pad}  left:\n"));
            fmt_plan(left, indent + 2, out);
            out.push_str(&format!("{pad}  right:\n"));
            fmt_plan(right, indent + 2, out);
        }
        LogicalPlan::Sort { keys, input } => {
            let keys = keys.iter().map(fmt_sort).collect::<Vec<_>>().join(", ");
            out.push_str(&format!("{pad}Sort {keys}\n"));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Limit { n, input } => {
            match n {
                Some(n) => out.push_str(&format!("{pad}Limit n={n}\n")),
                None => out.push_str(&format!("{pad}Limit n=default_top_n\n")),
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::RfmSegment { input } => {
            out.push_str(&format!("{pad}RfmSegment key=customer_id\n"));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Correlation { columns, input } => {
            out.push_str(&format!("{pad}Correlation columns={columns:?}\n"));
            fmt_plan(input, indent + 1, out);
        }
    }
}

fn fmt_sort(s: &SortExpr) -> String {
    let dir = if s.descending { "desc" } else { "asc" };
    format!("{} {dir}", fmt_expr(&s.expr))
}

fn fmt_agg(a: &AggExpr) -> String {
    match a {
        AggExpr::CountAll => "count(*)".to_string(),
        AggExpr::Count(e) => format!("count({})", fmt_expr(e)),
        AggExpr::CountIf(e) => format!("count_if({})", fmt_expr(e)),
        AggExpr::Sum(e) => format!("sum({})", fmt_expr(e)),
        AggExpr::Avg(e) => format!("avg({})", fmt_expr(e)),
        AggExpr::Min(e) => format!("min({})", fmt_expr(e)),
        AggExpr::Max(e) => format!("max({})", fmt_expr(e)),
        AggExpr::Percent(e) => format!("percent({})", fmt_expr(e)),
        AggExpr::ShareOfTotal => "share_of_total()".to_string(),
    }
}

fn fmt_op(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Eq => "=",
        BinaryOp::NotEq => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::LtEq => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::GtEq => ">=",
        BinaryOp::Plus => "+",
        BinaryOp::Minus => "-",
        BinaryOp::Multiply => "*",
        BinaryOp::Divide => "/",
    }
}

fn fmt_expr(e: &Expr) -> String {
    match e {
        Expr::Column(c) => c.clone(),
        Expr::Literal(LiteralValue::Utf8(s)) => format!("'{s}'"),
        Expr::Literal(LiteralValue::Null) => "NULL".to_string(),
        Expr::Literal(LiteralValue::Int64(v)) => v.to_string(),
        Expr::Literal(LiteralValue::Float64(v)) => v.to_string(),
        Expr::Literal(LiteralValue::Boolean(v)) => v.to_string(),
        Expr::Param(p) => format!("${p:?}"),
        Expr::Not(x) => format!("NOT ({})", fmt_expr(x)),
        Expr::IsNull(x) => format!("({}) IS NULL", fmt_expr(x)),
        Expr::And(a, b) => format!("({}) AND ({})", fmt_expr(a), fmt_expr(b)),
        Expr::Or(a, b) => format!("({}) OR ({})", fmt_expr(a), fmt_expr(b)),
        Expr::BinaryOp { left, op, right } => {
            format!("({}) {} ({})", fmt_expr(left), fmt_op(*op), fmt_expr(right))
        }
        Expr::Func { func, args } => format!(
            "{func:?}({})",
            args.iter().map(fmt_expr).collect::<Vec<_>>().join(", ")
        ),
        Expr::Case {
            when_then,
            otherwise,
        } => {
            let mut s = "CASE".to_string();
            for (w, t) in when_then {
                s.push_str(&format!(" WHEN {} THEN {}", fmt_expr(w), fmt_expr(t)));
            }
            if let Some(o) = otherwise {
                s.push_str(&format!(" ELSE {}", fmt_expr(o)));
            }
            s.push_str(" END");
            s
        }
    }
}
