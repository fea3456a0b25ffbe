use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Column(String),
    Literal(LiteralValue),
    /// Engine-config value bound at execution time.
    Param(Param),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    Func {
        func: ScalarFunc,
        args: Vec<Expr>,
    },
    /// `CASE WHEN .. THEN .. [ELSE ..] END`; NULL when nothing matches and no ELSE.
    Case {
        when_then: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Param {
    MinOrdersForRate,
    HighSpenderThreshold,
    MediumSpenderThreshold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Multiply,
    Divide,
}

/// Row-level functions, including the derived categorizations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarFunc {
    /// `YYYY-MM-DD` -> `YYYY-MM`.
    YearMonth,
    Year,
    Month,
    /// `HH:MM[:SS]` -> hour of day.
    Hour,
    /// Date -> `Monday`..`Sunday`.
    WeekdayName,
    /// Date -> `Weekday` / `Weekend`.
    DayType,
    AgeGroup,
    DistanceBucket,
    DeliveryPerformance,
    DeliverySpeed,
    /// Time -> whether the hour falls in a configured peak window.
    IsPeakHour,
    Lower,
    Round(u32),
    /// Round to `EngineConfig::money_decimals`.
    RoundMoney,
    Coalesce,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AggExpr {
    /// Rows in the group, NULLs included.
    CountAll,
    /// Non-null values of the expression.
    Count(Expr),
    /// Rows where the predicate is true.
    CountIf(Expr),
    Sum(Expr),
    Avg(Expr),
    Min(Expr),
    Max(Expr),
    /// `count_if(predicate) * 100 / count(*)` within the group.
    Percent(Expr),
    /// `count(*) * 100 / rows entering the aggregate` (share of the whole input).
    ShareOfTotal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortExpr {
    pub expr: Expr,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogicalPlan {
    Scan {
        table: String,
    },
    /// Named view, expanded to its plan at execution time.
    View {
        name: String,
    },
    /// Left outer equi-join; the right key column is not repeated in the output.
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        left_key: String,
        right_key: String,
    },
    Filter {
        predicate: Expr,
        input: Box<LogicalPlan>,
    },
    Projection {
        exprs: Vec<(Expr, String)>,
        input: Box<LogicalPlan>,
    },
    Aggregate {
        group_exprs: Vec<(Expr, String)>,
        aggr_exprs: Vec<(AggExpr, String)>,
        input: Box<LogicalPlan>,
    },
    /// Stable sort; earlier input order breaks ties.
    Sort {
        keys: Vec<SortExpr>,
        input: Box<LogicalPlan>,
    },
    /// `n = None` uses `EngineConfig::default_top_n`.
    Limit {
        n: Option<usize>,
        input: Box<LogicalPlan>,
    },
    /// Per-customer recency/frequency/monetary scoring over order-level rows.
    RfmSegment {
        input: Box<LogicalPlan>,
    },
    /// Pearson correlation matrix over numeric columns.
    Correlation {
        columns: Vec<String>,
        input: Box<LogicalPlan>,
    },
}

impl LogicalPlan {
    pub fn scan(table: &str) -> Self {
        Self::Scan {
            table: table.to_string(),
        }
    }

    pub fn view(name: &str) -> Self {
        Self::View {
            name: name.to_string(),
        }
    }

    pub fn filter(self, predicate: Expr) -> Self {
        Self::Filter {
            predicate,
            input: Box::new(self),
        }
    }

    pub fn join(self, right: LogicalPlan, left_key: &str, right_key: &str) -> Self {
        Self::Join {
            left: Box::new(self),
            right: Box::new(right),
            left_key: left_key.to_string(),
            right_key: right_key.to_string(),
        }
    }

    pub fn project(self, exprs: Vec<(Expr, &str)>) -> Self {
        Self::Projection {
            exprs: exprs
                .into_iter()
                .map(|(e, name)| (e, name.to_string()))
                .collect(),
            input: Box::new(self),
        }
    }

    pub fn aggregate(self, group_exprs: Vec<(Expr, &str)>, aggr_exprs: Vec<(AggExpr, &str)>) -> Self {
        Self::Aggregate {
            group_exprs: group_exprs
                .into_iter()
                .map(|(e, name)| (e, name.to_string()))
                .collect(),
            aggr_exprs: aggr_exprs
                .into_iter()
                .map(|(e, name)| (e, name.to_string()))
                .collect(),
            input: Box::new(self),
        }
    }

    pub fn sort(self, keys: Vec<SortExpr>) -> Self {
        Self::Sort {
            keys,
            input: Box::new(self),
        }
    }

    pub fn limit(self, n: Option<usize>) -> Self {
        Self::Limit {
            n,
            input: Box::new(self),
        }
    }

    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            Self::Scan { .. } | Self::View { .. } => vec![],
            Self::Join { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Self::Filter { input, .. }
            | Self::Projection { input, .. }
            | Self::Aggregate { input, .. }
            | Self::Sort { input, .. }
            | Self::Limit { input, .. }
            | Self::RfmSegment { input }
            | Self::Correlation { input, .. } => vec![input.as_ref()],
        }
    }

    /// Base tables and views this plan reads, in first-visit order.
    pub fn sources(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_sources(self, &mut out);
        out
    }
}

fn collect_sources(plan: &LogicalPlan, out: &mut Vec<String>) {
    match plan {
        LogicalPlan::Scan { table } => push_unique(out, table),
        LogicalPlan::View { name } => push_unique(out, name),
        other => {
            for child in other.children() {
                collect_sources(child, out);
            }
        }
    }
}

fn push_unique(out: &mut Vec<String>, name: &str) {
    if !out.iter().any(|n| n == name) {
        out.push(name.to_string());
    }
}
