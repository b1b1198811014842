//! Structural tree for one read statement.
//!
//! A closed set of node variants: every projection, join edge and predicate is
//! an exhaustive enum so guards, matching and repair are pattern matches rather
//! than string scans. Identifiers are stored without quotes; the renderer decides
//! quoting.

use serde::{Deserialize, Serialize};

/// A parsed candidate. UNION branches live side by side in `branches`.
pub type ParsedStatement = Query;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// One entry per SELECT; more than one only for UNION.
    pub branches: Vec<Select>,
    /// Operator between `branches[i]` and `branches[i + 1]`.
    pub unions: Vec<UnionKind>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// `FOR UPDATE` / `LOCK IN SHARE MODE`
    pub locking: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnionKind {
    Distinct,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Select {
    pub distinct: bool,
    pub projection: Vec<SelectItem>,
    /// Target of `SELECT ... INTO`, kept only so the guard can refuse it.
    pub into: Option<String>,
    pub from: Option<FromClause>,
    pub selection: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectItem {
    Expr { expr: Expr, alias: Option<String> },
    Wildcard { qualifier: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FromClause {
    pub base: TableRef,
    pub joins: Vec<Join>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub source: TableSource,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableSource {
    Named(String),
    Derived(Box<Query>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    pub kind: JoinKind,
    pub table: TableRef,
    pub on: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub expr: Expr,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Alias or table qualifier as written, or the base table after resolution.
    pub table: Option<String>,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Literal {
    Number(String),
    String(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionArg {
    Expr(Expr),
    /// `COUNT(*)`
    Star,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<FunctionArg>,
    pub distinct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseBranch {
    pub condition: Expr,
    pub result: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    Column(ColumnRef),
    Literal(Literal),
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    InSubquery {
        expr: Box<Expr>,
        subquery: Box<Query>,
        negated: bool,
    },
    Exists {
        subquery: Box<Query>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    Function(FunctionCall),
    Arithmetic {
        left: Box<Expr>,
        op: ArithOp,
        right: Box<Expr>,
    },
    Negate(Box<Expr>),
    Interval {
        value: Box<Expr>,
        unit: Option<String>,
    },
    Case {
        operand: Option<Box<Expr>>,
        branches: Vec<CaseBranch>,
        else_result: Option<Box<Expr>>,
    },
    Cast {
        expr: Box<Expr>,
        data_type: String,
    },
    TypedLiteral {
        data_type: String,
        value: String,
    },
    Subquery(Box<Query>),
}

impl CompareOp {
    /// Operator that keeps the meaning when operands are swapped.
    pub fn mirror(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::NotEq => CompareOp::NotEq,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::LtEq => CompareOp::GtEq,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::GtEq => CompareOp::LtEq,
        }
    }

    /// Logical negation (`NOT a < b` is `a >= b`, also under NULL semantics).
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::NotEq,
            CompareOp::NotEq => CompareOp::Eq,
            CompareOp::Lt => CompareOp::GtEq,
            CompareOp::LtEq => CompareOp::Gt,
            CompareOp::Gt => CompareOp::LtEq,
            CompareOp::GtEq => CompareOp::Lt,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        }
    }
}

impl ColumnRef {
    pub fn new(table: Option<&str>, column: &str) -> Self {
        Self {
            table: table.map(|t| t.to_string()),
            column: column.to_string(),
        }
    }
}

impl Expr {
    pub fn column(table: Option<&str>, column: &str) -> Self {
        Expr::Column(ColumnRef::new(table, column))
    }

    pub fn number(n: impl ToString) -> Self {
        Expr::Literal(Literal::Number(n.to_string()))
    }

    pub fn compare(left: Expr, op: CompareOp, right: Expr) -> Self {
        Expr::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Conjunction, flattening nested ANDs. A single operand is returned as is.
    pub fn and(operands: Vec<Expr>) -> Self {
        let mut flat = Vec::with_capacity(operands.len());
        for operand in operands {
            match operand {
                Expr::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Expr::And(flat)
        }
    }

    /// Disjunction, flattening nested ORs.
    pub fn or(operands: Vec<Expr>) -> Self {
        let mut flat = Vec::with_capacity(operands.len());
        for operand in operands {
            match operand {
                Expr::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Expr::Or(flat)
        }
    }

    /// Top-level AND conjuncts. Anything under OR/NOT stays inside its conjunct.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::And(operands) => operands.iter().flat_map(|e| e.conjuncts()).collect(),
            other => vec![other],
        }
    }

    pub fn into_conjuncts(self) -> Vec<Expr> {
        match self {
            Expr::And(operands) => operands.into_iter().flat_map(|e| e.into_conjuncts()).collect(),
            other => vec![other],
        }
    }

    pub fn as_column(&self) -> Option<&ColumnRef> {
        match self {
            Expr::Column(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Literal(_) | Expr::TypedLiteral { .. } => true,
            Expr::Negate(inner) => inner.is_constant(),
            Expr::Interval { value, .. } => value.is_constant(),
            _ => false,
        }
    }

    /// Direct child expressions, not descending into subqueries.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Column(_) | Expr::Literal(_) | Expr::TypedLiteral { .. } => Vec::new(),
            Expr::Exists { .. } | Expr::Subquery(_) => Vec::new(),
            Expr::Compare { left, right, .. } | Expr::Arithmetic { left, right, .. } => {
                vec![left.as_ref(), right.as_ref()]
            }
            Expr::And(operands) | Expr::Or(operands) => operands.iter().collect(),
            Expr::Not(inner) | Expr::Negate(inner) => vec![inner.as_ref()],
            Expr::IsNull { expr, .. } | Expr::InSubquery { expr, .. } => vec![expr.as_ref()],
            Expr::Cast { expr, .. } => vec![expr.as_ref()],
            Expr::Interval { value, .. } => vec![value.as_ref()],
            Expr::InList { expr, list, .. } => {
                let mut out = vec![expr.as_ref()];
                out.extend(list.iter());
                out
            }
            Expr::Between { expr, low, high, .. } => vec![expr.as_ref(), low.as_ref(), high.as_ref()],
            Expr::Like { expr, pattern, .. } => vec![expr.as_ref(), pattern.as_ref()],
            Expr::Function(call) => call
                .args
                .iter()
                .filter_map(|a| match a {
                    FunctionArg::Expr(e) => Some(e),
                    FunctionArg::Star => None,
                })
                .collect(),
            Expr::Case {
                operand,
                branches,
                else_result,
            } => {
                let mut out = Vec::new();
                if let Some(op) = operand {
                    out.push(op.as_ref());
                }
                for branch in branches {
                    out.push(&branch.condition);
                    out.push(&branch.result);
                }
                if let Some(e) = else_result {
                    out.push(e.as_ref());
                }
                out
            }
        }
    }

    /// Mutable counterpart of [`Expr::children`].
    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Expr::Column(_) | Expr::Literal(_) | Expr::TypedLiteral { .. } => Vec::new(),
            Expr::Exists { .. } | Expr::Subquery(_) => Vec::new(),
            Expr::Compare { left, right, .. } | Expr::Arithmetic { left, right, .. } => {
                vec![left.as_mut(), right.as_mut()]
            }
            Expr::And(operands) | Expr::Or(operands) => operands.iter_mut().collect(),
            Expr::Not(inner) | Expr::Negate(inner) => vec![inner.as_mut()],
            Expr::IsNull { expr, .. } | Expr::InSubquery { expr, .. } => vec![expr.as_mut()],
            Expr::Cast { expr, .. } => vec![expr.as_mut()],
            Expr::Interval { value, .. } => vec![value.as_mut()],
            Expr::InList { expr, list, .. } => {
                let mut out = vec![expr.as_mut()];
                out.extend(list.iter_mut());
                out
            }
            Expr::Between { expr, low, high, .. } => vec![expr.as_mut(), low.as_mut(), high.as_mut()],
            Expr::Like { expr, pattern, .. } => vec![expr.as_mut(), pattern.as_mut()],
            Expr::Function(call) => call
                .args
                .iter_mut()
                .filter_map(|a| match a {
                    FunctionArg::Expr(e) => Some(e),
                    FunctionArg::Star => None,
                })
                .collect(),
            Expr::Case {
                operand,
                branches,
                else_result,
            } => {
                let mut out = Vec::new();
                if let Some(op) = operand {
                    out.push(op.as_mut());
                }
                for branch in branches.iter_mut() {
                    out.push(&mut branch.condition);
                    out.push(&mut branch.result);
                }
                if let Some(e) = else_result {
                    out.push(e.as_mut());
                }
                out
            }
        }
    }

    /// Subqueries directly owned by this node.
    pub fn subquery(&self) -> Option<&Query> {
        match self {
            Expr::InSubquery { subquery, .. } | Expr::Exists { subquery, .. } => Some(subquery),
            Expr::Subquery(q) => Some(q),
            _ => None,
        }
    }

    pub fn subquery_mut(&mut self) -> Option<&mut Query> {
        match self {
            Expr::InSubquery { subquery, .. } | Expr::Exists { subquery, .. } => Some(subquery),
            Expr::Subquery(q) => Some(q),
            _ => None,
        }
    }

    /// Column references in this expression, excluding those inside subqueries.
    pub fn column_refs(&self) -> Vec<&ColumnRef> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        if let Expr::Column(c) = self {
            out.push(c);
        }
        for child in self.children() {
            child.collect_columns(out);
        }
    }

    /// Apply `f` to every column reference, excluding those inside subqueries.
    pub fn for_each_column_mut(&mut self, f: &mut dyn FnMut(&mut ColumnRef)) {
        if let Expr::Column(c) = self {
            f(c);
        }
        for child in self.children_mut() {
            child.for_each_column_mut(f);
        }
    }

    /// Nesting depth of the expression tree (a leaf has depth 1).
    pub fn depth(&self) -> usize {
        1 + self.children().iter().map(|c| c.depth()).max().unwrap_or(0)
    }

    pub fn contains_aggregate(&self) -> bool {
        if let Expr::Function(call) = self {
            if is_aggregate_function(&call.name) {
                return true;
            }
        }
        self.children().iter().any(|c| c.contains_aggregate())
    }
}

pub fn is_aggregate_function(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "count" | "sum" | "avg" | "min" | "max" | "group_concat" | "std" | "stddev" | "variance"
    )
}

impl SelectItem {
    pub fn expr(&self) -> Option<&Expr> {
        match self {
            SelectItem::Expr { expr, .. } => Some(expr),
            SelectItem::Wildcard { .. } => None,
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            SelectItem::Expr { alias, .. } => alias.as_deref(),
            SelectItem::Wildcard { .. } => None,
        }
    }

    /// Name a parent query would see for this output column.
    pub fn output_name(&self) -> Option<String> {
        match self {
            SelectItem::Expr { alias: Some(a), .. } => Some(a.clone()),
            SelectItem::Expr { expr: Expr::Column(c), .. } => Some(c.column.clone()),
            _ => None,
        }
    }
}

impl TableRef {
    pub fn named(table: &str, alias: Option<&str>) -> Self {
        Self {
            source: TableSource::Named(table.to_string()),
            alias: alias.map(|a| a.to_string()),
        }
    }

    pub fn table_name(&self) -> Option<&str> {
        match &self.source {
            TableSource::Named(name) => Some(name),
            TableSource::Derived(_) => None,
        }
    }

    /// Name the rest of the SELECT uses to refer to this table.
    pub fn binding(&self) -> Option<&str> {
        self.alias.as_deref().or_else(|| self.table_name())
    }
}

impl FromClause {
    pub fn tables(&self) -> impl Iterator<Item = &TableRef> {
        std::iter::once(&self.base).chain(self.joins.iter().map(|j| &j.table))
    }
}

impl Select {
    /// Binding of the first FROM entry reading `table`.
    pub fn binding_for(&self, table: &str) -> Option<String> {
        let from = self.from.as_ref()?;
        from.tables()
            .find(|t| t.table_name().map(|n| n.eq_ignore_ascii_case(table)).unwrap_or(false))
            .and_then(|t| t.binding())
            .map(|b| b.to_string())
    }

    pub fn reads_table(&self, table: &str) -> bool {
        self.binding_for(table).is_some()
    }

    pub fn projection_alias(&self, name: &str) -> Option<&Expr> {
        self.projection.iter().find_map(|item| match item {
            SelectItem::Expr { expr, alias: Some(a) } if a.eq_ignore_ascii_case(name) => Some(expr),
            _ => None,
        })
    }

    /// Appends an AND conjunct to WHERE, creating the clause if absent.
    pub fn add_conjunct(&mut self, predicate: Expr) {
        self.selection = Some(match self.selection.take() {
            Some(existing) => Expr::and(vec![existing, predicate]),
            None => predicate,
        });
    }

    pub fn join_count(&self) -> usize {
        self.from.as_ref().map(|f| f.joins.len()).unwrap_or(0)
    }

    pub fn predicate_count(&self) -> usize {
        self.selection.as_ref().map(|s| s.conjuncts().len()).unwrap_or(0)
    }

    pub fn is_aggregate(&self) -> bool {
        self.projection
            .iter()
            .filter_map(|item| item.expr())
            .any(|e| e.contains_aggregate())
    }
}

impl Query {
    pub fn single(select: Select) -> Self {
        Self {
            branches: vec![select],
            unions: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            locking: false,
        }
    }

    /// `SELECT 1 WHERE 1 = 0`: reads no table and returns no rows.
    pub fn fallback() -> Self {
        Self::single(Select {
            projection: vec![SelectItem::Expr {
                expr: Expr::number(1),
                alias: None,
            }],
            selection: Some(Expr::compare(Expr::number(1), CompareOp::Eq, Expr::number(0))),
            ..Select::default()
        })
    }

    pub fn is_union(&self) -> bool {
        self.branches.len() > 1
    }

    /// A single aggregate SELECT without GROUP BY always yields one row.
    pub fn is_single_row_aggregate(&self) -> bool {
        match self.branches.as_slice() {
            [only] => only.group_by.is_empty() && only.is_aggregate(),
            _ => false,
        }
    }
}
