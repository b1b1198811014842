//! Text rendering for the statement tree.
//!
//! Keywords are uppercase, identifiers are backtick-quoted only when they are
//! reserved or not plain `[A-Za-z_][A-Za-z0-9_]*`, and parentheses are emitted
//! only where operator precedence requires them. Rendering a canonical tree and
//! parsing it back yields the same tree.

use super::tree::*;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use std::fmt::{self, Display, Write};

lazy_static! {
    static ref PLAIN_IDENT: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref RESERVED: HashSet<&'static str> = [
        "add", "all", "and", "any", "as", "asc", "between", "by", "case", "check", "column",
        "create", "cross", "default", "delete", "desc", "distinct", "div", "drop", "else", "end",
        "exists", "false", "for", "from", "full", "group", "having", "in", "index", "inner",
        "insert", "interval", "into", "is", "join", "key", "left", "like", "limit", "lock",
        "match", "mod", "not", "null", "offset", "on", "or", "order", "outer", "range", "rank",
        "regexp", "right", "row", "rows", "select", "set", "table", "then", "true", "union",
        "update", "use", "user", "using", "values", "when", "where", "with", "window",
    ]
    .into_iter()
    .collect();
}

const PREC_OR: u8 = 1;
const PREC_AND: u8 = 2;
const PREC_NOT: u8 = 3;
const PREC_CMP: u8 = 4;
const PREC_ADD: u8 = 5;
const PREC_MUL: u8 = 6;
const PREC_UNARY: u8 = 7;
const PREC_ATOM: u8 = 8;

pub fn render(query: &Query) -> String {
    query.to_string()
}

pub fn render_expr(expr: &Expr) -> String {
    expr.to_string()
}

pub fn quote_ident(name: &str) -> String {
    if PLAIN_IDENT.is_match(name) && !RESERVED.contains(name.to_lowercase().as_str()) {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

/// Backslash escapes in MySQL string literals, so it is doubled before quotes are.
fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Or(_) => PREC_OR,
        Expr::And(_) => PREC_AND,
        Expr::Not(_) => PREC_NOT,
        Expr::Compare { .. }
        | Expr::IsNull { .. }
        | Expr::InList { .. }
        | Expr::InSubquery { .. }
        | Expr::Between { .. }
        | Expr::Like { .. } => PREC_CMP,
        Expr::Arithmetic { op, .. } => match op {
            ArithOp::Add | ArithOp::Sub => PREC_ADD,
            ArithOp::Mul | ArithOp::Div | ArithOp::Mod => PREC_MUL,
        },
        Expr::Negate(_) => PREC_UNARY,
        // A negative number renders with a sign and behaves like a unary minus.
        Expr::Literal(Literal::Number(n)) if n.starts_with('-') => PREC_UNARY,
        _ => PREC_ATOM,
    }
}

/// Writes `expr`, parenthesized when its precedence is below `min`.
fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr, min: u8) -> fmt::Result {
    if precedence(expr) < min {
        write!(f, "({})", expr)
    } else {
        write!(f, "{}", expr)
    }
}

fn write_list<T: Display>(f: &mut fmt::Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(table) = &self.table {
            write!(f, "{}.", quote_ident(table))?;
        }
        f.write_str(&quote_ident(&self.column))
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(n) => f.write_str(n),
            Literal::String(s) => f.write_str(&quote_string(s)),
            Literal::Boolean(true) => f.write_str("TRUE"),
            Literal::Boolean(false) => f.write_str("FALSE"),
            Literal::Null => f.write_str("NULL"),
        }
    }
}

impl Display for FunctionArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionArg::Expr(e) => write!(f, "{}", e),
            FunctionArg::Star => f.write_str("*"),
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{}", c),
            Expr::Literal(l) => write!(f, "{}", l),
            Expr::Compare { left, op, right } => {
                write_operand(f, left, PREC_CMP + 1)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, right, PREC_CMP + 1)
            }
            Expr::And(operands) | Expr::Or(operands) => {
                let (sep, prec) = match self {
                    Expr::And(_) => (" AND ", PREC_AND),
                    _ => (" OR ", PREC_OR),
                };
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        f.write_str(sep)?;
                    }
                    write_operand(f, operand, prec)?;
                }
                Ok(())
            }
            Expr::Not(inner) => {
                f.write_str("NOT ")?;
                write_operand(f, inner, PREC_NOT)
            }
            Expr::IsNull { expr, negated } => {
                write_operand(f, expr, PREC_CMP + 1)?;
                f.write_str(if *negated { " IS NOT NULL" } else { " IS NULL" })
            }
            Expr::InList { expr, list, negated } => {
                write_operand(f, expr, PREC_CMP + 1)?;
                f.write_str(if *negated { " NOT IN (" } else { " IN (" })?;
                write_list(f, list, ", ")?;
                f.write_str(")")
            }
            Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                write_operand(f, expr, PREC_CMP + 1)?;
                write!(f, "{} ({})", if *negated { " NOT IN" } else { " IN" }, subquery)
            }
            Expr::Exists { subquery, negated } => {
                write!(f, "{}EXISTS ({})", if *negated { "NOT " } else { "" }, subquery)
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                write_operand(f, expr, PREC_CMP + 1)?;
                f.write_str(if *negated { " NOT BETWEEN " } else { " BETWEEN " })?;
                write_operand(f, low, PREC_CMP + 1)?;
                f.write_str(" AND ")?;
                write_operand(f, high, PREC_CMP + 1)
            }
            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                write_operand(f, expr, PREC_CMP + 1)?;
                f.write_str(if *negated { " NOT LIKE " } else { " LIKE " })?;
                write_operand(f, pattern, PREC_CMP + 1)
            }
            Expr::Function(call) => {
                write!(f, "{}(", call.name.to_uppercase())?;
                if call.distinct {
                    f.write_str("DISTINCT ")?;
                }
                write_list(f, &call.args, ", ")?;
                f.write_str(")")
            }
            Expr::Arithmetic { left, op, right } => {
                let prec = precedence(self);
                write_operand(f, left, prec)?;
                write!(f, " {} ", op.symbol())?;
                // Left-associative: an equal-precedence right operand keeps its parentheses.
                write_operand(f, right, prec + 1)
            }
            Expr::Negate(inner) => {
                f.write_char('-')?;
                write_operand(f, inner, PREC_ATOM)
            }
            Expr::Interval { value, unit } => {
                f.write_str("INTERVAL ")?;
                write_operand(f, value, PREC_ATOM)?;
                if let Some(unit) = unit {
                    write!(f, " {}", unit.to_uppercase())?;
                }
                Ok(())
            }
            Expr::Case {
                operand,
                branches,
                else_result,
            } => {
                f.write_str("CASE")?;
                if let Some(op) = operand {
                    write!(f, " {}", op)?;
                }
                for branch in branches {
                    write!(f, " WHEN {} THEN {}", branch.condition, branch.result)?;
                }
                if let Some(e) = else_result {
                    write!(f, " ELSE {}", e)?;
                }
                f.write_str(" END")
            }
            Expr::Cast { expr, data_type } => write!(f, "CAST({} AS {})", expr, data_type.to_uppercase()),
            Expr::TypedLiteral { data_type, value } => {
                write!(f, "{} {}", data_type.to_uppercase(), quote_string(value))
            }
            Expr::Subquery(q) => write!(f, "({})", q),
        }
    }
}

impl Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectItem::Expr { expr, alias } => {
                write!(f, "{}", expr)?;
                if let Some(alias) = alias {
                    write!(f, " AS {}", quote_ident(alias))?;
                }
                Ok(())
            }
            SelectItem::Wildcard { qualifier: Some(q) } => write!(f, "{}.*", quote_ident(q)),
            SelectItem::Wildcard { qualifier: None } => f.write_str("*"),
        }
    }
}

impl Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            TableSource::Named(name) => {
                let parts: Vec<String> = name.split('.').map(quote_ident).collect();
                f.write_str(&parts.join("."))?;
            }
            TableSource::Derived(q) => write!(f, "({})", q)?,
        }
        if let Some(alias) = &self.alias {
            write!(f, " AS {}", quote_ident(alias))?;
        }
        Ok(())
    }
}

impl Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = match self.kind {
            JoinKind::Inner => "JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
            JoinKind::Cross => "CROSS JOIN",
        };
        write!(f, "{} {}", keyword, self.table)?;
        if let Some(on) = &self.on {
            write!(f, " ON {}", on)?;
        }
        Ok(())
    }
}

impl Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        if self.distinct {
            f.write_str("DISTINCT ")?;
        }
        write_list(f, &self.projection, ", ")?;
        if let Some(into) = &self.into {
            write!(f, " INTO {}", quote_ident(into))?;
        }
        if let Some(from) = &self.from {
            write!(f, " FROM {}", from.base)?;
            for join in &from.joins {
                write!(f, " {}", join)?;
            }
        }
        if let Some(selection) = &self.selection {
            write!(f, " WHERE {}", selection)?;
        }
        if !self.group_by.is_empty() {
            f.write_str(" GROUP BY ")?;
            write_list(f, &self.group_by, ", ")?;
        }
        if let Some(having) = &self.having {
            write!(f, " HAVING {}", having)?;
        }
        Ok(())
    }
}

impl Display for OrderItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if self.descending {
            f.write_str(" DESC")?;
        }
        Ok(())
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, branch) in self.branches.iter().enumerate() {
            if i > 0 {
                match self.unions.get(i - 1) {
                    Some(UnionKind::All) => f.write_str(" UNION ALL ")?,
                    _ => f.write_str(" UNION ")?,
                }
            }
            write!(f, "{}", branch)?;
        }
        if !self.order_by.is_empty() {
            f.write_str(" ORDER BY ")?;
            write_list(f, &self.order_by, ", ")?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {}", limit)?;
        }
        if let Some(offset) = self.offset {
            write!(f, " OFFSET {}", offset)?;
        }
        if self.locking {
            f.write_str(" FOR UPDATE")?;
        }
        Ok(())
    }
}
