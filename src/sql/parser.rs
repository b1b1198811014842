//! Candidate text -> statement tree.
//!
//! sqlparser (MySQL dialect) does the tokenizing and grammar; this module lowers
//! its AST into the closed tree in [`super::tree`]. Anything without a tree
//! counterpart is refused as `Unsupported` rather than silently dropped.

use super::tree::*;
use crate::error::ParseError;
use lazy_static::lazy_static;
use regex::Regex;
use sqlparser::ast;
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;
use tracing::debug;

type ParseResult<T> = std::result::Result<T, ParseError>;

lazy_static! {
    static ref FUNCTION_NAME: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    /// Keyword type names with an optional numeric precision, e.g. `DECIMAL(10,2)` or `INT UNSIGNED`.
    static ref TYPE_NAME: Regex = Regex::new(r"^[A-Za-z]+( [A-Za-z]+)*(\(\d+(, ?\d+)?\))?( [A-Za-z]+)*$").unwrap();
}

/// Parse exactly one read statement.
pub fn parse(text: &str) -> ParseResult<ParsedStatement> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseError::syntax("empty statement"));
    }

    let statements = Parser::parse_sql(&MySqlDialect {}, trimmed)
        .map_err(|e| ParseError::syntax(e.to_string()))?;

    if statements.len() > 1 {
        return Err(ParseError::syntax(format!(
            "expected a single statement, found {}",
            statements.len()
        )));
    }

    match statements.into_iter().next() {
        Some(ast::Statement::Query(query)) => lower_query(&query),
        Some(other) => {
            let keyword = other
                .to_string()
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_uppercase();
            debug!("Refusing non-SELECT statement: {}", keyword);
            Err(ParseError::syntax(format!(
                "only SELECT statements are accepted, found {}",
                keyword
            )))
        }
        None => Err(ParseError::syntax("empty statement")),
    }
}

/// Parse a standalone expression such as a plan predicate or projection item.
pub fn parse_expression(text: &str) -> ParseResult<Expr> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseError::syntax("empty expression"));
    }
    let dialect = MySqlDialect {};
    let mut parser = Parser::new(&dialect)
        .try_with_sql(trimmed)
        .map_err(|e| ParseError::syntax(e.to_string()))?;
    let expr = parser.parse_expr().map_err(|e| ParseError::syntax(e.to_string()))?;
    parser
        .expect_token(&Token::EOF)
        .map_err(|_| ParseError::syntax(format!("trailing input after expression '{}'", trimmed)))?;
    lower_expr(&expr)
}

/// Parse a plan join or predicate clause; the expression must be boolean-valued.
pub fn parse_condition(text: &str) -> ParseResult<Expr> {
    let expr = parse_expression(text)?;
    match &expr {
        Expr::Compare { .. }
        | Expr::And(_)
        | Expr::Or(_)
        | Expr::Not(_)
        | Expr::IsNull { .. }
        | Expr::InList { .. }
        | Expr::InSubquery { .. }
        | Expr::Exists { .. }
        | Expr::Between { .. }
        | Expr::Like { .. }
        | Expr::Literal(Literal::Boolean(_)) => Ok(expr),
        _ => Err(ParseError::syntax(format!("'{}' is not a condition", text.trim()))),
    }
}

fn lower_query(query: &ast::Query) -> ParseResult<Query> {
    if query.with.is_some() {
        return Err(ParseError::unsupported("WITH (common table expressions)"));
    }
    if query.fetch.is_some() {
        return Err(ParseError::unsupported("FETCH clause"));
    }

    let mut out = Query {
        branches: Vec::new(),
        unions: Vec::new(),
        order_by: Vec::new(),
        limit: None,
        offset: None,
        locking: !query.locks.is_empty(),
    };
    lower_set_expr(&query.body, &mut out)?;

    out.order_by = query
        .order_by
        .iter()
        .map(lower_order_item)
        .collect::<ParseResult<Vec<_>>>()?;
    out.limit = query.limit.as_ref().map(lower_count).transpose()?;
    out.offset = query.offset.as_ref().map(|o| lower_count(&o.value)).transpose()?;
    Ok(out)
}

fn lower_set_expr(body: &ast::SetExpr, out: &mut Query) -> ParseResult<()> {
    match body {
        ast::SetExpr::Select(select) => {
            out.branches.push(lower_select(select)?);
            Ok(())
        }
        ast::SetExpr::Query(inner) => {
            if inner.with.is_some()
                || !inner.order_by.is_empty()
                || inner.limit.is_some()
                || inner.offset.is_some()
                || inner.fetch.is_some()
                || !inner.locks.is_empty()
            {
                return Err(ParseError::unsupported(
                    "parenthesized branch with its own ORDER BY, LIMIT or WITH",
                ));
            }
            lower_set_expr(&inner.body, out)
        }
        ast::SetExpr::SetOperation {
            op,
            set_quantifier,
            left,
            right,
            ..
        } => {
            if !matches!(op, ast::SetOperator::Union) {
                return Err(ParseError::unsupported(format!("set operator {}", op)));
            }
            lower_set_expr(left, out)?;
            out.unions.push(match set_quantifier {
                ast::SetQuantifier::All => UnionKind::All,
                ast::SetQuantifier::Distinct | ast::SetQuantifier::None => UnionKind::Distinct,
                other => {
                    return Err(ParseError::unsupported(format!("UNION {}", other)));
                }
            });
            lower_set_expr(right, out)
        }
        other => Err(ParseError::unsupported(format!("query body '{}'", other))),
    }
}

fn lower_select(select: &ast::Select) -> ParseResult<Select> {
    if select.top.is_some() {
        return Err(ParseError::unsupported("TOP"));
    }
    if !select.lateral_views.is_empty() {
        return Err(ParseError::unsupported("LATERAL VIEW"));
    }
    if !select.cluster_by.is_empty() || !select.distribute_by.is_empty() || !select.sort_by.is_empty() {
        return Err(ParseError::unsupported("CLUSTER/DISTRIBUTE/SORT BY"));
    }
    if !select.named_window.is_empty() {
        return Err(ParseError::unsupported("WINDOW clause"));
    }
    if select.qualify.is_some() {
        return Err(ParseError::unsupported("QUALIFY"));
    }

    let distinct = match &select.distinct {
        None => false,
        Some(ast::Distinct::Distinct) => true,
        Some(ast::Distinct::On(_)) => return Err(ParseError::unsupported("DISTINCT ON")),
    };

    let projection = select
        .projection
        .iter()
        .map(lower_select_item)
        .collect::<ParseResult<Vec<_>>>()?;

    let group_by = match &select.group_by {
        ast::GroupByExpr::All => return Err(ParseError::unsupported("GROUP BY ALL")),
        ast::GroupByExpr::Expressions(exprs) => exprs
            .iter()
            .map(lower_expr)
            .collect::<ParseResult<Vec<_>>>()?,
    };

    Ok(Select {
        distinct,
        projection,
        into: select.into.as_ref().map(|into| object_name(&into.name)),
        from: lower_from(&select.from)?,
        selection: select.selection.as_ref().map(lower_expr).transpose()?,
        group_by,
        having: select.having.as_ref().map(lower_expr).transpose()?,
    })
}

fn lower_select_item(item: &ast::SelectItem) -> ParseResult<SelectItem> {
    Ok(match item {
        ast::SelectItem::UnnamedExpr(expr) => SelectItem::Expr {
            expr: lower_expr(expr)?,
            alias: None,
        },
        ast::SelectItem::ExprWithAlias { expr, alias } => SelectItem::Expr {
            expr: lower_expr(expr)?,
            alias: Some(alias.value.clone()),
        },
        ast::SelectItem::QualifiedWildcard(name, _) => SelectItem::Wildcard {
            qualifier: Some(object_name(name)),
        },
        ast::SelectItem::Wildcard(_) => SelectItem::Wildcard { qualifier: None },
    })
}

fn lower_from(items: &[ast::TableWithJoins]) -> ParseResult<Option<FromClause>> {
    let mut iter = items.iter();
    let Some(first) = iter.next() else {
        return Ok(None);
    };

    let base = lower_table_factor(&first.relation)?;
    let mut joins = lower_joins(&first.joins)?;
    // `FROM a, b` is a cross join
    for item in iter {
        joins.push(Join {
            kind: JoinKind::Cross,
            table: lower_table_factor(&item.relation)?,
            on: None,
        });
        joins.extend(lower_joins(&item.joins)?);
    }
    Ok(Some(FromClause { base, joins }))
}

fn lower_table_factor(factor: &ast::TableFactor) -> ParseResult<TableRef> {
    match factor {
        ast::TableFactor::Table { name, alias, args, .. } => {
            if args.is_some() {
                return Err(ParseError::unsupported("table-valued function"));
            }
            Ok(TableRef {
                source: TableSource::Named(object_name(name)),
                alias: lower_table_alias(alias.as_ref())?,
            })
        }
        ast::TableFactor::Derived {
            lateral,
            subquery,
            alias,
            ..
        } => {
            if *lateral {
                return Err(ParseError::unsupported("LATERAL derived table"));
            }
            Ok(TableRef {
                source: TableSource::Derived(Box::new(lower_query(subquery)?)),
                alias: lower_table_alias(alias.as_ref())?,
            })
        }
        ast::TableFactor::NestedJoin { .. } => Err(ParseError::unsupported("parenthesized join")),
        other => Err(ParseError::unsupported(format!("table factor '{}'", other))),
    }
}

fn lower_table_alias(alias: Option<&ast::TableAlias>) -> ParseResult<Option<String>> {
    match alias {
        Some(a) if !a.columns.is_empty() => Err(ParseError::unsupported("column list in table alias")),
        Some(a) => Ok(Some(a.name.value.clone())),
        None => Ok(None),
    }
}

fn lower_joins(joins: &[ast::Join]) -> ParseResult<Vec<Join>> {
    let mut out = Vec::with_capacity(joins.len());
    for join in joins {
        let table = lower_table_factor(&join.relation)?;
        let (kind, constraint) = match &join.join_operator {
            ast::JoinOperator::Inner(c) => (JoinKind::Inner, Some(c)),
            ast::JoinOperator::LeftOuter(c) => (JoinKind::Left, Some(c)),
            ast::JoinOperator::RightOuter(c) => (JoinKind::Right, Some(c)),
            ast::JoinOperator::FullOuter(c) => (JoinKind::Full, Some(c)),
            ast::JoinOperator::CrossJoin => (JoinKind::Cross, None),
            other => return Err(ParseError::unsupported(format!("join operator {:?}", other))),
        };
        let on = match constraint {
            Some(ast::JoinConstraint::On(expr)) => Some(lower_expr(expr)?),
            Some(ast::JoinConstraint::Using(_)) => return Err(ParseError::unsupported("JOIN ... USING")),
            Some(ast::JoinConstraint::Natural) => return Err(ParseError::unsupported("NATURAL JOIN")),
            Some(ast::JoinConstraint::None) | None => None,
        };
        // MySQL allows `JOIN t` without a condition; it is a cross join.
        let kind = if kind == JoinKind::Inner && on.is_none() {
            JoinKind::Cross
        } else {
            kind
        };
        out.push(Join { kind, table, on });
    }
    Ok(out)
}

fn lower_order_item(item: &ast::OrderByExpr) -> ParseResult<OrderItem> {
    if item.nulls_first.is_some() {
        return Err(ParseError::unsupported("NULLS FIRST/LAST"));
    }
    Ok(OrderItem {
        expr: lower_expr(&item.expr)?,
        descending: item.asc == Some(false),
    })
}

fn lower_count(expr: &ast::Expr) -> ParseResult<u64> {
    match expr {
        ast::Expr::Value(ast::Value::Number(n, _)) => n
            .parse::<u64>()
            .map_err(|_| ParseError::syntax(format!("invalid row count '{}'", n))),
        other => Err(ParseError::unsupported(format!("non-literal row count '{}'", other))),
    }
}

fn object_name(name: &ast::ObjectName) -> String {
    name.0
        .iter()
        .map(|ident| ident.value.clone())
        .collect::<Vec<_>>()
        .join(".")
}

/// Type names are rendered verbatim, so only keyword types are accepted.
fn type_name(data_type: &ast::DataType) -> ParseResult<String> {
    let name = data_type.to_string();
    if TYPE_NAME.is_match(&name) {
        Ok(name)
    } else {
        Err(ParseError::unsupported(format!("data type '{}'", name)))
    }
}

fn boxed(expr: &ast::Expr) -> ParseResult<Box<Expr>> {
    lower_expr(expr).map(Box::new)
}

fn lower_expr(expr: &ast::Expr) -> ParseResult<Expr> {
    use ast::Expr as E;

    match expr {
        E::Identifier(ident) => Ok(Expr::Column(ColumnRef {
            table: None,
            column: ident.value.clone(),
        })),
        E::CompoundIdentifier(parts) => match parts.as_slice() {
            [table, column] => Ok(Expr::Column(ColumnRef {
                table: Some(table.value.clone()),
                column: column.value.clone(),
            })),
            _ => Err(ParseError::unsupported(format!(
                "identifier with {} parts '{}'",
                parts.len(),
                expr
            ))),
        },
        E::Value(value) => Ok(Expr::Literal(lower_value(value)?)),
        E::TypedString { data_type, value } => Ok(Expr::TypedLiteral {
            data_type: type_name(data_type)?,
            value: value.clone(),
        }),
        E::Nested(inner) => lower_expr(inner),
        E::IsNull(inner) => Ok(Expr::IsNull {
            expr: boxed(inner)?,
            negated: false,
        }),
        E::IsNotNull(inner) => Ok(Expr::IsNull {
            expr: boxed(inner)?,
            negated: true,
        }),
        E::InList { expr, list, negated } => Ok(Expr::InList {
            expr: boxed(expr)?,
            list: list.iter().map(lower_expr).collect::<ParseResult<Vec<_>>>()?,
            negated: *negated,
        }),
        E::InSubquery {
            expr,
            subquery,
            negated,
        } => Ok(Expr::InSubquery {
            expr: boxed(expr)?,
            subquery: Box::new(lower_query(subquery)?),
            negated: *negated,
        }),
        E::Exists { subquery, negated } => Ok(Expr::Exists {
            subquery: Box::new(lower_query(subquery)?),
            negated: *negated,
        }),
        E::Subquery(query) => Ok(Expr::Subquery(Box::new(lower_query(query)?))),
        E::Between {
            expr,
            negated,
            low,
            high,
        } => Ok(Expr::Between {
            expr: boxed(expr)?,
            low: boxed(low)?,
            high: boxed(high)?,
            negated: *negated,
        }),
        E::Like {
            negated,
            expr,
            pattern,
            escape_char,
            ..
        } => {
            if escape_char.is_some() {
                return Err(ParseError::unsupported("LIKE ... ESCAPE"));
            }
            Ok(Expr::Like {
                expr: boxed(expr)?,
                pattern: boxed(pattern)?,
                negated: *negated,
            })
        }
        E::BinaryOp { left, op, right } => lower_binary(left, op, right),
        E::UnaryOp { op, expr: inner } => match op {
            ast::UnaryOperator::Not => Ok(Expr::Not(boxed(inner)?)),
            ast::UnaryOperator::Plus => lower_expr(inner),
            ast::UnaryOperator::Minus => match lower_expr(inner)? {
                Expr::Literal(Literal::Number(n)) => Ok(Expr::Literal(Literal::Number(negate_number(&n)))),
                other => Ok(Expr::Negate(Box::new(other))),
            },
            other => Err(ParseError::unsupported(format!("unary operator {}", other))),
        },
        E::Function(function) => lower_function(function),
        E::Case {
            operand,
            conditions,
            results,
            else_result,
        } => Ok(Expr::Case {
            operand: operand.as_deref().map(boxed).transpose()?,
            branches: conditions
                .iter()
                .zip(results.iter())
                .map(|(c, r)| {
                    Ok(CaseBranch {
                        condition: lower_expr(c)?,
                        result: lower_expr(r)?,
                    })
                })
                .collect::<ParseResult<Vec<_>>>()?,
            else_result: else_result.as_deref().map(boxed).transpose()?,
        }),
        E::Cast { expr, data_type, .. } => Ok(Expr::Cast {
            expr: boxed(expr)?,
            data_type: type_name(data_type)?,
        }),
        E::Interval { .. } => lower_interval(&expr.to_string()),
        other => Err(ParseError::unsupported(format!("expression '{}'", other))),
    }
}

fn lower_binary(left: &ast::Expr, op: &ast::BinaryOperator, right: &ast::Expr) -> ParseResult<Expr> {
    use ast::BinaryOperator as B;

    let compare = |op: CompareOp| -> ParseResult<Expr> { Ok(Expr::compare(lower_expr(left)?, op, lower_expr(right)?)) };
    let arithmetic = |op: ArithOp| -> ParseResult<Expr> {
        Ok(Expr::Arithmetic {
            left: boxed(left)?,
            op,
            right: boxed(right)?,
        })
    };

    match op {
        B::And => Ok(Expr::and(vec![lower_expr(left)?, lower_expr(right)?])),
        B::Or => Ok(Expr::or(vec![lower_expr(left)?, lower_expr(right)?])),
        B::Eq => compare(CompareOp::Eq),
        B::NotEq => compare(CompareOp::NotEq),
        B::Lt => compare(CompareOp::Lt),
        B::LtEq => compare(CompareOp::LtEq),
        B::Gt => compare(CompareOp::Gt),
        B::GtEq => compare(CompareOp::GtEq),
        B::Plus => arithmetic(ArithOp::Add),
        B::Minus => arithmetic(ArithOp::Sub),
        B::Multiply => arithmetic(ArithOp::Mul),
        B::Divide => arithmetic(ArithOp::Div),
        B::Modulo => arithmetic(ArithOp::Mod),
        other => Err(ParseError::unsupported(format!("operator {}", other))),
    }
}

fn lower_function(function: &ast::Function) -> ParseResult<Expr> {
    if function.over.is_some() {
        return Err(ParseError::unsupported("window function"));
    }
    if !function.order_by.is_empty() {
        return Err(ParseError::unsupported("ORDER BY inside function call"));
    }

    let mut args = Vec::with_capacity(function.args.len());
    for arg in &function.args {
        match arg {
            ast::FunctionArg::Unnamed(ast::FunctionArgExpr::Expr(e)) => args.push(FunctionArg::Expr(lower_expr(e)?)),
            ast::FunctionArg::Unnamed(ast::FunctionArgExpr::Wildcard) => args.push(FunctionArg::Star),
            ast::FunctionArg::Unnamed(ast::FunctionArgExpr::QualifiedWildcard(name)) => {
                return Err(ParseError::unsupported(format!("qualified wildcard argument {}.*", name)));
            }
            ast::FunctionArg::Named { .. } => return Err(ParseError::unsupported("named function argument")),
        }
    }

    // Function names are rendered unquoted.
    let name = object_name(&function.name);
    if !function.name.0.iter().all(|ident| ident.quote_style.is_none() && FUNCTION_NAME.is_match(&ident.value)) {
        return Err(ParseError::unsupported(format!("function name '{}'", function.name)));
    }

    Ok(Expr::Function(FunctionCall {
        name,
        args,
        distinct: function.distinct,
    }))
}

/// Lowers `INTERVAL <value> [<unit>]` from its rendered form, which is stable
/// across sqlparser's representations of the interval node.
fn lower_interval(rendered: &str) -> ParseResult<Expr> {
    let body = rendered
        .strip_prefix("INTERVAL ")
        .ok_or_else(|| ParseError::unsupported(format!("interval '{}'", rendered)))?
        .trim();

    let (value_text, unit) = match body.rsplit_once(' ') {
        Some((value, unit)) if !unit.is_empty() && unit.chars().all(|c| c.is_ascii_alphabetic() || c == '_') => {
            (value.trim(), Some(unit.to_uppercase()))
        }
        _ => (body, None),
    };

    let value = parse_expression(value_text)
        .map_err(|_| ParseError::unsupported(format!("interval '{}'", rendered)))?;
    Ok(Expr::Interval {
        value: Box::new(value),
        unit,
    })
}

fn lower_value(value: &ast::Value) -> ParseResult<Literal> {
    match value {
        ast::Value::Number(n, _) => Ok(Literal::Number(n.clone())),
        ast::Value::SingleQuotedString(s)
        | ast::Value::DoubleQuotedString(s)
        | ast::Value::NationalStringLiteral(s) => Ok(Literal::String(s.clone())),
        ast::Value::Boolean(b) => Ok(Literal::Boolean(*b)),
        ast::Value::Null => Ok(Literal::Null),
        other => Err(ParseError::unsupported(format!("literal {}", other))),
    }
}

fn negate_number(n: &str) -> String {
    match n.strip_prefix('-') {
        Some(positive) => positive.to_string(),
        None => format!("-{}", n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseErrorKind;

    #[test]
    fn test_simple_select() {
        let q = parse("SELECT o.id, o.status FROM orders o WHERE o.status = 'paid' LIMIT 5").unwrap();
        assert_eq!(q.branches.len(), 1);
        assert_eq!(q.limit, Some(5));
        let select = &q.branches[0];
        assert_eq!(select.projection.len(), 2);
        assert_eq!(select.binding_for("orders").as_deref(), Some("o"));
        assert_eq!(select.predicate_count(), 1);
    }

    #[test]
    fn test_non_select_is_syntax_error() {
        for sql in ["DELETE FROM orders", "DROP TABLE orders", "UPDATE orders SET status = 'x'"] {
            let err = parse(sql).unwrap_err();
            assert_eq!(err.kind, ParseErrorKind::Syntax, "{}", sql);
        }
    }

    #[test]
    fn test_multiple_statements_rejected() {
        let err = parse("SELECT 1; DROP TABLE orders").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Syntax);
    }

    #[test]
    fn test_garbage_is_syntax_error() {
        assert_eq!(parse("SELEC id FRM orders").unwrap_err().kind, ParseErrorKind::Syntax);
        assert_eq!(parse("   ").unwrap_err().kind, ParseErrorKind::Syntax);
    }

    #[test]
    fn test_cte_is_unsupported() {
        let err = parse("WITH x AS (SELECT 1) SELECT * FROM x").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Unsupported);
    }

    #[test]
    fn test_window_function_is_unsupported() {
        let err = parse("SELECT ROW_NUMBER() OVER (ORDER BY id) FROM orders").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Unsupported);
    }

    #[test]
    fn test_union_branches() {
        let q = parse("SELECT a FROM t UNION ALL SELECT b FROM u UNION SELECT c FROM v").unwrap();
        assert_eq!(q.branches.len(), 3);
        assert_eq!(q.unions, vec![UnionKind::All, UnionKind::Distinct]);
    }

    #[test]
    fn test_comma_join_becomes_cross_join() {
        let q = parse("SELECT a.x FROM a, b WHERE a.id = b.id").unwrap();
        let from = q.branches[0].from.as_ref().unwrap();
        assert_eq!(from.joins.len(), 1);
        assert_eq!(from.joins[0].kind, JoinKind::Cross);
    }

    #[test]
    fn test_negative_literal_folds() {
        let e = parse_expression("x > -5").unwrap();
        assert_eq!(
            e,
            Expr::compare(Expr::column(None, "x"), CompareOp::Gt, Expr::number("-5"))
        );
    }

    #[test]
    fn test_parse_expression_rejects_trailing_input() {
        assert!(parse_expression("a = 1 b").is_err());
        assert!(parse_expression("t.a IS NOT NULL").is_ok());
    }

    #[test]
    fn test_interval_lowering() {
        let e = parse_expression("INTERVAL 30 DAY").unwrap();
        assert_eq!(
            e,
            Expr::Interval {
                value: Box::new(Expr::number(30)),
                unit: Some("DAY".to_string()),
            }
        );
    }

    #[test]
    fn test_quoted_function_name_is_unsupported() {
        let err = parse("SELECT `x) UNION SELECT region FROM customers -- `(1) FROM orders o").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Unsupported);
        assert!(parse("SELECT DATE_FORMAT(o.created_at, '%Y-%m') FROM orders o").is_ok());
    }

    #[test]
    fn test_cast_type_must_be_keyword_type() {
        assert!(parse_expression("CAST(x AS DECIMAL(10,2))").is_ok());
        assert!(parse_expression("CAST(x AS DATE)").is_ok());
        assert!(parse_expression("CAST(x AS foo(') UNION SELECT 1 -- '))").is_err());
    }

    #[test]
    fn test_backslash_escapes_are_unescaped() {
        let e = parse_expression(r"s = 'a\\'").unwrap();
        assert_eq!(
            e,
            Expr::compare(
                Expr::column(None, "s"),
                CompareOp::Eq,
                Expr::Literal(Literal::String(r"a\".to_string()))
            )
        );
    }

    #[test]
    fn test_into_and_locking_are_kept_for_guard() {
        let q = parse("SELECT id FROM orders FOR UPDATE").unwrap();
        assert!(q.locking);
    }
}
