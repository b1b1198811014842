//! Clauses a candidate branch actually realizes, with column references
//! resolved to base tables.

use crate::contract::SafetyContract;
use crate::scope::Scope;
use crate::sql::{ColumnRef, CompareOp, Expr, JoinKind, Query, Select, TableSource};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct RealizedClauses {
    /// Base tables read anywhere in the branch, including subqueries.
    pub tables: BTreeSet<String>,
    /// Column equalities from ON clauses and cross-table WHERE conjuncts.
    pub joins: Vec<(ColumnRef, ColumnRef)>,
    /// Filtering conjuncts: WHERE plus the non-join part of inner ON clauses.
    pub predicates: Vec<Expr>,
    pub projection: Vec<Expr>,
}

impl RealizedClauses {
    pub fn of(select: &Select, contract: &SafetyContract) -> Self {
        let scope = Scope::of_select(select, None);
        let resolve = |expr: &Expr| resolve_columns(expr, &scope, contract);
        let mut out = RealizedClauses::default();

        collect_select_tables(select, &mut out.tables);

        if let Some(from) = &select.from {
            for join in &from.joins {
                let Some(on) = &join.on else { continue };
                for conjunct in on.conjuncts() {
                    let resolved = resolve(conjunct);
                    match column_equality(&resolved) {
                        Some(pair) => out.joins.push(pair),
                        None if matches!(join.kind, JoinKind::Inner | JoinKind::Cross) => {
                            out.predicates.push(resolved)
                        }
                        None => {}
                    }
                }
            }
        }

        if let Some(selection) = &select.selection {
            for conjunct in selection.conjuncts() {
                let resolved = resolve(conjunct);
                if let Some((left, right)) = column_equality(&resolved) {
                    if left.table.is_some() && right.table.is_some() && left.table != right.table {
                        out.joins.push((left, right));
                    }
                }
                out.predicates.push(resolved);
            }
        }

        out.projection = select
            .projection
            .iter()
            .filter_map(|item| item.expr())
            .map(resolve)
            .collect();
        out
    }
}

/// Rewrites qualifiers to base table names where the column resolves to one.
pub fn resolve_columns(expr: &Expr, scope: &Scope<'_>, contract: &SafetyContract) -> Expr {
    let mut out = expr.clone();
    out.for_each_column_mut(&mut |column| {
        if let Some(table) = scope.base_table(column, contract) {
            column.table = Some(table);
        }
    });
    out
}

/// Qualifies unqualified columns that exactly one allowed table owns.
pub fn resolve_plan_columns(expr: &Expr, contract: &SafetyContract) -> Expr {
    let mut out = expr.clone();
    out.for_each_column_mut(&mut |column| {
        if column.table.is_none() {
            if let [owner] = contract.owners_of(&column.column).as_slice() {
                column.table = Some(owner.to_string());
            }
        }
    });
    out
}

fn column_equality(expr: &Expr) -> Option<(ColumnRef, ColumnRef)> {
    match expr {
        Expr::Compare {
            left,
            op: CompareOp::Eq,
            right,
        } => match (left.as_column(), right.as_column()) {
            (Some(l), Some(r)) => Some((l.clone(), r.clone())),
            _ => None,
        },
        _ => None,
    }
}

fn collect_select_tables(select: &Select, out: &mut BTreeSet<String>) {
    if let Some(from) = &select.from {
        for table in from.tables() {
            match &table.source {
                TableSource::Named(name) => {
                    out.insert(name.to_lowercase());
                }
                TableSource::Derived(q) => collect_query_tables(q, out),
            }
        }
        for join in &from.joins {
            if let Some(on) = &join.on {
                collect_expr_tables(on, out);
            }
        }
    }
    for expr in select
        .projection
        .iter()
        .filter_map(|item| item.expr())
        .chain(select.selection.iter())
        .chain(select.group_by.iter())
        .chain(select.having.iter())
    {
        collect_expr_tables(expr, out);
    }
}

fn collect_query_tables(query: &Query, out: &mut BTreeSet<String>) {
    for branch in &query.branches {
        collect_select_tables(branch, out);
    }
}

fn collect_expr_tables(expr: &Expr, out: &mut BTreeSet<String>) {
    if let Some(sub) = expr.subquery() {
        collect_query_tables(sub, out);
    }
    for child in expr.children() {
        collect_expr_tables(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Plan, TaskKind};
    use crate::sql::{canonicalize, parse, render_expr};

    fn contract() -> SafetyContract {
        SafetyContract::new(Plan::new(TaskKind::Lookup))
            .allow_table("orders", &["id", "status", "customer_id"])
            .allow_table("customers", &["id", "region"])
    }

    fn realize(sql: &str) -> RealizedClauses {
        let q = canonicalize(&parse(sql).unwrap());
        RealizedClauses::of(&q.branches[0], &contract())
    }

    #[test]
    fn test_aliases_resolve_to_base_tables() {
        let r = realize("SELECT o.id FROM orders o JOIN customers c ON o.customer_id = c.id WHERE status = 'paid'");
        assert_eq!(r.joins.len(), 1);
        assert_eq!(r.joins[0].0, ColumnRef::new(Some("orders"), "customer_id"));
        assert_eq!(r.joins[0].1, ColumnRef::new(Some("customers"), "id"));
        assert_eq!(render_expr(&r.predicates[0]), "orders.status = 'paid'");
    }

    #[test]
    fn test_where_equality_counts_as_join() {
        let r = realize("SELECT o.id FROM orders o, customers c WHERE o.customer_id = c.id");
        assert_eq!(r.joins.len(), 1);
    }

    #[test]
    fn test_left_join_on_filters_are_not_predicates() {
        let r = realize("SELECT o.id FROM orders o LEFT JOIN customers c ON o.customer_id = c.id AND c.region = 'eu'");
        assert_eq!(r.joins.len(), 1);
        assert!(r.predicates.is_empty());
    }

    #[test]
    fn test_subquery_tables_are_collected() {
        let r = realize("SELECT o.id FROM orders o WHERE o.customer_id IN (SELECT c.id FROM customers c)");
        assert!(r.tables.contains("customers"));
        assert!(r.tables.contains("orders"));
    }
}
