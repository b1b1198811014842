//! Finalizer
//!
//! Applies the contract's ordering and row-limit policies to the selected
//! statement, re-checks it with the guard and renders the SQL that leaves the
//! engine. Every change is recorded so the caller can audit it.

use crate::config::EngineConfig;
use crate::constraints::matcher::exprs_equivalent;
use crate::contract::{LimitPolicy, OrderingPolicy, SafetyContract};
use crate::error::FinalizeError;
use crate::guard::Guard;
use crate::repair::RepairAction;
use crate::scope::Scope;
use crate::sql::{render, render_expr, Expr, FunctionArg, OrderItem, ParsedStatement, Select};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Functions whose result is a date/time bucket of their first argument.
const TEMPORAL_FUNCTIONS: &[&str] = &[
    "date",
    "year",
    "month",
    "week",
    "yearweek",
    "quarter",
    "day",
    "dayofmonth",
    "hour",
    "date_format",
    "last_day",
    "to_days",
    "timestamp",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "adjustment", rename_all = "snake_case")]
pub enum Adjustment {
    StrippedOrderBy { items: usize },
    StrippedLimit { limit: u64 },
    InjectedLimit { limit: u64 },
    ClampedLimit { from: u64, to: u64 },
}

#[derive(Debug, Clone)]
pub struct Finalized {
    pub statement: ParsedStatement,
    pub sql: String,
    pub repairs: Vec<RepairAction>,
    pub adjustments: Vec<Adjustment>,
}

#[derive(Debug, Clone)]
pub struct Finalizer {
    default_limit: u64,
    max_limit: u64,
}

impl Finalizer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            default_limit: config.default_limit,
            max_limit: config.max_limit,
        }
    }

    pub fn finalize(
        &self,
        statement: &ParsedStatement,
        contract: &SafetyContract,
        guard: &Guard,
    ) -> Result<Finalized, FinalizeError> {
        let mut stmt = statement.clone();
        let mut repairs = Vec::new();
        let mut adjustments = Vec::new();

        match contract.ordering_policy {
            OrderingPolicy::Preserve => {}
            OrderingPolicy::Strip => {
                if !stmt.order_by.is_empty() {
                    adjustments.push(Adjustment::StrippedOrderBy {
                        items: stmt.order_by.len(),
                    });
                    stmt.order_by.clear();
                }
            }
            OrderingPolicy::RequireSingleDateColumn => {
                if let Some(injected) = enforce_trend_ordering(&mut stmt, contract)? {
                    repairs.push(injected);
                }
            }
        }

        // A single-row aggregate loses LIMIT and OFFSET together, so `LIMIT 0`
        // and `LIMIT 1 OFFSET 5` still return the aggregate's one row.
        let single_row = stmt.is_single_row_aggregate();
        match (contract.limit_policy, stmt.limit) {
            (LimitPolicy::StripForSingleRowAggregate, Some(limit)) if single_row => {
                adjustments.push(Adjustment::StrippedLimit { limit });
                stmt.limit = None;
                stmt.offset = None;
            }
            (LimitPolicy::StripForSingleRowAggregate, None) if single_row => {}
            (_, None) => {
                adjustments.push(Adjustment::InjectedLimit {
                    limit: self.default_limit,
                });
                stmt.limit = Some(self.default_limit);
            }
            (_, Some(limit)) if limit > self.max_limit => {
                adjustments.push(Adjustment::ClampedLimit {
                    from: limit,
                    to: self.max_limit,
                });
                stmt.limit = Some(self.max_limit);
            }
            _ => {}
        }

        let statement = guard.check(&stmt, contract).map_err(FinalizeError::GuardRejected)?;
        let sql = render(&statement);
        debug!("Finalized: {}", sql);
        Ok(Finalized {
            statement,
            sql,
            repairs,
            adjustments,
        })
    }
}

/// Validates or injects the single date/time ordering a trend needs.
fn enforce_trend_ordering(
    stmt: &mut ParsedStatement,
    contract: &SafetyContract,
) -> Result<Option<RepairAction>, FinalizeError> {
    if stmt.is_union() {
        return Err(FinalizeError::OrderingPolicy(
            "trend ordering over UNION is not supported".to_string(),
        ));
    }
    let Some(select) = stmt.branches.first() else {
        return Err(FinalizeError::OrderingPolicy("statement has no SELECT".to_string()));
    };
    let scope = Scope::of_select(select, None);
    let temporal = |expr: &Expr| is_temporal(unwrap_alias(expr, select), &scope, contract);

    let order_by = stmt.order_by.clone();
    match order_by.as_slice() {
        [] => {
            let groups: Vec<&Expr> = select.group_by.iter().filter(|e| temporal(*e)).collect();
            match groups.as_slice() {
                [only] => {
                    let expr = (*only).clone();
                    let expression = render_expr(&expr);
                    stmt.order_by.push(OrderItem {
                        expr,
                        descending: false,
                    });
                    Ok(Some(RepairAction::AddedOrdering { expression }))
                }
                _ => Err(FinalizeError::OrderingPolicy(format!(
                    "no single date/time grouping column to order by (found {})",
                    groups.len()
                ))),
            }
        }
        [item] => {
            if !temporal(&item.expr) {
                return Err(FinalizeError::OrderingPolicy(format!(
                    "ORDER BY {} is not a date/time column",
                    render_expr(&item.expr)
                )));
            }
            let ordered = unwrap_alias(&item.expr, select);
            let grouped = select.group_by.is_empty()
                || select
                    .group_by
                    .iter()
                    .any(|g| exprs_equivalent(unwrap_alias(g, select), ordered));
            if grouped {
                Ok(None)
            } else {
                Err(FinalizeError::OrderingPolicy(format!(
                    "ORDER BY {} is not a grouping column",
                    render_expr(&item.expr)
                )))
            }
        }
        items => Err(FinalizeError::OrderingPolicy(format!(
            "trend ordering must use exactly one date/time column, found {}",
            items.len()
        ))),
    }
}

/// An unqualified reference to a projection alias stands for the aliased expression.
fn unwrap_alias<'a>(expr: &'a Expr, select: &'a Select) -> &'a Expr {
    match expr {
        Expr::Column(c) if c.table.is_none() => select.projection_alias(&c.column).unwrap_or(expr),
        _ => expr,
    }
}

fn is_temporal(expr: &Expr, scope: &Scope<'_>, contract: &SafetyContract) -> bool {
    match expr {
        Expr::Column(c) => scope
            .base_table(c, contract)
            .map(|t| contract.is_temporal(&t, &c.column))
            .unwrap_or(false),
        Expr::Function(call) if TEMPORAL_FUNCTIONS.contains(&call.name.to_lowercase().as_str()) => {
            match call.args.first() {
                Some(FunctionArg::Expr(arg)) => is_temporal(arg, scope, contract),
                _ => false,
            }
        }
        Expr::Cast { expr, data_type } => {
            let ty = data_type.to_lowercase();
            (ty.starts_with("date") || ty.starts_with("time")) && is_temporal(expr, scope, contract)
        }
        _ => false,
    }
}
