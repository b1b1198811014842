//! Minimal repair
//!
//! Adds missing mandatory joins and predicates to an otherwise valid candidate.
//! Repairs are additive only: a join brings in one new table with an inner join,
//! a predicate becomes an extra AND conjunct. Existing projections, tables and
//! predicates are never removed or rewritten. The result must pass the guard
//! and the mandatory check again before it is accepted.

use crate::config::EngineConfig;
use crate::constraints::{ConstraintValidator, JoinRequirement, MissingItem, PredicateAtom, Requirement};
use crate::contract::SafetyContract;
use crate::error::RepairFailure;
use crate::guard::Guard;
use crate::sql::{render_expr, Expr, FromClause, Join, JoinKind, ParsedStatement, Select, TableRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RepairAction {
    /// AND-ed a missing predicate into WHERE.
    AddedPredicate { branch: usize, predicate: String },
    /// Joined a table the query did not read.
    AddedJoin {
        branch: usize,
        table: String,
        condition: String,
    },
    /// Both tables were read but not related; AND-ed the equality into ON or WHERE.
    AddedJoinCondition { branch: usize, condition: String },
    /// Ordering injected by the trend ordering policy.
    AddedOrdering { expression: String },
}

#[derive(Debug, Clone)]
pub struct Repaired {
    pub statement: ParsedStatement,
    pub actions: Vec<RepairAction>,
}

#[derive(Debug, Clone)]
pub struct RepairEngine {
    budget: usize,
}

impl RepairEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            budget: config.repair_budget,
        }
    }

    pub fn repair(
        &self,
        statement: &ParsedStatement,
        missing: &[MissingItem],
        contract: &SafetyContract,
        guard: &Guard,
        validator: &ConstraintValidator,
    ) -> Result<Repaired, RepairFailure> {
        if missing.is_empty() {
            return Ok(Repaired {
                statement: statement.clone(),
                actions: Vec::new(),
            });
        }
        if missing.len() > self.budget {
            return Err(RepairFailure::OverBudget {
                missing: missing.len(),
                budget: self.budget,
            });
        }

        let mut by_branch: BTreeMap<usize, Vec<&MissingItem>> = BTreeMap::new();
        for item in missing {
            by_branch.entry(item.branch).or_default().push(item);
        }

        let mut repaired = statement.clone();
        let mut actions = Vec::new();
        for (branch, items) in by_branch {
            let select = repaired
                .branches
                .get_mut(branch)
                .ok_or_else(|| RepairFailure::Unrepairable(format!("no branch {}", branch)))?;
            repair_branch(select, branch, &items, contract, &mut actions)?;
        }

        let canonical = guard
            .check(&repaired, contract)
            .map_err(RepairFailure::GuardRejected)?;

        let report = validator.check_mandatory(&canonical, contract);
        if !report.is_complete() {
            return Err(RepairFailure::Incomplete(report.summary()));
        }

        info!("Repaired candidate with {} action(s)", actions.len());
        Ok(Repaired {
            statement: canonical,
            actions,
        })
    }
}

fn repair_branch(
    select: &mut Select,
    branch: usize,
    items: &[&MissingItem],
    contract: &SafetyContract,
    actions: &mut Vec<RepairAction>,
) -> Result<(), RepairFailure> {
    let mut joins: Vec<&JoinRequirement> = Vec::new();
    let mut tables: Vec<&str> = Vec::new();
    let mut predicates: Vec<&PredicateAtom> = Vec::new();
    for item in items {
        match &item.requirement {
            Requirement::Table { table } => tables.push(table),
            Requirement::Join(join) => joins.push(join),
            Requirement::Predicate(atom) => predicates.push(atom),
        }
    }

    // A join can only attach to a table already in FROM, and may itself bring
    // in the table another join needs, so iterate until nothing changes.
    let mut pending = joins;
    loop {
        let before = pending.len();
        let mut deferred = Vec::new();
        for join in pending {
            if !apply_join(select, branch, join, contract, actions)? {
                deferred.push(join);
            }
        }
        pending = deferred;
        if pending.is_empty() || pending.len() == before {
            break;
        }
    }
    if let Some(join) = pending.first() {
        return Err(RepairFailure::Unrepairable(format!(
            "join {} connects no table the query reads",
            render_expr(&join.condition())
        )));
    }

    for table in tables {
        if !select.reads_table(table) {
            return Err(RepairFailure::Unrepairable(format!(
                "table {} has no join path in the plan",
                table
            )));
        }
    }

    for atom in predicates {
        let predicate = rebind(&atom.expr, select)?;
        debug!("Adding predicate to branch {}: {}", branch, predicate);
        actions.push(RepairAction::AddedPredicate {
            branch,
            predicate: render_expr(&predicate),
        });
        select.add_conjunct(predicate);
    }
    Ok(())
}

/// Returns `false` when neither side of the join is read yet.
fn apply_join(
    select: &mut Select,
    branch: usize,
    join: &JoinRequirement,
    contract: &SafetyContract,
    actions: &mut Vec<RepairAction>,
) -> Result<bool, RepairFailure> {
    let left_table = join.left.table.as_deref().unwrap_or_default();
    let right_table = join.right.table.as_deref().unwrap_or_default();

    if select.from.is_none() {
        return start_from(select, branch, join, contract, actions).map(|_| true);
    }

    match (select.reads_table(left_table), select.reads_table(right_table)) {
        (true, true) => {
            relate(select, branch, join, left_table, right_table, actions)?;
            Ok(true)
        }
        (true, false) => add_join(select, branch, join, right_table, contract, actions).map(|_| true),
        (false, true) => add_join(select, branch, join, left_table, contract, actions).map(|_| true),
        (false, false) => Ok(false),
    }
}

/// Both tables are read but not related. The equality goes into the ON clause
/// of whichever was joined later when that join is inner or cross, else WHERE.
fn relate(
    select: &mut Select,
    branch: usize,
    join: &JoinRequirement,
    left_table: &str,
    right_table: &str,
    actions: &mut Vec<RepairAction>,
) -> Result<(), RepairFailure> {
    let condition = rebind(&join.condition(), select)?;
    actions.push(RepairAction::AddedJoinCondition {
        branch,
        condition: render_expr(&condition),
    });

    let later = select.from.as_mut().and_then(|from| {
        let position = |table: &str| {
            from.joins.iter().position(|j| {
                j.table
                    .table_name()
                    .map(|n| n.eq_ignore_ascii_case(table))
                    .unwrap_or(false)
            })
        };
        let index = position(left_table).max(position(right_table))?;
        from.joins.get_mut(index)
    });
    match later {
        Some(target) if matches!(target.kind, JoinKind::Inner | JoinKind::Cross) => {
            debug!("Adding join condition to ON in branch {}", branch);
            target.kind = JoinKind::Inner;
            target.on = Some(match target.on.take() {
                Some(existing) => Expr::and(vec![existing, condition]),
                None => condition,
            });
        }
        _ => select.add_conjunct(condition),
    }
    Ok(())
}

fn add_join(
    select: &mut Select,
    branch: usize,
    join: &JoinRequirement,
    new_table: &str,
    contract: &SafetyContract,
    actions: &mut Vec<RepairAction>,
) -> Result<(), RepairFailure> {
    if !contract.allows_table(new_table) {
        return Err(RepairFailure::Unrepairable(format!(
            "join needs table {} which is outside the contract",
            new_table
        )));
    }
    let from: &mut FromClause = select
        .from
        .as_mut()
        .ok_or_else(|| RepairFailure::Unrepairable("query has no FROM clause".to_string()))?;
    from.joins.push(Join {
        kind: JoinKind::Inner,
        table: TableRef::named(new_table, None),
        on: None,
    });

    let condition = rebind(&join.condition(), select)?;
    let rendered = render_expr(&condition);
    if let Some(last) = select.from.as_mut().and_then(|f| f.joins.last_mut()) {
        last.on = Some(condition);
    }
    debug!("Joining {} in branch {} on {}", new_table, branch, rendered);
    actions.push(RepairAction::AddedJoin {
        branch,
        table: new_table.to_string(),
        condition: rendered,
    });
    Ok(())
}

/// A branch without FROM gets both sides of the join.
fn start_from(
    select: &mut Select,
    branch: usize,
    join: &JoinRequirement,
    contract: &SafetyContract,
    actions: &mut Vec<RepairAction>,
) -> Result<(), RepairFailure> {
    let left_table = join.left.table.as_deref().unwrap_or_default();
    if !contract.allows_table(left_table) {
        return Err(RepairFailure::Unrepairable(format!(
            "join needs table {} which is outside the contract",
            left_table
        )));
    }
    select.from = Some(FromClause {
        base: TableRef::named(left_table, None),
        joins: Vec::new(),
    });
    let right_table = join.right.table.as_deref().unwrap_or_default();
    add_join(select, branch, join, right_table, contract, actions)
}

/// Requalifies base-table column references with the bindings the SELECT uses.
fn rebind(expr: &Expr, select: &Select) -> Result<Expr, RepairFailure> {
    let mut out = expr.clone();
    let mut unbound = None;
    out.for_each_column_mut(&mut |column| {
        if let Some(table) = column.table.clone() {
            match select.binding_for(&table) {
                Some(binding) => column.table = Some(binding),
                None => unbound = Some(table),
            }
        }
    });
    match unbound {
        Some(table) => Err(RepairFailure::Unrepairable(format!(
            "predicate {} references table {} which the query does not read",
            render_expr(expr),
            table
        ))),
        None => Ok(out),
    }
}
