//! Guard Validator
//!
//! Security and shape policy for a parsed candidate. Every violation is
//! collected so one rejection reports all of them. A statement that passes is
//! returned in canonical form.

use super::alias_policy::AliasPolicy;
use super::join_graph::join_depth;
use crate::config::EngineConfig;
use crate::contract::SafetyContract;
use crate::error::{GuardRejection, GuardViolation, ViolationKind};
use crate::scope::{EntrySource, Resolution, Scope};
use crate::sql::{canonicalize, ColumnRef, Expr, ParsedStatement, Query, Select, SelectItem, TableSource};
use tracing::debug;

/// Functions with effects outside the read (sleeping, locking, file access).
const SIDE_EFFECT_FUNCTIONS: &[&str] = &[
    "sleep",
    "benchmark",
    "load_file",
    "get_lock",
    "release_lock",
    "release_all_locks",
    "master_pos_wait",
    "source_pos_wait",
    "sys_exec",
    "sys_eval",
];

pub type GuardOutcome = std::result::Result<ParsedStatement, GuardRejection>;

#[derive(Debug, Clone)]
pub struct Guard {
    max_joins: usize,
    max_join_depth: usize,
    max_predicate_depth: usize,
    max_subquery_depth: usize,
    aliases: AliasPolicy,
}

impl Guard {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_joins: config.max_joins,
            max_join_depth: config.max_join_depth,
            max_predicate_depth: config.max_predicate_depth,
            max_subquery_depth: config.max_subquery_depth,
            aliases: AliasPolicy::new(&config.extra_aliases),
        }
    }

    /// Check `statement` against the contract; on success return its canonical form.
    pub fn check(&self, statement: &ParsedStatement, contract: &SafetyContract) -> GuardOutcome {
        let canonical = canonicalize(statement);
        let mut walk = GuardWalk {
            guard: self,
            contract,
            violations: Vec::new(),
        };
        walk.query(&canonical, None, 0);

        if walk.violations.is_empty() {
            Ok(canonical)
        } else {
            debug!("Guard rejected statement with {} violation(s)", walk.violations.len());
            Err(GuardRejection {
                violations: walk.violations,
            })
        }
    }
}

struct GuardWalk<'g> {
    guard: &'g Guard,
    contract: &'g SafetyContract,
    violations: Vec<GuardViolation>,
}

impl<'g> GuardWalk<'g> {
    fn report(&mut self, kind: ViolationKind, detail: String) {
        let violation = GuardViolation::new(kind, detail);
        if !self.violations.contains(&violation) {
            self.violations.push(violation);
        }
    }

    fn query(&mut self, query: &Query, parent: Option<&Scope<'_>>, depth: usize) {
        if depth > self.guard.max_subquery_depth {
            self.report(
                ViolationKind::StructuralLimit,
                format!("subquery nesting exceeds {}", self.guard.max_subquery_depth),
            );
            return;
        }
        if query.locking {
            self.report(ViolationKind::MutatingOperation, "locking read (FOR UPDATE)".to_string());
        }

        for branch in &query.branches {
            self.select(branch, parent, depth);
        }

        // ORDER BY of a query sees the first branch's tables and output aliases.
        if let Some(first) = query.branches.first() {
            let scope = Scope::of_select(first, parent);
            for item in &query.order_by {
                self.root_expr(&item.expr, &scope, Some(first), depth);
            }
        }
    }

    fn select(&mut self, select: &Select, parent: Option<&Scope<'_>>, depth: usize) {
        if let Some(into) = &select.into {
            self.report(ViolationKind::MutatingOperation, format!("SELECT ... INTO {}", into));
        }

        let scope = Scope::of_select(select, parent);

        if let Some(from) = &select.from {
            if from.joins.len() > self.guard.max_joins {
                self.report(
                    ViolationKind::StructuralLimit,
                    format!("{} joins exceed the limit of {}", from.joins.len(), self.guard.max_joins),
                );
            }
            let graph_depth = join_depth(from);
            if graph_depth > self.guard.max_join_depth {
                self.report(
                    ViolationKind::StructuralLimit,
                    format!("join graph depth {} exceeds {}", graph_depth, self.guard.max_join_depth),
                );
            }

            for table in from.tables() {
                match &table.source {
                    TableSource::Named(name) => {
                        if !self.contract.allows_table(name) {
                            self.report(ViolationKind::UnknownTable, name.clone());
                        }
                        if let Some(alias) = &table.alias {
                            if !self.guard.aliases.permits(alias, &[name.as_str()]) {
                                self.report(ViolationKind::AliasPolicy, format!("table alias '{}' for {}", alias, name));
                            }
                        }
                    }
                    TableSource::Derived(sub) => {
                        self.query(sub, None, depth + 1);
                        if let Some(alias) = &table.alias {
                            let sources: Vec<&str> = sub
                                .branches
                                .iter()
                                .filter_map(|b| b.from.as_ref())
                                .flat_map(|f| f.tables().filter_map(|t| t.table_name()))
                                .collect();
                            if !self.guard.aliases.permits(alias, &sources) {
                                self.report(ViolationKind::AliasPolicy, format!("derived table alias '{}'", alias));
                            }
                        }
                    }
                }
            }

            for join in &from.joins {
                if let Some(on) = &join.on {
                    self.root_expr(on, &scope, None, depth);
                }
            }
        }

        for item in &select.projection {
            match item {
                SelectItem::Wildcard { qualifier } => {
                    let detail = match qualifier {
                        Some(q) => format!("SELECT {}.*", q),
                        None => "SELECT *".to_string(),
                    };
                    self.report(ViolationKind::WildcardProjection, detail);
                }
                SelectItem::Expr { expr, alias } => {
                    self.root_expr(expr, &scope, None, depth);
                    if let Some(alias) = alias {
                        let sources = alias_sources(expr);
                        let sources: Vec<&str> = sources.iter().map(String::as_str).collect();
                        if !self.guard.aliases.permits(alias, &sources) {
                            self.report(ViolationKind::AliasPolicy, format!("projection alias '{}'", alias));
                        }
                    }
                }
            }
        }

        if let Some(selection) = &select.selection {
            self.root_expr(selection, &scope, None, depth);
        }
        for expr in &select.group_by {
            self.root_expr(expr, &scope, Some(select), depth);
        }
        if let Some(having) = &select.having {
            self.root_expr(having, &scope, Some(select), depth);
        }
    }

    fn root_expr(&mut self, expr: &Expr, scope: &Scope<'_>, aliases_from: Option<&Select>, depth: usize) {
        let expr_depth = expr.depth();
        if expr_depth > self.guard.max_predicate_depth {
            self.report(
                ViolationKind::StructuralLimit,
                format!("expression depth {} exceeds {}", expr_depth, self.guard.max_predicate_depth),
            );
        }
        self.expr(expr, scope, aliases_from, depth);
    }

    fn expr(&mut self, expr: &Expr, scope: &Scope<'_>, aliases_from: Option<&Select>, depth: usize) {
        match expr {
            Expr::Column(column) => self.column(column, scope, aliases_from),
            Expr::Function(call) if SIDE_EFFECT_FUNCTIONS.contains(&call.name.as_str()) => {
                self.report(ViolationKind::MutatingOperation, format!("function {}()", call.name));
            }
            _ => {}
        }
        if let Some(sub) = expr.subquery() {
            self.query(sub, Some(scope), depth + 1);
        }
        for child in expr.children() {
            self.expr(child, scope, aliases_from, depth);
        }
    }

    fn column(&mut self, column: &ColumnRef, scope: &Scope<'_>, aliases_from: Option<&Select>) {
        match scope.resolve(column, self.contract) {
            Resolution::Table(_) | Resolution::Derived | Resolution::Ambiguous => {}
            Resolution::UnknownQualifier => {
                let qualifier = column.table.as_deref().unwrap_or_default();
                self.report(ViolationKind::UnknownTable, format!("unbound qualifier '{}' in {}", qualifier, column));
            }
            Resolution::Unresolved => {
                if column.table.is_none()
                    && aliases_from
                        .map(|s| s.projection_alias(&column.column).is_some())
                        .unwrap_or(false)
                {
                    return;
                }
                // Columns of a disallowed table were already reported as an unknown table.
                if let Some(entry) = column.table.as_deref().and_then(|q| scope.lookup(q)) {
                    if let EntrySource::Table(t) = &entry.source {
                        if !self.contract.allows_table(t) {
                            return;
                        }
                    }
                }
                self.report(ViolationKind::UnknownColumn, column.to_string());
            }
        }
    }
}

/// Names a projection alias may be derived from.
fn alias_sources(expr: &Expr) -> Vec<String> {
    let mut out: Vec<String> = expr.column_refs().iter().map(|c| c.column.clone()).collect();
    collect_function_names(expr, &mut out);
    out
}

fn collect_function_names(expr: &Expr, out: &mut Vec<String>) {
    if let Expr::Function(call) = expr {
        out.push(call.name.clone());
    }
    for child in expr.children() {
        collect_function_names(child, out);
    }
}
