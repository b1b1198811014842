//! Safety Contract
//!
//! Per-question scope: the allowed tables and columns, the planner's tiered
//! clauses, and the ordering and limit policies the finalizer applies. Built
//! once per question by [`ContractBuilder`] and read-only afterwards.

pub mod builder;

pub use builder::{ColumnSelection, ContractBuilder};

use crate::plan::{Plan, TaskKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderingPolicy {
    /// Leave ORDER BY as written.
    Preserve,
    /// Remove ORDER BY.
    Strip,
    /// Exactly one date/time grouping column, injected when absent and unambiguous.
    RequireSingleDateColumn,
}

impl OrderingPolicy {
    pub fn for_task(task: TaskKind, permissive: bool) -> Self {
        match task {
            TaskKind::Trend => OrderingPolicy::RequireSingleDateColumn,
            _ if permissive => OrderingPolicy::Preserve,
            _ => OrderingPolicy::Strip,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LimitPolicy {
    /// Inject the default limit when absent, clamp when above the maximum.
    EnforceDefault,
    /// As `EnforceDefault`, but single-row aggregates lose their LIMIT and OFFSET entirely.
    #[default]
    StripForSingleRowAggregate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyContract {
    pub allowed_tables: BTreeSet<String>,
    /// Allowed columns per allowed table.
    pub allowed_columns: BTreeMap<String, BTreeSet<String>>,
    /// Allowed columns whose catalog type is date/time.
    #[serde(default)]
    pub temporal_columns: BTreeMap<String, BTreeSet<String>>,
    pub plan: Plan,
    pub ordering_policy: OrderingPolicy,
    #[serde(default)]
    pub limit_policy: LimitPolicy,
}

impl SafetyContract {
    /// Empty scope for `plan`; tables are added with [`SafetyContract::allow_table`].
    pub fn new(plan: Plan) -> Self {
        let ordering_policy = OrderingPolicy::for_task(plan.task, false);
        Self {
            allowed_tables: BTreeSet::new(),
            allowed_columns: BTreeMap::new(),
            temporal_columns: BTreeMap::new(),
            plan,
            ordering_policy,
            limit_policy: LimitPolicy::default(),
        }
    }

    pub fn allow_table(mut self, table: &str, columns: &[&str]) -> Self {
        let table = table.to_lowercase();
        self.allowed_tables.insert(table.clone());
        self.allowed_columns
            .entry(table)
            .or_default()
            .extend(columns.iter().map(|c| c.to_lowercase()));
        self
    }

    pub fn temporal(mut self, table: &str, column: &str) -> Self {
        self.temporal_columns
            .entry(table.to_lowercase())
            .or_default()
            .insert(column.to_lowercase());
        self
    }

    pub fn with_ordering_policy(mut self, policy: OrderingPolicy) -> Self {
        self.ordering_policy = policy;
        self
    }

    /// Lowercase every name; contracts read from JSON may use any casing.
    pub fn normalized(mut self) -> Self {
        let lower_set = |set: BTreeSet<String>| -> BTreeSet<String> { set.into_iter().map(|s| s.to_lowercase()).collect() };
        let lower_map = |map: BTreeMap<String, BTreeSet<String>>| {
            let mut out: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
            for (table, columns) in map {
                out.entry(table.to_lowercase())
                    .or_default()
                    .extend(columns.into_iter().map(|c| c.to_lowercase()));
            }
            out
        };
        self.allowed_tables = lower_set(self.allowed_tables);
        self.allowed_columns = lower_map(self.allowed_columns);
        self.temporal_columns = lower_map(self.temporal_columns);
        self
    }

    pub fn allows_table(&self, table: &str) -> bool {
        self.allowed_tables.contains(&table.to_lowercase())
    }

    pub fn allows_column(&self, table: &str, column: &str) -> bool {
        self.allowed_columns
            .get(&table.to_lowercase())
            .map(|cols| cols.contains(&column.to_lowercase()))
            .unwrap_or(false)
    }

    pub fn is_temporal(&self, table: &str, column: &str) -> bool {
        self.temporal_columns
            .get(&table.to_lowercase())
            .map(|cols| cols.contains(&column.to_lowercase()))
            .unwrap_or(false)
    }

    /// Allowed tables that have `column` in scope.
    pub fn owners_of(&self, column: &str) -> Vec<&str> {
        let column = column.to_lowercase();
        self.allowed_columns
            .iter()
            .filter(|(table, cols)| self.allowed_tables.contains(*table) && cols.contains(&column))
            .map(|(table, _)| table.as_str())
            .collect()
    }

    pub fn task(&self) -> TaskKind {
        self.plan.task
    }
}
