//! Plan: the planner's tiered clause contract for one question.
//!
//! Joins and predicates are opaque canonical strings (`"t1.col = t2.col"`,
//! `"col IS NOT NULL"`); they are parsed and compared structurally, never verbatim.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    #[default]
    Lookup,
    Count,
    Aggregate,
    Trend,
    TopK,
    Distribution,
    Other,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Lookup => "lookup",
            TaskKind::Count => "count",
            TaskKind::Aggregate => "aggregate",
            TaskKind::Trend => "trend",
            TaskKind::TopK => "top-k",
            TaskKind::Distribution => "distribution",
            TaskKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Plan {
    pub task: TaskKind,

    // MUST: a candidate lacking any of these is rejected or repaired
    pub must_tables: Vec<String>,
    pub must_joins: Vec<String>,
    pub must_predicates: Vec<String>,

    // SHOULD: absence lowers rank, never rejects
    pub should_predicates: Vec<String>,
    pub should_projection: Vec<String>,
    pub should_tables: Vec<String>,

    // MAY: kept only when compatible with the mandatory tier
    pub may_projection: Vec<String>,
    pub may_predicates: Vec<String>,

    pub timeframe_days: Option<u32>,
}

impl Plan {
    pub fn new(task: TaskKind) -> Self {
        Self {
            task,
            ..Self::default()
        }
    }

    pub fn must_table(mut self, table: &str) -> Self {
        self.must_tables.push(table.to_string());
        self
    }

    pub fn must_join(mut self, join: &str) -> Self {
        self.must_joins.push(join.to_string());
        self
    }

    pub fn must_predicate(mut self, predicate: &str) -> Self {
        self.must_predicates.push(predicate.to_string());
        self
    }

    pub fn should_predicate(mut self, predicate: &str) -> Self {
        self.should_predicates.push(predicate.to_string());
        self
    }

    pub fn should_project(mut self, item: &str) -> Self {
        self.should_projection.push(item.to_string());
        self
    }

    pub fn may_predicate(mut self, predicate: &str) -> Self {
        self.may_predicates.push(predicate.to_string());
        self
    }

    pub fn may_project(mut self, item: &str) -> Self {
        self.may_projection.push(item.to_string());
        self
    }

    pub fn has_mandatory(&self) -> bool {
        !(self.must_tables.is_empty() && self.must_joins.is_empty() && self.must_predicates.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planner_json_deserializes() {
        let raw = r#"{
            "task": "trend",
            "must_tables": ["weak_password_app_detail"],
            "must_predicates": ["weak_password_app_detail.pass_wd IS NOT NULL"],
            "should_projection": ["DATE(weak_password_app_detail.last_find_time)"]
        }"#;
        let plan: Plan = serde_json::from_str(raw).unwrap();
        assert_eq!(plan.task, TaskKind::Trend);
        assert_eq!(plan.must_predicates.len(), 1);
        assert!(plan.may_predicates.is_empty());
        assert!(plan.has_mandatory());
    }

    #[test]
    fn test_task_kind_names() {
        let kind: TaskKind = serde_json::from_str("\"top-k\"").unwrap();
        assert_eq!(kind, TaskKind::TopK);
        assert_eq!(kind.as_str(), "top-k");
    }
}
