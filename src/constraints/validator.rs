//! Constraint Validator
//!
//! Compiles the plan's clauses once per question and checks candidates against
//! them: mandatory items decide accept/repair, preferred items produce a
//! coverage score for ranking.

use super::matcher::exprs_equivalent;
use super::realized::{resolve_plan_columns, RealizedClauses};
use super::{ConstraintReport, Coverage, JoinRequirement, MissingItem, PredicateAtom, Requirement};
use crate::contract::SafetyContract;
use crate::error::{GatekeeperError, Result};
use crate::error::ParseError;
use crate::sql::{canonicalize_expr, parse_condition, parse_expression, CompareOp, Expr, ParsedStatement};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ConstraintValidator {
    must_tables: Vec<String>,
    must_joins: Vec<(String, JoinRequirement)>,
    must_predicates: Vec<(String, PredicateAtom)>,
    should_predicates: Vec<Expr>,
    should_projection: Vec<Expr>,
    should_tables: Vec<String>,
    optional: Vec<String>,
}

impl ConstraintValidator {
    /// Compile the contract's plan. A mandatory clause that does not parse, or a
    /// join that is not a qualified column equality, is a contract error.
    pub fn new(contract: &SafetyContract) -> Result<Self> {
        let plan = &contract.plan;

        let mut must_joins = Vec::new();
        for text in &plan.must_joins {
            for conjunct in compile(text, contract, parse_condition)?.into_conjuncts() {
                must_joins.push((text.clone(), join_requirement(text, &conjunct)?));
            }
        }

        let mut must_predicates = Vec::new();
        for text in &plan.must_predicates {
            for conjunct in compile(text, contract, parse_condition)?.into_conjuncts() {
                must_predicates.push((text.clone(), PredicateAtom::new(conjunct)));
            }
        }

        let should_predicates = plan
            .should_predicates
            .iter()
            .filter_map(|text| compile_optional(text, contract, parse_condition))
            .flat_map(|e| e.into_conjuncts())
            .collect();
        let should_projection = plan
            .should_projection
            .iter()
            .filter_map(|text| compile_optional(text, contract, parse_expression))
            .collect();

        Ok(Self {
            must_tables: plan.must_tables.iter().map(|t| t.to_lowercase()).collect(),
            must_joins,
            must_predicates,
            should_predicates,
            should_projection,
            should_tables: plan.should_tables.iter().map(|t| t.to_lowercase()).collect(),
            optional: plan
                .may_predicates
                .iter()
                .chain(plan.may_projection.iter())
                .cloned()
                .collect(),
        })
    }

    /// Optional clauses the contract kept; informational only.
    pub fn optional_applicable(&self) -> &[String] {
        &self.optional
    }

    /// Mandatory items satisfied by every branch, and those missing per branch.
    /// Missing items are ordered tables, joins, predicates.
    pub fn check_mandatory(&self, statement: &ParsedStatement, contract: &SafetyContract) -> ConstraintReport {
        let realized: Vec<RealizedClauses> = statement
            .branches
            .iter()
            .map(|b| RealizedClauses::of(b, contract))
            .collect();
        let mut report = ConstraintReport::default();

        for table in &self.must_tables {
            let requirement = Requirement::Table { table: table.clone() };
            self.record(&mut report, &realized, table, &requirement, |r| r.tables.contains(table));
        }
        for (source, join) in &self.must_joins {
            let requirement = Requirement::Join(join.clone());
            self.record(&mut report, &realized, source, &requirement, |r| {
                r.joins.iter().any(|(a, b)| join.matches(a, b))
            });
        }
        for (source, atom) in &self.must_predicates {
            let requirement = Requirement::Predicate(atom.clone());
            self.record(&mut report, &realized, source, &requirement, |r| {
                r.predicates.iter().any(|p| exprs_equivalent(&atom.expr, p))
            });
        }
        report
    }

    fn record(
        &self,
        report: &mut ConstraintReport,
        realized: &[RealizedClauses],
        source: &str,
        requirement: &Requirement,
        satisfied: impl Fn(&RealizedClauses) -> bool,
    ) {
        let mut all = true;
        for (branch, clauses) in realized.iter().enumerate() {
            if !satisfied(clauses) {
                all = false;
                report.missing.push(MissingItem {
                    branch,
                    source: source.to_string(),
                    requirement: requirement.clone(),
                });
            }
        }
        if all {
            report.satisfied.push(requirement.describe());
        }
    }

    /// Preferred-tier coverage; for UNION the weakest branch counts.
    pub fn coverage(&self, statement: &ParsedStatement, contract: &SafetyContract) -> Coverage {
        let total = self.should_predicates.len() + self.should_projection.len() + self.should_tables.len();
        let satisfied = statement
            .branches
            .iter()
            .map(|branch| {
                let r = RealizedClauses::of(branch, contract);
                let predicates = self
                    .should_predicates
                    .iter()
                    .filter(|p| r.predicates.iter().any(|q| exprs_equivalent(p, q)))
                    .count();
                let projection = self
                    .should_projection
                    .iter()
                    .filter(|p| r.projection.iter().any(|q| exprs_equivalent(p, q)))
                    .count();
                let tables = self.should_tables.iter().filter(|t| r.tables.contains(*t)).count();
                predicates + projection + tables
            })
            .min()
            .unwrap_or(0);
        Coverage { satisfied, total }
    }
}

type ClauseParser = fn(&str) -> std::result::Result<Expr, ParseError>;

fn compile(text: &str, contract: &SafetyContract, parse: ClauseParser) -> Result<Expr> {
    let expr = parse(text)
        .map_err(|e| GatekeeperError::Contract(format!("clause '{}' does not parse: {}", text, e.detail)))?;
    Ok(resolve_plan_columns(&canonicalize_expr(&expr), contract))
}

fn compile_optional(text: &str, contract: &SafetyContract, parse: ClauseParser) -> Option<Expr> {
    match compile(text, contract, parse) {
        Ok(expr) => Some(expr),
        Err(e) => {
            warn!("Ignoring preferred clause: {}", e);
            None
        }
    }
}

fn join_requirement(text: &str, expr: &Expr) -> Result<JoinRequirement> {
    if let Expr::Compare {
        left,
        op: CompareOp::Eq,
        right,
    } = expr
    {
        if let (Some(l), Some(r)) = (left.as_column(), right.as_column()) {
            if l.table.is_some() && r.table.is_some() {
                return Ok(JoinRequirement {
                    left: l.clone(),
                    right: r.clone(),
                });
            }
        }
    }
    Err(GatekeeperError::Contract(format!(
        "join '{}' must be an equality between two table-qualified columns",
        text
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Plan, TaskKind};
    use crate::sql::{canonicalize, parse};

    fn contract(plan: Plan) -> SafetyContract {
        SafetyContract::new(plan)
            .allow_table("orders", &["id", "status", "customer_id", "amount"])
            .allow_table("customers", &["id", "region"])
    }

    fn report(plan: Plan, sql: &str) -> ConstraintReport {
        let c = contract(plan);
        let v = ConstraintValidator::new(&c).unwrap();
        v.check_mandatory(&canonicalize(&parse(sql).unwrap()), &c)
    }

    #[test]
    fn test_satisfied_via_alias_and_reordering() {
        let plan = Plan::new(TaskKind::Lookup)
            .must_table("orders")
            .must_join("customers.id = orders.customer_id")
            .must_predicate("orders.status = 'paid' AND orders.amount > 10");
        let r = report(
            plan,
            "SELECT o.id FROM orders o JOIN customers c ON o.customer_id = c.id WHERE 10 < o.amount AND o.status = 'paid'",
        );
        assert!(r.is_complete(), "missing: {:?}", r.missing);
        assert_eq!(r.satisfied.len(), 4);
    }

    #[test]
    fn test_missing_items_reported_per_kind() {
        let plan = Plan::new(TaskKind::Lookup)
            .must_join("orders.customer_id = customers.id")
            .must_predicate("orders.status = 'paid'");
        let r = report(plan, "SELECT o.id FROM orders o");
        assert_eq!(r.missing.len(), 2);
        assert!(matches!(r.missing[0].requirement, Requirement::Join(_)));
        assert!(matches!(r.missing[1].requirement, Requirement::Predicate(_)));
    }

    #[test]
    fn test_union_checks_each_branch() {
        let plan = Plan::new(TaskKind::Lookup).must_predicate("orders.status = 'paid'");
        let r = report(
            plan,
            "SELECT o.id FROM orders o WHERE o.status = 'paid' UNION SELECT o.id FROM orders o WHERE o.amount > 1",
        );
        assert_eq!(r.missing.len(), 1);
        assert_eq!(r.missing[0].branch, 1);
        assert!(r.satisfied.is_empty());
    }

    #[test]
    fn test_join_must_be_qualified_equality() {
        let c = contract(Plan::new(TaskKind::Lookup).must_join("orders.amount > customers.id"));
        assert!(matches!(ConstraintValidator::new(&c), Err(GatekeeperError::Contract(_))));
    }

    #[test]
    fn test_coverage_counts_preferred_items() {
        let plan = Plan::new(TaskKind::Lookup)
            .should_predicate("orders.status = 'paid'")
            .should_project("orders.amount");
        let c = contract(plan);
        let v = ConstraintValidator::new(&c).unwrap();
        let full = canonicalize(&parse("SELECT o.amount FROM orders o WHERE o.status = 'paid'").unwrap());
        let partial = canonicalize(&parse("SELECT o.id FROM orders o WHERE o.status = 'paid'").unwrap());
        assert_eq!(v.coverage(&full, &c), Coverage { satisfied: 2, total: 2 });
        assert_eq!(v.coverage(&partial, &c), Coverage { satisfied: 1, total: 2 });
    }

    #[test]
    fn test_plan_clause_must_be_condition() {
        let c = contract(Plan::new(TaskKind::Lookup).must_predicate("orders.amount + 1"));
        assert!(matches!(ConstraintValidator::new(&c), Err(GatekeeperError::Contract(_))));

        let c = contract(Plan::new(TaskKind::Lookup).may_predicate("orders.amount > 5"));
        let v = ConstraintValidator::new(&c).unwrap();
        assert_eq!(v.optional_applicable().to_vec(), vec!["orders.amount > 5".to_string()]);
    }
}
