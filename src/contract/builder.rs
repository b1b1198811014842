//! Contract construction from a catalog, a plan and an optional column selection.

use super::{LimitPolicy, OrderingPolicy, SafetyContract};
use crate::catalog::SchemaCatalog;
use crate::config::EngineConfig;
use crate::constraints::matcher::{columns_match, exprs_equivalent};
use crate::error::{GatekeeperError, Result};
use crate::plan::Plan;
use crate::sql::{canonicalize_expr, parse_expression, ColumnRef, CompareOp, Expr};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Retrieval output: table name to the column names selected for it.
pub type ColumnSelection = BTreeMap<String, Vec<String>>;

pub struct ContractBuilder<'a> {
    catalog: &'a SchemaCatalog,
    config: &'a EngineConfig,
}

/// A plan clause parsed once for scope widening and compatibility checks.
struct ParsedClause {
    text: String,
    expr: Expr,
}

impl<'a> ContractBuilder<'a> {
    pub fn new(catalog: &'a SchemaCatalog, config: &'a EngineConfig) -> Self {
        Self { catalog, config }
    }

    /// Build the per-question contract.
    ///
    /// Allowed tables are the selected tables (every catalog table when there is
    /// no selection) plus every table the mandatory and preferred clauses name.
    /// Columns referenced by those clauses are added to the allowed columns.
    /// Optional clauses that reference out-of-scope columns or contradict a
    /// mandatory predicate are dropped.
    pub fn build(&self, plan: &Plan, selection: Option<&ColumnSelection>) -> Result<SafetyContract> {
        let mut plan = plan.clone();

        let must = self.parse_clauses(plan.must_joins.iter().chain(plan.must_predicates.iter()), true)?;
        let should = self.parse_clauses(
            plan.should_predicates.iter().chain(plan.should_projection.iter()),
            false,
        )?;
        plan.should_predicates.retain(|p| should.iter().any(|c| &c.text == p));
        plan.should_projection.retain(|p| should.iter().any(|c| &c.text == p));

        let mut columns: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        match selection {
            Some(selected) => {
                for (table, cols) in selected {
                    let Some(meta) = self.catalog.table(table) else {
                        warn!("Selected table '{}' is not in the catalog; ignoring", table);
                        continue;
                    };
                    let entry = columns.entry(meta.name.to_lowercase()).or_default();
                    for col in cols {
                        if meta.has_column(col) {
                            entry.insert(col.to_lowercase());
                        } else {
                            warn!("Selected column '{}.{}' is not in the catalog; ignoring", table, col);
                        }
                    }
                }
            }
            None => {
                for table in &self.catalog.tables {
                    columns
                        .entry(table.name.to_lowercase())
                        .or_default()
                        .extend(table.columns.iter().map(|c| c.name.to_lowercase()));
                }
            }
        }

        for table in &plan.must_tables {
            if !self.catalog.has_table(table) {
                return Err(GatekeeperError::Contract(format!(
                    "mandatory table '{}' is not in the catalog",
                    table
                )));
            }
            columns.entry(table.to_lowercase()).or_default();
        }
        for table in &plan.should_tables {
            if self.catalog.has_table(table) {
                columns.entry(table.to_lowercase()).or_default();
            } else {
                warn!("Preferred table '{}' is not in the catalog; ignoring", table);
            }
        }

        for clause in &must {
            self.widen(&mut columns, clause, true)?;
        }
        for clause in &should {
            self.widen(&mut columns, clause, false)?;
        }

        let mut contract = SafetyContract::new(Plan::default());
        contract.allowed_tables = columns.keys().cloned().collect();
        for (table, cols) in &columns {
            for col in cols {
                if self.catalog.is_temporal(table, col) {
                    contract
                        .temporal_columns
                        .entry(table.clone())
                        .or_default()
                        .insert(col.clone());
                }
            }
        }
        contract.allowed_columns = columns;

        let may_predicates = std::mem::take(&mut plan.may_predicates);
        plan.may_predicates = may_predicates
            .into_iter()
            .filter(|p| self.optional_is_compatible(&contract, &must, p))
            .collect();
        let may_projection = std::mem::take(&mut plan.may_projection);
        plan.may_projection = may_projection
            .into_iter()
            .filter(|p| self.optional_is_compatible(&contract, &must, p))
            .collect();

        contract.ordering_policy = OrderingPolicy::for_task(plan.task, self.config.permissive_ordering);
        contract.limit_policy = LimitPolicy::StripForSingleRowAggregate;
        contract.plan = plan;

        debug!(
            "Built contract: {} tables, ordering {:?}",
            contract.allowed_tables.len(),
            contract.ordering_policy
        );
        Ok(contract)
    }

    fn parse_clauses<'p>(
        &self,
        texts: impl Iterator<Item = &'p String>,
        mandatory: bool,
    ) -> Result<Vec<ParsedClause>> {
        let mut out = Vec::new();
        for text in texts {
            match parse_expression(text) {
                Ok(expr) => out.push(ParsedClause {
                    text: text.clone(),
                    expr: canonicalize_expr(&expr),
                }),
                Err(e) if mandatory => {
                    return Err(GatekeeperError::Contract(format!(
                        "mandatory clause '{}' does not parse: {}",
                        text, e.detail
                    )));
                }
                Err(e) => warn!("Dropping preferred clause '{}': {}", text, e.detail),
            }
        }
        Ok(out)
    }

    /// Adds the catalog columns a clause references to the allowed set.
    fn widen(
        &self,
        columns: &mut BTreeMap<String, BTreeSet<String>>,
        clause: &ParsedClause,
        mandatory: bool,
    ) -> Result<()> {
        for col in clause.expr.column_refs() {
            match &col.table {
                Some(table) if self.catalog.has_column(table, &col.column) => {
                    columns.entry(table.clone()).or_default().insert(col.column.clone());
                }
                Some(table) if mandatory => {
                    return Err(GatekeeperError::Contract(format!(
                        "clause '{}' references unknown column {}.{}",
                        clause.text, table, col.column
                    )));
                }
                Some(table) => {
                    warn!("Clause '{}' references unknown column {}.{}", clause.text, table, col.column);
                }
                None => {
                    let owners: Vec<String> = columns
                        .keys()
                        .filter(|t| self.catalog.has_column(t, &col.column))
                        .cloned()
                        .collect();
                    match owners.as_slice() {
                        [owner] => {
                            columns.entry(owner.clone()).or_default().insert(col.column.clone());
                        }
                        [] if mandatory => {
                            return Err(GatekeeperError::Contract(format!(
                                "clause '{}' references column '{}' that no allowed table has",
                                clause.text, col.column
                            )));
                        }
                        _ => {}
                    }
                }
            }
        }
        Ok(())
    }

    fn optional_is_compatible(&self, contract: &SafetyContract, must: &[ParsedClause], text: &str) -> bool {
        let expr = match parse_expression(text) {
            Ok(e) => canonicalize_expr(&e),
            Err(e) => {
                warn!("Dropping optional clause '{}': {}", text, e.detail);
                return false;
            }
        };

        let in_scope = expr.column_refs().iter().all(|c| match &c.table {
            Some(t) => contract.allows_column(t, &c.column),
            None => !contract.owners_of(&c.column).is_empty(),
        });
        if !in_scope {
            warn!("Dropping optional clause '{}': references columns outside the contract", text);
            return false;
        }

        if must.iter().any(|m| contradicts(&m.expr, &expr)) {
            warn!("Dropping optional clause '{}': contradicts a mandatory predicate", text);
            return false;
        }
        true
    }
}

/// `col = a` against `col = b`, or `col IS NULL` against `col IS NOT NULL`.
/// Operands may appear in either order; constants compare as the matcher does.
fn contradicts(mandatory: &Expr, optional: &Expr) -> bool {
    if let (Some((c1, v1)), Some((c2, v2))) = (column_equality(mandatory), column_equality(optional)) {
        return columns_match(c1, c2) && !exprs_equivalent(v1, v2);
    }
    match (mandatory, optional) {
        (
            Expr::IsNull {
                expr: e1,
                negated: n1,
            },
            Expr::IsNull {
                expr: e2,
                negated: n2,
            },
        ) => match (e1.as_column(), e2.as_column()) {
            (Some(c1), Some(c2)) => columns_match(c1, c2) && n1 != n2,
            _ => false,
        },
        _ => false,
    }
}

/// `col = constant` or `constant = col`.
fn column_equality(expr: &Expr) -> Option<(&ColumnRef, &Expr)> {
    match expr {
        Expr::Compare {
            left,
            op: CompareOp::Eq,
            right,
        } => match (left.as_column(), right.as_column()) {
            (Some(column), None) if right.is_constant() => Some((column, right.as_ref())),
            (None, Some(column)) if left.is_constant() => Some((column, left.as_ref())),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Table;
    use crate::plan::TaskKind;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new(vec![
            Table::new(
                "orders",
                &[("id", "bigint"), ("status", "varchar"), ("customer_id", "bigint"), ("created_at", "datetime")],
            ),
            Table::new("customers", &[("id", "bigint"), ("region", "varchar")]),
            Table::new("audit_log", &[("id", "bigint"), ("payload", "text")]),
        ])
    }

    #[test]
    fn test_selection_narrows_scope_and_plan_widens_it() {
        let catalog = catalog();
        let config = EngineConfig::default();
        let plan = Plan::new(TaskKind::Count)
            .must_table("orders")
            .must_predicate("orders.status = 'paid'");
        let mut selection = ColumnSelection::new();
        selection.insert("orders".to_string(), vec!["id".to_string()]);

        let contract = ContractBuilder::new(&catalog, &config).build(&plan, Some(&selection)).unwrap();
        assert!(contract.allows_table("orders"));
        assert!(!contract.allows_table("audit_log"));
        assert!(contract.allows_column("orders", "id"));
        assert!(contract.allows_column("orders", "status"));
        assert!(!contract.allows_column("orders", "created_at"));
    }

    #[test]
    fn test_no_selection_allows_whole_catalog() {
        let catalog = catalog();
        let config = EngineConfig::default();
        let contract = ContractBuilder::new(&catalog, &config)
            .build(&Plan::new(TaskKind::Trend), None)
            .unwrap();
        assert_eq!(contract.allowed_tables.len(), 3);
        assert!(contract.is_temporal("orders", "created_at"));
        assert_eq!(contract.ordering_policy, OrderingPolicy::RequireSingleDateColumn);
    }

    #[test]
    fn test_unknown_mandatory_table_is_contract_error() {
        let catalog = catalog();
        let config = EngineConfig::default();
        let plan = Plan::new(TaskKind::Lookup).must_table("payments");
        let err = ContractBuilder::new(&catalog, &config).build(&plan, None).unwrap_err();
        assert!(matches!(err, GatekeeperError::Contract(_)));
    }

    #[test]
    fn test_unparsable_mandatory_clause_is_contract_error() {
        let catalog = catalog();
        let config = EngineConfig::default();
        let plan = Plan::new(TaskKind::Lookup).must_predicate("orders.status = = 'x'");
        assert!(ContractBuilder::new(&catalog, &config).build(&plan, None).is_err());
    }

    #[test]
    fn test_incompatible_optional_clauses_are_dropped() {
        let catalog = catalog();
        let config = EngineConfig::default();
        let plan = Plan::new(TaskKind::Lookup)
            .must_predicate("orders.status = 'paid'")
            .may_predicate("orders.status = 'refunded'")
            .may_predicate("audit_log.payload IS NOT NULL")
            .may_predicate("orders.id > 10");
        let mut selection = ColumnSelection::new();
        selection.insert("orders".to_string(), vec!["id".to_string()]);

        let contract = ContractBuilder::new(&catalog, &config).build(&plan, Some(&selection)).unwrap();
        assert_eq!(contract.plan.may_predicates, vec!["orders.id > 10".to_string()]);
    }

    #[test]
    fn test_contradiction_ignores_operand_order_and_quoting() {
        let catalog = catalog();
        let config = EngineConfig::default();
        let plan = Plan::new(TaskKind::Lookup)
            .must_predicate("orders.id = 1")
            .may_predicate("2 = orders.id")
            .may_predicate("orders.id = '1'")
            .may_predicate("1 = orders.id")
            .may_predicate("orders.customer_id = 2");

        let contract = ContractBuilder::new(&catalog, &config).build(&plan, None).unwrap();
        assert_eq!(
            contract.plan.may_predicates,
            vec![
                "orders.id = '1'".to_string(),
                "1 = orders.id".to_string(),
                "orders.customer_id = 2".to_string(),
            ]
        );
    }

    #[test]
    fn test_permissive_ordering_keeps_order_by() {
        let catalog = catalog();
        let config = EngineConfig {
            permissive_ordering: true,
            ..EngineConfig::default()
        };
        let contract = ContractBuilder::new(&catalog, &config)
            .build(&Plan::new(TaskKind::TopK), None)
            .unwrap();
        assert_eq!(contract.ordering_policy, OrderingPolicy::Preserve);
    }
}
