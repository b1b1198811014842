//! Name resolution for one SELECT.
//!
//! Maps the bindings a SELECT introduces (aliases, bare table names, derived
//! tables) to what they read, and resolves column references against them.
//! Correlated subqueries see their parent scope.

use crate::contract::SafetyContract;
use crate::sql::{ColumnRef, Select, TableSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySource {
    /// A base table (lowercased name).
    Table(String),
    /// A derived table exposing these output column names.
    Derived(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct ScopeEntry {
    pub binding: String,
    pub source: EntrySource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Column of an allowed base table.
    Table(String),
    /// Column exposed by a derived table.
    Derived,
    /// Unqualified and present in more than one table of the same scope.
    Ambiguous,
    /// The qualifier is not bound by any enclosing FROM.
    UnknownQualifier,
    /// Bound qualifier, but the column is not in scope for it.
    Unresolved,
}

#[derive(Debug)]
pub struct Scope<'p> {
    entries: Vec<ScopeEntry>,
    parent: Option<&'p Scope<'p>>,
}

impl<'p> Scope<'p> {
    pub fn of_select(select: &Select, parent: Option<&'p Scope<'p>>) -> Self {
        let mut entries = Vec::new();
        if let Some(from) = &select.from {
            for table in from.tables() {
                match &table.source {
                    TableSource::Named(name) => entries.push(ScopeEntry {
                        binding: table.alias.clone().unwrap_or_else(|| name.clone()).to_lowercase(),
                        source: EntrySource::Table(name.to_lowercase()),
                    }),
                    TableSource::Derived(query) => {
                        let columns = query
                            .branches
                            .first()
                            .map(|b| {
                                b.projection
                                    .iter()
                                    .filter_map(|item| item.output_name())
                                    .map(|n| n.to_lowercase())
                                    .collect()
                            })
                            .unwrap_or_default();
                        if let Some(alias) = &table.alias {
                            entries.push(ScopeEntry {
                                binding: alias.to_lowercase(),
                                source: EntrySource::Derived(columns),
                            });
                        }
                    }
                }
            }
        }
        Self { entries, parent }
    }

    pub fn entries(&self) -> &[ScopeEntry] {
        &self.entries
    }

    pub fn lookup(&self, binding: &str) -> Option<&ScopeEntry> {
        let binding = binding.to_lowercase();
        self.entries
            .iter()
            .find(|e| e.binding == binding)
            .or_else(|| self.parent.and_then(|p| p.lookup(&binding)))
    }

    /// Base tables read directly by this scope, in FROM order.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|e| match &e.source {
            EntrySource::Table(t) => Some(t.as_str()),
            EntrySource::Derived(_) => None,
        })
    }

    pub fn resolve(&self, column: &ColumnRef, contract: &SafetyContract) -> Resolution {
        let name = column.column.to_lowercase();
        match &column.table {
            Some(qualifier) => match self.lookup(qualifier) {
                None => Resolution::UnknownQualifier,
                Some(entry) => match &entry.source {
                    EntrySource::Table(t) if contract.allows_column(t, &name) => Resolution::Table(t.clone()),
                    EntrySource::Derived(cols) if cols.contains(&name) => Resolution::Derived,
                    _ => Resolution::Unresolved,
                },
            },
            None => {
                let matches: Vec<&ScopeEntry> = self
                    .entries
                    .iter()
                    .filter(|e| match &e.source {
                        EntrySource::Table(t) => contract.allows_column(t, &name),
                        EntrySource::Derived(cols) => cols.contains(&name),
                    })
                    .collect();
                match matches.as_slice() {
                    [] => match self.parent {
                        Some(parent) => parent.resolve(column, contract),
                        None => Resolution::Unresolved,
                    },
                    [only] => match &only.source {
                        EntrySource::Table(t) => Resolution::Table(t.clone()),
                        EntrySource::Derived(_) => Resolution::Derived,
                    },
                    _ => Resolution::Ambiguous,
                }
            }
        }
    }

    /// Base table the column belongs to, when it resolves to exactly one.
    pub fn base_table(&self, column: &ColumnRef, contract: &SafetyContract) -> Option<String> {
        match self.resolve(column, contract) {
            Resolution::Table(t) => Some(t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Plan, TaskKind};
    use crate::sql::parse;

    fn contract() -> SafetyContract {
        SafetyContract::new(Plan::new(TaskKind::Lookup))
            .allow_table("orders", &["id", "status", "customer_id"])
            .allow_table("customers", &["id", "region"])
    }

    #[test]
    fn test_alias_and_unqualified_resolution() {
        let q = parse("SELECT o.id FROM orders o JOIN customers c ON o.customer_id = c.id").unwrap();
        let scope = Scope::of_select(&q.branches[0], None);
        let c = contract();
        assert_eq!(scope.resolve(&ColumnRef::new(Some("o"), "status"), &c), Resolution::Table("orders".into()));
        assert_eq!(scope.resolve(&ColumnRef::new(None, "region"), &c), Resolution::Table("customers".into()));
        assert_eq!(scope.resolve(&ColumnRef::new(None, "id"), &c), Resolution::Ambiguous);
        assert_eq!(scope.resolve(&ColumnRef::new(Some("x"), "id"), &c), Resolution::UnknownQualifier);
        assert_eq!(scope.resolve(&ColumnRef::new(Some("c"), "status"), &c), Resolution::Unresolved);
    }

    #[test]
    fn test_derived_table_columns() {
        let q = parse("SELECT t.n FROM (SELECT COUNT(*) AS n, status FROM orders GROUP BY status) AS t").unwrap();
        let scope = Scope::of_select(&q.branches[0], None);
        let c = contract();
        assert_eq!(scope.resolve(&ColumnRef::new(Some("t"), "n"), &c), Resolution::Derived);
        assert_eq!(scope.resolve(&ColumnRef::new(None, "status"), &c), Resolution::Derived);
        assert_eq!(scope.resolve(&ColumnRef::new(Some("t"), "id"), &c), Resolution::Unresolved);
    }

    #[test]
    fn test_correlated_lookup_reaches_parent() {
        let outer = parse("SELECT o.id FROM orders o").unwrap();
        let inner = parse("SELECT 1 FROM customers c").unwrap();
        let parent = Scope::of_select(&outer.branches[0], None);
        let child = Scope::of_select(&inner.branches[0], Some(&parent));
        let c = contract();
        assert_eq!(child.resolve(&ColumnRef::new(Some("o"), "status"), &c), Resolution::Table("orders".into()));
        assert_eq!(child.resolve(&ColumnRef::new(None, "status"), &c), Resolution::Table("orders".into()));
    }
}
