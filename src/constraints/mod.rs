//! Tiered constraint checking against the plan.

pub mod matcher;
pub mod realized;
pub mod validator;

pub use realized::RealizedClauses;
pub use validator::ConstraintValidator;

use matcher::columns_match;

use crate::sql::{render_expr, ColumnRef, CompareOp, Expr, Literal};
use serde::{Deserialize, Serialize};

/// One conjunct of a plan predicate, with its column/operator/literal parts
/// when it has that shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateAtom {
    pub expr: Expr,
    pub column: Option<ColumnRef>,
    pub operator: Option<String>,
    pub literal: Option<Literal>,
}

impl PredicateAtom {
    pub fn new(expr: Expr) -> Self {
        let (column, operator, literal) = match &expr {
            Expr::Compare { left, op, right } => match (left.as_ref(), right.as_ref()) {
                (Expr::Column(c), Expr::Literal(l)) => (Some(c.clone()), Some(op.symbol().to_string()), Some(l.clone())),
                (Expr::Literal(l), Expr::Column(c)) => {
                    (Some(c.clone()), Some(op.mirror().symbol().to_string()), Some(l.clone()))
                }
                (Expr::Column(c), _) => (Some(c.clone()), Some(op.symbol().to_string()), None),
                _ => (None, Some(op.symbol().to_string()), None),
            },
            Expr::IsNull { expr: inner, negated } => (
                inner.as_column().cloned(),
                Some(if *negated { "IS NOT NULL" } else { "IS NULL" }.to_string()),
                None,
            ),
            Expr::InList { expr: inner, negated, .. } => (
                inner.as_column().cloned(),
                Some(if *negated { "NOT IN" } else { "IN" }.to_string()),
                None,
            ),
            Expr::Between { expr: inner, .. } => (inner.as_column().cloned(), Some("BETWEEN".to_string()), None),
            Expr::Like { expr: inner, .. } => (inner.as_column().cloned(), Some("LIKE".to_string()), None),
            _ => (None, None, None),
        };
        Self {
            expr,
            column,
            operator,
            literal,
        }
    }

    pub fn text(&self) -> String {
        render_expr(&self.expr)
    }
}

/// A mandatory `a.x = b.y` join, qualified with base table names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequirement {
    pub left: ColumnRef,
    pub right: ColumnRef,
}

impl JoinRequirement {
    /// Either orientation of the equality satisfies the requirement.
    pub fn matches(&self, a: &ColumnRef, b: &ColumnRef) -> bool {
        (columns_match(&self.left, a) && columns_match(&self.right, b))
            || (columns_match(&self.left, b) && columns_match(&self.right, a))
    }

    pub fn condition(&self) -> Expr {
        Expr::compare(
            Expr::Column(self.left.clone()),
            CompareOp::Eq,
            Expr::Column(self.right.clone()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requirement {
    Table { table: String },
    Join(JoinRequirement),
    Predicate(PredicateAtom),
}

impl Requirement {
    pub fn describe(&self) -> String {
        match self {
            Requirement::Table { table } => format!("table {}", table),
            Requirement::Join(join) => format!("join {}", render_expr(&join.condition())),
            Requirement::Predicate(atom) => format!("predicate {}", atom.text()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingItem {
    /// UNION branch index the item is missing from.
    pub branch: usize,
    /// Plan clause text the item came from.
    pub source: String,
    pub requirement: Requirement,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintReport {
    pub satisfied: Vec<String>,
    pub missing: Vec<MissingItem>,
}

impl ConstraintReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn summary(&self) -> String {
        self.missing
            .iter()
            .map(|m| format!("{} (branch {})", m.requirement.describe(), m.branch))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    pub satisfied: usize,
    pub total: usize,
}

impl Coverage {
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.satisfied as f64 / self.total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{canonicalize_expr, parse_expression};

    fn atom(text: &str) -> PredicateAtom {
        PredicateAtom::new(canonicalize_expr(&parse_expression(text).unwrap()))
    }

    #[test]
    fn test_atom_parts() {
        let a = atom("5 < t.x");
        assert_eq!(a.column, Some(ColumnRef::new(Some("t"), "x")));
        assert_eq!(a.operator.as_deref(), Some(">"));
        assert_eq!(a.literal, Some(Literal::Number("5".to_string())));

        let b = atom("t.p IS NOT NULL");
        assert_eq!(b.operator.as_deref(), Some("IS NOT NULL"));
        assert!(b.literal.is_none());
    }

    #[test]
    fn test_coverage_ratio() {
        assert_eq!(Coverage { satisfied: 0, total: 0 }.ratio(), 1.0);
        assert_eq!(Coverage { satisfied: 1, total: 4 }.ratio(), 0.25);
    }
}
