//! Structural equivalence between resolved expressions.
//!
//! Column references match on name when either side is unqualified. Comparisons
//! match in either operand order (with the operator mirrored), IN lists compare
//! as sets, AND/OR operands as multisets, and a quoted numeric string matches the
//! same number. No other semantic equivalence is attempted.

use crate::sql::canonical::{is_number, normalize_number};
use crate::sql::{ColumnRef, Expr, FunctionArg, Literal};

pub fn columns_match(a: &ColumnRef, b: &ColumnRef) -> bool {
    a.column.eq_ignore_ascii_case(&b.column)
        && match (&a.table, &b.table) {
            (Some(x), Some(y)) => x.eq_ignore_ascii_case(y),
            _ => true,
        }
}

pub fn literals_equivalent(a: &Literal, b: &Literal) -> bool {
    match (a, b) {
        (Literal::Number(x), Literal::Number(y)) => normalize_number(x) == normalize_number(y),
        (Literal::Number(n), Literal::String(s)) | (Literal::String(s), Literal::Number(n)) => {
            is_number(s.trim()) && normalize_number(s.trim()) == normalize_number(n)
        }
        _ => a == b,
    }
}

pub fn exprs_equivalent(a: &Expr, b: &Expr) -> bool {
    match (a, b) {
        (Expr::Column(x), Expr::Column(y)) => columns_match(x, y),
        (Expr::Literal(x), Expr::Literal(y)) => literals_equivalent(x, y),
        (
            Expr::Compare {
                left: l1,
                op: op1,
                right: r1,
            },
            Expr::Compare {
                left: l2,
                op: op2,
                right: r2,
            },
        ) => {
            (op1 == op2 && exprs_equivalent(l1, l2) && exprs_equivalent(r1, r2))
                || (*op1 == op2.mirror() && exprs_equivalent(l1, r2) && exprs_equivalent(r1, l2))
        }
        (Expr::And(x), Expr::And(y)) | (Expr::Or(x), Expr::Or(y)) => multiset_equivalent(x, y),
        (Expr::Not(x), Expr::Not(y)) | (Expr::Negate(x), Expr::Negate(y)) => exprs_equivalent(x, y),
        (
            Expr::IsNull {
                expr: x,
                negated: n1,
            },
            Expr::IsNull {
                expr: y,
                negated: n2,
            },
        ) => n1 == n2 && exprs_equivalent(x, y),
        (
            Expr::InList {
                expr: x,
                list: l1,
                negated: n1,
            },
            Expr::InList {
                expr: y,
                list: l2,
                negated: n2,
            },
        ) => n1 == n2 && exprs_equivalent(x, y) && set_equivalent(l1, l2),
        (
            Expr::Between {
                expr: x,
                low: lo1,
                high: hi1,
                negated: n1,
            },
            Expr::Between {
                expr: y,
                low: lo2,
                high: hi2,
                negated: n2,
            },
        ) => n1 == n2 && exprs_equivalent(x, y) && exprs_equivalent(lo1, lo2) && exprs_equivalent(hi1, hi2),
        (
            Expr::Like {
                expr: x,
                pattern: p1,
                negated: n1,
            },
            Expr::Like {
                expr: y,
                pattern: p2,
                negated: n2,
            },
        ) => n1 == n2 && exprs_equivalent(x, y) && exprs_equivalent(p1, p2),
        (Expr::Function(f), Expr::Function(g)) => {
            f.name.eq_ignore_ascii_case(&g.name)
                && f.distinct == g.distinct
                && f.args.len() == g.args.len()
                && f.args.iter().zip(g.args.iter()).all(|pair| match pair {
                    (FunctionArg::Star, FunctionArg::Star) => true,
                    (FunctionArg::Expr(x), FunctionArg::Expr(y)) => exprs_equivalent(x, y),
                    _ => false,
                })
        }
        (
            Expr::Arithmetic {
                left: l1,
                op: op1,
                right: r1,
            },
            Expr::Arithmetic {
                left: l2,
                op: op2,
                right: r2,
            },
        ) => op1 == op2 && exprs_equivalent(l1, l2) && exprs_equivalent(r1, r2),
        (Expr::Interval { value: v1, unit: u1 }, Expr::Interval { value: v2, unit: u2 }) => {
            exprs_equivalent(v1, v2)
                && u1.as_deref().map(str::to_lowercase) == u2.as_deref().map(str::to_lowercase)
        }
        (Expr::Cast { expr: x, data_type: t1 }, Expr::Cast { expr: y, data_type: t2 }) => {
            t1.eq_ignore_ascii_case(t2) && exprs_equivalent(x, y)
        }
        _ => a == b,
    }
}

/// Same elements regardless of order or repetition.
fn set_equivalent(a: &[Expr], b: &[Expr]) -> bool {
    a.iter().all(|x| b.iter().any(|y| exprs_equivalent(x, y)))
        && b.iter().all(|y| a.iter().any(|x| exprs_equivalent(x, y)))
}

/// Same elements regardless of order, respecting multiplicity.
fn multiset_equivalent(a: &[Expr], b: &[Expr]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    a.iter().all(|x| {
        match (0..b.len()).find(|&i| !used[i] && exprs_equivalent(x, &b[i])) {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{canonicalize_expr, parse_expression};

    fn eq(a: &str, b: &str) -> bool {
        let a = canonicalize_expr(&parse_expression(a).unwrap());
        let b = canonicalize_expr(&parse_expression(b).unwrap());
        exprs_equivalent(&a, &b)
    }

    #[test]
    fn test_operand_order_and_mirroring() {
        assert!(eq("t.a = 5", "5 = t.a"));
        assert!(eq("5 < t.x", "t.x > 5"));
        assert!(eq("t.a != 1", "t.a <> 1"));
        assert!(!eq("t.x > 5", "t.x < 5"));
    }

    #[test]
    fn test_qualification_is_lenient_one_way() {
        assert!(eq("status = 'paid'", "o.status = 'paid'"));
        assert!(!eq("o.status = 'paid'", "c.status = 'paid'"));
    }

    #[test]
    fn test_in_list_as_set() {
        assert!(eq("t.s IN ('a', 'b')", "t.s IN ('b', 'a', 'a')"));
        assert!(!eq("t.s IN ('a', 'b')", "t.s IN ('a')"));
        assert!(!eq("t.s IN ('a')", "t.s NOT IN ('a')"));
    }

    #[test]
    fn test_or_operands_as_multiset() {
        assert!(eq("t.a = 1 OR t.b = 2", "t.b = 2 OR 1 = t.a"));
        assert!(!eq("t.a = 1 OR t.b = 2", "t.a = 1 OR t.b = 3"));
    }

    #[test]
    fn test_literal_formatting() {
        assert!(eq("t.a = 1.50", "t.a = 1.5"));
        assert!(eq("t.a = '7'", "t.a = 7"));
        assert!(!eq("t.a = 'x'", "t.a = 0"));
    }

    #[test]
    fn test_functions_and_null_checks() {
        assert!(eq("COUNT(DISTINCT t.id)", "count(distinct T.ID)"));
        assert!(!eq("COUNT(t.id)", "COUNT(DISTINCT t.id)"));
        assert!(eq("NOT (t.p IS NULL)", "t.p IS NOT NULL"));
    }
}
