//! Alias policy
//!
//! An alias is accepted when it is a short alias (`o`, `t1`), a configured
//! mnemonic (`cnt`, `total`, `dt`, ...), or derived from a name it stands for:
//! the name itself, its underscore initials (`order_items` -> `oi`), a prefix of
//! at least two letters, or a mnemonic/aggregate affix around a referenced column
//! (`total_amount`, `app_count`). Anything else is a fabricated label.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

/// Mnemonics accepted without a derivation source.
pub const DEFAULT_ALIASES: &[&str] = &["d", "date", "cnt", "count", "total", "num", "dt", "day"];

const AGGREGATE_AFFIXES: &[&str] = &["count", "cnt", "sum", "total", "avg", "min", "max", "num"];

lazy_static! {
    static ref SHORT_ALIAS: Regex = Regex::new(r"^[a-z][0-9]?$").unwrap();
}

#[derive(Debug, Clone)]
pub struct AliasPolicy {
    mnemonics: BTreeSet<String>,
}

impl AliasPolicy {
    pub fn new(extra: &[String]) -> Self {
        let mut mnemonics: BTreeSet<String> = DEFAULT_ALIASES.iter().map(|a| a.to_string()).collect();
        mnemonics.extend(extra.iter().map(|a| a.trim().to_lowercase()).filter(|a| !a.is_empty()));
        Self { mnemonics }
    }

    /// Whether `alias` may label something derived from `sources`
    /// (table names for table aliases; referenced columns and function names
    /// for projection aliases).
    pub fn permits(&self, alias: &str, sources: &[&str]) -> bool {
        let alias = alias.to_lowercase();
        if SHORT_ALIAS.is_match(&alias) || self.mnemonics.contains(&alias) {
            return true;
        }
        sources.iter().any(|source| self.derives_from(&alias, &source.to_lowercase()))
    }

    fn derives_from(&self, alias: &str, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        if alias == name || (alias.len() >= 2 && name.starts_with(alias)) {
            return true;
        }
        if alias.len() >= 2 && initials(name) == alias {
            return true;
        }
        let stems = stems(name);
        self.mnemonics
            .iter()
            .map(String::as_str)
            .chain(AGGREGATE_AFFIXES.iter().copied())
            .any(|affix| {
                let rest = alias
                    .strip_prefix(affix)
                    .and_then(|r| r.strip_prefix('_'))
                    .or_else(|| alias.strip_suffix(affix).and_then(|r| r.strip_suffix('_')));
                rest.map(|r| stems.iter().any(|s| s == r)).unwrap_or(false)
            })
    }
}

impl Default for AliasPolicy {
    fn default() -> Self {
        Self::new(&[])
    }
}

/// Leading underscore segments: `app_id` -> `app`, `app_id`.
fn stems(name: &str) -> Vec<String> {
    let parts: Vec<&str> = name.split('_').collect();
    (1..=parts.len()).map(|n| parts[..n].join("_")).collect()
}

fn initials(name: &str) -> String {
    name.split('_').filter_map(|part| part.chars().next()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_and_mnemonic_aliases() {
        let policy = AliasPolicy::default();
        assert!(policy.permits("o", &[]));
        assert!(policy.permits("T1", &[]));
        assert!(policy.permits("cnt", &[]));
        assert!(policy.permits("day", &[]));
        assert!(!policy.permits("weak_apps", &[]));
    }

    #[test]
    fn test_derived_aliases() {
        let policy = AliasPolicy::default();
        assert!(policy.permits("oi", &["order_items"]));
        assert!(policy.permits("ord", &["orders"]));
        assert!(policy.permits("total_amount", &["amount"]));
        assert!(policy.permits("app_count", &["app_id", "count"]));
        assert!(policy.permits("status", &["status"]));
        assert!(!policy.permits("weak_apps", &["weak_password_app", "app_id"]));
    }

    #[test]
    fn test_configured_extras() {
        let policy = AliasPolicy::new(&["Amt".to_string()]);
        assert!(policy.permits("amt", &[]));
        assert!(policy.permits("amt_price", &["price"]));
    }
}
