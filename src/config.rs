//! Engine Configuration
//!
//! Structural limits, repair budget, row-limit policy and alias extras.
//! Loaded from the environment (optionally via a `.env` file) or deserialized
//! from the `config` section of a request.

use crate::error::{GatekeeperError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum joins in a single FROM graph (default: 8)
    pub max_joins: usize,
    /// Maximum hop distance from the first FROM table in the join graph (default: 4)
    pub max_join_depth: usize,
    /// Maximum nesting depth of any expression tree (default: 12)
    pub max_predicate_depth: usize,
    /// Maximum subquery nesting depth (default: 2)
    pub max_subquery_depth: usize,
    /// Repair is attempted only when at most this many mandatory items are missing (default: 3)
    pub repair_budget: usize,
    /// LIMIT injected when a statement has none (default: 200)
    pub default_limit: u64,
    /// Any LIMIT above this is clamped (default: 200)
    pub max_limit: u64,
    /// Additional aliases accepted by the alias policy
    pub extra_aliases: Vec<String>,
    /// Keep ORDER BY for every task kind except trend
    pub permissive_ordering: bool,
    /// Worker bound for concurrent candidate evaluation (default: 4)
    pub max_workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_joins: 8,
            max_join_depth: 4,
            max_predicate_depth: 12,
            max_subquery_depth: 2,
            repair_budget: 3,
            default_limit: 200,
            max_limit: 200,
            extra_aliases: Vec::new(),
            permissive_ordering: false,
            max_workers: 4,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build configuration from `GATEKEEPER_*` environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    /// Unset variables keep their defaults; unparsable values are an error.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::default();
        read_var("GATEKEEPER_MAX_JOINS", &mut config.max_joins)?;
        read_var("GATEKEEPER_MAX_JOIN_DEPTH", &mut config.max_join_depth)?;
        read_var("GATEKEEPER_MAX_PREDICATE_DEPTH", &mut config.max_predicate_depth)?;
        read_var("GATEKEEPER_MAX_SUBQUERY_DEPTH", &mut config.max_subquery_depth)?;
        read_var("GATEKEEPER_REPAIR_BUDGET", &mut config.repair_budget)?;
        read_var("GATEKEEPER_DEFAULT_LIMIT", &mut config.default_limit)?;
        read_var("GATEKEEPER_MAX_LIMIT", &mut config.max_limit)?;
        read_var("GATEKEEPER_PERMISSIVE_ORDERING", &mut config.permissive_ordering)?;
        read_var("GATEKEEPER_MAX_WORKERS", &mut config.max_workers)?;

        if let Ok(aliases) = env::var("SQL_PERMITTED_ALIASES") {
            config.extra_aliases = parse_alias_list(&aliases);
        }

        config.validate()?;
        Ok(config)
    }

    /// Adds to the permitted aliases; duplicates are ignored.
    pub fn with_extra_aliases<S: AsRef<str>>(mut self, aliases: &[S]) -> Self {
        for alias in aliases {
            let alias = alias.as_ref().trim().to_lowercase();
            if !alias.is_empty() && !self.extra_aliases.contains(&alias) {
                self.extra_aliases.push(alias);
            }
        }
        self
    }

    pub fn with_repair_budget(mut self, budget: usize) -> Self {
        self.repair_budget = budget;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_limit == 0 || self.max_limit == 0 {
            return Err(GatekeeperError::Config(
                "default_limit and max_limit must be positive".to_string(),
            ));
        }
        if self.default_limit > self.max_limit {
            return Err(GatekeeperError::Config(format!(
                "default_limit {} exceeds max_limit {}",
                self.default_limit, self.max_limit
            )));
        }
        if self.max_workers == 0 {
            return Err(GatekeeperError::Config("max_workers must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn read_var<T: FromStr>(name: &str, slot: &mut T) -> Result<()> {
    match env::var(name) {
        Ok(raw) => {
            *slot = raw.trim().parse().map_err(|_| {
                GatekeeperError::Config(format!("invalid value for {}: '{}'", name, raw))
            })?;
            Ok(())
        }
        Err(_) => Ok(()),
    }
}

fn parse_alias_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_limit, 200);
        assert_eq!(config.repair_budget, 3);
    }

    #[test]
    fn test_default_limit_above_max_is_rejected() {
        let config = EngineConfig {
            default_limit: 500,
            max_limit: 100,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(GatekeeperError::Config(_))));
    }

    #[test]
    fn test_parse_alias_list() {
        assert_eq!(
            parse_alias_list(" Amt, ,qty "),
            vec!["amt".to_string(), "qty".to_string()]
        );
    }

    #[test]
    fn test_extra_aliases_accumulate() {
        let config = EngineConfig::default()
            .with_extra_aliases(&["Amt"])
            .with_extra_aliases(&["amt".to_string(), "qty".to_string()]);
        assert_eq!(config.extra_aliases, vec!["amt".to_string(), "qty".to_string()]);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"max_limit": 50, "default_limit": 10}"#).unwrap();
        assert_eq!(config.max_limit, 50);
        assert_eq!(config.max_joins, 8);
    }
}
