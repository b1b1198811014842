use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why the structural parser refused a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParseErrorKind {
    /// Malformed text, a non-SELECT statement, or more than one statement.
    Syntax,
    /// Valid SQL that uses a construct the tree model does not represent.
    Unsupported,
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind:?} parse error: {detail}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub detail: String,
}

impl ParseError {
    pub fn syntax(detail: impl Into<String>) -> Self {
        Self {
            kind: ParseErrorKind::Syntax,
            detail: detail.into(),
        }
    }

    pub fn unsupported(detail: impl Into<String>) -> Self {
        Self {
            kind: ParseErrorKind::Unsupported,
            detail: detail.into(),
        }
    }
}

/// Guard policy categories. Rendered as `Forbidden: <kebab-name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    MutatingOperation,
    UnknownTable,
    UnknownColumn,
    WildcardProjection,
    AliasPolicy,
    StructuralLimit,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::MutatingOperation => "mutating-operation",
            ViolationKind::UnknownTable => "unknown-table",
            ViolationKind::UnknownColumn => "unknown-column",
            ViolationKind::WildcardProjection => "wildcard-projection",
            ViolationKind::AliasPolicy => "alias-policy",
            ViolationKind::StructuralLimit => "structural-limit",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Forbidden: {}", self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {detail}")]
pub struct GuardViolation {
    pub kind: ViolationKind,
    pub detail: String,
}

impl GuardViolation {
    pub fn new(kind: ViolationKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Every violation the guard found for one statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardRejection {
    pub violations: Vec<GuardViolation>,
}

impl GuardRejection {
    pub fn has(&self, kind: ViolationKind) -> bool {
        self.violations.iter().any(|v| v.kind == kind)
    }

    pub fn kinds(&self) -> Vec<ViolationKind> {
        self.violations.iter().map(|v| v.kind).collect()
    }
}

impl fmt::Display for GuardRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.violations.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for GuardRejection {}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepairFailure {
    #[error("repair budget exceeded: {missing} missing items (budget {budget})")]
    OverBudget { missing: usize, budget: usize },

    #[error("unrepairable: {0}")]
    Unrepairable(String),

    #[error("repaired statement rejected by guard: {0}")]
    GuardRejected(GuardRejection),

    #[error("mandatory items still missing after repair: {0}")]
    Incomplete(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalizeError {
    #[error("ordering policy violated: {0}")]
    OrderingPolicy(String),

    #[error("finalized statement rejected by guard: {0}")]
    GuardRejected(GuardRejection),
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionError {
    #[error("execution timed out after {0} ms")]
    Timeout(u128),

    #[error("execution failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum GatekeeperError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Guard violation: {0}")]
    Guard(#[from] GuardRejection),

    #[error("Repair failure: {0}")]
    Repair(#[from] RepairFailure),

    #[error("Finalize error: {0}")]
    Finalize(#[from] FinalizeError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Contract error: {0}")]
    Contract(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GatekeeperError>;
