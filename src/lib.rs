//! SQL Gatekeeper
//!
//! Validation and minimal repair of untrusted, generated SQL. Each candidate is
//! parsed into a closed tree, checked against a per-question safety contract,
//! repaired when only mandatory clauses are missing, and ranked; the winner is
//! shaped by the ordering and limit policies before it leaves the engine.

pub mod catalog;
pub mod config;
pub mod constraints;
pub mod contract;
pub mod engine;
pub mod error;
pub mod execution;
pub mod finalizer;
pub mod guard;
pub mod plan;
pub mod repair;
pub mod scope;
pub mod selector;
pub mod sql;

pub use config::EngineConfig;
pub use contract::{ContractBuilder, SafetyContract};
pub use engine::{Candidate, Engine, EvaluationRequest, EvaluationResult, ValidationOutcome};
pub use error::{GatekeeperError, Result};
pub use plan::{Plan, TaskKind};
