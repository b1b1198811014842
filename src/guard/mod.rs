//! Guard: scope, shape and side-effect policy for candidate statements.

pub mod alias_policy;
pub mod join_graph;
pub mod validator;

pub use alias_policy::{AliasPolicy, DEFAULT_ALIASES};
pub use join_graph::join_depth;
pub use validator::{Guard, GuardOutcome};
