//! Statement tree, parser, renderer and canonical form.

pub mod canonical;
pub mod parser;
pub mod render;
pub mod tree;

pub use canonical::{canonicalize, canonicalize_expr};
pub use parser::{parse, parse_condition, parse_expression};
pub use render::{render, render_expr};
pub use tree::*;
