#![forbid(unsafe_code)]

//! Template AST and static-subtree optimizer for Weft.
//!
//! The parser (upstream of this crate) produces an [`ast::Ast`]; the
//! [`optimizer`] runs once per compilation, marking subtrees whose rendered
//! output can never change so the code generator hoists them out of the
//! update path.

pub mod ast;
pub mod optimizer;

pub use ast::{Ast, CondKind, Node, NodeFlags, NodeId, NodeKind};
pub use optimizer::{OptimizeOptions, optimize};
