//! Evaluation of script bodies over abstract values.

pub mod ast;
pub mod call;
pub mod fold;
mod expr;
mod narrow;
mod stmt;

pub use expr::eval_expr;
pub use narrow::narrow_away;
pub use narrow::narrow_to;
pub use stmt::eval_block;
pub use stmt::Flow;
