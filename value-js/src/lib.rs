//! Abstract values and control-flow merging for a JS-like template script
//! language.
//!
//! A script is evaluated once per page over abstract values: every runtime
//! value is represented by an instance of a prototype whose properties may
//! or may not be statically known. Where control flow diverges, the values
//! reaching the join point are merged into one, or kept as a union when
//! their kinds are incompatible. The result tells the build pipeline which
//! types a page produces and whether they can cross the server/client
//! boundary.
//!
//! Prototypes live in an immutable [`Registry`] shared by all passes; values
//! are single-threaded and never leave the pass that created them.

pub mod builtins;
pub mod codes;
pub mod engine;
pub mod error;
pub mod eval;
pub mod loc;
pub mod options;
pub mod props;
pub mod registry;
pub mod stack;
pub mod types;
pub mod value;

pub use engine::Engine;
pub use engine::PassSummary;
pub use error::ErrorKind;
pub use error::PassError;
pub use error::ValueError;
pub use error::ValueResult;
pub use eval::ast::Program;
pub use loc::Loc;
pub use options::EvalOptions;
pub use registry::Registry;
pub use value::new_multi;
pub use value::Value;
