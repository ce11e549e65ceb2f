//! Type descriptors: prototypes, structural interfaces, signatures and the
//! declared-type references used by member tables.

pub mod interface;
pub mod proto;
pub mod signature;
mod typeref;

pub use interface::Contract;
pub use interface::Interface;
pub use interface::Requirement;
pub use proto::effective_constructors;
pub use proto::generate_instance;
pub use proto::has_ancestor;
pub use proto::implements;
pub use proto::resolve_class_member;
pub use proto::resolve_member;
pub use proto::ClassBuilder;
pub use proto::ClassPrototype;
pub use proto::Prototype;
pub use proto::ProtoRef;
pub use signature::resolve_overload;
pub use signature::Param;
pub use signature::Signature;
pub use typeref::TypeRef;

use crate::eval::ast::FunctionDecl;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// A compile-time constant stored in a member table (enum members, static
/// constants). Unlike [`crate::value::Value`] this is `Send + Sync`, so it can
/// live in the shared registry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum ConstLit {
  Bool(bool),
  Int(i64),
  Number(f64),
  String(String),
}

impl fmt::Display for ConstLit {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConstLit::Bool(v) => write!(f, "{v}"),
      ConstLit::Int(v) => write!(f, "{v}"),
      ConstLit::Number(v) => f.write_str(&crate::eval::fold::number_to_string(*v)),
      ConstLit::String(v) => write!(f, "{v:?}"),
    }
  }
}

/// Which specialized payload instances of a prototype carry in their
/// [`crate::props::Properties`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PayloadKind {
  Plain,
  Bool,
  Int,
  Number,
  String,
  Array,
  Object,
  Map,
  Set,
  Promise,
  EventTarget,
  Request,
}

#[derive(Clone, Debug)]
pub enum Member {
  Method {
    overloads: Vec<Signature>,
    /// Present for methods declared by the evaluated program.
    body: Option<Arc<FunctionDecl>>,
  },
  Getter(TypeRef),
  Field {
    ty: TypeRef,
    readonly: bool,
  },
  Constant(ConstLit),
}

impl Member {
  pub fn is_method(&self) -> bool {
    matches!(self, Member::Method { .. })
  }

  pub fn kind_name(&self) -> &'static str {
    match self {
      Member::Method { .. } => "method",
      Member::Getter(_) => "getter",
      Member::Field { .. } => "field",
      Member::Constant(_) => "constant",
    }
  }
}
