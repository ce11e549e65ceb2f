//! Evaluation tree.
//!
//! The parser lives outside this crate; it lowers template scripts into these
//! nodes, with variables already resolved to declaration-site identities
//! ([`VarId`]) and calls to declared functions tagged with a [`CallableId`].
//! Every node carries its source [`Loc`].
//!
//! Nodes are immutable and `Send + Sync`, so a lowered program can be shared
//! by passes running on different threads and method bodies can be stored in
//! the prototypes of the registry.

use crate::loc::Loc;
use crate::stack::CallableId;
use crate::stack::NodeId;
use crate::stack::VarId;
use crate::types::ConstLit;
use crate::types::Param;
use crate::types::Signature;
use crate::types::TypeRef;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub enum Lit {
  Bool(bool),
  Int(i64),
  Number(f64),
  String(String),
  Null,
  Undefined,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
  Add,
  Sub,
  Mul,
  Div,
  Mod,
  Lt,
  Leq,
  Gt,
  Geq,
  StrictEq,
  NotStrictEq,
  And,
  Or,
}

impl BinOp {
  pub fn as_str(&self) -> &'static str {
    match self {
      BinOp::Add => "+",
      BinOp::Sub => "-",
      BinOp::Mul => "*",
      BinOp::Div => "/",
      BinOp::Mod => "%",
      BinOp::Lt => "<",
      BinOp::Leq => "<=",
      BinOp::Gt => ">",
      BinOp::Geq => ">=",
      BinOp::StrictEq => "===",
      BinOp::NotStrictEq => "!==",
      BinOp::And => "&&",
      BinOp::Or => "||",
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnOp {
  Not,
  Neg,
  Typeof,
}

/// Page-level lookups answered by the [`crate::stack::ViewInterface`].
#[derive(Clone, Debug, PartialEq)]
pub enum ViewQuery {
  Var(String),
  Elem(String),
  Def(String),
  /// Names of the states the element can be in, as an array of strings.
  ElemStates(String),
  Url,
  Html,
}

#[derive(Clone, Debug)]
pub enum Expr {
  Lit(Lit, Loc),
  Var {
    var: VarId,
    name: String,
    loc: Loc,
  },
  This(Loc),
  Array {
    items: Vec<Expr>,
    loc: Loc,
  },
  Object {
    entries: Vec<(String, Expr)>,
    loc: Loc,
  },
  Member {
    object: Box<Expr>,
    key: String,
    loc: Loc,
  },
  Index {
    object: Box<Expr>,
    index: Box<Expr>,
    loc: Loc,
  },
  /// A call. Calls whose callee is a member expression are method calls and
  /// bind `this`.
  Call {
    callee: Box<Expr>,
    args: Vec<Expr>,
    loc: Loc,
  },
  New {
    node: NodeId,
    class: Box<Expr>,
    args: Vec<Expr>,
    loc: Loc,
  },
  /// `super(...)` inside a constructor.
  SuperCall {
    args: Vec<Expr>,
    loc: Loc,
  },
  Unary {
    op: UnOp,
    operand: Box<Expr>,
    loc: Loc,
  },
  Binary {
    op: BinOp,
    left: Box<Expr>,
    right: Box<Expr>,
    loc: Loc,
  },
  Cond {
    test: Box<Expr>,
    then: Box<Expr>,
    otherwise: Box<Expr>,
    loc: Loc,
  },
  Function(Arc<FunctionDecl>),
  Await {
    operand: Box<Expr>,
    loc: Loc,
  },
  /// `value as Target`
  Cast {
    value: Box<Expr>,
    target: String,
    loc: Loc,
  },
  InstanceOf {
    value: Box<Expr>,
    class: String,
    loc: Loc,
  },
  View(ViewQuery, Loc),
}

impl Expr {
  pub fn loc(&self) -> Loc {
    match self {
      Expr::Lit(_, loc) | Expr::This(loc) | Expr::View(_, loc) => *loc,
      Expr::Var { loc, .. }
      | Expr::Array { loc, .. }
      | Expr::Object { loc, .. }
      | Expr::Member { loc, .. }
      | Expr::Index { loc, .. }
      | Expr::Call { loc, .. }
      | Expr::New { loc, .. }
      | Expr::SuperCall { loc, .. }
      | Expr::Unary { loc, .. }
      | Expr::Binary { loc, .. }
      | Expr::Cond { loc, .. }
      | Expr::Await { loc, .. }
      | Expr::Cast { loc, .. }
      | Expr::InstanceOf { loc, .. } => *loc,
      Expr::Function(decl) => decl.loc,
    }
  }
}

#[derive(Clone, Debug)]
pub enum AssignTarget {
  Var { var: VarId, name: String },
  Member { object: Expr, key: String },
  Index { object: Expr, index: Expr },
}

#[derive(Clone, Debug)]
pub enum Stmt {
  Let {
    var: VarId,
    name: String,
    ty: Option<TypeRef>,
    init: Option<Expr>,
    loc: Loc,
  },
  Assign {
    target: AssignTarget,
    value: Expr,
    loc: Loc,
  },
  Expr(Expr),
  Block(Vec<Stmt>, Loc),
  If {
    test: Expr,
    then: Vec<Stmt>,
    otherwise: Option<Vec<Stmt>>,
    loc: Loc,
  },
  While {
    test: Expr,
    body: Vec<Stmt>,
    loc: Loc,
  },
  ForOf {
    var: VarId,
    name: String,
    iterable: Expr,
    body: Vec<Stmt>,
    loc: Loc,
  },
  ForIn {
    var: VarId,
    name: String,
    object: Expr,
    body: Vec<Stmt>,
    loc: Loc,
  },
  Return(Option<Expr>, Loc),
  Class(Arc<ClassDecl>),
  Function(Arc<FunctionDecl>),
  Enum(Arc<EnumDecl>),
  Interface(Arc<InterfaceDecl>),
}

impl Stmt {
  /// Declarations are bound before the statements of their block run.
  pub fn is_hoisted(&self) -> bool {
    matches!(
      self,
      Stmt::Class(_) | Stmt::Function(_) | Stmt::Enum(_) | Stmt::Interface(_)
    )
  }
}

#[derive(Clone, Debug)]
pub struct ParamDecl {
  pub var: VarId,
  pub name: String,
  pub ty: Option<TypeRef>,
  pub optional: bool,
}

#[derive(Clone, Debug)]
pub struct FunctionDecl {
  pub id: CallableId,
  /// Binding for function declarations; `None` for function expressions
  /// and methods.
  pub var: Option<VarId>,
  pub name: String,
  pub params: Vec<ParamDecl>,
  pub ret: Option<TypeRef>,
  pub body: Vec<Stmt>,
  pub is_async: bool,
  pub loc: Loc,
}

impl FunctionDecl {
  /// Signature as seen by callers and structural checks. Undeclared types
  /// are `any`.
  pub fn signature(&self) -> Signature {
    let params = self
      .params
      .iter()
      .map(|p| {
        let ty = p.ty.clone().unwrap_or(TypeRef::Any);
        if p.optional {
          Param::optional(p.name.clone(), ty)
        } else {
          Param::required(p.name.clone(), ty)
        }
      })
      .collect();
    let ret = match (&self.ret, self.is_async) {
      (Some(ret), _) => ret.clone(),
      (None, true) => TypeRef::promise(TypeRef::Any),
      (None, false) => TypeRef::Any,
    };
    Signature::new(params, ret)
  }
}

#[derive(Clone, Debug)]
pub struct FieldDecl {
  pub name: String,
  pub ty: TypeRef,
  pub readonly: bool,
}

#[derive(Clone, Debug)]
pub struct ClassDecl {
  /// Cache key; re-evaluating the declaration yields the same class.
  pub node: NodeId,
  pub var: VarId,
  pub name: String,
  pub extends: Option<String>,
  pub implements: Vec<String>,
  pub universal: bool,
  pub is_abstract: bool,
  pub fields: Vec<FieldDecl>,
  pub constructor: Option<Arc<FunctionDecl>>,
  pub methods: Vec<Arc<FunctionDecl>>,
  pub statics: Vec<Arc<FunctionDecl>>,
  pub loc: Loc,
}

#[derive(Clone, Debug)]
pub struct EnumDecl {
  pub node: NodeId,
  pub var: VarId,
  pub name: String,
  pub members: Vec<(String, ConstLit)>,
  pub loc: Loc,
}

#[derive(Clone, Debug)]
pub enum InterfaceMember {
  Method(String, Signature),
  Property(String, TypeRef),
}

#[derive(Clone, Debug)]
pub struct InterfaceDecl {
  /// Binding for the interface used as a value (a cast target).
  pub var: Option<VarId>,
  pub name: String,
  pub extends: Vec<String>,
  pub members: Vec<InterfaceMember>,
  pub loc: Loc,
}

/// One page script.
#[derive(Clone, Debug, Default)]
pub struct Program {
  pub body: Vec<Stmt>,
  /// Function called as the page's entry point after the body ran.
  pub entry: Option<VarId>,
}
