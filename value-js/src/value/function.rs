use super::Value;
use crate::builtins;
use crate::error::Op;
use crate::error::ValueError;
use crate::error::ValueResult;
use crate::eval::ast::FunctionDecl;
use crate::eval::call::call_closure;
use crate::loc::Loc;
use crate::props::Payload;
use crate::props::Properties;
use crate::stack::Stack;
use crate::stack::StackRef;
use crate::types::resolve_overload;
use crate::types::Member;
use crate::types::ProtoRef;
use crate::types::Signature;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// A function implemented by the runtime library, described only by its
/// overloads. Calling it checks the arguments and instantiates the return
/// type.
pub struct NativeFunction {
  pub name: String,
  pub overloads: Vec<Signature>,
  pub this: Option<Value>,
}

/// A function declared by the evaluated program.
pub struct Closure {
  pub decl: Arc<FunctionDecl>,
  /// Frame the function was created in. `None` for methods of classes whose
  /// declaring frame is gone; the caller's frame is used instead.
  lexical: RefCell<Option<StackRef>>,
  this: RefCell<Option<Value>>,
  /// Class whose code this is, for private access and `super` calls.
  pub class_ctx: Option<ProtoRef>,
}

impl Closure {
  pub fn new(
    decl: Arc<FunctionDecl>,
    lexical: Option<StackRef>,
    this: Option<Value>,
    class_ctx: Option<ProtoRef>,
  ) -> Closure {
    Closure {
      decl,
      lexical: RefCell::new(lexical),
      this: RefCell::new(this),
      class_ctx,
    }
  }

  pub fn lexical(&self) -> Option<StackRef> {
    self.lexical.borrow().clone()
  }

  pub fn this(&self) -> Option<Value> {
    self.this.borrow().clone()
  }

  /// Let go of the captured frame and receiver once the pass is over.
  pub fn release(&self) {
    let lexical = self.lexical.borrow_mut().take();
    let this = self.this.borrow_mut().take();
    drop((lexical, this));
  }
}

/// `resolve`/`reject` handed to a promise executor.
pub struct Resolver {
  pub promise: Properties,
  pub reject: bool,
}

#[derive(Clone)]
pub enum FunctionKind {
  Native(Rc<NativeFunction>),
  Closure(Rc<Closure>),
  Resolver(Rc<Resolver>),
}

#[derive(Clone)]
pub struct Function {
  kind: FunctionKind,
  loc: Loc,
}

impl fmt::Debug for Function {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.kind {
      FunctionKind::Native(n) => write!(f, "Native({})", n.name),
      FunctionKind::Closure(c) => write!(f, "Closure({})", c.decl.name),
      FunctionKind::Resolver(r) => {
        write!(f, "{}", if r.reject { "Reject" } else { "Resolve" })
      }
    }
  }
}

fn same_this(a: &Option<Value>, b: &Option<Value>) -> bool {
  match (a, b) {
    (Some(a), Some(b)) => a.same(b),
    (None, None) => true,
    _ => false,
  }
}

impl Function {
  pub fn native(
    name: impl Into<String>,
    overloads: Vec<Signature>,
    this: Option<Value>,
    loc: Loc,
  ) -> Function {
    Function {
      kind: FunctionKind::Native(Rc::new(NativeFunction {
        name: name.into(),
        overloads,
        this,
      })),
      loc,
    }
  }

  /// A program function created in `stack`'s pass. The pass releases it
  /// when it ends.
  pub fn closure(
    stack: &dyn Stack,
    decl: Arc<FunctionDecl>,
    lexical: Option<StackRef>,
    this: Option<Value>,
    class_ctx: Option<ProtoRef>,
    loc: Loc,
  ) -> Function {
    let closure = Rc::new(Closure::new(decl, lexical, this, class_ctx));
    stack.root().track_closure(&closure);
    Function {
      kind: FunctionKind::Closure(closure),
      loc,
    }
  }

  pub fn resolver(promise: Properties, reject: bool, loc: Loc) -> Function {
    Function {
      kind: FunctionKind::Resolver(Rc::new(Resolver { promise, reject })),
      loc,
    }
  }

  pub fn kind(&self) -> &FunctionKind {
    &self.kind
  }

  pub fn loc(&self) -> Loc {
    self.loc
  }

  pub fn name(&self) -> &str {
    match &self.kind {
      FunctionKind::Native(n) => &n.name,
      FunctionKind::Closure(c) => &c.decl.name,
      FunctionKind::Resolver(r) if r.reject => "reject",
      FunctionKind::Resolver(_) => "resolve",
    }
  }

  /// Number of declared parameters, if the function has a single shape.
  pub fn param_count(&self) -> Option<usize> {
    match &self.kind {
      FunctionKind::Native(n) => match n.overloads.as_slice() {
        [only] => Some(only.params.len()),
        _ => None,
      },
      FunctionKind::Closure(c) => Some(c.decl.params.len()),
      FunctionKind::Resolver(_) => Some(1),
    }
  }

  pub fn same_identity(&self, other: &Function) -> bool {
    match (&self.kind, &other.kind) {
      (FunctionKind::Native(a), FunctionKind::Native(b)) => {
        Rc::ptr_eq(a, b)
          || (a.name == b.name && a.overloads == b.overloads && same_this(&a.this, &b.this))
      }
      (FunctionKind::Closure(a), FunctionKind::Closure(b)) => {
        Rc::ptr_eq(a, b)
          || (a.decl.id == b.decl.id
            && match (a.lexical(), b.lexical()) {
              (Some(x), Some(y)) => Rc::ptr_eq(&x, &y),
              (None, None) => true,
              _ => false,
            }
            && same_this(&a.this(), &b.this())
            && a.class_ctx.as_ref().map(|p| p.name()) == b.class_ctx.as_ref().map(|p| p.name()))
      }
      (FunctionKind::Resolver(a), FunctionKind::Resolver(b)) => {
        a.promise.ptr_eq(&b.promise) && a.reject == b.reject
      }
      _ => false,
    }
  }

  /// Whether this function can be passed where a callback of shape `sig` is
  /// expected. Callbacks may ignore trailing arguments but cannot require
  /// more than are supplied.
  pub fn check_compatible(&self, sig: &Signature, loc: Loc) -> ValueResult<()> {
    let supplied = sig.params.len();
    let ok = match &self.kind {
      FunctionKind::Native(n) => n.overloads.iter().any(|o| o.required_params() <= supplied),
      FunctionKind::Closure(c) => c.decl.params.iter().filter(|p| !p.optional).count() <= supplied,
      FunctionKind::Resolver(_) => true,
    };
    if ok {
      return Ok(());
    }
    Err(ValueError::structural(
      loc,
      format!(
        "function {} requires more than the {supplied} parameter(s) of {}",
        self.name(),
        sig.describe()
      ),
    ))
  }

  pub fn call(&self, stack: &StackRef, args: &[Value], loc: Loc) -> ValueResult<Value> {
    match &self.kind {
      FunctionKind::Native(n) => {
        let sig = resolve_overload(&n.name, &n.overloads, &**stack, n.this.as_ref(), args, loc)?;
        if let Some(result) = builtins::native_effect(stack, &n.name, n.this.as_ref(), args, loc)? {
          return Ok(result);
        }
        sig.ret.instantiate(&**stack, n.this.as_ref(), loc)
      }
      FunctionKind::Closure(c) => call_closure(stack, c, args, None, loc),
      FunctionKind::Resolver(r) => {
        if args.len() > 1 {
          return Err(ValueError::structural(
            loc,
            format!("expected at most 1 argument(s), got {}", args.len()),
          ));
        }
        let value = args.first().cloned().unwrap_or(Value::Void(loc));
        let Payload::Promise(mut promise) = r.promise.payload() else {
          return Err(ValueError::internal(loc, "resolver bound to a non-promise"));
        };
        let slot = if r.reject {
          &mut promise.rejected
        } else {
          &mut promise.resolved
        };
        *slot = Some(match slot.take() {
          Some(prev) => prev.join(&value),
          None => value,
        });
        r.promise.set_payload(Payload::Promise(promise));
        Ok(Value::Void(loc))
      }
    }
  }

  /// Run as the entry point of a page: no arguments, return discarded.
  pub fn call_as_entry_point(&self, stack: &StackRef, loc: Loc) -> ValueResult<()> {
    let FunctionKind::Closure(c) = &self.kind else {
      return Err(ValueError::unsupported(loc, "function", Op::EntryPoint));
    };
    if let Some(param) = c.decl.params.iter().find(|p| !p.optional) {
      return Err(ValueError::structural(
        loc,
        format!(
          "entry point {} cannot have required parameter {}",
          c.decl.name, param.name
        ),
      ));
    }
    call_closure(stack, c, &[], None, loc)?;
    Ok(())
  }
}

/// The value of member `key` resolved on `owner`, bound to `this` where the
/// member is a method.
pub(crate) fn bind_member(
  stack: &dyn Stack,
  key: &str,
  owner: &ProtoRef,
  member: &Member,
  this: Option<Value>,
  loc: Loc,
) -> ValueResult<Value> {
  match member {
    Member::Method {
      body: Some(decl), ..
    } => Ok(Value::Function(Function::closure(
      stack,
      decl.clone(),
      stack.root().class_scope(owner.name()),
      this,
      Some(owner.clone()),
      loc,
    ))),
    Member::Method {
      overloads,
      body: None,
    } => Ok(Value::Function(Function::native(
      key,
      overloads.clone(),
      this,
      loc,
    ))),
    Member::Getter(ty) | Member::Field { ty, .. } => ty.instantiate(stack, this.as_ref(), loc),
    Member::Constant(lit) => builtins::const_value(stack.registry(), lit, loc),
  }
}
