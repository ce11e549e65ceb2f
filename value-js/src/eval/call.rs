//! Invocation of program-declared functions and constructors.

use super::stmt::eval_block;
use super::stmt::Flow;
use crate::builtins;
use crate::error::ValueError;
use crate::error::ValueResult;
use crate::loc::Loc;
use crate::props::Properties;
use crate::stack::CallStack;
use crate::stack::Stack;
use crate::stack::StackRef;
use crate::types::effective_constructors;
use crate::types::generate_instance;
use crate::types::resolve_overload;
use crate::types::ProtoRef;
use crate::value::function::Closure;
use crate::value::Value;
use std::rc::Rc;
use tracing::debug;
use tracing::debug_span;
use tracing::field;

/// Call `closure` from `caller`. `exempt` is the receiver of a constructor:
/// the call frame may add keys to it while it is locked.
pub fn call_closure(
  caller: &StackRef,
  closure: &Rc<Closure>,
  args: &[Value],
  exempt: Option<&Properties>,
  loc: Loc,
) -> ValueResult<Value> {
  let decl = &closure.decl;
  let span = debug_span!(
    "value_js.call",
    callable = %decl.name,
    callable_id = decl.id.0,
    depth = caller.call_depth(),
    recursive = field::Empty,
    outcome = field::Empty,
  );
  let _enter = span.enter();

  let max_depth = caller.registry().options().max_call_depth;
  if caller.call_depth() >= max_depth {
    span.record("outcome", "depth_exceeded");
    return Err(ValueError::internal(
      loc,
      format!("call depth limit of {max_depth} exceeded calling {}", decl.name),
    ));
  }

  let cut = caller.root().guard().enter(decl.id, loc);
  if let Some(shape) = cut {
    span.record("recursive", true);
    span.record("outcome", "cut");
    debug!(callable = %decl.name, shape = %shape.type_name(), "recursion cut off");
    return Ok(shape);
  }
  span.record("recursive", false);

  let result = run_closure(caller, closure, args, exempt, loc);
  caller.root().guard().exit(decl.id, result.as_ref().ok());
  span.record("outcome", if result.is_ok() { "ok" } else { "error" });
  result.map_err(|err| err.called_here(loc))
}

fn run_closure(
  caller: &StackRef,
  closure: &Rc<Closure>,
  args: &[Value],
  exempt: Option<&Properties>,
  loc: Loc,
) -> ValueResult<Value> {
  let decl = &closure.decl;
  let lexical = closure.lexical().unwrap_or_else(|| caller.clone());
  let class_ctx = closure
    .class_ctx
    .clone()
    .or_else(|| lexical.private_context());
  let this = closure.this();
  let frame: StackRef = Rc::new(CallStack::new(
    lexical,
    caller.clone(),
    this.clone(),
    class_ctx,
  ));
  caller.root().track(&frame);
  if let Some(props) = exempt {
    props.unlock_for_stack(&*frame);
  }

  if args.len() > decl.params.len() {
    return Err(ValueError::structural(
      loc,
      format!(
        "{} expects at most {} argument(s), got {}",
        decl.name,
        decl.params.len(),
        args.len()
      ),
    ));
  }
  for (idx, param) in decl.params.iter().enumerate() {
    let value = match args.get(idx) {
      Some(arg) => {
        if let Some(ty) = &param.ty {
          ty.check(&*frame, arg, this.as_ref(), arg.context())
            .map_err(|err| err.needed_here(loc))?;
        }
        arg.clone()
      }
      None if param.optional => match &param.ty {
        Some(ty) => ty
          .instantiate(&*frame, this.as_ref(), loc)?
          .join(&Value::Void(loc)),
        None => Value::Void(loc),
      },
      None => {
        return Err(ValueError::structural(
          loc,
          format!("missing argument {} of {}", param.name, decl.name),
        ));
      }
    };
    frame.declare(param.var, value);
  }

  if eval_block(&frame, &decl.body)? == Flow::Normal {
    frame.set_return(Value::Void(decl.loc));
  }
  let mut ret = frame.get_return().unwrap_or(Value::Void(decl.loc));
  if decl.is_async {
    ret = builtins::new_promise(frame.registry(), Some(ret.remove_literalness(false)), decl.loc)?;
  }
  if let Some(ty) = &decl.ret {
    ty.check(&*frame, &ret, this.as_ref(), decl.loc)?;
  }
  Ok(ret)
}

/// `new proto(...args)`. With `reuse`, the constructor runs against an
/// existing instance instead: `super(...)` calls and re-evaluated `new`
/// sites.
pub fn construct(
  stack: &StackRef,
  proto: &ProtoRef,
  args: &[Value],
  reuse: Option<Value>,
  loc: Loc,
) -> ValueResult<Value> {
  if proto.is_abstract() && reuse.is_none() {
    return Err(ValueError::structural(
      loc,
      format!("cannot instantiate abstract class {}", proto.name()),
    ));
  }

  // Nearest prototype in the chain that says how it is constructed.
  let mut owner = Some(proto);
  while let Some(p) = owner {
    if p.constructor_body().is_some() || !p.constructors().is_empty() {
      break;
    }
    owner = p.parent();
  }

  if let Some((owner, body)) = owner.and_then(|p| p.constructor_body().map(|b| (p, b))) {
    let instance = reuse.unwrap_or_else(|| generate_instance(proto, loc));
    let props = match instance.unwrap() {
      Value::Instance(i) => Some(i.props().clone()),
      _ => None,
    };
    let closure = Rc::new(Closure::new(
      body.clone(),
      stack.root().class_scope(owner.name()),
      Some(instance.clone()),
      Some(owner.clone()),
    ));
    call_closure(stack, &closure, args, props.as_ref(), loc)?;
    return Ok(instance);
  }

  let overloads = effective_constructors(proto);
  if overloads.is_empty() {
    if !args.is_empty() {
      return Err(ValueError::structural(
        loc,
        format!(
          "constructor of {} expects no arguments, got {}",
          proto.name(),
          args.len()
        ),
      ));
    }
  } else {
    resolve_overload(proto.name(), overloads, &**stack, None, args, loc)?;
  }
  if let Some(instance) = builtins::construct_native(stack, proto, args, reuse, loc)? {
    return Ok(instance);
  }
  Ok(generate_instance(proto, loc))
}
