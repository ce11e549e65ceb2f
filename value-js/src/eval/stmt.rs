use super::ast::AssignTarget;
use super::ast::ClassDecl;
use super::ast::EnumDecl;
use super::ast::Expr;
use super::ast::InterfaceDecl;
use super::ast::InterfaceMember;
use super::ast::Stmt;
use super::ast::UnOp;
use super::expr::eval_args;
use super::expr::eval_expr;
use super::expr::expect_class;
use super::fold::truthiness;
use super::narrow::narrow_away;
use super::narrow::narrow_to;
use crate::error::ValueError;
use crate::error::ValueResult;
use crate::loc::Loc;
use crate::stack::BlockStack;
use crate::stack::BranchStack;
use crate::stack::Stack;
use crate::stack::StackRef;
use crate::stack::VarId;
use crate::types::resolve_member;
use crate::types::ClassBuilder;
use crate::types::Contract;
use crate::types::Interface;
use crate::types::ProtoRef;
use crate::types::Requirement;
use crate::value::Class;
use crate::value::ClassInterface;
use crate::value::EnumValue;
use crate::value::Function;
use crate::value::Value;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;
use tracing::trace;

/// How control leaves a statement list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
  Normal,
  /// Every path returned; the return slot holds the value.
  Return,
}

/// `x instanceof C` or `!(x instanceof C)` on a variable.
struct Guard {
  var: VarId,
  proto: ProtoRef,
  negated: bool,
}

fn guard_of(stack: &StackRef, test: &Expr) -> ValueResult<Option<Guard>> {
  let (inner, negated) = match test {
    Expr::Unary {
      op: UnOp::Not,
      operand,
      ..
    } => (&**operand, true),
    other => (other, false),
  };
  let Expr::InstanceOf { value, class, loc } = inner else {
    return Ok(None);
  };
  let Expr::Var { var, .. } = &**value else {
    return Ok(None);
  };
  Ok(Some(Guard {
    var: *var,
    proto: expect_class(stack, class, *loc)?,
    negated,
  }))
}

/// Run `stmts` in a fresh arm over `stack`, applying `narrowed` first.
fn run_arm(
  stack: &StackRef,
  stmts: &[Stmt],
  narrowed: Option<(VarId, Value)>,
) -> ValueResult<(Flow, BTreeMap<VarId, Value>)> {
  let arm = Rc::new(BranchStack::new(stack.clone()));
  if let Some((var, value)) = narrowed {
    arm.narrow(var, value);
  }
  let arm_ref: StackRef = arm.clone();
  stack.root().track(&arm_ref);
  let flow = eval_block(&arm_ref, stmts)?;
  Ok((flow, arm.take_writes()))
}

/// Join the writes of arms reaching the same point. A variable written on
/// only some arms keeps its previous value on the others.
fn join_writes(stack: &StackRef, arms: Vec<BTreeMap<VarId, Value>>, loc: Loc) -> ValueResult<()> {
  let mut vars: Vec<VarId> = arms.iter().flat_map(|w| w.keys().copied()).collect();
  vars.sort();
  vars.dedup();
  for var in vars {
    let before = stack.get_value(var);
    let mut joined: Option<Value> = None;
    for writes in &arms {
      let Some(value) = writes.get(&var).cloned().or_else(|| before.clone()) else {
        continue;
      };
      joined = Some(match joined {
        Some(prev) => prev.join(&value),
        None => value,
      });
    }
    if let Some(value) = joined {
      stack.set_value(var, value, loc)?;
    }
  }
  Ok(())
}

fn eval_if(
  stack: &StackRef,
  test: &Expr,
  then: &[Stmt],
  otherwise: Option<&[Stmt]>,
  loc: Loc,
) -> ValueResult<Flow> {
  let cond = eval_expr(stack, test)?;
  // Dead arms are not evaluated at all.
  if let Some(taken) = truthiness(&cond) {
    let arm = if taken { Some(then) } else { otherwise };
    return match arm {
      Some(stmts) => {
        let block: StackRef = Rc::new(BlockStack::new(stack.clone()));
        eval_block(&block, stmts)
      }
      None => Ok(Flow::Normal),
    };
  }

  let guard = guard_of(stack, test)?;
  let mut then_narrowed = None;
  let mut else_narrowed = None;
  if let Some(g) = &guard {
    if let Some(current) = stack.get_value(g.var) {
      let holds = narrow_to(&current, &g.proto, false, loc)?;
      let fails = narrow_away(&current, &g.proto)?;
      let (t, e) = if g.negated { (fails, holds) } else { (holds, fails) };
      then_narrowed = Some((g.var, t));
      else_narrowed = Some((g.var, e));
    }
  }

  let (then_flow, then_writes) = run_arm(stack, then, then_narrowed)?;
  let (else_flow, else_writes) = run_arm(stack, otherwise.unwrap_or(&[]), else_narrowed)?;

  let mut live = Vec::new();
  if then_flow == Flow::Normal {
    live.push(then_writes);
  }
  if else_flow == Flow::Normal {
    live.push(else_writes);
  }
  if live.is_empty() {
    return Ok(Flow::Return);
  }
  join_writes(stack, live, loc)?;

  // Only one arm falls through, so the guard outcome of that arm holds from
  // here on.
  if let Some(g) = guard {
    let falls_through_when_holds = match (then_flow, else_flow) {
      (Flow::Return, Flow::Normal) => Some(g.negated),
      (Flow::Normal, Flow::Return) => Some(!g.negated),
      _ => None,
    };
    if let (Some(holds), Some(current)) = (falls_through_when_holds, stack.get_value(g.var)) {
      let narrowed = if holds {
        narrow_to(&current, &g.proto, true, loc)?
      } else {
        narrow_away(&current, &g.proto)?
      };
      trace!(var = g.var.0, class = g.proto.name(), holds, "narrowed after guard");
      stack.set_value(g.var, narrowed, loc)?;
    }
  }
  Ok(Flow::Normal)
}

/// Run a loop body `loop_passes` times, joining each pass into the state
/// before it since the body may run any number of times.
fn eval_loop(
  stack: &StackRef,
  body: &[Stmt],
  binding: Option<(VarId, Value)>,
  test: Option<&Expr>,
  loc: Loc,
) -> ValueResult<Flow> {
  let passes = stack.registry().options().loop_passes.max(1);
  for _ in 0..passes {
    if let Some(test) = test {
      let cond = eval_expr(stack, test)?;
      if truthiness(&cond) == Some(false) {
        break;
      }
    }
    let arm = Rc::new(BranchStack::new(stack.clone()));
    if let Some((var, value)) = &binding {
      arm.declare(*var, value.clone());
    }
    let arm_ref: StackRef = arm.clone();
    stack.root().track(&arm_ref);
    let flow = eval_block(&arm_ref, body)?;
    let writes = arm.take_writes();
    if flow == Flow::Return {
      break;
    }
    join_writes(stack, vec![writes, BTreeMap::new()], loc)?;
  }
  Ok(Flow::Normal)
}

fn eval_assign(stack: &StackRef, target: &AssignTarget, value: Value, loc: Loc) -> ValueResult<()> {
  match target {
    AssignTarget::Var { var, name } => {
      if stack.get_value(*var).is_none() {
        return Err(ValueError::structural(
          loc,
          format!("assignment to undeclared variable {name}"),
        ));
      }
      stack.set_value(*var, value, loc)
    }
    AssignTarget::Member { object, key } => {
      let object = eval_expr(stack, object)?;
      object.set_member(stack, key, &value, loc)
    }
    AssignTarget::Index { object, index } => {
      let object = eval_expr(stack, object)?;
      let index = eval_expr(stack, index)?;
      object.set_index(stack, &index, &value, loc)
    }
  }
}

fn declare_class(stack: &StackRef, decl: &Arc<ClassDecl>) -> ValueResult<()> {
  let cached = stack.root().caches().value(decl.node);
  if let Some(value) = cached {
    stack.root().set_class_scope(&decl.name, stack);
    stack.declare(decl.var, value);
    return Ok(());
  }

  let mut builder = ClassBuilder::new(decl.name.clone()).universal(decl.universal);
  if let Some(parent) = &decl.extends {
    builder = builder.extends(expect_class(stack, parent, decl.loc)?);
  }
  if decl.is_abstract {
    builder = builder.abstract_class();
  }
  let mut contracts = Vec::new();
  for name in &decl.implements {
    let iface = stack
      .lookup_interface(name)
      .ok_or_else(|| ValueError::structural(decl.loc, format!("unknown interface {name}")))?;
    contracts.push(iface.clone());
    builder = builder.implements(iface);
  }
  for field in &decl.fields {
    builder = if field.readonly {
      builder.readonly_field(field.name.clone(), field.ty.clone())
    } else {
      builder.field(field.name.clone(), field.ty.clone())
    };
  }
  if let Some(ctor) = &decl.constructor {
    builder = builder.constructor_body(ctor.signature(), ctor.clone());
  }
  for method in &decl.methods {
    builder = builder.method_with_body(method.name.clone(), method.signature(), method.clone());
  }
  for method in &decl.statics {
    builder = builder.static_method_with_body(method.name.clone(), method.signature(), method.clone());
  }
  let proto = builder.build();
  if !decl.is_abstract {
    for contract in &contracts {
      check_implements(&proto, contract, decl.loc)?;
    }
  }

  let root = stack.root();
  root.declare_type(Interface::Class(proto.clone()));
  root.set_class_scope(&decl.name, stack);
  let value = Value::Class(Class::new(proto, decl.loc));
  root.caches().store_value(decl.node, value.clone());
  stack.declare(decl.var, value);
  Ok(())
}

/// A declared `implements` must be backed by members of the right kind.
fn check_implements(proto: &ProtoRef, iface: &Interface, loc: Loc) -> ValueResult<()> {
  let Interface::Contract(contract) = iface else {
    return Ok(());
  };
  for (key, req) in contract.all_requirements() {
    let found = resolve_member(proto, &key).map(|(_, m)| m.is_method());
    let ok = match (&req, found) {
      (_, None) => false,
      (Requirement::Method(_), Some(is_method)) => is_method,
      (Requirement::Property(_), Some(is_method)) => !is_method,
    };
    if !ok {
      return Err(ValueError::structural(
        loc,
        format!(
          "{} does not implement {}: {} {key} is missing",
          proto.name(),
          contract.name,
          match req {
            Requirement::Method(_) => "method",
            Requirement::Property(_) => "property",
          }
        ),
      ));
    }
  }
  Ok(())
}

fn declare_enum(stack: &StackRef, decl: &EnumDecl) -> ValueResult<()> {
  let cached = stack.root().caches().value(decl.node);
  let value = match cached {
    Some(value) => value,
    None => {
      let mut builder = ClassBuilder::new(decl.name.clone()).universal(true);
      for (name, lit) in &decl.members {
        builder = builder.constant(name.clone(), lit.clone());
      }
      let proto = builder.build();
      stack.root().declare_type(Interface::Class(proto.clone()));
      let value = Value::Enum(EnumValue::new(proto, decl.loc));
      stack.root().caches().store_value(decl.node, value.clone());
      value
    }
  };
  stack.declare(decl.var, value);
  Ok(())
}

fn declare_interface(stack: &StackRef, decl: &InterfaceDecl) -> ValueResult<()> {
  let mut contract = Contract::new(decl.name.clone());
  for name in &decl.extends {
    let parent = stack
      .lookup_interface(name)
      .ok_or_else(|| ValueError::structural(decl.loc, format!("unknown interface {name}")))?;
    contract = contract.extend(parent);
  }
  for member in &decl.members {
    contract = match member {
      InterfaceMember::Method(name, sig) => contract.method(name.clone(), sig.clone()),
      InterfaceMember::Property(name, ty) => contract.property(name.clone(), ty.clone()),
    };
  }
  let iface = contract.into_interface();
  stack.root().declare_type(iface.clone());
  if let Some(var) = decl.var {
    stack.declare(var, Value::ClassInterface(ClassInterface::new(iface, decl.loc)));
  }
  Ok(())
}

fn declare(stack: &StackRef, stmt: &Stmt) -> ValueResult<()> {
  match stmt {
    Stmt::Interface(decl) => declare_interface(stack, decl),
    Stmt::Enum(decl) => declare_enum(stack, decl),
    Stmt::Class(decl) => declare_class(stack, decl),
    Stmt::Function(decl) => {
      let Some(var) = decl.var else {
        return Err(ValueError::internal(
          decl.loc,
          format!("function declaration {} has no binding", decl.name),
        ));
      };
      let func = Function::closure(&**stack, decl.clone(), Some(stack.clone()), None, None, decl.loc);
      stack.declare(var, Value::Function(func));
      Ok(())
    }
    _ => Ok(()),
  }
}

/// Evaluate a statement list. Declarations are bound first, interfaces and
/// enums before classes before functions, so bodies may refer to any of
/// them regardless of order.
pub fn eval_block(stack: &StackRef, stmts: &[Stmt]) -> ValueResult<Flow> {
  let rank = |stmt: &Stmt| match stmt {
    Stmt::Interface(_) | Stmt::Enum(_) => 0,
    Stmt::Class(_) => 1,
    _ => 2,
  };
  let mut hoisted: Vec<&Stmt> = stmts.iter().filter(|s| s.is_hoisted()).collect();
  hoisted.sort_by_key(|s| rank(*s));
  for stmt in hoisted {
    declare(stack, stmt)?;
  }
  for stmt in stmts {
    if eval_stmt(stack, stmt)? == Flow::Return {
      return Ok(Flow::Return);
    }
  }
  Ok(Flow::Normal)
}

fn eval_stmt(stack: &StackRef, stmt: &Stmt) -> ValueResult<Flow> {
  match stmt {
    Stmt::Let {
      var,
      ty,
      init,
      loc,
      ..
    } => {
      let value = match (init, ty) {
        (Some(init), ty) => {
          let value = eval_expr(stack, init)?;
          if let Some(ty) = ty {
            ty.check(&**stack, &value, None, *loc)?;
          }
          value
        }
        (None, Some(ty)) => ty.instantiate(&**stack, None, *loc)?,
        (None, None) => Value::Void(*loc),
      };
      stack.declare(*var, value);
      Ok(Flow::Normal)
    }
    Stmt::Assign { target, value, loc } => {
      let value = eval_expr(stack, value)?;
      eval_assign(stack, target, value, *loc)?;
      Ok(Flow::Normal)
    }
    Stmt::Expr(Expr::Call { callee, args, loc }) if !matches!(**callee, Expr::Member { .. }) => {
      let callee = eval_expr(stack, callee)?;
      let args = eval_args(stack, args)?;
      callee.eval_function_no_return(stack, &args, *loc)?;
      Ok(Flow::Normal)
    }
    Stmt::Expr(expr) => {
      eval_expr(stack, expr)?;
      Ok(Flow::Normal)
    }
    Stmt::Block(stmts, _) => {
      let block: StackRef = Rc::new(BlockStack::new(stack.clone()));
      eval_block(&block, stmts)
    }
    Stmt::If {
      test,
      then,
      otherwise,
      loc,
    } => eval_if(stack, test, then, otherwise.as_deref(), *loc),
    Stmt::While { test, body, loc } => eval_loop(stack, body, None, Some(test), *loc),
    Stmt::ForOf {
      var,
      iterable,
      body,
      loc,
      ..
    } => {
      let item = eval_expr(stack, iterable)?.loop_for_of(stack, *loc)?;
      eval_loop(stack, body, Some((*var, item)), None, *loc)
    }
    Stmt::ForIn {
      var,
      object,
      body,
      loc,
      ..
    } => {
      let key = eval_expr(stack, object)?.loop_for_in(stack, *loc)?;
      eval_loop(stack, body, Some((*var, key)), None, *loc)
    }
    Stmt::Return(value, loc) => {
      let value = match value {
        Some(expr) => eval_expr(stack, expr)?,
        None => Value::Void(*loc),
      };
      stack.set_return(value);
      Ok(Flow::Return)
    }
    Stmt::Class(_) | Stmt::Function(_) | Stmt::Enum(_) | Stmt::Interface(_) => Ok(Flow::Normal),
  }
}
