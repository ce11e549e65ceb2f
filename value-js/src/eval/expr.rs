use super::ast::BinOp;
use super::ast::Expr;
use super::ast::Lit;
use super::ast::ViewQuery;
use super::call::construct;
use super::fold::fold_binary;
use super::fold::fold_unary;
use super::fold::instance_test;
use super::fold::truthiness;
use crate::builtins;
use crate::error::ValueError;
use crate::error::ValueResult;
use crate::loc::Loc;
use crate::stack::StackRef;
use crate::types::Interface;
use crate::types::ProtoRef;
use crate::value::Class;
use crate::value::ClassInterface;
use crate::value::Function;
use crate::value::Null;
use crate::value::Value;

pub(super) fn eval_args(stack: &StackRef, args: &[Expr]) -> ValueResult<Vec<Value>> {
  args.iter().map(|arg| eval_expr(stack, arg)).collect()
}

/// A name not bound by the program may still name a registered type.
fn global(stack: &StackRef, name: &str, loc: Loc) -> ValueResult<Value> {
  match stack.lookup_interface(name) {
    Some(Interface::Class(proto)) => Ok(Value::Class(Class::new(proto, loc))),
    Some(iface) => Ok(Value::ClassInterface(ClassInterface::new(iface, loc))),
    None => Err(ValueError::structural(loc, format!("undeclared variable {name}"))),
  }
}

pub(crate) fn expect_class(stack: &StackRef, name: &str, loc: Loc) -> ValueResult<ProtoRef> {
  stack
    .lookup_proto(name)
    .ok_or_else(|| ValueError::structural(loc, format!("unknown class {name}")))
}

fn eval_lit(stack: &StackRef, lit: &Lit, loc: Loc) -> ValueResult<Value> {
  let registry = stack.registry();
  match lit {
    Lit::Bool(v) => builtins::new_bool(registry, Some(*v), loc),
    Lit::Int(v) => builtins::new_int(registry, Some(*v), loc),
    Lit::Number(v) => builtins::new_number(registry, Some(*v), loc),
    Lit::String(v) => builtins::new_string(registry, Some(v.clone()), loc),
    Lit::Null => Ok(Value::Null(Null::all(loc))),
    Lit::Undefined => Ok(Value::Void(loc)),
  }
}

fn eval_view(stack: &StackRef, query: &ViewQuery, loc: Loc) -> ValueResult<Value> {
  let view = stack
    .view_interface()
    .ok_or_else(|| ValueError::structural(loc, "page values are not available here"))?;
  let registry = stack.registry();
  match query {
    ViewQuery::Var(name) => view.get_var_type_instance(&**stack, name, loc),
    ViewQuery::Elem(id) => {
      if !view.is_elem(id) {
        return Err(ValueError::structural(loc, format!("no element with id {id}")));
      }
      view.get_elem_type_instance(&**stack, id, loc)
    }
    ViewQuery::Def(name) => view.get_def_type_instance(&**stack, name, loc),
    ViewQuery::ElemStates(id) => {
      if !view.is_elem(id) {
        return Err(ValueError::structural(loc, format!("no element with id {id}")));
      }
      let states = view
        .get_elem_states(id, loc)?
        .into_iter()
        .map(|state| builtins::new_string(registry, Some(state), loc))
        .collect::<ValueResult<Vec<_>>>()?;
      builtins::new_array(registry, Some(states), None, loc)
    }
    ViewQuery::Url => builtins::new_string(registry, Some(view.get_url(loc)?), loc),
    ViewQuery::Html => builtins::new_string(registry, Some(view.get_html(loc)?), loc),
  }
}

/// Short-circuit operators only evaluate the right side when the left does
/// not decide the result.
fn eval_logical(stack: &StackRef, op: BinOp, left: &Expr, right: &Expr) -> ValueResult<Value> {
  let l = eval_expr(stack, left)?;
  match (op, truthiness(&l)) {
    (BinOp::And, Some(false)) | (BinOp::Or, Some(true)) => Ok(l),
    (BinOp::And, Some(true)) | (BinOp::Or, Some(false)) => eval_expr(stack, right),
    _ => {
      let r = eval_expr(stack, right)?;
      Ok(l.join(&r))
    }
  }
}

pub fn eval_expr(stack: &StackRef, expr: &Expr) -> ValueResult<Value> {
  match expr {
    Expr::Lit(lit, loc) => eval_lit(stack, lit, *loc),
    Expr::Var { var, name, loc } => match stack.get_value(*var) {
      // Re-point provenance at the read so later errors name the use site.
      Some(value) => Ok(value.with_context(*loc)),
      None => global(stack, name, *loc),
    },
    Expr::This(loc) => stack
      .this_value()
      .ok_or_else(|| ValueError::structural(*loc, "`this` used outside of a class")),
    Expr::Array { items, loc } => {
      let items = eval_args(stack, items)?;
      builtins::new_array(stack.registry(), Some(items), None, *loc)
    }
    Expr::Object { entries, loc } => {
      let entries = entries
        .iter()
        .map(|(key, value)| Ok((key.clone(), eval_expr(stack, value)?)))
        .collect::<ValueResult<Vec<_>>>()?;
      builtins::new_object(stack.registry(), entries, *loc)
    }
    Expr::Member { object, key, loc } => {
      let object = eval_expr(stack, object)?;
      object.get_member(stack, key, *loc)
    }
    Expr::Index { object, index, loc } => {
      let object = eval_expr(stack, object)?;
      let index = eval_expr(stack, index)?;
      object.get_index(stack, &index, *loc)
    }
    Expr::Call { callee, args, loc } => match &**callee {
      Expr::Member { object, key, .. } => {
        let object = eval_expr(stack, object)?;
        let args = eval_args(stack, args)?;
        object.eval_method(stack, key, &args, *loc)
      }
      callee => {
        let callee = eval_expr(stack, callee)?;
        let args = eval_args(stack, args)?;
        callee.eval_function(stack, &args, *loc)
      }
    },
    Expr::New {
      node,
      class,
      args,
      loc,
    } => {
      let class = eval_expr(stack, class)?;
      let args = eval_args(stack, args)?;
      let cached = stack.root().caches().instance(*node);
      let instance = match class.unwrap() {
        Value::Class(c) => construct(stack, c.proto(), &args, cached.clone(), *loc)?,
        _ => class.eval_constructor(stack, &args, *loc)?,
      };
      if cached.is_none() && matches!(instance.unwrap(), Value::Instance(_)) {
        stack.root().caches().store_instance(*node, instance.clone());
      }
      Ok(instance)
    }
    Expr::SuperCall { args, loc } => {
      let this = stack
        .this_value()
        .ok_or_else(|| ValueError::structural(*loc, "`super` used outside of a constructor"))?;
      let parent = stack
        .private_context()
        .and_then(|ctx| ctx.parent().cloned())
        .ok_or_else(|| ValueError::structural(*loc, "`super` used in a class without a parent"))?;
      let args = eval_args(stack, args)?;
      construct(stack, &parent, &args, Some(this), *loc)?;
      Ok(Value::Void(*loc))
    }
    Expr::Unary { op, operand, loc } => {
      let operand = eval_expr(stack, operand)?;
      fold_unary(stack.registry(), *op, &operand, *loc)
    }
    Expr::Binary {
      op: op @ (BinOp::And | BinOp::Or),
      left,
      right,
      ..
    } => eval_logical(stack, *op, left, right),
    Expr::Binary {
      op,
      left,
      right,
      loc,
    } => {
      let left = eval_expr(stack, left)?;
      let right = eval_expr(stack, right)?;
      fold_binary(stack.registry(), *op, &left, &right, *loc)
    }
    Expr::Cond {
      test,
      then,
      otherwise,
      ..
    } => {
      let test = eval_expr(stack, test)?;
      match truthiness(&test) {
        Some(true) => eval_expr(stack, then),
        Some(false) => eval_expr(stack, otherwise),
        None => {
          let a = eval_expr(stack, then)?;
          let b = eval_expr(stack, otherwise)?;
          Ok(a.join(&b))
        }
      }
    }
    Expr::Function(decl) => Ok(Value::Function(Function::closure(
      &**stack,
      decl.clone(),
      Some(stack.clone()),
      stack.this_value(),
      stack.private_context(),
      decl.loc,
    ))),
    Expr::Await { operand, loc } => eval_expr(stack, operand)?.resolve_await(*loc),
    Expr::Cast { value, target, loc } => {
      let value = eval_expr(stack, value)?;
      let iface = stack
        .lookup_interface(target)
        .ok_or_else(|| ValueError::structural(*loc, format!("unknown type {target}")))?;
      value.cast(stack, &iface, *loc)
    }
    Expr::InstanceOf { value, class, loc } => {
      let value = eval_expr(stack, value)?;
      let proto = expect_class(stack, class, *loc)?;
      builtins::new_bool(stack.registry(), instance_test(&value, &proto), *loc)
    }
    Expr::View(query, loc) => eval_view(stack, query, *loc),
  }
}
