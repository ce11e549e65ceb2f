//! Abstract values.
//!
//! A [`Value`] stands in for every runtime value an expression may produce.
//! The set of variants is closed; every operation of the contract is one
//! `match` below, and variants that do not support an operation answer with
//! [`ErrorDetail::Unsupported`](crate::error::ErrorDetail::Unsupported).
//! [`Value::Context`] only overrides provenance and is stripped by
//! [`Value::unwrap`] before any variant is inspected.

pub mod class;
pub mod copy;
pub mod function;
pub mod instance;
pub mod multi;
pub mod null;

pub use class::Class;
pub use class::ClassInterface;
pub use class::EnumValue;
pub use copy::CopyCache;
pub use function::Function;
pub use function::FunctionKind;
pub use instance::Instance;
pub use multi::new_multi;
pub use multi::Multi;
pub use null::Null;

use crate::error::Op;
use crate::error::ValueError;
use crate::error::ValueResult;
use crate::loc::Loc;
use crate::props::Payload;
use crate::props::Properties;
use crate::stack::StackRef;
use crate::types::generate_instance;
use crate::types::Interface;
use crate::types::ProtoRef;
use ahash::HashSet;
use std::rc::Rc;
use tracing::trace;

#[derive(Clone, Debug)]
pub enum Value {
  Instance(Instance),
  Multi(Multi),
  Null(Null),
  Void(Loc),
  Function(Function),
  Class(Class),
  ClassInterface(ClassInterface),
  Enum(EnumValue),
  Any(Loc),
  Context(ContextValue),
}

/// Provenance override; see [`Value::with_context`].
#[derive(Clone, Debug)]
pub struct ContextValue {
  inner: Rc<Value>,
  loc: Loc,
}

/// Pairs of properties currently being merged, so merging two cyclic graphs
/// terminates.
#[derive(Default)]
pub(crate) struct MergeState {
  pub(crate) active: Vec<(usize, usize)>,
}

pub(crate) fn join_in(a: &Value, b: &Value, state: &mut MergeState) -> Value {
  match a.merge_in(b, state) {
    Some(merged) => merged,
    None => multi::build(a.clone(), [b.clone()], a.context(), state),
  }
}

impl Value {
  /// The single place context wrappers are stripped.
  pub fn unwrap(&self) -> &Value {
    match self {
      Value::Context(c) => c.inner.unwrap(),
      other => other,
    }
  }

  /// Where this value was produced.
  pub fn context(&self) -> Loc {
    match self {
      Value::Instance(v) => v.loc(),
      Value::Multi(v) => v.loc(),
      Value::Null(v) => v.loc(),
      Value::Void(loc) | Value::Any(loc) => *loc,
      Value::Function(v) => v.loc(),
      Value::Class(v) => v.loc(),
      Value::ClassInterface(v) => v.loc(),
      Value::Enum(v) => v.loc(),
      Value::Context(c) => c.loc,
    }
  }

  /// Same value, reported as coming from `loc`.
  pub fn with_context(&self, loc: Loc) -> Value {
    Value::Context(ContextValue {
      inner: Rc::new(self.unwrap().clone()),
      loc,
    })
  }

  pub fn type_name(&self) -> String {
    match self {
      Value::Instance(v) => v.type_name(),
      Value::Multi(v) => v.type_name(),
      Value::Null(v) => v.type_name(),
      Value::Void(_) => "void".to_string(),
      Value::Function(_) => "function".to_string(),
      Value::Class(v) => format!("class {}", v.proto().name()),
      Value::ClassInterface(v) => format!("interface {}", v.interface().name()),
      Value::Enum(v) => format!("enum {}", v.proto().name()),
      Value::Any(_) => "any".to_string(),
      Value::Context(c) => c.inner.type_name(),
    }
  }

  /// Statically visible interface of an instance or typed null.
  pub fn interface(&self) -> Option<Interface> {
    match self.unwrap() {
      Value::Instance(v) => Some(v.outer()),
      Value::Null(v) => v.outer().cloned(),
      _ => None,
    }
  }

  pub fn is_any(&self) -> bool {
    matches!(self.unwrap(), Value::Any(_))
  }

  pub fn is_void(&self) -> bool {
    matches!(self.unwrap(), Value::Void(_))
  }

  pub fn is_null(&self) -> bool {
    matches!(self.unwrap(), Value::Null(_))
  }

  pub fn is_function_like(&self) -> bool {
    match self.unwrap() {
      Value::Function(_) => true,
      Value::Multi(m) => m
        .values()
        .iter()
        .all(|v| v.is_function_like() || v.is_null()),
      _ => false,
    }
  }

  pub fn is_instance_like(&self) -> bool {
    match self.unwrap() {
      Value::Instance(_) => true,
      Value::Multi(m) => m
        .values()
        .iter()
        .all(|v| v.is_instance_like() || v.is_null()),
      _ => false,
    }
  }

  /// Identity, not structural equality.
  pub fn same(&self, other: &Value) -> bool {
    match (self.unwrap(), other.unwrap()) {
      (Value::Instance(a), Value::Instance(b)) => a.same(b),
      (Value::Multi(a), Value::Multi(b)) => a.ptr_eq(b),
      (Value::Null(a), Value::Null(b)) => a.type_name() == b.type_name(),
      (Value::Void(_), Value::Void(_)) | (Value::Any(_), Value::Any(_)) => true,
      (Value::Function(a), Value::Function(b)) => a.same_identity(b),
      (Value::Class(a), Value::Class(b)) => a.proto().name() == b.proto().name(),
      (Value::ClassInterface(a), Value::ClassInterface(b)) => a.interface().same(b.interface()),
      (Value::Enum(a), Value::Enum(b)) => a.proto().name() == b.proto().name(),
      _ => false,
    }
  }

  fn payload(&self) -> Option<Payload> {
    match self.unwrap() {
      Value::Instance(v) => Some(v.props().payload()),
      _ => None,
    }
  }

  pub fn is_literal(&self) -> bool {
    self.payload().is_some_and(|p| p.is_literal())
  }

  pub fn literal_bool(&self) -> Option<bool> {
    match self.payload()? {
      Payload::Bool(v) => v,
      _ => None,
    }
  }

  pub fn literal_int(&self) -> Option<i64> {
    match self.payload()? {
      Payload::Int(v) => v,
      _ => None,
    }
  }

  /// Literal `Int`s are numbers too.
  pub fn literal_number(&self) -> Option<f64> {
    match self.payload()? {
      Payload::Number(v) => v,
      Payload::Int(v) => v.map(|v| v as f64),
      _ => None,
    }
  }

  pub fn literal_string(&self) -> Option<String> {
    match self.payload()? {
      Payload::String(v) => v,
      _ => None,
    }
  }

  pub fn literal_array(&self) -> Option<Vec<Value>> {
    match self.payload()? {
      Payload::Array(list) => list.items,
      _ => None,
    }
  }

  /// Element shape of an aggregate or promise.
  pub fn item_shape(&self) -> Option<Value> {
    self.payload()?.item_shape()
  }

  pub fn key_shape(&self) -> Option<Value> {
    self.payload()?.key_shape()
  }

  /// Deep copy with disjoint properties.
  pub fn copy(&self, cache: &mut CopyCache) -> Value {
    match self.unwrap() {
      Value::Instance(v) => Value::Instance(v.with_props(v.props().copy(cache))),
      Value::Multi(m) => {
        let values = m.values().iter().map(|v| v.copy(cache)).collect();
        new_multi(values, m.loc()).unwrap_or_else(|_| self.clone())
      }
      other => other.clone(),
    }
  }

  /// Combine two values reaching the same program point into one, or fail
  /// when they are of incompatible kinds. Failing is not an error: the caller
  /// keeps both as a union (see [`Value::join`]).
  pub fn merge(&self, other: &Value) -> Option<Value> {
    self.merge_in(other, &mut MergeState::default())
  }

  pub(crate) fn merge_in(&self, other: &Value, state: &mut MergeState) -> Option<Value> {
    let merged = match (self.unwrap(), other.unwrap()) {
      (Value::Any(loc), _) => Some(Value::Any(*loc)),
      (_, Value::Any(loc)) => Some(Value::Any(*loc)),
      (Value::Null(a), b) => a.merge(b),
      (a, Value::Null(b)) if b.is_all() => Some(a.clone()),
      (Value::Instance(a), Value::Instance(b)) => a.merge_in(b, state).map(Value::Instance),
      (Value::Void(loc), Value::Void(_)) => Some(Value::Void(*loc)),
      (a @ Value::Function(_), b @ Value::Function(_))
      | (a @ Value::Class(_), b @ Value::Class(_))
      | (a @ Value::ClassInterface(_), b @ Value::ClassInterface(_))
      | (a @ Value::Enum(_), b @ Value::Enum(_)) => a.same(b).then(|| a.clone()),
      _ => None,
    };
    trace!(
      left = %self.type_name(),
      right = %other.type_name(),
      merged = merged.is_some(),
      "merge"
    );
    merged
  }

  /// Merge, or else a union of both.
  pub fn join(&self, other: &Value) -> Value {
    join_in(self, other, &mut MergeState::default())
  }

  /// Drop literal precision. Shallow removal only affects booleans and
  /// numbers; full removal also affects strings and aggregates and recurses
  /// into nested properties. Scalars get a fresh instance; aggregates and
  /// objects are decayed in place since every alias now sees mutable state.
  pub fn remove_literalness(&self, all: bool) -> Value {
    self.remove_literalness_in(all, &mut HashSet::default())
  }

  pub(crate) fn remove_literalness_in(&self, all: bool, visited: &mut HashSet<usize>) -> Value {
    match self.unwrap() {
      Value::Instance(v) => {
        let payload = v.props().payload();
        if payload.is_scalar() {
          if !payload.is_literal() || (!all && matches!(payload, Payload::String(_))) {
            return self.clone();
          }
          let props = Properties::new(payload.decay(all, visited));
          props.lock();
          return Value::Instance(v.with_props(props));
        }
        if all {
          v.props().decay(true, visited);
        }
        self.clone()
      }
      Value::Multi(m) => {
        let values = m
          .values()
          .iter()
          .map(|v| v.remove_literalness_in(all, visited))
          .collect();
        new_multi(values, m.loc()).unwrap_or_else(|_| self.clone())
      }
      _ => self.clone(),
    }
  }

  /// True if this is an instance of any of the named prototypes or
  /// interfaces. A union must satisfy this on every branch.
  pub fn is_instance_of(&self, names: &[&str]) -> bool {
    match self.unwrap() {
      Value::Instance(v) => v.is_instance_of(names),
      Value::Multi(m) => m.values().iter().all(|v| v.is_instance_of(names)),
      _ => false,
    }
  }

  pub fn cast(&self, stack: &StackRef, target: &Interface, loc: Loc) -> ValueResult<Value> {
    match self.unwrap() {
      Value::Instance(v) => v.cast(target, loc),
      Value::Multi(m) => m.map(|v| v.cast(stack, target, loc)),
      Value::Null(v) => v.cast(target, loc),
      Value::Any(_) => match target {
        Interface::Class(proto) => Ok(generate_instance(proto, loc)),
        Interface::Contract(_) => Ok(Value::Any(loc)),
      },
      other => Err(ValueError::structural(
        loc,
        format!("cannot cast {} to {}", other.type_name(), target.name()),
      )),
    }
  }

  pub fn eval_function(&self, stack: &StackRef, args: &[Value], loc: Loc) -> ValueResult<Value> {
    match self.unwrap() {
      Value::Function(f) => f.call(stack, args, loc),
      Value::Multi(m) => m.map(|v| v.eval_function(stack, args, loc)),
      Value::Any(_) => Ok(Value::Any(loc)),
      other => Err(ValueError::unsupported(loc, other.type_name(), Op::Call)),
    }
  }

  pub fn eval_function_no_return(&self, stack: &StackRef, args: &[Value], loc: Loc) -> ValueResult<()> {
    self.eval_function(stack, args, loc).map(|_| ())
  }

  pub fn eval_method(
    &self,
    stack: &StackRef,
    key: &str,
    args: &[Value],
    loc: Loc,
  ) -> ValueResult<Value> {
    match self.unwrap() {
      Value::Multi(m) => m.map(|v| v.eval_method(stack, key, args, loc)),
      _ => self
        .get_member(stack, key, loc)?
        .eval_function(stack, args, loc),
    }
  }

  pub fn eval_constructor(&self, stack: &StackRef, args: &[Value], loc: Loc) -> ValueResult<Value> {
    match self.unwrap() {
      Value::Class(c) => c.construct(stack, args, loc),
      Value::Multi(m) => m.map(|v| v.eval_constructor(stack, args, loc)),
      Value::Any(_) => Ok(Value::Any(loc)),
      other => Err(ValueError::unsupported(loc, other.type_name(), Op::Construct)),
    }
  }

  pub fn eval_as_entry_point(&self, stack: &StackRef, loc: Loc) -> ValueResult<()> {
    match self.unwrap() {
      Value::Function(f) => f.call_as_entry_point(stack, loc),
      other => Err(ValueError::unsupported(loc, other.type_name(), Op::EntryPoint)),
    }
  }

  pub fn get_member(&self, stack: &StackRef, key: &str, loc: Loc) -> ValueResult<Value> {
    match self.unwrap() {
      Value::Instance(v) => v.get_member(stack, key, loc),
      Value::Multi(m) => m.map(|v| v.get_member(stack, key, loc)),
      Value::Class(c) => c.get_member(stack, key, loc),
      Value::Enum(e) => e.get_member(stack, key, loc),
      Value::Any(_) => Ok(Value::Any(loc)),
      Value::Null(_) => Err(ValueError::structural(
        loc,
        format!("cannot read member {key} of null"),
      )),
      other => Err(ValueError::unsupported(loc, other.type_name(), Op::GetMember)),
    }
  }

  pub fn set_member(&self, stack: &StackRef, key: &str, value: &Value, loc: Loc) -> ValueResult<()> {
    match self.unwrap() {
      Value::Instance(v) => v.set_member(stack, key, value, loc),
      Value::Multi(m) => m.for_each(|v| v.set_member(stack, key, value, loc)),
      Value::Any(_) => Ok(()),
      Value::Null(_) => Err(ValueError::structural(
        loc,
        format!("cannot set member {key} of null"),
      )),
      other => Err(ValueError::unsupported(loc, other.type_name(), Op::SetMember)),
    }
  }

  pub fn get_index(&self, stack: &StackRef, index: &Value, loc: Loc) -> ValueResult<Value> {
    match self.unwrap() {
      Value::Instance(v) => v.get_index(stack, index, loc),
      Value::Multi(m) => m.map(|v| v.get_index(stack, index, loc)),
      Value::Any(_) => Ok(Value::Any(loc)),
      other => Err(ValueError::unsupported(loc, other.type_name(), Op::GetIndex)),
    }
  }

  pub fn set_index(&self, stack: &StackRef, index: &Value, value: &Value, loc: Loc) -> ValueResult<()> {
    match self.unwrap() {
      Value::Instance(v) => v.set_index(index, value, loc),
      Value::Multi(m) => m.for_each(|v| v.set_index(stack, index, value, loc)),
      Value::Any(_) => Ok(()),
      other => Err(ValueError::unsupported(loc, other.type_name(), Op::SetIndex)),
    }
  }

  /// Shape of the variable bound by `for (x in self)`.
  pub fn loop_for_in(&self, stack: &StackRef, loc: Loc) -> ValueResult<Value> {
    match self.unwrap() {
      Value::Instance(v) => v.loop_for_in(stack, loc),
      Value::Multi(m) => m.map(|v| v.loop_for_in(stack, loc)),
      Value::Any(_) => Ok(Value::Any(loc)),
      other => Err(ValueError::unsupported(loc, other.type_name(), Op::LoopForIn)),
    }
  }

  /// Shape of the variable bound by `for (x of self)`.
  pub fn loop_for_of(&self, stack: &StackRef, loc: Loc) -> ValueResult<Value> {
    match self.unwrap() {
      Value::Instance(v) => v.loop_for_of(stack, loc),
      Value::Multi(m) => m.map(|v| v.loop_for_of(stack, loc)),
      Value::Any(_) => Ok(Value::Any(loc)),
      other => Err(ValueError::unsupported(loc, other.type_name(), Op::LoopForOf)),
    }
  }

  /// `await self`: the resolution values known so far, not a suspension.
  pub fn resolve_await(&self, loc: Loc) -> ValueResult<Value> {
    match self.unwrap() {
      Value::Instance(v) => Ok(v.resolve_await(loc)),
      Value::Multi(m) => m.map(|v| v.resolve_await(loc)),
      Value::Null(_) | Value::Any(_) => Ok(self.unwrap().clone()),
      other => Err(ValueError::unsupported(loc, other.type_name(), Op::Await)),
    }
  }

  /// Visit the prototype of every instance reachable from this value.
  pub fn loop_nested_prototypes(&self, visitor: &mut dyn FnMut(&ProtoRef)) {
    self.walk_prototypes(visitor, &mut HashSet::default());
  }

  fn walk_prototypes(&self, visitor: &mut dyn FnMut(&ProtoRef), visited: &mut HashSet<usize>) {
    match self.unwrap() {
      Value::Instance(v) => {
        visitor(&v.inner());
        if !visited.insert(v.props().id()) {
          return;
        }
        for (_, nested) in v.props().items() {
          nested.walk_prototypes(visitor, visited);
        }
        for nested in v.props().payload().nested_values() {
          nested.walk_prototypes(visitor, visited);
        }
      }
      Value::Multi(m) => {
        for v in m.values() {
          v.walk_prototypes(visitor, visited);
        }
      }
      Value::Null(n) => {
        if let Some(proto) = n.proto() {
          visitor(proto);
        }
      }
      _ => {}
    }
  }

  /// Unchecked narrowing to `proto`, fresh or in place.
  pub fn change_instance_prototype(&self, proto: &ProtoRef, in_place: bool, loc: Loc) -> ValueResult<Value> {
    match self.unwrap() {
      Value::Instance(v) => Ok(Value::Instance(v.change_prototype(proto, in_place))),
      Value::Multi(m) => m.map(|v| v.change_instance_prototype(proto, in_place, loc)),
      Value::Any(_) => Ok(generate_instance(proto, loc)),
      other => Err(ValueError::unsupported(
        loc,
        other.type_name(),
        Op::ChangePrototype,
      )),
    }
  }

  /// Narrow the visible interface, checked against the instance prototype.
  pub fn change_instance_interface(
    &self,
    iface: &Interface,
    in_place: bool,
    loc: Loc,
  ) -> ValueResult<Value> {
    match self.unwrap() {
      Value::Instance(v) => Ok(Value::Instance(v.change_interface(iface, in_place, loc)?)),
      Value::Multi(m) => m.map(|v| v.change_instance_interface(iface, in_place, loc)),
      Value::Null(n) => Ok(Value::Null(n.retyped(iface))),
      Value::Any(_) => Ok(Value::Any(loc)),
      other => Err(ValueError::unsupported(
        loc,
        other.type_name(),
        Op::ChangeInterface,
      )),
    }
  }
}
