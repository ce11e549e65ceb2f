use super::function::bind_member;
use super::MergeState;
use super::Value;
use crate::builtins;
use crate::builtins::names;
use crate::error::Op;
use crate::error::ValueError;
use crate::error::ValueResult;
use crate::loc::Loc;
use crate::props::Payload;
use crate::props::Properties;
use crate::stack::Stack;
use crate::stack::StackRef;
use crate::types::has_ancestor;
use crate::types::resolve_member;
use crate::types::Interface;
use crate::types::Member;
use crate::types::ProtoRef;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Clone)]
struct InstanceTypes {
  /// Concrete prototype the instance was created from.
  origin: ProtoRef,
  /// Prototype member lookups go through.
  inner: ProtoRef,
  /// Statically visible type; `inner` or something `inner` satisfies.
  outer: Interface,
}

/// An object of a known prototype. Clones share both the type cell and the
/// properties, so in-place narrowing is visible through every alias.
#[derive(Clone)]
pub struct Instance {
  types: Rc<RefCell<InstanceTypes>>,
  props: Properties,
  loc: Loc,
}

impl fmt::Debug for Instance {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let types = self.types.borrow();
    write!(f, "Instance({}", types.outer.name())?;
    if types.inner.name() != types.outer.name() {
      write!(f, " as {}", types.inner.name())?;
    }
    write!(f, ", {:?})", self.props)
  }
}

fn outer_admits(outer: &Interface, inner: &ProtoRef) -> bool {
  let inner = Interface::Class(inner.clone());
  outer.is_ancestor_of(&inner)
    || (matches!(outer, Interface::Contract(_)) && outer.check(&inner, Loc::unknown()).is_ok())
}

/// Private names are reachable from code of a related class only.
fn check_private(stack: &dyn Stack, owner: &ProtoRef, key: &str, loc: Loc) -> ValueResult<()> {
  let prefix = &stack.registry().options().private_prefix;
  if prefix.is_empty() || !key.starts_with(prefix.as_str()) {
    return Ok(());
  }
  match stack.private_context() {
    Some(ctx) if has_ancestor(&ctx, owner.name()) || has_ancestor(owner, ctx.name()) => Ok(()),
    _ => Err(ValueError::structural(
      loc,
      format!("{}.{key} is private", owner.name()),
    )),
  }
}

fn expect_key(index: &Value, proto: &str, owner: &str, loc: Loc) -> ValueResult<()> {
  if index.unwrap().is_any() || index.is_instance_of(&[proto]) {
    return Ok(());
  }
  Err(ValueError::structural(
    loc,
    format!("{owner} index must be {proto}, got {}", index.type_name()),
  ))
}

impl Instance {
  pub fn of(proto: ProtoRef, props: Properties, loc: Loc) -> Instance {
    Instance {
      types: Rc::new(RefCell::new(InstanceTypes {
        origin: proto.clone(),
        outer: Interface::Class(proto.clone()),
        inner: proto,
      })),
      props,
      loc,
    }
  }

  pub fn new(
    origin: ProtoRef,
    inner: ProtoRef,
    outer: Interface,
    props: Properties,
    loc: Loc,
  ) -> ValueResult<Instance> {
    if !outer_admits(&outer, &inner) {
      return Err(ValueError::internal(
        loc,
        format!(
          "instance of {} cannot be viewed as {}",
          inner.name(),
          outer.name()
        ),
      ));
    }
    Ok(Instance {
      types: Rc::new(RefCell::new(InstanceTypes {
        origin,
        inner,
        outer,
      })),
      props,
      loc,
    })
  }

  pub fn origin(&self) -> ProtoRef {
    self.types.borrow().origin.clone()
  }

  pub fn inner(&self) -> ProtoRef {
    self.types.borrow().inner.clone()
  }

  pub fn outer(&self) -> Interface {
    self.types.borrow().outer.clone()
  }

  pub fn props(&self) -> &Properties {
    &self.props
  }

  pub fn loc(&self) -> Loc {
    self.loc
  }

  pub fn type_name(&self) -> String {
    self.types.borrow().outer.name().to_string()
  }

  pub(crate) fn same(&self, other: &Instance) -> bool {
    Rc::ptr_eq(&self.types, &other.types) && self.props.ptr_eq(&other.props)
  }

  fn same_types(&self, other: &Instance) -> bool {
    let a = self.types.borrow();
    let b = other.types.borrow();
    a.origin.name() == b.origin.name()
      && a.inner.name() == b.inner.name()
      && a.outer.same(&b.outer)
  }

  pub(crate) fn with_props(&self, props: Properties) -> Instance {
    Instance {
      types: Rc::new(RefCell::new(self.types.borrow().clone())),
      props,
      loc: self.loc,
    }
  }

  /// Retype either in place (every alias sees it) or as a fresh instance
  /// sharing the same properties.
  fn retype(&self, origin: ProtoRef, inner: ProtoRef, outer: Interface, in_place: bool) -> Instance {
    let types = InstanceTypes {
      origin,
      inner,
      outer,
    };
    if in_place {
      *self.types.borrow_mut() = types;
      self.clone()
    } else {
      Instance {
        types: Rc::new(RefCell::new(types)),
        props: self.props.clone(),
        loc: self.loc,
      }
    }
  }

  pub(crate) fn merge_in(&self, other: &Instance, state: &mut MergeState) -> Option<Instance> {
    if !self.same_types(other) {
      return None;
    }
    if self.props.ptr_eq(&other.props) {
      return Some(self.clone());
    }
    let key = (self.props.id(), other.props.id());
    if state.active.contains(&key) {
      // Already merging this pair further up a cyclic graph.
      return Some(self.clone());
    }
    state.active.push(key);
    let props = self.props.merge_in(&other.props, state);
    state.active.pop();
    props.map(|props| self.with_props(props))
  }

  pub fn is_instance_of(&self, names: &[&str]) -> bool {
    let inner = Interface::Class(self.inner());
    names.iter().any(|name| inner.extends_named(name))
  }

  /// Upcast to an ancestor or satisfied contract, or an unchecked downcast
  /// to a descendant class.
  pub fn cast(&self, target: &Interface, loc: Loc) -> ValueResult<Value> {
    let InstanceTypes {
      origin,
      inner,
      outer,
    } = self.types.borrow().clone();
    let inner_iface = Interface::Class(inner.clone());
    if target.is_ancestor_of(&inner_iface) {
      return Ok(Value::Instance(self.retype(origin, inner, target.clone(), false)));
    }
    match target {
      Interface::Class(proto) if has_ancestor(proto, outer.name()) => Ok(Value::Instance(
        self.retype(proto.clone(), proto.clone(), target.clone(), false),
      )),
      Interface::Contract(_) => {
        target.check(&inner_iface, loc)?;
        Ok(Value::Instance(self.retype(origin, inner, target.clone(), false)))
      }
      Interface::Class(_) => Err(ValueError::structural(
        loc,
        format!("cannot cast {} to {}", outer.name(), target.name()),
      )),
    }
  }

  /// Unchecked narrowing to `proto`.
  pub fn change_prototype(&self, proto: &ProtoRef, in_place: bool) -> Instance {
    self.retype(
      proto.clone(),
      proto.clone(),
      Interface::Class(proto.clone()),
      in_place,
    )
  }

  /// Narrowing of the visible type, checked against the instance prototype.
  pub fn change_interface(&self, iface: &Interface, in_place: bool, loc: Loc) -> ValueResult<Instance> {
    let (origin, inner) = {
      let types = self.types.borrow();
      (types.origin.clone(), types.inner.clone())
    };
    iface.check(&Interface::Class(inner.clone()), loc)?;
    Ok(self.retype(origin, inner, iface.clone(), in_place))
  }

  /// Own properties first, then the member table of `inner`.
  pub fn get_member(&self, stack: &StackRef, key: &str, loc: Loc) -> ValueResult<Value> {
    let inner = self.inner();
    let resolved = resolve_member(&inner, key);
    let owner = resolved.map(|(owner, _)| owner).unwrap_or(&inner);
    check_private(&**stack, owner, key, loc)?;
    if let Some(value) = self.props.get_property(key) {
      return Ok(value);
    }
    if let Some(value) = builtins::fold_getter(stack.registry(), self, key, loc)? {
      return Ok(value);
    }
    match resolved {
      Some((owner, member)) => {
        let this = Value::Instance(self.clone());
        bind_member(&**stack, key, owner, member, Some(this), loc)
      }
      None => Err(ValueError::structural(
        loc,
        format!("{} has no member {key}", self.type_name()),
      )),
    }
  }

  /// Values escaping into an object field lose all literal precision.
  pub fn set_member(&self, stack: &StackRef, key: &str, value: &Value, loc: Loc) -> ValueResult<()> {
    let inner = self.inner();
    let resolved = resolve_member(&inner, key);
    let owner = resolved.map(|(owner, _)| owner).unwrap_or(&inner);
    check_private(&**stack, owner, key, loc)?;
    let value = value.remove_literalness(true);
    match resolved.map(|(_, member)| member) {
      Some(Member::Field { ty, readonly }) => {
        if *readonly && !self.props.is_exempt(&**stack) {
          return Err(ValueError::structural(
            loc,
            format!("cannot assign to readonly field {}.{key}", owner.name()),
          ));
        }
        let this = Value::Instance(self.clone());
        ty.check(&**stack, &value, Some(&this), loc)?;
        self.props.set_declared(key, value, loc)
      }
      Some(member) => Err(ValueError::structural(
        loc,
        format!(
          "cannot assign to {} {}.{key}",
          member.kind_name(),
          owner.name()
        ),
      )),
      None => self.props.set_property(&**stack, key, value, loc),
    }
  }

  pub fn get_index(&self, stack: &StackRef, index: &Value, loc: Loc) -> ValueResult<Value> {
    let registry = stack.registry();
    match self.props.payload() {
      Payload::Array(list) => {
        expect_key(index, names::INT, names::ARRAY, loc)?;
        let literal = list
          .items
          .as_ref()
          .zip(index.literal_int())
          .and_then(|(items, i)| usize::try_from(i).ok().and_then(|i| items.get(i)));
        Ok(match literal {
          Some(item) => item.clone(),
          None => list.item.unwrap_or(Value::Any(loc)),
        })
      }
      Payload::String(s) => {
        expect_key(index, names::INT, names::STRING, loc)?;
        let ch = s
          .zip(index.literal_int())
          .and_then(|(s, i)| usize::try_from(i).ok().and_then(|i| s.chars().nth(i)));
        builtins::new_string(registry, ch.map(String::from), loc)
      }
      Payload::Object(dict) => {
        expect_key(index, names::STRING, names::OBJECT, loc)?;
        let literal = index.literal_string().and_then(|k| {
          self
            .props
            .get_property(&k)
            .or_else(|| dict.items.as_ref().and_then(|items| items.get(&k).cloned()))
        });
        Ok(
          literal
            .or(dict.item)
            .unwrap_or(Value::Any(loc)),
        )
      }
      _ => Err(ValueError::unsupported(loc, self.type_name(), Op::GetIndex)),
    }
  }

  pub fn set_index(&self, index: &Value, value: &Value, loc: Loc) -> ValueResult<()> {
    let value = value.remove_literalness(true);
    match self.props.payload() {
      Payload::Array(mut list) => {
        expect_key(index, names::INT, names::ARRAY, loc)?;
        list.absorb(&value);
        self.props.set_payload(Payload::Array(list));
        Ok(())
      }
      Payload::Object(mut dict) => {
        expect_key(index, names::STRING, names::OBJECT, loc)?;
        dict.items = None;
        dict.item = Some(match dict.item {
          Some(item) => item.join(&value),
          None => value,
        });
        self.props.set_payload(Payload::Object(dict));
        Ok(())
      }
      _ => Err(ValueError::unsupported(loc, self.type_name(), Op::SetIndex)),
    }
  }

  /// Shape of the loop variable of `for (x of self)`.
  pub fn loop_for_of(&self, stack: &StackRef, loc: Loc) -> ValueResult<Value> {
    match self.props.payload() {
      Payload::Array(list) | Payload::Set(list) => Ok(list.item.unwrap_or(Value::Any(loc))),
      Payload::Map(map) => Ok(map.item.unwrap_or(Value::Any(loc))),
      Payload::String(_) => builtins::new_string(stack.registry(), None, loc),
      _ => Err(ValueError::unsupported(loc, self.type_name(), Op::LoopForOf)),
    }
  }

  /// Shape of the loop variable of `for (x in self)`.
  pub fn loop_for_in(&self, stack: &StackRef, loc: Loc) -> ValueResult<Value> {
    match self.props.payload() {
      Payload::Array(_) => builtins::new_int(stack.registry(), None, loc),
      Payload::Object(_) => builtins::new_string(stack.registry(), None, loc),
      Payload::Map(map) => Ok(map.key.unwrap_or(Value::Any(loc))),
      _ => Err(ValueError::unsupported(loc, self.type_name(), Op::LoopForIn)),
    }
  }

  /// Currently known resolution of a promise; other instances await to
  /// themselves.
  pub fn resolve_await(&self, loc: Loc) -> Value {
    match self.props.payload() {
      Payload::Promise(p) => p
        .resolved
        .or(p.item)
        .unwrap_or(Value::Any(loc))
        .remove_literalness(false),
      _ => Value::Instance(self.clone()),
    }
  }
}
