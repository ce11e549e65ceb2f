use super::function::bind_member;
use super::Value;
use crate::error::ValueError;
use crate::error::ValueResult;
use crate::eval::call::construct;
use crate::loc::Loc;
use crate::stack::StackRef;
use crate::types::resolve_class_member;
use crate::types::Interface;
use crate::types::Member;
use crate::types::ProtoRef;
use std::fmt;

/// A class used as a value: `new C()`, `C.staticMethod()`.
#[derive(Clone)]
pub struct Class {
  proto: ProtoRef,
  loc: Loc,
}

impl fmt::Debug for Class {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Class({})", self.proto.name())
  }
}

impl Class {
  pub fn new(proto: ProtoRef, loc: Loc) -> Class {
    Class { proto, loc }
  }

  pub fn proto(&self) -> &ProtoRef {
    &self.proto
  }

  pub fn loc(&self) -> Loc {
    self.loc
  }

  pub fn get_member(&self, stack: &StackRef, key: &str, loc: Loc) -> ValueResult<Value> {
    match resolve_class_member(&self.proto, key) {
      Some((owner, member)) => bind_member(&**stack, key, owner, member, None, loc),
      None => Err(ValueError::structural(
        loc,
        format!("{} has no static member {key}", self.proto.name()),
      )),
    }
  }

  pub fn construct(&self, stack: &StackRef, args: &[Value], loc: Loc) -> ValueResult<Value> {
    construct(stack, &self.proto, args, None, loc)
  }
}

/// A named interface used as a value, e.g. the right-hand side of a cast.
#[derive(Clone)]
pub struct ClassInterface {
  iface: Interface,
  loc: Loc,
}

impl fmt::Debug for ClassInterface {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "ClassInterface({})", self.iface.name())
  }
}

impl ClassInterface {
  pub fn new(iface: Interface, loc: Loc) -> ClassInterface {
    ClassInterface { iface, loc }
  }

  pub fn interface(&self) -> &Interface {
    &self.iface
  }

  pub fn loc(&self) -> Loc {
    self.loc
  }
}

/// An enumeration: a prototype whose class-level members are constants.
#[derive(Clone)]
pub struct EnumValue {
  proto: ProtoRef,
  loc: Loc,
}

impl fmt::Debug for EnumValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Enum({})", self.proto.name())
  }
}

impl EnumValue {
  pub fn new(proto: ProtoRef, loc: Loc) -> EnumValue {
    EnumValue { proto, loc }
  }

  pub fn proto(&self) -> &ProtoRef {
    &self.proto
  }

  pub fn loc(&self) -> Loc {
    self.loc
  }

  pub fn get_member(&self, stack: &StackRef, key: &str, loc: Loc) -> ValueResult<Value> {
    match self.proto.class_member(key) {
      Some(member @ Member::Constant(_)) => bind_member(&**stack, key, &self.proto, member, None, loc),
      _ => Err(ValueError::structural(
        loc,
        format!("enum {} has no member {key}", self.proto.name()),
      )),
    }
  }
}
