use super::generate_instance;
use super::Interface;
use super::Signature;
use crate::builtins;
use crate::builtins::names;
use crate::error::ValueError;
use crate::error::ValueResult;
use crate::loc::Loc;
use crate::stack::Stack;
use crate::value::Function;
use crate::value::Null;
use crate::value::Value;
use std::fmt;

/// A declared type as written in a member table or signature.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeRef {
  Any,
  Void,
  /// The receiver's own type.
  This,
  /// Element shape of the receiver (array/set items, map values, promise
  /// content).
  Item,
  /// Key shape of a map receiver.
  Key,
  Named(String),
  Nullable(Box<TypeRef>),
  Array(Box<TypeRef>),
  Promise(Box<TypeRef>),
  Map(Box<TypeRef>, Box<TypeRef>),
  Set(Box<TypeRef>),
  Function(Box<Signature>),
}

impl fmt::Display for TypeRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TypeRef::Any => f.write_str("any"),
      TypeRef::Void => f.write_str("void"),
      TypeRef::This => f.write_str("this"),
      TypeRef::Item => f.write_str("T"),
      TypeRef::Key => f.write_str("K"),
      TypeRef::Named(name) => f.write_str(name),
      TypeRef::Nullable(inner) => write!(f, "{inner}?"),
      TypeRef::Array(item) => write!(f, "Array<{item}>"),
      TypeRef::Promise(item) => write!(f, "Promise<{item}>"),
      TypeRef::Map(key, item) => write!(f, "Map<{key},{item}>"),
      TypeRef::Set(item) => write!(f, "Set<{item}>"),
      TypeRef::Function(sig) => f.write_str(&sig.describe()),
    }
  }
}

fn expect_interface(stack: &dyn Stack, name: &str, loc: Loc) -> ValueResult<Interface> {
  stack
    .lookup_interface(name)
    .ok_or_else(|| ValueError::structural(loc, format!("unknown type {name}")))
}

/// Non-literal instance whose static type is `iface`.
pub(crate) fn instance_of_interface(iface: &Interface, loc: Loc) -> ValueResult<Value> {
  let generated = generate_instance(&iface.instance_proto(), loc);
  match iface {
    Interface::Class(_) => Ok(generated),
    Interface::Contract(_) => generated.change_instance_interface(iface, false, loc),
  }
}

fn check_against_interface(iface: &Interface, value: &Value, loc: Loc) -> ValueResult<()> {
  match value.unwrap() {
    Value::Instance(instance) => iface.check(&instance.outer(), loc),
    Value::Null(null) => match null.outer() {
      Some(outer) => iface.check(outer, loc),
      None => Ok(()),
    },
    Value::Any(_) => Ok(()),
    other => Err(ValueError::structural(
      loc,
      format!("expected {}, got {}", iface.name(), other.type_name()),
    )),
  }
}

fn check_item(item: &TypeRef, shape: Option<Value>, stack: &dyn Stack, loc: Loc) -> ValueResult<()> {
  match shape {
    Some(shape) => item.check(stack, &shape, None, loc),
    None => Ok(()),
  }
}

impl TypeRef {
  pub fn named(name: impl Into<String>) -> TypeRef {
    TypeRef::Named(name.into())
  }

  pub fn nullable(inner: TypeRef) -> TypeRef {
    TypeRef::Nullable(Box::new(inner))
  }

  pub fn array(item: TypeRef) -> TypeRef {
    TypeRef::Array(Box::new(item))
  }

  pub fn promise(item: TypeRef) -> TypeRef {
    TypeRef::Promise(Box::new(item))
  }

  pub fn set(item: TypeRef) -> TypeRef {
    TypeRef::Set(Box::new(item))
  }

  pub fn map(key: TypeRef, item: TypeRef) -> TypeRef {
    TypeRef::Map(Box::new(key), Box::new(item))
  }

  pub fn function(sig: Signature) -> TypeRef {
    TypeRef::Function(Box::new(sig))
  }

  /// An abstract value standing in for "some value of this type".
  pub fn instantiate(
    &self,
    stack: &dyn Stack,
    this: Option<&Value>,
    loc: Loc,
  ) -> ValueResult<Value> {
    let registry = stack.registry();
    Ok(match self {
      TypeRef::Any => Value::Any(loc),
      TypeRef::Void => Value::Void(loc),
      TypeRef::This => match this {
        Some(this) => this.clone(),
        None => {
          return Err(ValueError::internal(
            loc,
            "`this` type instantiated without a receiver",
          ))
        }
      },
      TypeRef::Item => this
        .and_then(|t| t.item_shape())
        .unwrap_or(Value::Any(loc)),
      TypeRef::Key => this.and_then(|t| t.key_shape()).unwrap_or(Value::Any(loc)),
      TypeRef::Named(name) => instance_of_interface(&expect_interface(stack, name, loc)?, loc)?,
      TypeRef::Nullable(inner) => {
        let value = inner.instantiate(stack, this, loc)?;
        let null = match &**inner {
          TypeRef::Named(name) => {
            let iface = expect_interface(stack, name, loc)?;
            Null::typed(iface, loc)
          }
          _ => Null::all(loc),
        };
        value.join(&Value::Null(null))
      }
      TypeRef::Array(item) => {
        let item = item.instantiate(stack, this, loc)?;
        builtins::new_array(registry, None, Some(item), loc)?
      }
      TypeRef::Promise(item) => {
        let item = item.instantiate(stack, this, loc)?;
        builtins::new_promise(registry, Some(item), loc)?
      }
      TypeRef::Map(key, item) => {
        let key = key.instantiate(stack, this, loc)?;
        let item = item.instantiate(stack, this, loc)?;
        builtins::new_map(registry, None, Some(key), Some(item), loc)?
      }
      TypeRef::Set(item) => {
        let item = item.instantiate(stack, this, loc)?;
        builtins::new_set(registry, None, Some(item), loc)?
      }
      TypeRef::Function(sig) => {
        Value::Function(Function::native("", vec![(**sig).clone()], None, loc))
      }
    })
  }

  /// Verify `value` satisfies this declared type.
  pub fn check(
    &self,
    stack: &dyn Stack,
    value: &Value,
    this: Option<&Value>,
    loc: Loc,
  ) -> ValueResult<()> {
    match value.unwrap() {
      Value::Any(_) => return Ok(()),
      Value::Multi(multi) => {
        for branch in multi.values() {
          self.check(stack, branch, this, loc)?;
        }
        return Ok(());
      }
      _ => {}
    }
    match self {
      TypeRef::Any => Ok(()),
      TypeRef::Void => match value.unwrap() {
        Value::Void(_) => Ok(()),
        other => Err(ValueError::structural(
          loc,
          format!("expected void, got {}", other.type_name()),
        )),
      },
      TypeRef::This => match this.and_then(|t| t.interface()) {
        Some(iface) => check_against_interface(&iface, value, loc),
        None => Ok(()),
      },
      TypeRef::Item => match this.and_then(|t| t.item_shape()).and_then(|s| s.interface()) {
        Some(iface) => check_against_interface(&iface, value, loc),
        None => Ok(()),
      },
      TypeRef::Key => match this.and_then(|t| t.key_shape()).and_then(|s| s.interface()) {
        Some(iface) => check_against_interface(&iface, value, loc),
        None => Ok(()),
      },
      TypeRef::Nullable(inner) => match value.unwrap() {
        Value::Null(_) => Ok(()),
        _ => inner.check(stack, value, this, loc),
      },
      TypeRef::Named(name) => {
        check_against_interface(&expect_interface(stack, name, loc)?, value, loc)
      }
      TypeRef::Array(item) => {
        check_against_interface(&expect_interface(stack, names::ARRAY, loc)?, value, loc)?;
        check_item(item, value.item_shape(), stack, loc)
      }
      TypeRef::Promise(item) => {
        check_against_interface(&expect_interface(stack, names::PROMISE, loc)?, value, loc)?;
        check_item(item, value.item_shape(), stack, loc)
      }
      TypeRef::Set(item) => {
        check_against_interface(&expect_interface(stack, names::SET, loc)?, value, loc)?;
        check_item(item, value.item_shape(), stack, loc)
      }
      TypeRef::Map(key, item) => {
        check_against_interface(&expect_interface(stack, names::MAP, loc)?, value, loc)?;
        check_item(key, value.key_shape(), stack, loc)?;
        check_item(item, value.item_shape(), stack, loc)
      }
      TypeRef::Function(sig) => match value.unwrap() {
        Value::Function(func) => func.check_compatible(sig, loc),
        other => Err(ValueError::structural(
          loc,
          format!("expected function, got {}", other.type_name()),
        )),
      },
    }
  }
}
