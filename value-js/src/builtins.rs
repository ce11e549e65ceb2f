//! Core prototypes and literal construction.
//!
//! The full runtime library is supplied by the embedding compiler. What lives
//! here is the part the engine cannot work without: the prototypes literals
//! and aggregates are instances of, and the handful of native methods whose
//! effect on their receiver must be modelled (pushing into an array, resolving
//! a promise) rather than read off a signature.

use crate::error::ValueResult;
use crate::loc::Loc;
use crate::props::DictPayload;
use crate::props::ListPayload;
use crate::props::MapPayload;
use crate::props::Payload;
use crate::props::PromisePayload;
use crate::props::Properties;
use crate::registry::Registry;
use crate::stack::StackRef;
use crate::types::ClassBuilder;
use crate::types::ConstLit;
use crate::types::Param;
use crate::types::PayloadKind;
use crate::types::ProtoRef;
use crate::types::Signature;
use crate::types::TypeRef;
use crate::value::Function;
use crate::value::Instance;
use crate::value::Value;
use std::collections::BTreeMap;

pub mod names {
  pub const OBJECT: &str = "Object";
  pub const BOOLEAN: &str = "Boolean";
  pub const INT: &str = "Int";
  pub const NUMBER: &str = "Number";
  pub const STRING: &str = "String";
  pub const ARRAY: &str = "Array";
  pub const MAP: &str = "Map";
  pub const SET: &str = "Set";
  pub const PROMISE: &str = "Promise";
  pub const EVENT_TARGET: &str = "EventTarget";
  pub const REQUEST: &str = "Request";
}

fn sig(params: Vec<Param>, ret: TypeRef) -> Signature {
  Signature::new(params, ret)
}

fn req(name: &str, ty: TypeRef) -> Param {
  Param::required(name, ty)
}

fn opt(name: &str, ty: TypeRef) -> Param {
  Param::optional(name, ty)
}

fn named(name: &str) -> TypeRef {
  TypeRef::named(name)
}

/// `(item: T, index?: Int) => any`
fn item_callback() -> TypeRef {
  TypeRef::function(sig(
    vec![req("item", TypeRef::Item), opt("index", named(names::INT))],
    TypeRef::Any,
  ))
}

fn value_callback() -> TypeRef {
  TypeRef::function(sig(vec![opt("value", TypeRef::Any)], TypeRef::Any))
}

pub(crate) fn install_core(registry: &mut Registry) {
  let object = ClassBuilder::new(names::OBJECT)
    .universal(true)
    .payload(PayloadKind::Object)
    .build();

  let boolean = ClassBuilder::new(names::BOOLEAN)
    .universal(true)
    .payload(PayloadKind::Bool)
    .method("toString", sig(vec![], named(names::STRING)))
    .build();

  let number = ClassBuilder::new(names::NUMBER)
    .universal(true)
    .payload(PayloadKind::Number)
    .method("toString", sig(vec![], named(names::STRING)))
    .method(
      "toFixed",
      sig(vec![opt("digits", named(names::INT))], named(names::STRING)),
    )
    .build();

  let int = ClassBuilder::new(names::INT)
    .extends(number.clone())
    .universal(true)
    .payload(PayloadKind::Int)
    .build();

  let string = ClassBuilder::new(names::STRING)
    .universal(true)
    .payload(PayloadKind::String)
    .getter("length", named(names::INT))
    .method("toUpperCase", sig(vec![], named(names::STRING)))
    .method("toLowerCase", sig(vec![], named(names::STRING)))
    .method("trim", sig(vec![], named(names::STRING)))
    .method(
      "indexOf",
      sig(vec![req("search", named(names::STRING))], named(names::INT)),
    )
    .method(
      "includes",
      sig(vec![req("search", named(names::STRING))], named(names::BOOLEAN)),
    )
    .method(
      "startsWith",
      sig(vec![req("search", named(names::STRING))], named(names::BOOLEAN)),
    )
    .method(
      "slice",
      sig(
        vec![req("start", named(names::INT)), opt("end", named(names::INT))],
        named(names::STRING),
      ),
    )
    .method(
      "split",
      sig(
        vec![req("separator", named(names::STRING))],
        TypeRef::array(named(names::STRING)),
      ),
    )
    .build();

  let array = ClassBuilder::new(names::ARRAY)
    .universal(true)
    .payload(PayloadKind::Array)
    .getter("length", named(names::INT))
    .method(
      "push",
      sig(vec![Param::rest("items", TypeRef::Item)], named(names::INT)),
    )
    .method("pop", sig(vec![], TypeRef::nullable(TypeRef::Item)))
    .method(
      "indexOf",
      sig(vec![req("item", TypeRef::Item)], named(names::INT)),
    )
    .method(
      "includes",
      sig(vec![req("item", TypeRef::Item)], named(names::BOOLEAN)),
    )
    .method(
      "join",
      sig(vec![opt("separator", named(names::STRING))], named(names::STRING)),
    )
    .method(
      "slice",
      sig(
        vec![opt("start", named(names::INT)), opt("end", named(names::INT))],
        TypeRef::array(TypeRef::Item),
      ),
    )
    .method(
      "forEach",
      sig(vec![req("callback", item_callback())], TypeRef::Void),
    )
    .method(
      "map",
      sig(
        vec![req("callback", item_callback())],
        TypeRef::array(TypeRef::Any),
      ),
    )
    .method(
      "filter",
      sig(
        vec![req("callback", item_callback())],
        TypeRef::array(TypeRef::Item),
      ),
    )
    .build();

  let map = ClassBuilder::new(names::MAP)
    .universal(true)
    .payload(PayloadKind::Map)
    .getter("size", named(names::INT))
    .method(
      "get",
      sig(vec![req("key", TypeRef::Key)], TypeRef::nullable(TypeRef::Item)),
    )
    .method(
      "set",
      sig(
        vec![req("key", TypeRef::Key), req("value", TypeRef::Item)],
        TypeRef::This,
      ),
    )
    .method(
      "has",
      sig(vec![req("key", TypeRef::Key)], named(names::BOOLEAN)),
    )
    .method(
      "delete",
      sig(vec![req("key", TypeRef::Key)], named(names::BOOLEAN)),
    )
    .build();

  let set = ClassBuilder::new(names::SET)
    .universal(true)
    .payload(PayloadKind::Set)
    .getter("size", named(names::INT))
    .method("add", sig(vec![req("item", TypeRef::Item)], TypeRef::This))
    .method(
      "has",
      sig(vec![req("item", TypeRef::Item)], named(names::BOOLEAN)),
    )
    .build();

  let resolver = TypeRef::function(sig(vec![opt("value", TypeRef::Any)], TypeRef::Void));
  let promise = ClassBuilder::new(names::PROMISE)
    .payload(PayloadKind::Promise)
    .constructor(sig(
      vec![req(
        "executor",
        TypeRef::function(sig(
          vec![req("resolve", resolver.clone()), req("reject", resolver)],
          TypeRef::Void,
        )),
      )],
      TypeRef::Void,
    ))
    .method(
      "then",
      sig(
        vec![req("onResolved", value_callback())],
        TypeRef::promise(TypeRef::Any),
      ),
    )
    .method(
      "catch",
      sig(
        vec![req("onRejected", value_callback())],
        TypeRef::promise(TypeRef::Any),
      ),
    )
    .build();

  let event_target = ClassBuilder::new(names::EVENT_TARGET)
    .payload(PayloadKind::EventTarget)
    .method(
      "addEventListener",
      sig(
        vec![
          req("event", named(names::STRING)),
          req("listener", value_callback()),
        ],
        TypeRef::Void,
      ),
    )
    .build();

  let request = ClassBuilder::new(names::REQUEST)
    .payload(PayloadKind::Request)
    .constructor(sig(vec![req("url", named(names::STRING))], TypeRef::Void))
    .getter("status", named(names::INT))
    .method("text", sig(vec![], TypeRef::promise(named(names::STRING))))
    .method("json", sig(vec![], TypeRef::promise(TypeRef::Any)))
    .build();

  for proto in [
    object,
    boolean,
    number,
    int,
    string,
    array,
    map,
    set,
    promise,
    event_target,
    request,
  ] {
    registry.register(proto);
  }
}

/// Instance of a core prototype holding `payload`. Everything but plain
/// objects starts out locked.
fn core_instance(registry: &Registry, name: &str, payload: Payload, loc: Loc) -> ValueResult<Value> {
  let proto = registry.core(name)?;
  Ok(instance_with(proto, payload, loc))
}

fn instance_with(proto: ProtoRef, payload: Payload, loc: Loc) -> Value {
  let locked = !matches!(payload, Payload::Object(_));
  let props = Properties::new(payload);
  if locked {
    props.lock();
  }
  Value::Instance(Instance::of(proto, props, loc))
}

pub fn new_bool(registry: &Registry, value: Option<bool>, loc: Loc) -> ValueResult<Value> {
  core_instance(registry, names::BOOLEAN, Payload::Bool(value), loc)
}

pub fn new_int(registry: &Registry, value: Option<i64>, loc: Loc) -> ValueResult<Value> {
  core_instance(registry, names::INT, Payload::Int(value), loc)
}

pub fn new_number(registry: &Registry, value: Option<f64>, loc: Loc) -> ValueResult<Value> {
  core_instance(registry, names::NUMBER, Payload::Number(value), loc)
}

pub fn new_string(registry: &Registry, value: Option<String>, loc: Loc) -> ValueResult<Value> {
  core_instance(registry, names::STRING, Payload::String(value), loc)
}

/// Array with exact `items` when known, otherwise only an element shape.
pub fn new_array(
  registry: &Registry,
  items: Option<Vec<Value>>,
  item: Option<Value>,
  loc: Loc,
) -> ValueResult<Value> {
  let mut list = match items {
    Some(items) => ListPayload::literal(items),
    None => ListPayload::of(None),
  };
  if list.item.is_none() {
    list.item = item;
  }
  core_instance(registry, names::ARRAY, Payload::Array(list), loc)
}

/// Object literal. Entries become own properties, readable by member access
/// and by string index.
pub fn new_object(registry: &Registry, entries: Vec<(String, Value)>, loc: Loc) -> ValueResult<Value> {
  let items: BTreeMap<String, Value> = entries.into_iter().collect();
  let item = items
    .values()
    .cloned()
    .reduce(|acc, v| acc.join(&v));
  let value = core_instance(
    registry,
    names::OBJECT,
    Payload::Object(DictPayload {
      items: Some(items.clone()),
      item,
    }),
    loc,
  )?;
  if let Value::Instance(instance) = &value {
    for (key, v) in items {
      instance.props().set_declared(&key, v, loc)?;
    }
  }
  Ok(value)
}

pub fn new_map(
  registry: &Registry,
  pairs: Option<Vec<(Value, Value)>>,
  key: Option<Value>,
  item: Option<Value>,
  loc: Loc,
) -> ValueResult<Value> {
  let mut map = match pairs {
    Some(pairs) => MapPayload::literal(pairs),
    None => MapPayload::default(),
  };
  if map.key.is_none() {
    map.key = key;
  }
  if map.item.is_none() {
    map.item = item;
  }
  core_instance(registry, names::MAP, Payload::Map(map), loc)
}

pub fn new_set(
  registry: &Registry,
  items: Option<Vec<Value>>,
  item: Option<Value>,
  loc: Loc,
) -> ValueResult<Value> {
  let mut list = match items {
    Some(items) => ListPayload::literal(items),
    None => ListPayload::of(None),
  };
  if list.item.is_none() {
    list.item = item;
  }
  core_instance(registry, names::SET, Payload::Set(list), loc)
}

/// Promise whose content is only known by its declared shape.
pub fn new_promise(registry: &Registry, item: Option<Value>, loc: Loc) -> ValueResult<Value> {
  core_instance(
    registry,
    names::PROMISE,
    Payload::Promise(PromisePayload {
      item,
      resolved: None,
      rejected: None,
    }),
    loc,
  )
}

pub fn const_value(registry: &Registry, lit: &ConstLit, loc: Loc) -> ValueResult<Value> {
  match lit {
    ConstLit::Bool(v) => new_bool(registry, Some(*v), loc),
    ConstLit::Int(v) => new_int(registry, Some(*v), loc),
    ConstLit::Number(v) => new_number(registry, Some(*v), loc),
    ConstLit::String(v) => new_string(registry, Some(v.clone()), loc),
  }
}

/// Getters whose result follows from a literal payload.
pub fn fold_getter(
  registry: &Registry,
  instance: &Instance,
  key: &str,
  loc: Loc,
) -> ValueResult<Option<Value>> {
  let count = match (key, instance.props().payload()) {
    ("length", Payload::String(Some(s))) => Some(s.chars().count()),
    ("length", Payload::Array(list)) => list.items.map(|items| items.len()),
    ("size", Payload::Set(list)) => list.items.map(|items| items.len()),
    ("size", Payload::Map(map)) => map.pairs.map(|pairs| pairs.len()),
    ("status", Payload::Request(req)) => {
      return match req.status {
        Some(status) => new_int(registry, Some(status), loc).map(Some),
        None => Ok(None),
      };
    }
    _ => None,
  };
  match count.and_then(|n| i64::try_from(n).ok()) {
    Some(n) => new_int(registry, Some(n), loc).map(Some),
    None => Ok(None),
  }
}

/// Arguments for a callback, truncated to what it declares so closures with
/// fewer parameters are not rejected for arity.
fn callback_args(callback: &Value, mut args: Vec<Value>) -> Vec<Value> {
  if let Value::Function(f) = callback.unwrap() {
    if let Some(count) = f.param_count() {
      args.truncate(count);
    }
  }
  args
}

/// Model the effect of a native method on its receiver. `None` means the
/// method has no modelled effect and its declared return type applies.
pub fn native_effect(
  stack: &StackRef,
  name: &str,
  this: Option<&Value>,
  args: &[Value],
  loc: Loc,
) -> ValueResult<Option<Value>> {
  let Some(Value::Instance(instance)) = this.map(|t| t.unwrap()) else {
    return Ok(None);
  };
  let registry = stack.registry();
  let props = instance.props();
  let receiver = Value::Instance(instance.clone());
  match (props.payload(), name) {
    (Payload::String(Some(s)), "toUpperCase") => new_string(registry, Some(s.to_uppercase()), loc).map(Some),
    (Payload::String(Some(s)), "toLowerCase") => new_string(registry, Some(s.to_lowercase()), loc).map(Some),
    (Payload::String(Some(s)), "trim") => new_string(registry, Some(s.trim().to_string()), loc).map(Some),
    (Payload::Array(mut list), "push") => {
      for arg in args {
        list.absorb(&arg.remove_literalness(true));
      }
      props.set_payload(Payload::Array(list));
      new_int(registry, None, loc).map(Some)
    }
    (Payload::Array(mut list), "pop") => {
      list.items = None;
      props.set_payload(Payload::Array(list));
      Ok(None)
    }
    (Payload::Array(list), "forEach" | "map" | "filter") => {
      let Some(callback) = args.first() else {
        return Ok(None);
      };
      let item = list.item.clone().unwrap_or(Value::Any(loc));
      let index = new_int(registry, None, loc)?;
      let result = callback.eval_function(stack, &callback_args(callback, vec![item, index]), loc)?;
      match name {
        "forEach" => Ok(Some(Value::Void(loc))),
        "map" => new_array(registry, None, Some(result.remove_literalness(true)), loc).map(Some),
        _ => new_array(registry, None, list.item, loc).map(Some),
      }
    }
    (Payload::Map(mut map), "set") => {
      if let [key, value] = args {
        map.absorb(&key.remove_literalness(true), &value.remove_literalness(true));
        props.set_payload(Payload::Map(map));
      }
      Ok(Some(receiver))
    }
    (Payload::Map(mut map), "delete") => {
      map.pairs = None;
      props.set_payload(Payload::Map(map));
      Ok(None)
    }
    (Payload::Set(mut list), "add") => {
      for arg in args {
        list.absorb(&arg.remove_literalness(true));
      }
      props.set_payload(Payload::Set(list));
      Ok(Some(receiver))
    }
    (Payload::Promise(promise), "then" | "catch") => {
      let Some(callback) = args.first() else {
        return Ok(None);
      };
      let settled = if name == "then" {
        promise.resolved.clone().or(promise.item.clone())
      } else {
        promise.rejected.clone()
      };
      let input = settled.unwrap_or(Value::Any(loc)).remove_literalness(false);
      let result = callback
        .eval_function(stack, &callback_args(callback, vec![input]), loc)?
        .resolve_await(loc)?;
      let content = match (name, promise.resolved.or(promise.item)) {
        ("catch", Some(resolved)) => resolved.join(&result),
        _ => result,
      };
      new_promise(registry, Some(content), loc).map(Some)
    }
    (Payload::EventTarget(mut target), "addEventListener") => {
      let [event, listener] = args else {
        return Ok(None);
      };
      let event = event.literal_string().unwrap_or_else(|| "*".to_string());
      let joined = match target.listeners.get(&event) {
        Some(existing) => existing.join(listener),
        None => listener.clone(),
      };
      target.listeners.insert(event, joined);
      props.set_payload(Payload::EventTarget(target));
      // Listener bodies are checked as if the event fired once.
      listener.eval_function(stack, &callback_args(listener, vec![Value::Any(loc)]), loc)?;
      Ok(Some(Value::Void(loc)))
    }
    _ => Ok(None),
  }
}

/// Construction of core prototypes (and classes inheriting their payload)
/// that need more than a generated instance. `None` falls back to generic
/// construction.
/// Native construction. A `reuse`d instance from an earlier evaluation of the
/// same `new` site is returned as is, except that a promise executor runs
/// again so its resolutions join the cached promise.
pub fn construct_native(
  stack: &StackRef,
  proto: &ProtoRef,
  args: &[Value],
  reuse: Option<Value>,
  loc: Loc,
) -> ValueResult<Option<Value>> {
  if proto.payload_kind() == PayloadKind::Promise {
    let value =
      reuse.unwrap_or_else(|| instance_with(proto.clone(), Payload::unknown(PayloadKind::Promise), loc));
    if let (Value::Instance(instance), Some(executor)) = (value.unwrap(), args.first()) {
      let resolve = Value::Function(Function::resolver(instance.props().clone(), false, loc));
      let reject = Value::Function(Function::resolver(instance.props().clone(), true, loc));
      executor.eval_function(stack, &callback_args(executor, vec![resolve, reject]), loc)?;
    }
    return Ok(Some(value));
  }
  if reuse.is_some() {
    return Ok(reuse);
  }
  let payload = match proto.payload_kind() {
    PayloadKind::Array => Payload::Array(ListPayload::literal(Vec::new())),
    PayloadKind::Set => Payload::Set(ListPayload::literal(Vec::new())),
    PayloadKind::Map => Payload::Map(MapPayload::literal(Vec::new())),
    PayloadKind::Object => Payload::Object(DictPayload {
      items: Some(BTreeMap::new()),
      item: None,
    }),
    PayloadKind::Request => Payload::unknown(PayloadKind::Request),
    PayloadKind::EventTarget => Payload::unknown(PayloadKind::EventTarget),
    PayloadKind::Promise
    | PayloadKind::Plain
    | PayloadKind::Bool
    | PayloadKind::Int
    | PayloadKind::Number
    | PayloadKind::String => return Ok(None),
  };
  Ok(Some(instance_with(proto.clone(), payload, loc)))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn literals_are_locked_core_instances() {
    let registry = Registry::with_core();
    let s = new_string(&registry, Some("hi".into()), Loc(0, 4)).unwrap();
    assert_eq!(s.type_name(), "String");
    assert_eq!(s.literal_string().as_deref(), Some("hi"));
    let Value::Instance(instance) = s.unwrap() else {
      panic!("expected instance");
    };
    assert_eq!(instance.props().payload_kind(), PayloadKind::String);
  }

  #[test]
  fn int_literals_are_numbers() {
    let registry = Registry::with_core();
    let five = new_int(&registry, Some(5), Loc::unknown()).unwrap();
    assert!(five.is_instance_of(&[names::NUMBER]));
    assert_eq!(five.literal_number(), Some(5.0));
  }

  #[test]
  fn object_literal_entries_are_own_properties() {
    let registry = Registry::with_core();
    let one = new_int(&registry, Some(1), Loc::unknown()).unwrap();
    let obj = new_object(&registry, vec![("a".to_string(), one)], Loc::unknown()).unwrap();
    let Value::Instance(instance) = obj.unwrap() else {
      panic!("expected instance");
    };
    assert_eq!(instance.props().keys(), vec!["a".to_string()]);
  }

  #[test]
  fn empty_array_takes_declared_item_shape() {
    let registry = Registry::with_core();
    let item = new_string(&registry, None, Loc::unknown()).unwrap();
    let arr = new_array(&registry, Some(Vec::new()), Some(item), Loc::unknown()).unwrap();
    assert_eq!(arr.item_shape().map(|v| v.type_name()).as_deref(), Some("String"));
    assert_eq!(arr.literal_array().map(|v| v.len()), Some(0));
  }
}
