//! Flow narrowing by `instanceof` guards.

use super::fold::instance_test;
use crate::error::ValueResult;
use crate::loc::Loc;
use crate::types::has_ancestor;
use crate::types::ProtoRef;
use crate::value::new_multi;
use crate::value::Value;

/// The value on paths where `value instanceof proto` holds. Branches that
/// are already instances are kept, ancestors are downcast, unrelated
/// branches are dropped. If nothing would be left the value is unchanged.
pub fn narrow_to(value: &Value, proto: &ProtoRef, in_place: bool, loc: Loc) -> ValueResult<Value> {
  match value.unwrap() {
    Value::Instance(i) => {
      let inner = i.inner();
      if !has_ancestor(&inner, proto.name()) && has_ancestor(proto, inner.name()) {
        return value.change_instance_prototype(proto, in_place, loc);
      }
      Ok(value.clone())
    }
    Value::Multi(m) => {
      let mut kept = Vec::new();
      for branch in m.values() {
        match instance_test(branch, proto) {
          Some(true) => kept.push(branch.clone()),
          None => kept.push(narrow_to(branch, proto, in_place, loc)?),
          Some(false) => {}
        }
      }
      if kept.is_empty() {
        return Ok(value.clone());
      }
      new_multi(kept, m.loc())
    }
    Value::Any(_) => value.change_instance_prototype(proto, in_place, loc),
    _ => Ok(value.clone()),
  }
}

/// The value on paths where `value instanceof proto` does not hold.
pub fn narrow_away(value: &Value, proto: &ProtoRef) -> ValueResult<Value> {
  match value.unwrap() {
    Value::Multi(m) => {
      let kept: Vec<_> = m
        .values()
        .iter()
        .filter(|b| instance_test(b, proto) != Some(true))
        .cloned()
        .collect();
      if kept.is_empty() {
        return Ok(value.clone());
      }
      new_multi(kept, m.loc())
    }
    _ => Ok(value.clone()),
  }
}
