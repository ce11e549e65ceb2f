//! Per-instance mutable state.
//!
//! A [`Properties`] is owned by exactly one [`crate::value::Instance`] at a
//! time. Values are otherwise immutable, so this is the one place where the
//! engine observes mutation: assignments to fields, `push` on an array,
//! resolver calls on a promise. Duplicating an instance across independent
//! branches goes through [`Properties::copy`] and a [`CopyCache`].

pub mod payload;

pub use payload::DictPayload;
pub use payload::EventTargetPayload;
pub use payload::ListPayload;
pub use payload::MapPayload;
pub use payload::Payload;
pub use payload::PromisePayload;
pub use payload::RequestPayload;

use crate::error::ValueError;
use crate::error::ValueResult;
use crate::loc::Loc;
use crate::stack::within_frames;
use crate::stack::FrameId;
use crate::stack::Stack;
use crate::value::CopyCache;
use crate::value::MergeState;
use crate::value::Value;
use ahash::HashSet;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

struct PropertiesData {
  items: BTreeMap<String, Value>,
  locked: bool,
  /// Frames (and their descendants) allowed to add keys while locked.
  unlocked_for: Vec<FrameId>,
  payload: Payload,
}

#[derive(Clone)]
pub struct Properties(Rc<RefCell<PropertiesData>>);

impl fmt::Debug for Properties {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    // Property graphs may be cyclic; print the shape only.
    let data = self.0.borrow();
    f.debug_struct("Properties")
      .field("keys", &data.items.keys().collect::<Vec<_>>())
      .field("locked", &data.locked)
      .field("payload", &data.payload.kind())
      .finish()
  }
}

fn is_replaceable(value: &Value) -> bool {
  matches!(value.unwrap(), Value::Null(_) | Value::Void(_) | Value::Any(_))
}

impl Properties {
  pub fn new(payload: Payload) -> Properties {
    Properties(Rc::new(RefCell::new(PropertiesData {
      items: BTreeMap::new(),
      locked: false,
      unlocked_for: Vec::new(),
      payload,
    })))
  }

  /// Identity of the underlying storage, stable while any clone is alive.
  pub fn id(&self) -> usize {
    Rc::as_ptr(&self.0) as *const () as usize
  }

  pub fn ptr_eq(&self, other: &Properties) -> bool {
    Rc::ptr_eq(&self.0, &other.0)
  }

  pub fn get_property(&self, key: &str) -> Option<Value> {
    self.0.borrow().items.get(key).cloned()
  }

  pub fn has_property(&self, key: &str) -> bool {
    self.0.borrow().items.contains_key(key)
  }

  pub fn keys(&self) -> Vec<String> {
    self.0.borrow().items.keys().cloned().collect()
  }

  pub fn items(&self) -> Vec<(String, Value)> {
    self
      .0
      .borrow()
      .items
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect()
  }

  pub fn len(&self) -> usize {
    self.0.borrow().items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.borrow().items.is_empty()
  }

  pub fn payload(&self) -> Payload {
    self.0.borrow().payload.clone()
  }

  pub fn payload_kind(&self) -> crate::types::PayloadKind {
    self.0.borrow().payload.kind()
  }

  pub fn with_payload<R>(&self, f: impl FnOnce(&Payload) -> R) -> R {
    f(&self.0.borrow().payload)
  }

  /// Replace the payload. Callers compute the new payload from a snapshot so
  /// no borrow is held while nested values are merged.
  pub fn set_payload(&self, payload: Payload) {
    self.0.borrow_mut().payload = payload;
  }

  /// Dynamic key update. A new key on a locked object is only accepted from
  /// an exempted frame. An existing key keeps its kind: a function-valued
  /// key cannot become a non-function, nor an instance-valued key a
  /// non-instance. A different value for an existing key is joined with the
  /// previous one rather than overwriting it.
  pub fn set_property(
    &self,
    stack: &dyn Stack,
    key: &str,
    value: Value,
    loc: Loc,
  ) -> ValueResult<()> {
    let allow_new = !self.is_locked(stack);
    self.store(key, value, allow_new, loc)
  }

  /// Like [`Properties::set_property`] for keys that are part of the declared
  /// shape (class fields), which may be added regardless of the lock.
  pub(crate) fn set_declared(&self, key: &str, value: Value, loc: Loc) -> ValueResult<()> {
    self.store(key, value, true, loc)
  }

  fn store(&self, key: &str, value: Value, allow_new: bool, loc: Loc) -> ValueResult<()> {
    let next = match self.get_property(key) {
      None if !allow_new => {
        return Err(ValueError::structural(
          loc,
          format!("cannot add property {key} to a locked object"),
        ));
      }
      None => value,
      Some(prev) => {
        if prev.is_function_like() && !value.is_function_like() && !is_replaceable(&value) {
          return Err(ValueError::structural(
            loc,
            format!(
              "property {key} holds a function and cannot be replaced by {}",
              value.type_name()
            ),
          ));
        }
        if prev.is_instance_like() && !value.is_instance_like() && !is_replaceable(&value) {
          return Err(ValueError::structural(
            loc,
            format!(
              "property {key} holds an instance of {} and cannot be replaced by {}",
              prev.type_name(),
              value.type_name()
            ),
          ));
        }
        if prev.same(&value) {
          return Ok(());
        }
        prev.join(&value)
      }
    };
    self.0.borrow_mut().items.insert(key.to_string(), next);
    Ok(())
  }

  pub fn lock(&self) {
    self.0.borrow_mut().locked = true;
  }

  pub fn unlock(&self) {
    let mut data = self.0.borrow_mut();
    data.locked = false;
    data.unlocked_for.clear();
  }

  /// Let `stack` (and frames nested in it) add keys while locked.
  pub fn unlock_for_stack(&self, stack: &dyn Stack) {
    let frame = stack.frame_id();
    let mut data = self.0.borrow_mut();
    if !data.unlocked_for.contains(&frame) {
      data.unlocked_for.push(frame);
    }
  }

  pub fn is_exempt(&self, stack: &dyn Stack) -> bool {
    let frames = self.0.borrow().unlocked_for.clone();
    !frames.is_empty() && within_frames(stack, &frames)
  }

  pub fn is_locked(&self, stack: &dyn Stack) -> bool {
    self.0.borrow().locked && !self.is_exempt(stack)
  }

  fn snapshot(&self) -> (BTreeMap<String, Value>, Payload, bool, Vec<FrameId>) {
    let data = self.0.borrow();
    (
      data.items.clone(),
      data.payload.clone(),
      data.locked,
      data.unlocked_for.clone(),
    )
  }

  /// Key sets must match exactly and every key must merge. The result is a
  /// new `Properties`; neither side is modified.
  pub(crate) fn merge_in(&self, other: &Properties, state: &mut MergeState) -> Option<Properties> {
    if self.ptr_eq(other) {
      return Some(self.clone());
    }
    let (a_items, a_payload, a_locked, a_frames) = self.snapshot();
    let (b_items, b_payload, b_locked, b_frames) = other.snapshot();
    if !a_items.keys().eq(b_items.keys()) {
      return None;
    }
    let payload = a_payload.merge_in(&b_payload, state)?;
    let mut items = BTreeMap::new();
    for ((key, a), b) in a_items.iter().zip(b_items.values()) {
      items.insert(key.clone(), a.merge_in(b, state)?);
    }
    let mut unlocked_for = a_frames;
    for frame in b_frames {
      if !unlocked_for.contains(&frame) {
        unlocked_for.push(frame);
      }
    }
    Some(Properties(Rc::new(RefCell::new(PropertiesData {
      items,
      locked: a_locked || b_locked,
      unlocked_for,
      payload,
    }))))
  }

  /// Deep copy. The copy is registered in `cache` before its children are
  /// visited, so cycles and shared sub-objects map onto one copy.
  pub fn copy(&self, cache: &mut CopyCache) -> Properties {
    if let Some(done) = cache.get(self) {
      return done;
    }
    let fresh = Properties::new(Payload::Plain);
    cache.insert(self, fresh.clone());
    let (items, payload, locked, unlocked_for) = self.snapshot();
    let items = items
      .into_iter()
      .map(|(k, v)| (k, v.copy(cache)))
      .collect();
    let payload = payload.copy(cache);
    *fresh.0.borrow_mut() = PropertiesData {
      items,
      locked,
      unlocked_for,
      payload,
    };
    fresh
  }

  /// Clear literal flags of the payload and of every nested value, in place.
  pub(crate) fn decay(&self, all: bool, visited: &mut HashSet<usize>) {
    if !visited.insert(self.id()) {
      return;
    }
    let (items, payload, _, _) = self.snapshot();
    let items = items
      .into_iter()
      .map(|(k, v)| (k, v.remove_literalness_in(all, visited)))
      .collect();
    let payload = payload.decay(all, visited);
    let mut data = self.0.borrow_mut();
    data.items = items;
    data.payload = payload;
  }
}
