use super::CallableId;
use crate::loc::Loc;
use crate::value::Value;
use ahash::HashMap;

#[derive(Default)]
struct GuardEntry {
  active: bool,
  /// Join of every return shape computed so far.
  last: Option<Value>,
}

/// Cuts off recursion: a callable that is re-entered while its body is being
/// evaluated answers with its best known return shape instead of recursing.
#[derive(Default)]
pub struct RecursionGuard {
  entries: HashMap<CallableId, GuardEntry>,
}

impl RecursionGuard {
  /// `None` if the body may be evaluated; otherwise the shape to use for
  /// this nested invocation (`Any` before any return shape is known).
  pub fn enter(&mut self, id: CallableId, loc: Loc) -> Option<Value> {
    let entry = self.entries.entry(id).or_default();
    if entry.active {
      return Some(entry.last.clone().unwrap_or(Value::Any(loc)));
    }
    entry.active = true;
    None
  }

  pub fn exit(&mut self, id: CallableId, ret: Option<&Value>) {
    let Some(entry) = self.entries.get_mut(&id) else {
      return;
    };
    entry.active = false;
    if let Some(ret) = ret {
      entry.last = Some(match entry.last.take() {
        Some(prev) => prev.join(ret),
        None => ret.clone(),
      });
    }
  }

  pub fn is_active(&self, id: CallableId) -> bool {
    self.entries.get(&id).is_some_and(|e| e.active)
  }

  pub fn last(&self, id: CallableId) -> Option<Value> {
    self.entries.get(&id).and_then(|e| e.last.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reentry_short_circuits_until_exit() {
    let mut guard = RecursionGuard::default();
    let f = CallableId(7);
    assert!(guard.enter(f, Loc::unknown()).is_none());
    assert!(guard.is_active(f));
    match guard.enter(f, Loc::unknown()) {
      Some(Value::Any(_)) => {}
      other => panic!("unexpected {other:?}"),
    }
    guard.exit(f, Some(&Value::Void(Loc::unknown())));
    assert!(!guard.is_active(f));
    assert!(guard.enter(f, Loc::unknown()).is_none());
    match guard.enter(f, Loc::unknown()) {
      Some(Value::Void(_)) => {}
      other => panic!("unexpected {other:?}"),
    }
  }
}
