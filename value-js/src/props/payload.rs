use crate::types::PayloadKind;
use crate::value::join_in;
use crate::value::CopyCache;
use crate::value::MergeState;
use crate::value::Value;
use ahash::HashSet;
use std::collections::BTreeMap;

/// Ordered (`Array`) or unordered (`Set`) collection. `items` is `Some` only
/// while the exact contents are statically known; `item` is the joined
/// element shape, `None` meaning nothing is known about it.
#[derive(Clone, Debug, Default)]
pub struct ListPayload {
  pub items: Option<Vec<Value>>,
  pub item: Option<Value>,
}

#[derive(Clone, Debug, Default)]
pub struct DictPayload {
  pub items: Option<BTreeMap<String, Value>>,
  pub item: Option<Value>,
}

#[derive(Clone, Debug, Default)]
pub struct MapPayload {
  pub pairs: Option<Vec<(Value, Value)>>,
  pub key: Option<Value>,
  pub item: Option<Value>,
}

/// Promise-like resolution state. `resolved`/`rejected` accumulate every
/// value passed to the resolver functions; `item` is the declared content.
#[derive(Clone, Debug, Default)]
pub struct PromisePayload {
  pub item: Option<Value>,
  pub resolved: Option<Value>,
  pub rejected: Option<Value>,
}

#[derive(Clone, Debug, Default)]
pub struct EventTargetPayload {
  pub listeners: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default)]
pub struct RequestPayload {
  pub status: Option<i64>,
  pub body: Option<Value>,
}

/// Specialized state carried by instances of the core prototypes. Scalar
/// variants hold `Some(v)` while the value is a statically known literal.
#[derive(Clone, Debug)]
pub enum Payload {
  Plain,
  Bool(Option<bool>),
  Int(Option<i64>),
  Number(Option<f64>),
  String(Option<String>),
  Array(ListPayload),
  Set(ListPayload),
  Object(DictPayload),
  Map(MapPayload),
  Promise(PromisePayload),
  EventTarget(EventTargetPayload),
  Request(RequestPayload),
}

fn join_opt(a: &Option<Value>, b: &Option<Value>, state: &mut MergeState) -> Option<Value> {
  match (a, b) {
    (Some(a), Some(b)) => Some(join_in(a, b, state)),
    (Some(v), None) | (None, Some(v)) => Some(v.clone()),
    (None, None) => None,
  }
}

fn join_all<'a>(values: impl IntoIterator<Item = &'a Value>) -> Option<Value> {
  let mut state = MergeState::default();
  values.into_iter().fold(None, |acc, v| match acc {
    None => Some(v.clone()),
    Some(acc) => Some(join_in(&acc, v, &mut state)),
  })
}

/// One-to-one greedy pairing for unordered collections. Every element on the
/// left must merge with a distinct element on the right.
fn pair_unordered(a: &[Value], b: &[Value], state: &mut MergeState) -> Option<Vec<Value>> {
  if a.len() != b.len() {
    return None;
  }
  let mut used = vec![false; b.len()];
  let mut out = Vec::with_capacity(a.len());
  for x in a {
    let (idx, merged) = b
      .iter()
      .enumerate()
      .filter(|(i, _)| !used[*i])
      .find_map(|(i, y)| x.merge_in(y, state).map(|m| (i, m)))?;
    used[idx] = true;
    out.push(merged);
  }
  Some(out)
}

fn merge_lists(a: &ListPayload, b: &ListPayload, ordered: bool, state: &mut MergeState) -> ListPayload {
  let item = join_opt(&a.item, &b.item, state);
  let items = match (&a.items, &b.items) {
    (Some(x), Some(y)) if ordered && x.len() == y.len() => x
      .iter()
      .zip(y)
      .map(|(x, y)| x.merge_in(y, state))
      .collect::<Option<Vec<_>>>(),
    (Some(x), Some(y)) if !ordered => pair_unordered(x, y, state),
    _ => None,
  };
  ListPayload { items, item }
}

fn merge_dicts(a: &DictPayload, b: &DictPayload, state: &mut MergeState) -> DictPayload {
  let item = join_opt(&a.item, &b.item, state);
  let items = match (&a.items, &b.items) {
    (Some(x), Some(y)) if x.keys().eq(y.keys()) => x
      .iter()
      .zip(y.values())
      .map(|((k, x), y)| x.merge_in(y, state).map(|m| (k.clone(), m)))
      .collect::<Option<BTreeMap<_, _>>>(),
    _ => None,
  };
  DictPayload { items, item }
}

fn merge_maps(a: &MapPayload, b: &MapPayload, state: &mut MergeState) -> MapPayload {
  let key = join_opt(&a.key, &b.key, state);
  let item = join_opt(&a.item, &b.item, state);
  let pairs = match (&a.pairs, &b.pairs) {
    (Some(x), Some(y)) if x.len() == y.len() => {
      let mut used = vec![false; y.len()];
      let mut out = Vec::with_capacity(x.len());
      let mut ok = true;
      for (xk, xv) in x {
        let found = y.iter().enumerate().filter(|(i, _)| !used[*i]).find_map(|(i, (yk, yv))| {
          let k = xk.merge_in(yk, state)?;
          let v = xv.merge_in(yv, state)?;
          Some((i, k, v))
        });
        match found {
          Some((i, k, v)) => {
            used[i] = true;
            out.push((k, v));
          }
          None => {
            ok = false;
            break;
          }
        }
      }
      ok.then_some(out)
    }
    _ => None,
  };
  MapPayload { pairs, key, item }
}

impl ListPayload {
  pub fn literal(items: Vec<Value>) -> Self {
    let item = join_all(&items);
    ListPayload {
      items: Some(items),
      item,
    }
  }

  pub fn of(item: Option<Value>) -> Self {
    ListPayload { items: None, item }
  }

  /// Forget the exact contents and fold `value` into the element shape.
  pub fn absorb(&mut self, value: &Value) {
    self.items = None;
    let mut state = MergeState::default();
    self.item = join_opt(&self.item, &Some(value.clone()), &mut state);
  }
}

impl MapPayload {
  pub fn literal(pairs: Vec<(Value, Value)>) -> Self {
    let key = join_all(pairs.iter().map(|(k, _)| k));
    let item = join_all(pairs.iter().map(|(_, v)| v));
    MapPayload {
      pairs: Some(pairs),
      key,
      item,
    }
  }

  pub fn absorb(&mut self, key: &Value, value: &Value) {
    self.pairs = None;
    let mut state = MergeState::default();
    self.key = join_opt(&self.key, &Some(key.clone()), &mut state);
    self.item = join_opt(&self.item, &Some(value.clone()), &mut state);
  }
}

impl Payload {
  /// Non-literal payload for a freshly generated instance of `kind`.
  pub fn unknown(kind: PayloadKind) -> Payload {
    match kind {
      PayloadKind::Plain => Payload::Plain,
      PayloadKind::Bool => Payload::Bool(None),
      PayloadKind::Int => Payload::Int(None),
      PayloadKind::Number => Payload::Number(None),
      PayloadKind::String => Payload::String(None),
      PayloadKind::Array => Payload::Array(ListPayload::default()),
      PayloadKind::Set => Payload::Set(ListPayload::default()),
      PayloadKind::Object => Payload::Object(DictPayload::default()),
      PayloadKind::Map => Payload::Map(MapPayload::default()),
      PayloadKind::Promise => Payload::Promise(PromisePayload::default()),
      PayloadKind::EventTarget => Payload::EventTarget(EventTargetPayload::default()),
      PayloadKind::Request => Payload::Request(RequestPayload::default()),
    }
  }

  pub fn kind(&self) -> PayloadKind {
    match self {
      Payload::Plain => PayloadKind::Plain,
      Payload::Bool(_) => PayloadKind::Bool,
      Payload::Int(_) => PayloadKind::Int,
      Payload::Number(_) => PayloadKind::Number,
      Payload::String(_) => PayloadKind::String,
      Payload::Array(_) => PayloadKind::Array,
      Payload::Set(_) => PayloadKind::Set,
      Payload::Object(_) => PayloadKind::Object,
      Payload::Map(_) => PayloadKind::Map,
      Payload::Promise(_) => PayloadKind::Promise,
      Payload::EventTarget(_) => PayloadKind::EventTarget,
      Payload::Request(_) => PayloadKind::Request,
    }
  }

  pub fn is_scalar(&self) -> bool {
    matches!(
      self,
      Payload::Bool(_) | Payload::Int(_) | Payload::Number(_) | Payload::String(_)
    )
  }

  pub fn is_literal(&self) -> bool {
    match self {
      Payload::Bool(v) => v.is_some(),
      Payload::Int(v) => v.is_some(),
      Payload::Number(v) => v.is_some(),
      Payload::String(v) => v.is_some(),
      Payload::Array(l) | Payload::Set(l) => l.items.is_some(),
      Payload::Object(d) => d.items.is_some(),
      Payload::Map(m) => m.pairs.is_some(),
      Payload::Plain | Payload::Promise(_) | Payload::EventTarget(_) | Payload::Request(_) => {
        false
      }
    }
  }

  /// Element shape: array/set items, map and object values, promise content.
  pub fn item_shape(&self) -> Option<Value> {
    match self {
      Payload::Array(l) | Payload::Set(l) => l.item.clone(),
      Payload::Object(d) => d.item.clone(),
      Payload::Map(m) => m.item.clone(),
      Payload::Promise(p) => p.resolved.clone().or_else(|| p.item.clone()),
      _ => None,
    }
  }

  pub fn key_shape(&self) -> Option<Value> {
    match self {
      Payload::Map(m) => m.key.clone(),
      _ => None,
    }
  }

  /// Scalar literals merge to themselves when equal and otherwise decay to a
  /// non-literal of the same kind. Aggregates keep their literal contents only
  /// if they can be reconciled element by element. Payloads of different
  /// kinds never merge.
  pub(crate) fn merge_in(&self, other: &Payload, state: &mut MergeState) -> Option<Payload> {
    Some(match (self, other) {
      (Payload::Plain, Payload::Plain) => Payload::Plain,
      (Payload::Bool(a), Payload::Bool(b)) => Payload::Bool(if a == b { *a } else { None }),
      (Payload::Int(a), Payload::Int(b)) => Payload::Int(if a == b { *a } else { None }),
      (Payload::Number(a), Payload::Number(b)) => Payload::Number(match (a, b) {
        (Some(x), Some(y)) if x.to_bits() == y.to_bits() => Some(*x),
        _ => None,
      }),
      (Payload::String(a), Payload::String(b)) => {
        Payload::String(if a == b { a.clone() } else { None })
      }
      (Payload::Array(a), Payload::Array(b)) => Payload::Array(merge_lists(a, b, true, state)),
      (Payload::Set(a), Payload::Set(b)) => Payload::Set(merge_lists(a, b, false, state)),
      (Payload::Object(a), Payload::Object(b)) => Payload::Object(merge_dicts(a, b, state)),
      (Payload::Map(a), Payload::Map(b)) => Payload::Map(merge_maps(a, b, state)),
      (Payload::Promise(a), Payload::Promise(b)) => Payload::Promise(PromisePayload {
        item: join_opt(&a.item, &b.item, state),
        resolved: join_opt(&a.resolved, &b.resolved, state),
        rejected: join_opt(&a.rejected, &b.rejected, state),
      }),
      (Payload::EventTarget(a), Payload::EventTarget(b)) => {
        let mut listeners = a.listeners.clone();
        for (event, handler) in &b.listeners {
          let joined = match listeners.get(event) {
            Some(existing) => join_in(existing, handler, state),
            None => handler.clone(),
          };
          listeners.insert(event.clone(), joined);
        }
        Payload::EventTarget(EventTargetPayload { listeners })
      }
      (Payload::Request(a), Payload::Request(b)) => Payload::Request(RequestPayload {
        status: if a.status == b.status { a.status } else { None },
        body: join_opt(&a.body, &b.body, state),
      }),
      _ => return None,
    })
  }

  pub(crate) fn copy(&self, cache: &mut CopyCache) -> Payload {
    let copy_opt = |v: &Option<Value>, cache: &mut CopyCache| v.as_ref().map(|v| v.copy(cache));
    match self {
      Payload::Array(l) | Payload::Set(l) => {
        let list = ListPayload {
          items: l
            .items
            .as_ref()
            .map(|items| items.iter().map(|v| v.copy(cache)).collect()),
          item: copy_opt(&l.item, cache),
        };
        if matches!(self, Payload::Array(_)) {
          Payload::Array(list)
        } else {
          Payload::Set(list)
        }
      }
      Payload::Object(d) => Payload::Object(DictPayload {
        items: d.items.as_ref().map(|items| {
          items
            .iter()
            .map(|(k, v)| (k.clone(), v.copy(cache)))
            .collect()
        }),
        item: copy_opt(&d.item, cache),
      }),
      Payload::Map(m) => Payload::Map(MapPayload {
        pairs: m.pairs.as_ref().map(|pairs| {
          pairs
            .iter()
            .map(|(k, v)| (k.copy(cache), v.copy(cache)))
            .collect()
        }),
        key: copy_opt(&m.key, cache),
        item: copy_opt(&m.item, cache),
      }),
      Payload::Promise(p) => Payload::Promise(PromisePayload {
        item: copy_opt(&p.item, cache),
        resolved: copy_opt(&p.resolved, cache),
        rejected: copy_opt(&p.rejected, cache),
      }),
      Payload::EventTarget(e) => Payload::EventTarget(EventTargetPayload {
        listeners: e
          .listeners
          .iter()
          .map(|(k, v)| (k.clone(), v.copy(cache)))
          .collect(),
      }),
      Payload::Request(r) => Payload::Request(RequestPayload {
        status: r.status,
        body: copy_opt(&r.body, cache),
      }),
      scalar => scalar.clone(),
    }
  }

  /// Clear literal flags. Shallow decay only touches booleans and numbers;
  /// full decay also clears strings and aggregate contents, folding exact
  /// contents into the element shape, and decays nested values.
  pub(crate) fn decay(&self, all: bool, visited: &mut HashSet<usize>) -> Payload {
    let decay_opt = |v: &Option<Value>, visited: &mut HashSet<usize>| {
      v.as_ref().map(|v| v.remove_literalness_in(true, visited))
    };
    match self {
      Payload::Bool(_) => Payload::Bool(None),
      Payload::Int(_) => Payload::Int(None),
      Payload::Number(_) => Payload::Number(None),
      _ if !all => self.clone(),
      Payload::String(_) => Payload::String(None),
      Payload::Array(l) | Payload::Set(l) => {
        let item = decay_opt(&l.item, visited);
        let list = ListPayload { items: None, item };
        if matches!(self, Payload::Array(_)) {
          Payload::Array(list)
        } else {
          Payload::Set(list)
        }
      }
      Payload::Object(d) => Payload::Object(DictPayload {
        items: None,
        item: decay_opt(&d.item, visited),
      }),
      Payload::Map(m) => Payload::Map(MapPayload {
        pairs: None,
        key: decay_opt(&m.key, visited),
        item: decay_opt(&m.item, visited),
      }),
      Payload::Promise(p) => Payload::Promise(PromisePayload {
        item: decay_opt(&p.item, visited),
        resolved: decay_opt(&p.resolved, visited),
        rejected: decay_opt(&p.rejected, visited),
      }),
      Payload::Request(r) => Payload::Request(RequestPayload {
        status: None,
        body: decay_opt(&r.body, visited),
      }),
      other => other.clone(),
    }
  }

  /// Every value held by the payload, for graph walks.
  pub fn nested_values(&self) -> Vec<Value> {
    let mut out = Vec::new();
    match self {
      Payload::Array(l) | Payload::Set(l) => {
        out.extend(l.item.iter().cloned());
        out.extend(l.items.iter().flatten().cloned());
      }
      Payload::Object(d) => {
        out.extend(d.item.iter().cloned());
        out.extend(d.items.iter().flat_map(|m| m.values()).cloned());
      }
      Payload::Map(m) => {
        out.extend(m.key.iter().chain(m.item.iter()).cloned());
        for (k, v) in m.pairs.iter().flatten() {
          out.push(k.clone());
          out.push(v.clone());
        }
      }
      Payload::Promise(p) => {
        out.extend(
          p.item
            .iter()
            .chain(p.resolved.iter())
            .chain(p.rejected.iter())
            .cloned(),
        );
      }
      Payload::EventTarget(e) => out.extend(e.listeners.values().cloned()),
      Payload::Request(r) => out.extend(r.body.iter().cloned()),
      _ => {}
    }
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn merge(a: &Payload, b: &Payload) -> Option<Payload> {
    a.merge_in(b, &mut MergeState::default())
  }

  #[test]
  fn equal_scalar_literals_stay_literal() {
    match merge(&Payload::Int(Some(5)), &Payload::Int(Some(5))) {
      Some(Payload::Int(Some(5))) => {}
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn differing_scalar_literals_decay_without_failing() {
    let a = Payload::String(Some("a".into()));
    let b = Payload::String(Some("b".into()));
    match merge(&a, &b) {
      Some(Payload::String(None)) => {}
      other => panic!("unexpected {other:?}"),
    }
    match merge(&Payload::Number(Some(1.5)), &Payload::Number(None)) {
      Some(Payload::Number(None)) => {}
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn nan_literals_compare_by_bits() {
    match merge(&Payload::Number(Some(f64::NAN)), &Payload::Number(Some(f64::NAN))) {
      Some(Payload::Number(Some(v))) => assert!(v.is_nan()),
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn different_kinds_do_not_merge() {
    assert!(merge(&Payload::Int(Some(1)), &Payload::Number(Some(1.0))).is_none());
    assert!(merge(&Payload::Plain, &Payload::Bool(None)).is_none());
  }

  #[test]
  fn shallow_decay_keeps_strings() {
    let mut visited = HashSet::default();
    let s = Payload::String(Some("x".into()));
    assert!(s.decay(false, &mut visited).is_literal());
    assert!(!s.decay(true, &mut visited).is_literal());
    assert!(!Payload::Bool(Some(true))
      .decay(false, &mut visited)
      .is_literal());
  }

  #[test]
  fn unknown_payload_matches_kind() {
    for kind in [
      PayloadKind::Plain,
      PayloadKind::Int,
      PayloadKind::Array,
      PayloadKind::Map,
      PayloadKind::Request,
    ] {
      let payload = Payload::unknown(kind);
      assert_eq!(payload.kind(), kind);
      assert!(!payload.is_literal());
    }
  }
}
