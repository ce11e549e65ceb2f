use super::MergeState;
use super::Value;
use crate::error::ValueError;
use crate::error::ValueResult;
use crate::loc::Loc;
use itertools::Itertools;
use std::fmt;
use std::rc::Rc;
use tracing::trace;

/// A union of mutually non-mergeable values reached through a control-flow
/// join. Never empty, never nested, never holds two mergeable branches.
#[derive(Clone)]
pub struct Multi {
  values: Rc<[Value]>,
  loc: Loc,
}

impl fmt::Debug for Multi {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Multi").field(&self.values).finish()
  }
}

/// Build the canonical value for "one of `values`": flatten nested unions,
/// merge whatever merges, drop typed nulls made redundant by an instance of
/// the same prototype, and unwrap single survivors.
pub fn new_multi(values: Vec<Value>, loc: Loc) -> ValueResult<Value> {
  let mut values = values.into_iter();
  let Some(first) = values.next() else {
    return Err(ValueError::internal(loc, "union of zero values"));
  };
  Ok(build(first, values, loc, &mut MergeState::default()))
}

/// Absorb `value` into `branches`, re-merging the result until it no longer
/// merges with any remaining branch.
fn absorb(branches: &mut Vec<Value>, mut value: Value, state: &mut MergeState) {
  loop {
    let hit = branches
      .iter()
      .enumerate()
      .find_map(|(i, b)| b.merge_in(&value, state).map(|m| (i, m)));
    match hit {
      Some((idx, merged)) => {
        branches.remove(idx);
        value = merged;
      }
      None => {
        branches.push(value);
        return;
      }
    }
  }
}

pub(crate) fn build(
  first: Value,
  rest: impl IntoIterator<Item = Value>,
  loc: Loc,
  state: &mut MergeState,
) -> Value {
  let mut flat = Vec::new();
  for value in std::iter::once(first).chain(rest) {
    match value.unwrap() {
      Value::Multi(m) => flat.extend(m.values.iter().cloned()),
      other => flat.push(other.clone()),
    }
  }
  let inputs = flat.len();

  let mut branches = Vec::with_capacity(flat.len());
  for value in flat {
    absorb(&mut branches, value, state);
  }

  let instance_protos = branches
    .iter()
    .filter_map(|b| match b {
      Value::Instance(i) => Some(i.inner().name().to_string()),
      _ => None,
    })
    .collect_vec();
  if !instance_protos.is_empty() {
    branches.retain(|b| match b {
      Value::Null(null) => !null
        .proto()
        .is_some_and(|p| instance_protos.iter().any(|name| name == p.name())),
      _ => true,
    });
  }

  trace!(inputs, branches = branches.len(), "union built");
  if branches.len() == 1 {
    if let Some(only) = branches.pop() {
      return only;
    }
  }
  Value::Multi(Multi {
    values: branches.into(),
    loc,
  })
}

impl Multi {
  pub fn values(&self) -> &[Value] {
    &self.values
  }

  pub fn loc(&self) -> Loc {
    self.loc
  }

  pub fn ptr_eq(&self, other: &Multi) -> bool {
    Rc::ptr_eq(&self.values, &other.values)
  }

  /// Branch type names, deduplicated, joined with `|`.
  pub fn type_name(&self) -> String {
    self
      .values
      .iter()
      .map(|v| v.type_name())
      .unique()
      .join("|")
  }

  /// Apply `f` to every branch. The first failure wins; successes are
  /// recombined into a union.
  pub fn map(&self, mut f: impl FnMut(&Value) -> ValueResult<Value>) -> ValueResult<Value> {
    let results = self
      .values
      .iter()
      .map(|v| f(v))
      .collect::<ValueResult<Vec<_>>>()?;
    new_multi(results, self.loc)
  }

  pub fn for_each(&self, mut f: impl FnMut(&Value) -> ValueResult<()>) -> ValueResult<()> {
    self.values.iter().try_for_each(|v| f(v))
  }
}
