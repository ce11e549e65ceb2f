use proptest::prelude::*;

use value_js::builtins;
use value_js::value::Null;
use value_js::{new_multi, Loc, Registry, Value};

#[derive(Clone, Debug)]
enum Scalar {
  Bool(Option<bool>),
  Int(Option<i64>),
  Str(Option<String>),
  AllNull,
}

fn small_string() -> impl Strategy<Value = String> {
  let charset: Vec<char> = "abc".chars().collect();
  prop::collection::vec(prop::sample::select(charset), 0..3)
    .prop_map(|chars| chars.into_iter().collect())
}

fn scalar() -> impl Strategy<Value = Scalar> {
  prop_oneof![
    proptest::option::of(any::<bool>()).prop_map(Scalar::Bool),
    proptest::option::of(-3i64..3).prop_map(Scalar::Int),
    proptest::option::of(small_string()).prop_map(Scalar::Str),
    Just(Scalar::AllNull),
  ]
}

fn build(registry: &Registry, s: &Scalar) -> Value {
  let loc = Loc(1, 2);
  match s {
    Scalar::Bool(v) => builtins::new_bool(registry, *v, loc).unwrap(),
    Scalar::Int(v) => builtins::new_int(registry, *v, loc).unwrap(),
    Scalar::Str(v) => builtins::new_string(registry, v.clone(), loc).unwrap(),
    Scalar::AllNull => Value::Null(Null::all(loc)),
  }
}

fn kind(s: &Scalar) -> u8 {
  match s {
    Scalar::Bool(_) => 0,
    Scalar::Int(_) => 1,
    Scalar::Str(_) => 2,
    Scalar::AllNull => 3,
  }
}

fn branch_count(v: &Value) -> usize {
  match v {
    Value::Multi(m) => m.values().len(),
    _ => 1,
  }
}

proptest! {
  #[test]
  fn union_of_a_union_is_the_same_union(specs in prop::collection::vec(scalar(), 1..6)) {
    let registry = Registry::with_core();
    let values: Vec<Value> = specs.iter().map(|s| build(&registry, s)).collect();
    let once = new_multi(values, Loc(1, 2)).unwrap();
    let twice = new_multi(vec![once.clone()], Loc(1, 2)).unwrap();
    prop_assert_eq!(once.type_name(), twice.type_name());
    prop_assert_eq!(branch_count(&once), branch_count(&twice));
    if let Value::Multi(m) = &twice {
      prop_assert!(m.values().iter().all(|v| !matches!(v, Value::Multi(_))));
    }
  }

  #[test]
  fn union_keeps_one_branch_per_scalar_kind(specs in prop::collection::vec(scalar(), 1..6)) {
    let registry = Registry::with_core();
    let values: Vec<Value> = specs.iter().map(|s| build(&registry, s)).collect();
    let union = new_multi(values, Loc(1, 2)).unwrap();
    let mut kinds: Vec<u8> = specs
      .iter()
      .filter(|s| !matches!(s, Scalar::AllNull))
      .map(kind)
      .collect();
    kinds.sort();
    kinds.dedup();
    prop_assert_eq!(branch_count(&union), kinds.len().max(1));
  }

  #[test]
  fn merge_is_symmetric(a in scalar(), b in scalar()) {
    let registry = Registry::with_core();
    let x = build(&registry, &a);
    let y = build(&registry, &b);
    let xy = x.merge(&y);
    let yx = y.merge(&x);
    prop_assert_eq!(xy.is_some(), yx.is_some());
    if let (Some(xy), Some(yx)) = (xy, yx) {
      prop_assert_eq!(xy.type_name(), yx.type_name());
      prop_assert_eq!(xy.is_literal(), yx.is_literal());
    }
  }

  #[test]
  fn merge_with_self_is_identity(a in scalar()) {
    let registry = Registry::with_core();
    let x = build(&registry, &a);
    let merged = x.merge(&build(&registry, &a)).unwrap();
    prop_assert_eq!(merged.type_name(), x.type_name());
    prop_assert_eq!(merged.is_literal(), x.is_literal());
    prop_assert_eq!(merged.literal_int(), x.literal_int());
    prop_assert_eq!(merged.literal_string(), x.literal_string());
  }

  #[test]
  fn scalar_merges_of_one_kind_never_fail(a in proptest::option::of(-3i64..3), b in proptest::option::of(-3i64..3)) {
    let registry = Registry::with_core();
    let x = build(&registry, &Scalar::Int(a));
    let y = build(&registry, &Scalar::Int(b));
    let merged = x.merge(&y).unwrap();
    let expected = match (a, b) {
      (Some(a), Some(b)) if a == b => Some(a),
      _ => None,
    };
    prop_assert_eq!(merged.literal_int(), expected);
  }
}
