//! Operators over abstract values, folding literal operands.
//!
//! Operands are classified by payload. When every operand is a literal the
//! result is computed the way a JS engine would; otherwise only the kind of
//! the result is known.

use super::ast::BinOp;
use super::ast::UnOp;
use crate::builtins;
use crate::error::Op;
use crate::error::ValueError;
use crate::error::ValueResult;
use crate::loc::Loc;
use crate::props::Payload;
use crate::registry::Registry;
use crate::types::has_ancestor;
use crate::types::ProtoRef;
use crate::value::Value;

#[derive(Clone, Debug, PartialEq)]
enum Operand {
  Bool(Option<bool>),
  Int(Option<i64>),
  Number(Option<f64>),
  String(Option<String>),
  Null,
  Void,
  Other,
}

impl Operand {
  fn of(value: &Value) -> Operand {
    match value.unwrap() {
      Value::Instance(i) => match i.props().payload() {
        Payload::Bool(v) => Operand::Bool(v),
        Payload::Int(v) => Operand::Int(v),
        Payload::Number(v) => Operand::Number(v),
        Payload::String(v) => Operand::String(v),
        _ => Operand::Other,
      },
      Value::Null(_) => Operand::Null,
      Value::Void(_) => Operand::Void,
      _ => Operand::Other,
    }
  }

  fn is_numeric(&self) -> bool {
    matches!(self, Operand::Int(_) | Operand::Number(_))
  }

  fn number(&self) -> Option<f64> {
    match self {
      Operand::Int(v) => v.map(|v| v as f64),
      Operand::Number(v) => *v,
      _ => None,
    }
  }

  /// Literal rendered as JS `String(x)` would.
  fn to_js_string(&self) -> Option<String> {
    match self {
      Operand::Bool(v) => v.map(|v| v.to_string()),
      Operand::Int(v) => v.map(|v| v.to_string()),
      Operand::Number(v) => v.map(number_to_string),
      Operand::String(v) => v.clone(),
      Operand::Null => Some("null".to_string()),
      Operand::Void => Some("undefined".to_string()),
      Operand::Other => None,
    }
  }
}

/// JS `Number.prototype.toString()` for the common cases.
pub fn number_to_string(v: f64) -> String {
  if v.is_nan() {
    return "NaN".to_string();
  }
  if v.is_infinite() {
    return if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
  }
  if v == 0.0 {
    return "0".to_string();
  }
  let abs = v.abs();
  if abs >= 1e21 || abs < 1e-6 {
    let s = format!("{v:e}");
    return match s.split_once('e') {
      Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
      _ => s,
    };
  }
  format!("{v}")
}

pub fn js_mod(a: f64, b: f64) -> f64 {
  match (a, b) {
    (_, 0.0) => f64::NAN,
    (a, _) if a.is_infinite() => f64::NAN,
    _ => a % b,
  }
}

/// Statically known truthiness, if any.
pub fn truthiness(value: &Value) -> Option<bool> {
  match value.unwrap() {
    Value::Instance(i) => match i.props().payload() {
      Payload::Bool(v) => v,
      Payload::Int(v) => v.map(|v| v != 0),
      Payload::Number(v) => v.map(|v| v != 0.0 && !v.is_nan()),
      Payload::String(v) => v.map(|v| !v.is_empty()),
      _ => Some(true),
    },
    Value::Null(_) | Value::Void(_) => Some(false),
    Value::Function(_) | Value::Class(_) | Value::ClassInterface(_) | Value::Enum(_) => Some(true),
    Value::Multi(m) => {
      let mut branches = m.values().iter().map(truthiness);
      let first = branches.next().flatten()?;
      branches.all(|t| t == Some(first)).then_some(first)
    }
    _ => None,
  }
}

fn typeof_name(value: &Value) -> Option<&'static str> {
  match value.unwrap() {
    Value::Instance(i) => Some(match i.props().payload() {
      Payload::Bool(_) => "boolean",
      Payload::Int(_) | Payload::Number(_) => "number",
      Payload::String(_) => "string",
      _ => "object",
    }),
    Value::Null(_) => Some("object"),
    Value::Void(_) => Some("undefined"),
    Value::Function(_) | Value::Class(_) => Some("function"),
    Value::Enum(_) => Some("object"),
    Value::Multi(m) => {
      let mut names = m.values().iter().map(typeof_name);
      let first = names.next().flatten()?;
      names.all(|n| n == Some(first)).then_some(first)
    }
    _ => None,
  }
}

/// Whether `value` is an instance of `proto`: `Some(true)` on every path,
/// `Some(false)` on none, `None` when it depends on the path or on a
/// downcast.
pub fn instance_test(value: &Value, proto: &ProtoRef) -> Option<bool> {
  match value.unwrap() {
    Value::Instance(i) => {
      let inner = i.inner();
      if has_ancestor(&inner, proto.name()) {
        Some(true)
      } else if has_ancestor(proto, inner.name()) {
        None
      } else {
        Some(false)
      }
    }
    Value::Multi(m) => {
      let mut results = m.values().iter().map(|v| instance_test(v, proto));
      let first = results.next().flatten()?;
      results.all(|r| r == Some(first)).then_some(first)
    }
    Value::Any(_) => None,
    _ => Some(false),
  }
}

fn unsupported(op: BinOp, a: &Value, b: &Value, loc: Loc) -> ValueError {
  ValueError::unsupported(
    loc,
    format!("{} {} {}", a.type_name(), op.as_str(), b.type_name()),
    Op::Operator,
  )
}

fn arith(
  registry: &Registry,
  op: BinOp,
  x: &Operand,
  y: &Operand,
  loc: Loc,
) -> Option<ValueResult<Value>> {
  if !x.is_numeric() || !y.is_numeric() {
    return None;
  }
  if let (Operand::Int(a), Operand::Int(b)) = (x, y) {
    let int = match op {
      BinOp::Add => Some(a.zip(*b).and_then(|(a, b)| a.checked_add(b))),
      BinOp::Sub => Some(a.zip(*b).and_then(|(a, b)| a.checked_sub(b))),
      BinOp::Mul => Some(a.zip(*b).and_then(|(a, b)| a.checked_mul(b))),
      BinOp::Mod if *b != Some(0) => Some(a.zip(*b).and_then(|(a, b)| a.checked_rem(b))),
      _ => None,
    };
    // An overflowing literal falls through to floating point.
    if let Some(int) = int {
      if int.is_some() || a.is_none() || b.is_none() {
        return Some(builtins::new_int(registry, int, loc));
      }
    }
  }
  let folded = x.number().zip(y.number()).and_then(|(a, b)| match op {
    BinOp::Add => Some(a + b),
    BinOp::Sub => Some(a - b),
    BinOp::Mul => Some(a * b),
    BinOp::Div => Some(a / b),
    BinOp::Mod => Some(js_mod(a, b)),
    _ => None,
  });
  Some(builtins::new_number(registry, folded, loc))
}

fn compare(
  registry: &Registry,
  op: BinOp,
  x: &Operand,
  y: &Operand,
  loc: Loc,
) -> Option<ValueResult<Value>> {
  let ordering = match (x, y) {
    (Operand::String(a), Operand::String(b)) => match (a, b) {
      (Some(a), Some(b)) => Some(a.partial_cmp(b)),
      _ => None,
    },
    (a, b) if a.is_numeric() && b.is_numeric() => a.number().zip(b.number()).map(|(a, b)| a.partial_cmp(&b)),
    _ => return None,
  };
  let result = ordering.map(|ord| match ord {
    // NaN compares false every way.
    None => false,
    Some(ord) => match op {
      BinOp::Lt => ord.is_lt(),
      BinOp::Leq => ord.is_le(),
      BinOp::Gt => ord.is_gt(),
      _ => ord.is_ge(),
    },
  });
  Some(builtins::new_bool(registry, result, loc))
}

fn strict_eq(x: &Operand, y: &Operand) -> Option<bool> {
  match (x, y) {
    (Operand::Null, Operand::Null) | (Operand::Void, Operand::Void) => Some(true),
    (Operand::Other, _) | (_, Operand::Other) => None,
    (a, b) if a.is_numeric() && b.is_numeric() => {
      a.number().zip(b.number()).map(|(a, b)| a == b)
    }
    (Operand::Bool(a), Operand::Bool(b)) => a.zip(*b).map(|(a, b)| a == b),
    (Operand::String(a), Operand::String(b)) => match (a, b) {
      (Some(a), Some(b)) => Some(a == b),
      _ => None,
    },
    // Different kinds are never strictly equal.
    _ => Some(false),
  }
}

pub fn fold_binary(
  registry: &Registry,
  op: BinOp,
  a: &Value,
  b: &Value,
  loc: Loc,
) -> ValueResult<Value> {
  match (a.unwrap(), b.unwrap()) {
    (Value::Multi(m), _) => return m.map(|a| fold_binary(registry, op, a, b, loc)),
    (_, Value::Multi(m)) => return m.map(|b| fold_binary(registry, op, a, b, loc)),
    (Value::Any(_), _) | (_, Value::Any(_)) => return Ok(Value::Any(loc)),
    _ => {}
  }
  let x = Operand::of(a);
  let y = Operand::of(b);
  let result = match op {
    BinOp::Add => match (&x, &y) {
      (Operand::String(_), other) | (other, Operand::String(_)) if *other != Operand::Other => {
        let joined = x
          .to_js_string()
          .zip(y.to_js_string())
          .map(|(l, r)| format!("{l}{r}"));
        Some(builtins::new_string(registry, joined, loc))
      }
      _ => arith(registry, op, &x, &y, loc),
    },
    BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => arith(registry, op, &x, &y, loc),
    BinOp::Lt | BinOp::Leq | BinOp::Gt | BinOp::Geq => compare(registry, op, &x, &y, loc),
    BinOp::StrictEq | BinOp::NotStrictEq => {
      let eq = strict_eq(&x, &y);
      let result = if op == BinOp::StrictEq {
        eq
      } else {
        eq.map(|eq| !eq)
      };
      Some(builtins::new_bool(registry, result, loc))
    }
    BinOp::And | BinOp::Or => {
      // Both sides already evaluated; pick by truthiness of the left.
      Some(Ok(match (op, truthiness(a)) {
        (BinOp::And, Some(true)) | (BinOp::Or, Some(false)) => b.clone(),
        (_, Some(_)) => a.clone(),
        (_, None) => a.join(b),
      }))
    }
  };
  result.unwrap_or_else(|| Err(unsupported(op, a, b, loc)))
}

pub fn fold_unary(registry: &Registry, op: UnOp, value: &Value, loc: Loc) -> ValueResult<Value> {
  match op {
    UnOp::Not => builtins::new_bool(registry, truthiness(value).map(|t| !t), loc),
    UnOp::Typeof => builtins::new_string(registry, typeof_name(value).map(String::from), loc),
    UnOp::Neg => match value.unwrap() {
      Value::Multi(m) => m.map(|v| fold_unary(registry, op, v, loc)),
      Value::Any(_) => Ok(Value::Any(loc)),
      _ => match Operand::of(value) {
        Operand::Int(v) => match v {
          Some(v) => match v.checked_neg() {
            Some(n) => builtins::new_int(registry, Some(n), loc),
            None => builtins::new_number(registry, Some(-(v as f64)), loc),
          },
          None => builtins::new_int(registry, None, loc),
        },
        Operand::Number(v) => builtins::new_number(registry, v.map(|v| -v), loc),
        _ => Err(ValueError::unsupported(
          loc,
          format!("-{}", value.type_name()),
          Op::Operator,
        )),
      },
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn registry() -> Registry {
    Registry::with_core()
  }

  fn int(r: &Registry, v: i64) -> Value {
    builtins::new_int(r, Some(v), Loc::unknown()).unwrap()
  }

  fn string(r: &Registry, v: &str) -> Value {
    builtins::new_string(r, Some(v.to_string()), Loc::unknown()).unwrap()
  }

  #[test]
  fn number_formatting_follows_js() {
    assert_eq!(number_to_string(1.0), "1");
    assert_eq!(number_to_string(-0.0), "0");
    assert_eq!(number_to_string(0.5), "0.5");
    assert_eq!(number_to_string(f64::NAN), "NaN");
    assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    assert_eq!(number_to_string(1e21), "1e+21");
  }

  #[test]
  fn int_arithmetic_stays_int() {
    let r = registry();
    let sum = fold_binary(&r, BinOp::Add, &int(&r, 2), &int(&r, 3), Loc::unknown()).unwrap();
    assert_eq!(sum.type_name(), "Int");
    assert_eq!(sum.literal_int(), Some(5));
    let quotient = fold_binary(&r, BinOp::Div, &int(&r, 1), &int(&r, 2), Loc::unknown()).unwrap();
    assert_eq!(quotient.type_name(), "Number");
    assert_eq!(quotient.literal_number(), Some(0.5));
  }

  #[test]
  fn string_concatenation_folds() {
    let r = registry();
    let s = fold_binary(&r, BinOp::Add, &string(&r, "n="), &int(&r, 4), Loc::unknown()).unwrap();
    assert_eq!(s.literal_string().as_deref(), Some("n=4"));
  }

  #[test]
  fn non_literal_operand_gives_kind_only() {
    let r = registry();
    let unknown = builtins::new_int(&r, None, Loc::unknown()).unwrap();
    let lt = fold_binary(&r, BinOp::Lt, &unknown, &int(&r, 3), Loc::unknown()).unwrap();
    assert_eq!(lt.type_name(), "Boolean");
    assert_eq!(lt.literal_bool(), None);
  }

  #[test]
  fn strict_equality_of_kinds() {
    let r = registry();
    let eq = fold_binary(&r, BinOp::StrictEq, &int(&r, 1), &string(&r, "1"), Loc::unknown()).unwrap();
    assert_eq!(eq.literal_bool(), Some(false));
  }

  #[test]
  fn operators_on_objects_are_unsupported() {
    let r = registry();
    let obj = builtins::new_object(&r, vec![], Loc::unknown()).unwrap();
    let err = fold_binary(&r, BinOp::Sub, &obj, &int(&r, 1), Loc::unknown()).unwrap_err();
    assert_eq!(err.kind(), crate::error::ErrorKind::Unsupported);
  }

  #[test]
  fn overflowing_remainder_falls_back_to_number() {
    let r = registry();
    let rem = fold_binary(&r, BinOp::Mod, &int(&r, i64::MIN), &int(&r, -1), Loc::unknown()).unwrap();
    assert_eq!(rem.type_name(), "Number");
    assert_eq!(rem.literal_number(), Some(-0.0));
    let rem = fold_binary(&r, BinOp::Mod, &int(&r, 7), &int(&r, -3), Loc::unknown()).unwrap();
    assert_eq!(rem.literal_int(), Some(1));
  }

  #[test]
  fn typeof_and_not_fold() {
    let r = registry();
    let t = fold_unary(&r, UnOp::Typeof, &string(&r, "x"), Loc::unknown()).unwrap();
    assert_eq!(t.literal_string().as_deref(), Some("string"));
    let n = fold_unary(&r, UnOp::Not, &int(&r, 0), Loc::unknown()).unwrap();
    assert_eq!(n.literal_bool(), Some(true));
  }
}
