use super::Value;
use crate::error::ValueError;
use crate::error::ValueResult;
use crate::loc::Loc;
use crate::types::Interface;
use crate::types::ProtoRef;
use std::fmt;

/// `null`, optionally typed. Without a prototype this is the permissive
/// "AllNull" that merges with and casts to everything.
#[derive(Clone)]
pub struct Null {
  outer: Option<Interface>,
  proto: Option<ProtoRef>,
  loc: Loc,
}

impl fmt::Debug for Null {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.outer {
      Some(outer) => write!(f, "Null({})", outer.name()),
      None => f.write_str("AllNull"),
    }
  }
}

impl Null {
  pub fn all(loc: Loc) -> Null {
    Null {
      outer: None,
      proto: None,
      loc,
    }
  }

  pub fn typed(iface: Interface, loc: Loc) -> Null {
    let proto = iface.instance_proto();
    Null {
      outer: Some(iface),
      proto: Some(proto),
      loc,
    }
  }

  pub fn is_all(&self) -> bool {
    self.proto.is_none()
  }

  pub fn outer(&self) -> Option<&Interface> {
    self.outer.as_ref()
  }

  pub fn proto(&self) -> Option<&ProtoRef> {
    self.proto.as_ref()
  }

  pub fn loc(&self) -> Loc {
    self.loc
  }

  pub fn type_name(&self) -> String {
    match &self.outer {
      Some(outer) => outer.name().to_string(),
      None => "null".to_string(),
    }
  }

  pub(crate) fn merge(&self, other: &Value) -> Option<Value> {
    if self.is_all() {
      return Some(other.clone());
    }
    match other {
      Value::Null(o) if o.is_all() => Some(Value::Null(self.clone())),
      Value::Null(o) => {
        let same = match (&self.outer, &o.outer) {
          (Some(a), Some(b)) => a.same(b),
          _ => false,
        };
        same.then(|| Value::Null(self.clone()))
      }
      _ => None,
    }
  }

  /// AllNull casts to anything. A typed null casts along its ancestry in
  /// either direction, or to a contract its prototype satisfies.
  pub fn cast(&self, target: &Interface, loc: Loc) -> ValueResult<Value> {
    if let Some(outer) = &self.outer {
      let related = target.is_ancestor_of(outer) || outer.is_ancestor_of(target);
      if !related {
        match (target, &self.proto) {
          (Interface::Contract(_), Some(proto)) => {
            target.check(&Interface::Class(proto.clone()), loc)?;
          }
          _ => {
            return Err(ValueError::structural(
              loc,
              format!("cannot cast {} to {}", outer.name(), target.name()),
            ));
          }
        }
      }
    }
    Ok(Value::Null(Null::typed(target.clone(), loc)))
  }

  pub(crate) fn retyped(&self, iface: &Interface) -> Null {
    Null {
      outer: Some(iface.clone()),
      proto: self.proto.clone().or_else(|| Some(iface.instance_proto())),
      loc: self.loc,
    }
  }
}
