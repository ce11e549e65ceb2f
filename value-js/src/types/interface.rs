use super::has_ancestor;
use super::implements;
use super::resolve_member;
use super::ClassBuilder;
use super::Member;
use super::ProtoRef;
use super::Signature;
use super::TypeRef;
use crate::error::ValueError;
use crate::error::ValueResult;
use crate::loc::Loc;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A statically visible type: either a prototype viewed as its own interface,
/// or a structural contract independent of inheritance.
#[derive(Clone)]
pub enum Interface {
  Class(ProtoRef),
  Contract(Arc<Contract>),
}

impl fmt::Debug for Interface {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Interface::Class(p) => write!(f, "Class({})", p.name()),
      Interface::Contract(c) => write!(f, "Contract({})", c.name),
    }
  }
}

impl fmt::Display for Interface {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Requirement {
  Method(Signature),
  Property(TypeRef),
}

#[derive(Debug)]
pub struct Contract {
  pub name: String,
  pub extends: Vec<Interface>,
  pub members: BTreeMap<String, Requirement>,
}

impl Contract {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      extends: Vec::new(),
      members: BTreeMap::new(),
    }
  }

  pub fn extend(mut self, iface: Interface) -> Self {
    self.extends.push(iface);
    self
  }

  pub fn method(mut self, name: impl Into<String>, sig: Signature) -> Self {
    self.members.insert(name.into(), Requirement::Method(sig));
    self
  }

  pub fn property(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
    self.members.insert(name.into(), Requirement::Property(ty));
    self
  }

  pub fn into_interface(self) -> Interface {
    Interface::Contract(Arc::new(self))
  }

  /// Own requirement, else one inherited from an extended contract.
  pub fn requirement(&self, key: &str) -> Option<&Requirement> {
    self.members.get(key).or_else(|| {
      self.extends.iter().find_map(|ext| match ext {
        Interface::Contract(c) => c.requirement(key),
        Interface::Class(_) => None,
      })
    })
  }

  /// Every requirement including inherited ones; own requirements shadow
  /// inherited ones with the same name.
  pub fn all_requirements(&self) -> BTreeMap<String, Requirement> {
    let mut out = BTreeMap::new();
    for ext in &self.extends {
      if let Interface::Contract(c) = ext {
        out.extend(c.all_requirements());
      }
    }
    out.extend(self.members.iter().map(|(k, v)| (k.clone(), v.clone())));
    out
  }

  /// Synthetic prototype standing in for "some implementation of this
  /// contract", used when a declared type names a contract.
  pub fn as_prototype(self: &Arc<Self>) -> ProtoRef {
    let mut builder =
      ClassBuilder::new(self.name.clone()).implements(Interface::Contract(self.clone()));
    for (name, req) in self.all_requirements() {
      builder = match req {
        Requirement::Method(sig) => builder.method(name, sig),
        Requirement::Property(ty) => builder.field(name, ty),
      };
    }
    builder.build()
  }
}

enum MemberShape {
  Method(Vec<usize>),
  Property,
}

fn member_shape(iface: &Interface, key: &str) -> Option<MemberShape> {
  match iface {
    Interface::Class(p) => resolve_member(p, key).map(|(_, m)| match m {
      Member::Method { overloads, .. } => {
        MemberShape::Method(overloads.iter().map(|s| s.params.len()).collect())
      }
      _ => MemberShape::Property,
    }),
    Interface::Contract(c) => c.requirement(key).map(|r| match r {
      Requirement::Method(sig) => MemberShape::Method(vec![sig.params.len()]),
      Requirement::Property(_) => MemberShape::Property,
    }),
  }
}

impl Interface {
  pub fn name(&self) -> &str {
    match self {
      Interface::Class(p) => p.name(),
      Interface::Contract(c) => &c.name,
    }
  }

  pub fn proto(&self) -> Option<&ProtoRef> {
    match self {
      Interface::Class(p) => Some(p),
      Interface::Contract(_) => None,
    }
  }

  /// Prototype instances of this interface are generated from.
  pub fn instance_proto(&self) -> ProtoRef {
    match self {
      Interface::Class(p) => p.clone(),
      Interface::Contract(c) => c.as_prototype(),
    }
  }

  pub fn same(&self, other: &Interface) -> bool {
    self.name() == other.name()
  }

  /// Whether this interface is named `name` or extends/inherits something
  /// named `name`.
  pub fn extends_named(&self, name: &str) -> bool {
    match self {
      Interface::Class(p) => has_ancestor(p, name) || implements(p, name),
      Interface::Contract(c) => {
        c.name == name || c.extends.iter().any(|ext| ext.extends_named(name))
      }
    }
  }

  /// `self` is `other`, or a declared ancestor/implemented contract of it.
  pub fn is_ancestor_of(&self, other: &Interface) -> bool {
    other.extends_named(self.name())
  }

  /// Verify `other` can be used where `self` is expected. Declared ancestry
  /// always satisfies; contracts are additionally satisfied structurally.
  pub fn check(&self, other: &Interface, loc: Loc) -> ValueResult<()> {
    if self.is_ancestor_of(other) {
      return Ok(());
    }
    let contract = match self {
      Interface::Class(p) => {
        return Err(ValueError::structural(
          loc,
          format!("expected {}, got {}", p.name(), other.name()),
        ));
      }
      Interface::Contract(c) => c,
    };
    for ext in &contract.extends {
      ext.check(other, loc)?;
    }
    for (key, req) in &contract.members {
      let found = member_shape(other, key).ok_or_else(|| {
        ValueError::structural(
          loc,
          format!(
            "{} does not implement {}: missing member {key}",
            other.name(),
            contract.name
          ),
        )
      })?;
      match (req, found) {
        (Requirement::Method(sig), MemberShape::Method(arities)) => {
          if !arities.contains(&sig.params.len()) {
            return Err(ValueError::structural(
              loc,
              format!(
                "{}.{key} does not match {}.{key}: expected {} parameter(s)",
                other.name(),
                contract.name,
                sig.params.len()
              ),
            ));
          }
        }
        (Requirement::Method(_), MemberShape::Property) => {
          return Err(ValueError::structural(
            loc,
            format!("{}.{key} must be a method", other.name()),
          ));
        }
        (Requirement::Property(_), MemberShape::Method(_)) => {
          return Err(ValueError::structural(
            loc,
            format!("{}.{key} must be a property, not a method", other.name()),
          ));
        }
        (Requirement::Property(_), MemberShape::Property) => {}
      }
    }
    Ok(())
  }
}
