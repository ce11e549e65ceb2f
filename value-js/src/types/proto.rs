use super::ConstLit;
use super::Interface;
use super::Member;
use super::PayloadKind;
use super::Signature;
use super::TypeRef;
use crate::eval::ast::FunctionDecl;
use crate::loc::Loc;
use crate::props::Payload;
use crate::props::Properties;
use crate::value::Instance;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub type ProtoRef = Arc<dyn Prototype>;

/// Type descriptor node in the single-inheritance ancestry graph.
///
/// The built-in runtime library and the classes declared by the evaluated
/// program both provide prototypes. Prototypes are compared by name; names
/// are unique within a registry and a pass.
pub trait Prototype: fmt::Debug + Send + Sync {
  fn name(&self) -> &str;

  fn parent(&self) -> Option<&ProtoRef>;

  /// Structural contracts this prototype declares it implements. Inherited
  /// contracts are found by walking [`Prototype::parent`].
  fn interfaces(&self) -> &[Interface];

  /// Whether instances may cross serialization boundaries.
  fn is_universal(&self) -> bool {
    false
  }

  fn is_abstract(&self) -> bool {
    false
  }

  /// Own instance-level member; does not consult the parent.
  fn instance_member(&self, key: &str) -> Option<&Member>;

  /// Own class-level (static) member; does not consult the parent.
  fn class_member(&self, key: &str) -> Option<&Member>;

  fn instance_member_names(&self) -> Vec<&str>;

  /// Constructor overloads. Empty means "inherit from parent" for classes
  /// with a parent, and "no arguments" otherwise.
  fn constructors(&self) -> &[Signature];

  fn constructor_body(&self) -> Option<&Arc<FunctionDecl>> {
    None
  }

  fn payload_kind(&self) -> PayloadKind {
    self
      .parent()
      .map(|p| p.payload_kind())
      .unwrap_or(PayloadKind::Plain)
  }
}

/// Whether `proto` is, or inherits from, the prototype named `ancestor`.
pub fn has_ancestor(proto: &ProtoRef, ancestor: &str) -> bool {
  let mut cur = Some(proto);
  while let Some(p) = cur {
    if p.name() == ancestor {
      return true;
    }
    cur = p.parent();
  }
  false
}

/// Whether `proto` or any ancestor declares a contract named `iface` (or a
/// contract extending it).
pub fn implements(proto: &ProtoRef, iface: &str) -> bool {
  let mut cur = Some(proto);
  while let Some(p) = cur {
    if p.interfaces().iter().any(|i| i.extends_named(iface)) {
      return true;
    }
    cur = p.parent();
  }
  false
}

/// Find an instance member by walking the parent chain. Returns the prototype
/// that declares it, which private-access checks and `super` dispatch need.
pub fn resolve_member<'a>(proto: &'a ProtoRef, key: &str) -> Option<(&'a ProtoRef, &'a Member)> {
  let mut cur = Some(proto);
  while let Some(p) = cur {
    if let Some(member) = p.instance_member(key) {
      return Some((p, member));
    }
    cur = p.parent();
  }
  None
}

pub fn resolve_class_member<'a>(
  proto: &'a ProtoRef,
  key: &str,
) -> Option<(&'a ProtoRef, &'a Member)> {
  let mut cur = Some(proto);
  while let Some(p) = cur {
    if let Some(member) = p.class_member(key) {
      return Some((p, member));
    }
    cur = p.parent();
  }
  None
}

/// The constructor overloads that apply to `proto`, inheriting them from the
/// nearest ancestor that declares any.
pub fn effective_constructors(proto: &ProtoRef) -> &[Signature] {
  let mut cur = Some(proto);
  while let Some(p) = cur {
    if !p.constructors().is_empty() || p.constructor_body().is_some() {
      return p.constructors();
    }
    cur = p.parent();
  }
  &[]
}

/// A fresh non-literal instance of `proto`, standing in for "some value of
/// this type" (declared parameter/return/field types).
pub fn generate_instance(proto: &ProtoRef, loc: Loc) -> Value {
  let kind = proto.payload_kind();
  let props = Properties::new(Payload::unknown(kind));
  if kind == PayloadKind::Plain {
    props.lock();
  }
  Value::Instance(Instance::of(proto.clone(), props, loc))
}

/// Data-driven prototype used by the core library and by classes declared in
/// the evaluated program.
#[derive(Debug)]
pub struct ClassPrototype {
  name: String,
  parent: Option<ProtoRef>,
  interfaces: Vec<Interface>,
  universal: bool,
  is_abstract: bool,
  members: BTreeMap<String, Member>,
  statics: BTreeMap<String, Member>,
  constructors: Vec<Signature>,
  constructor_body: Option<Arc<FunctionDecl>>,
  payload: Option<PayloadKind>,
}

impl Prototype for ClassPrototype {
  fn name(&self) -> &str {
    &self.name
  }

  fn parent(&self) -> Option<&ProtoRef> {
    self.parent.as_ref()
  }

  fn interfaces(&self) -> &[Interface] {
    &self.interfaces
  }

  fn is_universal(&self) -> bool {
    self.universal
  }

  fn is_abstract(&self) -> bool {
    self.is_abstract
  }

  fn instance_member(&self, key: &str) -> Option<&Member> {
    self.members.get(key)
  }

  fn class_member(&self, key: &str) -> Option<&Member> {
    self.statics.get(key)
  }

  fn instance_member_names(&self) -> Vec<&str> {
    self.members.keys().map(|k| k.as_str()).collect()
  }

  fn constructors(&self) -> &[Signature] {
    &self.constructors
  }

  fn constructor_body(&self) -> Option<&Arc<FunctionDecl>> {
    self.constructor_body.as_ref()
  }

  fn payload_kind(&self) -> PayloadKind {
    match self.payload {
      Some(kind) => kind,
      None => self
        .parent
        .as_ref()
        .map(|p| p.payload_kind())
        .unwrap_or(PayloadKind::Plain),
    }
  }
}

pub struct ClassBuilder {
  proto: ClassPrototype,
}

impl ClassBuilder {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      proto: ClassPrototype {
        name: name.into(),
        parent: None,
        interfaces: Vec::new(),
        universal: false,
        is_abstract: false,
        members: BTreeMap::new(),
        statics: BTreeMap::new(),
        constructors: Vec::new(),
        constructor_body: None,
        payload: None,
      },
    }
  }

  pub fn extends(mut self, parent: ProtoRef) -> Self {
    self.proto.parent = Some(parent);
    self
  }

  pub fn implements(mut self, iface: Interface) -> Self {
    self.proto.interfaces.push(iface);
    self
  }

  pub fn universal(mut self, universal: bool) -> Self {
    self.proto.universal = universal;
    self
  }

  pub fn abstract_class(mut self) -> Self {
    self.proto.is_abstract = true;
    self
  }

  pub fn payload(mut self, kind: PayloadKind) -> Self {
    self.proto.payload = Some(kind);
    self
  }

  /// Adds an overload; repeated calls with the same name accumulate.
  pub fn method(mut self, name: impl Into<String>, sig: Signature) -> Self {
    add_overload(&mut self.proto.members, name.into(), sig, None);
    self
  }

  pub fn method_with_body(
    mut self,
    name: impl Into<String>,
    sig: Signature,
    body: Arc<FunctionDecl>,
  ) -> Self {
    add_overload(&mut self.proto.members, name.into(), sig, Some(body));
    self
  }

  pub fn getter(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
    self.proto.members.insert(name.into(), Member::Getter(ty));
    self
  }

  pub fn field(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
    self.proto.members.insert(name.into(), Member::Field {
      ty,
      readonly: false,
    });
    self
  }

  pub fn readonly_field(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
    self
      .proto
      .members
      .insert(name.into(), Member::Field { ty, readonly: true });
    self
  }

  pub fn static_method(mut self, name: impl Into<String>, sig: Signature) -> Self {
    add_overload(&mut self.proto.statics, name.into(), sig, None);
    self
  }

  pub fn static_method_with_body(
    mut self,
    name: impl Into<String>,
    sig: Signature,
    body: Arc<FunctionDecl>,
  ) -> Self {
    add_overload(&mut self.proto.statics, name.into(), sig, Some(body));
    self
  }

  pub fn constant(mut self, name: impl Into<String>, value: ConstLit) -> Self {
    self
      .proto
      .statics
      .insert(name.into(), Member::Constant(value));
    self
  }

  pub fn constructor(mut self, sig: Signature) -> Self {
    self.proto.constructors.push(sig);
    self
  }

  pub fn constructor_body(mut self, sig: Signature, body: Arc<FunctionDecl>) -> Self {
    self.proto.constructors = vec![sig];
    self.proto.constructor_body = Some(body);
    self
  }

  pub fn build(self) -> ProtoRef {
    Arc::new(self.proto)
  }
}

fn add_overload(
  table: &mut BTreeMap<String, Member>,
  name: String,
  sig: Signature,
  body: Option<Arc<FunctionDecl>>,
) {
  match table.get_mut(&name) {
    Some(Member::Method { overloads, body: existing }) => {
      overloads.push(sig);
      if existing.is_none() {
        *existing = body;
      }
    }
    _ => {
      table.insert(name, Member::Method {
        overloads: vec![sig],
        body,
      });
    }
  }
}
