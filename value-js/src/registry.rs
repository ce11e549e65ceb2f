use crate::builtins;
use crate::error::ValueError;
use crate::error::ValueResult;
use crate::loc::Loc;
use crate::options::EvalOptions;
use crate::types::Interface;
use crate::types::ProtoRef;
use ahash::HashMap;

/// Type library available to every pass.
///
/// Built once before evaluation starts and only read afterwards, so a single
/// `Arc<Registry>` is shared by passes running on different threads.
/// Prototypes declared by the evaluated program are not registered here;
/// they live in the pass's root frame.
#[derive(Debug, Default)]
pub struct Registry {
  protos: HashMap<String, ProtoRef>,
  contracts: HashMap<String, Interface>,
  options: EvalOptions,
}

impl Registry {
  pub fn new(options: EvalOptions) -> Registry {
    Registry {
      protos: HashMap::default(),
      contracts: HashMap::default(),
      options,
    }
  }

  /// Registry holding the core prototypes literals and aggregates need.
  pub fn with_core() -> Registry {
    Registry::with_core_options(EvalOptions::default())
  }

  pub fn with_core_options(options: EvalOptions) -> Registry {
    let mut registry = Registry::new(options);
    builtins::install_core(&mut registry);
    registry
  }

  /// Later registrations replace earlier ones with the same name.
  pub fn register(&mut self, proto: ProtoRef) {
    self.protos.insert(proto.name().to_string(), proto);
  }

  pub fn register_contract(&mut self, iface: Interface) {
    match iface {
      Interface::Class(proto) => self.register(proto),
      Interface::Contract(_) => {
        self.contracts.insert(iface.name().to_string(), iface);
      }
    }
  }

  pub fn proto(&self, name: &str) -> Option<ProtoRef> {
    self.protos.get(name).cloned()
  }

  /// A core prototype; its absence means the registry was not built with
  /// [`Registry::with_core`].
  pub fn core(&self, name: &str) -> ValueResult<ProtoRef> {
    self.proto(name).ok_or_else(|| {
      ValueError::internal(
        Loc::unknown(),
        format!("core prototype {name} is not registered"),
      )
    })
  }

  pub fn interface(&self, name: &str) -> Option<Interface> {
    self
      .proto(name)
      .map(Interface::Class)
      .or_else(|| self.contracts.get(name).cloned())
  }

  pub fn require_interface(&self, name: &str, loc: Loc) -> ValueResult<Interface> {
    self
      .interface(name)
      .ok_or_else(|| ValueError::structural(loc, format!("unknown type {name}")))
  }

  pub fn options(&self) -> &EvalOptions {
    &self.options
  }

  pub fn len(&self) -> usize {
    self.protos.len() + self.contracts.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::builtins::names;
  use crate::types::has_ancestor;
  use crate::types::Contract;

  #[test]
  fn core_library_is_installed() {
    let registry = Registry::with_core();
    for name in [
      names::OBJECT,
      names::BOOLEAN,
      names::INT,
      names::NUMBER,
      names::STRING,
      names::ARRAY,
      names::MAP,
      names::SET,
      names::PROMISE,
      names::EVENT_TARGET,
      names::REQUEST,
    ] {
      assert!(registry.proto(name).is_some(), "{name} missing");
    }
    let int = registry.core(names::INT).unwrap();
    assert!(has_ancestor(&int, names::NUMBER));
  }

  #[test]
  fn missing_core_prototype_is_internal() {
    let registry = Registry::new(EvalOptions::default());
    assert!(registry.core(names::STRING).unwrap_err().is_internal());
  }

  #[test]
  fn contracts_are_looked_up_by_name() {
    let mut registry = Registry::with_core();
    registry.register_contract(Contract::new("Named").into_interface());
    assert!(matches!(
      registry.interface("Named"),
      Some(Interface::Contract(_))
    ));
    assert!(registry.require_interface("Nope", Loc::unknown()).is_err());
  }
}
