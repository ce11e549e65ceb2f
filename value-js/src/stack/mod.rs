//! Evaluation environment.
//!
//! A stack is a chain of frames ending in a [`RootStack`]. Owning frames
//! ([`FunctionStack`], [`CallStack`]) hold variable bindings, the return slot
//! and `this`; non-owning frames ([`BlockStack`], [`BranchStack`]) delegate
//! to their parent, the latter recording writes so divergent arms can be
//! joined. Pass-wide state (registry, recursion guard, node caches) lives in
//! the root.

mod cache;
mod frames;
pub mod guard;
pub mod view;

pub use cache::NodeCaches;
pub use frames::BlockStack;
pub use frames::BranchStack;
pub use frames::CallStack;
pub use frames::FunctionStack;
pub use frames::RootStack;
pub use guard::RecursionGuard;
pub use view::ViewInterface;

use crate::error::ValueResult;
use crate::loc::Loc;
use crate::registry::Registry;
use crate::types::Interface;
use crate::types::ProtoRef;
use crate::value::Value;
use serde::Deserialize;
use serde::Serialize;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u32);

/// Identity of a variable declaration site, assigned by the parser.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub u32);

/// Identity of an AST node used as a cache key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Identity of a function declaration, used by the recursion guard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallableId(pub u32);

pub type StackRef = Rc<dyn Stack>;

pub trait Stack {
  fn frame_id(&self) -> FrameId;

  fn parent(&self) -> Option<StackRef>;

  fn root(&self) -> &RootStack;

  fn get_value(&self, var: VarId) -> Option<Value>;

  /// Assign to an existing binding.
  fn set_value(&self, var: VarId, value: Value, loc: Loc) -> ValueResult<()>;

  /// Create a binding in the nearest frame that holds declarations.
  fn declare(&self, var: VarId, value: Value);

  /// Join of every value returned so far by the enclosing function.
  fn get_return(&self) -> Option<Value>;

  fn set_return(&self, value: Value);

  fn this_value(&self) -> Option<Value>;

  /// Class whose code is executing, for private member access.
  fn private_context(&self) -> Option<ProtoRef>;

  fn view_interface(&self) -> Option<Rc<dyn ViewInterface>>;

  fn call_depth(&self) -> usize;

  /// Drop the values this frame holds. Only called once the pass is over.
  fn release(&self) {}

  fn registry(&self) -> &Registry {
    self.root().registry()
  }

  fn lookup_interface(&self, name: &str) -> Option<Interface> {
    self.root().lookup_interface(name)
  }

  fn lookup_proto(&self, name: &str) -> Option<ProtoRef> {
    self
      .lookup_interface(name)
      .and_then(|iface| iface.proto().cloned())
  }
}

/// Whether `stack` is, or is nested inside, one of `frames`.
pub fn within_frames(stack: &dyn Stack, frames: &[FrameId]) -> bool {
  if frames.contains(&stack.frame_id()) {
    return true;
  }
  let mut cur = stack.parent();
  while let Some(frame) = cur {
    if frames.contains(&frame.frame_id()) {
      return true;
    }
    cur = frame.parent();
  }
  false
}
