use super::FrameId;
use super::NodeCaches;
use super::RecursionGuard;
use super::Stack;
use super::StackRef;
use super::VarId;
use super::ViewInterface;
use crate::error::ValueError;
use crate::error::ValueResult;
use crate::loc::Loc;
use crate::registry::Registry;
use crate::types::Interface;
use crate::types::ProtoRef;
use crate::value::function::Closure;
use crate::value::Value;
use ahash::HashMap;
use std::cell::Cell;
use std::cell::RefCell;
use std::cell::RefMut;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::rc::Weak;
use std::sync::Arc;

fn undeclared(var: VarId, loc: Loc) -> ValueError {
  ValueError::structural(loc, format!("assignment to undeclared variable #{}", var.0))
}

fn join_slot(slot: &RefCell<Option<Value>>, value: Value) {
  let mut slot = slot.borrow_mut();
  *slot = Some(match slot.take() {
    Some(prev) => prev.join(&value),
    None => value,
  });
}

/// Bottom of every frame chain. Owns pass-wide state.
pub struct RootStack {
  registry: Arc<Registry>,
  view: RefCell<Option<Rc<dyn ViewInterface>>>,
  bindings: RefCell<HashMap<VarId, Value>>,
  ret: RefCell<Option<Value>>,
  guard: RefCell<RecursionGuard>,
  caches: RefCell<NodeCaches>,
  /// Prototypes and contracts declared by the evaluated program.
  types: RefCell<HashMap<String, Interface>>,
  /// Frames classes were declared in; their methods close over them.
  class_scopes: RefCell<HashMap<String, Weak<dyn Stack>>>,
  /// Every value-holding frame and closure of the pass, released together
  /// at its end.
  frames: RefCell<Vec<Weak<dyn Stack>>>,
  closures: RefCell<Vec<Weak<Closure>>>,
  next_frame: Cell<u32>,
}

impl RootStack {
  pub fn new(registry: Arc<Registry>, view: Option<Rc<dyn ViewInterface>>) -> RootStack {
    RootStack {
      registry,
      view: RefCell::new(view),
      bindings: RefCell::default(),
      ret: RefCell::default(),
      guard: RefCell::default(),
      caches: RefCell::default(),
      types: RefCell::default(),
      class_scopes: RefCell::default(),
      frames: RefCell::default(),
      closures: RefCell::default(),
      next_frame: Cell::new(1),
    }
  }

  pub fn registry(&self) -> &Registry {
    &self.registry
  }

  pub fn next_frame_id(&self) -> FrameId {
    let id = self.next_frame.get();
    self.next_frame.set(id + 1);
    FrameId(id)
  }

  pub fn guard(&self) -> RefMut<'_, RecursionGuard> {
    self.guard.borrow_mut()
  }

  pub fn caches(&self) -> RefMut<'_, NodeCaches> {
    self.caches.borrow_mut()
  }

  /// Program declarations shadow the registry.
  pub fn lookup_interface(&self, name: &str) -> Option<Interface> {
    if let Some(iface) = self.types.borrow().get(name) {
      return Some(iface.clone());
    }
    self.registry.interface(name)
  }

  pub fn declare_type(&self, iface: Interface) {
    self
      .types
      .borrow_mut()
      .insert(iface.name().to_string(), iface);
  }

  pub fn set_class_scope(&self, name: &str, scope: &StackRef) {
    self
      .class_scopes
      .borrow_mut()
      .insert(name.to_string(), Rc::downgrade(scope));
  }

  pub fn class_scope(&self, name: &str) -> Option<StackRef> {
    self
      .class_scopes
      .borrow()
      .get(name)
      .and_then(|scope| scope.upgrade())
  }

  /// Register a frame for [`RootStack::release_pass`].
  pub fn track(&self, frame: &StackRef) {
    let mut frames = self.frames.borrow_mut();
    if frames.len() >= 64 && frames.len().is_power_of_two() {
      frames.retain(|f| f.strong_count() > 0);
    }
    frames.push(Rc::downgrade(frame));
  }

  pub fn track_closure(&self, closure: &Rc<Closure>) {
    let mut closures = self.closures.borrow_mut();
    if closures.len() >= 64 && closures.len().is_power_of_two() {
      closures.retain(|c| c.strong_count() > 0);
    }
    closures.push(Rc::downgrade(closure));
  }

  /// End of the pass. Closures keep their lexical frames and receivers
  /// alive and frames keep the closures bound in them, so every tracked
  /// frame and closure is emptied to let the pass's values drop.
  pub fn release_pass(&self) {
    let closures = std::mem::take(&mut *self.closures.borrow_mut());
    for closure in closures.iter().filter_map(Weak::upgrade) {
      closure.release();
    }
    let frames = std::mem::take(&mut *self.frames.borrow_mut());
    for frame in frames.iter().filter_map(Weak::upgrade) {
      frame.release();
    }
    let bindings = std::mem::take(&mut *self.bindings.borrow_mut());
    let ret = self.ret.borrow_mut().take();
    let guard = std::mem::take(&mut *self.guard.borrow_mut());
    let caches = std::mem::take(&mut *self.caches.borrow_mut());
    self.class_scopes.borrow_mut().clear();
    self.view.borrow_mut().take();
    drop((bindings, ret, guard, caches));
  }
}

impl Stack for RootStack {
  fn frame_id(&self) -> FrameId {
    FrameId(0)
  }

  fn parent(&self) -> Option<StackRef> {
    None
  }

  fn root(&self) -> &RootStack {
    self
  }

  fn get_value(&self, var: VarId) -> Option<Value> {
    self.bindings.borrow().get(&var).cloned()
  }

  fn set_value(&self, var: VarId, value: Value, loc: Loc) -> ValueResult<()> {
    let mut bindings = self.bindings.borrow_mut();
    match bindings.get_mut(&var) {
      Some(slot) => {
        *slot = value;
        Ok(())
      }
      None => Err(undeclared(var, loc)),
    }
  }

  fn declare(&self, var: VarId, value: Value) {
    self.bindings.borrow_mut().insert(var, value);
  }

  fn get_return(&self) -> Option<Value> {
    self.ret.borrow().clone()
  }

  fn set_return(&self, value: Value) {
    join_slot(&self.ret, value);
  }

  fn this_value(&self) -> Option<Value> {
    None
  }

  fn private_context(&self) -> Option<ProtoRef> {
    None
  }

  fn view_interface(&self) -> Option<Rc<dyn ViewInterface>> {
    self.view.borrow().clone()
  }

  fn call_depth(&self) -> usize {
    0
  }
}

/// State of an owning frame.
struct Frame {
  id: FrameId,
  bindings: RefCell<HashMap<VarId, Value>>,
  ret: RefCell<Option<Value>>,
  this: RefCell<Option<Value>>,
  class_ctx: Option<ProtoRef>,
}

impl Frame {
  fn new(id: FrameId, this: Option<Value>, class_ctx: Option<ProtoRef>) -> Frame {
    Frame {
      id,
      bindings: RefCell::default(),
      ret: RefCell::default(),
      this: RefCell::new(this),
      class_ctx,
    }
  }

  fn get(&self, var: VarId) -> Option<Value> {
    self.bindings.borrow().get(&var).cloned()
  }

  /// False if the binding is not owned by this frame.
  fn set(&self, var: VarId, value: Value) -> bool {
    match self.bindings.borrow_mut().get_mut(&var) {
      Some(slot) => {
        *slot = value;
        true
      }
      None => false,
    }
  }

  fn declare(&self, var: VarId, value: Value) {
    self.bindings.borrow_mut().insert(var, value);
  }

  fn release(&self) {
    let bindings = std::mem::take(&mut *self.bindings.borrow_mut());
    let ret = self.ret.borrow_mut().take();
    let this = self.this.borrow_mut().take();
    drop((bindings, ret, this));
  }
}

/// Owning frame for a top-level program body.
pub struct FunctionStack {
  frame: Frame,
  parent: StackRef,
}

impl FunctionStack {
  pub fn new(parent: StackRef, this: Option<Value>, class_ctx: Option<ProtoRef>) -> FunctionStack {
    let id = parent.root().next_frame_id();
    FunctionStack {
      frame: Frame::new(id, this, class_ctx),
      parent,
    }
  }
}

impl Stack for FunctionStack {
  fn frame_id(&self) -> FrameId {
    self.frame.id
  }

  fn parent(&self) -> Option<StackRef> {
    Some(self.parent.clone())
  }

  fn root(&self) -> &RootStack {
    self.parent.root()
  }

  fn get_value(&self, var: VarId) -> Option<Value> {
    self.frame.get(var).or_else(|| self.parent.get_value(var))
  }

  fn set_value(&self, var: VarId, value: Value, loc: Loc) -> ValueResult<()> {
    if self.frame.set(var, value.clone()) {
      return Ok(());
    }
    self.parent.set_value(var, value, loc)
  }

  fn declare(&self, var: VarId, value: Value) {
    self.frame.declare(var, value);
  }

  fn get_return(&self) -> Option<Value> {
    self.frame.ret.borrow().clone()
  }

  fn set_return(&self, value: Value) {
    join_slot(&self.frame.ret, value);
  }

  fn this_value(&self) -> Option<Value> {
    self.frame.this.borrow().clone()
  }

  fn release(&self) {
    self.frame.release();
  }

  fn private_context(&self) -> Option<ProtoRef> {
    self.frame.class_ctx.clone()
  }

  fn view_interface(&self) -> Option<Rc<dyn ViewInterface>> {
    self.parent.view_interface()
  }

  fn call_depth(&self) -> usize {
    self.parent.call_depth()
  }
}

/// Non-owning block scope; every query goes to the parent.
pub struct BlockStack {
  id: FrameId,
  parent: StackRef,
}

impl BlockStack {
  pub fn new(parent: StackRef) -> BlockStack {
    BlockStack {
      id: parent.root().next_frame_id(),
      parent,
    }
  }
}

impl Stack for BlockStack {
  fn frame_id(&self) -> FrameId {
    self.id
  }

  fn parent(&self) -> Option<StackRef> {
    Some(self.parent.clone())
  }

  fn root(&self) -> &RootStack {
    self.parent.root()
  }

  fn get_value(&self, var: VarId) -> Option<Value> {
    self.parent.get_value(var)
  }

  fn set_value(&self, var: VarId, value: Value, loc: Loc) -> ValueResult<()> {
    self.parent.set_value(var, value, loc)
  }

  fn declare(&self, var: VarId, value: Value) {
    self.parent.declare(var, value);
  }

  fn get_return(&self) -> Option<Value> {
    self.parent.get_return()
  }

  fn set_return(&self, value: Value) {
    self.parent.set_return(value);
  }

  fn this_value(&self) -> Option<Value> {
    self.parent.this_value()
  }

  fn private_context(&self) -> Option<ProtoRef> {
    self.parent.private_context()
  }

  fn view_interface(&self) -> Option<Rc<dyn ViewInterface>> {
    self.parent.view_interface()
  }

  fn call_depth(&self) -> usize {
    self.parent.call_depth()
  }
}

/// One arm of a conditional or one loop pass. Declarations stay local;
/// assignments to outer bindings are recorded instead of applied, so the
/// caller can join them with the other arm at the reconvergence point.
pub struct BranchStack {
  id: FrameId,
  parent: StackRef,
  locals: RefCell<HashMap<VarId, Value>>,
  writes: RefCell<BTreeMap<VarId, Value>>,
  /// Flow facts (type guards) that hold in this arm only.
  narrowed: RefCell<HashMap<VarId, Value>>,
  /// Set once the arm has been joined. Closures created in the arm may
  /// still run; their writes then go straight to the parent.
  closed: Cell<bool>,
}

impl BranchStack {
  pub fn new(parent: StackRef) -> BranchStack {
    BranchStack {
      id: parent.root().next_frame_id(),
      parent,
      locals: RefCell::default(),
      writes: RefCell::default(),
      narrowed: RefCell::default(),
      closed: Cell::new(false),
    }
  }

  /// Rebind `var` for this arm without counting it as a write.
  pub fn narrow(&self, var: VarId, value: Value) {
    self.narrowed.borrow_mut().insert(var, value);
  }

  /// Writes made by the arm, for joining. Closes the arm.
  pub fn take_writes(&self) -> BTreeMap<VarId, Value> {
    self.closed.set(true);
    self.narrowed.borrow_mut().clear();
    std::mem::take(&mut *self.writes.borrow_mut())
  }

  pub fn is_closed(&self) -> bool {
    self.closed.get()
  }
}

impl Stack for BranchStack {
  fn frame_id(&self) -> FrameId {
    self.id
  }

  fn parent(&self) -> Option<StackRef> {
    Some(self.parent.clone())
  }

  fn root(&self) -> &RootStack {
    self.parent.root()
  }

  fn get_value(&self, var: VarId) -> Option<Value> {
    if let Some(v) = self.locals.borrow().get(&var) {
      return Some(v.clone());
    }
    if let Some(v) = self.writes.borrow().get(&var) {
      return Some(v.clone());
    }
    if let Some(v) = self.narrowed.borrow().get(&var) {
      return Some(v.clone());
    }
    self.parent.get_value(var)
  }

  fn set_value(&self, var: VarId, value: Value, loc: Loc) -> ValueResult<()> {
    if let Some(slot) = self.locals.borrow_mut().get_mut(&var) {
      *slot = value;
      return Ok(());
    }
    if self.closed.get() {
      return self.parent.set_value(var, value, loc);
    }
    if self.get_value(var).is_none() {
      return Err(undeclared(var, loc));
    }
    self.narrowed.borrow_mut().remove(&var);
    self.writes.borrow_mut().insert(var, value);
    Ok(())
  }

  fn declare(&self, var: VarId, value: Value) {
    self.locals.borrow_mut().insert(var, value);
  }

  fn get_return(&self) -> Option<Value> {
    self.parent.get_return()
  }

  fn set_return(&self, value: Value) {
    self.parent.set_return(value);
  }

  fn this_value(&self) -> Option<Value> {
    self.parent.this_value()
  }

  fn private_context(&self) -> Option<ProtoRef> {
    self.parent.private_context()
  }

  fn view_interface(&self) -> Option<Rc<dyn ViewInterface>> {
    self.parent.view_interface()
  }

  fn call_depth(&self) -> usize {
    self.parent.call_depth()
  }

  fn release(&self) {
    self.closed.set(true);
    let locals = std::mem::take(&mut *self.locals.borrow_mut());
    let writes = std::mem::take(&mut *self.writes.borrow_mut());
    let narrowed = std::mem::take(&mut *self.narrowed.borrow_mut());
    drop((locals, writes, narrowed));
  }
}

/// Frame of a function invocation. Bindings and the return slot are its
/// own; unresolved bindings go to the function's lexical frame, ambient
/// queries (view, call depth) to the caller.
pub struct CallStack {
  frame: Frame,
  lexical: StackRef,
  caller: StackRef,
  depth: usize,
}

impl CallStack {
  pub fn new(
    lexical: StackRef,
    caller: StackRef,
    this: Option<Value>,
    class_ctx: Option<ProtoRef>,
  ) -> CallStack {
    let id = caller.root().next_frame_id();
    let depth = caller.call_depth() + 1;
    CallStack {
      frame: Frame::new(id, this, class_ctx),
      lexical,
      caller,
      depth,
    }
  }

  pub fn caller(&self) -> &StackRef {
    &self.caller
  }
}

impl Stack for CallStack {
  fn frame_id(&self) -> FrameId {
    self.frame.id
  }

  fn parent(&self) -> Option<StackRef> {
    Some(self.lexical.clone())
  }

  fn root(&self) -> &RootStack {
    self.lexical.root()
  }

  fn get_value(&self, var: VarId) -> Option<Value> {
    self.frame.get(var).or_else(|| self.lexical.get_value(var))
  }

  fn set_value(&self, var: VarId, value: Value, loc: Loc) -> ValueResult<()> {
    if self.frame.set(var, value.clone()) {
      return Ok(());
    }
    self.lexical.set_value(var, value, loc)
  }

  fn declare(&self, var: VarId, value: Value) {
    self.frame.declare(var, value);
  }

  fn get_return(&self) -> Option<Value> {
    self.frame.ret.borrow().clone()
  }

  fn set_return(&self, value: Value) {
    join_slot(&self.frame.ret, value);
  }

  fn this_value(&self) -> Option<Value> {
    self.frame.this.borrow().clone()
  }

  fn release(&self) {
    self.frame.release();
  }

  fn private_context(&self) -> Option<ProtoRef> {
    self.frame.class_ctx.clone()
  }

  fn view_interface(&self) -> Option<Rc<dyn ViewInterface>> {
    self.caller.view_interface()
  }

  fn call_depth(&self) -> usize {
    self.depth
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::builtins;
  use crate::eval::ast::FunctionDecl;
  use crate::stack::CallableId;
  use crate::value::Function;

  fn int(registry: &Registry, v: i64) -> Value {
    builtins::new_int(registry, Some(v), Loc::unknown()).unwrap()
  }

  #[test]
  fn closed_branch_writes_through_to_parent() {
    let registry = Arc::new(Registry::with_core());
    let root: StackRef = Rc::new(RootStack::new(registry.clone(), None));
    let frame: StackRef = Rc::new(FunctionStack::new(root, None, None));
    let x = VarId(1);
    frame.declare(x, int(&registry, 1));

    let arm = BranchStack::new(frame.clone());
    arm.set_value(x, int(&registry, 2), Loc::unknown()).unwrap();
    assert_eq!(frame.get_value(x).unwrap().literal_int(), Some(1));
    let writes = arm.take_writes();
    assert_eq!(writes[&x].literal_int(), Some(2));

    assert!(arm.is_closed());
    arm.set_value(x, int(&registry, 3), Loc::unknown()).unwrap();
    assert_eq!(frame.get_value(x).unwrap().literal_int(), Some(3));
    assert_eq!(arm.get_value(x).unwrap().literal_int(), Some(3));
  }

  #[test]
  fn released_pass_frees_frames_bound_to_their_closures() {
    let registry = Arc::new(Registry::with_core());
    let root = Rc::new(RootStack::new(registry, None));
    let frame: StackRef = Rc::new(FunctionStack::new(root.clone(), None, None));
    root.track(&frame);
    let decl = Arc::new(FunctionDecl {
      id: CallableId(1),
      var: Some(VarId(1)),
      name: "f".to_string(),
      params: Vec::new(),
      ret: None,
      body: Vec::new(),
      is_async: false,
      loc: Loc::unknown(),
    });
    let f = Function::closure(&*frame, decl, Some(frame.clone()), None, None, Loc::unknown());
    frame.declare(VarId(1), Value::Function(f));

    let weak = Rc::downgrade(&frame);
    drop(frame);
    assert!(weak.upgrade().is_some());
    root.release_pass();
    assert!(weak.upgrade().is_none());
  }
}
