use super::NodeId;
use crate::value::Value;
use ahash::HashMap;

/// Per-pass memoization keyed by AST node.
#[derive(Default)]
pub struct NodeCaches {
  /// Instances created by `new` at a call site; re-evaluating the site
  /// reuses the instance so loop passes converge.
  instances: HashMap<NodeId, Value>,
  /// Values of nodes that must evaluate to the same value every time, such
  /// as class declarations.
  values: HashMap<NodeId, Value>,
}

impl NodeCaches {
  pub fn instance(&self, node: NodeId) -> Option<Value> {
    self.instances.get(&node).cloned()
  }

  pub fn store_instance(&mut self, node: NodeId, value: Value) {
    self.instances.insert(node, value);
  }

  pub fn value(&self, node: NodeId) -> Option<Value> {
    self.values.get(&node).cloned()
  }

  pub fn store_value(&mut self, node: NodeId, value: Value) {
    self.values.insert(node, value);
  }
}
