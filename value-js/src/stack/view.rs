use super::Stack;
use crate::error::ValueResult;
use crate::loc::Loc;
use crate::value::Value;

/// Page-specific type information supplied by the template layer.
///
/// Scripts embedded in a template can refer to template variables, to
/// elements by id and to definitions made in markup. The engine does not
/// know about markup; it asks this interface instead. Evaluation without a
/// view treats every such reference as an error.
pub trait ViewInterface {
  /// Instance standing in for a template variable.
  fn get_var_type_instance(&self, stack: &dyn Stack, name: &str, loc: Loc) -> ValueResult<Value>;

  /// Instance standing in for the element with the given id.
  fn get_elem_type_instance(&self, stack: &dyn Stack, id: &str, loc: Loc) -> ValueResult<Value>;

  /// Instance standing in for a definition made in markup.
  fn get_def_type_instance(&self, stack: &dyn Stack, name: &str, loc: Loc) -> ValueResult<Value>;

  fn get_url(&self, loc: Loc) -> ValueResult<String>;

  fn get_html(&self, loc: Loc) -> ValueResult<String>;

  /// Names of the states an element can be in.
  fn get_elem_states(&self, id: &str, loc: Loc) -> ValueResult<Vec<String>>;

  fn is_elem(&self, id: &str) -> bool;
}
