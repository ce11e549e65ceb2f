use serde::Deserialize;
use serde::Serialize;

/// Options that influence evaluation.
///
/// Carried by the [`crate::Registry`] so they are injected together with the
/// type library and shared read-only by every pass.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct EvalOptions {
  /// Member names starting with this prefix are private to their class (and
  /// its relatives). Empty disables privacy checks.
  pub private_prefix: String,
  /// Nesting limit for calls. Exceeding it aborts the pass as an internal
  /// error; the recursion guard should make it unreachable.
  pub max_call_depth: usize,
  /// Number of times a loop body is evaluated, joining the back edge after
  /// each pass.
  pub loop_passes: usize,
}

impl Default for EvalOptions {
  fn default() -> Self {
    Self {
      private_prefix: "#".to_string(),
      max_call_depth: 256,
      loop_passes: 2,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::EvalOptions;

  #[test]
  fn defaults() {
    let options = EvalOptions::default();
    assert_eq!(options.private_prefix, "#");
    assert_eq!(options.max_call_depth, 256);
    assert_eq!(options.loop_passes, 2);
  }
}
