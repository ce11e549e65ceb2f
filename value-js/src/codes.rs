//! Registry of diagnostic codes emitted by the value engine.
//!
//! Every [`ValueError`] maps to exactly one [`Code`] through its
//! [`ErrorKind`]. [`render`] turns an error into the plain-text form used by
//! the build pipeline's reporter.

use crate::error::ErrorKind;
use crate::error::ValueError;
use std::fmt::Write;

/// Metadata describing a diagnostic code.
#[derive(Clone, Copy, Debug)]
pub struct Code {
  /// Stable string identifier, e.g. `VAL0001`.
  pub id: &'static str,
  /// Short description of what the diagnostic reports.
  pub description: &'static str,
  /// Whether the diagnostic should be shown to users.
  pub user_facing: bool,
}

impl Code {
  pub const fn new(id: &'static str, description: &'static str, user_facing: bool) -> Self {
    Code {
      id,
      description,
      user_facing,
    }
  }

  pub const fn as_str(&self) -> &'static str {
    self.id
  }
}

/// VAL0001: A value does not satisfy a declared contract.
///
/// Covers failed casts, failed interface checks, wrong argument counts, no
/// matching overload and private member access from outside the class.
pub const STRUCTURAL_TYPE: Code = Code::new("VAL0001", "structural type error", true);

/// VAL0002: A value variant does not implement the requested operation.
pub const UNSUPPORTED_OPERATION: Code = Code::new("VAL0002", "unsupported operation", true);

/// ICE0001: The engine reached an impossible state.
pub const INTERNAL_INVARIANT: Code = Code::new("ICE0001", "internal invariant violation", false);

pub fn code_for(kind: ErrorKind) -> Code {
  match kind {
    ErrorKind::Structural => STRUCTURAL_TYPE,
    ErrorKind::Unsupported => UNSUPPORTED_OPERATION,
    ErrorKind::Internal => INTERNAL_INVARIANT,
  }
}

/// Render an error with its code, location and breadcrumb trail.
pub fn render(err: &ValueError) -> String {
  let code = code_for(err.kind());
  let mut out = format!("error[{}]: {}\n  --> {}", code.id, err.detail, err.loc);
  for crumb in &err.trail {
    // Writing into a String cannot fail.
    let _ = write!(out, "\n  {crumb}");
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::loc::Loc;

  #[test]
  fn render_includes_code_and_trail() {
    let err = ValueError::structural(Loc(4, 9), "expected String, got Int")
      .needed_here(Loc(2, 12))
      .called_here(Loc(0, 20));
    let rendered = render(&err);
    assert!(rendered.starts_with("error[VAL0001]: expected String, got Int"));
    assert!(rendered.contains("--> 4..9"));
    assert!(rendered.contains("Info: needed here (2..12)"));
    assert!(rendered.ends_with("Info: called here (0..20)"));
  }

  #[test]
  fn internal_code_is_not_user_facing() {
    assert!(!code_for(ErrorKind::Internal).user_facing);
    assert_eq!(code_for(ErrorKind::Unsupported).as_str(), "VAL0002");
  }
}
