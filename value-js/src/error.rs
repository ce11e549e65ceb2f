use crate::codes;
use crate::codes::Code;
use crate::loc::Loc;
use std::fmt;

pub type ValueResult<T> = Result<T, ValueError>;

/// Operations of the abstract value contract. Carried by
/// [`ErrorDetail::Unsupported`] so callers can tell which part of the
/// contract a variant refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
  Call,
  Construct,
  EntryPoint,
  GetMember,
  SetMember,
  GetIndex,
  SetIndex,
  LoopForIn,
  LoopForOf,
  Await,
  Cast,
  ChangePrototype,
  ChangeInterface,
  Operator,
}

impl Op {
  pub const fn as_str(&self) -> &'static str {
    match self {
      Op::Call => "calling",
      Op::Construct => "construction",
      Op::EntryPoint => "use as entry point",
      Op::GetMember => "member access",
      Op::SetMember => "member assignment",
      Op::GetIndex => "indexing",
      Op::SetIndex => "index assignment",
      Op::LoopForIn => "for-in iteration",
      Op::LoopForOf => "for-of iteration",
      Op::Await => "await",
      Op::Cast => "casting",
      Op::ChangePrototype => "prototype narrowing",
      Op::ChangeInterface => "interface narrowing",
      Op::Operator => "operators",
    }
  }
}

impl fmt::Display for Op {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  /// Check/Cast mismatch, wrong arity, missing overload, private access.
  Structural,
  /// A variant fell back to the default "unsupported" contract.
  Unsupported,
  /// The engine reached a state that valid input can never produce.
  Internal,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ErrorDetail {
  #[error("{0}")]
  Structural(String),

  #[error("{type_name} does not support {op}")]
  Unsupported { type_name: String, op: Op },

  #[error("internal error: {0}")]
  Internal(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Breadcrumb {
  NeededHere(Loc),
  CalledHere(Loc),
}

impl fmt::Display for Breadcrumb {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Breadcrumb::NeededHere(loc) => write!(f, "Info: needed here ({loc})"),
      Breadcrumb::CalledHere(loc) => write!(f, "Info: called here ({loc})"),
    }
  }
}

/// Error produced by the value engine.
///
/// Errors are returned, never thrown. Each evaluation layer that passes an
/// error through may append a [`Breadcrumb`] so the rendered message reads
/// like a call trace from the failing operation outwards.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{detail}")]
pub struct ValueError {
  pub detail: ErrorDetail,
  pub loc: Loc,
  pub trail: Vec<Breadcrumb>,
}

impl ValueError {
  pub fn new(detail: ErrorDetail, loc: Loc) -> Self {
    Self {
      detail,
      loc,
      trail: Vec::new(),
    }
  }

  pub fn structural(loc: Loc, message: impl Into<String>) -> Self {
    Self::new(ErrorDetail::Structural(message.into()), loc)
  }

  pub fn unsupported(loc: Loc, type_name: impl Into<String>, op: Op) -> Self {
    Self::new(
      ErrorDetail::Unsupported {
        type_name: type_name.into(),
        op,
      },
      loc,
    )
  }

  pub fn internal(loc: Loc, message: impl Into<String>) -> Self {
    Self::new(ErrorDetail::Internal(message.into()), loc)
  }

  pub fn kind(&self) -> ErrorKind {
    match self.detail {
      ErrorDetail::Structural(_) => ErrorKind::Structural,
      ErrorDetail::Unsupported { .. } => ErrorKind::Unsupported,
      ErrorDetail::Internal(_) => ErrorKind::Internal,
    }
  }

  pub fn is_internal(&self) -> bool {
    self.kind() == ErrorKind::Internal
  }

  pub fn needed_here(mut self, loc: Loc) -> Self {
    self.push(Breadcrumb::NeededHere(loc));
    self
  }

  pub fn called_here(mut self, loc: Loc) -> Self {
    self.push(Breadcrumb::CalledHere(loc));
    self
  }

  fn push(&mut self, crumb: Breadcrumb) {
    // Nested blocks that share a location would otherwise repeat themselves.
    if self.trail.last() != Some(&crumb) {
      self.trail.push(crumb);
    }
  }

  pub fn message(&self) -> String {
    self.detail.to_string()
  }

  pub fn code(&self) -> Code {
    codes::code_for(self.kind())
  }

  /// Plain-text rendering with code, location and trail.
  pub fn render(&self) -> String {
    codes::render(self)
  }
}

/// Outcome of a failed entry-point pass.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PassError {
  /// A user-facing error; the pass is abandoned but other entry points are
  /// unaffected.
  #[error("{0}")]
  Reported(ValueError),

  /// An invariant of the engine itself was violated.
  #[error("{0}")]
  Internal(ValueError),
}

impl PassError {
  pub fn error(&self) -> &ValueError {
    match self {
      PassError::Reported(err) | PassError::Internal(err) => err,
    }
  }
}

impl From<ValueError> for PassError {
  fn from(err: ValueError) -> Self {
    if err.is_internal() {
      PassError::Internal(err)
    } else {
      PassError::Reported(err)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn trail_collapses_repeated_crumbs() {
    let err = ValueError::structural(Loc(1, 2), "bad")
      .needed_here(Loc(3, 4))
      .needed_here(Loc(3, 4))
      .called_here(Loc(5, 6));
    assert_eq!(err.trail, vec![
      Breadcrumb::NeededHere(Loc(3, 4)),
      Breadcrumb::CalledHere(Loc(5, 6)),
    ]);
  }

  #[test]
  fn internal_errors_are_classified_separately() {
    let err = ValueError::internal(Loc::unknown(), "empty multi");
    assert!(matches!(PassError::from(err), PassError::Internal(_)));
    let err = ValueError::unsupported(Loc::unknown(), "Void", Op::Call);
    assert_eq!(err.to_string(), "Void does not support calling");
    assert!(matches!(PassError::from(err), PassError::Reported(_)));
  }
}
