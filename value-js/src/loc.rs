use serde::Deserialize;
use serde::Serialize;
use std::fmt;

/// Byte range in the source text an abstract value or error originated from.
///
/// The parser is not part of this crate, so this is just the pair of offsets
/// it hands us. `Loc::unknown()` is used for values synthesized by the engine
/// itself (e.g. instances generated from a declared type).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Loc(pub usize, pub usize);

impl Loc {
  pub const fn unknown() -> Loc {
    Loc(0, 0)
  }

  pub fn is_unknown(&self) -> bool {
    self.0 == 0 && self.1 == 0
  }

  /// Smallest range covering both. Unknown locations are ignored.
  pub fn add(self, other: Loc) -> Loc {
    if self.is_unknown() {
      return other;
    }
    if other.is_unknown() {
      return self;
    }
    Loc(self.0.min(other.0), self.1.max(other.1))
  }

  pub fn len(&self) -> usize {
    self.1.saturating_sub(self.0)
  }

  pub fn is_empty(&self) -> bool {
    self.1 <= self.0
  }
}

impl fmt::Debug for Loc {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}..{}", self.0, self.1)
  }
}

impl fmt::Display for Loc {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_unknown() {
      f.write_str("<unknown>")
    } else {
      write!(f, "{}..{}", self.0, self.1)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::Loc;

  #[test]
  fn add_ignores_unknown() {
    assert_eq!(Loc::unknown().add(Loc(3, 7)), Loc(3, 7));
    assert_eq!(Loc(3, 7).add(Loc::unknown()), Loc(3, 7));
    assert_eq!(Loc(3, 7).add(Loc(1, 4)), Loc(1, 7));
  }
}
