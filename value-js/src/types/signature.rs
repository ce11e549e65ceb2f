use super::TypeRef;
use crate::error::ValueError;
use crate::error::ValueResult;
use crate::loc::Loc;
use crate::stack::Stack;
use crate::value::Value;
use itertools::Itertools;

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
  pub name: String,
  pub ty: TypeRef,
  pub optional: bool,
  pub rest: bool,
}

impl Param {
  pub fn required(name: impl Into<String>, ty: TypeRef) -> Self {
    Self {
      name: name.into(),
      ty,
      optional: false,
      rest: false,
    }
  }

  pub fn optional(name: impl Into<String>, ty: TypeRef) -> Self {
    Self {
      name: name.into(),
      ty,
      optional: true,
      rest: false,
    }
  }

  pub fn rest(name: impl Into<String>, ty: TypeRef) -> Self {
    Self {
      name: name.into(),
      ty,
      optional: true,
      rest: true,
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Signature {
  pub params: Vec<Param>,
  pub ret: TypeRef,
}

impl Signature {
  pub fn new(params: Vec<Param>, ret: TypeRef) -> Self {
    Self { params, ret }
  }

  pub fn required_params(&self) -> usize {
    self
      .params
      .iter()
      .filter(|p| !p.optional && !p.rest)
      .count()
  }

  pub fn has_rest(&self) -> bool {
    self.params.last().is_some_and(|p| p.rest)
  }

  pub fn accepts_count(&self, count: usize) -> bool {
    count >= self.required_params() && (self.has_rest() || count <= self.params.len())
  }

  fn param_for(&self, idx: usize) -> Option<&Param> {
    self
      .params
      .get(idx)
      .or_else(|| self.params.last().filter(|p| p.rest))
  }

  pub fn describe(&self) -> String {
    let params = self
      .params
      .iter()
      .map(|p| {
        let prefix = if p.rest { "..." } else { "" };
        let suffix = if p.optional && !p.rest { "?" } else { "" };
        format!("{prefix}{}{suffix}: {}", p.name, p.ty)
      })
      .join(", ");
    format!("({params}) => {}", self.ret)
  }

  /// Arity and per-argument type check.
  pub fn check_args(
    &self,
    stack: &dyn Stack,
    this: Option<&Value>,
    args: &[Value],
    loc: Loc,
  ) -> ValueResult<()> {
    if !self.accepts_count(args.len()) {
      let expected = if self.has_rest() {
        format!("at least {}", self.required_params())
      } else if self.required_params() == self.params.len() {
        format!("{}", self.params.len())
      } else {
        format!("{} to {}", self.required_params(), self.params.len())
      };
      return Err(ValueError::structural(
        loc,
        format!("expected {expected} argument(s), got {}", args.len()),
      ));
    }
    for (idx, arg) in args.iter().enumerate() {
      let Some(param) = self.param_for(idx) else {
        break;
      };
      param
        .ty
        .check(stack, arg, this, arg.context())
        .map_err(|err| err.needed_here(loc))?;
    }
    Ok(())
  }
}

/// Pick the first overload accepting `args`. When none do, the error lists
/// why each candidate was rejected.
pub fn resolve_overload<'a>(
  name: &str,
  overloads: &'a [Signature],
  stack: &dyn Stack,
  this: Option<&Value>,
  args: &[Value],
  loc: Loc,
) -> ValueResult<&'a Signature> {
  if let [only] = overloads {
    only.check_args(stack, this, args, loc)?;
    return Ok(only);
  }
  let mut reasons = Vec::new();
  for sig in overloads {
    match sig.check_args(stack, this, args, loc) {
      Ok(()) => return Ok(sig),
      Err(err) if err.is_internal() => return Err(err),
      Err(err) => reasons.push(format!("  {}: {}", sig.describe(), err.message())),
    }
  }
  Err(ValueError::structural(
    loc,
    format!(
      "no overload of {name} accepts {} argument(s) of these types:\n{}",
      args.len(),
      reasons.join("\n")
    ),
  ))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn arity_accounts_for_optional_and_rest() {
    let sig = Signature::new(
      vec![
        Param::required("a", TypeRef::Any),
        Param::optional("b", TypeRef::Any),
      ],
      TypeRef::Void,
    );
    assert!(!sig.accepts_count(0));
    assert!(sig.accepts_count(1));
    assert!(sig.accepts_count(2));
    assert!(!sig.accepts_count(3));

    let variadic = Signature::new(vec![Param::rest("xs", TypeRef::Any)], TypeRef::Void);
    assert!(variadic.accepts_count(0));
    assert!(variadic.accepts_count(9));
  }

  #[test]
  fn describe_is_readable() {
    let sig = Signature::new(
      vec![
        Param::required("s", TypeRef::named("String")),
        Param::optional("n", TypeRef::named("Int")),
      ],
      TypeRef::named("Boolean"),
    );
    assert_eq!(sig.describe(), "(s: String, n?: Int) => Boolean");
  }
}
