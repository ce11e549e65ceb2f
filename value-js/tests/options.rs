use std::sync::Arc;

use value_js::eval::ast::Expr;
use value_js::eval::ast::FunctionDecl;
use value_js::eval::ast::Stmt;
use value_js::stack::CallableId;
use value_js::stack::VarId;
use value_js::{Engine, EvalOptions, Loc, PassError, Program, Registry};

#[test]
fn options_deserialize_from_camel_case() {
  let options: EvalOptions =
    serde_json::from_str(r#"{"privatePrefix": "_", "maxCallDepth": 8}"#).unwrap();
  assert_eq!(options.private_prefix, "_");
  assert_eq!(options.max_call_depth, 8);
  // Missing fields keep their defaults.
  assert_eq!(options.loop_passes, EvalOptions::default().loop_passes);
}

#[test]
fn options_round_trip_through_json() {
  let options = EvalOptions {
    loop_passes: 5,
    ..EvalOptions::default()
  };
  let json = serde_json::to_value(&options).unwrap();
  assert_eq!(json["loopPasses"], 5);
  assert_eq!(json["privatePrefix"], "#");
  let back: EvalOptions = serde_json::from_value(json).unwrap();
  assert_eq!(back, options);
}

/// A chain of distinct functions `f0 -> f1 -> ... -> f{n-1}`, none of them
/// recursive, called from the top level.
fn call_chain(n: u32) -> Program {
  let call = |i: u32| Expr::Call {
    callee: Box::new(Expr::Var {
      var: VarId(i),
      name: format!("f{i}"),
      loc: Loc(1, 2),
    }),
    args: Vec::new(),
    loc: Loc(1, 3),
  };
  let mut body: Vec<Stmt> = (0..n)
    .map(|i| {
      let inner = if i + 1 < n {
        vec![Stmt::Return(Some(call(i + 1)), Loc(1, 4))]
      } else {
        Vec::new()
      };
      Stmt::Function(Arc::new(FunctionDecl {
        id: CallableId(i),
        var: Some(VarId(i)),
        name: format!("f{i}"),
        params: Vec::new(),
        ret: None,
        body: inner,
        is_async: false,
        loc: Loc(1, 5),
      }))
    })
    .collect();
  body.push(Stmt::Return(Some(call(0)), Loc(1, 6)));
  Program { body, entry: None }
}

#[test]
fn call_depth_limit_is_an_internal_error() {
  let options = EvalOptions {
    max_call_depth: 4,
    ..EvalOptions::default()
  };
  let engine = Engine::new(Arc::new(Registry::with_core_options(options)));

  let shallow = engine.evaluate(&call_chain(3), None).unwrap();
  assert_eq!(shallow.result_type, "void");

  let err = engine.evaluate(&call_chain(10), None).unwrap_err();
  assert!(matches!(err, PassError::Internal(_)), "{err:?}");
}
