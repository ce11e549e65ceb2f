use std::cell::Cell;
use std::sync::Arc;

use value_js::eval::ast::AssignTarget;
use value_js::eval::ast::BinOp;
use value_js::eval::ast::ClassDecl;
use value_js::eval::ast::Expr;
use value_js::eval::ast::FieldDecl;
use value_js::eval::ast::FunctionDecl;
use value_js::eval::ast::InterfaceDecl;
use value_js::eval::ast::InterfaceMember;
use value_js::eval::ast::Lit;
use value_js::eval::ast::ParamDecl;
use value_js::eval::ast::Stmt;
use value_js::eval::ast::UnOp;
use value_js::stack::CallableId;
use value_js::stack::NodeId;
use value_js::stack::VarId;
use value_js::types::Signature;
use value_js::types::TypeRef;
use value_js::{Engine, EvalOptions, Loc, PassError, PassSummary, Program, Registry};

/// Hands out fresh ids and distinct source locations.
#[derive(Default)]
struct Builder {
  next: Cell<u32>,
}

impl Builder {
  fn id(&self) -> u32 {
    let id = self.next.get() + 1;
    self.next.set(id);
    id
  }

  fn loc(&self) -> Loc {
    let at = self.id() as usize * 10;
    Loc(at, at + 5)
  }

  fn int(&self, v: i64) -> Expr {
    Expr::Lit(Lit::Int(v), self.loc())
  }

  fn string(&self, v: &str) -> Expr {
    Expr::Lit(Lit::String(v.to_string()), self.loc())
  }

  fn var(&self, var: VarId, name: &str) -> Expr {
    Expr::Var {
      var,
      name: name.to_string(),
      loc: self.loc(),
    }
  }

  fn this(&self) -> Expr {
    Expr::This(self.loc())
  }

  fn member(&self, object: Expr, key: &str) -> Expr {
    Expr::Member {
      object: Box::new(object),
      key: key.to_string(),
      loc: self.loc(),
    }
  }

  fn call(&self, callee: Expr, args: Vec<Expr>) -> Expr {
    Expr::Call {
      callee: Box::new(callee),
      args,
      loc: self.loc(),
    }
  }

  fn new(&self, class: Expr, args: Vec<Expr>) -> Expr {
    Expr::New {
      node: NodeId(self.id()),
      class: Box::new(class),
      args,
      loc: self.loc(),
    }
  }

  fn binary(&self, op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
      op,
      left: Box::new(left),
      right: Box::new(right),
      loc: self.loc(),
    }
  }

  fn instance_of(&self, value: Expr, class: &str) -> Expr {
    Expr::InstanceOf {
      value: Box::new(value),
      class: class.to_string(),
      loc: self.loc(),
    }
  }

  fn not(&self, operand: Expr) -> Expr {
    Expr::Unary {
      op: UnOp::Not,
      operand: Box::new(operand),
      loc: self.loc(),
    }
  }

  fn let_(&self, var: VarId, ty: Option<TypeRef>, init: Option<Expr>) -> Stmt {
    Stmt::Let {
      var,
      name: format!("v{}", var.0),
      ty,
      init,
      loc: self.loc(),
    }
  }

  fn assign(&self, var: VarId, value: Expr) -> Stmt {
    Stmt::Assign {
      target: AssignTarget::Var {
        var,
        name: format!("v{}", var.0),
      },
      value,
      loc: self.loc(),
    }
  }

  fn set(&self, object: Expr, key: &str, value: Expr) -> Stmt {
    Stmt::Assign {
      target: AssignTarget::Member {
        object,
        key: key.to_string(),
      },
      value,
      loc: self.loc(),
    }
  }

  fn ret(&self, value: Expr) -> Stmt {
    Stmt::Return(Some(value), self.loc())
  }

  fn param(&self, var: VarId, ty: Option<TypeRef>) -> ParamDecl {
    ParamDecl {
      var,
      name: format!("p{}", var.0),
      ty,
      optional: false,
    }
  }

  fn func(&self, var: Option<VarId>, name: &str, params: Vec<ParamDecl>, body: Vec<Stmt>) -> Arc<FunctionDecl> {
    Arc::new(FunctionDecl {
      id: CallableId(self.id()),
      var,
      name: name.to_string(),
      params,
      ret: None,
      body,
      is_async: false,
      loc: self.loc(),
    })
  }

  fn class(&self, var: VarId, name: &str, extends: Option<&str>) -> ClassDecl {
    ClassDecl {
      node: NodeId(self.id()),
      var,
      name: name.to_string(),
      extends: extends.map(String::from),
      implements: Vec::new(),
      universal: true,
      is_abstract: false,
      fields: Vec::new(),
      constructor: None,
      methods: Vec::new(),
      statics: Vec::new(),
      loc: self.loc(),
    }
  }
}

fn engine() -> Engine {
  Engine::new(Arc::new(Registry::with_core()))
}

fn run(body: Vec<Stmt>) -> Result<PassSummary, PassError> {
  engine().evaluate(&Program { body, entry: None }, None)
}

#[test]
fn branches_with_the_same_literal_keep_it() {
  let b = Builder::default();
  let x = VarId(1);
  let flag = VarId(2);
  let summary = run(vec![
    b.let_(x, None, Some(b.int(0))),
    b.let_(flag, Some(TypeRef::named("Boolean")), None),
    Stmt::If {
      test: b.var(flag, "flag"),
      then: vec![b.assign(x, b.int(5))],
      otherwise: Some(vec![b.assign(x, b.int(5))]),
      loc: b.loc(),
    },
    b.ret(b.var(x, "x")),
  ])
  .unwrap();
  assert_eq!(summary.result_type, "Int");
  assert_eq!(summary.literal.as_deref(), Some("5"));
}

#[test]
fn branches_with_different_strings_lose_the_literal() {
  let b = Builder::default();
  let x = VarId(1);
  let flag = VarId(2);
  let summary = run(vec![
    b.let_(x, None, Some(b.string(""))),
    b.let_(flag, Some(TypeRef::named("Boolean")), None),
    Stmt::If {
      test: b.var(flag, "flag"),
      then: vec![b.assign(x, b.string("a"))],
      otherwise: Some(vec![b.assign(x, b.string("b"))]),
      loc: b.loc(),
    },
    b.ret(b.var(x, "x")),
  ])
  .unwrap();
  assert_eq!(summary.result_type, "String");
  assert_eq!(summary.literal, None);
}

#[test]
fn string_concatenation_folds() {
  let b = Builder::default();
  let summary = run(vec![b.ret(b.binary(BinOp::Add, b.string("n="), b.int(3)))]).unwrap();
  assert_eq!(summary.literal.as_deref(), Some("n=3"));
}

#[test]
fn self_recursion_terminates() {
  let b = Builder::default();
  let f = VarId(1);
  let n = VarId(2);
  let decl = b.func(
    Some(f),
    "f",
    vec![b.param(n, Some(TypeRef::named("Int")))],
    vec![b.ret(b.call(
      b.var(f, "f"),
      vec![b.binary(BinOp::Sub, b.var(n, "n"), b.int(1))],
    ))],
  );
  let summary = run(vec![
    Stmt::Function(decl),
    b.ret(b.call(b.var(f, "f"), vec![b.int(10)])),
  ])
  .unwrap();
  assert_eq!(summary.result_type, "any");
}

#[test]
fn mutual_recursion_terminates() {
  let b = Builder::default();
  let (even, odd, n, m) = (VarId(1), VarId(2), VarId(3), VarId(4));
  let even_decl = b.func(
    Some(even),
    "even",
    vec![b.param(n, None)],
    vec![b.ret(b.call(b.var(odd, "odd"), vec![b.var(n, "n")]))],
  );
  let odd_decl = b.func(
    Some(odd),
    "odd",
    vec![b.param(m, None)],
    vec![b.ret(b.call(b.var(even, "even"), vec![b.var(m, "m")]))],
  );
  let result = run(vec![
    Stmt::Function(even_decl),
    Stmt::Function(odd_decl),
    b.ret(b.call(b.var(even, "even"), vec![b.int(4)])),
  ]);
  assert!(result.is_ok(), "{result:?}");
}

/// `class Point { x: Number; constructor(x: Int) { this.x = x; } getX() { return this.x; } }`
fn point(b: &Builder, var: VarId) -> Stmt {
  let px = VarId(100);
  let mut class = b.class(var, "Point", None);
  class.fields.push(FieldDecl {
    name: "x".to_string(),
    ty: TypeRef::named("Number"),
    readonly: true,
  });
  class.constructor = Some(b.func(
    None,
    "constructor",
    vec![b.param(px, Some(TypeRef::named("Int")))],
    vec![b.set(b.this(), "x", b.var(px, "x"))],
  ));
  class.methods.push(b.func(None, "getX", Vec::new(), vec![b.ret(b.member(b.this(), "x"))]));
  Stmt::Class(Arc::new(class))
}

#[test]
fn constructors_initialise_fields() {
  let b = Builder::default();
  let class = VarId(1);
  let p = VarId(2);
  let summary = run(vec![
    point(&b, class),
    b.let_(p, None, Some(b.new(b.var(class, "Point"), vec![b.int(7)]))),
    b.ret(b.call(b.member(b.var(p, "p"), "getX"), Vec::new())),
  ])
  .unwrap();
  // Field values escape into mutable storage and are not folded.
  assert_eq!(summary.result_type, "Int");
  assert_eq!(summary.literal, None);
}

#[test]
fn readonly_fields_reject_assignment_outside_the_constructor() {
  let b = Builder::default();
  let class = VarId(1);
  let p = VarId(2);
  let err = run(vec![
    point(&b, class),
    b.let_(p, None, Some(b.new(b.var(class, "Point"), vec![b.int(7)]))),
    b.set(b.var(p, "p"), "x", b.int(8)),
  ])
  .unwrap_err();
  assert!(matches!(err, PassError::Reported(_)));
  assert!(err.error().message().contains("readonly"), "{err}");
}

#[test]
fn constructor_arguments_are_checked() {
  let b = Builder::default();
  let class = VarId(1);
  let err = run(vec![
    point(&b, class),
    b.ret(b.new(b.var(class, "Point"), vec![b.string("seven")])),
  ])
  .unwrap_err();
  assert!(matches!(err, PassError::Reported(_)));
}

fn animals(b: &Builder) -> Vec<Stmt> {
  let animal = b.class(VarId(50), "Animal", None);
  let mut dog = b.class(VarId(51), "Dog", Some("Animal"));
  dog.methods.push(b.func(None, "bark", Vec::new(), vec![b.ret(b.int(1))]));
  let cat = b.class(VarId(52), "Cat", Some("Animal"));
  vec![
    Stmt::Class(Arc::new(animal)),
    Stmt::Class(Arc::new(dog)),
    Stmt::Class(Arc::new(cat)),
  ]
}

#[test]
fn divergent_classes_join_into_a_union() {
  let b = Builder::default();
  let a = VarId(1);
  let flag = VarId(2);
  let mut body = animals(&b);
  body.extend([
    b.let_(flag, Some(TypeRef::named("Boolean")), None),
    b.let_(a, Some(TypeRef::named("Animal")), Some(b.new(b.var(VarId(51), "Dog"), Vec::new()))),
    Stmt::If {
      test: b.var(flag, "flag"),
      then: vec![b.assign(a, b.new(b.var(VarId(52), "Cat"), Vec::new()))],
      otherwise: None,
      loc: b.loc(),
    },
    b.ret(b.var(a, "a")),
  ]);
  let summary = run(body.clone()).unwrap();
  assert_eq!(summary.prototypes, vec!["Cat".to_string(), "Dog".to_string()]);
  assert!(summary.result_type.contains("Dog") && summary.result_type.contains("Cat"));

  // Not every branch can bark.
  body.pop();
  body.push(b.ret(b.call(b.member(b.var(a, "a"), "bark"), Vec::new())));
  let err = run(body).unwrap_err();
  assert!(err.error().message().contains("bark"), "{err}");
}

#[test]
fn instanceof_guard_narrows_the_taken_branch() {
  let b = Builder::default();
  let a = VarId(1);
  let mut body = animals(&b);
  body.extend([
    b.let_(a, Some(TypeRef::named("Animal")), None),
    Stmt::If {
      test: b.instance_of(b.var(a, "a"), "Dog"),
      then: vec![b.ret(b.call(b.member(b.var(a, "a"), "bark"), Vec::new()))],
      otherwise: None,
      loc: b.loc(),
    },
    b.ret(b.int(2)),
  ]);
  let summary = run(body).unwrap();
  assert_eq!(summary.result_type, "Int");
  assert_eq!(summary.literal, None);
}

#[test]
fn early_return_guard_narrows_in_place() {
  let b = Builder::default();
  let a = VarId(1);
  let mut body = animals(&b);
  body.extend([
    b.let_(a, Some(TypeRef::named("Animal")), None),
    Stmt::If {
      test: b.not(b.instance_of(b.var(a, "a"), "Dog")),
      then: vec![b.ret(b.int(1))],
      otherwise: None,
      loc: b.loc(),
    },
    b.ret(b.call(b.member(b.var(a, "a"), "bark"), Vec::new())),
  ]);
  let summary = run(body).unwrap();
  assert_eq!(summary.literal.as_deref(), Some("1"));
}

#[test]
fn private_members_are_closed_to_outsiders() {
  let b = Builder::default();
  let class = VarId(1);
  let mut secret = b.class(class, "Secret", None);
  secret.fields.push(FieldDecl {
    name: "#code".to_string(),
    ty: TypeRef::named("String"),
    readonly: false,
  });
  secret.constructor = Some(b.func(
    None,
    "constructor",
    Vec::new(),
    vec![b.set(b.this(), "#code", b.string("x"))],
  ));
  secret.methods.push(b.func(None, "reveal", Vec::new(), vec![b.ret(b.member(b.this(), "#code"))]));
  let secret = Stmt::Class(Arc::new(secret));

  let inside = run(vec![
    secret.clone(),
    b.ret(b.call(
      b.member(b.new(b.var(class, "Secret"), Vec::new()), "reveal"),
      Vec::new(),
    )),
  ])
  .unwrap();
  assert_eq!(inside.result_type, "String");

  let err = run(vec![
    secret,
    b.ret(b.member(b.new(b.var(class, "Secret"), Vec::new()), "#code")),
  ])
  .unwrap_err();
  assert!(err.error().message().contains("private"), "{err}");
}

#[test]
fn private_prefix_is_configurable() {
  let b = Builder::default();
  let class = VarId(1);
  let mut open = b.class(class, "Open", None);
  open.fields.push(FieldDecl {
    name: "#code".to_string(),
    ty: TypeRef::named("String"),
    readonly: false,
  });
  let registry = Registry::with_core_options(EvalOptions {
    private_prefix: String::new(),
    ..EvalOptions::default()
  });
  let engine = Engine::new(Arc::new(registry));
  let program = Program {
    body: vec![
      Stmt::Class(Arc::new(open)),
      b.ret(b.member(b.new(b.var(class, "Open"), Vec::new()), "#code")),
    ],
    entry: None,
  };
  assert_eq!(engine.evaluate(&program, None).unwrap().result_type, "String");
}

#[test]
fn promise_resolutions_accumulate() {
  let b = Builder::default();
  let (p, resolve, reject) = (VarId(1), VarId(2), VarId(3));
  let executor = b.func(
    None,
    "executor",
    vec![b.param(resolve, None), b.param(reject, None)],
    vec![
      Stmt::Expr(b.call(b.var(resolve, "resolve"), vec![b.int(1)])),
      Stmt::Expr(b.call(b.var(resolve, "resolve"), vec![b.int(2)])),
    ],
  );
  let summary = run(vec![
    b.let_(
      p,
      None,
      Some(b.new(b.var(VarId(99), "Promise"), vec![Expr::Function(executor)])),
    ),
    b.ret(Expr::Await {
      operand: Box::new(b.var(p, "p")),
      loc: b.loc(),
    }),
  ])
  .unwrap();
  assert_eq!(summary.result_type, "Int");
  assert_eq!(summary.literal, None);
}

#[test]
fn a_cached_promise_site_joins_every_resolution() {
  let b = Builder::default();
  let (mk, x, res, rej) = (VarId(1), VarId(2), VarId(3), VarId(4));
  let executor = b.func(
    None,
    "executor",
    vec![b.param(res, None), b.param(rej, None)],
    vec![Stmt::Expr(b.call(b.var(res, "res"), vec![b.var(x, "x")]))],
  );
  let make = b.func(
    Some(mk),
    "mk",
    vec![b.param(x, None)],
    vec![b.ret(b.new(b.var(VarId(99), "Promise"), vec![Expr::Function(executor)]))],
  );
  let summary = run(vec![
    Stmt::Function(make),
    Stmt::Expr(b.call(b.var(mk, "mk"), vec![b.int(1)])),
    b.ret(Expr::Await {
      operand: Box::new(b.call(b.var(mk, "mk"), vec![b.string("s")])),
      loc: b.loc(),
    }),
  ])
  .unwrap();
  assert!(summary.result_type.contains("String"), "{summary:?}");
  assert!(summary.result_type.contains("Int"), "{summary:?}");
  assert_eq!(summary.literal, None);
}

#[test]
fn closures_escaping_a_branch_write_to_the_enclosing_frame() {
  let b = Builder::default();
  let (x, c, g) = (VarId(1), VarId(2), VarId(3));
  let setter = b.func(None, "g", Vec::new(), vec![b.assign(x, b.string("s"))]);
  let summary = run(vec![
    b.let_(x, None, Some(b.int(1))),
    b.let_(c, Some(TypeRef::named("Boolean")), None),
    b.let_(g, None, Some(Expr::Lit(Lit::Null, b.loc()))),
    Stmt::If {
      test: b.var(c, "c"),
      then: vec![b.assign(g, Expr::Function(setter))],
      otherwise: None,
      loc: b.loc(),
    },
    Stmt::Expr(b.call(b.var(g, "g"), Vec::new())),
    b.ret(b.var(x, "x")),
  ])
  .unwrap();
  assert_eq!(summary.result_type, "String");
  assert_eq!(summary.literal.as_deref(), Some("s"));
}

#[test]
fn argument_mismatches_point_at_the_read() {
  let b = Builder::default();
  let (f, p, x) = (VarId(1), VarId(2), VarId(3));
  let takes = b.func(
    Some(f),
    "f",
    vec![b.param(p, Some(TypeRef::named("String")))],
    Vec::new(),
  );
  let read = Loc(900, 901);
  let err = run(vec![
    Stmt::Function(takes),
    b.let_(x, None, Some(b.int(1))),
    Stmt::Expr(b.call(
      b.var(f, "f"),
      vec![Expr::Var {
        var: x,
        name: "x".to_string(),
        loc: read,
      }],
    )),
  ])
  .unwrap_err();
  assert!(err.error().message().contains("expected String"), "{err}");
  assert_eq!(err.error().loc, read);
}

#[test]
fn calling_a_non_function_statement_is_rejected() {
  let b = Builder::default();
  let x = VarId(1);
  let err = run(vec![
    b.let_(x, None, Some(b.int(1))),
    Stmt::Expr(b.call(b.var(x, "x"), Vec::new())),
  ])
  .unwrap_err();
  assert_eq!(err.error().message(), "Int does not support calling");
}

#[test]
fn loops_widen_their_counters() {
  let b = Builder::default();
  let i = VarId(1);
  let summary = run(vec![
    b.let_(i, None, Some(b.int(0))),
    Stmt::While {
      test: b.binary(BinOp::Lt, b.var(i, "i"), b.int(3)),
      body: vec![b.assign(i, b.binary(BinOp::Add, b.var(i, "i"), b.int(1)))],
      loc: b.loc(),
    },
    b.ret(b.var(i, "i")),
  ])
  .unwrap();
  assert_eq!(summary.result_type, "Int");
  assert_eq!(summary.literal, None);
}

#[test]
fn for_of_binds_the_item_shape() {
  let b = Builder::default();
  let (xs, x, last) = (VarId(1), VarId(2), VarId(3));
  let summary = run(vec![
    b.let_(
      xs,
      None,
      Some(Expr::Array {
        items: vec![b.string("a"), b.string("b")],
        loc: b.loc(),
      }),
    ),
    b.let_(last, None, Some(b.string(""))),
    Stmt::ForOf {
      var: x,
      name: "x".to_string(),
      iterable: b.var(xs, "xs"),
      body: vec![b.assign(last, b.var(x, "x"))],
      loc: b.loc(),
    },
    b.ret(b.var(last, "last")),
  ])
  .unwrap();
  assert_eq!(summary.result_type, "String");
}

#[test]
fn declared_contracts_must_be_implemented() {
  let b = Builder::default();
  let named = InterfaceDecl {
    var: None,
    name: "Named".to_string(),
    extends: Vec::new(),
    members: vec![InterfaceMember::Method(
      "name".to_string(),
      Signature::new(Vec::new(), TypeRef::named("String")),
    )],
    loc: b.loc(),
  };
  let mut thing = b.class(VarId(1), "Thing", None);
  thing.implements.push("Named".to_string());
  let err = run(vec![
    Stmt::Interface(Arc::new(named)),
    Stmt::Class(Arc::new(thing)),
  ])
  .unwrap_err();
  assert!(err.error().message().contains("name"), "{err}");
}

#[test]
fn entry_point_runs_after_the_body() {
  let b = Builder::default();
  let main = VarId(1);
  let missing = VarId(2);
  let decl = b.func(
    Some(main),
    "main",
    Vec::new(),
    vec![Stmt::Expr(b.var(missing, "missing"))],
  );
  let program = Program {
    body: vec![Stmt::Function(decl)],
    entry: Some(main),
  };
  let err = engine().evaluate(&program, None).unwrap_err();
  assert!(err.error().message().contains("missing"), "{err}");
}

#[test]
fn passes_are_independent() {
  let b = Builder::default();
  let ok = Program {
    body: vec![b.ret(b.int(1))],
    entry: None,
  };
  let bad = Program {
    body: vec![Stmt::Expr(b.var(VarId(9), "nope"))],
    entry: None,
  };
  let results = engine().evaluate_all(&[ok.clone(), bad, ok]);
  assert!(results[0].is_ok());
  assert!(matches!(results[1], Err(PassError::Reported(_))));
  assert_eq!(results[2].as_ref().unwrap().literal.as_deref(), Some("1"));
}
