use std::rc::Rc;
use std::sync::Arc;

use value_js::builtins;
use value_js::error::ValueResult;
use value_js::eval::ast::Expr;
use value_js::eval::ast::FunctionDecl;
use value_js::eval::ast::Stmt;
use value_js::eval::ast::ViewQuery;
use value_js::stack::CallableId;
use value_js::stack::Stack;
use value_js::stack::VarId;
use value_js::stack::ViewInterface;
use value_js::{Engine, Loc, Program, Registry, Value, ValueError};

struct Page {
  url: String,
}

impl ViewInterface for Page {
  fn get_var_type_instance(&self, stack: &dyn Stack, name: &str, loc: Loc) -> ValueResult<Value> {
    match name {
      "title" => builtins::new_string(stack.registry(), None, loc),
      _ => Err(ValueError::structural(loc, format!("no template variable {name}"))),
    }
  }

  fn get_elem_type_instance(&self, stack: &dyn Stack, _id: &str, loc: Loc) -> ValueResult<Value> {
    builtins::new_object(stack.registry(), Vec::new(), loc)
  }

  fn get_def_type_instance(&self, _stack: &dyn Stack, name: &str, loc: Loc) -> ValueResult<Value> {
    Err(ValueError::structural(loc, format!("no definition {name}")))
  }

  fn get_url(&self, _loc: Loc) -> ValueResult<String> {
    Ok(self.url.clone())
  }

  fn get_html(&self, _loc: Loc) -> ValueResult<String> {
    Ok("<main></main>".to_string())
  }

  fn get_elem_states(&self, _id: &str, _loc: Loc) -> ValueResult<Vec<String>> {
    Ok(vec!["open".to_string(), "closed".to_string()])
  }

  fn is_elem(&self, id: &str) -> bool {
    id == "menu"
  }
}

fn returning(query: ViewQuery) -> Program {
  Program {
    body: vec![Stmt::Return(Some(Expr::View(query, Loc(3, 9))), Loc(0, 10))],
    entry: None,
  }
}

fn page(url: &str) -> Option<Rc<dyn ViewInterface>> {
  Some(Rc::new(Page {
    url: url.to_string(),
  }))
}

#[test]
fn page_values_come_from_the_view() {
  let engine = Engine::new(Arc::new(Registry::with_core()));
  let url = engine.evaluate(&returning(ViewQuery::Url), page("/about")).unwrap();
  assert_eq!(url.literal.as_deref(), Some("/about"));

  let title = engine
    .evaluate(&returning(ViewQuery::Var("title".to_string())), page("/"))
    .unwrap();
  assert_eq!(title.result_type, "String");
  assert_eq!(title.literal, None);

  let states = engine
    .evaluate(&returning(ViewQuery::ElemStates("menu".to_string())), page("/"))
    .unwrap();
  assert_eq!(states.result_type, "Array");
  assert!(states.prototypes.contains(&"String".to_string()));
}

#[test]
fn unknown_elements_are_rejected() {
  let engine = Engine::new(Arc::new(Registry::with_core()));
  let err = engine
    .evaluate(&returning(ViewQuery::Elem("footer".to_string())), page("/"))
    .unwrap_err();
  assert!(err.error().message().contains("footer"));
  assert_eq!(err.error().code().id, "VAL0001");
  assert!(err.error().render().starts_with("error[VAL0001]: no element with id footer"));
}

#[test]
fn page_values_need_a_view() {
  let engine = Engine::new(Arc::new(Registry::with_core()));
  assert!(engine.evaluate(&returning(ViewQuery::Url), None).is_err());
}

#[test]
fn each_parallel_pass_gets_its_own_view() {
  let engine = Engine::new(Arc::new(Registry::with_core()));
  let programs = vec![returning(ViewQuery::Url); 4];
  let results = engine.evaluate_all_with(&programs, |i| page(&format!("/page/{i}")));
  for (i, result) in results.into_iter().enumerate() {
    assert_eq!(result.unwrap().literal, Some(format!("/page/{i}")));
  }
}

#[test]
fn a_finished_pass_lets_go_of_its_view() {
  let engine = Engine::new(Arc::new(Registry::with_core()));
  let f = Arc::new(FunctionDecl {
    id: CallableId(1),
    var: Some(VarId(1)),
    name: "f".to_string(),
    params: Vec::new(),
    ret: None,
    body: vec![Stmt::Return(Some(Expr::View(ViewQuery::Url, Loc(20, 25))), Loc(13, 26))],
    is_async: false,
    loc: Loc(0, 27),
  });
  let program = Program {
    body: vec![
      Stmt::Function(f),
      Stmt::Return(
        Some(Expr::Call {
          callee: Box::new(Expr::Var {
            var: VarId(1),
            name: "f".to_string(),
            loc: Loc(35, 36),
          }),
          args: Vec::new(),
          loc: Loc(35, 38),
        }),
        Loc(28, 39),
      ),
    ],
    entry: None,
  };
  let view: Rc<dyn ViewInterface> = Rc::new(Page {
    url: "/held".to_string(),
  });
  let summary = engine.evaluate(&program, Some(view.clone())).unwrap();
  assert_eq!(summary.result_type, "String");
  assert_eq!(Rc::strong_count(&view), 1);
}
