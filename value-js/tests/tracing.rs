use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::MakeWriter;

use value_js::eval::ast::Expr;
use value_js::eval::ast::FunctionDecl;
use value_js::eval::ast::Lit;
use value_js::eval::ast::Stmt;
use value_js::stack::CallableId;
use value_js::stack::VarId;
use value_js::{Engine, Loc, Program, Registry};

#[derive(Clone, Default)]
struct SharedWriter {
  buffer: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
  fn into_inner(self) -> Vec<u8> {
    match Arc::try_unwrap(self.buffer) {
      Ok(buffer) => buffer.into_inner().unwrap(),
      Err(arc) => arc.lock().unwrap().clone(),
    }
  }
}

struct SharedWriterGuard<'a> {
  buffer: &'a Arc<Mutex<Vec<u8>>>,
}

impl<'a> io::Write for SharedWriterGuard<'a> {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.buffer.lock().unwrap().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

impl<'a> MakeWriter<'a> for SharedWriter {
  type Writer = SharedWriterGuard<'a>;

  fn make_writer(&'a self) -> Self::Writer {
    SharedWriterGuard {
      buffer: &self.buffer,
    }
  }
}

/// `function f() { return f(); } return f();`
fn recursive_program() -> Program {
  let f = VarId(1);
  let call = || Expr::Call {
    callee: Box::new(Expr::Var {
      var: f,
      name: "f".to_string(),
      loc: Loc(20, 21),
    }),
    args: Vec::new(),
    loc: Loc(20, 23),
  };
  let decl = FunctionDecl {
    id: CallableId(7),
    var: Some(f),
    name: "f".to_string(),
    params: Vec::new(),
    ret: None,
    body: vec![Stmt::Return(Some(call()), Loc(13, 24))],
    is_async: false,
    loc: Loc(0, 26),
  };
  Program {
    body: vec![
      Stmt::Function(Arc::new(decl)),
      Stmt::Return(Some(call()), Loc(27, 38)),
      Stmt::Expr(Expr::Lit(Lit::Int(1), Loc(39, 40))),
    ],
    entry: None,
  }
}

#[test]
fn tracing_emits_call_and_pass_spans() {
  let writer = SharedWriter::default();
  let subscriber = tracing_subscriber::fmt()
    .with_span_events(FmtSpan::CLOSE)
    .with_max_level(tracing::Level::DEBUG)
    .with_ansi(false)
    .with_writer(writer.clone())
    .finish();
  let _guard = tracing::subscriber::set_default(subscriber);

  let engine = Engine::new(Arc::new(Registry::with_core()));
  let summary = engine.evaluate(&recursive_program(), None).unwrap();
  assert_eq!(summary.result_type, "any");

  drop(_guard);
  let output = String::from_utf8(writer.into_inner()).unwrap();
  assert!(
    output.contains("value_js.pass"),
    "expected pass span output, got: {output}"
  );
  assert!(
    output.contains("value_js.call"),
    "expected call span output, got: {output}"
  );
  assert!(
    output.contains("recursion cut off"),
    "expected recursion event, got: {output}"
  );
  assert!(output.contains("outcome=\"cut\"") || output.contains("outcome=cut"));
}
