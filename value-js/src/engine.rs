//! Entry-point passes.
//!
//! One pass evaluates one page script against a fresh root frame. Values
//! never leave the pass: what the caller gets back is a [`PassSummary`],
//! which is `Send` so independent passes can run on a thread pool.

use crate::error::PassError;
use crate::error::ValueError;
use crate::eval::eval_block;
use crate::eval::fold::number_to_string;
use crate::eval::ast::Program;
use crate::loc::Loc;
use crate::registry::Registry;
use crate::stack::FunctionStack;
use crate::stack::RootStack;
use crate::stack::Stack;
use crate::stack::StackRef;
use crate::stack::ViewInterface;
use crate::value::Value;
use itertools::Itertools;
use rayon::prelude::*;
use serde::Serialize;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;
use tracing::debug_span;
use tracing::field;

/// What a pass established about the script's result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassSummary {
  /// Type name of the joined top-level return value (`void` if none).
  pub result_type: String,
  /// Rendering of the result if it is a scalar literal.
  pub literal: Option<String>,
  /// Every prototype reachable from the result, sorted and deduplicated.
  pub prototypes: Vec<String>,
  /// Whether every reachable prototype may cross the server/client boundary.
  pub serializable: bool,
}

impl PassSummary {
  fn of(value: &Value) -> PassSummary {
    let mut protos = Vec::new();
    value.loop_nested_prototypes(&mut |proto| protos.push(proto.clone()));
    let serializable = protos.iter().all(|p| p.is_universal());
    let prototypes = protos
      .iter()
      .map(|p| p.name().to_string())
      .sorted()
      .dedup()
      .collect();
    PassSummary {
      result_type: value.type_name(),
      literal: literal_text(value),
      prototypes,
      serializable,
    }
  }
}

fn literal_text(value: &Value) -> Option<String> {
  value
    .literal_bool()
    .map(|v| v.to_string())
    .or_else(|| value.literal_int().map(|v| v.to_string()))
    .or_else(|| value.literal_number().map(number_to_string))
    .or_else(|| value.literal_string())
}

#[derive(Clone, Debug)]
pub struct Engine {
  registry: Arc<Registry>,
}

impl Engine {
  pub fn new(registry: Arc<Registry>) -> Engine {
    Engine { registry }
  }

  pub fn registry(&self) -> &Arc<Registry> {
    &self.registry
  }

  /// Evaluate the script body, then call its entry point if it names one.
  pub fn evaluate(
    &self,
    program: &Program,
    view: Option<Rc<dyn ViewInterface>>,
  ) -> Result<PassSummary, PassError> {
    let span = debug_span!(
      "value_js.pass",
      statements = program.body.len(),
      entry = program.entry.map(|v| v.0),
      outcome = field::Empty,
    );
    let _enter = span.enter();

    let result = self.run(program, view);
    span.record(
      "outcome",
      match &result {
        Ok(_) => "ok",
        Err(PassError::Reported(_)) => "reported",
        Err(PassError::Internal(_)) => "internal",
      },
    );
    if let Err(err) = &result {
      debug!(code = err.error().code().id, error = %err, "pass failed");
    }
    result
  }

  fn run(
    &self,
    program: &Program,
    view: Option<Rc<dyn ViewInterface>>,
  ) -> Result<PassSummary, PassError> {
    let root = Rc::new(RootStack::new(self.registry.clone(), view));
    let result = run_pass(root.clone(), program);
    root.release_pass();
    result
  }

  /// Evaluate independent scripts in parallel, without page values.
  pub fn evaluate_all(&self, programs: &[Program]) -> Vec<Result<PassSummary, PassError>> {
    self.evaluate_all_with(programs, |_| None)
  }

  /// Evaluate independent scripts in parallel. `view` builds the page
  /// interface for the script at the given index on the worker thread.
  pub fn evaluate_all_with<F>(
    &self,
    programs: &[Program],
    view: F,
  ) -> Vec<Result<PassSummary, PassError>>
  where
    F: Fn(usize) -> Option<Rc<dyn ViewInterface>> + Sync,
  {
    programs
      .par_iter()
      .enumerate()
      .map(|(idx, program)| self.evaluate(program, view(idx)))
      .collect()
  }
}

fn run_pass(root: Rc<RootStack>, program: &Program) -> Result<PassSummary, PassError> {
  let frame: StackRef = Rc::new(FunctionStack::new(root.clone(), None, None));
  root.track(&frame);
  eval_block(&frame, &program.body)?;

  if let Some(entry) = program.entry {
    let func = frame.get_value(entry).ok_or_else(|| {
      ValueError::structural(Loc::unknown(), format!("entry point #{} is not declared", entry.0))
    })?;
    func.eval_as_entry_point(&frame, func.context())?;
  }

  let result = frame.get_return().unwrap_or(Value::Void(Loc::unknown()));
  Ok(PassSummary::of(&result))
}
