//! The cooperative trampoline scheduler.
//!
//! [`Scheduler`] drives the chain of suspended steps the evaluator
//! returns, in bounded turns: at most [`crate::STEP_BUDGET`] thunk
//! invocations per call to [`Scheduler::turn`]. When a turn exhausts its
//! budget with work still pending, the scheduler asks the host to call it
//! again soon (via [`Defer::schedule_soon`]) and returns immediately, so
//! however deep the evaluated program's logical recursion is, the host
//! stays responsive and its call stack stays shallow.
//!
//! Presentation and deferral are external collaborators behind the
//! [`View`] and [`Defer`] traits; the library never blocks and never
//! writes to stdout itself.
//!
//! Every error aborts the current run only: it is rendered once through
//! the view, the run state is dropped, and the global environment - with
//! whatever `define`s have already executed - survives for the next run.

use std::rc::Rc;

use crate::ast::Value;
use crate::evaluator::{evaluate, Cont, EnvRef, Environment, Step, Thunk};
use crate::reader::{read, Tokenizer};
use crate::{Error, STEP_BUDGET};

/// Presentation collaborator.
pub trait View {
    /// Reset output state before a run.
    fn clear(&mut self);
    /// Append one rendered result, visually separated from the previous.
    fn print(&mut self, text: &str);
    /// Re-allow input submission.
    fn enable(&mut self);
    /// Block input submission while a run is in flight.
    fn disable(&mut self);
}

/// Deferred-callback collaborator: request one future call to
/// [`Scheduler::turn`], without blocking the caller. Called exactly once
/// per turn that exhausts its step budget with work pending.
pub trait Defer {
    fn schedule_soon(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Budget exhausted with work pending; a follow-up turn was scheduled.
    Yielded,
    /// The run finished (or none was in flight); input is re-enabled.
    Idle,
}

struct RunState {
    tokenizer: Tokenizer,
    pending: Option<Thunk>,
}

/// Drives programs to completion in bounded, interruptible turns. The
/// global environment lives here and survives across runs.
pub struct Scheduler {
    env: EnvRef,
    run: Option<RunState>,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            env: Environment::global(),
            run: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.run.is_none()
    }

    /// Begin evaluating `source` as a sequence of top-level expressions.
    /// Clears and disables the view, then runs the first turn.
    pub fn start(
        &mut self,
        source: &str,
        view: &mut dyn View,
        defer: &mut dyn Defer,
    ) -> TurnOutcome {
        view.clear();
        view.disable();
        self.run = Some(RunState {
            tokenizer: Tokenizer::new(source),
            pending: None,
        });
        self.turn(view, defer)
    }

    /// Run up to [`STEP_BUDGET`] steps of the in-flight run.
    pub fn turn(&mut self, view: &mut dyn View, defer: &mut dyn Defer) -> TurnOutcome {
        if self.run.is_none() {
            return TurnOutcome::Idle;
        }
        let mut steps = 0;
        loop {
            let needs_read = matches!(self.run.as_ref(), Some(run) if run.pending.is_none());
            if needs_read {
                let next = match self.run.as_mut() {
                    Some(run) => read(&mut run.tokenizer),
                    None => return TurnOutcome::Idle,
                };
                match next {
                    Ok(Some(expr)) => {
                        let done: Cont = Rc::new(|value| Ok(Step::Done(value)));
                        let thunk = evaluate(expr, Rc::clone(&self.env), done);
                        if let Some(run) = self.run.as_mut() {
                            run.pending = Some(thunk);
                        }
                    }
                    Ok(None) => {
                        log::debug!("run complete");
                        return self.finish(view);
                    }
                    Err(error) => return self.fail(view, &error),
                }
            }

            if steps >= STEP_BUDGET {
                log::debug!("step budget exhausted, deferring");
                defer.schedule_soon();
                return TurnOutcome::Yielded;
            }

            let thunk = match self.run.as_mut().and_then(|run| run.pending.take()) {
                Some(thunk) => thunk,
                None => return TurnOutcome::Idle,
            };
            steps += 1;
            match thunk() {
                Ok(Step::Continue(next)) => {
                    if let Some(run) = self.run.as_mut() {
                        run.pending = Some(next);
                    }
                }
                Ok(Step::Done(value)) => {
                    // The undefined marker is never printed.
                    if !matches!(value, Value::Undefined(_)) {
                        view.print(&value.to_string());
                    }
                }
                Err(error) => return self.fail(view, &error),
            }
        }
    }

    /// Abort the in-flight run, if any. Observed between turns only; a
    /// single step cannot be interrupted mid-flight.
    pub fn interrupt(&mut self, view: &mut dyn View) {
        if self.run.take().is_some() {
            view.print("interrupted");
            view.enable();
        }
    }

    fn finish(&mut self, view: &mut dyn View) -> TurnOutcome {
        self.run = None;
        view.enable();
        TurnOutcome::Idle
    }

    fn fail(&mut self, view: &mut dyn View, error: &Error) -> TurnOutcome {
        view.print(&error.to_string());
        self.finish(view)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
