//! Promises, reaction jobs and timers.
//!
//! Scripts run on a single thread with no event loop of their own. Settling
//! a promise queues its reactions as microtasks; the queue is drained after
//! the main body, after every timer callback, and whenever `await` needs a
//! pending promise to make progress. Timers fire in (due time, creation)
//! order, and the interpreter sleeps until the next one is due. An `await`
//! inside an async function blocks that function's caller too: the body runs
//! to its end before the call returns its promise. A script that awaits
//! forever with no timer left fails with [`RuntimeError::Stalled`] instead of
//! hanging; genuine infinite loops are the coordinator's timeout's job.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use super::error::RuntimeError;
use super::state::Interpreter;
use super::value::{Function, Promise, PromiseState, Reaction, Value};

/// A reaction ready to run with the outcome of its promise.
pub(crate) struct Microtask {
    reaction: Reaction,
    outcome: PromiseState,
}

pub(crate) enum TimerAction {
    Callback { func: Value, args: Vec<Value> },
    Resolve(Rc<Promise>),
}

pub(crate) struct Timer {
    id: u64,
    due: Instant,
    action: TimerAction,
}

impl Interpreter {
    // ------------------------------------------------------------------
    // Settlement
    // ------------------------------------------------------------------

    /// Resolves `promise` with `value`, adopting the state of `value` when it
    /// is itself a promise.
    pub(crate) fn resolve_promise(&mut self, promise: &Rc<Promise>, value: Value) {
        if !promise.is_pending() {
            return;
        }
        match value {
            Value::Promise(inner) if Rc::ptr_eq(&inner, promise) => {
                let error = Value::error("TypeError", "Chaining cycle detected for promise");
                self.settle(promise, PromiseState::Rejected(error));
            }
            Value::Promise(inner) => self.subscribe(
                &inner,
                Reaction::Adopt {
                    target: promise.clone(),
                },
            ),
            value => self.settle(promise, PromiseState::Fulfilled(value)),
        }
    }

    pub(crate) fn reject_promise(&mut self, promise: &Rc<Promise>, reason: Value) {
        self.settle(promise, PromiseState::Rejected(reason));
    }

    fn settle(&mut self, promise: &Rc<Promise>, outcome: PromiseState) {
        if !promise.is_pending() {
            return;
        }
        *promise.state.borrow_mut() = outcome.clone();
        let reactions = std::mem::take(&mut *promise.reactions.borrow_mut());
        for reaction in reactions {
            self.microtasks.push_back(Microtask {
                reaction,
                outcome: outcome.clone(),
            });
        }
    }

    /// Registers `reaction` on `promise`; queues it right away when the
    /// promise has already settled.
    pub(crate) fn subscribe(&mut self, promise: &Rc<Promise>, reaction: Reaction) {
        match promise.state() {
            PromiseState::Pending => promise.reactions.borrow_mut().push(reaction),
            outcome => self.microtasks.push_back(Microtask { reaction, outcome }),
        }
    }

    /// `promise.then(on_fulfilled, on_rejected)`.
    pub(crate) fn then(&mut self, promise: &Rc<Promise>, on_fulfilled: Value, on_rejected: Value) -> Value {
        let derived = Promise::pending();
        let handler = |v: Value| v.is_callable().then_some(v);
        self.subscribe(
            promise,
            Reaction::Then {
                on_fulfilled: handler(on_fulfilled),
                on_rejected: handler(on_rejected),
                derived: derived.clone(),
            },
        );
        Value::Promise(derived)
    }

    pub(crate) fn finally(&mut self, promise: &Rc<Promise>, on_settled: Value) -> Value {
        if !on_settled.is_callable() {
            return self.then(promise, Value::Undefined, Value::Undefined);
        }
        let derived = Promise::pending();
        self.subscribe(
            promise,
            Reaction::Finally {
                on_settled,
                derived: derived.clone(),
            },
        );
        Value::Promise(derived)
    }

    /// Converts any value to a promise (`Promise.resolve`).
    pub(crate) fn promise_of(&mut self, value: Value) -> Rc<Promise> {
        match value {
            Value::Promise(p) => p,
            other => Promise::settled(PromiseState::Fulfilled(other)),
        }
    }

    /// `Promise.all(items)`.
    pub(crate) fn promise_all(&mut self, items: Vec<Value>) -> Value {
        let derived = Promise::pending();
        if items.is_empty() {
            self.resolve_promise(&derived, Value::array(Vec::new()));
            return Value::Promise(derived);
        }
        let results = Rc::new(RefCell::new(vec![Value::Undefined; items.len()]));
        let remaining = Rc::new(Cell::new(items.len()));
        for (index, item) in items.into_iter().enumerate() {
            let input = self.promise_of(item);
            self.subscribe(
                &input,
                Reaction::AllElement {
                    index,
                    results: results.clone(),
                    remaining: remaining.clone(),
                    derived: derived.clone(),
                },
            );
        }
        Value::Promise(derived)
    }

    /// `new Promise(executor)`.
    pub(crate) fn construct_promise(&mut self, executor: &Value) -> Result<Value, RuntimeError> {
        if !executor.is_callable() {
            return Err(RuntimeError::type_error("Promise resolver is not a function"));
        }
        let promise = Promise::pending();
        let resolver = |reject| {
            Value::Function(Rc::new(Function::Resolver {
                promise: promise.clone(),
                reject,
            }))
        };
        let args = vec![resolver(false), resolver(true)];
        if let Err(err) = self.call_function(executor, Value::Undefined, args) {
            self.reject_promise(&promise, err.into_value());
        }
        Ok(Value::Promise(promise))
    }

    // ------------------------------------------------------------------
    // Microtasks
    // ------------------------------------------------------------------

    pub(crate) fn drain_microtasks(&mut self) {
        while let Some(task) = self.microtasks.pop_front() {
            self.run_reaction(task.reaction, task.outcome);
        }
    }

    fn run_reaction(&mut self, reaction: Reaction, outcome: PromiseState) {
        match reaction {
            Reaction::Adopt { target } => self.settle(&target, outcome),
            Reaction::Then {
                on_fulfilled,
                on_rejected,
                derived,
            } => {
                let (handler, value, rejected) = match outcome {
                    PromiseState::Fulfilled(v) => (on_fulfilled, v, false),
                    PromiseState::Rejected(v) => (on_rejected, v, true),
                    PromiseState::Pending => return,
                };
                match handler {
                    Some(handler) => match self.call_function(&handler, Value::Undefined, vec![value]) {
                        Ok(result) => self.resolve_promise(&derived, result),
                        Err(err) => self.reject_promise(&derived, err.into_value()),
                    },
                    None if rejected => self.reject_promise(&derived, value),
                    None => self.resolve_promise(&derived, value),
                }
            }
            Reaction::Finally { on_settled, derived } => {
                match self.call_function(&on_settled, Value::Undefined, Vec::new()) {
                    Ok(_) => self.settle(&derived, outcome),
                    Err(err) => self.reject_promise(&derived, err.into_value()),
                }
            }
            Reaction::AllElement {
                index,
                results,
                remaining,
                derived,
            } => match outcome {
                PromiseState::Fulfilled(value) => {
                    if let Some(slot) = results.borrow_mut().get_mut(index) {
                        *slot = value;
                    }
                    remaining.set(remaining.get().saturating_sub(1));
                    if remaining.get() == 0 {
                        let values = results.borrow().clone();
                        self.resolve_promise(&derived, Value::array(values));
                    }
                }
                PromiseState::Rejected(reason) => self.reject_promise(&derived, reason),
                PromiseState::Pending => {}
            },
        }
    }

    /// Waits for `value` if it is a promise: returns its fulfillment value or
    /// raises its rejection reason.
    pub(crate) fn await_value(&mut self, value: Value) -> Result<Value, RuntimeError> {
        let Value::Promise(promise) = value else {
            return Ok(value);
        };
        loop {
            match promise.state() {
                PromiseState::Fulfilled(value) => return Ok(value),
                PromiseState::Rejected(reason) => return Err(RuntimeError::Thrown(reason)),
                PromiseState::Pending => {
                    if !self.microtasks.is_empty() {
                        self.drain_microtasks();
                    } else if !self.run_next_timer()? {
                        return Err(RuntimeError::Stalled);
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    pub(crate) fn schedule_timer(&mut self, delay_ms: f64, action: TimerAction) -> u64 {
        let delay_ms = if delay_ms.is_finite() && delay_ms > 0.0 { delay_ms } else { 0.0 };
        let id = self.next_timer_id;
        self.next_timer_id += 1;
        self.timers.push(Timer {
            id,
            due: Instant::now() + Duration::from_secs_f64(delay_ms / 1000.0),
            action,
        });
        id
    }

    pub(crate) fn clear_timer(&mut self, id: u64) {
        self.timers.retain(|timer| timer.id != id);
    }

    /// Fires the earliest timer, sleeping until it is due. Returns `false`
    /// when no timer is pending.
    pub(crate) fn run_next_timer(&mut self) -> Result<bool, RuntimeError> {
        let next = self
            .timers
            .iter()
            .enumerate()
            .min_by_key(|(_, timer)| (timer.due, timer.id))
            .map(|(index, _)| index);
        let Some(index) = next else {
            return Ok(false);
        };
        let timer = self.timers.remove(index);
        let now = Instant::now();
        if timer.due > now {
            std::thread::sleep(timer.due - now);
        }
        match timer.action {
            TimerAction::Callback { func, args } => {
                self.call_function(&func, Value::Undefined, args)?;
            }
            TimerAction::Resolve(promise) => self.resolve_promise(&promise, Value::Undefined),
        }
        self.drain_microtasks();
        Ok(true)
    }
}
