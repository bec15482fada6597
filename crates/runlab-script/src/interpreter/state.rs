//! Interpreter state and statement execution.
//!
//! An [`Interpreter`] runs exactly one program. Its lifecycle is
//! `Ready -> (Completed | Error)`: [`Interpreter::run`] executes the body,
//! then drains queued promise reactions and pending timers, and finally
//! unwraps a promise completion value. The outcome, together with the
//! captured console and timeline, is read back with
//! [`Interpreter::into_outcome`].

use std::collections::VecDeque;
use std::rc::Rc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use runlab_core::{LogEntry, TraceEvent, Variable};

use crate::ast::*;
use crate::instrument::is_hook_call;
use crate::parser::parse_program;

use super::builtins::install_globals;
use super::console::{Console, LogSink};
use super::env::{Env, Scope};
use super::error::RuntimeError;
use super::format::{snapshot, to_display};
use super::ops::to_number;
use super::promise::{Microtask, Timer};
use super::trace::TraceRecorder;
use super::value::Value;

/// Execution state of the interpreter.
#[derive(Debug)]
pub enum ExecutionState {
    /// Nothing has run yet.
    Ready,
    /// The program finished; `result` is its completion value.
    Completed { result: Value },
    /// The program threw (or a limit was hit).
    Error { error: RuntimeError },
}

/// Configuration for one run.
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Whether to bind the trace hook and record a timeline.
    pub trace_enabled: bool,
    /// Maximum depth of nested script function calls. Default: 256.
    pub max_call_depth: usize,
    /// Console entries kept before truncation. Default: 1000.
    pub max_log_entries: usize,
    /// Timeline events kept before recording stops. Default: 10000.
    pub max_trace_events: usize,
    /// Longest array a script may build. Default: 10 million elements.
    pub max_array_length: usize,
    /// Longest string a script may build, in bytes. Default: 100 MB.
    pub max_string_length: usize,
    /// Seed for `Math.random`; random when `None`.
    pub random_seed: Option<u64>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            trace_enabled: false,
            max_call_depth: 256,
            max_log_entries: 1000,
            max_trace_events: 10_000,
            max_array_length: 10_000_000,
            max_string_length: 100_000_000,
            random_seed: None,
        }
    }
}

/// What a run produced, in wire-ready form.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub logs: Vec<LogEntry>,
    /// Completion value; absent when it is `undefined` or the run failed.
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Recorded events; present only when tracing was enabled.
    pub timeline: Option<Vec<TraceEvent>>,
}

/// How a statement finished.
#[derive(Debug)]
pub(crate) enum Completion {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Tree-walking interpreter for the script subset.
pub struct Interpreter {
    pub(crate) globals: Env,
    pub(crate) console: Console,
    pub(crate) trace: Option<TraceRecorder>,
    /// Names of the script functions currently executing, outermost first.
    pub(crate) call_stack: Vec<String>,
    pub(crate) microtasks: VecDeque<Microtask>,
    pub(crate) timers: Vec<Timer>,
    pub(crate) next_timer_id: u64,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) config: InterpreterConfig,
    /// Value of the last top-level expression statement.
    completion: Value,
    state: ExecutionState,
}

impl Interpreter {
    /// Creates an interpreter with fresh globals in the Ready state.
    pub fn new(config: InterpreterConfig) -> Self {
        let globals = Scope::global();
        install_globals(&globals, config.trace_enabled);
        let seed = config.random_seed.unwrap_or_else(rand::random);
        Interpreter {
            globals,
            console: Console::new(config.max_log_entries),
            trace: config
                .trace_enabled
                .then(|| TraceRecorder::new(config.max_trace_events)),
            call_stack: Vec::new(),
            microtasks: VecDeque::new(),
            timers: Vec::new(),
            next_timer_id: 1,
            rng: ChaCha8Rng::seed_from_u64(seed),
            config,
            completion: Value::Undefined,
            state: ExecutionState::Ready,
        }
    }

    /// Forwards every console entry to `sink` as it is captured.
    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.console.set_sink(sink);
        self
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn logs(&self) -> &[LogEntry] {
        self.console.entries()
    }

    /// Executes `program` to completion, including queued reactions and
    /// timers.
    pub fn run(&mut self, program: &Program) -> &ExecutionState {
        if !matches!(self.state, ExecutionState::Ready) {
            return &self.state;
        }
        self.state = match self.run_body(program) {
            Ok(result) => ExecutionState::Completed { result },
            Err(error) => ExecutionState::Error { error },
        };
        &self.state
    }

    /// Parses and runs `source`, returning the wire-ready outcome. Parse
    /// failures surface as a `SyntaxError`.
    pub fn run_source(mut self, source: &str) -> RunOutcome {
        match parse_program(source) {
            Ok(program) => {
                self.run(&program);
            }
            Err(err) => {
                self.state = ExecutionState::Error {
                    error: RuntimeError::SyntaxError {
                        message: err.to_string(),
                    },
                };
            }
        }
        self.into_outcome()
    }

    /// Consumes the interpreter, appending the terminal timeline event.
    pub fn into_outcome(self) -> RunOutcome {
        let Interpreter {
            console,
            mut trace,
            state,
            ..
        } = self;
        let (result, error) = match state {
            ExecutionState::Completed { result } => {
                let json = match result {
                    Value::Undefined => None,
                    value => Some(snapshot(&value)),
                };
                (json, None)
            }
            ExecutionState::Error { error } => (None, Some(error.to_string())),
            ExecutionState::Ready => (None, None),
        };
        if let Some(trace) = trace.as_mut() {
            if let Some(value) = &result {
                trace.record_result(value.clone());
            } else if let Some(message) = &error {
                trace.record_error(message);
            }
        }
        RunOutcome {
            logs: console.into_entries(),
            result,
            error,
            timeline: trace.map(TraceRecorder::into_events),
        }
    }

    fn run_body(&mut self, program: &Program) -> Result<Value, RuntimeError> {
        let globals = self.globals.clone();
        self.exec_block(&program.body, &globals)?;
        self.drain_microtasks();

        let completion = std::mem::replace(&mut self.completion, Value::Undefined);
        let result = self.await_value(completion)?;
        while self.run_next_timer()? {}
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Checkpoints
    // ------------------------------------------------------------------

    /// Records a `line` event from trace hook arguments
    /// `(line, snippet, ...names)`, reading names softly from `env`.
    pub(crate) fn record_checkpoint(&mut self, args: &[Value], env: &Env) {
        let Some(trace) = self.trace.as_mut() else {
            return;
        };
        let line = args.first().map(to_number).unwrap_or(0.0);
        let line = if line.is_finite() && line >= 0.0 { line as u32 } else { 0 };
        let snippet = match args.get(1) {
            Some(Value::Str(s)) => Some(s.to_string()),
            _ => None,
        };
        let variables = args
            .iter()
            .skip(2)
            .filter_map(|arg| {
                let name = to_display(arg);
                env.soft_lookup(&name)
                    .map(|value| Variable::new(name, snapshot(&value), value.type_tag()))
            })
            .collect();
        let mut call_stack = Vec::with_capacity(self.call_stack.len() + 1);
        call_stack.push("<global>".to_string());
        call_stack.extend(self.call_stack.iter().cloned());
        trace.record_line(line, variables, snippet, call_stack);
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Runs a statement list in `env`, hoisting its function declarations.
    pub(crate) fn exec_block(&mut self, stmts: &[Stmt], env: &Env) -> Result<Completion, RuntimeError> {
        for stmt in stmts {
            if let StmtKind::Function(def) = &stmt.kind {
                self.declare_function(def, env);
            }
        }
        for stmt in stmts {
            match self.exec_stmt(stmt, env)? {
                Completion::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_scoped(&mut self, stmts: &[Stmt], env: &Env) -> Result<Completion, RuntimeError> {
        let scope = Scope::child(env);
        self.exec_block(stmts, &scope)
    }

    fn declare_function(&mut self, def: &Rc<FunctionDef>, env: &Env) {
        if let Some(name) = &def.name {
            env.define(name, self.make_closure(def, env, None));
        }
    }

    fn declare(&mut self, kind: DeclKind, decls: &[Declarator], env: &Env) -> Result<(), RuntimeError> {
        for decl in decls {
            let value = match &decl.init {
                Some(init) => self.eval_named(init, env, &decl.name)?,
                None => Value::Undefined,
            };
            env.declare(&decl.name, value, kind != DeclKind::Const, kind == DeclKind::Var)?;
        }
        Ok(())
    }

    pub(crate) fn exec_stmt(&mut self, stmt: &Stmt, env: &Env) -> Result<Completion, RuntimeError> {
        match &stmt.kind {
            StmtKind::VarDecl { kind, decls } => {
                self.declare(*kind, decls, env)?;
                Ok(Completion::Normal)
            }
            StmtKind::Function(def) => {
                self.declare_function(def, env);
                Ok(Completion::Normal)
            }
            StmtKind::Expr(expr) => {
                let value = self.eval(expr, env)?;
                if self.call_stack.is_empty() && !is_hook_call(expr) {
                    self.completion = value;
                }
                Ok(Completion::Normal)
            }
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.exec_stmt(consequent, env)
                } else if let Some(alternate) = alternate {
                    self.exec_stmt(alternate, env)
                } else {
                    Ok(Completion::Normal)
                }
            }
            StmtKind::While { test, body } => {
                while self.eval(test, env)?.truthy() {
                    match self.exec_stmt(body, env)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Normal | Completion::Continue => {}
                    }
                }
                Ok(Completion::Normal)
            }
            StmtKind::DoWhile { body, test } => {
                loop {
                    match self.exec_stmt(body, env)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Normal | Completion::Continue => {}
                    }
                    if !self.eval(test, env)?.truthy() {
                        break;
                    }
                }
                Ok(Completion::Normal)
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => self.exec_for(init.as_ref(), test.as_ref(), update.as_ref(), body, env),
            StmtKind::ForOf {
                binding,
                iterable,
                body,
            } => {
                let iterable_value = self.eval(iterable, env)?;
                match iterable_value {
                    Value::Array(items) => {
                        let mut index = 0;
                        loop {
                            let item = items.borrow().get(index).cloned();
                            let Some(item) = item else {
                                break;
                            };
                            index += 1;
                            match self.exec_iteration(binding, item, body, env)? {
                                Completion::Break => break,
                                Completion::Return(value) => return Ok(Completion::Return(value)),
                                Completion::Normal | Completion::Continue => {}
                            }
                        }
                        Ok(Completion::Normal)
                    }
                    other => {
                        let items = self.iterate(&other, iterable)?;
                        self.exec_iterations(binding, items, body, env)
                    }
                }
            }
            StmtKind::ForIn {
                binding,
                object,
                body,
            } => {
                let target = self.eval(object, env)?;
                let keys = own_keys(&target).into_iter().map(Value::string).collect();
                self.exec_iterations(binding, keys, body, env)
            }
            StmtKind::Switch {
                discriminant,
                cases,
            } => self.exec_switch(discriminant, cases, env),
            StmtKind::Return(arg) => {
                let value = match arg {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            StmtKind::Break => Ok(Completion::Break),
            StmtKind::Continue => Ok(Completion::Continue),
            StmtKind::Throw(expr) => Err(RuntimeError::Thrown(self.eval(expr, env)?)),
            StmtKind::Try {
                block,
                handler,
                finalizer,
            } => {
                let mut outcome = self.exec_scoped(block, env);
                if let Some(handler) = handler {
                    if let Err(err) = outcome {
                        let scope = Scope::child(env);
                        if let Some(param) = &handler.param {
                            scope.declare(param, err.into_value(), true, false)?;
                        }
                        outcome = self.exec_block(&handler.body, &scope);
                    }
                }
                if let Some(finalizer) = finalizer {
                    match self.exec_scoped(finalizer, env)? {
                        Completion::Normal => {}
                        abrupt => return Ok(abrupt),
                    }
                }
                outcome
            }
            StmtKind::Block(stmts) => self.exec_scoped(stmts, env),
            StmtKind::Empty => Ok(Completion::Normal),
        }
    }

    fn exec_for(
        &mut self,
        init: Option<&ForInit>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        env: &Env,
    ) -> Result<Completion, RuntimeError> {
        let mut scope = Scope::child(env);
        let mut per_iteration = false;
        match init {
            Some(ForInit::VarDecl { kind, decls }) => {
                self.declare(*kind, decls, &scope)?;
                per_iteration = *kind != DeclKind::Var;
            }
            Some(ForInit::Expr(expr)) => {
                self.eval(expr, &scope)?;
            }
            None => {}
        }
        // Each iteration gets its own copy of `let` bindings, so closures
        // created in the body keep the value of their iteration.
        if per_iteration {
            scope = scope.fork();
        }
        loop {
            if let Some(test) = test {
                if !self.eval(test, &scope)?.truthy() {
                    break;
                }
            }
            match self.exec_stmt(body, &scope)? {
                Completion::Break => break,
                Completion::Return(value) => return Ok(Completion::Return(value)),
                Completion::Normal | Completion::Continue => {}
            }
            if per_iteration {
                scope = scope.fork();
            }
            if let Some(update) = update {
                self.eval(update, &scope)?;
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_iteration(
        &mut self,
        binding: &ForBinding,
        item: Value,
        body: &Stmt,
        env: &Env,
    ) -> Result<Completion, RuntimeError> {
        let scope = Scope::child(env);
        match binding.kind {
            Some(kind) => scope.declare(&binding.name, item, kind != DeclKind::Const, kind == DeclKind::Var)?,
            None => scope.assign(&binding.name, item)?,
        }
        self.exec_stmt(body, &scope)
    }

    fn exec_iterations(
        &mut self,
        binding: &ForBinding,
        items: Vec<Value>,
        body: &Stmt,
        env: &Env,
    ) -> Result<Completion, RuntimeError> {
        for item in items {
            match self.exec_iteration(binding, item, body, env)? {
                Completion::Break => break,
                Completion::Return(value) => return Ok(Completion::Return(value)),
                Completion::Normal | Completion::Continue => {}
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_switch(&mut self, discriminant: &Expr, cases: &[SwitchCase], env: &Env) -> Result<Completion, RuntimeError> {
        let value = self.eval(discriminant, env)?;
        let mut start = None;
        for (index, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                if self.eval(test, env)?.strict_equals(&value) {
                    start = Some(index);
                    break;
                }
            }
        }
        let start = start.or_else(|| cases.iter().position(|case| case.test.is_none()));
        let Some(start) = start else {
            return Ok(Completion::Normal);
        };

        let scope = Scope::child(env);
        for case in &cases[start..] {
            match self.exec_block(&case.body, &scope)? {
                Completion::Normal => {}
                Completion::Break => break,
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal)
    }
}

/// Keys visited by `for...in` and `Object.keys`.
pub(crate) fn own_keys(value: &Value) -> Vec<String> {
    match value {
        Value::Object(obj) => obj.borrow().props.keys().cloned().collect(),
        Value::Array(items) => (0..items.borrow().len()).map(|i| i.to_string()).collect(),
        Value::Str(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
        _ => Vec::new(),
    }
}
