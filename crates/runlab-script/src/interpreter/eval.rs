//! Expression evaluation and function calls.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::*;
use crate::instrument::is_hook_call;
use crate::printer::print_expr;

use super::env::{Env, Scope};
use super::error::RuntimeError;
use super::format::to_display;
use super::ops::{array_index, binary_op, property_key, to_int32, to_number};
use super::state::{Completion, Interpreter};
use super::value::{Function, Promise, Value};

/// An assignable location.
enum Place {
    Binding(String),
    Property { object: Value, key: String },
}

impl Interpreter {
    pub(crate) fn eval(&mut self, expr: &Expr, env: &Env) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::str(s)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Template { quasis, exprs } => {
                let mut out = String::new();
                for (index, quasi) in quasis.iter().enumerate() {
                    out.push_str(quasi);
                    if let Some(expr) = exprs.get(index) {
                        let value = self.eval(expr, env)?;
                        out.push_str(&to_display(&value));
                    }
                }
                Ok(Value::string(out))
            }
            Expr::This => Ok(env.soft_lookup("this").unwrap_or(Value::Undefined)),
            Expr::Ident(name) => env.lookup(name),
            Expr::Array(elements) => Ok(Value::array(self.eval_elements(elements, env)?)),
            Expr::Object(props) => self.eval_object(props, env),
            Expr::Function(def) => Ok(self.make_closure(def, env, None)),
            Expr::Unary { op, arg } => self.eval_unary(*op, arg, env),
            Expr::Update { op, prefix, target } => {
                let place = self.place(target, env)?;
                let old = to_number(&self.read_place(&place, env)?);
                let new = match op {
                    UpdateOp::Increment => old + 1.0,
                    UpdateOp::Decrement => old - 1.0,
                };
                self.write_place(place, Value::Number(new), env)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                self.checked_string(binary_op(*op, &left, &right)?)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, env)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right, env)
                }
            }
            Expr::Assign { op, target, value } => {
                let place = self.place(target, env)?;
                let value = match op.binary() {
                    None => match &place {
                        Place::Binding(name) => self.eval_named(value, env, name)?,
                        Place::Property { .. } => self.eval(value, env)?,
                    },
                    Some(binary) => {
                        let current = self.read_place(&place, env)?;
                        let rhs = self.eval(value, env)?;
                        self.checked_string(binary_op(binary, &current, &rhs)?)?
                    }
                };
                self.write_place(place, value.clone(), env)?;
                Ok(value)
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.eval(consequent, env)
                } else {
                    self.eval(alternate, env)
                }
            }
            Expr::Call { args, .. } if self.trace.is_some() && is_hook_call(expr) => {
                let args = self.eval_elements(args, env)?;
                self.record_checkpoint(&args, env);
                Ok(Value::Undefined)
            }
            Expr::Call { .. } | Expr::Member { .. } | Expr::Index { .. } => {
                Ok(self.eval_chain(expr, env)?.unwrap_or(Value::Undefined))
            }
            Expr::New { callee, args } => {
                let constructor = self.eval(callee, env)?;
                let args = self.eval_elements(args, env)?;
                self.construct(&constructor, args, callee)
            }
            Expr::Await(arg) => {
                let value = self.eval(arg, env)?;
                self.await_value(value)
            }
        }
    }

    /// Evaluates `expr`, naming it `name` when it is an anonymous function
    /// (`const f = () => 1` is called `f`).
    pub(crate) fn eval_named(&mut self, expr: &Expr, env: &Env, name: &str) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Function(def) if def.name.is_none() => Ok(self.make_closure(def, env, Some(Rc::from(name)))),
            other => self.eval(other, env),
        }
    }

    pub(crate) fn make_closure(&self, def: &Rc<FunctionDef>, env: &Env, name: Option<Rc<str>>) -> Value {
        Value::Function(Rc::new(Function::Closure {
            def: def.clone(),
            env: env.clone(),
            name,
        }))
    }

    fn eval_elements(&mut self, elements: &[Element], env: &Env) -> Result<Vec<Value>, RuntimeError> {
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            match element {
                Element::Expr(expr) => values.push(self.eval(expr, env)?),
                Element::Spread(expr) => {
                    let value = self.eval(expr, env)?;
                    values.extend(self.iterate(&value, expr)?);
                }
            }
        }
        Ok(values)
    }

    /// Items produced by iterating `value` (arrays and strings).
    pub(crate) fn iterate(&self, value: &Value, source: &Expr) -> Result<Vec<Value>, RuntimeError> {
        match value {
            Value::Array(items) => Ok(items.borrow().clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::string(c.to_string())).collect()),
            _ => Err(RuntimeError::type_error(format!(
                "{} is not iterable",
                print_expr(source)
            ))),
        }
    }

    fn eval_object(&mut self, props: &[Property], env: &Env) -> Result<Value, RuntimeError> {
        let mut out = IndexMap::new();
        for prop in props {
            match prop {
                Property::Init { key, value } => {
                    let (key, value) = match key {
                        PropKey::Named(name) => (name.clone(), self.eval_named(value, env, name)?),
                        PropKey::Computed(expr) => {
                            let key = property_key(&self.eval(expr, env)?);
                            let value = self.eval_named(value, env, &key)?;
                            (key, value)
                        }
                    };
                    out.insert(key, value);
                }
                Property::Spread(expr) => match self.eval(expr, env)? {
                    Value::Object(obj) => {
                        let source = obj.borrow().props.clone();
                        out.extend(source);
                    }
                    Value::Array(items) => {
                        for (index, item) in items.borrow().iter().enumerate() {
                            out.insert(index.to_string(), item.clone());
                        }
                    }
                    Value::Str(s) => {
                        for (index, c) in s.chars().enumerate() {
                            out.insert(index.to_string(), Value::string(c.to_string()));
                        }
                    }
                    _ => {}
                },
            }
        }
        Ok(Value::object(out))
    }

    fn eval_unary(&mut self, op: UnaryOp, arg: &Expr, env: &Env) -> Result<Value, RuntimeError> {
        match op {
            UnaryOp::Typeof => {
                let value = match arg {
                    Expr::Ident(name) => env.soft_lookup(name).unwrap_or(Value::Undefined),
                    other => self.eval(other, env)?,
                };
                Ok(Value::str(value.type_of()))
            }
            UnaryOp::Delete => {
                match arg {
                    Expr::Member { object, property, .. } => {
                        let object = self.eval(object, env)?;
                        delete_property(&object, property);
                    }
                    Expr::Index { object, index, .. } => {
                        let object = self.eval(object, env)?;
                        let key = property_key(&self.eval(index, env)?);
                        delete_property(&object, &key);
                    }
                    other => {
                        self.eval(other, env)?;
                    }
                }
                Ok(Value::Bool(true))
            }
            _ => {
                let value = self.eval(arg, env)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Neg => Value::Number(-to_number(&value)),
                    UnaryOp::Plus => Value::Number(to_number(&value)),
                    UnaryOp::BitNot => Value::Number(f64::from(!to_int32(to_number(&value)))),
                    _ => Value::Undefined,
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Member access and calls
    // ------------------------------------------------------------------

    /// Evaluates a member/call chain. `None` means an optional link
    /// short-circuited, which makes the whole chain `undefined`.
    fn eval_chain(&mut self, expr: &Expr, env: &Env) -> Result<Option<Value>, RuntimeError> {
        match expr {
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let Some(object) = self.eval_chain(object, env)? else {
                    return Ok(None);
                };
                if *optional && object.is_nullish() {
                    return Ok(None);
                }
                self.get_property(&object, property).map(Some)
            }
            Expr::Index {
                object,
                index,
                optional,
            } => {
                let Some(object) = self.eval_chain(object, env)? else {
                    return Ok(None);
                };
                if *optional && object.is_nullish() {
                    return Ok(None);
                }
                let key = property_key(&self.eval(index, env)?);
                self.get_property(&object, &key).map(Some)
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => {
                let (func, this) = match callee.as_ref() {
                    Expr::Member {
                        object,
                        property,
                        optional: member_optional,
                    } => {
                        let Some(object) = self.eval_chain(object, env)? else {
                            return Ok(None);
                        };
                        if *member_optional && object.is_nullish() {
                            return Ok(None);
                        }
                        (self.get_property(&object, property)?, object)
                    }
                    Expr::Index {
                        object,
                        index,
                        optional: index_optional,
                    } => {
                        let Some(object) = self.eval_chain(object, env)? else {
                            return Ok(None);
                        };
                        if *index_optional && object.is_nullish() {
                            return Ok(None);
                        }
                        let key = property_key(&self.eval(index, env)?);
                        (self.get_property(&object, &key)?, object)
                    }
                    other => match self.eval_chain(other, env)? {
                        Some(func) => (func, Value::Undefined),
                        None => return Ok(None),
                    },
                };
                if *optional && func.is_nullish() {
                    return Ok(None);
                }
                let args = self.eval_elements(args, env)?;
                if !func.is_callable() {
                    return Err(RuntimeError::type_error(format!(
                        "{} is not a function",
                        print_expr(callee)
                    )));
                }
                self.call_function(&func, this, args).map(Some)
            }
            other => self.eval(other, env).map(Some),
        }
    }

    /// Reads `object[key]`, including built-in methods and static members.
    pub(crate) fn get_property(&self, object: &Value, key: &str) -> Result<Value, RuntimeError> {
        let method = |receiver: &Value| {
            Value::Function(Rc::new(Function::Method {
                receiver: receiver.clone(),
                name: Rc::from(key),
            }))
        };
        let value = match object {
            Value::Undefined | Value::Null => {
                return Err(RuntimeError::type_error(format!(
                    "Cannot read properties of {} (reading '{key}')",
                    to_display(object)
                )))
            }
            Value::Array(items) => {
                if key == "length" {
                    Value::Number(items.borrow().len() as f64)
                } else if let Some(index) = array_index(key) {
                    items.borrow().get(index).cloned().unwrap_or(Value::Undefined)
                } else if super::methods::ARRAY_METHODS.contains(&key) {
                    method(object)
                } else {
                    Value::Undefined
                }
            }
            Value::Str(s) => {
                if key == "length" {
                    Value::Number(s.chars().count() as f64)
                } else if let Some(index) = array_index(key) {
                    s.chars()
                        .nth(index)
                        .map(|c| Value::string(c.to_string()))
                        .unwrap_or(Value::Undefined)
                } else if super::methods::STRING_METHODS.contains(&key) {
                    method(object)
                } else {
                    Value::Undefined
                }
            }
            Value::Number(_) if super::methods::NUMBER_METHODS.contains(&key) => method(object),
            Value::Bool(_) if key == "toString" => method(object),
            Value::Object(obj) => match obj.borrow().props.get(key) {
                Some(value) => value.clone(),
                None if super::methods::OBJECT_METHODS.contains(&key) => method(object),
                None => Value::Undefined,
            },
            Value::Promise(_) if super::methods::PROMISE_METHODS.contains(&key) => method(object),
            Value::Function(func) => match (&**func, key) {
                (_, "name") => Value::string(func.name()),
                (Function::Host(host), _) => host.static_member(key).unwrap_or(Value::Undefined),
                _ => Value::Undefined,
            },
            _ => Value::Undefined,
        };
        Ok(value)
    }

    /// Refuses to grow an array past the configured maximum.
    pub(crate) fn check_array_length(&self, len: usize) -> Result<(), RuntimeError> {
        if len > self.config.max_array_length {
            return Err(RuntimeError::range_error("Invalid array length"));
        }
        Ok(())
    }

    pub(crate) fn check_string_length(&self, len: usize) -> Result<(), RuntimeError> {
        if len > self.config.max_string_length {
            return Err(RuntimeError::range_error("Invalid string length"));
        }
        Ok(())
    }

    fn checked_string(&self, value: Value) -> Result<Value, RuntimeError> {
        if let Value::Str(s) = &value {
            self.check_string_length(s.len())?;
        }
        Ok(value)
    }

    pub(crate) fn set_property(&self, object: &Value, key: &str, value: Value) -> Result<(), RuntimeError> {
        match object {
            Value::Undefined | Value::Null => Err(RuntimeError::type_error(format!(
                "Cannot set properties of {} (setting '{key}')",
                to_display(object)
            ))),
            Value::Array(items) => {
                let mut items = items.borrow_mut();
                if key == "length" {
                    let len = to_number(&value);
                    if len < 0.0 || len.fract() != 0.0 || !len.is_finite() {
                        return Err(RuntimeError::range_error("Invalid array length"));
                    }
                    self.check_array_length(len as usize)?;
                    items.resize(len as usize, Value::Undefined);
                } else if let Some(index) = array_index(key) {
                    if index >= items.len() {
                        self.check_array_length(index + 1)?;
                        items.resize(index + 1, Value::Undefined);
                    }
                    items[index] = value;
                }
                Ok(())
            }
            Value::Object(obj) => {
                obj.borrow_mut().props.insert(key.to_string(), value);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn place(&mut self, target: &Expr, env: &Env) -> Result<Place, RuntimeError> {
        match target {
            Expr::Ident(name) => Ok(Place::Binding(name.clone())),
            Expr::Member { object, property, .. } => Ok(Place::Property {
                object: self.eval(object, env)?,
                key: property.clone(),
            }),
            Expr::Index { object, index, .. } => {
                let object = self.eval(object, env)?;
                let key = property_key(&self.eval(index, env)?);
                Ok(Place::Property { object, key })
            }
            _ => Err(RuntimeError::SyntaxError {
                message: "Invalid left-hand side in assignment".to_string(),
            }),
        }
    }

    fn read_place(&mut self, place: &Place, env: &Env) -> Result<Value, RuntimeError> {
        match place {
            Place::Binding(name) => env.lookup(name),
            Place::Property { object, key } => self.get_property(object, key),
        }
    }

    fn write_place(&mut self, place: Place, value: Value, env: &Env) -> Result<(), RuntimeError> {
        match place {
            Place::Binding(name) => env.assign(&name, value),
            Place::Property { object, key } => self.set_property(&object, &key, value),
        }
    }

    /// Calls any callable value.
    pub(crate) fn call_function(&mut self, func: &Value, this: Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let Value::Function(function) = func else {
            return Err(RuntimeError::type_error(format!(
                "{} is not a function",
                to_display(func)
            )));
        };
        match &**function {
            Function::Closure { def, env, .. } => {
                let name = match function.name() {
                    name if name.is_empty() => "<anonymous>".to_string(),
                    name => name,
                };
                self.call_closure(def, env, name, this, args)
            }
            Function::Host(host) => self.call_host(*host, args),
            Function::Method { receiver, name } => self.call_method(receiver, name, args),
            Function::Resolver { promise, reject } => {
                let value = args.into_iter().next().unwrap_or(Value::Undefined);
                if *reject {
                    self.reject_promise(promise, value);
                } else {
                    self.resolve_promise(promise, value);
                }
                Ok(Value::Undefined)
            }
        }
    }

    fn call_closure(
        &mut self,
        def: &Rc<FunctionDef>,
        closure_env: &Env,
        name: String,
        this: Value,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        if self.call_stack.len() >= self.config.max_call_depth {
            return Err(RuntimeError::CallDepthExceeded {
                limit: self.config.max_call_depth,
            });
        }
        let scope = Scope::child(closure_env);
        if !def.is_arrow {
            scope.define("this", this);
        }

        self.call_stack.push(name);
        let result = self.bind_params(def, &scope, args).and_then(|()| match &def.body {
            FunctionBody::Block(stmts) => match self.exec_block(stmts, &scope)? {
                Completion::Return(value) => Ok(value),
                _ => Ok(Value::Undefined),
            },
            FunctionBody::Expr(expr) => self.eval(expr, &scope),
        });
        self.call_stack.pop();

        if !def.is_async {
            return result;
        }
        let promise = Promise::pending();
        match result {
            Ok(value) => self.resolve_promise(&promise, value),
            Err(err) => self.reject_promise(&promise, err.into_value()),
        }
        Ok(Value::Promise(promise))
    }

    fn bind_params(&mut self, def: &FunctionDef, scope: &Env, args: Vec<Value>) -> Result<(), RuntimeError> {
        let mut args = args.into_iter();
        for param in &def.params {
            let value = if param.rest {
                Value::array(args.by_ref().collect())
            } else {
                match (args.next().unwrap_or(Value::Undefined), &param.default) {
                    (Value::Undefined, Some(default)) => self.eval_named(default, scope, &param.name)?,
                    (value, _) => value,
                }
            };
            scope.declare(&param.name, value, true, true)?;
        }
        Ok(())
    }

    fn construct(&mut self, constructor: &Value, args: Vec<Value>, callee: &Expr) -> Result<Value, RuntimeError> {
        let not_a_constructor = || RuntimeError::type_error(format!("{} is not a constructor", print_expr(callee)));
        let Value::Function(function) = constructor else {
            return Err(not_a_constructor());
        };
        match &**function {
            Function::Host(host) => self.construct_host(*host, args).unwrap_or_else(|| Err(not_a_constructor())),
            Function::Closure { def, .. } if !def.is_arrow && !def.is_async => {
                let instance = Value::object(IndexMap::new());
                let returned = self.call_function(constructor, instance.clone(), args)?;
                Ok(match returned {
                    Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Promise(_) => returned,
                    _ => instance,
                })
            }
            _ => Err(not_a_constructor()),
        }
    }
}

fn delete_property(object: &Value, key: &str) {
    match object {
        Value::Object(obj) => {
            obj.borrow_mut().props.shift_remove(key);
        }
        Value::Array(items) => {
            if let Some(index) = array_index(key) {
                if let Some(slot) = items.borrow_mut().get_mut(index) {
                    *slot = Value::Undefined;
                }
            }
        }
        _ => {}
    }
}
