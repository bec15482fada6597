//! Runtime values.
//!
//! Primitives are stored inline; arrays, objects, functions and promises are
//! reference counted and compared by identity, mirroring JavaScript's
//! reference semantics. Everything is single-threaded (`Rc`/`RefCell`).

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::FunctionDef;

use super::builtins::HostFn;
use super::env::Env;

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<Object>>),
    Function(Rc<Function>),
    Promise(Rc<Promise>),
}

/// Distinguishes error instances from plain objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectClass {
    Plain,
    Error,
}

#[derive(Debug, Clone)]
pub struct Object {
    pub class: ObjectClass,
    pub props: IndexMap<String, Value>,
}

pub enum Function {
    Closure {
        def: Rc<FunctionDef>,
        env: Env,
        /// Declared or inferred name (`const f = () => ...` is named `f`).
        name: Option<Rc<str>>,
    },
    Host(HostFn),
    /// Built-in method read off a value, e.g. `xs.push`.
    Method { receiver: Value, name: Rc<str> },
    /// The `resolve`/`reject` pair handed to a promise executor.
    Resolver { promise: Rc<Promise>, reject: bool },
}

impl Function {
    pub fn name(&self) -> String {
        match self {
            Function::Closure { def, name, .. } => name
                .as_deref()
                .or(def.name.as_deref())
                .unwrap_or("")
                .to_string(),
            Function::Host(host) => host.name().to_string(),
            Function::Method { name, .. } => name.to_string(),
            Function::Resolver { reject: false, .. } => "resolve".to_string(),
            Function::Resolver { reject: true, .. } => "reject".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

pub(crate) enum Reaction {
    Then {
        on_fulfilled: Option<Value>,
        on_rejected: Option<Value>,
        derived: Rc<Promise>,
    },
    /// Settle another promise the same way (`resolve(p)` adoption).
    Adopt { target: Rc<Promise> },
    /// `finally(cb)`: run `cb`, then pass the original outcome through.
    Finally {
        on_settled: Value,
        derived: Rc<Promise>,
    },
    /// One input of `Promise.all`.
    AllElement {
        index: usize,
        results: Rc<RefCell<Vec<Value>>>,
        remaining: Rc<Cell<usize>>,
        derived: Rc<Promise>,
    },
}

pub struct Promise {
    pub(crate) state: RefCell<PromiseState>,
    pub(crate) reactions: RefCell<Vec<Reaction>>,
}

impl Promise {
    pub fn pending() -> Rc<Promise> {
        Rc::new(Promise {
            state: RefCell::new(PromiseState::Pending),
            reactions: RefCell::new(Vec::new()),
        })
    }

    pub fn settled(state: PromiseState) -> Rc<Promise> {
        Rc::new(Promise {
            state: RefCell::new(state),
            reactions: RefCell::new(Vec::new()),
        })
    }

    pub fn state(&self) -> PromiseState {
        self.state.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(&*self.state.borrow(), PromiseState::Pending)
    }

    pub fn state_label(&self) -> &'static str {
        match &*self.state.borrow() {
            PromiseState::Pending => "pending",
            PromiseState::Fulfilled(_) => "fulfilled",
            PromiseState::Rejected(_) => "rejected",
        }
    }
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn string(s: String) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(props: IndexMap<String, Value>) -> Value {
        Value::Object(Rc::new(RefCell::new(Object {
            class: ObjectClass::Plain,
            props,
        })))
    }

    /// An error instance with `name` and `message` properties.
    pub fn error(name: &str, message: &str) -> Value {
        let mut props = IndexMap::new();
        props.insert("name".to_string(), Value::str(name));
        props.insert("message".to_string(), Value::str(message));
        Value::Object(Rc::new(RefCell::new(Object {
            class: ObjectClass::Error,
            props,
        })))
    }

    pub fn host(host: HostFn) -> Value {
        Value::Function(Rc::new(Function::Host(host)))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Object(o) if o.borrow().class == ObjectClass::Error)
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Result of `typeof`.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null | Value::Array(_) | Value::Object(_) | Value::Promise(_) => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_) => "function",
        }
    }

    /// Finer-grained tag used in variable snapshots.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Array(_) => "array",
            Value::Promise(_) => "promise",
            Value::Object(_) if self.is_error() => "error",
            other => other.type_of(),
        }
    }

    /// `===` semantics.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Promise(a), Value::Promise(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Identity used for cycle detection while serialising.
    pub(crate) fn identity(&self) -> Option<*const ()> {
        match self {
            Value::Array(a) => Some(Rc::as_ptr(a) as *const ()),
            Value::Object(o) => Some(Rc::as_ptr(o) as *const ()),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Array(items) => write!(f, "Array(len={})", items.borrow().len()),
            Value::Object(o) => {
                let o = o.borrow();
                write!(f, "Object({:?}, keys={:?})", o.class, o.props.keys().collect::<Vec<_>>())
            }
            Value::Function(func) => write!(f, "Function({})", func.name()),
            Value::Promise(p) => write!(f, "Promise({})", p.state_label()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_follows_javascript() {
        assert!(!Value::Number(0.0).truthy());
        assert!(!Value::Number(f64::NAN).truthy());
        assert!(!Value::str("").truthy());
        assert!(Value::str("0").truthy());
        assert!(Value::array(vec![]).truthy());
        assert!(!Value::Null.truthy());
    }

    #[test]
    fn strict_equality_uses_identity_for_references() {
        let a = Value::array(vec![]);
        assert!(a.strict_equals(&a.clone()));
        assert!(!a.strict_equals(&Value::array(vec![])));
        assert!(!Value::Number(f64::NAN).strict_equals(&Value::Number(f64::NAN)));
        assert!(Value::str("x").strict_equals(&Value::str("x")));
    }

    #[test]
    fn type_tags_distinguish_containers() {
        assert_eq!(Value::Null.type_of(), "object");
        assert_eq!(Value::Null.type_tag(), "null");
        assert_eq!(Value::array(vec![]).type_tag(), "array");
        assert_eq!(Value::error("TypeError", "bad").type_tag(), "error");
        assert_eq!(Value::Undefined.type_tag(), "undefined");
    }
}
