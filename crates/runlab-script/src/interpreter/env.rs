//! Lexical scopes.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use super::error::RuntimeError;
use super::value::Value;

pub type Env = Rc<Scope>;

#[derive(Debug, Clone)]
struct Binding {
    value: Value,
    mutable: bool,
    /// `var` bindings may be declared again in the same scope.
    redeclarable: bool,
}

#[derive(Debug, Default)]
pub struct Scope {
    vars: RefCell<IndexMap<String, Binding>>,
    parent: Option<Env>,
}

impl Scope {
    pub fn global() -> Env {
        Rc::new(Scope::default())
    }

    pub fn child(parent: &Env) -> Env {
        Rc::new(Scope {
            vars: RefCell::new(IndexMap::new()),
            parent: Some(parent.clone()),
        })
    }

    /// Fresh scope with the same parent and copies of every binding; used to
    /// give each `for (let ...)` iteration its own variables.
    pub fn fork(&self) -> Env {
        Rc::new(Scope {
            vars: RefCell::new(self.vars.borrow().clone()),
            parent: self.parent.clone(),
        })
    }

    pub fn declare(&self, name: &str, value: Value, mutable: bool, redeclarable: bool) -> Result<(), RuntimeError> {
        let mut vars = self.vars.borrow_mut();
        if let Some(existing) = vars.get_mut(name) {
            if !(existing.redeclarable && redeclarable) {
                return Err(RuntimeError::Redeclared {
                    name: name.to_string(),
                });
            }
            existing.value = value;
            return Ok(());
        }
        vars.insert(
            name.to_string(),
            Binding {
                value,
                mutable,
                redeclarable,
            },
        );
        Ok(())
    }

    /// Declares or overwrites without checks; used for hoisting and builtins.
    pub fn define(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(
            name.to_string(),
            Binding {
                value,
                mutable: true,
                redeclarable: true,
            },
        );
    }

    pub fn lookup(&self, name: &str) -> Result<Value, RuntimeError> {
        self.soft_lookup(name).ok_or_else(|| RuntimeError::NotDefined {
            name: name.to_string(),
        })
    }

    /// Resolves a name through the scope chain without raising.
    pub fn soft_lookup(&self, name: &str) -> Option<Value> {
        if let Some(binding) = self.vars.borrow().get(name) {
            return Some(binding.value.clone());
        }
        self.parent.as_ref().and_then(|p| p.soft_lookup(name))
    }

    pub fn assign(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        if let Some(binding) = self.vars.borrow_mut().get_mut(name) {
            if !binding.mutable {
                return Err(RuntimeError::ConstAssignment {
                    name: name.to_string(),
                });
            }
            binding.value = value;
            return Ok(());
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => Err(RuntimeError::NotDefined {
                name: name.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_the_chain_and_shadows() {
        let global = Scope::global();
        global.define("x", Value::Number(1.0));
        let inner = Scope::child(&global);
        assert!(matches!(inner.lookup("x"), Ok(Value::Number(n)) if n == 1.0));

        inner.declare("x", Value::Number(2.0), true, false).unwrap();
        assert!(matches!(inner.lookup("x"), Ok(Value::Number(n)) if n == 2.0));
        assert!(matches!(global.lookup("x"), Ok(Value::Number(n)) if n == 1.0));
    }

    #[test]
    fn const_bindings_reject_assignment() {
        let env = Scope::global();
        env.declare("k", Value::Number(1.0), false, false).unwrap();
        assert!(matches!(env.assign("k", Value::Null), Err(RuntimeError::ConstAssignment { .. })));
    }

    #[test]
    fn let_cannot_be_redeclared_but_var_can() {
        let env = Scope::global();
        env.declare("a", Value::Null, true, false).unwrap();
        assert!(env.declare("a", Value::Null, true, false).is_err());
        env.declare("v", Value::Null, true, true).unwrap();
        assert!(env.declare("v", Value::Bool(true), true, true).is_ok());
    }

    #[test]
    fn assigning_an_undeclared_name_fails() {
        let env = Scope::global();
        assert!(matches!(env.assign("nope", Value::Null), Err(RuntimeError::NotDefined { .. })));
        assert!(env.soft_lookup("nope").is_none());
    }

    #[test]
    fn fork_copies_bindings() {
        let global = Scope::global();
        let loop_scope = Scope::child(&global);
        loop_scope.declare("i", Value::Number(0.0), true, false).unwrap();
        let next = loop_scope.fork();
        next.assign("i", Value::Number(1.0)).unwrap();
        assert!(matches!(loop_scope.lookup("i"), Ok(Value::Number(n)) if n == 0.0));
        assert!(matches!(next.lookup("i"), Ok(Value::Number(n)) if n == 1.0));
    }
}
