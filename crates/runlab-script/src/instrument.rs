//! Source rewriting that makes a program report its own progress.
//!
//! Every statement that can change state is followed by a call to the trace
//! hook, and every control statement is preceded by one:
//!
//! ```text
//! let a = 1;                      let a = 1;
//! if (a > 0) a++;        =>       __runlab_trace(1, "let a = 1;", "a");
//!                                 __runlab_trace(2, "if (a > 0) a++;", "a");
//!                                 if (a > 0) {
//!                                   a++;
//!                                   __runlab_trace(2, "if (a > 0) a++;", "a");
//!                                 }
//! ```
//!
//! The hook receives the original line number, the trimmed source line and
//! the names of every binding declared so far in the enclosing scopes. The
//! interpreter resolves those names softly at run time.

use std::rc::Rc;

use crate::ast::*;
use crate::error::InstrumentError;
use crate::lexer::{tokenize, TokenKind};
use crate::parser::parse_program;
use crate::printer::print_program;

/// Identifier the instrumented program calls at each checkpoint.
pub const TRACE_HOOK: &str = "__runlab_trace";

/// Longest snippet, in characters, attached to a checkpoint.
pub const SNIPPET_LIMIT: usize = 120;

/// Output of [`instrument`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrumented {
    pub code: String,
    pub checkpoints: usize,
}

/// Rewrites `source` so that running it records a line-by-line timeline.
pub fn instrument(source: &str) -> Result<Instrumented, InstrumentError> {
    reject_reserved_identifier(source)?;
    let program = parse_program(source)?;

    let mut pass = Instrumentor::new(source);
    let body = pass.block(program.body);
    Ok(Instrumented {
        code: print_program(&Program { body }),
        checkpoints: pass.checkpoints,
    })
}

fn reject_reserved_identifier(source: &str) -> Result<(), InstrumentError> {
    if !source.contains(TRACE_HOOK) {
        return Ok(());
    }
    for token in tokenize(source)? {
        let hit = match &token.kind {
            TokenKind::Ident(name) => name == TRACE_HOOK,
            TokenKind::Template { substitutions, .. } => {
                substitutions.iter().any(|s| s.source.contains(TRACE_HOOK))
            }
            _ => false,
        };
        if hit {
            return Err(InstrumentError::ReservedIdentifier {
                name: TRACE_HOOK.to_string(),
                line: token.line,
                column: token.column,
            });
        }
    }
    Ok(())
}

/// Trimmed source line, cut to [`SNIPPET_LIMIT`] characters.
pub fn snippet(source_line: &str) -> String {
    source_line.trim().chars().take(SNIPPET_LIMIT).collect()
}

struct Instrumentor<'s> {
    lines: Vec<&'s str>,
    scopes: Vec<Vec<String>>,
    checkpoints: usize,
}

impl<'s> Instrumentor<'s> {
    fn new(source: &'s str) -> Self {
        Instrumentor {
            lines: source.lines().collect(),
            scopes: vec![Vec::new()],
            checkpoints: 0,
        }
    }

    fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(name.to_string());
        }
    }

    /// Visible binding names, outermost first, first occurrence wins.
    fn visible_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in self.scopes.iter().flatten() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    fn checkpoint(&mut self, line: u32) -> Stmt {
        self.checkpoints += 1;
        let text = self
            .lines
            .get(line.saturating_sub(1) as usize)
            .copied()
            .unwrap_or("");
        let mut args = vec![
            Element::Expr(Expr::Number(f64::from(line))),
            Element::Expr(Expr::Str(snippet(text))),
        ];
        args.extend(
            self.visible_names()
                .into_iter()
                .map(|name| Element::Expr(Expr::Str(name))),
        );
        Stmt::new(
            StmtKind::Expr(Expr::Call {
                callee: Box::new(Expr::Ident(TRACE_HOOK.to_string())),
                args,
                optional: false,
            }),
            line,
        )
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    /// Instruments a statement list in the current scope.
    fn block(&mut self, stmts: Vec<Stmt>) -> Vec<Stmt> {
        let mut out = Vec::with_capacity(stmts.len() * 2);
        for stmt in stmts {
            self.stmt(stmt, &mut out);
        }
        out
    }

    fn scoped<T>(&mut self, names: Vec<String>, f: impl FnOnce(&mut Self) -> T) -> T {
        self.scopes.push(names);
        let result = f(self);
        self.scopes.pop();
        result
    }

    fn scoped_block(&mut self, stmts: Vec<Stmt>) -> Vec<Stmt> {
        self.scoped(Vec::new(), |pass| pass.block(stmts))
    }

    /// Instruments a statement body, always producing a block.
    fn body(&mut self, stmt: Stmt) -> Box<Stmt> {
        let line = stmt.line;
        let stmts = match stmt.kind {
            StmtKind::Block(stmts) => stmts,
            _ => vec![stmt],
        };
        Box::new(Stmt::new(StmtKind::Block(self.scoped_block(stmts)), line))
    }

    fn stmt(&mut self, stmt: Stmt, out: &mut Vec<Stmt>) {
        let line = stmt.line;
        match stmt.kind {
            StmtKind::VarDecl { kind, decls } => {
                let decls = self.declarators(decls);
                out.push(Stmt::new(StmtKind::VarDecl { kind, decls }, line));
                out.push(self.checkpoint(line));
            }
            StmtKind::Expr(expr) => {
                let expr = self.expr(expr);
                out.push(Stmt::new(StmtKind::Expr(expr), line));
                out.push(self.checkpoint(line));
            }
            StmtKind::Function(def) => {
                out.push(Stmt::new(StmtKind::Function(self.function(&def)), line));
            }
            StmtKind::Block(stmts) => {
                out.push(Stmt::new(StmtKind::Block(self.scoped_block(stmts)), line));
            }
            StmtKind::Empty => {}
            kind => {
                out.push(self.checkpoint(line));
                let kind = self.control(kind);
                out.push(Stmt::new(kind, line));
            }
        }
    }

    fn declarators(&mut self, decls: Vec<Declarator>) -> Vec<Declarator> {
        let decls: Vec<Declarator> = decls
            .into_iter()
            .map(|decl| Declarator {
                name: decl.name,
                init: decl.init.map(|init| self.expr(init)),
            })
            .collect();
        for decl in &decls {
            self.declare(&decl.name);
        }
        decls
    }

    fn control(&mut self, kind: StmtKind) -> StmtKind {
        match kind {
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => StmtKind::If {
                test: self.expr(test),
                consequent: self.body(*consequent),
                alternate: alternate.map(|alt| match alt.kind {
                    // each `else if` test gets its own checkpoint
                    StmtKind::If { .. } => {
                        let line = alt.line;
                        let mut out = Vec::new();
                        self.scoped(Vec::new(), |pass| pass.stmt(*alt, &mut out));
                        Box::new(Stmt::new(StmtKind::Block(out), line))
                    }
                    _ => self.body(*alt),
                }),
            },
            StmtKind::While { test, body } => StmtKind::While {
                test: self.expr(test),
                body: self.body(*body),
            },
            StmtKind::DoWhile { body, test } => StmtKind::DoWhile {
                body: self.body(*body),
                test: self.expr(test),
            },
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => self.scoped(Vec::new(), |pass| {
                let init = init.map(|init| match init {
                    ForInit::VarDecl { kind, decls } => ForInit::VarDecl {
                        kind,
                        decls: pass.declarators(decls),
                    },
                    ForInit::Expr(expr) => ForInit::Expr(pass.expr(expr)),
                });
                StmtKind::For {
                    init,
                    test: test.map(|t| pass.expr(t)),
                    update: update.map(|u| pass.expr(u)),
                    body: pass.body(*body),
                }
            }),
            StmtKind::ForOf {
                binding,
                iterable,
                body,
            } => {
                let iterable = self.expr(iterable);
                let names = binding.kind.map(|_| vec![binding.name.clone()]).unwrap_or_default();
                let body = self.scoped(names, |pass| pass.body(*body));
                StmtKind::ForOf {
                    binding,
                    iterable,
                    body,
                }
            }
            StmtKind::ForIn {
                binding,
                object,
                body,
            } => {
                let object = self.expr(object);
                let names = binding.kind.map(|_| vec![binding.name.clone()]).unwrap_or_default();
                let body = self.scoped(names, |pass| pass.body(*body));
                StmtKind::ForIn {
                    binding,
                    object,
                    body,
                }
            }
            StmtKind::Switch {
                discriminant,
                cases,
            } => {
                let discriminant = self.expr(discriminant);
                let cases = self.scoped(Vec::new(), |pass| {
                    cases
                        .into_iter()
                        .map(|case| SwitchCase {
                            test: case.test.map(|t| pass.expr(t)),
                            body: pass.block(case.body),
                        })
                        .collect()
                });
                StmtKind::Switch {
                    discriminant,
                    cases,
                }
            }
            StmtKind::Return(arg) => StmtKind::Return(arg.map(|a| self.expr(a))),
            StmtKind::Throw(arg) => StmtKind::Throw(self.expr(arg)),
            StmtKind::Try {
                block,
                handler,
                finalizer,
            } => StmtKind::Try {
                block: self.scoped_block(block),
                handler: handler.map(|handler| {
                    let names = handler.param.iter().cloned().collect();
                    let body = self.scoped(names, |pass| pass.block(handler.body));
                    CatchClause {
                        param: handler.param,
                        body,
                    }
                }),
                finalizer: finalizer.map(|f| self.scoped_block(f)),
            },
            other => other,
        }
    }

    fn function(&mut self, def: &FunctionDef) -> Rc<FunctionDef> {
        let params: Vec<Param> = def
            .params
            .iter()
            .map(|p| Param {
                name: p.name.clone(),
                default: p.default.clone().map(|d| self.expr(d)),
                rest: p.rest,
            })
            .collect();
        let names = params.iter().map(|p| p.name.clone()).collect();
        let body = self.scoped(names, |pass| match &def.body {
            FunctionBody::Block(stmts) => FunctionBody::Block(pass.block(stmts.clone())),
            FunctionBody::Expr(expr) => FunctionBody::Expr(Box::new(pass.expr((**expr).clone()))),
        });
        Rc::new(FunctionDef {
            name: def.name.clone(),
            params,
            body,
            is_arrow: def.is_arrow,
            is_async: def.is_async,
            line: def.line,
        })
    }

    // -----------------------------------------------------------------------
    // Expressions: only nested function bodies change
    // -----------------------------------------------------------------------

    fn boxed(&mut self, expr: Box<Expr>) -> Box<Expr> {
        Box::new(self.expr(*expr))
    }

    fn elements(&mut self, elements: Vec<Element>) -> Vec<Element> {
        elements
            .into_iter()
            .map(|element| match element {
                Element::Expr(e) => Element::Expr(self.expr(e)),
                Element::Spread(e) => Element::Spread(self.expr(e)),
            })
            .collect()
    }

    fn expr(&mut self, expr: Expr) -> Expr {
        match expr {
            Expr::Function(def) => Expr::Function(self.function(&def)),
            Expr::Template { quasis, exprs } => Expr::Template {
                quasis,
                exprs: exprs.into_iter().map(|e| self.expr(e)).collect(),
            },
            Expr::Array(elements) => Expr::Array(self.elements(elements)),
            Expr::Object(props) => Expr::Object(
                props
                    .into_iter()
                    .map(|prop| match prop {
                        Property::Init { key, value } => Property::Init {
                            key: match key {
                                PropKey::Computed(k) => PropKey::Computed(self.expr(k)),
                                named => named,
                            },
                            value: self.expr(value),
                        },
                        Property::Spread(e) => Property::Spread(self.expr(e)),
                    })
                    .collect(),
            ),
            Expr::Unary { op, arg } => Expr::Unary {
                op,
                arg: self.boxed(arg),
            },
            Expr::Update { op, prefix, target } => Expr::Update {
                op,
                prefix,
                target: self.boxed(target),
            },
            Expr::Binary { op, left, right } => Expr::Binary {
                op,
                left: self.boxed(left),
                right: self.boxed(right),
            },
            Expr::Logical { op, left, right } => Expr::Logical {
                op,
                left: self.boxed(left),
                right: self.boxed(right),
            },
            Expr::Assign { op, target, value } => Expr::Assign {
                op,
                target: self.boxed(target),
                value: self.boxed(value),
            },
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => Expr::Conditional {
                test: self.boxed(test),
                consequent: self.boxed(consequent),
                alternate: self.boxed(alternate),
            },
            Expr::Call {
                callee,
                args,
                optional,
            } => Expr::Call {
                callee: self.boxed(callee),
                args: self.elements(args),
                optional,
            },
            Expr::New { callee, args } => Expr::New {
                callee: self.boxed(callee),
                args: self.elements(args),
            },
            Expr::Member {
                object,
                property,
                optional,
            } => Expr::Member {
                object: self.boxed(object),
                property,
                optional,
            },
            Expr::Index {
                object,
                index,
                optional,
            } => Expr::Index {
                object: self.boxed(object),
                index: self.boxed(index),
                optional,
            },
            Expr::Await(arg) => Expr::Await(self.boxed(arg)),
            leaf => leaf,
        }
    }
}

/// Whether an expression is a checkpoint call inserted by [`instrument`].
pub fn is_hook_call(expr: &Expr) -> bool {
    matches!(expr, Expr::Call { callee, .. } if matches!(callee.as_ref(), Expr::Ident(name) if name == TRACE_HOOK))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_checkpoints_after_simple_statements() {
        let out = instrument("let a = 1;\na = 2;").unwrap();
        assert_eq!(out.checkpoints, 2);
        assert_eq!(
            out.code,
            "let a = 1;\n__runlab_trace(1, \"let a = 1;\", \"a\");\na = 2;\n__runlab_trace(2, \"a = 2;\", \"a\");\n"
        );
    }

    #[test]
    fn checkpoints_precede_control_statements() {
        let out = instrument("let n = 0\nwhile (n < 2) n++").unwrap();
        assert_eq!(
            out.code,
            concat!(
                "let n = 0;\n",
                "__runlab_trace(1, \"let n = 0\", \"n\");\n",
                "__runlab_trace(2, \"while (n < 2) n++\", \"n\");\n",
                "while (n < 2) {\n",
                "  n++;\n",
                "  __runlab_trace(2, \"while (n < 2) n++\", \"n\");\n",
                "}\n",
            )
        );
    }

    #[test]
    fn function_scopes_see_params_and_outer_bindings() {
        let out = instrument("const k = 2\nfunction mul(x) {\n  const y = x * k\n  return y\n}").unwrap();
        assert!(out
            .code
            .contains("__runlab_trace(3, \"const y = x * k\", \"k\", \"x\", \"y\");"));
        assert!(out.code.contains("__runlab_trace(4, \"return y\", \"k\", \"x\", \"y\");"));
        // function declarations themselves are not checkpointed
        assert_eq!(out.checkpoints, 3);
    }

    #[test]
    fn inner_block_bindings_do_not_leak() {
        let out = instrument("if (true) {\n  let inner = 1\n}\nlet outer = 2").unwrap();
        assert!(out.code.contains("__runlab_trace(4, \"let outer = 2\", \"outer\");"));
    }

    #[test]
    fn duplicate_names_are_listed_once() {
        let out = instrument("let v = 1\n{\n  let v = 2\n}").unwrap();
        assert!(out.code.contains("__runlab_trace(3, \"let v = 2\", \"v\");"));
    }

    #[test]
    fn snippets_are_trimmed_and_truncated() {
        let long = format!("   let s = \"{}\"   ", "x".repeat(200));
        let out = instrument(&long).unwrap();
        let expected: String = long.trim().chars().take(SNIPPET_LIMIT).collect();
        assert!(out.code.contains(&crate::printer::quote_string(&expected)));
    }

    #[test]
    fn rejects_reserved_hook_identifier() {
        let err = instrument("let x = 1\n__runlab_trace(1)").unwrap_err();
        assert!(matches!(err, InstrumentError::ReservedIdentifier { line: 2, .. }));
        // mentioning it inside a string is fine
        assert!(instrument("console.log('__runlab_trace')").is_ok());
    }

    #[test]
    fn reports_parse_errors_with_position() {
        let err = instrument("let = 5").unwrap_err();
        assert_eq!(err.to_string(), "Unexpected token '=' (line 1, column 5)");
    }

    #[test]
    fn output_reparses() {
        let source = "const f = (a) => a + 1\nswitch (f(1)) {\n  case 2: console.log('two'); break\n  default: console.log('other')\n}\ntry { throw new Error('x') } catch (e) { console.log(e.message) }";
        let out = instrument(source).unwrap();
        assert!(parse_program(&out.code).is_ok(), "{}", out.code);
    }
}
